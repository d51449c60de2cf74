// ABOUTME: Lexer producing a token stream with line/column attribution

use crate::error::{LError, LResult, Position};
use nom::character::complete::{alpha1, alphanumeric1, digit1};
use nom::combinator::recognize;
use nom::multi::many0_count;
use nom::sequence::pair;
use nom::{Compare, IResult, Input};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Datatype,
    Method,
    Boolean,
    Float,
    Number,
    Identifier,
    Operator,
    ReturnType,
    RangeOperator,
    MethodOperator,
    Punctuation,
    String,
    InterpolationStart,
    InterpolationEnd,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

const KEYWORDS: &[&str] = &[
    "fn", "for", "foreach", "in", "by", "if", "else", "while", "return", "break", "continue",
];

const DATATYPES: &[&str] = &["int", "float", "str", "bool", "dynamic", "list", "hash", "void"];

const METHODS: &[&str] = &[
    "say", "wait", "ask", "asInt", "asFloat", "asBool", "asString", "type", "default", "trim",
    "upperCase", "lowerCase", "length", "keys", "values", "reverse", "push", "empty", "clone",
    "countOf", "merge", "find", "insertAt", "pull", "removeValue", "order", "pairs", "take",
    "take_last", "ensure", "wipe",
];

fn ident_start(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        nom::branch::alt((alpha1, nom::bytes::complete::tag("_"))),
        many0_count(nom::branch::alt((alphanumeric1, nom::bytes::complete::tag("_")))),
    ))(input)
}

pub struct Lexer<'a> {
    rest: &'a str,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            rest: source,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> LResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            if self.rest.is_empty() {
                break;
            }
            if self.rest.starts_with('"') {
                self.lex_string(&mut tokens)?;
                continue;
            }
            let token = self.next_token()?;
            tokens.push(token);
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn advance(&mut self, n: usize) -> &'a str {
        let (rest, consumed) = self.rest.take_split(n);
        for ch in consumed.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.rest = rest;
        consumed
    }

    fn starts_with(&self, needle: &str) -> bool {
        self.rest.compare(needle) == nom::CompareResult::Ok
    }

    fn skip_whitespace_and_comments(&mut self) -> LResult<()> {
        loop {
            let ws_len = self
                .rest
                .chars()
                .take_while(|c| c.is_whitespace())
                .map(|c| c.len_utf8())
                .sum::<usize>();
            if ws_len > 0 {
                self.advance(ws_len);
                continue;
            }
            if self.starts_with("//") {
                let len = self.rest.find('\n').unwrap_or(self.rest.len());
                self.advance(len);
                continue;
            }
            if self.starts_with("/*") {
                let start_pos = self.pos();
                self.advance(2);
                match self.rest.find("*/") {
                    Some(idx) => {
                        self.advance(idx + 2);
                    }
                    None => {
                        return Err(LError::lex("unterminated block comment", start_pos));
                    }
                }
                continue;
            }
            break;
        }
        Ok(())
    }

    fn next_token(&mut self) -> LResult<Token> {
        let pos = self.pos();
        let ch = self.rest.chars().next().unwrap();

        if ch.is_ascii_digit() {
            return self.lex_number(pos);
        }

        if ch.is_alphabetic() || ch == '_' {
            return self.lex_word(pos);
        }

        self.lex_symbol(pos)
    }

    fn lex_word(&mut self, pos: Position) -> LResult<Token> {
        let (_, matched) = ident_start(self.rest)
            .map_err(|_: nom::Err<nom::error::Error<&str>>| LError::lex("invalid identifier", pos))?;
        let text = self.advance(matched.len()).to_string();
        let kind = if KEYWORDS.contains(&text.as_str()) {
            TokenKind::Keyword
        } else if DATATYPES.contains(&text.as_str()) {
            TokenKind::Datatype
        } else if text == "true" || text == "false" {
            TokenKind::Boolean
        } else if METHODS.contains(&text.as_str()) {
            TokenKind::Method
        } else {
            TokenKind::Identifier
        };
        Ok(Token {
            kind,
            lexeme: text,
            line: pos.line,
            column: pos.column,
        })
    }

    fn lex_number(&mut self, pos: Position) -> LResult<Token> {
        let (rest_after_int, int_part) = digit1::<&str, nom::error::Error<&str>>(self.rest)
            .map_err(|_| LError::lex("malformed number", pos))?;
        if rest_after_int.starts_with('.') && rest_after_int[1..].starts_with(|c: char| c.is_ascii_digit()) {
            let (rest_after_frac, frac_digits) = digit1::<&str, nom::error::Error<&str>>(&rest_after_int[1..])
                .map_err(|_| LError::lex("malformed float", pos))?;
            let total_len = int_part.len() + 1 + frac_digits.len();
            let _ = rest_after_frac;
            let text = self.advance(total_len).to_string();
            return Ok(Token {
                kind: TokenKind::Float,
                lexeme: text,
                line: pos.line,
                column: pos.column,
            });
        }
        let text = self.advance(int_part.len()).to_string();
        Ok(Token {
            kind: TokenKind::Number,
            lexeme: text,
            line: pos.line,
            column: pos.column,
        })
    }

    /// Scans a string literal, splitting it into an alternating sequence of
    /// STRING segments and `INTERPOLATION_START IDENTIFIER INTERPOLATION_END`
    /// triples for each `${name}` placeholder, and pushes them onto `out`.
    /// The sequence always starts and ends with a STRING token (possibly
    /// empty), so the parser never has to guess whether a segment follows.
    /// Backslash escapes are left unprocessed here (section 4.1: escape
    /// processing happens at value-construction time in the interpreter).
    fn lex_string(&mut self, out: &mut Vec<Token>) -> LResult<()> {
        let start_pos = self.pos();
        self.advance(1); // opening quote
        let mut seg_pos = start_pos;
        let mut content = String::new();
        loop {
            match self.rest.chars().next() {
                None => return Err(LError::lex("unterminated string literal", start_pos)),
                Some('"') => {
                    self.advance(1);
                    out.push(Token {
                        kind: TokenKind::String,
                        lexeme: content,
                        line: seg_pos.line,
                        column: seg_pos.column,
                    });
                    break;
                }
                Some('\\') => {
                    content.push_str(self.advance(1));
                    match self.rest.chars().next() {
                        Some(c) => content.push_str(self.advance(c.len_utf8())),
                        None => return Err(LError::lex("unterminated string literal", start_pos)),
                    }
                }
                Some('$') if self.rest[1..].starts_with('{') => {
                    out.push(Token {
                        kind: TokenKind::String,
                        lexeme: std::mem::take(&mut content),
                        line: seg_pos.line,
                        column: seg_pos.column,
                    });
                    let interp_pos = self.pos();
                    self.advance(2); // "${"
                    out.push(Token {
                        kind: TokenKind::InterpolationStart,
                        lexeme: "${".to_string(),
                        line: interp_pos.line,
                        column: interp_pos.column,
                    });
                    let ident_pos = self.pos();
                    let (_, matched) = ident_start(self.rest).map_err(|_: nom::Err<nom::error::Error<&str>>| {
                        LError::lex("malformed interpolation placeholder", ident_pos)
                    })?;
                    let name = self.advance(matched.len()).to_string();
                    out.push(Token {
                        kind: TokenKind::Identifier,
                        lexeme: name,
                        line: ident_pos.line,
                        column: ident_pos.column,
                    });
                    if !self.rest.starts_with('}') {
                        return Err(LError::lex("expected '}' to close interpolation", self.pos()));
                    }
                    let end_pos = self.pos();
                    self.advance(1);
                    out.push(Token {
                        kind: TokenKind::InterpolationEnd,
                        lexeme: "}".to_string(),
                        line: end_pos.line,
                        column: end_pos.column,
                    });
                    seg_pos = self.pos();
                }
                Some(c) => {
                    content.push_str(self.advance(c.len_utf8()));
                }
            }
        }
        Ok(())
    }

    fn lex_symbol(&mut self, pos: Position) -> LResult<Token> {
        const THREE: &[(&str, TokenKind)] = &[("...", TokenKind::RangeOperator)];
        const TWO: &[(&str, TokenKind)] = &[
            ("->", TokenKind::ReturnType),
            ("..", TokenKind::RangeOperator),
            ("==", TokenKind::Operator),
            ("!=", TokenKind::Operator),
            ("<=", TokenKind::Operator),
            (">=", TokenKind::Operator),
            ("&&", TokenKind::Operator),
            ("||", TokenKind::Operator),
            ("=>", TokenKind::Operator),
        ];
        const ONE_OPERATOR: &[char] = &['=', '+', '-', '*', '/', '%', '<', '>', '!'];
        const ONE_PUNCTUATION: &[char] = &['(', ')', '{', '}', '[', ']', ',', ':', ';', '.'];

        for (text, kind) in THREE {
            if self.starts_with(text) {
                let lexeme = self.advance(text.len()).to_string();
                return Ok(Token {
                    kind: *kind,
                    lexeme,
                    line: pos.line,
                    column: pos.column,
                });
            }
        }
        for (text, kind) in TWO {
            if self.starts_with(text) {
                let lexeme = self.advance(text.len()).to_string();
                return Ok(Token {
                    kind: *kind,
                    lexeme,
                    line: pos.line,
                    column: pos.column,
                });
            }
        }

        let ch = self.rest.chars().next().unwrap();
        if ch == '.' {
            let lexeme = self.advance(1).to_string();
            return Ok(Token {
                kind: TokenKind::MethodOperator,
                lexeme,
                line: pos.line,
                column: pos.column,
            });
        }
        if ONE_OPERATOR.contains(&ch) {
            let lexeme = self.advance(1).to_string();
            return Ok(Token {
                kind: TokenKind::Operator,
                lexeme,
                line: pos.line,
                column: pos.column,
            });
        }
        if ONE_PUNCTUATION.contains(&ch) {
            let lexeme = self.advance(1).to_string();
            return Ok(Token {
                kind: TokenKind::Punctuation,
                lexeme,
                line: pos.line,
                column: pos.column,
            });
        }

        // Error recovery: advance past the whole offending run of non-whitespace
        // characters so a single bad token doesn't cascade into many diagnostics.
        let run_len = self
            .rest
            .chars()
            .take_while(|c| !c.is_whitespace())
            .map(|c| c.len_utf8())
            .sum::<usize>()
            .max(ch.len_utf8());
        let bad = self.advance(run_len).to_string();
        Err(LError::lex(format!("unexpected character(s): '{}'", bad), pos))
    }
}

pub fn tokenize(source: &str) -> LResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_simple_assignment() {
        let tokens = tokenize("x: int = 5;").unwrap();
        assert_eq!(tokens[0].lexeme, "x");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].kind, TokenKind::Punctuation); // :
        assert_eq!(tokens[2].kind, TokenKind::Datatype);
        assert_eq!(tokens[3].kind, TokenKind::Operator); // =
        assert_eq!(tokens[4].kind, TokenKind::Number);
    }

    #[test]
    fn distinguishes_range_operators() {
        let tokens = tokenize("1 .. 2 ... 3").unwrap();
        let ranges: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::RangeOperator)
            .map(|t| t.lexeme.clone())
            .collect();
        assert_eq!(ranges, vec!["..".to_string(), "...".to_string()]);
    }

    #[test]
    fn recognizes_method_and_return_type_tokens() {
        let kinds = kinds("fn f() -> int { return 1; } x.push(1);");
        assert!(kinds.contains(&TokenKind::ReturnType));
        assert!(kinds.contains(&TokenKind::Method));
    }

    #[test]
    fn tracks_line_and_column_across_newlines() {
        let tokens = tokenize("x = 1;\ny = 2;").unwrap();
        let y_token = tokens.iter().find(|t| t.lexeme == "y").unwrap();
        assert_eq!(y_token.line, 2);
        assert_eq!(y_token.column, 1);
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(matches!(err, LError::Lex { .. }));
    }

    #[test]
    fn errors_on_unterminated_block_comment() {
        let err = tokenize("/* never closes").unwrap_err();
        assert!(matches!(err, LError::Lex { .. }));
    }

    #[test]
    fn string_literal_splits_interpolation_into_a_token_sequence() {
        let tokens = tokenize("\"hi ${name}!\"").unwrap();
        let kinds: Vec<_> = tokens[..5].iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::String,
                TokenKind::InterpolationStart,
                TokenKind::Identifier,
                TokenKind::InterpolationEnd,
                TokenKind::String,
            ]
        );
        assert_eq!(tokens[0].lexeme, "hi ");
        assert_eq!(tokens[2].lexeme, "name");
        assert_eq!(tokens[4].lexeme, "!");
    }

    #[test]
    fn plain_string_literal_is_a_single_token() {
        let tokens = tokenize("\"hello\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "hello");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn skips_comments() {
        let tokens = tokenize("// comment\nx = 1; /* block */ y = 2;").unwrap();
        let idents: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.lexeme.clone())
            .collect();
        assert_eq!(idents, vec!["x".to_string(), "y".to_string()]);
    }
}
