// ABOUTME: Recursive-descent parser building an AST from the token stream

use crate::ast::*;
use crate::error::{LError, LResult, Position};
use crate::lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn pos_here(&self) -> Position {
        self.current().pos()
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn check_lexeme(&self, kind: TokenKind, lexeme: &str) -> bool {
        self.current().kind == kind && self.current().lexeme == lexeme
    }

    fn match_lexeme(&mut self, kind: TokenKind, lexeme: &str) -> bool {
        if self.check_lexeme(kind, lexeme) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> LResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(LError::parse(
                format!("expected {}, found '{}'", what, self.current().lexeme),
                self.pos_here(),
            ))
        }
    }

    fn expect_punct(&mut self, lexeme: &str) -> LResult<()> {
        if self.check_lexeme(TokenKind::Punctuation, lexeme) {
            self.advance();
            Ok(())
        } else {
            Err(LError::parse(
                format!("expected '{}', found '{}'", lexeme, self.current().lexeme),
                self.pos_here(),
            ))
        }
    }

    fn expect_keyword(&mut self, lexeme: &str) -> LResult<()> {
        if self.check_lexeme(TokenKind::Keyword, lexeme) {
            self.advance();
            Ok(())
        } else {
            Err(LError::parse(
                format!("expected '{}', found '{}'", lexeme, self.current().lexeme),
                self.pos_here(),
            ))
        }
    }

    pub fn parse_program(&mut self) -> LResult<Program> {
        let mut statements = Vec::new();
        while !self.at_eof() {
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_block(&mut self) -> LResult<Vec<Node>> {
        self.expect_punct("{")?;
        let mut statements = Vec::new();
        while !self.check_lexeme(TokenKind::Punctuation, "}") && !self.at_eof() {
            statements.push(self.parse_statement()?.node);
        }
        self.expect_punct("}")?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> LResult<Spanned> {
        let pos = self.pos_here();
        let node = if self.check_lexeme(TokenKind::Keyword, "if") {
            self.parse_if()?
        } else if self.check_lexeme(TokenKind::Keyword, "while") {
            self.parse_while()?
        } else if self.check_lexeme(TokenKind::Keyword, "for") {
            self.parse_for()?
        } else if self.check_lexeme(TokenKind::Keyword, "foreach") {
            self.parse_foreach()?
        } else if self.check_lexeme(TokenKind::Keyword, "fn") {
            self.parse_func_def()?
        } else if self.check_lexeme(TokenKind::Keyword, "return") {
            self.advance();
            let value = if self.check_lexeme(TokenKind::Punctuation, ";") {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.expect_punct(";")?;
            Node::Return(value)
        } else if self.check_lexeme(TokenKind::Keyword, "break") {
            self.advance();
            self.expect_punct(";")?;
            Node::Break
        } else if self.check_lexeme(TokenKind::Keyword, "continue") {
            self.advance();
            self.expect_punct(";")?;
            Node::Continue
        } else if self.check_lexeme(TokenKind::Identifier, "use") {
            self.parse_use()?
        } else if self.check_lexeme(TokenKind::Identifier, "watch") {
            self.parse_watch()?
        } else {
            self.parse_assignment_or_expr_statement()?
        };
        Ok(Spanned { node, pos })
    }

    fn parse_if(&mut self) -> LResult<Node> {
        self.expect_keyword("if")?;
        let condition = Box::new(self.parse_expression()?);
        let body = self.parse_block()?;
        let else_body = if self.match_lexeme(TokenKind::Keyword, "else") {
            if self.check_lexeme(TokenKind::Keyword, "if") {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Node::If {
            condition,
            body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> LResult<Node> {
        self.expect_keyword("while")?;
        let condition = Box::new(self.parse_expression()?);
        let body = self.parse_block()?;
        Ok(Node::While { condition, body })
    }

    fn parse_for(&mut self) -> LResult<Node> {
        self.expect_keyword("for")?;
        let var = self.expect(TokenKind::Identifier, "loop variable name")?.lexeme;
        self.expect_keyword("in")?;
        let start = Box::new(self.parse_expression()?);
        let inclusive = if self.check(TokenKind::RangeOperator) {
            let tok = self.advance();
            tok.lexeme == ".."
        } else {
            return Err(LError::parse("expected '..' or '...' in for range", self.pos_here()));
        };
        let end = Box::new(self.parse_expression()?);
        let step = if self.match_lexeme(TokenKind::Keyword, "by") {
            Some(Box::new(self.parse_unary()?))
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Node::For {
            var,
            start,
            end,
            step,
            inclusive,
            body,
        })
    }

    fn parse_foreach(&mut self) -> LResult<Node> {
        self.expect_keyword("foreach")?;
        let var = self.expect(TokenKind::Identifier, "loop variable name")?.lexeme;
        self.expect_punct(":")?;
        let type_tok = self.expect(TokenKind::Datatype, "type annotation")?;
        let declared_type = TypeAnnotation::from_name(&type_tok.lexeme)
            .ok_or_else(|| LError::parse("unknown type annotation", type_tok.pos()))?;
        self.expect_keyword("in")?;
        let iterable = Box::new(self.parse_expression()?);
        let body = self.parse_block()?;
        Ok(Node::Foreach {
            var,
            declared_type,
            iterable,
            body,
        })
    }

    fn parse_func_def(&mut self) -> LResult<Node> {
        self.expect_keyword("fn")?;
        let name = self.expect(TokenKind::Identifier, "function name")?.lexeme;
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.check_lexeme(TokenKind::Punctuation, ")") {
            let pname = self.expect(TokenKind::Identifier, "parameter name")?.lexeme;
            self.expect_punct(":")?;
            let ty_tok = self.expect(TokenKind::Datatype, "parameter type")?;
            let ty = TypeAnnotation::from_name(&ty_tok.lexeme)
                .ok_or_else(|| LError::parse("unknown type annotation", ty_tok.pos()))?;
            if ty == TypeAnnotation::Void {
                return Err(LError::parse("'void' is not a valid parameter type", ty_tok.pos()));
            }
            params.push(Param { name: pname, ty });
            if !self.match_lexeme(TokenKind::Punctuation, ",") {
                break;
            }
        }
        self.expect_punct(")")?;
        if !self.check(TokenKind::ReturnType) {
            return Err(LError::parse(
                "function definition requires a '-> type' return annotation",
                self.pos_here(),
            ));
        }
        self.advance();
        let ret_tok = self.expect(TokenKind::Datatype, "return type")?;
        let return_type = TypeAnnotation::from_name(&ret_tok.lexeme)
            .ok_or_else(|| LError::parse("unknown type annotation", ret_tok.pos()))?;

        let body = if self.match_lexeme(TokenKind::Operator, "=>") {
            let expr = self.parse_expression()?;
            self.expect_punct(";")?;
            FuncBody::Inline(Box::new(expr))
        } else {
            FuncBody::Block(self.parse_block()?)
        };
        Ok(Node::FuncDef {
            name,
            params,
            return_type,
            body,
        })
    }

    fn parse_use(&mut self) -> LResult<Node> {
        self.advance(); // "use"
        let mutable = self.match_lexeme(TokenKind::Identifier, "mut");
        let mut names = vec![self.expect(TokenKind::Identifier, "imported variable name")?.lexeme];
        while self.match_lexeme(TokenKind::Punctuation, ",") {
            names.push(self.expect(TokenKind::Identifier, "imported variable name")?.lexeme);
        }
        self.expect_punct(";")?;
        Ok(Node::Use { names, mutable })
    }

    fn parse_watch(&mut self) -> LResult<Node> {
        self.advance(); // "watch"
        let mut names = vec![self.expect(TokenKind::Identifier, "watched variable name")?.lexeme];
        while self.match_lexeme(TokenKind::Punctuation, ",") {
            names.push(self.expect(TokenKind::Identifier, "watched variable name")?.lexeme);
        }
        self.expect_punct(";")?;
        Ok(Node::Watch { names })
    }

    /// Handles `ID: TYPE = expr;`, `ID = expr;`, and bare expression
    /// statements (method/function calls, or any other expression used for
    /// its side effects) terminated with `;`.
    fn parse_assignment_or_expr_statement(&mut self) -> LResult<Node> {
        if self.check(TokenKind::Identifier) {
            if self.peek_at(1).kind == TokenKind::Punctuation && self.peek_at(1).lexeme == ":" {
                let name = self.advance().lexeme;
                self.advance(); // ':'
                let ty_tok = self.expect(TokenKind::Datatype, "declared type")?;
                let declared_type = TypeAnnotation::from_name(&ty_tok.lexeme)
                    .ok_or_else(|| LError::parse("unknown type annotation", ty_tok.pos()))?;
                if declared_type == TypeAnnotation::Void {
                    return Err(LError::parse("'void' is not a valid variable type", ty_tok.pos()));
                }
                self.expect(TokenKind::Operator, "'='")?;
                let value = Box::new(self.parse_expression()?);
                self.expect_punct(";")?;
                return Ok(Node::Assign {
                    name,
                    declared_type: Some(declared_type),
                    value,
                });
            }
            if self.peek_at(1).kind == TokenKind::Operator && self.peek_at(1).lexeme == "=" {
                let name = self.advance().lexeme;
                self.advance(); // '='
                let value = Box::new(self.parse_expression()?);
                self.expect_punct(";")?;
                return Ok(Node::Assign {
                    name,
                    declared_type: None,
                    value,
                });
            }
        }
        let expr = self.parse_expression()?;
        self.expect_punct(";")?;
        Ok(Node::ExprStatement(Box::new(expr)))
    }

    // ---- Expressions -----------------------------------------------------
    //
    // A single `expression` rule folds `.` method chains and then infix
    // operators over `primary`, left to right, with no precedence
    // distinction between operators (section 4.2's explicit, non-standard
    // design: `*` does not bind tighter than `+`).

    pub fn parse_expression(&mut self) -> LResult<Node> {
        let mut left = self.parse_chain()?;
        while self.check(TokenKind::Operator) && self.current().lexeme != "=" && self.current().lexeme != "=>" {
            let op_tok = self.advance();
            let op = binary_op_for(&op_tok.lexeme)
                .ok_or_else(|| LError::parse(format!("unknown operator '{}'", op_tok.lexeme), op_tok.pos()))?;
            let right = self.parse_chain()?;
            left = Node::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> LResult<Node> {
        if self.check_lexeme(TokenKind::Operator, "!") {
            self.advance();
            let operand = Box::new(self.parse_unary()?);
            return Ok(Node::Unary {
                op: UnaryOp::Not,
                operand,
            });
        }
        if self.check_lexeme(TokenKind::Operator, "-") {
            self.advance();
            let operand = Box::new(self.parse_unary()?);
            return Ok(Node::Unary {
                op: UnaryOp::Neg,
                operand,
            });
        }
        self.parse_chain()
    }

    /// Folds postfix `.method(...)` and `[index]` applications, left to
    /// right, over a primary expression.
    fn parse_chain(&mut self) -> LResult<Node> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(TokenKind::MethodOperator) {
                self.advance();
                let method = self.expect(TokenKind::Method, "method name")?.lexeme;
                let args = self.parse_call_args()?;
                expr = Node::MethodCall {
                    target: Some(Box::new(expr)),
                    method,
                    args,
                };
            } else if self.check_lexeme(TokenKind::Punctuation, "[") {
                self.advance();
                let index = Box::new(self.parse_expression()?);
                self.expect_punct("]")?;
                expr = Node::Index {
                    target: Box::new(expr),
                    index,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> LResult<Vec<Node>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.check_lexeme(TokenKind::Punctuation, ")") {
            args.push(self.parse_expression()?);
            if !self.match_lexeme(TokenKind::Punctuation, ",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> LResult<Node> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Operator if tok.lexeme == "!" || tok.lexeme == "-" => self.parse_unary(),
            TokenKind::Method => {
                self.advance();
                let args = self.parse_call_args()?;
                Ok(Node::MethodCall {
                    target: None,
                    method: tok.lexeme,
                    args,
                })
            }
            TokenKind::Identifier => {
                self.advance();
                if self.check_lexeme(TokenKind::Punctuation, "(") {
                    let args = self.parse_call_args()?;
                    Ok(Node::FunctionCall { name: tok.lexeme, args })
                } else {
                    Ok(Node::Identifier(tok.lexeme))
                }
            }
            TokenKind::Number => {
                self.advance();
                let n: i64 = tok
                    .lexeme
                    .parse()
                    .map_err(|_| LError::parse("malformed integer literal", tok.pos()))?;
                Ok(Node::IntLit(n))
            }
            TokenKind::Float => {
                self.advance();
                let f: f64 = tok
                    .lexeme
                    .parse()
                    .map_err(|_| LError::parse("malformed float literal", tok.pos()))?;
                Ok(Node::FloatLit(f))
            }
            TokenKind::Boolean => {
                self.advance();
                Ok(Node::BoolLit(tok.lexeme == "true"))
            }
            TokenKind::String => self.parse_string_literal(),
            TokenKind::Punctuation if tok.lexeme == "(" => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punctuation if tok.lexeme == "[" => self.parse_list_literal(),
            TokenKind::Punctuation if tok.lexeme == "{" => self.parse_hash_literal(),
            _ => Err(LError::parse(format!("unexpected token '{}'", tok.lexeme), tok.pos())),
        }
    }

    fn parse_string_literal(&mut self) -> LResult<Node> {
        let first = self.expect(TokenKind::String, "string literal")?;
        let mut parts = vec![StringPart::Literal(first.lexeme)];
        let mut saw_interpolation = false;
        while self.check(TokenKind::InterpolationStart) {
            saw_interpolation = true;
            self.advance();
            let name = self.expect(TokenKind::Identifier, "interpolated identifier")?.lexeme;
            self.expect(TokenKind::InterpolationEnd, "'}'")?;
            parts.push(StringPart::Interpolated(name));
            let seg = self.expect(TokenKind::String, "string segment")?;
            parts.push(StringPart::Literal(seg.lexeme));
        }
        if saw_interpolation {
            Ok(Node::StringInterp(parts))
        } else if let StringPart::Literal(s) = parts.into_iter().next().unwrap() {
            Ok(Node::StrLit(s))
        } else {
            unreachable!()
        }
    }

    fn parse_list_literal(&mut self) -> LResult<Node> {
        self.expect_punct("[")?;
        let mut items = Vec::new();
        while !self.check_lexeme(TokenKind::Punctuation, "]") {
            items.push(self.parse_expression()?);
            if !self.match_lexeme(TokenKind::Punctuation, ",") {
                break;
            }
        }
        self.expect_punct("]")?;
        Ok(Node::ListLit(items))
    }

    fn parse_hash_literal(&mut self) -> LResult<Node> {
        self.expect_punct("{")?;
        let mut entries = Vec::new();
        while !self.check_lexeme(TokenKind::Punctuation, "}") {
            let key = if self.check(TokenKind::String) {
                self.advance().lexeme
            } else {
                self.expect(TokenKind::Identifier, "hash key")?.lexeme
            };
            self.expect_punct(":")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.match_lexeme(TokenKind::Punctuation, ",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Node::HashLit(entries))
    }
}

fn binary_op_for(lexeme: &str) -> Option<BinaryOp> {
    Some(match lexeme {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        _ => return None,
    })
}

pub fn parse(source: &str) -> LResult<Program> {
    let tokens = crate::lexer::tokenize(source)?;
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap_or_else(|e| panic!("parse failed for {:?}: {}", src, e))
    }

    #[test]
    fn parses_typed_assignment() {
        let program = parse_ok("x: int = 5;");
        assert_eq!(program.len(), 1);
        match &program[0].node {
            Node::Assign { name, declared_type, value } => {
                assert_eq!(name, "x");
                assert_eq!(*declared_type, Some(TypeAnnotation::Int));
                assert_eq!(**value, Node::IntLit(5));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_flat_operator_fold_with_no_precedence() {
        let program = parse_ok("x = 1 + 2 * 3;");
        match &program[0].node {
            Node::Assign { value, .. } => match value.as_ref() {
                Node::Binary { op: BinaryOp::Mul, left, .. } => match left.as_ref() {
                    Node::Binary { op: BinaryOp::Add, .. } => {}
                    other => panic!("expected left-folded Add, got {:?}", other),
                },
                other => panic!("expected top-level Mul from flat fold, got {:?}", other),
            },
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_method_chain() {
        let program = parse_ok("x.trim().upperCase();");
        match &program[0].node {
            Node::ExprStatement(expr) => match expr.as_ref() {
                Node::MethodCall { method, target, .. } => {
                    assert_eq!(method, "upperCase");
                    match target.as_deref() {
                        Some(Node::MethodCall { method, .. }) => assert_eq!(method, "trim"),
                        other => panic!("expected chained trim call, got {:?}", other),
                    }
                }
                other => panic!("unexpected node: {:?}", other),
            },
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_function_definition_with_types() {
        let program = parse_ok("fn sq(n:int) -> int { return n * n; }");
        match &program[0].node {
            Node::FuncDef { name, params, return_type, body } => {
                assert_eq!(name, "sq");
                assert_eq!(params.len(), 1);
                assert_eq!(params[0].ty, TypeAnnotation::Int);
                assert_eq!(*return_type, TypeAnnotation::Int);
                assert!(matches!(body, FuncBody::Block(_)));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_inline_function() {
        let program = parse_ok("fn sq(n:int) -> int => n * n;");
        match &program[0].node {
            Node::FuncDef { body, .. } => assert!(matches!(body, FuncBody::Inline(_))),
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_use_and_use_mut() {
        let program = parse_ok("fn f() -> void { use mut x; use y; }");
        match &program[0].node {
            Node::FuncDef { body: FuncBody::Block(stmts), .. } => {
                assert_eq!(stmts[0], Node::Use { names: vec!["x".to_string()], mutable: true });
                assert_eq!(stmts[1], Node::Use { names: vec!["y".to_string()], mutable: false });
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_watch_statement() {
        let program = parse_ok("watch x, y;");
        assert_eq!(program[0].node, Node::Watch { names: vec!["x".to_string(), "y".to_string()] });
    }

    #[test]
    fn parses_inclusive_and_exclusive_for_ranges() {
        let inclusive = parse_ok("for i in 0 .. 5 { }");
        match &inclusive[0].node {
            Node::For { inclusive, .. } => assert!(inclusive),
            _ => panic!("expected for loop"),
        }
        let exclusive = parse_ok("for i in 0 ... 5 { }");
        match &exclusive[0].node {
            Node::For { inclusive, .. } => assert!(!inclusive),
            _ => panic!("expected for loop"),
        }
    }

    #[test]
    fn parses_else_if_chain_as_nested_if() {
        let program = parse_ok("if a { } else if b { } else { }");
        match &program[0].node {
            Node::If { else_body: Some(body), .. } => {
                assert_eq!(body.len(), 1);
                assert!(matches!(body[0], Node::If { .. }));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_string_interpolation() {
        let program = parse_ok("x = \"hi ${name}!\";");
        match &program[0].node {
            Node::Assign { value, .. } => match value.as_ref() {
                Node::StringInterp(parts) => {
                    assert_eq!(
                        *parts,
                        vec![
                            StringPart::Literal("hi ".to_string()),
                            StringPart::Interpolated("name".to_string()),
                            StringPart::Literal("!".to_string()),
                        ]
                    );
                }
                other => panic!("expected string_interp, got {:?}", other),
            },
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_hash_and_list_literals() {
        let program = parse_ok("h = {\"a\": 1, \"b\": 2}; xs = [1, 2, 3];");
        assert!(matches!(&program[0].node, Node::Assign { value, .. } if matches!(value.as_ref(), Node::HashLit(_))));
        assert!(matches!(&program[1].node, Node::Assign { value, .. } if matches!(value.as_ref(), Node::ListLit(_))));
    }

    #[test]
    fn rejects_void_variable_type() {
        let err = parse("x: void = 1;").unwrap_err();
        assert!(matches!(err, LError::Parse { .. }));
    }

    #[test]
    fn rejects_missing_return_type() {
        let err = parse("fn f() { }").unwrap_err();
        assert!(matches!(err, LError::Parse { .. }));
    }
}
