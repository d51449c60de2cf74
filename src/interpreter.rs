// ABOUTME: Tree-walking evaluator: executes an AST against a Scope chain

use crate::ast::{BinaryOp, FuncBody, Node, Program, StringPart, TypeAnnotation, UnaryOp};
use crate::error::{LError, LResult};
use crate::io::{InputSink, OutputSink};
use crate::scope::{type_matches, FunctionRecord, Scope};
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::rc::Rc;
use std::time::Duration;

/// Non-error control signal produced by statement execution. Kept distinct
/// from `LError` so loop/function boundaries can catch these without
/// swallowing a real failure.
enum Flow {
    Normal,
    /// `None` for a bare `return;`, distinct from a falling-off-the-end
    /// `Normal` and from `Some(v)` for `return v;` — a `void` function must
    /// reject the latter but accept the former and `Normal`.
    Return(Option<Value>),
    Break,
    Continue,
}

/// `say`/`wait` have no meaningful return value (the language has no
/// nil/void runtime value); callers that use them in expression position
/// get this placeholder, which is never observable in practice since
/// statement-position calls discard it.
const VOID_SENTINEL: Value = Value::Bool(true);

/// Parses and executes a whole program against a fresh global scope.
pub fn run(source: &str, out: &mut dyn OutputSink, input: &mut dyn InputSink) -> LResult<()> {
    let program = crate::parser::parse(source)?;
    let global = Scope::global();
    execute_program(&program, &global, out, input)
}

fn execute_program(program: &Program, scope: &Rc<Scope>, out: &mut dyn OutputSink, input: &mut dyn InputSink) -> LResult<()> {
    for stmt in program {
        execute_node(&stmt.node, scope, out, input)?;
    }
    Ok(())
}

fn execute_block(stmts: &[Node], scope: &Rc<Scope>, out: &mut dyn OutputSink, input: &mut dyn InputSink) -> LResult<Flow> {
    for stmt in stmts {
        match execute_node(stmt, scope, out, input)? {
            Flow::Normal => continue,
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

fn execute_node(node: &Node, scope: &Rc<Scope>, out: &mut dyn OutputSink, input: &mut dyn InputSink) -> LResult<Flow> {
    match node {
        Node::ExprStatement(expr) => {
            evaluate(expr, scope, out, input)?;
            Ok(Flow::Normal)
        }
        Node::Assign { name, declared_type, value } => {
            let new_value = evaluate(value, scope, out, input)?;
            if scope.is_watched(name) {
                out.write_line(&format!(
                    "WATCH: {} changed to {} (in {})",
                    name,
                    new_value,
                    scope.current_function_label()
                ));
            }
            match declared_type {
                Some(ty) => scope.define(name, new_value, Some(ty.clone()))?,
                None => scope.assign(name, new_value)?,
            }
            Ok(Flow::Normal)
        }
        Node::Use { names, mutable } => {
            for name in names {
                scope.import(name, *mutable)?;
            }
            Ok(Flow::Normal)
        }
        Node::Watch { names } => {
            for name in names {
                scope.watch(name)?;
            }
            Ok(Flow::Normal)
        }
        Node::FuncDef { name, params, return_type, body } => {
            scope.define_function(FunctionRecord {
                name: name.clone(),
                params: params.clone(),
                return_type: return_type.clone(),
                body: body.clone(),
                defining_scope: Rc::clone(scope),
            });
            Ok(Flow::Normal)
        }
        Node::If { condition, body, else_body } => {
            if evaluate(condition, scope, out, input)?.is_truthy() {
                let block_scope = Scope::child_block(scope, false);
                execute_block(body, &block_scope, out, input)
            } else if let Some(else_stmts) = else_body {
                let block_scope = Scope::child_block(scope, false);
                execute_block(else_stmts, &block_scope, out, input)
            } else {
                Ok(Flow::Normal)
            }
        }
        Node::While { condition, body } => {
            loop {
                if !evaluate(condition, scope, out, input)?.is_truthy() {
                    return Ok(Flow::Normal);
                }
                let block_scope = Scope::child_block(scope, true);
                match execute_block(body, &block_scope, out, input)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                }
            }
        }
        Node::For { var, start, end, step, inclusive, body } => {
            let start = to_int(&evaluate(start, scope, out, input)?)?;
            let end = to_int(&evaluate(end, scope, out, input)?)?;
            let step = match step {
                Some(expr) => to_int(&evaluate(expr, scope, out, input)?)?,
                None => 1,
            };
            if step == 0 {
                return Err(LError::value("for loop step must not be zero"));
            }
            let mut i = start;
            loop {
                let continues = if step > 0 {
                    i < end || (*inclusive && i == end)
                } else {
                    i > end || (*inclusive && i == end)
                };
                if !continues {
                    break;
                }
                let block_scope = Scope::child_block(scope, true);
                block_scope.define(var, Value::Int(i), Some(TypeAnnotation::Int))?;
                match execute_block(body, &block_scope, out, input)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                }
                i += step;
            }
            Ok(Flow::Normal)
        }
        Node::Foreach { var, declared_type, iterable, body } => {
            let container = evaluate(iterable, scope, out, input)?;
            let items: Vec<Value> = match &container {
                Value::List(items) => items.borrow().clone(),
                Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                Value::Hash(entries) => entries.borrow().keys().map(|k| Value::Str(k.clone())).collect(),
                other => {
                    return Err(LError::type_mismatch(format!(
                        "foreach requires a list, hash, or string, got {}",
                        other.type_name()
                    )))
                }
            };
            for item in items {
                if !type_matches(declared_type, &item) {
                    return Err(LError::type_mismatch(format!(
                        "foreach variable '{}' declared {} but element is {}",
                        var,
                        declared_type.name(),
                        item.type_name()
                    )));
                }
                let block_scope = Scope::child_block(scope, true);
                block_scope.define(var, item, Some(declared_type.clone()))?;
                match execute_block(body, &block_scope, out, input)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                }
            }
            Ok(Flow::Normal)
        }
        Node::Return(value) => {
            if !scope.in_function {
                return Err(LError::control("'return' used outside a function"));
            }
            let result = match value {
                Some(expr) => Some(evaluate(expr, scope, out, input)?),
                None => None,
            };
            Ok(Flow::Return(result))
        }
        Node::Break => {
            if !scope.in_loop {
                return Err(LError::control("'break' used outside a loop"));
            }
            Ok(Flow::Break)
        }
        Node::Continue => {
            if !scope.in_loop {
                return Err(LError::control("'continue' used outside a loop"));
            }
            Ok(Flow::Continue)
        }
        other => {
            // Any remaining node kind is an expression used for its value
            // alone; this arm is unreachable from the parser's own grammar
            // (expression statements are always wrapped in ExprStatement)
            // but keeps execute_node total over `Node`.
            evaluate(other, scope, out, input)?;
            Ok(Flow::Normal)
        }
    }
}

fn evaluate(node: &Node, scope: &Rc<Scope>, out: &mut dyn OutputSink, input: &mut dyn InputSink) -> LResult<Value> {
    match node {
        Node::IntLit(n) => Ok(Value::Int(*n)),
        Node::FloatLit(f) => Ok(Value::Float(*f)),
        Node::BoolLit(b) => Ok(Value::Bool(*b)),
        Node::StrLit(s) => Ok(Value::Str(unescape(s))),
        Node::Identifier(name) => scope.lookup(name),
        Node::ListLit(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, scope, out, input))
                .collect::<LResult<Vec<_>>>()?;
            Ok(Value::new_list(values))
        }
        Node::HashLit(entries) => {
            let mut map = IndexMap::new();
            for (key, value_expr) in entries {
                let value = evaluate(value_expr, scope, out, input)?;
                map.insert(key.clone(), value);
            }
            Ok(Value::new_hash(map))
        }
        Node::StringInterp(parts) => {
            let mut result = String::new();
            for part in parts {
                match part {
                    StringPart::Literal(s) => result.push_str(&unescape(s)),
                    StringPart::Interpolated(name) => {
                        let value = scope.lookup(name)?;
                        result.push_str(&value.to_string());
                    }
                }
            }
            Ok(Value::Str(result))
        }
        Node::Unary { op, operand } => {
            let value = evaluate(operand, scope, out, input)?;
            eval_unary(op, value)
        }
        Node::Binary { op, left, right } => eval_binary(op, left, right, scope, out, input),
        Node::Index { target, index } => {
            let target_value = evaluate(target, scope, out, input)?;
            let index_value = evaluate(index, scope, out, input)?;
            eval_index(&target_value, &index_value)
        }
        Node::FunctionCall { name, args } => call_function(name, args, scope, out, input),
        Node::MethodCall { target, method, args } => call_method(target.as_deref(), method, args, scope, out, input),
        other => unreachable!("statement node {:?} reached evaluate()", other),
    }
}

fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

fn to_int(value: &Value) -> LResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(f) => Ok(*f as i64),
        other => Err(LError::type_mismatch(format!("expected a number, got {}", other.type_name()))),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare_values(a: &Value, b: &Value) -> LResult<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| LError::type_mismatch("cannot compare NaN")),
            _ => Err(LError::type_mismatch(format!(
                "cannot compare {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn eval_unary(op: &UnaryOp, value: Value) -> LResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(LError::type_mismatch(format!("cannot negate {}", other.type_name()))),
        },
    }
}

fn eval_binary(
    op: &BinaryOp,
    left_node: &Node,
    right_node: &Node,
    scope: &Rc<Scope>,
    out: &mut dyn OutputSink,
    input: &mut dyn InputSink,
) -> LResult<Value> {
    // && and || short-circuit, so the right operand is evaluated lazily.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = evaluate(left_node, scope, out, input)?;
        let left_truthy = left.is_truthy();
        return match op {
            BinaryOp::And if !left_truthy => Ok(Value::Bool(false)),
            BinaryOp::Or if left_truthy => Ok(Value::Bool(true)),
            _ => {
                let right = evaluate(right_node, scope, out, input)?;
                Ok(Value::Bool(right.is_truthy()))
            }
        };
    }

    let left = evaluate(left_node, scope, out, input)?;
    let right = evaluate(right_node, scope, out, input)?;

    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::new_list(items))
            }
            _ => match (as_number(&left), as_number(&right)) {
                (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                _ => Err(type_error_binary("+", &left, &right)),
            },
        },
        BinaryOp::Sub => numeric_binary(&left, &right, "-", |a, b| a - b, |a, b| a - b),
        BinaryOp::Mul => numeric_binary(&left, &right, "*", |a, b| a * b, |a, b| a * b),
        BinaryOp::Div => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(LError::value("division by zero"))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            _ => match (as_number(&left), as_number(&right)) {
                (Some(a), Some(b)) => {
                    if b == 0.0 {
                        Err(LError::value("division by zero"))
                    } else {
                        Ok(Value::Float(a / b))
                    }
                }
                _ => Err(type_error_binary("/", &left, &right)),
            },
        },
        BinaryOp::Mod => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(LError::value("modulo by zero"))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => match (as_number(&left), as_number(&right)) {
                (Some(a), Some(b)) => {
                    if b == 0.0 {
                        Err(LError::value("modulo by zero"))
                    } else {
                        Ok(Value::Float(a % b))
                    }
                }
                _ => Err(type_error_binary("%", &left, &right)),
            },
        },
        BinaryOp::Eq => Ok(Value::Bool(Value::values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!Value::values_equal(&left, &right))),
        BinaryOp::Lt => Ok(Value::Bool(compare_values(&left, &right)? == Ordering::Less)),
        BinaryOp::Gt => Ok(Value::Bool(compare_values(&left, &right)? == Ordering::Greater)),
        BinaryOp::Le => Ok(Value::Bool(compare_values(&left, &right)? != Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare_values(&left, &right)? != Ordering::Less)),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn numeric_binary(
    left: &Value,
    right: &Value,
    op_name: &str,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> LResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
            _ => Err(type_error_binary(op_name, left, right)),
        },
    }
}

fn type_error_binary(op: &str, left: &Value, right: &Value) -> LError {
    LError::type_mismatch(format!(
        "cannot apply '{}' to {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn eval_index(target: &Value, index: &Value) -> LResult<Value> {
    match target {
        Value::List(items) => {
            let i = match index {
                Value::Int(n) => *n,
                other => return Err(LError::type_mismatch(format!("list index must be an int, got {}", other.type_name()))),
            };
            let items = items.borrow();
            if i < 0 || i as usize >= items.len() {
                return Err(LError::index(format!("list index {} out of range", i)));
            }
            Ok(items[i as usize].clone())
        }
        Value::Hash(entries) => {
            let key = match index {
                Value::Str(s) => s,
                other => return Err(LError::type_mismatch(format!("hash key must be a str, got {}", other.type_name()))),
            };
            entries
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| LError::key(format!("key '{}' not found in hash", key)))
        }
        Value::Str(s) => {
            let i = match index {
                Value::Int(n) => *n,
                other => return Err(LError::type_mismatch(format!("string index must be an int, got {}", other.type_name()))),
            };
            let chars: Vec<char> = s.chars().collect();
            if i < 0 || i as usize >= chars.len() {
                return Err(LError::index(format!("string index {} out of range", i)));
            }
            Ok(Value::Str(chars[i as usize].to_string()))
        }
        other => Err(LError::type_mismatch(format!("cannot index type {}", other.type_name()))),
    }
}

fn call_function(name: &str, args: &[Node], scope: &Rc<Scope>, out: &mut dyn OutputSink, input: &mut dyn InputSink) -> LResult<Value> {
    let func = scope
        .lookup_function(name)
        .ok_or_else(|| LError::name(format!("function '{}' is not defined", name)))?;

    if args.len() != func.params.len() {
        return Err(LError::type_mismatch(format!(
            "function '{}' expects {} argument(s), got {}",
            name,
            func.params.len(),
            args.len()
        )));
    }

    let call_scope = Scope::child_function(&func.defining_scope, name.to_string());
    for (arg_expr, param) in args.iter().zip(&func.params) {
        let value = evaluate(arg_expr, scope, out, input)?;
        if !type_matches(&param.ty, &value) {
            return Err(LError::type_mismatch(format!(
                "argument '{}' to function '{}' must be {}, got {}",
                param.name,
                name,
                param.ty.name(),
                value.type_name()
            )));
        }
        call_scope.define(&param.name, value, Some(param.ty.clone()))?;
    }

    let returned = match &func.body {
        FuncBody::Inline(expr) => Some(evaluate(expr, &call_scope, out, input)?),
        FuncBody::Block(stmts) => match execute_block(stmts, &call_scope, out, input)? {
            Flow::Return(v) => v,
            Flow::Normal => None,
            Flow::Break | Flow::Continue => {
                return Err(LError::control(format!("'{}' exited without returning", name)))
            }
        },
    };

    validate_return(&func, returned, name)
}

fn validate_return(func: &FunctionRecord, returned: Option<Value>, name: &str) -> LResult<Value> {
    match (&func.return_type, returned) {
        (TypeAnnotation::Void, None) => Ok(VOID_SENTINEL),
        (TypeAnnotation::Void, Some(v)) => Err(LError::type_mismatch(format!(
            "function '{}' declared void must not return a value, got {}",
            name,
            v.type_name()
        ))),
        (ty, None) => Err(LError::type_mismatch(format!(
            "function '{}' must return {}, but fell through without a value",
            name,
            ty.name()
        ))),
        (ty, Some(v)) if type_matches(ty, &v) => Ok(v),
        (ty, Some(v)) => Err(LError::type_mismatch(format!(
            "function '{}' must return {}, got {}",
            name,
            ty.name(),
            v.type_name()
        ))),
    }
}

const MUTATING_METHODS: &[&str] = &["push", "empty", "insertAt", "pull", "removeValue", "order", "merge", "wipe", "take", "take_last", "ensure"];

/// Dispatches a method call. `target` is the expression before `.method(...)`
/// for chained calls (`x.trim()`), or `None` for the free-standing form
/// (`trim(x)`, `say(...)`), in which case the first argument doubles as the
/// receiver for every method except the I/O trio.
fn call_method(
    target: Option<&Node>,
    method: &str,
    args: &[Node],
    scope: &Rc<Scope>,
    out: &mut dyn OutputSink,
    input: &mut dyn InputSink,
) -> LResult<Value> {
    if matches!(method, "say" | "wait" | "ask") {
        return call_io_method(method, args, scope, out, input);
    }

    let (receiver_expr, rest_args): (&Node, &[Node]) = match target {
        Some(expr) => (expr, args),
        None => {
            if args.is_empty() {
                return Err(LError::type_mismatch(format!("{}() requires a receiver", method)));
            }
            (&args[0], &args[1..])
        }
    };

    if MUTATING_METHODS.contains(&method) && scope.in_function {
        if let Node::Identifier(name) = receiver_expr {
            if let Some(false) = scope.import_mutability(name) {
                return Err(LError::name(format!(
                    "cannot modify immutable import '{}' via {}()",
                    name, method
                )));
            }
        }
    }

    let receiver = evaluate(receiver_expr, scope, out, input)?;
    let arg_values = rest_args
        .iter()
        .map(|a| evaluate(a, scope, out, input))
        .collect::<LResult<Vec<_>>>()?;

    let result = dispatch_method(method, &receiver, &arg_values)?;

    if MUTATING_METHODS.contains(&method) {
        if let Node::Identifier(name) = receiver_expr {
            if scope.is_watched(name) {
                out.write_line(&format!(
                    "WATCH: {} modified by {}() to {} (in {})",
                    name,
                    method,
                    receiver,
                    scope.current_function_label()
                ));
            }
        }
    }

    Ok(result)
}

fn call_io_method(method: &str, args: &[Node], scope: &Rc<Scope>, out: &mut dyn OutputSink, input: &mut dyn InputSink) -> LResult<Value> {
    match method {
        "say" => {
            let values = args
                .iter()
                .map(|a| evaluate(a, scope, out, input))
                .collect::<LResult<Vec<_>>>()?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.write_str(" ");
                }
                out.write_str(&value.to_string());
            }
            out.write_str("\n");
            Ok(VOID_SENTINEL)
        }
        "wait" => {
            if args.len() != 1 {
                return Err(LError::type_mismatch("wait() requires exactly one argument"));
            }
            let value = evaluate(&args[0], scope, out, input)?;
            let seconds = as_number(&value).ok_or_else(|| LError::type_mismatch("wait() argument must be a number"))?;
            if seconds < 0.0 {
                return Err(LError::value("wait() duration must not be negative"));
            }
            std::thread::sleep(Duration::from_secs_f64(seconds));
            Ok(VOID_SENTINEL)
        }
        "ask" => {
            if args.len() != 1 {
                return Err(LError::type_mismatch("ask() requires exactly one argument"));
            }
            let prompt = evaluate(&args[0], scope, out, input)?;
            out.write_str(&prompt.to_string());
            let line = input
                .read_line()
                .map_err(|e| LError::value(format!("failed to read input: {}", e)))?;
            Ok(Value::Str(line))
        }
        _ => unreachable!(),
    }
}

fn expect_arity(method: &str, args: &[Value], want: usize) -> LResult<()> {
    if args.len() != want {
        return Err(LError::type_mismatch(format!(
            "{}() requires exactly {} argument(s), got {}",
            method,
            want,
            args.len()
        )));
    }
    Ok(())
}

fn as_str<'a>(method: &str, value: &'a Value) -> LResult<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(LError::type_mismatch(format!("{}() can only be called on a str, got {}", method, other.type_name()))),
    }
}

fn as_list_handle<'a>(method: &str, value: &'a Value) -> LResult<&'a crate::value::ListHandle> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(LError::type_mismatch(format!("{}() can only be called on a list, got {}", method, other.type_name()))),
    }
}

fn as_hash_handle<'a>(method: &str, value: &'a Value) -> LResult<&'a crate::value::HashHandle> {
    match value {
        Value::Hash(entries) => Ok(entries),
        other => Err(LError::type_mismatch(format!("{}() can only be called on a hash, got {}", method, other.type_name()))),
    }
}

/// The single dispatch table: one `match` on method name, with receiver-type
/// checks and arity checks per §4.5's method table.
fn dispatch_method(method: &str, receiver: &Value, args: &[Value]) -> LResult<Value> {
    match method {
        // ---- Conversion ----
        "asInt" => match receiver {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Float(f) => Ok(Value::Int(*f as i64)),
            Value::Bool(b) => Ok(Value::Int(if *b { 1 } else { 0 })),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| LError::type_mismatch(format!("cannot convert '{}' to int", s))),
            other => Err(LError::type_mismatch(format!("cannot convert {} to int", other.type_name()))),
        },
        "asFloat" => match receiver {
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| LError::type_mismatch(format!("cannot convert '{}' to float", s))),
            other => Err(LError::type_mismatch(format!("cannot convert {} to float", other.type_name()))),
        },
        "asBool" => Ok(Value::Bool(receiver.is_truthy())),
        "asString" => Ok(Value::Str(receiver.to_string())),
        "type" => Ok(Value::Str(receiver.type_name().to_string())),
        "default" => {
            expect_arity("default", args, 1)?;
            if receiver.is_truthy() {
                Ok(receiver.clone())
            } else {
                Ok(args[0].clone())
            }
        }

        // ---- String / shared with list for reverse/length/clone ----
        "trim" => Ok(Value::Str(as_str("trim", receiver)?.trim().to_string())),
        "upperCase" => Ok(Value::Str(as_str("upperCase", receiver)?.to_uppercase())),
        "lowerCase" => Ok(Value::Str(as_str("lowerCase", receiver)?.to_lowercase())),
        "length" => match receiver {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.borrow().len() as i64)),
            Value::Hash(entries) => Ok(Value::Int(entries.borrow().len() as i64)),
            other => Err(LError::type_mismatch(format!("length() cannot be used on {}", other.type_name()))),
        },
        "reverse" => match receiver {
            Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
            Value::List(items) => Ok(Value::new_list(items.borrow().iter().rev().cloned().collect())),
            other => Err(LError::type_mismatch(format!("reverse() cannot be used on {}", other.type_name()))),
        },
        "clone" => match receiver {
            Value::List(items) => Ok(Value::new_list(items.borrow().clone())),
            Value::Hash(entries) => Ok(Value::new_hash(entries.borrow().clone())),
            other => Err(LError::type_mismatch(format!("clone() cannot be used on {}", other.type_name()))),
        },

        // ---- List read ----
        "countOf" => {
            expect_arity("countOf", args, 1)?;
            let items = as_list_handle("countOf", receiver)?;
            let count = items.borrow().iter().filter(|item| Value::values_equal(item, &args[0])).count();
            Ok(Value::Int(count as i64))
        }
        "find" => {
            expect_arity("find", args, 1)?;
            let items = as_list_handle("find", receiver)?;
            items
                .borrow()
                .iter()
                .position(|item| Value::values_equal(item, &args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| LError::value(format!("element {} not found in list", args[0])))
        }

        // ---- List write ----
        "push" => {
            expect_arity("push", args, 1)?;
            let items = as_list_handle("push", receiver)?;
            items.borrow_mut().push(args[0].clone());
            Ok(receiver.clone())
        }
        "empty" => {
            expect_arity("empty", args, 0)?;
            as_list_handle("empty", receiver)?.borrow_mut().clear();
            Ok(receiver.clone())
        }
        "insertAt" => {
            expect_arity("insertAt", args, 2)?;
            let items = as_list_handle("insertAt", receiver)?;
            let index = to_int(&args[0])?;
            let len = items.borrow().len();
            if index < 0 || index as usize > len {
                return Err(LError::index(format!("index {} out of range for list of length {}", index, len)));
            }
            items.borrow_mut().insert(index as usize, args[1].clone());
            Ok(receiver.clone())
        }
        "pull" => {
            if args.len() > 1 {
                return Err(LError::type_mismatch("pull() accepts at most one argument"));
            }
            let items = as_list_handle("pull", receiver)?;
            if let Some(index_arg) = args.first() {
                let index = to_int(index_arg)?;
                let len = items.borrow().len();
                if index < 0 || index as usize >= len {
                    return Err(LError::index(format!("index {} out of range for list of length {}", index, len)));
                }
                Ok(items.borrow_mut().remove(index as usize))
            } else {
                let mut items_mut = items.borrow_mut();
                items_mut.pop().ok_or_else(|| LError::index("cannot pull from an empty list"))
            }
        }
        "removeValue" => {
            expect_arity("removeValue", args, 1)?;
            let items = as_list_handle("removeValue", receiver)?;
            let mut items_mut = items.borrow_mut();
            let pos = items_mut
                .iter()
                .position(|item| Value::values_equal(item, &args[0]))
                .ok_or_else(|| LError::value(format!("value {} not found in list", args[0])))?;
            items_mut.remove(pos);
            drop(items_mut);
            Ok(receiver.clone())
        }
        "order" => {
            expect_arity("order", args, 0)?;
            let items = as_list_handle("order", receiver)?;
            let mut items_mut = items.borrow_mut();
            let mut err = None;
            items_mut.sort_by(|a, b| match compare_values(a, b) {
                Ok(ord) => ord,
                Err(e) => {
                    err = Some(e);
                    Ordering::Equal
                }
            });
            drop(items_mut);
            if let Some(e) = err {
                return Err(e);
            }
            Ok(receiver.clone())
        }
        "merge" => {
            expect_arity("merge", args, 1)?;
            match receiver {
                Value::List(items) => {
                    match &args[0] {
                        Value::List(other) => items.borrow_mut().extend(other.borrow().iter().cloned()),
                        Value::Str(s) => items.borrow_mut().extend(s.chars().map(|c| Value::Str(c.to_string()))),
                        other => return Err(LError::type_mismatch(format!("merge() argument must be a list or str, got {}", other.type_name()))),
                    }
                    Ok(receiver.clone())
                }
                Value::Hash(entries) => {
                    let other = as_hash_handle("merge", &args[0])?;
                    for (k, v) in other.borrow().iter() {
                        entries.borrow_mut().insert(k.clone(), v.clone());
                    }
                    Ok(receiver.clone())
                }
                other => Err(LError::type_mismatch(format!("merge() cannot be used on {}", other.type_name()))),
            }
        }

        // ---- Hash read ----
        "keys" => {
            let entries = as_hash_handle("keys", receiver)?;
            Ok(Value::new_list(entries.borrow().keys().map(|k| Value::Str(k.clone())).collect()))
        }
        "values" => {
            let entries = as_hash_handle("values", receiver)?;
            Ok(Value::new_list(entries.borrow().values().cloned().collect()))
        }
        "pairs" => {
            let entries = as_hash_handle("pairs", receiver)?;
            Ok(Value::new_list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::new_list(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            ))
        }

        // ---- Hash write ----
        "wipe" => {
            expect_arity("wipe", args, 0)?;
            as_hash_handle("wipe", receiver)?.borrow_mut().clear();
            Ok(receiver.clone())
        }
        "take" => {
            expect_arity("take", args, 1)?;
            let entries = as_hash_handle("take", receiver)?;
            let key = as_str("take", &args[0])?.to_string();
            let value = entries
                .borrow_mut()
                .shift_remove(&key)
                .ok_or_else(|| LError::key(format!("key '{}' not found in hash", key)))?;
            Ok(Value::new_list(vec![Value::Str(key), value]))
        }
        "take_last" => {
            expect_arity("take_last", args, 0)?;
            let entries = as_hash_handle("take_last", receiver)?;
            let (key, value) = entries.borrow_mut().pop().ok_or_else(|| LError::key("hash is empty"))?;
            Ok(Value::new_list(vec![Value::Str(key), value]))
        }
        "ensure" => {
            expect_arity("ensure", args, 2)?;
            let entries = as_hash_handle("ensure", receiver)?;
            let key = as_str("ensure", &args[0])?.to_string();
            let mut entries_mut = entries.borrow_mut();
            let value = entries_mut.entry(key).or_insert_with(|| args[1].clone());
            Ok(value.clone())
        }

        other => Err(LError::name(format!("unknown method '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferOutputSink, QueueInputSink};

    fn run_ok(src: &str) -> String {
        let mut out = BufferOutputSink::new();
        let mut input = QueueInputSink::new(Vec::<String>::new());
        run(src, &mut out, &mut input).unwrap_or_else(|e| panic!("run failed for {:?}: {}", src, e));
        out.into_contents()
    }

    fn run_err(src: &str) -> LError {
        let mut out = BufferOutputSink::new();
        let mut input = QueueInputSink::new(Vec::<String>::new());
        run(src, &mut out, &mut input).unwrap_err()
    }

    #[test]
    fn simple_arithmetic_and_say() {
        assert_eq!(run_ok("x: int = 5; say(x + 1);"), "6\n");
    }

    #[test]
    fn function_call_and_return() {
        assert_eq!(run_ok("fn sq(n:int) -> int { return n * n; } say(sq(7));"), "49\n");
    }

    #[test]
    fn list_order_method() {
        assert_eq!(run_ok("xs: list = [3,1,2]; xs.order(); say(xs);"), "[1, 2, 3]\n");
    }

    #[test]
    fn hash_ensure_method() {
        assert_eq!(run_ok("h: hash = {\"a\":1}; h.ensure(\"b\", 9); say(h[\"b\"]);"), "9\n");
    }

    #[test]
    fn watch_emits_on_assignment() {
        assert_eq!(run_ok("x: int = 0; watch x; x = 7;"), "WATCH: x changed to 7 (in global)\n");
    }

    #[test]
    fn use_mut_writes_through_outer_binding() {
        assert_eq!(
            run_ok("x: int = 1; fn f() -> void { use mut x; x = 9; } f(); say(x);"),
            "9\n"
        );
    }

    #[test]
    fn use_without_mut_rejects_write() {
        let err = run_err("x: int = 1; fn f() -> void { use x; x = 9; } f();");
        assert!(matches!(err, LError::Name(_)));
    }

    #[test]
    fn import_visible_through_nested_block_in_function() {
        assert_eq!(
            run_ok("x: int = 1; fn f() -> void { use mut x; if true { x = 42; } } f(); say(x);"),
            "42\n"
        );
    }

    #[test]
    fn for_loop_respects_inclusive_and_exclusive_ranges() {
        assert_eq!(run_ok("total: int = 0; for i in 1 .. 3 { total = total + i; } say(total);"), "6\n");
        assert_eq!(run_ok("total: int = 0; for i in 1 ... 3 { total = total + i; } say(total);"), "3\n");
    }

    #[test]
    fn foreach_over_list() {
        assert_eq!(
            run_ok("total: int = 0; xs: list = [1,2,3]; foreach n : int in xs { total = total + n; } say(total);"),
            "6\n"
        );
    }

    #[test]
    fn break_and_continue_affect_innermost_loop_only() {
        assert_eq!(
            run_ok(
                "total: int = 0; for i in 1 .. 5 { if i == 3 { continue; } if i == 5 { break; } total = total + i; } say(total);"
            ),
            "6\n"
        );
    }

    #[test]
    fn string_interpolation_and_method_chain() {
        assert_eq!(run_ok("name: str = \"ada\"; say(\"hi ${name}!\".upperCase());"), "HI ADA!\n");
    }

    #[test]
    fn immutable_import_does_not_leak_list_mutation() {
        assert_eq!(
            run_ok("xs: list = [1]; fn f() -> void { use xs; xs.push(2); } f(); say(xs.length());"),
            "1\n"
        );
    }

    #[test]
    fn return_outside_function_is_a_control_error() {
        let err = run_err("return 1;");
        assert!(matches!(err, LError::Control(_)));
    }

    #[test]
    fn division_promotes_to_float_when_either_operand_is_float() {
        assert_eq!(run_ok("say(5 / 2);"), "2\n");
        assert_eq!(run_ok("say(5.0 / 2);"), "2.5\n");
    }

    #[test]
    fn void_function_rejects_an_explicit_returned_value() {
        let err = run_err("fn f() -> void { return 1; } f();");
        assert!(matches!(err, LError::Type(_)));
    }

    #[test]
    fn void_function_allows_bare_return_and_fall_through() {
        assert_eq!(run_ok("fn f() -> void { return; } f(); say(1);"), "1\n");
        assert_eq!(run_ok("fn g() -> void { } g(); say(2);"), "2\n");
    }

    #[test]
    fn non_void_function_must_return_a_value() {
        let err = run_err("fn f() -> int { } f();");
        assert!(matches!(err, LError::Type(_)));
    }
}
