// ABOUTME: Runtime value representation with reference semantics for containers

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type ListHandle = Rc<RefCell<Vec<Value>>>;
pub type HashHandle = Rc<RefCell<IndexMap<String, Value>>>;

/// `Int/Float/Bool/Str` carry value semantics (cloning a `Value` copies the
/// payload); `List`/`Hash` wrap a shared, interior-mutable handle, so cloning
/// the `Value` clones the handle, not the container — every clone observes
/// the same mutations. This is the reference-semantics rule the scope and
/// method-dispatch layers depend on.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(ListHandle),
    Hash(HashHandle),
}

impl Value {
    pub fn new_list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn new_hash(entries: IndexMap<String, Value>) -> Self {
        Value::Hash(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
        }
    }

    /// Truthiness per section 4.3: zero numbers, empty string/list/hash, and
    /// `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Hash(h) => !h.borrow().is_empty(),
        }
    }

    /// Recursively clones list/hash contents into fresh, independent handles.
    /// Used for `use` (immutable import) bindings, which must not alias the
    /// outer container.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::List(l) => {
                let cloned: Vec<Value> = l.borrow().iter().map(Value::deep_clone).collect();
                Value::new_list(cloned)
            }
            Value::Hash(h) => {
                let cloned: IndexMap<String, Value> = h
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect();
                Value::new_hash(cloned)
            }
            other => other.clone(),
        }
    }

    /// Structural equality: unlike-typed values compare unequal without error
    /// (section 4.3 for `==`/`!=`).
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                (*x as f64) == *y
            }
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::List(x), Value::List(y)) => {
                let xb = x.borrow();
                let yb = y.borrow();
                xb.len() == yb.len()
                    && xb.iter().zip(yb.iter()).all(|(a, b)| Value::values_equal(a, b))
            }
            (Value::Hash(x), Value::Hash(y)) => {
                let xb = x.borrow();
                let yb = y.borrow();
                xb.len() == yb.len()
                    && xb
                        .iter()
                        .all(|(k, v)| yb.get(k).is_some_and(|ov| Value::values_equal(v, ov)))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.display_in_container())?;
                }
                write!(f, "]")
            }
            Value::Hash(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v.display_in_container())?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Value {
    /// Strings are quoted when shown nested inside a list/hash display, but
    /// not when `say`-ed or interpolated directly.
    fn display_in_container(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            other => format!("{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec_rules() {
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::new_list(vec![]).is_truthy());
        assert!(Value::new_list(vec![Value::Int(1)]).is_truthy());
    }

    #[test]
    fn list_clone_shares_backing_storage() {
        let original = Value::new_list(vec![Value::Int(1)]);
        let alias = original.clone();
        if let Value::List(items) = &alias {
            items.borrow_mut().push(Value::Int(2));
        }
        if let Value::List(items) = &original {
            assert_eq!(items.borrow().len(), 2);
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn deep_clone_does_not_share_storage() {
        let original = Value::new_list(vec![Value::Int(1)]);
        let copy = original.deep_clone();
        if let Value::List(items) = &copy {
            items.borrow_mut().push(Value::Int(2));
        }
        if let Value::List(items) = &original {
            assert_eq!(items.borrow().len(), 1);
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn values_equal_treats_unlike_types_as_unequal() {
        assert!(!Value::values_equal(&Value::Int(1), &Value::Str("1".to_string())));
        assert!(Value::values_equal(&Value::Int(1), &Value::Float(1.0)));
    }

    #[test]
    fn display_quotes_strings_only_inside_containers() {
        let s = Value::Str("hi".to_string());
        assert_eq!(format!("{}", s), "hi");
        let list = Value::new_list(vec![s]);
        assert_eq!(format!("{}", list), "[\"hi\"]");
    }
}
