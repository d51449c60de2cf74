// ABOUTME: Lexically nested binding environment (the language's "Context")

use crate::ast::{FuncBody, Param, TypeAnnotation};
use crate::error::{LError, LResult};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A user-defined function. `defining_scope` is the scope active when `fn`
/// was executed; calling the function creates a fresh scope whose parent is
/// this one, not the caller's scope, so mutual recursion and self-reference
/// resolve through scope lookup the way the rest of the language does.
#[derive(Debug)]
pub struct FunctionRecord {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeAnnotation,
    pub body: FuncBody,
    pub defining_scope: Rc<Scope>,
}

#[derive(Debug)]
pub struct Scope {
    variables: RefCell<HashMap<String, Value>>,
    types: RefCell<HashMap<String, TypeAnnotation>>,
    functions: RefCell<HashMap<String, Rc<FunctionRecord>>>,
    parent: Option<Rc<Scope>>,
    pub in_loop: bool,
    pub in_function: bool,
    /// True only for the scope created at function-call entry. Lookups and
    /// assignments that fall through to here without a matching local or
    /// import must stop: crossing out of a function into its defining scope
    /// requires an explicit `use`/`use mut`. Nested if/while/for blocks
    /// inside the function body are *not* entry scopes, so names imported
    /// at the top of a function stay visible through nested blocks.
    is_function_entry: bool,
    /// Name of the enclosing function, used to label `WATCH:` lines; `None`
    /// at global scope.
    function_name: Option<String>,
    /// name -> is_mutable, recorded in whichever scope executed the `use`.
    imported_vars: RefCell<HashMap<String, bool>>,
    watched_vars: RefCell<HashSet<String>>,
}

impl Scope {
    pub fn global() -> Rc<Scope> {
        Rc::new(Scope {
            variables: RefCell::new(HashMap::new()),
            types: RefCell::new(HashMap::new()),
            functions: RefCell::new(HashMap::new()),
            parent: None,
            in_loop: false,
            in_function: false,
            is_function_entry: false,
            function_name: None,
            imported_vars: RefCell::new(HashMap::new()),
            watched_vars: RefCell::new(HashSet::new()),
        })
    }

    /// A plain nested block (if/while/for/foreach body): inherits `in_loop`
    /// and `in_function` from the parent rather than resetting them.
    pub fn child_block(parent: &Rc<Scope>, in_loop: bool) -> Rc<Scope> {
        Rc::new(Scope {
            variables: RefCell::new(HashMap::new()),
            types: RefCell::new(HashMap::new()),
            functions: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
            in_loop: in_loop || parent.in_loop,
            in_function: parent.in_function,
            is_function_entry: false,
            function_name: parent.function_name.clone(),
            imported_vars: RefCell::new(HashMap::new()),
            watched_vars: RefCell::new(HashSet::new()),
        })
    }

    /// A function-call scope: resets `in_loop`, sets `in_function`, and
    /// starts a fresh (empty) import table.
    pub fn child_function(parent: &Rc<Scope>, function_name: String) -> Rc<Scope> {
        Rc::new(Scope {
            variables: RefCell::new(HashMap::new()),
            types: RefCell::new(HashMap::new()),
            functions: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
            in_loop: false,
            in_function: true,
            is_function_entry: true,
            function_name: Some(function_name),
            imported_vars: RefCell::new(HashMap::new()),
            watched_vars: RefCell::new(HashSet::new()),
        })
    }

    pub fn current_function_label(&self) -> String {
        match &self.function_name {
            Some(name) if self.in_function => name.clone(),
            _ => "global".to_string(),
        }
    }

    fn has_local(&self, name: &str) -> bool {
        self.variables.borrow().contains_key(name)
    }

    /// Finds the nearest ancestor (starting at `self`) owning `name` as a
    /// true local, ignoring import bookkeeping entirely. Used to resolve
    /// where an import or a mutable write-through should actually land.
    fn find_owner(self: &Rc<Self>, name: &str) -> Option<Rc<Scope>> {
        let mut cur = Some(Rc::clone(self));
        while let Some(scope) = cur {
            if scope.has_local(name) {
                return Some(scope);
            }
            cur = scope.parent.clone();
        }
        None
    }

    fn find_owner_through_parent(self: &Rc<Self>, name: &str) -> Option<Rc<Scope>> {
        self.parent.as_ref().and_then(|p| p.find_owner(name))
    }

    /// Declares `name` in this scope. Redeclaration with an existing
    /// declared type in the same scope is an error.
    pub fn define(&self, name: &str, value: Value, declared_type: Option<TypeAnnotation>) -> LResult<()> {
        if self.types.borrow().contains_key(name) {
            return Err(LError::name(format!("'{}' already declared in this scope", name)));
        }
        if let Some(ty) = &declared_type {
            self.types.borrow_mut().insert(name.to_string(), ty.clone());
        }
        self.variables.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn check_declared_type(&self, name: &str, value: &Value) -> LResult<()> {
        if let Some(ty) = self.types.borrow().get(name) {
            if !type_matches(ty, value) {
                return Err(LError::type_mismatch(format!(
                    "cannot assign {} to {} variable '{}'",
                    value.type_name(),
                    ty.name(),
                    name
                )));
            }
        }
        Ok(())
    }

    /// Assigns to an existing binding. Checks this scope's own import
    /// bookkeeping first (so an immutable import raises immediately rather
    /// than silently rewriting its local deep copy), then a true local,
    /// then either stops at a function boundary or continues up the chain.
    pub fn assign(self: &Rc<Self>, name: &str, value: Value) -> LResult<()> {
        if let Some(mutable) = self.imported_vars.borrow().get(name).copied() {
            if !mutable {
                return Err(LError::name(format!("cannot modify immutable import '{}'", name)));
            }
            let owner = self
                .find_owner_through_parent(name)
                .ok_or_else(|| LError::name(format!("'{}' is not defined", name)))?;
            return owner.assign(name, value);
        }
        if self.has_local(name) {
            self.check_declared_type(name, &value)?;
            self.variables.borrow_mut().insert(name.to_string(), value);
            return Ok(());
        }
        if self.is_function_entry {
            return Err(LError::name(format!("'{}' used without use statement", name)));
        }
        if let Some(parent) = &self.parent {
            return parent.assign(name, value);
        }
        Err(LError::name(format!("'{}' is not defined", name)))
    }

    /// Looks up a variable's current value, honoring import visibility rules.
    pub fn lookup(self: &Rc<Self>, name: &str) -> LResult<Value> {
        if let Some(v) = self.variables.borrow().get(name) {
            return Ok(v.clone());
        }
        if let Some(mutable) = self.imported_vars.borrow().get(name).copied() {
            debug_assert!(mutable, "immutable imports are copied into `variables` at import time");
            let owner = self
                .find_owner_through_parent(name)
                .ok_or_else(|| LError::name(format!("'{}' is not defined", name)))?;
            return owner.lookup(name);
        }
        if self.is_function_entry {
            return Err(LError::name(format!("'{}' used without use statement", name)));
        }
        if let Some(parent) = &self.parent {
            return parent.lookup(name);
        }
        Err(LError::name(format!("'{}' is not defined", name)))
    }

    /// Records an import. `use` (immutable) deep-copies the outer value into
    /// this scope's own variables immediately; `use mut` records only the
    /// permission to write through, leaving the value in its owning scope.
    pub fn import(self: &Rc<Self>, name: &str, mutable: bool) -> LResult<()> {
        if !self.in_function {
            return Err(LError::name("use statement only legal inside a function".to_string()));
        }
        if self.imported_vars.borrow().contains_key(name) || self.has_local(name) {
            return Err(LError::name(format!("'{}' already imported", name)));
        }
        let owner = self
            .find_owner_through_parent(name)
            .ok_or_else(|| LError::name(format!("'{}' is not defined in any enclosing scope", name)))?;
        self.imported_vars.borrow_mut().insert(name.to_string(), mutable);
        if !mutable {
            let value = owner.lookup(name)?;
            self.variables.borrow_mut().insert(name.to_string(), value.deep_clone());
        }
        Ok(())
    }

    /// Marks `name` as watched in this scope. Name must already resolve.
    pub fn watch(self: &Rc<Self>, name: &str) -> LResult<()> {
        let _ = self.lookup(name)?;
        self.watched_vars.borrow_mut().insert(name.to_string());
        Ok(())
    }

    /// Walks from `self` up to the root checking whether `name` is watched
    /// anywhere in the chain (an ancestor's watch catches mutation from any
    /// descendant scope).
    pub fn is_watched(self: &Rc<Self>, name: &str) -> bool {
        let mut cur = Some(Rc::clone(self));
        while let Some(scope) = cur {
            if scope.watched_vars.borrow().contains(name) {
                return true;
            }
            cur = scope.parent.clone();
        }
        false
    }

    pub fn define_function(&self, record: FunctionRecord) {
        self.functions.borrow_mut().insert(record.name.clone(), Rc::new(record));
    }

    pub fn lookup_function(self: &Rc<Self>, name: &str) -> Option<Rc<FunctionRecord>> {
        if let Some(f) = self.functions.borrow().get(name) {
            return Some(Rc::clone(f));
        }
        self.parent.as_ref().and_then(|p| p.lookup_function(name))
    }

    /// Whether `name` is an outer binding reachable only via `use mut` from
    /// the current scope (used by the method-dispatch mutability gate). A
    /// `use` (immutable) import is deep-copied into this scope's own
    /// `variables` at import time, so it is indistinguishable from an
    /// ordinary local here and mutating the copy is unrestricted — only a
    /// `use mut` entry, which never gets a local copy, is reported.
    pub fn import_mutability(self: &Rc<Self>, name: &str) -> Option<bool> {
        if self.has_local(name) {
            return None;
        }
        if let Some(m) = self.imported_vars.borrow().get(name).copied() {
            return Some(m);
        }
        if self.is_function_entry {
            return None;
        }
        self.parent.as_ref().and_then(|p| p.import_mutability(name))
    }
}

pub fn type_matches(ty: &TypeAnnotation, value: &Value) -> bool {
    match ty {
        TypeAnnotation::Dynamic => true,
        TypeAnnotation::Int => matches!(value, Value::Int(_)),
        TypeAnnotation::Float => matches!(value, Value::Float(_)),
        TypeAnnotation::Str => matches!(value, Value::Str(_)),
        TypeAnnotation::Bool => matches!(value, Value::Bool(_)),
        TypeAnnotation::List => matches!(value, Value::List(_)),
        TypeAnnotation::Hash => matches!(value, Value::Hash(_)),
        TypeAnnotation::Void => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_rejects_redeclaration_with_type() {
        let global = Scope::global();
        global.define("x", Value::Int(1), Some(TypeAnnotation::Int)).unwrap();
        let err = global.define("x", Value::Int(2), Some(TypeAnnotation::Int)).unwrap_err();
        assert!(matches!(err, LError::Name(_)));
    }

    #[test]
    fn assignment_enforces_declared_type() {
        let global = Scope::global();
        global.define("x", Value::Int(1), Some(TypeAnnotation::Int)).unwrap();
        let err = global.assign("x", Value::Str("oops".to_string())).unwrap_err();
        assert!(matches!(err, LError::Type(_)));
    }

    #[test]
    fn function_scope_requires_use_statement_for_outer_names() {
        let global = Scope::global();
        global.define("x", Value::Int(1), None).unwrap();
        let func = Scope::child_function(&global, "f".to_string());
        let err = func.lookup("x").unwrap_err();
        assert!(matches!(err, LError::Name(_)));
    }

    #[test]
    fn use_mut_writes_through_to_outer_binding() {
        let global = Scope::global();
        global.define("x", Value::Int(1), None).unwrap();
        let func = Scope::child_function(&global, "f".to_string());
        func.import("x", true).unwrap();
        func.assign("x", Value::Int(9)).unwrap();
        assert!(matches!(global.lookup("x").unwrap(), Value::Int(9)));
    }

    #[test]
    fn use_without_mut_rejects_writes() {
        let global = Scope::global();
        global.define("x", Value::Int(1), None).unwrap();
        let func = Scope::child_function(&global, "f".to_string());
        func.import("x", false).unwrap();
        let err = func.assign("x", Value::Int(9)).unwrap_err();
        assert!(matches!(err, LError::Name(_)));
        assert!(matches!(global.lookup("x").unwrap(), Value::Int(1)));
    }

    #[test]
    fn immutable_import_deep_copies_containers() {
        let global = Scope::global();
        global.define("xs", Value::new_list(vec![Value::Int(1)]), None).unwrap();
        let func = Scope::child_function(&global, "f".to_string());
        func.import("xs", false).unwrap();
        if let Value::List(items) = func.lookup("xs").unwrap() {
            items.borrow_mut().push(Value::Int(2));
        }
        if let Value::List(items) = global.lookup("xs").unwrap() {
            assert_eq!(items.borrow().len(), 1);
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn watch_is_visible_from_descendant_scopes() {
        let global = Scope::global();
        global.define("x", Value::Int(1), None).unwrap();
        global.watch("x").unwrap();
        let block = Scope::child_block(&global, false);
        assert!(block.is_watched("x"));
    }

    #[test]
    fn import_is_visible_through_nested_blocks_in_the_same_function() {
        let global = Scope::global();
        global.define("x", Value::Int(1), None).unwrap();
        let func = Scope::child_function(&global, "f".to_string());
        func.import("x", true).unwrap();
        let inner_block = Scope::child_block(&func, false);
        let nested_block = Scope::child_block(&inner_block, false);
        nested_block.assign("x", Value::Int(42)).unwrap();
        assert!(matches!(global.lookup("x").unwrap(), Value::Int(42)));
        assert!(matches!(nested_block.lookup("x").unwrap(), Value::Int(42)));
    }

    #[test]
    fn nested_block_without_import_still_raises_at_function_boundary() {
        let global = Scope::global();
        global.define("x", Value::Int(1), None).unwrap();
        let func = Scope::child_function(&global, "f".to_string());
        let nested_block = Scope::child_block(&func, false);
        let err = nested_block.lookup("x").unwrap_err();
        assert!(matches!(err, LError::Name(_)));
    }
}
