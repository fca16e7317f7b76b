use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::lang::value::Value;

/// One binding on the tree-walking path. `constant` marks names bound with
/// the bare `<-` form, which the evaluator refuses to rebind.
#[derive(Debug, Clone)]
pub struct Field {
    pub constant: bool,
    pub value: Value,
}

/// A lexical environment for the tree-walking evaluator.
///
/// Environments are shared (`Rc<RefCell<..>>`) because a closure keeps the
/// scope it was created in alive, and a recursive function's scope refers
/// back to the function itself.
#[derive(Debug, Default)]
pub struct Environment {
    store: HashMap<String, Field>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn enclosed(outer: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: HashMap::new(),
            outer: Some(outer),
        }))
    }

    pub fn get(&self, name: &str) -> Option<Field> {
        match self.store.get(name) {
            Some(field) => Some(field.clone()),
            None => self
                .outer
                .as_ref()
                .and_then(|outer| outer.borrow().get(name)),
        }
    }

    pub fn set(&mut self, name: &str, constant: bool, value: Value) {
        self.store.insert(
            name.to_string(),
            Field { constant, value },
        );
    }
}
