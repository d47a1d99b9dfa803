//! Local variable scopes

use std::collections::HashMap;

use super::bound::LocalId;

/// A block scope mapping names to locals
#[derive(Debug, Default)]
pub struct Scope {
    symbols: HashMap<String, LocalId>,
    parent: Option<Box<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a local; on a clash returns the local already using the name
    pub fn define(&mut self, name: &str, local: LocalId) -> Result<(), LocalId> {
        if let Some(existing) = self.symbols.get(name) {
            return Err(*existing);
        }
        self.symbols.insert(name.to_string(), local);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<LocalId> {
        if let Some(local) = self.symbols.get(name) {
            Some(*local)
        } else if let Some(parent) = &self.parent {
            parent.lookup(name)
        } else {
            None
        }
    }

    pub fn lookup_local(&self, name: &str) -> Option<LocalId> {
        self.symbols.get(name).copied()
    }

    /// Take the parent scope, replacing self with the parent
    pub fn pop_to_parent(&mut self) -> bool {
        if let Some(parent) = self.parent.take() {
            *self = *parent;
            true
        } else {
            false
        }
    }

    /// Push a new child scope
    pub fn push_child(&mut self) {
        let old_scope = std::mem::take(self);
        self.parent = Some(Box::new(old_scope));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_scopes() {
        let mut scope = Scope::new();
        scope.define("x", 0).unwrap();
        scope.push_child();
        scope.define("y", 1).unwrap();
        assert_eq!(scope.lookup("x"), Some(0));
        assert_eq!(scope.lookup_local("x"), None);
        assert_eq!(scope.define("y", 2), Err(1));
        assert!(scope.pop_to_parent());
        assert_eq!(scope.lookup("y"), None);
        assert!(!scope.pop_to_parent());
    }
}
