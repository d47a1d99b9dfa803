//! Runtime values

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::image::TypeSig;

/// A value on the evaluation stack, in a local, field or array slot
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Str(Arc<str>),
    Array(ArrayRef),
}

impl Value {
    /// Default value of a slot of the given type
    pub fn default_for(sig: &TypeSig) -> Self {
        match sig {
            TypeSig::Bool => Value::Bool(false),
            TypeSig::Int32 => Value::Int(0),
            _ => Value::Null,
        }
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value may be stored in a slot of the given type
    pub fn conforms_to(&self, sig: &TypeSig) -> bool {
        match (self, sig) {
            (_, TypeSig::Object) => true,
            (Value::Bool(_), TypeSig::Bool) => true,
            (Value::Int(_), TypeSig::Int32) => true,
            (Value::Str(_) | Value::Null, TypeSig::String) => true,
            (Value::Null, TypeSig::Array(_) | TypeSig::Class(_)) => true,
            (Value::Array(array), TypeSig::Array(element)) => array.element_type() == &**element,
            _ => false,
        }
    }

    /// Runtime type name, as `GetType().FullName` would print it
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => TypeSig::Bool.runtime_name(),
            Value::Int(_) => TypeSig::Int32.runtime_name(),
            Value::Str(_) => TypeSig::String.runtime_name(),
            Value::Array(array) => format!("{}[]", array.element_type().runtime_name()),
        }
    }
}

/// `ToString()` semantics
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(_) => write!(f, "{}", self.type_name()),
        }
    }
}

/// Value equality for scalars and strings, reference equality for arrays
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

/// Shared, mutable, fixed-length array
#[derive(Debug, Clone)]
pub struct ArrayRef {
    element: Arc<TypeSig>,
    items: Arc<Mutex<Vec<Value>>>,
}

impl ArrayRef {
    /// New array filled with the element type's default value
    pub fn new(element: TypeSig, length: usize) -> Self {
        let fill = Value::default_for(&element);
        Self {
            element: Arc::new(element),
            items: Arc::new(Mutex::new(vec![fill; length])),
        }
    }

    pub fn from_values(element: TypeSig, values: Vec<Value>) -> Self {
        Self {
            element: Arc::new(element),
            items: Arc::new(Mutex::new(values)),
        }
    }

    pub fn element_type(&self) -> &TypeSig {
        &self.element
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        // A poisoned array only means another thread panicked mid-store.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.lock().get(index).cloned()
    }

    /// Store a value; returns false when out of bounds
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.lock().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.lock().clone()
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_semantics() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Null.to_string(), "");
        let array = ArrayRef::new(TypeSig::Int32, 3);
        assert_eq!(Value::Array(array).to_string(), "System.Int32[]");
    }

    #[test]
    fn test_array_defaults_and_bounds() {
        let array = ArrayRef::new(TypeSig::Bool, 2);
        assert_eq!(array.get(1), Some(Value::Bool(false)));
        assert!(array.set(0, Value::Bool(true)));
        assert!(!array.set(2, Value::Bool(true)));
        assert_eq!(array.to_vec(), vec![Value::Bool(true), Value::Bool(false)]);
    }

    #[test]
    fn test_conformance() {
        assert!(Value::Int(1).conforms_to(&TypeSig::Object));
        assert!(Value::Null.conforms_to(&TypeSig::String));
        assert!(!Value::Null.conforms_to(&TypeSig::Int32));
        let strings = Value::Array(ArrayRef::new(TypeSig::String, 0));
        assert!(strings.conforms_to(&TypeSig::Array(Box::new(TypeSig::String))));
        assert!(!strings.conforms_to(&TypeSig::Array(Box::new(TypeSig::Int32))));
    }

    #[test]
    fn test_array_equality_is_by_reference() {
        let a = ArrayRef::new(TypeSig::Int32, 1);
        let b = ArrayRef::new(TypeSig::Int32, 1);
        assert_eq!(Value::Array(a.clone()), Value::Array(a.clone()));
        assert_ne!(Value::Array(a), Value::Array(b));
    }
}
