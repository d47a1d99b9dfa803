//! Semantic types and conversions

use msvm::TypeSig;

/// Index of a type in the symbol table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Semantic type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    Bool,
    Int,
    String,
    Object,
    /// Type of the `null` literal
    Null,
    Array(Box<Ty>),
    Class(TypeId),
    /// Result of a failed binding; converts silently to anything
    Error,
}

/// How a value of one type becomes another
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Conversion {
    Identity,
    Implicit,
    /// Boxing or widening to `object`
    ToObject,
    None,
}

impl Conversion {
    pub fn exists(self) -> bool {
        self != Conversion::None
    }

    /// Overload resolution cost; lower is better
    pub fn cost(self) -> u32 {
        match self {
            Conversion::Identity => 0,
            Conversion::Implicit => 1,
            Conversion::ToObject => 2,
            Conversion::None => u32::MAX,
        }
    }
}

impl Ty {
    pub fn is_error(&self) -> bool {
        matches!(self, Ty::Error)
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self, Ty::Int | Ty::Bool)
    }

    pub fn is_reference_type(&self) -> bool {
        matches!(self, Ty::String | Ty::Object | Ty::Array(_) | Ty::Class(_))
    }

    /// Classify the implicit conversion from `self` to `target`
    pub fn conversion_to(&self, target: &Ty) -> Conversion {
        if self == target || self.is_error() || target.is_error() {
            return Conversion::Identity;
        }
        match (self, target) {
            (Ty::Void, _) | (_, Ty::Void | Ty::Null) => Conversion::None,
            (Ty::Null, t) if t.is_reference_type() => Conversion::Implicit,
            (_, Ty::Object) => Conversion::ToObject,
            _ => Conversion::None,
        }
    }

    /// Image signature; `class_name` resolves user types to full names
    pub fn to_sig(&self, class_name: &dyn Fn(TypeId) -> String) -> TypeSig {
        match self {
            Ty::Void => TypeSig::Void,
            Ty::Bool => TypeSig::Bool,
            Ty::Int => TypeSig::Int32,
            Ty::String => TypeSig::String,
            Ty::Object | Ty::Null | Ty::Error => TypeSig::Object,
            Ty::Array(element) => TypeSig::Array(Box::new(element.to_sig(class_name))),
            Ty::Class(id) => TypeSig::Class(class_name(*id)),
        }
    }
}

/// Constant value of a bound expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    Int(i32),
    Bool(bool),
    Str(String),
    Null,
}

impl ConstValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text used when a constant is concatenated into a string
    pub fn concat_text(&self) -> String {
        match self {
            ConstValue::Int(n) => n.to_string(),
            ConstValue::Bool(true) => "True".to_string(),
            ConstValue::Bool(false) => "False".to_string(),
            ConstValue::Str(s) => s.clone(),
            ConstValue::Null => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Ty::Int.conversion_to(&Ty::Int), Conversion::Identity);
        assert_eq!(Ty::Int.conversion_to(&Ty::Object), Conversion::ToObject);
        assert_eq!(Ty::Null.conversion_to(&Ty::String), Conversion::Implicit);
        assert_eq!(Ty::Null.conversion_to(&Ty::Int), Conversion::None);
        assert_eq!(Ty::String.conversion_to(&Ty::Int), Conversion::None);
        assert_eq!(Ty::Void.conversion_to(&Ty::Object), Conversion::None);
        assert_eq!(Ty::Error.conversion_to(&Ty::Bool), Conversion::Identity);
        assert!(
            Ty::Array(Box::new(Ty::Int)).conversion_to(&Ty::Array(Box::new(Ty::String)))
                == Conversion::None
        );
    }

    #[test]
    fn test_signatures() {
        let names = |id: TypeId| format!("T{}", id.0);
        assert_eq!(
            Ty::Array(Box::new(Ty::String)).to_sig(&names),
            TypeSig::Array(Box::new(TypeSig::String))
        );
        assert_eq!(Ty::Class(TypeId(3)).to_sig(&names), TypeSig::Class("T3".to_string()));
    }

    #[test]
    fn test_concat_text() {
        assert_eq!(ConstValue::Bool(true).concat_text(), "True");
        assert_eq!(ConstValue::Int(-4).concat_text(), "-4");
    }
}
