//! Loadable module image
//!
//! An image is a self-contained binary describing one compiled assembly:
//! - 16-byte header (magic, version, kind, checksum, entry point)
//! - string heap
//! - assembly references and member references
//! - type, field and method tables
//! - code blob
//!
//! All integers are little-endian.

mod checksum;
mod reader;
mod writer;

pub use checksum::{calculate_checksum, update_checksum, verify_checksum};
pub use writer::ImageBuilder;

use std::fmt;

/// Image magic bytes
pub const MAGIC: [u8; 4] = *b"MSIM";
/// Current format version
pub const FORMAT_VERSION: u16 = 1;
/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 16;
/// Entry point value meaning "no entry point"
pub const NO_ENTRY_POINT: u32 = u32::MAX;
/// Bit set on call operands that index the member reference table
pub const EXTERNAL_TOKEN: u32 = 0x8000_0000;

/// Member flags
pub mod flags {
    pub const PUBLIC: u8 = 0x01;
    pub const STATIC: u8 = 0x02;
    /// Method implemented natively by the host
    pub const INTRINSIC: u8 = 0x04;
}

/// What kind of module an image holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageKind {
    #[default]
    Library,
    Executable,
}

impl ImageKind {
    pub fn code(self) -> u8 {
        match self {
            ImageKind::Library => 0,
            ImageKind::Executable => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ImageKind::Library),
            1 => Some(ImageKind::Executable),
            _ => None,
        }
    }
}

/// Type signature as stored in an image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    Void,
    Bool,
    Int32,
    String,
    Object,
    Array(Box<TypeSig>),
    /// A class, by full name
    Class(String),
}

impl TypeSig {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            TypeSig::Void => 0,
            TypeSig::Bool => 1,
            TypeSig::Int32 => 2,
            TypeSig::String => 3,
            TypeSig::Object => 4,
            TypeSig::Array(_) => 5,
            TypeSig::Class(_) => 6,
        }
    }

    /// Runtime name, e.g. `System.Int32[]`
    pub fn runtime_name(&self) -> String {
        match self {
            TypeSig::Void => "System.Void".to_string(),
            TypeSig::Bool => "System.Boolean".to_string(),
            TypeSig::Int32 => "System.Int32".to_string(),
            TypeSig::String => "System.String".to_string(),
            TypeSig::Object => "System.Object".to_string(),
            TypeSig::Array(element) => format!("{}[]", element.runtime_name()),
            TypeSig::Class(name) => name.clone(),
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Bool => write!(f, "bool"),
            TypeSig::Int32 => write!(f, "int"),
            TypeSig::String => write!(f, "string"),
            TypeSig::Object => write!(f, "object"),
            TypeSig::Array(element) => write!(f, "{}[]", element),
            TypeSig::Class(name) => write!(f, "{}", name),
        }
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub flags: u8,
    pub ty: TypeSig,
}

impl FieldDef {
    pub fn is_public(&self) -> bool {
        self.flags & flags::PUBLIC != 0
    }

    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub flags: u8,
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
    pub locals: Vec<TypeSig>,
    pub max_stack: u16,
    /// Offset of the body in the code blob
    pub code_offset: u32,
    pub code_len: u32,
}

impl MethodDef {
    pub fn is_public(&self) -> bool {
        self.flags & flags::PUBLIC != 0
    }

    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }

    pub fn is_intrinsic(&self) -> bool {
        self.flags & flags::INTRINSIC != 0
    }

    /// `Name(int, string)` form used in messages
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Type definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Full name including namespace
    pub name: String,
    pub flags: u8,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    /// Index into `methods` of the static field initializer
    pub initializer: Option<u16>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, flags: u8) -> Self {
        Self {
            name: name.into(),
            flags,
            fields: Vec::new(),
            methods: Vec::new(),
            initializer: None,
        }
    }

    pub fn is_public(&self) -> bool {
        self.flags & flags::PUBLIC != 0
    }

    /// Namespace part of the full name (empty for the global namespace)
    pub fn namespace(&self) -> &str {
        self.name.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    /// Simple name without namespace
    pub fn simple_name(&self) -> &str {
        self.name.rsplit_once('.').map(|(_, n)| n).unwrap_or(&self.name)
    }

    pub fn find_method(&self, name: &str, params: &[TypeSig]) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.params == params)
    }
}

/// Reference to a method defined in another assembly
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub assembly: String,
    pub type_name: String,
    pub name: String,
    pub params: Vec<TypeSig>,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(
            f,
            "[{}]{}::{}({})",
            self.assembly,
            self.type_name,
            self.name,
            params.join(", ")
        )
    }
}

/// Encoded reference to a method or field inside the same image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalToken {
    pub type_index: u16,
    pub member_index: u16,
}

impl LocalToken {
    pub fn new(type_index: u16, member_index: u16) -> Self {
        Self {
            type_index,
            member_index,
        }
    }

    pub fn encode(self) -> u32 {
        ((self.type_index as u32) << 16) | self.member_index as u32
    }

    pub fn decode(token: u32) -> Self {
        Self {
            type_index: ((token >> 16) & 0x7FFF) as u16,
            member_index: (token & 0xFFFF) as u16,
        }
    }
}

/// A decoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub name: String,
    pub kind: ImageKind,
    pub entry_point: Option<LocalToken>,
    /// String heap; `ldstr` operands index into it
    pub strings: Vec<String>,
    pub references: Vec<String>,
    pub member_refs: Vec<MemberRef>,
    pub types: Vec<TypeDef>,
    pub code: Vec<u8>,
}

impl Image {
    /// Decode and verify an image
    pub fn from_bytes(bytes: &[u8]) -> crate::ImageResult<Self> {
        reader::read_image(bytes)
    }

    /// Encode this image, including the checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        writer::write_image(self)
    }

    pub fn find_type(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|t| t.name == name)
    }

    pub fn method(&self, token: LocalToken) -> Option<&MethodDef> {
        self.types
            .get(token.type_index as usize)?
            .methods
            .get(token.member_index as usize)
    }

    pub fn field(&self, token: LocalToken) -> Option<&FieldDef> {
        self.types
            .get(token.type_index as usize)?
            .fields
            .get(token.member_index as usize)
    }

    /// Body bytes of a method
    pub fn method_code(&self, method: &MethodDef) -> &[u8] {
        let start = method.code_offset as usize;
        let end = start + method.code_len as usize;
        &self.code[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_token_encoding() {
        let token = LocalToken::new(3, 17);
        assert_eq!(token.encode(), 0x0003_0011);
        assert_eq!(LocalToken::decode(token.encode()), token);
        assert_eq!(token.encode() & EXTERNAL_TOKEN, 0);
    }

    #[test]
    fn test_type_sig_names() {
        let sig = TypeSig::Array(Box::new(TypeSig::String));
        assert_eq!(sig.to_string(), "string[]");
        assert_eq!(sig.runtime_name(), "System.String[]");
    }

    #[test]
    fn test_type_def_names() {
        let ty = TypeDef::new("Demo.Geometry.Shapes", flags::PUBLIC);
        assert_eq!(ty.namespace(), "Demo.Geometry");
        assert_eq!(ty.simple_name(), "Shapes");
        assert!(ty.is_public());

        let global = TypeDef::new("Program", 0);
        assert_eq!(global.namespace(), "");
        assert_eq!(global.simple_name(), "Program");
    }
}
