//! Image builder and encoder

use byteorder::{ByteOrder, LittleEndian};
use string_interner::{DefaultStringInterner, DefaultSymbol, Symbol};

use super::{
    update_checksum, Image, ImageKind, LocalToken, MemberRef, TypeDef, TypeSig, EXTERNAL_TOKEN,
    FORMAT_VERSION, HEADER_SIZE, MAGIC, NO_ENTRY_POINT,
};

/// Incrementally assembles an [`Image`]
///
/// Strings interned through the builder keep their heap index in the
/// finished image, so `ldstr` operands can be emitted before the image
/// is complete.
pub struct ImageBuilder {
    name: String,
    kind: ImageKind,
    entry_point: Option<LocalToken>,
    strings: DefaultStringInterner,
    references: Vec<String>,
    member_refs: Vec<MemberRef>,
    types: Vec<TypeDef>,
    code: Vec<u8>,
}

impl ImageBuilder {
    pub fn new(name: impl Into<String>, kind: ImageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            entry_point: None,
            strings: DefaultStringInterner::default(),
            references: Vec::new(),
            member_refs: Vec::new(),
            types: Vec::new(),
            code: Vec::new(),
        }
    }

    /// Intern a string literal and return its heap index
    pub fn intern(&mut self, s: &str) -> u32 {
        self.strings.get_or_intern(s).to_usize() as u32
    }

    /// Record a referenced assembly
    pub fn add_reference(&mut self, assembly: &str) {
        if !self.references.iter().any(|r| r == assembly) {
            self.references.push(assembly.to_string());
        }
    }

    /// Record a cross-assembly method reference and return its call token
    pub fn member_ref(&mut self, member: MemberRef) -> u32 {
        self.add_reference(&member.assembly);
        let index = match self.member_refs.iter().position(|m| *m == member) {
            Some(index) => index,
            None => {
                self.member_refs.push(member);
                self.member_refs.len() - 1
            }
        };
        EXTERNAL_TOKEN | index as u32
    }

    /// Add a type definition and return its index
    pub fn add_type(&mut self, ty: TypeDef) -> u16 {
        self.types.push(ty);
        (self.types.len() - 1) as u16
    }

    pub fn type_mut(&mut self, index: u16) -> Option<&mut TypeDef> {
        self.types.get_mut(index as usize)
    }

    /// Append a method body to the code blob and return its offset
    pub fn append_code(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.code.len() as u32;
        self.code.extend_from_slice(bytes);
        offset
    }

    pub fn set_entry_point(&mut self, token: LocalToken) {
        self.entry_point = Some(token);
    }

    pub fn finish(self) -> Image {
        let strings = (0..self.strings.len())
            .filter_map(|i| DefaultSymbol::try_from_usize(i))
            .filter_map(|sym| self.strings.resolve(sym))
            .map(str::to_string)
            .collect();

        Image {
            name: self.name,
            kind: self.kind,
            entry_point: self.entry_point,
            strings,
            references: self.references,
            member_refs: self.member_refs,
            types: self.types,
            code: self.code,
        }
    }
}

/// Little-endian byte sink
#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    fn u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }
}

struct TableWriter {
    strings: DefaultStringInterner,
    out: Encoder,
}

impl TableWriter {
    fn string(&mut self, s: &str) {
        let index = self.strings.get_or_intern(s).to_usize() as u32;
        self.out.u32(index);
    }

    fn sig(&mut self, sig: &TypeSig) {
        self.out.u8(sig.tag());
        match sig {
            TypeSig::Array(element) => self.sig(element),
            TypeSig::Class(name) => self.string(name),
            _ => {}
        }
    }

    fn sigs(&mut self, sigs: &[TypeSig]) {
        self.out.u16(sigs.len() as u16);
        for sig in sigs {
            self.sig(sig);
        }
    }
}

pub(super) fn write_image(image: &Image) -> Vec<u8> {
    // Seed the heap so existing string indices stay valid.
    let mut strings = DefaultStringInterner::default();
    for s in &image.strings {
        strings.get_or_intern(s.as_str());
    }

    let mut tables = TableWriter {
        strings,
        out: Encoder::default(),
    };

    tables.string(&image.name);

    tables.out.u32(image.references.len() as u32);
    for reference in &image.references {
        tables.string(reference);
    }

    tables.out.u32(image.member_refs.len() as u32);
    for member in &image.member_refs {
        tables.string(&member.assembly);
        tables.string(&member.type_name);
        tables.string(&member.name);
        tables.sigs(&member.params);
    }

    tables.out.u32(image.types.len() as u32);
    for ty in &image.types {
        tables.string(&ty.name);
        tables.out.u8(ty.flags);
        tables
            .out
            .u16(ty.initializer.unwrap_or(u16::MAX));

        tables.out.u16(ty.fields.len() as u16);
        for field in &ty.fields {
            tables.string(&field.name);
            tables.out.u8(field.flags);
            tables.sig(&field.ty);
        }

        tables.out.u16(ty.methods.len() as u16);
        for method in &ty.methods {
            tables.string(&method.name);
            tables.out.u8(method.flags);
            tables.sigs(&method.params);
            tables.sig(&method.ret);
            tables.sigs(&method.locals);
            tables.out.u16(method.max_stack);
            tables.out.u32(method.code_offset);
            tables.out.u32(method.code_len);
        }
    }

    tables.out.bytes(&image.code);

    // Header
    let mut out = Encoder::default();
    out.buf.extend_from_slice(&MAGIC);
    out.u16(FORMAT_VERSION);
    out.u8(image.kind.code());
    out.u8(0);
    out.u32(0); // checksum, filled in below
    out.u32(image.entry_point.map_or(NO_ENTRY_POINT, LocalToken::encode));
    debug_assert_eq!(out.buf.len(), HEADER_SIZE);

    // String heap
    let heap = &tables.strings;
    out.u32(heap.len() as u32);
    for i in 0..heap.len() {
        let s = DefaultSymbol::try_from_usize(i)
            .and_then(|sym| heap.resolve(sym))
            .unwrap_or("");
        out.bytes(s.as_bytes());
    }

    out.buf.extend_from_slice(&tables.out.buf);

    let mut bytes = out.buf;
    update_checksum(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{flags, verify_checksum, MethodDef};
    use crate::OpCode;

    #[test]
    fn test_intern_is_stable() {
        let mut builder = ImageBuilder::new("lib", ImageKind::Library);
        let a = builder.intern("hello");
        let b = builder.intern("world");
        assert_eq!(builder.intern("hello"), a);
        assert_ne!(a, b);

        let image = builder.finish();
        assert_eq!(image.strings[a as usize], "hello");
        assert_eq!(image.strings[b as usize], "world");
    }

    #[test]
    fn test_member_refs_are_deduplicated() {
        let mut builder = ImageBuilder::new("app", ImageKind::Executable);
        let member = MemberRef {
            assembly: "mscorlib".to_string(),
            type_name: "System.Console".to_string(),
            name: "WriteLine".to_string(),
            params: vec![TypeSig::String],
        };
        let first = builder.member_ref(member.clone());
        let second = builder.member_ref(member);
        assert_eq!(first, second);
        assert_ne!(first & EXTERNAL_TOKEN, 0);

        let image = builder.finish();
        assert_eq!(image.references, vec!["mscorlib".to_string()]);
        assert_eq!(image.member_refs.len(), 1);
    }

    #[test]
    fn test_encoded_image_has_valid_checksum() {
        let mut builder = ImageBuilder::new("lib", ImageKind::Library);
        let offset = builder.append_code(&[OpCode::LdcI4 as u8, 42, 0, 0, 0, OpCode::Ret as u8]);
        let mut ty = TypeDef::new("Calculator", flags::PUBLIC);
        ty.methods.push(MethodDef {
            name: "Evaluate".to_string(),
            flags: flags::PUBLIC | flags::STATIC,
            params: Vec::new(),
            ret: TypeSig::Object,
            locals: Vec::new(),
            max_stack: 1,
            code_offset: offset,
            code_len: 6,
        });
        builder.add_type(ty);

        let bytes = builder.finish().to_bytes();
        assert_eq!(&bytes[..4], &MAGIC);
        assert!(verify_checksum(&bytes));
    }
}
