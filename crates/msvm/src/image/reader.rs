//! Image decoder

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use super::checksum::{calculate_checksum, stored_checksum};
use super::{
    FieldDef, Image, ImageKind, LocalToken, MemberRef, MethodDef, TypeDef, TypeSig,
    FORMAT_VERSION, HEADER_SIZE, MAGIC, NO_ENTRY_POINT,
};
use crate::{ImageError, ImageResult};

/// Array nesting limit for signatures
const MAX_SIG_DEPTH: usize = 32;

struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
    strings: Vec<String>,
}

impl<'a> Decoder<'a> {
    fn u8(&mut self) -> ImageResult<u8> {
        Ok(self.cursor.read_u8()?)
    }

    fn u16(&mut self) -> ImageResult<u16> {
        Ok(self.cursor.read_u16::<LittleEndian>()?)
    }

    fn u32(&mut self) -> ImageResult<u32> {
        Ok(self.cursor.read_u32::<LittleEndian>()?)
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    fn blob(&mut self) -> ImageResult<Vec<u8>> {
        let len = self.u32()? as usize;
        if len > self.remaining() {
            return Err(ImageError::Truncated);
        }
        let mut bytes = vec![0u8; len];
        self.cursor.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn string(&mut self) -> ImageResult<String> {
        let index = self.u32()? as usize;
        self.strings
            .get(index)
            .cloned()
            .ok_or_else(|| ImageError::malformed(format!("string index {} out of range", index)))
    }

    fn sig(&mut self, depth: usize) -> ImageResult<TypeSig> {
        if depth > MAX_SIG_DEPTH {
            return Err(ImageError::malformed("type signature nested too deeply"));
        }
        Ok(match self.u8()? {
            0 => TypeSig::Void,
            1 => TypeSig::Bool,
            2 => TypeSig::Int32,
            3 => TypeSig::String,
            4 => TypeSig::Object,
            5 => TypeSig::Array(Box::new(self.sig(depth + 1)?)),
            6 => TypeSig::Class(self.string()?),
            tag => {
                return Err(ImageError::malformed(format!(
                    "unknown type signature tag {}",
                    tag
                )))
            }
        })
    }

    fn sigs(&mut self) -> ImageResult<Vec<TypeSig>> {
        let count = self.u16()?;
        (0..count).map(|_| self.sig(0)).collect()
    }

    fn count(&mut self) -> ImageResult<usize> {
        let count = self.u32()? as usize;
        // Every entry takes at least one byte.
        if count > self.remaining() {
            return Err(ImageError::Truncated);
        }
        Ok(count)
    }
}

pub(super) fn read_image(bytes: &[u8]) -> ImageResult<Image> {
    if bytes.len() < HEADER_SIZE {
        return Err(if bytes.len() >= 4 && bytes[..4] != MAGIC {
            ImageError::BadMagic
        } else {
            ImageError::Truncated
        });
    }
    if bytes[..4] != MAGIC {
        return Err(ImageError::BadMagic);
    }

    let calculated = calculate_checksum(bytes);
    let stored = stored_checksum(bytes).ok_or(ImageError::Truncated)?;
    if stored != calculated {
        return Err(ImageError::ChecksumMismatch { stored, calculated });
    }

    let mut d = Decoder {
        cursor: Cursor::new(bytes),
        strings: Vec::new(),
    };
    d.cursor.set_position(4);

    let version = d.u16()?;
    if version != FORMAT_VERSION {
        return Err(ImageError::UnsupportedVersion(version));
    }
    let kind = ImageKind::from_code(d.u8()?)
        .ok_or_else(|| ImageError::malformed("unknown image kind"))?;
    let _reserved = d.u8()?;
    let _checksum = d.u32()?;
    let entry = d.u32()?;

    let string_count = d.count()?;
    let mut strings = Vec::with_capacity(string_count);
    for _ in 0..string_count {
        let raw = d.blob()?;
        let s = String::from_utf8(raw)
            .map_err(|_| ImageError::malformed("string heap entry is not valid UTF-8"))?;
        strings.push(s);
    }
    d.strings = strings;

    let name = d.string()?;

    let reference_count = d.count()?;
    let mut references = Vec::with_capacity(reference_count);
    for _ in 0..reference_count {
        references.push(d.string()?);
    }

    let member_count = d.count()?;
    let mut member_refs = Vec::with_capacity(member_count);
    for _ in 0..member_count {
        member_refs.push(MemberRef {
            assembly: d.string()?,
            type_name: d.string()?,
            name: d.string()?,
            params: d.sigs()?,
        });
    }

    let type_count = d.count()?;
    let mut types = Vec::with_capacity(type_count);
    for _ in 0..type_count {
        let name = d.string()?;
        let flags = d.u8()?;
        let initializer = match d.u16()? {
            u16::MAX => None,
            index => Some(index),
        };

        let field_count = d.u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(FieldDef {
                name: d.string()?,
                flags: d.u8()?,
                ty: d.sig(0)?,
            });
        }

        let method_count = d.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(MethodDef {
                name: d.string()?,
                flags: d.u8()?,
                params: d.sigs()?,
                ret: d.sig(0)?,
                locals: d.sigs()?,
                max_stack: d.u16()?,
                code_offset: d.u32()?,
                code_len: d.u32()?,
            });
        }

        types.push(TypeDef {
            name,
            flags,
            fields,
            methods,
            initializer,
        });
    }

    let code = d.blob()?;

    let image = Image {
        name,
        kind,
        entry_point: (entry != NO_ENTRY_POINT).then(|| LocalToken::decode(entry)),
        strings: d.strings,
        references,
        member_refs,
        types,
        code,
    };
    validate(&image)?;
    Ok(image)
}

fn validate(image: &Image) -> ImageResult<()> {
    for ty in &image.types {
        if let Some(init) = ty.initializer {
            if init as usize >= ty.methods.len() {
                return Err(ImageError::malformed(format!(
                    "initializer of '{}' is out of range",
                    ty.name
                )));
            }
        }
        for method in &ty.methods {
            let end = method.code_offset as u64 + method.code_len as u64;
            if end > image.code.len() as u64 {
                return Err(ImageError::malformed(format!(
                    "body of '{}.{}' lies outside the code blob",
                    ty.name, method.name
                )));
            }
        }
    }

    for reference in &image.member_refs {
        if !image.references.contains(&reference.assembly) {
            return Err(ImageError::malformed(format!(
                "member reference {} names an unlisted assembly",
                reference
            )));
        }
    }

    if let Some(entry) = image.entry_point {
        if image.method(entry).is_none() {
            return Err(ImageError::malformed("entry point is out of range"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{flags, update_checksum, ImageBuilder};
    use crate::OpCode;
    use pretty_assertions::assert_eq;

    fn sample_image() -> Image {
        let mut builder = ImageBuilder::new("sample", ImageKind::Executable);
        let greeting = builder.intern("hello");
        let body = [OpCode::LdStr as u8, greeting as u8, 0, 0, 0, OpCode::Ret as u8];
        let offset = builder.append_code(&body);

        let mut ty = TypeDef::new("Demo.Program", 0);
        ty.fields.push(FieldDef {
            name: "counter".to_string(),
            flags: flags::STATIC,
            ty: TypeSig::Int32,
        });
        ty.methods.push(MethodDef {
            name: "Main".to_string(),
            flags: flags::STATIC,
            params: vec![TypeSig::Array(Box::new(TypeSig::String))],
            ret: TypeSig::Void,
            locals: vec![TypeSig::Class("Demo.Program".to_string())],
            max_stack: 1,
            code_offset: offset,
            code_len: body.len() as u32,
        });
        let index = builder.add_type(ty);
        builder.set_entry_point(LocalToken::new(index, 0));
        builder.finish()
    }

    #[test]
    fn test_decode_matches_builder_output() {
        let image = sample_image();
        let decoded = Image::from_bytes(&image.to_bytes()).unwrap();
        assert_eq!(decoded.name, image.name);
        assert_eq!(decoded.kind, ImageKind::Executable);
        assert_eq!(decoded.entry_point, image.entry_point);
        assert_eq!(decoded.types, image.types);
        assert_eq!(decoded.code, image.code);
        // Names are appended to the heap after the literals.
        assert_eq!(decoded.strings[0], "hello");
        assert!(decoded.strings.contains(&"Demo.Program".to_string()));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = sample_image().to_bytes();
        bytes[0] = b'X';
        assert_eq!(Image::from_bytes(&bytes), Err(ImageError::BadMagic));
    }

    #[test]
    fn test_rejects_corruption() {
        let mut bytes = sample_image().to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            Image::from_bytes(&bytes),
            Err(ImageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_truncation() {
        let bytes = sample_image().to_bytes();
        let mut cut = bytes[..bytes.len() - 3].to_vec();
        update_checksum(&mut cut);
        assert_eq!(Image::from_bytes(&cut), Err(ImageError::Truncated));
        assert_eq!(Image::from_bytes(&bytes[..6]), Err(ImageError::Truncated));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = sample_image().to_bytes();
        bytes[4] = 9;
        assert_eq!(Image::from_bytes(&bytes), Err(ImageError::UnsupportedVersion(9)));
    }
}
