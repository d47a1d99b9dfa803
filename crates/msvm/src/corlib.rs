//! Core library
//!
//! `mscorlib` defines the predefined types and a handful of natively
//! implemented helpers. Its methods carry no code; the host dispatches
//! them to [`Intrinsic`] implementations.

use std::io::Write;
use std::sync::{Mutex, OnceLock};

use crate::image::{flags, Image, ImageBuilder, ImageKind, MethodDef, TypeDef, TypeSig};
use crate::{RuntimeError, RuntimeResult, Value};

/// Assembly name of the core library
pub const CORLIB_NAME: &str = "mscorlib";

/// Natively implemented core library method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    WriteLine,
    WriteLineValue,
    WriteValue,
    MathAbs,
    MathMax,
    MathMin,
    ParseInt,
    IsNullOrEmpty,
    StringConcat,
}

struct IntrinsicDef {
    type_name: &'static str,
    name: &'static str,
    params: &'static [TypeSig],
    ret: TypeSig,
    intrinsic: Intrinsic,
}

macro_rules! def {
    ($ty:literal, $name:literal, [$($param:expr),*], $ret:expr, $intrinsic:ident) => {
        IntrinsicDef {
            type_name: $ty,
            name: $name,
            params: &[$($param),*],
            ret: $ret,
            intrinsic: Intrinsic::$intrinsic,
        }
    };
}

const INTRINSICS: &[IntrinsicDef] = &[
    def!("System.Console", "WriteLine", [], TypeSig::Void, WriteLine),
    def!("System.Console", "WriteLine", [TypeSig::String], TypeSig::Void, WriteLineValue),
    def!("System.Console", "WriteLine", [TypeSig::Int32], TypeSig::Void, WriteLineValue),
    def!("System.Console", "WriteLine", [TypeSig::Bool], TypeSig::Void, WriteLineValue),
    def!("System.Console", "WriteLine", [TypeSig::Object], TypeSig::Void, WriteLineValue),
    def!("System.Console", "Write", [TypeSig::String], TypeSig::Void, WriteValue),
    def!("System.Console", "Write", [TypeSig::Object], TypeSig::Void, WriteValue),
    def!("System.Math", "Abs", [TypeSig::Int32], TypeSig::Int32, MathAbs),
    def!("System.Math", "Max", [TypeSig::Int32, TypeSig::Int32], TypeSig::Int32, MathMax),
    def!("System.Math", "Min", [TypeSig::Int32, TypeSig::Int32], TypeSig::Int32, MathMin),
    def!("System.Int32", "Parse", [TypeSig::String], TypeSig::Int32, ParseInt),
    def!("System.String", "IsNullOrEmpty", [TypeSig::String], TypeSig::Bool, IsNullOrEmpty),
    def!("System.String", "Concat", [TypeSig::String, TypeSig::String], TypeSig::String, StringConcat),
];

/// Predefined types, in image order
const TYPES: &[&str] = &[
    "System.Object",
    "System.Void",
    "System.Boolean",
    "System.Int32",
    "System.String",
    "System.Array",
    "System.Console",
    "System.Math",
];

/// Build the core library image
pub fn image() -> Image {
    let mut builder = ImageBuilder::new(CORLIB_NAME, ImageKind::Library);
    for &name in TYPES {
        let mut ty = TypeDef::new(name, flags::PUBLIC);
        for d in INTRINSICS.iter().filter(|d| d.type_name == name) {
            ty.methods.push(MethodDef {
                name: d.name.to_string(),
                flags: flags::PUBLIC | flags::STATIC | flags::INTRINSIC,
                params: d.params.to_vec(),
                ret: d.ret.clone(),
                locals: Vec::new(),
                max_stack: 0,
                code_offset: 0,
                code_len: 0,
            });
        }
        builder.add_type(ty);
    }
    builder.finish()
}

/// Encoded core library image, built once
pub fn bytes() -> &'static [u8] {
    static BYTES: OnceLock<Vec<u8>> = OnceLock::new();
    BYTES.get_or_init(|| image().to_bytes())
}

/// Find the native implementation of a core library method
pub fn lookup(type_name: &str, name: &str, params: &[TypeSig]) -> Option<Intrinsic> {
    INTRINSICS
        .iter()
        .find(|d| d.type_name == type_name && d.name == name && d.params == params)
        .map(|d| d.intrinsic)
}

/// Where `System.Console` output goes
pub struct Console {
    sink: Mutex<ConsoleSink>,
}

enum ConsoleSink {
    Stdout,
    Capture(Vec<u8>),
}

impl Console {
    pub fn stdout() -> Self {
        Self {
            sink: Mutex::new(ConsoleSink::Stdout),
        }
    }

    pub fn capture() -> Self {
        Self {
            sink: Mutex::new(ConsoleSink::Capture(Vec::new())),
        }
    }

    pub fn write(&self, text: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *sink {
            ConsoleSink::Stdout => {
                let mut out = std::io::stdout().lock();
                // Console output failures are not observable by programs.
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            ConsoleSink::Capture(buf) => buf.extend_from_slice(text.as_bytes()),
        }
    }

    /// Drain captured output (empty when writing to stdout)
    pub fn take_output(&self) -> String {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *sink {
            ConsoleSink::Stdout => String::new(),
            ConsoleSink::Capture(buf) => String::from_utf8_lossy(&std::mem::take(buf)).into_owned(),
        }
    }
}

fn int_arg(args: &[Value], index: usize) -> RuntimeResult<i32> {
    args.get(index)
        .and_then(Value::as_int)
        .ok_or_else(|| RuntimeError::ArgumentType {
            index,
            expected: "int".to_string(),
        })
}

/// Run a native method
pub fn invoke(intrinsic: Intrinsic, args: &[Value], console: &Console) -> RuntimeResult<Value> {
    match intrinsic {
        Intrinsic::WriteLine => {
            console.write("\n");
            Ok(Value::Null)
        }
        Intrinsic::WriteLineValue => {
            let text = args.first().map(Value::to_string).unwrap_or_default();
            console.write(&format!("{}\n", text));
            Ok(Value::Null)
        }
        Intrinsic::WriteValue => {
            let text = args.first().map(Value::to_string).unwrap_or_default();
            console.write(&text);
            Ok(Value::Null)
        }
        Intrinsic::MathAbs => {
            let n = int_arg(args, 0)?;
            n.checked_abs().map(Value::Int).ok_or(RuntimeError::Overflow)
        }
        Intrinsic::MathMax => Ok(Value::Int(int_arg(args, 0)?.max(int_arg(args, 1)?))),
        Intrinsic::MathMin => Ok(Value::Int(int_arg(args, 0)?.min(int_arg(args, 1)?))),
        Intrinsic::ParseInt => match args.first() {
            Some(Value::Str(s)) => s
                .trim()
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| RuntimeError::Format(s.to_string())),
            _ => Err(RuntimeError::NullReference),
        },
        Intrinsic::IsNullOrEmpty => Ok(Value::Bool(match args.first() {
            Some(Value::Str(s)) => s.is_empty(),
            _ => true,
        })),
        Intrinsic::StringConcat => {
            let mut out = String::new();
            for arg in args.iter().take(2) {
                out.push_str(&arg.to_string());
            }
            Ok(Value::from(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corlib_image_decodes() {
        let image = Image::from_bytes(bytes()).unwrap();
        assert_eq!(image.name, CORLIB_NAME);
        assert!(image.find_type("System.Int32").is_some());
        let console = &image.types[image.find_type("System.Console").unwrap()];
        assert!(console.methods.iter().all(|m| m.is_intrinsic() && m.is_static()));
    }

    #[test]
    fn test_lookup_is_signature_exact() {
        assert_eq!(
            lookup("System.Math", "Max", &[TypeSig::Int32, TypeSig::Int32]),
            Some(Intrinsic::MathMax)
        );
        assert_eq!(lookup("System.Math", "Max", &[TypeSig::Int32]), None);
    }

    #[test]
    fn test_console_capture() {
        let console = Console::capture();
        invoke(Intrinsic::WriteLineValue, &[Value::Int(7)], &console).unwrap();
        invoke(Intrinsic::WriteValue, &[Value::Bool(false)], &console).unwrap();
        assert_eq!(console.take_output(), "7\nFalse");
        assert_eq!(console.take_output(), "");
    }

    #[test]
    fn test_parse_and_abs_faults() {
        let console = Console::capture();
        assert_eq!(
            invoke(Intrinsic::ParseInt, &[Value::str(" 12 ")], &console),
            Ok(Value::Int(12))
        );
        assert_eq!(
            invoke(Intrinsic::ParseInt, &[Value::str("x")], &console),
            Err(RuntimeError::Format("x".to_string()))
        );
        assert_eq!(
            invoke(Intrinsic::MathAbs, &[Value::Int(i32::MIN)], &console),
            Err(RuntimeError::Overflow)
        );
    }
}
