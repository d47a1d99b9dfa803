//! msvm - module images and host runtime for minisharp
//!
//! This crate defines the binary image format the compiler emits and a
//! small host that loads images and runs them.
//!
//! ## Layout
//!
//! - **Image** (`image/`): tables, encoder, decoder and checksum
//! - **OpCode** (`opcode`): the stack machine instruction set
//! - **Core library** (`corlib`): predefined `System` types and natives
//! - **Host** (`host`): loading, linking and reflection-style invocation
//! - **Interpreter** (`interp`): executes method bodies

pub mod corlib;
pub mod error;
pub mod host;
pub mod image;
mod interp;
pub mod opcode;
pub mod value;

pub use error::{ImageError, ImageResult, LoadError, RunError, RuntimeError, RuntimeResult};
pub use host::{Assembly, FieldInfo, Host, MethodInfo, Module, TypeInfo};
pub use image::{Image, ImageBuilder, ImageKind, TypeSig};
pub use interp::MAX_CALL_DEPTH;
pub use opcode::OpCode;
pub use value::{ArrayRef, Value};
