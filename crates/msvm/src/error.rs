//! Error types for image decoding, loading and execution

use thiserror::Error;

/// A malformed or unsupported image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("not a minisharp image (bad magic)")]
    BadMagic,

    #[error("unsupported image format version {0}")]
    UnsupportedVersion(u16),

    #[error("image is truncated")]
    Truncated,

    #[error("checksum mismatch: stored {stored:#010x}, calculated {calculated:#010x}")]
    ChecksumMismatch { stored: u32, calculated: u32 },

    #[error("invalid image: {0}")]
    Malformed(String),
}

impl ImageError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ImageError::Truncated
        } else {
            ImageError::Malformed(err.to_string())
        }
    }
}

/// Failure while loading an image into a host
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("an assembly named '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("could not resolve referenced assembly '{0}'")]
    UnresolvedAssembly(String),

    #[error("could not resolve member '{0}'")]
    MissingMember(String),

    #[error("type initializer for '{type_name}' failed: {source}")]
    Initializer {
        type_name: String,
        #[source]
        source: RuntimeError,
    },
}

/// Failure while loading and running an executable
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("unhandled exception: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Fault raised while executing a method
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("attempted to divide by zero")]
    DivideByZero,

    #[error("arithmetic operation resulted in an overflow")]
    Overflow,

    #[error("index {index} was outside the bounds of the array (length {length})")]
    IndexOutOfRange { index: i32, length: usize },

    #[error("object reference not set to an instance of an object")]
    NullReference,

    #[error("call depth limit of {0} exceeded")]
    StackOverflow(usize),

    #[error("parameter count mismatch: expected {expected}, found {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {index} is not convertible to '{expected}'")]
    ArgumentType { index: usize, expected: String },

    #[error("method '{0}' is not static")]
    NotStatic(String),

    #[error("input string was not in a correct format: '{0}'")]
    Format(String),

    #[error("invalid program: {0}")]
    InvalidProgram(String),
}

impl RuntimeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidProgram(message.into())
    }
}

pub type ImageResult<T> = Result<T, ImageError>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
