//! Metadata references: images whose public types a compilation can use

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use msvm::Image;

use crate::diagnostics::{Diagnostic, DiagnosticBag, ErrorCode, Location};

#[derive(Clone)]
enum Source {
    CoreLibrary,
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

/// A referenced image, decoded when a compilation is analyzed
#[derive(Clone)]
pub struct MetadataReference {
    source: Source,
    display: String,
}

impl MetadataReference {
    /// The built-in core library (`mscorlib`)
    pub fn core_library() -> Self {
        Self {
            source: Source::CoreLibrary,
            display: msvm::corlib::CORLIB_NAME.to_string(),
        }
    }

    /// An image already in memory, e.g. the output of another compilation
    pub fn from_image(bytes: impl Into<Vec<u8>>, display: impl Into<String>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            source: Source::Bytes(Arc::from(bytes)),
            display: display.into(),
        }
    }

    /// An image on disk; the file is read during analysis
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            display: path.display().to_string(),
            source: Source::File(path),
        }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn is_core_library(&self) -> bool {
        matches!(self.source, Source::CoreLibrary)
    }

    fn load(&self) -> Result<Image, Diagnostic> {
        let bytes: Arc<[u8]> = match &self.source {
            Source::CoreLibrary => return Ok(msvm::corlib::image()),
            Source::Bytes(bytes) => Arc::clone(bytes),
            Source::File(path) => match std::fs::read(path) {
                Ok(bytes) => Arc::from(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(self.diagnostic(ErrorCode::MetadataFileNotFound, vec![]));
                }
                Err(err) => {
                    return Err(self.diagnostic(ErrorCode::MetadataFileUnreadable, vec![err.to_string()]));
                }
            },
        };
        Image::from_bytes(&bytes)
            .map_err(|err| self.diagnostic(ErrorCode::MetadataFileUnreadable, vec![err.to_string()]))
    }

    fn diagnostic(&self, code: ErrorCode, extra: Vec<String>) -> Diagnostic {
        let mut args = vec![self.display.clone()];
        args.extend(extra);
        Diagnostic::new(code, Location::None, args)
    }
}

impl fmt::Debug for MetadataReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MetadataReference").field(&self.display).finish()
    }
}

/// Decode every reference. Broken ones and repeated simple names are
/// reported and left out.
pub(crate) fn resolve(references: &[MetadataReference], diagnostics: &mut DiagnosticBag) -> Vec<Image> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for reference in references {
        match reference.load() {
            Ok(image) => {
                if !seen.insert(image.name.clone()) {
                    diagnostics.add(ErrorCode::DuplicateImport, Location::None, vec![image.name.clone()]);
                    continue;
                }
                debug!("referenced '{}' as {}", reference.display, image.name);
                images.push(image);
            }
            Err(diagnostic) => diagnostics.extend([diagnostic]),
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(bag: DiagnosticBag) -> Vec<&'static str> {
        bag.into_vec().iter().map(Diagnostic::id).collect()
    }

    #[test]
    fn test_core_library_resolves() {
        let mut bag = DiagnosticBag::new();
        let images = resolve(&[MetadataReference::core_library()], &mut bag);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name, msvm::corlib::CORLIB_NAME);
        assert!(bag.into_vec().is_empty());
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let mut bag = DiagnosticBag::new();
        let images = resolve(
            &[
                MetadataReference::from_file("/nonexistent/lib.msil"),
                MetadataReference::from_image(vec![1, 2, 3], "garbage.dll"),
            ],
            &mut bag,
        );
        assert!(images.is_empty());
        assert_eq!(ids(bag), vec!["CS0006", "CS0009"]);
    }

    #[test]
    fn test_duplicate_simple_name() {
        let mut bag = DiagnosticBag::new();
        let corlib = MetadataReference::from_image(msvm::corlib::bytes().to_vec(), "copy.dll");
        let images = resolve(&[MetadataReference::core_library(), corlib], &mut bag);
        assert_eq!(images.len(), 1);
        assert_eq!(ids(bag), vec!["CS1704"]);
    }
}
