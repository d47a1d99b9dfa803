//! Source text and line/column mapping
//!
//! Lines are zero-based. Columns ("characters") count UTF-16 code units
//! from the start of the line. `\n`, `\r\n` and a lone `\r` all end a line.

use std::fmt;
use std::sync::Arc;

use super::Span;

/// Immutable source text with a path and a line table
#[derive(Debug, Clone)]
pub struct SourceText {
    text: Arc<str>,
    path: Arc<str>,
    line_starts: Arc<[usize]>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_path(text, "")
    }

    pub fn with_path(text: impl Into<String>, path: impl Into<String>) -> Self {
        let text: String = text.into();
        let line_starts = compute_line_starts(&text);
        Self {
            text: Arc::from(text),
            path: Arc::from(path.into()),
            line_starts: Arc::from(line_starts),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text covered by `span`, or `""` when the span is not valid here
    pub fn slice(&self, span: Span) -> &str {
        self.text.get(span.range()).unwrap_or("")
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where `line` starts
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Zero-based line of a byte offset
    pub fn line_index(&self, offset: usize) -> usize {
        let offset = offset.min(self.text.len());
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    /// Line and UTF-16 column of a byte offset
    pub fn line_position(&self, offset: usize) -> LinePosition {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_index(offset);
        let start = self.line_starts[line];
        LinePosition {
            line,
            character: self.text[start..offset].encode_utf16().count(),
        }
    }

    pub fn line_span(&self, span: Span) -> LinePositionSpan {
        LinePositionSpan {
            start: self.line_position(span.start),
            end: self.line_position(span.end),
        }
    }

    /// Length of `span` in UTF-16 code units
    pub fn utf16_len(&self, span: Span) -> usize {
        self.slice(span).encode_utf16().count()
    }
}

impl fmt::Display for SourceText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn compute_line_starts(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut starts = vec![0];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                starts.push(i + 2);
                i += 2;
            }
            b'\r' | b'\n' => {
                starts.push(i + 1);
                i += 1;
            }
            _ => i += 1,
        }
    }
    starts
}

/// Zero-based line and UTF-16 column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LinePosition {
    pub line: usize,
    pub character: usize,
}

impl fmt::Display for LinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.line, self.character)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinePositionSpan {
    pub start: LinePosition,
    pub end: LinePosition,
}

/// Line span tagged with the path of its source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FileLinePositionSpan {
    pub path: String,
    pub span: LinePositionSpan,
}

impl FileLinePositionSpan {
    pub fn start_line_position(&self) -> LinePosition {
        self.span.start
    }

    pub fn end_line_position(&self) -> LinePosition {
        self.span.end
    }
}

/// `path(line,col)` with one-based numbers
impl fmt::Display for FileLinePositionSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{})",
            self.path,
            self.span.start.line + 1,
            self.span.start.character + 1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_breaks() {
        let text = SourceText::new("a\nbc\r\nd\re");
        assert_eq!(text.line_count(), 4);
        assert_eq!(text.line_position(0), LinePosition { line: 0, character: 0 });
        assert_eq!(text.line_position(3), LinePosition { line: 1, character: 1 });
        assert_eq!(text.line_position(6), LinePosition { line: 2, character: 0 });
        assert_eq!(text.line_position(8), LinePosition { line: 3, character: 0 });
    }

    #[test]
    fn test_columns_count_utf16_units() {
        // 'é' is 2 bytes / 1 unit, '😀' is 4 bytes / 2 units
        let text = SourceText::new("é😀x");
        let x = text.as_str().find('x').unwrap();
        assert_eq!(text.line_position(x).character, 3);
        assert_eq!(text.utf16_len(Span::new(0, x)), 3);
    }

    #[test]
    fn test_offset_past_end_is_clamped() {
        let text = SourceText::new("ab\n");
        assert_eq!(text.line_position(99), LinePosition { line: 1, character: 0 });
        assert_eq!(text.slice(Span::new(1, 99)), "");
    }

    #[test]
    fn test_display_is_one_based() {
        let text = SourceText::with_path("x\n  y", "a.cs");
        let span = FileLinePositionSpan {
            path: text.path().to_string(),
            span: text.line_span(Span::new(4, 5)),
        };
        assert_eq!(span.to_string(), "a.cs(2,3)");
    }
}
