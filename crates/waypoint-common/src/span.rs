use serde::{Deserialize, Serialize};

/// Source position within a file (1-based line/column, 0-based byte offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
    /// 0-based byte offset from start of file.
    #[serde(default)]
    pub offset: u32,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// A range in source code, from `start` to `end` in a given file.
///
/// Spans arrive from the host front end alongside every declaration; the
/// extraction pass never computes them itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Source file path, relative to the project root as reported by the host.
    pub file: String,
    /// Start position (inclusive).
    pub start: Position,
    /// End position (exclusive). Hosts that only report a start may omit it.
    #[serde(default)]
    pub end: Position,
}

impl Span {
    pub fn new(file: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            file: file.into(),
            start,
            end,
        }
    }

    /// A zero-width span at `line:column`, for hosts without byte offsets.
    pub fn at(file: impl Into<String>, line: u32, column: u32) -> Self {
        let pos = Position::new(line, column, 0);
        Self::new(file, pos, pos)
    }

    /// Create a dummy span for synthesized nodes.
    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn is_dummy(&self) -> bool {
        self.file.is_empty() && self.start == Position::default()
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file, self.start.line, self.start.column
        )
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_start_position() {
        let span = Span::new("src/api.ts", Position::new(4, 7, 52), Position::new(4, 19, 64));
        assert_eq!(span.to_string(), "src/api.ts:4:7");
    }

    #[test]
    fn deserialize_without_end_or_offset() {
        let span: Span =
            serde_json::from_str(r#"{"file":"a.ts","start":{"line":2,"column":3}}"#).unwrap();
        assert_eq!(span.start, Position::new(2, 3, 0));
        assert_eq!(span.end, Position::default());
        assert!(!span.is_dummy());
    }

    #[test]
    fn dummy_span() {
        assert!(Span::dummy().is_dummy());
        assert!(!Span::at("a.ts", 1, 1).is_dummy());
    }
}
