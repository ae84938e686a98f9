//! Source positions and parse errors for platform description files

use lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Source of every diagnostic this crate produces
pub const DIAGNOSTIC_SOURCE: &str = "edk2-index";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 0-based line number
    pub line: u32,
    /// 0-based column, when the parser knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Text of the enclosing `!if` chain; never evaluated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional_context: Option<String>,
}

impl SourceLocation {
    pub fn new(file: PathBuf, line: u32) -> Self {
        Self {
            file,
            line,
            column: None,
            conditional_context: None,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The line could not be attributed or understood
    Fatal,
    /// Parsing continued with a recovery
    Warning,
}

impl From<Severity> for DiagnosticSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Fatal => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        }
    }
}

/// Error recorded while parsing a DSC file; parsing continues past it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DscError {
    pub location: SourceLocation,
    pub message: String,
    pub severity: Severity,
    /// The part of the line the error is about
    pub offending_text: String,
    /// Full text of the source line
    pub line_text: String,
}

impl DscError {
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Range covering the offending text on its line.
    ///
    /// The start column is the declared column when present, otherwise the
    /// position of the offending text within the line, or 0 when it cannot
    /// be found.
    pub fn range(&self) -> Range {
        let start = match self.location.column {
            Some(column) => column,
            None => self
                .line_text
                .find(self.offending_text.as_str())
                .filter(|_| !self.offending_text.is_empty())
                .map(|byte_index| self.line_text[..byte_index].chars().count() as u32)
                .unwrap_or(0),
        };

        let width = if self.offending_text.is_empty() {
            self.line_text.trim_end().chars().count() as u32
        } else {
            self.offending_text.chars().count() as u32
        };

        Range {
            start: Position {
                line: self.location.line,
                character: start,
            },
            end: Position {
                line: self.location.line,
                character: start + width,
            },
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            range: self.range(),
            severity: Some(self.severity.into()),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: self.message.clone(),
            ..Default::default()
        }
    }
}

impl fmt::Display for DscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(line_text: &str, offending: &str, column: Option<u32>) -> DscError {
        DscError {
            location: SourceLocation {
                column,
                ..SourceLocation::new(PathBuf::from("/ws/Platform.dsc"), 4)
            },
            message: "test".to_string(),
            severity: Severity::Fatal,
            offending_text: offending.to_string(),
            line_text: line_text.to_string(),
        }
    }

    #[test]
    fn test_range_uses_offending_text_position() {
        let range = error("  [TotallyBogus]", "TotallyBogus", None).range();
        assert_eq!(range.start, Position { line: 4, character: 3 });
        assert_eq!(range.end, Position { line: 4, character: 15 });
    }

    #[test]
    fn test_range_prefers_declared_column() {
        let range = error("  [TotallyBogus]", "TotallyBogus", Some(1)).range();
        assert_eq!(range.start.character, 1);
        assert_eq!(range.end.character, 13);
    }

    #[test]
    fn test_range_clamps_to_zero_when_not_found() {
        let range = error("abc", "xyz", None).range();
        assert_eq!(range.start.character, 0);
        assert_eq!(range.end.character, 3);
    }

    #[test]
    fn test_diagnostic_severity_mapping() {
        let mut err = error("line", "line", None);
        assert_eq!(
            err.to_diagnostic().severity,
            Some(DiagnosticSeverity::ERROR)
        );
        err.severity = Severity::Warning;
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(diagnostic.source.as_deref(), Some(DIAGNOSTIC_SOURCE));
    }
}
