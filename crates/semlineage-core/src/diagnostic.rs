//! Diagnostic codes and recoverable-problem reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // TMDL structure (1xxx)
    /// File path is not one of the recognized TMDL locations
    TmdlUnsupportedFile,

    /// A table file declares objects but no `table` header
    TmdlMissingTableHeader,

    /// A child object (level, calculationItem, column...) has no valid parent
    TmdlOrphanObject,

    /// A triple-backtick block is still open at end of file
    TmdlUnterminatedBlock,

    /// The same table name is declared by more than one file
    TmdlDuplicateTable,

    /// A measure or calculation item has no expression text
    TmdlEmptyExpression,

    /// A relationship is missing one of its endpoints
    TmdlInvalidRelationship,

    // DAX analysis (2xxx)
    /// A measure name is defined in more than one table
    DaxAmbiguousMeasure,

    // M analysis (3xxx)
    /// A connector argument references an expression that is not a resolvable parameter
    MUnresolvedParameter,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TmdlUnsupportedFile => "TMDL_UNSUPPORTED_FILE",
            Self::TmdlMissingTableHeader => "TMDL_MISSING_TABLE_HEADER",
            Self::TmdlOrphanObject => "TMDL_ORPHAN_OBJECT",
            Self::TmdlUnterminatedBlock => "TMDL_UNTERMINATED_BLOCK",
            Self::TmdlDuplicateTable => "TMDL_DUPLICATE_TABLE",
            Self::TmdlEmptyExpression => "TMDL_EMPTY_EXPRESSION",
            Self::TmdlInvalidRelationship => "TMDL_INVALID_RELATIONSHIP",
            Self::DaxAmbiguousMeasure => "DAX_AMBIGUOUS_MEASURE",
            Self::MUnresolvedParameter => "M_UNRESOLVED_PARAMETER",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - the model was still produced, but something was skipped
    Warn,

    /// Error - reserved for callers escalating via severity overrides
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location in a project file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Logical file path (e.g. `tables/Sales.tmdl`)
    pub file: String,

    /// Optional line number (1-indexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
        }
    }

    /// Create a location with file and line number
    pub fn with_line(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => write!(f, "{}", self.file),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
        }
    }

    /// Shorthand for a warn-level diagnostic at `file:line`
    pub fn warning_at(
        code: DiagnosticCode,
        file: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, Severity::Warn, message).with_location(Location::with_line(file, line))
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// File the diagnostic points at, if any
    pub fn file(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.file.as_str())
    }

    /// Line the diagnostic points at, if any
    pub fn line(&self) -> Option<usize> {
        self.location.as_ref().and_then(|l| l.line)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} [{}] {}: {}", self.severity, self.code, location, self.message),
            None => write!(f, "{} [{}] {}", self.severity, self.code, self.message),
        }
    }
}
