//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.
//!
//! Pipeline stages never use errors for control flow: each stage pushes
//! into a shared `Diagnostics` collector so independent clauses and
//! directives keep being checked, yielding a complete defect set per run.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Structural violations (1xxx)
    /// Parenthesis underflow or unclosed parenthesis
    UnbalancedParenthesis,

    /// IF/FOR/END nesting broken (stray or unclosed directive)
    UnbalancedDirective,

    /// A directive chain opens and closes at different parenthesis depths
    DirectiveCrossesParentheses,

    /// FOR directive text is not `var : iterable`
    MalformedForDirective,

    /// FOR body lacks a top-level comma, AND, or OR
    LoopBodyMissingSeparator,

    /// Template source could not be tokenized
    TemplateSyntaxError,

    // Semantic violations (2xxx)
    /// Directive expression is not defined in scope
    UndefinedExpression,

    /// Directive expression failed to evaluate
    ExpressionEvalError,

    /// Directive expression evaluated to an incompatible type
    ExpressionTypeMismatch,

    /// Object bound to an INSERT lacks a declared column
    MissingObjectField,

    /// Object or object-array used as an IN (...) operand
    ObjectInInList,

    // General (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,

    /// Internal error
    InternalError,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnbalancedParenthesis => "UNBALANCED_PARENTHESIS",
            Self::UnbalancedDirective => "UNBALANCED_DIRECTIVE",
            Self::DirectiveCrossesParentheses => "DIRECTIVE_CROSSES_PARENTHESES",
            Self::MalformedForDirective => "MALFORMED_FOR_DIRECTIVE",
            Self::LoopBodyMissingSeparator => "LOOP_BODY_MISSING_SEPARATOR",
            Self::TemplateSyntaxError => "TEMPLATE_SYNTAX_ERROR",
            Self::UndefinedExpression => "UNDEFINED_EXPRESSION",
            Self::ExpressionEvalError => "EXPRESSION_EVAL_ERROR",
            Self::ExpressionTypeMismatch => "EXPRESSION_TYPE_MISMATCH",
            Self::MissingObjectField => "MISSING_OBJECT_FIELD",
            Self::ObjectInInList => "OBJECT_IN_IN_LIST",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Which validation family the code belongs to
    ///
    /// Structural codes are schema-independent and always fatal; semantic
    /// codes only fire when a parameter schema is present and are skipped
    /// in inspection mode.
    pub fn family(&self) -> DiagnosticFamily {
        match self {
            Self::UnbalancedParenthesis
            | Self::UnbalancedDirective
            | Self::DirectiveCrossesParentheses
            | Self::MalformedForDirective
            | Self::LoopBodyMissingSeparator
            | Self::TemplateSyntaxError => DiagnosticFamily::Structural,
            Self::UndefinedExpression
            | Self::ExpressionEvalError
            | Self::ExpressionTypeMismatch
            | Self::MissingObjectField
            | Self::ObjectInInList => DiagnosticFamily::Semantic,
            Self::Info | Self::Warning | Self::InternalError => DiagnosticFamily::General,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation family of a diagnostic code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticFamily {
    /// Schema-independent, always fatal
    Structural,

    /// Requires a parameter schema; skipped in inspection mode
    Semantic,

    /// Neither family
    General,
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocks code generation
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

/// Source location of a diagnostic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Template file path (stamped by the caller; the pipeline itself only
    /// knows line/column)
    pub file: Option<String>,

    /// Line number (1-indexed)
    pub line: Option<usize>,

    /// Column number (1-indexed)
    pub column: Option<usize>,
}

impl Location {
    /// Create a location from line and column
    pub fn at(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line: Some(line),
            column: Some(column),
        }
    }

    /// Create a location with just a file path
    pub fn in_file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            line: None,
            column: None,
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
    pub location: Option<Location>,

    /// Expected value (for comparison diagnostics)
    pub expected: Option<String>,

    /// Actual value (for comparison diagnostics)
    pub actual: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
        }
    }

    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

/// Shared collector all pipeline stages push into
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Push a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Whether any collected diagnostic is an error
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    /// Number of collected diagnostics
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collector is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate collected diagnostics
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Consume into the underlying vector
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(
            DiagnosticCode::DirectiveCrossesParentheses.as_str(),
            "DIRECTIVE_CROSSES_PARENTHESES"
        );
        assert_eq!(DiagnosticCode::MissingObjectField.as_str(), "MISSING_OBJECT_FIELD");
    }

    #[test]
    fn code_families() {
        assert_eq!(
            DiagnosticCode::UnbalancedParenthesis.family(),
            DiagnosticFamily::Structural
        );
        assert_eq!(
            DiagnosticCode::UndefinedExpression.family(),
            DiagnosticFamily::Semantic
        );
        assert_eq!(DiagnosticCode::Info.family(), DiagnosticFamily::General);
    }

    #[test]
    fn collector_accumulates() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());

        diags.push(Diagnostic::new(DiagnosticCode::Info, Severity::Info, "note"));
        assert!(!diags.has_errors());

        diags.push(Diagnostic::error(
            DiagnosticCode::UnbalancedDirective,
            "IF without END",
        ));
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::error(DiagnosticCode::UndefinedExpression, "`missing` is not defined")
            .with_location(Location::at(3, 14));

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("UNDEFINED_EXPRESSION"));
        assert!(json.contains("error"));
    }
}
