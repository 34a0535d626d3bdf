//! Build-time diagnostics.
//!
//! Structural problems in a descriptor set are reported as [`Diagnostic`]
//! values with stable codes, collected and returned, never thrown. The
//! caller decides whether a non-fatal diagnostic set is acceptable before
//! instantiating the runtime; the only fatal code is
//! [`DiagnosticCode::NoEntryPoints`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a diagnostic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// `FLW0001`: the descriptor set declares no step nodes at all.
    NoStepNodes,
    /// `FLW0002`: no node is flagged as an entry point. Fatal, in that the runtime
    /// refuses to instantiate.
    NoEntryPoints,
    /// `FLW0003`: an ingestion source is not independently schedulable;
    /// it is excluded from the runtime ingestion set.
    InvalidIngestSource,
    /// `FLW0004`: multiple entry nodes whose unwrapped input types are not
    /// disjoint; type-routed submission is ambiguous.
    AmbiguousEntryInputTypes,
    /// `FLW0005`: an ingestion source's produced type matches more than
    /// one entry node; the source is left unbound.
    AmbiguousIngestBinding,
}

impl DiagnosticCode {
    /// The stable textual code, e.g. `FLW0002`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoStepNodes => "FLW0001",
            Self::NoEntryPoints => "FLW0002",
            Self::InvalidIngestSource => "FLW0003",
            Self::AmbiguousEntryInputTypes => "FLW0004",
            Self::AmbiguousIngestBinding => "FLW0005",
        }
    }

    /// Default severity of the rule.
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoEntryPoints => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic severity. Only [`Severity::Error`] prevents instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Advisory; the pipeline is still instantiable.
    Warning,
    /// Fatal; no runnable pipeline can be produced.
    Error,
}

/// One reported structural problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The rule that fired.
    pub code: DiagnosticCode,
    /// Severity of this occurrence.
    pub severity: Severity,
    /// The offending name(s): a step name, a source name, or a joined list
    /// of type names.
    pub subject: String,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Whether this diagnostic prevents runtime instantiation.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// True when any diagnostic in the set is fatal.
pub fn has_fatal(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_fatal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_no_entry_points_is_fatal() {
        assert!(Diagnostic::new(DiagnosticCode::NoEntryPoints, "p", "m").is_fatal());
        for code in [
            DiagnosticCode::NoStepNodes,
            DiagnosticCode::InvalidIngestSource,
            DiagnosticCode::AmbiguousEntryInputTypes,
            DiagnosticCode::AmbiguousIngestBinding,
        ] {
            assert!(!Diagnostic::new(code, "p", "m").is_fatal());
        }
    }

    #[test]
    fn codes_render_stable_identifiers() {
        assert_eq!(DiagnosticCode::NoStepNodes.as_str(), "FLW0001");
        assert_eq!(DiagnosticCode::AmbiguousIngestBinding.as_str(), "FLW0005");
    }
}
