//! Structural validation of a [`PipelineDefinition`].
//!
//! Every rule is evaluated independently; a definition can carry several
//! diagnostics at once. Validation never mutates the definition and never
//! fails; problems come back as data (see [`crate::diagnostics`]).

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::graph::{IngestBinding, PipelineDefinition};

/// Inspects a definition and reports structural diagnostics.
///
/// The output is ordered by (code, subject) so identical definitions always
/// yield identical diagnostic lists.
pub fn validate(definition: &PipelineDefinition) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if definition.step_nodes.is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::NoStepNodes,
            "",
            "pipeline does not declare any step nodes",
        ));
    }

    if !definition.has_any_input_types() {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::NoEntryPoints,
            "",
            "pipeline declares no entry points; no runnable instance can be produced",
        ));
    }

    if definition.has_multiple_input_types() && !definition.has_disjoint_input_types() {
        let types = definition.input_type_names().join(", ");
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::AmbiguousEntryInputTypes,
            types.clone(),
            format!(
                "entry nodes accept inputs of type '{types}'; all types must be distinct \
                 for type-routed submission, use name-qualified submission instead"
            ),
        ));
    }

    for source in &definition.ingest_sources {
        if !source.is_schedulable() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::InvalidIngestSource,
                source.name.clone(),
                format!(
                    "ingestion source '{}' must be free-standing and produce either an \
                     awaited value or a stream",
                    source.name
                ),
            ));
        }
        if source.binding == IngestBinding::Ambiguous {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::AmbiguousIngestBinding,
                source.name.clone(),
                format!(
                    "ingestion source '{}' matches more than one entry node and was left \
                     unbound",
                    source.name
                ),
            ));
        }
    }

    diagnostics.sort_by(|a, b| (a.code, &a.subject).cmp(&(b.code, &b.subject)));
    diagnostics
}
