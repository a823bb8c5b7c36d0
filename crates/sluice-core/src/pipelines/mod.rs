//! The two extraction tasks.
//!
//! Each call is one linear run. Logging goes through the span carried by the
//! [`RunContext`] the caller hands in; nothing here installs a subscriber.

mod sheet;
mod table;

use tracing::{info_span, Span};
use uuid::Uuid;

pub use sheet::{extract_sheet, SheetExtraction, SyncStatus};
pub use table::{extract_table, primary_key_column, ExtractionOutcome, TableExtraction, DEFAULT_SCHEMA};

/// Per-invocation telemetry handle.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    span: Span,
}

impl RunContext {
    pub fn new(task: &str, source: &str) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("sluice_task", task, source, run_id = %run_id);
        Self { run_id, span }
    }

    /// Wraps a span the caller already owns, e.g. one opened by the orchestrator glue.
    pub fn with_span(span: Span) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
