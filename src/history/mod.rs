pub mod action;
pub mod dates;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::FetchedDocument;
use crate::diagnostics::Diagnostic;
use crate::error::HistoryError;
use crate::wikitext::{self, TemplateArguments};
pub use action::{ActionRecord, ActionSequence};

pub const UNKNOWN_STATUS: &str = "unknown";
const STATUS_FIELD: &str = "currentstatus";

/// Recency of a history. Ordered `NoHistory < Undated < At(_)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "state", content = "at", rename_all = "snake_case")]
pub enum LastUpdated {
    /// The template lists no actions at all.
    NoHistory,
    /// Actions exist but none carries a parsable date.
    Undated,
    At(NaiveDateTime),
}

impl LastUpdated {
    pub fn from_actions(actions: &[ActionRecord]) -> Self {
        if actions.is_empty() {
            return LastUpdated::NoHistory;
        }
        actions
            .iter()
            .filter_map(ActionRecord::valid_date)
            .max()
            .map_or(LastUpdated::Undated, LastUpdated::At)
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            LastUpdated::At(t) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryAggregate {
    pub document_title: String,
    pub document_id: u64,
    pub revision_id: u64,
    pub status: String,
    pub actions: Vec<ActionRecord>,
    pub chronological_actions: Vec<ActionRecord>,
    pub last_updated: LastUpdated,
    pub raw_arguments: TemplateArguments,
    pub diagnostics: Vec<Diagnostic>,
}

/// Combine a document's identity, its actions and status.
pub fn aggregate(
    document: &FetchedDocument,
    actions: Vec<ActionRecord>,
    status: Option<&str>,
) -> HistoryAggregate {
    let status = status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_STATUS)
        .to_string();

    // Undated actions first, then by date; ties keep declared order.
    let mut chronological_actions = actions.clone();
    chronological_actions.sort_by_key(ActionRecord::valid_date);

    let last_updated = LastUpdated::from_actions(&actions);
    if last_updated == LastUpdated::NoHistory {
        warn!(title = %document.canonical_title, "no last updated time");
    }

    HistoryAggregate {
        document_title: document.canonical_title.clone(),
        document_id: document.id,
        revision_id: document.revision_id,
        status,
        actions,
        chronological_actions,
        last_updated,
        raw_arguments: TemplateArguments::default(),
        diagnostics: Vec::new(),
    }
}

/// Mine one document. `Ok(None)` when it carries no annotation.
pub fn from_document(document: &FetchedDocument) -> Result<Option<HistoryAggregate>, HistoryError> {
    let Some(located) = wikitext::locate(&document.raw_text) else {
        debug!(title = %document.canonical_title, "no ArticleHistory template");
        return Ok(None);
    };

    let mut diagnostics = Vec::new();
    if located.is_ambiguous() {
        warn!(
            title = %document.canonical_title,
            occurrences = located.occurrences,
            "multiple ArticleHistory instances found, using the first"
        );
        diagnostics.push(Diagnostic::AmbiguousTemplate {
            occurrences: located.occurrences,
        });
    }

    let parsed = wikitext::parse(&located.body);
    diagnostics.extend(parsed.diagnostics);

    let sequence = action::build(&parsed.arguments)?;
    diagnostics.extend(sequence.diagnostics);
    for diag in &diagnostics {
        debug!(title = %document.canonical_title, %diag, "template diagnostic");
    }

    let status = parsed.arguments.get(STATUS_FIELD);
    let history = aggregate(document, sequence.actions, status);

    Ok(Some(HistoryAggregate {
        raw_arguments: parsed.arguments,
        diagnostics,
        ..history
    }))
}

/// Result of mining one document.
#[derive(Debug)]
pub enum DocumentOutcome {
    Aggregated(Box<HistoryAggregate>),
    Skipped,
    Failed(HistoryError),
}

pub fn mine(document: &FetchedDocument) -> DocumentOutcome {
    match from_document(document) {
        Ok(Some(history)) => DocumentOutcome::Aggregated(Box::new(history)),
        Ok(None) => DocumentOutcome::Skipped,
        Err(e) => DocumentOutcome::Failed(e),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub title: String,
    pub error: String,
}

/// Accumulated histories plus per-document accounting.
#[derive(Debug, Default)]
pub struct AggregateReport {
    pub histories: Vec<HistoryAggregate>,
    pub skipped: usize,
    pub failures: Vec<DocumentFailure>,
}

impl AggregateReport {
    pub fn record(&mut self, title: &str, outcome: DocumentOutcome) {
        match outcome {
            DocumentOutcome::Aggregated(history) => self.histories.push(*history),
            DocumentOutcome::Skipped => self.skipped += 1,
            DocumentOutcome::Failed(e) => {
                warn!(title, error = %e, "could not build history");
                self.failures.push(DocumentFailure {
                    title: title.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn aggregated(&self) -> usize {
        self.histories.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Order histories by recency, oldest first.
    pub fn finish(mut self) -> Self {
        self.histories.sort_by_key(|h| h.last_updated);
        self
    }
}

/// Mine every document and sort the resulting histories by recency.
pub fn aggregate_all<'a>(documents: impl IntoIterator<Item = &'a FetchedDocument>) -> AggregateReport {
    let mut report = AggregateReport::default();
    for doc in documents {
        report.record(&doc.canonical_title, mine(doc));
    }
    report.finish()
}

// ── Tests ──
