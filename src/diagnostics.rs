use std::fmt;

use serde::Serialize;

/// Non-fatal findings recorded while mining one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    BlankKey { entry: String },
    DuplicateKey { key: String },
    AmbiguousTemplate { occurrences: usize },
    UnparsableDate { ordinal: u32, raw: Option<String> },
    UnknownActionField { ordinal: u32, field: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::BlankKey { entry } => write!(f, "blank key in entry {:?}", entry),
            Diagnostic::DuplicateKey { key } => write!(f, "duplicate key {:?} dropped", key),
            Diagnostic::AmbiguousTemplate { occurrences } => write!(
                f,
                "{} template instances found, using the first",
                occurrences
            ),
            Diagnostic::UnparsableDate { ordinal, raw: Some(raw) } => {
                write!(f, "action{} date {:?} could not be parsed", ordinal, raw)
            }
            Diagnostic::UnparsableDate { ordinal, raw: None } => {
                write!(f, "action{} has no date", ordinal)
            }
            Diagnostic::UnknownActionField { ordinal, field } => {
                write!(f, "action{} has unknown field {:?}", ordinal, field)
            }
        }
    }
}
