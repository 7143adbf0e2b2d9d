use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

use super::dates::{parse_action_date, DATE_SENTINEL};
use crate::diagnostics::Diagnostic;
use crate::error::HistoryError;
use crate::wikitext::TemplateArguments;

static ACTION_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^action(\d+)(.*)$").unwrap());

/// One reviewed/promoted/demoted event from the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub index: u32,
    pub kind: String,
    pub date: NaiveDateTime,
    pub date_is_valid: bool,
    pub raw_date: Option<String>,
    pub cross_reference: Option<String>,
    pub outcome: Option<String>,
    pub prior_revision_id: Option<String>,
}

impl ActionRecord {
    /// Build from collected sub-fields. The ordinal-named key must be
    /// present, though its value may be blank.
    pub fn from_fields(index: u32, fields: ActionFields) -> Result<Self, HistoryError> {
        let kind = fields.kind.ok_or_else(|| HistoryError::MissingField {
            ordinal: index,
            field: format!("action{}", index),
        })?;

        let raw_date = non_blank(fields.date);
        let parsed = raw_date.as_deref().and_then(parse_action_date);

        Ok(ActionRecord {
            index,
            kind,
            date: parsed.unwrap_or(*DATE_SENTINEL),
            date_is_valid: parsed.is_some(),
            raw_date,
            cross_reference: non_blank(fields.link),
            outcome: non_blank(fields.result),
            prior_revision_id: non_blank(fields.oldid),
        })
    }

    /// The date, only when it was actually parsed.
    pub fn valid_date(&self) -> Option<NaiveDateTime> {
        self.date_is_valid.then_some(self.date)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Sub-fields collected for one ordinal. `Some` means the key was seen,
/// even with a blank value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActionFields {
    kind: Option<String>,
    date: Option<String>,
    link: Option<String>,
    result: Option<String>,
    oldid: Option<String>,
}

pub enum SetField {
    Accepted,
    Duplicate,
    Unknown,
}

impl ActionFields {
    pub fn set(&mut self, field: &str, value: &str) -> SetField {
        let slot = match field {
            "" => &mut self.kind,
            "date" => &mut self.date,
            "link" => &mut self.link,
            "result" => &mut self.result,
            "oldid" => &mut self.oldid,
            _ => return SetField::Unknown,
        };
        if slot.is_some() {
            return SetField::Duplicate;
        }
        *slot = Some(value.trim().to_string());
        SetField::Accepted
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionSequence {
    pub actions: Vec<ActionRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Regroup `actionN*` arguments into records ordered by numeric ordinal.
pub fn build(args: &TemplateArguments) -> Result<ActionSequence, HistoryError> {
    let mut grouped: BTreeMap<u32, ActionFields> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for (key, value) in args.iter() {
        let Some(caps) = ACTION_KEY_RE.captures(key) else {
            continue;
        };
        let Ok(ordinal) = caps[1].parse::<u32>() else {
            tracing::debug!(key, "action ordinal out of range");
            continue;
        };
        let field = caps.get(2).map_or("", |m| m.as_str());

        match grouped.entry(ordinal).or_default().set(field, value) {
            SetField::Accepted => {}
            SetField::Duplicate => diagnostics.push(Diagnostic::DuplicateKey {
                key: key.to_string(),
            }),
            SetField::Unknown => diagnostics.push(Diagnostic::UnknownActionField {
                ordinal,
                field: field.to_string(),
            }),
        }
    }

    let mut actions = Vec::with_capacity(grouped.len());
    for (ordinal, fields) in grouped {
        let action = ActionRecord::from_fields(ordinal, fields)?;
        if !action.date_is_valid {
            diagnostics.push(Diagnostic::UnparsableDate {
                ordinal,
                raw: action.raw_date.clone(),
            });
        }
        actions.push(action);
    }

    Ok(ActionSequence {
        actions,
        diagnostics,
    })
}

// ── Tests ──
