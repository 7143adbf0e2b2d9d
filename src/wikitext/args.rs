use indexmap::IndexMap;
use serde::Serialize;

use crate::diagnostics::Diagnostic;

/// Ordered template arguments with unique, non-blank keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TemplateArguments {
    entries: IndexMap<String, String>,
}

impl TemplateArguments {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render back to a `key=value|key=value` body.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Accumulates arguments, refusing blank and repeated keys.
#[derive(Debug, Default)]
pub struct TemplateArgumentsBuilder {
    entries: IndexMap<String, String>,
}

impl TemplateArgumentsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one argument. The first occurrence of a key wins.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), Diagnostic> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Diagnostic::BlankKey {
                entry: format!("={}", value.trim()),
            });
        }
        if self.entries.contains_key(key) {
            return Err(Diagnostic::DuplicateKey {
                key: key.to_string(),
            });
        }
        self.entries.insert(key.to_string(), value.trim().to_string());
        Ok(())
    }

    pub fn build(self) -> TemplateArguments {
        TemplateArguments {
            entries: self.entries,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedArguments {
    pub arguments: TemplateArguments,
    pub diagnostics: Vec<Diagnostic>,
}

/// Split a template body into arguments. Malformed entries are dropped
/// and reported, never fatal.
/// Split on `|` outside nested `{{...}}` templates and `[[...]]` links.
fn split_top_level(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut start = 0;
    let mut parts = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'{', Some(b'{')) | (b'[', Some(b'[')) => {
                depth += 1;
                i += 2;
                continue;
            }
            (b'}', Some(b'}')) | (b']', Some(b']')) if depth > 0 => {
                depth -= 1;
                i += 2;
                continue;
            }
            (b'|', _) if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&body[start..]);
    parts
}

pub fn parse(body: &str) -> ParsedArguments {
    let mut builder = TemplateArgumentsBuilder::new();
    let mut diagnostics = Vec::new();

    for entry in split_top_level(body).into_iter().map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
        if let Err(diag) = builder.insert(key, value) {
            tracing::debug!(%diag, "dropped template argument");
            diagnostics.push(diag);
        }
    }

    ParsedArguments {
        arguments: builder.build(),
        diagnostics,
    }
}

// ── Tests ──
