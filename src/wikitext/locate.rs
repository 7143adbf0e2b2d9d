use std::sync::LazyLock;

use regex::Regex;

/// Field every real ArticleHistory invocation carries.
pub const MARKER_FIELD: &str = "currentstatus";

// Body may contain one level of nested `{{...}}` (e.g. date templates).
static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s)\{{\{{\s*[Aa]rticle[ _]?[Hh]istory\b((?:[^{{}}]|\{{\{{[^{{}}]*\}}\}})*?{}(?:[^{{}}]|\{{\{{[^{{}}]*\}}\}})*?)\}}\}}",
        MARKER_FIELD
    ))
    .unwrap()
});

/// The selected template body and how many candidates competed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub body: String,
    pub occurrences: usize,
}

impl Located {
    pub fn is_ambiguous(&self) -> bool {
        self.occurrences > 1
    }
}

/// Find the ArticleHistory invocation in raw wikitext.
///
/// Returns `None` when the page carries no annotation. With several
/// invocations the first one wins and `occurrences` reports the count.
pub fn locate(raw_text: &str) -> Option<Located> {
    let mut bodies = TEMPLATE_RE
        .captures_iter(raw_text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()));

    let first = bodies.next()?;
    let occurrences = 1 + bodies.count();

    Some(Located {
        body: first
            .trim_matches(|c: char| c.is_whitespace() || c == '|')
            .to_string(),
        occurrences,
    })
}

// ── Tests ──
