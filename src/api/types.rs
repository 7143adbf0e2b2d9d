use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A page embedding the template, as listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CategoryMember {
    pub id: u64,
    pub namespace: i64,
    pub title: String,
}

/// One page of an `embeddedin` listing.
#[derive(Debug, Clone, Default)]
pub struct MemberPage {
    pub members: Vec<CategoryMember>,
    pub continuation: Option<String>,
}

/// Latest revision of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    /// Title as requested, before redirect resolution.
    pub title: String,
    /// Title as returned by the service.
    pub canonical_title: String,
    pub id: u64,
    pub revision_id: u64,
    pub raw_text: String,
    pub fetch_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ContentFormat {
    #[default]
    Wikitext,
    Html,
}

/// What to do when several titles redirect to the same page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RedirectPolicy {
    /// Leave colliding redirects unresolved.
    #[default]
    Unresolved,
    KeepFirst,
    KeepLast,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionRequest {
    pub format: ContentFormat,
    pub follow_redirects: bool,
    pub redirect_policy: RedirectPolicy,
}

// ── Wire envelopes ──

#[derive(Debug, Deserialize)]
pub struct QueryEnvelope {
    pub query: Option<QueryBody>,
    #[serde(rename = "query-continue")]
    pub query_continue: Option<LegacyContinue>,
    #[serde(rename = "continue")]
    pub continuation: Option<Continue>,
    pub error: Option<RemoteError>,
    pub batchcomplete: Option<serde_json::Value>,
    pub servedby: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub pages: IndexMap<String, Option<RawPage>>,
    #[serde(default)]
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Deserialize)]
pub struct RawPage {
    pub pageid: Option<u64>,
    pub ns: Option<i64>,
    pub title: Option<String>,
    #[serde(default)]
    pub revisions: Vec<RawRevision>,
}

#[derive(Debug, Deserialize)]
pub struct RawRevision {
    pub revid: u64,
    #[serde(rename = "*")]
    pub content: Option<String>,
    pub slots: Option<RawSlots>,
}

#[derive(Debug, Deserialize)]
pub struct RawSlots {
    pub main: RawSlot,
}

#[derive(Debug, Deserialize)]
pub struct RawSlot {
    #[serde(rename = "*")]
    pub content: Option<String>,
}

impl RawRevision {
    fn into_content(self) -> Option<String> {
        self.content
            .or_else(|| self.slots.and_then(|s| s.main.content))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Redirect {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct LegacyContinue {
    pub embeddedin: Option<GeiContinue>,
}

#[derive(Debug, Deserialize)]
pub struct GeiContinue {
    pub geicontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Continue {
    pub geicontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteError {
    pub code: Option<String>,
    pub info: Option<String>,
}

impl RemoteError {
    pub fn describe(&self) -> String {
        match (&self.code, &self.info) {
            (Some(c), Some(i)) => format!("{} {}", c, i),
            (Some(c), None) => c.clone(),
            (None, Some(i)) => i.clone(),
            (None, None) => "unspecified error".to_string(),
        }
    }
}

impl QueryEnvelope {
    /// Token for the next `embeddedin` page. Both legacy and current layouts.
    pub fn next_token(&self) -> Option<String> {
        self.query_continue
            .as_ref()
            .and_then(|qc| qc.embeddedin.as_ref())
            .and_then(|e| e.geicontinue.clone())
            .or_else(|| self.continuation.as_ref().and_then(|c| c.geicontinue.clone()))
    }

    /// Members with a resolvable identity; deleted or invalid entries are dropped.
    pub fn into_member_page(self) -> Option<MemberPage> {
        let continuation = self.next_token();
        let query = match self.query {
            Some(q) => q,
            // An exhausted generator omits `query` entirely.
            None if self.batchcomplete.is_some() => {
                return Some(MemberPage {
                    members: Vec::new(),
                    continuation,
                })
            }
            None => return None,
        };

        let members = query
            .pages
            .into_values()
            .flatten()
            .filter_map(|p| {
                Some(CategoryMember {
                    id: p.pageid?,
                    namespace: p.ns?,
                    title: p.title?,
                })
            })
            .collect();

        Some(MemberPage {
            members,
            continuation,
        })
    }

    /// Documents carried by a revisions query.
    pub fn into_documents(
        self,
        policy: RedirectPolicy,
        fetched_at: DateTime<Utc>,
    ) -> Option<Vec<FetchedDocument>> {
        let query = match self.query {
            Some(q) => q,
            None if self.batchcomplete.is_some() => return Some(Vec::new()),
            None => return None,
        };
        let redirects = RedirectMap::build(&query.redirects, policy);

        let docs = query
            .pages
            .into_values()
            .flatten()
            .filter_map(|p| {
                let id = p.pageid?;
                let canonical_title = p.title?;
                let revision = p.revisions.into_iter().next()?;
                let revision_id = revision.revid;
                let raw_text = revision.into_content()?;
                Some(FetchedDocument {
                    title: redirects.original_title(&canonical_title).to_string(),
                    canonical_title,
                    id,
                    revision_id,
                    raw_text,
                    fetch_timestamp: fetched_at,
                })
            })
            .collect();
        Some(docs)
    }
}

/// Resolved title → requested title.
#[derive(Debug, Default)]
pub struct RedirectMap {
    original_by_resolved: HashMap<String, String>,
}

impl RedirectMap {
    pub fn build(redirects: &[Redirect], policy: RedirectPolicy) -> Self {
        let mut original_by_resolved: HashMap<String, String> = HashMap::new();
        let mut collided: HashSet<&str> = HashSet::new();

        for r in redirects {
            if collided.contains(r.to.as_str()) {
                continue;
            }
            let Some(existing) = original_by_resolved.get(&r.to) else {
                original_by_resolved.insert(r.to.clone(), r.from.clone());
                continue;
            };
            warn!(
                resolved = %r.to,
                first = %existing,
                other = %r.from,
                ?policy,
                "several titles redirect to the same page"
            );
            match policy {
                RedirectPolicy::KeepFirst => {}
                RedirectPolicy::KeepLast => {
                    original_by_resolved.insert(r.to.clone(), r.from.clone());
                }
                RedirectPolicy::Unresolved => {
                    original_by_resolved.remove(&r.to);
                    collided.insert(r.to.as_str());
                }
            }
        }

        RedirectMap {
            original_by_resolved,
        }
    }

    pub fn original_title<'a>(&'a self, resolved: &'a str) -> &'a str {
        self.original_by_resolved
            .get(resolved)
            .map_or(resolved, String::as_str)
    }
}
