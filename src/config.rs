use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;

use crate::api::{ContentFormat, RedirectPolicy, RevisionRequest};
use crate::fetch::FetchOptions;
use crate::pipeline::BatchErrorPolicy;

pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
pub const DEFAULT_TEMPLATE: &str = "ArticleHistory";
const USER_AGENT: &str = concat!("article_history/", env!("CARGO_PKG_VERSION"));

/// Run settings: built-in defaults, then `AH_*` environment variables,
/// then command-line flags (applied by the caller).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub user_agent: String,
    pub category: String,
    pub limit: usize,
    pub concurrency: usize,
    pub grouping: usize,
    pub timeout_secs: u64,
    /// Only members of this namespace are fetched; `None` keeps all.
    pub namespace: Option<i64>,
    pub on_batch_error: BatchErrorPolicy,
    pub redirects: RedirectPolicy,
    pub follow_redirects: bool,
    pub content_format: ContentFormat,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::with_defaults()?
            .add_source(Environment::with_prefix("AH").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only, ignoring the environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults()?.build()?.try_deserialize()
    }

    fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("user_agent", USER_AGENT)?
            .set_default("category", DEFAULT_TEMPLATE)?
            .set_default("limit", 100)?
            .set_default("concurrency", 100)?
            .set_default("grouping", 4)?
            .set_default("timeout_secs", 30)?
            .set_default("namespace", 1)?
            .set_default("on_batch_error", "skip")?
            .set_default("redirects", "unresolved")?
            .set_default("follow_redirects", false)?
            .set_default("content_format", "wikitext")
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            batch_size: self.grouping.max(1),
            concurrency: self.concurrency.max(1),
            request_timeout: Duration::from_secs(self.timeout_secs.max(1)),
            request: RevisionRequest {
                format: self.content_format,
                follow_redirects: self.follow_redirects,
                redirect_policy: self.redirects,
            },
        }
    }
}
