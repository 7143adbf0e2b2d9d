pub mod client;
pub mod enumerate;
#[cfg(test)]
pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::error::ApiError;
pub use client::MediaWikiClient;
pub use enumerate::enumerate;
pub use types::{
    CategoryMember, ContentFormat, FetchedDocument, MemberPage, RedirectPolicy, RevisionRequest,
};

/// The two reads the pipeline needs from a wiki.
#[async_trait]
pub trait WikiApi: Send + Sync {
    /// One page of pages embedding `title`, resuming at `continuation`.
    async fn embedded_in(
        &self,
        title: &str,
        limit: usize,
        continuation: Option<&str>,
    ) -> Result<MemberPage, ApiError>;

    /// Latest revision of each page id. Unresolvable ids are simply absent.
    async fn fetch_revisions(
        &self,
        ids: &[u64],
        request: &RevisionRequest,
    ) -> Result<Vec<FetchedDocument>, ApiError>;
}
