//! Mine `ArticleHistory` templates from wiki talk pages.
//!
//! Pipeline: enumerate embedding pages → fetch revisions in concurrent
//! batches → locate the template → parse its arguments → regroup actions →
//! aggregate per page, sorted by recency.

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fetch;
pub mod history;
pub mod pipeline;
pub mod wikitext;
