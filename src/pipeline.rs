use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::{self, FetchedDocument, WikiApi};
use crate::config::Settings;
use crate::fetch::{self, Cancel};
use crate::history::{self, AggregateReport, DocumentFailure, DocumentOutcome, HistoryAggregate};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// How the run reacts to a batch whose request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BatchErrorPolicy {
    /// Log the failure, count its ids and keep draining.
    #[default]
    Skip,
    /// Stop submitting batches and fail the run.
    Abort,
}

/// Totals and sorted histories for one run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub enumerated: usize,
    pub selected: usize,
    pub fetched: usize,
    pub failed_batches: usize,
    pub unfetched_ids: usize,
    pub cancelled: bool,
    pub skipped: usize,
    pub histories: Vec<HistoryAggregate>,
    pub failures: Vec<DocumentFailure>,
}

impl RunReport {
    pub fn aggregated(&self) -> usize {
        self.histories.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(feature = "rayon")]
fn mine_batch(docs: &[FetchedDocument]) -> Vec<(String, DocumentOutcome)> {
    docs.par_iter()
        .map(|d| (d.canonical_title.clone(), history::mine(d)))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn mine_batch(docs: &[FetchedDocument]) -> Vec<(String, DocumentOutcome)> {
    docs.iter()
        .map(|d| (d.canonical_title.clone(), history::mine(d)))
        .collect()
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} articles ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Enumerate, fetch and mine. Histories come back sorted by recency.
pub async fn run(api: Arc<dyn WikiApi>, settings: &Settings, cancel: Cancel) -> Result<RunReport> {
    let members = api::enumerate(api.as_ref(), &settings.category, settings.limit)
        .await
        .with_context(|| format!("Failed to enumerate pages embedding {}", settings.category))?;

    let enumerated = members.len();
    let ids: Vec<u64> = members
        .iter()
        .filter(|m| settings.namespace.map_or(true, |ns| m.namespace == ns))
        .map(|m| m.id)
        .collect();
    info!(enumerated, selected = ids.len(), namespace = ?settings.namespace, "members selected");

    let mut report = RunReport {
        enumerated,
        selected: ids.len(),
        ..Default::default()
    };
    if ids.is_empty() {
        return Ok(report);
    }

    let pb = progress_bar(ids.len());
    let mut stream = fetch::fetch(Arc::clone(&api), ids, settings.fetch_options(), cancel.clone());
    let mut aggregates = AggregateReport::default();

    while let Some(batch) = stream.next().await {
        let docs = match batch.result {
            Ok(docs) => docs,
            Err(e) => match settings.on_batch_error {
                BatchErrorPolicy::Skip => {
                    warn!(ids = ?batch.ids, error = %e, "batch failed, skipping");
                    report.failed_batches += 1;
                    report.unfetched_ids += batch.ids.len();
                    pb.inc(batch.ids.len() as u64);
                    continue;
                }
                BatchErrorPolicy::Abort => {
                    cancel.raise();
                    pb.abandon();
                    return Err(e).with_context(|| format!("Batch {:?} failed", batch.ids));
                }
            },
        };

        report.fetched += docs.len();
        for (title, outcome) in mine_batch(&docs) {
            aggregates.record(&title, outcome);
        }
        pb.inc(batch.ids.len() as u64);
    }
    pb.finish_and_clear();

    let not_submitted = stream.total_batches() - stream.submitted();
    if not_submitted > 0 {
        report.cancelled = true;
        warn!(batches = not_submitted, "run cancelled before all batches were submitted");
    }

    let aggregates = aggregates.finish();
    report.skipped = aggregates.skipped;
    report.failures = aggregates.failures;
    report.histories = aggregates.histories;

    info!(
        fetched = report.fetched,
        aggregated = report.aggregated(),
        skipped = report.skipped,
        failed = report.failed(),
        failed_batches = report.failed_batches,
        "run complete"
    );
    Ok(report)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::memory::MemoryWiki;
    use crate::history::LastUpdated;

    fn settings() -> Settings {
        let mut s = Settings::defaults().unwrap();
        s.limit = 100;
        s.grouping = 2;
        s.concurrency = 3;
        s
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.wikitext", name)).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_one_annotated_of_three() {
        let wiki = Arc::new(
            MemoryWiki::with_pages(3)
                .with_text(1, &fixture("plain"))
                .with_text(2, &fixture("two_actions"))
                .with_text(3, "No annotation here."),
        );
        let report = run(wiki, &settings(), Cancel::new()).await.unwrap();

        assert_eq!(report.enumerated, 3);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.aggregated(), 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed(), 0);

        let h = &report.histories[0];
        assert_eq!(h.document_id, 2);
        assert_eq!(h.actions.len(), 2);
        assert_eq!(h.actions.iter().map(|a| a.index).collect::<Vec<_>>(), [1, 2]);
        match h.last_updated {
            LastUpdated::At(t) => assert_eq!(t.format("%Y-%m-%d").to_string(), "2015-08-21"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_document_fails_alone() {
        let wiki = Arc::new(
            MemoryWiki::with_pages(4)
                .with_text(1, &fixture("missing_kind"))
                .with_text(2, &fixture("two_actions"))
                .with_text(3, "{{ArticleHistory|action1=GAN|action1date=2001-01-01|currentstatus=GA}}"),
        );
        let report = run(wiki, &settings(), Cancel::new()).await.unwrap();
        assert_eq!(report.aggregated(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures[0].title, MemoryWiki::title_of(1));
        // Sorted oldest first.
        assert_eq!(report.histories[0].document_id, 3);
        assert_eq!(report.histories[1].document_id, 2);
    }

    #[tokio::test]
    async fn skip_policy_counts_failed_batches() {
        let wiki = Arc::new(
            MemoryWiki::with_pages(6)
                .failing_on(3)
                .with_text(5, &fixture("two_actions")),
        );
        let report = run(wiki, &settings(), Cancel::new()).await.unwrap();
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.unfetched_ids, 2);
        assert_eq!(report.fetched, 4);
        assert_eq!(report.aggregated(), 1);
    }

    #[tokio::test]
    async fn abort_policy_fails_run() {
        let wiki = Arc::new(MemoryWiki::with_pages(6).failing_on(3));
        let mut s = settings();
        s.on_batch_error = BatchErrorPolicy::Abort;
        let cancel = Cancel::new();
        let err = run(wiki, &s, cancel.clone()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("failed"));
        assert!(cancel.is_raised());
    }

    #[tokio::test]
    async fn namespace_filter_applies() {
        let wiki = Arc::new(MemoryWiki::with_pages(5));
        let mut s = settings();
        s.namespace = Some(0);
        let report = run(wiki, &s, Cancel::new()).await.unwrap();
        assert_eq!(report.enumerated, 5);
        assert_eq!(report.selected, 0);
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_run_submits_nothing() {
        let wiki = Arc::new(MemoryWiki::with_pages(8).latency(Duration::from_millis(5)));
        let cancel = Cancel::new();
        cancel.raise();
        let report = run(wiki.clone(), &settings(), cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.fetched, 0);
        assert_eq!(wiki.revision_calls(), 0);
    }
}
