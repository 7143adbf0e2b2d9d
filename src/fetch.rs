use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info};

use crate::api::{FetchedDocument, RevisionRequest, WikiApi};
use crate::error::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Page ids per remote request.
    pub batch_size: usize,
    /// Maximum requests in flight.
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub request: RevisionRequest,
}

/// Shared stop signal. Raising it stops new batch submissions.
#[derive(Debug, Clone)]
pub struct Cancel {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancel {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

/// One group's outcome, delivered when its request completes.
#[derive(Debug)]
pub struct FetchedBatch {
    pub ids: Vec<u64>,
    pub result: Result<Vec<FetchedDocument>, ApiError>,
}

/// Completed batches in completion order. Single pass; drain it fully to
/// be sure every identifier was attempted.
pub struct BatchStream {
    rx: mpsc::Receiver<FetchedBatch>,
    total_batches: usize,
    submitted: Arc<AtomicUsize>,
}

impl BatchStream {
    pub async fn next(&mut self) -> Option<FetchedBatch> {
        self.rx.recv().await
    }

    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// Batches handed to the worker pool so far.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

/// Fetch `ids` in groups of `batch_size` with at most `concurrency`
/// requests in flight.
pub fn fetch(
    api: Arc<dyn WikiApi>,
    ids: Vec<u64>,
    options: FetchOptions,
    cancel: Cancel,
) -> BatchStream {
    let batch_size = options.batch_size.max(1);
    let concurrency = options.concurrency.max(1);
    let batches: Vec<Vec<u64>> = ids.chunks(batch_size).map(<[u64]>::to_vec).collect();
    let total_batches = batches.len();
    let submitted = Arc::new(AtomicUsize::new(0));

    info!(
        ids = ids.len(),
        batches = total_batches,
        batch_size,
        concurrency,
        "fetching revisions"
    );

    // Channel: workers send batches, consumer drains in completion order
    let (tx, rx) = mpsc::channel::<FetchedBatch>(concurrency * 2);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let counter = Arc::clone(&submitted);

    tokio::spawn(async move {
        for batch in batches {
            let permit = tokio::select! {
                biased;
                _ = cancel.raised() => {
                    info!(
                        submitted = counter.load(Ordering::SeqCst),
                        total = total_batches,
                        "cancelled, no further batches submitted"
                    );
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            counter.fetch_add(1, Ordering::SeqCst);
            let api = Arc::clone(&api);
            let tx = tx.clone();
            let request = options.request;
            let timeout = options.request_timeout;

            tokio::spawn(async move {
                let _permit = permit;
                let result = match tokio::time::timeout(timeout, api.fetch_revisions(&batch, &request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ApiError::Timeout(timeout)),
                };
                debug!(first = ?batch.first(), ok = result.is_ok(), "batch complete");
                let _ = tx.send(FetchedBatch { ids: batch, result }).await;
            });
        }
        // Our tx drops here; rx closes once every worker has reported.
    });

    BatchStream {
        rx,
        total_batches,
        submitted,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::api::memory::MemoryWiki;

    fn options(batch_size: usize, concurrency: usize) -> FetchOptions {
        FetchOptions {
            batch_size,
            concurrency,
            request_timeout: Duration::from_secs(30),
            request: RevisionRequest::default(),
        }
    }

    async fn drain(stream: &mut BatchStream) -> Vec<FetchedBatch> {
        let mut out = Vec::new();
        while let Some(b) = stream.next().await {
            out.push(b);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn documents_independent_of_batching() {
        let ids: Vec<u64> = (1..=37).collect();
        let expected: HashSet<u64> = ids.iter().copied().filter(|id| *id != 9 && *id != 30).collect();

        for batch_size in [1, 4, 100] {
            for concurrency in [1, 3, 50] {
                let wiki = Arc::new(
                    MemoryWiki::with_pages(37)
                        .without_document(9)
                        .without_document(30)
                        .latency(Duration::from_millis(5)),
                );
                let mut stream = fetch(wiki.clone(), ids.clone(), options(batch_size, concurrency), Cancel::new());
                let got: HashSet<u64> = drain(&mut stream)
                    .await
                    .into_iter()
                    .flat_map(|b| b.result.unwrap())
                    .map(|d| d.id)
                    .collect();
                assert_eq!(got, expected, "batch_size={} concurrency={}", batch_size, concurrency);
                assert_eq!(wiki.revision_calls(), 37_usize.div_ceil(batch_size));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn yields_in_completion_order() {
        let wiki = Arc::new(MemoryWiki::with_pages(4).latency(Duration::from_millis(10)));
        let mut stream = fetch(wiki, vec![1, 2, 3, 4], options(1, 4), Cancel::new());
        let order: Vec<u64> = drain(&mut stream).await.iter().map(|b| b.ids[0]).collect();
        // Odd ids are slower in the memory wiki.
        let mut fast = order[..2].to_vec();
        fast.sort_unstable();
        assert_eq!(fast, [2, 4]);
        assert_eq!(order.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_capped() {
        let wiki = Arc::new(MemoryWiki::with_pages(40).latency(Duration::from_millis(10)));
        let mut stream = fetch(wiki.clone(), (1..=40).collect(), options(2, 3), Cancel::new());
        assert_eq!(stream.total_batches(), 20);
        drain(&mut stream).await;
        assert!(wiki.peak_in_flight() <= 3);
        assert!(wiki.peak_in_flight() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batch_does_not_abort_siblings() {
        let wiki = Arc::new(MemoryWiki::with_pages(12).failing_on(6).latency(Duration::from_millis(1)));
        let mut stream = fetch(wiki, (1..=12).collect(), options(4, 3), Cancel::new());
        let batches = drain(&mut stream).await;
        assert_eq!(batches.len(), 3);
        let failed: Vec<_> = batches.iter().filter(|b| b.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].ids, [5, 6, 7, 8]);
        let docs: usize = batches.iter().filter_map(|b| b.result.as_ref().ok()).map(Vec::len).sum();
        assert_eq!(docs, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_times_out() {
        let wiki = Arc::new(MemoryWiki::with_pages(2).latency(Duration::from_secs(10)));
        let mut opts = options(1, 2);
        opts.request_timeout = Duration::from_millis(50);
        let batches = drain(&mut fetch(wiki, vec![1, 2], opts, Cancel::new())).await;
        assert_eq!(batches.len(), 2);
        assert!(batches
            .iter()
            .all(|b| matches!(b.result, Err(ApiError::Timeout(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_new_submissions() {
        let wiki = Arc::new(MemoryWiki::with_pages(20).latency(Duration::from_millis(10)));
        let cancel = Cancel::new();
        let mut stream = fetch(wiki.clone(), (1..=20).collect(), options(1, 1), cancel.clone());

        let first = stream.next().await.unwrap();
        assert!(first.result.is_ok());
        cancel.raise();
        let rest = drain(&mut stream).await;

        assert!(stream.submitted() < stream.total_batches());
        assert!(1 + rest.len() < 20);
        assert_eq!(wiki.revision_calls(), stream.submitted());
    }

    #[tokio::test]
    async fn empty_input_ends_immediately() {
        let wiki = Arc::new(MemoryWiki::with_pages(0));
        let mut stream = fetch(wiki, Vec::new(), options(4, 4), Cancel::new());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.total_batches(), 0);
    }
}
