//! In-memory wiki used by the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::types::{CategoryMember, FetchedDocument, MemberPage, RevisionRequest};
use super::WikiApi;
use crate::error::ApiError;

pub struct MemoryWiki {
    total: usize,
    page_cap: usize,
    overlap: usize,
    fail_listing_after: Option<usize>,
    texts: HashMap<u64, String>,
    missing: HashSet<u64>,
    failing: HashSet<u64>,
    latency: Duration,
    listing_calls: Mutex<Vec<(String, usize)>>,
    revision_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryWiki {
    /// Pages with ids `1..=total`, all in the talk namespace.
    pub fn with_pages(total: usize) -> Self {
        Self {
            total,
            page_cap: usize::MAX,
            overlap: 0,
            fail_listing_after: None,
            texts: HashMap::new(),
            missing: HashSet::new(),
            failing: HashSet::new(),
            latency: Duration::ZERO,
            listing_calls: Mutex::new(Vec::new()),
            revision_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn page_cap(mut self, cap: usize) -> Self {
        self.page_cap = cap;
        self
    }

    /// Each listing page re-serves the last `n` members of the previous one.
    pub fn overlapping_pages(mut self, n: usize) -> Self {
        self.overlap = n;
        self
    }

    pub fn fail_listing_after(mut self, calls: usize) -> Self {
        self.fail_listing_after = Some(calls);
        self
    }

    pub fn with_text(mut self, id: u64, text: &str) -> Self {
        self.texts.insert(id, text.to_string());
        self
    }

    /// The id is listed but resolves to nothing when fetched.
    pub fn without_document(mut self, id: u64) -> Self {
        self.missing.insert(id);
        self
    }

    /// Any batch containing this id fails.
    pub fn failing_on(mut self, id: u64) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requested_limits(&self) -> Vec<usize> {
        self.listing_calls.lock().unwrap().iter().map(|(_, l)| *l).collect()
    }

    pub fn requested_titles(&self) -> Vec<String> {
        self.listing_calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn revision_calls(&self) -> usize {
        self.revision_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn title_of(id: u64) -> String {
        format!("Talk:Page {}", id)
    }
}

#[async_trait]
impl WikiApi for MemoryWiki {
    async fn embedded_in(
        &self,
        title: &str,
        limit: usize,
        continuation: Option<&str>,
    ) -> Result<MemberPage, ApiError> {
        let calls = {
            let mut log = self.listing_calls.lock().unwrap();
            log.push((title.to_string(), limit));
            log.len()
        };
        if self.fail_listing_after.is_some_and(|n| calls > n) {
            return Err(ApiError::decode("memory", "listing is not a page map"));
        }

        let offset: usize = continuation.map_or(0, |t| t.parse().unwrap());
        let end = (offset + limit.min(self.page_cap)).min(self.total);
        let members = (offset..end)
            .map(|i| {
                let id = i as u64 + 1;
                CategoryMember {
                    id,
                    namespace: 1,
                    title: Self::title_of(id),
                }
            })
            .collect();
        let continuation = (end < self.total).then(|| end.saturating_sub(self.overlap).to_string());

        Ok(MemberPage {
            members,
            continuation,
        })
    }

    async fn fetch_revisions(
        &self,
        ids: &[u64],
        _request: &RevisionRequest,
    ) -> Result<Vec<FetchedDocument>, ApiError> {
        self.revision_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        // Later batches finish first so completion order differs from submission.
        let first = ids.first().copied().unwrap_or(0);
        let jitter = if first % 2 == 0 { self.latency } else { self.latency * 3 };
        tokio::time::sleep(jitter).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if ids.iter().any(|id| self.failing.contains(id)) {
            return Err(ApiError::Remote(format!("batch starting at {} failed", first)));
        }

        Ok(ids
            .iter()
            .filter(|id| (1..=self.total as u64).contains(id) && !self.missing.contains(id))
            .map(|&id| FetchedDocument {
                title: Self::title_of(id),
                canonical_title: Self::title_of(id),
                id,
                revision_id: id * 100,
                raw_text: self.texts.get(&id).cloned().unwrap_or_default(),
                fetch_timestamp: Utc::now(),
            })
            .collect())
    }
}
