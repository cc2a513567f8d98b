//! Brute-force nonce search over one assigned range.
//!
//! The scan is first-match: nonces are tried in increasing order and the
//! first one whose hash is below the target ends the search. A cancelled or
//! expired scan never yields a candidate.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use primitive_types::U256;

use crate::{
    hash,
    types::{Candidate, NonceRange, WorkerId},
};

/// Nonces between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Control handles shared between a running search and its owner.
#[derive(Debug, Clone, Default)]
pub struct SearchControl {
    cancel: Arc<AtomicBool>,
    hashes: Arc<AtomicU64>,
    deadline: Option<Instant>,
}

impl SearchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Report hashes into an externally owned counter.
    pub fn with_counter(mut self, hashes: Arc<AtomicU64>) -> Self {
        self.hashes = hashes;
        self
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Total hashes counted so far. Observers sample this; the search never
    /// waits on them.
    pub fn hashes(&self) -> u64 {
        self.hashes.load(Ordering::Relaxed)
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Candidate),
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    pub hashes: u64,
    pub elapsed: Duration,
}

impl SearchReport {
    pub fn candidate(&self) -> Option<&Candidate> {
        match &self.outcome {
            SearchOutcome::Found(candidate) => Some(candidate),
            _ => None,
        }
    }

    pub fn hash_rate(&self) -> hash::HashRate {
        hash::HashRate::from_count(self.hashes, self.elapsed)
    }
}

/// Scan `range` (inclusive) for the first nonce whose hash meets `target`.
pub fn search(
    block: &str,
    target: &U256,
    range: NonceRange,
    worker_id: &WorkerId,
    control: &SearchControl,
) -> SearchReport {
    let start = Instant::now();
    let mut hashes = 0u64;

    let outcome = 'scan: {
        if range.is_empty() {
            break 'scan SearchOutcome::Exhausted;
        }

        let mut nonce = range.start;
        loop {
            if control.is_cancelled() {
                break 'scan SearchOutcome::Cancelled;
            }
            if hashes % DEADLINE_CHECK_INTERVAL == 0 && control.expired() {
                break 'scan SearchOutcome::Cancelled;
            }

            let hx = hash::compute(block, nonce);
            hashes += 1;
            control.hashes.fetch_add(1, Ordering::Relaxed);

            if hash::meets_target(&hx, target) {
                break 'scan SearchOutcome::Found(Candidate {
                    worker_id: worker_id.clone(),
                    nonce,
                    hash: hx,
                });
            }

            if nonce == range.end {
                break 'scan SearchOutcome::Exhausted;
            }
            nonce += 1;
        }
    };

    SearchReport { outcome, hashes, elapsed: start.elapsed() }
}
