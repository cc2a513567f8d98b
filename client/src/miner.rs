use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use shared::{
    errors::RequestError,
    hash::HashRate,
    interaction::{WorkRequest, WorkResponse},
    search::{search, SearchControl, SearchOutcome},
    types::WorkerId,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::*;

use crate::stream::StreamCommand;

/// Runs one assignment at a time; a new assignment cancels the previous one.
pub struct Miner {
    worker_id: WorkerId,
    hashes: Arc<AtomicU64>,
    current: Option<SearchControl>,
}

impl Miner {
    pub fn new(worker_id: WorkerId) -> Self {
        Self { worker_id, hashes: Default::default(), current: None }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        self.hashes.clone()
    }

    /// Start searching for `request` on the blocking pool. The reply is sent
    /// to `reply_tx` unless the search gets replaced first.
    pub fn assign(
        &mut self,
        request: WorkRequest,
        reply_tx: mpsc::Sender<StreamCommand>,
    ) -> JoinHandle<()> {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }

        let mut control = SearchControl::new().with_counter(self.hashes.clone());
        if let Some(ms) = request.work_time {
            control = control.with_deadline(Instant::now() + Duration::from_millis(ms));
        }
        self.current = Some(control.clone());

        let worker_id = self.worker_id.clone();
        tokio::task::spawn_blocking(move || {
            match solve(&request, &worker_id, &control) {
                Ok(Some(reply)) => {
                    if reply_tx.blocking_send(StreamCommand::Reply(reply)).is_err() {
                        error!("command channel closed");
                    }
                }
                Ok(None) => debug!("search for {} replaced", request.request_id),
                Err(err) => warn!("ignoring invalid request {}: {err}", request.request_id),
            }
        })
    }

    pub fn shutdown(&mut self) {
        if let Some(current) = self.current.take() {
            current.cancel();
        }
    }
}

/// Validate and run one request. `Ok(None)` means the search was cancelled
/// and nobody is waiting for its answer anymore.
pub fn solve(
    request: &WorkRequest,
    worker_id: &WorkerId,
    control: &SearchControl,
) -> Result<Option<WorkResponse>, RequestError> {
    let target = request.target()?;
    let range = request.range()?;

    info!("request {}: block {}, range {range}", request.request_id, request.block);
    let report = search(&request.block, &target, range, worker_id, control);
    info!(
        "request {}: {:?} after {} hashes, {}",
        request.request_id,
        report.outcome,
        report.hashes,
        report.hash_rate()
    );

    let reply = match report.outcome {
        SearchOutcome::Found(candidate) => {
            WorkResponse::new(request.request_id.clone(), Some(&candidate))
        }
        SearchOutcome::Cancelled if control.is_cancelled() => return Ok(None),
        // exhausted, or out of time
        _ => WorkResponse::new(request.request_id.clone(), None),
    };
    Ok(Some(reply))
}

/// Log the hash rate every `interval` until shutdown.
pub async fn report_hash_rate(
    hashes: Arc<AtomicU64>,
    interval: Duration,
    mut notify_shutdown: broadcast::Receiver<()>,
) {
    let mut last = 0;
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = notify_shutdown.recv() => break,
            _ = ticker.tick() => {}
        }
        let total = hashes.load(Ordering::Relaxed);
        let rate = HashRate::from_count(total - last, interval);
        if total != last {
            info!("hash rate: {rate}, total hashes: {total}");
        }
        last = total;
    }
}
