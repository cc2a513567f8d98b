//! The round loop: fetch work, fan it out, pick the winner, submit it.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use actix::{Actor, AsyncContext, Context, WrapFuture};
use async_trait::async_trait;
use colored::Colorize;
use serde::Serialize;
use shared::{
    hash,
    interaction::SolutionSubmission,
    types::{Candidate, WorkerId},
};
use thiserror::Error;
use tokio::time::sleep;
use tracing::*;

use crate::{
    dispatch::{DispatchCoordinator, RoundResult, WorkerTransport},
    partition::PartitionError,
    select::select_winner,
    upstream::{FetchError, SubmissionSink, SubmitOutcome, WorkSource},
};

/// Where the scheduler learns which workers are connected and leaves a
/// record of every finished round.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn connected_workers(&self) -> Vec<WorkerId>;
    async fn record(&self, summary: RoundSummary);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinnerSummary {
    pub worker_id: WorkerId,
    pub nonce: u64,
    pub block_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub request_id: String,
    pub workers: usize,
    pub candidates: usize,
    pub no_solution: usize,
    pub idle: usize,
    pub failed: usize,
    pub winner: Option<WinnerSummary>,
    pub elapsed_ms: u64,
    /// unix millis
    pub finished_at: i64,
}

impl RoundSummary {
    pub fn new(
        round: &RoundResult,
        workers: usize,
        winner: Option<&Candidate>,
        elapsed: Duration,
    ) -> Self {
        Self {
            request_id: round.request_id.clone(),
            workers,
            candidates: round.candidates.len(),
            no_solution: round.no_solution.len(),
            idle: round.idle.len(),
            failed: round.failed_count(),
            winner: winner.map(|c| WinnerSummary {
                worker_id: c.worker_id.clone(),
                nonce: c.nonce,
                block_hash: hash::to_hex(&c.hash),
            }),
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: shared::timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Submitted(Candidate),
    NoCandidates,
    SubmissionFailed { candidate: Candidate, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] FetchError),
    #[error(transparent)]
    InvalidRange(#[from] PartitionError),
}

pub struct RoundRunner<T> {
    source: Arc<dyn WorkSource>,
    sink: Arc<dyn SubmissionSink>,
    registry: Arc<dyn WorkerRegistry>,
    coordinator: DispatchCoordinator<T>,
}

impl<T: WorkerTransport> RoundRunner<T> {
    pub fn new(
        source: Arc<dyn WorkSource>,
        sink: Arc<dyn SubmissionSink>,
        registry: Arc<dyn WorkerRegistry>,
        coordinator: DispatchCoordinator<T>,
    ) -> Self {
        Self { source, sink, registry, coordinator }
    }

    /// One complete round. The winner is submitted at most once.
    pub async fn run_once(&self) -> Result<RoundOutcome, RoundError> {
        let work = self.source.fetch_work().await?;
        let workers = self.registry.connected_workers().await;

        let banner = format!("==================== round {} ====================", work.request_id);
        info!("{}", banner.bold().green());
        info!(
            "block: {}, range: {}, workers: {}, deadline: {:?}",
            work.block,
            work.range,
            workers.len(),
            self.coordinator.round_timeout()
        );

        let started = Instant::now();
        let round = self.coordinator.run_round(&work, &workers).await?;
        let winner = select_winner(&work, &round);

        self.registry
            .record(RoundSummary::new(&round, workers.len(), winner.as_ref(), started.elapsed()))
            .await;

        let Some(winner) = winner else {
            info!(
                "round {}: no candidates ({} no solution, {} failed)",
                work.request_id,
                round.no_solution.len(),
                round.failed_count()
            );
            return Ok(RoundOutcome::NoCandidates);
        };

        info!(
            "round {}: winner {} nonce {} hash {}",
            work.request_id,
            winner.worker_id,
            winner.nonce,
            hash::to_hex(&winner.hash)
        );

        let submission = SolutionSubmission::new(&work.request_id, &work.block, &winner);
        let reason = match self.sink.submit(&submission).await {
            Ok(SubmitOutcome::Accepted) => {
                info!("{} round {} solution accepted", "OK".bold().green(), work.request_id);
                return Ok(RoundOutcome::Submitted(winner));
            }
            Ok(SubmitOutcome::Rejected(reason)) => reason,
            Err(err) => err.to_string(),
        };

        warn!("{} round {} submission failed: {reason}", "WARNING".bold().yellow(), work.request_id);
        Ok(RoundOutcome::SubmissionFailed { candidate: winner, reason })
    }
}

/// Runs rounds back to back, pausing `poll_interval` between them.
pub struct Scheduler<T> {
    runner: Arc<RoundRunner<T>>,
    poll_interval: Duration,
}

impl<T> Scheduler<T> {
    pub fn new(runner: RoundRunner<T>, poll_interval: Duration) -> Self {
        Self { runner: Arc::new(runner), poll_interval }
    }
}

impl<T: WorkerTransport + 'static> Actor for Scheduler<T> {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let runner = self.runner.clone();
        let poll_interval = self.poll_interval;

        ctx.spawn(
            async move {
                loop {
                    match runner.run_once().await {
                        Ok(outcome) => debug!("round finished: {outcome:?}"),
                        Err(RoundError::UpstreamUnavailable(FetchError::NoWorkAvailable)) => {
                            info!("no work available")
                        }
                        Err(err) => error!("round aborted: {err}"),
                    }
                    sleep(poll_interval).await;
                }
            }
            .into_actor(self),
        );
    }
}
