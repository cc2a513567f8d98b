//! Fan-out of one work unit to every known worker under a round deadline.
//!
//! Each worker gets its own slice of the nonce range. Replies are collected
//! until all workers answered or the deadline passed, whichever comes first.
//! Individual worker faults are recorded in the [`RoundResult`] and never
//! abort the round.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use shared::{
    interaction::{WorkRequest, WorkerReply},
    types::{Assignment, Candidate, WorkUnit, WorkerId},
};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::*;

use crate::partition::{partition, PartitionError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("worker {0} is not connected")]
    NotConnected(WorkerId),
    #[error("worker session closed")]
    SessionClosed,
    #[error("mailbox error: {0}")]
    Mailbox(String),
}

/// Delivers one request to one worker and yields its raw reply.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn dispatch(
        &self,
        worker: &WorkerId,
        request: WorkRequest,
    ) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: WorkerTransport + ?Sized> WorkerTransport for Arc<T> {
    async fn dispatch(
        &self,
        worker: &WorkerId,
        request: WorkRequest,
    ) -> Result<Value, TransportError> {
        (**self).dispatch(worker, request).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentFailure {
    Timeout,
    Unreachable(String),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAssignment {
    pub worker_id: WorkerId,
    pub failure: AssignmentFailure,
}

/// Everything collected during one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundResult {
    pub request_id: String,
    /// structurally valid candidates, not yet verified
    pub candidates: Vec<Candidate>,
    /// workers that scanned their range without a match
    pub no_solution: Vec<WorkerId>,
    /// workers left without a range because there were more workers than nonces
    pub idle: Vec<WorkerId>,
    pub failures: Vec<FailedAssignment>,
}

impl RoundResult {
    pub fn new(request_id: &str) -> Self {
        Self { request_id: request_id.to_string(), ..Default::default() }
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

pub struct DispatchCoordinator<T> {
    transport: T,
    round_timeout: Duration,
    work_time: Option<Duration>,
}

impl<T: WorkerTransport> DispatchCoordinator<T> {
    pub fn new(transport: T, round_timeout: Duration) -> Self {
        Self { transport, round_timeout, work_time: None }
    }

    /// Time budget advertised to workers; should leave room for the reply
    /// to arrive before the round deadline.
    pub fn with_work_time(mut self, work_time: Duration) -> Self {
        self.work_time = Some(work_time);
        self
    }

    pub fn round_timeout(&self) -> Duration {
        self.round_timeout
    }

    pub async fn run_round(
        &self,
        work: &WorkUnit,
        workers: &[WorkerId],
    ) -> Result<RoundResult, PartitionError> {
        let mut result = RoundResult::new(&work.request_id);

        if workers.is_empty() {
            warn!("round {}: no workers connected", work.request_id);
            return Ok(result);
        }

        let ranges = partition(work.range.start, work.range.end, workers.len())?;
        let deadline = Instant::now() + self.round_timeout;

        let mut pending = Vec::with_capacity(workers.len());
        for (worker_id, range) in workers.iter().zip(ranges) {
            if range.is_empty() {
                debug!("round {}: worker {worker_id} left idle", work.request_id);
                result.idle.push(worker_id.clone());
                continue;
            }
            trace!("round {}: worker {worker_id} gets {range}", work.request_id);
            let assignment = Assignment { work_unit: work.clone(), range, worker_id: worker_id.clone() };
            pending.push(self.dispatch_one(assignment, deadline));
        }

        for (worker_id, reply) in join_all(pending).await {
            match reply {
                Ok(Some(candidate)) => {
                    debug!("worker {worker_id} proposed nonce {}", candidate.nonce);
                    result.candidates.push(candidate);
                }
                Ok(None) => {
                    debug!("worker {worker_id} found nothing");
                    result.no_solution.push(worker_id);
                }
                Err(failure) => {
                    warn!("worker {worker_id} failed: {failure:?}");
                    result.failures.push(FailedAssignment { worker_id, failure });
                }
            }
        }

        Ok(result)
    }

    async fn dispatch_one(
        &self,
        assignment: Assignment,
        deadline: Instant,
    ) -> (WorkerId, Result<Option<Candidate>, AssignmentFailure>) {
        let request = WorkRequest::from_assignment(&assignment, self.work_time);
        let Assignment { work_unit, worker_id, .. } = assignment;

        let reply = match timeout_at(deadline, self.transport.dispatch(&worker_id, request)).await {
            Err(_) => Err(AssignmentFailure::Timeout),
            Ok(Err(err)) => Err(AssignmentFailure::Unreachable(err.to_string())),
            Ok(Ok(value)) => match WorkerReply::from_value(&value, &work_unit.request_id, &worker_id) {
                WorkerReply::Candidate(candidate) => Ok(Some(candidate)),
                WorkerReply::NoSolution => Ok(None),
                WorkerReply::Malformed(reason) => Err(AssignmentFailure::Malformed(reason)),
            },
        };

        (worker_id, reply)
    }
}
