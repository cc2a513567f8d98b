use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashpool_server::{
    dispatch::{DispatchCoordinator, TransportError, WorkerTransport},
    scheduler::{RoundError, RoundOutcome, RoundRunner, RoundSummary, WorkerRegistry},
    upstream::{FetchError, SubmissionSink, SubmitError, SubmitOutcome, WorkSource},
};
use serde_json::Value;
use shared::{
    hash,
    interaction::{SolutionSubmission, WorkRequest, WorkResponse},
    search::{search, SearchControl},
    types::{NonceRange, WorkUnit, WorkerId},
    U256,
};
use std::time::Duration;

/// Every worker answers by actually searching its slice.
struct LocalWorkers;

#[async_trait]
impl WorkerTransport for LocalWorkers {
    async fn dispatch(
        &self,
        worker: &WorkerId,
        request: WorkRequest,
    ) -> Result<Value, TransportError> {
        let report = search(
            &request.block,
            &request.target().unwrap(),
            request.range().unwrap(),
            worker,
            &SearchControl::new(),
        );
        Ok(serde_json::to_value(WorkResponse::new(request.request_id, report.candidate())).unwrap())
    }
}

struct FixedSource(Result<WorkUnit, FetchError>);

#[async_trait]
impl WorkSource for FixedSource {
    async fn fetch_work(&self) -> Result<WorkUnit, FetchError> {
        self.0.clone()
    }
}

struct RecordingSink {
    answer: Result<SubmitOutcome, SubmitError>,
    seen: Mutex<Vec<SolutionSubmission>>,
}

impl RecordingSink {
    fn new(answer: Result<SubmitOutcome, SubmitError>) -> Arc<Self> {
        Arc::new(Self { answer, seen: Default::default() })
    }
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(&self, solution: &SolutionSubmission) -> Result<SubmitOutcome, SubmitError> {
        self.seen.lock().unwrap().push(solution.clone());
        self.answer.clone()
    }
}

#[derive(Default)]
struct Registry {
    workers: Vec<WorkerId>,
    rounds: Mutex<Vec<RoundSummary>>,
}

#[async_trait]
impl WorkerRegistry for Registry {
    async fn connected_workers(&self) -> Vec<WorkerId> {
        self.workers.clone()
    }

    async fn record(&self, summary: RoundSummary) {
        self.rounds.lock().unwrap().push(summary);
    }
}

fn registry(names: &[&str]) -> Arc<Registry> {
    Arc::new(Registry {
        workers: names.iter().map(|n| WorkerId::from(*n)).collect(),
        ..Default::default()
    })
}

fn work(target: U256, range: NonceRange) -> WorkUnit {
    WorkUnit { block: "abc".into(), target, request_id: "r-1".into(), issued_at: 0, range }
}

/// The nonce in `[0, 99]` with the lowest hash, and a target only it meets.
fn single_qualifier() -> (u64, U256) {
    let nonce = (0..=99).min_by_key(|n| hash::compute("abc", *n)).unwrap();
    (nonce, hash::compute("abc", nonce) + U256::one())
}

fn runner(
    source: Result<WorkUnit, FetchError>,
    sink: Arc<RecordingSink>,
    registry: Arc<Registry>,
) -> RoundRunner<LocalWorkers> {
    RoundRunner::new(
        Arc::new(FixedSource(source)),
        sink,
        registry,
        DispatchCoordinator::new(LocalWorkers, Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn only_qualifying_nonce_is_submitted() {
    let (nonce, target) = single_qualifier();
    let sink = RecordingSink::new(Ok(SubmitOutcome::Accepted));
    let registry = registry(&["a", "b"]);

    let outcome = runner(Ok(work(target, NonceRange::new(0, 99))), sink.clone(), registry.clone())
        .run_once()
        .await
        .unwrap();

    let owner = if nonce <= 49 { "a" } else { "b" };
    match outcome {
        RoundOutcome::Submitted(winner) => {
            assert_eq!(winner.nonce, nonce);
            assert_eq!(winner.worker_id, WorkerId::from(owner));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let seen = sink.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].request_id, "r-1");
    assert_eq!(seen[0].block, "abc");
    assert_eq!(seen[0].nonce, nonce);
    assert_eq!(seen[0].block_hash, hash::to_hex(&hash::compute("abc", nonce)));

    let rounds = registry.rounds.lock().unwrap();
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0].workers, 2);
    assert_eq!(rounds[0].candidates, 1);
    assert_eq!(rounds[0].no_solution, 1);
    assert_eq!(rounds[0].winner.as_ref().map(|w| w.nonce), Some(nonce));
}

#[tokio::test]
async fn rejected_submission_is_not_retried() {
    let sink = RecordingSink::new(Ok(SubmitOutcome::Rejected("stale block".into())));
    let outcome = runner(Ok(work(U256::MAX, NonceRange::new(0, 99))), sink.clone(), registry(&["a"]))
        .run_once()
        .await
        .unwrap();

    match outcome {
        RoundOutcome::SubmissionFailed { candidate, reason } => {
            assert_eq!(candidate.nonce, 0);
            assert_eq!(reason, "stale block");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(sink.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn transport_failure_on_submit_is_surfaced() {
    let sink = RecordingSink::new(Err(SubmitError::Transport("connection refused".into())));
    let outcome = runner(Ok(work(U256::MAX, NonceRange::new(0, 9))), sink.clone(), registry(&["a"]))
        .run_once()
        .await
        .unwrap();

    assert!(matches!(outcome, RoundOutcome::SubmissionFailed { .. }));
    assert_eq!(sink.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn nothing_below_target_submits_nothing() {
    let sink = RecordingSink::new(Ok(SubmitOutcome::Accepted));
    let registry = registry(&["a", "b", "c"]);
    let outcome = runner(Ok(work(U256::zero(), NonceRange::new(0, 99))), sink.clone(), registry.clone())
        .run_once()
        .await
        .unwrap();

    assert_eq!(outcome, RoundOutcome::NoCandidates);
    assert!(sink.seen.lock().unwrap().is_empty());
    assert_eq!(registry.rounds.lock().unwrap()[0].no_solution, 3);
}

#[tokio::test]
async fn no_workers_no_candidates() {
    let sink = RecordingSink::new(Ok(SubmitOutcome::Accepted));
    let outcome = runner(Ok(work(U256::MAX, NonceRange::new(0, 99))), sink.clone(), registry(&[]))
        .run_once()
        .await
        .unwrap();

    assert_eq!(outcome, RoundOutcome::NoCandidates);
    assert!(sink.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upstream_failure_aborts_the_round() {
    let sink = RecordingSink::new(Ok(SubmitOutcome::Accepted));
    let registry = registry(&["a"]);
    let err = runner(Err(FetchError::Transport("timeout".into())), sink.clone(), registry.clone())
        .run_once()
        .await
        .unwrap_err();

    assert_eq!(err, RoundError::UpstreamUnavailable(FetchError::Transport("timeout".into())));
    assert!(sink.seen.lock().unwrap().is_empty());
    assert!(registry.rounds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_range_aborts_the_round() {
    let sink = RecordingSink::new(Ok(SubmitOutcome::Accepted));
    let err = runner(Ok(work(U256::MAX, NonceRange::new(10, 0))), sink, registry(&["a"]))
        .run_once()
        .await
        .unwrap_err();

    assert!(matches!(err, RoundError::InvalidRange(_)));
}
