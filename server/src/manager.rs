use std::collections::BTreeMap;

use actix::{Actor, Addr, Context, Handler, MessageResult};
use async_trait::async_trait;
use shared::types::WorkerId;
use tracing::*;

pub use messages as ManagerMessage;

use crate::{
    scheduler::{RoundSummary, WorkerRegistry},
    worker::WorkerActor,
};

/// Registry of connected worker sessions and the last finished round.
#[derive(Default)]
pub struct ManagerActor {
    workers: BTreeMap<WorkerId, Addr<WorkerActor>>,
    last_round: Option<RoundSummary>,
}

impl ManagerActor {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Actor for ManagerActor {
    type Context = Context<Self>;
}

impl Handler<ManagerMessage::WorkerConnection> for ManagerActor {
    type Result = Result<(), ManagerError>;

    fn handle(
        &mut self,
        msg: ManagerMessage::WorkerConnection,
        _: &mut Self::Context,
    ) -> Self::Result {
        trace!("manager: worker connection");
        let ManagerMessage::WorkerConnection { worker_id, addr } = msg;
        if self.workers.contains_key(&worker_id) {
            warn!("worker {worker_id} is already connected");
            return Err(ManagerError::DuplicateWorker(worker_id));
        }
        info!("worker connected: {worker_id}, total: {}", self.workers.len() + 1);
        self.workers.insert(worker_id, addr);
        Ok(())
    }
}

impl Handler<ManagerMessage::WorkerDisconnection> for ManagerActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ManagerMessage::WorkerDisconnection,
        _: &mut Self::Context,
    ) -> Self::Result {
        trace!("manager: worker disconnection");
        // a refused duplicate must not evict the session it collided with
        if self.workers.get(&msg.worker_id) == Some(&msg.addr) {
            self.workers.remove(&msg.worker_id);
            info!("worker disconnected: {}, total: {}", msg.worker_id, self.workers.len());
        }
    }
}

impl Handler<ManagerMessage::ListWorkers> for ManagerActor {
    type Result = MessageResult<ManagerMessage::ListWorkers>;

    fn handle(&mut self, _: ManagerMessage::ListWorkers, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.workers.keys().cloned().collect())
    }
}

impl Handler<ManagerMessage::FetchWorker> for ManagerActor {
    type Result = Result<Addr<WorkerActor>, ManagerError>;

    fn handle(&mut self, msg: ManagerMessage::FetchWorker, _: &mut Self::Context) -> Self::Result {
        trace!("manager: fetch worker");
        match self.workers.get(&msg.worker_id) {
            None => Err(ManagerError::WorkerNotFound(msg.worker_id)),
            Some(addr) => Ok(addr.clone()),
        }
    }
}

impl Handler<ManagerMessage::RecordRound> for ManagerActor {
    type Result = ();

    fn handle(&mut self, msg: ManagerMessage::RecordRound, _: &mut Self::Context) -> Self::Result {
        trace!("manager: record round {}", msg.0.request_id);
        self.last_round = Some(msg.0);
    }
}

impl Handler<ManagerMessage::LastRound> for ManagerActor {
    type Result = MessageResult<ManagerMessage::LastRound>;

    fn handle(&mut self, _: ManagerMessage::LastRound, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.last_round.clone())
    }
}

#[async_trait]
impl WorkerRegistry for Addr<ManagerActor> {
    async fn connected_workers(&self) -> Vec<WorkerId> {
        match self.send(ManagerMessage::ListWorkers).await {
            Ok(workers) => workers,
            Err(err) => {
                error!("manager mailbox error: {err}");
                vec![]
            }
        }
    }

    async fn record(&self, summary: RoundSummary) {
        self.do_send(ManagerMessage::RecordRound(summary));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("worker {0} already connected")]
    DuplicateWorker(WorkerId),
    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),
}

pub mod messages {
    use actix::{Addr, Message};
    use shared::types::WorkerId;

    use crate::{manager::ManagerError, scheduler::RoundSummary, worker::WorkerActor};

    #[derive(Message)]
    #[rtype(result = "Result<(), ManagerError>")]
    pub struct WorkerConnection {
        pub worker_id: WorkerId,
        pub addr: Addr<WorkerActor>,
    }

    #[derive(Message)]
    #[rtype(result = "()")]
    pub struct WorkerDisconnection {
        pub worker_id: WorkerId,
        pub addr: Addr<WorkerActor>,
    }

    #[derive(Message)]
    #[rtype(result = "Vec<WorkerId>")]
    pub struct ListWorkers;

    #[derive(Message)]
    #[rtype(result = "Result<Addr<WorkerActor>, ManagerError>")]
    pub struct FetchWorker {
        pub worker_id: WorkerId,
    }

    #[derive(Message)]
    #[rtype(result = "()")]
    pub struct RecordRound(pub RoundSummary);

    #[derive(Message)]
    #[rtype(result = "Option<RoundSummary>")]
    pub struct LastRound;
}
