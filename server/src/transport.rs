use actix::{Addr, MailboxError};
use async_trait::async_trait;
use serde_json::Value;
use shared::{interaction::WorkRequest, types::WorkerId};

use crate::{
    dispatch::{TransportError, WorkerTransport},
    manager::{ManagerActor, ManagerMessage},
    worker::WorkerMessage,
};

/// Dispatches requests over the websocket session of the target worker.
#[derive(Clone)]
pub struct SessionTransport {
    manager: Addr<ManagerActor>,
}

impl SessionTransport {
    pub fn new(manager: Addr<ManagerActor>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl WorkerTransport for SessionTransport {
    async fn dispatch(
        &self,
        worker: &WorkerId,
        request: WorkRequest,
    ) -> Result<Value, TransportError> {
        let session = match self
            .manager
            .send(ManagerMessage::FetchWorker { worker_id: worker.clone() })
            .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(_)) => return Err(TransportError::NotConnected(worker.clone())),
            Err(err) => return Err(TransportError::Mailbox(err.to_string())),
        };

        match session.send(WorkerMessage::Dispatch(request)).await {
            Ok(reply) => reply,
            Err(MailboxError::Closed) => Err(TransportError::SessionClosed),
            Err(err) => Err(TransportError::Mailbox(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use actix::Actor;
    use shared::U256;

    use super::*;

    #[actix_rt::test]
    async fn unknown_worker_is_not_connected() {
        let transport = SessionTransport::new(ManagerActor::new().start());
        let request = WorkRequest {
            block: "abc".into(),
            target: shared::hash::to_hex(&U256::MAX),
            nonce_range_start: 0,
            nonce_range_end: 9,
            request_id: "r".into(),
            work_time: None,
        };

        let err = transport.dispatch(&WorkerId::from("ghost"), request).await.unwrap_err();
        assert_eq!(err, TransportError::NotConnected(WorkerId::from("ghost")));
    }
}
