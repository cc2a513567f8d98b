use actix::Addr;
use shared::{interaction::RestfulError, types::WorkerId};
use tracing::*;

use crate::{
    manager::{ManagerActor, ManagerMessage},
    scheduler::RoundSummary,
};

pub struct RESTful {
    pub manager: Addr<ManagerActor>,
}

impl RESTful {
    pub async fn workers(&self) -> Result<Vec<WorkerId>, RestfulError> {
        trace!("list workers");
        self.manager.send(ManagerMessage::ListWorkers).await.map_err(|err| {
            error!("manager error: {err}");
            RestfulError::InternalServerError
        })
    }

    pub async fn last_round(&self) -> Result<RoundSummary, RestfulError> {
        trace!("last round");
        match self.manager.send(ManagerMessage::LastRound).await {
            Ok(Some(summary)) => Ok(summary),
            Ok(None) => Err(RestfulError::RoundNotFound),
            Err(err) => {
                error!("manager error: {err}");
                Err(RestfulError::InternalServerError)
            }
        }
    }
}
