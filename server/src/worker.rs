use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use actix::{
    fut,
    Actor,
    ActorContext,
    ActorFutureExt,
    Addr,
    AsyncContext,
    ContextFutureSpawner,
    Handler,
    ResponseFuture,
    Running,
    StreamHandler,
    WrapFuture,
};
use actix_http::ws::{CloseCode, CloseReason, Message, ProtocolError};
use actix_web_actors::{ws, ws::WebsocketContext};
use serde_json::Value;
use shared::types::WorkerId;
use tokio::sync::oneshot;
use tracing::*;

pub use messages as WorkerMessage;

use crate::{
    dispatch::TransportError,
    manager::{ManagerActor, ManagerMessage},
};

const SESSION_DEADLINE: Duration = Duration::from_secs(20);
const PENDING_TTL: Duration = Duration::from_secs(60);

type ReplySender = oneshot::Sender<Result<Value, TransportError>>;

struct Pending {
    request_id: String,
    reply: ReplySender,
    created_at: Instant,
}

/// Requests sent on one session that still wait for their reply.
///
/// Every dispatch travels under its own token, `<request_id>#<seq>`, so a
/// late answer to an earlier dispatch of the same round can never complete a
/// newer one. The token is swapped back for the request id before the reply
/// is handed out.
#[derive(Default)]
pub(crate) struct PendingReplies {
    seq: u64,
    entries: HashMap<String, Pending>,
}

impl PendingReplies {
    pub(crate) fn next_token(&mut self, request_id: &str) -> String {
        self.seq += 1;
        format!("{request_id}#{}", self.seq)
    }

    pub(crate) fn insert(&mut self, token: String, request_id: String, reply: ReplySender, now: Instant) {
        self.entries.insert(token, Pending { request_id, reply, created_at: now });
    }

    /// Hand `value` to the request it answers. Returns false when nothing
    /// was waiting for it.
    pub(crate) fn resolve(&mut self, mut value: Value) -> bool {
        let token = match value.get("request_id") {
            Some(Value::String(token)) => Some(token.clone()),
            Some(_) => None,
            // replies without an id belong to the only outstanding request
            None if self.entries.len() == 1 => self.entries.keys().next().cloned(),
            None => None,
        };
        let Some(pending) = token.and_then(|token| self.entries.remove(&token)) else {
            return false;
        };

        if let Some(id) = value.get_mut("request_id") {
            *id = Value::String(pending.request_id);
        }
        let _ = pending.reply.send(Ok(value));
        true
    }

    /// Drop entries older than `ttl` and those nobody waits for anymore.
    pub(crate) fn purge(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, p| now.saturating_duration_since(p.created_at) < ttl && !p.reply.is_closed());
        before - self.entries.len()
    }

    pub(crate) fn fail_all(&mut self, err: TransportError) {
        for (_, pending) in self.entries.drain() {
            let _ = pending.reply.send(Err(err.clone()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One websocket session with a worker process.
pub struct WorkerActor {
    worker_id: WorkerId,
    registered: bool,
    alive_at: Instant,
    try_ping: bool,
    pending: PendingReplies,
    manager: Addr<ManagerActor>,
}

impl WorkerActor {
    pub fn new(manager: Addr<ManagerActor>, worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            registered: false,
            alive_at: Instant::now(),
            try_ping: true,
            pending: Default::default(),
            manager,
        }
    }

    pub fn connect(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let addr = ctx.address();

        self.manager
            .send(ManagerMessage::WorkerConnection { worker_id: self.worker_id.clone(), addr })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(Ok(())) => act.registered = true,
                    Ok(Err(err)) => {
                        ctx.close(Some(CloseReason {
                            code: CloseCode::Policy,
                            description: Some(err.to_string()),
                        }));
                        ctx.stop();
                    }
                    Err(err) => {
                        error!("manager mailbox error: {err}");
                        ctx.stop();
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn resolve(&mut self, value: Value) {
        let text = value.to_string();
        if !self.pending.resolve(value) {
            debug!("worker {}: dropping unsolicited reply {text}", self.worker_id);
        }
    }

    fn purge_pending(&mut self) {
        let removed = self.pending.purge(Instant::now(), PENDING_TTL);
        if removed > 0 {
            let left = self.pending.len();
            debug!("worker {}: purged {removed} pending requests, {left} left", self.worker_id);
        }
    }
}

impl Actor for WorkerActor {
    type Context = WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        trace!("worker session started: {}", self.worker_id);

        self.connect(ctx);

        ctx.run_interval(Duration::from_millis(1000), |act, ctx| {
            act.purge_pending();
            if act.alive_at.elapsed() > SESSION_DEADLINE {
                if act.try_ping {
                    debug!("try send ping");
                    act.try_ping = false;
                    act.alive_at = Instant::now();
                    ctx.ping(&[]);
                } else {
                    error!("worker {} session in deadline", act.worker_id);
                    ctx.close(None);
                    ctx.stop();
                }
            }
        });
    }

    fn stopping(&mut self, ctx: &mut Self::Context) -> Running {
        self.pending.fail_all(TransportError::SessionClosed);
        if self.registered {
            self.manager.do_send(ManagerMessage::WorkerDisconnection {
                worker_id: self.worker_id.clone(),
                addr: ctx.address(),
            });
        }
        Running::Stop
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        warn!("worker session closed: {}", self.worker_id);
    }
}

impl StreamHandler<Result<Message, ProtocolError>> for WorkerActor {
    fn handle(&mut self, msg: Result<Message, ProtocolError>, ctx: &mut Self::Context) {
        self.alive_at = Instant::now();

        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => self.resolve(value),
                Err(err) => warn!("worker {}: unparsable reply: {err}", self.worker_id),
            },
            Ok(Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(Message::Pong(_)) => {
                self.try_ping = true;
                debug!("pong received");
            }
            Ok(Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(err) => {
                error!("worker error: {err:?}")
            }
            _ => {}
        }
    }
}

impl Handler<WorkerMessage::Dispatch> for WorkerActor {
    type Result = ResponseFuture<Result<Value, TransportError>>;

    fn handle(&mut self, msg: WorkerMessage::Dispatch, ctx: &mut Self::Context) -> Self::Result {
        let WorkerMessage::Dispatch(mut request) = msg;
        trace!("worker: dispatch {}", request.request_id);
        let (tx, rx) = oneshot::channel();

        let token = self.pending.next_token(&request.request_id);
        let request_id = std::mem::replace(&mut request.request_id, token.clone());
        match serde_json::to_string(&request) {
            Ok(text) => {
                self.pending.insert(token, request_id, tx, Instant::now());
                ctx.text(text);
            }
            Err(err) => {
                let _ = tx.send(Err(TransportError::Mailbox(format!("fail to encode request: {err}"))));
            }
        }

        Box::pin(async move { rx.await.unwrap_or(Err(TransportError::SessionClosed)) })
    }
}

pub mod messages {
    use actix::Message;
    use serde_json::Value;
    use shared::interaction::WorkRequest;

    use crate::dispatch::TransportError;

    #[derive(Message)]
    #[rtype(result = "Result<Value, TransportError>")]
    pub struct Dispatch(pub WorkRequest);
}
