use std::time::Duration;

use clap::Parser;
use shared::{types::WorkerId, VERSION};
use tokio::{signal, sync::broadcast};
use tracing::*;

use crate::{
    miner::Miner,
    stream::{StreamCommand, StreamMessage},
};

mod miner;
mod stream;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);
const LOG_DIRECTIVE: &str = "client=info";

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    #[arg(long, value_name = "SERVER_HOST", help = "Coordinator host, e.g. 127.0.0.1:8080")]
    host: String,

    #[arg(long, value_name = "WORKER_ID", help = "Identity announced to the coordinator")]
    worker_id: String,

    #[arg(long, value_name = "RECONNECT", help = "The number of reconnect times")]
    reconnect: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::log::init_log(LOG_DIRECTIVE);

    let args = Args::parse();
    if args.worker_id.is_empty() {
        anyhow::bail!("worker id must not be empty");
    }

    let max_retry = args.reconnect.unwrap_or(10);
    let url = format!("ws://{}/worker/{}/{}", args.host, VERSION, args.worker_id);
    info!("Client Starting... VERSION: {VERSION}, worker: {}", args.worker_id);
    info!("connect: [{url}]");

    let (notify_shutdown, _) = broadcast::channel(1);

    let (command_tx, mut message_rx) =
        stream::new_subscribe(url, max_retry, notify_shutdown.subscribe());

    let mut miner = Miner::new(WorkerId(args.worker_id));
    tokio::spawn(miner::report_hash_rate(
        miner.counter(),
        REPORT_INTERVAL,
        notify_shutdown.subscribe(),
    ));

    loop {
        tokio::select! {
            res = signal::ctrl_c() => {
                if let Err(err) = res {
                    error!("failed to listen for Ctrl+C: {err}");
                }
                info!("ctrl+c received. start shutdown");
                let _ = notify_shutdown.send(());
                break;
            }
            msg = message_rx.recv() => match msg {
                Some(StreamMessage::Request(request)) => {
                    debug!("new request: {}", request.request_id);
                    miner.assign(request, command_tx.clone());
                }
                Some(StreamMessage::Ping(ping)) => {
                    if command_tx.send(StreamCommand::Pong(ping)).await.is_err() {
                        error!("command channel closed");
                    }
                }
                None => {
                    warn!("stream closed");
                    let _ = notify_shutdown.send(());
                    break;
                }
            }
        }
    }

    // let the in-flight search notice the shutdown
    miner.shutdown();
    Ok(())
}
