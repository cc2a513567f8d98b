use std::time::Duration;

use futures_util::{
    stream::SplitSink,
    SinkExt,
    StreamExt,
};
use shared::interaction::{WorkRequest, WorkResponse};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{tungstenite, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::*;

const RECONNECT_DELAY: Duration = Duration::from_secs(10);

pub enum StreamMessage {
    Request(WorkRequest),
    Ping(Vec<u8>),
}

pub enum StreamCommand {
    Reply(WorkResponse),
    Pong(Vec<u8>),
}

/// Keep a websocket session to the coordinator alive and bridge it to a pair
/// of channels. Gives up after `max_retry` consecutive failed connects.
pub fn new_subscribe(
    url: String,
    max_retry: u32,
    mut notify_shutdown: broadcast::Receiver<()>,
) -> (mpsc::Sender<StreamCommand>, mpsc::Receiver<StreamMessage>) {
    let (reader_tx, reader_rx) = mpsc::channel(100);
    let (writer_tx, mut writer_rx) = mpsc::channel(100);
    let mut attempts = 0;
    tokio::spawn(async move {
        'main: loop {
            attempts += 1;

            let stream = match tokio_tungstenite::connect_async(&url).await {
                Ok((stream, _)) => stream,
                Err(err) => {
                    error!("fail to connect to sever: {err:#}");
                    if attempts >= max_retry {
                        error!("giving up after {attempts} attempts");
                        break;
                    }
                    info!("retry...({attempts}/{max_retry})");
                    tokio::select! {
                        _ = notify_shutdown.recv() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                    continue;
                }
            };

            // connection successful reset attempt
            attempts = 0;
            info!("ws connect to the server");

            let (mut write, mut read) = stream.split();

            loop {
                if let Err(err) = tokio::select! {
                     _ = notify_shutdown.recv() => break 'main,
                     res = writer_rx.recv() => {
                        stream_write(res, &mut write).await
                     },
                     res = read.next() => {
                        stream_read(res, &reader_tx).await
                     },
                } {
                    // before shutdown signal, this should never happen.
                    if writer_rx.is_closed() || reader_tx.is_closed() {
                        error!("unrecoverable error: {err:?}");
                        break 'main;
                    } else {
                        error!("{err:?}");
                        break;
                    }
                }
            }
            error!("server disconnected, retries in 10 seconds");
            tokio::select! {
                _ = notify_shutdown.recv() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        debug!("[stream] async thread shutdown");
    });

    (writer_tx, reader_rx)
}

type StreamWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// receive the command and sent to server
async fn stream_write(data: Option<StreamCommand>, ws_tx: &mut StreamWriter) -> anyhow::Result<()> {
    match data {
        None => anyhow::bail!("command channel closed"),
        Some(data) => match data {
            StreamCommand::Reply(reply) => {
                let text = serde_json::to_string(&reply)?;
                ws_tx.send(Message::Text(text)).await
            }
            StreamCommand::Pong(pong) => ws_tx.send(Message::Pong(pong)).await,
        }
        .map_err(|err| anyhow::anyhow!("ws disconnection: {err:?}")),
    }
}

/// read data from stream and use the channel send to stream process
async fn stream_read(
    data: Option<Result<Message, tungstenite::Error>>,
    tx: &mpsc::Sender<StreamMessage>,
) -> anyhow::Result<()> {
    let message = match data {
        None => anyhow::bail!("ws disconnection"),
        Some(Err(err)) => anyhow::bail!(err.to_string()),
        Some(Ok(message)) => message,
    };

    let forward = match message {
        Message::Text(text) => match serde_json::from_str::<WorkRequest>(&text) {
            Ok(request) => StreamMessage::Request(request),
            Err(err) => {
                warn!("ignoring invalid request: {err}");
                return Ok(());
            }
        },
        Message::Ping(ping) => {
            debug!("ping arrived");
            StreamMessage::Ping(ping)
        }
        Message::Close(frame) => anyhow::bail!("server closed the session: {frame:?}"),
        _ => return Ok(()),
    };

    if tx.send(forward).await.is_err() {
        anyhow::bail!("message channel closed")
    }
    Ok(())
}
