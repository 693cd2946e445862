use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use crate::ws::registry::{SubscriberHandle, SubscriberId};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Detects peers that vanished without a close frame.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run one subscriber connection from registration to teardown.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames queued on the subscriber's
///   bounded channel, each write bounded by the broadcast write timeout
/// - Keepalive task: periodic pings, closes the connection on a missed pong
/// - Reader loop (this task): answers pings, watches for close/EOF/errors
///
/// Whichever side notices the connection is gone cancels the handle's token;
/// the registry entry is removed exactly once on the way out.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(state.outbound_buffer);

    // Child of the process shutdown token: shutdown closes every connection
    let closer = state.shutdown.child_token();
    let handle = SubscriberHandle::new(tx.clone(), closer.clone());
    let subscriber_id = handle.id();

    if !state.registry.add(handle) {
        return;
    }

    tracing::info!(
        subscriber_id = %subscriber_id,
        connections = state.registry.len(),
        "WebSocket subscriber connected"
    );

    let writer_handle = tokio::spawn(writer_task(
        ws_sender,
        rx,
        state.broadcaster.write_timeout(),
        closer.clone(),
        subscriber_id,
    ));

    // Track pong reception
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_handle = tokio::spawn(keepalive(
        tx.clone(),
        pong_rx,
        closer.clone(),
        subscriber_id,
        PING_INTERVAL,
        PONG_TIMEOUT,
    ));

    loop {
        tokio::select! {
            _ = closer.cancelled() => {
                tracing::debug!(subscriber_id = %subscriber_id, "Connection closed by server");
                break;
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.send(());
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = tx.try_send(Message::Pong(data));
                }
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                    // Subscribers publish through POST /send; inbound data frames are ignored
                    tracing::debug!(subscriber_id = %subscriber_id, "Ignoring inbound data frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        subscriber_id = %subscriber_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        subscriber_id = %subscriber_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    tracing::info!(subscriber_id = %subscriber_id, "WebSocket stream ended");
                    break;
                }
            }
        }
    }

    closer.cancel();
    writer_handle.abort();
    ping_handle.abort();

    // May already be gone if a failed broadcast evicted it
    state.registry.remove(&subscriber_id);

    tracing::info!(
        subscriber_id = %subscriber_id,
        connections = state.registry.len(),
        "WebSocket subscriber disconnected"
    );
}

/// Keepalive task: pings every `ping_interval` and expects a pong within
/// `pong_timeout`. A missed pong queues a 1001 close frame; the writer closes
/// the connection once that frame is written.
async fn keepalive(
    outbound: mpsc::Sender<Message>,
    mut pongs: mpsc::UnboundedReceiver<()>,
    closer: CancellationToken,
    subscriber_id: SubscriberId,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval(ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Unsolicited pongs must not answer the next ping
        while pongs.try_recv().is_ok() {}

        if outbound.send(Message::Ping(vec![1, 2, 3, 4].into())).await.is_err() {
            // Writer task has died, connection is gone
            break;
        }

        match timeout(pong_timeout, pongs.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!(subscriber_id = %subscriber_id, "Pong timeout, closing connection");
                let close = Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "Pong timeout".into(),
                }));
                if outbound.try_send(close).is_err() {
                    closer.cancel();
                }
                break;
            }
        }
    }
}

/// Writer task: drains the subscriber's queue into the WebSocket sink.
/// A failed or stalled write, or a written close frame, closes the connection.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    write_timeout: Duration,
    closer: CancellationToken,
    subscriber_id: SubscriberId,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        match timeout(write_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) if is_close => break,
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(subscriber_id = %subscriber_id, error = %e, "WebSocket write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(subscriber_id = %subscriber_id, "WebSocket write timed out");
                break;
            }
        }
    }
    closer.cancel();
}
