//! Per-connection session — drives a single client from upgrade through
//! teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use ventry_proto::codes::CLOSE_INTERNAL_ERROR;
use ventry_proto::envelope::ServerEnvelope;

use super::connection::{Connection, OutboundFrame};
use super::dispatch::{self, Action, ApplicationSink};
use super::heartbeat::{self, HeartbeatResult};
use super::registry::SessionRegistry;

/// Run a session for one upgraded WebSocket.
///
/// 1. Creates the connection record and sends `CONNECTION_ESTABLISHED`
/// 2. Spawns the writer task (outbound queue + close frames) and the
///    heartbeat probe
/// 3. Dispatches inbound frames through the lifecycle state machine
/// 4. On exit for any reason: cancels the heartbeat, removes the registry
///    entry if it still points here, releases the connection
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_session(
    ws: WebSocket,
    conn_id: String,
    remote_addr: Option<SocketAddr>,
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn ApplicationSink>,
    heartbeat_interval: Duration,
    send_queue: usize,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (out_tx, out_rx) = mpsc::channel::<OutboundFrame>(send_queue);
    let connection = Arc::new(Connection::new(conn_id.clone(), out_tx, remote_addr));

    info!(remote = ?remote_addr, "client connected");
    counter!("gateway_connections_total").increment(1);
    gauge!("gateway_connections_active").increment(1.0);

    // Greeting goes out synchronously, before any frame is read
    let greeting = ServerEnvelope::connection_established(&conn_id);
    match serde_json::to_string(&greeting) {
        Ok(json) => {
            let _ = ws_tx.send(Message::Text(json.into())).await;
        }
        Err(e) => warn!(error = %e, "failed to serialize greeting"),
    }
    connection.mark_open();

    let cancel = CancellationToken::new();
    let writer = tokio::spawn(run_writer(ws_tx, out_rx, cancel.clone(), conn_id.clone()));
    let mut probe = tokio::spawn(heartbeat::run_heartbeat(
        Arc::clone(&connection),
        heartbeat_interval,
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            inbound = ws_rx.next() => match inbound {
                Some(Ok(msg)) => {
                    let text = match msg {
                        Message::Text(ref text) => Some(text.to_string()),
                        Message::Binary(ref data) => match std::str::from_utf8(data) {
                            Ok(text) => Some(text.to_owned()),
                            Err(_) => {
                                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                                None
                            }
                        },
                        Message::Ping(_) | Message::Pong(_) => {
                            connection.mark_alive();
                            None
                        }
                        Message::Close(_) => {
                            info!("client sent close frame");
                            break;
                        }
                    };
                    let Some(text) = text else { continue };

                    let outcome =
                        dispatch::handle_frame(&text, &connection, &registry, sink.as_ref()).await;
                    if let Some(envelope) = outcome.reply {
                        if !connection.send_envelope(&envelope) {
                            debug!("failed to enqueue reply (queue full or writer gone)");
                        }
                    }
                    if let Action::Close { code, reason } = outcome.action {
                        // Rides the queue behind the reply, so the client
                        // sees ERROR before the close frame
                        let _ = connection.send(OutboundFrame::Close { code, reason });
                        break;
                    }
                }
                Some(Err(e)) => {
                    let user_id = connection.identity().map(|identity| identity.user_id);
                    warn!(error = %e, user_id = ?user_id, "socket error, closing connection");
                    let _ = connection.send(OutboundFrame::Close {
                        code: CLOSE_INTERNAL_ERROR,
                        reason: "internal error".to_owned(),
                    });
                    break;
                }
                None => break,
            },
            reaped = &mut probe => {
                if matches!(reaped, Ok(HeartbeatResult::TimedOut)) {
                    // No farewell: from the peer's side this looks like a drop
                    info!("heartbeat timeout, terminating connection");
                }
                break;
            }
        }
    }

    // Teardown. Ordering matters: stop delivering before unregistering.
    connection.begin_close();
    cancel.cancel();
    probe.abort();
    let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;

    if let Some(identity) = connection.identity() {
        let removed = registry.remove_if_current(&identity.user_id, &conn_id).await;
        debug!(user_id = identity.user_id, removed, "registry cleanup");
    }
    connection.mark_closed();

    info!(dropped_frames = connection.drop_count(), "client disconnected");
    counter!("gateway_disconnections_total").increment(1);
    gauge!("gateway_connections_active").decrement(1.0);
    histogram!("gateway_connection_duration_seconds")
        .record(connection.connected_at.elapsed().as_secs_f64());
}

/// Drain the outbound queue onto the socket.
///
/// Exits when a close frame is flushed, the queue closes, the transport
/// errors, or the session cancels it. A `Close` frame terminates the task
/// after sending, so everything queued before it is already on the wire.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<OutboundFrame>,
    cancel: CancellationToken,
    conn_id: String,
) {
    loop {
        tokio::select! {
            // Biased: drain queued frames before honoring cancellation, so
            // an ERROR + close pair enqueued just before teardown still
            // reaches the wire.
            biased;
            frame = out_rx.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Ping) => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Close { code, reason }) => {
                    debug!(conn_id, code, "sending close frame");
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
                None => break,
            },
            () = cancel.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    // The session loop needs a live WebSocket on both ends; it is covered by
    // the integration tests in tests/gateway.rs. The pieces it composes
    // (dispatch, heartbeat, registry, connection) carry their own unit tests.

    use ventry_proto::envelope::ServerEnvelope;

    #[test]
    fn greeting_carries_connection_id() {
        let greeting = ServerEnvelope::connection_established("conn_42");
        let v = serde_json::to_value(&greeting).unwrap();
        assert_eq!(v["type"], "CONNECTION_ESTABLISHED");
        assert_eq!(v["connectionId"], "conn_42");
    }
}
