//! Heartbeat ping/pong liveness monitoring.
//!
//! The transport alone will not surface a peer whose process died or whose
//! NAT binding silently expired. Each connection therefore runs its own
//! probe task: every interval the alive flag is taken-and-reset, and a Ping
//! is queued; a pong (or ping) from the peer sets the flag again. A peer
//! that misses one full interval is reported dead, so detection latency is
//! between one and two intervals.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::{Connection, OutboundFrame};

/// Outcome of the heartbeat task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stopped responding; the connection should be terminated.
    TimedOut,
    /// The session tore down and cancelled the probe.
    Cancelled,
}

/// Run heartbeat probes for a connection until it dies or is cancelled.
///
/// The task owns nothing but a clock and the cancellation token; probes ride
/// the connection's outbound queue, so they interleave FIFO with regular
/// deliveries. The session's teardown path cancels the token, which
/// structurally bounds this task's lifetime to its connection.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    // Consume the immediate first tick; the first probe fires after one interval
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !connection.check_alive() {
                    debug!(conn_id = %connection.id, "peer missed heartbeat interval");
                    return HeartbeatResult::TimedOut;
                }
                if !connection.send(OutboundFrame::Ping) {
                    // Writer already gone; teardown is in progress
                    return HeartbeatResult::Cancelled;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection() -> (Arc<Connection>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Connection::new("hb_conn".into(), tx, None);
        conn.mark_open();
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn cancelled_before_first_tick() {
        let (conn, _rx) = make_connection();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(
            conn,
            Duration::from_secs(120),
            cancel.clone(),
        ));
        cancel.cancel();
        assert_eq!(task.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_reaped_within_two_intervals() {
        let (conn, mut rx) = make_connection();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(conn, Duration::from_secs(30), cancel));

        // First tick: fresh connections count as alive, so a probe goes out
        tokio::time::advance(Duration::from_secs(30)).await;
        // Second tick: no pong arrived, peer is dead
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(task.await.unwrap(), HeartbeatResult::TimedOut);
        assert_eq!(rx.recv().await.unwrap(), OutboundFrame::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn already_stale_peer_reaped_on_first_tick() {
        let (conn, _rx) = make_connection();
        // Consume the initial alive credit
        assert!(conn.check_alive());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(conn, Duration::from_secs(30), cancel));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(task.await.unwrap(), HeartbeatResult::TimedOut);
    }

    #[tokio::test]
    async fn responsive_peer_stays_connected() {
        let (conn, mut rx) = make_connection();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        ));

        // Answer several probes
        for _ in 0..3 {
            assert_eq!(rx.recv().await.unwrap(), OutboundFrame::Ping);
            conn.mark_alive();
        }

        cancel.cancel();
        assert_eq!(task.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_gone_ends_probe() {
        let (conn, rx) = make_connection();
        drop(rx);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(conn, Duration::from_secs(30), cancel));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(task.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[test]
    fn result_is_comparable() {
        assert_eq!(HeartbeatResult::TimedOut, HeartbeatResult::TimedOut);
        assert_ne!(HeartbeatResult::TimedOut, HeartbeatResult::Cancelled);
    }
}
