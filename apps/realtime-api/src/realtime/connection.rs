//! One live WebSocket session: per-connection state plus the read and write
//! pumps.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use nimbus_common::{Envelope, EventKind, OrgId, UserId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::hub::Hub;

/// Outbound queue capacity per connection.
pub const SEND_BUFFER: usize = 256;

/// Hard cap on a single inbound frame.
pub const MAX_FRAME_BYTES: usize = 512 * 1024;

/// A single frame write must complete within this window; overrunning it is
/// treated the same as a hard write error.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// The peer must show life (any frame) within this window.
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Keepalive ping cadence. Must stay below `READ_TIMEOUT` so the peer's own
/// read deadline is always fed before it expires.
pub const PING_INTERVAL: Duration = Duration::from_secs(54);

const CLOSE_GOING_AWAY: u16 = 1001;

/// State for a single authenticated WebSocket connection.
///
/// The hub is the only writer of the org set; the write pump is the only
/// consumer of the outbound queue. A connection is never reused after its
/// close signal fires.
pub struct Connection {
    user_id: UserId,
    orgs: Mutex<BTreeSet<OrgId>>,
    outbound: mpsc::Sender<Envelope>,
    closed: CancellationToken,
}

impl Connection {
    /// Build a connection with the default outbound capacity. Returns the
    /// handle plus the queue's consumer end for the write pump.
    pub fn new(user_id: UserId, orgs: BTreeSet<OrgId>) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        Self::with_capacity(user_id, orgs, SEND_BUFFER)
    }

    pub fn with_capacity(
        user_id: UserId,
        orgs: BTreeSet<OrgId>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let conn = Arc::new(Self {
            user_id,
            orgs: Mutex::new(orgs),
            outbound,
            closed: CancellationToken::new(),
        });
        (conn, rx)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Snapshot of the current org memberships.
    pub fn orgs(&self) -> BTreeSet<OrgId> {
        self.orgs.lock().clone()
    }

    /// Replace the org membership set. Hub-only.
    pub(crate) fn set_orgs(&self, orgs: BTreeSet<OrgId>) {
        *self.orgs.lock() = orgs;
    }

    /// Non-blocking enqueue. A full queue drops the envelope and logs it;
    /// delivery here is at-most-once by design.
    pub fn try_enqueue(&self, envelope: Envelope) -> bool {
        match self.outbound.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                tracing::warn!(
                    user_id = self.user_id,
                    kind = ?envelope.kind,
                    "outbound buffer full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Signal the write pump to terminate and close the socket. Idempotent.
    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Drains inbound frames until the socket errors, closes, or goes silent past
/// the read deadline, then unregisters this connection from the hub.
pub(crate) async fn read_pump(
    conn: Arc<Connection>,
    hub: Arc<Hub>,
    mut ws_rx: SplitStream<WebSocket>,
) {
    loop {
        let frame = match time::timeout(READ_TIMEOUT, ws_rx.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                tracing::debug!(user_id = conn.user_id, ?e, "ws read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::debug!(user_id = conn.user_id, "read deadline expired");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => handle_inbound(&conn, text.as_bytes()),
            WsMessage::Binary(data) => handle_inbound(&conn, &data),
            WsMessage::Close(_) => break,
            // Protocol-level liveness; axum answers pings on its own.
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
        }
    }

    hub.unregister(&conn).await;
}

fn handle_inbound(conn: &Connection, raw: &[u8]) {
    let envelope: Envelope = match serde_json::from_slice(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(user_id = conn.user_id, ?e, "unparseable inbound frame");
            return;
        }
    };

    match envelope.kind {
        // Advisory liveness check; a dropped pong on a full queue is fine.
        EventKind::Ping => {
            conn.try_enqueue(Envelope::pong());
        }
        kind => {
            tracing::debug!(user_id = conn.user_id, ?kind, "ignoring inbound event");
        }
    }
}

/// Pushes queued envelopes and keepalive pings to the socket until a write
/// fails, the write deadline overruns, or the close signal fires. Closes the
/// socket from this side on the way out.
pub(crate) async fn write_pump(
    conn: Arc<Connection>,
    mut rx: mpsc::Receiver<Envelope>,
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
) {
    let mut keepalive = time::interval(PING_INTERVAL);
    keepalive.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(envelope) = maybe else { break };
                let json = match serde_json::to_string(&envelope) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(user_id = conn.user_id, ?e, "envelope serialization failed");
                        continue;
                    }
                };
                if !send_with_deadline(&conn, &mut ws_tx, WsMessage::Text(json.into())).await {
                    break;
                }
            }

            _ = keepalive.tick() => {
                if !send_with_deadline(&conn, &mut ws_tx, WsMessage::Ping(Vec::new().into())).await {
                    break;
                }
            }

            _ = conn.closed.cancelled() => {
                // Evicted by a newer connection or the hub is shutting down.
                let frame = WsMessage::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "server closing connection".to_string().into(),
                }));
                let _ = time::timeout(WRITE_TIMEOUT, ws_tx.send(frame)).await;
                break;
            }
        }
    }

    let _ = ws_tx.close().await;
}

async fn send_with_deadline(
    conn: &Connection,
    ws_tx: &mut SplitSink<WebSocket, WsMessage>,
    frame: WsMessage,
) -> bool {
    match time::timeout(WRITE_TIMEOUT, ws_tx.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(user_id = conn.user_id, ?e, "ws write error");
            false
        }
        Err(_) => {
            tracing::debug!(user_id = conn.user_id, "write deadline expired");
            false
        }
    }
}
