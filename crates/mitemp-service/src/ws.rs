//! WebSocket broadcast of telemetry snapshots.
//!
//! Each accepted connection gets a broadcast supervisor: a send task that
//! pushes the latest snapshot to the client after every tick, and a receive
//! task that drains and discards whatever the client sends. Whichever task
//! ends first cancels the other through a shared token, and the supervisor
//! returns only once both have stopped.

use std::fmt::Display;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::snapshot::Snapshot;
use crate::state::AppState;

/// Create the WebSocket router.
///
/// The stream is served on `/` for existing clients and on `/api/ws`
/// alongside the REST endpoints.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(ws_handler))
        .route("/api/ws", get(ws_handler))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    info!("WebSocket client connected");

    let termination = supervise(
        sender,
        receiver,
        state.subscribe(),
        state.shutdown.child_token(),
    )
    .await;

    info!(reason = %termination, "WebSocket client disconnected");
}

/// Why a supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Writing to the client failed.
    SendFailed,
    /// The client sent a close frame or its stream ended.
    ClientClosed,
    /// Reading from the client failed.
    ReceiveFailed,
    /// The snapshot channel closed.
    SnapshotsClosed,
    /// The service is shutting down.
    Shutdown,
    /// One of the tasks panicked.
    TaskFailed,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Termination::SendFailed => "send failed",
            Termination::ClientClosed => "client closed",
            Termination::ReceiveFailed => "receive failed",
            Termination::SnapshotsClosed => "snapshot channel closed",
            Termination::Shutdown => "shutdown",
            Termination::TaskFailed => "task failed",
        };
        f.write_str(reason)
    }
}

/// Run one client's send and receive loops until either ends.
///
/// `cancel_token` should be a child of the service's shutdown token; it is
/// cancelled here when the first loop finishes, which stops the second.
pub async fn supervise<S, R, SE, RE>(
    sink: S,
    stream: R,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    cancel_token: CancellationToken,
) -> Termination
where
    S: Sink<Message, Error = SE> + Send + Unpin + 'static,
    SE: Display + Send + 'static,
    R: Stream<Item = Result<Message, RE>> + Send + Unpin + 'static,
    RE: Display + Send + 'static,
{
    let mut send_task = tokio::spawn(send_loop(sink, snapshots, cancel_token.clone()));
    let mut recv_task = tokio::spawn(recv_loop(stream, cancel_token.clone()));

    let first = tokio::select! {
        result = &mut send_task => {
            cancel_token.cancel();
            let _ = recv_task.await;
            result
        }
        result = &mut recv_task => {
            cancel_token.cancel();
            let _ = send_task.await;
            result
        }
    };

    first.unwrap_or(Termination::TaskFailed)
}

async fn send_loop<S, SE>(
    mut sink: S,
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    cancel_token: CancellationToken,
) -> Termination
where
    S: Sink<Message, Error = SE> + Unpin,
    SE: Display,
{
    loop {
        let snapshot = Arc::clone(&snapshots.borrow_and_update());

        // The placeholder published at startup has no readings yet.
        if snapshot.is_collected() {
            let message = Message::Text(snapshot.payload().into());
            tokio::select! {
                _ = cancel_token.cancelled() => return Termination::Shutdown,
                result = sink.send(message) => {
                    if let Err(e) = result {
                        debug!("WebSocket send failed: {}", e);
                        return Termination::SendFailed;
                    }
                    trace!(sequence = snapshot.sequence(), "Sent snapshot");
                }
            }
        }

        tokio::select! {
            _ = cancel_token.cancelled() => return Termination::Shutdown,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Termination::SnapshotsClosed;
                }
            }
        }
    }
}

async fn recv_loop<R, RE>(mut stream: R, cancel_token: CancellationToken) -> Termination
where
    R: Stream<Item = Result<Message, RE>> + Unpin,
    RE: Display,
{
    loop {
        let next = tokio::select! {
            _ = cancel_token.cancelled() => return Termination::Shutdown,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Close(_))) | None => return Termination::ClientClosed,
            Some(Ok(_)) => trace!("Discarding client message"),
            Some(Err(e)) => {
                debug!("WebSocket receive error: {}", e);
                return Termination::ReceiveFailed;
            }
        }
    }
}
