//! Per-connection session and frame loop.
//!
//! Each accepted WebSocket gets a session: a read loop that classifies and
//! dispatches inbound frames, and a single writer task draining a bounded
//! outbox.  Frames enqueued onto one session are delivered strictly FIFO.
//! A failure against one frame never terminates the session; transport
//! close always does.

use crate::resolve;
use crate::state::{AppState, Ctx};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use sa_protocol::{messages, ActionStatus, ClientFrame, Payload, ServerFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) const OUTBOX_CAPACITY: usize = 256;
/// A producer blocked this long on a full outbox marks the session
/// unresponsive and closes it.
pub(crate) const ENQUEUE_DEADLINE: Duration = Duration::from_secs(10);
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// One entry in a session's outbox.  Pongs ride the same queue so the
/// writer task is the only place the sink is touched.
pub(crate) enum Outbound {
    Frame(ServerFrame),
    Pong(Bytes),
}

/// Cheap cloneable reference to a live session: id, outbox sender, and the
/// terminal closed flag.  The subscription engine holds these.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    id: Uuid,
    tx: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
}

impl SessionHandle {
    fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            close_notify: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flip the session into CLOSING.  Idempotent; wakes the read loop.
    pub(crate) fn begin_close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_notify.notify_one();
    }

    async fn closed_notified(&self) {
        self.close_notify.notified().await;
    }

    /// Queue a frame onto the outbox.  Frames for a closing session are
    /// dropped silently.  Returns whether the frame was accepted.
    pub(crate) async fn enqueue(&self, frame: ServerFrame) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.tx.send_timeout(Outbound::Frame(frame), ENQUEUE_DEADLINE).await {
            Ok(()) => true,
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                warn!(session_id = %self.id, "outbox full past deadline; closing unresponsive session");
                self.begin_close();
                false
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => false,
        }
    }

    async fn pong(&self, data: Bytes) {
        let _ = self.tx.send(Outbound::Pong(data)).await;
    }

    #[cfg(test)]
    pub(crate) fn test_pair(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

// ---------------------------------------------------------------------------
// Frame loop
// ---------------------------------------------------------------------------

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOX_CAPACITY);
    let session = SessionHandle::new(tx);
    let session_id = session.id();

    state
        .shared
        .sessions
        .write()
        .await
        .insert(session_id, session.clone());
    info!(session_id = %session_id, "session open");

    let mut writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let message = match out {
                Outbound::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => Message::Text(json.into()),
                    Err(error) => {
                        warn!(error = %error, "dropping unserializable frame");
                        continue;
                    }
                },
                Outbound::Pong(data) => Message::Pong(data),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            () = session.closed_notified() => break,
            inbound = stream.next() => match inbound {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Err(error)) => {
                    debug!(session_id = %session_id, error = %error, "transport error");
                    break;
                }
                Some(Ok(Message::Text(text))) => {
                    dispatch_frame(&state, &session, text.as_str()).await;
                    if session.is_closed() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => session.pong(data).await,
                // Only text frames carry protocol traffic.
                Some(Ok(_)) => {}
            }
        }
    }

    state.shared.detach(&session).await;
    session.begin_close();
    drop(session);
    // Best-effort drain of whatever the writer still holds.
    if tokio::time::timeout(DRAIN_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    info!(session_id = %session_id, "session closed");
}

// ---------------------------------------------------------------------------
// Classification and dispatch
// ---------------------------------------------------------------------------

async fn dispatch_frame(state: &AppState, session: &SessionHandle, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(error) => {
            debug!(session_id = %session.id(), error = %error, "undecodable frame");
            session
                .enqueue(ServerFrame::Error {
                    message: messages::MALFORMED_FRAME.to_owned(),
                })
                .await;
            return;
        }
    };

    match frame {
        ClientFrame::Action { channel, data } => run_action(state, session, channel, data).await,
        ClientFrame::Subscribe { channel, data } => subscribe(state, session, channel, data).await,
        ClientFrame::Unsubscribe { channel } => {
            state.shared.subs.remove(session.id(), &channel).await;
            session.enqueue(ServerFrame::Unsubscribed { channel }).await;
        }
    }
}

async fn run_action(state: &AppState, session: &SessionHandle, channel: String, data: Payload) {
    let Some(endpoint) = state.shared.registry.action(&channel) else {
        session
            .enqueue(ServerFrame::Error {
                message: messages::action_not_found(&channel),
            })
            .await;
        return;
    };

    let ctx = Ctx::for_session(state.shared.clone(), session.id());
    match resolve::resolve_and_invoke(endpoint, &data, &ctx).await {
        Ok(data) => {
            session
                .enqueue(ServerFrame::Action {
                    channel,
                    status: ActionStatus::Completed,
                    data,
                })
                .await;
        }
        Err(error) => {
            let message = if error.is_fault() {
                warn!(action = %channel, session_id = %session.id(), error = %error, "action handler failed");
                messages::HANDLER_FAULT.to_owned()
            } else {
                debug!(action = %channel, session_id = %session.id(), error = %error, "invalid action parameters");
                messages::invalid_parameters(&channel)
            };
            session.enqueue(ServerFrame::Error { message }).await;
        }
    }
}

async fn subscribe(state: &AppState, session: &SessionHandle, channel: String, payload: Payload) {
    let Some(endpoint) = state.shared.registry.channel(&channel) else {
        session
            .enqueue(ServerFrame::Error {
                message: messages::channel_not_found(&channel),
            })
            .await;
        return;
    };

    let bound = match resolve::bind_subscription_args(&endpoint.schema, &payload) {
        Ok(bound) => bound,
        Err(error) => {
            debug!(channel = %channel, session_id = %session.id(), error = %error, "invalid subscribe parameters");
            session
                .enqueue(ServerFrame::Error {
                    message: messages::invalid_parameters(&channel),
                })
                .await;
            return;
        }
    };

    state.shared.subs.insert(session, &channel, bound.clone()).await;
    session
        .enqueue(ServerFrame::Subscribed {
            channel: channel.clone(),
        })
        .await;

    if endpoint.default_response {
        // Subscribe-time self-prime: one invocation targeted at this
        // session only.  A fault leaves the subscription intact.
        let effective = resolve::overlay(&bound, &payload);
        let ctx = Ctx::for_session(state.shared.clone(), session.id());
        match resolve::resolve_and_invoke(endpoint, &effective, &ctx).await {
            Ok(Some(value)) => {
                session
                    .enqueue(ServerFrame::Data {
                        channel,
                        data: value,
                    })
                    .await;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(channel = %channel, session_id = %session.id(), error = %error, "initial channel invocation failed");
            }
        }
    }
}
