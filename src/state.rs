//! Process-wide shared state and the broadcast fan-out path.
//!
//! `Shared` holds the frozen registry, the subscription engine, and the
//! live session table.  Every fan-out goes through [`Shared::broadcast`],
//! whether it was triggered from a handler, the ingress, or a
//! subscribe-time self-prime.

use crate::config::Config;
use crate::registry::Registry;
use crate::resolve;
use crate::session::SessionHandle;
use crate::subscriptions::SubscriptionEngine;
use futures_util::future::join_all;
use sa_protocol::{Payload, ServerFrame};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("channel '{0}' is not registered")]
    UnknownChannel(String),
}

pub(crate) struct Shared {
    pub registry: Registry,
    pub subs: SubscriptionEngine,
    pub sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    pub config: Config,
}

impl Shared {
    pub fn new(registry: Registry, config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry,
            subs: SubscriptionEngine::new(),
            sessions: RwLock::new(HashMap::new()),
            config,
        })
    }

    /// Fan a channel invocation out to every current subscriber.
    ///
    /// The subscriber set is snapshotted up front; per-subscriber
    /// resolution and invocation then proceed concurrently, each producing
    /// at most one `data` frame on that subscriber's outbox.  A handler
    /// fault drops the frame for the affected subscriber only.  Returns
    /// the number of subscribers the broadcast was offered to.
    pub async fn broadcast(
        self: &Arc<Self>,
        channel: &str,
        call_args: &Payload,
    ) -> Result<usize, BroadcastError> {
        let Some(endpoint) = self.registry.channel(channel) else {
            return Err(BroadcastError::UnknownChannel(channel.to_owned()));
        };
        let records = self.subs.snapshot(channel).await;
        let ctx = Ctx::detached(self.clone());

        let deliveries = records
            .iter()
            .filter(|record| !record.session.is_closed())
            .map(|record| {
                let ctx = ctx.clone();
                async move {
                    let effective = resolve::overlay(&record.bound_args, call_args);
                    match resolve::resolve_and_invoke(endpoint, &effective, &ctx).await {
                        Ok(Some(value)) => {
                            record
                                .session
                                .enqueue(ServerFrame::Data {
                                    channel: channel.to_owned(),
                                    data: value,
                                })
                                .await;
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!(
                                channel = %channel,
                                session_id = %record.session.id(),
                                error = %error,
                                "broadcast handler failed; dropping frame for this subscriber"
                            );
                        }
                    }
                }
            });
        let offered = join_all(deliveries).await.len();
        Ok(offered)
    }

    /// Remove a closing session from the session table and from every
    /// channel's subscriber set, atomically per map.
    pub async fn detach(&self, session: &SessionHandle) {
        self.subs.detach(session.id()).await;
        let remaining = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&session.id());
            sessions.len()
        };
        debug!(session_id = %session.id(), sessions = remaining, "session detached");
    }
}

/// Handler state cloned into axum handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub shared: Arc<Shared>,
}

// ---------------------------------------------------------------------------
// Invocation context
// ---------------------------------------------------------------------------

/// The context value threaded through every handler invocation.
///
/// `broadcast` from inside a handler goes straight through the engine; code
/// with no invocation context uses [`crate::Publisher`] instead, which
/// reaches the same fan-out through the loopback ingress.
#[derive(Clone)]
pub struct Ctx {
    pub(crate) shared: Arc<Shared>,
    session_id: Option<Uuid>,
}

impl Ctx {
    pub(crate) fn for_session(shared: Arc<Shared>, session_id: Uuid) -> Self {
        Self {
            shared,
            session_id: Some(session_id),
        }
    }

    pub(crate) fn detached(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            session_id: None,
        }
    }

    /// Id of the session this invocation is serving, if any.  Broadcast
    /// and ingress invocations carry none.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Invoke a channel from inside a handler: fan out to every current
    /// subscriber of `channel`.
    pub async fn broadcast(&self, channel: &str, data: Payload) -> Result<(), BroadcastError> {
        self.shared.broadcast(channel, &data).await.map(|_| ())
    }
}

#[cfg(test)]
pub(crate) fn test_ctx() -> Ctx {
    Ctx::detached(Shared::new(Registry::empty(), Config::default()))
}
