//! Subscription engine state.
//!
//! Tracks, per channel, the insertion-ordered set of subscriber sessions
//! with their subscribe-time bound arguments, plus a reverse map from
//! session id to channel names.  Reads (broadcast snapshots) and writes
//! (subscribe/unsubscribe/detach) follow a readers/writer discipline; a
//! broadcast enumerates a snapshot, so mid-flight churn never corrupts
//! iteration and a subscriber added mid-broadcast is not observed by it.

use crate::session::SessionHandle;
use sa_protocol::Payload;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct SubscriptionRecord {
    pub session: SessionHandle,
    /// Validated required-on-subscribe values captured at subscribe time.
    pub bound_args: Payload,
    /// Monotonic sequence for tie-breaking when iterating.
    pub created: u64,
}

#[derive(Default)]
struct Maps {
    channels: HashMap<String, Vec<SubscriptionRecord>>,
    by_session: HashMap<Uuid, HashSet<String>>,
}

pub(crate) struct SubscriptionEngine {
    maps: RwLock<Maps>,
    seq: AtomicU64,
}

impl SubscriptionEngine {
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            seq: AtomicU64::new(0),
        }
    }

    /// Insert a subscription record, or replace the bound arguments of an
    /// existing one.  A session holds at most one record per channel.
    pub async fn insert(&self, session: &SessionHandle, channel: &str, bound_args: Payload) {
        let created = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut maps = self.maps.write().await;
        let records = maps.channels.entry(channel.to_owned()).or_default();
        if let Some(existing) = records
            .iter_mut()
            .find(|record| record.session.id() == session.id())
        {
            existing.bound_args = bound_args;
            existing.created = created;
        } else {
            records.push(SubscriptionRecord {
                session: session.clone(),
                bound_args,
                created,
            });
        }
        maps.by_session
            .entry(session.id())
            .or_default()
            .insert(channel.to_owned());
    }

    /// Remove one subscription.  Idempotent; returns whether a record
    /// actually existed.
    pub async fn remove(&self, session_id: Uuid, channel: &str) -> bool {
        let mut maps = self.maps.write().await;
        let removed = match maps.channels.get_mut(channel) {
            Some(records) => {
                let before = records.len();
                records.retain(|record| record.session.id() != session_id);
                before != records.len()
            }
            None => false,
        };
        if maps
            .channels
            .get(channel)
            .is_some_and(|records| records.is_empty())
        {
            maps.channels.remove(channel);
        }
        if let Some(channels) = maps.by_session.get_mut(&session_id) {
            channels.remove(channel);
            if channels.is_empty() {
                maps.by_session.remove(&session_id);
            }
        }
        removed
    }

    /// Drop every record the session holds.  No frames are emitted; the
    /// session is closing.
    pub async fn detach(&self, session_id: Uuid) {
        let mut maps = self.maps.write().await;
        let Some(channels) = maps.by_session.remove(&session_id) else {
            return;
        };
        for channel in channels {
            let emptied = match maps.channels.get_mut(&channel) {
                Some(records) => {
                    records.retain(|record| record.session.id() != session_id);
                    records.is_empty()
                }
                None => false,
            };
            if emptied {
                maps.channels.remove(&channel);
            }
        }
    }

    /// Snapshot a channel's subscribers in insertion order.
    pub async fn snapshot(&self, channel: &str) -> Vec<SubscriptionRecord> {
        self.maps
            .read()
            .await
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_subscribed(&self, session_id: Uuid, channel: &str) -> bool {
        self.maps
            .read()
            .await
            .by_session
            .get(&session_id)
            .is_some_and(|channels| channels.contains(channel))
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.maps
            .read()
            .await
            .channels
            .get(channel)
            .map_or(0, Vec::len)
    }
}
