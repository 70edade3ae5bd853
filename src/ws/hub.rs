//! Connection Hub: the identity → connection registry and its routing.
//!
//! Writes (`register`, `unregister`, `sweep_closed`) take the write lock;
//! routing only takes the read lock, so concurrent senders never block
//! each other and never see a half-updated map. Routing never waits on a
//! mailbox: a full mailbox drops the frame and bumps a counter.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use super::connection::{ConnectionHandle, ConnectionState, EnqueueError};
use crate::domain::{Envelope, Role, UserId};

/// What happened to a point-to-point frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Enqueued on the recipient's mailbox.
    Delivered,
    /// Recipient is online but its mailbox was full.
    Dropped,
    /// Recipient has no live connection.
    Offline,
}

/// Snapshot of hub counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct HubStats {
    /// Registered connections.
    pub online: usize,
    /// Frames dropped on full mailboxes since start.
    pub dropped_frames: u64,
}

/// Registry of live connections, at most one per identity.
#[derive(Debug, Default)]
pub struct Hub {
    connections: RwLock<HashMap<UserId, Arc<ConnectionHandle>>>,
    dropped: AtomicU64,
}

impl Hub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` as the connection for its identity and marks it
    /// `Active`. Any other connection held for that identity is closed.
    pub async fn register(&self, handle: Arc<ConnectionHandle>) {
        handle.activate();
        let user_id = handle.user_id().clone();
        let mut map = self.connections.write().await;
        if let Some(previous) = map.insert(user_id.clone(), Arc::clone(&handle))
            && !Arc::ptr_eq(&previous, &handle)
        {
            previous.close();
            tracing::info!(user_id = %user_id, replaced = %previous.id(), "ws connection replaced");
        }
        tracing::info!(user_id = %user_id, role = %handle.role(), connection_id = %handle.id(), "ws client connected");
    }

    /// Removes `handle` if it is still the registered connection for its
    /// identity, and marks it `Closed`. Returns whether it was removed.
    pub async fn unregister(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let removed = {
            let mut map = self.connections.write().await;
            match map.get(handle.user_id()) {
                Some(current) if Arc::ptr_eq(current, handle) => {
                    map.remove(handle.user_id());
                    true
                }
                _ => false,
            }
        };
        handle.mark_closed();
        if removed {
            tracing::info!(user_id = %handle.user_id(), connection_id = %handle.id(), "ws client disconnected");
        }
        removed
    }

    /// Enqueues `envelope` for one identity.
    pub async fn route_to_identity(&self, user_id: &UserId, envelope: &Envelope) -> RouteOutcome {
        let map = self.connections.read().await;
        let Some(handle) = map.get(user_id) else {
            tracing::debug!(user_id = %user_id, topic = envelope.topic.as_str(), "recipient offline");
            return RouteOutcome::Offline;
        };
        self.enqueue(handle, envelope.to_frame())
    }

    /// Enqueues `envelope` on every connection with `role`. Returns the
    /// number of connections it was enqueued on.
    pub async fn route_by_role(&self, role: Role, envelope: &Envelope) -> usize {
        let frame = envelope.to_frame();
        let map = self.connections.read().await;
        map.values()
            .filter(|h| h.role() == role)
            .filter(|h| self.enqueue(h, frame.clone()) == RouteOutcome::Delivered)
            .count()
    }

    /// Enqueues `envelope` on every connection.
    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let frame = envelope.to_frame();
        let map = self.connections.read().await;
        map.values()
            .filter(|h| self.enqueue(h, frame.clone()) == RouteOutcome::Delivered)
            .count()
    }

    fn enqueue(&self, handle: &ConnectionHandle, frame: String) -> RouteOutcome {
        match handle.try_enqueue(frame) {
            Ok(()) => RouteOutcome::Delivered,
            Err(EnqueueError::Full) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(user_id = %handle.user_id(), "ws mailbox full, frame dropped");
                RouteOutcome::Dropped
            }
            Err(EnqueueError::Closed) => RouteOutcome::Offline,
        }
    }

    /// Whether `user_id` has a registered connection.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    /// Identities with a registered connection, sorted.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.connections.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    /// Number of registered connections.
    pub async fn online_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Current counters.
    pub async fn stats(&self) -> HubStats {
        HubStats {
            online: self.online_count().await,
            dropped_frames: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Removes entries whose connection already reached `Closed` or whose
    /// writer is gone. Returns the number removed.
    pub async fn sweep_closed(&self) -> usize {
        let mut map = self.connections.write().await;
        let before = map.len();
        map.retain(|_, h| {
            let dead = h.state() == ConnectionState::Closed || h.is_detached();
            if dead {
                h.close();
            }
            !dead
        });
        let removed = before - map.len();
        if removed > 0 {
            tracing::info!(removed, "swept closed ws connections");
        }
        removed
    }
}
