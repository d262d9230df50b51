//! Subscription registry.
//!
//! Topics are table addresses and viewer ids, both trimmed and lowercased.
//! Each topic maps a viewer id to the connection currently watching as that
//! viewer; a second subscription for the same pair replaces the first, and a
//! connection holds at most one viewer per topic. Mempool watchers are keyed
//! by connection.
//!
//! Both maps are sharded (`DashMap`), so mutation from connection tasks and
//! reads from a concurrent fan-out never contend on one global lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use super::connection::ConnectionHandle;
use crate::domain::ConnectionId;

/// Registry counters, as served on `/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub active_connections: usize,
    pub table_count: usize,
    pub total_viewers: usize,
    pub mempool_subscriber_count: usize,
}

/// Connection refused at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection limit reached ({max})")]
pub struct CapacityError {
    pub max: usize,
}

/// Slot held by an accepted connection. Released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SubscriptionRegistry {
    tables: DashMap<String, HashMap<String, ConnectionHandle>>,
    mempool: DashMap<ConnectionId, ConnectionHandle>,
    active: Arc<AtomicUsize>,
    max_connections: usize,
}

fn topic(table: &str) -> String {
    table.trim().to_ascii_lowercase()
}

fn viewer_key(viewer: &str) -> String {
    viewer.trim().to_ascii_lowercase()
}

impl SubscriptionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            tables: DashMap::new(),
            mempool: DashMap::new(),
            active: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    /// Reserve a connection slot.
    pub fn try_acquire(&self) -> Result<ConnectionPermit, CapacityError> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_connections).then_some(n + 1)
            })
            .map(|_| ConnectionPermit {
                active: self.active.clone(),
            })
            .map_err(|_| CapacityError {
                max: self.max_connections,
            })
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Watch `table` as `viewer` through `handle`. Returns the connection
    /// that held the pair before, if a different one did.
    ///
    /// A connection holds at most one viewer per table: any other viewer
    /// entry it held in `table` is dropped.
    pub fn subscribe_table(
        &self,
        table: &str,
        viewer: &str,
        handle: ConnectionHandle,
    ) -> Option<ConnectionId> {
        let conn = handle.id();
        let key = viewer_key(viewer);
        let mut viewers = self.tables.entry(topic(table)).or_default();
        viewers.retain(|v, h| h.id() != conn || *v == key);
        let previous = viewers
            .insert(key, handle)
            .map(|h| h.id())
            .filter(|id| *id != conn);
        drop(viewers);
        debug!(table = %table, viewer = %viewer, conn = %conn, replaced = previous.is_some(), "Subscribed");
        previous
    }

    /// Remove `(table, viewer)`. Unknown pairs are a no-op.
    pub fn unsubscribe_table(&self, table: &str, viewer: &str) -> bool {
        self.remove_viewer(table, viewer, None)
    }

    /// Remove `(table, viewer)` only while `conn` still holds it, so a stale
    /// connection cannot evict the one that replaced it.
    pub fn unsubscribe_table_owned(&self, table: &str, viewer: &str, conn: ConnectionId) -> bool {
        self.remove_viewer(table, viewer, Some(conn))
    }

    fn remove_viewer(&self, table: &str, viewer: &str, owner: Option<ConnectionId>) -> bool {
        let key = topic(table);
        let viewer = viewer_key(viewer);
        let removed = match self.tables.get_mut(&key) {
            Some(mut viewers) => {
                let owned = viewers
                    .get(&viewer)
                    .is_some_and(|h| owner.map_or(true, |conn| h.id() == conn));
                owned && viewers.remove(&viewer).is_some()
            }
            None => false,
        };
        self.tables.remove_if(&key, |_, viewers| viewers.is_empty());
        if removed {
            debug!(table = %key, viewer = %viewer, "Unsubscribed");
        }
        removed
    }

    pub fn subscribe_mempool(&self, handle: ConnectionHandle) {
        self.mempool.insert(handle.id(), handle);
    }

    pub fn unsubscribe_mempool(&self, conn: ConnectionId) -> bool {
        self.mempool.remove(&conn).is_some()
    }

    /// Drop every registration held by `conn` and collect emptied topics.
    /// Returns the number of table entries removed.
    pub fn on_disconnect(&self, conn: ConnectionId) -> usize {
        let mut removed = 0;
        self.tables.retain(|_, viewers| {
            let before = viewers.len();
            viewers.retain(|_, handle| handle.id() != conn);
            removed += before - viewers.len();
            !viewers.is_empty()
        });
        let mempool = self.mempool.remove(&conn).is_some();
        debug!(conn = %conn, tables = removed, mempool, "Connection cleaned up");
        removed
    }

    /// Viewer ids watching `table`, sorted.
    pub fn subscribers_of(&self, table: &str) -> Vec<String> {
        let mut viewers: Vec<String> = self
            .tables
            .get(&topic(table))
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        viewers.sort();
        viewers
    }

    /// Point-in-time copy of `table`'s viewers and their connections.
    pub fn viewers_of(&self, table: &str) -> Vec<(String, ConnectionHandle)> {
        self.tables
            .get(&topic(table))
            .map(|v| v.iter().map(|(k, h)| (k.clone(), h.clone())).collect())
            .unwrap_or_default()
    }

    pub fn viewer(&self, table: &str, viewer: &str) -> Option<ConnectionHandle> {
        self.tables
            .get(&topic(table))
            .and_then(|v| v.get(&viewer_key(viewer)).cloned())
    }

    /// Whether `conn` still holds `(table, viewer)`.
    pub fn is_current(&self, table: &str, viewer: &str, conn: ConnectionId) -> bool {
        self.viewer(table, viewer).is_some_and(|h| h.id() == conn)
    }

    pub fn mempool_subscribers(&self) -> Vec<ConnectionHandle> {
        self.mempool.iter().map(|e| e.value().clone()).collect()
    }

    pub fn is_mempool_subscriber(&self, conn: ConnectionId) -> bool {
        self.mempool.contains_key(&conn)
    }

    pub fn stats(&self) -> RegistryStats {
        let mut table_count = 0;
        let mut total_viewers = 0;
        for entry in self.tables.iter() {
            table_count += 1;
            total_viewers += entry.value().len();
        }
        RegistryStats {
            active_connections: self.active_connections(),
            table_count,
            total_viewers,
            mempool_subscriber_count: self.mempool.len(),
        }
    }
}
