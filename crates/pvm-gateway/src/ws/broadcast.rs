//! # Broadcast Service
//!
//! Delivers game-state projections and mempool snapshots to registered
//! connections.
//!
//! Every operation reads a fresh snapshot of the registry and rechecks
//! membership before each send, so viewers may come and go mid-broadcast.
//! A failed delivery is local to its viewer: it is collected, cleaned up
//! through the registry, and never reported to whoever triggered the
//! broadcast.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::connection::{ConnectionHandle, DeliveryError};
use super::messages::ServerEvent;
use super::registry::SubscriptionRegistry;
use crate::middleware::GatewayMetrics;
use crate::projection::ProjectionSource;

/// Per-broadcast delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

enum Delivery {
    Delivered,
    /// Viewer left or was replaced before its turn.
    Skipped,
    Failed(Failure),
}

enum Failure {
    /// The connection is unusable.
    Connection(ConnectionHandle, DeliveryError),
    /// The viewer's projection could not be produced.
    Viewer(String, ConnectionHandle),
}

pub struct BroadcastService {
    registry: Arc<SubscriptionRegistry>,
    projections: Arc<dyn ProjectionSource>,
    metrics: Arc<GatewayMetrics>,
}

impl BroadcastService {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        projections: Arc<dyn ProjectionSource>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            registry,
            projections,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Unicast `projection` to one viewer. Returns whether it was queued.
    pub fn send_to_one(&self, table: &str, viewer: &str, projection: Value) -> bool {
        let Some(handle) = self.registry.viewer(table, viewer) else {
            debug!(table = %table, viewer = %viewer, "No such viewer, nothing sent");
            return false;
        };
        if !handle.is_open() {
            debug!(table = %table, viewer = %viewer, "Viewer connection not open");
            self.drop_connection(&handle, DeliveryError::Closed);
            return false;
        }
        let event = ServerEvent::game_state(table, viewer, projection);
        match self.deliver(&handle, &event) {
            Ok(()) => true,
            Err(e) => {
                self.drop_connection(&handle, e);
                false
            }
        }
    }

    /// Fetch and unicast `viewer`'s current projection of `table`.
    pub async fn push_initial_state(&self, table: &str, viewer: &str) -> bool {
        match self.projections.game_projection(table, Some(viewer)).await {
            Ok(state) => self.send_to_one(table, viewer, state),
            Err(e) => {
                debug!(table = %table, viewer = %viewer, error = %e, "No initial state to push");
                false
            }
        }
    }

    /// Send the current mempool to one connection.
    pub fn push_mempool_to(&self, handle: &ConnectionHandle) -> bool {
        let event = ServerEvent::mempool(self.projections.mempool_snapshot());
        match self.deliver(handle, &event) {
            Ok(()) => true,
            Err(e) => {
                self.drop_connection(handle, e);
                false
            }
        }
    }

    /// Push each viewer of `table` their own projection.
    #[instrument(skip(self))]
    pub async fn broadcast_to_all(&self, table: &str) -> BroadcastReport {
        let viewers = self.registry.viewers_of(table);
        if viewers.is_empty() {
            debug!(table = %table, "No viewers, broadcast skipped");
            return BroadcastReport::default();
        }
        self.metrics.record_broadcast();

        let outcomes = join_all(
            viewers
                .into_iter()
                .map(|(viewer, handle)| self.deliver_projection(table, viewer, handle)),
        )
        .await;

        let mut report = BroadcastReport::default();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Delivery::Delivered => {
                    report.attempted += 1;
                    report.delivered += 1;
                }
                Delivery::Skipped => {}
                Delivery::Failed(failure) => {
                    report.attempted += 1;
                    report.failed += 1;
                    failures.push(failure);
                }
            }
        }

        for failure in failures {
            match failure {
                Failure::Connection(handle, reason) => self.drop_connection(&handle, reason),
                Failure::Viewer(viewer, handle) => {
                    self.registry
                        .unsubscribe_table_owned(table, &viewer, handle.id());
                }
            }
        }

        debug!(
            table = %table,
            delivered = report.delivered,
            failed = report.failed,
            "Game state broadcast"
        );
        report
    }

    async fn deliver_projection(
        &self,
        table: &str,
        viewer: String,
        handle: ConnectionHandle,
    ) -> Delivery {
        if !self.registry.is_current(table, &viewer, handle.id()) {
            return Delivery::Skipped;
        }
        if !handle.is_open() {
            return Delivery::Failed(Failure::Connection(handle, DeliveryError::Closed));
        }
        let state = match self.projections.game_projection(table, Some(&viewer)).await {
            Ok(state) => state,
            Err(e) => {
                warn!(table = %table, viewer = %viewer, error = %e, "Projection failed");
                self.metrics.record_delivery_failure();
                return Delivery::Failed(Failure::Viewer(viewer, handle));
            }
        };
        // Membership may have changed while the projection was computed.
        if !self.registry.is_current(table, &viewer, handle.id()) {
            return Delivery::Skipped;
        }
        let event = ServerEvent::game_state(table, &viewer, state);
        match self.deliver(&handle, &event) {
            Ok(()) => Delivery::Delivered,
            Err(e) => Delivery::Failed(Failure::Connection(handle, e)),
        }
    }

    /// Fan one mempool snapshot out to every mempool subscriber.
    #[instrument(skip(self))]
    pub fn broadcast_mempool(&self) -> BroadcastReport {
        let subscribers = self.registry.mempool_subscribers();
        if subscribers.is_empty() {
            debug!("No mempool subscribers, broadcast skipped");
            return BroadcastReport::default();
        }
        self.metrics.record_broadcast();

        let event = ServerEvent::mempool(self.projections.mempool_snapshot());
        let text: Arc<str> = match event.to_text() {
            Ok(text) => text.into(),
            Err(e) => {
                warn!(error = %e, "Mempool event serialization failed");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        for handle in subscribers {
            if !self.registry.is_mempool_subscriber(handle.id()) {
                continue;
            }
            report.attempted += 1;
            let sent = if handle.is_open() {
                handle.send(text.clone())
            } else {
                Err(DeliveryError::Closed)
            };
            match sent {
                Ok(()) => {
                    self.metrics.record_ws_message();
                    report.delivered += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    self.drop_connection(&handle, e);
                }
            }
        }
        debug!(delivered = report.delivered, failed = report.failed, "Mempool broadcast");
        report
    }

    /// Serialize and queue one event.
    fn deliver(&self, handle: &ConnectionHandle, event: &ServerEvent) -> Result<(), DeliveryError> {
        let text = event.to_text().map_err(|e| {
            warn!(conn = %handle.id(), error = %e, "Event serialization failed");
            DeliveryError::Closed
        })?;
        handle.send(text.into())?;
        self.metrics.record_ws_message();
        Ok(())
    }

    fn drop_connection(&self, handle: &ConnectionHandle, reason: DeliveryError) {
        warn!(conn = %handle.id(), reason = %reason, "Delivery failed, dropping connection");
        self.metrics.record_delivery_failure();
        handle.close();
        self.registry.on_disconnect(handle.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConnectionId;
    use crate::projection::ProjectionError;
    use crate::ws::connection::{Frame, Outbox};
    use async_trait::async_trait;
    use serde_json::json;
    use shared_types::{GameStateDto, TransactionDto};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Projection source that echoes the viewer and can refuse one of them.
    #[derive(Default)]
    struct Echo {
        refuse: Option<String>,
        snapshots: AtomicUsize,
    }

    #[async_trait]
    impl ProjectionSource for Echo {
        async fn game_projection(
            &self,
            table: &str,
            viewer: Option<&str>,
        ) -> Result<GameStateDto, ProjectionError> {
            if viewer.is_some() && viewer == self.refuse.as_deref() {
                return Err(ProjectionError::UnknownTable(table.to_string()));
            }
            Ok(json!({ "table": table, "viewer": viewer }))
        }

        fn mempool_snapshot(&self) -> Vec<TransactionDto> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
    }

    fn service(source: Echo) -> (BroadcastService, Arc<Echo>) {
        let source = Arc::new(source);
        let service = BroadcastService::new(
            Arc::new(SubscriptionRegistry::new(16)),
            source.clone(),
            Arc::new(GatewayMetrics::new()),
        );
        (service, source)
    }

    fn connect(buffer: usize) -> (ConnectionHandle, Outbox) {
        ConnectionHandle::new(ConnectionId::new(), buffer)
    }

    fn next_event(outbox: &mut Outbox) -> Option<Value> {
        match outbox.frames.try_recv().ok()? {
            Frame::Text(text) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_failed_viewer_is_isolated_and_removed() {
        let (service, _) = service(Echo::default());
        let (a, mut a_out) = connect(4);
        let (b, b_out) = connect(4);
        let (c, mut c_out) = connect(4);
        for (viewer, handle) in [("a", &a), ("b", &b), ("c", &c)] {
            service.registry().subscribe_table("0xabc", viewer, handle.clone());
        }
        drop(b_out);

        let report = service.broadcast_to_all("0xabc").await;
        assert_eq!(report, BroadcastReport { attempted: 3, delivered: 2, failed: 1 });

        assert_eq!(next_event(&mut a_out).unwrap()["gameState"]["viewer"], "a");
        assert_eq!(next_event(&mut c_out).unwrap()["gameState"]["viewer"], "c");
        assert_eq!(service.registry().subscribers_of("0xabc"), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_stalled_consumer_is_a_delivery_fault() {
        let (service, _) = service(Echo::default());
        let (slow, _slow_out) = connect(1);
        slow.send("backlog".into()).unwrap();
        service.registry().subscribe_table("0xabc", "slow", slow.clone());

        let report = service.broadcast_to_all("0xabc").await;
        assert_eq!(report.failed, 1);
        assert!(!slow.is_open());
        assert_eq!(service.registry().stats().table_count, 0);
    }

    #[tokio::test]
    async fn test_projection_failure_drops_only_that_viewer() {
        let (service, _) = service(Echo {
            refuse: Some("b".into()),
            ..Echo::default()
        });
        let (a, mut a_out) = connect(8);
        let (b, mut b_out) = connect(8);
        service.registry().subscribe_table("0xabc", "a", a.clone());
        service.registry().subscribe_table("0xabc", "b", b.clone());

        let report = service.broadcast_to_all("0xabc").await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(a.is_open());
        assert!(b.is_open());
        assert_eq!(service.registry().subscribers_of("0xabc"), vec!["a"]);
        assert_eq!(next_event(&mut a_out).unwrap()["playerId"], "a");
        assert!(next_event(&mut b_out).is_none());
    }

    #[tokio::test]
    async fn test_empty_topic_is_silent() {
        let (service, _) = service(Echo::default());
        assert_eq!(service.broadcast_to_all("0xnone").await, BroadcastReport::default());
    }

    #[test]
    fn test_mempool_broadcast_skips_without_subscribers() {
        let (service, source) = service(Echo::default());
        assert_eq!(service.broadcast_mempool(), BroadcastReport::default());
        assert_eq!(source.snapshots.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mempool_broadcast_fetches_once_and_prunes_closed() {
        let (service, source) = service(Echo::default());
        let (a, mut a_out) = connect(4);
        let (b, mut b_out) = connect(4);
        let (gone, gone_out) = connect(4);
        for handle in [&a, &b, &gone] {
            service.registry().subscribe_mempool(handle.clone());
        }
        drop(gone_out);

        let report = service.broadcast_mempool();
        assert_eq!(source.snapshots.load(Ordering::SeqCst), 1);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(next_event(&mut a_out).unwrap()["type"], "mempoolUpdate");
        assert_eq!(next_event(&mut b_out).unwrap()["count"], 0);
        assert_eq!(service.registry().stats().mempool_subscriber_count, 2);
    }

    #[test]
    fn test_send_to_one_unknown_viewer_is_noop() {
        let (service, _) = service(Echo::default());
        assert!(!service.send_to_one("0xabc", "ghost", json!({})));
    }

    #[tokio::test]
    async fn test_push_initial_state() {
        let (service, _) = service(Echo::default());
        let (conn, mut out) = connect(4);
        service.registry().subscribe_table("0xabc", "p1", conn);
        assert!(service.push_initial_state("0xabc", "p1").await);
        let event = next_event(&mut out).unwrap();
        assert_eq!(event["type"], "gameStateUpdate");
        assert_eq!(event["tableAddress"], "0xabc");
    }
}
