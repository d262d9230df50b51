//! Gateway counters exposed on `/stats`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use shared_types::MethodCategory;

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    // Request counters
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,
    pub write_requests_total: AtomicU64,
    pub control_requests_total: AtomicU64,

    // WebSocket counters
    pub websocket_connections: AtomicU64,
    pub websocket_rejected: AtomicU64,
    pub websocket_messages_sent: AtomicU64,
    pub websocket_delivery_failures: AtomicU64,
    pub broadcasts_total: AtomicU64,

    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched request
    pub fn record_request(&self, success: bool, category: Option<MethodCategory>, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }

        match category {
            Some(MethodCategory::Write) => {
                self.write_requests_total.fetch_add(1, Ordering::Relaxed);
            }
            Some(MethodCategory::Control) => {
                self.control_requests_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_connect(&self) {
        self.websocket_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_disconnect(&self) {
        self.websocket_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Connection refused at capacity
    pub fn record_ws_rejected(&self) {
        self.websocket_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_message(&self) {
        self.websocket_messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.websocket_delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": {
                "total": self.requests_total.load(Ordering::Relaxed),
                "success": self.requests_success.load(Ordering::Relaxed),
                "error": self.requests_error.load(Ordering::Relaxed),
                "writes": self.write_requests_total.load(Ordering::Relaxed),
                "control": self.control_requests_total.load(Ordering::Relaxed),
            },
            "websocket": {
                "connections": self.websocket_connections.load(Ordering::Relaxed),
                "rejected": self.websocket_rejected.load(Ordering::Relaxed),
                "messages_sent": self.websocket_messages_sent.load(Ordering::Relaxed),
                "delivery_failures": self.websocket_delivery_failures.load(Ordering::Relaxed),
                "broadcasts": self.broadcasts_total.load(Ordering::Relaxed),
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<GatewayMetrics>,
    category: Option<MethodCategory>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
            category: None,
        }
    }

    /// Attribute the request once its method is known.
    pub fn set_category(&mut self, category: MethodCategory) {
        self.category = Some(category);
    }

    pub fn finish(self, success: bool) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics
            .record_request(success, self.category, latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = GatewayMetrics::new();

        metrics.record_request(true, Some(MethodCategory::Read), 100);
        metrics.record_request(true, None, 200);
        metrics.record_request(false, Some(MethodCategory::Write), 50);
        metrics.record_request(false, Some(MethodCategory::Control), 50);

        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.requests_success.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_error.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.write_requests_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.control_requests_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_average_latency() {
        let metrics = GatewayMetrics::new();

        metrics.record_request(true, None, 100);
        metrics.record_request(true, None, 200);
        metrics.record_request(true, None, 300);

        assert!((metrics.average_latency_ms() - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_websocket_metrics() {
        let metrics = GatewayMetrics::new();

        metrics.record_ws_connect();
        metrics.record_ws_connect();
        metrics.record_ws_rejected();
        metrics.record_ws_message();
        metrics.record_delivery_failure();
        metrics.record_ws_disconnect();

        let json = metrics.to_json();
        assert_eq!(json["websocket"]["connections"], 1);
        assert_eq!(json["websocket"]["rejected"], 1);
        assert_eq!(json["websocket"]["messages_sent"], 1);
        assert_eq!(json["websocket"]["delivery_failures"], 1);
    }

    #[test]
    fn test_timer_records_category() {
        let metrics = Arc::new(GatewayMetrics::new());
        let mut timer = RequestTimer::new(metrics.clone());
        timer.set_category(MethodCategory::Write);
        timer.finish(true);
        assert_eq!(metrics.write_requests_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_success.load(Ordering::Relaxed), 1);
    }
}
