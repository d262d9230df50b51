//! Per-connection outbound queue.
//!
//! Every socket gets a bounded channel drained by its own writer task. The
//! registry and the broadcast service only ever hold a [`ConnectionHandle`];
//! they never touch the socket, so a slow consumer cannot stall a fan-out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

use crate::domain::ConnectionId;

/// Frame queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Serialized event. Shared so one payload can fan out without copies.
    Text(Arc<str>),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

/// Why a frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Backpressure,
}

/// Cloneable sending side of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    closed: Arc<AtomicBool>,
    closer: Arc<Notify>,
}

/// Receiving side, owned by the connection's tasks.
#[derive(Debug)]
pub struct Outbox {
    pub frames: mpsc::Receiver<Frame>,
    pub closer: Arc<Notify>,
}

impl ConnectionHandle {
    /// Create a handle with room for `buffer` queued frames.
    pub fn new(id: ConnectionId, buffer: usize) -> (Self, Outbox) {
        let (tx, frames) = mpsc::channel(buffer.max(1));
        let closer = Arc::new(Notify::new());
        let handle = Self {
            id,
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            closer: closer.clone(),
        };
        (handle, Outbox { frames, closer })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Queue an event without waiting. A full queue means the consumer has
    /// stalled.
    pub fn send(&self, text: Arc<str>) -> Result<(), DeliveryError> {
        self.push(Frame::Text(text))
    }

    /// Queue any frame without waiting.
    pub fn push(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backpressure,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Ask the connection's tasks to wind down. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closer.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_frames_arrive_in_order() {
        let (handle, mut outbox) = ConnectionHandle::new(ConnectionId::new(), 4);
        handle.send("a".into()).unwrap();
        handle.send("b".into()).unwrap();
        assert_eq!(outbox.frames.recv().await, Some(Frame::Text("a".into())));
        assert_eq!(outbox.frames.recv().await, Some(Frame::Text("b".into())));
    }

    #[test]
    fn test_send_wakes_waiting_writer() {
        let (handle, mut outbox) = ConnectionHandle::new(ConnectionId::new(), 4);
        let mut recv = tokio_test::task::spawn(outbox.frames.recv());
        tokio_test::assert_pending!(recv.poll());

        handle.send("a".into()).unwrap();
        assert!(recv.is_woken());
        tokio_test::assert_ready_eq!(recv.poll(), Some(Frame::Text("a".into())));
    }

    #[test]
    fn test_full_queue_is_backpressure() {
        let (handle, _outbox) = ConnectionHandle::new(ConnectionId::new(), 1);
        handle.send("first".into()).unwrap();
        assert_eq!(handle.send("second".into()), Err(DeliveryError::Backpressure));
        assert!(handle.is_open());
    }

    #[test]
    fn test_dropped_outbox_is_closed() {
        let (handle, outbox) = ConnectionHandle::new(ConnectionId::new(), 4);
        drop(outbox);
        assert!(!handle.is_open());
        assert_eq!(handle.send("x".into()), Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn test_close_wakes_owner_once() {
        let (handle, outbox) = ConnectionHandle::new(ConnectionId::new(), 4);
        let clone = handle.clone();
        handle.close();
        clone.close();
        outbox.closer.notified().await;
        assert!(!clone.is_open());
        assert_eq!(clone.send("x".into()), Err(DeliveryError::Closed));
    }
}
