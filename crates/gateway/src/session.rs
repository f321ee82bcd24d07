//! Per-connection session state and the bounded egress queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Default egress queue bound, in frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Idle interval between server pings.
pub const PING_INTERVAL_SECS: u64 = 15;
/// Close the session when no pong arrives within this window.
pub const PONG_GRACE_SECS: u64 = 30;
/// Bound on flushing the egress queue during teardown.
pub const DRAIN_DEADLINE_SECS: u64 = 5;

/// Unique session identifier.
pub type SessionId = Uuid;

/// Validated identity attached to a session. Immutable once admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Unique user id; empty for anonymous connections.
    pub uid: String,
    /// Role name; empty when the token carries none.
    pub role: String,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            uid: String::new(),
            role: String::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.uid.is_empty()
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Handshaking = 0,
    Active = 1,
    Draining = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Handshaking,
            1 => SessionState::Active,
            2 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

/// State for a single connected client.
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Identity the connection was admitted with.
    pub principal: Arc<Principal>,
    /// Outbound frame queue, consumed by the writer task.
    pub queue: Arc<EgressQueue>,
    state: AtomicU8,
    /// Timestamp of the last pong (or client ping), millis.
    last_pong: AtomicI64,
}

impl Session {
    pub fn new(principal: Principal, queue_capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal: Arc::new(principal),
            queue: Arc::new(EgressQueue::new(queue_capacity)),
            state: AtomicU8::new(SessionState::Handshaking as u8),
            last_pong: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Handshaking → Active, once registered with the hub.
    pub fn activate(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Handshaking as u8,
            SessionState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Enter Draining. Returns true only on the first transition, so
    /// teardown is safe against re-entry.
    pub fn begin_drain(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= SessionState::Draining as u8 {
                return false;
            }
            if self
                .state
                .compare_exchange(
                    current,
                    SessionState::Draining as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Terminal transition; all resources released by the caller.
    pub fn close(&self) {
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
    }

    /// Record liveness from a pong (or a client-initiated ping).
    pub fn touch_pong(&self) {
        self.last_pong
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Millis since the last sign of liveness.
    pub fn pong_age_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.last_pong.load(Ordering::Relaxed)
    }
}

/// An outbound frame awaiting the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Routed record payload. Droppable under overflow.
    Data(String),
    /// Subscription acknowledgement or error. Never dropped.
    System(String),
    /// Keepalive probe. Skipped when the queue is full.
    Ping,
    /// Reply to a client ping. Skipped when the queue is full.
    Pong(Vec<u8>),
}

impl Frame {
    fn is_data(&self) -> bool {
        matches!(self, Frame::Data(_))
    }
}

/// Outcome of a data enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame enqueued without displacement.
    Enqueued,
    /// Frame enqueued, the oldest data frame was dropped to make room.
    DroppedOldest,
    /// Frame dropped: the queue is closed, or full with nothing evictable.
    Rejected,
}

/// Returned when a system frame cannot be enqueued; the session must
/// transition to Draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemOverflow;

struct QueueInner {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Bounded FIFO between the hub (producer) and the session's writer task
/// (consumer). Frames leave in enqueue order. A full queue drops the
/// oldest data frame to admit a new one; system frames are never
/// displaced.
pub struct EgressQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl EgressQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a data frame, evicting the oldest data frame on overflow.
    pub fn push_data(&self, text: String) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return PushOutcome::Rejected;
            }
            if inner.frames.len() < self.capacity {
                inner.frames.push_back(Frame::Data(text));
                PushOutcome::Enqueued
            } else if let Some(pos) = inner.frames.iter().position(Frame::is_data) {
                let _ = inner.frames.remove(pos);
                inner.frames.push_back(Frame::Data(text));
                PushOutcome::DroppedOldest
            } else {
                return PushOutcome::Rejected;
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Enqueue a system frame. Fails when the queue is full or closed.
    pub fn push_system(&self, text: String) -> Result<(), SystemOverflow> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed || inner.frames.len() >= self.capacity {
                return Err(SystemOverflow);
            }
            inner.frames.push_back(Frame::System(text));
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Best-effort enqueue of a keepalive frame.
    pub fn push_control(&self, frame: Frame) -> bool {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed || inner.frames.len() >= self.capacity {
                return false;
            }
            inner.frames.push_back(frame);
        }
        self.notify.notify_one();
        true
    }

    /// Close the queue. Pending frames remain poppable; pushes after this
    /// are rejected.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_one();
    }

    /// Await the next frame. Returns `None` once the queue is closed and
    /// fully drained.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<Frame> {
        self.inner.lock().unwrap().frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> String {
        format!("frame-{n}")
    }

    #[test]
    fn frames_leave_in_enqueue_order() {
        let q = EgressQueue::new(8);
        for n in 0..5 {
            assert_eq!(q.push_data(data(n)), PushOutcome::Enqueued);
        }
        for n in 0..5 {
            assert_eq!(q.try_pop(), Some(Frame::Data(data(n))));
        }
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn overflow_drops_oldest_data_frame() {
        let q = EgressQueue::new(3);
        for n in 0..3 {
            q.push_data(data(n));
        }
        assert_eq!(q.push_data(data(3)), PushOutcome::DroppedOldest);
        // frame-0 is gone; the rest arrive in order.
        assert_eq!(q.try_pop(), Some(Frame::Data(data(1))));
        assert_eq!(q.try_pop(), Some(Frame::Data(data(2))));
        assert_eq!(q.try_pop(), Some(Frame::Data(data(3))));
    }

    #[test]
    fn system_frames_survive_data_overflow() {
        let q = EgressQueue::new(2);
        q.push_system("ack".to_string()).unwrap();
        q.push_data(data(0));
        // Queue full: the data frame is evicted, never the ack.
        assert_eq!(q.push_data(data(1)), PushOutcome::DroppedOldest);
        assert_eq!(q.try_pop(), Some(Frame::System("ack".to_string())));
        assert_eq!(q.try_pop(), Some(Frame::Data(data(1))));
    }

    #[test]
    fn data_rejected_when_full_of_system_frames() {
        let q = EgressQueue::new(2);
        q.push_system("a".to_string()).unwrap();
        q.push_system("b".to_string()).unwrap();
        assert_eq!(q.push_data(data(0)), PushOutcome::Rejected);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn system_push_fails_when_full() {
        let q = EgressQueue::new(2);
        q.push_data(data(0));
        q.push_data(data(1));
        assert_eq!(q.push_system("ack".to_string()), Err(SystemOverflow));
    }

    #[test]
    fn closed_queue_rejects_pushes_but_drains() {
        let q = EgressQueue::new(4);
        q.push_data(data(0));
        q.close();
        assert_eq!(q.push_data(data(1)), PushOutcome::Rejected);
        assert!(q.push_system("ack".to_string()).is_err());
        assert_eq!(q.try_pop(), Some(Frame::Data(data(0))));
        assert!(q.try_pop().is_none());
    }

    #[tokio::test]
    async fn pop_wakes_on_push_and_ends_on_close() {
        let q = Arc::new(EgressQueue::new(4));

        let q2 = q.clone();
        let waiter = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(frame) = q2.pop().await {
                seen.push(frame);
            }
            seen
        });

        tokio::task::yield_now().await;
        q.push_data(data(0));
        q.push_system("ack".to_string()).unwrap();
        q.close();

        let seen = waiter.await.unwrap();
        assert_eq!(
            seen,
            vec![Frame::Data(data(0)), Frame::System("ack".to_string())]
        );
    }

    #[test]
    fn session_state_transitions() {
        let s = Session::new(Principal::anonymous(), 4);
        assert_eq!(s.state(), SessionState::Handshaking);
        s.activate();
        assert_eq!(s.state(), SessionState::Active);
        assert!(s.begin_drain());
        assert!(!s.begin_drain(), "drain entry is one-shot");
        assert_eq!(s.state(), SessionState::Draining);
        s.close();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(!s.begin_drain(), "closed sessions stay closed");
    }

    #[test]
    fn principal_anonymity() {
        assert!(Principal::anonymous().is_anonymous());
        let p = Principal {
            uid: "alice".to_string(),
            role: String::new(),
        };
        assert!(!p.is_anonymous());
    }
}
