//! The hub: session registry, topic index, and record fan-out.
//!
//! All index mutations and broadcasts share one mutex-guarded critical
//! section, which gives them a single total order: a broadcast sees either
//! the subscription state before a mutation or after it, never a mix. The
//! section never blocks on socket I/O; delivery is a non-blocking enqueue
//! onto each admitted session's egress queue.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use metrics::counter;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::policy::{permit, AccessMatrix};
use crate::protocol::{data_frame, ServerFrame, MSG_SUBSCRIBED, MSG_UNSUBSCRIBED};
use crate::session::{EgressQueue, Principal, PushOutcome, Session, SessionId};

struct SessionEntry {
    principal: Arc<Principal>,
    queue: Arc<EgressQueue>,
    subscriptions: BTreeSet<String>,
}

#[derive(Default)]
struct HubState {
    sessions: HashMap<SessionId, SessionEntry>,
    index: HashMap<String, HashSet<SessionId>>,
}

/// Per-process router. Owns the topic → subscribers index; sessions are
/// referenced by id and enqueue endpoint only, so their lifetime stays
/// bound to the connection.
pub struct Hub {
    matrix: AccessMatrix,
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new(matrix: AccessMatrix) -> Self {
        Self {
            matrix,
            state: Mutex::new(HubState::default()),
        }
    }

    /// Add a session to the registry.
    pub fn register(&self, session: &Session) {
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(
            session.id,
            SessionEntry {
                principal: session.principal.clone(),
                queue: session.queue.clone(),
                subscriptions: BTreeSet::new(),
            },
        );
        debug!("Session {} registered", session.id);
    }

    /// Remove a session and purge it from every index entry. Idempotent.
    pub fn deregister(&self, id: SessionId) {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.sessions.remove(&id) else {
            return;
        };
        for topic in &entry.subscriptions {
            if let Some(subscribers) = state.index.get_mut(topic) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    state.index.remove(topic);
                }
            }
        }
        debug!("Session {} deregistered", id);
    }

    /// Apply a subscribe request: admit permitted streams, update the
    /// index, and enqueue the acknowledgement listing the effective
    /// subscription set — all under the same critical section, so the ack
    /// orders correctly against concurrent broadcasts.
    pub fn subscribe(&self, id: SessionId, streams: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.sessions.get_mut(&id) else {
            return Err(GatewayError::UnknownSession(id));
        };

        let mut admitted = Vec::new();
        for stream in streams {
            if permit(&self.matrix, &entry.principal, stream) {
                if entry.subscriptions.insert(stream.clone()) {
                    admitted.push(stream.clone());
                }
            } else {
                debug!("Session {} denied subscription to {:?}", id, stream);
            }
        }
        counter!("gateway_subscriptions_total").increment(admitted.len() as u64);

        let ack = ServerFrame::ack(MSG_SUBSCRIBED, entry.subscriptions.iter().cloned().collect());
        let queue = entry.queue.clone();
        for stream in admitted {
            state.index.entry(stream).or_default().insert(id);
        }

        queue
            .push_system(ack.render())
            .map_err(|_| GatewayError::EgressFull(id))
    }

    /// Apply an unsubscribe request. Requested streams leave the session's
    /// set and the index; the acknowledgement lists what remains.
    pub fn unsubscribe(&self, id: SessionId, streams: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.sessions.get_mut(&id) else {
            return Err(GatewayError::UnknownSession(id));
        };

        let mut removed = Vec::new();
        for stream in streams {
            if entry.subscriptions.remove(stream) {
                removed.push(stream.clone());
            }
        }

        let ack = ServerFrame::ack(
            MSG_UNSUBSCRIBED,
            entry.subscriptions.iter().cloned().collect(),
        );
        let queue = entry.queue.clone();
        for stream in removed {
            if let Some(subscribers) = state.index.get_mut(&stream) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    state.index.remove(&stream);
                }
            }
        }

        queue
            .push_system(ack.render())
            .map_err(|_| GatewayError::EgressFull(id))
    }

    /// Fan a record out to every indexed subscriber that the access policy
    /// still admits. Non-blocking: slow consumers lose their oldest data
    /// frame instead of stalling the hub.
    pub fn broadcast(&self, topic: &str, payload: &[u8]) {
        let body: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                counter!("gateway_payload_decode_errors_total").increment(1);
                debug!("Dropping undecodable payload for {:?}: {}", topic, e);
                return;
            }
        };
        let frame = data_frame(topic, &body);

        let state = self.state.lock().unwrap();
        let Some(subscribers) = state.index.get(topic) else {
            return;
        };

        let mut delivered = 0u64;
        for id in subscribers {
            let Some(entry) = state.sessions.get(id) else {
                continue;
            };
            // Re-checked per frame: subscription admission is not trusted
            // across the lifetime of the session.
            if !permit(&self.matrix, &entry.principal, topic) {
                continue;
            }
            match entry.queue.push_data(frame.clone()) {
                PushOutcome::Enqueued => delivered += 1,
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    counter!("gateway_frames_dropped_total").increment(1);
                }
                PushOutcome::Rejected => {
                    counter!("gateway_frames_dropped_total").increment(1);
                    warn!("Session {} egress queue rejected frame for {:?}", id, topic);
                }
            }
        }
        if delivered > 0 {
            counter!("gateway_records_routed_total").increment(1);
        }
    }

    /// Number of registered sessions.
    pub fn client_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.state.lock().unwrap().index.len()
    }

    #[cfg(test)]
    fn indexed(&self, topic: &str, id: SessionId) -> bool {
        self.state
            .lock()
            .unwrap()
            .index
            .get(topic)
            .is_some_and(|s| s.contains(&id))
    }

    #[cfg(test)]
    fn subscriptions(&self, id: SessionId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(&id)
            .map(|e| e.subscriptions.iter().cloned().collect())
            .unwrap_or_default()
    }
}
