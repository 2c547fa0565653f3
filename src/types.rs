use serde::{Deserialize, Serialize};

/// Identifier of a pending request, assigned by the store's journal sequence.
pub type RequestId = u64;

/// Identifier of a federated pod, assigned at peer admission.
pub type PeerId = String;

/// A queued change event plus the set of pods still owed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RequestId,
    /// Opaque application event body; never interpreted by the scheduler.
    pub payload: serde_json::Value,
    /// Pods still owed this event. Only shrinks after creation; the
    /// record is deleted once it becomes empty.
    pub to: Vec<PeerId>,
}

impl PendingRequest {
    pub fn is_destined_to(&self, peer_id: &str) -> bool {
        self.to.iter().any(|p| p == peer_id)
    }
}

/// A federated pod as seen by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub url: String,
    /// Reputation score: bonus on success, malus on failure,
    /// eviction at or below zero.
    pub score: i64,
}

/// Payloads grouped for a single pod within one round. Round-scoped,
/// never persisted. `ids` and `payloads` are parallel lists ordered by
/// original request id.
#[derive(Debug, Clone, Default)]
pub struct DispatchBatch {
    pub ids: Vec<RequestId>,
    pub payloads: Vec<serde_json::Value>,
}

impl DispatchBatch {
    pub fn push(&mut self, id: RequestId, payload: serde_json::Value) {
        self.ids.push(id);
        self.payloads.push(payload);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
