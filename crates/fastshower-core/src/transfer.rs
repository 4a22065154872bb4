//! Queue of cross-engine track hand-offs.
//!
//! A dispatcher never touches another engine. It answers a step with
//! `Transfer(target)`; the manager wraps the suspended snapshot in a
//! [`TransferRequest`] and pushes it here. Requests are drained at
//! rendezvous points in submission order.

use crate::id::{EngineId, TrackId};
use crate::track::TrackState;

// ---------------------------------------------------------------------------
// TransferRequest
// ---------------------------------------------------------------------------

/// A suspended track on its way to another engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    /// Kinematic snapshot at the moment of suspension.
    pub snapshot: TrackState,
    pub source: EngineId,
    pub target: EngineId,
}

impl TransferRequest {
    pub fn track(&self) -> TrackId {
        self.snapshot.id()
    }
}

// ---------------------------------------------------------------------------
// TransferQueue
// ---------------------------------------------------------------------------

/// FIFO of pending hand-offs.
#[derive(Debug, Default)]
pub struct TransferQueue {
    pending: Vec<TransferRequest>,
}

impl TransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: TransferRequest) {
        self.pending.push(request);
    }

    /// Drain all pending requests in submission order.
    pub fn drain(&mut self) -> Vec<TransferRequest> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
