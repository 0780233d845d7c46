//! Buffer for remote candidates that arrive before the remote description.

use std::collections::VecDeque;

use crate::types::IceCandidate;

/// FIFO of candidates waiting for a remote description.
///
/// Candidates are handed out in arrival order and each one exactly once.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    items: VecDeque<IceCandidate>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, candidate: IceCandidate) {
        self.items.push_back(candidate);
    }

    /// Removes and returns every buffered candidate, oldest first.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.items.drain(..).collect()
    }

    /// Moves the contents of `other` to the back of this queue.
    pub fn append(&mut self, other: &mut CandidateQueue) {
        self.items.append(&mut other.items);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
