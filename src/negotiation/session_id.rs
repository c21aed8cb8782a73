//! Session id allocation for the server side.
//!
//! Session ids are positive integers unique among the sessions currently
//! open on one endpoint. The allocator is injected into the session
//! builder instead of living in a global; a [`SessionIdLease`] returns its
//! id when dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::NegotiationError;

/// Allocates session ids for one endpoint.
pub trait SessionIdAllocator: Send + Sync + 'static {
    /// Allocate an id not in use, or `None` if the id space is exhausted.
    fn allocate(&self) -> Option<u32>;

    /// Return an id to the pool.
    fn release(&self, id: u32);
}

#[derive(Debug)]
struct AllocatorState {
    next: u32,
    in_use: HashSet<u32>,
}

/// Allocator handing out 1, 2, 3, ... and skipping ids still in use
/// after wrap-around.
#[derive(Debug)]
pub struct SequentialAllocator {
    state: Mutex<AllocatorState>,
}

impl SequentialAllocator {
    /// Create an allocator starting at 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AllocatorState {
                next: 1,
                in_use: HashSet::new(),
            }),
        }
    }

    /// Number of ids currently allocated.
    pub fn in_use(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_use
            .len()
    }
}

impl Default for SequentialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdAllocator for SequentialAllocator {
    fn allocate(&self) -> Option<u32> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.in_use.len() >= u32::MAX as usize {
            return None;
        }
        loop {
            let candidate = state.next;
            state.next = candidate.checked_add(1).unwrap_or(1);
            if state.in_use.insert(candidate) {
                return Some(candidate);
            }
        }
    }

    fn release(&self, id: u32) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_use
            .remove(&id);
    }
}

/// An allocated session id, released on drop.
pub struct SessionIdLease {
    id: u32,
    allocator: Arc<dyn SessionIdAllocator>,
}

impl SessionIdLease {
    /// Allocate a new id from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::SessionIdsExhausted`] if no id is free.
    pub fn acquire(allocator: Arc<dyn SessionIdAllocator>) -> Result<Self, NegotiationError> {
        let id = allocator
            .allocate()
            .ok_or(NegotiationError::SessionIdsExhausted)?;
        Ok(Self { id, allocator })
    }

    /// The allocated id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for SessionIdLease {
    fn drop(&mut self) {
        self.allocator.release(self.id);
    }
}

impl std::fmt::Debug for SessionIdLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdLease").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let allocator = SequentialAllocator::new();
        assert_eq!(allocator.allocate(), Some(1));
        assert_eq!(allocator.allocate(), Some(2));
        assert_eq!(allocator.in_use(), 2);
    }

    #[test]
    fn test_skips_ids_in_use_after_wrap() {
        let allocator = SequentialAllocator::new();
        assert_eq!(allocator.allocate(), Some(1));
        allocator.state.lock().unwrap().next = u32::MAX;

        assert_eq!(allocator.allocate(), Some(u32::MAX));
        // 1 is still in use, so the wrap lands on 2.
        assert_eq!(allocator.allocate(), Some(2));
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let allocator = Arc::new(SequentialAllocator::new());
        let shared: Arc<dyn SessionIdAllocator> = allocator.clone();

        let lease = SessionIdLease::acquire(shared.clone()).unwrap();
        assert_eq!(lease.id(), 1);
        assert_eq!(allocator.in_use(), 1);

        drop(lease);
        assert_eq!(allocator.in_use(), 0);
    }
}
