//! In-flight investigation arena.
//!
//! Integer handles to live investigations, released explicitly when the
//! investigation reaches a terminal state, so memory stays bounded no matter
//! how long the process runs.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use aluskort_schemas::GraphState;

/// Arena slot id.
pub type SlotId = u64;

/// Arena of live investigations. Each slot holds the investigation mutex
/// under which `decision_chain` appends are flushed.
#[derive(Default)]
pub struct InvestigationArena {
    next_id: Mutex<SlotId>,
    slots: Mutex<HashMap<SlotId, Arc<AsyncMutex<GraphState>>>>,
}

impl InvestigationArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an investigation, returning its slot id and handle.
    pub fn insert(&self, state: GraphState) -> (SlotId, Arc<AsyncMutex<GraphState>>) {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let handle = Arc::new(AsyncMutex::new(state));
        self.slots.lock().insert(id, handle.clone());
        (id, handle)
    }

    pub fn get(&self, id: SlotId) -> Option<Arc<AsyncMutex<GraphState>>> {
        self.slots.lock().get(&id).cloned()
    }

    /// Release a terminal investigation's slot. Returns the handle so the
    /// caller can persist the final state.
    pub fn release(&self, id: SlotId) -> Option<Arc<AsyncMutex<GraphState>>> {
        self.slots.lock().remove(&id)
    }

    pub fn live_count(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aluskort_schemas::Severity;

    #[tokio::test]
    async fn test_insert_get_release() {
        let arena = InvestigationArena::new();
        let (id, handle) = arena.insert(GraphState::new("a1", "t1", Severity::Low));
        assert_eq!(arena.live_count(), 1);

        {
            let state = handle.lock().await;
            assert_eq!(state.alert_id, "a1");
        }
        assert!(arena.get(id).is_some());

        arena.release(id);
        assert_eq!(arena.live_count(), 0);
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let arena = InvestigationArena::new();
        let (a, _) = arena.insert(GraphState::new("a1", "t1", Severity::Low));
        let (b, _) = arena.insert(GraphState::new("a2", "t1", Severity::Low));
        assert_ne!(a, b);
    }
}
