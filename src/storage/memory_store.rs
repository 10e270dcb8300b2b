use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::FlowSnapshot;
use crate::storage::StateStore;

/// In-memory state store. Holds snapshots only for the lifetime of the
/// store instance.
pub struct MemoryStateStore {
    snapshots: Mutex<HashMap<String, FlowSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of conversations currently awaiting a turn.
    pub fn pending_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<FlowSnapshot>> {
        Ok(self.snapshots.lock().unwrap().get(conversation_id).cloned())
    }

    async fn save(&self, conversation_id: &str, snapshot: &FlowSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.snapshots.lock().unwrap().remove(conversation_id);
        Ok(())
    }
}
