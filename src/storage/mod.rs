pub mod json_store;
pub mod memory_store;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::FlowSnapshot;

/// Per-conversation snapshot persistence. The engine stores exactly one
/// snapshot per conversation while a step is awaiting input and clears it
/// when the flow completes; absence is an expected condition, not an error.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the pending snapshot for a conversation, if one exists.
    async fn load(&self, conversation_id: &str) -> Result<Option<FlowSnapshot>>;

    /// Persist the snapshot, replacing any previous one.
    async fn save(&self, conversation_id: &str, snapshot: &FlowSnapshot) -> Result<()>;

    /// Drop the conversation's snapshot. Clearing a conversation that has
    /// no snapshot is a no-op.
    async fn clear(&self, conversation_id: &str) -> Result<()>;
}
