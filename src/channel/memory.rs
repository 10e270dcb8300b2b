use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use crate::channel::ChannelPort;
use crate::engine::types::{Activity, ChannelKind, ResourceResponse};

/// One recorded transport operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOp {
    Sent {
        conversation_id: String,
        id: String,
        activity: Activity,
    },
    Updated {
        conversation_id: String,
        id: String,
        activity: Activity,
    },
    Deleted {
        conversation_id: String,
        id: String,
    },
}

/// In-memory channel: records every operation instead of delivering it.
/// Reference implementation for embedding and for the test suite.
pub struct MemoryChannel {
    kind: ChannelKind,
    next_id: AtomicU64,
    ops: Mutex<Vec<ChannelOp>>,
}

impl MemoryChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            next_id: AtomicU64::new(1),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Every operation recorded so far, in order.
    pub fn ops(&self) -> Vec<ChannelOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn op_count(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    /// Activities delivered via `send_activity`, in order.
    pub fn sent(&self) -> Vec<Activity> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                ChannelOp::Sent { activity, .. } => Some(activity.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChannelPort for MemoryChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send_activity(
        &self,
        conversation_id: &str,
        activity: &Activity,
    ) -> Result<ResourceResponse> {
        let id = format!("activity-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.ops.lock().unwrap().push(ChannelOp::Sent {
            conversation_id: conversation_id.to_string(),
            id: id.clone(),
            activity: activity.clone(),
        });
        Ok(ResourceResponse::new(id))
    }

    async fn update_activity(
        &self,
        conversation_id: &str,
        activity_id: &str,
        activity: &Activity,
    ) -> Result<()> {
        self.ops.lock().unwrap().push(ChannelOp::Updated {
            conversation_id: conversation_id.to_string(),
            id: activity_id.to_string(),
            activity: activity.clone(),
        });
        Ok(())
    }

    async fn delete_activity(&self, conversation_id: &str, activity_id: &str) -> Result<()> {
        self.ops.lock().unwrap().push(ChannelOp::Deleted {
            conversation_id: conversation_id.to_string(),
            id: activity_id.to_string(),
        });
        Ok(())
    }
}
