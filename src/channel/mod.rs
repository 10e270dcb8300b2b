pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::engine::types::{Activity, ChannelKind, ResourceResponse};

/// Transport seam the engine talks to. Implementations adapt a concrete
/// chat channel (Teams, Telegram, web chat); the engine only sends, updates
/// and deletes activities and never renders anything itself.
///
/// Errors from these operations are transport faults: they abort the turn
/// with no jump committed.
#[async_trait]
pub trait ChannelPort: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver an activity to the conversation, returning its handle.
    async fn send_activity(
        &self,
        conversation_id: &str,
        activity: &Activity,
    ) -> Result<ResourceResponse>;

    /// Edit a previously sent activity in place.
    async fn update_activity(
        &self,
        conversation_id: &str,
        activity_id: &str,
        activity: &Activity,
    ) -> Result<()>;

    /// Remove a previously sent activity.
    async fn delete_activity(&self, conversation_id: &str, activity_id: &str) -> Result<()>;

    fn supports_cards(&self) -> bool {
        self.kind().supports_cards()
    }

    fn supports_update(&self) -> bool {
        self.kind().supports_update()
    }

    fn supports_delete(&self) -> bool {
        self.kind().supports_delete()
    }
}

/// Best-effort side channel for failure diagnostics. Sinks must never fail:
/// a telemetry problem cannot be allowed to change a jump outcome.
pub trait TelemetrySink: Send + Sync {
    fn track_event(&self, name: &str, properties: &HashMap<String, String>);
}

/// Default sink: events become structured tracing records.
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn track_event(&self, name: &str, properties: &HashMap<String, String>) {
        info!(event = %name, ?properties, "telemetry event");
    }
}
