use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::{ChannelPort, TelemetrySink, TracingTelemetry};
use crate::engine::flow::{ChatFlow, TurnResult};
use crate::engine::types::{FlowSnapshot, TurnInput, TurnOutcome};
use crate::storage::StateStore;

/// Binds a [`ChatFlow`] to a state store and a channel, and processes one
/// delivered turn start-to-finish: restore the pending position, drive the
/// pipeline, persist or clear the snapshot.
///
/// Turn ordering per conversation is the hosting runtime's responsibility;
/// the engine holds no per-conversation state of its own.
pub struct ChatFlowEngine<T> {
    flow: ChatFlow<T>,
    store: Arc<dyn StateStore>,
    channel: Arc<dyn ChannelPort>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<T> ChatFlowEngine<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn new(flow: ChatFlow<T>, store: Arc<dyn StateStore>, channel: Arc<dyn ChannelPort>) -> Self {
        Self {
            flow,
            store,
            channel,
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn flow(&self) -> &ChatFlow<T> {
        &self.flow
    }

    /// Process one inbound turn for a conversation.
    ///
    /// `initial_state` seeds the flow when no snapshot exists yet (first
    /// turn of the conversation); otherwise the persisted state wins. On
    /// error — transport fault or cancellation — nothing is persisted, so
    /// the next delivered turn retries the still-pending step.
    pub async fn handle_turn(
        &self,
        conversation_id: &str,
        initial_state: T,
        input: TurnInput,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome<T>> {
        let snapshot = self.store.load(conversation_id).await?;

        let (position, state, cache) = match snapshot {
            Some(snapshot) => {
                if snapshot.flow_id != self.flow.flow_id() {
                    bail!(
                        "conversation '{}' belongs to flow '{}', not '{}'",
                        conversation_id,
                        snapshot.flow_id,
                        self.flow.flow_id()
                    );
                }
                let state: T = serde_json::from_value(snapshot.state).with_context(|| {
                    format!(
                        "failed to restore flow state for conversation '{}'",
                        conversation_id
                    )
                })?;
                (snapshot.position, state, snapshot.cache)
            }
            None => (0, initial_state, None),
        };

        let result = self
            .flow
            .drive_turn(
                position,
                state,
                cache,
                conversation_id,
                &input,
                Arc::clone(&self.channel),
                Arc::clone(&self.telemetry),
                &cancel,
            )
            .await?;

        match result {
            TurnResult::Suspended {
                position,
                state,
                cache,
            } => {
                let snapshot = FlowSnapshot {
                    flow_id: self.flow.flow_id().to_string(),
                    position,
                    state: serde_json::to_value(&state)
                        .context("failed to snapshot flow state")?,
                    cache,
                    updated: Some(Utc::now()),
                };
                self.store.save(conversation_id, &snapshot).await?;

                info!(
                    conversation_id = %conversation_id,
                    flow = %self.flow.flow_id(),
                    position,
                    "flow waiting for next turn"
                );
                Ok(TurnOutcome::Waiting)
            }
            TurnResult::Finished(state) => {
                self.store.clear(conversation_id).await?;

                info!(
                    conversation_id = %conversation_id,
                    flow = %self.flow.flow_id(),
                    "flow completed"
                );
                Ok(TurnOutcome::Complete(state))
            }
        }
    }
}
