use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::channel::{ChannelPort, TelemetrySink};
use crate::engine::types::{Activity, FlowFailure, ResourceResponse, StepCache, TurnInput};

/// Outcome of one turn of one step: advance the pipeline with a new flow
/// state, or stay on the same step and persist the carried cache for the
/// next turn. Exactly one jump is produced per turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatFlowJump<T> {
    /// The step is complete; the value becomes the flow state fed to the
    /// next step, or to the caller if this was the last step.
    Next(T),
    /// The step needs more input; the cache replaces whatever was stored
    /// for this step before.
    Repeat(Option<StepCache>),
}

impl<T> ChatFlowJump<T> {
    pub fn is_next(&self) -> bool {
        matches!(self, ChatFlowJump::Next(_))
    }

    pub fn is_repeat(&self) -> bool {
        matches!(self, ChatFlowJump::Repeat(_))
    }
}

/// Per-turn read/write surface handed to step logic: the current flow
/// state, the step's persisted cache (if any), the inbound turn, and the
/// transport/telemetry capabilities.
pub struct ChatFlowContext<T> {
    flow_id: String,
    conversation_id: String,
    pub flow_state: T,
    step_cache: Option<StepCache>,
    pub input: TurnInput,
    channel: Arc<dyn ChannelPort>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<T> ChatFlowContext<T> {
    pub(crate) fn new(
        flow_id: String,
        conversation_id: String,
        flow_state: T,
        step_cache: Option<StepCache>,
        input: TurnInput,
        channel: Arc<dyn ChannelPort>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            flow_id,
            conversation_id,
            flow_state,
            step_cache,
            input,
            channel,
            telemetry,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The cache persisted by this step's previous turn, if any. Absent on
    /// the step's first turn.
    pub fn step_cache(&self) -> Option<&StepCache> {
        self.step_cache.as_ref()
    }

    pub fn channel(&self) -> &dyn ChannelPort {
        self.channel.as_ref()
    }

    /// Repeat this step keeping the stored cache unchanged.
    pub fn repeat_same_jump(&self) -> ChatFlowJump<T> {
        ChatFlowJump::Repeat(self.step_cache.clone())
    }

    /// Send an activity to this conversation, observing cancellation.
    pub async fn send_activity(
        &self,
        activity: &Activity,
        cancel: &CancellationToken,
    ) -> Result<ResourceResponse> {
        tokio::select! {
            _ = cancel.cancelled() => bail!("turn cancelled while sending activity"),
            result = self.channel.send_activity(&self.conversation_id, activity) => result,
        }
    }

    /// Edit a previously sent activity, observing cancellation.
    pub async fn update_activity(
        &self,
        activity_id: &str,
        activity: &Activity,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => bail!("turn cancelled while updating activity"),
            result = self.channel.update_activity(&self.conversation_id, activity_id, activity) => result,
        }
    }

    /// Remove a previously sent activity, observing cancellation.
    pub async fn delete_activity(
        &self,
        activity_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => bail!("turn cancelled while deleting activity"),
            result = self.channel.delete_activity(&self.conversation_id, activity_id) => result,
        }
    }

    /// Report a domain failure's diagnostics to the logger and telemetry
    /// sink. Does nothing when the failure carries only a user message;
    /// never affects the jump outcome.
    pub fn track_failure(&self, step_kind: &str, failure: &FlowFailure) {
        if !failure.has_diagnostics() {
            return;
        }

        error!(
            flow = %self.flow_id,
            conversation_id = %self.conversation_id,
            step = %step_kind,
            source = ?failure.source,
            "{}",
            failure.log_message.as_deref().unwrap_or("step failure"),
        );

        let mut properties = HashMap::new();
        properties.insert("flowId".to_string(), self.flow_id.clone());
        if let Some(message) = &failure.log_message {
            properties.insert("message".to_string(), message.clone());
        }
        if let Some(source) = &failure.source {
            properties.insert("errorMessage".to_string(), source.to_string());
        }

        let event = format!("{}.{}.failure", self.flow_id, step_kind);
        self.telemetry.track_event(&event, &properties);
    }
}

type StageFn<T> = Arc<
    dyn Fn(ChatFlowContext<T>, CancellationToken) -> BoxFuture<'static, Result<ChatFlowJump<T>>>
        + Send
        + Sync,
>;

/// Result of driving a pipeline for one delivered turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult<T> {
    /// A step emitted `Repeat`: the pipeline halts here for this turn and
    /// the snapshot below must be persisted.
    Suspended {
        position: usize,
        state: T,
        cache: Option<StepCache>,
    },
    /// The last step completed; the flow is done.
    Finished(T),
}

/// A composable pipeline of conversational steps over flow state `T`.
///
/// Stages are appended with [`forward_value`](ChatFlow::forward_value) and
/// are immutable once added. Driving a turn resumes at the pending stage:
/// a `Next` jump lets the following stage run in the same turn, a `Repeat`
/// jump short-circuits the rest of the pipeline until the next turn.
pub struct ChatFlow<T> {
    flow_id: String,
    stages: Vec<StageFn<T>>,
}

impl<T> Clone for ChatFlow<T> {
    fn clone(&self) -> Self {
        Self {
            flow_id: self.flow_id.clone(),
            stages: self.stages.clone(),
        }
    }
}

impl<T> ChatFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            stages: Vec::new(),
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn step_count(&self) -> usize {
        self.stages.len()
    }

    /// Append a stage built from a per-turn function. The function receives
    /// the turn context and the turn's cancellation token and must produce
    /// exactly one jump; domain failures are expressed as `Repeat` jumps,
    /// never as errors.
    pub fn forward_value<S, Fut>(mut self, stage: S) -> Self
    where
        S: Fn(ChatFlowContext<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ChatFlowJump<T>>> + Send + 'static,
    {
        self.stages
            .push(Arc::new(move |ctx, cancel| Box::pin(stage(ctx, cancel))));
        self
    }

    /// Drive one delivered turn, starting from the persisted position.
    ///
    /// Runs the pending stage; on `Next` the following stage runs
    /// immediately in the same turn with the new state and no cache, on
    /// `Repeat` the turn suspends and remaining stages are not invoked.
    /// Errors (transport faults, cancellation) propagate with no result —
    /// the caller must not persist anything in that case.
    #[allow(clippy::too_many_arguments)]
    pub async fn drive_turn(
        &self,
        position: usize,
        state: T,
        cache: Option<StepCache>,
        conversation_id: &str,
        input: &TurnInput,
        channel: Arc<dyn ChannelPort>,
        telemetry: Arc<dyn TelemetrySink>,
        cancel: &CancellationToken,
    ) -> Result<TurnResult<T>> {
        let mut position = position;
        let mut state = state;
        let mut cache = cache;

        loop {
            let Some(stage) = self.stages.get(position) else {
                return Ok(TurnResult::Finished(state));
            };

            if cancel.is_cancelled() {
                bail!(
                    "turn cancelled before step {} of flow '{}'",
                    position,
                    self.flow_id
                );
            }

            let ctx = ChatFlowContext::new(
                self.flow_id.clone(),
                conversation_id.to_string(),
                state.clone(),
                cache.take(),
                input.clone(),
                Arc::clone(&channel),
                Arc::clone(&telemetry),
            );

            match stage(ctx, cancel.clone()).await? {
                ChatFlowJump::Next(next_state) => {
                    state = next_state;
                    position += 1;
                }
                ChatFlowJump::Repeat(next_cache) => {
                    return Ok(TurnResult::Suspended {
                        position,
                        state,
                        cache: next_cache,
                    });
                }
            }
        }
    }
}
