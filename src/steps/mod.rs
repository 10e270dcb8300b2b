//! Concrete step kinds and the await-and-validate skeleton they share.
//!
//! A step spans turns: its first turn sends a prompt and suspends with a
//! cache referencing the sent activity; later turns parse the reply, run
//! the optional validator and either advance the flow or re-prompt. The
//! engine never inspects the cache payloads written here.

pub mod card_step;
pub mod date_step;
pub mod lookup_step;
pub mod value_step;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::engine::flow::{ChatFlowContext, ChatFlowJump};
use crate::engine::types::{Activity, FlowFailure, ResourceResponse, StepCache};
use crate::funcs::ResultExt;

/// Cache payload shared by prompt-style steps: the sent prompt's handle and
/// its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptCache {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceResponse>,
    pub prompt_text: String,
}

type BuildPromptFn<T> = Box<dyn FnOnce(&ChatFlowContext<T>) -> Activity + Send>;
type ParseFn<T, V> =
    Box<dyn FnOnce(&ChatFlowContext<T>, &PromptCache) -> Result<V, FlowFailure> + Send>;
type ValidateFn<T, V> = Box<dyn FnOnce(&ChatFlowContext<T>, V) -> Result<V, FlowFailure> + Send>;
type ResultMessageFn<T, V> = Box<dyn FnOnce(&ChatFlowContext<T>, &V) -> String + Send>;
type MapStateFn<T, V> = Box<dyn FnOnce(T, V) -> T + Send>;

/// One turn of the generic await-and-validate pattern, assembled per step
/// kind from its options and caller-supplied functions.
pub(crate) struct PromptTurn<T, V> {
    pub step_kind: &'static str,
    pub skip_step: bool,
    pub prompt_text: String,
    pub build_prompt: BuildPromptFn<T>,
    pub parse: ParseFn<T, V>,
    pub validate: ValidateFn<T, V>,
    pub result_message: ResultMessageFn<T, V>,
    pub map_state: MapStateFn<T, V>,
}

impl<T, V> PromptTurn<T, V>
where
    T: Clone + Send + Sync + 'static,
{
    /// Run one turn. No prior cache: send the prompt and suspend (or skip
    /// the step outright). Cache present: parse and validate the reply,
    /// fold the outcome into a jump. Validation failures re-prompt with the
    /// cache unchanged; only transport faults and cancellation are errors.
    pub(crate) async fn run(
        self,
        ctx: ChatFlowContext<T>,
        cancel: CancellationToken,
    ) -> Result<ChatFlowJump<T>> {
        let PromptTurn {
            step_kind,
            skip_step,
            prompt_text,
            build_prompt,
            parse,
            validate,
            result_message,
            map_state,
        } = self;

        if skip_step {
            return Ok(ChatFlowJump::Next(ctx.flow_state.clone()));
        }

        let cached: Option<PromptCache> = match ctx.step_cache() {
            Some(cache) => cache.decode(step_kind)?,
            None => None,
        };

        let Some(cache) = cached else {
            let activity = build_prompt(&ctx);
            let resource = ctx.send_activity(&activity, &cancel).await?;

            let payload = PromptCache {
                resource: Some(resource),
                prompt_text,
            };
            let cache = StepCache::encode(step_kind, &payload)?;
            return Ok(ChatFlowJump::Repeat(Some(cache)));
        };

        let parsed = parse(&ctx, &cache).forward(|value| validate(&ctx, value));

        let ctx = &ctx;
        let cancel = &cancel;
        parsed
            .fold_value_async(
                |value| async move {
                    let result_activity = Activity::text(result_message(ctx, &value));

                    if ctx.input.is_edited {
                        // The user edited an earlier answer: refresh the
                        // response in place where the channel can, send a
                        // fresh one where it cannot.
                        match (&cache.resource, ctx.channel().supports_update()) {
                            (Some(resource), true) => {
                                ctx.update_activity(&resource.id, &result_activity, cancel)
                                    .await?;
                            }
                            _ => {
                                ctx.send_activity(&result_activity, cancel).await?;
                            }
                        }
                    } else {
                        send_instead_activity(
                            ctx,
                            cache.resource.as_ref(),
                            &result_activity,
                            cancel,
                        )
                        .await?;
                    }

                    Ok(ChatFlowJump::Next(map_state(ctx.flow_state.clone(), value)))
                },
                |failure| async move {
                    if let Some(user_message) = &failure.user_message {
                        ctx.send_activity(&Activity::text(user_message.clone()), cancel)
                            .await?;
                    }
                    ctx.track_failure(step_kind, &failure);
                    Ok(ctx.repeat_same_jump())
                },
            )
            .await
    }
}

/// Send an activity in place of a previously sent one: where the channel
/// supports it, the original is deleted first.
pub(crate) async fn send_instead_activity<T>(
    ctx: &ChatFlowContext<T>,
    replaced: Option<&ResourceResponse>,
    activity: &Activity,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(resource) = replaced {
        if ctx.channel().supports_delete() {
            ctx.delete_activity(&resource.id, cancel).await?;
        }
    }
    ctx.send_activity(activity, cancel).await?;
    Ok(())
}
