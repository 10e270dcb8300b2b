use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::engine::flow::{ChatFlow, ChatFlowContext, ChatFlowJump};
use crate::engine::types::{Activity, FlowFailure, StepCache, SuggestedAction};
use crate::funcs::ResultExt;
use crate::steps::{PromptCache, send_instead_activity};

const STEP_KIND: &str = "confirmation";

const DEFAULT_QUESTION_TEXT: &str = "Confirm the operation?";
const DEFAULT_CONFIRM_BUTTON_TEXT: &str = "Confirm";
const DEFAULT_CANCEL_BUTTON_TEXT: &str = "Cancel";
const DEFAULT_CANCEL_TEXT: &str = "Operation canceled";

/// Options for one confirmation step: a summary of accumulated values plus
/// a confirm/cancel question.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationCardOption {
    /// Question caption. Default: "Confirm the operation?".
    pub question_text: String,
    /// Default: "Confirm".
    pub confirm_button_text: String,
    /// Default: "Cancel".
    pub cancel_button_text: String,
    /// Message sent when the user cancels. Default: "Operation canceled".
    pub cancel_text: String,
    /// Name/value pairs summarized on the card; entries without a value
    /// are not rendered.
    pub field_values: Vec<(String, Option<String>)>,
    /// Complete immediately with the flow state unchanged, sending nothing.
    pub skip_step: bool,
}

impl Default for ConfirmationCardOption {
    fn default() -> Self {
        Self {
            question_text: DEFAULT_QUESTION_TEXT.to_string(),
            confirm_button_text: DEFAULT_CONFIRM_BUTTON_TEXT.to_string(),
            cancel_button_text: DEFAULT_CANCEL_BUTTON_TEXT.to_string(),
            cancel_text: DEFAULT_CANCEL_TEXT.to_string(),
            field_values: Vec::new(),
            skip_step: false,
        }
    }
}

impl ConfirmationCardOption {
    pub fn with_field_values(field_values: Vec<(String, Option<String>)>) -> Self {
        Self {
            field_values,
            ..Default::default()
        }
    }
}

type OptionFactoryFn<T> = Arc<dyn Fn(&ChatFlowContext<T>) -> ConfirmationCardOption + Send + Sync>;
type MapStateFn<T> = Arc<dyn Fn(T, bool) -> T + Send + Sync>;

/// A step awaiting a confirm/cancel decision. The decision is a value:
/// `map_flow_state` receives `true` on confirm and `false` on cancel (the
/// cancel message is sent first), and the pipeline author decides what a
/// declined confirmation means for the flow.
pub struct ConfirmationStep<T> {
    option_factory: OptionFactoryFn<T>,
    map_state: MapStateFn<T>,
}

impl<T> Clone for ConfirmationStep<T> {
    fn clone(&self) -> Self {
        Self {
            option_factory: Arc::clone(&self.option_factory),
            map_state: Arc::clone(&self.map_state),
        }
    }
}

impl<T> ConfirmationStep<T> {
    pub fn new<O, M>(option_factory: O, map_flow_state: M) -> Self
    where
        O: Fn(&ChatFlowContext<T>) -> ConfirmationCardOption + Send + Sync + 'static,
        M: Fn(T, bool) -> T + Send + Sync + 'static,
    {
        Self {
            option_factory: Arc::new(option_factory),
            map_state: Arc::new(map_flow_state),
        }
    }
}

impl<T> ConfirmationStep<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn turn(
        &self,
        ctx: ChatFlowContext<T>,
        cancel: CancellationToken,
    ) -> Result<ChatFlowJump<T>> {
        let option = (self.option_factory)(&ctx);

        if option.skip_step {
            return Ok(ChatFlowJump::Next(ctx.flow_state.clone()));
        }

        let cached: Option<PromptCache> = match ctx.step_cache() {
            Some(cache) => cache.decode(STEP_KIND)?,
            None => None,
        };

        let Some(cache) = cached else {
            let activity = build_confirmation_activity(&option);
            let resource = ctx.send_activity(&activity, &cancel).await?;

            let payload = PromptCache {
                resource: Some(resource),
                prompt_text: option.question_text.clone(),
            };
            let cache = StepCache::encode(STEP_KIND, &payload)?;
            return Ok(ChatFlowJump::Repeat(Some(cache)));
        };

        let parsed = parse_confirmation(&ctx, &option);

        let ctx = &ctx;
        let cancel = &cancel;
        parsed
            .fold_value_async(
                |confirmed| async move {
                    if confirmed {
                        if let Some(resource) = &cache.resource {
                            if ctx.channel().supports_update() {
                                let frozen = Activity::text(cache.prompt_text.clone());
                                ctx.update_activity(&resource.id, &frozen, cancel).await?;
                            }
                        }
                    } else {
                        send_instead_activity(
                            ctx,
                            cache.resource.as_ref(),
                            &Activity::text(option.cancel_text.clone()),
                            cancel,
                        )
                        .await?;
                    }

                    Ok(ChatFlowJump::Next((self.map_state)(
                        ctx.flow_state.clone(),
                        confirmed,
                    )))
                },
                |failure| async move {
                    if let Some(user_message) = &failure.user_message {
                        ctx.send_activity(&Activity::text(user_message.clone()), cancel)
                            .await?;
                    }
                    ctx.track_failure(STEP_KIND, &failure);
                    Ok(ctx.repeat_same_jump())
                },
            )
            .await
    }
}

impl<T> ChatFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Append a step that awaits a confirm/cancel decision.
    pub fn await_confirmation(self, step: ConfirmationStep<T>) -> Self {
        self.forward_value(move |ctx, cancel| {
            let step = step.clone();
            async move { step.turn(ctx, cancel).await }
        })
    }
}

fn build_confirmation_activity(option: &ConfirmationCardOption) -> Activity {
    let fields: Vec<(&str, &str)> = option
        .field_values
        .iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name.as_str(), v)))
        .collect();

    let mut lines: Vec<String> = fields
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect();
    lines.push(option.question_text.clone());

    Activity::text(lines.join("\n"))
        .with_card(json!({
            "type": "confirmation",
            "text": option.question_text,
            "fields": fields
                .iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect::<Vec<_>>(),
            "confirm": option.confirm_button_text,
            "cancel": option.cancel_button_text,
        }))
        .with_suggested_actions(vec![
            SuggestedAction::new(option.confirm_button_text.clone(), json!({ "confirm": true })),
            SuggestedAction::new(option.cancel_button_text.clone(), json!({ "confirm": false })),
        ])
}

fn parse_confirmation<T>(
    ctx: &ChatFlowContext<T>,
    option: &ConfirmationCardOption,
) -> Result<bool, FlowFailure> {
    if let Some(action) = &ctx.input.action_value {
        if let Some(confirmed) = action.get("confirm").and_then(|v| v.as_bool()) {
            return Ok(confirmed);
        }
        return Err(choose_button_failure(option));
    }

    let Some(text) = ctx.input.trimmed_text() else {
        return Err(choose_button_failure(option));
    };
    if text.eq_ignore_ascii_case(&option.confirm_button_text) {
        Ok(true)
    } else if text.eq_ignore_ascii_case(&option.cancel_button_text) {
        Ok(false)
    } else {
        Err(choose_button_failure(option))
    }
}

fn choose_button_failure(option: &ConfirmationCardOption) -> FlowFailure {
    FlowFailure::user(format!(
        "Reply with '{}' or '{}'",
        option.confirm_button_text, option.cancel_button_text
    ))
}
