use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::flow::{ChatFlow, ChatFlowContext, ChatFlowJump};
use crate::engine::types::{Activity, FlowFailure, ResourceResponse, StepCache, SuggestedAction};
use crate::funcs::OptionExt;
use crate::steps::send_instead_activity;

const STEP_KIND: &str = "lookup";

const DEFAULT_CHOICE_TEXT: &str = "Choose a value";

/// One entry of a lookup choice set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupValue {
    pub id: Uuid,
    pub name: String,
    /// Step-author payload carried alongside the entry; opaque to the step.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl LookupValue {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// A choice set offered to the user: the default set on the step's first
/// turn, or a search result afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupStepOption {
    /// Caption above the choices. Default: "Choose a value".
    pub choice_text: String,
    pub items: Vec<LookupValue>,
    /// Complete immediately with the flow state unchanged, sending nothing.
    pub skip_step: bool,
}

impl LookupStepOption {
    pub fn new(items: Vec<LookupValue>) -> Self {
        Self {
            choice_text: DEFAULT_CHOICE_TEXT.to_string(),
            items,
            skip_step: false,
        }
    }

    pub fn with_choice_text(mut self, choice_text: impl Into<String>) -> Self {
        self.choice_text = choice_text.into();
        self
    }

    pub fn skip() -> Self {
        Self {
            choice_text: DEFAULT_CHOICE_TEXT.to_string(),
            items: Vec::new(),
            skip_step: true,
        }
    }
}

/// Domain outcome of a search invocation. Fatal faults travel in the outer
/// `anyhow::Result` of the search future instead.
pub type SearchResult = std::result::Result<LookupStepOption, FlowFailure>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LookupCache {
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<ResourceResponse>,
    choice_text: String,
    values: Vec<LookupValue>,
}

type DefaultItemsFn<T> = Arc<
    dyn for<'a> Fn(&'a ChatFlowContext<T>) -> BoxFuture<'a, Result<LookupStepOption>>
        + Send
        + Sync,
>;
type SearchFn<T> = Arc<
    dyn for<'a> Fn(&'a ChatFlowContext<T>, &'a str) -> BoxFuture<'a, Result<SearchResult>>
        + Send
        + Sync,
>;
type ResultMessageFn<T> =
    Arc<dyn Fn(&ChatFlowContext<T>, &LookupValue) -> String + Send + Sync>;
type MapStateFn<T> = Arc<dyn Fn(T, LookupValue) -> T + Send + Sync>;

/// A step awaiting a pick from a searchable choice set. The first turn
/// offers the default items; typing re-runs the caller's search and
/// replaces the offered set, picking resolves against the cached set.
pub struct LookupStep<T> {
    default_items: DefaultItemsFn<T>,
    search: SearchFn<T>,
    result_message: Option<ResultMessageFn<T>>,
    map_state: MapStateFn<T>,
}

impl<T> Clone for LookupStep<T> {
    fn clone(&self) -> Self {
        Self {
            default_items: Arc::clone(&self.default_items),
            search: Arc::clone(&self.search),
            result_message: self.result_message.clone(),
            map_state: Arc::clone(&self.map_state),
        }
    }
}

impl<T> LookupStep<T> {
    pub fn new<D, S, M>(default_items: D, search: S, map_flow_state: M) -> Self
    where
        D: for<'a> Fn(&'a ChatFlowContext<T>) -> BoxFuture<'a, Result<LookupStepOption>>
            + Send
            + Sync
            + 'static,
        S: for<'a> Fn(&'a ChatFlowContext<T>, &'a str) -> BoxFuture<'a, Result<SearchResult>>
            + Send
            + Sync
            + 'static,
        M: Fn(T, LookupValue) -> T + Send + Sync + 'static,
    {
        Self {
            default_items: Arc::new(default_items),
            search: Arc::new(search),
            result_message: None,
            map_state: Arc::new(map_flow_state),
        }
    }

    /// Override the confirmation text built once a value is picked.
    pub fn with_result_message<R>(mut self, result_message: R) -> Self
    where
        R: Fn(&ChatFlowContext<T>, &LookupValue) -> String + Send + Sync + 'static,
    {
        self.result_message = Some(Arc::new(result_message));
        self
    }
}

impl<T> LookupStep<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn turn(
        &self,
        ctx: ChatFlowContext<T>,
        cancel: CancellationToken,
    ) -> Result<ChatFlowJump<T>> {
        let cached: Option<LookupCache> = match ctx.step_cache() {
            Some(cache) => cache.decode(STEP_KIND)?,
            None => None,
        };

        // First turn: offer the default choice set.
        let Some(cache) = cached else {
            let option = (self.default_items)(&ctx).await?;
            if option.skip_step {
                return Ok(ChatFlowJump::Next(ctx.flow_state.clone()));
            }
            return send_choice_activity(&ctx, option, &cancel).await;
        };

        // A card action resolves against the cached value set; an id that
        // is no longer offered just re-awaits.
        if let Some(action) = &ctx.input.action_value {
            let selected = action
                .get("id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
                .and_then(|id| cache.values.iter().find(|v| v.id == id).cloned());

            let ctx = &ctx;
            let cancel = &cancel;
            let cache = &cache;
            return selected
                .fold_value_async(
                    |value| async move {
                        let message = match &self.result_message {
                            Some(factory) => factory(ctx, &value),
                            None => format!("Value selected: {}", value.name),
                        };
                        send_instead_activity(
                            ctx,
                            cache.resource.as_ref(),
                            &Activity::text(message),
                            cancel,
                        )
                        .await?;

                        Ok(ChatFlowJump::Next((self.map_state)(
                            ctx.flow_state.clone(),
                            value,
                        )))
                    },
                    || async move { Ok(ctx.repeat_same_jump()) },
                )
                .await;
        }

        // Typed text runs the search and replaces the offered set.
        let search_text = match ctx.input.trimmed_text() {
            Some(text) if ctx.input.is_message => text.to_string(),
            _ => return Ok(ctx.repeat_same_jump()),
        };

        match (self.search)(&ctx, &search_text).await? {
            Ok(option) => {
                if option.skip_step {
                    return Ok(ChatFlowJump::Next(ctx.flow_state.clone()));
                }
                send_choice_activity(&ctx, option, &cancel).await
            }
            Err(failure) => {
                if let Some(user_message) = &failure.user_message {
                    ctx.send_activity(&Activity::text(user_message.clone()), &cancel)
                        .await?;
                }
                ctx.track_failure(STEP_KIND, &failure);
                Ok(ctx.repeat_same_jump())
            }
        }
    }
}

impl<T> ChatFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Append a step that awaits a pick from a searchable choice set.
    pub fn await_lookup_value(self, step: LookupStep<T>) -> Self {
        self.forward_value(move |ctx, cancel| {
            let step = step.clone();
            async move { step.turn(ctx, cancel).await }
        })
    }
}

async fn send_choice_activity<T>(
    ctx: &ChatFlowContext<T>,
    option: LookupStepOption,
    cancel: &CancellationToken,
) -> Result<ChatFlowJump<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let activity = build_choice_activity(ctx, &option);
    let resource = ctx.send_activity(&activity, cancel).await?;

    let payload = LookupCache {
        resource: Some(resource),
        choice_text: option.choice_text,
        values: option.items,
    };
    let cache = StepCache::encode(STEP_KIND, &payload)?;
    Ok(ChatFlowJump::Repeat(Some(cache)))
}

fn build_choice_activity<T>(ctx: &ChatFlowContext<T>, option: &LookupStepOption) -> Activity {
    let actions: Vec<SuggestedAction> = option
        .items
        .iter()
        .map(|item| SuggestedAction::new(item.name.clone(), json!({ "id": item.id })))
        .collect();

    let activity = Activity::text(option.choice_text.clone()).with_suggested_actions(actions);
    if ctx.channel().supports_cards() {
        activity.with_card(json!({
            "type": "choice",
            "text": option.choice_text,
            "items": option
                .items
                .iter()
                .map(|item| json!({ "id": item.id, "name": item.name }))
                .collect::<Vec<_>>(),
        }))
    } else {
        activity
    }
}
