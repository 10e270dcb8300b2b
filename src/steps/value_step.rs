use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::engine::flow::{ChatFlow, ChatFlowContext, ChatFlowJump};
use crate::engine::types::{Activity, FlowFailure, SuggestedAction};
use crate::steps::PromptTurn;

const STEP_KIND: &str = "value";

const DEFAULT_MESSAGE_TEXT: &str = "Enter a value";

/// A suggested reply: picking it submits `value` without typing.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion<V> {
    pub title: String,
    pub value: V,
}

impl<V> Suggestion<V> {
    pub fn new(title: impl Into<String>, value: V) -> Self {
        Self {
            title: title.into(),
            value,
        }
    }
}

/// Options for one free-form value step.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueStepOption<V> {
    /// Prompt text. Default: "Enter a value".
    pub message_text: String,
    /// Suggested replies, grouped into rows.
    pub suggestions: Vec<Vec<Suggestion<V>>>,
    /// Complete immediately with the flow state unchanged, sending nothing.
    pub skip_step: bool,
}

impl<V> Default for ValueStepOption<V> {
    fn default() -> Self {
        Self {
            message_text: DEFAULT_MESSAGE_TEXT.to_string(),
            suggestions: Vec::new(),
            skip_step: false,
        }
    }
}

impl<V> ValueStepOption<V> {
    pub fn with_message_text(message_text: impl Into<String>) -> Self {
        Self {
            message_text: message_text.into(),
            ..Default::default()
        }
    }

    pub fn skip() -> Self {
        Self {
            skip_step: true,
            ..Default::default()
        }
    }
}

type OptionFactoryFn<T, V> = Arc<dyn Fn(&ChatFlowContext<T>) -> ValueStepOption<V> + Send + Sync>;
type ParserFn<V> = Arc<dyn Fn(&str) -> Result<V, FlowFailure> + Send + Sync>;
type ResultMessageFn<T, V> = Arc<dyn Fn(&ChatFlowContext<T>, &V) -> String + Send + Sync>;
type MapStateFn<T, V> = Arc<dyn Fn(T, V) -> T + Send + Sync>;

/// A step awaiting a free-form typed value. The caller supplies the parser;
/// a picked suggestion bypasses it and deserializes the value directly.
pub struct ValueStep<T, V> {
    option_factory: OptionFactoryFn<T, V>,
    parser: ParserFn<V>,
    result_message: Option<ResultMessageFn<T, V>>,
    map_state: MapStateFn<T, V>,
}

impl<T, V> Clone for ValueStep<T, V> {
    fn clone(&self) -> Self {
        Self {
            option_factory: Arc::clone(&self.option_factory),
            parser: Arc::clone(&self.parser),
            result_message: self.result_message.clone(),
            map_state: Arc::clone(&self.map_state),
        }
    }
}

impl<T, V> ValueStep<T, V> {
    pub fn new<O, P, M>(option_factory: O, parser: P, map_flow_state: M) -> Self
    where
        O: Fn(&ChatFlowContext<T>) -> ValueStepOption<V> + Send + Sync + 'static,
        P: Fn(&str) -> Result<V, FlowFailure> + Send + Sync + 'static,
        M: Fn(T, V) -> T + Send + Sync + 'static,
    {
        Self {
            option_factory: Arc::new(option_factory),
            parser: Arc::new(parser),
            result_message: None,
            map_state: Arc::new(map_flow_state),
        }
    }

    /// Override the confirmation text built once a value is accepted.
    pub fn with_result_message<R>(mut self, result_message: R) -> Self
    where
        R: Fn(&ChatFlowContext<T>, &V) -> String + Send + Sync + 'static,
    {
        self.result_message = Some(Arc::new(result_message));
        self
    }
}

impl<T, V> ValueStep<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn turn(
        &self,
        ctx: ChatFlowContext<T>,
        cancel: CancellationToken,
    ) -> Result<ChatFlowJump<T>> {
        let option = (self.option_factory)(&ctx);

        // Suggestion rows become plain action values; a serialization
        // failure here is a caller contract violation, not a domain failure.
        let mut actions = Vec::new();
        for row in &option.suggestions {
            for suggestion in row {
                let value = serde_json::to_value(&suggestion.value)
                    .context("failed to serialize suggestion value")?;
                actions.push(SuggestedAction::new(suggestion.title.clone(), value));
            }
        }

        let parser = Arc::clone(&self.parser);
        let result_message = self.result_message.clone();
        let map_state = Arc::clone(&self.map_state);
        let message_text = option.message_text.clone();

        let turn = PromptTurn {
            step_kind: STEP_KIND,
            skip_step: option.skip_step,
            prompt_text: option.message_text.clone(),
            build_prompt: Box::new(move |_ctx| {
                Activity::text(message_text).with_suggested_actions(actions)
            }),
            parse: Box::new(move |ctx, _cache| parse_value(ctx, parser.as_ref())),
            validate: Box::new(|_ctx, value| Ok(value)),
            result_message: Box::new(move |ctx, value| match &result_message {
                Some(factory) => factory(ctx, value),
                None => "Value accepted".to_string(),
            }),
            map_state: Box::new(move |state, value| map_state(state, value)),
        };

        turn.run(ctx, cancel).await
    }
}

impl<T> ChatFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Append a step that awaits a free-form value of type `V`.
    pub fn await_value<V>(self, step: ValueStep<T, V>) -> Self
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.forward_value(move |ctx, cancel| {
            let step = step.clone();
            async move { step.turn(ctx, cancel).await }
        })
    }
}

fn parse_value<T, V>(
    ctx: &ChatFlowContext<T>,
    parser: &(dyn Fn(&str) -> Result<V, FlowFailure> + Send + Sync),
) -> Result<V, FlowFailure>
where
    V: DeserializeOwned,
{
    if let Some(action) = &ctx.input.action_value {
        return serde_json::from_value(action.clone()).map_err(|e| {
            FlowFailure::user("Pick one of the suggested values")
                .with_log(format!("failed to deserialize suggestion action: {}", e))
        });
    }

    let Some(text) = ctx.input.trimmed_text() else {
        return Err(FlowFailure::user("Enter a text value"));
    };
    parser(text)
}
