use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::engine::flow::{ChatFlow, ChatFlowContext, ChatFlowJump};
use crate::engine::types::{Activity, FlowFailure};
use crate::steps::{PromptCache, PromptTurn};

const STEP_KIND: &str = "date";

const DEFAULT_TEXT: &str = "Enter a date";
const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";
const DEFAULT_CONFIRM_BUTTON_TEXT: &str = "Select";

/// Card action values carry the picked date in ISO format regardless of the
/// display format.
const ACTION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Options for one date-await step, rebuilt from the flow state on every
/// turn by the step's option factory.
#[derive(Debug, Clone, PartialEq)]
pub struct DateStepOption {
    /// Prompt text. Default: "Enter a date".
    pub text: String,
    /// chrono format string for typed input and echoed values.
    /// Default: "%d.%m.%Y".
    pub date_format: String,
    /// Confirm button caption on card-capable channels. Default: "Select".
    pub confirm_button_text: String,
    /// Corrective message on unparseable or rejected input; a format hint
    /// is generated when absent.
    pub invalid_date_text: Option<String>,
    /// Pre-selected date on card-capable channels.
    pub default_date: Option<NaiveDate>,
    /// Complete immediately with the flow state unchanged, sending nothing.
    pub skip_step: bool,
}

impl Default for DateStepOption {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            confirm_button_text: DEFAULT_CONFIRM_BUTTON_TEXT.to_string(),
            invalid_date_text: None,
            default_date: None,
            skip_step: false,
        }
    }
}

impl DateStepOption {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
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

type OptionFactoryFn<T> = Arc<dyn Fn(&ChatFlowContext<T>) -> DateStepOption + Send + Sync>;
type ValidatorFn<T> =
    Arc<dyn Fn(&ChatFlowContext<T>, NaiveDate) -> Result<NaiveDate, FlowFailure> + Send + Sync>;
type ResultMessageFn<T> = Arc<dyn Fn(&ChatFlowContext<T>, NaiveDate) -> String + Send + Sync>;
type MapStateFn<T> = Arc<dyn Fn(T, NaiveDate) -> T + Send + Sync>;

/// A step awaiting a calendar date: date-picker card on card-capable
/// channels, text input parsed with the option's format elsewhere.
pub struct DateStep<T> {
    option_factory: OptionFactoryFn<T>,
    validator: Option<ValidatorFn<T>>,
    result_message: Option<ResultMessageFn<T>>,
    map_state: MapStateFn<T>,
}

impl<T> Clone for DateStep<T> {
    fn clone(&self) -> Self {
        Self {
            option_factory: Arc::clone(&self.option_factory),
            validator: self.validator.clone(),
            result_message: self.result_message.clone(),
            map_state: Arc::clone(&self.map_state),
        }
    }
}

impl<T> DateStep<T> {
    pub fn new<O, M>(option_factory: O, map_flow_state: M) -> Self
    where
        O: Fn(&ChatFlowContext<T>) -> DateStepOption + Send + Sync + 'static,
        M: Fn(T, NaiveDate) -> T + Send + Sync + 'static,
    {
        Self {
            option_factory: Arc::new(option_factory),
            validator: None,
            result_message: None,
            map_state: Arc::new(map_flow_state),
        }
    }

    /// Business validation run after a successful parse. Rejections become
    /// re-prompts, exactly like parse failures.
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&ChatFlowContext<T>, NaiveDate) -> Result<NaiveDate, FlowFailure>
            + Send
            + Sync
            + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Override the confirmation text built once a date is accepted.
    pub fn with_result_message<R>(mut self, result_message: R) -> Self
    where
        R: Fn(&ChatFlowContext<T>, NaiveDate) -> String + Send + Sync + 'static,
    {
        self.result_message = Some(Arc::new(result_message));
        self
    }
}

impl<T> DateStep<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn turn(
        &self,
        ctx: ChatFlowContext<T>,
        cancel: CancellationToken,
    ) -> Result<ChatFlowJump<T>> {
        let option = (self.option_factory)(&ctx);

        let validator = self.validator.clone();
        let result_message = self.result_message.clone();
        let map_state = Arc::clone(&self.map_state);

        let prompt_option = option.clone();
        let parse_option = option.clone();
        let message_option = option.clone();

        let turn = PromptTurn {
            step_kind: STEP_KIND,
            skip_step: option.skip_step,
            prompt_text: option.text.clone(),
            build_prompt: Box::new(move |ctx| build_prompt_activity(ctx, &prompt_option)),
            parse: Box::new(move |ctx, cache| parse_date(ctx, &parse_option, cache)),
            validate: Box::new(move |ctx, date| match &validator {
                Some(validator) => validator(ctx, date),
                None => Ok(date),
            }),
            result_message: Box::new(move |ctx, date| match &result_message {
                Some(factory) => factory(ctx, *date),
                None => default_result_message(&message_option, *date),
            }),
            map_state: Box::new(move |state, date| map_state(state, date)),
        };

        turn.run(ctx, cancel).await
    }
}

impl<T> ChatFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Append a step that awaits a calendar date.
    pub fn await_date(self, step: DateStep<T>) -> Self {
        self.forward_value(move |ctx, cancel| {
            let step = step.clone();
            async move { step.turn(ctx, cancel).await }
        })
    }
}

fn build_prompt_activity<T>(ctx: &ChatFlowContext<T>, option: &DateStepOption) -> Activity {
    if ctx.channel().supports_cards() {
        Activity::text(option.text.clone()).with_card(json!({
            "type": "date_input",
            "text": option.text,
            "confirm": option.confirm_button_text,
            "value": option
                .default_date
                .map(|date| date.format(ACTION_DATE_FORMAT).to_string()),
        }))
    } else {
        Activity::text(format!("{} ({})", option.text, option.date_format))
    }
}

fn parse_date<T>(
    ctx: &ChatFlowContext<T>,
    option: &DateStepOption,
    _cache: &PromptCache,
) -> Result<NaiveDate, FlowFailure> {
    if let Some(action) = &ctx.input.action_value {
        let text = action.get("date").and_then(|v| v.as_str()).unwrap_or("");
        return NaiveDate::parse_from_str(text, ACTION_DATE_FORMAT)
            .map_err(|_| invalid_date_failure(option));
    }

    let Some(text) = ctx.input.trimmed_text() else {
        return Err(invalid_date_failure(option));
    };
    NaiveDate::parse_from_str(text, &option.date_format).map_err(|_| invalid_date_failure(option))
}

fn invalid_date_failure(option: &DateStepOption) -> FlowFailure {
    let message = option
        .invalid_date_text
        .clone()
        .unwrap_or_else(|| format!("Enter the date in '{}' format", option.date_format));
    FlowFailure::user(message)
}

fn default_result_message(option: &DateStepOption, date: NaiveDate) -> String {
    format!("Value selected: {}", date.format(&option.date_format))
}
