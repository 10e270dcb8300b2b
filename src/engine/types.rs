use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Channel a conversation is hosted on. Determines which transport
/// capabilities the steps may rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Msteams,
    Telegram,
    Webchat,
    Other,
}

impl ChannelKind {
    /// Whether the channel renders rich card prompts.
    pub fn supports_cards(&self) -> bool {
        matches!(self, ChannelKind::Msteams | ChannelKind::Webchat)
    }

    /// Whether a previously sent activity can be edited in place.
    pub fn supports_update(&self) -> bool {
        matches!(self, ChannelKind::Msteams)
    }

    /// Whether a previously sent activity can be removed.
    pub fn supports_delete(&self) -> bool {
        matches!(self, ChannelKind::Msteams)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Msteams => write!(f, "msteams"),
            ChannelKind::Telegram => write!(f, "telegram"),
            ChannelKind::Webchat => write!(f, "webchat"),
            ChannelKind::Other => write!(f, "other"),
        }
    }
}

/// A button-like action offered alongside a prompt. The `value` is echoed
/// back verbatim as the turn's action value when the user picks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub title: String,
    pub value: serde_json::Value,
}

impl SuggestedAction {
    pub fn new(title: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            title: title.into(),
            value,
        }
    }
}

/// Outbound message descriptor. Rendering is channel-specific and happens
/// behind the `ChannelPort` seam; the `card` payload is an opaque descriptor
/// the channel adapter knows how to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<SuggestedAction>,
}

impl Activity {
    /// Plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            card: None,
            suggested_actions: Vec::new(),
        }
    }

    pub fn with_card(mut self, card: serde_json::Value) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_suggested_actions(mut self, actions: Vec<SuggestedAction>) -> Self {
        self.suggested_actions = actions;
        self
    }
}

/// Transport handle for an activity that was delivered to the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub id: String,
}

impl ResourceResponse {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One inbound user interaction, as delivered by the hosting runtime.
/// `action_value` is present when the user answered through a card action
/// rather than a typed message; `is_edited` marks a turn that edits a
/// previously answered message on channels that support it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_value: Option<serde_json::Value>,
    pub is_message: bool,
    #[serde(default)]
    pub is_edited: bool,
}

impl TurnInput {
    /// A typed text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            action_value: None,
            is_message: true,
            is_edited: false,
        }
    }

    /// A card action submission.
    pub fn card_action(value: serde_json::Value) -> Self {
        Self {
            text: None,
            action_value: Some(value),
            is_message: true,
            is_edited: false,
        }
    }

    /// An edit of a previously sent message.
    pub fn edited_message(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            action_value: None,
            is_message: true,
            is_edited: true,
        }
    }

    /// The turn's text with surrounding whitespace removed, if any remains.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Errors raised while encoding or decoding a step's persisted cache.
/// These are faults (corrupted state), never domain failures.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to encode '{step_kind}' step cache: {source}")]
    Encode {
        step_kind: String,
        source: serde_json::Error,
    },
    #[error("failed to decode '{step_kind}' step cache: {source}")]
    Decode {
        step_kind: String,
        source: serde_json::Error,
    },
}

/// Opaque per-step state persisted between turns while a step awaits more
/// input. The engine stores and returns it untouched; only the step kind
/// that produced the cache understands the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCache {
    pub step_kind: String,
    pub payload: serde_json::Value,
}

impl StepCache {
    pub fn encode<P: Serialize>(step_kind: &str, payload: &P) -> Result<Self, StateError> {
        let payload = serde_json::to_value(payload).map_err(|source| StateError::Encode {
            step_kind: step_kind.to_string(),
            source,
        })?;
        Ok(Self {
            step_kind: step_kind.to_string(),
            payload,
        })
    }

    /// Decode the payload for the given step kind. A cache written by a
    /// different step kind decodes to `None` and is treated as absent.
    pub fn decode<P: DeserializeOwned>(&self, step_kind: &str) -> Result<Option<P>, StateError> {
        if self.step_kind != step_kind {
            return Ok(None);
        }
        serde_json::from_value(self.payload.clone())
            .map(Some)
            .map_err(|source| StateError::Decode {
                step_kind: step_kind.to_string(),
                source,
            })
    }
}

/// Expected domain failure of a step turn: bad input, rejected value,
/// unsuccessful search. Always resolved by re-prompting, never by aborting
/// the turn. `source` carries an underlying error for diagnostics only.
#[derive(Debug, Default)]
pub struct FlowFailure {
    pub user_message: Option<String>,
    pub log_message: Option<String>,
    pub source: Option<anyhow::Error>,
}

impl FlowFailure {
    /// Failure with a user-facing corrective message.
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            user_message: Some(message.into()),
            log_message: None,
            source: None,
        }
    }

    /// Failure with a diagnostic-only message.
    pub fn log(message: impl Into<String>) -> Self {
        Self {
            user_message: None,
            log_message: Some(message.into()),
            source: None,
        }
    }

    pub fn with_log(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Whether the failure carries anything worth logging or tracking.
    pub fn has_diagnostics(&self) -> bool {
        self.log_message.is_some() || self.source.is_some()
    }
}

impl std::fmt::Display for FlowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self
            .log_message
            .as_deref()
            .or(self.user_message.as_deref())
            .unwrap_or("step failure");
        write!(f, "{}", message)
    }
}

/// Engine-visible persisted record for one conversation: which step is
/// pending, the flow state as of the last completed step, and the pending
/// step's cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub flow_id: String,
    pub position: usize,
    pub state: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<StepCache>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// Outcome of one delivered turn, as seen by the hosting runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome<T> {
    /// The pending step needs more input; state was persisted.
    Waiting,
    /// The pipeline ran to completion; state was cleared.
    Complete(T),
}

impl<T> TurnOutcome<T> {
    pub fn is_waiting(&self) -> bool {
        matches!(self, TurnOutcome::Waiting)
    }

    pub fn into_complete(self) -> Option<T> {
        match self {
            TurnOutcome::Complete(state) => Some(state),
            TurnOutcome::Waiting => None,
        }
    }
}
