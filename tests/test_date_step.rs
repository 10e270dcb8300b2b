//! Tests for the date-await step: prompting, parsing, validation,
//! card submission, skip.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use chatflow::channel::TelemetrySink;
use chatflow::channel::memory::{ChannelOp, MemoryChannel};
use chatflow::engine::executor::ChatFlowEngine;
use chatflow::engine::flow::ChatFlow;
use chatflow::engine::types::*;
use chatflow::steps::date_step::{DateStep, DateStepOption};
use chatflow::storage::StateStore;
use chatflow::storage::memory_store::MemoryStateStore;

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
struct Trip {
    depart: Option<NaiveDate>,
}

struct Harness {
    engine: ChatFlowEngine<Trip>,
    channel: Arc<MemoryChannel>,
    store: Arc<MemoryStateStore>,
}

fn harness_with(flow: ChatFlow<Trip>, kind: ChannelKind) -> Harness {
    let channel = Arc::new(MemoryChannel::new(kind));
    let store = Arc::new(MemoryStateStore::new());
    let engine = ChatFlowEngine::new(flow, store.clone(), channel.clone());
    Harness {
        engine,
        channel,
        store,
    }
}

fn date_flow(option: DateStepOption) -> ChatFlow<Trip> {
    ChatFlow::new("trip").await_date(DateStep::new(
        move |_ctx| option.clone(),
        |mut trip: Trip, date| {
            trip.depart = Some(date);
            trip
        },
    ))
}

async fn turn(h: &Harness, input: TurnInput) -> TurnOutcome<Trip> {
    h.engine
        .handle_turn("c1", Trip::default(), input, CancellationToken::new())
        .await
        .unwrap()
}

struct CountingSink {
    events: Mutex<Vec<String>>,
}

impl TelemetrySink for CountingSink {
    fn track_event(&self, name: &str, _properties: &HashMap<String, String>) {
        self.events.lock().unwrap().push(name.to_string());
    }
}

// --- Prompting ---

#[tokio::test]
async fn first_turn_sends_text_prompt_and_waits() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Other);

    let outcome = turn(&h, TurnInput::message("hi")).await;
    assert!(outcome.is_waiting());

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "Enter a date (%d.%m.%Y)");
    assert!(sent[0].card.is_none());

    let snapshot = h.store.load("c1").await.unwrap().unwrap();
    assert_eq!(snapshot.cache.unwrap().step_kind, "date");
}

#[tokio::test]
async fn card_channel_gets_a_date_card() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Msteams);

    turn(&h, TurnInput::message("hi")).await;

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    let card = sent[0].card.as_ref().unwrap();
    assert_eq!(card["type"], "date_input");
    assert_eq!(card["confirm"], "Select");
}

// --- The concrete scenario: prompt, then answer ---

#[tokio::test]
async fn valid_text_reply_completes_with_mapped_state() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Other);

    turn(&h, TurnInput::message("hi")).await;
    let outcome = turn(&h, TurnInput::message("31.12.2030")).await;

    let trip = outcome.into_complete().unwrap();
    assert_eq!(
        trip.depart,
        Some(NaiveDate::from_ymd_opt(2030, 12, 31).unwrap())
    );
    assert_eq!(h.store.pending_count(), 0);

    // Exactly one result-message send; the plain channel cannot delete the
    // prompt, so it stays.
    let ops = h.channel.ops();
    assert_eq!(ops.len(), 2);
    assert!(
        matches!(&ops[1], ChannelOp::Sent { activity, .. }
            if activity.text == "Value selected: 31.12.2030")
    );
}

#[tokio::test]
async fn invalid_text_reply_reprompts_with_cache_unchanged() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Other);

    turn(&h, TurnInput::message("hi")).await;
    let before = h.store.load("c1").await.unwrap().unwrap();

    let outcome = turn(&h, TurnInput::message("not-a-date")).await;
    assert!(outcome.is_waiting());

    let after = h.store.load("c1").await.unwrap().unwrap();
    assert_eq!(before.cache, after.cache);

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].text, "Enter the date in '%d.%m.%Y' format");

    // The same step still accepts a corrected reply.
    let outcome = turn(&h, TurnInput::message("31.12.2030")).await;
    assert!(outcome.into_complete().is_some());
}

#[tokio::test]
async fn custom_invalid_text_is_used() {
    let option = DateStepOption {
        invalid_date_text: Some("That is not a date".to_string()),
        ..Default::default()
    };
    let h = harness_with(date_flow(option), ChannelKind::Other);

    turn(&h, TurnInput::message("hi")).await;
    turn(&h, TurnInput::message("nope")).await;

    assert_eq!(h.channel.sent()[1].text, "That is not a date");
}

// --- Card submission ---

#[tokio::test]
async fn card_submission_replaces_the_prompt_on_teams() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Msteams);

    turn(&h, TurnInput::message("hi")).await;
    let outcome = turn(
        &h,
        TurnInput::card_action(serde_json::json!({ "date": "2030-12-31" })),
    )
    .await;

    let trip = outcome.into_complete().unwrap();
    assert_eq!(
        trip.depart,
        Some(NaiveDate::from_ymd_opt(2030, 12, 31).unwrap())
    );

    let ops = h.channel.ops();
    assert_eq!(ops.len(), 3);
    assert!(matches!(&ops[0], ChannelOp::Sent { .. }));
    assert!(matches!(&ops[1], ChannelOp::Deleted { id, .. } if id == "activity-1"));
    assert!(
        matches!(&ops[2], ChannelOp::Sent { activity, .. } if activity.text == "Value selected: 31.12.2030")
    );
}

#[tokio::test]
async fn typed_reply_also_replaces_the_prompt_on_teams() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Msteams);

    turn(&h, TurnInput::message("hi")).await;
    let outcome = turn(&h, TurnInput::message("31.12.2030")).await;
    assert!(outcome.into_complete().is_some());

    let ops = h.channel.ops();
    assert_eq!(ops.len(), 3);
    assert!(matches!(&ops[1], ChannelOp::Deleted { id, .. } if id == "activity-1"));
    assert!(
        matches!(&ops[2], ChannelOp::Sent { activity, .. }
            if activity.text == "Value selected: 31.12.2030")
    );
}

// --- Edited answers ---

#[tokio::test]
async fn edited_answer_updates_the_response_in_place_on_teams() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Msteams);

    turn(&h, TurnInput::message("hi")).await;
    let outcome = turn(&h, TurnInput::edited_message("31.12.2030")).await;
    assert!(outcome.into_complete().is_some());

    let ops = h.channel.ops();
    assert_eq!(ops.len(), 2);
    assert!(
        matches!(&ops[1], ChannelOp::Updated { id, activity, .. }
            if id == "activity-1" && activity.text == "Value selected: 31.12.2030")
    );
}

#[tokio::test]
async fn edited_answer_falls_back_to_a_fresh_send_elsewhere() {
    let h = harness_with(date_flow(DateStepOption::default()), ChannelKind::Other);

    turn(&h, TurnInput::message("hi")).await;
    let outcome = turn(&h, TurnInput::edited_message("31.12.2030")).await;
    assert!(outcome.into_complete().is_some());

    let ops = h.channel.ops();
    assert_eq!(ops.len(), 2);
    assert!(
        matches!(&ops[1], ChannelOp::Sent { activity, .. }
            if activity.text == "Value selected: 31.12.2030")
    );
}

// --- Skip ---

#[tokio::test]
async fn skip_step_completes_with_unchanged_state_and_zero_io() {
    let h = harness_with(date_flow(DateStepOption::skip()), ChannelKind::Msteams);

    let outcome = turn(&h, TurnInput::message("hi")).await;

    assert_eq!(outcome.into_complete().unwrap(), Trip::default());
    assert_eq!(h.channel.op_count(), 0);
    assert_eq!(h.store.pending_count(), 0);
}

// --- Validation ---

fn validated_flow() -> ChatFlow<Trip> {
    let min = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
    ChatFlow::new("trip").await_date(
        DateStep::new(
            |_ctx| DateStepOption::default(),
            |mut trip: Trip, date| {
                trip.depart = Some(date);
                trip
            },
        )
        .with_validator(move |_ctx, date| {
            if date < min {
                Err(FlowFailure::user("Pick a date from 2030 onwards")
                    .with_log("date before the allowed minimum"))
            } else {
                Ok(date)
            }
        }),
    )
}

#[tokio::test]
async fn rejected_date_reprompts_and_never_maps_state() {
    let h = harness_with(validated_flow(), ChannelKind::Other);

    turn(&h, TurnInput::message("hi")).await;
    let outcome = turn(&h, TurnInput::message("01.01.2020")).await;
    assert!(outcome.is_waiting());

    let snapshot = h.store.load("c1").await.unwrap().unwrap();
    let state: Trip = serde_json::from_value(snapshot.state).unwrap();
    assert_eq!(state, Trip::default());

    assert_eq!(h.channel.sent()[1].text, "Pick a date from 2030 onwards");

    let outcome = turn(&h, TurnInput::message("05.06.2031")).await;
    assert!(outcome.into_complete().is_some());
}

// --- Telemetry ---

#[tokio::test]
async fn parse_failure_without_log_message_emits_no_telemetry() {
    let sink = Arc::new(CountingSink {
        events: Mutex::new(Vec::new()),
    });
    let channel = Arc::new(MemoryChannel::new(ChannelKind::Other));
    let store = Arc::new(MemoryStateStore::new());
    let engine = ChatFlowEngine::new(
        date_flow(DateStepOption::default()),
        store.clone(),
        channel.clone(),
    )
    .with_telemetry(sink.clone());

    engine
        .handle_turn(
            "c1",
            Trip::default(),
            TurnInput::message("hi"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    engine
        .handle_turn(
            "c1",
            Trip::default(),
            TurnInput::message("not-a-date"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(sink.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn validator_failure_with_log_message_is_tracked() {
    let sink = Arc::new(CountingSink {
        events: Mutex::new(Vec::new()),
    });
    let channel = Arc::new(MemoryChannel::new(ChannelKind::Other));
    let store = Arc::new(MemoryStateStore::new());
    let engine = ChatFlowEngine::new(validated_flow(), store.clone(), channel.clone())
        .with_telemetry(sink.clone());

    engine
        .handle_turn(
            "c1",
            Trip::default(),
            TurnInput::message("hi"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    engine
        .handle_turn(
            "c1",
            Trip::default(),
            TurnInput::message("01.01.2020"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let events = sink.events.lock().unwrap();
    assert_eq!(events.as_slice(), ["trip.date.failure"]);
}
