//! chatflow — multi-turn conversational steps for chat bots.
//!
//! A [`engine::flow::ChatFlow`] composes steps (await a date, a pick from a
//! searchable list, a free-form value, a confirmation) into a pipeline over
//! a caller-defined flow state. The hosting runtime delivers one turn at a
//! time; [`engine::executor::ChatFlowEngine`] restores the pending step from
//! a [`storage::StateStore`], drives it, and persists whatever the step's
//! jump carries — so a conversation survives without a long-lived process.

pub mod channel;
pub mod engine;
pub mod funcs;
pub mod steps;
pub mod storage;
