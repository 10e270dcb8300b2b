//! Tests for the Result/Option combinators: short-circuit on
//! failure/absence, identity on success/presence, exactly one branch runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use chatflow::funcs::{OptionExt, ResultExt};

// --- fold ---

#[test]
fn fold_runs_exactly_one_branch() {
    let ok: Result<u32, &str> = Ok(2);
    assert_eq!(ok.fold(|v| v * 10, |_| 0), 20);

    let err: Result<u32, &str> = Err("bad");
    assert_eq!(err.fold(|v| v * 10, |f| f.len() as u32), 3);
}

// --- forward ---

#[test]
fn forward_chains_on_success() {
    let result: Result<u32, &str> = Ok(2).forward(|v| Ok(v + 1)).forward(|v| Ok(v * 10));
    assert_eq!(result, Ok(30));
}

#[test]
fn forward_short_circuits_on_failure() {
    let touched = AtomicUsize::new(0);
    let result: Result<u32, &str> = Err("bad").forward(|v: u32| {
        touched.fetch_add(1, Ordering::SeqCst);
        Ok(v)
    });

    assert_eq!(result, Err("bad"));
    assert_eq!(touched.load(Ordering::SeqCst), 0);
}

#[test]
fn forward_propagates_the_first_failure() {
    let result: Result<u32, &str> = Ok(2).forward(|_| Err("first")).forward(|v: u32| Ok(v));
    assert_eq!(result, Err("first"));
}

// --- map_failure ---

#[test]
fn map_failure_leaves_success_untouched() {
    let ok: Result<u32, &str> = Ok(2);
    assert_eq!(ok.map_failure(|f| f.to_uppercase()), Ok(2));

    let err: Result<u32, &str> = Err("bad");
    assert_eq!(err.map_failure(|f| f.to_uppercase()), Err("BAD".to_string()));
}

// --- async variants ---

#[tokio::test]
async fn fold_value_async_runs_the_success_branch() {
    let ok: Result<u32, &str> = Ok(2);
    let result = ok
        .fold_value_async(|v| async move { v * 10 }, |_| async move { 0 })
        .await;
    assert_eq!(result, 20);
}

#[tokio::test]
async fn fold_value_async_runs_the_failure_branch() {
    let err: Result<u32, &str> = Err("bad");
    let result = err
        .fold_value_async(|v| async move { v }, |f| async move { f.len() as u32 })
        .await;
    assert_eq!(result, 3);
}

#[tokio::test]
async fn map_failure_value_async_transforms_only_failures() {
    let ok: Result<u32, &str> = Ok(2);
    let mapped: Result<u32, String> = ok
        .map_failure_value_async(|f| async move { f.to_uppercase() })
        .await;
    assert_eq!(mapped, Ok(2));

    let err: Result<u32, &str> = Err("bad");
    let mapped: Result<u32, String> = err
        .map_failure_value_async(|f| async move { f.to_uppercase() })
        .await;
    assert_eq!(mapped, Err("BAD".to_string()));
}

// --- Option ---

#[test]
fn option_fold_runs_exactly_one_branch() {
    assert_eq!(Some(2).fold(|v| v * 10, || 0), 20);
    assert_eq!(None::<u32>.fold(|v| v * 10, || 7), 7);
}

#[tokio::test]
async fn option_fold_value_async() {
    let present = Some(2)
        .fold_value_async(|v| async move { v * 10 }, || async move { 0 })
        .await;
    assert_eq!(present, 20);

    let absent = None::<u32>
        .fold_value_async(|v| async move { v * 10 }, || async move { 7 })
        .await;
    assert_eq!(absent, 7);
}
