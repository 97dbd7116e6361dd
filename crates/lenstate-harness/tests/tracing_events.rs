#![forbid(unsafe_code)]

//! Structured `tracing` events emitted over a node's lifecycle.

use lenstate::stream::{Message, Source, sink};
use lenstate::{ConnectionGuard, Reason, state};
use lenstate_harness::{TraceCapture, subscribe};
use serde_json::json;

#[test]
fn connection_lifecycle_is_logged() {
    let capture = TraceCapture::new();
    let _guard = capture.install();

    let s = state(json!({"x": 1}));
    let sub = subscribe(&s, |_| {});
    assert_eq!(capture.count("state.connect"), 1);
    assert_eq!(capture.count("guard.open"), 1);

    drop(sub);
    assert_eq!(capture.count("state.disconnect"), 1);
    assert_eq!(capture.count("guard.release"), 1);
}

#[test]
fn lens_writes_carry_their_key() {
    let capture = TraceCapture::new();
    let _guard = capture.install();

    let s = state(json!({"x": 1}));
    s.sub("x").set(json!(2));

    let writes: Vec<_> = capture
        .events()
        .into_iter()
        .filter(|event| event.message == "lens.write")
        .collect();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].field("key"), Some("x"));
}

#[test]
fn termination_and_ignored_writes_are_logged() {
    let capture = TraceCapture::new();
    let _guard = capture.install();

    let s = state(json!(1));
    s.close(Some(Reason::new("shutdown")));
    s.set(json!(2));
    s.clear();

    assert_eq!(capture.count("state.terminate"), 1);
    assert_eq!(capture.count("state.write_after_close"), 1);
    let terminate = capture
        .events()
        .into_iter()
        .find(|event| event.message == "state.terminate");
    assert!(
        terminate
            .and_then(|event| event.field("reason").map(str::to_owned))
            .is_some_and(|reason| reason.contains("shutdown"))
    );
}

#[test]
fn second_open_on_a_guard_is_reported_busy() {
    let capture = TraceCapture::new();
    let _guard = capture.install();

    let guard: ConnectionGuard<u8> = ConnectionGuard::new();
    let noop = sink(|_: Message<u8>| {});
    guard.open(noop.clone());
    guard.open(noop);

    assert_eq!(capture.count("guard.open"), 1);
    assert_eq!(capture.count("guard.busy"), 1);
}
