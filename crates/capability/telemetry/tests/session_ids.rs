use udo_telemetry::{init_tracing, new_session_id};

#[test]
fn session_ids_are_unique_uuids() {
    let first = new_session_id();
    let second = new_session_id();
    assert_eq!(first.len(), 36);
    assert_eq!(first.matches('-').count(), 4);
    assert_ne!(first, second);
}

#[test]
fn init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
