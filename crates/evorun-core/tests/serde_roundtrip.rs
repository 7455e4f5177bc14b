use evorun_core::errors::{ErrorInfo, EvoError};
use evorun_core::value::Value;

#[test]
fn value_round_trips_through_json() {
    let values = vec![
        Value::Invalid,
        Value::Bool(true),
        Value::Int(-42),
        Value::Double(2.75),
        Value::from("hawk"),
    ];
    let json = serde_json::to_string(&values).unwrap();
    let back: Vec<Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(values, back);
}

#[test]
fn error_payload_round_trips_through_json() {
    let err = EvoError::Parse(
        ErrorInfo::new("gen.bad_command", "the command cannot be empty")
            .with_context("command", "")
            .with_hint("try '*10;min'"),
    );
    let json = serde_json::to_string(&err).unwrap();
    let back: EvoError = serde_json::from_str(&json).unwrap();
    assert_eq!(err, back);
    assert_eq!(back.info().code, "gen.bad_command");
}
