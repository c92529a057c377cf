//! Integration tests for `#[derive(IntoContext)]`.

#![cfg(feature = "macros")]

use vexil::{EvaluationContext, IntoContext, Value};

#[derive(IntoContext)]
struct User {
    #[context(targeting_key)]
    id: u64,
    email: String,
    #[context(rename = "plan")]
    subscription: String,
    beta: Option<bool>,
    referrer: Option<String>,
    #[context(skip)]
    #[allow(dead_code)]
    password_hash: String,
}

fn user() -> User {
    User {
        id: 42,
        email: "ada@example.com".to_string(),
        subscription: "pro".to_string(),
        beta: Some(true),
        referrer: None,
        password_hash: "secret".to_string(),
    }
}

#[test]
fn test_fields_become_attributes() {
    let context = EvaluationContext::from(&user());

    assert_eq!(context.targeting_key(), Some("42"));
    assert_eq!(context.get("email").and_then(Value::as_str), Some("ada@example.com"));
    assert_eq!(context.get("plan").and_then(Value::as_str), Some("pro"));
    assert!(context.get("subscription").is_none());
    assert_eq!(context.get("beta").and_then(Value::as_bool), Some(true));
}

#[test]
fn test_none_and_skipped_fields_are_left_out() {
    let context: EvaluationContext = user().into();

    assert!(context.get("referrer").is_none());
    assert!(context.get("password_hash").is_none());
    assert!(context.get("id").is_none());
}

#[derive(IntoContext)]
struct Anonymous {
    #[context(targeting_key)]
    session: Option<String>,
    region: &'static str,
}

#[test]
fn test_optional_targeting_key_and_borrowed_fields() {
    let with_session = Anonymous {
        session: Some("s-1".to_string()),
        region: "eu",
    };
    let without = Anonymous {
        session: None,
        region: "us",
    };

    let context = EvaluationContext::from(&with_session);
    assert_eq!(context.targeting_key(), Some("s-1"));
    assert_eq!(context.get("region").and_then(Value::as_str), Some("eu"));

    assert_eq!(EvaluationContext::from(without).targeting_key(), None);
}
