use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use vexil::{
    ConfigError, ErrorCode, EvaluationError, EvaluationOptions, FeatureFlags, ProviderStatus,
    SharedHook,
    multi::{
        ComparisonStrategy, FirstMatchStrategy, FirstSuccessfulStrategy, MULTI_PROVIDER_NAME,
        MultiProvider,
    },
    testing::{RecordingHook, ScriptedProvider},
};

mod common;
use common::{flags_with, resolved};

#[tokio::test]
async fn test_first_match_stops_at_first_found_flag() {
    let first = Arc::new(ScriptedProvider::new("first"));
    let second = Arc::new(
        ScriptedProvider::new("second").with_boolean("flag", resolved(true, "on")),
    );
    let third = Arc::new(
        ScriptedProvider::new("third").with_boolean("flag", resolved(false, "off")),
    );
    let multi = MultiProvider::builder()
        .provider(first.clone())
        .provider(second.clone())
        .provider(third.clone())
        .strategy(FirstMatchStrategy::new())
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    let details = flags
        .client()
        .get_boolean_details("flag", false, None, None)
        .await;

    assert!(details.value);
    assert_eq!(details.variant.as_deref(), Some("on"));
    assert_eq!(first.resolve_count(), 1);
    assert_eq!(second.resolve_count(), 1);
    assert_eq!(third.resolve_count(), 0);
    assert_eq!(flags.provider_metadata(None).name, MULTI_PROVIDER_NAME);
}

#[tokio::test]
async fn test_first_match_treats_other_errors_as_terminal() {
    let first = Arc::new(
        ScriptedProvider::new("first").with_boolean("flag", Err(EvaluationError::general("boom"))),
    );
    let second = Arc::new(
        ScriptedProvider::new("second").with_boolean("flag", resolved(true, "on")),
    );
    let multi = MultiProvider::builder()
        .provider(first)
        .provider(second.clone())
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    let details = flags
        .client()
        .get_boolean_details("flag", false, None, None)
        .await;

    assert!(!details.value);
    assert_eq!(details.error_code, Some(ErrorCode::General));
    assert_eq!(second.resolve_count(), 0);
}

#[tokio::test]
async fn test_first_successful_skips_errors() {
    let first = Arc::new(
        ScriptedProvider::new("first").with_boolean("flag", Err(EvaluationError::general("boom"))),
    );
    let second = Arc::new(
        ScriptedProvider::new("second").with_boolean("flag", resolved(true, "on")),
    );
    let multi = MultiProvider::builder()
        .provider(first)
        .provider(second.clone())
        .strategy(FirstSuccessfulStrategy::new())
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    assert!(flags.client().get_boolean_value("flag", false, None, None).await);
    assert_eq!(second.resolve_count(), 1);
}

#[tokio::test]
async fn test_all_failures_are_aggregated_in_order() {
    let multi = MultiProvider::builder()
        .provider(Arc::new(ScriptedProvider::new("first")))
        .provider(Arc::new(ScriptedProvider::new("second")))
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    let details = flags
        .client()
        .get_string_details("missing", "default", None, None)
        .await;

    assert_eq!(details.value, "default");
    assert_eq!(details.error_code, Some(ErrorCode::FlagNotFound));
    let message = details.error_message.unwrap();
    assert!(message.contains("first"), "{message}");
    assert!(message.contains("1 more"), "{message}");
}

#[tokio::test]
async fn test_comparison_agreeing_values() {
    let mismatches = Arc::new(AtomicUsize::new(0));
    let counter = mismatches.clone();
    let multi = MultiProvider::builder()
        .named(
            "a",
            Arc::new(
                ScriptedProvider::new("p")
                    .with_string("greeting", resolved("hi".to_string(), "x")),
            ),
        )
        .named(
            "b",
            Arc::new(
                ScriptedProvider::new("p")
                    .with_string("greeting", resolved("hi".to_string(), "y")),
            ),
        )
        .strategy(ComparisonStrategy::new("b").on_mismatch(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    let details = flags
        .client()
        .get_string_details("greeting", "", None, None)
        .await;

    assert_eq!(details.value, "hi");
    assert_eq!(details.variant.as_deref(), Some("x"));
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_comparison_mismatch_uses_fallback() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let multi = MultiProvider::builder()
        .named(
            "a",
            Arc::new(
                ScriptedProvider::new("p")
                    .with_string("greeting", resolved("hi".to_string(), "x")),
            ),
        )
        .named(
            "b",
            Arc::new(
                ScriptedProvider::new("p")
                    .with_string("greeting", resolved("bye".to_string(), "y")),
            ),
        )
        .strategy(ComparisonStrategy::new("b").on_mismatch(move |resolutions| {
            sink.lock().unwrap().push(resolutions.len());
        }))
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    let value = flags
        .client()
        .get_string_value("greeting", "", None, None)
        .await;

    assert_eq!(value, "bye");
    assert_eq!(*seen.lock().unwrap(), vec![2]);
}

#[test]
fn test_configuration_errors() {
    let duplicate = MultiProvider::builder()
        .named("same", Arc::new(ScriptedProvider::new("a")))
        .named("same", Arc::new(ScriptedProvider::new("b")))
        .build()
        .unwrap_err();
    assert_eq!(duplicate, ConfigError::DuplicateProviderName("same".to_string()));

    let unknown = MultiProvider::builder()
        .named("a", Arc::new(ScriptedProvider::new("a")))
        .strategy(ComparisonStrategy::new("missing"))
        .build()
        .unwrap_err();
    assert_eq!(unknown, ConfigError::UnknownFallbackProvider("missing".to_string()));

    assert_eq!(MultiProvider::builder().build().unwrap_err(), ConfigError::NoProviders);
}

#[tokio::test]
async fn test_provider_hooks_stay_private() {
    let leaking = RecordingHook::named("leaking").returning_context(
        vexil::EvaluationContext::new().with_field("leaked", true),
    );
    let first = Arc::new(
        ScriptedProvider::new("first").with_hook(Arc::new(leaking.clone()) as SharedHook),
    );
    let second = Arc::new(
        ScriptedProvider::new("second").with_boolean("flag", resolved(true, "on")),
    );
    let multi = MultiProvider::builder()
        .provider(first.clone())
        .provider(second.clone())
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    assert!(flags.client().get_boolean_value("flag", false, None, None).await);

    assert!(first.last_context().unwrap().get("leaked").is_some());
    assert!(second.last_context().unwrap().get("leaked").is_none());
}

#[tokio::test]
async fn test_initialization_failure_degrades_aggregate_status() {
    let broken = Arc::new(
        ScriptedProvider::new("broken")
            .with_initialization(Err(EvaluationError::general("unreachable"))),
    );
    let healthy = Arc::new(
        ScriptedProvider::new("healthy").with_boolean("flag", resolved(true, "on")),
    );
    let multi = MultiProvider::builder()
        .provider(broken.clone())
        .provider(healthy)
        .build()
        .unwrap();
    let flags = FeatureFlags::new();

    assert!(flags.set_provider_and_wait(Arc::new(multi)).await.is_err());
    assert_eq!(flags.provider_status(None), ProviderStatus::Error);
    assert_eq!(broken.init_count(), 1);

    // ERROR does not block evaluation; the broken provider reports the flag
    // missing and the healthy one answers.
    assert!(flags.client().get_boolean_value("flag", false, None, None).await);
}

#[tokio::test]
async fn test_tracking_failures_stay_per_provider() {
    let failing = Arc::new(ScriptedProvider::new("failing").failing_track("collector down"));
    let healthy = Arc::new(ScriptedProvider::new("healthy"));
    let multi = MultiProvider::builder()
        .provider(failing.clone())
        .provider(healthy.clone())
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    flags.client().track("checkout", None, None);

    assert_eq!(failing.tracked(), vec!["checkout"]);
    assert_eq!(healthy.tracked(), vec!["checkout"]);
}

#[tokio::test]
async fn test_close_reaches_every_provider() {
    let first = Arc::new(ScriptedProvider::new("first"));
    let second = Arc::new(ScriptedProvider::new("second"));
    let multi = MultiProvider::builder()
        .provider(first.clone())
        .provider(second.clone())
        .build()
        .unwrap();
    let flags = flags_with(Arc::new(multi)).await;

    flags.close().await;

    assert_eq!(first.close_count(), 1);
    assert_eq!(second.close_count(), 1);
}

#[tokio::test]
async fn test_provider_hooks_share_the_client_evaluation() {
    let client_hook = RecordingHook::named("client");
    let provider_hook = RecordingHook::named("provider");
    let sub = Arc::new(
        ScriptedProvider::new("sub")
            .with_hook(Arc::new(provider_hook.clone()) as SharedHook)
            .with_boolean("flag", resolved(true, "on")),
    );
    let multi = MultiProvider::builder().provider(sub).build().unwrap();
    let flags = FeatureFlags::new();
    flags
        .set_domain_provider_and_wait("checkout", Arc::new(multi))
        .await
        .unwrap();
    let client = flags.domain_client("checkout");
    client.add_hook(client_hook.clone());
    let options = EvaluationOptions::new().hint("request_id", "abc");

    let details = client
        .get_boolean_details("flag", false, None, Some(&options))
        .await;

    assert!(details.value);
    let evaluation_id = client_hook.evaluation_ids()[0];
    let seen = provider_hook.observations();
    assert_eq!(seen.len(), 3);
    for observation in &seen {
        assert_eq!(observation.evaluation_id, evaluation_id);
        assert_eq!(observation.domain.as_deref(), Some("checkout"));
        assert_eq!(
            observation.hints.get("request_id").and_then(|v| v.as_str()),
            Some("abc")
        );
    }
}
