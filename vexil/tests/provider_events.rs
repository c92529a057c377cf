use std::sync::Arc;
use vexil::{
    ErrorCode, EvaluationContext, EvaluationError, EventDetails, FeatureFlags, ProviderEventKind,
    ProviderStatus,
    providers::{InMemoryFlag, InMemoryProvider},
    testing::ScriptedProvider,
};

mod common;
use common::{flags_with, kinds, new_log, record_api, record_client};

#[tokio::test]
async fn test_ready_handler_fires_immediately_when_already_ready() {
    let flags = flags_with(Arc::new(ScriptedProvider::new("ready"))).await;
    let log = new_log();

    record_client(&flags.client(), &log, ProviderEventKind::Ready);
    record_client(&flags.client(), &log, ProviderEventKind::Error);

    assert_eq!(kinds(&log), vec![ProviderEventKind::Ready]);
    assert_eq!(log.lock().unwrap()[0].1, "ready");
}

#[tokio::test]
async fn test_handlers_follow_provider_swaps() {
    let old = Arc::new(ScriptedProvider::new("old"));
    let new = Arc::new(ScriptedProvider::new("new"));
    let flags = flags_with(old.clone()).await;
    let client = flags.domain_client("checkout");
    let log = new_log();
    record_client(&client, &log, ProviderEventKind::Stale);

    flags
        .set_domain_provider_and_wait("checkout", new.clone())
        .await
        .unwrap();
    old.emit(ProviderEventKind::Stale);
    new.emit(ProviderEventKind::Stale);

    let events = log.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![(
            ProviderEventKind::Stale,
            "new".to_string(),
            Some("checkout".to_string())
        )]
    );
    assert_eq!(client.provider_status(), ProviderStatus::Stale);
}

#[tokio::test]
async fn test_ready_fires_for_replacement_after_initialization() {
    let flags = FeatureFlags::new();
    let client = flags.client();
    let log = new_log();
    // The no-op provider is already ready.
    record_client(&client, &log, ProviderEventKind::Ready);

    let (provider, gate) = ScriptedProvider::new("slow")
        .announcing_ready()
        .with_initialization_gate();
    let transition = flags.set_provider(Arc::new(provider));
    assert_eq!(kinds(&log).len(), 1);

    gate.open();
    transition.await.unwrap();

    // One ready for the replacement, announced by the provider and the
    // initialization alike.
    let events = log.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].1, "slow");
}

#[tokio::test]
async fn test_initialization_error_is_announced() {
    let flags = FeatureFlags::new();
    let log = new_log();
    record_api(&flags, &log, ProviderEventKind::Error);

    let provider = ScriptedProvider::new("broken")
        .with_initialization(Err(EvaluationError::general("no credentials")));
    assert!(flags.set_domain_provider_and_wait("ops", Arc::new(provider)).await.is_err());

    assert_eq!(
        log.lock().unwrap().clone(),
        vec![(
            ProviderEventKind::Error,
            "broken".to_string(),
            Some("ops".to_string())
        )]
    );
    assert_eq!(flags.provider_status(Some("ops")), ProviderStatus::Error);
}

#[tokio::test]
async fn test_cancelled_subscription_is_removed_once() {
    let provider = Arc::new(ScriptedProvider::new("p"));
    let flags = flags_with(provider.clone()).await;
    let client = flags.client();
    let log = new_log();
    let subscription = record_client(&client, &log, ProviderEventKind::Stale);
    let kept = record_client(&client, &log, ProviderEventKind::Stale);
    assert_eq!(client.handlers(ProviderEventKind::Stale).len(), 2);

    assert!(subscription.cancel());
    assert!(!subscription.cancel());
    assert!(!client.remove_handler(&subscription));
    provider.emit(ProviderEventKind::Stale);

    assert_eq!(kinds(&log), vec![ProviderEventKind::Stale]);
    assert!(kept.is_active());
    assert_eq!(client.handlers(ProviderEventKind::Stale).len(), 1);
}

#[tokio::test]
async fn test_unbound_domain_hears_default_scope() {
    let provider = Arc::new(ScriptedProvider::new("default"));
    let flags = flags_with(provider.clone()).await;
    let log = new_log();
    record_client(&flags.domain_client("unbound"), &log, ProviderEventKind::ConfigurationChanged);

    provider.emit_details(
        ProviderEventKind::ConfigurationChanged,
        EventDetails::for_provider("default").flags_changed(["a", "b"]),
    );

    assert_eq!(kinds(&log), vec![ProviderEventKind::ConfigurationChanged]);
}

#[tokio::test]
async fn test_configuration_changes_from_in_memory_provider() {
    let provider = Arc::new(InMemoryProvider::new([("flag", InMemoryFlag::toggle(false))]));
    let flags = flags_with(provider.clone()).await;
    let changed = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = changed.clone();
    flags.client().add_handler(
        ProviderEventKind::ConfigurationChanged,
        Arc::new(move |details: &EventDetails| {
            sink.lock().unwrap().extend(details.flags_changed.clone());
        }),
    );

    provider.put_configuration([("flag", InMemoryFlag::toggle(true))]);

    assert_eq!(*changed.lock().unwrap(), vec!["flag"]);
    assert!(flags.client().get_boolean_value("flag", false, None, None).await);
}

#[tokio::test]
async fn test_fatal_error_event() {
    let provider = Arc::new(ScriptedProvider::new("p"));
    let flags = flags_with(provider.clone()).await;

    provider.emit_details(
        ProviderEventKind::Error,
        EventDetails::for_provider("p").error_code(ErrorCode::ProviderFatal),
    );
    assert_eq!(flags.provider_status(None), ProviderStatus::Fatal);

    // A late error handler fires at once for a fatal provider.
    let log = new_log();
    record_client(&flags.client(), &log, ProviderEventKind::Error);
    assert_eq!(kinds(&log), vec![ProviderEventKind::Error]);
}

#[tokio::test]
async fn test_shared_provider_closed_when_unreferenced() {
    let shared = Arc::new(ScriptedProvider::new("shared").with_initialization(Ok(())));
    let flags = flags_with(shared.clone()).await;
    flags
        .set_domain_provider_and_wait("billing", shared.clone())
        .await
        .unwrap();
    assert_eq!(shared.init_count(), 1);
    assert_eq!(flags.provider_status(Some("billing")), ProviderStatus::Ready);

    flags
        .set_provider_and_wait(Arc::new(ScriptedProvider::new("other")))
        .await
        .unwrap();
    assert_eq!(shared.close_count(), 0);

    flags
        .set_domain_provider_and_wait("billing", Arc::new(ScriptedProvider::new("other")))
        .await
        .unwrap();
    assert_eq!(shared.close_count(), 1);
}

#[tokio::test]
async fn test_setting_same_provider_is_a_noop() {
    let provider = Arc::new(ScriptedProvider::new("p").with_initialization(Ok(())));
    let flags = flags_with(provider.clone()).await;

    flags.set_provider_and_wait(provider.clone()).await.unwrap();

    assert_eq!(provider.init_count(), 1);
    assert_eq!(provider.close_count(), 0);
}

#[tokio::test]
async fn test_context_change_reconciles_providers() {
    let provider = Arc::new(ScriptedProvider::new("p"));
    let flags = flags_with(provider.clone()).await;
    let log = new_log();
    let client = flags.client();
    record_client(&client, &log, ProviderEventKind::Reconciling);
    record_client(&client, &log, ProviderEventKind::ContextChanged);

    let reconciliation =
        flags.set_context(EvaluationContext::new().with_targeting_key("user-1"));
    assert_eq!(client.provider_status(), ProviderStatus::Reconciling);
    reconciliation.await;

    assert_eq!(
        kinds(&log),
        vec![ProviderEventKind::Reconciling, ProviderEventKind::ContextChanged]
    );
    assert_eq!(client.provider_status(), ProviderStatus::Ready);
    assert_eq!(provider.context_change_count(), 1);
    assert_eq!(flags.context().targeting_key(), Some("user-1"));
}

#[tokio::test]
async fn test_failed_context_change_moves_to_error() {
    let provider = Arc::new(
        ScriptedProvider::new("p").failing_context_change(EvaluationError::general("stale cache")),
    );
    let flags = flags_with(provider).await;
    let log = new_log();
    record_api(&flags, &log, ProviderEventKind::Error);

    flags.set_context(EvaluationContext::new()).await;

    assert_eq!(kinds(&log), vec![ProviderEventKind::Error]);
    assert_eq!(flags.provider_status(None), ProviderStatus::Error);
}

#[tokio::test]
async fn test_close_resets_to_noop() {
    let provider = Arc::new(ScriptedProvider::new("p"));
    let flags = flags_with(provider.clone()).await;
    flags
        .set_domain_provider_and_wait("billing", provider.clone())
        .await
        .unwrap();

    flags.close().await;

    assert_eq!(provider.close_count(), 1);
    assert_eq!(flags.provider_metadata(None).name, "No-op Provider");
    assert_eq!(flags.provider_metadata(Some("billing")).name, "No-op Provider");
    assert_eq!(flags.provider_status(None), ProviderStatus::Ready);
}
