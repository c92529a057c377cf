#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use vexil::{
    Client, EvaluationError, EventDetails, FeatureFlags, ProviderEventKind, ResolutionDetails,
    SharedProvider, Subscription,
};

// ============================================================================
// Event Recording
// ============================================================================

/// `(kind, provider name, domain)` per received event, in order.
pub type EventLog = Arc<Mutex<Vec<(ProviderEventKind, String, Option<String>)>>>;

pub fn new_log() -> EventLog {
    Arc::default()
}

pub fn recorder(
    log: &EventLog,
    kind: ProviderEventKind,
) -> Arc<dyn Fn(&EventDetails) + Send + Sync> {
    let log = log.clone();
    Arc::new(move |details: &EventDetails| {
        log.lock().unwrap().push((
            kind,
            details.provider_name.clone(),
            details.domain.clone(),
        ));
    })
}

pub fn record_client(client: &Client, log: &EventLog, kind: ProviderEventKind) -> Subscription {
    client.add_handler(kind, recorder(log, kind))
}

pub fn record_api(flags: &FeatureFlags, log: &EventLog, kind: ProviderEventKind) -> Subscription {
    flags.add_handler(kind, recorder(log, kind))
}

pub fn kinds(log: &EventLog) -> Vec<ProviderEventKind> {
    log.lock().unwrap().iter().map(|(kind, _, _)| *kind).collect()
}

// ============================================================================
// Setup Helpers
// ============================================================================

pub async fn flags_with(provider: SharedProvider) -> FeatureFlags {
    let flags = FeatureFlags::new();
    flags.set_provider_and_wait(provider).await.unwrap();
    flags
}

pub fn resolved<T>(value: T, variant: &str) -> Result<ResolutionDetails<T>, EvaluationError> {
    Ok(ResolutionDetails::new(value).variant(variant))
}
