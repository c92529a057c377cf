//! Provider readiness states.

use crate::events::ProviderEventKind;
use std::fmt;

/// A provider's readiness or health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ProviderStatus {
    /// Registered, `initialize` has not settled.
    #[default]
    NotReady,
    /// Usable.
    Ready,
    /// Initialization failed or the provider reported an error; may recover.
    Error,
    /// Serving possibly outdated values.
    Stale,
    /// Irrecoverable.
    Fatal,
    /// Reconciling with a new context.
    Reconciling,
}

impl ProviderStatus {
    /// Aggregation priority: the highest-priority status of a set wins.
    ///
    /// `FATAL > NOT_READY > ERROR > STALE > RECONCILING > READY`.
    pub const fn precedence(self) -> u8 {
        match self {
            ProviderStatus::Fatal => 5,
            ProviderStatus::NotReady => 4,
            ProviderStatus::Error => 3,
            ProviderStatus::Stale => 2,
            ProviderStatus::Reconciling => 1,
            ProviderStatus::Ready => 0,
        }
    }

    /// Reduces a set of statuses to one. An empty set is `NOT_READY`.
    pub fn aggregate<I: IntoIterator<Item = ProviderStatus>>(statuses: I) -> ProviderStatus {
        statuses
            .into_iter()
            .max_by_key(|status| status.precedence())
            .unwrap_or(ProviderStatus::NotReady)
    }

    /// Whether evaluation must be short-circuited for this status.
    pub const fn blocks_evaluation(self) -> bool {
        matches!(self, ProviderStatus::NotReady | ProviderStatus::Fatal)
    }

    /// Whether a handler for `kind` should run immediately when added in this
    /// status.
    pub fn matches_event(self, kind: ProviderEventKind) -> bool {
        matches!(
            (self, kind),
            (ProviderStatus::Ready, ProviderEventKind::Ready)
                | (ProviderStatus::Error, ProviderEventKind::Error)
                | (ProviderStatus::Fatal, ProviderEventKind::Error)
                | (ProviderStatus::Stale, ProviderEventKind::Stale)
                | (ProviderStatus::Reconciling, ProviderEventKind::Reconciling)
        )
    }

    /// The canonical name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ProviderStatus::NotReady => "NOT_READY",
            ProviderStatus::Ready => "READY",
            ProviderStatus::Error => "ERROR",
            ProviderStatus::Stale => "STALE",
            ProviderStatus::Fatal => "FATAL",
            ProviderStatus::Reconciling => "RECONCILING",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
