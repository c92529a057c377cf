//! Provider entries and their naming.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};
use vexil_core::{ConfigError, SharedProvider};

/// A provider registration inside a [`MultiProvider`](super::MultiProvider).
#[derive(Clone)]
pub struct ProviderEntry {
    name: Option<String>,
    provider: SharedProvider,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("provider", &self.provider.metadata().name)
            .finish()
    }
}

impl ProviderEntry {
    /// An entry named after the provider's metadata.
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            name: None,
            provider,
        }
    }

    /// An entry with an explicit name.
    pub fn named(name: impl Into<String>, provider: SharedProvider) -> Self {
        Self {
            name: Some(name.into()),
            provider,
        }
    }
}

impl From<SharedProvider> for ProviderEntry {
    fn from(provider: SharedProvider) -> Self {
        Self::new(provider)
    }
}

/// An entry with its final, unique name.
#[derive(Clone)]
pub(crate) struct NamedProvider {
    pub(crate) name: String,
    pub(crate) provider: SharedProvider,
}

/// Assigns unique names, keeping registration order.
///
/// Unnamed entries take the provider's metadata name; when several unnamed
/// entries share a metadata name they become `name-1`, `name-2`, ... Explicit
/// names must be unique and must not collide with a generated name.
pub(crate) fn assign_names(entries: Vec<ProviderEntry>) -> Result<Vec<NamedProvider>, ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::NoProviders);
    }

    let mut unnamed: HashMap<String, usize> = HashMap::new();
    for entry in entries.iter().filter(|e| e.name.is_none()) {
        *unnamed.entry(entry.provider.metadata().name).or_default() += 1;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut named = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = match entry.name {
            Some(name) => name,
            None => {
                let base = entry.provider.metadata().name;
                if unnamed.get(&base).copied().unwrap_or_default() > 1 {
                    let index = seen.entry(base.clone()).or_default();
                    *index += 1;
                    format!("{base}-{index}")
                } else {
                    base
                }
            }
        };
        if !taken.insert(name.clone()) {
            return Err(ConfigError::DuplicateProviderName(name));
        }
        named.push(NamedProvider {
            name,
            provider: entry.provider,
        });
    }
    Ok(named)
}
