//! Descriptive metadata about providers and clients.

/// Describes a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderMetadata {
    /// The provider's name.
    pub name: String,
}

impl ProviderMetadata {
    /// Metadata with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Describes a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ClientMetadata {
    /// The domain the client is bound to; `None` for the default scope.
    pub domain: Option<String>,
}

impl ClientMetadata {
    /// Metadata for a client of `domain`.
    pub fn new(domain: Option<String>) -> Self {
        Self { domain }
    }
}
