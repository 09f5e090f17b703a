use std::collections::HashSet;

use vigil_core::error::VigilError;
use vigil_core::types::EndpointId;

/// Read access to the set of protected endpoints.
pub trait WhitelistSource {
    fn is_listed(&self, endpoint: &EndpointId) -> Result<bool, VigilError>;
}

/// In-memory whitelist, used by tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct WhitelistSet {
    entries: HashSet<EndpointId>,
}

impl WhitelistSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the set changed.
    pub fn add(&mut self, endpoint: EndpointId) -> bool {
        self.entries.insert(endpoint)
    }

    /// Returns true if the set changed.
    pub fn remove(&mut self, endpoint: &EndpointId) -> bool {
        self.entries.remove(endpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for WhitelistSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(EndpointId::from).collect(),
        }
    }
}

impl WhitelistSource for WhitelistSet {
    fn is_listed(&self, endpoint: &EndpointId) -> Result<bool, VigilError> {
        Ok(self.entries.contains(endpoint))
    }
}

/// Veto in front of every path that can touch a profile or a verdict.
pub struct WhitelistGuard<'a, S: WhitelistSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: WhitelistSource + ?Sized> WhitelistGuard<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn is_protected(&self, endpoint: &EndpointId) -> Result<bool, VigilError> {
        self.source.is_listed(endpoint)
    }

    /// Fail with `ProtectedEndpoint` if `endpoint` is listed.
    pub fn ensure_unprotected(&self, endpoint: &EndpointId) -> Result<(), VigilError> {
        if self.is_protected(endpoint)? {
            return Err(VigilError::ProtectedEndpoint(endpoint.to_string()));
        }
        Ok(())
    }

    /// Check a batch, rejecting it on the first listed entry.
    pub fn ensure_none_protected<'e>(
        &self,
        endpoints: impl IntoIterator<Item = &'e EndpointId>,
    ) -> Result<(), VigilError> {
        for e in endpoints {
            self.ensure_unprotected(e)?;
        }
        Ok(())
    }
}
