//! Identifier normalization
//!
//! Every name comparison in the connector goes through [`Normalizer`], which
//! is the only place a [`CanonicalName`] can be produced.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::ConnectorResult;

pub mod hierarchical;

pub use hierarchical::{HierarchicalName, HierarchicalNaming};

/// Name-parsing facility of the directory
pub trait NamingService: Send + Sync {
    fn parse(&self, raw: &str) -> ConnectorResult<HierarchicalName>;
}

/// A name in canonical rendering.
///
/// Equality and hashing ignore case, matching how the directory compares
/// names.
#[derive(Debug, Clone)]
pub struct CanonicalName(String);

impl CanonicalName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn folded(&self) -> String {
        self.0.to_lowercase()
    }
}

impl PartialEq for CanonicalName {
    fn eq(&self, other: &Self) -> bool {
        self.folded() == other.folded()
    }
}

impl Eq for CanonicalName {}

impl Hash for CanonicalName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded().hash(state);
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct Normalizer {
    naming: Arc<dyn NamingService>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(HierarchicalNaming))
    }
}

impl Normalizer {
    pub fn new(naming: Arc<dyn NamingService>) -> Self {
        Self { naming }
    }

    pub fn canonicalize(&self, raw: &str) -> ConnectorResult<CanonicalName> {
        Ok(CanonicalName(self.naming.parse(raw)?.canonical()))
    }

    pub fn canonicalize_all<S: AsRef<str>>(&self, raws: &[S]) -> ConnectorResult<Vec<CanonicalName>> {
        raws.iter().map(|raw| self.canonicalize(raw.as_ref())).collect()
    }

    pub fn abbreviate(&self, raw: &str) -> ConnectorResult<String> {
        Ok(self.naming.parse(raw)?.abbreviated())
    }

    pub fn common_name(&self, raw: &str) -> ConnectorResult<String> {
        Ok(self.naming.parse(raw)?.common)
    }

    /// Organizational units joined with `\`, nearest unit first
    pub fn organizational_unit(&self, raw: &str) -> ConnectorResult<String> {
        Ok(self.naming.parse(raw)?.org_unit())
    }

    /// Organization component, empty for flat names
    pub fn organization(&self, raw: &str) -> ConnectorResult<String> {
        Ok(self.naming.parse(raw)?.organization.unwrap_or_default())
    }

    /// Whether a stored name refers to `name`.
    ///
    /// Stored values that no longer parse are compared as they are.
    pub fn refers_to(&self, stored: &str, name: &CanonicalName) -> bool {
        match self.canonicalize(stored) {
            Ok(canonical) => &canonical == name,
            Err(_) => stored.trim().to_lowercase() == name.folded(),
        }
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}
