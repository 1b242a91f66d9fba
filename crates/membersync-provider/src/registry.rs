//! Provider registry and static group mapping.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::traits::{DirectoryProvider, GroupMapper};

/// Registered providers keyed by name, with exactly one primary.
///
/// The primary invariant is checked once in [`ProviderRegistryBuilder::build`]
/// so lookups never need to re-validate it.
#[derive(Clone)]
pub struct ProviderRegistry {
    primary_name: String,
    providers: BTreeMap<String, Arc<dyn DirectoryProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("primary_name", &self.primary_name)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create a new registry builder.
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    /// The authoritative provider.
    #[must_use]
    pub fn get_primary_provider(&self) -> Arc<dyn DirectoryProvider> {
        // build() guarantees the primary is present.
        Arc::clone(&self.providers[&self.primary_name])
    }

    /// Name of the authoritative provider.
    #[must_use]
    pub fn get_primary_provider_name(&self) -> &str {
        &self.primary_name
    }

    /// All active providers, primary included, ordered by name.
    #[must_use]
    pub fn get_active_providers(&self) -> &BTreeMap<String, Arc<dyn DirectoryProvider>> {
        &self.providers
    }

    /// Look up a provider by name.
    #[must_use]
    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn DirectoryProvider>> {
        self.providers.get(name).cloned()
    }

    /// Names of every provider except the primary, ordered by name.
    #[must_use]
    pub fn secondary_names(&self) -> Vec<String> {
        self.providers
            .keys()
            .filter(|name| **name != self.primary_name)
            .cloned()
            .collect()
    }

    /// Whether `name` is the primary provider.
    #[must_use]
    pub fn is_primary(&self, name: &str) -> bool {
        self.primary_name == name
    }
}

/// Builder for [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    primary: Vec<Arc<dyn DirectoryProvider>>,
    secondaries: Vec<Arc<dyn DirectoryProvider>>,
}

impl ProviderRegistryBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the primary provider.
    #[must_use]
    pub fn primary(mut self, provider: Arc<dyn DirectoryProvider>) -> Self {
        self.primary.push(provider);
        self
    }

    /// Register a secondary provider.
    #[must_use]
    pub fn secondary(mut self, provider: Arc<dyn DirectoryProvider>) -> Self {
        self.secondaries.push(provider);
        self
    }

    /// Validate and build the registry.
    pub fn build(self) -> Result<ProviderRegistry, RegistryError> {
        let mut primaries = self.primary.into_iter();
        let primary = primaries.next().ok_or(RegistryError::NoPrimary)?;
        if let Some(extra) = primaries.next() {
            return Err(RegistryError::MultiplePrimaries {
                first: primary.name().to_string(),
                second: extra.name().to_string(),
            });
        }

        let primary_name = primary.name().to_string();
        let mut providers: BTreeMap<String, Arc<dyn DirectoryProvider>> = BTreeMap::new();
        providers.insert(primary_name.clone(), primary);

        for provider in self.secondaries {
            let name = provider.name().to_string();
            if providers.contains_key(&name) {
                return Err(RegistryError::DuplicateProvider { name });
            }
            providers.insert(name, provider);
        }

        tracing::debug!(
            primary = %primary_name,
            providers = providers.len(),
            "Provider registry built"
        );

        Ok(ProviderRegistry {
            primary_name,
            providers,
        })
    }
}

/// Group mapper backed by an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticGroupMapper {
    mappings: HashMap<(String, String), String>,
}

impl StaticGroupMapper {
    /// Create an empty mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping from a primary group to a secondary provider's group.
    #[must_use]
    pub fn with_mapping(
        mut self,
        primary_group_id: impl Into<String>,
        secondary_provider: impl Into<String>,
        secondary_group_id: impl Into<String>,
    ) -> Self {
        self.insert(primary_group_id, secondary_provider, secondary_group_id);
        self
    }

    /// Add or replace a mapping.
    pub fn insert(
        &mut self,
        primary_group_id: impl Into<String>,
        secondary_provider: impl Into<String>,
        secondary_group_id: impl Into<String>,
    ) {
        self.mappings.insert(
            (primary_group_id.into(), secondary_provider.into()),
            secondary_group_id.into(),
        );
    }
}

#[async_trait]
impl GroupMapper for StaticGroupMapper {
    async fn map_primary_to_secondary_group(
        &self,
        primary_group_id: &str,
        secondary_provider: &str,
    ) -> Option<String> {
        self.mappings
            .get(&(primary_group_id.to_string(), secondary_provider.to_string()))
            .cloned()
    }
}
