use std::collections::HashMap;
use std::sync::Arc;

use secops_core::AppConfig;
use thiserror::Error;

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::http_pull::HttpPullCollector;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("collector for integration \"{0}\" is already registered")]
    Duplicate(String),

    #[error("collector integration name must not be empty")]
    EmptyName,

    #[error("failed to build collector: {0}")]
    Build(#[from] CollectorError),
}

/// Lookup table from integration name to its collector.
///
/// Built once at startup and shared read-only with the scheduler.
#[derive(Default, Clone)]
pub struct CollectorRegistry {
    collectors: HashMap<String, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collector under the name it reports via [`Collector::integration`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken and
    /// [`RegistryError::EmptyName`] when the collector reports an empty name.
    pub fn register(&mut self, collector: Arc<dyn Collector>) -> Result<(), RegistryError> {
        let name = collector.integration().trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.collectors.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.collectors.insert(name, collector);
        Ok(())
    }

    /// One [`HttpPullCollector`] per name in `SECOPS_HTTP_PULL_INTEGRATIONS`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if a collector cannot be built or a name
    /// repeats.
    pub fn from_config(config: &AppConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for integration in &config.http_pull_integrations {
            let collector = HttpPullCollector::new(
                integration.as_str(),
                config.collector_request_timeout_secs,
                &config.collector_user_agent,
            )?;
            registry.register(Arc::new(collector))?;
        }
        Ok(registry)
    }

    #[must_use]
    pub fn get(&self, integration: &str) -> Option<Arc<dyn Collector>> {
        self.collectors
            .get(&integration.to_ascii_lowercase())
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, integration: &str) -> bool {
        self.collectors
            .contains_key(&integration.to_ascii_lowercase())
    }

    /// Registered integration names, sorted.
    #[must_use]
    pub fn integrations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collectors.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("integrations", &self.integrations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use secops_core::NormalizedRecord;

    use super::*;
    use crate::collector::CollectRequest;
    use crate::error::CollectorError;

    struct Named(&'static str);

    #[async_trait]
    impl Collector for Named {
        fn integration(&self) -> &str {
            self.0
        }

        async fn fetch(
            &self,
            _request: &CollectRequest,
        ) -> Result<Vec<NormalizedRecord>, CollectorError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn register_and_lookup_is_case_insensitive() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(Named("Duo"))).unwrap();
        assert!(registry.contains("duo"));
        assert!(registry.contains("DUO"));
        assert!(registry.get("duo").is_some());
        assert!(registry.get("cato").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(Named("duo"))).unwrap();
        let err = registry.register(Arc::new(Named("duo"))).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("duo".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = CollectorRegistry::new();
        assert_eq!(
            registry.register(Arc::new(Named("  "))).unwrap_err(),
            RegistryError::EmptyName
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn integrations_are_sorted() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(Named("duo"))).unwrap();
        registry.register(Arc::new(Named("cato"))).unwrap();
        registry.register(Arc::new(Named("okta"))).unwrap();
        assert_eq!(registry.integrations(), vec!["cato", "duo", "okta"]);
        assert!(format!("{registry:?}").contains("cato"));
    }
}
