//! Entry point bundling the injected configuration and template renderer.

use crate::builders::{self, PrnBuilder, SignatureBuilder, TaperingBuilder};
use crate::config::EngineConfig;
use crate::error::SigResult;
use crate::medication::MedicationProfile;
use crate::strategies::Dispatcher;
use crate::template::{PhraseTemplates, TemplateRenderer};
use std::fmt;
use std::sync::Arc;

/// Cheap to clone; every builder and dispatcher keeps its own handle to the
/// shared, immutable reference data.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> SigResult<Self> {
        Self::with_renderer(config, Arc::new(PhraseTemplates))
    }

    pub fn with_renderer(config: EngineConfig, renderer: Arc<dyn TemplateRenderer>) -> SigResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            renderer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn renderer(&self) -> &dyn TemplateRenderer {
        self.renderer.as_ref()
    }

    /// Builder chosen by the factory from the medication profile.
    pub fn builder_for(&self, medication: Arc<MedicationProfile>) -> SigResult<Box<dyn SignatureBuilder>> {
        builders::create_builder(medication, self)
    }

    pub fn prn_builder_for(&self, medication: Arc<MedicationProfile>) -> SigResult<PrnBuilder> {
        builders::create_prn_builder(medication, self)
    }

    pub fn tapering_builder_for(&self, medication: Arc<MedicationProfile>) -> SigResult<TaperingBuilder> {
        builders::create_tapering_builder(medication, self)
    }

    /// Dispatcher preloaded with the default strategy, catalog rules and the
    /// stock modifiers.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::with_defaults(self)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            config: Arc::new(EngineConfig::default()),
            renderer: Arc::new(PhraseTemplates),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("routes", &self.config.route_codes.routes.len())
            .field("units", &self.config.unit_codes.units.len())
            .field("catalog_rules", &self.config.catalog_rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteTable;

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.route_codes = RouteTable::default();
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
