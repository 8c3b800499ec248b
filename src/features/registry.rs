//! Extractor lookup by name.

use std::collections::HashMap;

use super::extractors::{ChineseHubert, ChineseHubertSoft, EnsembleHubert};
use super::FeatureExtractor;
use crate::config::ExtractorConfig;
use crate::{Error, ExecutionContext, Result};

/// Builds an extractor from its config.
pub type ExtractorFactory =
    fn(&ExtractorConfig, &ExecutionContext) -> Result<Box<dyn FeatureExtractor>>;

/// Name -> factory table.
#[derive(Default)]
pub struct ExtractorRegistry {
    factories: HashMap<&'static str, ExtractorFactory>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `ChineseHubertSoft`, `ChineseHubert` and
    /// `EnsembleHubert`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ChineseHubertSoft", build_soft);
        registry.register("ChineseHubert", build_hubert);
        registry.register("EnsembleHubert", build_ensemble);
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, name: &'static str, factory: ExtractorFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build the extractor `config` selects.
    pub fn build(
        &self,
        config: &ExtractorConfig,
        ctx: &ExecutionContext,
    ) -> Result<Box<dyn FeatureExtractor>> {
        let factory = self.lookup(config.key())?;
        tracing::info!(extractor = config.key(), "Building feature extractor");
        factory(config, ctx)
    }

    /// Build `name` with its default parameters.
    pub fn build_default(
        &self,
        name: &str,
        ctx: &ExecutionContext,
    ) -> Result<Box<dyn FeatureExtractor>> {
        self.lookup(name)?;
        let config = ExtractorConfig::default_for(name).ok_or_else(|| {
            Error::Config(format!("extractor '{name}' has no default parameters"))
        })?;
        self.build(&config, ctx)
    }

    fn lookup(&self, name: &str) -> Result<ExtractorFactory> {
        self.factories.get(name).copied().ok_or_else(|| {
            Error::Config(format!(
                "unknown extractor '{name}'. Registered: {}",
                self.names().join(", ")
            ))
        })
    }
}

fn mismatch(expected: &str, config: &ExtractorConfig) -> Error {
    Error::Config(format!(
        "factory for {expected} received a {} config",
        config.key()
    ))
}

fn build_soft(
    config: &ExtractorConfig,
    ctx: &ExecutionContext,
) -> Result<Box<dyn FeatureExtractor>> {
    match config {
        ExtractorConfig::ChineseHubertSoft(options) => {
            Ok(Box::new(ChineseHubertSoft::new(options, ctx)?))
        }
        other => Err(mismatch("ChineseHubertSoft", other)),
    }
}

fn build_hubert(
    config: &ExtractorConfig,
    ctx: &ExecutionContext,
) -> Result<Box<dyn FeatureExtractor>> {
    match config {
        ExtractorConfig::ChineseHubert(options) => Ok(Box::new(ChineseHubert::new(options, ctx)?)),
        other => Err(mismatch("ChineseHubert", other)),
    }
}

fn build_ensemble(
    config: &ExtractorConfig,
    ctx: &ExecutionContext,
) -> Result<Box<dyn FeatureExtractor>> {
    match config {
        ExtractorConfig::EnsembleHubert(options) => {
            Ok(Box::new(EnsembleHubert::new(options, ctx)?))
        }
        other => Err(mismatch("EnsembleHubert", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChineseHubertOptions, EnsembleHubertOptions};

    #[test]
    fn test_builtins_registered() {
        let registry = ExtractorRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["ChineseHubert", "ChineseHubertSoft", "EnsembleHubert"]
        );
        assert!(registry.contains("EnsembleHubert"));
        assert!(!registry.contains("ContentVec"));
    }

    #[test]
    fn test_unknown_name() {
        let registry = ExtractorRegistry::with_builtins();
        match registry.build_default("ContentVec", &ExecutionContext::cpu()) {
            Err(Error::Config(msg)) => assert!(msg.contains("ContentVec")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_empty_registry_rejects_known_config() {
        let registry = ExtractorRegistry::new();
        let config = ExtractorConfig::ChineseHubert(ChineseHubertOptions::default());
        assert!(matches!(
            registry.build(&config, &ExecutionContext::cpu()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_build_propagates_construction_errors() {
        let registry = ExtractorRegistry::with_builtins();
        let config = ExtractorConfig::EnsembleHubert(EnsembleHubertOptions {
            models: Vec::new(),
            downsample: None,
        });
        assert!(matches!(
            registry.build(&config, &ExecutionContext::cpu()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_factory_variant_mismatch() {
        let config = ExtractorConfig::ChineseHubert(ChineseHubertOptions::default());
        assert!(matches!(
            build_ensemble(&config, &ExecutionContext::cpu()),
            Err(Error::Config(_))
        ));
    }
}
