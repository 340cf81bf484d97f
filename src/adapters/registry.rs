//! Explicit name-to-constructor mapping for adapters.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::{Adapter, AdapterConfig, AnthropicAdapter, OpenAiAdapter};
use crate::error::AdapterError;

/// Builds an adapter from its configuration.
pub type AdapterConstructor =
    Arc<dyn Fn(AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> + Send + Sync>;

/// Descriptive information about a registered adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterInfo {
    pub name: String,
    pub description: String,
    pub supports_tools: bool,
    pub supports_streaming: bool,
    /// Model used when the caller does not name one.
    pub default_model: Option<String>,
}

impl AdapterInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            supports_tools: true,
            supports_streaming: false,
            default_model: None,
        }
    }

    pub fn with_tools(mut self, supported: bool) -> Self {
        self.supports_tools = supported;
        self
    }

    pub fn with_streaming(mut self, supported: bool) -> Self {
        self.supports_streaming = supported;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

fn create_anthropic(config: AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> {
    Ok(Arc::new(AnthropicAdapter::new(config)?))
}

fn create_openai(config: AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> {
    Ok(Arc::new(OpenAiAdapter::new(config)?))
}

struct Entry {
    info: AdapterInfo,
    constructor: AdapterConstructor,
}

/// Registry of adapter constructors keyed by name.
///
/// Registration is explicit; unknown names fail before any task runs.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: BTreeMap<String, Entry>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the `anthropic` and `openai` adapters.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let builtin: [(AdapterInfo, AdapterConstructor); 2] = [
            (
                AdapterInfo::new("anthropic", "Anthropic Claude adapter with tool support")
                    .with_streaming(true)
                    .with_default_model(super::anthropic::DEFAULT_ANTHROPIC_MODEL),
                Arc::new(create_anthropic),
            ),
            (
                AdapterInfo::new("openai", "OpenAI GPT adapter with function calling support")
                    .with_streaming(true)
                    .with_default_model(super::openai::DEFAULT_OPENAI_MODEL),
                Arc::new(create_openai),
            ),
        ];

        for (info, constructor) in builtin {
            registry.entries.insert(info.name.clone(), Entry { info, constructor });
        }
        registry
    }

    /// Registers a constructor. Names must be unique.
    pub fn register(
        &mut self,
        info: AdapterInfo,
        constructor: AdapterConstructor,
    ) -> Result<(), AdapterError> {
        if self.entries.contains_key(&info.name) {
            return Err(AdapterError::DuplicateAdapter(info.name));
        }
        self.entries
            .insert(info.name.clone(), Entry { info, constructor });
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), AdapterError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| self.unknown(name))
    }

    /// Instantiates the named adapter.
    pub fn create(
        &self,
        name: &str,
        config: AdapterConfig,
    ) -> Result<Arc<dyn Adapter>, AdapterError> {
        let entry = self.entries.get(name).ok_or_else(|| self.unknown(name))?;
        (entry.constructor)(config)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn info(&self, name: &str) -> Result<&AdapterInfo, AdapterError> {
        self.entries
            .get(name)
            .map(|e| &e.info)
            .ok_or_else(|| self.unknown(name))
    }

    pub fn all_info(&self) -> Vec<&AdapterInfo> {
        self.entries.values().map(|e| &e.info).collect()
    }

    fn unknown(&self, name: &str) -> AdapterError {
        AdapterError::UnknownAdapter {
            name: name.to_string(),
            available: self.list().join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_adapters() {
        let registry = AdapterRegistry::with_builtin();
        assert_eq!(registry.list(), vec!["anthropic", "openai"]);
        assert!(registry.is_registered("openai"));

        let info = registry.info("anthropic").unwrap();
        assert!(info.supports_tools);
        assert!(info.supports_streaming);
        assert!(registry.info("openai").unwrap().supports_streaming);
        assert_eq!(
            info.default_model.as_deref(),
            Some("claude-3-5-sonnet-20241022")
        );
    }

    #[test]
    fn test_create_adapter() {
        let registry = AdapterRegistry::with_builtin();
        let adapter = registry
            .create(
                "openai",
                AdapterConfig::new().with_api_key("k").with_model("gpt-4o-mini"),
            )
            .unwrap();
        assert_eq!(adapter.name(), "openai/gpt-4o-mini");
    }

    #[test]
    fn test_unknown_adapter_lists_available() {
        let registry = AdapterRegistry::with_builtin();
        let err = registry
            .create("mistral", AdapterConfig::new())
            .err()
            .unwrap();
        let message = err.to_string();
        assert!(message.contains("mistral"));
        assert!(message.contains("anthropic, openai"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = AdapterRegistry::with_builtin();
        let err = registry
            .register(
                AdapterInfo::new("openai", "again"),
                Arc::new(create_openai),
            )
            .unwrap_err();
        assert!(matches!(err, AdapterError::DuplicateAdapter(ref n) if n == "openai"));
    }

    #[test]
    fn test_unregister() {
        let mut registry = AdapterRegistry::with_builtin();
        registry.unregister("openai").unwrap();
        assert_eq!(registry.list(), vec!["anthropic"]);
        assert!(registry.unregister("openai").is_err());
    }
}
