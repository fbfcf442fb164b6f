//! Language Registry - language identifier → evaluator implementation.
//!
//! Reads take a shared lock, writes an exclusive one. Writes are expected at
//! startup and in test setup/teardown only.

use crate::error::{EvalError, Result};
use codegrade_common::Language;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

#[derive(Debug, Default)]
pub struct LanguageRegistry {
    entries: RwLock<HashMap<String, Language>>,
}

impl LanguageRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in evaluators
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for language in Language::all_variants() {
            registry.register(&language.to_string(), *language);
        }
        registry.register("c++", Language::Cpp);
        registry
    }

    /// Map `language_id` to `evaluator`, replacing any existing mapping
    pub fn register(&self, language_id: &str, evaluator: Language) {
        let previous = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(normalize_id(language_id), evaluator);
        if let Some(previous) = previous {
            tracing::debug!(
                language_id = language_id,
                previous = %previous,
                evaluator = %evaluator,
                "language re-registered"
            );
        }
    }

    /// Remove a mapping, returning what it pointed at
    pub fn unregister(&self, language_id: &str) -> Option<Language> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&normalize_id(language_id))
    }

    /// Resolve `language_id`; never falls back to a default evaluator
    pub fn get_class(&self, language_id: &str) -> Result<Language> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&normalize_id(language_id))
            .copied()
            .ok_or_else(|| EvalError::UnknownLanguage(language_id.to_string()))
    }

    /// Registered identifiers, sorted
    pub fn language_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

fn normalize_id(language_id: &str) -> String {
    language_id.trim().to_lowercase()
}

static GLOBAL: OnceLock<Arc<LanguageRegistry>> = OnceLock::new();

/// Initialize the process-wide registry with the built-in evaluators.
/// Later calls are no-ops and hand back the existing instance.
pub fn set_registry() -> Arc<LanguageRegistry> {
    GLOBAL
        .get_or_init(|| Arc::new(LanguageRegistry::with_defaults()))
        .clone()
}

/// The process-wide registry, if [`set_registry`] has run
pub fn get_registry() -> Option<Arc<LanguageRegistry>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_language_fails() {
        let registry = LanguageRegistry::new();
        let err = registry.get_class("unregistered-language").unwrap_err();
        assert!(matches!(err, EvalError::UnknownLanguage(ref id) if id == "unregistered-language"));
    }

    #[test]
    fn test_register_then_lookup() {
        let registry = LanguageRegistry::new();
        registry.register("x", Language::Java);
        assert_eq!(registry.get_class("x").unwrap(), Language::Java);
    }

    #[test]
    fn test_reregister_overwrites() {
        let registry = LanguageRegistry::new();
        registry.register("x", Language::Java);
        registry.register("x", Language::Cpp);
        assert_eq!(registry.get_class("x").unwrap(), Language::Cpp);
    }

    #[test]
    fn test_unregister() {
        let registry = LanguageRegistry::with_defaults();
        assert_eq!(registry.unregister("java"), Some(Language::Java));
        assert!(registry.get_class("java").is_err());
        assert_eq!(registry.unregister("java"), None);
    }

    #[test]
    fn test_defaults_and_case_insensitivity() {
        let registry = LanguageRegistry::with_defaults();
        assert_eq!(registry.get_class("Java").unwrap(), Language::Java);
        assert_eq!(registry.get_class("c++").unwrap(), Language::Cpp);
        assert_eq!(registry.get_class("c").unwrap(), Language::C);
        assert_eq!(registry.language_ids(), vec!["c", "c++", "cpp", "java"]);
    }

    #[test]
    fn test_set_registry_is_idempotent() {
        let first = set_registry();
        let second = set_registry();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(get_registry().is_some());
    }

    #[test]
    fn test_concurrent_reads() {
        let registry = Arc::new(LanguageRegistry::with_defaults());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(registry.get_class("java").unwrap(), Language::Java);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
