// src/env.rs
//! Layered configuration resolution.
//!
//! Lookup order, first non-empty hit wins:
//! 1. runtime-injected values (host platform secrets, handed over at boot),
//! 2. build-time-embedded values (`option_env!` table),
//! 3. process environment.
//!
//! Values are resolved on every call — they are cheap reads and may
//! legitimately differ between invocations on a multi-tenant host, so no
//! per-key memoization. A `RuntimeEnv` is passed by reference into every
//! adapter and cache constructor; there is no process-global slot to set
//! before use.

use std::collections::HashMap;

// --- configuration key names ---
pub const ENV_DOCSTORE_API_KEY: &str = "DOCSTORE_API_KEY";
pub const ENV_DOCSTORE_ARTICLES_DATASET: &str = "DOCSTORE_ARTICLES_DATASET";
pub const ENV_DOCSTORE_PHOTOS_DATASET: &str = "DOCSTORE_PHOTOS_DATASET";
pub const ENV_DOCSTORE_BASE_URL: &str = "DOCSTORE_BASE_URL";
pub const ENV_CHANNEL_FEED_ID: &str = "CHANNEL_FEED_ID";
pub const ENV_CHANNEL_BRIDGE_URL: &str = "CHANNEL_BRIDGE_URL";
pub const ENV_MEDIA_LOG_FEED_URL: &str = "MEDIA_LOG_FEED_URL";
pub const ENV_GENERIC_FEED_URL: &str = "GENERIC_FEED_URL";
pub const ENV_CACHE_DIR: &str = "CACHE_DIR";
pub const ENV_USE_FALLBACK: &str = "USE_FALLBACK";

/// Every key the resolver understands; used to lift host-injected secrets
/// into the injected layer at boot.
pub const KNOWN_KEYS: &[&str] = &[
    ENV_DOCSTORE_API_KEY,
    ENV_DOCSTORE_ARTICLES_DATASET,
    ENV_DOCSTORE_PHOTOS_DATASET,
    ENV_DOCSTORE_BASE_URL,
    ENV_CHANNEL_FEED_ID,
    ENV_CHANNEL_BRIDGE_URL,
    ENV_MEDIA_LOG_FEED_URL,
    ENV_GENERIC_FEED_URL,
    ENV_CACHE_DIR,
    ENV_USE_FALLBACK,
];

/// Request/invocation-scoped configuration context.
#[derive(Debug, Clone, Default)]
pub struct RuntimeEnv {
    injected: HashMap<String, String>,
}

impl RuntimeEnv {
    /// Resolver with no injected layer (local runs, tests).
    pub fn from_process() -> Self {
        Self::default()
    }

    /// Resolver seeded with host-injected values (e.g. platform secrets).
    pub fn with_injected(injected: HashMap<String, String>) -> Self {
        Self { injected }
    }

    /// Resolve a configuration value. Empty strings count as absent.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(v) = self.injected.get(name) {
            if !v.trim().is_empty() {
                return Some(v.clone());
            }
        }
        if let Some(v) = build_time_value(name) {
            if !v.trim().is_empty() {
                return Some(v.to_string());
            }
        }
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Truthy flag resolution: "1", "true", "yes" (case-insensitive).
    pub fn flag(&self, name: &str) -> bool {
        self.resolve(name)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

/// Values baked in at compile time, if any were provided to the build.
fn build_time_value(name: &str) -> Option<&'static str> {
    match name {
        ENV_DOCSTORE_API_KEY => option_env!("DOCSTORE_API_KEY"),
        ENV_DOCSTORE_ARTICLES_DATASET => option_env!("DOCSTORE_ARTICLES_DATASET"),
        ENV_DOCSTORE_PHOTOS_DATASET => option_env!("DOCSTORE_PHOTOS_DATASET"),
        ENV_DOCSTORE_BASE_URL => option_env!("DOCSTORE_BASE_URL"),
        ENV_CHANNEL_FEED_ID => option_env!("CHANNEL_FEED_ID"),
        ENV_CHANNEL_BRIDGE_URL => option_env!("CHANNEL_BRIDGE_URL"),
        ENV_MEDIA_LOG_FEED_URL => option_env!("MEDIA_LOG_FEED_URL"),
        ENV_GENERIC_FEED_URL => option_env!("GENERIC_FEED_URL"),
        ENV_CACHE_DIR => option_env!("CACHE_DIR"),
        ENV_USE_FALLBACK => option_env!("USE_FALLBACK"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_layer_wins_over_process_env() {
        let mut m = HashMap::new();
        m.insert("FEEDAGG_TEST_KEY_A".to_string(), "injected".to_string());
        let env = RuntimeEnv::with_injected(m);
        std::env::set_var("FEEDAGG_TEST_KEY_A", "process");
        assert_eq!(env.resolve("FEEDAGG_TEST_KEY_A").as_deref(), Some("injected"));
        std::env::remove_var("FEEDAGG_TEST_KEY_A");
    }

    #[test]
    fn empty_injected_value_falls_through() {
        let mut m = HashMap::new();
        m.insert("FEEDAGG_TEST_KEY_B".to_string(), "  ".to_string());
        let env = RuntimeEnv::with_injected(m);
        std::env::set_var("FEEDAGG_TEST_KEY_B", "process");
        assert_eq!(env.resolve("FEEDAGG_TEST_KEY_B").as_deref(), Some("process"));
        std::env::remove_var("FEEDAGG_TEST_KEY_B");
    }

    #[test]
    fn absent_key_resolves_to_none() {
        let env = RuntimeEnv::from_process();
        assert_eq!(env.resolve("FEEDAGG_TEST_KEY_MISSING"), None);
    }

    #[test]
    fn flag_parses_truthy_variants() {
        let mut m = HashMap::new();
        m.insert(ENV_USE_FALLBACK.to_string(), "TRUE".to_string());
        let env = RuntimeEnv::with_injected(m);
        assert!(env.flag(ENV_USE_FALLBACK));

        let mut m = HashMap::new();
        m.insert(ENV_USE_FALLBACK.to_string(), "0".to_string());
        let env = RuntimeEnv::with_injected(m);
        assert!(!env.flag(ENV_USE_FALLBACK));
    }
}
