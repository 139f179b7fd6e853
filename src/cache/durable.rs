// src/cache/durable.rs
//! # Durable cache
//! Optional key-value tier storing fully-materialized result sets as JSON
//! envelopes with TTL-based expiration.
//!
//! The tier round-trips through text serialization; typed deserialization
//! on read restores timestamp fields to `DateTime<Utc>` values. Every
//! store failure is caught, logged, and treated as a miss — never
//! propagated to the caller. Absence of the underlying binding (no
//! `CACHE_DIR` configured) is a normal condition in local runs.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::env::{RuntimeEnv, ENV_CACHE_DIR};

/// Storage binding for the durable tier.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Serialized record: payload plus absolute expiry, checked on read.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at: u64,
    payload: serde_json::Value,
}

/// Disk-backed store: one JSON envelope file per logical key.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KvBackend for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading cache entry '{key}'")),
        }
    }

    async fn put(&self, key: &str, value: String, _ttl: Duration) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .context("creating cache directory")?;
        tokio::fs::write(self.path_for(key), value)
            .await
            .with_context(|| format!("writing cache entry '{key}'"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting cache entry '{key}'")),
        }
    }
}

/// Durable tier facade. Cloneable; clones share the backend.
#[derive(Clone)]
pub struct DurableCache {
    backend: Option<Arc<dyn KvBackend>>,
}

impl DurableCache {
    /// Tier without a binding; every operation is a no-op/miss.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Bind to the directory named by `CACHE_DIR`, if configured.
    pub fn from_env(env: &RuntimeEnv) -> Self {
        match env.resolve(ENV_CACHE_DIR) {
            Some(dir) => Self::with_backend(Arc::new(DiskStore::new(dir))),
            None => {
                debug!("no cache binding configured; durable tier disabled");
                Self::disabled()
            }
        }
    }

    /// Whether the underlying store binding exists in this runtime.
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Typed lookup. Expired, corrupt, or failed reads all count as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let raw = match backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = ?e, key, "durable cache read failed; treating as miss");
                return None;
            }
        };

        let env: Envelope = match serde_json::from_str(&raw) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = ?e, key, "durable cache entry corrupt; treating as miss");
                return None;
            }
        };

        if env.expires_at <= now_unix() {
            debug!(key, "durable cache entry expired");
            if let Err(e) = backend.delete(key).await {
                warn!(error = ?e, key, "failed to drop expired cache entry");
            }
            return None;
        }

        match serde_json::from_value(env.payload) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = ?e, key, "durable cache payload shape mismatch; treating as miss");
                None
            }
        }
    }

    /// Best-effort write. Returns whether the store accepted it; a `false`
    /// must never fail the caller's request.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let envelope = Envelope {
            expires_at: now_unix().saturating_add(ttl.as_secs()),
            payload: match serde_json::to_value(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = ?e, key, "durable cache serialize failed");
                    return false;
                }
            },
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = ?e, key, "durable cache envelope serialize failed");
                return false;
            }
        };
        match backend.put(key, raw, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = ?e, key, "durable cache write failed");
                false
            }
        }
    }

    /// Explicit invalidation (cache-busting endpoint).
    pub async fn delete(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.delete(key).await {
            warn!(error = ?e, key, "durable cache delete failed");
        }
    }

    /// Composed read-through: hit returns the cached value; miss runs the
    /// producer, returns its result immediately, and dispatches the
    /// write-back without awaiting it on the response path.
    pub async fn with_cache<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.is_available() {
            return producer().await;
        }

        if let Some(hit) = self.get::<T>(key).await {
            counter!("durable_cache_hits_total").increment(1);
            return Ok(hit);
        }
        counter!("durable_cache_misses_total").increment(1);

        let fresh = producer().await?;

        let this = self.clone();
        let write_key = key.to_string();
        let value = fresh.clone();
        tokio::spawn(async move {
            if this.set(&write_key, &value, ttl).await {
                debug!(key = %write_key, "durable cache write-back complete");
            }
        });

        Ok(fresh)
    }
}

/// Current UNIX time in seconds.
fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
