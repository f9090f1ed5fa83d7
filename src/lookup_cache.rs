//! Shared cache for external lookups, keyed by normalized postal code or
//! national id. Only successful lookups are stored.
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::fmt;
use std::time::{Duration, Instant};

use crate::cache_validator::ValidatedCacheEntry;

/// Cache key for one lookup kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    PostalCode(String),
    NationalId(String),
}

impl LookupKey {
    pub fn cache_key(&self) -> String {
        match self {
            LookupKey::PostalCode(cep) => format!("cep:{}", cep),
            LookupKey::NationalId(id) => format!("cnpj:{}", id),
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Storage for lookup payloads (JSON text) with a per-entry TTL.
#[async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &LookupKey) -> Option<String>;
    async fn put(&self, key: &LookupKey, payload: String, ttl: Duration);
}

#[derive(Clone)]
struct CachedLookup {
    stored: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedLookup> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedLookup,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedLookup,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by moka, with checksummed entries.
pub struct MokaLookupCache {
    inner: Cache<String, CachedLookup>,
}

impl MokaLookupCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl LookupCache for MokaLookupCache {
    async fn get(&self, key: &LookupKey) -> Option<String> {
        let entry = self.inner.get(&key.cache_key()).await?;
        let payload = ValidatedCacheEntry::deserialize_and_validate(&entry.stored);
        if payload.is_none() {
            self.inner.invalidate(&key.cache_key()).await;
        }
        payload
    }

    async fn put(&self, key: &LookupKey, payload: String, ttl: Duration) {
        let stored = ValidatedCacheEntry::new(payload).serialize();
        self.inner
            .insert(key.cache_key(), CachedLookup { stored, ttl })
            .await;
        tracing::debug!("Cached lookup {} for {:?}", key, ttl);
    }
}
