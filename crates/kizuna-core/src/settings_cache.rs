//! TTL-cached settings holder.
//!
//! An explicit `{value, expires_at}` struct injected where it is needed,
//! so tests control time instead of fighting a module-level global.

use std::sync::Arc;

use tokio::sync::RwLock;

use kizuna_types::settings::RuntimeSettings;

/// One cached snapshot with its expiry instant (unix ms).
#[derive(Debug, Clone)]
pub struct CachedSettings {
    pub value: RuntimeSettings,
    pub expires_at: i64,
}

impl CachedSettings {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Shared handle over the current settings snapshot.
///
/// Readers get a cheap clone of the snapshot; a refresher task (or an
/// admin endpoint) replaces it when the TTL lapses.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<CachedSettings>>,
    ttl_ms: i64,
}

impl SettingsHandle {
    pub fn new(value: RuntimeSettings, now: i64, ttl_ms: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CachedSettings {
                value,
                expires_at: now + ttl_ms,
            })),
            ttl_ms,
        }
    }

    /// Current snapshot, regardless of expiry.
    pub async fn current(&self) -> RuntimeSettings {
        self.inner.read().await.value.clone()
    }

    /// Whether the snapshot has lapsed at `now`.
    pub async fn is_expired(&self, now: i64) -> bool {
        self.inner.read().await.is_expired(now)
    }

    /// Replace the snapshot and restart its TTL from `now`.
    pub async fn replace(&self, value: RuntimeSettings, now: i64) {
        let mut guard = self.inner.write().await;
        *guard = CachedSettings {
            value,
            expires_at: now + self.ttl_ms,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_settings_expiry() {
        let cached = CachedSettings {
            value: RuntimeSettings::default(),
            expires_at: 1_000,
        };
        assert!(!cached.is_expired(999));
        assert!(cached.is_expired(1_000));
        assert!(cached.is_expired(2_000));
    }

    #[tokio::test]
    async fn test_handle_replace_restarts_ttl() {
        let handle = SettingsHandle::new(RuntimeSettings::default(), 0, 1_500);
        assert!(!handle.is_expired(1_000).await);
        assert!(handle.is_expired(1_500).await);

        let mut updated = RuntimeSettings::default();
        updated.agent.max_tokens = 512;
        handle.replace(updated, 2_000).await;

        assert!(!handle.is_expired(3_000).await);
        assert_eq!(handle.current().await.agent.max_tokens, 512);
    }
}
