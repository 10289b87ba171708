//! Shared Capability Handles
//!
//! [`Services`] bundles the read-mostly handles every feature handler needs.
//! Cloning is cheap; clones share the same stores, platform and cache.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::collector::FollowUpCollector;
use crate::config::{
    InteractionSettings, PlatformKind, PlatformSettings, StewardConfig, StorageKind,
    StorageSettings,
};
use crate::error::{StewardError, StewardResult};
use crate::ids::GuildId;
use crate::panel::PanelUpsertEngine;
use crate::platform::{DiscordRestClient, InMemoryPlatform, PlatformClient, PlatformError};
use crate::store::{
    decode_document, BlobStore, Document, DocumentStore, FeatureDocument, FsBlobStore,
    MemoryBlobStore,
};
use crate::threads::ThreadResolver;

/// Settings cache key: `(guild, feature)`
pub type SettingsKey = (GuildId, String);

/// Handles injected into every feature handler
#[derive(Clone)]
pub struct Services {
    /// Document persistence
    pub documents: DocumentStore,
    /// Chat platform
    pub platform: Arc<dyn PlatformClient>,
    /// Panel synchronization
    pub panels: PanelUpsertEngine,
    /// Log thread resolution
    pub threads: ThreadResolver,
    /// Follow-up listening windows
    pub collector: FollowUpCollector,
    /// Cached configuration documents
    pub settings_cache: Arc<TtlCache<SettingsKey, Document>>,
    /// Interaction behavior
    pub interaction: InteractionSettings,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("documents", &self.documents)
            .field("platform", &self.platform.name())
            .field("collector", &self.collector)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// Wire services over explicit backends on the system clock
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        platform: Arc<dyn PlatformClient>,
        config: &StewardConfig,
    ) -> Self {
        Self::with_clock(blobs, platform, config, Arc::new(SystemClock))
    }

    /// Wire services with an explicit cache clock
    pub fn with_clock(
        blobs: Arc<dyn BlobStore>,
        platform: Arc<dyn PlatformClient>,
        config: &StewardConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let documents = DocumentStore::new(blobs);
        Self {
            panels: PanelUpsertEngine::new(documents.clone(), Arc::clone(&platform)),
            threads: ThreadResolver::new(Arc::clone(&platform), config.interaction.thread_policy()),
            documents,
            platform,
            collector: FollowUpCollector::new(),
            settings_cache: Arc::new(TtlCache::with_clock(config.settings_ttl, clock)),
            interaction: config.interaction.clone(),
        }
    }

    /// Wire services from configuration, constructing the configured backends
    ///
    /// # Errors
    ///
    /// Fails when the Discord token variable is unset or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &StewardConfig) -> StewardResult<Self> {
        let blobs = build_blob_store(&config.storage);
        let platform = build_platform(&config.platform)?;
        info!(
            storage = blobs.name(),
            platform = platform.name(),
            "Services initialized"
        );
        Ok(Self::new(blobs, platform, config))
    }

    /// Configuration document for `(guild, feature)`, through the cache
    pub async fn document(&self, guild: &GuildId, feature: &str) -> StewardResult<Document> {
        let key = (guild.clone(), feature.to_string());
        if let Some(doc) = self.settings_cache.get(&key) {
            return Ok(doc);
        }
        let seen = self.settings_cache.generation();
        let doc = self.documents.get_document(guild, feature).await?;
        if !self.settings_cache.fill(key, doc.clone(), seen) {
            debug!(guild_id = %guild, feature, "Settings changed during read, not cached");
        }
        Ok(doc)
    }

    /// Typed configuration, through the cache
    pub async fn load_config<T: FeatureDocument>(&self, guild: &GuildId) -> StewardResult<T> {
        let doc = self.document(guild, T::FEATURE_KEY).await?;
        decode_document(guild, doc)
    }

    /// Typed configuration straight from storage, for read-modify-write
    pub async fn load_config_uncached<T: FeatureDocument>(
        &self,
        guild: &GuildId,
    ) -> StewardResult<T> {
        let doc = self.documents.get_document(guild, T::FEATURE_KEY).await?;
        decode_document(guild, doc)
    }

    /// Write one top-level field and drop the cached copy
    pub async fn set_field(
        &self,
        guild: &GuildId,
        feature: &str,
        field: &str,
        value: Value,
    ) -> StewardResult<Document> {
        let key = (guild.clone(), feature.to_string());
        let result = self.documents.set_field(guild, feature, field, value).await;
        self.settings_cache.invalidate(&key);
        Ok(result?)
    }

    /// Write a typed document wholesale and drop the cached copy
    pub async fn save_config<T: FeatureDocument>(&self, guild: &GuildId, doc: &T) -> StewardResult<()> {
        let key = (guild.clone(), T::FEATURE_KEY.to_string());
        let result = self.documents.save(guild, doc).await;
        self.settings_cache.invalidate(&key);
        result
    }
}

/// Construct the configured blob store
#[must_use]
pub fn build_blob_store(settings: &StorageSettings) -> Arc<dyn BlobStore> {
    match settings.kind {
        StorageKind::Memory => Arc::new(MemoryBlobStore::new()),
        StorageKind::Fs => Arc::new(FsBlobStore::new(settings.root.clone())),
    }
}

/// Construct the configured platform client
///
/// # Errors
///
/// Fails when the Discord token variable is unset or the HTTP client cannot
/// be built.
pub fn build_platform(settings: &PlatformSettings) -> StewardResult<Arc<dyn PlatformClient>> {
    match settings.kind {
        PlatformKind::Memory => Ok(Arc::new(InMemoryPlatform::new())),
        PlatformKind::Discord => {
            let token = std::env::var(&settings.token_env)
                .ok()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| {
                    StewardError::Platform(PlatformError::Forbidden(format!(
                        "bot token variable {} is not set",
                        settings.token_env
                    )))
                })?;
            let client = DiscordRestClient::new(
                settings.api_base.clone(),
                token,
                settings.request_timeout,
            )?;
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn services() -> (Arc<MemoryBlobStore>, Arc<ManualClock>, Services) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let clock = Arc::new(ManualClock::new());
        let mut config = StewardConfig::default();
        config.settings_ttl = Duration::from_secs(30);
        let services = Services::with_clock(
            blobs.clone(),
            Arc::new(InMemoryPlatform::new()),
            &config,
            clock.clone(),
        );
        (blobs, clock, services)
    }

    #[tokio::test]
    async fn test_cached_reads_skip_storage_until_expiry() {
        let (blobs, clock, services) = services();
        let guild = GuildId::from("g");

        services.document(&guild, "settings").await.unwrap();
        // Written behind the cache's back
        services
            .documents
            .set_field(&guild, "settings", "locale", json!("de"))
            .await
            .unwrap();
        assert!(services.document(&guild, "settings").await.unwrap().is_empty());

        clock.advance(Duration::from_secs(30));
        let doc = services.document(&guild, "settings").await.unwrap();
        assert_eq!(doc.get("locale"), Some(&json!("de")));
        assert_eq!(blobs.write_count(), 1);
    }

    #[tokio::test]
    async fn test_set_field_invalidates() {
        let (_, _, services) = services();
        let guild = GuildId::from("g");

        services.document(&guild, "settings").await.unwrap();
        services
            .set_field(&guild, "settings", "locale", json!("fr"))
            .await
            .unwrap();
        let doc = services.document(&guild, "settings").await.unwrap();
        assert_eq!(doc.get("locale"), Some(&json!("fr")));
    }

    /// Parks an armed read after it loaded its bytes until released
    struct HeldRead {
        inner: MemoryBlobStore,
        armed: AtomicBool,
        loaded: Notify,
        release: Notify,
    }

    #[async_trait]
    impl BlobStore for HeldRead {
        fn name(&self) -> &str {
            "held"
        }

        async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
            let bytes = self.inner.read_blob(path).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.loaded.notify_one();
                self.release.notified().await;
            }
            bytes
        }

        async fn write_blob(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
            self.inner.write_blob(path, bytes).await
        }
    }

    #[tokio::test]
    async fn test_slow_miss_does_not_cache_a_pre_write_copy() {
        let store = Arc::new(HeldRead {
            inner: MemoryBlobStore::new(),
            armed: AtomicBool::new(true),
            loaded: Notify::new(),
            release: Notify::new(),
        });
        let services = Services::new(
            store.clone(),
            Arc::new(InMemoryPlatform::new()),
            &StewardConfig::default(),
        );
        let guild = GuildId::from("g");

        let reader = {
            let services = services.clone();
            let guild = guild.clone();
            tokio::spawn(async move { services.document(&guild, "lottery").await })
        };
        store.loaded.notified().await;

        // Written while the reader still holds the old copy
        services
            .set_field(&guild, "lottery", "items", json!(["A", "B"]))
            .await
            .unwrap();
        store.release.notify_one();
        assert!(reader.await.unwrap().unwrap().is_empty());

        let doc = services.document(&guild, "lottery").await.unwrap();
        assert_eq!(doc.get("items"), Some(&json!(["A", "B"])));
    }

    #[tokio::test]
    async fn test_uncached_load_sees_writes_behind_the_cache() {
        let (_, _, services) = services();
        let guild = GuildId::from("g");

        let cached: crate::features::LotteryConfig = services.load_config(&guild).await.unwrap();
        assert!(cached.items.is_empty());
        services
            .documents
            .set_field(&guild, "lottery", "items", json!(["A"]))
            .await
            .unwrap();

        let fresh: crate::features::LotteryConfig =
            services.load_config_uncached(&guild).await.unwrap();
        assert_eq!(fresh.items, vec!["A".to_string()]);
    }

    #[test]
    fn test_discord_requires_token() {
        let settings = PlatformSettings {
            kind: PlatformKind::Discord,
            api_base: "http://127.0.0.1:9".into(),
            token_env: "STEWARD_TEST_TOKEN_THAT_IS_NEVER_SET".into(),
            request_timeout: Duration::from_secs(1),
        };
        assert!(build_platform(&settings).is_err());
    }
}
