//! Thread Resolver
//!
//! Find-or-unarchive-or-create a uniquely named thread under a parent channel.
//! Threads bucket append-only log lines; callers bake enough context into the
//! name (period plus store, for example) to keep unrelated buckets apart.
//!
//! Matching is exact string equality, no normalization. The first match wins,
//! in this order:
//!
//! 1. active threads of the parent
//! 2. the most recent page of archived threads, unarchived on match
//! 3. a newly created thread with the configured auto-archive policy

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::StewardResult;
use crate::ids::ChannelId;
use crate::platform::{PlatformClient, ThreadInfo};

/// Default number of archived threads scanned
pub const DEFAULT_ARCHIVED_PAGE: usize = 50;

/// Default auto-archive window for created threads (one week)
pub const DEFAULT_AUTO_ARCHIVE_MINUTES: u32 = 10_080;

/// Where a resolved thread came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadOrigin {
    /// Already active
    Active,
    /// Found archived and unarchived
    Unarchived,
    /// Newly created
    Created,
}

/// Thread resolution policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadPolicy {
    /// Archived threads scanned per resolution
    pub archived_page: usize,
    /// Auto-archive window for created threads
    pub auto_archive_minutes: u32,
}

impl Default for ThreadPolicy {
    fn default() -> Self {
        Self {
            archived_page: DEFAULT_ARCHIVED_PAGE,
            auto_archive_minutes: DEFAULT_AUTO_ARCHIVE_MINUTES,
        }
    }
}

/// Resolves logical thread names to platform threads
#[derive(Clone)]
pub struct ThreadResolver {
    platform: Arc<dyn PlatformClient>,
    policy: ThreadPolicy,
}

impl std::fmt::Debug for ThreadResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadResolver")
            .field("platform", &self.platform.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ThreadResolver {
    /// Create a resolver with the given policy
    pub fn new(platform: Arc<dyn PlatformClient>, policy: ThreadPolicy) -> Self {
        Self { platform, policy }
    }

    /// The active policy
    #[must_use]
    pub fn policy(&self) -> ThreadPolicy {
        self.policy
    }

    /// Resolve `name` under `parent` to a usable (unarchived) thread
    pub async fn resolve_thread(&self, parent: &ChannelId, name: &str) -> StewardResult<ThreadInfo> {
        self.resolve_with_origin(parent, name)
            .await
            .map(|(thread, _)| thread)
    }

    /// Like [`Self::resolve_thread`], also reporting which step matched
    pub async fn resolve_with_origin(
        &self,
        parent: &ChannelId,
        name: &str,
    ) -> StewardResult<(ThreadInfo, ThreadOrigin)> {
        let active = self.platform.list_active_threads(parent).await?;
        if let Some(thread) = active.into_iter().find(|t| t.name == name) {
            debug!(parent = %parent, thread = name, thread_id = %thread.id, "Active thread matched");
            return Ok((thread, ThreadOrigin::Active));
        }

        let archived = self
            .platform
            .list_archived_threads(parent, self.policy.archived_page)
            .await?;
        if let Some(thread) = archived.into_iter().find(|t| t.name == name) {
            let thread = self.platform.set_thread_archived(&thread.id, false).await?;
            info!(parent = %parent, thread = name, thread_id = %thread.id, "Archived thread reopened");
            return Ok((thread, ThreadOrigin::Unarchived));
        }

        let thread = self
            .platform
            .create_thread(parent, name, self.policy.auto_archive_minutes)
            .await?;
        info!(parent = %parent, thread = name, thread_id = %thread.id, "Thread created");
        Ok((thread, ThreadOrigin::Created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{InMemoryPlatform, PlatformOp};

    fn resolver(policy: ThreadPolicy) -> (Arc<InMemoryPlatform>, ThreadResolver) {
        let platform = Arc::new(InMemoryPlatform::new());
        (platform.clone(), ThreadResolver::new(platform, policy))
    }

    #[tokio::test]
    async fn test_exact_match_only() {
        let (platform, resolver) = resolver(ThreadPolicy::default());
        let parent = ChannelId::from("logs");

        let a = resolver.resolve_thread(&parent, "2025-06-StoreA").await.unwrap();
        let b = resolver.resolve_thread(&parent, "2025-06-storea").await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(platform.calls(PlatformOp::CreateThread), 2);
    }

    #[tokio::test]
    async fn test_archived_beyond_page_is_not_found() {
        let (platform, resolver) = resolver(ThreadPolicy {
            archived_page: 1,
            ..ThreadPolicy::default()
        });
        let parent = ChannelId::from("logs");

        let old = resolver.resolve_thread(&parent, "old").await.unwrap();
        let newer = resolver.resolve_thread(&parent, "newer").await.unwrap();
        platform.archive_thread(&old.id);
        platform.archive_thread(&newer.id);

        // "old" is outside the one-thread archived page, so a fresh one is made
        let (again, origin) = resolver.resolve_with_origin(&parent, "old").await.unwrap();
        assert_eq!(origin, ThreadOrigin::Created);
        assert_ne!(again.id, old.id);
    }

    #[tokio::test]
    async fn test_threads_are_scoped_to_parent() {
        let (_, resolver) = resolver(ThreadPolicy::default());
        let a = resolver
            .resolve_thread(&ChannelId::from("one"), "2025-06-StoreA")
            .await
            .unwrap();
        let b = resolver
            .resolve_thread(&ChannelId::from("two"), "2025-06-StoreA")
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }
}
