//! Shared fixtures for the steward-core integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use steward_core::{
    build_router, ActionRouter, Actor, InMemoryPlatform, InteractionEvent, MemoryBlobStore,
    PlatformError, Reply, Responder, Services, StewardConfig,
};

pub const GUILD: &str = "guild-1";
pub const CHANNEL: &str = "chan-ui";

/// Responder that keeps every acknowledgment it was asked to send
#[derive(Default)]
pub struct RecordingResponder {
    replies: Mutex<Vec<(String, Reply)>>,
}

impl RecordingResponder {
    pub fn replies(&self) -> Vec<(String, Reply)> {
        self.replies.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn replies_to(&self, interaction_id: &str) -> Vec<Reply> {
        self.replies
            .lock()
            .iter()
            .filter(|(id, _)| id == interaction_id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Wait (bounded) until at least `n` replies were recorded
    pub async fn wait_for(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("responder never saw the expected replies");
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn respond(&self, interaction_id: &str, reply: Reply) -> Result<(), PlatformError> {
        self.replies.lock().push((interaction_id.to_string(), reply));
        Ok(())
    }
}

/// A fully wired core over in-memory collaborators
pub struct Harness {
    pub blobs: Arc<MemoryBlobStore>,
    pub platform: Arc<InMemoryPlatform>,
    pub services: Services,
    pub router: Arc<ActionRouter>,
    pub responder: Arc<RecordingResponder>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(StewardConfig::default())
    }

    pub fn with_config(config: StewardConfig) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let platform = Arc::new(InMemoryPlatform::new());
        let services = Services::new(blobs.clone(), platform.clone(), &config);
        let router = Arc::new(build_router(&services).expect("routing table"));
        Self {
            blobs,
            platform,
            services,
            router,
            responder: Arc::new(RecordingResponder::default()),
        }
    }

    /// Snapshot of every stored blob, for "nothing changed" assertions
    pub fn snapshot(&self) -> Vec<(String, Option<Vec<u8>>)> {
        let mut paths = self.blobs.paths();
        paths.sort();
        paths
            .into_iter()
            .map(|p| {
                let raw = self.blobs.raw(&p);
                (p, raw)
            })
            .collect()
    }
}

pub fn actor(user: &str) -> Actor {
    Actor::new(user, format!("User {user}"))
}

pub fn button(user: &str, token: &str) -> InteractionEvent {
    InteractionEvent::button(GUILD, CHANNEL, actor(user), token)
}

pub fn select(user: &str, token: &str, values: &[&str]) -> InteractionEvent {
    InteractionEvent::select(
        GUILD,
        CHANNEL,
        actor(user),
        token,
        values.iter().map(|v| (*v).to_string()).collect(),
    )
}

pub fn modal(user: &str, token: &str, fields: &[(&str, &str)]) -> InteractionEvent {
    InteractionEvent::modal(GUILD, CHANNEL, actor(user), token, fields.iter().copied())
}
