//! Platform Client Traits
//!
//! The capability surface the core consumes from the chat platform. This
//! abstraction keeps wire details (REST routes, gateway payloads) out of the
//! panel, thread and feature logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ChannelId, GuildId, MessageId, RoleId, ThreadId, UserId};
use crate::messages::MessageContent;

/// Errors from platform calls
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The referenced message, channel or thread does not exist (anymore)
    #[error("{0} not found")]
    NotFound(String),

    /// The bot lacks access to the resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The platform returned an unexpected status
    #[error("platform returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Network or connection failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The platform response could not be decoded
    #[error("malformed platform response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Whether the failure means the referenced object no longer resolves
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Address of a posted message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel the message lives in
    pub channel_id: ChannelId,
    /// The message itself
    pub message_id: MessageId,
}

/// A fetched message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Where it lives
    pub reference: MessageRef,
    /// What it currently shows
    pub body: MessageContent,
}

/// A thread as listed by the platform
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// Thread id
    pub id: ThreadId,
    /// Parent channel
    pub parent_id: ChannelId,
    /// Thread name
    pub name: String,
    /// Whether the thread is archived
    pub archived: bool,
}

/// What a guild member is allowed to do
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPermissions {
    /// Holds the administrator capability
    pub administrator: bool,
    /// Roles held
    pub role_ids: Vec<RoleId>,
}

impl MemberPermissions {
    /// Administrator, or holds any of `roles`
    #[must_use]
    pub fn is_admin_or_any(&self, roles: &[RoleId]) -> bool {
        self.administrator || self.role_ids.iter().any(|r| roles.contains(r))
    }
}

/// Chat platform capability surface
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Client name for logs
    fn name(&self) -> &str;

    /// Post a new message
    async fn create_message(
        &self,
        channel: &ChannelId,
        body: &MessageContent,
    ) -> Result<MessageRef, PlatformError>;

    /// Fetch a message; `NotFound` when the message or its channel is gone
    async fn fetch_message(&self, reference: &MessageRef)
        -> Result<FetchedMessage, PlatformError>;

    /// Replace a message's content in place
    async fn edit_message(
        &self,
        reference: &MessageRef,
        body: &MessageContent,
    ) -> Result<(), PlatformError>;

    /// Create a thread under `parent`
    async fn create_thread(
        &self,
        parent: &ChannelId,
        name: &str,
        auto_archive_minutes: u32,
    ) -> Result<ThreadInfo, PlatformError>;

    /// Currently active threads under `parent`
    async fn list_active_threads(&self, parent: &ChannelId)
        -> Result<Vec<ThreadInfo>, PlatformError>;

    /// Most recently archived threads under `parent`, newest first, at most `limit`
    async fn list_archived_threads(
        &self,
        parent: &ChannelId,
        limit: usize,
    ) -> Result<Vec<ThreadInfo>, PlatformError>;

    /// Archive or unarchive a thread
    async fn set_thread_archived(
        &self,
        thread: &ThreadId,
        archived: bool,
    ) -> Result<ThreadInfo, PlatformError>;

    /// Add a user to a thread
    async fn add_thread_member(&self, thread: &ThreadId, user: &UserId)
        -> Result<(), PlatformError>;

    /// Permission flags of a guild member
    async fn member_permissions(
        &self,
        guild: &GuildId,
        user: &UserId,
    ) -> Result<MemberPermissions, PlatformError>;
}
