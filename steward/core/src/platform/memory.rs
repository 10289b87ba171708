//! In-Memory Platform
//!
//! A complete in-process implementation of [`PlatformClient`]. The daemon uses
//! it in `memory` mode for local runs; tests use it as a fault-injecting double
//! that can delete messages and channels, archive threads, and fail the next
//! call of a given kind.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{
    FetchedMessage, MemberPermissions, MessageRef, PlatformClient, PlatformError, ThreadInfo,
};
use crate::ids::{ChannelId, GuildId, MessageId, ThreadId, UserId};
use crate::messages::MessageContent;

/// Platform operations, for call counting and failure injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlatformOp {
    /// `create_message`
    CreateMessage,
    /// `fetch_message`
    FetchMessage,
    /// `edit_message`
    EditMessage,
    /// `create_thread`
    CreateThread,
    /// `list_active_threads`
    ListActiveThreads,
    /// `list_archived_threads`
    ListArchivedThreads,
    /// `set_thread_archived`
    SetThreadArchived,
    /// `add_thread_member`
    AddThreadMember,
    /// `member_permissions`
    MemberPermissions,
}

#[derive(Clone, Debug)]
struct StoredMessage {
    channel_id: ChannelId,
    body: MessageContent,
}

#[derive(Clone, Debug)]
struct StoredThread {
    info: ThreadInfo,
    /// Ordering key for the archived listing (newest first)
    archived_seq: u64,
}

#[derive(Debug, Default)]
struct PlatformState {
    next_id: u64,
    messages: HashMap<MessageId, StoredMessage>,
    threads: Vec<StoredThread>,
    thread_members: HashMap<ThreadId, HashSet<UserId>>,
    members: HashMap<(GuildId, UserId), MemberPermissions>,
    deleted_channels: HashSet<ChannelId>,
    pending_failures: HashMap<PlatformOp, Vec<PlatformError>>,
    calls: HashMap<PlatformOp, usize>,
}

impl PlatformState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Count the call and pop an injected failure if one is queued
    fn enter(&mut self, op: PlatformOp) -> Result<(), PlatformError> {
        *self.calls.entry(op).or_default() += 1;
        match self.pending_failures.get_mut(&op) {
            Some(queue) if !queue.is_empty() => Err(queue.remove(0)),
            _ => Ok(()),
        }
    }

    fn thread_mut(&mut self, id: &ThreadId) -> Option<&mut StoredThread> {
        self.threads.iter_mut().find(|t| &t.info.id == id)
    }
}

/// In-process platform
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    /// Create an empty platform
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Fixture setup and fault injection
    // ------------------------------------------------------------------------

    /// Set a member's permissions
    pub fn set_member(&self, guild: &GuildId, user: &UserId, perms: MemberPermissions) {
        self.state
            .lock()
            .members
            .insert((guild.clone(), user.clone()), perms);
    }

    /// Grant administrator to a member
    pub fn make_admin(&self, guild: &GuildId, user: &UserId) {
        self.set_member(
            guild,
            user,
            MemberPermissions {
                administrator: true,
                role_ids: Vec::new(),
            },
        );
    }

    /// Delete a message out from under the core
    pub fn delete_message(&self, reference: &MessageRef) -> bool {
        self.state
            .lock()
            .messages
            .remove(&reference.message_id)
            .is_some()
    }

    /// Delete a channel (and with it every message in it)
    pub fn delete_channel(&self, channel: &ChannelId) {
        let mut state = self.state.lock();
        state.messages.retain(|_, m| &m.channel_id != channel);
        state.deleted_channels.insert(channel.clone());
    }

    /// Archive a thread out from under the core
    pub fn archive_thread(&self, thread: &ThreadId) -> bool {
        let mut state = self.state.lock();
        let seq = state.next_id();
        match state.thread_mut(thread) {
            Some(t) => {
                t.info.archived = true;
                t.archived_seq = seq;
                true
            }
            None => false,
        }
    }

    /// Queue a failure for the next call of `op`
    pub fn fail_next(&self, op: PlatformOp, error: PlatformError) {
        self.state
            .lock()
            .pending_failures
            .entry(op)
            .or_default()
            .push(error);
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Number of calls made for `op`
    #[must_use]
    pub fn calls(&self, op: PlatformOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Current body of a message
    #[must_use]
    pub fn message_body(&self, reference: &MessageRef) -> Option<MessageContent> {
        self.state
            .lock()
            .messages
            .get(&reference.message_id)
            .map(|m| m.body.clone())
    }

    /// Bodies of every live message in a channel, oldest first
    #[must_use]
    pub fn messages_in(&self, channel: &ChannelId) -> Vec<MessageContent> {
        let state = self.state.lock();
        let mut found: Vec<(u64, MessageContent)> = state
            .messages
            .iter()
            .filter(|(_, m)| &m.channel_id == channel)
            .map(|(id, m)| (id.as_str().parse().unwrap_or(0), m.body.clone()))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, body)| body).collect()
    }

    /// A thread by id
    #[must_use]
    pub fn thread(&self, id: &ThreadId) -> Option<ThreadInfo> {
        self.state
            .lock()
            .threads
            .iter()
            .find(|t| &t.info.id == id)
            .map(|t| t.info.clone())
    }

    /// All threads under `parent` named `name`
    #[must_use]
    pub fn threads_named(&self, parent: &ChannelId, name: &str) -> Vec<ThreadInfo> {
        self.state
            .lock()
            .threads
            .iter()
            .filter(|t| &t.info.parent_id == parent && t.info.name == name)
            .map(|t| t.info.clone())
            .collect()
    }

    /// Members added to a thread
    #[must_use]
    pub fn thread_members(&self, thread: &ThreadId) -> HashSet<UserId> {
        self.state
            .lock()
            .thread_members
            .get(thread)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_message(
        &self,
        channel: &ChannelId,
        body: &MessageContent,
    ) -> Result<MessageRef, PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::CreateMessage)?;
        if state.deleted_channels.contains(channel) {
            return Err(PlatformError::NotFound(format!("channel {channel}")));
        }
        let message_id = MessageId(state.next_id().to_string());
        state.messages.insert(
            message_id.clone(),
            StoredMessage {
                channel_id: channel.clone(),
                body: body.clone(),
            },
        );
        Ok(MessageRef {
            channel_id: channel.clone(),
            message_id,
        })
    }

    async fn fetch_message(
        &self,
        reference: &MessageRef,
    ) -> Result<FetchedMessage, PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::FetchMessage)?;
        if state.deleted_channels.contains(&reference.channel_id) {
            return Err(PlatformError::NotFound(format!(
                "channel {}",
                reference.channel_id
            )));
        }
        match state.messages.get(&reference.message_id) {
            Some(m) if m.channel_id == reference.channel_id => Ok(FetchedMessage {
                reference: reference.clone(),
                body: m.body.clone(),
            }),
            _ => Err(PlatformError::NotFound(format!(
                "message {}",
                reference.message_id
            ))),
        }
    }

    async fn edit_message(
        &self,
        reference: &MessageRef,
        body: &MessageContent,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::EditMessage)?;
        match state.messages.get_mut(&reference.message_id) {
            Some(m) if m.channel_id == reference.channel_id => {
                m.body = body.clone();
                Ok(())
            }
            _ => Err(PlatformError::NotFound(format!(
                "message {}",
                reference.message_id
            ))),
        }
    }

    async fn create_thread(
        &self,
        parent: &ChannelId,
        name: &str,
        _auto_archive_minutes: u32,
    ) -> Result<ThreadInfo, PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::CreateThread)?;
        if state.deleted_channels.contains(parent) {
            return Err(PlatformError::NotFound(format!("channel {parent}")));
        }
        let info = ThreadInfo {
            id: ThreadId(state.next_id().to_string()),
            parent_id: parent.clone(),
            name: name.to_string(),
            archived: false,
        };
        state.threads.push(StoredThread {
            info: info.clone(),
            archived_seq: 0,
        });
        Ok(info)
    }

    async fn list_active_threads(
        &self,
        parent: &ChannelId,
    ) -> Result<Vec<ThreadInfo>, PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::ListActiveThreads)?;
        Ok(state
            .threads
            .iter()
            .filter(|t| &t.info.parent_id == parent && !t.info.archived)
            .map(|t| t.info.clone())
            .collect())
    }

    async fn list_archived_threads(
        &self,
        parent: &ChannelId,
        limit: usize,
    ) -> Result<Vec<ThreadInfo>, PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::ListArchivedThreads)?;
        let mut archived: Vec<&StoredThread> = state
            .threads
            .iter()
            .filter(|t| &t.info.parent_id == parent && t.info.archived)
            .collect();
        archived.sort_by(|a, b| b.archived_seq.cmp(&a.archived_seq));
        Ok(archived
            .into_iter()
            .take(limit)
            .map(|t| t.info.clone())
            .collect())
    }

    async fn set_thread_archived(
        &self,
        thread: &ThreadId,
        archived: bool,
    ) -> Result<ThreadInfo, PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::SetThreadArchived)?;
        let seq = state.next_id();
        let stored = state
            .thread_mut(thread)
            .ok_or_else(|| PlatformError::NotFound(format!("thread {thread}")))?;
        stored.info.archived = archived;
        if archived {
            stored.archived_seq = seq;
        }
        Ok(stored.info.clone())
    }

    async fn add_thread_member(
        &self,
        thread: &ThreadId,
        user: &UserId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::AddThreadMember)?;
        if state.thread_mut(thread).is_none() {
            return Err(PlatformError::NotFound(format!("thread {thread}")));
        }
        state
            .thread_members
            .entry(thread.clone())
            .or_default()
            .insert(user.clone());
        Ok(())
    }

    async fn member_permissions(
        &self,
        guild: &GuildId,
        user: &UserId,
    ) -> Result<MemberPermissions, PlatformError> {
        let mut state = self.state.lock();
        state.enter(PlatformOp::MemberPermissions)?;
        Ok(state
            .members
            .get(&(guild.clone(), user.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_lifecycle() {
        let platform = InMemoryPlatform::new();
        let channel = ChannelId::from("panels");

        let msg = platform
            .create_message(&channel, &MessageContent::text("v1"))
            .await
            .unwrap();
        platform
            .edit_message(&msg, &MessageContent::text("v2"))
            .await
            .unwrap();
        let fetched = platform.fetch_message(&msg).await.unwrap();
        assert_eq!(fetched.body.content, "v2");

        assert!(platform.delete_message(&msg));
        assert!(platform.fetch_message(&msg).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_deleted_channel_hides_messages() {
        let platform = InMemoryPlatform::new();
        let channel = ChannelId::from("panels");
        let msg = platform
            .create_message(&channel, &MessageContent::text("v1"))
            .await
            .unwrap();

        platform.delete_channel(&channel);
        assert!(platform.fetch_message(&msg).await.unwrap_err().is_not_found());
        assert!(platform
            .create_message(&channel, &MessageContent::text("v2"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_archived_listing_is_newest_first_and_bounded() {
        let platform = InMemoryPlatform::new();
        let parent = ChannelId::from("logs");
        let mut ids = Vec::new();
        for i in 0..3 {
            let t = platform
                .create_thread(&parent, &format!("t{i}"), 60)
                .await
                .unwrap();
            ids.push(t.id);
        }
        platform.archive_thread(&ids[0]);
        platform.archive_thread(&ids[2]);
        platform.archive_thread(&ids[1]);

        let listed = platform.list_archived_threads(&parent, 2).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["t1", "t2"]);

        let active = platform.list_active_threads(&parent).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let platform = InMemoryPlatform::new();
        platform.fail_next(
            PlatformOp::CreateMessage,
            PlatformError::Transport("reset".into()),
        );

        let channel = ChannelId::from("c");
        assert!(platform
            .create_message(&channel, &MessageContent::text("x"))
            .await
            .is_err());
        assert!(platform
            .create_message(&channel, &MessageContent::text("x"))
            .await
            .is_ok());
        assert_eq!(platform.calls(PlatformOp::CreateMessage), 2);
    }
}
