//! Panel Upsert Engine
//!
//! Keeps a 1:1 binding between a feature's panel key `(guild, feature)` and a
//! live platform message whose content is rendered from the feature's
//! configuration.
//!
//! # Algorithm
//!
//! ```text
//! record = panel_record(guild, feature)
//! absent                        -> create, persist binding
//! present, fetch ok             -> edit in place (message id unchanged)
//! present, fetch NotFound       -> create, overwrite binding
//! present, bound elsewhere      -> create in the requested channel, overwrite binding
//! ```
//!
//! The binding is persisted before the call returns. If that write fails the
//! call fails even though the visible message may already show new content;
//! retrying the whole upsert converges. Messages orphaned by two racing
//! upserts are not cleaned up.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StewardResult;
use crate::ids::{ChannelId, GuildId, MessageId};
use crate::messages::MessageContent;
use crate::platform::{MessageRef, PlatformClient, PlatformError};
use crate::store::DocumentStore;

/// Persisted binding of a panel to its live message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelRecord {
    /// Channel the panel was posted in
    pub channel_id: ChannelId,
    /// The panel message
    pub message_id: MessageId,
}

impl PanelRecord {
    /// Address of the bound message
    #[must_use]
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

impl From<&MessageRef> for PanelRecord {
    fn from(reference: &MessageRef) -> Self {
        Self {
            channel_id: reference.channel_id.clone(),
            message_id: reference.message_id.clone(),
        }
    }
}

/// How an upsert reached its result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertAction {
    /// No binding existed; a message was posted
    Created,
    /// The bound message was edited in place
    Edited,
    /// The bound message no longer resolved (or moved); a new one was posted
    Recreated,
}

/// Result of [`PanelUpsertEngine::upsert_panel`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelUpsert {
    /// The message now current for the panel key
    pub reference: MessageRef,
    /// What happened
    pub action: UpsertAction,
}

/// Idempotent panel synchronization
#[derive(Clone)]
pub struct PanelUpsertEngine {
    documents: DocumentStore,
    platform: Arc<dyn PlatformClient>,
}

impl std::fmt::Debug for PanelUpsertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelUpsertEngine")
            .field("documents", &self.documents)
            .field("platform", &self.platform.name())
            .finish()
    }
}

impl PanelUpsertEngine {
    /// Create an engine over shared handles
    pub fn new(documents: DocumentStore, platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            documents,
            platform,
        }
    }

    /// Make sure exactly one message is current for `(guild, feature)` and
    /// that it shows `render()`
    ///
    /// `channel` is where a new panel is posted. `render` is called once,
    /// only after the engine knows which message will carry the content.
    pub async fn upsert_panel<F>(
        &self,
        guild: &GuildId,
        feature: &str,
        channel: &ChannelId,
        render: F,
    ) -> StewardResult<PanelUpsert>
    where
        F: FnOnce() -> MessageContent + Send,
    {
        let existing = self.documents.panel_record(guild, feature).await?;

        let Some(record) = existing else {
            let reference = self.create_and_bind(guild, feature, channel, render()).await?;
            info!(guild_id = %guild, feature, message_id = %reference.message_id, "Panel created");
            return Ok(PanelUpsert {
                reference,
                action: UpsertAction::Created,
            });
        };

        if &record.channel_id != channel {
            debug!(
                guild_id = %guild,
                feature,
                from = %record.channel_id,
                to = %channel,
                "Panel channel changed, posting a new panel"
            );
            let reference = self.create_and_bind(guild, feature, channel, render()).await?;
            return Ok(PanelUpsert {
                reference,
                action: UpsertAction::Recreated,
            });
        }

        let bound = record.message_ref();
        let body = match self.platform.fetch_message(&bound).await {
            Ok(_) => {
                let body = render();
                match self.platform.edit_message(&bound, &body).await {
                    Ok(()) => {
                        debug!(guild_id = %guild, feature, message_id = %bound.message_id, "Panel edited");
                        return Ok(PanelUpsert {
                            reference: bound,
                            action: UpsertAction::Edited,
                        });
                    }
                    // Deleted between fetch and edit
                    Err(e) if e.is_not_found() => body,
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) if e.is_not_found() => render(),
            Err(e) => return Err(e.into()),
        };

        info!(
            guild_id = %guild,
            feature,
            stale_message_id = %bound.message_id,
            "Panel message no longer resolves, recreating"
        );
        let reference = self.create_and_bind(guild, feature, channel, body).await?;
        Ok(PanelUpsert {
            reference,
            action: UpsertAction::Recreated,
        })
    }

    async fn create_and_bind(
        &self,
        guild: &GuildId,
        feature: &str,
        channel: &ChannelId,
        body: MessageContent,
    ) -> StewardResult<MessageRef> {
        let reference = self
            .platform
            .create_message(channel, &body)
            .await
            .map_err(|e: PlatformError| {
                tracing::warn!(guild_id = %guild, feature, channel_id = %channel, error = %e, "Panel post failed");
                e
            })?;
        self.documents
            .put_panel_record(guild, feature, &PanelRecord::from(&reference))
            .await?;
        Ok(reference)
    }
}
