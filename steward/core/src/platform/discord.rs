//! Discord REST Client
//!
//! [`PlatformClient`] over the Discord HTTP API (v10), authenticated with a bot
//! token.
//!
//! # Routes used
//!
//! - `POST   /channels/{channel}/messages` - create message
//! - `GET    /channels/{channel}/messages/{message}` - fetch message
//! - `PATCH  /channels/{channel}/messages/{message}` - edit message
//! - `POST   /channels/{channel}/threads` - create public thread
//! - `GET    /channels/{channel}` + `GET /guilds/{guild}/threads/active` - active threads
//! - `GET    /channels/{channel}/threads/archived/public?limit=N` - archived threads
//! - `PATCH  /channels/{thread}` - archive / unarchive
//! - `PUT    /channels/{thread}/thread-members/{user}` - add member
//! - `GET    /guilds/{guild}/members/{user}` + `GET /guilds/{guild}/roles` - permissions

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::traits::{
    FetchedMessage, MemberPermissions, MessageRef, PlatformClient, PlatformError, ThreadInfo,
};
use crate::ids::{ChannelId, GuildId, MessageId, RoleId, ThreadId, UserId};
use crate::messages::{Component, MessageContent, SelectOption};

/// Default API base URL
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// `ADMINISTRATOR` permission bit
const ADMINISTRATOR: u64 = 1 << 3;

/// Public thread channel type
const PUBLIC_THREAD: u8 = 11;

/// Buttons allowed in one action row
const BUTTONS_PER_ROW: usize = 5;

/// Discord REST client
#[derive(Clone)]
pub struct DiscordRestClient {
    api_base: String,
    token: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for DiscordRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordRestClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    components: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WireThreadMetadata {
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    thread_metadata: Option<WireThreadMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireThreadList {
    threads: Vec<WireChannel>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireRole {
    id: String,
    permissions: String,
}

impl WireChannel {
    fn into_thread(self) -> ThreadInfo {
        ThreadInfo {
            id: ThreadId(self.id),
            parent_id: ChannelId(self.parent_id.unwrap_or_default()),
            name: self.name.unwrap_or_default(),
            archived: self.thread_metadata.is_some_and(|m| m.archived),
        }
    }
}

impl DiscordRestClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Transport` if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("steward (", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http_client,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.api_base)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        route: &str,
        body: Option<Value>,
        what: &str,
    ) -> Result<T, PlatformError> {
        let response = self.send(method, route, body, what).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn send(
        &self,
        method: Method,
        route: &str,
        body: Option<Value>,
        what: &str,
    ) -> Result<reqwest::Response, PlatformError> {
        let mut request = self
            .http_client
            .request(method, self.url(route))
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound(what.to_string())),
            StatusCode::FORBIDDEN => Err(PlatformError::Forbidden(what.to_string())),
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(PlatformError::Http {
                    status: s.as_u16(),
                    message,
                })
            }
        }
    }
}

/// Encode components into Discord action rows
fn encode_components(components: &[Component]) -> Vec<Value> {
    let mut rows = Vec::new();
    let mut buttons: Vec<Value> = Vec::new();

    let flush = |buttons: &mut Vec<Value>, rows: &mut Vec<Value>| {
        if !buttons.is_empty() {
            rows.push(json!({ "type": 1, "components": std::mem::take(buttons) }));
        }
    };

    for component in components {
        match component {
            Component::Button { custom_id, label } => {
                if buttons.len() == BUTTONS_PER_ROW {
                    flush(&mut buttons, &mut rows);
                }
                buttons.push(json!({
                    "type": 2,
                    "style": 1,
                    "label": label,
                    "custom_id": custom_id,
                }));
            }
            Component::Select {
                custom_id,
                placeholder,
                options,
            } => {
                flush(&mut buttons, &mut rows);
                let options: Vec<Value> = options
                    .iter()
                    .map(|o| json!({ "label": o.label, "value": o.value }))
                    .collect();
                rows.push(json!({
                    "type": 1,
                    "components": [{
                        "type": 3,
                        "custom_id": custom_id,
                        "placeholder": placeholder,
                        "options": options,
                    }],
                }));
            }
        }
    }
    flush(&mut buttons, &mut rows);
    rows
}

/// Decode Discord action rows back into components, skipping unknown kinds
fn decode_components(rows: &[Value]) -> Vec<Component> {
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).unwrap_or("").to_string();

    rows.iter()
        .filter_map(|row| row.get("components").and_then(Value::as_array))
        .flatten()
        .filter_map(|c| match c.get("type").and_then(Value::as_u64) {
            Some(2) => Some(Component::Button {
                custom_id: text(c, "custom_id"),
                label: text(c, "label"),
            }),
            Some(3) => Some(Component::Select {
                custom_id: text(c, "custom_id"),
                placeholder: text(c, "placeholder"),
                options: c
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|opts| {
                        opts.iter()
                            .map(|o| SelectOption {
                                label: text(o, "label"),
                                value: text(o, "value"),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            _ => None,
        })
        .collect()
}

fn message_body(body: &MessageContent) -> Value {
    json!({
        "content": body.content,
        "components": encode_components(&body.components),
    })
}

/// Whether the member's roles grant administrator
fn grants_admin(guild: &GuildId, member_roles: &[String], roles: &[WireRole]) -> bool {
    roles
        .iter()
        // The @everyone role shares the guild's id and applies to every member
        .filter(|r| r.id == guild.as_str() || member_roles.contains(&r.id))
        .filter_map(|r| r.permissions.parse::<u64>().ok())
        .any(|bits| bits & ADMINISTRATOR != 0)
}

#[async_trait]
impl PlatformClient for DiscordRestClient {
    fn name(&self) -> &str {
        "discord"
    }

    async fn create_message(
        &self,
        channel: &ChannelId,
        body: &MessageContent,
    ) -> Result<MessageRef, PlatformError> {
        let wire: WireMessage = self
            .call(
                Method::POST,
                &format!("/channels/{channel}/messages"),
                Some(message_body(body)),
                &format!("channel {channel}"),
            )
            .await?;
        Ok(MessageRef {
            channel_id: ChannelId(wire.channel_id),
            message_id: MessageId(wire.id),
        })
    }

    async fn fetch_message(
        &self,
        reference: &MessageRef,
    ) -> Result<FetchedMessage, PlatformError> {
        let wire: WireMessage = self
            .call(
                Method::GET,
                &format!(
                    "/channels/{}/messages/{}",
                    reference.channel_id, reference.message_id
                ),
                None,
                &format!("message {}", reference.message_id),
            )
            .await?;
        Ok(FetchedMessage {
            reference: reference.clone(),
            body: MessageContent {
                content: wire.content,
                components: decode_components(&wire.components),
            },
        })
    }

    async fn edit_message(
        &self,
        reference: &MessageRef,
        body: &MessageContent,
    ) -> Result<(), PlatformError> {
        self.send(
            Method::PATCH,
            &format!(
                "/channels/{}/messages/{}",
                reference.channel_id, reference.message_id
            ),
            Some(message_body(body)),
            &format!("message {}", reference.message_id),
        )
        .await?;
        Ok(())
    }

    async fn create_thread(
        &self,
        parent: &ChannelId,
        name: &str,
        auto_archive_minutes: u32,
    ) -> Result<ThreadInfo, PlatformError> {
        let wire: WireChannel = self
            .call(
                Method::POST,
                &format!("/channels/{parent}/threads"),
                Some(json!({
                    "name": name,
                    "auto_archive_duration": auto_archive_minutes,
                    "type": PUBLIC_THREAD,
                })),
                &format!("channel {parent}"),
            )
            .await?;
        Ok(wire.into_thread())
    }

    async fn list_active_threads(
        &self,
        parent: &ChannelId,
    ) -> Result<Vec<ThreadInfo>, PlatformError> {
        let channel: WireChannel = self
            .call(
                Method::GET,
                &format!("/channels/{parent}"),
                None,
                &format!("channel {parent}"),
            )
            .await?;
        let guild = channel
            .guild_id
            .ok_or_else(|| PlatformError::Decode(format!("channel {} has no guild", channel.id)))?;

        let list: WireThreadList = self
            .call(
                Method::GET,
                &format!("/guilds/{guild}/threads/active"),
                None,
                &format!("guild {guild}"),
            )
            .await?;
        Ok(list
            .threads
            .into_iter()
            .map(WireChannel::into_thread)
            .filter(|t| &t.parent_id == parent)
            .collect())
    }

    async fn list_archived_threads(
        &self,
        parent: &ChannelId,
        limit: usize,
    ) -> Result<Vec<ThreadInfo>, PlatformError> {
        let list: WireThreadList = self
            .call(
                Method::GET,
                &format!("/channels/{parent}/threads/archived/public?limit={limit}"),
                None,
                &format!("channel {parent}"),
            )
            .await?;
        Ok(list
            .threads
            .into_iter()
            .map(WireChannel::into_thread)
            .collect())
    }

    async fn set_thread_archived(
        &self,
        thread: &ThreadId,
        archived: bool,
    ) -> Result<ThreadInfo, PlatformError> {
        let wire: WireChannel = self
            .call(
                Method::PATCH,
                &format!("/channels/{thread}"),
                Some(json!({ "archived": archived })),
                &format!("thread {thread}"),
            )
            .await?;
        Ok(wire.into_thread())
    }

    async fn add_thread_member(
        &self,
        thread: &ThreadId,
        user: &UserId,
    ) -> Result<(), PlatformError> {
        self.send(
            Method::PUT,
            &format!("/channels/{thread}/thread-members/{user}"),
            None,
            &format!("thread {thread}"),
        )
        .await?;
        Ok(())
    }

    async fn member_permissions(
        &self,
        guild: &GuildId,
        user: &UserId,
    ) -> Result<MemberPermissions, PlatformError> {
        let member: WireMember = self
            .call(
                Method::GET,
                &format!("/guilds/{guild}/members/{user}"),
                None,
                &format!("member {user}"),
            )
            .await?;
        let roles: Vec<WireRole> = self
            .call(
                Method::GET,
                &format!("/guilds/{guild}/roles"),
                None,
                &format!("guild {guild}"),
            )
            .await?;

        Ok(MemberPermissions {
            administrator: grants_admin(guild, &member.roles, &roles),
            role_ids: member.roles.into_iter().map(RoleId).collect(),
        })
    }
}
