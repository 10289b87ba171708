//! Lottery: a pool of labeled items and a draw-with-replacement panel.
//!
//! # Draw flow
//!
//! ```text
//! lottery:run:open  -> ephemeral count select (1..=max_draw_count)
//!                   -> wait for lottery:count:select from the same user
//!                   -> draw, append record to {guild}/lottery/{today},
//!                      answer the selection with the results
//! ```
//!
//! If the window elapses the flow ends without a word.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{require_admin, unrouted};
use crate::error::{best_effort, StewardError, StewardResult};
use crate::events::InteractionEvent;
use crate::ids::{ChannelId, GuildId, RoleId};
use crate::lottery::draw;
use crate::messages::{Component, MessageContent, Reply, SelectOption};
use crate::router::{ActionContext, ActionHandler};
use crate::services::Services;
use crate::store::{DateBucket, FeatureDocument};

/// Feature key
pub const FEATURE: &str = "lottery";

/// Token of the count select shown after `lottery:run:open`
pub const COUNT_SELECT_TOKEN: &str = "lottery:count:select";

/// Longest label the panel can show in a select option
pub const MAX_LABEL_LEN: usize = 100;

/// Select menus hold at most this many options
const MAX_SELECT_OPTIONS: usize = 25;

/// Shown when a draw is requested from an empty pool
pub const EMPTY_POOL_TEXT: &str = "The lottery pool is empty. Ask an admin to add items.";

/// `{guild}/lottery/config`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryConfig {
    /// Pool labels, in display order
    pub items: Vec<String>,
    /// Where the lottery panel lives
    pub panel_channel_id: Option<ChannelId>,
    /// Where draw results are announced
    pub log_channel_id: Option<ChannelId>,
    /// Roles allowed to edit the pool, besides guild admins
    pub admin_role_ids: Vec<RoleId>,
}

impl FeatureDocument for LotteryConfig {
    const FEATURE_KEY: &'static str = FEATURE;

    fn validate(&self) -> StewardResult<()> {
        for (i, item) in self.items.iter().enumerate() {
            check_label(item)?;
            if self.items[..i].contains(item) {
                return Err(StewardError::validation(format!(
                    "'{item}' is already in the pool"
                )));
            }
        }
        Ok(())
    }
}

fn check_label(label: &str) -> StewardResult<()> {
    if label.trim().is_empty() {
        return Err(StewardError::validation("Item labels cannot be blank"));
    }
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(StewardError::validation(format!(
            "Item labels are limited to {MAX_LABEL_LEN} characters"
        )));
    }
    Ok(())
}

/// Render the lottery panel
#[must_use]
pub fn render_panel(config: &LotteryConfig) -> MessageContent {
    let pool = if config.items.is_empty() {
        "_empty_".to_string()
    } else {
        config.items.join(", ")
    };
    let mut body = MessageContent::text(format!(
        "**Lottery**\nPool ({}): {pool}",
        config.items.len()
    ))
    .with_component(Component::button("lottery:run:open", "Draw"));

    if !config.items.is_empty() {
        let options = config
            .items
            .iter()
            .take(MAX_SELECT_OPTIONS)
            .map(|item| SelectOption::plain(item.as_str()))
            .collect();
        body = body.with_component(Component::select(
            "lottery:pool:remove",
            "Remove an item",
            options,
        ));
    }
    body
}

/// Count picker shown before a draw
#[must_use]
pub fn render_count_select(max: usize) -> MessageContent {
    let options = (1..=max.clamp(1, MAX_SELECT_OPTIONS))
        .map(|n| SelectOption::plain(n.to_string()))
        .collect();
    MessageContent::text("How many draws?").with_component(Component::select(
        COUNT_SELECT_TOKEN,
        "Number of draws",
        options,
    ))
}

fn format_results(results: &[String]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, label)| format!("{}. {label}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Which lottery verb a handler instance serves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LotteryAction {
    /// `lottery:run:open`
    Run,
    /// `lottery:pool:{add,remove}`
    Pool,
    /// `lottery:panel:refresh`
    Panel,
    /// Legacy `lottery_run` buttons
    LegacyRun,
}

/// Handler for the lottery feature
#[derive(Debug)]
pub struct LotteryHandler {
    services: Services,
    action: LotteryAction,
}

impl LotteryHandler {
    /// Create a handler for one verb
    pub fn new(services: Services, action: LotteryAction) -> Self {
        Self { services, action }
    }

    async fn run(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        let event = ctx.event;
        let config: LotteryConfig = self.services.load_config(&event.guild_id).await?;
        if config.items.is_empty() {
            return Ok(Reply::ephemeral(EMPTY_POOL_TEXT));
        }

        let max = self.services.interaction.max_draw_count;
        let pending = self
            .services
            .collector
            .register(&event.actor.user_id, COUNT_SELECT_TOKEN);
        ctx.responder
            .respond(&event.id, Reply::ephemeral_body(render_count_select(max)))
            .await?;

        let Some(selection) = pending
            .wait(self.services.interaction.follow_up_timeout)
            .await
        else {
            debug!(guild_id = %event.guild_id, user_id = %event.actor.user_id, "Draw abandoned");
            return Ok(Reply::Silent);
        };

        self.finish_draw(ctx, &selection, max)
            .await
            .map_err(|e| e.in_follow_up(selection.id.clone()))?;
        Ok(Reply::Silent)
    }

    /// Everything after the count was picked; answered on the selection
    async fn finish_draw(
        &self,
        ctx: ActionContext<'_>,
        selection: &InteractionEvent,
        max: usize,
    ) -> StewardResult<()> {
        let event = ctx.event;
        let count = selection
            .selected_values()
            .first()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| (1..=max).contains(n))
            .ok_or_else(|| {
                StewardError::validation(format!("Pick a number of draws between 1 and {max}"))
            })?;

        // Re-read: the pool may have changed while the user was choosing
        let config: LotteryConfig = self.services.load_config(&event.guild_id).await?;
        let results = draw(&config.items, count);
        if results.is_empty() {
            ctx.responder
                .respond(&selection.id, Reply::ephemeral(EMPTY_POOL_TEXT))
                .await?;
            return Ok(());
        }

        let bucket = DateBucket::today();
        self.services
            .documents
            .append_record(
                &event.guild_id,
                FEATURE,
                bucket,
                json!({
                    "user_id": event.actor.user_id,
                    "display_name": event.actor.display_name,
                    "count": count,
                    "results": results,
                    "drawn_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        info!(guild_id = %event.guild_id, user_id = %event.actor.user_id, count, "Lottery drawn");

        let text = format!(
            "**{}** drew {count}:\n{}",
            event.actor.display_name,
            format_results(&results)
        );
        if let Some(ref log_channel) = config.log_channel_id {
            best_effort(
                "lottery log post",
                self.services
                    .platform
                    .create_message(log_channel, &MessageContent::text(text.clone())),
            )
            .await;
        }

        ctx.responder
            .respond(&selection.id, Reply::public(text))
            .await?;
        Ok(())
    }

    async fn add(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        let event = ctx.event;
        let config: LotteryConfig = self.services.load_config_uncached(&event.guild_id).await?;
        require_admin(&self.services, event, &config.admin_role_ids).await?;

        let label = event
            .field("label")
            .ok_or_else(|| StewardError::validation("Enter a label for the new item"))?;
        check_label(label)?;
        if config.items.iter().any(|i| i == label) {
            return Err(StewardError::validation(format!(
                "'{label}' is already in the pool"
            )));
        }

        let mut items = config.items.clone();
        items.push(label.to_string());
        self.write_items(&event.guild_id, config, items).await?;
        Ok(Reply::ephemeral(format!("Added '{label}' to the pool.")))
    }

    async fn remove(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        let event = ctx.event;
        let config: LotteryConfig = self.services.load_config_uncached(&event.guild_id).await?;
        require_admin(&self.services, event, &config.admin_role_ids).await?;

        let selected = event.selected_values();
        if selected.is_empty() {
            return Err(StewardError::validation("Pick an item to remove"));
        }
        let items: Vec<String> = config
            .items
            .iter()
            .filter(|i| !selected.contains(i))
            .cloned()
            .collect();
        let removed = config.items.len() - items.len();
        if removed == 0 {
            return Err(StewardError::validation("That item is no longer in the pool"));
        }

        self.write_items(&event.guild_id, config, items).await?;
        Ok(Reply::ephemeral(format!("Removed {removed} item(s).")))
    }

    async fn write_items(
        &self,
        guild: &GuildId,
        mut config: LotteryConfig,
        items: Vec<String>,
    ) -> StewardResult<()> {
        self.services
            .set_field(guild, FEATURE, "items", json!(items))
            .await?;
        config.items = items;
        best_effort("lottery panel refresh", refresh_panel(&self.services, guild, &config)).await;
        Ok(())
    }

    async fn panel(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        let config: LotteryConfig = self.services.load_config(&ctx.event.guild_id).await?;
        require_admin(&self.services, ctx.event, &config.admin_role_ids).await?;
        if config.panel_channel_id.is_none() {
            return Err(StewardError::validation(
                "Set a lottery panel channel before refreshing the panel.",
            ));
        }
        refresh_panel(&self.services, &ctx.event.guild_id, &config).await?;
        Ok(Reply::ephemeral("Lottery panel refreshed."))
    }
}

/// Upsert the lottery panel when a panel channel is configured
pub async fn refresh_panel(
    services: &Services,
    guild: &GuildId,
    config: &LotteryConfig,
) -> StewardResult<()> {
    if let Some(ref channel) = config.panel_channel_id {
        services
            .panels
            .upsert_panel(guild, FEATURE, channel, || render_panel(config))
            .await?;
    }
    Ok(())
}

#[async_trait]
impl ActionHandler for LotteryHandler {
    async fn handle(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        match (self.action, ctx.arg(0)) {
            (LotteryAction::Run, Some("open")) | (LotteryAction::LegacyRun, None) => {
                self.run(ctx).await
            }
            (LotteryAction::Pool, Some("add")) => self.add(ctx).await,
            (LotteryAction::Pool, Some("remove")) => self.remove(ctx).await,
            (LotteryAction::Panel, Some("refresh")) => self.panel(ctx).await,
            _ => Err(unrouted(&ctx)),
        }
    }
}
