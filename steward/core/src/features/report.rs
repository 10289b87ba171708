//! Daily store reports.
//!
//! A submission is appended to `{guild}/report/{date}` and announced in the
//! month's thread for the store, named `{YYYY-MM}-{store}`, under the report
//! log channel. Once the record is saved the submission counts as done: a
//! failed log post is reported without inviting a resubmission.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{require_admin, unrouted};
use crate::error::{best_effort, StewardError, StewardResult};
use crate::ids::{ChannelId, GuildId};
use crate::messages::{Component, MessageContent, Reply};
use crate::router::{ActionContext, ActionHandler};
use crate::services::Services;
use crate::store::{DateBucket, FeatureDocument};
use crate::token::SEPARATOR;

/// Feature key
pub const FEATURE: &str = "report";

/// `{guild}/report/config`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Store names, one submit button each
    pub stores: Vec<String>,
    /// Parent channel of the monthly store threads
    pub log_channel_id: Option<ChannelId>,
    /// Where the report panel lives
    pub panel_channel_id: Option<ChannelId>,
}

impl FeatureDocument for ReportConfig {
    const FEATURE_KEY: &'static str = FEATURE;

    fn validate(&self) -> StewardResult<()> {
        for (i, store) in self.stores.iter().enumerate() {
            if store.trim().is_empty() {
                return Err(StewardError::validation("Store names cannot be blank"));
            }
            if store.contains(SEPARATOR) {
                return Err(StewardError::validation(format!(
                    "Store name '{store}' cannot contain '{SEPARATOR}'"
                )));
            }
            if self.stores[..i].contains(store) {
                return Err(StewardError::validation(format!(
                    "Store '{store}' is listed twice"
                )));
            }
        }
        Ok(())
    }
}

/// A validated submission
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    /// Store reported on
    pub store: String,
    /// Business day
    pub date: DateBucket,
    /// Reported amount
    pub amount: f64,
}

impl Submission {
    /// Validate raw form input against the configured stores
    pub fn parse(
        config: &ReportConfig,
        store: &str,
        date: Option<&str>,
        amount: Option<&str>,
    ) -> StewardResult<Self> {
        if !config.stores.iter().any(|s| s == store) {
            return Err(StewardError::validation(format!("Unknown store '{store}'")));
        }
        let date = date
            .and_then(DateBucket::parse)
            .ok_or_else(|| StewardError::validation("Date must be in YYYY-MM-DD format"))?;
        let amount = amount
            .and_then(|a| a.parse::<f64>().ok())
            .filter(|a| a.is_finite() && *a >= 0.0)
            .ok_or_else(|| StewardError::validation("Amount must be a non-negative number"))?;
        Ok(Self {
            store: store.to_string(),
            date,
            amount,
        })
    }

    /// Name of the month thread this submission is logged in
    #[must_use]
    pub fn thread_name(&self) -> String {
        format!("{}-{}", self.date.period(), self.store)
    }
}

/// Render the report panel: one submit button per store
#[must_use]
pub fn render_panel(config: &ReportConfig) -> MessageContent {
    let header = if config.stores.is_empty() {
        "**Daily report**\nNo stores configured."
    } else {
        "**Daily report**\nPick your store to submit today's figures."
    };
    config
        .stores
        .iter()
        .fold(MessageContent::text(header), |body, store| {
            body.with_component(Component::button(format!("report:submit:{store}"), store))
        })
}

/// Which report verb a handler instance serves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportAction {
    /// `report:submit:<store>` and legacy `report-submit-<store>`
    Submit,
    /// `report:panel:refresh`
    Panel,
}

/// Handler for the report feature
#[derive(Debug)]
pub struct ReportHandler {
    services: Services,
    action: ReportAction,
}

impl ReportHandler {
    /// Create a handler for one verb
    pub fn new(services: Services, action: ReportAction) -> Self {
        Self { services, action }
    }

    async fn submit(&self, ctx: ActionContext<'_>, store: &str) -> StewardResult<Reply> {
        let event = ctx.event;
        let config: ReportConfig = self.services.load_config(&event.guild_id).await?;
        let submission =
            Submission::parse(&config, store, event.field("date"), event.field("amount"))?;
        let log_channel = config.log_channel_id.as_ref().ok_or_else(|| {
            StewardError::validation("Reports are not set up yet: no log channel configured")
        })?;

        let count = self
            .services
            .documents
            .append_record(
                &event.guild_id,
                FEATURE,
                submission.date,
                json!({
                    "store": submission.store,
                    "date": submission.date.to_string(),
                    "amount": submission.amount,
                    "user_id": event.actor.user_id,
                    "display_name": event.actor.display_name,
                    "submitted_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        info!(
            guild_id = %event.guild_id,
            store = %submission.store,
            date = %submission.date,
            count,
            "Report recorded"
        );

        // The record is saved; a retry from here would duplicate it
        if let Err(e) = self.post_to_log(ctx, log_channel, &submission).await {
            warn!(
                guild_id = %event.guild_id,
                store = %submission.store,
                error = %e,
                "Report saved but not posted to the log thread"
            );
            return Ok(Reply::ephemeral(format!(
                "Report for {} on {} saved, but it could not be posted to the log thread. \
                 Do not submit it again.",
                submission.store, submission.date
            )));
        }

        Ok(Reply::ephemeral(format!(
            "Report for {} on {} saved.",
            submission.store, submission.date
        )))
    }

    async fn post_to_log(
        &self,
        ctx: ActionContext<'_>,
        log_channel: &ChannelId,
        submission: &Submission,
    ) -> StewardResult<()> {
        let event = ctx.event;
        let thread = self
            .services
            .threads
            .resolve_thread(log_channel, &submission.thread_name())
            .await?;
        let line = format!(
            "{} | {} | {:.2} | {}",
            submission.date, submission.store, submission.amount, event.actor.display_name
        );
        self.services
            .platform
            .create_message(&thread.id.as_channel(), &MessageContent::text(line))
            .await?;
        best_effort(
            "add reporter to thread",
            self.services
                .platform
                .add_thread_member(&thread.id, &event.actor.user_id),
        )
        .await;
        Ok(())
    }

    async fn panel(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        require_admin(&self.services, ctx.event, &[]).await?;
        let config: ReportConfig = self.services.load_config(&ctx.event.guild_id).await?;
        let channel = config.panel_channel_id.as_ref().ok_or_else(|| {
            StewardError::validation("Set a report panel channel before refreshing the panel.")
        })?;
        refresh_panel(&self.services, &ctx.event.guild_id, channel, &config).await?;
        Ok(Reply::ephemeral("Report panel refreshed."))
    }
}

async fn refresh_panel(
    services: &Services,
    guild: &GuildId,
    channel: &ChannelId,
    config: &ReportConfig,
) -> StewardResult<()> {
    services
        .panels
        .upsert_panel(guild, FEATURE, channel, || render_panel(config))
        .await?;
    Ok(())
}

#[async_trait]
impl ActionHandler for ReportHandler {
    async fn handle(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        match (self.action, ctx.arg(0)) {
            (ReportAction::Submit, Some(store)) => self.submit(ctx, store).await,
            (ReportAction::Panel, Some("refresh")) => self.panel(ctx).await,
            _ => Err(unrouted(&ctx)),
        }
    }
}
