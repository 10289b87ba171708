//! Feature Handlers
//!
//! Each feature owns a feature key, a typed configuration document, a panel
//! and a set of action tokens:
//!
//! | Feature    | Key        | Tokens                                                    |
//! |------------|------------|-----------------------------------------------------------|
//! | lottery    | `lottery`  | `lottery:run:open`, `lottery:pool:{add,remove}`, `lottery:panel:refresh`, legacy `lottery_run` |
//! | report     | `report`   | `report:submit:<store>`, `report:panel:refresh`, legacy `report-submit-<store>` |
//! | settings   | `settings` | `settings:set:<field>`, `settings:panel:refresh`          |
//!
//! Mutating actions check permissions first, then validate input, then write.

pub mod lottery;
pub mod report;
pub mod settings;

use std::sync::Arc;

use tracing::debug;

use crate::error::{StewardError, StewardResult};
use crate::events::InteractionEvent;
use crate::ids::RoleId;
use crate::router::{ActionContext, ActionRouter, RouterBuildError};
use crate::services::Services;

pub use lottery::{LotteryConfig, LotteryHandler};
pub use report::{ReportConfig, ReportHandler};
pub use settings::{GuildSettings, SettingsHandler};

/// Text shown when a permission check fails
pub const PERMISSION_DENIED_TEXT: &str = "You need an administrator role to do that.";

/// Build the routing table for every feature
pub fn build_router(services: &Services) -> Result<ActionRouter, RouterBuildError> {
    let lottery = |action| Arc::new(LotteryHandler::new(services.clone(), action));
    let report = |action| Arc::new(ReportHandler::new(services.clone(), action));
    let settings = |action| Arc::new(SettingsHandler::new(services.clone(), action));

    ActionRouter::builder()
        .route("lottery", "run", lottery(lottery::LotteryAction::Run))
        .route("lottery", "pool", lottery(lottery::LotteryAction::Pool))
        .route("lottery", "panel", lottery(lottery::LotteryAction::Panel))
        .route("report", "submit", report(report::ReportAction::Submit))
        .route("report", "panel", report(report::ReportAction::Panel))
        .route("settings", "set", settings(settings::SettingsAction::Set))
        .route("settings", "panel", settings(settings::SettingsAction::Panel))
        .legacy_prefix("lottery_run", lottery(lottery::LotteryAction::LegacyRun))
        .legacy_prefix("report-submit-", report(report::ReportAction::Submit))
        .build()
}

/// Fail with `PermissionDenied` unless the actor is an administrator or holds
/// one of `feature_roles` or the guild-wide admin roles
pub async fn require_admin(
    services: &Services,
    event: &InteractionEvent,
    feature_roles: &[RoleId],
) -> StewardResult<()> {
    let perms = services
        .platform
        .member_permissions(&event.guild_id, &event.actor.user_id)
        .await?;
    if perms.administrator {
        return Ok(());
    }

    let guild: GuildSettings = services.load_config(&event.guild_id).await?;
    let mut allowed = guild.admin_role_ids;
    allowed.extend_from_slice(feature_roles);
    if perms.is_admin_or_any(&allowed) {
        return Ok(());
    }

    debug!(
        guild_id = %event.guild_id,
        user_id = %event.actor.user_id,
        "Permission denied"
    );
    Err(StewardError::permission_denied(PERMISSION_DENIED_TEXT))
}

/// The `UnroutedAction` error for a verb a handler does not own
pub(crate) fn unrouted(ctx: &ActionContext<'_>) -> StewardError {
    StewardError::UnroutedAction {
        token: ctx.event.custom_id().to_string(),
    }
}
