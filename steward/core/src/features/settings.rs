//! Guild-wide settings: panel channel, admin roles, locale.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{require_admin, unrouted};
use crate::error::{best_effort, StewardError, StewardResult};
use crate::ids::{ChannelId, GuildId, RoleId};
use crate::messages::{Component, MessageContent, Reply};
use crate::router::{ActionContext, ActionHandler};
use crate::services::Services;
use crate::store::{decode_document, FeatureDocument};

/// Feature key
pub const FEATURE: &str = "settings";

/// Fields `settings:set:<field>` may write
pub const EDITABLE_FIELDS: [&str; 3] = ["panel_channel_id", "admin_role_ids", "locale"];

/// `{guild}/settings/config`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    /// Where the settings panel lives
    pub panel_channel_id: Option<ChannelId>,
    /// Roles allowed to run admin actions in every feature
    pub admin_role_ids: Vec<RoleId>,
    /// Display locale, e.g. `en` or `pt-BR`
    pub locale: Option<String>,
}

impl FeatureDocument for GuildSettings {
    const FEATURE_KEY: &'static str = FEATURE;

    fn validate(&self) -> StewardResult<()> {
        if let Some(ref locale) = self.locale {
            if !is_locale(locale) {
                return Err(StewardError::validation(format!(
                    "'{locale}' is not a locale like en or pt-BR"
                )));
            }
        }
        if self.admin_role_ids.iter().any(|r| r.as_str().is_empty()) {
            return Err(StewardError::validation("Role ids cannot be empty"));
        }
        Ok(())
    }
}

fn is_locale(value: &str) -> bool {
    let mut parts = value.split('-');
    let lang = parts.next().unwrap_or_default();
    let region = parts.next();
    lang.len() == 2
        && lang.chars().all(|c| c.is_ascii_lowercase())
        && region.map_or(true, |r| {
            r.len() == 2 && r.chars().all(|c| c.is_ascii_uppercase())
        })
        && parts.next().is_none()
}

/// Turn submitted text into the stored JSON value for `field`
fn parse_field(field: &str, raw: Option<&str>) -> StewardResult<Value> {
    match field {
        "admin_role_ids" => Ok(Value::Array(
            raw.unwrap_or_default()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        )),
        "panel_channel_id" | "locale" => Ok(raw.map_or(Value::Null, |v| Value::String(v.to_string()))),
        other => Err(StewardError::validation(format!("Unknown setting '{other}'"))),
    }
}

/// Render the settings panel
#[must_use]
pub fn render_panel(settings: &GuildSettings) -> MessageContent {
    let roles = if settings.admin_role_ids.is_empty() {
        "none".to_string()
    } else {
        settings
            .admin_role_ids
            .iter()
            .map(|r| format!("<@&{r}>"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let content = format!(
        "**Settings**\nAdmin roles: {roles}\nLocale: {}",
        settings.locale.as_deref().unwrap_or("default")
    );

    EDITABLE_FIELDS
        .iter()
        .fold(MessageContent::text(content), |body, field| {
            body.with_component(Component::button(
                format!("settings:set:{field}"),
                format!("Edit {}", field.replace('_', " ")),
            ))
        })
}

/// Which settings verb a handler instance serves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsAction {
    /// `settings:set:<field>`
    Set,
    /// `settings:panel:refresh`
    Panel,
}

/// Handler for the settings feature
#[derive(Debug)]
pub struct SettingsHandler {
    services: Services,
    action: SettingsAction,
}

impl SettingsHandler {
    /// Create a handler for one verb
    pub fn new(services: Services, action: SettingsAction) -> Self {
        Self { services, action }
    }

    async fn set(&self, ctx: ActionContext<'_>, field: &str) -> StewardResult<Reply> {
        let event = ctx.event;
        require_admin(&self.services, event, &[]).await?;

        let value = parse_field(field, event.field("value"))?;

        // Reject before writing: set_field itself never validates
        let mut candidate = self
            .services
            .documents
            .get_document(&event.guild_id, FEATURE)
            .await?;
        candidate.insert(field.to_string(), value.clone());
        let updated: GuildSettings = decode_document(&event.guild_id, candidate)?;

        self.services
            .set_field(&event.guild_id, FEATURE, field, value)
            .await?;
        info!(guild_id = %event.guild_id, field, user_id = %event.actor.user_id, "Setting updated");

        best_effort("settings panel refresh", refresh_panel(&self.services, &event.guild_id, &updated))
            .await;
        Ok(Reply::ephemeral(format!("Updated {}.", field.replace('_', " "))))
    }

    async fn panel(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        require_admin(&self.services, ctx.event, &[]).await?;
        let settings: GuildSettings = self.services.load_config(&ctx.event.guild_id).await?;
        if settings.panel_channel_id.is_none() {
            return Err(StewardError::validation(
                "Set a panel channel before refreshing the settings panel.",
            ));
        }
        refresh_panel(&self.services, &ctx.event.guild_id, &settings).await?;
        Ok(Reply::ephemeral("Settings panel refreshed."))
    }
}

/// Upsert the settings panel when a panel channel is configured
pub async fn refresh_panel(
    services: &Services,
    guild: &GuildId,
    settings: &GuildSettings,
) -> StewardResult<()> {
    if let Some(ref channel) = settings.panel_channel_id {
        services
            .panels
            .upsert_panel(guild, FEATURE, channel, || render_panel(settings))
            .await?;
    }
    Ok(())
}

#[async_trait]
impl ActionHandler for SettingsHandler {
    async fn handle(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
        match (self.action, ctx.arg(0)) {
            (SettingsAction::Set, Some(field)) if EDITABLE_FIELDS.contains(&field) => {
                self.set(ctx, field).await
            }
            (SettingsAction::Panel, Some("refresh")) => self.panel(ctx).await,
            _ => Err(unrouted(&ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_locale_shapes() {
        assert!(is_locale("en"));
        assert!(is_locale("pt-BR"));
        assert!(!is_locale("english"));
        assert!(!is_locale("pt-br"));
        assert!(!is_locale("en-US-x"));
    }

    #[test]
    fn test_role_list_parsing() {
        assert_eq!(
            parse_field("admin_role_ids", Some("r1, r2  r3")).unwrap(),
            json!(["r1", "r2", "r3"])
        );
        assert_eq!(parse_field("admin_role_ids", None).unwrap(), json!([]));
        assert_eq!(parse_field("locale", None).unwrap(), Value::Null);
        assert!(parse_field("owner", Some("x")).is_err());
    }

    #[test]
    fn test_panel_lists_edit_buttons() {
        let body = render_panel(&GuildSettings::default());
        let ids: Vec<&str> = body.components.iter().map(Component::custom_id).collect();
        assert_eq!(
            ids,
            vec![
                "settings:set:panel_channel_id",
                "settings:set:admin_role_ids",
                "settings:set:locale"
            ]
        );
    }
}
