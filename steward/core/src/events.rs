//! Interaction Events
//!
//! Units of work delivered by the host platform: a button press, a menu
//! selection, or a form submission. Each event is independent; the core keeps
//! no identity across events beyond what it persists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, GuildId, UserId};

/// The user who triggered an interaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Platform user id
    pub user_id: UserId,
    /// Name shown in log lines
    pub display_name: String,
}

/// What kind of UI interaction produced the event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionKind {
    /// A button press
    Button {
        /// Action token of the button
        custom_id: String,
    },
    /// A select-menu choice
    Select {
        /// Action token of the menu
        custom_id: String,
        /// Selected option values
        values: Vec<String>,
    },
    /// A submitted form
    Modal {
        /// Action token of the form
        custom_id: String,
        /// Field name to submitted text
        fields: HashMap<String, String>,
    },
}

/// A single interaction delivered by the platform
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Unique id of this interaction (used to correlate replies)
    pub id: String,
    /// Guild the interaction happened in
    pub guild_id: GuildId,
    /// Channel the interaction happened in
    pub channel_id: ChannelId,
    /// Who triggered it
    pub actor: Actor,
    /// What was triggered
    pub kind: InteractionKind,
}

impl InteractionEvent {
    /// Generate a fresh interaction id
    #[must_use]
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Build a button press event
    pub fn button(
        guild_id: impl Into<GuildId>,
        channel_id: impl Into<ChannelId>,
        actor: Actor,
        custom_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Self::new_id(),
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            actor,
            kind: InteractionKind::Button {
                custom_id: custom_id.into(),
            },
        }
    }

    /// Build a select-menu event
    pub fn select(
        guild_id: impl Into<GuildId>,
        channel_id: impl Into<ChannelId>,
        actor: Actor,
        custom_id: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Self {
            id: Self::new_id(),
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            actor,
            kind: InteractionKind::Select {
                custom_id: custom_id.into(),
                values,
            },
        }
    }

    /// Build a form submission event
    pub fn modal<K, V>(
        guild_id: impl Into<GuildId>,
        channel_id: impl Into<ChannelId>,
        actor: Actor,
        custom_id: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: Self::new_id(),
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            actor,
            kind: InteractionKind::Modal {
                custom_id: custom_id.into(),
                fields: fields
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            },
        }
    }

    /// The action token carried by the event
    #[must_use]
    pub fn custom_id(&self) -> &str {
        match &self.kind {
            InteractionKind::Button { custom_id }
            | InteractionKind::Select { custom_id, .. }
            | InteractionKind::Modal { custom_id, .. } => custom_id,
        }
    }

    /// Selected values, empty for non-select events
    #[must_use]
    pub fn selected_values(&self) -> &[String] {
        match &self.kind {
            InteractionKind::Select { values, .. } => values,
            _ => &[],
        }
    }

    /// A submitted form field, trimmed; `None` when absent or blank
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match &self.kind {
            InteractionKind::Modal { fields, .. } => fields
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty()),
            _ => None,
        }
    }
}

impl Actor {
    /// Create an actor
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor::new("u1", "Ana")
    }

    #[test]
    fn test_custom_id_for_each_kind() {
        let button = InteractionEvent::button("g", "c", actor(), "lottery:run:open");
        assert_eq!(button.custom_id(), "lottery:run:open");

        let select =
            InteractionEvent::select("g", "c", actor(), "lottery:count:select", vec!["3".into()]);
        assert_eq!(select.custom_id(), "lottery:count:select");
        assert_eq!(select.selected_values(), ["3".to_string()]);

        let modal = InteractionEvent::modal("g", "c", actor(), "report:submit:A", [("amount", " 12 ")]);
        assert_eq!(modal.field("amount"), Some("12"));
        assert_eq!(modal.field("date"), None);
    }

    #[test]
    fn test_blank_field_is_absent() {
        let modal = InteractionEvent::modal("g", "c", actor(), "x:y", [("label", "   ")]);
        assert_eq!(modal.field("label"), None);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = InteractionEvent::button("g", "c", actor(), "a:b");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "button");
        assert_eq!(json["guild_id"], "g");
    }
}
