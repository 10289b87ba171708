//! Outbound Content and Replies
//!
//! Types the core hands to the platform: rendered message content for panels
//! and log lines, and the [`Reply`] acknowledgment sent back for each
//! interaction event.

use serde::{Deserialize, Serialize};

/// One option of a select menu
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Text shown to the user
    pub label: String,
    /// Value delivered back in the follow-up event
    pub value: String,
}

impl SelectOption {
    /// Create an option whose label and value are the same
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

/// Interactive control attached to a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    /// A push button carrying an action token
    Button {
        /// Action token delivered when pressed
        custom_id: String,
        /// Button text
        label: String,
    },
    /// A single-choice select menu
    Select {
        /// Action token delivered on selection
        custom_id: String,
        /// Hint text shown before a choice is made
        placeholder: String,
        /// Available options
        options: Vec<SelectOption>,
    },
}

impl Component {
    /// Build a button
    pub fn button(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Button {
            custom_id: custom_id.into(),
            label: label.into(),
        }
    }

    /// Build a select menu
    pub fn select(
        custom_id: impl Into<String>,
        placeholder: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self::Select {
            custom_id: custom_id.into(),
            placeholder: placeholder.into(),
            options,
        }
    }

    /// The action token this control emits
    #[must_use]
    pub fn custom_id(&self) -> &str {
        match self {
            Self::Button { custom_id, .. } | Self::Select { custom_id, .. } => custom_id,
        }
    }
}

/// Rendered body of a platform message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Text body
    pub content: String,
    /// Interactive controls, in display order
    #[serde(default)]
    pub components: Vec<Component>,
}

impl MessageContent {
    /// Plain text with no controls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            components: Vec::new(),
        }
    }

    /// Attach a control
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }
}

/// Acknowledgment sent back for an interaction event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// A visible response
    Message {
        /// Response body
        body: MessageContent,
        /// Only the initiating user sees it
        ephemeral: bool,
    },
    /// Standard acknowledgment for tokens with no registered handler
    NotImplemented,
    /// The operation failed
    Failure {
        /// Text shown to the initiating user
        message: String,
        /// Whether the user should try again
        retryable: bool,
    },
    /// The interaction was accepted; the result follows separately
    Deferred,
    /// Nothing further to send; the interaction was already answered
    Silent,
}

/// Text of the standard "not implemented" acknowledgment
pub const NOT_IMPLEMENTED_TEXT: &str = "This action is not available yet.";

impl Reply {
    /// Ephemeral text reply
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self::Message {
            body: MessageContent::text(content),
            ephemeral: true,
        }
    }

    /// Ephemeral reply with controls
    #[must_use]
    pub fn ephemeral_body(body: MessageContent) -> Self {
        Self::Message {
            body,
            ephemeral: true,
        }
    }

    /// Reply visible to the whole channel
    pub fn public(content: impl Into<String>) -> Self {
        Self::Message {
            body: MessageContent::text(content),
            ephemeral: false,
        }
    }

    /// Failure acknowledgment
    pub fn failure(message: impl Into<String>, retryable: bool) -> Self {
        Self::Failure {
            message: message.into(),
            retryable,
        }
    }

    /// Text a user would see for this reply
    #[must_use]
    pub fn display_text(&self) -> &str {
        match self {
            Self::Message { body, .. } => &body.content,
            Self::NotImplemented => NOT_IMPLEMENTED_TEXT,
            Self::Failure { message, .. } => message,
            Self::Deferred | Self::Silent => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_wire_shape() {
        let reply = Reply::failure("nope", true);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "failure");
        assert_eq!(json["retryable"], true);

        let json = serde_json::to_value(Reply::NotImplemented).unwrap();
        assert_eq!(json["type"], "not_implemented");
    }

    #[test]
    fn test_component_custom_id() {
        let button = Component::button("lottery:run:open", "Draw");
        assert_eq!(button.custom_id(), "lottery:run:open");

        let select = Component::select("lottery:count:select", "How many?", vec![]);
        assert_eq!(select.custom_id(), "lottery:count:select");
    }
}
