//! Platform Identifiers
//!
//! Opaque identifiers for guilds, channels, messages, threads and users.
//! The host platform hands these out as snowflake strings; the core never
//! interprets them beyond equality and display.

use serde::{Deserialize, Serialize};

macro_rules! platform_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the string value
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

platform_id!(
    /// Top-level tenant; the primary partition key for persisted documents
    GuildId
);
platform_id!(
    /// Text channel (panels and thread parents live in channels)
    ChannelId
);
platform_id!(
    /// A single platform message
    MessageId
);
platform_id!(
    /// A thread under a parent channel
    ThreadId
);
platform_id!(
    /// A platform user
    UserId
);
platform_id!(
    /// A guild role
    RoleId
);

impl ThreadId {
    /// Threads are channels on the platform; messages are posted into them by channel id
    #[must_use]
    pub fn as_channel(&self) -> ChannelId {
        ChannelId(self.0.clone())
    }
}
