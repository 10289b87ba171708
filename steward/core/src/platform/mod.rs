//! Chat Platform Integration
//!
//! Access to the host chat platform through the [`PlatformClient`] trait.
//!
//! # Available Clients
//!
//! - **InMemoryPlatform**: in-process platform for local runs and tests
//! - **DiscordRestClient**: Discord HTTP API

mod discord;
pub mod memory;
mod traits;

pub use discord::{DiscordRestClient, DEFAULT_API_BASE};
pub use memory::{InMemoryPlatform, PlatformOp};
pub use traits::{
    FetchedMessage, MemberPermissions, MessageRef, PlatformClient, PlatformError, ThreadInfo,
};
