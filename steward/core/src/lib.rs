//! Steward Core - Panel, Thread-Log and Action-Routing Backend
//!
//! Headless core of the steward chat bot. It keeps long-lived, editable
//! panels in sync with per-guild configuration documents, appends results to
//! date-bucketed logs and monthly threads, and routes namespaced action tokens
//! from UI interactions to feature handlers.
//!
//! # Architecture
//!
//! ```text
//!            InteractionEvent (from the gateway bridge)
//!                          │
//!              ┌───────────┴───────────┐
//!              │  FollowUpCollector    │  claimed follow-ups end here
//!              └───────────┬───────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!              │     ActionRouter      │  (domain, verb) -> handler
//!              └───────────┬───────────┘
//!                          │
//!        ┌─────────────────┼──────────────────┐
//!        │                 │                  │
//!   ┌────┴─────┐     ┌─────┴──────┐     ┌─────┴──────┐
//!   │ lottery  │     │  report    │     │ settings   │   feature handlers
//!   └────┬─────┘     └─────┬──────┘     └─────┬──────┘
//!        │                 │                  │
//!   ┌────┴─────────────────┴──────────────────┴─────┐
//!   │ DocumentStore │ PanelUpsertEngine │ ThreadResolver │ draw │
//!   └────┬──────────────────────┬───────────────────┘
//!        │                      │
//!   BlobStore (memory / fs)   PlatformClient (memory / Discord REST)
//! ```
//!
//! # Module Overview
//!
//! - [`store`]: document persistence over a blob store
//! - [`panel`]: panel upsert engine
//! - [`threads`]: find-or-unarchive-or-create log threads
//! - [`lottery`]: draw-with-replacement engine
//! - [`router`] / [`token`]: action token grammar and dispatch
//! - [`collector`]: follow-up listening windows
//! - [`cache`]: TTL settings cache with an injected clock
//! - [`features`]: lottery, report and settings handlers
//! - [`platform`]: chat platform capability surface and adapters
//! - [`transport`]: frame protocol spoken with the gateway bridge
//! - [`config`]: TOML / environment / CLI configuration

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod features;
pub mod ids;
pub mod lottery;
pub mod messages;
pub mod panel;
pub mod platform;
pub mod router;
pub mod services;
pub mod store;
pub mod threads;
pub mod token;
pub mod transport;

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use collector::{Delivery, FollowUpCollector, PendingSelection};
pub use error::{best_effort, ErrorCategory, StewardError, StewardResult};
pub use events::{Actor, InteractionEvent, InteractionKind};
pub use features::{build_router, require_admin, GuildSettings, LotteryConfig, ReportConfig};
pub use ids::{ChannelId, GuildId, MessageId, RoleId, ThreadId, UserId};
pub use lottery::{draw, draw_with};
pub use messages::{Component, MessageContent, Reply, SelectOption};
pub use panel::{PanelRecord, PanelUpsert, PanelUpsertEngine, UpsertAction};
pub use platform::{
    DiscordRestClient, InMemoryPlatform, MemberPermissions, MessageRef, PlatformClient,
    PlatformError, ThreadInfo,
};
pub use router::{
    ActionContext, ActionHandler, ActionRouter, DispatchOutcome, Responder, RouterBuildError,
};
pub use services::Services;
pub use store::{
    BlobStore, DateBucket, Document, DocumentStore, FeatureDocument, FsBlobStore,
    MemoryBlobStore, StoreError,
};
pub use threads::{ThreadOrigin, ThreadPolicy, ThreadResolver};
pub use token::ActionToken;
pub use transport::{BridgeFrame, TransportError};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, StewardConfig, StewardToml,
};
