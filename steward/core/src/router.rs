//! Action Router
//!
//! Maps an interaction's action token to the feature handler that owns it and
//! turns every outcome into exactly one acknowledgment.
//!
//! # Design Philosophy
//!
//! - Handlers are registered once in a table keyed by `(domain, verb)`; legacy
//!   flat tokens are matched by prefix in registration order. The table is
//!   frozen by [`RouterBuilder::build`].
//! - "No handler" is an explicit [`DispatchOutcome::NotImplemented`], answered
//!   with the standard not-implemented acknowledgment.
//! - Handler failures, including panics, stop at this boundary: they are
//!   logged with the original token and converted into a user-visible failure.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info_span, Instrument};

use crate::error::{best_effort, ErrorCategory, StewardError, StewardResult};
use crate::events::InteractionEvent;
use crate::messages::Reply;
use crate::platform::PlatformError;
use crate::token::ActionToken;

/// Generic text for failures that carry no user-facing detail
pub const GENERIC_FAILURE_TEXT: &str = "Something went wrong. Please try again.";

/// Delivers acknowledgments for interaction events
#[async_trait]
pub trait Responder: Send + Sync {
    /// Send `reply` for the interaction `interaction_id`
    async fn respond(&self, interaction_id: &str, reply: Reply) -> Result<(), PlatformError>;
}

/// Everything a handler gets for one event
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    /// The triggering event
    pub event: &'a InteractionEvent,
    /// Token segments after `domain:verb`, or the legacy remainder
    pub args: &'a [String],
    /// For interim replies before the handler's final one
    pub responder: &'a dyn Responder,
}

impl ActionContext<'_> {
    /// First argument, if any
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// A feature handler for one `(domain, verb)` pair
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Handle the event and produce its final acknowledgment
    async fn handle(&self, ctx: ActionContext<'_>) -> StewardResult<Reply>;
}

/// What [`ActionRouter::dispatch`] did with an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran to completion
    Handled,
    /// No handler owns the token
    NotImplemented,
    /// The handler failed; the user got a failure acknowledgment
    Failed {
        /// Failure classification
        category: ErrorCategory,
    },
}

/// Errors detected while freezing the routing table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterBuildError {
    /// Two handlers for one `(domain, verb)`
    #[error("duplicate route {domain}:{verb}")]
    DuplicateRoute {
        /// Domain segment
        domain: String,
        /// Verb segment
        verb: String,
    },
    /// Two handlers for one legacy prefix
    #[error("duplicate legacy prefix '{0}'")]
    DuplicatePrefix(String),
}

/// Collects registrations before freezing them into an [`ActionRouter`]
#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<(String, String), Arc<dyn ActionHandler>>,
    prefixes: Vec<(String, Arc<dyn ActionHandler>)>,
    duplicate: Option<RouterBuildError>,
}

impl RouterBuilder {
    /// Register a handler for `domain:verb[:...]`
    #[must_use]
    pub fn route(mut self, domain: &str, verb: &str, handler: Arc<dyn ActionHandler>) -> Self {
        let key = (domain.to_string(), verb.to_string());
        if self.routes.contains_key(&key) {
            self.duplicate.get_or_insert(RouterBuildError::DuplicateRoute {
                domain: key.0,
                verb: key.1,
            });
        } else {
            self.routes.insert(key, handler);
        }
        self
    }

    /// Register a handler for legacy tokens starting with `prefix`
    #[must_use]
    pub fn legacy_prefix(mut self, prefix: &str, handler: Arc<dyn ActionHandler>) -> Self {
        if self.prefixes.iter().any(|(p, _)| p == prefix) {
            self.duplicate
                .get_or_insert(RouterBuildError::DuplicatePrefix(prefix.to_string()));
        } else {
            self.prefixes.push((prefix.to_string(), handler));
        }
        self
    }

    /// Freeze the table
    pub fn build(self) -> Result<ActionRouter, RouterBuildError> {
        if let Some(err) = self.duplicate {
            return Err(err);
        }
        Ok(ActionRouter {
            routes: self.routes,
            prefixes: self.prefixes,
        })
    }
}

/// Immutable dispatch table
pub struct ActionRouter {
    routes: HashMap<(String, String), Arc<dyn ActionHandler>>,
    prefixes: Vec<(String, Arc<dyn ActionHandler>)>,
}

impl std::fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<String> = self
            .routes
            .keys()
            .map(|(d, v)| format!("{d}:{v}"))
            .collect();
        routes.sort();
        f.debug_struct("ActionRouter")
            .field("routes", &routes)
            .field(
                "prefixes",
                &self.prefixes.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ActionRouter {
    /// Start building a router
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Number of registered routes and prefixes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len() + self.prefixes.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the handler and its arguments for a raw token
    fn lookup(&self, raw: &str) -> Option<(Arc<dyn ActionHandler>, Vec<String>)> {
        match ActionToken::parse(raw) {
            ActionToken::Structured { domain, verb, args } => self
                .routes
                .get(&(domain, verb))
                .map(|h| (Arc::clone(h), args)),
            ActionToken::Legacy(raw) => self.prefixes.iter().find_map(|(prefix, h)| {
                raw.strip_prefix(prefix.as_str()).map(|rest| {
                    let args = if rest.is_empty() {
                        Vec::new()
                    } else {
                        vec![rest.to_string()]
                    };
                    (Arc::clone(h), args)
                })
            }),
        }
    }

    /// Dispatch an event by its own action token
    pub async fn dispatch_event(
        &self,
        event: &InteractionEvent,
        responder: &dyn Responder,
    ) -> DispatchOutcome {
        self.dispatch(event.custom_id(), event, responder).await
    }

    /// Dispatch `token` for `event`, answering it with a final acknowledgment
    ///
    /// A handler that already answered returns [`Reply::Silent`] and nothing
    /// more is sent.
    pub async fn dispatch(
        &self,
        token: &str,
        event: &InteractionEvent,
        responder: &dyn Responder,
    ) -> DispatchOutcome {
        let span = info_span!(
            "dispatch",
            token = %token,
            interaction_id = %event.id,
            guild_id = %event.guild_id,
        );
        self.dispatch_inner(token, event, responder)
            .instrument(span)
            .await
    }

    async fn dispatch_inner(
        &self,
        token: &str,
        event: &InteractionEvent,
        responder: &dyn Responder,
    ) -> DispatchOutcome {
        let Some((handler, args)) = self.lookup(token) else {
            debug!("No handler registered");
            send(responder, &event.id, Reply::NotImplemented).await;
            return DispatchOutcome::NotImplemented;
        };

        let ctx = ActionContext {
            event,
            args: &args,
            responder,
        };
        let result = AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await;

        let mut follow_up: Option<String> = None;
        let (reply, outcome) = match result {
            Ok(Ok(reply)) => (reply, DispatchOutcome::Handled),
            Ok(Err(StewardError::UnroutedAction { token: unrouted })) => {
                debug!(unrouted = %unrouted, "Handler does not own this action");
                (Reply::NotImplemented, DispatchOutcome::NotImplemented)
            }
            Ok(Err(e)) => {
                let category = e.category();
                match category {
                    ErrorCategory::Validation | ErrorCategory::PermissionDenied => {
                        debug!(error = %e, ?category, "Action rejected");
                    }
                    _ => error!(token = %token, error = %e, ?category, "Action handler failed"),
                }
                follow_up = e.follow_up_interaction().map(str::to_string);
                (e.to_reply(), DispatchOutcome::Failed { category })
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(token = %token, panic = %detail, "Action handler panicked");
                (
                    Reply::failure(GENERIC_FAILURE_TEXT, true),
                    DispatchOutcome::Failed {
                        category: ErrorCategory::Internal,
                    },
                )
            }
        };

        // A failed follow-up is answered on the follow-up, not the original event
        let answer_on = follow_up.as_deref().unwrap_or(event.id.as_str());
        send(responder, answer_on, reply).await;
        outcome
    }
}

async fn send(responder: &dyn Responder, interaction_id: &str, reply: Reply) {
    if reply == Reply::Silent {
        return;
    }
    best_effort("respond", responder.respond(interaction_id, reply)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Actor;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        replies: Mutex<Vec<(String, Reply)>>,
    }

    #[async_trait]
    impl Responder for Recorder {
        async fn respond(&self, interaction_id: &str, reply: Reply) -> Result<(), PlatformError> {
            self.replies.lock().push((interaction_id.to_string(), reply));
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn handle(&self, ctx: ActionContext<'_>) -> StewardResult<Reply> {
            Ok(Reply::ephemeral(ctx.args.join(",")))
        }
    }

    struct Fails(fn() -> StewardError);

    #[async_trait]
    impl ActionHandler for Fails {
        async fn handle(&self, _ctx: ActionContext<'_>) -> StewardResult<Reply> {
            Err((self.0)())
        }
    }

    struct Panics;

    #[async_trait]
    impl ActionHandler for Panics {
        async fn handle(&self, _ctx: ActionContext<'_>) -> StewardResult<Reply> {
            panic!("handler bug");
        }
    }

    fn event(token: &str) -> InteractionEvent {
        InteractionEvent::button("g", "c", Actor::new("u", "User"), token)
    }

    fn router() -> ActionRouter {
        ActionRouter::builder()
            .route("echo", "say", Arc::new(Echo))
            .route(
                "bad",
                "input",
                Arc::new(Fails(|| StewardError::validation("Amount must be a number"))),
            )
            .route(
                "bad",
                "store",
                Arc::new(Fails(|| {
                    StewardError::Storage(crate::store::StoreError::Backend("down".into()))
                })),
            )
            .route("bad", "panic", Arc::new(Panics))
            .route(
                "bad",
                "followup",
                Arc::new(Fails(|| {
                    StewardError::validation("Pick a number").in_follow_up("selection-1")
                })),
            )
            .legacy_prefix("echo_", Arc::new(Echo))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_structured_dispatch_passes_args() {
        let recorder = Recorder::default();
        let ev = event("echo:say:a:b");
        let outcome = router().dispatch_event(&ev, &recorder).await;

        assert_eq!(outcome, DispatchOutcome::Handled);
        let replies = recorder.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, ev.id);
        assert_eq!(replies[0].1.display_text(), "a,b");
    }

    #[tokio::test]
    async fn test_legacy_prefix_remainder_is_single_arg() {
        let recorder = Recorder::default();
        let outcome = router()
            .dispatch_event(&event("echo_Store-A"), &recorder)
            .await;
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(recorder.replies.lock()[0].1.display_text(), "Store-A");
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_implemented() {
        let recorder = Recorder::default();
        for token in ["nope:verb", "echo:shout", "flat-token", ""] {
            let outcome = router().dispatch_event(&event(token), &recorder).await;
            assert_eq!(outcome, DispatchOutcome::NotImplemented, "token {token:?}");
        }
        assert!(recorder
            .replies
            .lock()
            .iter()
            .all(|(_, r)| r == &Reply::NotImplemented));
    }

    #[tokio::test]
    async fn test_handler_failures_become_replies() {
        let recorder = Recorder::default();
        let r = router();

        assert_eq!(
            r.dispatch_event(&event("bad:input"), &recorder).await,
            DispatchOutcome::Failed {
                category: ErrorCategory::Validation
            }
        );
        assert_eq!(
            r.dispatch_event(&event("bad:store"), &recorder).await,
            DispatchOutcome::Failed {
                category: ErrorCategory::Storage
            }
        );
        assert_eq!(
            r.dispatch_event(&event("bad:panic"), &recorder).await,
            DispatchOutcome::Failed {
                category: ErrorCategory::Internal
            }
        );

        let replies = recorder.replies.lock();
        assert_eq!(
            replies[0].1,
            Reply::failure("Amount must be a number", false)
        );
        assert!(matches!(
            replies[1].1,
            Reply::Failure {
                retryable: true,
                ..
            }
        ));
        assert_eq!(replies[2].1, Reply::failure(GENERIC_FAILURE_TEXT, true));
    }

    #[tokio::test]
    async fn test_follow_up_failure_answers_the_follow_up() {
        let recorder = Recorder::default();
        let ev = event("bad:followup");
        let outcome = router().dispatch_event(&ev, &recorder).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Failed {
                category: ErrorCategory::Validation
            }
        );
        let replies = recorder.replies.lock();
        assert_eq!(
            *replies,
            vec![(
                "selection-1".to_string(),
                Reply::failure("Pick a number", false)
            )]
        );
    }

    #[test]
    fn test_duplicate_registrations_rejected() {
        let err = ActionRouter::builder()
            .route("a", "b", Arc::new(Echo))
            .route("a", "b", Arc::new(Echo))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RouterBuildError::DuplicateRoute {
                domain: "a".into(),
                verb: "b".into()
            }
        );

        let err = ActionRouter::builder()
            .legacy_prefix("x_", Arc::new(Echo))
            .legacy_prefix("x_", Arc::new(Echo))
            .build()
            .unwrap_err();
        assert_eq!(err, RouterBuildError::DuplicatePrefix("x_".into()));
    }
}
