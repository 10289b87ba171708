//! Follow-up Collector
//!
//! Bounded listening windows for a single follow-up interaction, such as the
//! count selection that follows a draw button press.
//!
//! A flow registers interest in `(user, custom_id)` *before* prompting the
//! user, then waits. Incoming events are offered to the collector before
//! routing; a claimed event goes to the waiting flow instead of the router.
//! When the window elapses the listener is dropped silently: no reply, no
//! cancellation path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::events::InteractionEvent;
use crate::ids::UserId;

/// Default listening window
pub const DEFAULT_FOLLOW_UP_TIMEOUT: Duration = Duration::from_secs(60);

type ListenerKey = (UserId, String);

struct Listener {
    id: u64,
    sender: oneshot::Sender<InteractionEvent>,
}

/// Result of offering an event to the collector
#[derive(Debug)]
pub enum Delivery {
    /// A waiting flow took the event
    Claimed,
    /// Nobody was waiting; route it normally
    Unclaimed(InteractionEvent),
}

/// Registry of open listening windows
#[derive(Clone, Default)]
pub struct FollowUpCollector {
    listeners: Arc<DashMap<ListenerKey, Listener>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for FollowUpCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowUpCollector")
            .field("open", &self.listeners.len())
            .finish()
    }
}

/// An open listening window
#[must_use = "a pending selection does nothing unless awaited"]
pub struct PendingSelection {
    key: ListenerKey,
    id: u64,
    receiver: oneshot::Receiver<InteractionEvent>,
    listeners: Arc<DashMap<ListenerKey, Listener>>,
}

impl FollowUpCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open windows
    #[must_use]
    pub fn pending(&self) -> usize {
        self.listeners.len()
    }

    /// Open a window for the next `custom_id` event from `user`
    ///
    /// A newer window for the same key replaces the older one, which then
    /// resolves to nothing.
    pub fn register(&self, user: &UserId, custom_id: &str) -> PendingSelection {
        let key = (user.clone(), custom_id.to_string());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.listeners.insert(key.clone(), Listener { id, sender });
        PendingSelection {
            key,
            id,
            receiver,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Register and wait in one step
    pub async fn await_selection(
        &self,
        user: &UserId,
        custom_id: &str,
        timeout: Duration,
    ) -> Option<InteractionEvent> {
        self.register(user, custom_id).wait(timeout).await
    }

    /// Offer an incoming event to any open window
    pub fn try_deliver(&self, event: InteractionEvent) -> Delivery {
        let key = (event.actor.user_id.clone(), event.custom_id().to_string());
        let Some((_, listener)) = self.listeners.remove(&key) else {
            return Delivery::Unclaimed(event);
        };
        match listener.sender.send(event) {
            Ok(()) => {
                debug!(user_id = %key.0, custom_id = %key.1, "Follow-up delivered");
                Delivery::Claimed
            }
            // The waiting flow is gone
            Err(event) => Delivery::Unclaimed(event),
        }
    }
}

impl PendingSelection {
    /// Wait up to `timeout` for the follow-up; `None` when the window lapses
    pub async fn wait(mut self, timeout: Duration) -> Option<InteractionEvent> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(event)) => Some(event),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(user_id = %self.key.0, custom_id = %self.key.1, "Follow-up window elapsed");
                None
            }
        }
    }
}

impl Drop for PendingSelection {
    fn drop(&mut self) {
        let id = self.id;
        self.listeners.remove_if(&self.key, |_, l| l.id == id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Actor;

    fn select(user: &str, custom_id: &str) -> InteractionEvent {
        InteractionEvent::select(
            "g",
            "c",
            Actor::new(user, "User"),
            custom_id,
            vec!["3".into()],
        )
    }

    #[tokio::test]
    async fn test_delivery_to_waiting_flow() {
        let collector = FollowUpCollector::new();
        let pending = collector.register(&UserId::from("u1"), "lottery:count:select");

        assert!(matches!(
            collector.try_deliver(select("u1", "lottery:count:select")),
            Delivery::Claimed
        ));
        let event = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(event.selected_values(), ["3".to_string()]);
        assert_eq!(collector.pending(), 0);
    }

    #[tokio::test]
    async fn test_other_users_are_not_claimed() {
        let collector = FollowUpCollector::new();
        let _pending = collector.register(&UserId::from("u1"), "lottery:count:select");

        assert!(matches!(
            collector.try_deliver(select("u2", "lottery:count:select")),
            Delivery::Unclaimed(_)
        ));
        assert_eq!(collector.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapses_silently() {
        let collector = FollowUpCollector::new();
        let result = collector
            .await_selection(&UserId::from("u1"), "x:y", Duration::from_secs(60))
            .await;
        assert!(result.is_none());
        assert_eq!(collector.pending(), 0);

        // Late events route normally
        assert!(matches!(
            collector.try_deliver(select("u1", "x:y")),
            Delivery::Unclaimed(_)
        ));
    }

    #[tokio::test]
    async fn test_newer_window_replaces_older() {
        let collector = FollowUpCollector::new();
        let user = UserId::from("u1");
        let older = collector.register(&user, "x:y");
        let newer = collector.register(&user, "x:y");

        assert!(older.wait(Duration::from_secs(1)).await.is_none());
        assert_eq!(collector.pending(), 1);

        assert!(matches!(
            collector.try_deliver(select("u1", "x:y")),
            Delivery::Claimed
        ));
        assert!(newer.wait(Duration::from_secs(1)).await.is_some());
    }
}
