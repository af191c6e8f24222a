//! Fan-out of progress events to named observer groups.
//!
//! Each group is a [`tokio::sync::broadcast`] channel created on first use.
//! Publishing never blocks and never fails: events sent to a group nobody
//! listens to are dropped, and a group whose last subscriber went away is
//! removed on the next publish.

use crate::credentials::AccountId;
use crate::events::ProgressEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default prefix of per-account groups.
pub const DEFAULT_GROUP_PREFIX: &str = "mail_progress";

/// Name of an observer group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressGroup(String);

impl ProgressGroup {
    /// The group carrying events for one account: `{prefix}.{account}`.
    #[must_use]
    pub fn for_account(prefix: &str, account: AccountId) -> Self {
        Self(format!("{prefix}.{account}"))
    }

    /// A group with an arbitrary name, e.g. one shared by all accounts.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the group name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgressGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broadcasts [`ProgressEvent`]s to subscribers of a group.
#[derive(Debug)]
pub struct ProgressPublisher {
    groups: Mutex<HashMap<ProgressGroup, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
}

impl ProgressPublisher {
    /// Creates a publisher whose per-group buffers hold `capacity` events.
    ///
    /// A subscriber that falls further behind skips the oldest events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Sends `event` to every current subscriber of `group`.
    pub fn publish(&self, group: &ProgressGroup, event: ProgressEvent) {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(sender) = groups.get(group) else {
            trace!(group = %group, "No subscribers, event dropped");
            return;
        };

        if sender.send(event).is_err() {
            trace!(group = %group, "Last subscriber gone, removing group");
            groups.remove(group);
        }
    }

    /// Joins `group`, creating it if needed.
    #[must_use]
    pub fn subscribe(&self, group: &ProgressGroup) -> Subscription {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.capacity;

        let rx = groups
            .entry(group.clone())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        Subscription {
            group: group.clone(),
            rx,
        }
    }

    /// Number of live subscribers in `group`.
    #[must_use]
    pub fn subscriber_count(&self, group: &ProgressGroup) -> usize {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CHANNEL_CAPACITY)
    }
}

/// A subscriber's end of a group.
#[derive(Debug)]
pub struct Subscription {
    group: ProgressGroup,
    rx: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// Returns `None` once the publisher has dropped the group. Events lost
    /// because this subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(group = %self.group, skipped, "Subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(group = %self.group, skipped, "Subscriber lagged, events skipped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains every buffered event.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// The group this subscription belongs to.
    #[must_use]
    pub fn group(&self) -> &ProgressGroup {
        &self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> ProgressGroup {
        ProgressGroup::for_account(DEFAULT_GROUP_PREFIX, AccountId(7))
    }

    #[test]
    fn test_group_names() {
        assert_eq!(group().as_str(), "mail_progress.7");
        assert_eq!(ProgressGroup::named("mail_progress").to_string(), "mail_progress");
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let publisher = ProgressPublisher::new(8);
        publisher.publish(&group(), ProgressEvent::progress(1, 1));
        assert_eq!(publisher.subscriber_count(&group()), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_events_in_order() {
        let publisher = ProgressPublisher::new(8);
        let mut first = publisher.subscribe(&group());
        let mut second = publisher.subscribe(&group());

        publisher.publish(&group(), ProgressEvent::progress(1, 2));
        publisher.publish(&group(), ProgressEvent::progress(2, 2));

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await, Some(ProgressEvent::progress(1, 2)));
            assert_eq!(sub.recv().await, Some(ProgressEvent::progress(2, 2)));
        }
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let publisher = ProgressPublisher::new(8);
        let other = ProgressGroup::for_account(DEFAULT_GROUP_PREFIX, AccountId(8));
        let mut mine = publisher.subscribe(&group());
        let mut theirs = publisher.subscribe(&other);

        publisher.publish(&group(), ProgressEvent::error("boom"));

        assert_eq!(mine.recv().await, Some(ProgressEvent::error("boom")));
        assert!(theirs.try_recv().is_none());
    }

    #[test]
    fn test_departed_group_is_pruned() {
        let publisher = ProgressPublisher::new(8);
        let sub = publisher.subscribe(&group());
        assert_eq!(publisher.subscriber_count(&group()), 1);

        drop(sub);
        publisher.publish(&group(), ProgressEvent::progress(1, 1));

        assert_eq!(publisher.subscriber_count(&group()), 0);
        assert!(publisher.groups.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lagging_subscriber_skips_oldest() {
        let publisher = ProgressPublisher::new(2);
        let mut sub = publisher.subscribe(&group());

        for processed in 1..=4 {
            publisher.publish(&group(), ProgressEvent::progress(processed, 4));
        }

        assert_eq!(
            sub.drain(),
            vec![ProgressEvent::progress(3, 4), ProgressEvent::progress(4, 4)]
        );
    }
}
