//! Subscription Set
//!
//! The cumulative set of channels a connection should be listening to. Only
//! `subscribe`/`unsubscribe` mutate it; reconnect reads a snapshot to build
//! the restoration frame.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// Shared, ordered set of channel names.
///
/// Clones share the same underlying set.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    channels: Arc<RwLock<BTreeSet<String>>>,
}

impl SubscriptionSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add channels, returning the ones that were not present yet.
    pub fn add<I, S>(&self, channels: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.channels.write();
        channels
            .into_iter()
            .map(Into::into)
            .filter(|channel| set.insert(channel.clone()))
            .collect()
    }

    /// Remove channels, returning the ones that were present.
    pub fn remove<I, S>(&self, channels: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.channels.write();
        channels
            .into_iter()
            .map(Into::into)
            .filter(|channel| set.remove(channel))
            .collect()
    }

    /// Sorted copy of the current channels.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.channels.read().iter().cloned().collect()
    }

    /// Whether `channel` is subscribed.
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.read().contains(channel)
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn add_reports_only_new_channels() {
        let set = SubscriptionSet::new();
        assert_eq!(set.add(["T.AAPL", "Q.AAPL"]), vec!["T.AAPL", "Q.AAPL"]);
        assert_eq!(set.add(["T.AAPL", "AM.AAPL"]), vec!["AM.AAPL"]);
        assert_eq!(set.snapshot(), vec!["AM.AAPL", "Q.AAPL", "T.AAPL"]);
    }

    #[test]
    fn remove_reports_only_present_channels() {
        let set = SubscriptionSet::new();
        set.add(["T.AAPL"]);
        assert_eq!(set.remove(["T.AAPL", "Q.AAPL"]), vec!["T.AAPL"]);
        assert!(set.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let set = SubscriptionSet::new();
        let view = set.clone();
        set.add(["trade_updates"]);
        assert!(view.contains("trade_updates"));
        assert_eq!(view.len(), 1);
    }

    proptest! {
        #[test]
        fn cumulative_subscriptions_are_the_union(
            a in proptest::collection::btree_set("[A-Z]{1,2}\\.[A-Z]{1,4}", 0..8),
            b in proptest::collection::btree_set("[A-Z]{1,2}\\.[A-Z]{1,4}", 0..8),
        ) {
            let set = SubscriptionSet::new();
            set.add(a.iter().cloned());
            set.add(b.iter().cloned());
            let expected: Vec<String> = a.union(&b).cloned().collect();
            prop_assert_eq!(set.snapshot(), expected);
        }
    }
}
