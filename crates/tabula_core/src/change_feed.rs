//! Commit notifications.
//!
//! Every commit on a file emits one [`ChangeEvent`]. Subscribers receive
//! events through a channel; handles replay recent history to their
//! listeners when they advance.

use crate::types::Version;
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// One committed write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Version produced by the commit.
    pub version: Version,
    /// Names of the tables the commit touched, sorted.
    ///
    /// Removed tables are listed under their last name.
    pub tables: Vec<String>,
}

/// Distributes commit events to subscribers and keeps a bounded history.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<Vec<ChangeEvent>>,
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a change feed with a history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Records and broadcasts an event. Disconnected subscribers are dropped.
    pub fn emit(&self, event: ChangeEvent) {
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
        }
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Events with `after < version <= up_to`, oldest first.
    ///
    /// Events older than the history limit are gone.
    pub fn between(&self, after: Version, up_to: Version) -> Vec<ChangeEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.version > after && e.version <= up_to)
            .cloned()
            .collect()
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events kept.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(v: u64) -> ChangeEvent {
        ChangeEvent {
            version: Version::new(v),
            tables: vec!["person".into()],
        }
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::with_max_history(8);
        let rx = feed.subscribe();
        feed.emit(event(1));
        assert_eq!(rx.recv_timeout(Duration::from_millis(100)).unwrap(), event(1));
    }

    #[test]
    fn dropped_subscriber_is_removed() {
        let feed = ChangeFeed::with_max_history(8);
        let rx = feed.subscribe();
        let _keep = feed.subscribe();
        drop(rx);
        feed.emit(event(1));
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let feed = ChangeFeed::with_max_history(3);
        for v in 1..=5 {
            feed.emit(event(v));
        }
        assert_eq!(feed.history_len(), 3);
        let got: Vec<_> = feed
            .between(Version::new(0), Version::new(5))
            .iter()
            .map(|e| e.version.as_u64())
            .collect();
        assert_eq!(got, vec![3, 4, 5]);
    }

    #[test]
    fn between_is_half_open() {
        let feed = ChangeFeed::with_max_history(8);
        for v in 1..=4 {
            feed.emit(event(v));
        }
        let got = feed.between(Version::new(1), Version::new(3));
        assert_eq!(got, vec![event(2), event(3)]);
    }
}
