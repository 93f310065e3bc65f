//! Latest-request-wins sequencing
//!
//! Every fetch takes a ticket before it starts. When responses arrive out of
//! order, only the one holding the newest ticket may be applied.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Issues monotonically increasing tickets and guards a value so that
/// only the response of the latest ticket can replace it
pub struct RequestSequencer<T> {
    issued: AtomicU64,
    current: Mutex<Option<(RequestTicket, T)>>,
}

impl<T> Default for RequestSequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestSequencer<T> {
    pub fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    pub fn begin(&self) -> RequestTicket {
        RequestTicket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, ticket: RequestTicket) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket.0
    }

    /// Store `value` if `ticket` is still the newest one issued.
    ///
    /// Returns whether the value was applied.
    pub fn complete(&self, ticket: RequestTicket, value: T) -> bool {
        let mut current = self.current.lock();
        if !self.is_latest(ticket) {
            return false;
        }
        *current = Some((ticket, value));
        true
    }
}

impl<T: Clone> RequestSequencer<T> {
    /// The most recently applied value
    pub fn current(&self) -> Option<T> {
        self.current.lock().as_ref().map(|(_, v)| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_tickets_increase() {
        let sequencer: RequestSequencer<()> = RequestSequencer::new();
        let first = sequencer.begin();
        let second = sequencer.begin();

        assert!(second > first);
        assert_eq!(second.generation(), 2);
        assert!(!sequencer.is_latest(first));
        assert!(sequencer.is_latest(second));
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let sequencer = RequestSequencer::new();
        let slow = sequencer.begin();
        let fast = sequencer.begin();

        assert!(sequencer.complete(fast, "week"));
        assert!(!sequencer.complete(slow, "today"));
        assert_eq!(sequencer.current(), Some("week"));
    }

    #[tokio::test]
    async fn test_out_of_order_fetches() {
        let sequencer = Arc::new(RequestSequencer::new());

        let slow = {
            let sequencer = sequencer.clone();
            let ticket = sequencer.begin();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                sequencer.complete(ticket, "all")
            })
        };
        let fast = {
            let sequencer = sequencer.clone();
            let ticket = sequencer.begin();
            tokio::spawn(async move { sequencer.complete(ticket, "month") })
        };

        assert!(fast.await.unwrap());
        assert!(!slow.await.unwrap());
        assert_eq!(sequencer.current(), Some("month"));
    }
}
