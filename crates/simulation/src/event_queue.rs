//! Deterministic event ordering.

use sba_core::EventPriority;
use std::time::Duration;

/// Global ordering key: time first, then priority, then insertion
/// sequence. Identical runs produce identical orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_time_then_priority_then_seq() {
        let early = EventKey {
            time: Duration::from_millis(1),
            priority: EventPriority::Network,
            seq: 9,
        };
        let late = EventKey {
            time: Duration::from_millis(2),
            priority: EventPriority::Internal,
            seq: 0,
        };
        assert!(early < late);

        assert!(
            EventKey {
                time: Duration::from_millis(2),
                priority: EventPriority::Internal,
                seq: 0,
            } < EventKey {
                time: Duration::from_millis(2),
                priority: EventPriority::Timer,
                seq: 0,
            }
        );
    }
}
