//! Event sequence guard for projections
//!
//! Projections see each product's events in log order, so sequences only
//! move forward. A record at or below the last seen sequence is a duplicate
//! (for example after a reader restart) and is dropped. A jump forward is a
//! gap: the event is still applied, but the gap is logged and counted.

use tracing::{debug, warn};

/// Outcome of checking one sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Next in order (or the first one seen).
    Accept,
    /// Already seen; skip it.
    Duplicate,
    /// Ahead of the expected sequence; apply it anyway.
    Gap { expected: u64, actual: u64 },
}

impl SequenceCheck {
    /// Whether the event should be applied.
    pub fn is_applicable(&self) -> bool {
        !matches!(self, SequenceCheck::Duplicate)
    }
}

/// Tracks the last sequence a projection applied.
#[derive(Debug, Clone, Default)]
pub struct SequenceGuard {
    last_sequence: Option<u64>,
    duplicates: u64,
    gaps: u64,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, sequence: u64) -> SequenceCheck {
        let Some(last) = self.last_sequence else {
            self.last_sequence = Some(sequence);
            return SequenceCheck::Accept;
        };

        if sequence <= last {
            self.duplicates += 1;
            debug!(sequence, last_sequence = last, "Dropping duplicate event");
            return SequenceCheck::Duplicate;
        }

        self.last_sequence = Some(sequence);
        let expected = last + 1;
        if sequence > expected {
            self.gaps += 1;
            warn!(expected, actual = sequence, "Sequence gap detected");
            return SequenceCheck::Gap {
                expected,
                actual: sequence,
            };
        }
        SequenceCheck::Accept
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Duplicates dropped so far
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Gaps seen so far
    pub fn gaps(&self) -> u64 {
        self.gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_events_accepted() {
        let mut guard = SequenceGuard::new();
        for seq in 1..=10 {
            assert_eq!(guard.check(seq), SequenceCheck::Accept);
        }
        assert_eq!(guard.last_sequence(), Some(10));
    }

    #[test]
    fn test_first_event_can_start_anywhere() {
        let mut guard = SequenceGuard::new();
        assert_eq!(guard.check(100), SequenceCheck::Accept);
        assert_eq!(guard.check(101), SequenceCheck::Accept);
    }

    #[test]
    fn test_duplicate_detection() {
        let mut guard = SequenceGuard::new();
        guard.check(1);
        guard.check(2);

        assert_eq!(guard.check(2), SequenceCheck::Duplicate);
        assert_eq!(guard.check(1), SequenceCheck::Duplicate);
        assert!(!guard.check(2).is_applicable());
        assert_eq!(guard.duplicates(), 3);
        assert_eq!(guard.last_sequence(), Some(2));
    }

    #[test]
    fn test_gap_is_applied_and_counted() {
        let mut guard = SequenceGuard::new();
        guard.check(1);

        let check = guard.check(5);
        assert_eq!(check, SequenceCheck::Gap { expected: 2, actual: 5 });
        assert!(check.is_applicable());
        assert_eq!(guard.gaps(), 1);
        assert_eq!(guard.check(6), SequenceCheck::Accept);
    }
}
