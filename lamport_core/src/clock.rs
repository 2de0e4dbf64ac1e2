//! Lamport logical clock.
//!
//! One instance per node, owned by that node's event loop. The three update
//! rules all return the post-update value, which is exactly what the event
//! record for that tick must carry.
//!
//! Arithmetic saturates at `u64::MAX`; a clock never wraps back to zero.

/// A node's monotonic logical counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogicalClock {
    value: u64,
}

impl LogicalClock {
    /// A clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock starting at `value` (test setups, restarts from a snapshot).
    pub fn starting_at(value: u64) -> Self {
        Self { value }
    }

    /// Current value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Local event: `current + 1`.
    pub fn tick_internal(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    /// Send event: `current + 1`, regardless of how many peers were addressed.
    pub fn tick_send(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    /// Receive event: `max(current, remote) + 1`.
    pub fn tick_receive(&mut self, remote_clock: u64) -> u64 {
        self.value = self.value.max(remote_clock).saturating_add(1);
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_receive_examples() {
        let mut ahead = LogicalClock::starting_at(5);
        assert_eq!(ahead.tick_receive(2), 6);

        let mut behind = LogicalClock::starting_at(2);
        assert_eq!(behind.tick_receive(5), 6);

        let mut equal = LogicalClock::starting_at(5);
        assert_eq!(equal.tick_receive(5), 6);
    }

    #[test]
    fn test_internal_and_send_increment_by_one() {
        let mut clock = LogicalClock::new();
        assert_eq!(clock.tick_internal(), 1);
        assert_eq!(clock.tick_send(), 2);
        assert_eq!(clock.value(), 2);
    }

    #[test]
    fn test_receive_of_max_clock_saturates() {
        let mut clock = LogicalClock::starting_at(3);
        assert_eq!(clock.tick_receive(u64::MAX), u64::MAX);
        assert_eq!(clock.tick_internal(), u64::MAX);
        assert_eq!(clock.tick_send(), u64::MAX);
        assert_eq!(clock.tick_receive(0), u64::MAX);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Internal,
        Send,
        Receive(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Internal),
            Just(Op::Send),
            (0u64..1_000_000).prop_map(Op::Receive),
        ]
    }

    proptest! {
        #[test]
        fn prop_receive_is_max_plus_one(old in 0u64..u64::MAX / 2, remote in 0u64..u64::MAX / 2) {
            let mut clock = LogicalClock::starting_at(old);
            prop_assert_eq!(clock.tick_receive(remote), old.max(remote) + 1);
        }

        #[test]
        fn prop_every_event_strictly_increases(ops in prop::collection::vec(op(), 1..200)) {
            let mut clock = LogicalClock::new();
            for op in ops {
                let before = clock.value();
                let after = match op {
                    Op::Internal => clock.tick_internal(),
                    Op::Send => clock.tick_send(),
                    Op::Receive(remote) => clock.tick_receive(remote),
                };
                prop_assert!(after >= before + 1);
                prop_assert_eq!(after, clock.value());
            }
        }
    }
}
