//! Sources of request ids for outbound calls.
//!
//! An id generator is nothing more than an [`Iterator`] of [`types::Id`] values.  It's
//! conceptually infinite; if it ever returns `None` the peer treats that as a fatal error and
//! refuses to issue any more calls with it.
use uuid::Uuid;

use crate::{JsonRpcError, Result, types};

/// Largest integer that survives a round trip through an IEEE-754 double, which is what most
/// JSON implementations on the other end of the wire will parse numbers into.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Smallest integer that survives a round trip through an IEEE-754 double.
pub const MIN_SAFE_INTEGER: i64 = -MAX_SAFE_INTEGER;

/// Type-erased id generator as held by a [`crate::Peer`].
pub type BoxedIdGenerator = Box<dyn Iterator<Item = types::Id> + Send + 'static>;

/// The default id generator: an integer counter that wraps around from [`MAX_SAFE_INTEGER`] to
/// [`MIN_SAFE_INTEGER`] instead of overflowing.
#[derive(Debug, Clone)]
pub struct CounterIdGenerator {
    next: i64,
}

impl CounterIdGenerator {
    /// Counter starting at 0
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Counter starting at `start`, which must be within the safe integer range.
    pub fn starting_at(start: i64) -> Result<Self> {
        if !(MIN_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&start) {
            return Err(JsonRpcError::InvalidIdStart { start });
        }

        Ok(Self { next: start })
    }
}

impl Default for CounterIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for CounterIdGenerator {
    type Item = types::Id;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next;
        self.next = if id >= MAX_SAFE_INTEGER {
            MIN_SAFE_INTEGER
        } else {
            id + 1
        };

        Some(types::Id::Number(id))
    }
}

/// Id generator producing string ids from time-ordered v7 UUIDs.
///
/// Useful when ids need to be unique across connections as well as within one, for example to
/// correlate requests in logs from multiple processes.
#[derive(Debug, Clone, Default)]
pub struct UuidIdGenerator;

impl Iterator for UuidIdGenerator {
    type Item = types::Id;

    fn next(&mut self) -> Option<Self::Item> {
        Some(types::Id::Str(Uuid::now_v7().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;
    use types::Id;

    #[test]
    fn test_counter_starts_at_zero() {
        let ids: Vec<_> = CounterIdGenerator::new().take(3).collect();
        assert_eq!(ids, vec![Id::Number(0), Id::Number(1), Id::Number(2)]);
    }

    #[test]
    fn test_counter_yields_distinct_values() {
        let ids: HashSet<_> = CounterIdGenerator::starting_at(-500).unwrap().take(1000).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_counter_wraps_at_max_safe_integer() {
        let mut generator = CounterIdGenerator::starting_at(MAX_SAFE_INTEGER - 1).unwrap();
        assert_eq!(generator.next(), Some(Id::Number(MAX_SAFE_INTEGER - 1)));
        assert_eq!(generator.next(), Some(Id::Number(MAX_SAFE_INTEGER)));
        assert_eq!(generator.next(), Some(Id::Number(MIN_SAFE_INTEGER)));
        assert_eq!(generator.next(), Some(Id::Number(MIN_SAFE_INTEGER + 1)));
    }

    #[test]
    fn test_counter_rejects_out_of_range_start() {
        assert_matches!(
            CounterIdGenerator::starting_at(MAX_SAFE_INTEGER + 1),
            Err(JsonRpcError::InvalidIdStart { start }) if start == MAX_SAFE_INTEGER + 1
        );
        assert_matches!(
            CounterIdGenerator::starting_at(i64::MIN),
            Err(JsonRpcError::InvalidIdStart { .. })
        );
        assert!(CounterIdGenerator::starting_at(MIN_SAFE_INTEGER).is_ok());
    }

    #[test]
    fn test_uuid_ids_are_unique_strings() {
        let ids: HashSet<_> = UuidIdGenerator.take(100).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| matches!(id, Id::Str(_))));
    }
}
