//! Log sequence numbers
//!
//! An LSN identifies one position in the WAL: the segment the record lives
//! in and the byte position of its frame within that segment. LSNs are
//! compared lexicographically, segment first, so the derived ordering is the
//! log order.

use std::fmt;

/// A totally ordered position in the write-ahead log.
///
/// Immutable value type; used as a map key and as a monotone progress
/// marker by the flush coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn {
    /// Log segment identifier
    pub segment: u64,
    /// Position of the record within the segment
    pub position: u64,
}

impl Lsn {
    /// The smallest possible LSN.
    pub const ZERO: Lsn = Lsn {
        segment: 0,
        position: 0,
    };

    /// The largest possible LSN; useful as an inclusive upper bound when
    /// iterating a log backward from the tail.
    pub const MAX: Lsn = Lsn {
        segment: u64::MAX,
        position: u64::MAX,
    };

    /// Create an LSN from a segment and a position within it.
    pub fn new(segment: u64, position: u64) -> Self {
        Self { segment, position }
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.segment, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_segment_first() {
        assert!(Lsn::new(0, 500) < Lsn::new(1, 0));
        assert!(Lsn::new(1, 0) < Lsn::new(1, 1));
        assert!(Lsn::new(2, 0) > Lsn::new(1, u64::MAX));
    }

    #[test]
    fn test_equality() {
        assert_eq!(Lsn::new(3, 7), Lsn::new(3, 7));
        assert_ne!(Lsn::new(3, 7), Lsn::new(7, 3));
    }

    #[test]
    fn test_bounds() {
        let mid = Lsn::new(42, 42);
        assert!(Lsn::ZERO < mid);
        assert!(mid < Lsn::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Lsn::new(4, 1024).to_string(), "4/1024");
    }

    #[test]
    fn test_usable_as_btree_key() {
        use std::collections::BTreeMap;

        let mut map = BTreeMap::new();
        map.insert(Lsn::new(1, 10), "a");
        map.insert(Lsn::new(0, 99), "b");
        map.insert(Lsn::new(1, 5), "c");

        let keys: Vec<Lsn> = map.keys().copied().collect();
        assert_eq!(
            keys,
            vec![Lsn::new(0, 99), Lsn::new(1, 5), Lsn::new(1, 10)]
        );
    }
}
