//! Flush coordination errors

use thiserror::Error;

use crate::wal::Lsn;

/// Result type for flush coordination
pub type FlushResult<T> = Result<T, FlushError>;

/// Errors raised while coordinating writer flushes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlushError {
    /// A writer's flushed progress maps to an LSN newer than the primary
    /// log's durable point: the writer and the log have diverged, and
    /// recovery-time reconciliation is required. Fatal; truncation halts.
    #[error(
        "writer {writer_id} is desynchronized from the primary log: \
         flushed progress maps to LSN {mapped}, durable point is {referent}"
    )]
    Desynchronized {
        writer_id: u64,
        mapped: Lsn,
        referent: Lsn,
    },
}

impl FlushError {
    /// Returns whether this error requires halting truncation entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FlushError::Desynchronized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desync_is_fatal_and_names_both_lsns() {
        let err = FlushError::Desynchronized {
            writer_id: 7,
            mapped: Lsn::new(0, 150),
            referent: Lsn::new(0, 100),
        };
        assert!(err.is_fatal());
        let display = err.to_string();
        assert!(display.contains("writer 7"));
        assert!(display.contains("0/150"));
        assert!(display.contains("0/100"));
    }
}
