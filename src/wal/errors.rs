//! WAL error types
//!
//! Error codes:
//! - FERRO_WAL_CORRUPT_RECORD (FATAL severity)
//! - FERRO_WAL_UNKNOWN_OPERATION (FATAL severity)
//! - FERRO_WAL_APPEND_FAILED (ERROR severity)
//! - FERRO_WAL_FSYNC_FAILED (FATAL severity)
//!
//! Decode errors are never retried: they indicate potential data corruption
//! and must reach an operator or recovery process.

use std::fmt;
use std::io;

/// Severity levels for WAL errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, engine continues
    Error,
    /// The engine must halt
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// WAL-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalErrorCode {
    /// Malformed or truncated bytes while decoding a record
    FerroWalCorruptRecord,
    /// Unrecognized opcode in a record envelope
    FerroWalUnknownOperation,
    /// Segment write failed
    FerroWalAppendFailed,
    /// Segment fsync failed
    FerroWalFsyncFailed,
}

impl WalErrorCode {
    /// Returns the string form of the code.
    pub fn code(&self) -> &'static str {
        match self {
            WalErrorCode::FerroWalCorruptRecord => "FERRO_WAL_CORRUPT_RECORD",
            WalErrorCode::FerroWalUnknownOperation => "FERRO_WAL_UNKNOWN_OPERATION",
            WalErrorCode::FerroWalAppendFailed => "FERRO_WAL_APPEND_FAILED",
            WalErrorCode::FerroWalFsyncFailed => "FERRO_WAL_FSYNC_FAILED",
        }
    }

    /// Returns the severity level for this code.
    pub fn severity(&self) -> Severity {
        match self {
            WalErrorCode::FerroWalCorruptRecord => Severity::Fatal,
            WalErrorCode::FerroWalUnknownOperation => Severity::Fatal,
            WalErrorCode::FerroWalAppendFailed => Severity::Error,
            WalErrorCode::FerroWalFsyncFailed => Severity::Fatal,
        }
    }
}

impl fmt::Display for WalErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// WAL error with code, message and optional context.
#[derive(Debug)]
pub struct WalError {
    code: WalErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl WalError {
    /// Malformed or truncated record bytes.
    pub fn corrupt_record(message: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::FerroWalCorruptRecord,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Corruption detected at a known byte offset within a segment.
    pub fn corrupt_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::FerroWalCorruptRecord,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Unrecognized opcode in a record envelope.
    pub fn unknown_operation(opcode: u32) -> Self {
        Self {
            code: WalErrorCode::FerroWalUnknownOperation,
            message: format!("unrecognized page operation opcode {}", opcode),
            details: None,
            source: None,
        }
    }

    /// Segment write failure.
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: WalErrorCode::FerroWalAppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Segment fsync failure. Fatal: an acknowledged LSN may not be durable.
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: WalErrorCode::FerroWalFsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> WalErrorCode {
        self.code
    }

    /// Returns the severity level.
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error context, if any.
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error requires the engine to halt.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for WalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for WAL operations
pub type WalResult<T> = Result<T, WalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            WalErrorCode::FerroWalCorruptRecord.code(),
            "FERRO_WAL_CORRUPT_RECORD"
        );
        assert_eq!(
            WalErrorCode::FerroWalUnknownOperation.code(),
            "FERRO_WAL_UNKNOWN_OPERATION"
        );
        assert_eq!(
            WalErrorCode::FerroWalAppendFailed.code(),
            "FERRO_WAL_APPEND_FAILED"
        );
        assert_eq!(
            WalErrorCode::FerroWalFsyncFailed.code(),
            "FERRO_WAL_FSYNC_FAILED"
        );
    }

    #[test]
    fn test_corruption_is_fatal() {
        assert!(WalError::corrupt_record("checksum mismatch").is_fatal());
        assert!(WalError::unknown_operation(99).is_fatal());
    }

    #[test]
    fn test_append_failure_is_not_fatal() {
        let err = WalError::append_failed(
            "write failed",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display_contains_code_and_context() {
        let err = WalError::corrupt_at_offset(128, "frame length mismatch");
        let display = err.to_string();
        assert!(display.contains("FERRO_WAL_CORRUPT_RECORD"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("frame length mismatch"));
        assert!(display.contains("byte_offset: 128"));
    }
}
