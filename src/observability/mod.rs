//! Observability for the durability core
//!
//! Structured JSON logging with deterministic key ordering. Observability
//! is read-only: logging never changes execution, performs no buffering and
//! spawns no threads.

mod logger;

pub use logger::{Logger, Severity};
