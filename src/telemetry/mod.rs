//! Telemetry
//!
//! Structured logging with credential context. Token values never reach a log line.

pub mod logging;

pub use logging::{
    create_in_memory_logger, create_tracing_logger, no_op_logger, AuthLogContext,
    InMemoryLogger, LogEntry, LogLevel, Logger, NoOpLogger, TracingLogger,
};
