//! Logging
//!
//! Structured logging for credential operations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::transport::lock;
use crate::types::CredentialKind;

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Credential log context.
///
/// Never carries token values.
#[derive(Debug, Clone, Default)]
pub struct AuthLogContext {
    /// Operation name.
    pub operation: Option<String>,
    /// Credential kind involved.
    pub kind: Option<CredentialKind>,
    /// Application ID.
    pub app_id: Option<String>,
    /// Additional context.
    pub extra: HashMap<String, String>,
}

impl AuthLogContext {
    /// Create new log context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set operation.
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set credential kind.
    pub fn kind(mut self, kind: CredentialKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set application ID.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Add extra context.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn render_extra(&self) -> String {
        let mut pairs: Vec<_> = self
            .extra
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();
        pairs.join(" ")
    }
}

/// Logger interface.
pub trait Logger: Send + Sync {
    /// Log at trace level.
    fn trace(&self, message: &str, context: &AuthLogContext);

    /// Log at debug level.
    fn debug(&self, message: &str, context: &AuthLogContext);

    /// Log at info level.
    fn info(&self, message: &str, context: &AuthLogContext);

    /// Log at warn level.
    fn warn(&self, message: &str, context: &AuthLogContext);

    /// Log at error level.
    fn error(&self, message: &str, context: &AuthLogContext);

    /// Check if a log level is enabled.
    fn is_enabled(&self, level: LogLevel) -> bool;
}

/// No-op logger implementation.
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn trace(&self, _message: &str, _context: &AuthLogContext) {}
    fn debug(&self, _message: &str, _context: &AuthLogContext) {}
    fn info(&self, _message: &str, _context: &AuthLogContext) {}
    fn warn(&self, _message: &str, _context: &AuthLogContext) {}
    fn error(&self, _message: &str, _context: &AuthLogContext) {}
    fn is_enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

/// No-op logger singleton.
pub fn no_op_logger() -> NoOpLogger {
    NoOpLogger
}

/// Log entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: AuthLogContext,
    pub timestamp: u64,
}

/// In-memory logger for testing.
pub struct InMemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
    min_level: LogLevel,
}

impl InMemoryLogger {
    /// Create new in-memory logger.
    pub fn new() -> Self {
        Self::with_level(LogLevel::Trace)
    }

    /// Create in-memory logger with minimum level.
    pub fn with_level(min_level: LogLevel) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            min_level,
        }
    }

    /// Get all log entries.
    pub fn get_entries(&self) -> Vec<LogEntry> {
        lock(&self.entries).clone()
    }

    /// Get entries by level.
    pub fn get_entries_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        lock(&self.entries)
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Check whether any entry message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.entries)
            .iter()
            .any(|e| e.message.contains(needle) || e.context.render_extra().contains(needle))
    }

    /// Clear all entries.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn log(&self, level: LogLevel, message: &str, context: &AuthLogContext) {
        if level >= self.min_level {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;

            lock(&self.entries).push(LogEntry {
                level,
                message: message.to_string(),
                context: context.clone(),
                timestamp: now,
            });
        }
    }
}

impl Default for InMemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for InMemoryLogger {
    fn trace(&self, message: &str, context: &AuthLogContext) {
        self.log(LogLevel::Trace, message, context);
    }

    fn debug(&self, message: &str, context: &AuthLogContext) {
        self.log(LogLevel::Debug, message, context);
    }

    fn info(&self, message: &str, context: &AuthLogContext) {
        self.log(LogLevel::Info, message, context);
    }

    fn warn(&self, message: &str, context: &AuthLogContext) {
        self.log(LogLevel::Warn, message, context);
    }

    fn error(&self, message: &str, context: &AuthLogContext) {
        self.log(LogLevel::Error, message, context);
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

/// Logger that forwards to the `tracing` macros.
///
/// Output format and filtering belong to whatever subscriber the host installs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

macro_rules! forward {
    ($macro:ident, $message:expr, $context:expr) => {{
        let ctx = $context;
        tracing::$macro!(
            operation = ctx.operation.as_deref().unwrap_or(""),
            kind = ctx.kind.map(|k| k.as_str()).unwrap_or(""),
            app_id = ctx.app_id.as_deref().unwrap_or(""),
            extra = %ctx.render_extra(),
            "{}",
            $message
        );
    }};
}

impl Logger for TracingLogger {
    fn trace(&self, message: &str, context: &AuthLogContext) {
        forward!(trace, message, context);
    }

    fn debug(&self, message: &str, context: &AuthLogContext) {
        forward!(debug, message, context);
    }

    fn info(&self, message: &str, context: &AuthLogContext) {
        forward!(info, message, context);
    }

    fn warn(&self, message: &str, context: &AuthLogContext) {
        forward!(warn, message, context);
    }

    fn error(&self, message: &str, context: &AuthLogContext) {
        forward!(error, message, context);
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Trace => tracing::enabled!(tracing::Level::TRACE),
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Warn => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
        }
    }
}

/// Create in-memory logger for testing.
pub fn create_in_memory_logger() -> InMemoryLogger {
    InMemoryLogger::new()
}

/// Create the default logger backed by `tracing`.
pub fn create_tracing_logger() -> TracingLogger {
    TracingLogger::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Warn > LogLevel::Info);
        assert!(LogLevel::Info > LogLevel::Debug);
        assert!(LogLevel::Debug > LogLevel::Trace);
    }

    #[test]
    fn test_in_memory_logger() {
        let logger = InMemoryLogger::new();
        let context = AuthLogContext::new()
            .operation("refresh_user_token")
            .kind(CredentialKind::User);

        logger.info("Refresh started", &context);
        logger.debug("Debug info", &context);
        logger.error("Refresh failed", &context);

        assert_eq!(logger.get_entries().len(), 3);
        assert_eq!(logger.get_entries_by_level(LogLevel::Error).len(), 1);
        assert!(logger.contains("Refresh failed"));
    }

    #[test]
    fn test_log_context_builder() {
        let context = AuthLogContext::new()
            .operation("issue_tenant_token")
            .kind(CredentialKind::Tenant)
            .app_id("cli_a")
            .extra("attempt", "1");

        assert_eq!(context.operation.as_deref(), Some("issue_tenant_token"));
        assert_eq!(context.kind, Some(CredentialKind::Tenant));
        assert_eq!(context.render_extra(), "attempt=1");
    }

    #[test]
    fn test_min_level_filtering() {
        let logger = InMemoryLogger::with_level(LogLevel::Warn);
        let context = AuthLogContext::new();

        logger.trace("trace", &context);
        logger.debug("debug", &context);
        logger.info("info", &context);
        logger.warn("warn", &context);
        logger.error("error", &context);

        assert_eq!(logger.get_entries().len(), 2);
    }

    #[test]
    fn test_tracing_logger_without_subscriber() {
        let logger = TracingLogger::new();
        logger.info("no subscriber installed", &AuthLogContext::new());
        assert!(!logger.is_enabled(LogLevel::Trace));
    }
}
