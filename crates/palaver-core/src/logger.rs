//! Diagnostic line sink.
//!
//! The logger retains every line it receives and notifies registered
//! observers, so hosts can forward diagnostics wherever they like.
//! Each line is also mirrored to `tracing` at info level.

use chrono::Local;
use std::fmt;
use std::sync::{Mutex, RwLock};
use tracing::info;

/// Callback invoked for each logged line.
pub type LineHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Free-text diagnostic sink.
///
/// Lines are formatted as `"{timestamp}: {site}: {message}"` where `site`
/// is a coarse call-site label supplied by the caller.
#[derive(Default)]
pub struct Logger {
    lines: Mutex<Vec<String>>,
    handlers: RwLock<Vec<LineHandler>>,
}

impl Logger {
    /// Create a new logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one diagnostic line.
    pub fn info(&self, site: &str, message: impl fmt::Display) {
        let line = format!("{}: {}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), site, message);

        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());

        for handler in self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            handler(&line);
        }

        info!(target: "palaver", site = %site, "{}", message);
    }

    /// Register an observer for logged lines, invoked in registration order.
    pub fn on_logged(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(handler));
    }

    /// Snapshot of all lines logged so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("lines", &self.lines().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_logger_retains_lines() {
        let logger = Logger::new();
        logger.info("test", "first");
        logger.info("test", "second");

        let lines = logger.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("test: first"));
        assert!(lines[1].ends_with("test: second"));
    }

    #[test]
    fn test_logger_notifies_handlers() {
        let logger = Logger::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        logger.on_logged(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        logger.info("test", "one");
        logger.info("test", "two");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
