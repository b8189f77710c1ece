//! The domain event bus.
//!
//! `ChatService` owns the post counter and fans out two independent
//! notification kinds: one per posted record and one per counter change.

use crate::log::ChatLogRecord;
use crate::logger::Logger;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

/// Callback invoked with each posted record.
pub type PostedHandler = Box<dyn Fn(&ChatLogRecord) + Send + Sync>;

/// Callback invoked with each new post count.
pub type CountChangedHandler = Box<dyn Fn(u32) + Send + Sync>;

/// The chat event bus.
///
/// `post` may be called concurrently from any number of workers. The
/// counter is advanced with a single atomic fetch-add, so the values
/// handed to count observers for N completed posts are exactly `1..=N`
/// with no gap or repeat. Within one call, posted observers always run
/// before the count observers for that same post.
pub struct ChatService {
    logger: Arc<Logger>,
    post_count: AtomicU32,
    posted: RwLock<Vec<PostedHandler>>,
    count_changed: RwLock<Vec<CountChangedHandler>>,
}

impl ChatService {
    /// Create a new service writing diagnostics to `logger`.
    #[must_use]
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            logger,
            post_count: AtomicU32::new(0),
            posted: RwLock::new(Vec::new()),
            count_changed: RwLock::new(Vec::new()),
        }
    }

    /// Post a chat message.
    ///
    /// Empty strings are allowed; input validation is the caller's
    /// responsibility. Never fails.
    pub fn post(&self, name: &str, content: &str) {
        self.logger.info(
            "ChatService::post",
            format_args!("name: {name}, content: {content}"),
        );

        let record = ChatLogRecord::new(name, content);
        for handler in self
            .posted
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            handler(&record);
        }

        let count = self.post_count.fetch_add(1, Ordering::AcqRel) + 1;
        for handler in self
            .count_changed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            handler(count);
        }
    }

    /// Current post count.
    ///
    /// Equals the number of posts whose increment has completed.
    #[must_use]
    pub fn post_count(&self) -> u32 {
        self.post_count.load(Ordering::Acquire)
    }

    /// Register an observer for posted records, invoked in registration order.
    pub fn on_posted(&self, handler: impl Fn(&ChatLogRecord) + Send + Sync + 'static) {
        self.posted
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(handler));
    }

    /// Register an observer for counter changes, invoked in registration order.
    pub fn on_count_changed(&self, handler: impl Fn(u32) + Send + Sync + 'static) {
        self.count_changed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(handler));
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("post_count", &self.post_count())
            .finish()
    }
}
