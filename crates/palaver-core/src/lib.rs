//! # palaver-core
//!
//! Domain layer for the palaver chat server.
//!
//! This crate owns the application state that the rest of the server
//! exposes over the object-model protocol:
//!
//! - **ChatService** - The event bus: accepts posts, keeps the post
//!   counter, and fans out to registered observers
//! - **ChatLogRecord** - An immutable record of a single post
//! - **Logger** - Free-text diagnostic sink with retained lines
//!
//! The protocol stack never appears here; the address-space layer
//! (`palaver-space`) subscribes to this bus and translates its
//! notifications into graph-level changes.

pub mod log;
pub mod logger;
pub mod service;

pub use log::ChatLogRecord;
pub use logger::Logger;
pub use service::ChatService;
