//! Durable tables for the delivery engine — message queue with atomic
//! claims, sequence/enrollment store, append-only send log, and the
//! external record store consulted by skip conditions.
//!
//! Every table is a thread-safe `DashMap` keyed by primary key; every
//! mutation is scoped to a single row, which is the whole of the
//! engine's concurrency story.

pub mod queue;
pub mod records;
pub mod send_log;
pub mod sequences;
pub mod templates;

pub use queue::{MessageQueue, QueueStats};
pub use records::{InMemoryRecordStore, Record, RecordStore};
pub use send_log::SendLog;
pub use sequences::SequenceStore;
pub use templates::InMemoryTemplateStore;
