//! Delivery engine — drains the scheduled message queue and advances
//! sequence enrollments.
//!
//! The engine has no resident process: an external trigger invokes one
//! pass at a time, and overlapping passes coordinate solely through
//! row-level state transitions in the stores.

pub mod queue_processor;
pub mod sequence_engine;
pub mod skip;

pub use queue_processor::QueueProcessor;
pub use sequence_engine::SequenceEngine;
