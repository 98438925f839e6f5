//! Event system for observing pipeline runs.
//!
//! The runner reports every stage start, completion and failure to the
//! run's [`EventSink`]. Streaming answers and structured logs are both
//! built on these events.

mod event;
mod sink;

pub use event::{EventKind, PipelineEvent};
pub use sink::{CollectingEventSink, EventSink, FanoutEventSink, LoggingEventSink, NoOpEventSink};
