//! Live monitoring: the poll loop, its status events and the result files.

pub mod events;
pub mod results;
pub mod runner;

pub use events::{event_channel, ChannelSink, Event, EventSink, JsonLinesSink};
pub use results::ResultWriter;
pub use runner::Monitor;
