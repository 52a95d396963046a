// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod input;
pub mod output;
#[allow(clippy::module_inception)]
pub mod stream;
pub mod stream_tracker;

pub use self::input::InputHandler;
pub use self::output::{CallbackProcessor, LogSink, Sink, SinkProcessor, StreamCallback};
pub use self::stream::Stream;
pub use self::stream_tracker::{StreamStatistics, StreamTracker};
