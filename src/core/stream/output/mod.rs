// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod sink;
pub mod stream_callback;

pub use sink::{LogSink, Sink, SinkProcessor};
pub use stream_callback::{CallbackProcessor, StreamCallback};
