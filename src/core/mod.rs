// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod config;
pub mod error;
pub mod event;
pub mod extension;
pub mod query;
pub mod stream;
pub mod util;
pub mod wisdom_app;

pub use config::{StreamConfig, WisdomConfig, WisdomContext};
pub use error::{ErrorKind, WisdomError, WisdomResult};
pub use event::{AttributeValue, Event, EventData};
pub use extension::{ExtensionRegistry, SinkFactory, WindowFactory};
pub use query::input::stream::state::{
    and, every, not, or, sequence, sequence_within, times, Pattern, PatternProcessor,
};
pub use query::processor::stream::window::{
    window_properties, PropertyValue, Window, WindowProcessor, WindowProperties,
};
pub use query::processor::{NoopProcessor, Processor};
pub use query::QueryBuilder;
pub use stream::{InputHandler, LogSink, Sink, Stream, StreamCallback};
pub use util::{Scheduler, ThreadBarrier, TimestampGenerator, Variable};
pub use wisdom_app::WisdomApp;
