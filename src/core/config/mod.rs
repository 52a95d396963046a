// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod stream_config;
pub mod wisdom_config;
pub mod wisdom_context;

pub use stream_config::{FlatConfig, PropertySource, StreamConfig};
pub use wisdom_config::WisdomConfig;
pub use wisdom_context::WisdomContext;
