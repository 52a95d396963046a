// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod event;
pub mod value;

pub use event::{Event, EventData};
pub use value::AttributeValue;
