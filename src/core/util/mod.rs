// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod scheduler;
pub mod thread_barrier;
pub mod timestamp_generator;
pub mod variable;

pub use scheduler::{Executor, Scheduler};
pub use thread_barrier::{BarrierGuard, BarrierPermit, ThreadBarrier};
pub use timestamp_generator::{
    EventTimestampGenerator, SystemTimestampGenerator, TimestampGenerator,
};
pub use variable::{ListenerId, Variable, VariableListener};
