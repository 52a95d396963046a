// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod input_handler;

pub use input_handler::InputHandler;
