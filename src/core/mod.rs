//! Core traits and their dense implementations.

pub mod traits;
pub mod wrappers;

pub use traits::*;
