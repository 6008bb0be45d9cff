//! Core types for threadline.

pub mod message;
pub mod state;

pub use message::*;
pub use state::*;
