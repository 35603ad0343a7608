//! Relay Wire Protocol
//!
//! The flat JSON envelope exchanged with clients and the constants around it.

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::*;
