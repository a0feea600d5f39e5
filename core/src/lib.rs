//! Component state storage with two-phase save cycles, macro-resolved
//! storage units and external change detection.

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod macros;
pub mod state;
