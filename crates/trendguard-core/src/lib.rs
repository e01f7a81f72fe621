//! Trendguard Core
//!
//! Core types, traits, events, and configuration for the Trendguard trading system.

pub mod config;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::*;
pub use error::*;
pub use events::*;
pub use traits::*;
pub use types::*;
