//! Concierge SDK
//!
//! Shared error and event types used by the engine and its event sources.

/// Error types and handling
pub mod errors;

/// Normalized event types
pub mod types;

// Re-export commonly used types
pub use errors::{AgentError, AgentErrorExt};
pub use types::{EventCategory, EventRecord, PriceRange};
