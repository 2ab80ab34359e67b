//! Concierge Engine Library
//!
//! This library provides the core functionality of the concierge.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Persistent conversation and task memory
pub mod memory;

/// Text generation service abstraction layer
pub mod llm;

/// Conductor orchestration module
pub mod conductor;

/// Festival sources, curated fallback and filtering
pub mod events;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
