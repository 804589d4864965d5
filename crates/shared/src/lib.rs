//! Shared types and configuration for Tally.
//!
//! This crate provides common types used across all other crates:
//! - Currency codes with minor-unit precision checks
//! - Typed IDs for type-safe entity references
//! - Configuration management
//! - Tracing bootstrap

pub mod config;
pub mod telemetry;
pub mod types;

pub use config::AppConfig;
