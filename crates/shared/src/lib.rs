//! Shared configuration and identifiers for Mediavault.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for users, rooms and storage plans
//! - Configuration management

pub mod config;
pub mod types;

pub use config::{AppConfig, StorageSettings};
pub use types::{RoomId, StoragePlanId, UserId};
