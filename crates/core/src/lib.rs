//! Object-storage access layer for Mediavault.
//!
//! This crate owns every interaction with the bucket. Callers never talk to
//! an S3 SDK directly.
//!
//! # Modules
//!
//! - `scheduler` - Bounded, priority-ordered task execution
//! - `storage` - S3 clients behind one trait, plus the bucket-bound facade
//! - `quota` - Storage plans, destination classification and usage accounting

pub mod quota;
pub mod scheduler;
pub mod storage;
