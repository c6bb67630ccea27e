//! Identifier types shared by every crate.

pub mod id;

pub use id::{RoomId, StoragePlanId, UserId};
