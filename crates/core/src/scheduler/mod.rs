//! Bounded-concurrency, priority-ordered task scheduler.
//!
//! Every outbound object-storage request is submitted here. At most
//! `max_concurrency` operations run at once; waiting operations are started
//! lowest priority value first, first-submitted-first within a band.
//!
//! ```text
//! submit(priority, op) ──► min-heap (priority, seq) ──► tokio task ──► TaskHandle<T>
//!                               ▲                           │
//!                               └──── slot released ◄───────┘
//! ```

mod error;
mod executor;
mod priority;


pub use error::SchedulerError;
pub use executor::{TaskHandle, TaskScheduler};
pub use priority::Priority;
