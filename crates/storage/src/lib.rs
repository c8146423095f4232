//! Handle storage for captured result sets.
//!
//! This crate provides a trait-based, expiring store that maps opaque
//! handles to result sets, with an in-memory reference implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod clock;
pub mod memory;

pub use trait_::{HandleStore, StoreError, StoreQuery, StoreStats, Result};
pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::{spawn_sweeper, InMemoryHandleStore, StoreConfig};
