//! Persistent allow list for the access-control device.
//!
//! One JSON file, atomically rewritten on every mutation, holding the
//! card UIDs that open the door and their display names. Load failures
//! degrade to an empty list so the device always boots.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::AccessStore;
