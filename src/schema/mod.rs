//! Persisted test record schema
//!
//! This module defines the wire format of a stored gaze-tracking session and
//! the adapter that validates it into a [`crate::types::TestRecord`].

mod adapter;
mod raw_record;

pub use adapter::*;
pub use raw_record::*;
