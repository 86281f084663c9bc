//! Common utilities for stationsync
//!
//! This crate provides the error taxonomy shared by all stationsync crates.

pub mod error;

pub use error::{BackendError, Result, SyncError};
