//! Fingerprint-based skip caching
//!
//! A task whose input fingerprint matches its last successful run, and
//! whose recorded outputs still exist, is skipped instead of re-run.

pub mod fingerprint;
pub mod store;

// Re-export main types
pub use fingerprint::*;
pub use store::*;
