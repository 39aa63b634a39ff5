//! Offline snapshot of the last confirmed server state.
//!
//! Stores read these snapshots only to show something before the first
//! fetch completes; the server stays authoritative.

pub mod snapshot_cache;
