//! Reference-counted cache of the latest scan results.
//!
//! A snapshot is immutable once published. Shared ownership goes through
//! `Arc`: the manager context holds one reference (the "current"
//! pointer), every caller that fetched the snapshot holds another, and
//! the backing storage is freed by whichever party drops the last one.
//! Replacing the snapshot swaps the context's `Option<Arc<_>>` under the
//! context lock, so a reader can never observe a half-installed value.

use crate::domain::models::AccessPoint;
use std::sync::Arc;
use tokio::time::Instant;

/// Cap on records kept from one scan. Prevents a noisy or malicious
/// radio environment from tricking us into unbounded allocations.
pub const MAX_SCAN_RECORDS: usize = 32;

/// Immutable set of access points from one completed scan.
#[derive(Debug)]
pub struct ScanSnapshot {
    /// When the results were captured.
    pub taken_at: Instant,
    /// Ordered as reported by the driver, truncated to
    /// [`MAX_SCAN_RECORDS`].
    pub records: Vec<AccessPoint>,
}

impl ScanSnapshot {
    pub fn new(records: Vec<AccessPoint>) -> Arc<Self> {
        Arc::new(Self {
            taken_at: Instant::now(),
            records,
        })
    }
}
