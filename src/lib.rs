//! WiFi reconfiguration manager.
//!
//! Moves a radio between access-point, station and combined
//! configurations without ever leaving the device unreachable: every
//! requested change is applied asynchronously, watched for a real-world
//! outcome, and reverted to the last known-good configuration if it
//! fails or times out. A reference-counted cache exposes the latest
//! scan results, and a push-button pairing flow handles onboarding.
//!
//! The radio driver, IP stack and persistent store are narrow trait
//! seams ([`infrastructure::driver`], [`infrastructure::store`]); an
//! in-process simulation ([`infrastructure::simulated`]) backs the demo
//! binary and the tests.

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod manager;

pub use domain::config::{
    ApAddressing, ApConfig, AuthMode, StaAddressing, StaConfig, WifiConfig, WifiMode,
};
pub use domain::models::{AccessPoint, ManagerState, PairingKind, RadioEvent, ScanStatus};
pub use error::{Error, Result};
pub use manager::{EventBridge, ManagerOptions, ScanSnapshot, WifiManager, MAX_SCAN_RECORDS};
