//! Core value types shared across the manager.

use crate::domain::config::AuthMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the configuration state machine.
///
/// The first three tags are *stable*: no transition is in progress and
/// configuration mutation is permitted. Everything else is
/// *transitional* and rejects concurrent updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ManagerState {
    /// Last reconfiguration attempt failed, fallback config is active.
    Failed,
    /// Station is associated with an AP.
    Connected,
    /// Stable with no station association pending.
    Idle,
    /// New configuration has been requested.
    UpdatePending,
    /// Pairing has been triggered by the user.
    PairingStart,
    /// Pairing exchange is running.
    PairingActive,
    /// Waiting for the station link to come up.
    Connecting,
    /// Disconnect from the AP has been triggered.
    Disconnecting,
    /// Reverting to the previous known-good configuration.
    Fallback,
}

impl ManagerState {
    /// Stable states permit configuration changes; ordering of the enum
    /// makes this a simple threshold check.
    pub fn is_stable(self) -> bool {
        self <= ManagerState::Idle
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Failed => "Failed",
            ManagerState::Connected => "Connected",
            ManagerState::Idle => "Idle",
            ManagerState::UpdatePending => "Update",
            ManagerState::PairingStart => "Pairing Start",
            ManagerState::PairingActive => "Pairing Active",
            ManagerState::Connecting => "Connecting",
            ManagerState::Disconnecting => "Disconnecting",
            ManagerState::Fallback => "Fall Back",
        };
        f.write_str(name)
    }
}

/// One access point found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    /// Signal strength in dBm.
    pub rssi: i8,
    pub auth: AuthMode,
}

/// Kind of pairing exchange to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingKind {
    /// Push-button credential exchange.
    PushButton,
}

/// Outcome reported with a scan-complete notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Ok,
    Failed,
}

/// Driver-level occurrence delivered to the event bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    LinkUp,
    LinkDown,
    ScanStarted,
    ScanComplete(ScanStatus),
    PairingSucceeded,
    PairingFailed,
}
