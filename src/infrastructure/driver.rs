//! Collaborator contracts consumed by the manager core.
//!
//! The radio driver and IP stack are external, single-owner resources.
//! The manager only ever calls into them while holding the context lock,
//! so implementations do not need internal synchronization for the
//! mutating entry points. Outcomes (link up/down, scan completion,
//! pairing result) are reported asynchronously through the event bridge,
//! not through return values.

use crate::domain::config::{ApConfig, StaAddressing, StaConfig, WifiMode};
use crate::domain::models::{AccessPoint, PairingKind};
use anyhow::Result;
use std::net::Ipv4Addr;

/// Contract of the underlying radio driver.
pub trait RadioDriver: Send {
    /// Tear down the current setup and apply a new one. `ap` is given
    /// when the mode has an AP component, `sta` when it has a STA
    /// component. Returns once the driver has accepted the
    /// configuration; link state arrives later as an event.
    fn apply(&mut self, mode: WifiMode, ap: Option<&ApConfig>, sta: Option<&StaConfig>)
        -> Result<()>;

    /// Begin an asynchronous scan. Completion is reported as a
    /// scan-complete event.
    fn start_scan(&mut self) -> Result<()>;

    /// Abort a running scan, if any.
    fn stop_scan(&mut self) -> Result<()>;

    /// Initiate association with the configured AP.
    fn connect(&mut self) -> Result<()>;

    /// Drop the station association.
    fn disconnect(&mut self) -> Result<()>;

    /// Start the pairing capability. Outcome arrives as a
    /// pairing-succeeded/failed event; on success the received
    /// credentials are readable through [`RadioDriver::sta_config`].
    fn enable_pairing(&mut self, kind: PairingKind) -> Result<()>;

    /// Stop the pairing capability.
    fn disable_pairing(&mut self) -> Result<()>;

    /// Mode the driver currently has applied.
    fn applied_mode(&self) -> Result<WifiMode>;

    /// Station parameters the driver currently holds. After a successful
    /// pairing exchange these are the received credentials.
    fn sta_config(&self) -> Result<StaConfig>;

    /// Number of records the last completed scan produced.
    fn scan_result_count(&self) -> Result<usize>;

    /// Fetch at most `max` records from the last completed scan.
    fn fetch_scan_results(&mut self, max: usize) -> Result<Vec<AccessPoint>>;
}

/// Contract of the IP-stack adapter for the station interface.
pub trait IpStack: Send {
    /// Configure a static address plus DNS servers; stops any DHCP
    /// client first.
    fn set_static(
        &mut self,
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
        dns: &[Ipv4Addr],
    ) -> Result<()>;

    /// Switch to dynamic addressing via DHCP.
    fn set_dynamic(&mut self) -> Result<()>;

    /// Set the address block served on the AP interface.
    fn set_ap_address(&mut self, ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr)
        -> Result<()>;

    /// Current addressing policy of the station interface.
    fn addressing(&self) -> Result<StaAddressing>;
}
