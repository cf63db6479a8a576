//! WiFi configuration records.
//!
//! A `WifiConfig` is a plain value describing everything the manager needs
//! to bring the radio into a given shape: operating mode, AP and STA
//! parameters and the STA addressing policy. Records are copied between
//! the manager's `saved`/`current`/`requested` slots and never mutated
//! while shared.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Upper bound forced onto every applied AP configuration.
pub const MAX_AP_CLIENTS: u8 = 3;

/// Maximum number of DNS servers carried in a static STA setup.
pub const MAX_DNS_SERVERS: usize = 3;

/// Operating mode of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiMode {
    /// Access point only.
    Ap,
    /// Station only.
    Sta,
    /// Access point and station simultaneously.
    ApSta,
}

impl WifiMode {
    pub fn has_ap(self) -> bool {
        matches!(self, WifiMode::Ap | WifiMode::ApSta)
    }

    pub fn has_sta(self) -> bool {
        matches!(self, WifiMode::Sta | WifiMode::ApSta)
    }
}

/// Authentication mode of an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    Wpa3Psk,
    Enterprise,
}

/// Parameters of the AP component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApConfig {
    pub ssid: String,
    pub password: String,
    pub channel: u8,
    pub auth: AuthMode,
    pub hidden: bool,
    pub max_clients: u8,
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            channel: 1,
            auth: AuthMode::Open,
            hidden: false,
            max_clients: MAX_AP_CLIENTS,
        }
    }
}

/// Address block served by the AP interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApAddressing {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl Default for ApAddressing {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::new(192, 168, 4, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 4, 1),
        }
    }
}

/// Parameters of the STA component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaConfig {
    pub ssid: String,
    pub password: String,
    /// Lock onto a specific BSSID instead of the strongest match.
    pub bssid: Option<[u8; 6]>,
}

/// Addressing policy of the STA interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaAddressing {
    /// Dynamic addressing via DHCP.
    Dhcp,
    /// Static address plus DNS servers.
    Static {
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
        dns: Vec<Ipv4Addr>,
    },
}

impl Default for StaAddressing {
    fn default() -> Self {
        StaAddressing::Dhcp
    }
}

/// Complete configuration record for both AP and STA components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiConfig {
    /// True if this is the compiled-in factory default. Default records
    /// are never persisted.
    pub is_default: bool,
    pub mode: WifiMode,
    pub ap: ApConfig,
    pub ap_ip: ApAddressing,
    pub sta: StaConfig,
    pub sta_addressing: StaAddressing,
    /// True if the device should associate with the configured AP.
    pub sta_connect: bool,
}

impl WifiConfig {
    /// Compiled-in factory default: open AP+STA with the default SSID and
    /// address block, STA left blank.
    pub fn factory_default() -> Self {
        Self {
            is_default: true,
            mode: WifiMode::ApSta,
            ap: ApConfig {
                ssid: "WiFi Manager".to_string(),
                ..ApConfig::default()
            },
            ap_ip: ApAddressing::default(),
            sta: StaConfig::default(),
            sta_addressing: StaAddressing::Dhcp,
            sta_connect: false,
        }
    }

    /// Decide whether `self` is a material change compared to `applied`.
    ///
    /// Only the components relevant to the requested mode take part in
    /// the comparison: AP fields count when the new mode has an AP
    /// component, STA fields (including the auto-connect flag) when it
    /// has a STA component. A record that differs only in fields of an
    /// inactive component is not a change worth a reconfiguration cycle.
    pub fn differs_materially(&self, applied: &WifiConfig) -> bool {
        if self.mode != applied.mode {
            return true;
        }

        if self.mode.has_ap() && (self.ap != applied.ap || self.ap_ip != applied.ap_ip) {
            return true;
        }

        if self.mode.has_sta()
            && (self.sta != applied.sta
                || self.sta_addressing != applied.sta_addressing
                || self.sta_connect != applied.sta_connect)
        {
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sta_record(ssid: &str) -> WifiConfig {
        WifiConfig {
            is_default: false,
            mode: WifiMode::Sta,
            sta: StaConfig {
                ssid: ssid.to_string(),
                password: "hunter2".to_string(),
                bssid: None,
            },
            sta_connect: true,
            ..WifiConfig::factory_default()
        }
    }

    #[test]
    fn identical_record_is_not_a_change() {
        let a = sta_record("home");
        let b = a.clone();
        assert!(!b.differs_materially(&a));
    }

    #[test]
    fn mode_change_is_material() {
        let a = sta_record("home");
        let mut b = a.clone();
        b.mode = WifiMode::ApSta;
        assert!(b.differs_materially(&a));
    }

    #[test]
    fn ap_fields_ignored_in_sta_only_mode() {
        let a = sta_record("home");
        let mut b = a.clone();
        b.ap.ssid = "something else".to_string();
        assert!(!b.differs_materially(&a));
    }

    #[test]
    fn sta_credentials_are_material_in_sta_mode() {
        let a = sta_record("home");
        let mut b = a.clone();
        b.sta.password = "wrong".to_string();
        assert!(b.differs_materially(&a));
    }

    #[test]
    fn connect_flag_is_material_in_sta_mode() {
        let a = sta_record("home");
        let mut b = a.clone();
        b.sta_connect = false;
        assert!(b.differs_materially(&a));
    }

    #[test]
    fn sta_fields_ignored_in_ap_only_mode() {
        let mut a = sta_record("home");
        a.mode = WifiMode::Ap;
        let mut b = a.clone();
        b.sta.ssid = "other".to_string();
        b.sta_connect = !a.sta_connect;
        assert!(!b.differs_materially(&a));
    }
}
