//! In-process radio and IP-stack simulation.
//!
//! Behaves like a well-mannered driver: mutating calls return
//! immediately and the real-world outcome (link up, scan complete,
//! pairing result) arrives later through the event bridge. Used by the
//! demo binary and the integration tests; the knobs select how the
//! simulated radio environment responds.

use crate::domain::config::{ApConfig, StaAddressing, StaConfig, WifiMode};
use crate::domain::models::{AccessPoint, PairingKind, RadioEvent, ScanStatus};
use crate::manager::EventBridge;
use anyhow::Result;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// How the simulated environment answers a connect attempt.
#[derive(Debug, Clone)]
pub enum LinkBehavior {
    /// Credentials are "wrong": the link never comes up.
    NeverUp,
    /// The link comes up after the given delay.
    UpAfter(Duration),
}

/// How the simulated environment answers a pairing exchange.
#[derive(Debug, Clone)]
pub enum PairingBehavior {
    /// No peer ever pushes the button.
    NoPeer,
    /// A peer hands over these credentials after the delay.
    SucceedWith(StaConfig, Duration),
    /// The exchange fails after the delay.
    FailAfter(Duration),
}

struct Inner {
    bridge: Option<EventBridge>,
    mode: WifiMode,
    sta: StaConfig,
    link: LinkBehavior,
    pairing: PairingBehavior,
    networks: Vec<AccessPoint>,
    scan_delay: Duration,
    last_scan: Vec<AccessPoint>,
    calls: Vec<String>,
}

/// Simulated radio driver. Clones share the same underlying radio, so a
/// test can keep one handle while boxing another as the manager's
/// driver.
#[derive(Clone)]
pub struct SimulatedRadio {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                bridge: None,
                mode: WifiMode::ApSta,
                sta: StaConfig::default(),
                link: LinkBehavior::UpAfter(Duration::from_millis(50)),
                pairing: PairingBehavior::NoPeer,
                networks: Vec::new(),
                scan_delay: Duration::from_millis(50),
                last_scan: Vec::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Wire the manager's event bridge into the simulation. Without it
    /// the radio stays silent, as a real driver would with no event
    /// handler registered.
    pub fn attach_bridge(&self, bridge: EventBridge) {
        self.inner.lock().unwrap().bridge = Some(bridge);
    }

    pub fn set_link_behavior(&self, link: LinkBehavior) {
        self.inner.lock().unwrap().link = link;
    }

    pub fn set_pairing_behavior(&self, pairing: PairingBehavior) {
        self.inner.lock().unwrap().pairing = pairing;
    }

    /// Networks the next scan will find.
    pub fn set_networks(&self, networks: Vec<AccessPoint>) {
        self.inner.lock().unwrap().networks = networks;
    }

    /// Every mutating driver call so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.inner.lock().unwrap().calls.push(call.into());
    }

    fn bridge(&self) -> Option<EventBridge> {
        self.inner.lock().unwrap().bridge.clone()
    }

    fn emit_later(&self, delay: Duration, event: RadioEvent) {
        if let Some(bridge) = self.bridge() {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                debug!("Simulated radio emitting {event:?}");
                bridge.dispatch(event);
            });
        }
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::infrastructure::driver::RadioDriver for SimulatedRadio {
    fn apply(
        &mut self,
        mode: WifiMode,
        _ap: Option<&ApConfig>,
        sta: Option<&StaConfig>,
    ) -> Result<()> {
        self.log(format!("apply:{mode:?}"));
        let mut inner = self.inner.lock().unwrap();
        inner.mode = mode;
        if let Some(sta) = sta {
            inner.sta = sta.clone();
        }
        Ok(())
    }

    fn start_scan(&mut self) -> Result<()> {
        self.log("start_scan");
        let (networks, delay) = {
            let inner = self.inner.lock().unwrap();
            (inner.networks.clone(), inner.scan_delay)
        };

        if let Some(bridge) = self.bridge() {
            let shared = self.inner.clone();
            tokio::spawn(async move {
                bridge.dispatch(RadioEvent::ScanStarted);
                tokio::time::sleep(delay).await;
                shared.lock().unwrap().last_scan = networks;
                bridge.dispatch(RadioEvent::ScanComplete(ScanStatus::Ok));
            });
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        self.log("stop_scan");
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        self.log("connect");
        let link = self.inner.lock().unwrap().link.clone();
        match link {
            LinkBehavior::NeverUp => {}
            LinkBehavior::UpAfter(delay) => self.emit_later(delay, RadioEvent::LinkUp),
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.log("disconnect");
        if let Some(bridge) = self.bridge() {
            bridge.dispatch(RadioEvent::LinkDown);
        }
        Ok(())
    }

    fn enable_pairing(&mut self, _kind: PairingKind) -> Result<()> {
        self.log("enable_pairing");
        let pairing = self.inner.lock().unwrap().pairing.clone();
        match pairing {
            PairingBehavior::NoPeer => {}
            PairingBehavior::SucceedWith(creds, delay) => {
                let shared = self.inner.clone();
                if let Some(bridge) = self.bridge() {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        shared.lock().unwrap().sta = creds;
                        bridge.dispatch(RadioEvent::PairingSucceeded);
                    });
                }
            }
            PairingBehavior::FailAfter(delay) => {
                self.emit_later(delay, RadioEvent::PairingFailed)
            }
        }
        Ok(())
    }

    fn disable_pairing(&mut self) -> Result<()> {
        self.log("disable_pairing");
        Ok(())
    }

    fn applied_mode(&self) -> Result<WifiMode> {
        Ok(self.inner.lock().unwrap().mode)
    }

    fn sta_config(&self) -> Result<StaConfig> {
        Ok(self.inner.lock().unwrap().sta.clone())
    }

    fn scan_result_count(&self) -> Result<usize> {
        Ok(self.inner.lock().unwrap().last_scan.len())
    }

    fn fetch_scan_results(&mut self, max: usize) -> Result<Vec<AccessPoint>> {
        let mut records = self.inner.lock().unwrap().last_scan.clone();
        records.truncate(max);
        Ok(records)
    }
}

/// IP-stack adapter that just remembers what it was told.
#[derive(Clone)]
pub struct SimulatedIpStack {
    inner: Arc<Mutex<SimulatedAddressing>>,
}

#[derive(Debug, Clone)]
struct SimulatedAddressing {
    sta: StaAddressing,
    ap: Option<(Ipv4Addr, Ipv4Addr, Ipv4Addr)>,
}

impl SimulatedIpStack {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimulatedAddressing {
                sta: StaAddressing::Dhcp,
                ap: None,
            })),
        }
    }

    pub fn ap_address(&self) -> Option<(Ipv4Addr, Ipv4Addr, Ipv4Addr)> {
        self.inner.lock().unwrap().ap
    }
}

impl Default for SimulatedIpStack {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::infrastructure::driver::IpStack for SimulatedIpStack {
    fn set_static(
        &mut self,
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
        dns: &[Ipv4Addr],
    ) -> Result<()> {
        self.inner.lock().unwrap().sta = StaAddressing::Static {
            ip,
            netmask,
            gateway,
            dns: dns.to_vec(),
        };
        Ok(())
    }

    fn set_dynamic(&mut self) -> Result<()> {
        self.inner.lock().unwrap().sta = StaAddressing::Dhcp;
        Ok(())
    }

    fn set_ap_address(&mut self, ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Result<()> {
        self.inner.lock().unwrap().ap = Some((ip, netmask, gateway));
        Ok(())
    }

    fn addressing(&self) -> Result<StaAddressing> {
        Ok(self.inner.lock().unwrap().sta.clone())
    }
}
