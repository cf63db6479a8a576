//! The configuration state machine.
//!
//! `ManagerContext` owns the three configuration slots (`saved`,
//! `current`, `requested`), the state tag and the collaborator handles.
//! Every field is read and written with the context lock held; the
//! scheduler drives [`ManagerContext::step`] which processes exactly one
//! transition per call and reports the delay before the next one.
//!
//! The design goal is that the device never ends up unreachable: a
//! failed or timed-out transition falls back to the `saved`
//! configuration exactly once and then parks in `Failed`. Retrying after
//! a failed fallback is a fresh update request, never an automatic loop.

use crate::domain::config::{
    StaAddressing, StaConfig, WifiConfig, MAX_AP_CLIENTS, MAX_DNS_SERVERS,
};
use crate::domain::models::{ManagerState, PairingKind};
use crate::error::Error;
use crate::infrastructure::driver::{IpStack, RadioDriver};
use crate::infrastructure::store::ConfigStore;
use crate::manager::events::{
    EventFlags, LINK_CONNECTED, PAIRING_FAILED, PAIRING_SUCCESS, SCAN_DONE, SCAN_RUNNING,
    SCAN_START,
};
use crate::manager::scan::{ScanSnapshot, MAX_SCAN_RECORDS};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Timing knobs of the manager. Defaults mirror the usual control-plane
/// cadence: fast re-poll while transitioning, one-second ticks while
/// waiting on the radio, one-minute dwell bounds.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Poll interval while waiting for a link or pairing outcome.
    pub poll_interval: Duration,
    /// Near-immediate re-schedule after a transition or lock miss.
    pub nudge_delay: Duration,
    /// Maximum dwell in `Connecting`/`Disconnecting` before fallback.
    pub connect_timeout: Duration,
    /// Maximum dwell in `PairingActive` before fallback.
    pub pairing_timeout: Duration,
    /// Bounded wait for API callers acquiring the context lock.
    pub lock_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            nudge_delay: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(60),
            pairing_timeout: Duration::from_secs(60),
            lock_timeout: Duration::from_millis(500),
        }
    }
}

/// Everything needed to move from the current to the requested
/// configuration. Exclusively owned; guarded by one mutex in
/// [`crate::manager::WifiManager`].
pub(crate) struct ManagerContext {
    pub(crate) state: ManagerState,
    /// Fallback slot: last configuration known to work this run.
    pub(crate) saved: WifiConfig,
    /// Configuration currently applied to the driver.
    pub(crate) current: WifiConfig,
    /// Target of the in-flight (or next) transition.
    pub(crate) requested: WifiConfig,
    /// When the current transition began; dwell bounds count from here.
    pub(crate) since: Instant,
    pub(crate) scan: Option<Arc<ScanSnapshot>>,
    pub(crate) driver: Box<dyn RadioDriver>,
    pub(crate) ip_stack: Box<dyn IpStack>,
    pub(crate) store: Box<dyn ConfigStore>,
    pub(crate) flags: Arc<EventFlags>,
    pub(crate) opts: ManagerOptions,
}

impl ManagerContext {
    fn link_up(&self) -> bool {
        self.flags.contains(LINK_CONNECTED)
    }

    /// The `current` slot as seen by callers: live link state folded
    /// into the auto-connect flag. Rejected while a transition is in
    /// flight, since the slot may be mid-rewrite.
    pub(crate) fn current_config(&self) -> Result<WifiConfig, Error> {
        if !self.state.is_stable() {
            return Err(Error::Busy);
        }
        let mut cfg = self.current.clone();
        cfg.sta_connect = self.link_up();
        Ok(cfg)
    }

    /// Accept a new target configuration. Returns `Ok(true)` if a
    /// transition was started, `Ok(false)` if the request matches the
    /// applied configuration and nothing needs to happen.
    pub(crate) fn request_update(&mut self, mut cfg: WifiConfig) -> Result<bool, Error> {
        if !self.state.is_stable() {
            debug!("Configuration change in progress, rejecting update");
            return Err(Error::Busy);
        }

        // Snapshot the live configuration as the fallback target. If the
        // station never associated this run, its credentials were never
        // validated; falling back to them would strand the device, so
        // they are cleared from the snapshot.
        let connected = self.link_up();
        let mut saved = self.current.clone();
        saved.sta_connect = connected;
        if !connected {
            saved.sta = StaConfig::default();
        }
        self.saved = saved;

        cfg.is_default = false;
        if !cfg.differs_materially(&self.saved) {
            debug!("Requested configuration matches applied one, nothing to do");
            return Ok(false);
        }

        self.requested = cfg;
        self.state = ManagerState::UpdatePending;
        Ok(true)
    }

    /// Start the push-button pairing flow.
    pub(crate) fn begin_pairing(&mut self) -> Result<(), Error> {
        if !self.state.is_stable() {
            debug!("Configuration change in progress, rejecting pairing");
            return Err(Error::Busy);
        }

        info!("Starting pairing");
        let mut saved = self.current.clone();
        saved.sta_connect = self.link_up();
        self.saved = saved;
        self.state = ManagerState::PairingStart;
        Ok(())
    }

    /// Drive the state machine one step. Returns the delay before the
    /// next step.
    pub(crate) fn step(&mut self) -> Duration {
        let now = Instant::now();
        let connected = self.link_up();
        let mut delay = self.opts.poll_interval;

        debug!("Step entered in state {}", self.state);

        // If the driver cannot even report its mode, nothing we decide
        // here is trustworthy.
        if let Err(err) = self.driver.applied_mode() {
            error!("Error fetching radio mode: {err:#}");
            self.state = ManagerState::Failed;
            return delay;
        }

        match self.state {
            ManagerState::PairingStart => delay = self.pairing_start(now),
            ManagerState::PairingActive => delay = self.pairing_active(now),
            ManagerState::UpdatePending => delay = self.update_pending(now),
            ManagerState::Connecting => delay = self.connecting(now, connected),
            ManagerState::Disconnecting => delay = self.disconnecting(now),
            ManagerState::Fallback => self.fall_back(),
            ManagerState::Connected => {
                if !connected {
                    // We should be connected but are not; re-apply the
                    // current configuration.
                    info!("Connection to AP lost, retrying");
                    self.requested = self.current.clone();
                    self.state = ManagerState::UpdatePending;
                    delay = self.opts.nudge_delay;
                }
            }
            ManagerState::Idle | ManagerState::Failed => {}
        }

        // Stable states additionally service pending scan work.
        if self.state.is_stable() {
            if self.flags.contains(SCAN_START) {
                self.scan_start();
            } else if self.flags.contains(SCAN_DONE) {
                self.scan_done();
            }

            if self.flags.contains(SCAN_START | SCAN_DONE) {
                delay = self.opts.nudge_delay;
            }
        }

        debug!("Step leaving in state {} delay {delay:?}", self.state);
        delay
    }

    /// Tear down the station association and bring up a temporary AP+STA
    /// config with blank credentials, then enable the pairing capability.
    fn pairing_start(&mut self, now: Instant) -> Duration {
        info!("Bringing up pairing configuration");

        let mut temp = self.current.clone();
        temp.is_default = false;
        temp.mode = crate::domain::config::WifiMode::ApSta;
        temp.sta = StaConfig::default();
        temp.sta_connect = false;
        self.requested = temp;

        let _ = self.driver.disconnect();

        if let Err(err) = self.apply_config(self.requested.clone()) {
            error!("Pairing start: error setting temp config: {err:#}");
            self.state = ManagerState::Fallback;
            return self.opts.nudge_delay;
        }

        // Clear stale results from a previous exchange before arming.
        self.flags.clear(PAIRING_SUCCESS | PAIRING_FAILED);
        if let Err(err) = self.driver.enable_pairing(PairingKind::PushButton) {
            error!("Enabling pairing failed: {err:#}");
            self.state = ManagerState::Fallback;
            return self.opts.nudge_delay;
        }

        self.since = now;
        self.state = ManagerState::PairingActive;
        self.opts.poll_interval
    }

    /// Poll for the pairing outcome or its timeout.
    fn pairing_active(&mut self, now: Instant) -> Duration {
        if self.flags.contains(PAIRING_SUCCESS) {
            info!("Pairing success");
            if let Err(err) = self.driver.disable_pairing() {
                warn!("Disabling pairing failed: {err:#}");
            }
            self.flags.clear(PAIRING_SUCCESS | PAIRING_FAILED);

            // Pick up the received credentials, force combined mode and
            // auto-connect, and run a regular update with them.
            match self.driver.sta_config() {
                Ok(sta) => {
                    let mut cfg = self.current.clone();
                    cfg.is_default = false;
                    cfg.mode = crate::domain::config::WifiMode::ApSta;
                    cfg.sta = sta;
                    cfg.sta_connect = true;
                    self.requested = cfg;
                    self.state = ManagerState::UpdatePending;
                }
                Err(err) => {
                    error!("Pairing: error reading received credentials: {err:#}");
                    self.state = ManagerState::Fallback;
                }
            }
            self.opts.nudge_delay
        } else if self.flags.contains(PAIRING_FAILED)
            || now >= self.since + self.opts.pairing_timeout
        {
            info!("Pairing failed, restoring saved config");
            if let Err(err) = self.driver.disable_pairing() {
                warn!("Disabling pairing failed: {err:#}");
            }
            self.flags.clear(PAIRING_SUCCESS | PAIRING_FAILED);
            self.state = ManagerState::Fallback;
            self.opts.nudge_delay
        } else {
            self.opts.poll_interval
        }
    }

    /// Apply `requested` as the new current configuration.
    fn update_pending(&mut self, now: Instant) -> Duration {
        info!("Setting new configuration");

        let _ = self.driver.stop_scan();
        let _ = self.driver.disconnect();

        if let Err(err) = self.apply_config(self.requested.clone()) {
            error!("Applying configuration failed: {err:#}");
            self.state = ManagerState::Fallback;
            return self.opts.nudge_delay;
        }

        if !self.current.mode.has_sta() || !self.current.sta_connect {
            if self.link_up() {
                // The driver tears the old association down
                // asynchronously; hold here until the link drops.
                self.since = now;
                self.state = ManagerState::Disconnecting;
            } else {
                // Nothing to wait for, the new configuration is live.
                self.state = ManagerState::Idle;
            }
            self.opts.poll_interval
        } else {
            self.since = now;
            self.state = ManagerState::Connecting;
            self.opts.poll_interval
        }
    }

    /// Wait for the station link, bounded by the connect timeout.
    fn connecting(&mut self, now: Instant, connected: bool) -> Duration {
        if connected {
            info!("Established connection to AP");
            self.state = ManagerState::Connected;
            // The configuration proved itself; persist it.
            if let Err(err) = self.store.save(&self.current) {
                error!("Saving config failed: {err:#}");
            }
            self.opts.poll_interval
        } else if now >= self.since + self.opts.connect_timeout {
            info!("Timed out waiting for connection to AP");
            self.state = ManagerState::Fallback;
            self.opts.nudge_delay
        } else {
            self.opts.poll_interval
        }
    }

    fn disconnecting(&mut self, now: Instant) -> Duration {
        if !self.link_up() {
            self.state = ManagerState::Idle;
            self.opts.poll_interval
        } else if now >= self.since + self.opts.connect_timeout {
            warn!("Timed out waiting for disconnect");
            self.state = ManagerState::Fallback;
            self.opts.nudge_delay
        } else {
            self.opts.poll_interval
        }
    }

    /// One-shot revert to the saved configuration. Always ends in
    /// `Failed`; a failed fallback is not retried automatically.
    fn fall_back(&mut self) {
        info!("Falling back to previous configuration");
        let _ = self.driver.disconnect();
        if let Err(err) = self.apply_config(self.saved.clone()) {
            error!("Applying fallback configuration failed: {err:#}");
        }
        self.state = ManagerState::Failed;
    }

    /// Push a configuration into the driver and IP stack. The `current`
    /// slot tracks what was handed to the driver even on partial
    /// failure, so a later fallback knows what it is reverting from.
    fn apply_config(&mut self, mut cfg: WifiConfig) -> anyhow::Result<()> {
        if cfg.mode.has_ap() {
            cfg.ap.max_clients = cfg.ap.max_clients.min(MAX_AP_CLIENTS);
        }
        self.current = cfg.clone();

        let ap = cfg.mode.has_ap().then_some(&cfg.ap);
        let sta = cfg.mode.has_sta().then_some(&cfg.sta);
        self.driver.apply(cfg.mode, ap, sta)?;

        if cfg.mode.has_ap() {
            self.ip_stack
                .set_ap_address(cfg.ap_ip.ip, cfg.ap_ip.netmask, cfg.ap_ip.gateway)?;
        }

        if cfg.mode.has_sta() {
            match &cfg.sta_addressing {
                StaAddressing::Dhcp => self.ip_stack.set_dynamic()?,
                StaAddressing::Static {
                    ip,
                    netmask,
                    gateway,
                    dns,
                } => {
                    let dns = &dns[..dns.len().min(MAX_DNS_SERVERS)];
                    self.ip_stack.set_static(*ip, *netmask, *gateway, dns)?
                }
            }
        }

        if cfg.sta_connect && cfg.mode.has_sta() {
            self.driver.connect()?;
        }

        Ok(())
    }

    /// Ask the driver to begin a scan, if the mode allows it and none is
    /// already running. Called from stable states only; a request that
    /// arrives mid-transition stays pending in the flag set.
    fn scan_start(&mut self) {
        self.flags.clear(SCAN_START);

        let mode = match self.driver.applied_mode() {
            Ok(mode) => mode,
            Err(err) => {
                error!("Error fetching radio mode: {err:#}");
                return;
            }
        };

        if !mode.has_sta() {
            error!("Invalid radio mode for scanning");
            return;
        }

        if self.flags.contains(SCAN_RUNNING | SCAN_DONE) {
            debug!("Scan already running");
            return;
        }

        info!("Starting scan");
        match self.driver.start_scan() {
            Ok(()) => {
                self.flags.set(SCAN_RUNNING);
            }
            Err(err) => error!("Starting AP scan failed: {err:#}"),
        }
    }

    /// Fetch the finished scan's results and publish a new snapshot.
    /// On any failure the previous snapshot is retained.
    fn scan_done(&mut self) {
        let count = match self.driver.scan_result_count() {
            Ok(count) if count > 0 => count,
            Ok(_) | Err(_) => {
                info!("Scan error or empty scan result");
                self.flags.clear(SCAN_RUNNING | SCAN_DONE);
                return;
            }
        };

        // Cap how much we fetch; a hostile environment can report an
        // arbitrary number of networks.
        if count > MAX_SCAN_RECORDS {
            info!("Limiting AP records to {MAX_SCAN_RECORDS} (actually found {count})");
        }
        let count = count.min(MAX_SCAN_RECORDS);

        let fetched = self.driver.fetch_scan_results(count);

        // Results are either fetched or lost at this point, so the scan
        // flags clear regardless of the outcome.
        self.flags.clear(SCAN_RUNNING | SCAN_DONE);

        match fetched {
            Ok(records) => {
                info!("Scan done: found {} APs", records.len());
                // Installing the new snapshot drops the context's
                // reference to the old one; outstanding holders keep it
                // alive until they release it.
                self.scan = Some(ScanSnapshot::new(records));
            }
            Err(err) => error!("Error getting scan results: {err:#}"),
        }
    }
}
