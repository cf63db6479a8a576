//! WiFi Manager core.
//!
//! Coordinates the configuration state machine, its scheduler and the
//! event bridge behind one small public API. All manager fields live in
//! a single `ManagerContext` behind one mutex; API callers take it with
//! a bounded wait, the scheduler with a non-blocking attempt plus a
//! near-term retry, so neither side can stall the other indefinitely.

pub mod events;
pub mod scan;
mod state;

pub use events::EventBridge;
pub use scan::{ScanSnapshot, MAX_SCAN_RECORDS};
pub use state::ManagerOptions;

use crate::domain::config::{StaAddressing, WifiConfig, WifiMode};
use crate::domain::models::ManagerState;
use crate::error::{Error, Result};
use crate::infrastructure::driver::{IpStack, RadioDriver};
use crate::infrastructure::store::ConfigStore;
use crate::manager::events::{EventFlags, LINK_CONNECTED, SCAN_START};
use crate::manager::state::ManagerContext;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Manager for exactly one logical radio.
///
/// Constructed with [`WifiManager::start`], which restores the persisted
/// configuration (or the factory default) and spawns the scheduler task
/// that applies it. Driver notifications are fed in through the handle
/// returned by [`WifiManager::event_bridge`].
pub struct WifiManager {
    ctx: Arc<Mutex<ManagerContext>>,
    flags: Arc<EventFlags>,
    wake: Arc<Notify>,
    opts: ManagerOptions,
    scheduler: JoinHandle<()>,
}

impl WifiManager {
    /// Bring up the manager. Must be called within a tokio runtime.
    ///
    /// Boot flow: `saved` is seeded with the factory default so even a
    /// botched first transition leaves the device reachable; the
    /// persisted record (or the default, if none is valid) becomes the
    /// first requested configuration and the scheduler applies it.
    pub fn start(
        driver: Box<dyn RadioDriver>,
        ip_stack: Box<dyn IpStack>,
        store: Box<dyn ConfigStore>,
        opts: ManagerOptions,
    ) -> Arc<Self> {
        let flags = Arc::new(EventFlags::new());
        let wake = Arc::new(Notify::new());

        let defaults = WifiConfig::factory_default();
        let requested = match store.load() {
            Ok(Some(cfg)) => {
                info!("Restoring persisted configuration");
                cfg
            }
            Ok(None) => {
                info!("No saved config found, setting defaults");
                defaults.clone()
            }
            Err(err) => {
                warn!("Reading persisted config failed, setting defaults: {err:#}");
                defaults.clone()
            }
        };

        let ctx = Arc::new(Mutex::new(ManagerContext {
            state: ManagerState::UpdatePending,
            saved: defaults.clone(),
            current: defaults,
            requested,
            since: Instant::now(),
            scan: None,
            driver,
            ip_stack,
            store,
            flags: flags.clone(),
            opts: opts.clone(),
        }));

        let scheduler = tokio::spawn(run_scheduler(ctx.clone(), wake.clone(), opts.clone()));

        Arc::new(Self {
            ctx,
            flags,
            wake,
            opts,
            scheduler,
        })
    }

    /// Bounded-wait acquisition of the context lock. Callers fail fast
    /// with [`Error::Timeout`] instead of blocking behind a slow step.
    async fn lock(&self) -> Result<MutexGuard<'_, ManagerContext>> {
        tokio::time::timeout(self.opts.lock_timeout, self.ctx.lock())
            .await
            .map_err(|_| Error::Timeout)
    }

    fn nudge(&self) {
        self.wake.notify_one();
    }

    /// Handle for feeding driver notifications into the manager.
    pub fn event_bridge(&self) -> EventBridge {
        EventBridge::new(self.flags.clone(), self.wake.clone())
    }

    /// Request a new configuration. Returns as soon as the asynchronous
    /// update is triggered; progress is observable through
    /// [`WifiManager::state`]. A request identical to the applied
    /// configuration succeeds without any transition.
    pub async fn set_config(&self, cfg: WifiConfig) -> Result<()> {
        let mut ctx = self.lock().await?;
        if ctx.request_update(cfg)? {
            drop(ctx);
            self.nudge();
        }
        Ok(())
    }

    /// The currently applied configuration. Fails with [`Error::Busy`]
    /// while a transition is in flight.
    pub async fn get_config(&self) -> Result<WifiConfig> {
        self.lock().await?.current_config()
    }

    /// Trigger the push-button pairing flow.
    pub async fn start_pairing(&self) -> Result<()> {
        let mut ctx = self.lock().await?;
        ctx.begin_pairing()?;
        drop(ctx);
        self.nudge();
        Ok(())
    }

    /// Request a scan. Always accepted; the scan starts once the
    /// manager is in a stable state and results become available
    /// through [`WifiManager::scan_snapshot`].
    pub fn start_scan(&self) {
        self.flags.set(SCAN_START);
        self.nudge();
    }

    /// Borrow the latest scan results. The returned handle keeps the
    /// snapshot alive until dropped, even across later replacements.
    pub async fn scan_snapshot(&self) -> Result<Option<Arc<ScanSnapshot>>> {
        Ok(self.lock().await?.scan.clone())
    }

    /// Enable auto-connect within the current mode.
    pub async fn connect(&self) -> Result<()> {
        self.set_connect(true).await
    }

    /// Drop the station association within the current mode.
    pub async fn disconnect(&self) -> Result<()> {
        self.set_connect(false).await
    }

    async fn set_connect(&self, connect: bool) -> Result<()> {
        let mut ctx = self.lock().await?;
        let mut cfg = ctx.current_config()?;
        if !cfg.mode.has_sta() {
            return Err(Error::InvalidState);
        }
        cfg.sta_connect = connect;
        if ctx.request_update(cfg)? {
            drop(ctx);
            self.nudge();
        }
        Ok(())
    }

    /// Current state tag.
    pub async fn state(&self) -> Result<ManagerState> {
        Ok(self.lock().await?.state)
    }

    /// Cheap link-state query off the sticky flags; takes no lock.
    pub fn is_connected(&self) -> bool {
        self.flags.contains(LINK_CONNECTED)
    }

    /// Mode the manager last applied.
    pub async fn mode(&self) -> Result<WifiMode> {
        Ok(self.lock().await?.current.mode)
    }

    /// Addressing policy currently active on the station interface.
    pub async fn sta_addressing(&self) -> Result<StaAddressing> {
        self.lock().await?.ip_stack.addressing().map_err(Error::Driver)
    }

    /// Whether the persistent store holds a valid record.
    pub async fn store_valid(&self) -> Result<bool> {
        Ok(self.lock().await?.store.is_valid())
    }

    /// Erase the persisted configuration. The running configuration is
    /// untouched; the next boot starts from the factory default.
    pub async fn reset_store(&self) -> Result<()> {
        let mut ctx = self.lock().await?;
        ctx.store.erase().map_err(Error::Storage)
    }
}

impl Drop for WifiManager {
    fn drop(&mut self) {
        self.scheduler.abort();
    }
}

/// The recurring timer: sleep for the delay the last step asked for, or
/// until a wake-up arrives, then run the next step. Failing to take the
/// lock must not skip the step outright, since a skip could strand the
/// machine mid-transition; it reschedules a near-immediate retry
/// instead.
async fn run_scheduler(
    ctx: Arc<Mutex<ManagerContext>>,
    wake: Arc<Notify>,
    opts: ManagerOptions,
) {
    // Apply the boot configuration promptly.
    let mut delay = opts.nudge_delay;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {}
        }

        delay = match ctx.try_lock() {
            Ok(mut guard) => guard.step(),
            Err(_) => opts.nudge_delay,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn lock_contention_times_out_instead_of_blocking() {
        use crate::infrastructure::simulated::{SimulatedIpStack, SimulatedRadio};
        use crate::infrastructure::store::MemoryStore;

        let radio = SimulatedRadio::new();
        let manager = WifiManager::start(
            Box::new(radio),
            Box::new(SimulatedIpStack::new()),
            Box::new(MemoryStore::new()),
            ManagerOptions::default(),
        );

        // Hold the lock and watch an API call fail fast.
        let guard = manager.ctx.lock().await;
        let err = manager.get_config().await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        drop(guard);
    }
}
