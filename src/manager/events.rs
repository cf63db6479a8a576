//! Sticky event flags and the bridge feeding them.
//!
//! Driver notifications arrive from an unspecified asynchronous context,
//! concurrently with the step function and with API callers. Only the
//! latest state of each condition matters, so events are folded into an
//! atomic bit-set rather than queued. The bridge wakes the scheduler
//! only when a notification actually changed the set, to avoid
//! redundant wake-ups.

use crate::domain::models::{RadioEvent, ScanStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Station link is up.
pub const LINK_CONNECTED: u32 = 1 << 0;
/// A caller asked for a scan; serviced once the manager is stable.
pub const SCAN_START: u32 = 1 << 1;
/// The driver is currently scanning.
pub const SCAN_RUNNING: u32 = 1 << 2;
/// A scan finished and its results are ready to fetch.
pub const SCAN_DONE: u32 = 1 << 3;
/// Pairing exchange succeeded.
pub const PAIRING_SUCCESS: u32 = 1 << 4;
/// Pairing exchange failed.
pub const PAIRING_FAILED: u32 = 1 << 5;

/// Atomic bit-set of sticky condition flags.
#[derive(Default)]
pub struct EventFlags(AtomicU32);

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `bits`, returning the previous value.
    pub fn set(&self, bits: u32) -> u32 {
        self.0.fetch_or(bits, Ordering::AcqRel)
    }

    /// Clear `bits`, returning the previous value.
    pub fn clear(&self, bits: u32) -> u32 {
        self.0.fetch_and(!bits, Ordering::AcqRel)
    }

    pub fn contains(&self, bits: u32) -> bool {
        self.0.load(Ordering::Acquire) & bits != 0
    }

    pub fn snapshot(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

/// Translates driver notifications into flag updates and scheduler
/// wake-ups. Cheap to clone; safe to call from any task or thread.
#[derive(Clone)]
pub struct EventBridge {
    flags: Arc<EventFlags>,
    wake: Arc<Notify>,
}

impl EventBridge {
    pub(crate) fn new(flags: Arc<EventFlags>, wake: Arc<Notify>) -> Self {
        Self { flags, wake }
    }

    /// Fold one driver occurrence into the flag set.
    pub fn dispatch(&self, event: RadioEvent) {
        let old = self.flags.snapshot();

        match event {
            RadioEvent::LinkUp => {
                self.flags.set(LINK_CONNECTED);
            }
            RadioEvent::LinkDown => {
                self.flags.clear(LINK_CONNECTED);
            }
            RadioEvent::ScanStarted => {
                self.flags.set(SCAN_RUNNING);
            }
            RadioEvent::ScanComplete(status) => {
                if status == ScanStatus::Ok {
                    self.flags.set(SCAN_DONE);
                } else {
                    // Nothing will fetch results, so the running bit has
                    // to drop here or scans stay blocked for good.
                    self.flags.clear(SCAN_RUNNING);
                }
                self.flags.clear(SCAN_START);
            }
            RadioEvent::PairingSucceeded => {
                self.flags.set(PAIRING_SUCCESS);
            }
            RadioEvent::PairingFailed => {
                self.flags.set(PAIRING_FAILED);
            }
        }

        // Only ask for an expedited step when something changed.
        let new = self.flags.snapshot();
        if old != new {
            debug!("Radio event {event:?}: flags {old:#b} -> {new:#b}");
            self.wake.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_report_previous_value() {
        let flags = EventFlags::new();
        assert_eq!(flags.set(LINK_CONNECTED), 0);
        assert_eq!(flags.set(SCAN_DONE), LINK_CONNECTED);
        assert!(flags.contains(LINK_CONNECTED | SCAN_DONE));

        let old = flags.clear(LINK_CONNECTED);
        assert_eq!(old, LINK_CONNECTED | SCAN_DONE);
        assert!(!flags.contains(LINK_CONNECTED));
        assert!(flags.contains(SCAN_DONE));
    }

    #[test]
    fn failed_scan_sets_no_done_flag() {
        let flags = Arc::new(EventFlags::new());
        let bridge = EventBridge::new(flags.clone(), Arc::new(Notify::new()));

        flags.set(SCAN_START | SCAN_RUNNING);
        bridge.dispatch(RadioEvent::ScanComplete(ScanStatus::Failed));

        assert!(!flags.contains(SCAN_DONE | SCAN_START | SCAN_RUNNING));
    }

    #[tokio::test]
    async fn wake_fires_only_on_flag_transition() {
        let flags = Arc::new(EventFlags::new());
        let wake = Arc::new(Notify::new());
        let bridge = EventBridge::new(flags.clone(), wake.clone());

        bridge.dispatch(RadioEvent::LinkUp);
        // A wake-up is pending from the transition.
        tokio::time::timeout(std::time::Duration::from_millis(10), wake.notified())
            .await
            .expect("transition should wake the scheduler");

        // Repeating the same event changes nothing and stays silent.
        bridge.dispatch(RadioEvent::LinkUp);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(10), wake.notified())
                .await
                .is_err(),
            "no flag change, no wake-up"
        );
    }
}
