//! End-to-end scenarios against the in-process radio simulation.
//!
//! All tests run on a paused tokio clock, so the one-minute dwell
//! timeouts elapse in milliseconds of wall time while the scheduler,
//! the simulation and the API callers still interleave realistically.

use std::sync::Arc;
use std::time::Duration;
use wifimngr::infrastructure::simulated::{
    LinkBehavior, PairingBehavior, SimulatedIpStack, SimulatedRadio,
};
use wifimngr::infrastructure::store::{ConfigStore, MemoryStore};
use wifimngr::{
    AccessPoint, AuthMode, Error, ManagerOptions, ManagerState, StaAddressing, StaConfig,
    WifiConfig, WifiManager, WifiMode,
};

fn network(ssid: &str, rssi: i8) -> AccessPoint {
    AccessPoint {
        ssid: ssid.to_string(),
        bssid: [2, 0, 0, 0, 0, 1],
        channel: 6,
        rssi,
        auth: AuthMode::Wpa2Psk,
    }
}

fn sta_request(ssid: &str) -> WifiConfig {
    WifiConfig {
        is_default: false,
        mode: WifiMode::ApSta,
        sta: StaConfig {
            ssid: ssid.to_string(),
            password: "hunter2".to_string(),
            bssid: None,
        },
        sta_connect: true,
        ..WifiConfig::factory_default()
    }
}

fn bring_up(radio: &SimulatedRadio, store: MemoryStore) -> Arc<WifiManager> {
    let manager = WifiManager::start(
        Box::new(radio.clone()),
        Box::new(SimulatedIpStack::new()),
        Box::new(store),
        ManagerOptions::default(),
    );
    radio.attach_bridge(manager.event_bridge());
    manager
}

/// Poll until the manager reaches `target`, panicking if it never does.
async fn wait_for_state(manager: &WifiManager, target: ManagerState) {
    for _ in 0..50_000 {
        if let Ok(state) = manager.state().await {
            if state == target {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("manager never reached {target}");
}

#[tokio::test(start_paused = true)]
async fn boot_with_empty_store_settles_to_idle() {
    let radio = SimulatedRadio::new();
    let manager = bring_up(&radio, MemoryStore::new());

    wait_for_state(&manager, ManagerState::Idle).await;

    let cfg = manager.get_config().await.unwrap();
    assert_eq!(cfg.mode, WifiMode::ApSta);
    assert!(!cfg.sta_connect);
    assert!(!manager.store_valid().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn boot_with_persisted_record_connects() {
    let mut store = MemoryStore::new();
    store.save(&sta_request("home")).unwrap();

    let radio = SimulatedRadio::new();
    let manager = bring_up(&radio, store);

    wait_for_state(&manager, ManagerState::Connected).await;
    assert!(manager.is_connected());

    let cfg = manager.get_config().await.unwrap();
    assert_eq!(cfg.sta.ssid, "home");
}

#[tokio::test(start_paused = true)]
async fn sta_update_with_good_credentials_connects_and_persists() {
    let radio = SimulatedRadio::new();
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    manager.set_config(sta_request("home")).await.unwrap();
    wait_for_state(&manager, ManagerState::Connected).await;

    let cfg = manager.get_config().await.unwrap();
    assert_eq!(cfg.sta.ssid, "home");
    assert!(cfg.sta_connect);
    assert!(
        manager.store_valid().await.unwrap(),
        "proven configuration must be persisted"
    );
    assert_eq!(
        manager.sta_addressing().await.unwrap(),
        StaAddressing::Dhcp
    );

    manager.reset_store().await.unwrap();
    assert!(!manager.store_valid().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn wrong_credentials_fall_back_to_saved_configuration() {
    let radio = SimulatedRadio::new();
    radio.set_link_behavior(LinkBehavior::NeverUp);
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    let before = manager.get_config().await.unwrap();
    manager.set_config(sta_request("wrong")).await.unwrap();
    wait_for_state(&manager, ManagerState::Failed).await;

    // The fallback restored the prior configuration; the station
    // credentials were never validated, so they are blank, never a mix
    // of old and new fields.
    let after = manager.get_config().await.unwrap();
    assert_eq!(after.mode, before.mode);
    assert_eq!(after.sta, StaConfig::default());
    assert_ne!(after.sta.ssid, "wrong");
    assert!(!manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn concurrent_update_is_rejected_as_busy() {
    let radio = SimulatedRadio::new();
    radio.set_link_behavior(LinkBehavior::NeverUp);
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    manager.set_config(sta_request("first")).await.unwrap();
    // The transition is in flight; a second writer must be rejected.
    let err = manager.set_config(sta_request("second")).await.unwrap_err();
    assert!(matches!(err, Error::Busy));
    let err = manager.start_pairing().await.unwrap_err();
    assert!(matches!(err, Error::Busy));
    let err = manager.get_config().await.unwrap_err();
    assert!(matches!(err, Error::Busy));

    // Settling ends on the fallback outcome, not on either request.
    wait_for_state(&manager, ManagerState::Failed).await;
    let after = manager.get_config().await.unwrap();
    assert_ne!(after.sta.ssid, "first");
    assert_ne!(after.sta.ssid, "second");
}

#[tokio::test(start_paused = true)]
async fn identical_request_is_an_idempotent_no_op() {
    let radio = SimulatedRadio::new();
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    let calls_before = radio.calls().len();
    let cfg = manager.get_config().await.unwrap();
    manager.set_config(cfg).await.unwrap();

    assert_eq!(manager.state().await.unwrap(), ManagerState::Idle);
    assert_eq!(
        radio.calls().len(),
        calls_before,
        "no driver calls for an unchanged configuration"
    );
}

#[tokio::test(start_paused = true)]
async fn pairing_success_joins_with_received_credentials() {
    let radio = SimulatedRadio::new();
    radio.set_pairing_behavior(PairingBehavior::SucceedWith(
        StaConfig {
            ssid: "paired-net".to_string(),
            password: "paired-pass".to_string(),
            bssid: None,
        },
        Duration::from_millis(200),
    ));
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    manager.start_pairing().await.unwrap();
    wait_for_state(&manager, ManagerState::Connected).await;

    let cfg = manager.get_config().await.unwrap();
    assert_eq!(cfg.mode, WifiMode::ApSta, "pairing forces combined mode");
    assert_eq!(cfg.sta.ssid, "paired-net");
    assert!(cfg.sta_connect);
}

#[tokio::test(start_paused = true)]
async fn pairing_without_peer_times_out_into_failed() {
    let radio = SimulatedRadio::new();
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    manager.start_pairing().await.unwrap();
    wait_for_state(&manager, ManagerState::Failed).await;
    assert!(radio.calls().contains(&"disable_pairing".to_string()));
}

#[tokio::test(start_paused = true)]
async fn scan_snapshot_survives_replacement_while_borrowed() {
    let radio = SimulatedRadio::new();
    radio.set_networks(vec![network("one", -40)]);
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    manager.start_scan();
    let first = loop {
        if let Some(snapshot) = manager.scan_snapshot().await.unwrap() {
            break snapshot;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert_eq!(first.records[0].ssid, "one");

    // A second scan supersedes the snapshot while we still hold it.
    radio.set_networks(vec![network("two", -60)]);
    manager.start_scan();
    let second = loop {
        let snapshot = manager.scan_snapshot().await.unwrap().unwrap();
        if !Arc::ptr_eq(&snapshot, &first) {
            break snapshot;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    assert_eq!(second.records[0].ssid, "two");
    // The borrowed snapshot is untouched by the replacement.
    assert_eq!(first.records[0].ssid, "one");
}

#[tokio::test(start_paused = true)]
async fn connect_in_ap_only_mode_is_invalid() {
    let radio = SimulatedRadio::new();
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    let mut cfg = manager.get_config().await.unwrap();
    cfg.mode = WifiMode::Ap;
    cfg.sta_connect = false;
    manager.set_config(cfg).await.unwrap();
    wait_for_state(&manager, ManagerState::Idle).await;
    assert_eq!(manager.mode().await.unwrap(), WifiMode::Ap);

    assert!(matches!(manager.connect().await, Err(Error::InvalidState)));
    assert!(matches!(
        manager.disconnect().await,
        Err(Error::InvalidState)
    ));
}

#[tokio::test(start_paused = true)]
async fn disconnect_returns_to_idle_and_reconnect_works() {
    let radio = SimulatedRadio::new();
    let manager = bring_up(&radio, MemoryStore::new());
    wait_for_state(&manager, ManagerState::Idle).await;

    manager.set_config(sta_request("home")).await.unwrap();
    wait_for_state(&manager, ManagerState::Connected).await;

    manager.disconnect().await.unwrap();
    wait_for_state(&manager, ManagerState::Idle).await;
    assert!(!manager.is_connected());

    manager.connect().await.unwrap();
    wait_for_state(&manager, ManagerState::Connected).await;
    assert!(manager.is_connected());
}
