//! Runs the manager against the in-process radio simulation: boots the
//! factory default, requests a station configuration, scans, and shows
//! the fallback path with wrong credentials.

use std::time::Duration;
use tracing::info;
use wifimngr::infrastructure::logging::{init_logger, LogSettings};
use wifimngr::infrastructure::simulated::{LinkBehavior, SimulatedIpStack, SimulatedRadio};
use wifimngr::infrastructure::store::MemoryStore;
use wifimngr::{
    AccessPoint, AuthMode, ManagerOptions, ManagerState, StaConfig, WifiManager, WifiMode,
};

async fn wait_for_stable(manager: &WifiManager) -> ManagerState {
    loop {
        if let Ok(state) = manager.state().await {
            if state.is_stable() {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logger(&LogSettings::default())?;
    info!("Starting WiFi manager demo");

    let radio = SimulatedRadio::new();
    radio.set_networks(vec![
        AccessPoint {
            ssid: "home".to_string(),
            bssid: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01],
            channel: 6,
            rssi: -42,
            auth: AuthMode::Wpa2Psk,
        },
        AccessPoint {
            ssid: "neighbour".to_string(),
            bssid: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x02],
            channel: 11,
            rssi: -71,
            auth: AuthMode::Wpa3Psk,
        },
    ]);

    let opts = ManagerOptions {
        poll_interval: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
        pairing_timeout: Duration::from_secs(2),
        ..ManagerOptions::default()
    };

    let manager = WifiManager::start(
        Box::new(radio.clone()),
        Box::new(SimulatedIpStack::new()),
        Box::new(MemoryStore::new()),
        opts,
    );
    radio.attach_bridge(manager.event_bridge());

    let state = wait_for_stable(&manager).await;
    info!("Booted with factory defaults, state: {state}");

    // Scan the neighbourhood.
    manager.start_scan();
    tokio::time::sleep(Duration::from_millis(500)).await;
    if let Some(snapshot) = manager.scan_snapshot().await? {
        for ap in &snapshot.records {
            info!("Found network '{}' rssi {} dBm", ap.ssid, ap.rssi);
        }
    }

    // Join the home network; the simulation accepts the credentials.
    let mut cfg = manager.get_config().await?;
    cfg.mode = WifiMode::ApSta;
    cfg.sta = StaConfig {
        ssid: "home".to_string(),
        password: "correct horse".to_string(),
        bssid: None,
    };
    cfg.sta_connect = true;
    manager.set_config(cfg).await?;

    let state = wait_for_stable(&manager).await;
    info!("After join attempt, state: {state}, connected: {}", manager.is_connected());

    // Now a bad configuration: the link never comes up, the manager
    // falls back and the device stays reachable through the old config.
    radio.set_link_behavior(LinkBehavior::NeverUp);
    let mut bad = manager.get_config().await?;
    bad.sta.ssid = "does-not-exist".to_string();
    manager.set_config(bad).await?;

    let state = wait_for_stable(&manager).await;
    let cfg = manager.get_config().await?;
    info!(
        "After bad join attempt, state: {state}, active STA ssid: '{}'",
        cfg.sta.ssid
    );

    Ok(())
}
