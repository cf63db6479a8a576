//! Persistent configuration store.
//!
//! A configuration record is persisted as a small set of named fields
//! under one namespace: three scalars (`mode`, `sta_static`,
//! `sta_connect`) plus opaque blobs for the AP/STA/addressing
//! structures. Writing each field individually lets the record grow in
//! later versions without forcing a factory reset. Absence or
//! corruption of any field is treated as "no valid saved
//! configuration".
//!
//! Save semantics are all-or-nothing as seen by readers: the previous
//! record is erased before writing and erased again on any mid-write
//! failure, so the store never holds a mix of old and new fields. The
//! factory default record is exempt and never persisted; saving it just
//! erases the namespace.

use crate::domain::config::{ApAddressing, ApConfig, StaAddressing, StaConfig, WifiConfig, WifiMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::{info, warn};

/// Store contract consumed by the manager.
pub trait ConfigStore: Send {
    /// Read the persisted record. `Ok(None)` means no valid record.
    fn load(&self) -> Result<Option<WifiConfig>>;

    /// Persist a record, replacing whatever was stored before.
    fn save(&mut self, cfg: &WifiConfig) -> Result<()>;

    /// Remove the persisted record.
    fn erase(&mut self) -> Result<()>;

    /// True if a valid record is currently stored.
    fn is_valid(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }
}

const FIELD_NAMES: [&str; 8] = [
    "mode",
    "sta_static",
    "sta_connect",
    "ap",
    "sta",
    "ap_ip",
    "sta_ip",
    "sta_dns",
];

/// Static part of the STA addressing, stored as its own blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StaIpInfo {
    ip: Ipv4Addr,
    netmask: Ipv4Addr,
    gateway: Ipv4Addr,
}

fn encode_record(cfg: &WifiConfig) -> Result<Vec<(&'static str, Vec<u8>)>> {
    let (sta_static, sta_ip, sta_dns) = match &cfg.sta_addressing {
        StaAddressing::Dhcp => (false, None, Vec::new()),
        StaAddressing::Static {
            ip,
            netmask,
            gateway,
            dns,
        } => (
            true,
            Some(StaIpInfo {
                ip: *ip,
                netmask: *netmask,
                gateway: *gateway,
            }),
            dns.clone(),
        ),
    };

    Ok(vec![
        ("mode", serde_json::to_vec(&cfg.mode)?),
        ("sta_static", serde_json::to_vec(&sta_static)?),
        ("sta_connect", serde_json::to_vec(&cfg.sta_connect)?),
        ("ap", serde_json::to_vec(&cfg.ap)?),
        ("sta", serde_json::to_vec(&cfg.sta)?),
        ("ap_ip", serde_json::to_vec(&cfg.ap_ip)?),
        ("sta_ip", serde_json::to_vec(&sta_ip)?),
        ("sta_dns", serde_json::to_vec(&sta_dns)?),
    ])
}

/// Rebuild a record from its fields. Any missing or unparsable field
/// invalidates the whole record.
fn decode_record(mut lookup: impl FnMut(&str) -> Option<Vec<u8>>) -> Option<WifiConfig> {
    fn field<T: for<'de> Deserialize<'de>>(
        lookup: &mut impl FnMut(&str) -> Option<Vec<u8>>,
        name: &str,
    ) -> Option<T> {
        let raw = lookup(name)?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Persisted field '{name}' is corrupt: {err}");
                None
            }
        }
    }

    let mode: WifiMode = field(&mut lookup, "mode")?;
    let sta_static: bool = field(&mut lookup, "sta_static")?;
    let sta_connect: bool = field(&mut lookup, "sta_connect")?;
    let ap: ApConfig = field(&mut lookup, "ap")?;
    let sta: StaConfig = field(&mut lookup, "sta")?;
    let ap_ip: ApAddressing = field(&mut lookup, "ap_ip")?;
    let sta_ip: Option<StaIpInfo> = field(&mut lookup, "sta_ip")?;
    let sta_dns: Vec<Ipv4Addr> = field(&mut lookup, "sta_dns")?;

    let sta_addressing = if sta_static {
        let info = sta_ip?;
        StaAddressing::Static {
            ip: info.ip,
            netmask: info.netmask,
            gateway: info.gateway,
            dns: sta_dns,
        }
    } else {
        StaAddressing::Dhcp
    };

    Some(WifiConfig {
        is_default: false,
        mode,
        ap,
        ap_ip,
        sta,
        sta_addressing,
        sta_connect,
    })
}

/// File-backed store: one file per field inside a namespace directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating store directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Store under the user's config directory.
    pub fn default_location() -> Result<Self> {
        let mut dir = dirs::config_dir().context("could not determine config directory")?;
        dir.push("wifimngr");
        Self::new(dir)
    }

    fn field_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn erase_fields(&self) -> Result<()> {
        for name in FIELD_NAMES {
            let path = self.field_path(name);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("erasing field {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn write_fields(&self, cfg: &WifiConfig) -> Result<()> {
        for (name, blob) in encode_record(cfg)? {
            fs::write(self.field_path(name), blob)
                .with_context(|| format!("writing field '{name}'"))?;
        }
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn load(&self) -> Result<Option<WifiConfig>> {
        Ok(decode_record(|name| fs::read(self.field_path(name)).ok()))
    }

    fn save(&mut self, cfg: &WifiConfig) -> Result<()> {
        // Erase first so a power-fail never leaves a mix of records.
        self.erase_fields()?;

        if cfg.is_default {
            info!("Not persisting factory default configuration");
            return Ok(());
        }

        if let Err(err) = self.write_fields(cfg) {
            // Do not leave a half-written record behind.
            warn!("Writing config failed, erasing partial record: {err:#}");
            let _ = self.erase_fields();
            return Err(err);
        }

        Ok(())
    }

    fn erase(&mut self) -> Result<()> {
        self.erase_fields()
    }
}

/// In-memory store, used by the demo binary and tests.
#[derive(Default)]
pub struct MemoryStore {
    fields: HashMap<String, Vec<u8>>,
    /// When set, the next write of this field fails. Lets tests exercise
    /// the erase-on-failure path.
    pub fail_on_field: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<WifiConfig>> {
        Ok(decode_record(|name| self.fields.get(name).cloned()))
    }

    fn save(&mut self, cfg: &WifiConfig) -> Result<()> {
        self.fields.clear();

        if cfg.is_default {
            return Ok(());
        }

        for (name, blob) in encode_record(cfg)? {
            if self.fail_on_field.as_deref() == Some(name) {
                self.fields.clear();
                anyhow::bail!("injected write failure on field '{name}'");
            }
            self.fields.insert(name.to_string(), blob);
        }

        Ok(())
    }

    fn erase(&mut self) -> Result<()> {
        self.fields.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{StaConfig, WifiMode};

    fn sample_record() -> WifiConfig {
        WifiConfig {
            is_default: false,
            mode: WifiMode::ApSta,
            sta: StaConfig {
                ssid: "home".to_string(),
                password: "hunter2".to_string(),
                bssid: None,
            },
            sta_addressing: StaAddressing::Static {
                ip: Ipv4Addr::new(10, 0, 0, 2),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(10, 0, 0, 1),
                dns: vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(1, 1, 1, 1)],
            },
            sta_connect: true,
            ..WifiConfig::factory_default()
        }
    }

    #[test]
    fn memory_round_trip() {
        let mut store = MemoryStore::new();
        let record = sample_record();
        store.save(&record).unwrap();

        let loaded = store.load().unwrap().expect("record should be present");
        assert_eq!(loaded, record);
        assert!(store.is_valid());
    }

    #[test]
    fn factory_default_is_never_persisted() {
        let mut store = MemoryStore::new();
        store.save(&sample_record()).unwrap();

        store.save(&WifiConfig::factory_default()).unwrap();
        assert!(store.is_empty());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn failed_write_leaves_no_partial_record() {
        let mut store = MemoryStore::new();
        store.save(&sample_record()).unwrap();

        store.fail_on_field = Some("sta".to_string());
        assert!(store.save(&sample_record()).is_err());
        assert!(store.is_empty(), "partial record must be erased");
    }

    #[test]
    fn missing_field_invalidates_record() {
        let mut store = MemoryStore::new();
        store.save(&sample_record()).unwrap();
        store.fields.remove("sta_dns");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_field_invalidates_record() {
        let mut store = MemoryStore::new();
        store.save(&sample_record()).unwrap();
        store
            .fields
            .insert("ap".to_string(), b"not json".to_vec());
        assert!(store.load().unwrap().is_none());
        assert!(!store.is_valid());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "wifimngr-store-test-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = fs::remove_dir_all(&dir);

        let mut store = FileStore::new(dir.clone()).unwrap();
        assert!(store.load().unwrap().is_none());

        let record = sample_record();
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));

        store.erase().unwrap();
        assert!(store.load().unwrap().is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}
