//! Monitor configuration (YAML).
//!
//! ```yaml
//! printers:
//!   printer1:
//!     address: 10.0.0.5
//!     toners: { empty: 10, low: 25 }
//!   lobby:
//!     address: lobby-printer.example.org
//! persistenceFile: /var/lib/printer-monitor/previousState.json
//! mq:
//!   host: localhost
//!   queue: RT_Events_q
//! ```
//!
//! The file is checked structurally first so each broken rule gets its own
//! error, then deserialized into [`MonitorConfig`].

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("configuration must be a mapping")]
    NotAMapping,
    #[error("no printers defined, at least one printer with an address is required")]
    MissingPrinters,
    #[error("printer '{0}' must be a mapping")]
    PrinterNotAMapping(String),
    #[error("printer '{0}' has no address")]
    MissingAddress(String),
    #[error("printer '{0}' address must be a string")]
    AddressNotAString(String),
    #[error("printer '{printer}': toner threshold '{field}' must be between 0 and 100, got {value}")]
    InvalidThreshold {
        printer: String,
        field: &'static str,
        value: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    pub printers: BTreeMap<String, PrinterConf>,
    #[serde(default = "default_persistence_file", alias = "PersistanceFile")]
    pub persistence_file: PathBuf,
    pub mq: Option<MqConf>,
    #[serde(default)]
    pub snmp: SnmpConf,
    #[serde(default = "default_poll_workers")]
    pub poll_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConf {
    pub address: String,
    pub toners: Option<TonerThresholds>,
}

/// Percent levels at or below which an alert fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TonerThresholds {
    pub empty: u8,
    pub low: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqConf {
    pub host: String,
    pub queue: String,
    #[serde(default = "default_mq_port")]
    pub port: u16,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpConf {
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl SnmpConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SnmpConf {
    fn default() -> Self {
        Self {
            community: default_community(),
            port: default_snmp_port(),
            timeout_secs: default_timeout_secs(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_persistence_file() -> PathBuf {
    PathBuf::from("previousState.json")
}

fn default_poll_workers() -> usize {
    4
}

fn default_mq_port() -> u16 {
    1883
}

fn default_community() -> String {
    "public".into()
}

fn default_snmp_port() -> u16 {
    161
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_rows() -> usize {
    1024
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let txt = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&txt)
    }

    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        let raw: Value = serde_yaml::from_str(txt)?;
        check_structure(&raw)?;

        let config: MonitorConfig = serde_yaml::from_value(raw)?;
        config.check_thresholds()?;
        Ok(config)
    }

    pub fn printer(&self, name: &str) -> Option<&PrinterConf> {
        self.printers.get(name)
    }

    /// Thresholds of a printer monitored for consumables.
    pub fn thresholds(&self, name: &str) -> Option<TonerThresholds> {
        self.printer(name).and_then(|p| p.toners)
    }

    fn check_thresholds(&self) -> Result<(), ConfigError> {
        for (name, printer) in &self.printers {
            let Some(t) = printer.toners else { continue };
            for (field, value) in [("empty", t.empty), ("low", t.low)] {
                if value > 100 {
                    return Err(ConfigError::InvalidThreshold {
                        printer: name.clone(),
                        field,
                        value: value.into(),
                    });
                }
            }
            if t.empty > t.low {
                warn!(printer = %name, empty = t.empty, low = t.low,
                      "empty threshold above low threshold, near-empty alerts will never fire");
            }
        }
        Ok(())
    }
}

/// Same rules as the typed model, reported one by one.
fn check_structure(raw: &Value) -> Result<(), ConfigError> {
    let Value::Mapping(root) = raw else {
        return Err(ConfigError::NotAMapping);
    };

    let printers = match root.get("printers") {
        Some(Value::Mapping(p)) if !p.is_empty() => p,
        _ => {
            warn!("no printer node available in the config file");
            return Err(ConfigError::MissingPrinters);
        }
    };

    for (key, printer) in printers {
        let name = match key {
            Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        };
        let Value::Mapping(fields) = printer else {
            return Err(ConfigError::PrinterNotAMapping(name));
        };
        match fields.get("address") {
            None => return Err(ConfigError::MissingAddress(name)),
            Some(Value::String(_)) => {}
            Some(_) => return Err(ConfigError::AddressNotAString(name)),
        }
        if let Some(Value::Mapping(toners)) = fields.get("toners") {
            for field in ["empty", "low"] {
                if let Some(value) = toners.get(field).and_then(Value::as_i64) {
                    if !(0..=100).contains(&value) {
                        return Err(ConfigError::InvalidThreshold {
                            printer: name,
                            field,
                            value,
                        });
                    }
                }
            }
        }
    }

    Ok(())
}
