//! Printer consumables monitor.
//!
//! One run polls every configured printer over SNMP, compares the consumable
//! levels with the previous run and publishes an alert the first time a
//! consumable drops to its near-empty or empty threshold.

pub mod alerts;
pub mod config;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod mq;
pub mod poller;
pub mod resolve;
pub mod snmp;
pub mod store;
pub mod supplies;

pub use config::MonitorConfig;
pub use models::{AlertEvent, AlertLevel, ConsumableRecord, Snapshot};
pub use monitor::{run_cycle, CycleReport};
pub use mq::{AlertPublisher, AlertSink, MqttSink, PublishError, PublishReport};
pub use snmp::{SnmpWalk, SnmpWalker};
pub use store::{PersistenceError, SnapshotStore};
