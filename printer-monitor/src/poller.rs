//! Builds the current snapshot: one walk per monitored printer.
//!
//! Printers are polled concurrently, at most `poll_workers` at a time. Each
//! walk runs on the blocking pool and produces its printer's entry on its
//! own; the snapshot is put together once every printer has answered or
//! failed. A printer that cannot be reached gets a single error record.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{MonitorConfig, PrinterConf};
use crate::models::{ConsumableRecord, Snapshot};
use crate::resolve::resolve_ipv4;
use crate::snmp::{ProtocolError, SnmpWalk, PRT_MARKER_SUPPLIES_ENTRY};
use crate::supplies;

pub struct Poller {
    walker: Arc<dyn SnmpWalk>,
    workers: usize,
}

impl Poller {
    pub fn new(walker: Arc<dyn SnmpWalk>, workers: usize) -> Self {
        Self {
            walker,
            workers: workers.max(1),
        }
    }

    /// Entry for every configured printer; `None` for printers without a
    /// `toners` section, which are not contacted.
    pub async fn poll_all(&self, config: &MonitorConfig) -> Snapshot {
        stream::iter(config.printers.iter())
            .map(|(name, printer)| async move {
                let supplies = match printer.toners {
                    Some(_) => Some(self.poll_printer(name, printer).await),
                    None => None,
                };
                (name.clone(), supplies)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await
    }

    async fn poll_printer(&self, name: &str, printer: &PrinterConf) -> Vec<ConsumableRecord> {
        info!(printer = %name, address = %printer.address, "getting toner information");

        let ip = match resolve_ipv4(&printer.address).await {
            Ok(ip) => ip,
            Err(e) => {
                error!(printer = %name, "{e}");
                return vec![ConsumableRecord::error(e.to_string())];
            }
        };

        let walker = self.walker.clone();
        let walked = tokio::task::spawn_blocking(move || walker.walk(ip, &PRT_MARKER_SUPPLIES_ENTRY))
            .await
            .unwrap_or_else(|e| Err(ProtocolError::transport(format!("walk task failed: {e}"))));

        match walked {
            Ok(bindings) => {
                let records = supplies::assemble(&bindings);
                if let [record] = records.as_slice() {
                    if let Some(reason) = record.error_description.as_deref().filter(|_| record.is_error) {
                        warn!(printer = %name, address = %printer.address, "{reason}");
                    }
                }
                records
            }
            Err(e) => {
                error!(printer = %name, address = %printer.address, "{e}");
                vec![ConsumableRecord::error(e.to_string())]
            }
        }
    }
}
