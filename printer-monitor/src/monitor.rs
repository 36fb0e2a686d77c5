use std::sync::Arc;
use tracing::{debug, info};

use crate::alerts::evaluate;
use crate::config::MonitorConfig;
use crate::models::{AlertEvent, Snapshot};
use crate::mq::{AlertPublisher, AlertSink, PublishReport};
use crate::poller::Poller;
use crate::snmp::SnmpWalk;
use crate::store::{PersistenceError, SnapshotStore};

/// What one poll cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: Snapshot,
    pub alerts: Vec<AlertEvent>,
    pub publish: PublishReport,
    pub printers_in_error: usize,
}

/// One full poll: load the previous snapshot, poll every printer, publish
/// first-time crossings, persist the new snapshot.
///
/// Only persistence failures abort the cycle; printer and queue problems are
/// logged and reported.
pub async fn run_cycle<S: AlertSink>(
    config: &MonitorConfig,
    walker: Arc<dyn SnmpWalk>,
    store: &SnapshotStore,
    publisher: &AlertPublisher<S>,
) -> Result<CycleReport, PersistenceError> {
    let _lock = store.lock()?;

    let previous = store.load()?;
    if previous.is_none() {
        info!(path = %store.path().display(), "no previous state, every reading counts as a first crossing");
    }

    let current = Poller::new(walker, config.poll_workers).poll_all(config).await;
    let printers_in_error = current
        .iter()
        .filter(|(_, supplies)| supplies.is_some_and(|s| s.iter().any(|r| r.is_error)))
        .count();

    let alerts = evaluate(&current, previous.as_ref(), config);
    debug!(alerts = alerts.len(), printers_in_error, "evaluation done");

    let publish = publisher.publish_all(&alerts).await;

    store.save(&current)?;

    info!(
        printers = current.len(),
        printers_in_error,
        alerts = alerts.len(),
        sent = publish.sent,
        failed = publish.failed,
        "poll cycle finished"
    );

    Ok(CycleReport {
        snapshot: current,
        alerts,
        publish,
        printers_in_error,
    })
}
