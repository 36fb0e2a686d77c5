//! First-time threshold crossing detection.
//!
//! A record raises an alert only when the current reading satisfies a
//! threshold that the previous reading of the same slot did not. The empty
//! threshold is checked first; when it fires the near-empty one is skipped.
//!
//! Slots are matched by position in the printer's supply list, not by
//! description: a printer that reorders its supplies between two polls
//! compares unrelated cartridges.

use tracing::{debug, info};

use crate::config::{MonitorConfig, TonerThresholds};
use crate::models::{AlertEvent, AlertLevel, ConsumableRecord, Snapshot};

pub fn evaluate(current: &Snapshot, previous: Option<&Snapshot>, config: &MonitorConfig) -> Vec<AlertEvent> {
    let mut alerts = Vec::new();

    for (printer, supplies) in current.iter() {
        let Some(thresholds) = config.thresholds(printer) else { continue };
        let Some(supplies) = supplies else { continue };
        let previous_supplies = previous.and_then(|p| p.supplies(printer));

        for (slot, record) in supplies.iter().enumerate() {
            let before = previous_supplies.and_then(|p| p.get(slot));
            if let Some(level) = crossing(record, before, thresholds) {
                info!(printer = %printer, slot, level = %level, description = %record.description,
                      "threshold crossed");
                alerts.push(AlertEvent::new(printer, level, record.description.clone()));
            }
        }
    }

    alerts
}

/// Severity newly reached by `current`, if any.
///
/// Records without a usable percentage (error records, sentinel levels)
/// never alert. A previous record without one counts as no previous reading.
pub fn crossing(
    current: &ConsumableRecord,
    previous: Option<&ConsumableRecord>,
    thresholds: TonerThresholds,
) -> Option<AlertLevel> {
    let Some(pct) = current.percent_remaining() else {
        debug!(description = %current.description, is_error = current.is_error, "level unknown, not evaluated");
        return None;
    };
    let before = previous.and_then(ConsumableRecord::percent_remaining);
    let empty = i64::from(thresholds.empty);
    let low = i64::from(thresholds.low);

    if pct <= empty {
        return before.map_or(true, |b| b > empty).then_some(AlertLevel::Empty);
    }
    if pct <= low {
        return before.map_or(true, |b| b > low).then_some(AlertLevel::NearEmpty);
    }
    None
}
