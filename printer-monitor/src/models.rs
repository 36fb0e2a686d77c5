use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One toner cartridge or maintenance kit as reported by a printer.
///
/// Capacity and remaining are kept exactly as the printer reports them,
/// including the negative sentinel levels some devices use (-1 other,
/// -2 unknown, -3 "some remaining").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableRecord {
    pub description: String,
    pub capacity: i64,
    pub remaining: i64,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ConsumableRecord {
    pub fn new(description: impl Into<String>, capacity: i64, remaining: i64) -> Self {
        Self {
            description: description.into(),
            capacity,
            remaining,
            is_error: false,
            error_description: None,
        }
    }

    /// Placeholder record standing for a printer that could not be read.
    pub fn error(error_description: impl Into<String>) -> Self {
        Self {
            description: String::new(),
            capacity: 0,
            remaining: 0,
            is_error: true,
            error_description: Some(error_description.into()),
        }
    }

    /// Percentage left, rounded down.
    ///
    /// `None` for error records, for sentinel (negative) levels and for
    /// levels too large to scale. A zero capacity reads as 0%.
    pub fn percent_remaining(&self) -> Option<i64> {
        if self.is_error || self.capacity < 0 || self.remaining < 0 {
            return None;
        }
        if self.capacity > 0 {
            self.remaining.checked_mul(100).map(|scaled| scaled / self.capacity)
        } else {
            Some(0)
        }
    }
}

/// State of every configured printer at one poll cycle.
///
/// A `None` entry means the printer is configured but not monitored for
/// consumables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    printers: BTreeMap<String, Option<Vec<ConsumableRecord>>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, printer: impl Into<String>, supplies: Option<Vec<ConsumableRecord>>) {
        self.printers.insert(printer.into(), supplies);
    }

    pub fn contains(&self, printer: &str) -> bool {
        self.printers.contains_key(printer)
    }

    /// Supplies of a monitored printer; `None` when the printer is absent or
    /// not monitored.
    pub fn supplies(&self, printer: &str) -> Option<&[ConsumableRecord]> {
        self.printers.get(printer).and_then(|s| s.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&[ConsumableRecord]>)> {
        self.printers
            .iter()
            .map(|(name, supplies)| (name.as_str(), supplies.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.printers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.printers.is_empty()
    }
}

impl FromIterator<(String, Option<Vec<ConsumableRecord>>)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Option<Vec<ConsumableRecord>>)>>(iter: I) -> Self {
        Self {
            printers: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, Option<Vec<ConsumableRecord>>)> for Snapshot {
    fn extend<I: IntoIterator<Item = (String, Option<Vec<ConsumableRecord>>)>>(&mut self, iter: I) {
        self.printers.extend(iter);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Empty,
    NearEmpty,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Empty => f.write_str("TONER EMPTY WARNING"),
            AlertLevel::NearEmpty => f.write_str("TONER NEAR EMPTY WARNING"),
        }
    }
}

/// A first-time threshold crossing, consumed right away by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub printer_name: String,
    pub level: AlertLevel,
    pub description: String,
    pub message: String,
}

impl AlertEvent {
    pub fn new(printer_name: impl Into<String>, level: AlertLevel, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            printer_name: printer_name.into(),
            level,
            message: format!("{level} for {description}"),
            description,
        }
    }

    /// Text body sent to the queue: `"{printer}: {message}"`.
    pub fn queue_body(&self) -> String {
        format!("{}: {}", self.printer_name, self.message)
    }
}
