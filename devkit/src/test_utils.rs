/*!
Test harness for full poll cycles.

Sets up a temp dir holding the snapshot file, a config pointing at it, a
scripted walker and a recording sink, then runs real cycles against them.
*/

use anyhow::{Context, Result};
use printer_monitor::{run_cycle, AlertPublisher, CycleReport, MonitorConfig, PersistenceError, Snapshot, SnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::queue_stub::MockAlertSink;
use crate::snmp_stub::ScriptedWalker;

pub struct TestHarness {
    pub config: MonitorConfig,
    pub walker: Arc<ScriptedWalker>,
    pub sink: MockAlertSink,
    _dir: TempDir,
}

impl TestHarness {
    /// `printers_yaml` is the `printers:` block of the config; a queue
    /// section is added so alerts reach [`MockAlertSink`].
    pub fn new(printers_yaml: &str) -> Result<Self> {
        Self::build(printers_yaml, true)
    }

    /// Same, without an `mq` section: alerts are computed but not sent.
    pub fn without_queue(printers_yaml: &str) -> Result<Self> {
        Self::build(printers_yaml, false)
    }

    fn build(printers_yaml: &str, with_queue: bool) -> Result<Self> {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let dir = tempfile::tempdir().context("creating temp dir")?;
        let state = dir.path().join("previousState.json");

        let mut yaml = format!("{}\npersistenceFile: '{}'\n", printers_yaml.trim_end(), state.display());
        if with_queue {
            yaml.push_str("mq:\n  host: localhost\n  queue: RT_Events_q\n");
        }
        std::fs::write(dir.path().join("config.yaml"), &yaml)?;

        let config = MonitorConfig::from_file(&dir.path().join("config.yaml"))
            .with_context(|| format!("harness config rejected:\n{yaml}"))?;

        Ok(Self {
            config,
            walker: Arc::new(ScriptedWalker::new()),
            sink: MockAlertSink::new(),
            _dir: dir,
        })
    }

    pub fn state_path(&self) -> PathBuf {
        self.config.persistence_file.clone()
    }

    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.config.persistence_file)
    }

    /// Snapshot currently on disk, if any.
    pub fn saved_snapshot(&self) -> Result<Option<Snapshot>> {
        Ok(self.store().load()?)
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, PersistenceError> {
        let publisher = match self.config.mq {
            Some(_) => AlertPublisher::new(self.sink.clone()),
            None => AlertPublisher::disabled(),
        };
        run_cycle(&self.config, self.walker.clone(), &self.store(), &publisher).await
    }

    pub fn published(&self) -> Vec<String> {
        self.sink.published()
    }
}
