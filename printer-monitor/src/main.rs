/**
 * PRINTER MONITOR - one poll cycle per invocation
 *
 * ROLE : load the YAML config, poll printers over SNMP, publish first-time
 * threshold crossings on the queue, persist the snapshot for the next run.
 *
 * Meant to be scheduled (cron, systemd timer). Exit status is non-zero only
 * when the config or the snapshot file cannot be used.
 */

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

use printer_monitor::logging::{self, parse_log_level};
use printer_monitor::{run_cycle, AlertPublisher, MonitorConfig, MqttSink, SnapshotStore, SnmpWalker};

#[derive(Parser, Debug)]
#[command(name = "printer-monitor", version, about = "Printer toner level monitor")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long, alias = "logFile")]
    log_file: Option<PathBuf>,

    /// DEBUG, INFO, WARNING, ERROR or CRITICAL
    #[arg(long, alias = "logLevel", default_value = "WARNING", value_parser = parse_log_level)]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(cli.log_level, cli.log_file.as_deref()).with_context(|| {
        format!(
            "cannot open log file {}",
            cli.log_file.as_deref().unwrap_or(std::path::Path::new("-")).display()
        )
    })?;

    let config = MonitorConfig::from_file(&cli.config)
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;
    info!(printers = config.printers.len(), "configuration loaded");

    let store = SnapshotStore::new(&config.persistence_file);
    let walker = Arc::new(SnmpWalker::new(&config.snmp));

    let publisher = match &config.mq {
        Some(mq) => AlertPublisher::new(MqttSink::connect(mq)),
        None => {
            warn!("no mq section, alerts will only be logged");
            AlertPublisher::disabled()
        }
    };

    let cycle = run_cycle(&config, walker, &store, &publisher).await;

    let unacked = match publisher.into_sink() {
        Some(sink) => sink.close().await,
        None => 0,
    };

    let report = cycle.with_context(|| format!("snapshot file {}", store.path().display()))?;
    info!(
        alerts = report.alerts.len(),
        printers_in_error = report.printers_in_error,
        unacked,
        "done"
    );
    Ok(())
}
