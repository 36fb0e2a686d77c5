//! Alert delivery to the downstream queue.
//!
//! Alerts are plain UTF-8 bodies, `"{printer}: {message}"`, published with
//! QoS 1 on the topic named by `mq.queue`. A ticketing bridge consumes them
//! on the other side.
//!
//! MQTT has no queue to declare. The broker holds alerts only for
//! subscribers of that topic: the bridge subscribes with QoS 1 and a
//! persistent session (`clean_session = false`), so alerts published while
//! it is offline are queued for it. With no such subscriber the broker
//! drops them. On our side an alert counts as delivered once the broker has
//! sent its PUBACK.
//!
//! Without an `mq` section the publisher is disabled: alerts are still
//! computed and logged, nothing is sent.

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Outgoing, QoS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MqConf;
use crate::models::AlertEvent;

/// Consecutive event loop errors after which the broker is given up on.
const MAX_CONNECTION_ERRORS: u32 = 3;
/// Bound on the wait for outstanding acknowledgements at shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("alert rejected: {0}")]
    Rejected(String),
}

/// Where alert bodies end up.
#[allow(async_fn_in_trait)]
pub trait AlertSink {
    async fn send(&self, body: &str) -> Result<(), PublishError>;
}

/// Publishes on an MQTT broker; the event loop runs on a background task.
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
    sent: AtomicUsize,
    acked: Arc<AtomicUsize>,
    event_loop: JoinHandle<()>,
}

impl MqttSink {
    pub fn connect(conf: &MqConf) -> Self {
        let client_id = conf
            .client_id
            .clone()
            .unwrap_or_else(|| format!("printer-monitor-{}", uuid::Uuid::new_v4()));

        let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(30));
        opts.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        let acked = Arc::new(AtomicUsize::new(0));
        let acked_in_loop = acked.clone();
        let broker = format!("{}:{}", conf.host, conf.port);

        let event_loop = tokio::spawn(async move {
            let mut errors = 0;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        errors = 0;
                        debug!(%broker, "connected to broker");
                    }
                    Ok(Event::Incoming(Incoming::PubAck(ack))) => {
                        acked_in_loop.fetch_add(1, Ordering::Relaxed);
                        debug!(pkid = ack.pkid, "alert acknowledged");
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        errors += 1;
                        error!(%broker, "MQTT connection error: {e}");
                        if errors >= MAX_CONNECTION_ERRORS {
                            warn!(%broker, "giving up on broker, pending alerts are lost");
                            break;
                        }
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Self {
            client,
            topic: conf.queue.clone(),
            sent: AtomicUsize::new(0),
            acked,
            event_loop,
        }
    }

    /// Waits (bounded) for every sent alert to be acknowledged, then
    /// disconnects. Returns how many alerts the broker never acknowledged.
    pub async fn close(self) -> usize {
        let sent = self.sent.load(Ordering::Relaxed);
        let flushed = tokio::time::timeout(FLUSH_TIMEOUT, async {
            while self.acked.load(Ordering::Relaxed) < sent && !self.event_loop.is_finished() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        let unacked = sent.saturating_sub(self.acked.load(Ordering::Relaxed));
        if flushed.is_err() || unacked > 0 {
            warn!(sent, unacked, "alerts not acknowledged by the broker, they may be lost");
        }

        if let Err(e) = self.client.disconnect().await {
            debug!("disconnect: {e}");
        }
        if tokio::time::timeout(FLUSH_TIMEOUT, self.event_loop).await.is_err() {
            warn!("MQTT event loop did not stop in time");
        }
        unacked
    }
}

impl AlertSink for MqttSink {
    async fn send(&self, body: &str) -> Result<(), PublishError> {
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, body.as_bytes().to_vec())
            .await?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Outcome of publishing one cycle's alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Formats alerts and hands them to the sink, if delivery is enabled.
pub struct AlertPublisher<S> {
    sink: Option<S>,
}

impl<S: AlertSink> AlertPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn into_sink(self) -> Option<S> {
        self.sink
    }

    /// `Ok(false)` when delivery is disabled.
    pub async fn publish(&self, event: &AlertEvent) -> Result<bool, PublishError> {
        let Some(sink) = &self.sink else {
            return Ok(false);
        };
        sink.send(&event.queue_body()).await?;
        Ok(true)
    }

    /// Publishes every alert; a failure is logged and does not stop the rest.
    pub async fn publish_all(&self, events: &[AlertEvent]) -> PublishReport {
        let mut report = PublishReport::default();
        for event in events {
            match self.publish(event).await {
                Ok(true) => {
                    info!(printer = %event.printer_name, "alert sent: {}", event.message);
                    report.sent += 1;
                }
                Ok(false) => {
                    info!(printer = %event.printer_name, "alert not sent, no queue configured: {}", event.message);
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(printer = %event.printer_name, "failed to publish alert '{}': {e}", event.message);
                    report.failed += 1;
                }
            }
        }
        report
    }
}
