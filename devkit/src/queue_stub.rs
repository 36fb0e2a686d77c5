/*!
Mock alert sink for running cycles without a broker.

Records every body handed to it. Failures can be injected to check that one
rejected alert does not stop the others.
*/

use printer_monitor::{AlertSink, PublishError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Cheap to clone; clones share the recorded messages.
#[derive(Clone, Default)]
pub struct MockAlertSink {
    published: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<VecDeque<bool>>>,
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `send` calls succeed or fail following `plan`, in order;
    /// once the plan is used up every send succeeds.
    pub fn fail_pattern(&self, plan: impl IntoIterator<Item = bool>) {
        self.failures.lock().unwrap().extend(plan.into_iter().map(|ok| !ok));
    }

    /// Fails only the next `send`.
    pub fn fail_next(&self) {
        self.failures.lock().unwrap().push_back(true);
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

impl AlertSink for MockAlertSink {
    async fn send(&self, body: &str) -> Result<(), PublishError> {
        let fail = self.failures.lock().unwrap().pop_front().unwrap_or(false);
        if fail {
            tracing::info!("[MOCK] rejected: {body}");
            return Err(PublishError::Rejected(body.to_string()));
        }
        tracing::info!("[MOCK] published: {body}");
        self.published.lock().unwrap().push(body.to_string());
        Ok(())
    }
}
