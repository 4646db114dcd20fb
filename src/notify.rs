//! Outbound "send text, report success" capability.
//!
//! The core only uses this to report staleness and failures; how a message
//! reaches a person is up to the implementation.

use std::time::Duration;

use crate::config::NotifyConfig;

pub trait Notifier: Send {
    /// Deliver `text`. Returns false on any failure; never panics or blocks
    /// past its timeout.
    fn send(&self, text: &str) -> bool;
}

/// Posts `{"text": ...}` to a webhook.
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            url: url.to_string(),
            agent: config.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, text: &str) -> bool {
        let body = serde_json::json!({ "text": text }).to_string();
        match self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/json")
            .send(body.as_str())
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "notification failed");
                false
            }
        }
    }
}

/// Writes notifications to the log only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, text: &str) -> bool {
        tracing::info!(target: "missionbox::notify", "{text}");
        true
    }
}

pub fn from_config(config: &NotifyConfig) -> Box<dyn Notifier> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Box::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.timeout.max(1)),
        )),
        _ => Box::new(LogNotifier),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::Notifier;

    /// Records every message, for assertions.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, text: &str) -> bool {
            self.sent.lock().unwrap().push(text.to_string());
            true
        }
    }
}
