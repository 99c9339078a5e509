//! Best-effort webhook notifications about the block state.
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct Message<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` to a webhook. Delivery is spawned and never awaited
/// by the caller; failures are logged and otherwise ignored.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// A notifier that only logs.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn notify(&self, text: impl Into<String>) {
        let text = text.into();

        let Some(url) = self.url.clone() else {
            debug!(%text, "no webhook configured; notification dropped");
            return;
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            let sent = client
                .post(&url)
                .timeout(NOTIFY_TIMEOUT)
                .json(&Message { text: &text })
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match sent {
                Ok(_) => debug!(%text, "notification delivered"),
                Err(error) => warn!(%error, "failed to deliver notification"),
            }
        });
    }
}
