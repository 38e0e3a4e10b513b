//! Healthcheck pinger
//!
//! After a successful vote broadcast the engine pings each configured URL.
//! Failures are logged and never fail the tick; non-2xx responses are not
//! retried within the same tick.

use std::time::Duration;

use crate::config::HealthcheckConfig;

#[derive(Clone)]
pub struct HealthPinger {
    client: reqwest::Client,
    targets: Vec<(String, Duration)>,
}

impl HealthPinger {
    pub fn new(healthchecks: &[HealthcheckConfig]) -> Self {
        let targets = healthchecks
            .iter()
            .map(|h| (h.url.clone(), Duration::from_millis(h.timeout_ms)))
            .collect();

        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }

    /// GET every target once, each bounded by its own timeout
    pub async fn ping_all(&self) {
        for (url, timeout) in &self.targets {
            tracing::debug!(url = %url, "pinging healthcheck");

            // the response is only touched when the request succeeded
            match self.client.get(url).timeout(*timeout).send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        tracing::warn!(
                            url = %url,
                            status = %response.status(),
                            "healthcheck ping returned non-success status"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "healthcheck ping failed");
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
