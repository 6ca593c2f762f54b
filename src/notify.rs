//! Digest delivery through the ServerChan webhook.
//!
//! Delivery is fire-and-forget: one POST, no retry, and the response only
//! ends up in the log. A missing send key turns delivery into a logged no-op.

use crate::config::NotifySettings;
use crate::models::{Digest, DigestRequest};
use crate::utils::truncate_for_log;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What happened to the delivery attempt. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// No send key configured.
    Skipped,
    /// The endpoint answered with this status.
    Sent(StatusCode),
    /// The request never got a response.
    Failed(String),
}

/// Body of a ServerChan reply. `code == 0` means accepted.
#[derive(Debug, Deserialize)]
struct ServerChanReply {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    endpoint: String,
    title_prefix: String,
    send_key: Option<String>,
}

impl Notifier {
    pub fn new(settings: &NotifySettings, send_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            title_prefix: settings.title_prefix.clone(),
            send_key,
        })
    }

    /// Title line: prefix, date and topic of the day.
    pub fn title(&self, request: &DigestRequest) -> String {
        format!(
            "{} {} · {}",
            self.title_prefix,
            request.date.format("%Y-%m-%d"),
            request.topic_of_day
        )
    }

    /// Push `digest` to the webhook.
    #[instrument(level = "info", skip_all, fields(date = %request.date))]
    pub async fn notify(&self, digest: &Digest, request: &DigestRequest) -> Delivery {
        let Some(key) = &self.send_key else {
            info!("No ServerChan send key configured; skipping delivery");
            return Delivery::Skipped;
        };

        let url = format!("{}/{}.send", self.endpoint, key);
        let title = self.title(request);
        let form = [("title", title.as_str()), ("desp", digest.body.as_str())];
        match self.client.post(&url).form(&form).send().await {
            Ok(response) => {
                let status = response.status();
                let raw = response.text().await.unwrap_or_default();
                match serde_json::from_str::<ServerChanReply>(&raw) {
                    Ok(reply) if reply.code == 0 => {
                        info!(%status, generated = digest.generated, "Digest delivered to webhook")
                    }
                    Ok(reply) => warn!(
                        %status,
                        code = reply.code,
                        message = %reply.message,
                        "Webhook answered with a non-zero code"
                    ),
                    Err(_) => debug!(%status, body = %truncate_for_log(&raw, 200), "Webhook reply was not JSON"),
                }
                Delivery::Sent(status)
            }
            Err(e) => {
                // The send key is part of the URL path.
                let e = e.without_url();
                warn!(error = %e, "Webhook delivery failed; not retrying");
                Delivery::Failed(e.to_string())
            }
        }
    }
}
