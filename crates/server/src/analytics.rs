//! Optional event sink. Calls are spawned and never block or fail a request.

use std::time::Duration;

use serde_json::{json, Value};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AnalyticsClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl AnalyticsClient {
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Analytics client setup failed, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self { client, base_url }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn track_cad_event(&self, event_type: &str, user_id: Option<&str>, data: Value) {
        self.post(
            "/track/cad-event",
            json!({
                "event_type": event_type,
                "user_id": user_id,
                "data": data,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn store_model(&self, model_id: &str, user_id: Option<&str>, code: &str, prompt: Option<&str>) {
        self.post(
            "/models/store",
            json!({
                "model_id": model_id,
                "user_id": user_id,
                "badcad_code": code,
                "prompt": prompt,
            }),
        );
    }

    pub fn track_download(&self, model_id: &str) {
        self.post(&format!("/models/{}/download", model_id), Value::Null);
    }

    fn post(&self, path: &str, body: Value) {
        let Some(base) = &self.base_url else {
            return;
        };
        let url = format!("{}{}", base, path);
        let client = self.client.clone();
        tokio::spawn(async move {
            let request = if body.is_null() { client.post(&url) } else { client.post(&url).json(&body) };
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => tracing::debug!("Analytics event sent to {}", url),
                Err(e) => tracing::warn!("Analytics call to {} failed: {}", url, e),
            }
        });
    }
}
