use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::{ServiceError, ServiceResult};

/// Outbound push notifications. Failures are the caller's to swallow;
/// no order flow depends on a notification landing.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn notify(&self, player_id: &str, title: &str, message: &str) -> ServiceResult<()>;
}

const ONESIGNAL_URL: &str = "https://onesignal.com/api/v1/notifications";

/// OneSignal-backed sender addressing devices by player id.
pub struct OneSignalPush {
    client: reqwest::Client,
    app_id: String,
    secret_key: String,
}

impl OneSignalPush {
    pub fn new(app_id: String, secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            app_id,
            secret_key,
        }
    }
}

#[async_trait]
impl PushSender for OneSignalPush {
    async fn notify(&self, player_id: &str, title: &str, message: &str) -> ServiceResult<()> {
        let payload = json!({
            "app_id": self.app_id,
            "headings": { "en": title },
            "contents": { "en": message },
            "include_player_ids": [player_id],
        });
        let response = self
            .client
            .post(ONESIGNAL_URL)
            .header("Authorization", format!("Basic {}", self.secret_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "push delivery rejected");
            return Err(ServiceError::ExternalServiceError(format!(
                "push gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Used when no push credentials are configured; logs and drops.
pub struct NoopPush;

#[async_trait]
impl PushSender for NoopPush {
    async fn notify(&self, player_id: &str, title: &str, _message: &str) -> ServiceResult<()> {
        debug!(player_id, title, "push disabled, dropping notification");
        Ok(())
    }
}
