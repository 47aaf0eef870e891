use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::BackendError;
use crate::models::api::{
    CreateAlertRequest, CreateAlertResponse, CreatedAlert, NotificationAck, ResolveAlertRequest,
    ResolvedAlert,
};

/// The three calls the trigger makes against the Backend Alert Service.
pub trait AlertBackend: Send + Sync {
    fn create_alert(
        &self,
        request: &CreateAlertRequest,
    ) -> impl Future<Output = Result<CreatedAlert, BackendError>> + Send;

    fn trigger_notification(
        &self,
        alert_id: &str,
    ) -> impl Future<Output = Result<NotificationAck, BackendError>> + Send;

    /// `duration_ms` is the locally measured elapsed time; the reply may override it.
    fn resolve_alert(
        &self,
        alert_id: &str,
        duration_ms: u64,
    ) -> impl Future<Output = Result<ResolvedAlert, BackendError>> + Send;
}

/// REST client for the alert endpoints.
///
/// The request timeout bounds every call, so a hung backend can never pin the
/// controller in `Submitting` or `Finalizing`.
pub struct HttpAlertBackend {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpAlertBackend {
    pub fn new(config: &AppConfig) -> Result<Self> {
        if config.alert_api_url.trim().is_empty() {
            bail!("ALERT_API_URL is required to reach the alert service");
        }
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.alert_api_timeout_secs.max(1)))
                .build()?,
            base_url: config.alert_api_url.trim_end_matches('/').to_string(),
            token: config.alert_api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return serde_json::from_str("{}").map_err(|e| BackendError::Decode(e.to_string()));
        }
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

impl AlertBackend for HttpAlertBackend {
    async fn create_alert(&self, request: &CreateAlertRequest) -> Result<CreatedAlert, BackendError> {
        let resp = self
            .authorized(self.http.post(self.url("/alerts")))
            .json(request)
            .send()
            .await?;
        let parsed: CreateAlertResponse = Self::read(resp).await?;
        debug!(alert_id = %parsed.alert_id, created_at = ?parsed.created_at, "POST /alerts ok");
        Ok(parsed.into())
    }

    async fn trigger_notification(&self, alert_id: &str) -> Result<NotificationAck, BackendError> {
        let resp = self
            .authorized(self.http.post(self.url(&format!("/alerts/{alert_id}/notify"))))
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn resolve_alert(&self, alert_id: &str, duration_ms: u64) -> Result<ResolvedAlert, BackendError> {
        let resp = self
            .authorized(self.http.patch(self.url(&format!("/alerts/{alert_id}/resolve"))))
            .json(&ResolveAlertRequest { duration_ms })
            .send()
            .await?;
        Self::read(resp).await
    }
}
