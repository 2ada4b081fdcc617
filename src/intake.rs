//! Best-effort reporting of intercepted calls to the intake endpoint.
//!
//! Every failure on this path is swallowed and logged at debug level: the
//! call being observed must succeed regardless of reporting health.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::Result;

const INTAKE_PATH: &str = "/api/intake";
// The intake endpoint predates the canonical API key header.
const LEGACY_KEY_HEADER: &str = "x-qualifire-key";
const SDK_VERSION_HEADER: &str = "x-qualifire-sdk-version";

#[derive(Debug, Deserialize)]
struct IntakeAck {
    id: Option<String>,
}

fn intake_headers(api_key: &str, version: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static(LEGACY_KEY_HEADER),
        HeaderValue::from_str(api_key)?,
    );
    headers.insert(
        HeaderName::from_static(SDK_VERSION_HEADER),
        HeaderValue::from_str(version)?,
    );
    Ok(headers)
}

fn request_payload(caller: &str, body: &Value) -> Value {
    json!({
        "caller": caller,
        "body": body,
    })
}

fn response_payload(id: &str, model: Option<&str>, body: &Value) -> Value {
    json!({
        "createdCallId": id,
        "model": model,
        "body": body,
    })
}

/// Blocking intake reporter, used on the synchronous interception path.
#[derive(Debug, Clone)]
pub struct IntakeLogger {
    http: reqwest::blocking::Client,
    url: Url,
    headers: HeaderMap,
}

impl IntakeLogger {
    pub fn new(base_url: &Url, api_key: &str, version: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::blocking::ClientBuilder::new()
                .timeout(timeout)
                .build()?,
            url: base_url.join(INTAKE_PATH)?,
            headers: intake_headers(api_key, version)?,
        })
    }

    /// Report a call about to happen. Returns the correlation id the
    /// endpoint assigned, or `None` on any failure.
    pub fn log_request(&self, caller: &str, body: &Value) -> Option<String> {
        match self.try_log_request(caller, body) {
            Ok(id) => id,
            Err(err) => {
                tracing::debug!("qualifire error while logging request: {err}");
                None
            }
        }
    }

    fn try_log_request(&self, caller: &str, body: &Value) -> Result<Option<String>> {
        let response = self
            .http
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(&request_payload(caller, body))
            .send()?
            .error_for_status()?;
        let ack: IntakeAck = response.json()?;
        Ok(ack.id)
    }

    /// Report the response of a previously logged call.
    pub fn log_response(&self, id: &str, model: Option<&str>, body: &Value) {
        if let Err(err) = self.try_log_response(id, model, body) {
            tracing::debug!("qualifire error while logging response: {err}");
        }
    }

    fn try_log_response(&self, id: &str, model: Option<&str>, body: &Value) -> Result<()> {
        self.http
            .patch(self.url.clone())
            .headers(self.headers.clone())
            .json(&response_payload(id, model, body))
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

/// Async intake reporter, used on the suspending interception path.
/// Shapes its payloads identically to [`IntakeLogger`].
#[derive(Debug, Clone)]
pub struct AsyncIntakeLogger {
    http: reqwest::Client,
    url: Url,
    headers: HeaderMap,
}

impl AsyncIntakeLogger {
    pub fn new(base_url: &Url, api_key: &str, version: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::ClientBuilder::new()
                .timeout(timeout)
                .build()?,
            url: base_url.join(INTAKE_PATH)?,
            headers: intake_headers(api_key, version)?,
        })
    }

    pub async fn log_request(&self, caller: &str, body: &Value) -> Option<String> {
        match self.try_log_request(caller, body).await {
            Ok(id) => id,
            Err(err) => {
                tracing::debug!("qualifire error while logging request: {err}");
                None
            }
        }
    }

    async fn try_log_request(&self, caller: &str, body: &Value) -> Result<Option<String>> {
        let response = self
            .http
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(&request_payload(caller, body))
            .send()
            .await?
            .error_for_status()?;
        let ack: IntakeAck = response.json().await?;
        Ok(ack.id)
    }

    pub async fn log_response(&self, id: &str, model: Option<&str>, body: &Value) {
        if let Err(err) = self.try_log_response(id, model, body).await {
            tracing::debug!("qualifire error while logging response: {err}");
        }
    }

    async fn try_log_response(&self, id: &str, model: Option<&str>, body: &Value) -> Result<()> {
        self.http
            .patch(self.url.clone())
            .headers(self.headers.clone())
            .json(&response_payload(id, model, body))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
