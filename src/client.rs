//! Blocking client for the evaluation endpoints.

use once_cell::sync::OnceCell;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use url::Url;

use crate::config::{self, ClientConfig};
use crate::error::{Error, Result};
use crate::types::{
    EvaluateParams, EvaluationInvokeRequest, EvaluationRequest, EvaluationResponse, InvokeParams,
};

pub(crate) const API_KEY_HEADER: &str = "X-Qualifire-API-Key";

const EVALUATE_PATH: &str = "/api/evaluation/evaluate";
const INVOKE_PATH: &str = "/api/evaluation/invoke/";

/// Synchronous client for the Qualifire evaluation API.
///
/// Each call builds its own request object, so a `Client` is safe to share
/// across threads. There is no retry policy: a request is sent exactly once
/// and the configured timeout is the only cancellation mechanism.
#[derive(Debug)]
pub struct Client {
    http: reqwest::blocking::Client,
    base_url: Url,
    api_key: Option<String>,
    // Resolved on first use; a missing key fails the call, not `new`.
    resolved_key: OnceCell<String>,
}

impl Client {
    /// Build a client from the given configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = config::resolve_base_url(config.base_url.as_deref())?;
        let http = reqwest::blocking::ClientBuilder::new()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            resolved_key: OnceCell::new(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.resolved_key
            .get_or_try_init(|| config::resolve_api_key(self.api_key.as_deref()))
            .map(String::as_str)
    }

    /// Run the requested checks against the given input/output pair.
    ///
    /// Validation (subject presence, tool-selection prerequisites,
    /// deprecated-flag folding) happens before anything touches the
    /// network; see [`EvaluationRequest::new`].
    pub fn evaluate(&self, params: EvaluateParams) -> Result<EvaluationResponse> {
        let request = EvaluationRequest::new(params)?;
        self.post_evaluation(EVALUATE_PATH, &request)
    }

    /// Re-run a previously defined evaluation by id.
    pub fn invoke_evaluation(&self, params: InvokeParams) -> Result<EvaluationResponse> {
        let request = EvaluationInvokeRequest::new(params)?;
        self.post_evaluation(INVOKE_PATH, &request)
    }

    fn post_evaluation<T: Serialize>(&self, path: &str, request: &T) -> Result<EvaluationResponse> {
        let api_key = self.api_key()?;
        let url = self.base_url.join(path)?;
        tracing::debug!("posting evaluation request to {url}");

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if status != StatusCode::OK {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(Error::from)
    }
}
