//! Transparent observation of an external LLM client's calls.
//!
//! The host application owns the wrapped callable; this module only
//! supplies the composition seam. An [`Instrumented`] handle is created
//! once per target instance and invoked in place of the target; it reports
//! the call to the intake endpoint on a best-effort basis and never alters
//! the call's arguments, return value or errors.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::config::{self, ClientConfig};
use crate::error::Result;
use crate::intake::{AsyncIntakeLogger, IntakeLogger};
use crate::stream::{ChatCompletionChunk, ObservedChunkStream, ObservedChunks};

/// Factory for [`Instrumented`] call handles sharing one reporting setup.
#[derive(Debug, Clone)]
pub struct Interceptor {
    logger: IntakeLogger,
    async_logger: AsyncIntakeLogger,
}

impl Interceptor {
    /// Build an interceptor from the given configuration.
    ///
    /// Instrumentation is useless without a key, so unlike
    /// [`crate::Client`] the API key is resolved here rather than on
    /// first call.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = config::resolve_base_url(config.base_url.as_deref())?;
        let api_key = config::resolve_api_key(config.api_key.as_deref())?;
        let version = crate::version();
        Ok(Self {
            logger: IntakeLogger::new(&base_url, &api_key, version, config.timeout)?,
            async_logger: AsyncIntakeLogger::new(&base_url, &api_key, version, config.timeout)?,
        })
    }

    /// Create the handle for one distinct target instance. `caller` is the
    /// identity reported with the request, e.g. `"ChatCompletion.create"`.
    pub fn instrument(&self, caller: impl Into<String>) -> Instrumented {
        Instrumented {
            caller: caller.into(),
            logger: self.logger.clone(),
            async_logger: self.async_logger.clone(),
            marker: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Wrapper around one target callable instance.
///
/// Only the first invocation per instance is reported; the atomic marker
/// makes that decision race-free when several threads hit the first call
/// simultaneously, and guards against double instrumentation (a clone of
/// the handle shares the marker).
#[derive(Debug, Clone)]
pub struct Instrumented {
    caller: String,
    logger: IntakeLogger,
    async_logger: AsyncIntakeLogger,
    marker: Arc<AtomicBool>,
}

impl Instrumented {
    // True exactly once per instance.
    fn first_use(&self) -> bool {
        !self.marker.swap(true, Ordering::SeqCst)
    }

    fn report_response<R: Serialize>(&self, correlation_id: Option<String>, response: &R) {
        let Some(id) = correlation_id else {
            return;
        };
        match serde_json::to_value(response) {
            Ok(body) => {
                let model = body.get("model").and_then(Value::as_str);
                self.logger.log_response(&id, model, &body);
            }
            Err(err) => tracing::debug!("qualifire error while encoding response: {err}"),
        }
    }

    async fn report_response_async<R: Serialize>(
        &self,
        correlation_id: Option<String>,
        response: &R,
    ) {
        let Some(id) = correlation_id else {
            return;
        };
        match serde_json::to_value(response) {
            Ok(body) => {
                let model = body.get("model").and_then(Value::as_str);
                self.async_logger.log_response(&id, model, &body).await;
            }
            Err(err) => tracing::debug!("qualifire error while encoding response: {err}"),
        }
    }

    /// Invoke a single-shot target, reporting its request body beforehand
    /// and its response afterwards. Errors from the target propagate
    /// untouched and are never reported.
    pub fn invoke<F, R, E>(&self, body: &Value, call: F) -> std::result::Result<R, E>
    where
        F: FnOnce() -> std::result::Result<R, E>,
        R: Serialize,
    {
        if !self.first_use() {
            return call();
        }

        let correlation_id = self.logger.log_request(&self.caller, body);
        let response = call()?;
        self.report_response(correlation_id, &response);
        Ok(response)
    }

    /// Async variant of [`Instrumented::invoke`]; identical shaping, only
    /// the suspension mechanics differ.
    pub async fn invoke_async<F, Fut, R, E>(
        &self,
        body: &Value,
        call: F,
    ) -> std::result::Result<R, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        R: Serialize,
    {
        if !self.first_use() {
            return call().await;
        }

        let correlation_id = self.async_logger.log_request(&self.caller, body).await;
        let response = call().await?;
        self.report_response_async(correlation_id, &response).await;
        Ok(response)
    }

    /// Invoke a target whose result is an incremental chunk stream. The
    /// caller receives a pass-through iterator; the accumulated response
    /// is reported when it is exhausted.
    pub fn invoke_streaming<F, I, E>(
        &self,
        body: &Value,
        call: F,
    ) -> std::result::Result<ObservedChunks<I>, E>
    where
        F: FnOnce() -> std::result::Result<I, E>,
        I: Iterator<Item = ChatCompletionChunk>,
    {
        if !self.first_use() {
            let chunks = call()?;
            return Ok(ObservedChunks::new(chunks, self.logger.clone(), None));
        }

        let correlation_id = self.logger.log_request(&self.caller, body);
        let chunks = call()?;
        Ok(ObservedChunks::new(
            chunks,
            self.logger.clone(),
            correlation_id,
        ))
    }

    /// Async variant of [`Instrumented::invoke_streaming`].
    pub async fn invoke_streaming_async<F, Fut, S, E>(
        &self,
        body: &Value,
        call: F,
    ) -> std::result::Result<ObservedChunkStream<S>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<S, E>>,
        S: Stream<Item = ChatCompletionChunk> + Unpin,
    {
        if !self.first_use() {
            let chunks = call().await?;
            return Ok(ObservedChunkStream::new(
                chunks,
                self.async_logger.clone(),
                None,
            ));
        }

        let correlation_id = self.async_logger.log_request(&self.caller, body).await;
        let chunks = call().await?;
        Ok(ObservedChunkStream::new(
            chunks,
            self.async_logger.clone(),
            correlation_id,
        ))
    }
}
