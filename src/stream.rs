//! Accumulation of incremental completion chunks into one logical
//! response, while passing every chunk through to the caller unchanged.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::intake::{AsyncIntakeLogger, IntakeLogger};

/// Partial content carried by one chunk for one choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice entry inside a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: usize,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One incremental unit of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// The reconstructed logical response. Only ever reported to the intake
/// endpoint, never returned to the caller of the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccumulatedResponse {
    pub model: String,
    pub choices: Vec<AccumulatedChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccumulatedChoice {
    pub index: usize,
    pub message: AccumulatedMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccumulatedMessage {
    pub role: String,
    pub content: String,
}

/// Folds a sequence of chunks into an [`AccumulatedResponse`].
///
/// Choice indices may arrive sparse or out of order; the choice list is
/// grown with empty placeholders up to the highest index seen. Upstream
/// is assumed to eventually fill indices contiguously from zero, but
/// nothing here depends on it.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    response: AccumulatedResponse,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunk. The chunk itself is left untouched so the caller
    /// can forward it as-is.
    pub fn observe(&mut self, chunk: &ChatCompletionChunk) {
        if !chunk.model.is_empty() {
            // Constant across a stream; last write wins.
            self.response.model = chunk.model.clone();
        }

        for choice in &chunk.choices {
            while self.response.choices.len() <= choice.index {
                let index = self.response.choices.len();
                self.response.choices.push(AccumulatedChoice {
                    index,
                    ..Default::default()
                });
            }

            let slot = &mut self.response.choices[choice.index];
            if let Some(role) = &choice.delta.role {
                slot.message.role = role.clone();
            }
            if let Some(content) = &choice.delta.content {
                slot.message.content.push_str(content);
            }
            if let Some(reason) = &choice.finish_reason {
                slot.finish_reason = Some(reason.clone());
            }
        }
    }

    pub fn response(&self) -> &AccumulatedResponse {
        &self.response
    }

    pub fn into_response(self) -> AccumulatedResponse {
        self.response
    }
}

fn model_of(response: &AccumulatedResponse) -> Option<&str> {
    if response.model.is_empty() {
        None
    } else {
        Some(&response.model)
    }
}

/// Pass-through iterator over completion chunks.
///
/// Yields every chunk unchanged and in arrival order; when the underlying
/// iterator is exhausted the accumulated response is reported once via the
/// intake endpoint. Reporting failures never reach the caller.
pub struct ObservedChunks<I> {
    inner: I,
    accumulator: StreamAccumulator,
    logger: IntakeLogger,
    correlation_id: Option<String>,
    reported: bool,
}

impl<I> ObservedChunks<I> {
    pub(crate) fn new(inner: I, logger: IntakeLogger, correlation_id: Option<String>) -> Self {
        Self {
            inner,
            accumulator: StreamAccumulator::new(),
            logger,
            correlation_id,
            reported: false,
        }
    }

    fn report(&mut self) {
        if self.reported {
            return;
        }
        self.reported = true;

        let Some(id) = self.correlation_id.take() else {
            return;
        };
        let response = self.accumulator.response();
        match serde_json::to_value(response) {
            Ok(body) => self.logger.log_response(&id, model_of(response), &body),
            Err(err) => tracing::debug!("qualifire error while encoding stream response: {err}"),
        }
    }
}

impl<I> Iterator for ObservedChunks<I>
where
    I: Iterator<Item = ChatCompletionChunk>,
{
    type Item = ChatCompletionChunk;

    fn next(&mut self) -> Option<ChatCompletionChunk> {
        match self.inner.next() {
            Some(chunk) => {
                self.accumulator.observe(&chunk);
                Some(chunk)
            }
            None => {
                self.report();
                None
            }
        }
    }
}

/// Async counterpart of [`ObservedChunks`]. Suspension only ever happens
/// while waiting for the next chunk; end-of-stream reporting is spawned
/// onto the runtime so the consumer is never blocked on it.
pub struct ObservedChunkStream<S> {
    inner: S,
    accumulator: StreamAccumulator,
    logger: AsyncIntakeLogger,
    correlation_id: Option<String>,
    reported: bool,
}

impl<S> ObservedChunkStream<S> {
    pub(crate) fn new(inner: S, logger: AsyncIntakeLogger, correlation_id: Option<String>) -> Self {
        Self {
            inner,
            accumulator: StreamAccumulator::new(),
            logger,
            correlation_id,
            reported: false,
        }
    }

    fn report(&mut self) {
        if self.reported {
            return;
        }
        self.reported = true;

        let Some(id) = self.correlation_id.take() else {
            return;
        };
        // Reporting must never reach the consumer, panics included: a
        // stream drained outside a runtime skips the report instead.
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::debug!("qualifire cannot report stream response: {err}");
                return;
            }
        };

        let response = self.accumulator.response().clone();
        let logger = self.logger.clone();
        handle.spawn(async move {
            match serde_json::to_value(&response) {
                Ok(body) => logger.log_response(&id, model_of(&response), &body).await,
                Err(err) => {
                    tracing::debug!("qualifire error while encoding stream response: {err}")
                }
            }
        });
    }
}

impl<S> Stream for ObservedChunkStream<S>
where
    S: Stream<Item = ChatCompletionChunk> + Unpin,
{
    type Item = ChatCompletionChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(chunk)) => {
                this.accumulator.observe(&chunk);
                Poll::Ready(Some(chunk))
            }
            Poll::Ready(None) => {
                this.report();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use httpmock::prelude::*;
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::config::DEFAULT_TIMEOUT;

    fn fixture_chunks() -> Vec<ChatCompletionChunk> {
        vec![
            ChatCompletionChunk {
                model: "m".to_owned(),
                choices: vec![ChunkChoice {
                    index: 0,
                    delta: ChunkDelta {
                        role: Some("assistant".to_owned()),
                        content: None,
                    },
                    finish_reason: None,
                }],
            },
            ChatCompletionChunk {
                model: "m".to_owned(),
                choices: vec![ChunkChoice {
                    index: 0,
                    delta: ChunkDelta {
                        role: None,
                        content: Some("hel".to_owned()),
                    },
                    finish_reason: None,
                }],
            },
            ChatCompletionChunk {
                model: "m".to_owned(),
                choices: vec![ChunkChoice {
                    index: 0,
                    delta: ChunkDelta {
                        role: None,
                        content: Some("lo".to_owned()),
                    },
                    finish_reason: Some("stop".to_owned()),
                }],
            },
        ]
    }

    fn logger_for(server: &MockServer) -> IntakeLogger {
        let base = Url::parse(&server.base_url()).expect("mock url");
        IntakeLogger::new(&base, "sk-test", "0.1.0", DEFAULT_TIMEOUT).expect("logger builds")
    }

    #[test]
    fn accumulates_role_content_and_finish_reason() {
        let mut accumulator = StreamAccumulator::new();
        for chunk in fixture_chunks() {
            accumulator.observe(&chunk);
        }

        let response = accumulator.into_response();
        assert_eq!(
            response,
            AccumulatedResponse {
                model: "m".to_owned(),
                choices: vec![AccumulatedChoice {
                    index: 0,
                    message: AccumulatedMessage {
                        role: "assistant".to_owned(),
                        content: "hello".to_owned(),
                    },
                    finish_reason: Some("stop".to_owned()),
                }],
            }
        );
    }

    #[test]
    fn grows_placeholders_for_sparse_indices() {
        let mut accumulator = StreamAccumulator::new();
        accumulator.observe(&ChatCompletionChunk {
            model: "m".to_owned(),
            choices: vec![ChunkChoice {
                index: 2,
                delta: ChunkDelta {
                    role: None,
                    content: Some("third".to_owned()),
                },
                finish_reason: None,
            }],
        });
        accumulator.observe(&ChatCompletionChunk {
            model: String::new(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some("first".to_owned()),
                },
                finish_reason: None,
            }],
        });

        let response = accumulator.into_response();
        assert_eq!(response.model, "m");
        assert_eq!(response.choices.len(), 3);
        assert_eq!(response.choices[0].message.content, "first");
        assert_eq!(response.choices[1].message.content, "");
        assert_eq!(response.choices[1].index, 1);
        assert_eq!(response.choices[2].message.content, "third");
    }

    #[test]
    fn observed_chunks_pass_through_unmodified_and_report_once() {
        let server = MockServer::start();
        let patch = server.mock(|when, then| {
            when.method(httpmock::Method::PATCH)
                .path("/api/intake")
                .json_body_partial(
                    json!({
                        "createdCallId": "corr-1",
                        "model": "m",
                        "body": {
                            "model": "m",
                            "choices": [{
                                "index": 0,
                                "message": {"role": "assistant", "content": "hello"},
                                "finish_reason": "stop"
                            }]
                        }
                    })
                    .to_string(),
                );
            then.status(200);
        });

        let chunks = fixture_chunks();
        let mut observed = ObservedChunks::new(
            chunks.clone().into_iter(),
            logger_for(&server),
            Some("corr-1".to_owned()),
        );

        let forwarded: Vec<ChatCompletionChunk> = observed.by_ref().collect();
        assert_eq!(forwarded, chunks);

        // Draining again must not report a second time.
        assert!(observed.next().is_none());
        patch.assert_hits(1);
    }

    #[test]
    fn reporting_failure_does_not_reach_the_stream_consumer() {
        // Nothing listens on this address; the PATCH fails immediately.
        let base = Url::parse("http://127.0.0.1:9/").expect("url");
        let logger =
            IntakeLogger::new(&base, "sk-test", "0.1.0", DEFAULT_TIMEOUT).expect("logger builds");

        let chunks = fixture_chunks();
        let observed =
            ObservedChunks::new(chunks.clone().into_iter(), logger, Some("corr-1".to_owned()));
        let forwarded: Vec<ChatCompletionChunk> = observed.collect();
        assert_eq!(forwarded, chunks);
    }

    #[test]
    fn skips_reporting_without_correlation_id() {
        let server = MockServer::start();
        let patch = server.mock(|when, then| {
            when.method(httpmock::Method::PATCH).path("/api/intake");
            then.status(200);
        });

        let observed =
            ObservedChunks::new(fixture_chunks().into_iter(), logger_for(&server), None);
        let forwarded: Vec<ChatCompletionChunk> = observed.collect();
        assert_eq!(forwarded.len(), 3);
        patch.assert_hits(0);
    }

    #[test]
    fn stream_end_outside_a_runtime_skips_reporting_without_panicking() {
        use std::task::{RawWaker, RawWakerVTable, Waker};

        fn noop_raw_waker() -> RawWaker {
            fn clone(_: *const ()) -> RawWaker {
                noop_raw_waker()
            }
            fn noop(_: *const ()) {}
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }

        let base = Url::parse("http://127.0.0.1:9/").expect("url");
        let logger = AsyncIntakeLogger::new(&base, "sk-test", "0.1.0", DEFAULT_TIMEOUT)
            .expect("logger builds");

        let chunks = fixture_chunks();
        let mut observed = ObservedChunkStream::new(
            tokio_stream::iter(chunks.clone()),
            logger,
            Some("corr-3".to_owned()),
        );

        // No tokio runtime anywhere on this thread: drain by hand.
        let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        let mut forwarded = Vec::new();
        loop {
            match Pin::new(&mut observed).poll_next(&mut cx) {
                Poll::Ready(Some(chunk)) => forwarded.push(chunk),
                Poll::Ready(None) => break,
                Poll::Pending => unreachable!("iterator-backed stream never pends"),
            }
        }
        assert_eq!(forwarded, chunks);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn observed_stream_passes_through_and_reports() {
        let server = MockServer::start_async().await;
        let patch = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::PATCH)
                    .path("/api/intake")
                    .json_body_partial(json!({"createdCallId": "corr-2"}).to_string());
                then.status(200);
            })
            .await;

        let base = Url::parse(&server.base_url()).expect("mock url");
        let logger = AsyncIntakeLogger::new(&base, "sk-test", "0.1.0", DEFAULT_TIMEOUT)
            .expect("logger builds");

        let chunks = fixture_chunks();
        let observed = ObservedChunkStream::new(
            tokio_stream::iter(chunks.clone()),
            logger,
            Some("corr-2".to_owned()),
        );
        let forwarded: Vec<ChatCompletionChunk> = observed.collect().await;
        assert_eq!(forwarded, chunks);

        // End-of-stream reporting is fire-and-forget; give it a moment.
        for _ in 0..50 {
            if patch.hits_async().await > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        patch.assert_async().await;
    }
}
