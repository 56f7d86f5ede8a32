//! Request dispatch: model resolution, provider request shaping, one HTTP
//! call, and normalization of whatever came back.

use crate::config::Credentials;
use crate::core::error::PromptgenError;
use crate::core::types::{FewShotExample, GenerationRequest, GenerationResponse, TokenUsage};
use crate::prompt;
use crate::providers::sse::SseDecoder;
use crate::providers::{AdapterSet, ProviderAdapter, ProviderHttpSpec, Transport, error_message};
use crate::registry::{ModelDescriptor, ModelRegistry};
use chrono::Utc;
use futures::StreamExt;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Receives the output of [`Dispatcher::stream_response`].
///
/// Either `on_complete` or `on_error` fires at most once, and nothing fires
/// after either of them or after cancellation.
pub trait StreamHandler: Send {
    fn on_chunk(&mut self, chunk: &str);
    fn on_complete(&mut self, response: GenerationResponse);
    fn on_error(&mut self, error: PromptgenError);
}

/// Closure-based [`StreamHandler`].
pub struct StreamCallbacks<C, D, E> {
    pub on_chunk: C,
    pub on_complete: D,
    pub on_error: E,
}

impl<C, D, E> StreamHandler for StreamCallbacks<C, D, E>
where
    C: FnMut(&str) + Send,
    D: FnMut(GenerationResponse) + Send,
    E: FnMut(PromptgenError) + Send,
{
    fn on_chunk(&mut self, chunk: &str) {
        (self.on_chunk)(chunk)
    }

    fn on_complete(&mut self, response: GenerationResponse) {
        (self.on_complete)(response)
    }

    fn on_error(&mut self, error: PromptgenError) {
        (self.on_error)(error)
    }
}

/// Per-model outcome of [`Dispatcher::compare_models`].
#[derive(Debug)]
pub struct ComparisonResult {
    pub model: String,
    pub result: Result<GenerationResponse, PromptgenError>,
}

/// Stateless apart from its configuration, so one instance is shared by
/// every session. It does not serialize requests; callers that need
/// at-most-one in flight enforce it themselves.
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    adapters: AdapterSet,
    transport: Arc<dyn Transport>,
    credentials: Credentials,
}

struct Prepared<'a> {
    model: &'a ModelDescriptor,
    adapter: &'a dyn ProviderAdapter,
    spec: ProviderHttpSpec,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        transport: Arc<dyn Transport>,
        credentials: Credentials,
    ) -> Self {
        Self {
            registry,
            adapters: AdapterSet::new(),
            transport,
            credentials,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn prepare(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<Prepared<'_>, PromptgenError> {
        let model = self.registry.get_model_or_err(&request.model)?;
        let adapter = self.adapters.get(model.provider)?;
        let api_key = self.credentials.get(model.provider).ok_or_else(|| {
            PromptgenError::Config(format!(
                "No API key for {}; set {} or add it to the config",
                model.provider,
                model.provider.api_key_env()
            ))
        })?;

        let mut composed = request.clone();
        composed.prompt = prompt::compose(request);
        let spec = adapter.build_request(&composed, model, api_key, stream);

        debug!(
            provider = %model.provider,
            url = %spec.url.split('?').next().unwrap_or_default(),
            stream,
            "built provider request"
        );

        Ok(Prepared {
            model,
            adapter,
            spec,
        })
    }

    fn normalize(
        model: &ModelDescriptor,
        content: String,
        reported_model: Option<String>,
        usage: TokenUsage,
        latency_ms: u64,
        raw: Value,
    ) -> GenerationResponse {
        GenerationResponse {
            content,
            model: reported_model.unwrap_or_else(|| model.upstream_name().to_string()),
            usage,
            cost: model.cost_for(usage.total_tokens),
            latency_ms,
            timestamp: Utc::now(),
            raw,
        }
    }

    /// Sends the request as-is, applying its own few-shot and
    /// chain-of-thought settings.
    #[instrument(skip_all, fields(model = %request.model))]
    pub async fn generate_response(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, PromptgenError> {
        let Prepared {
            model,
            adapter,
            spec,
        } = self.prepare(request, false)?;

        let started = Instant::now();
        let reply = self.transport.post_json(&spec).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if !reply.is_success() {
            warn!(provider = %model.provider, status = reply.status, "provider rejected request");
            return Err(PromptgenError::provider(
                model.provider.as_str(),
                reply.status,
                error_message(&reply.body),
            ));
        }

        let raw: Value = serde_json::from_str(&reply.body).map_err(|e| {
            PromptgenError::malformed(model.provider.as_str(), format!("Invalid JSON: {}", e))
        })?;
        let parsed = adapter.parse_response(&raw)?;

        info!(
            provider = %model.provider,
            tokens = parsed.usage.total_tokens,
            latency_ms,
            "generation complete"
        );

        Ok(Self::normalize(
            model,
            parsed.content,
            parsed.model,
            parsed.usage,
            latency_ms,
            raw,
        ))
    }

    pub async fn generate_with_chain_of_thought(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, PromptgenError> {
        let request = request.clone().with_chain_of_thought(true);
        self.generate_response(&request).await
    }

    /// Without examples this is plain [`Self::generate_response`].
    pub async fn generate_with_few_shot(
        &self,
        request: &GenerationRequest,
        examples: &[FewShotExample],
    ) -> Result<GenerationResponse, PromptgenError> {
        if examples.is_empty() {
            return self.generate_response(request).await;
        }
        let request = request.clone().with_examples(examples.to_vec());
        self.generate_response(&request).await
    }

    /// Runs the same request against each model concurrently. One failing
    /// model does not affect the others.
    pub async fn compare_models(
        &self,
        request: &GenerationRequest,
        model_ids: &[String],
    ) -> Vec<ComparisonResult> {
        let calls = model_ids.iter().map(|id| async move {
            let mut per_model = request.clone();
            per_model.model = id.clone();
            ComparisonResult {
                model: id.clone(),
                result: self.generate_response(&per_model).await,
            }
        });
        join_all(calls).await
    }

    /// Streams the response into `handler`. Cancelling `cancel` stops
    /// delivery at once and drops the network stream; the provider may
    /// still finish generating on its side.
    #[instrument(skip_all, fields(model = %request.model))]
    pub async fn stream_response<H: StreamHandler + ?Sized>(
        &self,
        request: &GenerationRequest,
        handler: &mut H,
        cancel: &CancellationToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }

        match self.run_stream(request, handler, cancel).await {
            Ok(Some(response)) if !cancel.is_cancelled() => handler.on_complete(response),
            Ok(_) => debug!("stream cancelled"),
            Err(e) if !cancel.is_cancelled() => {
                warn!(error = %e, "stream failed");
                handler.on_error(e)
            }
            Err(_) => debug!("stream cancelled after failure"),
        }
    }

    async fn run_stream<H: StreamHandler + ?Sized>(
        &self,
        request: &GenerationRequest,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> Result<Option<GenerationResponse>, PromptgenError> {
        let Prepared {
            model,
            adapter,
            spec,
        } = self.prepare(request, true)?;

        let started = Instant::now();
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            reply = self.transport.post_stream(&spec) => reply?,
        };

        if !reply.is_success() {
            let status = reply.status;
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                body = reply.into_text() => body?,
            };
            return Err(PromptgenError::provider(
                model.provider.as_str(),
                status,
                error_message(&body),
            ));
        }

        let mut body = reply.body;
        let mut decoder = SseDecoder::new();
        let mut content = String::new();
        let mut usage = TokenUsage::default();
        let mut finished = false;

        while !finished {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = body.next() => next,
            };

            let payloads = match next {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => return Err(PromptgenError::Stream(e.to_string())),
                None => {
                    finished = true;
                    decoder.finish().into_iter().collect()
                }
            };

            for data in payloads {
                let event = adapter.parse_stream_data(&data).map_err(|e| match e {
                    PromptgenError::Stream(_) => e,
                    other => PromptgenError::Stream(other.to_string()),
                })?;
                if let Some(reported) = event.usage {
                    usage.merge_latest(reported);
                }
                if let Some(text) = event.text {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    handler.on_chunk(&text);
                    content.push_str(&text);
                }
                if event.done {
                    finished = true;
                    break;
                }
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            provider = %model.provider,
            tokens = usage.total_tokens,
            latency_ms,
            "stream complete"
        );

        Ok(Some(Self::normalize(
            model,
            content,
            None,
            usage,
            latency_ms,
            Value::Null,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::providers::base_client::MockTransport;
    use crate::providers::{HttpReply, HttpStreamReply};
    use crate::usage::UsageAccumulator;
    use futures::stream;
    use std::sync::Mutex;
    use std::time::Duration;

    fn credentials() -> Credentials {
        Provider::ALL
            .iter()
            .fold(Credentials::new(), |c, p| c.with_key(*p, "test-key"))
    }

    fn dispatcher(transport: MockTransport) -> Dispatcher {
        Dispatcher::new(
            Arc::new(ModelRegistry::builtin()),
            Arc::new(transport),
            credentials(),
        )
    }

    fn ok(body: &str) -> HttpReply {
        HttpReply {
            status: 200,
            body: body.to_string(),
        }
    }

    fn sse_stream(chunks: Vec<&'static str>) -> HttpStreamReply {
        HttpStreamReply {
            status: 200,
            body: stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))).boxed(),
        }
    }

    fn last_user_content(spec: &ProviderHttpSpec) -> String {
        spec.body["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string()
    }

    #[derive(Clone, Default)]
    struct Recorder {
        chunks: Arc<Mutex<Vec<String>>>,
        completed: Arc<Mutex<Vec<GenerationResponse>>>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn chunk_count(&self) -> usize {
            self.chunks.lock().unwrap().len()
        }
    }

    impl StreamHandler for Recorder {
        fn on_chunk(&mut self, chunk: &str) {
            self.chunks.lock().unwrap().push(chunk.to_string());
        }

        fn on_complete(&mut self, response: GenerationResponse) {
            self.completed.lock().unwrap().push(response);
        }

        fn on_error(&mut self, error: PromptgenError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[tokio::test]
    async fn glm_response_is_normalized() {
        let mut transport = MockTransport::new();
        transport
            .expect_post_json()
            .withf(|spec| {
                spec.url.ends_with("/chat/completions")
                    && spec.header("Authorization") == Some("Bearer test-key")
                    && last_user_content(spec) == "Hello"
            })
            .times(1)
            .returning(|_| {
                Ok(ok(
                    r#"{"choices":[{"message":{"content":"Hi"}}],"usage":{"total_tokens":3}}"#,
                ))
            });

        let response = dispatcher(transport)
            .generate_response(&GenerationRequest::new("glm-4-5", "Hello"))
            .await
            .unwrap();

        assert_eq!(response.content, "Hi");
        assert_eq!(response.tokens(), 3);
        assert_eq!(response.model, "glm-4.5");
        assert_eq!(response.cost, 0.0);
        assert_eq!(response.raw["usage"]["total_tokens"], 3);
    }

    #[tokio::test]
    async fn unknown_model_makes_no_network_call() {
        let mut transport = MockTransport::new();
        transport.expect_post_json().times(0);
        transport.expect_post_stream().times(0);
        let dispatcher = dispatcher(transport);

        let err = dispatcher
            .generate_response(&GenerationRequest::new("no-such-model", "Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, PromptgenError::UnknownModel(ref id) if id == "no-such-model"));

        let mut recorder = Recorder::default();
        dispatcher
            .stream_response(
                &GenerationRequest::new("no-such-model", "Hello"),
                &mut recorder,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(recorder.errors.lock().unwrap().len(), 1);
        assert!(recorder.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let mut transport = MockTransport::new();
        transport.expect_post_json().times(0);
        let dispatcher = Dispatcher::new(
            Arc::new(ModelRegistry::builtin()),
            Arc::new(transport),
            Credentials::new(),
        );

        let err = dispatcher
            .generate_response(&GenerationRequest::new("glm-4-5", "Hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, PromptgenError::Config(ref m) if m.contains("ZHIPU_API_KEY")));
    }

    #[tokio::test]
    async fn split_usage_sums_and_is_recorded_once() {
        let mut transport = MockTransport::new();
        transport.expect_post_json().returning(|_| {
            Ok(ok(
                r#"{"choices":[{"message":{"content":"x"}}],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#,
            ))
        });
        let mut usage = UsageAccumulator::default();
        let before = usage.lifetime().total_tokens;

        let response = dispatcher(transport)
            .generate_response(&GenerationRequest::new("deepseek-chat", "q"))
            .await
            .unwrap();
        usage.record(&response.usage, response.cost, response.timestamp);

        assert_eq!(response.tokens(), 15);
        assert_eq!(usage.lifetime().total_tokens - before, 15);
    }

    #[tokio::test]
    async fn oversized_usage_saturates_instead_of_overflowing() {
        let mut transport = MockTransport::new();
        transport.expect_post_json().returning(|_| {
            Ok(ok(
                r#"{"choices":[{"message":{"content":"x"}}],"usage":{"prompt_tokens":18446744073709551615,"completion_tokens":1}}"#,
            ))
        });

        let response = dispatcher(transport)
            .generate_response(&GenerationRequest::new("glm-4-5", "q"))
            .await
            .unwrap();

        assert_eq!(response.tokens(), u64::MAX);
        let mut usage = UsageAccumulator::default();
        usage.record(&response.usage, response.cost, response.timestamp);
        usage.record(&response.usage, response.cost, response.timestamp);
        assert_eq!(usage.lifetime().total_tokens, u64::MAX);
    }

    #[tokio::test]
    async fn non_success_status_is_a_provider_error() {
        let mut transport = MockTransport::new();
        transport.expect_post_json().returning(|_| {
            Ok(HttpReply {
                status: 401,
                body: r#"{"error":{"message":"Invalid API key"}}"#.to_string(),
            })
        });

        let err = dispatcher(transport)
            .generate_response(&GenerationRequest::new("glm-4-5", "Hello"))
            .await
            .unwrap_err();

        match err {
            PromptgenError::Provider {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, "zhipu");
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_json_is_a_provider_error() {
        let mut transport = MockTransport::new();
        transport
            .expect_post_json()
            .returning(|_| Ok(ok("<html>gateway</html>")));

        let err = dispatcher(transport)
            .generate_response(&GenerationRequest::new("glm-4-5", "Hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, PromptgenError::Provider { status: 200, .. }));
    }

    #[tokio::test]
    async fn few_shot_examples_are_serialized_before_prompt() {
        let mut transport = MockTransport::new();
        transport
            .expect_post_json()
            .withf(|spec| {
                let prompt = last_user_content(spec);
                prompt.contains("Input: A") && prompt.contains("Output: B") && prompt.ends_with("C")
            })
            .times(1)
            .returning(|_| Ok(ok(r#"{"choices":[{"message":{"content":"D"}}]}"#)));

        let response = dispatcher(transport)
            .generate_with_few_shot(
                &GenerationRequest::new("glm-4-5", "C"),
                &[FewShotExample::new("A", "B")],
            )
            .await
            .unwrap();

        assert_eq!(response.content, "D");
    }

    #[tokio::test]
    async fn few_shot_without_examples_sends_plain_prompt() {
        let mut transport = MockTransport::new();
        transport
            .expect_post_json()
            .withf(|spec| last_user_content(spec) == "C")
            .times(1)
            .returning(|_| Ok(ok(r#"{"choices":[{"message":{"content":"D"}}]}"#)));

        dispatcher(transport)
            .generate_with_few_shot(&GenerationRequest::new("glm-4-5", "C"), &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn chain_of_thought_prefixes_prompt() {
        let mut transport = MockTransport::new();
        transport
            .expect_post_json()
            .withf(|spec| {
                let prompt = last_user_content(spec);
                prompt.starts_with("Let's think step by step") && prompt.ends_with("Why?")
            })
            .times(1)
            .returning(|_| Ok(ok(r#"{"choices":[{"message":{"content":"Because"}}]}"#)));

        dispatcher(transport)
            .generate_with_chain_of_thought(&GenerationRequest::new("glm-4-5", "Why?"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn comparison_isolates_failures() {
        let mut transport = MockTransport::new();
        transport.expect_post_json().returning(|spec| {
            if spec.url.contains("deepseek") {
                Ok(HttpReply {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            } else {
                Ok(ok(r#"{"choices":[{"message":{"content":"fine"}}]}"#))
            }
        });

        let results = dispatcher(transport)
            .compare_models(
                &GenerationRequest::new("", "same prompt"),
                &["glm-4-5".to_string(), "deepseek-chat".to_string(), "gone".to_string()],
            )
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].result.as_ref().unwrap().content, "fine");
        assert!(matches!(results[1].result, Err(PromptgenError::Provider { status: 503, .. })));
        assert!(matches!(results[2].result, Err(PromptgenError::UnknownModel(_))));
    }

    #[tokio::test]
    async fn stream_delivers_chunks_and_completes_once() {
        let mut transport = MockTransport::new();
        transport
            .expect_post_stream()
            .withf(|spec| spec.body["stream"] == true)
            .returning(|_| {
                Ok(sse_stream(vec![
                    "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
                    "ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
                    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2,\"total_tokens\":5}}\n\n",
                    "data: [DONE]\n\n",
                ]))
            });
        let mut recorder = Recorder::default();

        dispatcher(transport)
            .stream_response(
                &GenerationRequest::new("glm-4-5", "Hi"),
                &mut recorder,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(*recorder.chunks.lock().unwrap(), vec!["Hel", "lo"]);
        let completed = recorder.completed.lock().unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].content, "Hello");
        assert_eq!(completed[0].tokens(), 5);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_failure_fires_on_error_once() {
        let mut transport = MockTransport::new();
        transport.expect_post_stream().returning(|_| {
            Ok(HttpStreamReply {
                status: 200,
                body: stream::iter(vec![
                    Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"part\"}}]}\n\n".to_vec()),
                    Err(PromptgenError::Network("connection reset".to_string())),
                    Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n".to_vec()),
                ])
                .boxed(),
            })
        });
        let mut recorder = Recorder::default();

        dispatcher(transport)
            .stream_response(
                &GenerationRequest::new("glm-4-5", "Hi"),
                &mut recorder,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(*recorder.chunks.lock().unwrap(), vec!["part"]);
        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Stream error"));
        assert!(recorder.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_stream_reports_provider_status() {
        let mut transport = MockTransport::new();
        transport.expect_post_stream().returning(|_| {
            Ok(HttpStreamReply {
                status: 429,
                body: stream::iter(vec![Ok(br#"{"error":{"message":"slow down"}}"#.to_vec())])
                    .boxed(),
            })
        });
        let mut recorder = Recorder::default();

        dispatcher(transport)
            .stream_response(
                &GenerationRequest::new("glm-4-5", "Hi"),
                &mut recorder,
                &CancellationToken::new(),
            )
            .await;

        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("429"));
        assert!(errors[0].contains("slow down"));
        assert_eq!(recorder.chunk_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_freezes_chunk_count() {
        let mut transport = MockTransport::new();
        transport.expect_post_stream().returning(|_| {
            let endless = stream::unfold(0u32, |i| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let line = format!(
                    "data: {{\"choices\":[{{\"delta\":{{\"content\":\"t{}\"}}}}]}}\n\n",
                    i
                );
                Some((Ok(line.into_bytes()), i + 1))
            });
            Ok(HttpStreamReply {
                status: 200,
                body: endless.boxed(),
            })
        });
        let dispatcher = Arc::new(dispatcher(transport));
        let recorder = Recorder::default();
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let mut handler = recorder.clone();
            let cancel = cancel.clone();
            async move {
                dispatcher
                    .stream_response(&GenerationRequest::new("glm-4-5", "Hi"), &mut handler, &cancel)
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        task.await.unwrap();
        let frozen = recorder.chunk_count();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(frozen > 0);
        assert_eq!(recorder.chunk_count(), frozen);
        assert!(recorder.completed.lock().unwrap().is_empty());
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_stream_never_calls_transport() {
        let mut transport = MockTransport::new();
        transport.expect_post_stream().times(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut recorder = Recorder::default();

        dispatcher(transport)
            .stream_response(&GenerationRequest::new("glm-4-5", "Hi"), &mut recorder, &cancel)
            .await;

        assert_eq!(recorder.chunk_count(), 0);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn closure_callbacks_receive_stream() {
        let mut transport = MockTransport::new();
        transport.expect_post_stream().returning(|_| {
            Ok(sse_stream(vec![
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}\n\n",
            ]))
        });
        let mut seen = String::new();
        let mut done = None;

        {
            let mut callbacks = StreamCallbacks {
                on_chunk: |chunk: &str| seen.push_str(chunk),
                on_complete: |response: GenerationResponse| done = Some(response),
                on_error: |_e: PromptgenError| {},
            };
            dispatcher(transport)
                .stream_response(
                    &GenerationRequest::new("gemini-2-0-flash", "Hi"),
                    &mut callbacks,
                    &CancellationToken::new(),
                )
                .await;
        }

        assert_eq!(seen, "ok");
        assert_eq!(done.unwrap().content, "ok");
    }
}
