//! Grounded answer generation against the completion collaborator.
//!
//! [`Generator`] builds the prompt, then drives the completion client
//! through the bounded retry policy. Buffered mode drains the response and
//! returns the trimmed text; streaming mode returns a lazy, single-pass
//! stream of non-empty fragments — dropping the stream early drops the
//! underlying HTTP response with it, so abandoned generations never leak a
//! connection.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::config::GenerationConfig;
use crate::error::UpstreamError;
use crate::prompt::build_prompt;
use crate::retry::{with_retry, BASE_DELAY, MAX_ATTEMPTS};

/// Completion options forwarded to the model on every call.
#[derive(Debug, Clone, Copy)]
pub struct GenOptions {
    pub temperature: f64,
    pub context_window_tokens: usize,
    pub max_tokens: usize,
}

/// A lazily produced, forward-only sequence of answer fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// Black-box completion service: prompt in, answer (or fragments) out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Fully drain the model's response and return the final text.
    async fn complete(&self, prompt: &str, opts: GenOptions) -> Result<String, UpstreamError>;

    /// Open a streaming completion; fragments arrive as the model produces
    /// them. Fragments with no text payload are never yielded.
    async fn complete_stream(
        &self,
        prompt: &str,
        opts: GenOptions,
    ) -> Result<FragmentStream, UpstreamError>;
}

/// Completion client for an Ollama server's generate endpoint.
pub struct OllamaGenerator {
    client: reqwest::Client,
    host: String,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, UpstreamError> {
        // Buffered calls carry the whole-request timeout per attempt;
        // streaming calls bound only the header/open phase (see `send`).
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(UpstreamError::from_transport)?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn request_body(&self, prompt: &str, opts: GenOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
            "options": {
                "temperature": opts.temperature,
                "num_ctx": opts.context_window_tokens,
                "num_predict": opts.max_tokens,
            },
        })
    }

    async fn send(
        &self,
        prompt: &str,
        opts: GenOptions,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut request = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&self.request_body(prompt, opts, stream));
        if !stream {
            request = request.timeout(self.timeout);
        }

        // Streaming requests skip reqwest's whole-request timeout (it would
        // cut long generations short), so the open phase gets its own bound:
        // a server that accepts the connection but never sends headers must
        // fail the attempt, not hang it.
        let response = if stream {
            tokio::time::timeout(self.timeout, request.send())
                .await
                .map_err(|_| {
                    UpstreamError::Timeout(format!(
                        "no response headers within {}s",
                        self.timeout.as_secs()
                    ))
                })?
                .map_err(UpstreamError::from_transport)?
        } else {
            request.send().await.map_err(UpstreamError::from_transport)?
        };
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), message));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OllamaGenerator {
    async fn complete(&self, prompt: &str, opts: GenOptions) -> Result<String, UpstreamError> {
        let response = self.send(prompt, opts, false).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        Ok(parsed.response.trim().to_string())
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        opts: GenOptions,
    ) -> Result<FragmentStream, UpstreamError> {
        let response = self.send(prompt, opts, true).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(UpstreamError::from_transport));
        Ok(Box::pin(ndjson_fragments(bytes)))
    }
}

/// Decode an NDJSON byte stream into non-empty text fragments.
///
/// Lines may arrive split across network chunks; a carry buffer reassembles
/// them. Blank lines are tolerated, empty `response` payloads are dropped.
fn ndjson_fragments<S>(byte_stream: S) -> impl Stream<Item = Result<String, UpstreamError>> + Send
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static,
{
    async_stream::try_stream! {
        futures::pin_mut!(byte_stream);
        let mut carry: Vec<u8> = Vec::new();

        while let Some(chunk) = byte_stream.next().await {
            carry.extend_from_slice(&chunk?);
            while let Some(pos) = carry.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = carry.drain(..=pos).collect();
                if let Some(fragment) = parse_stream_line(&line)? {
                    yield fragment;
                }
            }
        }

        // A final line without a trailing newline still counts.
        if let Some(fragment) = parse_stream_line(&carry)? {
            yield fragment;
        }
    }
}

/// Parse one NDJSON line; `Ok(None)` for blank lines and empty fragments.
fn parse_stream_line(line: &[u8]) -> Result<Option<String>, UpstreamError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    let parsed: GenerateResponse = serde_json::from_str(text)
        .map_err(|e| UpstreamError::InvalidResponse(format!("bad stream line: {}", e)))?;
    if parsed.response.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parsed.response))
    }
}

/// Prompt construction plus retry policy around a completion client.
pub struct Generator {
    config: GenerationConfig,
    client: Arc<dyn CompletionClient>,
}

impl Generator {
    pub fn new(config: GenerationConfig, client: Arc<dyn CompletionClient>) -> Self {
        Self { config, client }
    }

    fn options(&self, max_tokens: Option<usize>) -> GenOptions {
        GenOptions {
            temperature: self.config.temperature,
            context_window_tokens: self.config.context_window_tokens,
            max_tokens: max_tokens.unwrap_or(self.config.max_tokens).max(1),
        }
    }

    /// Buffered generation: retries transient failures, returns the final
    /// trimmed answer, and propagates the last error once the attempt
    /// budget is spent — never a silent partial answer.
    pub async fn generate(
        &self,
        query: &str,
        context: &str,
        max_tokens: Option<usize>,
    ) -> Result<String, UpstreamError> {
        let prompt = build_prompt(query, context, self.config.context_window_tokens);
        let opts = self.options(max_tokens);
        with_retry(MAX_ATTEMPTS, BASE_DELAY, |_| {
            self.client.complete(&prompt, opts)
        })
        .await
    }

    /// Streaming generation. The retry budget covers opening the stream;
    /// once fragments are flowing, a mid-stream failure surfaces through
    /// the stream itself.
    pub async fn generate_stream(
        &self,
        query: &str,
        context: &str,
        max_tokens: Option<usize>,
    ) -> Result<FragmentStream, UpstreamError> {
        let prompt = build_prompt(query, context, self.config.context_window_tokens);
        let opts = self.options(max_tokens);
        with_retry(MAX_ATTEMPTS, BASE_DELAY, |_| {
            self.client.complete_stream(&prompt, opts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> GenerationConfig {
        GenerationConfig {
            host: "http://127.0.0.1:1".to_string(),
            model: "test".to_string(),
            temperature: 0.2,
            context_window_tokens: 4096,
            max_tokens: 512,
            timeout_secs: 5,
        }
    }

    /// Completion stub that fails a set number of times, then answers.
    struct FlakyClient {
        calls: AtomicUsize,
        failures_before_success: usize,
    }

    impl FlakyClient {
        fn new(failures_before_success: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_before_success,
            }
        }
    }

    #[async_trait]
    impl CompletionClient for FlakyClient {
        async fn complete(&self, _prompt: &str, _opts: GenOptions) -> Result<String, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(UpstreamError::Connect("refused".into()))
            } else {
                Ok("grounded answer".to_string())
            }
        }

        async fn complete_stream(
            &self,
            _prompt: &str,
            _opts: GenOptions,
        ) -> Result<FragmentStream, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                return Err(UpstreamError::Connect("refused".into()));
            }
            Ok(Box::pin(stream::iter(vec![
                Ok("Hello".to_string()),
                Ok(" world".to_string()),
            ])))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_is_three_calls() {
        let client = Arc::new(FlakyClient::new(2));
        let generator = Generator::new(test_config(), client.clone());
        let answer = generator.generate("q", "ctx", None).await.unwrap();
        assert_eq!(answer, "grounded answer");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_stops_after_three_calls() {
        let client = Arc::new(FlakyClient::new(usize::MAX));
        let generator = Generator::new(test_config(), client.clone());
        let err = generator.generate("q", "ctx", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connect(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_open_is_retried_too() {
        let client = Arc::new(FlakyClient::new(1));
        let generator = Generator::new(test_config(), client.clone());
        let stream = generator.generate_stream("q", "ctx", None).await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.join(""), "Hello world");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ndjson_fragments_concatenate_and_drop_empties() {
        let lines = vec![
            Ok(Bytes::from_static(b"{\"response\":\"Hello\",\"done\":false}\n")),
            Ok(Bytes::from_static(b"{\"response\":\"\",\"done\":false}\n")),
            // One logical line split across two network chunks.
            Ok(Bytes::from_static(b"{\"response\":\" wor")),
            Ok(Bytes::from_static(b"ld\",\"done\":false}\n")),
            Ok(Bytes::from_static(b"{\"response\":\"!\",\"done\":true}")),
        ];
        let fragments: Vec<String> = ndjson_fragments(stream::iter(lines))
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hello", " world", "!"]);
        assert_eq!(fragments.concat(), "Hello world!");
    }

    #[tokio::test]
    async fn stream_open_times_out_against_a_silent_server() {
        // Accepts connections and then never writes a byte, so response
        // headers never arrive.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let mut config = test_config();
        config.host = format!("http://{}", addr);
        config.timeout_secs = 1;
        let client = OllamaGenerator::new(&config).unwrap();

        let opts = GenOptions {
            temperature: 0.2,
            context_window_tokens: 64,
            max_tokens: 8,
        };
        let started = std::time::Instant::now();
        let err = match client.complete_stream("q", opts).await {
            Ok(_) => panic!("expected complete_stream to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, UpstreamError::Timeout(_)));
        // The open phase is bounded by timeout_secs, not left to hang.
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn malformed_stream_line_surfaces_as_invalid_response() {
        let lines = vec![Ok(Bytes::from_static(b"not json\n"))];
        let mut stream = Box::pin(ndjson_fragments(stream::iter(lines)));
        let item = stream.next().await.unwrap();
        assert!(matches!(item, Err(UpstreamError::InvalidResponse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn max_tokens_floors_at_one() {
        /// Records the options it was called with.
        struct OptsProbe(std::sync::Mutex<Option<GenOptions>>);

        #[async_trait]
        impl CompletionClient for OptsProbe {
            async fn complete(
                &self,
                _prompt: &str,
                opts: GenOptions,
            ) -> Result<String, UpstreamError> {
                *self.0.lock().unwrap() = Some(opts);
                Ok("ok".into())
            }
            async fn complete_stream(
                &self,
                _prompt: &str,
                _opts: GenOptions,
            ) -> Result<FragmentStream, UpstreamError> {
                unimplemented!("not used in this test")
            }
        }

        let probe = Arc::new(OptsProbe(std::sync::Mutex::new(None)));
        let generator = Generator::new(test_config(), probe.clone());
        generator.generate("q", "ctx", Some(0)).await.unwrap();
        assert_eq!(probe.0.lock().unwrap().unwrap().max_tokens, 1);
    }
}
