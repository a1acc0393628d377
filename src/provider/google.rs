use super::{ChunkStream, GenerationRequest, ModelParameters, Provider, TextChunk};
use crate::error::ProviderError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/";

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-goog-api-key");

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
    /// Marked sensitive so it never shows up in `Debug` output.
    api_key: HeaderValue,
    api_base: Url,
}

impl GoogleProvider {
    pub fn new(http: reqwest::Client, api_key: String) -> Result<Self, ProviderError> {
        Self::with_api_base(http, api_key, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        http: reqwest::Client,
        api_key: String,
        api_base: &str,
    ) -> Result<Self, ProviderError> {
        // `join` drops the last path segment unless the base ends with '/'.
        let base = if api_base.ends_with('/') {
            api_base.to_string()
        } else {
            format!("{api_base}/")
        };
        let api_base = Url::parse(&base).map_err(|e| ProviderError::Endpoint(format!("{base}: {e}")))?;
        let mut api_key = HeaderValue::from_str(&api_key)
            .map_err(|_| ProviderError::Endpoint("API key is not a valid header value".to_string()))?;
        api_key.set_sensitive(true);
        Ok(Self {
            http,
            api_key,
            api_base,
        })
    }

    fn build_url(&self, model: &str) -> Result<Url, ProviderError> {
        // v1beta:streamGenerateContent supports Server-Sent Events with alt=sse.
        // Docs: https://ai.google.dev/api/rest/v1beta/models/streamGenerateContent
        let mut url = self
            .api_base
            .join(&format!("v1beta/models/{model}:streamGenerateContent"))
            .map_err(|e| ProviderError::Endpoint(e.to_string()))?;

        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }

    // The key travels in a header, never the URL, so transport errors can't echo it.
    fn headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h.insert(API_KEY_HEADER, self.api_key.clone());
        h
    }
}

impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn stream_generate(
        &self,
        req: GenerationRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, ProviderError>> + Send>>
    {
        let http = self.http.clone();
        let this = self.clone();

        Box::pin(async move {
            let url = this.build_url(&req.model)?;
            let body = StreamGenerateContentRequest::new(req.prompt, &req.params);

            let resp = http
                .post(url)
                .headers(this.headers())
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Transport(e.without_url()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ProviderError::Status { status, body });
            }

            let (tx, rx) = mpsc::channel::<Result<TextChunk, ProviderError>>(64);

            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                let mut parser = SseParser::new();
                let mut tracker = EmptyTracker::default();

                while let Some(item) = stream.next().await {
                    let bytes = match item {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tx.send(Err(ProviderError::Transport(e.without_url()))).await;
                            return;
                        }
                    };

                    for ev in parser.push(&bytes) {
                        if !forward_event(ev, &tx, &mut tracker).await {
                            return;
                        }
                    }
                }

                if let Some(ev) = parser.finish() {
                    if !forward_event(Ok(ev), &tx, &mut tracker).await {
                        return;
                    }
                }

                if !tracker.saw_text {
                    let _ = tx.send(Err(ProviderError::Blocked(tracker.reason()))).await;
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

/// Remembers why a response produced no text, for the final error.
#[derive(Debug, Default)]
struct EmptyTracker {
    saw_text: bool,
    block_reason: Option<String>,
    finish_reason: Option<String>,
}

impl EmptyTracker {
    fn reason(&self) -> String {
        match (&self.block_reason, &self.finish_reason) {
            (Some(b), _) => format!("prompt blocked: {b}"),
            (None, Some(f)) => format!("finish reason: {f}"),
            (None, None) => "empty response".to_string(),
        }
    }
}

/// Returns false once the receiver is gone or an error has been sent.
async fn forward_event(
    ev: Result<SseEvent, ProviderError>,
    tx: &mpsc::Sender<Result<TextChunk, ProviderError>>,
    tracker: &mut EmptyTracker,
) -> bool {
    let data = match ev {
        Ok(SseEvent::Data(data)) => data,
        Ok(SseEvent::Other) => return true,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return false;
        }
    };

    if data.trim().is_empty() {
        return true;
    }

    let r: StreamGenerateContentResponse = match serde_json::from_str(&data) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx
                .send(Err(ProviderError::Stream(format!("failed to parse SSE JSON: {e}"))))
                .await;
            return false;
        }
    };

    if let Some(reason) = r.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
        tracker.block_reason = Some(reason);
    }
    if let Some(reason) = r.candidates.first().and_then(|c| c.finish_reason.clone()) {
        tracker.finish_reason = Some(reason);
    }

    match extract_text(&r) {
        Some(text) => {
            tracker.saw_text = true;
            tx.send(Ok(TextChunk { text })).await.is_ok()
        }
        None => true,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamGenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

impl StreamGenerateContentRequest {
    fn new(prompt: String, params: &ModelParameters) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(prompt) }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
            safety_settings: params
                .safety
                .iter()
                .map(|(category, threshold)| SafetySetting {
                    category: category.clone(),
                    threshold: threshold.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(r: &StreamGenerateContentResponse) -> Option<String> {
    // Concatenate all text parts of the first candidate.
    let cand = r.candidates.first()?;
    let content = cand.content.as_ref()?;
    let mut out = String::new();
    for p in &content.parts {
        if let Some(t) = &p.text {
            out.push_str(t);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SseEvent {
    Data(String),
    Other,
}

/// Minimal SSE parser.
///
/// - Collects UTF-8 lines
/// - Emits Data events when a blank line ends an event
struct SseParser {
    buf: Vec<u8>,
    cur_data: String,
}

impl SseParser {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            cur_data: String::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseEvent, ProviderError>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.drain(..=pos).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }

            if line.is_empty() {
                if let Some(ev) = self.take_data() {
                    out.push(Ok(ev));
                }
                continue;
            }

            let s = match std::str::from_utf8(&line) {
                Ok(s) => s,
                Err(e) => {
                    out.push(Err(ProviderError::Stream(format!("SSE line is not valid UTF-8: {e}"))));
                    continue;
                }
            };

            if let Some(rest) = s.strip_prefix("data:") {
                // Optional single leading space.
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                self.cur_data.push_str(rest);
                self.cur_data.push('\n');
            } else {
                // event:, id:, retry:, comments
                out.push(Ok(SseEvent::Other));
            }
        }

        out
    }

    /// Flush an event left open when the body ends without a blank line.
    fn finish(&mut self) -> Option<SseEvent> {
        if !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            if let Ok(s) = String::from_utf8(line) {
                if let Some(rest) = s.trim_end_matches('\r').strip_prefix("data:") {
                    self.cur_data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
                    self.cur_data.push('\n');
                }
            }
        }
        self.take_data()
    }

    fn take_data(&mut self) -> Option<SseEvent> {
        if self.cur_data.is_empty() {
            return None;
        }
        if self.cur_data.ends_with('\n') {
            self.cur_data.pop();
        }
        Some(SseEvent::Data(std::mem::take(&mut self.cur_data)))
    }
}
