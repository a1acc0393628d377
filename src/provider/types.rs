use crate::error::ProviderError;
use futures_core::stream::BoxStream;
use std::collections::BTreeMap;

/// Sampling and safety knobs sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub temperature: f32,
    pub max_output_tokens: u32,

    /// Harm category -> block threshold, e.g. `HARM_CATEGORY_HARASSMENT = "BLOCK_NONE"`.
    pub safety: BTreeMap<String, String>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_output_tokens: 65535,
            safety: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub params: ModelParameters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResponse {
    pub raw_text: String,
}

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
}

pub type ChunkStream = BoxStream<'static, Result<TextChunk, ProviderError>>;

/// Provider interface: a single streaming generation call.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Start streaming a response.
    fn stream_generate(
        &self,
        req: GenerationRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, ProviderError>> + Send>>;
}
