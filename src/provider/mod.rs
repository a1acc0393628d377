#[cfg(feature = "google")]
pub mod google;
pub mod stub;
mod types;

pub use types::*;

use crate::error::ProviderError;
use tokio_stream::StreamExt;

/// Run one generation and collect the streamed chunks in arrival order.
///
/// Single attempt. Any chunk error discards everything received so far.
pub async fn request_generation(
    provider: &dyn Provider,
    req: GenerationRequest,
) -> Result<GenerationResponse, ProviderError> {
    tracing::info!(provider = provider.name(), model = %req.model, "requesting generation");

    let mut stream = provider.stream_generate(req).await?;
    let mut raw_text = String::new();
    let mut chunks = 0usize;
    while let Some(item) = stream.next().await {
        raw_text.push_str(&item?.text);
        chunks += 1;
    }

    tracing::debug!(chunks, bytes = raw_text.len(), "generation finished");
    Ok(GenerationResponse { raw_text })
}
