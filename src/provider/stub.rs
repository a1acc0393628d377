use super::{ChunkStream, GenerationRequest, Provider, TextChunk};
use crate::error::ProviderError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Offline provider that streams a canned, marker-formatted answer.
#[derive(Debug, Default, Clone)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }
}

fn canned_answer(req: &GenerationRequest) -> Vec<String> {
    let title = req.prompt.lines().next().unwrap_or_default().replace('"', "'");
    vec![
        "Here is your app.\n\n".to_string(),
        "app.py\n```python\n".to_string(),
        "import streamlit as st\n\n".to_string(),
        format!("st.title(\"{title}\")\n"),
        format!("st.caption(\"generated by the stub provider for model {}\")\n", req.model),
        "```\n\nrequirements.txt\n```\nstreamlit\n```\n".to_string(),
    ]
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn stream_generate(
        &self,
        req: GenerationRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, ProviderError>> + Send>>
    {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<Result<TextChunk, ProviderError>>(32);

            tokio::spawn(async move {
                for text in canned_answer(&req) {
                    if tx.send(Ok(TextChunk { text })).await.is_err() {
                        break;
                    }
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}
