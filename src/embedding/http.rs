/// OpenAI-compatible embedding provider for online mode
use super::provider::{check_batch, EmbeddingError, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Texts sent per request
const REQUEST_BATCH: usize = 20;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Calls `POST {endpoint}/embeddings`
///
/// Uses a blocking client; call it from a blocking context (the retriever
/// runs every provider call on the blocking pool).
pub struct HttpEmbeddingProvider {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    model_name: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: &str,
        model_name: &str,
        api_key: Option<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if endpoint.is_empty() {
            return Err(EmbeddingError::InitializationError(
                "Endpoint cannot be empty".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        tracing::info!(
            "Using remote embedding model {} at {} ({}D)",
            model_name,
            endpoint,
            dimension
        );

        Ok(Self {
            client,
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            api_key,
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model_name,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let body = response
            .text()
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
        decode_response(&body)
    }
}

/// Embeddings from a response body, in request order
///
/// Servers may return `data` out of order; `index` says where each belongs.
fn decode_response(body: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::GenerationError(format!("Malformed embedding response: {}", e)))?;

    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(REQUEST_BATCH) {
            let embeddings = self.request(chunk)?;
            check_batch(&embeddings, chunk.len(), self.dimension)?;
            out.extend(embeddings);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
