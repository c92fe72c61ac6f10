//! Provider polymorphism: a single capability set dispatched through a trait
//! object, the same shape the teacher uses for its LLM provider abstraction.

use std::future::Future;
use std::pin::Pin;

use crate::error::CoreError;

/// Boxed-future object-safe trait so `Arc<dyn EmbeddingProvider>` can be
/// stored and called without knowing the concrete provider.
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;
    fn dimension(&self) -> usize;

    fn embed_text<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, CoreError>> + Send + 'a>>;

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, CoreError>> + Send + 'a>>;
}

/// HTTP-based embedding provider. Wire contract is fixed by spec §6:
/// `POST {endpoint}` with `{"model","prompt"}` -> `{"embedding":[f64,...]}`.
/// Batch requests are issued one-at-a-time against this endpoint shape —
/// the contract has no native batch verb.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimension: usize, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            dimension,
            api_key,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let mut req = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            prompt: text,
        });
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            CoreError::Embedding(format!("failed to generate embedding: {e}"))
        })?;
        let body: EmbeddingResponse = resp.json().await.map_err(|e| {
            CoreError::Embedding(format!("failed to generate embedding: {e}"))
        })?;

        if body.embedding.len() != self.dimension {
            return Err(CoreError::Embedding(format!(
                "provider returned dimension {} but expected {}",
                body.embedding.len(),
                self.dimension
            )));
        }

        Ok(body.embedding.into_iter().map(|v| v as f32).collect())
    }
}

#[derive(serde::Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_text<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, CoreError>> + Send + 'a>> {
        Box::pin(async move { self.embed_one(text).await })
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed_one(text).await.map_err(|_| {
                    CoreError::Embedding("failed to generate batch embeddings".to_string())
                })?);
            }
            Ok(out)
        })
    }
}

/// Wraps `(primary, fallback)`; on any error from primary, retry via
/// fallback. Dimension/model follow spec §4.3's documented precedence.
pub struct FallbackProvider {
    primary: Box<dyn EmbeddingProvider>,
    fallback: Box<dyn EmbeddingProvider>,
    model: String,
}

impl FallbackProvider {
    pub fn new(primary: Box<dyn EmbeddingProvider>, fallback: Box<dyn EmbeddingProvider>) -> Self {
        let model = format!("{}|{}", primary.model(), fallback.model());
        Self { primary, fallback, model }
    }
}

impl EmbeddingProvider for FallbackProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.primary.dimension()
    }

    fn embed_text<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            match self.primary.embed_text(text).await {
                Ok(v) => Ok(v),
                Err(primary_err) => {
                    tracing::warn!(error = %primary_err, "primary embedding provider failed, retrying via fallback");
                    self.fallback.embed_text(text).await
                }
            }
        })
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            match self.primary.embed_batch(texts).await {
                Ok(v) => Ok(v),
                Err(primary_err) => {
                    tracing::warn!(error = %primary_err, "primary embedding provider batch call failed, retrying via fallback");
                    self.fallback.embed_batch(texts).await
                }
            }
        })
    }
}
