//! Embedding backends for the vector store.
//!
//! Two implementations: one that calls the configured LLM provider's
//! embedding endpoint, and a deterministic local embedder so retrieval works
//! offline and in tests without a remote dependency.

use async_trait::async_trait;
use std::sync::Arc;

use agentgw_core::error::ProviderError;
use agentgw_core::provider::{EmbeddingRequest, Provider};

/// Turns texts into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Embedder backed by a [`Provider`]'s embedding endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: texts.to_vec(),
            })
            .await?;
        Ok(response.embeddings)
    }
}

/// Deterministic local embedder.
///
/// Hashes character trigrams into a fixed-dimension bag-of-features vector
/// and L2-normalizes it. Not a substitute for a learned embedding model, but
/// stable, fast, and good enough for lexical-overlap similarity.
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self { dim: 256 }
    }

    pub fn with_dim(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        if chars.len() < 3 {
            for c in &chars {
                vector[(*c as usize) % self.dim] += 1.0;
            }
        } else {
            for trigram in chars.windows(3) {
                let mut hash = 0xcbf2_9ce4_8422_2325u64; // FNV-1a
                for c in trigram {
                    hash ^= *c as u64;
                    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
                }
                vector[(hash % self.dim as u64) as usize] += 1.0;
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cosine_similarity;

    #[tokio::test]
    async fn local_embedder_is_deterministic() {
        let embedder = LocalEmbedder::new();
        let a = embedder.embed(&["the quick brown fox".into()]).await.unwrap();
        let b = embedder.embed(&["the quick brown fox".into()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn similar_texts_score_higher_than_unrelated() {
        let embedder = LocalEmbedder::new();
        let vecs = embedder
            .embed(&[
                "rust is a systems programming language".into(),
                "rust is a programming language for systems".into(),
                "quarterly marketing budget spreadsheet".into(),
            ])
            .await
            .unwrap();

        let close = cosine_similarity(&vecs[0], &vecs[1]);
        let far = cosine_similarity(&vecs[0], &vecs[2]);
        assert!(close > far, "expected {close} > {far}");
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let embedder = LocalEmbedder::new();
        let vecs = embedder.embed(&["some text to embed".into()]).await.unwrap();
        let norm: f32 = vecs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn short_text_does_not_panic() {
        let embedder = LocalEmbedder::new();
        let vecs = embedder.embed(&["ab".into(), "".into()]).await.unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0].len(), 256);
    }
}
