//! Text embeddings for capability search
//!
//! [`Embedder`] is the seam for a real embedding model. [`HashingEmbedder`]
//! is the built-in deterministic fallback: SHA-256 feature hashing over
//! lowercased word and CamelCase tokens, L2-normalized.

use crate::errors::{RecommendError, Result};
use crate::lexicon::camel_tokens;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Embedding model
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored on every record embedded with this model
    fn model_version(&self) -> &str;

    /// Embed `text`. Index time and query time must use the same model.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "i", "in", "into", "is", "it", "me", "my",
    "of", "on", "or", "the", "this", "to", "via", "want", "we", "with", "need",
];

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_version: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_version: format!("hashing-v1-{dimensions}"),
        }
    }

    /// Synchronous embedding; the trait method delegates here
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(RecommendError::embedding("embedding dimensions must be at least 1"));
        }
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(idx_bytes) % self.dimensions as u64) as usize;
            // Signed hashing keeps colliding tokens from always reinforcing each other
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_version(&self) -> &str {
        &self.model_version
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }
}

/// Lowercased tokens: every word, plus its CamelCase parts when it has several
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let lower = word.to_ascii_lowercase();
        let parts = camel_tokens(word);
        if parts.len() > 1 {
            tokens.extend(parts.into_iter().map(|p| stem(&p)).filter(|p| !is_stop_word(p)));
        }
        let lower = stem(&lower);
        if !is_stop_word(&lower) {
            tokens.push(lower);
        }
    }
    tokens
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Plural folding: `databases` → `database`, `policies` → `policy`
fn stem(token: &str) -> String {
    if token.len() > 4 {
        if let Some(base) = token.strip_suffix("ies") {
            return format!("{base}y");
        }
        if !token.ends_with("ss")
            && let Some(base) = token.strip_suffix('s')
        {
            return base.to_string();
        }
    }
    token.to_string()
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity; `0.0` for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let mag_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("PostgreSQL databases on Azure"),
            vec!["postgre", "sql", "postgresql", "database", "azure"]
        );
        assert_eq!(tokenize("the a of"), Vec::<String>::new());
        assert_eq!(stem("policies"), "policy");
        assert_eq!(stem("access"), "access");
    }

    #[tokio::test]
    async fn test_embedding_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("PostgreSQL on Azure").await.unwrap();
        let b = embedder.embed("PostgreSQL on Azure").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(embedder.model_version(), "hashing-v1-64");
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::new(256);
        let intent = embedder.embed_sync("PostgreSQL database on Azure").unwrap();
        let server = embedder
            .embed_sync(
                "Server dbforpostgresql azure postgresql database Managed PostgreSQL server",
            )
            .unwrap();
        let bucket = embedder
            .embed_sync("Bucket s3 aws object storage Stores objects")
            .unwrap();
        assert!(cosine_similarity(&intent, &server) > cosine_similarity(&intent, &bucket));
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_dimensions_is_an_error() {
        let err = HashingEmbedder::new(0).embed_sync("x").unwrap_err();
        assert_eq!(err.category(), crate::errors::ErrorCategory::EmbeddingError);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let v = HashingEmbedder::new(8).embed_sync("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
