//! 해시 임베딩 - 오프라인 결정적 임베딩
//!
//! 단어를 SHA-256으로 해싱해 `D`개 버킷 중 하나의 카운트를 올리는 feature hashing 방식입니다.
//! 카운트는 음수가 되지 않으므로 토큰이 하나라도 있으면 영벡터가 나오지 않습니다.
//! 의미 유사도는 단어 겹침 수준이지만, 네트워크나 모델 없이 같은 입력에 같은 벡터를 보장합니다.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{l2_normalize, EmbedOptions, EmbeddingProvider, EmbeddingTensor, Pooling};

/// 기본 차원
pub const DEFAULT_HASH_DIMENSION: usize = 256;

/// 해시 기반 임베딩 프로바이더
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    /// 차원 지정 생성
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            bail!("Invalid dimension: 0. Must be greater than zero");
        }
        Ok(Self { dimension })
    }

    /// 기본 차원으로 생성
    pub fn with_defaults() -> Self {
        Self {
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 토큰 하나를 버킷 인덱스로 매핑
    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }

    fn embed_one(&self, text: &str, options: &EmbedOptions) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            bail!("Text has no tokens to embed");
        }

        let pooled: &[String] = match options.pooling {
            Pooling::Mean => &tokens,
            Pooling::Cls => &tokens[..1],
        };

        let mut vector = vec![0.0f32; self.dimension];
        for token in pooled {
            vector[self.bucket(token)] += 1.0;
        }
        let count = pooled.len() as f32;
        for x in vector.iter_mut() {
            *x /= count;
        }

        if options.normalize {
            l2_normalize(&mut vector);
        }
        Ok(vector)
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed_batch(&self, texts: &[String], options: &EmbedOptions) -> Result<EmbeddingTensor> {
        let mut data = Vec::with_capacity(texts.len() * self.dimension);
        for text in texts {
            data.extend(self.embed_one(text, options)?);
        }
        Ok(EmbeddingTensor::new(texts.len(), self.dimension, data)?)
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}

/// 소문자 영숫자 단어
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[test]
    fn test_invalid_dimension() {
        let result = HashEmbedding::new(0);
        assert!(result.is_err());
        assert!(result
            .err()
            .map(|e| e.to_string().contains("Invalid dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Slow and steady, wins the RACE!"),
            vec!["slow", "and", "steady", "wins", "the", "race"]
        );
        assert!(tokenize("... !!!").is_empty());
    }

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let embedder = HashEmbedding::with_defaults();
        let options = EmbedOptions::default();
        let a = embedder.embed("The tortoise won", &options).await.expect("embed");
        let b = embedder.embed("The tortoise won", &options).await.expect("embed");

        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASH_DIMENSION);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_word_overlap_ranks_higher() {
        let embedder = HashEmbedding::with_defaults();
        let options = EmbedOptions::default();
        let query = embedder.embed("tortoise race", &options).await.expect("embed");
        let related = embedder
            .embed("the tortoise finished the race", &options)
            .await
            .expect("embed");
        let unrelated = embedder
            .embed("quantum chromodynamics lecture notes", &options)
            .await
            .expect("embed");

        let close = cosine_similarity(&query, &related).expect("defined");
        let far = cosine_similarity(&query, &unrelated).expect("defined");
        assert!(close > far);
    }

    #[tokio::test]
    async fn test_short_questions_never_collapse_to_zero() {
        let embedder = HashEmbedding::with_defaults();
        let options = EmbedOptions::default();

        for text in ["quick tortoise", "nap win", "tortoise hare race"] {
            let vector = embedder.embed(text, &options).await.expect("embed");
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "{text} has norm {norm}");
            assert!(vector.iter().all(|x| *x >= 0.0));
        }
    }

    #[tokio::test]
    async fn test_tiny_dimension_still_embeds() {
        let embedder = HashEmbedding::new(1).expect("dimension");
        let vector = embedder
            .embed("quick tortoise", &EmbedOptions::default())
            .await
            .expect("embed");
        assert_eq!(vector, vec![1.0]);
    }

    #[tokio::test]
    async fn test_empty_text_fails() {
        let embedder = HashEmbedding::with_defaults();
        let result = embedder
            .embed_batch(&["   ".to_string()], &EmbedOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batch_shape() {
        let embedder = HashEmbedding::new(16).expect("dimension");
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let tensor = embedder
            .embed_batch(&texts, &EmbedOptions::default())
            .await
            .expect("embed");
        assert_eq!(tensor.dims(), [3, 16]);
    }
}
