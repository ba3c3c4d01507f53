//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 임베딩 프로바이더(외부 협력자) 인터페이스와 배치 오케스트레이터를 제공합니다.
//!
//! - [`EmbeddingProvider`]: `texts -> [rows × D]` 텐서를 돌려주는 협력자
//! - [`BatchEmbedder`]: 청크를 배치로 나눠 프로바이더를 호출하고 진행률을 알림
//! - [`HashEmbedding`]: 네트워크 없이 동작하는 결정적 임베딩
//! - [`OpenAiEmbedding`]: OpenAI 호환 로컬 추론 서버
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HashEmbedding::with_defaults();
//! let embedding = embedder.embed("Hello, world!", &EmbedOptions::default()).await?;
//! ```

mod batch;
mod hash;
mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{EmbedderKind, RagConfig};
use crate::error::RagError;

pub use batch::{BatchEmbedder, NoopProgress, ProgressObserver};
pub use hash::{HashEmbedding, DEFAULT_HASH_DIMENSION};
pub use openai::OpenAiEmbedding;

// ============================================================================
// Options
// ============================================================================

/// 토큰 벡터 풀링 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    /// 토큰 평균
    Mean,
    /// 첫 토큰
    Cls,
}

/// 임베딩 호출 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedOptions {
    pub pooling: Pooling,
    /// L2 정규화 여부
    pub normalize: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            pooling: Pooling::Mean,
            normalize: true,
        }
    }
}

// ============================================================================
// EmbeddingTensor
// ============================================================================

/// `[rows × D]` 행 우선(row-major) 임베딩 텐서
///
/// 검증 생성자로만 만들 수 있으므로 `data.len() == rows * D`, `D > 0`이 항상 성립합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTensor {
    dims: [usize; 2],
    data: Vec<f32>,
}

impl EmbeddingTensor {
    /// 평탄화된 데이터로 생성
    pub fn new(rows: usize, dimension: usize, data: Vec<f32>) -> Result<Self, RagError> {
        if dimension == 0 {
            return Err(RagError::InvalidEmbeddingShape(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        if data.len() != rows * dimension {
            return Err(RagError::InvalidEmbeddingShape(format!(
                "expected {} values for [{} x {}], got {}",
                rows * dimension,
                rows,
                dimension,
                data.len()
            )));
        }
        Ok(Self {
            dims: [rows, dimension],
            data,
        })
    }

    /// 행 벡터 목록으로 생성 (모든 행의 길이가 같아야 함)
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, RagError> {
        let dimension = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != dimension) {
            return Err(RagError::InvalidEmbeddingShape(format!(
                "ragged rows: expected length {}, found {}",
                dimension,
                bad.len()
            )));
        }
        let count = rows.len();
        Self::new(count, dimension, rows.into_iter().flatten().collect())
    }

    /// `[rows, D]`
    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn rows(&self) -> usize {
        self.dims[0]
    }

    pub fn dimension(&self) -> usize {
        self.dims[1]
    }

    /// i번째 행
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows() {
            return None;
        }
        let start = index * self.dimension();
        Some(&self.data[start..start + self.dimension()])
    }

    /// 행 순회
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension())
    }
}

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 세션 안에서 같은 입력에는 같은 결과를 돌려줘야 합니다.
/// 정규화는 프로바이더의 책임이며, 오케스트레이터는 다시 정규화하지 않습니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩 (`texts.len()` 행의 텐서)
    async fn embed_batch(&self, texts: &[String], options: &EmbedOptions) -> Result<EmbeddingTensor>;

    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str, options: &EmbedOptions) -> Result<Vec<f32>> {
        let tensor = self.embed_batch(&[text.to_string()], options).await?;
        if tensor.rows() != 1 {
            return Err(RagError::InvalidEmbeddingShape(format!(
                "expected 1 row for a single text, got {}",
                tensor.rows()
            ))
            .into());
        }
        Ok(tensor.data)
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// SerialEmbedder
// ============================================================================

/// 한 번에 한 호출만 통과시키는 래퍼
///
/// 임베딩 모델은 재진입을 보장하지 않으므로 수집과 질의가 겹쳐도 호출은 직렬화됩니다.
pub struct SerialEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    gate: Mutex<()>,
}

impl SerialEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SerialEmbedder {
    async fn embed_batch(&self, texts: &[String], options: &EmbedOptions) -> Result<EmbeddingTensor> {
        let _permit = self.gate.lock().await;
        self.inner.embed_batch(texts, options).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 제자리 L2 정규화 (영벡터는 그대로 둠)
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// `embedder = none`이면 `None`을 돌려주며, 이 경우 검색은 폴백 모드로 동작합니다.
pub fn create_embedder(config: &RagConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    let embedder: Option<Arc<dyn EmbeddingProvider>> = match config.embedder {
        EmbedderKind::Hash => Some(Arc::new(HashEmbedding::with_defaults())),
        EmbedderKind::Openai => Some(Arc::new(OpenAiEmbedding::from_config(&config.endpoint)?)),
        EmbedderKind::None => None,
    };

    match &embedder {
        Some(e) => tracing::info!("Using embedding provider: {}", e.name()),
        None => tracing::warn!("No embedding provider configured, retrieval falls back to first chunk"),
    }

    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
