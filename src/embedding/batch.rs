//! 배치 임베딩 오케스트레이터
//!
//! 청크를 순서대로 `batch_size`개씩 묶어 프로바이더를 배치당 한 번 호출합니다.
//! 한 배치라도 실패하면 전체가 실패하며 부분 결과는 돌려주지 않습니다.

use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::knowledge::{Chunk, EmbeddedChunk};

use super::{EmbedOptions, EmbeddingProvider};

// ============================================================================
// Progress Observer
// ============================================================================

/// 임베딩 진행률 관찰자
///
/// 배치가 끝날 때마다 동기적으로 호출되며 제어 흐름에는 영향을 주지 않습니다.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, processed: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, processed: usize, total: usize) {
        self(processed, total)
    }
}

/// 아무것도 하지 않는 관찰자
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&self, _processed: usize, _total: usize) {}
}

// ============================================================================
// BatchEmbedder
// ============================================================================

/// 배치 임베딩 실행기
pub struct BatchEmbedder<'a> {
    provider: &'a dyn EmbeddingProvider,
    batch_size: usize,
    options: EmbedOptions,
}

impl<'a> BatchEmbedder<'a> {
    /// `batch_size`가 0이면 1로 취급
    pub fn new(provider: &'a dyn EmbeddingProvider, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            options: EmbedOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EmbedOptions) -> Self {
        self.options = options;
        self
    }

    /// 모든 청크 임베딩
    ///
    /// `expected_dimension`이 주어지면 (저장소에 이미 고정된 차원) 모든 배치가 그 차원이어야 하고,
    /// 없으면 첫 배치의 차원이 기준이 됩니다.
    ///
    /// # Errors
    /// - [`RagError::EmbeddingBatchFailure`]: 프로바이더 호출 실패
    /// - [`RagError::InvalidEmbeddingShape`]: 행 수가 배치 크기와 다름
    /// - [`RagError::DimensionMismatch`]: 차원이 기준과 다름
    pub async fn embed_all(
        &self,
        chunks: &[Chunk],
        expected_dimension: Option<usize>,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<EmbeddedChunk>> {
        let total = chunks.len();
        let mut dimension = expected_dimension;
        let mut embedded = Vec::with_capacity(total);
        let mut processed = 0;

        for (batch_index, batch) in chunks.chunks(self.batch_size).enumerate() {
            debug!(
                "Embedding chunks {}-{} of {}",
                processed + 1,
                processed + batch.len(),
                total
            );

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let tensor = self
                .provider
                .embed_batch(&texts, &self.options)
                .await
                .map_err(|e| {
                    error!(provider = self.provider.name(), batch = batch_index, error = %e, "embedding batch failed");
                    RagError::EmbeddingBatchFailure {
                        provider: self.provider.name().to_string(),
                        batch: batch_index,
                        message: format!("{e:#}"),
                    }
                })?;

            if tensor.rows() != batch.len() {
                return Err(RagError::InvalidEmbeddingShape(format!(
                    "batch {} has {} texts but provider returned {} rows",
                    batch_index,
                    batch.len(),
                    tensor.rows()
                )));
            }

            match dimension {
                Some(expected) if expected != tensor.dimension() => {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: tensor.dimension(),
                    });
                }
                Some(_) => {}
                None => dimension = Some(tensor.dimension()),
            }

            for (chunk, row) in batch.iter().zip(tensor.iter_rows()) {
                embedded.push(EmbeddedChunk::new(chunk.clone(), row.to_vec()));
            }

            processed += batch.len();
            observer.on_progress(processed, total);

            // 진행률 알림이 다음 호출 전에 관찰되도록 스케줄러에 양보
            tokio::task::yield_now().await;
        }

        Ok(embedded)
    }
}

// ============================================================================
// Tests
// ============================================================================
