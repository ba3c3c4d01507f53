//! Vector Store - 인메모리 벡터 저장소 및 유사도 검색
//!
//! 코퍼스가 작다는 전제에서 전수 스캔(brute-force)으로 코사인 유사도를 계산합니다.
//! 삽입 순서를 그대로 유지하므로 동점일 때는 먼저 들어온 엔트리가 앞에 옵니다.

use serde::Serialize;

use crate::error::{RagError, Result};

use super::store::{ChunkId, DocumentId};

// ============================================================================
// Types
// ============================================================================

/// 문서 청크 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    /// 문서 내 청크 인덱스 (0-based)
    pub ordinal_index: usize,
    pub text: String,
}

/// 임베딩이 붙은 청크
///
/// 임베딩 파이프라인이 없는 폴백 모드에서는 `embedding`이 `None`입니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Option<Vec<f32>>,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            chunk,
            embedding: Some(embedding),
        }
    }

    /// 임베딩 없이 저장 (폴백 모드)
    pub fn without_embedding(chunk: Chunk) -> Self {
        Self {
            chunk,
            embedding: None,
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.embedding.as_ref().map(Vec::len)
    }
}

/// 검색 결과 (질의마다 생성, 저장하지 않음)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: EmbeddedChunk,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// VectorStore
// ============================================================================

/// 인메모리 벡터 저장소
///
/// 모든 임베딩은 같은 차원이어야 합니다. 차원은 첫 임베딩 삽입 시 고정되고
/// [`clear`](Self::clear) 전까지 유지됩니다.
#[derive(Debug, Default)]
pub struct VectorStore {
    entries: Vec<EmbeddedChunk>,
    dimension: Option<usize>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 엔트리 배치 삽입 (순서 유지)
    ///
    /// 검증은 배치 전체에 대해 먼저 수행하므로, 실패하면 아무것도 들어가지 않습니다.
    pub fn insert(&mut self, entries: Vec<EmbeddedChunk>) -> Result<usize> {
        let mut dimension = self.dimension;

        for entry in &entries {
            let Some(embedding) = entry.embedding.as_deref() else {
                continue;
            };
            match dimension {
                Some(expected) if expected != embedding.len() => {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                Some(_) => {}
                None => dimension = Some(embedding.len()),
            }
            if l2_norm(embedding) == 0.0 {
                return Err(RagError::ZeroVector);
            }
        }

        let count = entries.len();
        self.dimension = dimension;
        self.entries.extend(entries);

        tracing::debug!("Inserted {} entries (total={})", count, self.entries.len());
        Ok(count)
    }

    /// 문서에 속한 엔트리 전부 삭제
    pub fn remove_by_document(&mut self, document_id: DocumentId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.chunk.document_id != document_id);
        before - self.entries.len()
    }

    /// 전체 삭제 (차원도 초기화)
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dimension = None;
    }

    /// 상위 k개 검색
    ///
    /// 코사인 유사도 내림차순, 동점은 삽입 순서. 임베딩이 없는 엔트리는 제외합니다.
    pub fn top_k(&self, query_embedding: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        if let Some(expected) = self.dimension {
            if expected != query_embedding.len() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query_embedding.len(),
                });
            }
        }

        let mut scored = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if let Some(embedding) = entry.embedding.as_deref() {
                let score = cosine_similarity(query_embedding, embedding)?;
                scored.push(RetrievalResult {
                    chunk: entry.clone(),
                    score,
                });
            }
        }

        // sort_by는 안정 정렬 -> 동점은 삽입 순서 유지
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        Ok(scored)
    }

    /// 첫 번째 엔트리 (폴백 검색용)
    pub fn first(&self) -> Option<&EmbeddedChunk> {
        self.entries.first()
    }

    /// 전체 엔트리 (삽입 순서)
    pub fn entries(&self) -> &[EmbeddedChunk] {
        &self.entries
    }

    /// 고정된 임베딩 차원
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// 임베딩이 있는 엔트리 수
    pub fn embedded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.embedding.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// `dot(a, b) / (|a| * |b|)`, 결과는 -1.0 ~ 1.0 범위입니다.
///
/// # Errors
/// - 길이가 다르면 [`RagError::DimensionMismatch`]
/// - 어느 한쪽이 영벡터(또는 빈 벡터)면 [`RagError::ZeroVector`]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(RagError::ZeroVector);
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// L2 노름
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

// ============================================================================
// Tests
// ============================================================================
