//! 에러 타입
//!
//! 검색 파이프라인(청킹 → 임베딩 → 저장 → 검색 → 생성)의 실패 종류를 정의합니다.
//! 외부 협력자(임베딩/생성 프로바이더)는 `anyhow::Result`를 반환하고,
//! 오케스트레이터가 이 타입으로 변환합니다.

use thiserror::Error;

use crate::knowledge::DocumentId;

/// RAG 코어 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 청킹 결과가 비어 있음 (최소 길이 필터로 모두 제거된 경우 포함)
    #[error("Document '{name}' produced no chunks")]
    EmptyDocument { name: String },

    /// 임베딩 차원이 세션 도중 바뀜
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 임베딩 프로바이더 호출 실패
    #[error("Embedding batch {batch} failed ({provider}): {message}")]
    EmbeddingBatchFailure {
        provider: String,
        batch: usize,
        message: String,
    },

    /// 임베딩 텐서가 `rows × D` 계약을 위반함
    #[error("Invalid embedding shape: {0}")]
    InvalidEmbeddingShape(String),

    /// 생성 시간 초과
    #[error("Generation timed out after {seconds}s")]
    GenerationTimeout { seconds: u64 },

    /// 생성 프로바이더 호출 실패
    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    /// 다른 요청이 이미 진행 중
    #[error("Another request is already in flight")]
    Busy,

    /// 저장된 문서 없이 질의
    #[error("No documents have been ingested")]
    EmptyStore,

    /// 영벡터에 대한 코사인 유사도 (정의되지 않음)
    #[error("Cosine similarity is undefined for a zero-norm vector")]
    ZeroVector,

    /// 존재하지 않는 문서
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// 설정 검증 실패
    #[error("Configuration error: {0}")]
    Config(String),
}

/// RAG 코어 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;
