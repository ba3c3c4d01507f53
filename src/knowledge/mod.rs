//! Knowledge 모듈 - 검색 파이프라인 코어
//!
//! - Chunker: 문장 단위 청킹 + 단어 기반 오버랩
//! - Vector: 인메모리 벡터 저장소 (전수 스캔 코사인 유사도)
//! - Store: 세션 문서 목록
//! - Context: 검색 결과 → 프롬프트 컨텍스트
//! - Retriever: 수집/질의 오케스트레이터 (단일 실행, 생성 타임아웃, 폴백 모드)

mod chunker;
mod context;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    Chunker, SentenceChunker, ChunkConfig,
    default_chunker, sentence_chunker,
};
pub use context::{ContextAssembler, ContextPassage, RetrievalContext};
pub use retriever::{Answer, IngestPhase, QueryPhase, RetrievalSession, Retriever};
pub use store::{
    ChunkId, Document, DocumentId, DocumentRegistry, NewDocument, SourceKind, StoreStats,
};
pub use vector::{
    Chunk, EmbeddedChunk, RetrievalResult, VectorStore,
    cosine_similarity, l2_norm,
};
