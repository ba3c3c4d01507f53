//! rag-assistant - 로컬 RAG 어시스턴트
//!
//! 문장 단위 청킹 + 배치 임베딩 + 인메모리 벡터 검색으로 근거를 찾고,
//! OpenAI 호환 로컬 추론 서버로 짧은 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;

// Re-exports
pub use config::{get_api_key, get_data_dir, EmbedderKind, EndpointConfig, RagConfig};
pub use embedding::{
    create_embedder, BatchEmbedder, EmbedOptions, EmbeddingProvider, EmbeddingTensor,
    HashEmbedding, NoopProgress, OpenAiEmbedding, ProgressObserver,
};
pub use error::{RagError, Result};
pub use generation::{
    create_generator, ChatMessage, GenerationOptions, GenerationOutput, GenerationProvider,
    OpenAiChat,
};
pub use knowledge::{
    Answer, Chunk, ChunkConfig, Chunker, ContextAssembler, Document, DocumentId, EmbeddedChunk,
    NewDocument, RetrievalContext, RetrievalResult, RetrievalSession, Retriever, SentenceChunker,
    SourceKind, StoreStats, VectorStore, cosine_similarity, default_chunker,
};
