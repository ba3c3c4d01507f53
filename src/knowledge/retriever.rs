//! Retrieval Orchestrator - 문서 수집과 질의 응답 흐름
//!
//! 수집: `Idle → Chunking → Embedding → Stored | Failed`
//! 질의: `Idle → EmbeddingQuery → Ranking → AssemblingContext → AwaitingGeneration → Answered | Failed`
//!
//! 세션 상태(문서 목록 + 벡터 저장소 + 진행 플래그)는 호출자가 소유하는
//! [`RetrievalSession`]에 있고, [`Retriever`]는 협력자와 설정만 들고 있습니다.
//! 수집과 질의는 각각 한 번에 하나만 진행되며, 겹치는 요청은 대기 없이 `Busy`로 거절됩니다.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::embedding::{
    BatchEmbedder, EmbedOptions, EmbeddingProvider, ProgressObserver, SerialEmbedder,
};
use crate::error::{RagError, Result};
use crate::generation::{
    build_prompt, clean_answer, ChatMessage, GenerationOptions, GenerationProvider,
    NO_RESPONSE_TEXT,
};

use super::chunker::{sentence_chunker, Chunker};
use super::context::{ContextAssembler, RetrievalContext};
use super::store::{ChunkId, Document, DocumentId, DocumentRegistry, NewDocument, StoreStats};
use super::vector::{Chunk, EmbeddedChunk, RetrievalResult, VectorStore};

// ============================================================================
// Phases
// ============================================================================

/// 수집 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum IngestPhase {
    #[default]
    Idle,
    Chunking,
    Embedding,
    Stored,
    Failed,
}

/// 질의 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum QueryPhase {
    #[default]
    Idle,
    EmbeddingQuery,
    Ranking,
    AssemblingContext,
    AwaitingGeneration,
    Answered,
    Failed,
}

// ============================================================================
// RetrievalSession
// ============================================================================

#[derive(Debug, Default)]
struct SessionState {
    documents: DocumentRegistry,
    vectors: VectorStore,
}

/// 검색 세션 (문서 목록 + 벡터 저장소 + 진행 상태)
///
/// 호출자가 소유하고 [`Retriever`]의 모든 연산에 참조로 넘깁니다.
#[derive(Debug, Default)]
pub struct RetrievalSession {
    state: RwLock<SessionState>,
    query_in_flight: AtomicBool,
    ingest_in_flight: AtomicBool,
    query_phase: Mutex<QueryPhase>,
    ingest_phase: Mutex<IngestPhase>,
}

impl RetrievalSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 문서 목록 (추가된 순서)
    pub fn documents(&self) -> Vec<Document> {
        self.read().documents.documents().to_vec()
    }

    /// 표시 이름으로 문서 조회
    pub fn find_document(&self, name: &str) -> Option<Document> {
        self.read().documents.find_by_name(name).cloned()
    }

    /// 세션 통계
    pub fn stats(&self) -> StoreStats {
        let state = self.read();
        StoreStats {
            document_count: state.documents.len(),
            chunk_count: state.vectors.len(),
            embedded_count: state.vectors.embedded_count(),
            total_content_bytes: state.documents.total_content_bytes(),
            dimension: state.vectors.dimension(),
        }
    }

    /// 문서와 그 청크/벡터를 함께 삭제
    pub fn remove_document(&self, id: DocumentId) -> Result<Document> {
        let mut state = self.write();
        let document = state
            .documents
            .remove(id)
            .ok_or(RagError::DocumentNotFound(id))?;
        let removed = state.vectors.remove_by_document(id);

        info!(
            "Removed document: {} (id={}, chunks={})",
            document.display_name, id, removed
        );
        Ok(document)
    }

    /// 전체 삭제
    pub fn clear(&self) {
        let mut state = self.write();
        state.documents.clear();
        state.vectors.clear();
        info!("Cleared all documents");
    }

    pub fn query_phase(&self) -> QueryPhase {
        *self.query_phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ingest_phase(&self) -> IngestPhase {
        *self.ingest_phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_query_in_flight(&self) -> bool {
        self.query_in_flight.load(Ordering::Acquire)
    }

    /// 저장된 청크가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.read().vectors.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.read().vectors.len()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.read().vectors.dimension()
    }
}

// ============================================================================
// InFlight Guard
// ============================================================================

/// 단일 실행 가드
///
/// 획득 시 플래그를 세우고, drop 시 단계를 `Idle`로 되돌린 뒤 플래그를 내립니다.
struct InFlight<'a, P: Copy + Default> {
    flag: &'a AtomicBool,
    phase: &'a Mutex<P>,
}

impl<'a, P: Copy + Default + fmt::Debug> InFlight<'a, P> {
    fn acquire(flag: &'a AtomicBool, phase: &'a Mutex<P>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RagError::Busy)?;
        Ok(Self { flag, phase })
    }

    fn enter(&self, next: P) {
        debug!("Phase -> {:?}", next);
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl<P: Copy + Default> Drop for InFlight<'_, P> {
    fn drop(&mut self) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = P::default();
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// Answer
// ============================================================================

/// 질의 응답 결과
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// 후처리된 답변
    pub text: String,
    /// 출처 문서 이름 (중복 제거)
    pub sources: Vec<String>,
    /// 근거로 쓰인 검색 결과
    pub results: Vec<RetrievalResult>,
    pub context: RetrievalContext,
}

impl Answer {
    /// 실패를 답변 자리에 표시할 때 사용
    pub fn from_error(error: &RagError) -> Self {
        Self {
            text: format!("Error: {}", error),
            sources: vec![],
            results: vec![],
            context: RetrievalContext::default(),
        }
    }

    /// `From: a.txt, b.md`
    pub fn source_hint(&self) -> Option<String> {
        if self.sources.is_empty() {
            None
        } else {
            Some(format!("From: {}", self.sources.join(", ")))
        }
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색 오케스트레이터
///
/// 임베딩 프로바이더가 없으면 폴백 모드로 동작합니다
/// (임베딩 없이 저장, 질의 시 첫 번째 청크를 점수 0으로 반환).
pub struct Retriever {
    config: RagConfig,
    chunker: Box<dyn Chunker>,
    assembler: ContextAssembler,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    generate_gate: Arc<tokio::sync::Mutex<()>>,
}

impl Retriever {
    /// 설정을 검증하고 생성 (협력자는 builder로 연결)
    pub fn new(config: RagConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chunker: sentence_chunker(config.chunk.clone()),
            assembler: ContextAssembler::new(config.context_char_budget),
            config,
            embedder: None,
            generator: None,
            generate_gate: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// 임베딩 프로바이더 연결 (호출은 직렬화됨)
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(Arc::new(SerialEmbedder::new(embedder)));
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// 폴백 모드 여부
    pub fn is_fallback(&self) -> bool {
        self.embedder.is_none()
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// 문서 수집 (청킹 → 임베딩 → 저장)
    ///
    /// 실패하면 저장소에는 아무것도 들어가지 않으며 기존 문서는 그대로 남습니다.
    ///
    /// # Errors
    /// - [`RagError::Busy`]: 다른 수집이 진행 중
    /// - [`RagError::EmptyDocument`]: 청크가 하나도 나오지 않음
    /// - [`RagError::EmbeddingBatchFailure`], [`RagError::DimensionMismatch`]
    pub async fn ingest(
        &self,
        session: &RetrievalSession,
        document: NewDocument,
        observer: &dyn ProgressObserver,
    ) -> Result<DocumentId> {
        let guard = InFlight::acquire(&session.ingest_in_flight, &session.ingest_phase)?;
        let name = document.display_name.clone();

        match self.run_ingest(session, document, observer, &guard).await {
            Ok(id) => {
                guard.enter(IngestPhase::Stored);
                Ok(id)
            }
            Err(e) => {
                guard.enter(IngestPhase::Failed);
                error!(document = %name, error = %e, "ingestion failed");
                Err(e)
            }
        }
    }

    async fn run_ingest(
        &self,
        session: &RetrievalSession,
        document: NewDocument,
        observer: &dyn ProgressObserver,
        guard: &InFlight<'_, IngestPhase>,
    ) -> Result<DocumentId> {
        guard.enter(IngestPhase::Chunking);
        let texts = self.chunker.chunk(&document.raw_text);
        if texts.is_empty() {
            return Err(RagError::EmptyDocument {
                name: document.display_name,
            });
        }

        let document_id = DocumentId::new();
        let chunks: Vec<Chunk> = texts
            .into_iter()
            .enumerate()
            .map(|(ordinal_index, text)| Chunk {
                id: ChunkId::new(),
                document_id,
                ordinal_index,
                text,
            })
            .collect();
        debug!(
            "Chunked '{}' into {} chunks ({})",
            document.display_name,
            chunks.len(),
            self.chunker.name()
        );

        guard.enter(IngestPhase::Embedding);
        let entries = match &self.embedder {
            Some(embedder) => {
                let expected_dimension = session.read().vectors.dimension();
                BatchEmbedder::new(embedder.as_ref(), self.config.embedding_batch_size)
                    .embed_all(&chunks, expected_dimension, observer)
                    .await?
            }
            None => {
                warn!("No embedding provider, storing chunks without embeddings");
                chunks
                    .iter()
                    .cloned()
                    .map(EmbeddedChunk::without_embedding)
                    .collect()
            }
        };

        let chunk_ids = chunks.iter().map(|c| c.id).collect();
        let count = entries.len();
        {
            let mut state = session.write();
            state.vectors.insert(entries)?;
            state.documents.insert(Document {
                id: document_id,
                display_name: document.display_name.clone(),
                source_kind: document.source_kind,
                raw_text: document.raw_text,
                chunk_ids,
                created_at: Utc::now(),
            });
        }

        info!(
            "Added document: {} (id={}, chunks={})",
            document.display_name, document_id, count
        );
        Ok(document_id)
    }

    // ------------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------------

    /// 검색만 수행 (생성 없음)
    ///
    /// # Errors
    /// - [`RagError::Busy`]: 다른 질의가 진행 중
    /// - [`RagError::EmptyStore`]: 저장된 청크 없음
    pub async fn retrieve(
        &self,
        session: &RetrievalSession,
        question: &str,
    ) -> Result<Vec<RetrievalResult>> {
        let guard = InFlight::acquire(&session.query_in_flight, &session.query_phase)?;

        let result = self.rank(session, question, &guard).await;
        if let Err(e) = &result {
            guard.enter(QueryPhase::Failed);
            error!(error = %e, "retrieval failed");
        }
        result
    }

    /// 검색 + 답변 생성
    ///
    /// 생성은 별도 태스크에서 실행되고 `generation_timeout`과 경쟁합니다.
    /// 시간이 먼저 끝나면 태스크를 중단하고 [`RagError::GenerationTimeout`]을 돌려줍니다.
    /// 성공/실패와 관계없이 세션은 `Idle`로 돌아갑니다.
    pub async fn answer(&self, session: &RetrievalSession, question: &str) -> Result<Answer> {
        let Some(generator) = self.generator.clone() else {
            return Err(RagError::GenerationFailure(
                "no generation provider configured".into(),
            ));
        };
        let guard = InFlight::acquire(&session.query_in_flight, &session.query_phase)?;

        match self.run_answer(session, question, generator, &guard).await {
            Ok(answer) => {
                guard.enter(QueryPhase::Answered);
                info!(
                    "Answered with {} chunks from {:?}",
                    answer.results.len(),
                    answer.sources
                );
                Ok(answer)
            }
            Err(e) => {
                guard.enter(QueryPhase::Failed);
                error!(error = %e, "query failed");
                Err(e)
            }
        }
    }

    async fn run_answer(
        &self,
        session: &RetrievalSession,
        question: &str,
        generator: Arc<dyn GenerationProvider>,
        guard: &InFlight<'_, QueryPhase>,
    ) -> Result<Answer> {
        let results = self.rank(session, question, guard).await?;

        guard.enter(QueryPhase::AssemblingContext);
        let context = self.assembler.assemble(&results, &session.read().documents);

        guard.enter(QueryPhase::AwaitingGeneration);
        let raw = self
            .generate(generator, build_prompt(&context.text, question))
            .await?;

        let mut text = clean_answer(&raw, self.config.first_line_only);
        if text.is_empty() {
            text = NO_RESPONSE_TEXT.to_string();
        }

        Ok(Answer {
            text,
            sources: context.sources.clone(),
            results,
            context,
        })
    }

    /// 질의 임베딩 → 상위 k개
    async fn rank(
        &self,
        session: &RetrievalSession,
        question: &str,
        guard: &InFlight<'_, QueryPhase>,
    ) -> Result<Vec<RetrievalResult>> {
        if session.is_empty() {
            return Err(RagError::EmptyStore);
        }

        let embedder = match &self.embedder {
            Some(embedder) if session.read().vectors.embedded_count() > 0 => embedder,
            _ => return Self::fallback(session),
        };

        guard.enter(QueryPhase::EmbeddingQuery);
        let query_embedding = embedder
            .embed(question, &EmbedOptions::default())
            .await
            .map_err(|e| RagError::EmbeddingBatchFailure {
                provider: embedder.name().to_string(),
                batch: 0,
                message: format!("{e:#}"),
            })?;

        guard.enter(QueryPhase::Ranking);
        let results = session
            .read()
            .vectors
            .top_k(&query_embedding, self.config.top_k)?;

        debug!("Retrieved {} chunks", results.len());
        Ok(results)
    }

    /// 폴백: 첫 번째 청크를 점수 0으로
    fn fallback(session: &RetrievalSession) -> Result<Vec<RetrievalResult>> {
        let first = session
            .read()
            .vectors
            .first()
            .cloned()
            .ok_or(RagError::EmptyStore)?;

        warn!("No embeddings available, using the first stored chunk");
        Ok(vec![RetrievalResult {
            chunk: first,
            score: 0.0,
        }])
    }

    /// 생성 호출을 타임아웃과 경쟁
    async fn generate(
        &self,
        generator: Arc<dyn GenerationProvider>,
        messages: Vec<ChatMessage>,
    ) -> Result<String> {
        let options = GenerationOptions::from(&self.config);
        let gate = Arc::clone(&self.generate_gate);

        let mut handle = tokio::spawn(async move {
            let _permit = gate.lock_owned().await;
            generator.generate(&messages, &options).await
        });

        match tokio::time::timeout(self.config.generation_timeout(), &mut handle).await {
            Ok(Ok(Ok(output))) => output.into_text(),
            Ok(Ok(Err(e))) => Err(RagError::GenerationFailure(format!("{e:#}"))),
            Ok(Err(join_error)) => Err(RagError::GenerationFailure(join_error.to_string())),
            Err(_) => {
                handle.abort();
                Err(RagError::GenerationTimeout {
                    seconds: self.config.generation_timeout_secs,
                })
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::bail;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::EmbedderKind;
    use crate::embedding::{EmbeddingTensor, HashEmbedding, NoopProgress};
    use crate::generation::GenerationOutput;
    use crate::knowledge::{ChunkConfig, SourceKind};

    const HARE: &str = "The hare bragged about his speed to everyone. He took a long nap under a shady tree.";
    const TORTOISE: &str = "The tortoise walked slowly and steadily. The tortoise crossed the finish line first.";

    // ------------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------------

    /// 고정 문자열을 돌려주는 생성기
    struct FixedGenerator(&'static str);

    #[async_trait]
    impl GenerationProvider for FixedGenerator {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> anyhow::Result<GenerationOutput> {
            Ok(GenerationOutput::Text(self.0.to_string()))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// 받은 프롬프트를 assistant 메시지로 되돌려주는 생성기
    struct EchoGenerator;

    #[async_trait]
    impl GenerationProvider for EchoGenerator {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> anyhow::Result<GenerationOutput> {
            let mut conversation = messages.to_vec();
            conversation.push(ChatMessage::assistant(messages[0].content.clone()));
            Ok(GenerationOutput::Messages(conversation))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// `release`가 울릴 때까지 대기하는 생성기
    #[derive(Default)]
    struct GatedGenerator {
        release: Notify,
    }

    #[async_trait]
    impl GenerationProvider for GatedGenerator {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> anyhow::Result<GenerationOutput> {
            self.release.notified().await;
            Ok(GenerationOutput::Text("The tortoise won.".into()))
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    /// 타임아웃보다 오래 걸리는 생성기
    struct SlowGenerator;

    #[async_trait]
    impl GenerationProvider for SlowGenerator {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> anyhow::Result<GenerationOutput> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(GenerationOutput::Text("too late".into()))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl GenerationProvider for FailingGenerator {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> anyhow::Result<GenerationOutput> {
            bail!("server unreachable")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed_batch(
            &self,
            _texts: &[String],
            _options: &EmbedOptions,
        ) -> anyhow::Result<EmbeddingTensor> {
            bail!("model not loaded")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// `release`가 울릴 때까지 대기한 뒤 해시 임베딩을 돌려주는 임베더
    #[derive(Default)]
    struct GatedEmbedder {
        release: Notify,
        inner: HashEmbedding,
    }

    #[async_trait]
    impl EmbeddingProvider for GatedEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
            options: &EmbedOptions,
        ) -> anyhow::Result<EmbeddingTensor> {
            self.release.notified().await;
            self.inner.embed_batch(texts, options).await
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn base_retriever() -> Retriever {
        Retriever::new(RagConfig {
            embedder: EmbedderKind::None,
            ..Default::default()
        })
        .expect("valid config")
    }

    fn hash_retriever() -> Retriever {
        base_retriever().with_embedder(Arc::new(HashEmbedding::with_defaults()))
    }

    fn doc(name: &str, text: &str) -> NewDocument {
        NewDocument::new(name, SourceKind::File, text)
    }

    async fn ingest_fable(retriever: &Retriever, session: &RetrievalSession) -> (DocumentId, DocumentId) {
        let hare = retriever
            .ingest(session, doc("hare.txt", HARE), &NoopProgress)
            .await
            .expect("ingest hare");
        let tortoise = retriever
            .ingest(session, doc("tortoise.txt", TORTOISE), &NoopProgress)
            .await
            .expect("ingest tortoise");
        (hare, tortoise)
    }

    async fn wait_for_query_phase(session: &RetrievalSession, phase: QueryPhase) {
        for _ in 0..1000 {
            if session.query_phase() == phase {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("query phase {:?} never reached", phase);
    }

    async fn wait_for_ingest_phase(session: &RetrievalSession, phase: IngestPhase) {
        for _ in 0..1000 {
            if session.ingest_phase() == phase {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("ingest phase {:?} never reached", phase);
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    #[test]
    fn test_invalid_config_rejected() {
        let config = RagConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(matches!(Retriever::new(config), Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn test_short_document_is_empty() {
        let retriever = hash_retriever();
        let session = RetrievalSession::new();

        let result = retriever
            .ingest(&session, doc("short.txt", "One. Two. Three."), &NoopProgress)
            .await;

        assert!(matches!(result, Err(RagError::EmptyDocument { ref name }) if name == "short.txt"));
        assert!(session.documents().is_empty());
        assert!(session.is_empty());
        assert_eq!(session.ingest_phase(), IngestPhase::Idle);
    }

    #[tokio::test]
    async fn test_ingest_records_document_and_chunks() {
        let retriever = hash_retriever().with_chunker(sentence_chunker(ChunkConfig::new(50, 10)));
        let session = RetrievalSession::new();

        let id = retriever
            .ingest(&session, doc("fable.txt", TORTOISE), &NoopProgress)
            .await
            .expect("ingest");

        let documents = session.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, id);
        assert_eq!(documents[0].chunk_ids.len(), 2);

        let stats = session.stats();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.embedded_count, 2);
        assert_eq!(stats.dimension, Some(256));
        assert_eq!(stats.total_content_bytes, TORTOISE.len());
        assert_eq!(session.ingest_phase(), IngestPhase::Idle);
    }

    #[tokio::test]
    async fn test_ingest_reports_progress() {
        let retriever = hash_retriever().with_chunker(sentence_chunker(ChunkConfig::new(30, 0)));
        let session = RetrievalSession::new();
        let progress = Mutex::new(Vec::new());
        let observer = |processed: usize, total: usize| {
            progress.lock().expect("lock").push((processed, total));
        };

        let text = "The first sentence is long enough. The second sentence is long enough. \
                    The third sentence is long enough. The fourth sentence is long enough. \
                    The fifth sentence is long enough.";
        retriever
            .ingest(&session, doc("five.txt", text), &observer)
            .await
            .expect("ingest");

        assert_eq!(session.chunk_count(), 5);
        assert_eq!(*progress.lock().expect("lock"), vec![(4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_failed_ingest_keeps_existing_documents() {
        let session = RetrievalSession::new();
        ingest_fable(&hash_retriever(), &session).await;
        let before = session.stats();

        let broken = base_retriever().with_embedder(Arc::new(FailingEmbedder));
        let result = broken
            .ingest(&session, doc("new.txt", HARE), &NoopProgress)
            .await;
        assert!(matches!(result, Err(RagError::EmbeddingBatchFailure { .. })));

        let other_dimension =
            base_retriever().with_embedder(Arc::new(HashEmbedding::new(8).expect("dimension")));
        let result = other_dimension
            .ingest(&session, doc("new.txt", HARE), &NoopProgress)
            .await;
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch {
                expected: 256,
                actual: 8
            })
        ));

        let after = session.stats();
        assert_eq!(after.document_count, before.document_count);
        assert_eq!(after.chunk_count, before.chunk_count);
        assert!(session.find_document("new.txt").is_none());
        assert_eq!(session.ingest_phase(), IngestPhase::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_ingest_is_busy() {
        let gated = Arc::new(GatedEmbedder::default());
        let retriever = base_retriever().with_embedder(gated.clone());
        let session = RetrievalSession::new();

        let first = retriever.ingest(&session, doc("hare.txt", HARE), &NoopProgress);
        let second = async {
            wait_for_ingest_phase(&session, IngestPhase::Embedding).await;
            let busy = retriever
                .ingest(&session, doc("tortoise.txt", TORTOISE), &NoopProgress)
                .await;
            gated.release.notify_one();
            busy
        };

        let (stored, busy) = tokio::join!(first, second);
        assert!(stored.is_ok());
        assert!(matches!(busy, Err(RagError::Busy)));
        assert_eq!(session.documents().len(), 1);
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_remove_document_cascades() {
        let retriever = hash_retriever();
        let session = RetrievalSession::new();
        let (hare, tortoise) = ingest_fable(&retriever, &session).await;

        let removed = session.remove_document(hare).expect("remove");
        assert_eq!(removed.display_name, "hare.txt");
        assert_eq!(session.documents().len(), 1);
        assert_eq!(session.chunk_count(), 1);

        let results = retriever.retrieve(&session, "hare nap").await.expect("retrieve");
        assert!(results.iter().all(|r| r.chunk.chunk.document_id == tortoise));

        assert!(matches!(
            session.remove_document(hare),
            Err(RagError::DocumentNotFound(id)) if id == hare
        ));
    }

    #[tokio::test]
    async fn test_clear_resets_session() {
        let retriever = hash_retriever();
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        session.clear();
        assert!(session.is_empty());
        assert!(session.documents().is_empty());
        assert_eq!(session.dimension(), None);
        assert!(matches!(
            retriever.retrieve(&session, "tortoise").await,
            Err(RagError::EmptyStore)
        ));
    }

    // ------------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_retrieve_empty_store() {
        let retriever = hash_retriever();
        let session = RetrievalSession::new();
        let result = retriever.retrieve(&session, "anything").await;
        assert!(matches!(result, Err(RagError::EmptyStore)));
        assert_eq!(session.query_phase(), QueryPhase::Idle);
        assert!(!session.is_query_in_flight());
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_similarity() {
        let retriever = hash_retriever();
        let session = RetrievalSession::new();
        let (_, tortoise) = ingest_fable(&retriever, &session).await;

        let results = retriever
            .retrieve(&session, "tortoise finish line")
            .await
            .expect("retrieve");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.chunk.document_id, tortoise);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_fallback_returns_first_chunk() {
        let retriever = base_retriever();
        assert!(retriever.is_fallback());
        let session = RetrievalSession::new();
        let (hare, _) = ingest_fable(&retriever, &session).await;

        let stats = session.stats();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.embedded_count, 0);

        for question in ["tortoise finish line", "completely unrelated"] {
            let results = retriever.retrieve(&session, question).await.expect("retrieve");
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].chunk.chunk.document_id, hare);
            assert_eq!(results[0].chunk.chunk.ordinal_index, 0);
            assert_eq!(results[0].score, 0.0);
            assert!(results[0].chunk.embedding.is_none());
        }
    }

    // ------------------------------------------------------------------------
    // Answering
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_answer_without_generator() {
        let retriever = hash_retriever();
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        let result = retriever.answer(&session, "Who won?").await;
        assert!(matches!(result, Err(RagError::GenerationFailure(_))));
    }

    #[tokio::test]
    async fn test_answer_post_processing_and_sources() {
        let retriever =
            hash_retriever().with_generator(Arc::new(FixedGenerator("<|assistant|>The tortoise won.\n\n\nThe hare slept.")));
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        let answer = retriever
            .answer(&session, "tortoise finish line")
            .await
            .expect("answer");

        assert_eq!(answer.text, "The tortoise won.");
        assert_eq!(answer.sources, vec!["tortoise.txt", "hare.txt"]);
        assert_eq!(
            answer.source_hint().as_deref(),
            Some("From: tortoise.txt, hare.txt")
        );
        assert_eq!(answer.results.len(), 2);
        assert_eq!(session.query_phase(), QueryPhase::Idle);
    }

    #[tokio::test]
    async fn test_answer_prompt_contains_context() {
        let config = RagConfig {
            embedder: EmbedderKind::None,
            first_line_only: false,
            top_k: 1,
            ..Default::default()
        };
        let retriever = Retriever::new(config)
            .expect("valid config")
            .with_embedder(Arc::new(HashEmbedding::with_defaults()))
            .with_generator(Arc::new(EchoGenerator));
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        let answer = retriever
            .answer(&session, "tortoise finish line")
            .await
            .expect("answer");

        assert_eq!(
            answer.text,
            format!("{}\nAnswer briefly: tortoise finish line", TORTOISE)
        );
        assert_eq!(answer.context.text, TORTOISE);
    }

    #[tokio::test]
    async fn test_empty_answer_uses_fallback_text() {
        let retriever = hash_retriever().with_generator(Arc::new(FixedGenerator("<|im_end|>\n\n")));
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        let answer = retriever.answer(&session, "Who won?").await.expect("answer");
        assert_eq!(answer.text, NO_RESPONSE_TEXT);
    }

    #[tokio::test]
    async fn test_generation_failure_returns_to_idle() {
        let retriever = hash_retriever().with_generator(Arc::new(FailingGenerator));
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        let error = match retriever.answer(&session, "Who won?").await {
            Err(e) => e,
            Ok(answer) => panic!("unexpected answer: {}", answer.text),
        };
        assert!(matches!(error, RagError::GenerationFailure(ref m) if m.contains("server unreachable")));
        assert!(Answer::from_error(&error).text.starts_with("Error: Generation failed"));

        assert_eq!(session.query_phase(), QueryPhase::Idle);
        assert!(!session.is_query_in_flight());
        assert!(retriever.retrieve(&session, "tortoise").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_query_is_busy() {
        let gated = Arc::new(GatedGenerator::default());
        let retriever = hash_retriever().with_generator(gated.clone());
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        let first = retriever.answer(&session, "Who won the race?");
        let second = async {
            wait_for_query_phase(&session, QueryPhase::AwaitingGeneration).await;
            let busy = retriever.answer(&session, "Who slept?").await;
            let phase = session.query_phase();
            gated.release.notify_one();
            (busy, phase)
        };

        let (answer, (busy, phase_during)) = tokio::join!(first, second);
        assert!(matches!(busy, Err(RagError::Busy)));
        assert_eq!(phase_during, QueryPhase::AwaitingGeneration);
        assert_eq!(answer.expect("first query").text, "The tortoise won.");
        assert_eq!(session.query_phase(), QueryPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_releases_guard() {
        let retriever = hash_retriever().with_generator(Arc::new(SlowGenerator));
        let session = RetrievalSession::new();
        ingest_fable(&retriever, &session).await;

        let result = retriever.answer(&session, "Who won?").await;
        assert!(matches!(
            result,
            Err(RagError::GenerationTimeout { seconds: 60 })
        ));
        assert_eq!(session.query_phase(), QueryPhase::Idle);
        assert!(!session.is_query_in_flight());

        assert!(retriever.retrieve(&session, "hare").await.is_ok());
    }
}
