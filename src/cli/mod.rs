//! CLI 모듈
//!
//! rag-assistant CLI 명령어 정의 및 구현

mod chat;
mod demo;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::collector::{CollectionStats, CollectorConfig, FileCollector};
use crate::config::{get_data_dir, EmbedderKind, RagConfig};
use crate::embedding::{create_embedder, ProgressObserver};
use crate::error::RagError;
use crate::extractor::extract_document;
use crate::generation::create_generator;
use crate::knowledge::{
    sentence_chunker, Answer, NewDocument, RetrievalSession, Retriever,
};

use chat::{ChatCommand, HELP};
use demo::demo_document;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "rag-assistant")]
#[command(version, about = "로컬 RAG 어시스턴트", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: <data_dir>/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 임베딩 백엔드 (hash, openai, none)
    #[arg(long, global = true)]
    pub embedder: Option<EmbedderKind>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 문서 입력 옵션
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// 수집할 파일 경로 (여러 번 지정 가능)
    #[arg(short, long)]
    pub file: Vec<PathBuf>,

    /// 수집할 폴더 경로 (재귀, .gitignore 존중)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// 직접 입력할 텍스트
    #[arg(short, long)]
    pub text: Option<String>,

    /// 데모 문서 추가
    #[arg(long)]
    pub demo: bool,

    /// PDF 파일 건너뛰기
    #[arg(long)]
    pub skip_pdfs: bool,
}

impl SourceArgs {
    fn is_empty(&self) -> bool {
        self.file.is_empty() && self.dir.is_none() && self.text.is_none() && !self.demo
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 청킹 결과 확인
    Chunk {
        /// 청킹할 파일
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 청킹할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 청크 크기 (문자 수)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// 오버랩 크기
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// 관련 청크 검색 (생성 없음)
    Query {
        /// 검색 쿼리
        question: String,

        #[command(flatten)]
        sources: SourceArgs,

        /// 결과 개수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 문서를 근거로 질문에 답변
    Ask {
        /// 질문
        question: String,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// 대화형 모드
    Chat {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.config {
        Some(ref path) => RagConfig::load_from(path)?,
        None => RagConfig::load()?,
    };
    if let Some(kind) = cli.embedder {
        config.embedder = kind;
    }

    match cli.command {
        Commands::Chunk {
            file,
            text,
            chunk_size,
            overlap,
        } => cmd_chunk(config, file, text, chunk_size, overlap).await,
        Commands::Query {
            question,
            sources,
            top_k,
        } => {
            if let Some(k) = top_k {
                config.top_k = k;
            }
            cmd_query(config, &question, &sources).await
        }
        Commands::Ask { question, sources } => cmd_ask(config, &question, &sources).await,
        Commands::Chat { sources } => cmd_chat(config, &sources).await,
        Commands::Status => cmd_status(&config, cli.config.as_deref()),
    }
}

// ============================================================================
// Assistant
// ============================================================================

/// 콘솔 진행률 표시
struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_progress(&self, processed: usize, total: usize) {
        print!("\r    Embedding {}/{} chunks...", processed, total);
        if processed == total {
            println!();
        }
        let _ = std::io::stdout().flush();
    }
}

/// 검색기 + 세션
struct Assistant {
    retriever: Retriever,
    session: RetrievalSession,
}

impl Assistant {
    fn new(config: RagConfig, with_generator: bool) -> Result<Self> {
        let mut retriever = Retriever::new(config.clone())?;

        if let Some(embedder) = create_embedder(&config).context("임베딩 프로바이더 초기화 실패")? {
            retriever = retriever.with_embedder(embedder);
        }
        if with_generator {
            let generator = create_generator(&config).context("생성 프로바이더 초기화 실패")?;
            retriever = retriever.with_generator(generator);
        }

        Ok(Self {
            retriever,
            session: RetrievalSession::new(),
        })
    }

    /// 문서 하나 수집 (실패는 출력만 하고 계속)
    async fn add(&self, document: NewDocument) -> bool {
        println!(
            "[*] [{}] {} 추가 중...",
            document.source_kind.tag(),
            document.display_name
        );

        match self
            .retriever
            .ingest(&self.session, document, &ConsoleProgress)
            .await
        {
            Ok(id) => {
                let chunks = self
                    .session
                    .documents()
                    .iter()
                    .find(|d| d.id == id)
                    .map(|d| d.chunk_ids.len())
                    .unwrap_or(0);
                println!("[OK] {} 청크 저장됨", chunks);
                true
            }
            Err(e) => {
                println!("[!] 추가 실패: {}", e);
                false
            }
        }
    }

    /// 파일 또는 폴더 수집
    async fn add_path(&self, path: &Path, skip_pdfs: bool) -> Result<usize> {
        let collector = FileCollector::new(CollectorConfig {
            skip_pdfs,
            ..Default::default()
        });

        let files = if path.is_dir() {
            collector.collect_directory(path)?
        } else {
            match collector.collect_file(path)? {
                Some(file) => vec![file],
                None => {
                    println!("[!] 지원하지 않는 파일 형식: {:?}", path);
                    return Ok(0);
                }
            }
        };

        if files.len() > 1 {
            let stats = CollectionStats::from_files(&files);
            println!(
                "[*] 수집 대상: {} 파일 (텍스트: {}, PDF: {}, 총 {})",
                stats.total_files,
                stats.text_files,
                stats.pdf_files,
                format_bytes(stats.total_size as usize)
            );
        }

        let mut added = 0;
        for file in &files {
            match extract_document(file).await {
                Ok(Some(document)) => {
                    if self.add(document).await {
                        added += 1;
                    }
                }
                Ok(None) => println!("[!] 텍스트가 없습니다: {}", file.display_name()),
                Err(e) => println!("[!] 추출 실패: {}: {:#}", file.display_name(), e),
            }
        }

        Ok(added)
    }

    /// 명령줄 입력 수집
    async fn load_sources(&self, sources: &SourceArgs) -> Result<usize> {
        let mut added = 0;

        if sources.demo && self.add(demo_document()).await {
            added += 1;
        }
        if let Some(ref text) = sources.text {
            if self.add(NewDocument::from_clipboard(text.clone())).await {
                added += 1;
            }
        }
        for path in &sources.file {
            added += self.add_path(path, sources.skip_pdfs).await?;
        }
        if let Some(ref dir) = sources.dir {
            added += self.add_path(dir, sources.skip_pdfs).await?;
        }

        Ok(added)
    }

    fn print_documents(&self) {
        let documents = self.session.documents();
        if documents.is_empty() {
            println!("[!] 저장된 문서가 없습니다.");
            return;
        }

        let stats = self.session.stats();
        println!(
            "[OK] 문서 {} 건, 청크 {} 개 ({})",
            stats.document_count,
            stats.chunk_count,
            format_bytes(stats.total_content_bytes)
        );
        for document in documents {
            println!(
                "  [{}] {} - {} 청크, {}",
                document.source_kind.tag(),
                truncate_text(&document.display_name, 40),
                document.chunk_ids.len(),
                document.created_at.format("%H:%M:%S")
            );
        }
    }

    fn print_answer(&self, answer: &Answer) {
        println!("\n{}", answer.text);
        if let Some(hint) = answer.source_hint() {
            println!("    {}", hint);
        }
        println!();
    }
}

/// 입력 없는 질의 명령어 방지
fn require_sources(sources: &SourceArgs) -> Result<()> {
    if sources.is_empty() {
        bail!("--file, --dir, --text, --demo 중 하나 이상을 지정해야 합니다");
    }
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 청킹 명령어 (chunk)
async fn cmd_chunk(
    config: RagConfig,
    file: Option<PathBuf>,
    text: Option<String>,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    let text = match (file, text) {
        (Some(path), _) => {
            let collected = FileCollector::with_defaults()
                .collect_file(&path)?
                .ok_or_else(|| anyhow::anyhow!("지원하지 않는 파일 형식: {:?}", path))?;
            match extract_document(&collected).await? {
                Some(document) => document.raw_text,
                None => bail!("텍스트가 없습니다: {:?}", path),
            }
        }
        (None, Some(text)) => text,
        (None, None) => bail!("--file 또는 --text를 지정해야 합니다"),
    };

    let mut chunk_config = config.chunk;
    if let Some(size) = chunk_size {
        chunk_config.chunk_size = size;
    }
    if let Some(overlap) = overlap {
        chunk_config.overlap = overlap;
    }

    let chunks = sentence_chunker(chunk_config.clone()).chunk(&text);
    if chunks.is_empty() {
        println!(
            "[!] 청크가 없습니다 (모든 조각이 {}자 이하)",
            chunk_config.min_chunk_chars
        );
        return Ok(());
    }

    println!(
        "[OK] {} 청크 (size={}, overlap={})\n",
        chunks.len(),
        chunk_config.chunk_size,
        chunk_config.overlap
    );
    for (i, chunk) in chunks.iter().enumerate() {
        println!("{}. ({}자) {}", i + 1, chunk.chars().count(), truncate_text(chunk, 200));
    }

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(config: RagConfig, question: &str, sources: &SourceArgs) -> Result<()> {
    require_sources(sources)?;

    let assistant = Assistant::new(config, false)?;
    if assistant.load_sources(sources).await? == 0 {
        bail!("추가된 문서가 없습니다");
    }

    println!("\n[*] 검색 중: \"{}\"", question);
    let results = assistant
        .retriever
        .retrieve(&assistant.session, question)
        .await
        .context("검색 실패")?;

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    let documents = assistant.session.documents();
    for (i, result) in results.iter().enumerate() {
        let chunk = &result.chunk.chunk;
        let name = documents
            .iter()
            .find(|d| d.id == chunk.document_id)
            .map(|d| d.display_name.as_str())
            .unwrap_or("unknown");

        println!(
            "{}. [점수: {:.4}] {} #{}",
            i + 1,
            result.score,
            name,
            chunk.ordinal_index
        );
        println!("   내용: {}", truncate_text(&chunk.text, 200));
        println!();
    }

    Ok(())
}

/// 답변 명령어 (ask)
async fn cmd_ask(config: RagConfig, question: &str, sources: &SourceArgs) -> Result<()> {
    require_sources(sources)?;

    let assistant = Assistant::new(config, true)?;
    if assistant.load_sources(sources).await? == 0 {
        bail!("추가된 문서가 없습니다");
    }

    println!("\n[*] 답변 생성 중...");
    let answer = assistant
        .retriever
        .answer(&assistant.session, question)
        .await
        .context("답변 생성 실패")?;

    assistant.print_answer(&answer);
    Ok(())
}

/// 대화형 명령어 (chat)
async fn cmd_chat(config: RagConfig, sources: &SourceArgs) -> Result<()> {
    let assistant = Assistant::new(config, true)?;
    assistant.load_sources(sources).await?;

    if assistant.retriever.is_fallback() {
        println!("[!] 임베딩 없이 실행 중입니다. 질문과 관계없이 첫 번째 청크를 사용합니다.");
    }
    println!("rag-assistant 대화형 모드 (/help, /quit)\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };

        match ChatCommand::parse(&line) {
            ChatCommand::Empty => {}
            ChatCommand::Quit => break,
            ChatCommand::Help => println!("{}", HELP),
            ChatCommand::Invalid(usage) => println!("[!] {}", usage),
            ChatCommand::Demo => {
                assistant.add(demo_document()).await;
            }
            ChatCommand::Paste(text) => {
                assistant.add(NewDocument::from_clipboard(text)).await;
            }
            ChatCommand::Add(path) => {
                if let Err(e) = assistant.add_path(&path, false).await {
                    println!("[!] {:#}", e);
                }
            }
            ChatCommand::Docs => assistant.print_documents(),
            ChatCommand::Remove(name) => match assistant.session.find_document(&name) {
                Some(document) => match assistant.session.remove_document(document.id) {
                    Ok(removed) => println!("[OK] 삭제됨: {}", removed.display_name),
                    Err(e) => println!("[!] {}", e),
                },
                None => println!("[!] 문서를 찾을 수 없습니다: {}", name),
            },
            ChatCommand::Clear => {
                assistant.session.clear();
                println!("[OK] 모든 문서를 삭제했습니다");
            }
            ChatCommand::Ask(question) => {
                match assistant
                    .retriever
                    .answer(&assistant.session, &question)
                    .await
                {
                    Ok(answer) => assistant.print_answer(&answer),
                    Err(RagError::EmptyStore) => {
                        println!("[!] 먼저 문서를 추가하세요 (/add, /paste, /demo)");
                    }
                    Err(e) => assistant.print_answer(&Answer::from_error(&e)),
                }
            }
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &RagConfig, config_path: Option<&Path>) -> Result<()> {
    println!("rag-assistant v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| data_dir.join("config.json"));
    if config_file.exists() {
        println!("[OK] 설정 파일: {}", config_file.display());
    } else {
        println!("[!] 설정 파일 없음 (기본값 사용): {}", config_file.display());
    }

    println!("[*] 임베딩: {:?}", config.embedder);
    println!(
        "[*] 추론 서버: {} (embedding={}, chat={})",
        config.endpoint.base_url, config.endpoint.embedding_model, config.endpoint.chat_model
    );
    if config.endpoint.api_key.is_some() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[*] API 키: 미설정 (로컬 서버는 생략 가능)");
    }

    println!(
        "[*] 청킹: size={}, overlap={}, min={}",
        config.chunk.chunk_size, config.chunk.overlap, config.chunk.min_chunk_chars
    );
    println!(
        "[*] 검색: top_k={}, context={}자/청크, batch={}",
        config.top_k, config.context_char_budget, config.embedding_batch_size
    );
    println!(
        "[*] 생성: max_new_tokens={}, greedy={}, timeout={}s",
        config.max_new_tokens, config.greedy, config.generation_timeout_secs
    );

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
