//! 설정 모듈
//!
//! 기본값 → `<data_dir>/config.json` → 환경변수 순서로 설정을 덮어씁니다.
//!
//! ## 환경변수
//! - `RAG_EMBEDDER`: `hash` | `openai` | `none`
//! - `RAG_API_BASE`: OpenAI 호환 서버 주소 (예: `http://localhost:8080/v1`)
//! - `RAG_API_KEY` > `OPENAI_API_KEY`: API 키 (로컬 서버는 생략 가능)
//! - `RAG_EMBEDDING_MODEL`, `RAG_CHAT_MODEL`: 모델 이름

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::knowledge::ChunkConfig;

/// 설정 파일 이름
const CONFIG_FILE: &str = "config.json";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.rag-assistant/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rag-assistant")
}

// ============================================================================
// Types
// ============================================================================

/// 임베딩 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// 오프라인 해시 임베딩
    Hash,
    /// OpenAI 호환 HTTP 서버
    Openai,
    /// 임베딩 없음 (폴백 모드)
    None,
}

impl FromStr for EmbedderKind {
    type Err = RagError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "openai" => Ok(Self::Openai),
            "none" | "off" => Ok(Self::None),
            other => Err(RagError::Config(format!("unknown embedder: {other}"))),
        }
    }
}

/// OpenAI 호환 추론 서버 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            chat_model: "SmolLM2-360M-Instruct".to_string(),
            api_key: None,
        }
    }
}

/// 전체 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 임베딩 배치 크기
    pub embedding_batch_size: usize,
    /// 질의당 검색할 청크 수
    pub top_k: usize,
    /// 컨텍스트에 넣을 청크당 최대 문자 수
    pub context_char_budget: usize,
    /// 생성 타임아웃 (초)
    pub generation_timeout_secs: u64,
    /// 생성 최대 토큰 수
    pub max_new_tokens: usize,
    /// 그리디 디코딩 여부
    pub greedy: bool,
    /// 답변을 첫 줄만 남길지 여부 (표시 정책)
    pub first_line_only: bool,
    /// 임베딩 백엔드
    pub embedder: EmbedderKind,
    /// 추론 서버
    pub endpoint: EndpointConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            embedding_batch_size: 4,
            top_k: 2,
            context_char_budget: 300,
            generation_timeout_secs: 60,
            max_new_tokens: 80,
            greedy: true,
            first_line_only: true,
            embedder: EmbedderKind::Hash,
            endpoint: EndpointConfig::default(),
        }
    }
}

impl RagConfig {
    /// 기본 위치에서 설정 로드 (파일 + 환경변수)
    pub fn load() -> Result<Self> {
        Self::load_from(&get_data_dir().join(CONFIG_FILE))
    }

    /// 지정한 설정 파일에서 로드 (파일이 없으면 기본값)
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {:?}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config: {:?}", path))?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 환경변수 덮어쓰기
    fn apply_env(&mut self) -> Result<()> {
        if let Some(kind) = env_value("RAG_EMBEDDER") {
            self.embedder = kind.parse()?;
        }
        if let Some(base) = env_value("RAG_API_BASE") {
            self.endpoint.base_url = base;
        }
        if let Some(model) = env_value("RAG_EMBEDDING_MODEL") {
            self.endpoint.embedding_model = model;
        }
        if let Some(model) = env_value("RAG_CHAT_MODEL") {
            self.endpoint.chat_model = model;
        }
        if let Some(key) = get_api_key() {
            self.endpoint.api_key = Some(key);
        }
        Ok(())
    }

    /// 설정 값 검증
    pub fn validate(&self) -> std::result::Result<(), RagError> {
        if self.chunk.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config(
                "embedding_batch_size must be greater than zero".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".into()));
        }
        if self.generation_timeout_secs == 0 {
            return Err(RagError::Config(
                "generation_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// 생성 타임아웃
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `RAG_API_KEY` 환경변수
/// 2. `OPENAI_API_KEY` 환경변수
pub fn get_api_key() -> Option<String> {
    env_value("RAG_API_KEY").or_else(|| env_value("OPENAI_API_KEY"))
}

/// 비어 있지 않은 환경변수 값
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Tests
// ============================================================================
