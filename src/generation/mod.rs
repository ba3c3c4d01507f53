//! 생성 모듈 - 답변 생성 협력자
//!
//! 채팅 메시지 타입, 생성 결과 유니온, 프롬프트 구성과 답변 후처리를 제공합니다.
//!
//! - [`GenerationProvider`]: `messages -> GenerationOutput` 협력자
//! - [`GenerationOutput`]: 문자열 또는 메시지 목록 (경계에서 검증)
//! - [`OpenAiChat`]: OpenAI 호환 `/v1/chat/completions`

mod openai;

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::RagError;

pub use openai::OpenAiChat;

/// 후처리 후 답변이 비었을 때의 대체 문구
pub const NO_RESPONSE_TEXT: &str = "Could not generate a response.";

/// `<|...|>` 형태의 특수 토큰
static SPECIAL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[^|]+\|>").expect("valid special token regex"));

/// 두 줄 이상 연속된 줄바꿈
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid blank line regex"));

// ============================================================================
// Messages
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 채팅 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 생성 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_new_tokens: usize,
    /// 그리디 디코딩 (temperature 0)
    pub greedy: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 80,
            greedy: true,
        }
    }
}

impl From<&RagConfig> for GenerationOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            greedy: config.greedy,
        }
    }
}

/// 생성 결과
///
/// 프로바이더에 따라 완성된 문자열을 주거나, 대화 전체를 메시지 목록으로 돌려줍니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationOutput {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl GenerationOutput {
    /// 답변 텍스트 추출
    ///
    /// 메시지 목록이면 첫 번째 `assistant` 메시지를 사용합니다.
    pub fn into_text(self) -> std::result::Result<String, RagError> {
        match self {
            GenerationOutput::Text(text) => Ok(text),
            GenerationOutput::Messages(messages) => messages
                .into_iter()
                .find(|m| m.role == Role::Assistant)
                .map(|m| m.content)
                .ok_or_else(|| {
                    RagError::GenerationFailure("output has no assistant message".into())
                }),
        }
    }
}

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<GenerationOutput>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Prompt & Post-processing
// ============================================================================

/// 검색 컨텍스트와 질문으로 프롬프트 메시지 구성
pub fn build_prompt(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!(
        "{}\n\nAnswer briefly: {}",
        context, question
    ))]
}

/// 생성 결과 정리
///
/// 특수 토큰 제거 → 연속 줄바꿈 축약 → 앞뒤 공백 제거.
/// `first_line_only`면 첫 줄만 남깁니다.
pub fn clean_answer(raw: &str, first_line_only: bool) -> String {
    let stripped = SPECIAL_TOKEN.replace_all(raw, "");
    let collapsed = BLANK_LINES.replace_all(&stripped, "\n");
    let trimmed = collapsed.trim();

    if first_line_only {
        trimmed.lines().next().unwrap_or("").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 생성 프로바이더 생성
///
/// 임베딩 백엔드와 무관하게 채팅은 항상 `endpoint` 서버를 사용합니다.
/// 서버가 떠 있지 않으면 질의 시점에 [`RagError::GenerationFailure`]로 드러납니다.
pub fn create_generator(config: &RagConfig) -> Result<Arc<dyn GenerationProvider>> {
    let chat = OpenAiChat::from_config(&config.endpoint)?;
    tracing::info!("Using generation provider: {}", chat.name());
    Ok(Arc::new(chat))
}

// ============================================================================
// Tests
// ============================================================================
