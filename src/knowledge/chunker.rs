//! Text Chunking Module
//!
//! 문장 경계를 존중하는 텍스트 분할을 제공합니다.
//! 문장을 버퍼에 누적하다가 `chunk_size`를 넘기면 청크를 내보내고,
//! 직전 청크의 마지막 몇 단어를 다음 청크 앞에 이어 붙입니다.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 문장 경계: `.`, `!`, `?` 뒤의 공백
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("valid sentence boundary regex"));

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 청크 크기 기준 (문자 수, 권고값)
    pub chunk_size: usize,
    /// 오버랩 크기 (`overlap / 5` 단어로 근사)
    pub overlap: usize,
    /// 이 길이 이하의 청크는 버림 (문자 수)
    pub min_chunk_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
            min_chunk_chars: 20,
        }
    }
}

impl ChunkConfig {
    /// 크기와 오버랩 지정
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..Default::default()
        }
    }

    /// 다음 청크로 이어 붙일 단어 수
    pub fn overlap_words(&self) -> usize {
        self.overlap / 5
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 문장 단위 청커
///
/// - 문장 중간에서는 자르지 않음 (`chunk_size`보다 긴 문장은 통째로 한 청크)
/// - 종결 부호가 없는 텍스트는 한 문장으로 취급
/// - 오버랩은 문자 단위가 아닌 단어 단위 근사
/// - 다듬은 길이가 `min_chunk_chars` 이하인 청크는 제거
#[derive(Debug, Clone, Default)]
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 현재 설정
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 문장 단위로 분할 (종결 부호는 문장에 남기고 뒤따르는 공백은 버림)
    fn split_sentences(text: &str) -> Vec<&str> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for boundary in SENTENCE_BOUNDARY.find_iter(text) {
            // 종결 부호는 ASCII 한 글자
            let end = boundary.start() + 1;
            sentences.push(&text[start..end]);
            start = boundary.end();
        }
        sentences.push(&text[start..]);

        sentences.retain(|s| !s.is_empty());
        sentences
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for sentence in Self::split_sentences(text) {
            let sentence_chars = sentence.chars().count();

            if !current.is_empty() && current_chars + sentence_chars > self.config.chunk_size {
                chunks.push(current.trim().to_string());

                let carried = tail_words(&current, self.config.overlap_words());
                current = if carried.is_empty() {
                    sentence.to_string()
                } else {
                    format!("{} {}", carried, sentence)
                };
                current_chars = current.chars().count();
            } else {
                if !current.is_empty() {
                    current.push(' ');
                    current_chars += 1;
                }
                current.push_str(sentence);
                current_chars += sentence_chars;
            }
        }

        let rest = current.trim();
        if !rest.is_empty() {
            chunks.push(rest.to_string());
        }

        chunks.retain(|c| c.chars().count() > self.config.min_chunk_chars);
        chunks
    }

    fn name(&self) -> &'static str {
        "SentenceChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 공백(' ')으로 나눈 마지막 `count`개 단어
fn tail_words(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split(' ').collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SentenceChunker::with_defaults())
}

/// 문장 청커 생성 (설정 지정)
pub fn sentence_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(SentenceChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
