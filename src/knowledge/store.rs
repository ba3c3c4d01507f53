//! Document Registry - 세션 내 문서 목록
//!
//! 수집된 문서(원문 + 청크 ID 목록)를 삽입 순서대로 보관합니다.
//! 벡터는 [`VectorStore`](super::VectorStore)가 따로 들고 있으며,
//! 문서 삭제 시 오케스트레이터가 두 곳을 함께 정리합니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RagError;

/// 붙여넣은 텍스트의 기본 제목
const DEFAULT_PASTE_TITLE: &str = "Pasted Text";
/// 붙여넣은 텍스트 제목의 최대 길이 (문자 수)
const MAX_PASTE_TITLE_CHARS: usize = 30;

// ============================================================================
// Identifiers
// ============================================================================

/// 문서 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 청크 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(Uuid);

impl ChunkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Types
// ============================================================================

/// 문서 출처 (표시/출처 표기용, 검색 로직에는 쓰지 않음)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// 텍스트 파일 (txt, md, json, csv ...)
    File,
    /// 붙여넣은 텍스트
    Clipboard,
    /// PDF 파일
    Pdf,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Clipboard => "clipboard",
            SourceKind::Pdf => "pdf",
        }
    }

    /// 목록 표시용 짧은 태그
    pub fn tag(&self) -> &'static str {
        match self {
            SourceKind::File => "TXT",
            SourceKind::Clipboard => "CLIP",
            SourceKind::Pdf => "PDF",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(SourceKind::File),
            "clipboard" => Ok(SourceKind::Clipboard),
            "pdf" => Ok(SourceKind::Pdf),
            other => Err(RagError::Config(format!("unknown source kind: {other}"))),
        }
    }
}

/// 새 문서 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub display_name: String,
    pub source_kind: SourceKind,
    pub raw_text: String,
}

impl NewDocument {
    pub fn new(
        display_name: impl Into<String>,
        source_kind: SourceKind,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            source_kind,
            raw_text: raw_text.into(),
        }
    }

    /// 붙여넣은 텍스트로 생성 (앞 다섯 단어로 제목 생성)
    pub fn from_clipboard(text: impl Into<String>) -> Self {
        let raw_text = text.into();
        let display_name = paste_title(&raw_text);
        Self::new(display_name, SourceKind::Clipboard, raw_text)
    }
}

/// 저장된 문서 엔트리
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub display_name: String,
    pub source_kind: SourceKind,
    pub raw_text: String,
    /// 청크 ID (청크 순서대로)
    pub chunk_ids: Vec<ChunkId>,
    pub created_at: DateTime<Utc>,
}

/// 세션 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    /// 임베딩이 있는 청크 수
    pub embedded_count: usize,
    pub total_content_bytes: usize,
    /// 저장소 임베딩 차원 (아직 없으면 None)
    pub dimension: Option<usize>,
}

// ============================================================================
// DocumentRegistry
// ============================================================================

/// 문서 목록 (삽입 순서 유지)
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: Vec<Document>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 문서 추가
    pub fn insert(&mut self, document: Document) {
        self.documents.push(document);
    }

    /// ID로 조회
    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// 표시 이름으로 조회 (먼저 추가된 문서 우선)
    pub fn find_by_name(&self, name: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.display_name == name)
    }

    /// 문서 표시 이름
    pub fn display_name(&self, id: DocumentId) -> Option<&str> {
        self.get(id).map(|d| d.display_name.as_str())
    }

    /// 문서 제거
    pub fn remove(&mut self, id: DocumentId) -> Option<Document> {
        let index = self.documents.iter().position(|d| d.id == id)?;
        Some(self.documents.remove(index))
    }

    /// 전체 삭제
    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// 문서 목록 (추가된 순서)
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// 원문 총 바이트 수
    pub fn total_content_bytes(&self) -> usize {
        self.documents.iter().map(|d| d.raw_text.len()).sum()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 붙여넣은 텍스트의 제목
///
/// 단어/공백 이외의 문자를 공백으로 바꾼 뒤 앞 다섯 단어를 사용합니다.
fn paste_title(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let words = cleaned.split_whitespace().take(5).collect::<Vec<_>>().join(" ");

    if words.is_empty() {
        DEFAULT_PASTE_TITLE.to_string()
    } else if words.chars().count() > MAX_PASTE_TITLE_CHARS {
        let truncated: String = words.chars().take(MAX_PASTE_TITLE_CHARS).collect();
        format!("{}...", truncated)
    } else {
        words
    }
}

// ============================================================================
// Tests
// ============================================================================
