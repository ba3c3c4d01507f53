//! 콘텐츠 추출 모듈
//!
//! 수집된 파일에서 텍스트를 꺼내 수집 가능한 문서로 만듭니다.
//! - 텍스트 파일: 직접 읽기
//! - PDF 파일: pdf-extract로 페이지별 텍스트 추출 후 빈 줄로 연결

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::{CollectedFile, FileType};
use crate::knowledge::NewDocument;

// ============================================================================
// Extracted Content
// ============================================================================

/// 추출된 콘텐츠
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// 추출된 텍스트
    pub text: String,
    /// 페이지 수 (PDF)
    pub total_pages: Option<usize>,
}

impl ExtractedContent {
    /// 공백 외 내용이 없는지 여부
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 파일에서 콘텐츠 추출
pub async fn extract(path: &Path, file_type: FileType) -> Result<ExtractedContent> {
    match file_type {
        FileType::Text => extract_text(path).await,
        FileType::Pdf => extract_pdf(path).await,
    }
}

/// 수집된 파일을 문서로 변환
///
/// 추출된 텍스트가 비어 있으면 경고를 남기고 `None`을 돌려줍니다.
pub async fn extract_document(file: &CollectedFile) -> Result<Option<NewDocument>> {
    let content = extract(&file.path, file.file_type).await?;
    let name = file.display_name();

    if content.is_blank() {
        tracing::warn!("No text found in: {}", name);
        return Ok(None);
    }

    match content.total_pages {
        Some(pages) => tracing::debug!("Extracted {} ({} pages)", name, pages),
        None => tracing::debug!("Extracted {}", name),
    }

    Ok(Some(NewDocument::new(
        name,
        file.file_type.source_kind(),
        content.text,
    )))
}

/// 텍스트 파일에서 추출
async fn extract_text(path: &Path) -> Result<ExtractedContent> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read text file: {:?}", path))?;

    Ok(ExtractedContent {
        text,
        total_pages: None,
    })
}

/// PDF 파일에서 추출
async fn extract_pdf(path: &Path) -> Result<ExtractedContent> {
    // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    let path = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
        .await
        .context("PDF extraction task failed")??;

    Ok(ExtractedContent {
        total_pages: Some(pages.len()),
        text: pdf::join_pages(&pages),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::collector::FileCollector;
    use crate::knowledge::SourceKind;

    #[tokio::test]
    async fn test_extract_text_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fable.md");
        fs::write(&path, "# Fable\n\nSlow and steady wins the race.").expect("write");

        let file = FileCollector::with_defaults()
            .collect_file(&path)
            .expect("collect")
            .expect("supported");
        let document = extract_document(&file)
            .await
            .expect("extract")
            .expect("non-empty");

        assert_eq!(document.display_name, "fable.md");
        assert_eq!(document.source_kind, SourceKind::File);
        assert!(document.raw_text.contains("Slow and steady"));
    }

    #[tokio::test]
    async fn test_blank_file_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.txt");
        fs::write(&path, "  \n\t\n").expect("write");

        let file = FileCollector::with_defaults()
            .collect_file(&path)
            .expect("collect")
            .expect("supported");
        assert!(extract_document(&file).await.expect("extract").is_none());
    }

    #[tokio::test]
    async fn test_text_has_no_page_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        fs::write(&path, "plain notes").expect("write");

        let content = extract(&path, FileType::Text).await.expect("extract");
        assert_eq!(content.text, "plain notes");
        assert_eq!(content.total_pages, None);
        assert!(!content.is_blank());
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = extract(&dir.path().join("gone.txt"), FileType::Text).await;
        assert!(result.is_err());
    }
}
