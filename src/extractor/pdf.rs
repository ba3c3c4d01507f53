//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

/// "--- Page 1 ---" 형태의 페이지 구분 줄
static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
        .expect("valid page marker regex")
});

/// PDF에서 페이지별 텍스트 추출
///
/// 텍스트가 없는 PDF(스캔본 등)는 빈 벡터를 돌려줍니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text))
}

/// 페이지를 빈 줄로 연결
pub fn join_pages(pages: &[String]) -> String {
    pages.join("\n\n")
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)로 페이지 분리 시도
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    if PAGE_MARKER.is_match(text) {
        let pages: Vec<String> = PAGE_MARKER
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[1], "Page 2 content");
    }

    #[test]
    fn test_split_pdf_pages_with_markers() {
        let text = "Intro text\n--- Page 2 ---\nBody text\n--- Page 3 ---\nOutro";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["Intro text", "Body text", "Outro"]);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let text = "  Just some text without page breaks ";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["Just some text without page breaks"]);
    }

    #[test]
    fn test_join_pages() {
        let pages = vec!["first page".to_string(), "second page".to_string()];
        assert_eq!(join_pages(&pages), "first page\n\nsecond page");
        assert_eq!(join_pages(&[]), "");
    }
}
