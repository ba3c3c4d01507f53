//! 파일 수집 모듈
//!
//! 로컬 파일 및 폴더에서 수집할 문서 후보를 찾습니다.
//! 숨김 파일과 .gitignore 대상은 건너뛰고, txt/md/json/csv/pdf만 수집합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

use crate::knowledge::SourceKind;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 텍스트 파일 (txt, md, json, csv)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" | "json" | "csv" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 문서 출처 종류
    pub fn source_kind(&self) -> SourceKind {
        match self {
            FileType::Text => SourceKind::File,
            FileType::Pdf => SourceKind::Pdf,
        }
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 절대 경로
    pub path: PathBuf,
    /// 파일 타입
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 파일에서 CollectedFile 생성
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let Some(file_type) = FileType::from_path(&path) else {
            return Ok(None);
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            file_type,
            size: metadata.len(),
        }))
    }

    /// 표시 이름 (파일 이름)
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// PDF 파일 건너뛰기
    pub skip_pdfs: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10MB
            skip_pdfs: false,
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 단일 파일 수집
    pub fn collect_file(&self, path: &Path) -> Result<Option<CollectedFile>> {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !abs_path.exists() {
            anyhow::bail!("File not found: {:?}", abs_path);
        }

        if !abs_path.is_file() {
            anyhow::bail!("Not a file: {:?}", abs_path);
        }

        let file = CollectedFile::from_path(abs_path)?;

        // 필터 적용
        if let Some(ref file) = file {
            if !self.should_include(file) {
                return Ok(None);
            }
        }

        Ok(file)
    }

    /// 폴더 재귀 수집
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !abs_path.exists() {
            anyhow::bail!("Directory not found: {:?}", abs_path);
        }

        if !abs_path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", abs_path);
        }

        let mut files = Vec::new();

        // git 저장소 밖에서도 .gitignore 적용
        let walker = WalkBuilder::new(&abs_path).require_git(false).build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            // 파일만 처리
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let file_path = entry.path().to_path_buf();

            match CollectedFile::from_path(file_path) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {} // 지원하지 않는 확장자
                Err(e) => {
                    tracing::warn!("Failed to collect file: {}", e);
                }
            }
        }

        tracing::info!("Collected {} files from {:?}", files.len(), abs_path);
        Ok(files)
    }

    /// 파일이 필터 조건을 만족하는지 확인
    fn should_include(&self, file: &CollectedFile) -> bool {
        // 파일 크기 제한
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }

        !(self.config.skip_pdfs && file.file_type == FileType::Pdf)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            match file.file_type {
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================
