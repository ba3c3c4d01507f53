//! Context Assembler - 검색 결과를 프롬프트용 컨텍스트로 변환

use serde::Serialize;

use super::store::DocumentRegistry;
use super::vector::RetrievalResult;

/// 출처 문서를 찾지 못했을 때의 표시 이름
const UNKNOWN_SOURCE: &str = "unknown";

/// 컨텍스트 한 조각
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPassage {
    pub document_name: String,
    /// 잘린 청크 텍스트
    pub text: String,
}

/// 프롬프트에 넣을 검색 컨텍스트 (질의마다 생성)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalContext {
    /// 순위 순서의 조각들
    pub passages: Vec<ContextPassage>,
    /// 조각을 줄바꿈으로 이은 텍스트
    pub text: String,
    /// 출처 문서 이름 (중복 제거, 처음 등장한 순서)
    pub sources: Vec<String>,
}

impl RetrievalContext {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// 컨텍스트 조립기
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    per_chunk_char_budget: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(300)
    }
}

impl ContextAssembler {
    pub fn new(per_chunk_char_budget: usize) -> Self {
        Self {
            per_chunk_char_budget,
        }
    }

    /// 검색 결과를 순위 순서 그대로 이어 붙임
    ///
    /// 각 청크는 `per_chunk_char_budget` 문자로 자르고, 출처 이름은 `registry`에서 찾습니다.
    pub fn assemble(
        &self,
        results: &[RetrievalResult],
        registry: &DocumentRegistry,
    ) -> RetrievalContext {
        let mut passages = Vec::with_capacity(results.len());
        let mut sources: Vec<String> = Vec::new();

        for result in results {
            let document_name = registry
                .display_name(result.chunk.chunk.document_id)
                .unwrap_or(UNKNOWN_SOURCE)
                .to_string();

            if !sources.contains(&document_name) {
                sources.push(document_name.clone());
            }

            passages.push(ContextPassage {
                document_name,
                text: truncate_chars(&result.chunk.chunk.text, self.per_chunk_char_budget),
            });
        }

        let text = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        RetrievalContext {
            passages,
            text,
            sources,
        }
    }
}

/// 앞에서부터 `max_chars` 문자만 남김 (UTF-8 안전)
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::knowledge::{
        Chunk, ChunkId, Document, DocumentId, EmbeddedChunk, SourceKind,
    };

    fn register(registry: &mut DocumentRegistry, name: &str) -> DocumentId {
        let id = DocumentId::new();
        registry.insert(Document {
            id,
            display_name: name.to_string(),
            source_kind: SourceKind::File,
            raw_text: String::new(),
            chunk_ids: vec![],
            created_at: Utc::now(),
        });
        id
    }

    fn result(document_id: DocumentId, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: EmbeddedChunk::new(
                Chunk {
                    id: ChunkId::new(),
                    document_id,
                    ordinal_index: 0,
                    text: text.to_string(),
                },
                vec![1.0],
            ),
            score,
        }
    }

    #[test]
    fn test_assemble_joins_in_rank_order() {
        let mut registry = DocumentRegistry::new();
        let a = register(&mut registry, "a.txt");
        let b = register(&mut registry, "b.md");

        let results = vec![
            result(b, "best match text", 0.9),
            result(a, "second match text", 0.5),
            result(b, "third match text", 0.1),
        ];

        let context = ContextAssembler::default().assemble(&results, &registry);
        assert_eq!(
            context.text,
            "best match text\nsecond match text\nthird match text"
        );
        assert_eq!(context.sources, vec!["b.md", "a.txt"]);
        assert_eq!(context.passages.len(), 3);
    }

    #[test]
    fn test_assemble_truncates_each_chunk() {
        let mut registry = DocumentRegistry::new();
        let a = register(&mut registry, "a.txt");
        let results = vec![result(a, "abcdefghij", 1.0), result(a, "가나다라마바", 0.5)];

        let context = ContextAssembler::new(4).assemble(&results, &registry);
        assert_eq!(context.text, "abcd\n가나다라");
        assert_eq!(context.sources, vec!["a.txt"]);
    }

    #[test]
    fn test_assemble_empty() {
        let registry = DocumentRegistry::new();
        let context = ContextAssembler::default().assemble(&[], &registry);
        assert!(context.is_empty());
        assert!(context.text.is_empty());
        assert!(context.sources.is_empty());
    }

    #[test]
    fn test_unknown_document_name() {
        let registry = DocumentRegistry::new();
        let results = vec![result(DocumentId::new(), "orphan chunk", 0.3)];
        let context = ContextAssembler::default().assemble(&results, &registry);
        assert_eq!(context.sources, vec![UNKNOWN_SOURCE]);
    }
}
