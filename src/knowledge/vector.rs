//! Vector Store - 벡터 검색 트레이트 및 공통 타입
//!
//! 로컬 플랫 인덱스와 Qdrant가 같은 트레이트를 구현합니다.
//! 모든 벡터는 L2 정규화 후 저장되므로 내적 = 코사인 유사도입니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 대용량 삽입 시 배치 크기
pub const BATCH_SIZE: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// 청크 레코드 (검색 결과와 함께 저장되는 페이로드)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// 임베딩 대상 텍스트
    pub text: String,
    /// 출처 태그 (데이터셋 이름)
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub verse: String,
    #[serde(default)]
    pub sanskrit: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub explanation: String,
    /// 형식별 추가 필드 (verse_id, chunk_index, total_chunks 등)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChunkRecord {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    /// 장/절 지정
    pub fn with_verse(mut self, chapter: impl Into<String>, verse: impl Into<String>) -> Self {
        self.chapter = chapter.into();
        self.verse = verse.into();
        self
    }

    /// 메타데이터 필드 추가
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// `metadata.verse_id` 문자열
    pub fn verse_id(&self) -> Option<&str> {
        self.metadata.get("verse_id").and_then(Value::as_str)
    }
}

/// 문서 청크 (인덱싱 단위)
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub record: ChunkRecord,
    /// 인덱싱 전에는 None
    pub embedding: Option<Vec<f32>>,
}

impl DocumentChunk {
    pub fn new(record: ChunkRecord) -> Self {
        Self {
            record,
            embedding: None,
        }
    }

    pub fn with_embedding(record: ChunkRecord, embedding: Vec<f32>) -> Self {
        Self {
            record,
            embedding: Some(embedding),
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub record: ChunkRecord,
    /// 유사도 스코어 (코사인, -1.0 ~ 1.0)
    pub score: f32,
}

/// 인덱스 상태 정보
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub points_count: usize,
    pub indexed_vectors_count: usize,
    pub status: String,
}

// ============================================================================
// Errors
// ============================================================================

/// 인덱스 계약 위반 및 저장 파일 오류
#[derive(Error, Debug)]
pub enum IndexError {
    /// 임베딩 차원 불일치 (호출자 버그)
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 저장된 인덱스 파일 손상
    #[error("Corrupted index file: {0}")]
    Corrupted(String),

    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 컬렉션/인덱스 생성 (멱등)
    async fn ensure_ready(&self) -> Result<()>;

    /// 청크 추가 (append-only)
    ///
    /// 임베딩이 없는 청크는 건너뜁니다. 차원이 맞지 않으면 에러.
    /// 반환값은 실제로 추가된 개수입니다.
    async fn add_documents(&self, chunks: &[DocumentChunk]) -> Result<usize>;

    /// 유사도 검색 (실패 시 빈 결과)
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Vec<SearchResult>;

    /// 인덱스 상태
    async fn info(&self) -> Result<IndexInfo>;

    /// 전체 삭제 (멱등)
    async fn clear(&self) -> Result<()>;

    /// 백엔드 이름
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 내적
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 노름
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2 정규화 (영벡터는 그대로)
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// 임베딩이 있는 청크만 골라 차원 검증 후 정규화
///
/// 차원이 하나라도 맞지 않으면 아무것도 반환하지 않고 에러.
pub(crate) fn prepare_entries(
    chunks: &[DocumentChunk],
    dimension: usize,
) -> Result<Vec<(Vec<f32>, ChunkRecord)>, IndexError> {
    let mut entries = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let Some(embedding) = chunk.embedding.as_ref() else {
            tracing::warn!("Document missing embedding, skipping (source={})", chunk.record.source);
            continue;
        };

        if embedding.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }

        entries.push((normalize(embedding), chunk.record.clone()));
    }

    Ok(entries)
}

// ============================================================================
// Tests
// ============================================================================
