//! Knowledge 모듈 - 경전 지식 저장소
//!
//! - Chunker: 경계 인식 텍스트 분할
//! - Documents: 원천 파일(JSON/CSV/TXT) 파싱
//! - Vector: 벡터 저장소 트레이트 + 공통 타입
//! - Flat: 로컬 파일 기반 전수 검색 인덱스
//! - Qdrant: 원격 관리형 벡터 저장소
//! - Relevance: 질문 도메인 판별 게이트

mod chunker;
mod documents;
mod flat;
mod qdrant;
mod relevance;
mod text;
mod vector;

// Re-exports
pub use chunker::{default_chunker, text_chunker, ChunkConfig, Chunker, TextChunker};
pub use documents::DocumentProcessor;
pub use flat::{FlatIndex, FlatVectorStore, INDEX_FILE, METADATA_FILE};
pub use qdrant::QdrantVectorStore;
pub use relevance::{KeywordRelevanceGate, RelevancePolicy};
pub use text::{extract_verse_reference, normalize_query, normalize_sanskrit};
pub use vector::{
    normalize, ChunkRecord, DocumentChunk, IndexError, IndexInfo, SearchResult, VectorStore,
    BATCH_SIZE,
};
