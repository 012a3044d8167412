//! sutra-rag - 힌두 경전 질의응답 RAG 시스템
//!
//! 바가바드 기타, 라마야나, 마하바라타, 요가 수트라 텍스트를
//! 청킹/임베딩하여 벡터 인덱스(Qdrant 또는 로컬 플랫 인덱스)에 저장하고,
//! 검색된 구절을 근거로 LLM 답변을 생성합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod knowledge;
pub mod rag;

// Re-exports
pub use config::Config;
pub use embedding::{hash_embedding, Embedder, EmbeddingProvider, MistralEmbedding};
pub use generation::{AnswerGenerator, ChatGenerator};
pub use knowledge::{
    ChunkConfig, ChunkRecord, Chunker, DocumentChunk, DocumentProcessor, FlatVectorStore,
    KeywordRelevanceGate, QdrantVectorStore, RelevancePolicy, SearchResult, TextChunker,
    VectorStore,
};
pub use rag::{DatabaseStats, RagAnswer, RagService, VerseLookup};
