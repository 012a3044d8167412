//! RAG 서비스 - 검색 + 답변 생성 오케스트레이션
//!
//! 질문 처리 순서 (각 단계에서 조기 종료 가능):
//! 1. 관련성 게이트
//! 2. 질의 정규화 + 임베딩
//! 3. 벡터 검색 (top-K)
//! 4. 상위 결과로 컨텍스트 구성
//! 5. 답변 생성
//!
//! 사용자에게는 항상 `RagAnswer`가 반환되며 에러가 전파되지 않습니다.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::generation::{generate_or_degraded, AnswerGenerator, ChatGenerator};
use crate::knowledge::{
    normalize_query, ChunkRecord, DocumentChunk, DocumentProcessor, FlatVectorStore,
    KeywordRelevanceGate, QdrantVectorStore, RelevancePolicy, SearchResult, VectorStore,
};

/// 검색 후보 수
pub const SEARCH_LIMIT: usize = 20;
/// 컨텍스트에 쓰는 상위 결과 수
pub const CONTEXT_RESULTS: usize = 5;
/// 절 조회 시 검색 후보 수
pub const VERSE_LOOKUP_LIMIT: usize = 50;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const OFF_TOPIC_ANSWER: &str = "\
    I can only answer questions about Hindu religious texts including the Bhagavad Gita, \
    Ramayana, Mahabharata, and Yoga Sutras. Please ask questions related to these sacred \
    texts, their teachings, characters, or philosophical concepts.";

pub const NO_INFORMATION_ANSWER: &str = "\
    Based on the available texts, I cannot find relevant information to answer this \
    question. Please try rephrasing your question or asking about specific verses or \
    concepts from the Bhagavad Gita or Yoga Sutras.";

pub const RETRY_ANSWER: &str = "\
    I encountered an issue while searching for your answer. This might be due to a temporary \
    service interruption. Please try rephrasing your question or try again in a moment.";

// ============================================================================
// Response Types
// ============================================================================

/// 질문 응답
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    /// 사용된 결과의 평균 유사도 (0.0 ~ 1.0)
    pub confidence: f32,
    /// 컨텍스트에 사용된 결과 수
    pub context_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 질의 임베딩이 해시 대체 경로에서 나왔는지 여부
    pub degraded: bool,
}

impl RagAnswer {
    fn canned(answer: &str, degraded: bool) -> Self {
        Self {
            answer: answer.to_string(),
            confidence: 0.0,
            context_used: 0,
            error: None,
            degraded,
        }
    }
}

/// 절 조회 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerseLookup {
    pub found: bool,
    #[serde(flatten)]
    pub verse: Option<VerseDetails>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerseDetails {
    pub sanskrit: String,
    pub translation: String,
    pub explanation: String,
    pub source: String,
    pub chapter: String,
    pub verse: String,
}

impl From<ChunkRecord> for VerseDetails {
    fn from(record: ChunkRecord) -> Self {
        Self {
            sanskrit: record.sanskrit,
            translation: record.translation,
            explanation: record.explanation,
            source: record.source,
            chapter: record.chapter,
            verse: record.verse,
        }
    }
}

/// 데이터베이스 통계
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_documents: usize,
    pub indexed_documents: usize,
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// RagService
// ============================================================================

/// 경전 질의응답 서비스
pub struct RagService {
    config: Config,
    embedder: Embedder,
    store: Box<dyn VectorStore>,
    generator: Box<dyn AnswerGenerator>,
    relevance: Box<dyn RelevancePolicy>,
    processor: DocumentProcessor,
}

impl RagService {
    /// 설정으로 서비스 생성
    ///
    /// Qdrant가 설정되어 있으면 한 번 연결을 시도하고,
    /// 실패하면 프로세스 수명 동안 로컬 플랫 인덱스를 사용합니다.
    pub async fn new(config: Config) -> Result<Self> {
        let embedder = Embedder::from_config(&config)?;
        let generator = ChatGenerator::from_config(&config)?;
        let relevance = KeywordRelevanceGate::new()?;
        let store = open_store(&config).await?;

        Self::with_components(
            config,
            embedder,
            store,
            Box::new(generator),
            Box::new(relevance),
        )
    }

    /// 구성요소 직접 지정
    pub fn with_components(
        config: Config,
        embedder: Embedder,
        store: Box<dyn VectorStore>,
        generator: Box<dyn AnswerGenerator>,
        relevance: Box<dyn RelevancePolicy>,
    ) -> Result<Self> {
        let processor = DocumentProcessor::from_config(&config)?;

        Ok(Self {
            config,
            embedder,
            store,
            generator,
            relevance,
            processor,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// 데이터 디렉토리에서 인덱스 구축
    ///
    /// 이미 문서가 있고 `force_reload`가 false면 아무것도 하지 않습니다.
    /// 반환값은 새로 추가된 청크 수입니다.
    pub async fn initialize(&self, force_reload: bool) -> Result<usize> {
        let info = self.store.info().await?;

        if info.points_count > 0 && !force_reload {
            tracing::info!(
                "Database already initialized with {} documents",
                info.points_count
            );
            return Ok(0);
        }

        if force_reload {
            tracing::info!("Force reload requested, clearing existing data");
            self.store.clear().await?;
        }

        let records = self
            .processor
            .process_all_files(&self.config.data_dir)
            .await;

        if records.is_empty() {
            tracing::warn!("No documents found to process");
            return Ok(0);
        }

        self.index_records(records).await
    }

    /// 레코드 직접 추가
    ///
    /// 긴 텍스트는 다시 청킹하며, 이미 청크 크기 이하인 레코드는 그대로 유지됩니다.
    pub async fn ingest(&self, records: Vec<ChunkRecord>) -> Result<usize> {
        let chunked: Vec<ChunkRecord> = records
            .into_iter()
            .flat_map(|record| {
                let parts = self.processor.chunk_record(record.clone());
                if parts.len() == 1 {
                    let mut single = record;
                    single.text = parts[0].text.clone();
                    vec![single]
                } else {
                    parts
                }
            })
            .collect();

        self.index_records(chunked).await
    }

    /// 해시 경로로 임베딩 후 한 번에 추가
    async fn index_records(&self, records: Vec<ChunkRecord>) -> Result<usize> {
        let total = records.len();
        tracing::info!("Generating embeddings for {} documents", total);

        let mut chunks = Vec::with_capacity(total);
        for (i, record) in records.into_iter().enumerate() {
            if record.text.trim().is_empty() {
                tracing::warn!("Skipping document {} with empty text", i);
                continue;
            }

            let embedding = self.embedder.embed(&record.text, false).await;
            chunks.push(DocumentChunk::with_embedding(record, embedding.values));

            if (i + 1) % 100 == 0 {
                tracing::debug!("Embedded {}/{} documents", i + 1, total);
            }
        }

        if chunks.is_empty() {
            tracing::warn!("No valid documents with embeddings to add");
            return Ok(0);
        }

        let added = self.store.add_documents(&chunks).await?;
        tracing::info!("Database initialized with {} documents", added);
        Ok(added)
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// 질문에 답변
    pub async fn search_and_answer(
        &self,
        question: &str,
        source_filter: Option<&str>,
    ) -> RagAnswer {
        match self.answer(question, source_filter).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("Error in search_and_answer: {:#}", e);
                RagAnswer {
                    error: Some(format!("{:#}", e)),
                    ..RagAnswer::canned(RETRY_ANSWER, false)
                }
            }
        }
    }

    async fn answer(&self, question: &str, source_filter: Option<&str>) -> Result<RagAnswer> {
        if !self.relevance.is_relevant(question) {
            tracing::info!("Question rejected as unrelated to the sacred texts");
            return Ok(RagAnswer::canned(OFF_TOPIC_ANSWER, false));
        }

        let normalized = normalize_query(question);
        let embedding = self.embedder.embed(&normalized, true).await;
        let degraded = embedding.is_degraded();

        let results = self
            .store
            .search(&embedding.values, SEARCH_LIMIT, source_filter)
            .await;

        if results.is_empty() {
            return Ok(RagAnswer::canned(NO_INFORMATION_ANSWER, degraded));
        }

        let top = &results[..results.len().min(CONTEXT_RESULTS)];
        let context = build_context(top);

        let mean = top.iter().map(|r| r.score).sum::<f32>() / top.len() as f32;
        anyhow::ensure!(mean.is_finite(), "Non-finite similarity scores from vector store");

        let answer = generate_or_degraded(self.generator.as_ref(), question, &context).await;

        Ok(RagAnswer {
            answer,
            confidence: mean.clamp(0.0, 1.0),
            context_used: top.len(),
            error: None,
            degraded,
        })
    }

    /// 장/절 번호로 구절 조회
    ///
    /// 인덱스와 같은 해시 공간에서 찾아야 하므로 API를 쓰지 않습니다.
    pub async fn search_by_verse(&self, chapter: &str, verse: &str) -> VerseLookup {
        let verse_id = format!("{}.{}", chapter, verse);
        let query = format!("chapter {} verse {}", chapter, verse);
        let embedding = self.embedder.embed(&query, false).await;

        let results = self
            .store
            .search(&embedding.values, VERSE_LOOKUP_LIMIT, None)
            .await;

        match results
            .into_iter()
            .find(|r| r.record.verse_id() == Some(verse_id.as_str()))
        {
            Some(hit) => VerseLookup {
                found: true,
                verse: Some(hit.record.into()),
            },
            None => {
                tracing::debug!("Verse {} not found among candidates", verse_id);
                VerseLookup::default()
            }
        }
    }

    /// 인덱스 통계
    pub async fn get_stats(&self) -> DatabaseStats {
        let backend = self.store.backend_name().to_string();

        match self.store.info().await {
            Ok(info) => DatabaseStats {
                total_documents: info.points_count,
                indexed_documents: info.indexed_vectors_count,
                status: info.status,
                backend,
                error: None,
            },
            Err(e) => {
                tracing::error!("Error getting database stats: {:#}", e);
                DatabaseStats {
                    total_documents: 0,
                    indexed_documents: 0,
                    status: "unknown".to_string(),
                    backend,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }

    /// 인덱스 전체 삭제
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 벡터 저장소 선택 (Qdrant 우선, 실패 시 로컬)
async fn open_store(config: &Config) -> Result<Box<dyn VectorStore>> {
    if let Some(url) = &config.qdrant_url {
        match QdrantVectorStore::connect(
            url,
            &config.collection_name,
            config.qdrant_api_key.clone(),
            config.embedding_dimension,
            config.similarity_threshold,
        )
        .await
        {
            Ok(store) => return Ok(Box::new(store)),
            Err(e) => {
                tracing::warn!("Qdrant unavailable ({:#}), using local flat index", e);
            }
        }
    }

    open_flat_store(
        &config.index_dir,
        config.embedding_dimension,
        config.local_similarity_floor,
    )
    .await
}

async fn open_flat_store(
    dir: &Path,
    dimension: usize,
    min_score: f32,
) -> Result<Box<dyn VectorStore>> {
    let store = FlatVectorStore::open(dir, dimension, min_score);
    store.ensure_ready().await?;
    Ok(Box::new(store))
}

/// 검색 결과 하나를 컨텍스트 블록으로
pub fn format_context_entry(result: &SearchResult) -> String {
    let r = &result.record;
    let mut lines = Vec::new();

    if !r.chapter.is_empty() && !r.verse.is_empty() {
        lines.push(format!(
            "Source: {} - Chapter {}, Verse {}",
            r.source, r.chapter, r.verse
        ));
    } else {
        lines.push(format!("Source: {}", r.source));
    }
    if !r.sanskrit.is_empty() {
        lines.push(format!("Sanskrit: {}", r.sanskrit));
    }
    if !r.translation.is_empty() {
        lines.push(format!("Translation: {}", r.translation));
    }
    if !r.explanation.is_empty() {
        lines.push(format!("Commentary: {}", r.explanation));
    }
    lines.push(format!("Text: {}", r.text));

    lines.join("\n")
}

fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(format_context_entry)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GENERATION_UNAVAILABLE;
    use crate::knowledge::IndexInfo;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const DIM: usize = 64;

    /// 호출 기록을 남기는 생성기
    #[derive(Clone, Default)]
    struct RecordingGenerator {
        calls: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    #[async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, question: &str, context: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((question.to_string(), context.to_string()));
            if self.fail {
                anyhow::bail!("service down");
            }
            Ok(format!("answer to: {}", question))
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    /// 고정 결과를 돌려주는 저장소
    struct FixedStore(Vec<SearchResult>);

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }
        async fn add_documents(&self, _chunks: &[DocumentChunk]) -> Result<usize> {
            Ok(0)
        }
        async fn search(&self, _q: &[f32], _l: usize, _f: Option<&str>) -> Vec<SearchResult> {
            self.0.clone()
        }
        async fn info(&self) -> Result<IndexInfo> {
            anyhow::bail!("info unavailable")
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
        fn backend_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        Config {
            qdrant_url: None,
            index_dir: dir.path().join("index"),
            data_dir: dir.path().join("data"),
            similarity_threshold: 0.0,
            embedding_dimension: DIM,
            ..Config::default()
        }
    }

    fn service_with(
        dir: &TempDir,
        store: Box<dyn VectorStore>,
        generator: RecordingGenerator,
    ) -> RagService {
        RagService::with_components(
            test_config(dir),
            Embedder::hash_only(DIM),
            store,
            Box::new(generator),
            Box::new(KeywordRelevanceGate::new().unwrap()),
        )
        .unwrap()
    }

    fn service(dir: &TempDir, generator: RecordingGenerator) -> RagService {
        let store = FlatVectorStore::open(&dir.path().join("index"), DIM, 0.0);
        service_with(dir, Box::new(store), generator)
    }

    fn gita_record() -> ChunkRecord {
        let mut record = ChunkRecord::new("Sanskrit: X\n\nTranslation: dharma is duty", "gita")
            .with_verse("2", "47")
            .with_metadata("verse_id", "2.47");
        record.sanskrit = "X".to_string();
        record.translation = "dharma is duty".to_string();
        record
    }

    #[tokio::test]
    async fn test_off_topic_question_short_circuits() {
        let dir = TempDir::new().unwrap();
        let generator = RecordingGenerator::default();
        let rag = service(&dir, generator.clone());

        let answer = rag.search_and_answer("Who won the cricket match?", None).await;
        assert_eq!(answer.answer, OFF_TOPIC_ANSWER);
        assert_eq!(answer.confidence, 0.0);
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_information() {
        let dir = TempDir::new().unwrap();
        let generator = RecordingGenerator::default();
        let rag = service(&dir, generator.clone());

        let answer = rag.search_and_answer("What is dharma?", None).await;
        assert_eq!(answer.answer, NO_INFORMATION_ANSWER);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.degraded);
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_from_indexed_verse() {
        let dir = TempDir::new().unwrap();
        let generator = RecordingGenerator::default();
        let rag = service(&dir, generator.clone());

        assert_eq!(rag.ingest(vec![gita_record()]).await.unwrap(), 1);

        let answer = rag.search_and_answer("What is dharma?", None).await;
        assert_eq!(answer.answer, "answer to: What is dharma?");
        assert_eq!(answer.context_used, 1);
        assert!(answer.confidence > 0.0 && answer.confidence <= 1.0);
        assert!(answer.degraded);
        assert!(answer.error.is_none());

        let calls = generator.calls.lock().unwrap();
        let (question, context) = &calls[0];
        // 생성기에는 정규화 전 원문 질문이 전달됨
        assert_eq!(question, "What is dharma?");
        assert!(context.starts_with("Source: gita - Chapter 2, Verse 47"));
        assert!(context.contains("Sanskrit: X"));
        assert!(context.contains("Translation: dharma is duty"));
    }

    #[tokio::test]
    async fn test_source_filter_excludes_other_sources() {
        let dir = TempDir::new().unwrap();
        let rag = service(&dir, RecordingGenerator::default());
        rag.ingest(vec![gita_record()]).await.unwrap();

        let answer = rag
            .search_and_answer("What is dharma?", Some("ramayana"))
            .await;
        assert_eq!(answer.answer, NO_INFORMATION_ANSWER);
    }

    #[tokio::test]
    async fn test_context_uses_top_five() {
        let dir = TempDir::new().unwrap();
        let generator = RecordingGenerator::default();
        let rag = service(&dir, generator.clone());

        let records: Vec<ChunkRecord> = (0..8)
            .map(|i| ChunkRecord::new(format!("Verse about karma number {}", i), "gita"))
            .collect();
        rag.ingest(records).await.unwrap();

        let answer = rag.search_and_answer("What is karma?", None).await;
        assert_eq!(answer.context_used, CONTEXT_RESULTS);

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0].1.matches(CONTEXT_SEPARATOR).count(), CONTEXT_RESULTS - 1);
    }

    #[tokio::test]
    async fn test_generation_failure_degrades() {
        let dir = TempDir::new().unwrap();
        let generator = RecordingGenerator {
            fail: true,
            ..Default::default()
        };
        let rag = service(&dir, generator);
        rag.ingest(vec![gita_record()]).await.unwrap();

        let answer = rag.search_and_answer("What is dharma?", None).await;
        assert_eq!(answer.answer, GENERATION_UNAVAILABLE);
        assert!(answer.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_invalid_scores_return_retry_answer() {
        let dir = TempDir::new().unwrap();
        let hit = SearchResult {
            record: ChunkRecord::new("text", "gita"),
            score: f32::NAN,
        };
        let rag = service_with(
            &dir,
            Box::new(FixedStore(vec![hit])),
            RecordingGenerator::default(),
        );

        let answer = rag.search_and_answer("What is dharma?", None).await;
        assert_eq!(answer.answer, RETRY_ANSWER);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.error.is_some());
    }

    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let dir = TempDir::new().unwrap();
        let hit = SearchResult {
            record: ChunkRecord::new("text", "gita"),
            score: -0.4,
        };
        let rag = service_with(
            &dir,
            Box::new(FixedStore(vec![hit])),
            RecordingGenerator::default(),
        );

        let answer = rag.search_and_answer("What is dharma?", None).await;
        assert_eq!(answer.confidence, 0.0);
        assert_eq!(answer.context_used, 1);
    }

    #[tokio::test]
    async fn test_search_by_verse() {
        let dir = TempDir::new().unwrap();
        let rag = service(&dir, RecordingGenerator::default());
        rag.ingest(vec![gita_record()]).await.unwrap();

        let found = rag.search_by_verse("2", "47").await;
        assert!(found.found);
        let details = found.verse.unwrap();
        assert_eq!(details.translation, "dharma is duty");
        assert_eq!(details.chapter, "2");

        let missing = rag.search_by_verse("9", "99").await;
        assert!(!missing.found);
        assert!(missing.verse.is_none());
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            serde_json::json!({ "found": false })
        );
    }

    #[tokio::test]
    async fn test_search_by_verse_with_api_embedder() {
        use std::time::Duration;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use crate::embedding::MistralEmbedding;

        // API 벡터는 해시 공간과 무관하므로 조회에 쓰이면 안 됨
        let api_vector: Vec<f32> = (0..DIM)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "data": [{ "embedding": api_vector }] })),
            )
            .expect(0)
            .mount(&server)
            .await;

        let provider = MistralEmbedding::new("test-key".to_string(), DIM)
            .unwrap()
            .with_endpoint(&format!("{}/v1/embeddings", server.uri()), "mistral-embed")
            .with_retries(1, Duration::ZERO);
        let embedder = Embedder::new(Some(Box::new(provider)), DIM);

        let dir = TempDir::new().unwrap();
        let store = FlatVectorStore::open(&dir.path().join("index"), DIM, 0.65);
        let rag = RagService::with_components(
            test_config(&dir),
            embedder,
            Box::new(store),
            Box::new(RecordingGenerator::default()),
            Box::new(KeywordRelevanceGate::new().unwrap()),
        )
        .unwrap();

        rag.ingest(vec![gita_record()]).await.unwrap();

        let lookup = rag.search_by_verse("2", "47").await;
        assert!(lookup.found);
        assert_eq!(lookup.verse.unwrap().verse, "47");
    }

    #[tokio::test]
    async fn test_answer_with_default_thresholds() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            qdrant_url: None,
            index_dir: dir.path().join("index"),
            data_dir: dir.path().join("data"),
            embedding_dimension: DIM,
            ..Config::default()
        };
        assert_eq!(config.similarity_threshold, 0.65);

        let generator = RecordingGenerator::default();
        let store = open_store(&config).await.unwrap();
        let rag = RagService::with_components(
            config,
            Embedder::hash_only(DIM),
            store,
            Box::new(generator.clone()),
            Box::new(KeywordRelevanceGate::new().unwrap()),
        )
        .unwrap();
        rag.ingest(vec![gita_record()]).await.unwrap();

        // 해시 경로 유사도(약 0.61)는 Qdrant 기준 미만이어도 로컬 인덱스에서는 검색됨
        let answer = rag.search_and_answer("What is dharma?", None).await;
        assert_eq!(answer.context_used, 1);
        assert!(answer.confidence > 0.0);

        let calls = generator.calls.lock().unwrap();
        assert!(calls[0].1.contains("Source: gita - Chapter 2, Verse 47"));
    }

    #[tokio::test]
    async fn test_ingest_keeps_short_records_and_splits_long_ones() {
        let dir = TempDir::new().unwrap();
        let rag = service(&dir, RecordingGenerator::default());

        let long = ChunkRecord::new("The self is eternal and unborn. ".repeat(40), "gita");
        let added = rag
            .ingest(vec![gita_record(), long, ChunkRecord::new("   ", "gita")])
            .await
            .unwrap();
        assert!(added > 2);

        let stats = rag.get_stats().await;
        assert_eq!(stats.total_documents, added);
        assert_eq!(stats.backend, "flat");
    }

    #[tokio::test]
    async fn test_initialize_from_data_dir() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(
            data.join("gita.txt"),
            "Chapter-2\nTEXT 47\nkarmany evadhikaras te\n\
             TRANSLATION\nYou have a right to perform your duty.\n",
        )
        .unwrap();

        let rag = service(&dir, RecordingGenerator::default());

        let first = rag.initialize(false).await.unwrap();
        assert_eq!(first, 1);
        // 이미 초기화됨
        assert_eq!(rag.initialize(false).await.unwrap(), 0);
        // 강제 재적재는 비운 뒤 다시 채움
        assert_eq!(rag.initialize(true).await.unwrap(), 1);
        assert_eq!(rag.get_stats().await.total_documents, 1);

        assert!(rag.search_by_verse("2", "47").await.found);
    }

    #[tokio::test]
    async fn test_stats_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let rag = service_with(
            &dir,
            Box::new(FixedStore(vec![])),
            RecordingGenerator::default(),
        );

        let stats = rag.get_stats().await;
        assert_eq!(stats.status, "unknown");
        assert!(stats.error.is_some());
    }

    #[tokio::test]
    async fn test_new_falls_back_to_flat_store() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = Config {
            qdrant_url: Some(server.uri()),
            mistral_api_key: None,
            openrouter_api_key: None,
            ..test_config(&dir)
        };

        let rag = RagService::new(config).await.unwrap();
        assert_eq!(rag.backend_name(), "flat");
    }

    #[test]
    fn test_format_context_entry_without_verse() {
        let result = SearchResult {
            record: ChunkRecord::new("Hanuman leapt across the ocean.", "characters"),
            score: 0.9,
        };
        assert_eq!(
            format_context_entry(&result),
            "Source: characters\nText: Hanuman leapt across the ocean."
        );
    }
}
