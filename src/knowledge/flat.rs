//! Flat Vector Store - 로컬 전수 탐색 인덱스
//!
//! Qdrant를 사용할 수 없을 때의 대체 백엔드입니다.
//! 정규화된 벡터와 페이로드를 같은 순서로 보관하고,
//! 변경될 때마다 디스크에 저장합니다.
//!
//! 저장 파일:
//! - `vector_index.bin`: 헤더(`SVIX`, 버전, 차원, 개수) + little-endian f32
//! - `metadata.json`: 페이로드 배열 (길이 = 벡터 개수)

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::vector::{
    dot, normalize, prepare_entries, ChunkRecord, DocumentChunk, IndexError, IndexInfo,
    SearchResult, VectorStore,
};

/// 벡터 파일 이름
pub const INDEX_FILE: &str = "vector_index.bin";
/// 메타데이터 파일 이름
pub const METADATA_FILE: &str = "metadata.json";

const MAGIC: &[u8; 4] = b"SVIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

// ============================================================================
// FlatIndex
// ============================================================================

/// 인메모리 인덱스 상태
///
/// `vectors.len() == payloads.len()`이 항상 유지됩니다.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    payloads: Vec<ChunkRecord>,
}

impl FlatIndex {
    /// 빈 인덱스
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            payloads: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// 정규화된 엔트리 추가
    fn append(&mut self, entries: Vec<(Vec<f32>, ChunkRecord)>) {
        for (vector, payload) in entries {
            self.vectors.push(vector);
            self.payloads.push(payload);
        }
    }

    fn reset(&mut self) {
        self.vectors.clear();
        self.payloads.clear();
    }

    /// 전수 탐색 (query는 정규화된 상태)
    fn search(
        &self,
        query: &[f32],
        limit: usize,
        source_filter: Option<&str>,
        min_score: f32,
    ) -> Vec<SearchResult> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| source_filter.map_or(true, |s| self.payloads[*i].source == s))
            .map(|(i, v)| (i, dot(query, v)))
            .filter(|(_, score)| *score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(i, score)| SearchResult {
                record: self.payloads[i].clone(),
                score,
            })
            .collect()
    }

    /// 디스크에서 로드
    ///
    /// 두 파일이 모두 없으면 빈 인덱스. 하나만 있거나 내용이 맞지 않으면 에러.
    pub fn load(dir: &Path, dimension: usize) -> Result<Self, IndexError> {
        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);

        match (index_path.exists(), metadata_path.exists()) {
            (false, false) => return Ok(Self::new(dimension)),
            (true, true) => {}
            _ => {
                return Err(IndexError::Corrupted(
                    "index and metadata files must exist together".to_string(),
                ))
            }
        }

        let bytes = std::fs::read(&index_path)?;
        let vectors = decode_vectors(&bytes, dimension)?;

        let metadata = std::fs::read_to_string(&metadata_path)?;
        let payloads: Vec<ChunkRecord> = serde_json::from_str(&metadata)?;

        if payloads.len() != vectors.len() {
            return Err(IndexError::Corrupted(format!(
                "{} vectors but {} metadata entries",
                vectors.len(),
                payloads.len()
            )));
        }

        Ok(Self {
            dimension,
            vectors,
            payloads,
        })
    }

    /// 디스크에 저장 (임시 파일 작성 후 rename)
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir)?;

        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        let index_tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        let metadata_tmp = dir.join(format!("{}.tmp", METADATA_FILE));

        std::fs::write(&index_tmp, encode_vectors(&self.vectors, self.dimension))?;
        std::fs::write(&metadata_tmp, serde_json::to_vec(&self.payloads)?)?;

        std::fs::rename(&index_tmp, &index_path)?;
        std::fs::rename(&metadata_tmp, &metadata_path)?;

        Ok(())
    }
}

// ============================================================================
// Binary Encoding
// ============================================================================

fn encode_vectors(vectors: &[Vec<f32>], dimension: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * dimension * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(dimension as u32).to_le_bytes());
    bytes.extend_from_slice(&(vectors.len() as u64).to_le_bytes());

    for vector in vectors {
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    bytes
}

fn decode_vectors(bytes: &[u8], dimension: usize) -> Result<Vec<Vec<f32>>, IndexError> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        return Err(IndexError::Corrupted("missing index header".to_string()));
    }

    let read_u32 = |at: usize| {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    };

    let version = read_u32(4);
    if version != FORMAT_VERSION {
        return Err(IndexError::Corrupted(format!("unsupported version {}", version)));
    }

    let stored_dimension = read_u32(8) as usize;
    if stored_dimension != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: stored_dimension,
        });
    }

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let body = &bytes[HEADER_LEN..];
    let expected_len = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| IndexError::Corrupted("vector count overflow".to_string()))?;
    if body.len() != expected_len {
        return Err(IndexError::Corrupted(format!(
            "expected {} bytes of vectors, found {}",
            expected_len,
            body.len()
        )));
    }

    let values: Vec<f32> = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(values
        .chunks(dimension.max(1))
        .map(<[f32]>::to_vec)
        .collect())
}

// ============================================================================
// FlatVectorStore
// ============================================================================

/// 로컬 플랫 인덱스 저장소
///
/// 추가/삭제는 잠금을 잡은 채 읽기-추가-저장을 수행하므로
/// 같은 프로세스 안의 동시 `add_documents` 호출은 직렬화됩니다.
pub struct FlatVectorStore {
    dir: PathBuf,
    dimension: usize,
    min_score: f32,
    state: Mutex<FlatIndex>,
}

impl FlatVectorStore {
    /// 인덱스 열기
    ///
    /// 저장된 파일을 읽지 못하면 빈 인덱스로 시작합니다.
    pub fn open(dir: &Path, dimension: usize, min_score: f32) -> Self {
        let index = match FlatIndex::load(dir, dimension) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("Could not load existing index from {:?}: {}", dir, e);
                FlatIndex::new(dimension)
            }
        };

        tracing::info!("Flat vector store initialized with {} vectors", index.len());

        Self {
            dir: dir.to_path_buf(),
            dimension,
            min_score,
            state: Mutex::new(index),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, FlatIndex>> {
        self.state
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn ensure_ready(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("Failed to create index directory")?;
        Ok(())
    }

    async fn add_documents(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        let entries = prepare_entries(chunks, self.dimension)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let added = entries.len();
        let mut index = self.lock()?;
        index.append(entries);

        if let Err(e) = index.save(&self.dir) {
            tracing::error!("Error saving index: {}", e);
        }

        tracing::info!("Added {} documents to flat vector store", added);
        Ok(added)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Vec<SearchResult> {
        if query_embedding.len() != self.dimension {
            tracing::error!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query_embedding.len()
            );
            return vec![];
        }

        let index = match self.lock() {
            Ok(index) => index,
            Err(e) => {
                tracing::error!("Error searching vector store: {}", e);
                return vec![];
            }
        };

        if index.is_empty() {
            tracing::warn!("No documents in vector store");
            return vec![];
        }

        let query = normalize(query_embedding);
        let results = index.search(&query, limit, source_filter, self.min_score);

        tracing::info!("Found {} similar documents", results.len());
        results
    }

    async fn info(&self) -> Result<IndexInfo> {
        let index = self.lock()?;
        Ok(IndexInfo {
            points_count: index.len(),
            indexed_vectors_count: index.len(),
            status: "available".to_string(),
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut index = self.lock()?;
        index.reset();
        index
            .save(&self.dir)
            .context("Failed to persist cleared index")?;

        tracing::info!("Collection cleared successfully");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "flat"
    }
}

// ============================================================================
// Tests
// ============================================================================
