//! Qdrant Vector Store - 원격 관리형 벡터 저장소
//!
//! Qdrant REST API를 reqwest로 호출합니다.
//! ref: https://qdrant.tech/documentation/concepts/
//!
//! 연결 시 컬렉션 존재를 확인(없으면 생성)하며, 이 확인이 실패하면
//! 호출자가 로컬 플랫 인덱스로 전환합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::vector::{
    normalize, prepare_entries, ChunkRecord, DocumentChunk, IndexInfo, SearchResult,
    VectorStore, BATCH_SIZE,
};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    points_count: Option<u64>,
    #[serde(default)]
    indexed_vectors_count: Option<u64>,
}

#[derive(Debug, Serialize)]
struct Point<'a> {
    id: u64,
    vector: &'a [f32],
    payload: &'a ChunkRecord,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<ChunkRecord>,
}

// ============================================================================
// QdrantVectorStore
// ============================================================================

/// Qdrant 벡터 저장소 구현
pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: Url,
    collection: String,
    api_key: Option<String>,
    dimension: usize,
    score_threshold: f32,
}

impl QdrantVectorStore {
    /// 클라이언트 생성 (네트워크 호출 없음)
    ///
    /// # Arguments
    /// * `url` - Qdrant 주소 (예: `http://localhost:6333`)
    /// * `collection` - 컬렉션 이름
    /// * `api_key` - 선택적 API 키
    /// * `dimension` - 벡터 차원
    /// * `score_threshold` - 검색 최소 유사도
    pub fn new(
        url: &str,
        collection: &str,
        api_key: Option<String>,
        dimension: usize,
        score_threshold: f32,
    ) -> Result<Self> {
        let mut normalized = url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("Invalid Qdrant URL: {}", url))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            collection: collection.to_string(),
            api_key,
            dimension,
            score_threshold,
        })
    }

    /// 연결 + 컬렉션 확인 (가용성 프로브)
    pub async fn connect(
        url: &str,
        collection: &str,
        api_key: Option<String>,
        dimension: usize,
        score_threshold: f32,
    ) -> Result<Self> {
        let store = Self::new(url, collection, api_key, dimension, score_threshold)?;
        store.ensure_ready().await?;
        tracing::info!("Qdrant vector store initialized ({})", store.base_url);
        Ok(store)
    }

    fn endpoint(&self, suffix: &str) -> Result<Url> {
        let path = if suffix.is_empty() {
            format!("collections/{}", self.collection)
        } else {
            format!("collections/{}/{}", self.collection, suffix)
        };
        self.base_url
            .join(&path)
            .with_context(|| format!("Invalid Qdrant path: {}", path))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// 컬렉션 정보 조회 (없으면 None)
    async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        let response = self
            .request(reqwest::Method::GET, self.endpoint("")?)
            .send()
            .await
            .context("Failed to reach Qdrant")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant collection lookup failed ({}): {}", status, body);
        }

        let parsed: QdrantResponse<CollectionInfo> = response
            .json()
            .await
            .context("Failed to parse Qdrant collection info")?;
        Ok(Some(parsed.result))
    }

    async fn create_collection(&self) -> Result<()> {
        tracing::info!("Creating collection: {}", self.collection);

        let body = json!({
            "vectors": { "size": self.dimension, "distance": "Cosine" }
        });
        let response = self
            .request(reqwest::Method::PUT, self.endpoint("")?)
            .json(&body)
            .send()
            .await
            .context("Failed to create Qdrant collection")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant collection create failed ({}): {}", status, body);
        }
        Ok(())
    }

    /// 한 배치 업로드
    async fn upsert_batch(&self, first_id: u64, batch: &[(Vec<f32>, ChunkRecord)]) -> Result<()> {
        let points: Vec<Point<'_>> = batch
            .iter()
            .enumerate()
            .map(|(i, (vector, payload))| Point {
                id: first_id + i as u64,
                vector,
                payload,
            })
            .collect();

        let mut url = self.endpoint("points")?;
        url.set_query(Some("wait=true"));

        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&json!({ "points": points }))
            .send()
            .await
            .context("Failed to upload points")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant upsert failed ({}): {}", status, body);
        }
        Ok(())
    }

    async fn try_search(
        &self,
        query: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let mut body = json!({
            "vector": query,
            "limit": limit,
            "with_payload": true,
            "score_threshold": self.score_threshold,
        });
        if let Some(source) = source_filter {
            body["filter"] = json!({
                "must": [{ "key": "source", "match": { "value": source } }]
            });
        }

        let response = self
            .request(reqwest::Method::POST, self.endpoint("points/search")?)
            .json(&body)
            .send()
            .await
            .context("Failed to send search request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant search failed ({}): {}", status, body);
        }

        let parsed: QdrantResponse<Vec<ScoredPoint>> = response
            .json()
            .await
            .context("Failed to parse search response")?;

        Ok(parsed
            .result
            .into_iter()
            .map(|hit| SearchResult {
                record: hit.payload.unwrap_or_default(),
                score: hit.score,
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_ready(&self) -> Result<()> {
        match self.collection_info().await? {
            Some(_) => {
                tracing::debug!("Collection {} already exists", self.collection);
                Ok(())
            }
            None => self.create_collection().await,
        }
    }

    async fn add_documents(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        let entries = prepare_entries(chunks, self.dimension)?;
        if entries.is_empty() {
            return Ok(0);
        }

        // 포인트 ID는 현재 개수부터 이어서 부여
        let offset = match self.collection_info().await {
            Ok(info) => info.and_then(|i| i.points_count).unwrap_or(0),
            Err(e) => {
                tracing::error!("Error adding documents to vector store: {:#}", e);
                return Ok(0);
            }
        };

        let total_batches = entries.len().div_ceil(BATCH_SIZE);
        let mut inserted = 0;

        for (batch_no, batch) in entries.chunks(BATCH_SIZE).enumerate() {
            if let Err(e) = self.upsert_batch(offset + inserted as u64, batch).await {
                tracing::error!(
                    "Error adding documents to vector store (batch {}/{}): {:#}",
                    batch_no + 1,
                    total_batches,
                    e
                );
                return Ok(inserted);
            }
            inserted += batch.len();
            tracing::debug!("Uploaded batch {}/{}", batch_no + 1, total_batches);
        }

        tracing::info!("Successfully added {} documents to vector store", inserted);
        Ok(inserted)
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
        if limit == 0 {
            return vec![];
        }

        let query = normalize(query_embedding);
        match self.try_search(&query, limit, source_filter).await {
            Ok(mut results) => {
                results.truncate(limit);
                tracing::info!("Found {} similar documents", results.len());
                results
            }
            Err(e) => {
                tracing::error!("Error searching vector store: {:#}", e);
                vec![]
            }
        }
    }

    async fn info(&self) -> Result<IndexInfo> {
        let info = self
            .collection_info()
            .await?
            .ok_or_else(|| anyhow::anyhow!("Collection {} not found", self.collection))?;

        Ok(IndexInfo {
            points_count: info.points_count.unwrap_or(0) as usize,
            indexed_vectors_count: info.indexed_vectors_count.unwrap_or(0) as usize,
            status: info.status,
        })
    }

    async fn clear(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, self.endpoint("")?)
            .send()
            .await
            .context("Failed to delete Qdrant collection")?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant collection delete failed ({}): {}", status, body);
        }

        self.ensure_ready().await?;
        tracing::info!("Collection cleared successfully");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}

// ============================================================================
// Tests
// ============================================================================
