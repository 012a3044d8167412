//! 임베딩 모듈 - Mistral API를 통한 텍스트 벡터화 + 해시 대체 경로
//!
//! 텍스트를 고정 차원(D) 벡터로 변환합니다.
//! - API 경로: Mistral 임베딩 API (429 시 지수 백오프)
//! - 해시 경로: SHA-256 다이제스트를 D 차원으로 순환 확장 (의미 없음, 결정적)
//!
//! API가 실패해도 호출자는 항상 길이 D의 벡터를 받습니다.
//! 해시 경로 결과는 `EmbeddingMode::HashFallback`으로 표시됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = Embedder::from_config(&config)?;
//! let embedding = embedder.embed("What is dharma?", true).await;
//! if embedding.is_degraded() { /* ... */ }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 외부 임베딩 서비스를 감싸는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Mistral Embedding
// ============================================================================

/// 429 에러 포함 최대 시도 횟수
const MAX_ATTEMPTS: u32 = 3;
/// 재시도 시 초기 백오프
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// Mistral 임베딩 구현체
#[derive(Debug)]
pub struct MistralEmbedding {
    api_key: String,
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
    max_attempts: u32,
    backoff_base: Duration,
}

impl MistralEmbedding {
    /// 새 Mistral 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Mistral API 키
    /// * `dimension` - 기대하는 임베딩 차원
    pub fn new(api_key: String, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            url: crate::config::DEFAULT_EMBED_URL.to_string(),
            model: "mistral-embed".to_string(),
            dimension,
            max_attempts: MAX_ATTEMPTS,
            backoff_base: INITIAL_BACKOFF,
        })
    }

    /// 설정에서 생성 (API 키 필요)
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .mistral_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("MISTRAL_API_KEY not set"))?;

        Ok(Self::new(api_key, config.embedding_dimension)?
            .with_endpoint(&config.embed_url, &config.embedding_model)
            .with_retries(config.embed_max_retries, config.embed_backoff_base))
    }

    /// 엔드포인트와 모델 지정
    pub fn with_endpoint(mut self, url: &str, model: &str) -> Self {
        self.url = url.to_string();
        self.model = model.to_string();
        self
    }

    /// 재시도 횟수와 백오프 기본값 지정
    pub fn with_retries(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base = backoff_base;
        self
    }

    /// 지수 백오프 대기 시간 (base * 2^attempt)
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// 임베딩 API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// 임베딩 API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for MistralEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            input: vec![text],
        };

        let mut last_error: Option<anyhow::Error> = None;

        // 재시도 루프 (429는 지수 백오프, 그 외 실패는 고정 대기)
        for attempt in 0..self.max_attempts {
            let is_last = attempt + 1 >= self.max_attempts;

            let response = match self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(
                        "Embedding request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_attempts,
                        e
                    );
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    if !is_last {
                        tokio::time::sleep(self.backoff_base).await;
                    }
                    continue;
                }
            };

            let status = response.status();

            // 429 Rate Limit 에러 - 지수 백오프
            if status.as_u16() == 429 {
                let backoff = self.backoff(attempt);
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    self.max_attempts
                );
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));
                if !is_last {
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if !status.is_success() {
                tracing::warn!(
                    "Embedding API error {} (attempt {}/{})",
                    status,
                    attempt + 1,
                    self.max_attempts
                );
                last_error = Some(anyhow::anyhow!("Embedding API error ({}): {}", status, body));
                if !is_last {
                    tokio::time::sleep(self.backoff_base).await;
                }
                continue;
            }

            let parsed: EmbedResponse =
                serde_json::from_str(&body).context("Failed to parse embedding response")?;
            let embedding = parsed
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .ok_or_else(|| anyhow::anyhow!("Embedding response contained no data"))?;

            if embedding.len() != self.dimension {
                anyhow::bail!(
                    "Embedding API returned {} dimensions, expected {}",
                    embedding.len(),
                    self.dimension
                );
            }

            return Ok(embedding);
        }

        // 모든 재시도 실패
        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("Embedding failed after {} attempts", self.max_attempts)
        }))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Hash Embedding (degraded path)
// ============================================================================

/// 해시 기반 의사 임베딩
///
/// SHA-256 다이제스트의 각 바이트를 [0, 1]로 스케일하고
/// `dimension` 길이가 될 때까지 순환 반복합니다.
/// 같은 텍스트는 항상 같은 벡터가 됩니다. 의미적 유사도는 없습니다.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());

    (0..dimension)
        .map(|i| f32::from(digest[i % digest.len()]) / 255.0)
        .collect()
}

// ============================================================================
// Embedder
// ============================================================================

/// 임베딩 생성 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// 외부 API
    Api,
    /// 해시 대체 경로 (품질 저하)
    HashFallback,
}

/// 임베딩 결과
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub mode: EmbeddingMode,
}

impl Embedding {
    /// 해시 경로로 생성되었는지 여부
    pub fn is_degraded(&self) -> bool {
        self.mode == EmbeddingMode::HashFallback
    }
}

/// 임베딩 생성기
///
/// API 프로바이더가 없거나 실패하면 해시 경로로 떨어집니다.
pub struct Embedder {
    provider: Option<Box<dyn EmbeddingProvider>>,
    dimension: usize,
}

impl Embedder {
    pub fn new(provider: Option<Box<dyn EmbeddingProvider>>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
        }
    }

    /// 해시 경로만 사용하는 생성기
    pub fn hash_only(dimension: usize) -> Self {
        Self::new(None, dimension)
    }

    /// 설정에서 생성
    ///
    /// `MISTRAL_API_KEY`가 없으면 해시 경로만 사용합니다.
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.has_embedding_key() {
            tracing::warn!("MISTRAL_API_KEY not set, embeddings will use the hash fallback");
            return Ok(Self::hash_only(config.embedding_dimension));
        }

        let provider = MistralEmbedding::from_config(config)?;
        tracing::info!(
            "Using {} API embedding (dimension: {})",
            provider.name(),
            provider.dimension()
        );
        Ok(Self::new(Some(Box::new(provider)), config.embedding_dimension))
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// 텍스트 임베딩
    ///
    /// `use_api`가 false면 해시 경로 (대량 인덱싱용).
    /// 결과 길이는 항상 `dimension`입니다.
    pub async fn embed(&self, text: &str, use_api: bool) -> Embedding {
        if use_api && !text.trim().is_empty() {
            if let Some(provider) = &self.provider {
                match provider.embed(text).await {
                    Ok(values) if values.len() == self.dimension => {
                        return Embedding {
                            values,
                            mode: EmbeddingMode::Api,
                        };
                    }
                    Ok(values) => {
                        tracing::error!(
                            "Provider {} returned {} dimensions, expected {}",
                            provider.name(),
                            values.len(),
                            self.dimension
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            "Error getting embedding from {}: {:#}",
                            provider.name(),
                            e
                        );
                    }
                }
                tracing::warn!("Using fallback hash-based embedding due to API issues");
            }
        }

        Embedding {
            values: hash_embedding(text, self.dimension),
            mode: EmbeddingMode::HashFallback,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embed_body(dimension: usize, value: f32) -> serde_json::Value {
        serde_json::json!({ "data": [{ "embedding": vec![value; dimension] }] })
    }

    fn mock_provider(server: &MockServer, dimension: usize) -> MistralEmbedding {
        MistralEmbedding::new("test-key".to_string(), dimension)
            .unwrap()
            .with_endpoint(&format!("{}/v1/embeddings", server.uri()), "mistral-embed")
            .with_retries(3, Duration::from_millis(5))
    }

    #[test]
    fn test_hash_embedding_length() {
        for dim in [1, 7, 32, 33, 1024, 1536] {
            assert_eq!(hash_embedding("dharma", dim).len(), dim);
        }
        assert!(hash_embedding("dharma", 0).is_empty());
    }

    #[test]
    fn test_hash_embedding_deterministic() {
        let a = hash_embedding("Karmanye vadhikaraste", 1024);
        let b = hash_embedding("Karmanye vadhikaraste", 1024);
        assert_eq!(a, b);
        assert_ne!(a, hash_embedding("Yoga is skill in action", 1024));
    }

    #[test]
    fn test_hash_embedding_cycles_digest() {
        let v = hash_embedding("cycle", 96);
        assert_eq!(v[0..32], v[32..64]);
        assert_eq!(v[0..32], v[64..96]);
        assert!(v.iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[tokio::test]
    async fn test_hash_only_embedder_is_degraded() {
        let embedder = Embedder::hash_only(64);
        let embedding = embedder.embed("What is dharma?", true).await;
        assert!(embedding.is_degraded());
        assert_eq!(embedding.values, hash_embedding("What is dharma?", 64));
    }

    #[tokio::test]
    async fn test_api_embedding_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_body(16, 0.25)))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = Embedder::new(Some(Box::new(mock_provider(&server, 16))), 16);
        let embedding = embedder.embed("dharma", true).await;

        assert_eq!(embedding.mode, EmbeddingMode::Api);
        assert_eq!(embedding.values, vec![0.25; 16]);
    }

    #[tokio::test]
    async fn test_bulk_path_skips_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_body(16, 0.25)))
            .expect(0)
            .mount(&server)
            .await;

        let embedder = Embedder::new(Some(Box::new(mock_provider(&server, 16))), 16);
        let embedding = embedder.embed("dharma", false).await;
        assert!(embedding.is_degraded());
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_body(8, 0.5)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = mock_provider(&server, 8);
        let values = provider.embed("karma").await.unwrap();
        assert_eq!(values, vec![0.5; 8]);
    }

    #[tokio::test]
    async fn test_persistent_failure_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let embedder = Embedder::new(Some(Box::new(mock_provider(&server, 32))), 32);
        let embedding = embedder.embed("moksha", true).await;

        assert!(embedding.is_degraded());
        assert_eq!(embedding.values, hash_embedding("moksha", 32));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let embedder = Embedder::new(Some(Box::new(mock_provider(&server, 8))), 8);
        let embedding = embedder.embed("atman", true).await;
        assert!(embedding.is_degraded());
        assert_eq!(embedding.values.len(), 8);
    }

    #[tokio::test]
    async fn test_wrong_dimension_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embed_body(4, 0.1)))
            .mount(&server)
            .await;

        let embedder = Embedder::new(Some(Box::new(mock_provider(&server, 8))), 8);
        let embedding = embedder.embed("brahman", true).await;
        assert!(embedding.is_degraded());
        assert_eq!(embedding.values.len(), 8);
    }

    #[test]
    fn test_backoff_doubles() {
        let provider = MistralEmbedding::new("k".to_string(), 8)
            .unwrap()
            .with_retries(3, Duration::from_millis(100));
        assert_eq!(provider.backoff(0), Duration::from_millis(100));
        assert_eq!(provider.backoff(1), Duration::from_millis(200));
        assert_eq!(provider.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn test_from_config_without_key_is_hash_only() {
        let config = Config::default();
        let embedder = Embedder::from_config(&config).unwrap();
        assert!(!embedder.has_provider());
        assert_eq!(embedder.dimension(), 1024);
    }
}
