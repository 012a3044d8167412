//! 설정 모듈 - 환경변수 기반 설정 로드
//!
//! API 키, 벡터 저장소 주소, 청킹/검색 파라미터를 환경변수에서 읽습니다.
//! 작업 디렉토리의 `.env` 파일이 있으면 먼저 적재하며, 이미 설정된 변수는 덮어쓰지 않습니다.
//! 빈 문자열은 미설정으로 취급합니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Mistral 임베딩 API 엔드포인트
pub const DEFAULT_EMBED_URL: &str = "https://api.mistral.ai/v1/embeddings";

/// OpenRouter 채팅 완성 API 엔드포인트
pub const DEFAULT_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// 기본 Qdrant 주소
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";

/// 기본 임베딩 차원 (mistral-embed)
pub const DEFAULT_DIMENSION: usize = 1024;

/// 기본 컬렉션 이름
pub const DEFAULT_COLLECTION: &str = "hindu_texts";

// ============================================================================
// Data Directory
// ============================================================================

/// 인덱스 저장 디렉토리 경로 (~/.sutra-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sutra-rag")
}

// ============================================================================
// Config
// ============================================================================

/// 전체 파이프라인 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// Mistral 임베딩 API 키 (없으면 해시 임베딩만 사용)
    pub mistral_api_key: Option<String>,
    /// OpenRouter API 키 (없으면 답변 생성 불가)
    pub openrouter_api_key: Option<String>,
    pub embed_url: String,
    pub embedding_model: String,
    pub chat_url: String,
    pub llm_model: String,
    /// Qdrant 주소 (None이면 로컬 인덱스만 사용)
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub collection_name: String,
    /// 원본 데이터 파일 디렉토리
    pub data_dir: PathBuf,
    /// 로컬 인덱스 파일 디렉토리
    pub index_dir: PathBuf,
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// Qdrant 검색 결과 최소 유사도
    pub similarity_threshold: f32,
    /// 로컬 인덱스 검색 결과 최소 유사도 (0.0이면 필터 없음)
    pub local_similarity_floor: f32,
    pub embedding_dimension: usize,
    /// 임베딩 API 최대 시도 횟수
    pub embed_max_retries: u32,
    /// 429 백오프 기본 대기 시간 (시도마다 2배)
    pub embed_backoff_base: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mistral_api_key: None,
            openrouter_api_key: None,
            embed_url: DEFAULT_EMBED_URL.to_string(),
            embedding_model: "mistral-embed".to_string(),
            chat_url: DEFAULT_CHAT_URL.to_string(),
            llm_model: "mistralai/mixtral-8x7b-instruct".to_string(),
            qdrant_url: Some(DEFAULT_QDRANT_URL.to_string()),
            qdrant_api_key: None,
            collection_name: DEFAULT_COLLECTION.to_string(),
            data_dir: PathBuf::from("attached_assets"),
            index_dir: get_data_dir(),
            chunk_size: 400,
            chunk_overlap: 100,
            similarity_threshold: 0.65,
            local_similarity_floor: 0.0,
            embedding_dimension: DEFAULT_DIMENSION,
            embed_max_retries: 3,
            embed_backoff_base: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// `.env` 적재 후 환경변수에서 설정 로드
    pub fn load() -> Result<Self> {
        if load_env_file(Path::new(".env"))? {
            tracing::debug!("Loaded environment from .env");
        }
        Self::from_env()
    }

    /// 환경변수에서 설정 로드
    ///
    /// 설정되지 않은 값은 기본값을 사용합니다.
    /// `QDRANT_URL`을 빈 문자열로 지정하면 Qdrant 연결 시도를 건너뜁니다.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let qdrant_url = match std::env::var("QDRANT_URL") {
            Ok(url) if url.trim().is_empty() => None,
            Ok(url) => Some(url),
            Err(_) => defaults.qdrant_url,
        };

        Ok(Self {
            mistral_api_key: env_non_empty("MISTRAL_API_KEY"),
            openrouter_api_key: env_non_empty("OPENROUTER_API_KEY"),
            embed_url: env_non_empty("MISTRAL_EMBED_URL").unwrap_or(defaults.embed_url),
            embedding_model: env_non_empty("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            chat_url: env_non_empty("OPENROUTER_URL").unwrap_or(defaults.chat_url),
            llm_model: env_non_empty("LLM_MODEL").unwrap_or(defaults.llm_model),
            qdrant_url,
            qdrant_api_key: env_non_empty("QDRANT_API_KEY"),
            collection_name: env_non_empty("QDRANT_COLLECTION")
                .unwrap_or(defaults.collection_name),
            data_dir: env_non_empty("SUTRA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            index_dir: env_non_empty("SUTRA_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            chunk_size: env_parse("CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: env_parse("CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            similarity_threshold: env_parse("SIMILARITY_THRESHOLD")?
                .unwrap_or(defaults.similarity_threshold),
            local_similarity_floor: env_parse("LOCAL_SIMILARITY_FLOOR")?
                .unwrap_or(defaults.local_similarity_floor),
            embedding_dimension: env_parse("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            embed_max_retries: defaults.embed_max_retries,
            embed_backoff_base: defaults.embed_backoff_base,
        })
    }

    /// 임베딩 API 키 존재 여부
    pub fn has_embedding_key(&self) -> bool {
        self.mistral_api_key.is_some()
    }

    /// 답변 생성 API 키 존재 여부
    pub fn has_generation_key(&self) -> bool {
        self.openrouter_api_key.is_some()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// dotenv 파일 적재 (파일이 없으면 false)
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

/// 비어있지 않은 환경변수 값
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 환경변수를 숫자 등으로 파싱 (미설정이면 None)
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_non_empty(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.embedding_dimension, 1024);
        assert_eq!(config.collection_name, "hindu_texts");
        assert!((config.similarity_threshold - 0.65).abs() < f32::EPSILON);
        assert_eq!(config.local_similarity_floor, 0.0);
        assert!(!config.has_embedding_key());
        assert!(!config.has_generation_key());
    }

    #[test]
    fn test_env_parse_invalid() {
        std::env::set_var("SUTRA_TEST_BAD_NUMBER", "abc");
        let result = env_parse::<usize>("SUTRA_TEST_BAD_NUMBER");
        assert!(result.is_err());
        std::env::remove_var("SUTRA_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_env_parse_missing_and_empty() {
        std::env::remove_var("SUTRA_TEST_MISSING");
        assert!(env_parse::<usize>("SUTRA_TEST_MISSING").unwrap().is_none());

        std::env::set_var("SUTRA_TEST_EMPTY", "   ");
        assert!(env_non_empty("SUTRA_TEST_EMPTY").is_none());
        std::env::remove_var("SUTRA_TEST_EMPTY");
    }

    #[test]
    fn test_env_parse_float() {
        std::env::set_var("SUTRA_TEST_FLOAT", "0.5");
        let value = env_parse::<f32>("SUTRA_TEST_FLOAT").unwrap();
        assert_eq!(value, Some(0.5));
        std::env::remove_var("SUTRA_TEST_FLOAT");
    }

    #[test]
    fn test_load_env_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "SUTRA_TEST_DOTENV_KEY=from-file\n").unwrap();

        std::env::remove_var("SUTRA_TEST_DOTENV_KEY");
        assert!(load_env_file(&path).unwrap());
        assert_eq!(env_non_empty("SUTRA_TEST_DOTENV_KEY").as_deref(), Some("from-file"));

        // 이미 설정된 값은 유지
        std::env::set_var("SUTRA_TEST_DOTENV_KEY", "from-shell");
        load_env_file(&path).unwrap();
        assert_eq!(env_non_empty("SUTRA_TEST_DOTENV_KEY").as_deref(), Some("from-shell"));
        std::env::remove_var("SUTRA_TEST_DOTENV_KEY");
    }

    #[test]
    fn test_load_env_file_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!load_env_file(&dir.path().join(".env")).unwrap());
    }
}
