//! Text Chunking Module
//!
//! 경전 텍스트를 오버랩이 있는 청크로 분할합니다.
//! 청크 끝은 가능하면 문장/문단/절 경계에 맞춥니다.

use anyhow::{Context, Result};
use regex::Regex;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// 크기와 오버랩 지정
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;
}

// ============================================================================
// TextChunker
// ============================================================================

/// 경계 인식 슬라이딩 윈도우 청커
///
/// 윈도우 끝 직전 `overlap` 문자 안에서 다음 순서로 경계를 찾습니다:
/// 1. 문장 끝 구두점 + 공백 (`.` `!` `?` `।` `॥`)
/// 2. 빈 줄 (문단 경계)
/// 3. 쉼표/세미콜론 + 공백
///
/// 경계가 없으면 원래 위치에서 자릅니다.
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    sentence_re: Regex,
    paragraph_re: Regex,
    clause_re: Regex,
}

impl TextChunker {
    /// 설정으로 생성
    ///
    /// 오버랩은 `chunk_size - 1` 이하로 제한됩니다.
    pub fn new(config: ChunkConfig) -> Result<Self> {
        let chunk_size = config.chunk_size.max(1);
        let overlap = config.overlap.min(chunk_size - 1);

        Ok(Self {
            chunk_size,
            overlap,
            sentence_re: Regex::new(r"[.!?।॥]\s+").context("Invalid sentence pattern")?,
            paragraph_re: Regex::new(r"\n\s*\n").context("Invalid paragraph pattern")?,
            clause_re: Regex::new(r"[,;]\s+").context("Invalid clause pattern")?,
        })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Result<Self> {
        Self::new(ChunkConfig::default())
    }

    /// `chars[from..to]` 구간에서 자를 위치 탐색 (문자 인덱스)
    fn find_boundary(&self, chars: &[char], from: usize, to: usize) -> usize {
        let region: String = chars[from..to].iter().collect();

        for re in [&self.sentence_re, &self.paragraph_re, &self.clause_re] {
            if let Some(m) = re.find(&region) {
                return from + region[..m.end()].chars().count();
            }
        }

        to
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return vec![];
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        if len < self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < len {
            let raw_end = start + self.chunk_size;
            let mut end = raw_end.min(len);

            // 마지막 윈도우가 아니면 경계에 맞춤
            if raw_end < len {
                let boundary = self.find_boundary(&chars, raw_end - self.overlap, raw_end);
                if boundary > start {
                    end = boundary;
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if end >= len {
                break;
            }

            // 항상 전진
            start = (start + 1).max(end.saturating_sub(self.overlap));
        }

        chunks
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Result<Box<dyn Chunker>> {
    Ok(Box::new(TextChunker::with_defaults()?))
}

/// 설정 지정 청커 생성
pub fn text_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(TextChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================
