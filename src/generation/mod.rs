//! 답변 생성 모듈 - OpenRouter 채팅 완성 API
//!
//! 검색된 경전 구절(context)과 질문으로 답변을 생성합니다.
//! 재시도는 하지 않습니다. 실패는 `generate_or_degraded`에서
//! 고정 안내 문구로 바뀌어 호출자에게 에러가 전달되지 않습니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// 생성 서비스 장애 시 사용자에게 보여줄 문구
pub const GENERATION_UNAVAILABLE: &str = "\
    I'm unable to generate an answer right now because the AI service is temporarily \
    unavailable. Please try again in a few moments, or check if there are relevant verses in \
    the database that might help with your question.";

const SYSTEM_PROMPT: &str = "\
You answer questions about Hindu religious texts: \
the Bhagavad Gita, Ramayana, Mahabharata and Yoga Sutras.

Rules:
- Answer directly, using only facts present in the provided sacred text context
- Stay respectful of the spiritual nature of the texts
- Do not cite sources, books, chapters or locations, and do not say where something is found
- Keep answers concise and informative";

const TEMPERATURE: f32 = 0.4;
const MAX_TOKENS: u32 = 1200;

// ============================================================================
// AnswerGenerator Trait
// ============================================================================

/// 답변 생성기 트레이트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// 질문과 컨텍스트로 답변 생성 (단일 호출)
    async fn generate(&self, question: &str, context: &str) -> Result<String>;

    /// 생성기 이름
    fn name(&self) -> &str;
}

/// 생성 실패를 고정 문구로 바꾸는 경계 함수
pub async fn generate_or_degraded(
    generator: &dyn AnswerGenerator,
    question: &str,
    context: &str,
) -> String {
    match generator.generate(question, context).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("Error generating answer with {}: {:#}", generator.name(), e);
            GENERATION_UNAVAILABLE.to_string()
        }
    }
}

/// 사용자 프롬프트 구성
pub fn build_user_prompt(question: &str, context: &str) -> String {
    format!(
        "Sacred Text Context:\n{}\n\nQuestion: {}\n\n\
         Answer directly with facts only, without mentioning sources or locations.",
        context, question
    )
}

// ============================================================================
// ChatGenerator (OpenAI 호환 API)
// ============================================================================

/// 채팅 완성 API 기반 생성기
#[derive(Debug)]
pub struct ChatGenerator {
    api_key: Option<String>,
    client: reqwest::Client,
    url: String,
    model: String,
}

/// 채팅 요청 본문
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// 채팅 응답
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: String,
}

impl ChatGenerator {
    /// 새 생성기
    ///
    /// # Arguments
    /// * `api_key` - API 키 (None이면 모든 호출이 실패)
    /// * `url` - 채팅 완성 엔드포인트
    /// * `model` - 모델 이름
    pub fn new(api_key: Option<String>, url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            url: url.to_string(),
            model: model.to_string(),
        })
    }

    /// 설정에서 생성
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.has_generation_key() {
            tracing::warn!("OPENROUTER_API_KEY not set, answers will use the degraded message");
        }
        Self::new(
            config.openrouter_api_key.clone(),
            &config.chat_url,
            &config.llm_model,
        )
    }
}

#[async_trait]
impl AnswerGenerator for ChatGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;

        let user_prompt = build_user_prompt(question, context);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send generation request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            anyhow::bail!("Generation API error ({}): {}", status, body);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse generation response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Generation response contained no choices"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
