//! Relevance Gate - 질문이 경전 도메인에 속하는지 판별
//!
//! 임베딩/검색 전에 실행되는 키워드 기반 필터입니다.
//! 도메인 키워드와 오프토픽 키워드는 단어 시작 위치에서만 매칭합니다
//! ("ram"은 "ramayana"에는 매칭되지만 "program"에는 매칭되지 않음).

use anyhow::{Context, Result};
use regex::Regex;

/// 도메인 키워드 (인물, 개념, 경전 이름)
const DOMAIN_KEYWORDS: &[&str] = &[
    "krishna", "rama", "ram", "sita", "hanuman", "arjuna", "dharma", "karma", "yoga",
    "meditation", "bhagavad", "gita", "ramayana", "mahabharata", "vedas", "upanishads",
    "sanskrit", "moksha", "nirvana", "hindu", "hinduism", "spiritual", "soul", "atman",
    "brahman", "vishnu", "shiva", "ganesha", "devi", "goddess", "god", "divine", "sacred",
    "holy", "temple", "prayer", "mantra", "om", "aum", "patanjali", "sage", "guru", "ashram",
    "verse", "chapter", "shloka", "sutra", "philosophy", "truth", "consciousness", "devotion",
    "worship", "faith", "righteous", "sin", "virtue", "ethics", "duty", "life", "death",
    "rebirth", "purpose", "peace", "happiness", "suffering", "wisdom",
    // 인물 및 관계
    "dasharatha", "pita", "mata", "father", "mother", "son", "daughter", "brother", "sister",
    "wife", "husband", "bharat", "lakshmana", "shatrughna", "kaikeyi", "kausalya", "sumitra",
    "ravana", "lakshman", "bharata", "mandodari", "surpanakha", "kumbhakarna", "vibhishana",
    "pandava", "kaurava", "draupadi", "yudhishthira", "bhima", "nakula", "sahadeva",
    "duryodhana", "dushasana", "shakuni", "gandhari", "kunti", "madri", "pandu",
    "dhritarashtra",
];

/// 오프토픽 키워드 (매칭 시 무조건 거부)
const OFF_TOPIC_KEYWORDS: &[&str] = &[
    "salman khan", "akshay kumar", "shah rukh khan", "bollywood", "actor", "actress", "movie",
    "film", "cricket", "politics", "politician", "president", "prime minister", "covid",
    "coronavirus", "technology", "computer", "internet", "facebook", "instagram", "whatsapp",
    "twitter", "stock market", "cryptocurrency", "bitcoin", "business", "company", "startup",
    "sports", "football", "tennis", "olympics", "ipl", "match", "score",
];

/// 로마자 힌디어 의문 패턴
const HINDI_PATTERNS: &[&str] = &[
    "kya naam", "kaun", "kahan", "kaise", "kyun", "kya", "ki", "ka", "ke", "naam tha",
    "naam hai", "kon tha", "kon hai", "kahan tha", "kahan hai",
];

/// 일반 질문 패턴
const QUESTION_PATTERNS: &[&str] = &[
    "what is", "how to", "meaning", "significance", "teaching", "purpose of", "why do",
    "how can", "what does", "tell me about", "explain", "describe", "who is", "who was",
    "where is", "where was", "when did",
];

const MIN_HINDI_LEN: usize = 5;
const MIN_QUESTION_LEN: usize = 10;

/// 관련성 판별 트레이트
pub trait RelevancePolicy: Send + Sync {
    fn is_relevant(&self, question: &str) -> bool;
}

/// 키워드 기반 관련성 게이트
#[derive(Debug, Clone)]
pub struct KeywordRelevanceGate {
    domain: Regex,
    off_topic: Regex,
    hindi: Regex,
    devanagari: Regex,
    question: Regex,
}

impl KeywordRelevanceGate {
    pub fn new() -> Result<Self> {
        Ok(Self {
            domain: word_start_regex(DOMAIN_KEYWORDS)?,
            off_topic: word_start_regex(OFF_TOPIC_KEYWORDS)?,
            hindi: whole_word_regex(HINDI_PATTERNS)?,
            devanagari: Regex::new(r"\p{Devanagari}").context("Invalid Devanagari regex")?,
            question: whole_word_regex(QUESTION_PATTERNS)?,
        })
    }

    fn has_language_pattern(&self, lowered: &str) -> bool {
        self.hindi.is_match(lowered) || self.devanagari.is_match(lowered)
    }
}

impl RelevancePolicy for KeywordRelevanceGate {
    fn is_relevant(&self, question: &str) -> bool {
        let lowered = question.to_lowercase();

        if self.off_topic.is_match(&lowered) {
            tracing::debug!("Question rejected by off-topic keyword");
            return false;
        }

        let trimmed_len = question.trim().chars().count();

        self.domain.is_match(&lowered)
            || (self.has_language_pattern(&lowered) && trimmed_len > MIN_HINDI_LEN)
            || (self.question.is_match(&lowered) && trimmed_len > MIN_QUESTION_LEN)
    }
}

fn alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

fn word_start_regex(words: &[&str]) -> Result<Regex> {
    Regex::new(&format!(r"\b(?:{})", alternation(words))).context("Invalid keyword regex")
}

fn whole_word_regex(words: &[&str]) -> Result<Regex> {
    Regex::new(&format!(r"\b(?:{})\b", alternation(words))).context("Invalid pattern regex")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> KeywordRelevanceGate {
        KeywordRelevanceGate::new().unwrap()
    }

    #[test]
    fn test_domain_keyword_accepted() {
        let gate = gate();
        assert!(gate.is_relevant("What does Krishna teach about duty?"));
        assert!(gate.is_relevant("dharma"));
        assert!(gate.is_relevant("Tell me about the Ramayana"));
    }

    #[test]
    fn test_off_topic_rejected() {
        let gate = gate();
        assert!(!gate.is_relevant("Who won the cricket match?"));
        assert!(!gate.is_relevant("What is the meaning of bitcoin for the soul?"));
        assert!(!gate.is_relevant("Tell me about Salman Khan"));
    }

    #[test]
    fn test_keyword_matches_word_start_only() {
        let gate = gate();
        // "ram" 은 "programming" 내부에서 매칭되면 안 됨
        assert!(!gate.is_relevant("programming languages"));
        assert!(gate.is_relevant("ram"));
    }

    #[test]
    fn test_hindi_pattern_requires_length() {
        let gate = gate();
        assert!(gate.is_relevant("kaun tha vibhu"));
        assert!(!gate.is_relevant("kaun"));
    }

    #[test]
    fn test_devanagari_question() {
        let gate = gate();
        assert!(gate.is_relevant("कृष्ण कौन थे"));
        assert!(!gate.is_relevant("कौन"));
    }

    #[test]
    fn test_general_question_pattern() {
        let gate = gate();
        assert!(gate.is_relevant("Explain the nature of reality"));
        assert!(!gate.is_relevant("explain"));
    }

    #[test]
    fn test_unrelated_rejected() {
        let gate = gate();
        assert!(!gate.is_relevant("hello there"));
        assert!(!gate.is_relevant(""));
        assert!(!gate.is_relevant("   "));
    }
}
