//! 텍스트 정규화 유틸리티
//!
//! 질의/산스크리트 텍스트 정규화와 장/절 참조 추출.

use std::sync::OnceLock;

use regex::Regex;

/// 질의 정규화 (소문자 + 공백 정리)
pub fn normalize_query(query: &str) -> String {
    collapse_whitespace(&query.to_lowercase())
}

/// 산스크리트 텍스트 정규화
///
/// 공백을 정리하고 단다(`।`, `॥`)를 ASCII 구두점으로 바꿉니다.
pub fn normalize_sanskrit(text: &str) -> String {
    collapse_whitespace(text)
        .replace('।', ".")
        .replace('॥', "||")
}

/// 연속 공백을 하나로 줄이고 양끝 공백 제거
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 텍스트에서 장.절 참조 추출
///
/// `2.47`, `chapter 2 verse 47`, `ch. 2 v. 47` 형식을 인식하고
/// `"2.47"`을 반환합니다. 없으면 None.
pub fn extract_verse_reference(text: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

    let patterns = PATTERNS.get_or_init(|| {
        [
            r"(\d+)\.(\d+)",
            r"chapter\s+(\d+)\s+verse\s+(\d+)",
            r"ch\.\s*(\d+)\s*v\.\s*(\d+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });

    let lowered = text.to_lowercase();
    patterns.iter().find_map(|re| {
        re.captures(&lowered)
            .map(|caps| format!("{}.{}", &caps[1], &caps[2]))
    })
}

// ============================================================================
// Tests
// ============================================================================
