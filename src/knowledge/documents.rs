//! Document Processor - 원천 데이터 파일을 청크 레코드로 변환
//!
//! 데이터 디렉토리를 순회하며 확장자별로 파싱합니다.
//! - `.json`: 배열(절 단위 레코드) / `text` 객체 / 인물 데이터베이스
//! - `.csv`: 헤더 있는 절 테이블 (`chapter`, `verse`, `sanskrit`, `translation`, ...)
//! - `.txt`: 기타(Gita) 판본 레이아웃 (`TEXT n` / `TRANSLATION`)
//!
//! 파일 단위 실패는 로그만 남기고 해당 파일은 건너뜁니다.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use super::chunker::{text_chunker, ChunkConfig, Chunker};
use super::text::normalize_sanskrit;
use super::vector::ChunkRecord;
use crate::config::Config;

/// 단일 텍스트 JSON의 섹션 구분선
const SECTION_RULE: &str = "----------------------------------------";

/// CSV 절 테이블 행 (없는 열은 빈 문자열)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    chapter: String,
    verse: String,
    sanskrit: String,
    translation: String,
    explanation: String,
    question: String,
}

// ============================================================================
// DocumentProcessor
// ============================================================================

/// 원천 파일 → `ChunkRecord` 변환기
pub struct DocumentProcessor {
    chunker: Box<dyn Chunker>,
}

impl DocumentProcessor {
    pub fn new(chunker: Box<dyn Chunker>) -> Self {
        Self { chunker }
    }

    /// 설정의 청크 크기/오버랩 사용
    pub fn from_config(config: &Config) -> Result<Self> {
        let chunker = text_chunker(ChunkConfig::new(config.chunk_size, config.chunk_overlap))?;
        Ok(Self::new(chunker))
    }

    /// 디렉토리 내 모든 지원 파일 처리
    ///
    /// 파일명 순으로 처리하므로 결과 순서는 결정적입니다.
    pub async fn process_all_files(&self, dir: &Path) -> Vec<ChunkRecord> {
        if !dir.exists() {
            tracing::warn!("Data directory not found: {}", dir.display());
            return vec![];
        }

        let files: Vec<_> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::warn!("Failed to read directory entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        let mut all_records = Vec::new();

        for path in files {
            match self.process_file(&path).await {
                Ok(records) => {
                    tracing::info!(
                        "Processed {} document chunks from {}",
                        records.len(),
                        path.display()
                    );
                    all_records.extend(records);
                }
                Err(e) => {
                    tracing::error!("Error processing file {}: {:#}", path.display(), e);
                }
            }
        }

        tracing::info!("Total processed documents: {}", all_records.len());
        all_records
    }

    /// 단일 파일 처리 (source = 파일 stem)
    pub async fn process_file(&self, path: &Path) -> Result<Vec<ChunkRecord>> {
        let source = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let data: Value = serde_json::from_str(&content)
                    .with_context(|| format!("Invalid JSON in {}", path.display()))?;
                Ok(self.parse_json(&data, &source))
            }
            "txt" => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(self.parse_gita_text(&content, &source))
            }
            "csv" => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(self.parse_csv(&content, &source))
            }
            _ => {
                tracing::debug!("Unsupported file format: {}", path.display());
                Ok(vec![])
            }
        }
    }

    /// 레코드 텍스트를 청크로 나누고 청크 메타데이터 부여
    pub fn chunk_record(&self, record: ChunkRecord) -> Vec<ChunkRecord> {
        let chunks = self.chunker.chunk(&record.text);
        let total = chunks.len();

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut chunk = record.clone();
                chunk.text = text;
                chunk
                    .with_metadata("chunk_index", i)
                    .with_metadata("total_chunks", total)
            })
            .collect()
    }

    // ========================================================================
    // JSON
    // ========================================================================

    /// JSON 문서 파싱 (형식 자동 판별)
    pub fn parse_json(&self, data: &Value, source: &str) -> Vec<ChunkRecord> {
        match data {
            Value::Array(entries) => entries
                .iter()
                .flat_map(|entry| self.parse_array_entry(entry, source))
                .collect(),
            Value::Object(obj) if obj.contains_key("text") => {
                self.parse_sectioned_text(obj, source)
            }
            Value::Object(obj) if obj.contains_key("allowed_entities") => {
                self.parse_character_database(obj, source)
            }
            _ => {
                tracing::warn!("Unknown JSON format in {}", source);
                vec![]
            }
        }
    }

    fn parse_array_entry(&self, entry: &Value, source: &str) -> Vec<ChunkRecord> {
        let Some(obj) = entry.as_object() else {
            tracing::warn!("Non-object array entry in {}", source);
            return vec![];
        };

        if obj.contains_key("Kanda") && obj.contains_key("Sarga") {
            self.parse_kanda_entry(obj, source)
        } else if obj.contains_key("Book Name") {
            self.parse_book_entry(obj, source)
        } else if obj.contains_key("book_name") {
            self.parse_verse_entry(obj, source)
        } else {
            tracing::warn!("Unknown array entry format in {}", source);
            vec![]
        }
    }

    /// `Kanda`/`Sarga`/`Shloka` 추출 절
    fn parse_kanda_entry(&self, obj: &Map<String, Value>, source: &str) -> Vec<ChunkRecord> {
        let kanda = field(obj, "Kanda");
        let sarga = field(obj, "Sarga");
        let shloka = field(obj, "Shloka");
        let original = field(obj, "Original_Text");
        let vector_input = field(obj, "Vector_Input");

        let mut lines = labelled(&[
            ("Kanda", &kanda),
            ("Sarga", &sarga),
            ("Shloka", &shloka),
            ("Original Text", &original),
        ]);
        if !vector_input.is_empty() && vector_input != original.to_lowercase() {
            lines.push(format!("Processed Text: {}", vector_input));
        }

        let mut record = ChunkRecord::new(lines.join("\n"), source).with_verse(&sarga, &shloka);
        record.translation = original;
        let record = record
            .with_metadata("verse_id", format!("{}-{}-{}", kanda, sarga, shloka))
            .with_metadata("kanda", kanda)
            .with_metadata("sarga", sarga)
            .with_metadata("shloka", shloka)
            .with_metadata("vector_input", vector_input);

        self.chunk_non_empty(record)
    }

    /// `Book Name`/`Chapter`/`Verse`/`Content` 데이터셋 행
    fn parse_book_entry(&self, obj: &Map<String, Value>, source: &str) -> Vec<ChunkRecord> {
        let book = field(obj, "Book Name");
        let chapter = field(obj, "Chapter");
        let verse = field(obj, "Verse");
        let content = field(obj, "Content");

        let text = labelled(&[
            ("Book", &book),
            ("Chapter", &chapter),
            ("Verse", &verse),
            ("Content", &content),
        ])
        .join("\n");

        let mut record = ChunkRecord::new(text, source).with_verse(&chapter, &verse);
        record.translation = content;
        let record = record
            .with_metadata("verse_id", format!("{}-{}-{}", book, chapter, verse))
            .with_metadata("book_name", book);

        self.chunk_non_empty(record)
    }

    /// `book_name`/`chapter_number`/`verse_number` 원문 절
    fn parse_verse_entry(&self, obj: &Map<String, Value>, source: &str) -> Vec<ChunkRecord> {
        let book = field(obj, "book_name");
        let book_number = field(obj, "book_number");
        let chapter = field(obj, "chapter_number");
        let verse_text = field(obj, "verse");
        let verse_id = field(obj, "verse_id");

        // 절 번호는 배열일 수 있음
        let verse_numbers = match obj.get("verse_number") {
            Some(Value::Array(items)) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
            Some(other) => scalar(other),
            None => String::new(),
        };

        let mut lines = vec![
            format!("Book: {} ({})", book, book_number),
            format!("Chapter: {}", chapter),
            format!("Verse: {}", verse_numbers),
            format!("Text: {}", verse_text),
        ];
        if !verse_id.is_empty() {
            lines.push(format!("Reference: {}", verse_id));
        }

        let mut record =
            ChunkRecord::new(lines.join("\n"), source).with_verse(&chapter, &verse_numbers);
        record.translation = verse_text;
        let record = record
            .with_metadata("verse_id", verse_id)
            .with_metadata("book_name", book)
            .with_metadata("book_number", book_number);

        self.chunk_non_empty(record)
    }

    /// `{"text": "..."}` 객체: 구분선으로 나뉜 섹션
    fn parse_sectioned_text(&self, obj: &Map<String, Value>, source: &str) -> Vec<ChunkRecord> {
        let text = field(obj, "text");
        let mut records = Vec::new();

        for section in text.split(SECTION_RULE) {
            let mut chapter = "";
            let mut verse = "";
            let mut content = "";

            for line in section.lines().map(str::trim) {
                if let Some(rest) = line.strip_prefix("Chapter:") {
                    chapter = rest.trim();
                } else if let Some(rest) = line.strip_prefix("Verse:") {
                    verse = rest.trim();
                } else if let Some(rest) = line.strip_prefix("Content:") {
                    content = rest.trim();
                }
            }

            if content.is_empty() {
                continue;
            }

            let full_text = format!("Chapter: {}\nVerse: {}\nContent: {}", chapter, verse, content);
            let mut record = ChunkRecord::new(full_text, source).with_verse(chapter, verse);
            record.translation = content.to_string();
            let record = record.with_metadata("verse_id", format!("{}-{}", chapter, verse));

            records.extend(self.chunk_record(record));
        }

        records
    }

    /// `allowed_entities` 인물 데이터베이스
    fn parse_character_database(&self, obj: &Map<String, Value>, source: &str) -> Vec<ChunkRecord> {
        let Some(entities) = obj.get("allowed_entities").and_then(Value::as_object) else {
            tracing::warn!("allowed_entities is not an object in {}", source);
            return vec![];
        };

        let mut records = Vec::new();

        for (name, info) in entities {
            let empty = Map::new();
            let info = info.as_object().unwrap_or(&empty);

            let aliases: Vec<String> = info
                .get("aliases")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(scalar).collect())
                .unwrap_or_default();
            let category = field(info, "category");
            let description = field(info, "description");
            let notes = field(info, "notes");
            let origin = field(info, "source");

            let mut lines = vec![format!("Character: {}", name)];
            if !aliases.is_empty() {
                lines.push(format!("Also known as: {}", aliases.join(", ")));
            }
            lines.extend(labelled(&[
                ("Category", &category),
                ("Description", &description),
                ("Additional Notes", &notes),
                ("Source", &origin),
            ]));

            let mut record = ChunkRecord::new(lines.join("\n"), source);
            record.translation = description;
            record.explanation = notes;
            let record = record
                .with_metadata("character_name", name.as_str())
                .with_metadata("aliases", aliases)
                .with_metadata("category", category)
                .with_metadata("character_source", origin);

            records.extend(self.chunk_record(record));
        }

        records
    }

    // ========================================================================
    // CSV
    // ========================================================================

    /// 절 테이블 파싱
    ///
    /// 역직렬화에 실패한 행은 경고 후 건너뜁니다.
    pub fn parse_csv(&self, content: &str, source: &str) -> Vec<ChunkRecord> {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let mut records = Vec::new();

        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("Skipping CSV row {} in {}: {}", line + 1, source, e);
                    continue;
                }
            };

            let chapter = row.chapter.trim().to_string();
            let verse = row.verse.trim().to_string();
            let sanskrit = normalize_sanskrit(&row.sanskrit);
            let translation = row.translation.trim().to_string();
            let explanation = row.explanation.trim().to_string();
            let question = row.question.trim().to_string();

            let text = labelled(&[
                ("Sanskrit", &sanskrit),
                ("Translation", &translation),
                ("Explanation", &explanation),
                ("Related Question", &question),
            ])
            .join("\n\n");

            let mut record = ChunkRecord::new(text, source).with_verse(&chapter, &verse);
            record.sanskrit = sanskrit;
            record.translation = translation;
            record.explanation = explanation;
            let record = record
                .with_metadata("verse_id", format!("{}.{}", chapter, verse))
                .with_metadata("has_question", !question.is_empty())
                .with_metadata("question", question);

            records.extend(self.chunk_non_empty(record));
        }

        records
    }

    // ========================================================================
    // TXT (Gita edition)
    // ========================================================================

    /// 기타 판본 텍스트 파싱
    ///
    /// `Chapter-n`/`CHAPTER n` 헤더, `TEXT n` 절 표시, `TRANSLATION` 이후
    /// 번역+해설을 다음 `TEXT` 까지 수집합니다.
    pub fn parse_gita_text(&self, content: &str, source: &str) -> Vec<ChunkRecord> {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        let mut records = Vec::new();
        let mut chapter = String::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if is_chapter_header(line) {
                chapter = first_number(line).unwrap_or_default();
                i += 1;
                continue;
            }

            if !line.starts_with("TEXT ") {
                i += 1;
                continue;
            }

            let verse = verse_number(line).unwrap_or_default();
            i += 1;

            let mut sanskrit_lines = Vec::new();
            while i < lines.len() && !lines[i].starts_with("TRANSLATION") {
                if !lines[i].is_empty() && !lines[i].starts_with("TEXT") {
                    sanskrit_lines.push(lines[i]);
                }
                i += 1;
            }
            if i >= lines.len() {
                break;
            }
            // TRANSLATION 줄 건너뜀
            i += 1;

            let mut body_lines = Vec::new();
            while i < lines.len()
                && !lines[i].starts_with("TEXT ")
                && !is_chapter_header(lines[i])
            {
                if !lines[i].is_empty() {
                    body_lines.push(lines[i]);
                }
                i += 1;
            }

            let sanskrit = normalize_sanskrit(&sanskrit_lines.join(" "));
            let body = body_lines.join(" ");
            if body.is_empty() || chapter.is_empty() || verse.is_empty() {
                continue;
            }

            let mut full_text = format!("Chapter {}, Verse {}\n\n", chapter, verse);
            if !sanskrit.is_empty() {
                full_text.push_str(&format!("Sanskrit: {}\n\n", sanskrit));
            }
            full_text.push_str(&format!("Translation and Commentary: {}", body));

            let mut record = ChunkRecord::new(full_text, source).with_verse(&chapter, &verse);
            record.sanskrit = sanskrit;
            record.translation = body;
            let record = record.with_metadata("verse_id", format!("{}.{}", chapter, verse));

            records.extend(self.chunk_record(record));
        }

        records
    }

    fn chunk_non_empty(&self, record: ChunkRecord) -> Vec<ChunkRecord> {
        if record.text.trim().is_empty() {
            return vec![];
        }
        self.chunk_record(record)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// JSON 스칼라를 문자열로 (null은 빈 문자열)
fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).map(scalar).unwrap_or_default()
}

/// 값이 있는 항목만 `Label: value` 줄로
fn labelled(pairs: &[(&str, &String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("{}: {}", label, value))
        .collect()
}

fn is_chapter_header(line: &str) -> bool {
    line.starts_with("Chapter-") || line.starts_with("CHAPTER")
}

fn first_number(line: &str) -> Option<String> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NUMBER.get_or_init(|| Regex::new(r"(\d+)").ok()).as_ref()?;
    re.captures(line).map(|caps| caps[1].to_string())
}

fn verse_number(line: &str) -> Option<String> {
    static VERSE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = VERSE.get_or_init(|| Regex::new(r"TEXT\s+(\d+)").ok()).as_ref()?;
    re.captures(line).map(|caps| caps[1].to_string())
}

// ============================================================================
// Tests
// ============================================================================
