//! CLI 모듈
//!
//! sutra-rag CLI 명령어 정의 및 구현

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::knowledge::{extract_verse_reference, INDEX_FILE, METADATA_FILE};
use crate::rag::{RagService, VerseDetails};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "sutra-rag")]
#[command(version, about = "힌두 경전 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 데이터 디렉토리에서 인덱스 구축
    Init {
        /// 기존 인덱스를 비우고 다시 구축
        #[arg(long)]
        force: bool,
    },

    /// 경전에 대해 질문
    Ask {
        /// 질문
        question: String,

        /// 출처 필터 (데이터 파일 이름, 예: gita)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// 장/절 번호로 구절 조회
    Verse {
        /// 장 번호
        chapter: String,
        /// 절 번호
        verse: String,
    },

    /// 인덱스 통계
    Stats,

    /// 인덱스 전체 삭제
    Clear,

    /// 설정 및 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Init { force } => cmd_init(config, force).await,
        Commands::Ask { question, source } => cmd_ask(config, &question, source.as_deref()).await,
        Commands::Verse { chapter, verse } => cmd_verse(config, &chapter, &verse).await,
        Commands::Stats => cmd_stats(config).await,
        Commands::Clear => cmd_clear(config).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_init(config: Config, force: bool) -> Result<()> {
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    let rag = RagService::new(config).await?;
    println!("[*] 벡터 저장소: {}", rag.backend_name());

    if force {
        println!("[*] 기존 인덱스를 비우고 다시 구축합니다...");
    }

    let added = rag.initialize(force).await?;
    let stats = rag.get_stats().await;

    if added == 0 && stats.total_documents > 0 {
        println!(
            "[OK] 이미 초기화되어 있습니다 ({} 청크). 다시 구축하려면 --force",
            stats.total_documents
        );
    } else if added == 0 {
        println!("[!] 인덱싱할 문서가 없습니다.");
    } else {
        println!("[OK] {} 청크가 인덱싱되었습니다", added);
    }

    Ok(())
}

async fn cmd_ask(config: Config, question: &str, source: Option<&str>) -> Result<()> {
    let rag = RagService::new(config).await?;

    println!("[*] 질문: \"{}\"", question);
    if let Some(source) = source {
        println!("    출처 필터: {}", source);
    }

    // 질문에 장.절 참조가 있으면 구절부터 조회
    if let Some((chapter, verse)) = extract_verse_reference(question)
        .as_deref()
        .and_then(split_reference)
    {
        let lookup = rag.search_by_verse(chapter, verse).await;
        if let Some(details) = lookup
            .verse
            .filter(|d| lookup.found && source.map_or(true, |s| s == d.source))
        {
            println!();
            print_verse(&details);
            return Ok(());
        }
        tracing::debug!("Verse {}.{} not indexed, answering from search", chapter, verse);
    }

    let result = rag.search_and_answer(question, source).await;

    println!();
    println!("{}", result.answer);
    println!();
    println!(
        "[*] 신뢰도: {:.2} (컨텍스트 {} 건)",
        result.confidence, result.context_used
    );

    if result.degraded {
        println!("[!] 임베딩 API를 사용할 수 없어 해시 임베딩으로 검색했습니다 (정확도 낮음)");
    }
    if let Some(error) = result.error {
        println!("[!] 오류: {}", error);
    }

    Ok(())
}

async fn cmd_verse(config: Config, chapter: &str, verse: &str) -> Result<()> {
    let rag = RagService::new(config).await?;

    println!("[*] 구절 조회: {}.{}", chapter, verse);

    let lookup = rag.search_by_verse(chapter, verse).await;
    let Some(details) = lookup.verse.filter(|_| lookup.found) else {
        println!("[!] 구절을 찾을 수 없습니다.");
        return Ok(());
    };

    print_verse(&details);
    Ok(())
}

async fn cmd_stats(config: Config) -> Result<()> {
    let rag = RagService::new(config).await?;
    let stats = rag.get_stats().await;

    match stats.error {
        Some(error) => println!("[!] 통계 조회 실패: {}", error),
        None => {
            println!("[OK] 벡터 저장소: {}", stats.backend);
            println!("     전체 문서: {} 건", stats.total_documents);
            println!("     인덱싱된 벡터: {} 건", stats.indexed_documents);
            println!("     상태: {}", stats.status);
        }
    }

    Ok(())
}

async fn cmd_clear(config: Config) -> Result<()> {
    let rag = RagService::new(config).await?;
    rag.clear().await?;
    println!("[OK] {} 인덱스를 비웠습니다", rag.backend_name());
    Ok(())
}

async fn cmd_status(config: Config) -> Result<()> {
    println!("sutra-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 인덱스 디렉토리: {}", config.index_dir.display());

    if config.has_embedding_key() {
        println!("[OK] 임베딩 API 키: 설정됨 ({})", config.embedding_model);
    } else {
        println!("[!] 임베딩 API 키: 미설정 (해시 임베딩 사용)");
        println!("    설정: export MISTRAL_API_KEY=your-key");
    }

    if config.has_generation_key() {
        println!("[OK] 생성 API 키: 설정됨 ({})", config.llm_model);
    } else {
        println!("[!] 생성 API 키: 미설정");
        println!("    설정: export OPENROUTER_API_KEY=your-key");
    }

    match &config.qdrant_url {
        Some(url) => println!("[*] Qdrant: {} (컬렉션: {})", url, config.collection_name),
        None => println!("[*] Qdrant: 비활성화"),
    }

    let index_path = config.index_dir.join(INDEX_FILE);
    let metadata_path = config.index_dir.join(METADATA_FILE);
    if let (Ok(index), Ok(metadata)) = (
        std::fs::metadata(&index_path),
        std::fs::metadata(&metadata_path),
    ) {
        println!(
            "[OK] 로컬 인덱스: {} (메타데이터 {})",
            format_bytes(index.len() as usize),
            format_bytes(metadata.len() as usize)
        );
    } else {
        println!("[!] 로컬 인덱스: 없음");
    }

    let rag = RagService::new(config).await?;
    let stats = rag.get_stats().await;
    match stats.error {
        Some(error) => println!("[!] 통계 조회 실패: {}", error),
        None => println!(
            "[OK] 사용 중인 저장소: {} ({} 청크)",
            stats.backend, stats.total_documents
        ),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_verse(details: &VerseDetails) {
    println!(
        "[OK] {} - Chapter {}, Verse {}\n",
        details.source, details.chapter, details.verse
    );
    if !details.sanskrit.is_empty() {
        println!("   Sanskrit: {}", details.sanskrit);
    }
    if !details.translation.is_empty() {
        println!("   Translation: {}", truncate_text(&details.translation, 600));
    }
    if !details.explanation.is_empty() {
        println!("   Commentary: {}", truncate_text(&details.explanation, 600));
    }
}

/// `"2.47"` → `("2", "47")`
fn split_reference(reference: &str) -> Option<(&str, &str)> {
    reference
        .split_once('.')
        .filter(|(chapter, verse)| !chapter.is_empty() && !verse.is_empty())
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("dharma", 10), "dharma");
        assert_eq!(truncate_text("dharma is duty", 6), "dharma...");
        assert_eq!(truncate_text("dharma\nis duty", 20), "dharma is duty");
    }

    #[test]
    fn test_truncate_devanagari() {
        let text = "धर्मक्षेत्रे कुरुक्षेत्रे";
        let truncated = truncate_text(text, 3);
        assert_eq!(truncated.chars().count(), 6);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference("2.47"), Some(("2", "47")));
        assert_eq!(split_reference("18.66"), Some(("18", "66")));
        assert_eq!(split_reference("247"), None);
        assert_eq!(split_reference("2."), None);
    }

    #[test]
    fn test_question_reference_routing() {
        let reference = extract_verse_reference("What does Gita 2.47 say?");
        assert_eq!(reference.as_deref().and_then(split_reference), Some(("2", "47")));

        let none = extract_verse_reference("What is dharma?");
        assert_eq!(none.as_deref().and_then(split_reference), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_ask_command() {
        let cli = Cli::parse_from(["sutra-rag", "ask", "What is dharma?", "--source", "gita"]);
        match cli.command {
            Commands::Ask { question, source } => {
                assert_eq!(question, "What is dharma?");
                assert_eq!(source.as_deref(), Some("gita"));
            }
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn test_parse_init_force() {
        let cli = Cli::parse_from(["sutra-rag", "init", "--force"]);
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }
}
