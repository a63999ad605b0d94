//! CLI 모듈
//!
//! palank-fusion CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::bootstrap::{build_classifier, build_coordinator, embedder_from_env, Backends};
use crate::config::{default_config_path, Config, CONFIG_ENV};
use crate::coordinator::SearchResponse;
use crate::embedding::has_api_key;
use crate::model::{ClassificationMethod, Intent, Query};
use crate::server::{self, SearchBody};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "palank-fusion")]
#[command(version, about = "의도 기반 멀티 시그널 검색 엔진", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP 검색 서버 실행 (POST /search)
    Serve {
        /// 바인드 주소 (기본: 설정의 server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// 단발 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 네임스페이스
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// 결과 개수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 의도 지정 (factual, keyword, exploratory, summary)
        #[arg(short, long)]
        intent: Option<Intent>,

        /// 그래프 최대 홉 수 (1-5)
        #[arg(long)]
        max_hops: Option<u32>,

        /// 관계 유형 필터 (반복 지정)
        #[arg(short, long = "relationship")]
        relationships: Vec<String>,

        /// 그래프 경로 포함
        #[arg(long)]
        paths: bool,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 질의 의도 분류만 수행
    Classify {
        /// 분류할 쿼리
        query: String,
    },

    /// 설정 파일 검증
    CheckConfig,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Serve { bind } => cmd_serve(&config, bind).await,
        Commands::Query {
            query,
            namespace,
            top_k,
            intent,
            max_hops,
            relationships,
            paths,
            json,
        } => {
            let mut q = Query::new(query, namespace)
                .with_top_k(top_k.unwrap_or(config.retrieval.default_top_k))
                .with_relationship_types(relationships)
                .with_paths(paths);
            if let Some(intent) = intent {
                q = q.with_intent(intent);
            }
            if let Some(hops) = max_hops {
                q = q.with_max_hops(hops);
            }
            cmd_query(&config, &q, json).await
        }
        Commands::Classify { query } => cmd_classify(&config, &query).await,
        Commands::CheckConfig => cmd_check_config(&config, cli.config),
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 명령어 (serve)
async fn cmd_serve(config: &Config, bind: Option<String>) -> Result<()> {
    let embedder = embedder_from_env(config)?;
    let coordinator = build_coordinator(config, embedder)
        .await
        .context("검색 엔진 초기화 실패")?;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    println!("[*] 검색 서버 시작: http://{}", bind);

    server::serve(Arc::new(coordinator), &bind).await
}

/// 검색 명령어 (query)
///
/// 융합 결과와 시그널 실행 기록을 출력합니다.
async fn cmd_query(config: &Config, query: &Query, json: bool) -> Result<()> {
    let embedder = embedder_from_env(config)?;
    let coordinator = build_coordinator(config, embedder)
        .await
        .context("검색 엔진 초기화 실패")?;

    let response = coordinator.search(query).await.context("검색 실패")?;

    if json {
        let body = SearchBody::from(response);
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    print_response(&response);
    Ok(())
}

fn print_response(response: &SearchResponse) {
    println!(
        "[*] 의도: {} ({:?}, 신뢰도 {:.2}{})",
        response.intent.intent,
        response.intent.method,
        response.intent.confidence,
        if response.intent.cached { ", 캐시" } else { "" }
    );
    let w = &response.weights_used;
    println!(
        "[*] 가중치: vector {:.2} / lexical {:.2} / graph_local {:.2} / graph_global {:.2}{}",
        w.vector,
        w.lexical,
        w.graph_local,
        w.graph_global,
        if response.renormalized { " (재분배)" } else { "" }
    );

    let manifest = &response.manifest;
    println!(
        "[*] 시그널: 성공 {:?}, 타임아웃 {:?}, 실패 {}",
        manifest.succeeded,
        manifest.timed_out,
        manifest.failed.len()
    );
    for failed in &manifest.failed {
        println!("    [!] {}: {}", failed.signal, failed.reason);
    }
    println!();

    if response.results.is_empty() {
        println!("[!] 검색 결과가 없습니다.");
        return;
    }

    println!(
        "[OK] 검색 결과 ({} 건, {}ms):\n",
        response.results.len(),
        response.elapsed_ms
    );

    for (i, item) in response.results.items.iter().enumerate() {
        let signals: Vec<String> = item
            .contributing_signals
            .iter()
            .map(|c| format!("{}#{}", c.signal, c.rank))
            .collect();

        match item.rerank_score {
            Some(rerank) => println!(
                "{}. [점수: {:.4} / 재순위: {:.3}] {}",
                i + 1,
                item.fused_score,
                rerank,
                item.candidate.id
            ),
            None => println!("{}. [점수: {:.4}] {}", i + 1, item.fused_score, item.candidate.id),
        }
        println!("   시그널: {}", signals.join(", "));
        println!("   내용: {}", truncate_text(&item.candidate.text, 200));

        if let Some(path) = &item.candidate.metadata.provenance.path {
            let steps: Vec<String> = path
                .iter()
                .map(|s| format!("{} -[{}]-> {}", s.from, s.relationship, s.to))
                .collect();
            println!("   경로: {}", steps.join(" | "));
        }
        println!();
    }
}

/// 분류 명령어 (classify)
async fn cmd_classify(config: &Config, query: &str) -> Result<()> {
    let embedder = embedder_from_env(config)?;
    let classifier = build_classifier(config, embedder).await;
    let result = classifier.classify_text(query).await;

    println!("[OK] 의도: {}", result.intent);
    println!("     단계: {:?}", result.method);
    println!("     신뢰도: {:.2} (임계값 {:.2})", result.confidence, classifier.threshold());

    let profile = if result.method == ClassificationMethod::RuleDefault {
        config.profiles.balanced()
    } else {
        config.profiles.for_intent(result.intent)
    };
    println!(
        "     가중치: vector {:.2} / lexical {:.2} / graph_local {:.2} / graph_global {:.2}",
        profile.vector, profile.lexical, profile.graph_local, profile.graph_global
    );
    Ok(())
}

/// 설정 검증 명령어 (check-config)
///
/// 로드 시점에 이미 검증되므로 여기까지 오면 유효합니다.
fn cmd_check_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() {
        println!("[OK] 설정 파일 유효: {}", path.display());
    } else {
        println!("[OK] 설정 파일 없음, 기본값 사용 ({})", path.display());
    }
    println!(
        "     rrf_k {} / deadline {}ms / top_k {} (최대 {})",
        config.retrieval.rrf_k,
        config.retrieval.deadline_ms,
        config.retrieval.default_top_k,
        config.retrieval.max_top_k
    );
    println!(
        "     재순위: {}",
        if config.reranker.enabled { "사용" } else { "미사용" }
    );
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &Config) -> Result<()> {
    println!("palank-fusion v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.storage.data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨 (vector, graph_global 사용 가능)");
    } else {
        println!("[!] API 키: 미설정 (lexical, graph_local만 사용)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match Backends::open(config).await {
        Ok(backends) => match backends.status().await {
            Ok(status) => {
                println!("[OK] 패시지: {} 건", status.passages);
                println!("[OK] 벡터: {} 건", status.vectors);
                println!(
                    "[OK] 그래프: 엔티티 {} / 관계 {} / 커뮤니티 {}",
                    status.entities, status.relationships, status.communities
                );
            }
            Err(e) => println!("[!] 통계 조회 실패: {:#}", e),
        },
        Err(e) => println!("[!] 저장소 열기 실패: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

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

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("안녕하세요 세계", 5), "안녕하세요...");
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query_args() {
        let cli = Cli::try_parse_from([
            "palank-fusion",
            "query",
            "who founded tokio",
            "-k",
            "5",
            "--intent",
            "factual",
            "-r",
            "founded_by",
            "-r",
            "maintains",
            "--paths",
        ])
        .unwrap();

        match cli.command {
            Commands::Query {
                top_k,
                intent,
                relationships,
                paths,
                namespace,
                ..
            } => {
                assert_eq!(top_k, Some(5));
                assert_eq!(intent, Some(Intent::Factual));
                assert_eq!(relationships, vec!["founded_by", "maintains"]);
                assert!(paths);
                assert_eq!(namespace, "default");
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_intent() {
        assert!(Cli::try_parse_from(["palank-fusion", "query", "x", "--intent", "gossip"]).is_err());
    }
}
