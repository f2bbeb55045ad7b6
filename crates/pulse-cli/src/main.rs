//! 감성 신호 기반 선물 거래 실행기 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 표준 입력의 NDJSON 메시지를 모의 체결로 실행
//! echo '{"text":"Sentiment: 80%\nCoins: BTC","origin_id":"1"}' | pulse run --paper
//!
//! # 메시지 파싱만 확인
//! pulse parse $'Sentiment: -65%\nCoins: ETH, SOL' --origin 7
//!
//! # 저장된 통계 출력
//! pulse report --config config/default.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pulse_core::{init_logging, AppConfig, LogConfig};
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Sentiment signal trade executor - 감성 신호 기반 선물 거래 실행기", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 표준 입력의 신호를 받아 거래 실행
    Run {
        /// 설정 파일 (기본: config/default.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 모의 체결 강제
        #[arg(long, conflicts_with = "live")]
        paper: bool,

        /// 실거래 강제 (BINANCE_API_KEY / BINANCE_API_SECRET 필요)
        #[arg(long)]
        live: bool,
    },

    /// 메시지 텍스트를 신호로 파싱
    Parse {
        /// 메시지 본문
        text: String,

        /// 신호 출처 ID
        #[arg(short, long, default_value = "cli")]
        origin: String,

        /// 감성 임계값 (기본: 설정 파일 값)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// 저장된 통계 출력
    Report {
        /// 설정 파일 (기본: config/default.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("설정 파일 로드 실패: {}", path.display()))?,
        None => AppConfig::load_default().context("기본 설정 로드 실패")?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Run { config, .. } | Commands::Report { config } => config.clone(),
        Commands::Parse { .. } => None,
    };
    let config = load_config(config_path.as_ref())?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;
    info!(version = env!("CARGO_PKG_VERSION"), "pulse 시작");

    match cli.command {
        Commands::Run { paper, live, .. } => {
            let paper = if live {
                false
            } else {
                paper || config.exchange.paper_trading
            };
            commands::run::run(config, paper).await?;
        }

        Commands::Parse {
            text,
            origin,
            threshold,
        } => {
            let threshold = threshold.unwrap_or(config.trading.sentiment_threshold);
            commands::parse::run(&text, &origin, threshold)?;
        }

        Commands::Report { .. } => {
            commands::report::run(&config).await?;
        }
    }

    Ok(())
}
