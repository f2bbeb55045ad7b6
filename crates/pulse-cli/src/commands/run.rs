//! 거래 실행 루프.
//!
//! 표준 입력에서 줄 단위 JSON 메시지를 읽어 신호로 파싱하고 엔진에 제출합니다.
//! EOF, Ctrl+C, SIGTERM 중 하나가 오면 협조적 종료를 수행합니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pulse_core::{AppConfig, SentimentParser};
use pulse_exchange::{
    BinanceConfig, BinanceFuturesClient, ExchangeGateway, FuturesExchange, PaperExchange,
    RetryPolicy,
};
use pulse_execution::{
    ChannelEventSink, FanoutSink, LifecycleConfig, TradeEngine, TracingEventSink,
};
use pulse_notification::{NotificationDispatcher, TelegramConfig, TelegramSender};
use pulse_stats::{spawn_flusher, JsonFilePersister, StatsPersister, StatsStore};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 표준 입력 메시지.
#[derive(Debug, Deserialize)]
pub struct IntakeMessage {
    /// 메시지 본문
    pub text: String,
    /// 출처 ID (문자열 또는 숫자)
    pub origin_id: OriginId,
    /// 출처 내 참조
    #[serde(default)]
    pub origin_ref: Option<OriginId>,
}

/// 문자열 또는 숫자 ID.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OriginId {
    Text(String),
    Number(i64),
}

impl std::fmt::Display for OriginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginId::Text(s) => write!(f, "{}", s),
            OriginId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// 입력 처리 집계.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntakeSummary {
    pub messages: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub ignored: usize,
}

/// `pulse run` 진입점.
pub async fn run(config: AppConfig, paper: bool) -> Result<()> {
    let exchange = build_exchange(&config, paper)?;
    info!(
        exchange = exchange.name(),
        paper,
        capital = %config.trading.capital,
        leverage = config.trading.leverage,
        workers = config.trading.worker_count,
        "거래 실행기 시작"
    );

    // 종료 토큰은 게이트웨이 재시도 대기와 워커가 공유
    let shutdown = CancellationToken::new();
    let gateway = Arc::new(
        ExchangeGateway::new(exchange, RetryPolicy::from(&config.retry))
            .with_precision_ttl(Duration::from_secs(config.exchange.precision_ttl_secs))
            .with_shutdown(shutdown.clone()),
    );

    // 통계 복원
    let persister = Arc::new(JsonFilePersister::new(
        &config.storage.pnl_path,
        &config.storage.stats_path,
    ));
    let snapshot = persister
        .load()
        .await
        .context("저장된 통계 로드 실패")?;
    let stats = Arc::new(StatsStore::restore(snapshot));
    info!(trades = stats.global_report().trade_count, "통계 복원 완료");

    // 이벤트: 로그 + 알림
    let (channel_sink, events) = ChannelEventSink::channel();
    let sink = FanoutSink::new()
        .with(Arc::new(TracingEventSink))
        .with(Arc::new(channel_sink));

    let (engine, escalations) = TradeEngine::builder(gateway, Arc::clone(&stats))
        .event_sink(Arc::new(sink))
        .worker_count(config.trading.worker_count)
        .lifecycle(LifecycleConfig::from_trading(&config.trading))
        .build();

    let flush_token = CancellationToken::new();
    let flusher = spawn_flusher(
        Arc::clone(&stats),
        persister,
        Duration::from_secs(config.storage.flush_interval_secs),
        flush_token.clone(),
    );

    let notify_token = CancellationToken::new();
    let dispatcher = build_dispatcher(&config).spawn(events, escalations, notify_token.clone());

    engine.start();

    let parser = SentimentParser::new(config.trading.sentiment_threshold);
    let stdin = tokio::io::stdin();

    tokio::select! {
        _ = shutdown_signal() => {}
        result = read_intake(stdin, &engine, &parser) => {
            let summary = result?;
            info!(
                messages = summary.messages,
                accepted = summary.accepted,
                rejected = summary.rejected,
                ignored = summary.ignored,
                "입력 종료 (EOF)"
            );
        }
    }

    // 1~3. 취소, 워커 합류, 큐 폐기
    let summary = engine.shutdown().await;

    // 4. 최종 통계 기록
    flush_token.cancel();
    if let Err(e) = flusher.await {
        error!(error = %e, "통계 플러셔 비정상 종료");
    }

    // 엔진을 내려 이벤트 채널을 닫은 뒤 남은 알림 전송
    drop(engine);
    notify_token.cancel();
    if let Err(e) = dispatcher.await {
        error!(error = %e, "알림 분배기 비정상 종료");
    }

    info!(
        closed = summary.closed,
        failed = summary.failed_pre_entry,
        unresolved = summary.unresolved,
        drained = summary.drained,
        "종료 완료"
    );
    if summary.unresolved > 0 {
        warn!(
            unresolved = summary.unresolved,
            "거래소에 미해결 포지션이 남아 있습니다. 수동 확인이 필요합니다"
        );
    }

    Ok(())
}

/// 실행 모드에 맞는 거래소 연결을 생성합니다.
fn build_exchange(config: &AppConfig, paper: bool) -> Result<Arc<dyn FuturesExchange>> {
    let testnet = config.exchange.testnet;

    if paper {
        // 시세와 정밀도는 실제 거래소에서, 체결은 로컬에서
        let market = BinanceConfig::from_env(testnet)
            .unwrap_or_else(|| BinanceConfig::public().with_testnet(testnet))
            .with_recv_window(config.exchange.recv_window);
        let client = BinanceFuturesClient::new(market)?;
        return Ok(Arc::new(PaperExchange::new(client)));
    }

    let credentials = BinanceConfig::from_env(testnet)
        .context("실거래에는 BINANCE_API_KEY, BINANCE_API_SECRET 환경 변수가 필요합니다")?
        .with_recv_window(config.exchange.recv_window);
    Ok(Arc::new(BinanceFuturesClient::new(credentials)?))
}

fn build_dispatcher(config: &AppConfig) -> NotificationDispatcher {
    let mut dispatcher = NotificationDispatcher::new();

    let telegram = &config.notifications.telegram;
    let telegram_config = if telegram.enabled {
        Some(TelegramConfig::from_settings(telegram))
    } else {
        TelegramConfig::from_env()
    };
    if let Some(telegram_config) = telegram_config {
        dispatcher.add_sender(Arc::new(TelegramSender::new(telegram_config)));
    }

    dispatcher
}

/// 입력 스트림을 EOF까지 읽어 신호를 제출합니다.
pub async fn read_intake<R>(
    reader: R,
    engine: &TradeEngine,
    parser: &SentimentParser,
) -> Result<IntakeSummary>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut summary = IntakeSummary::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.messages += 1;

        let message: IntakeMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "잘못된 입력 메시지");
                summary.ignored += 1;
                continue;
            }
        };
        handle_message(&message, engine, parser, &mut summary);
    }

    Ok(summary)
}

fn handle_message(
    message: &IntakeMessage,
    engine: &TradeEngine,
    parser: &SentimentParser,
    summary: &mut IntakeSummary,
) {
    let origin_id = message.origin_id.to_string();
    let origin_ref = message.origin_ref.as_ref().map(ToString::to_string);

    let signals = match parser.parse(&message.text, &origin_id, origin_ref.as_deref()) {
        Ok(signals) => signals,
        Err(e) if e.is_ignorable() => {
            debug!(origin = %origin_id, reason = %e, "신호 무시");
            summary.ignored += 1;
            return;
        }
        Err(e) => {
            warn!(origin = %origin_id, error = %e, "신호 파싱 실패");
            summary.ignored += 1;
            return;
        }
    };

    for signal in signals {
        let symbol = signal.symbol.clone();
        let admission = engine.submit(signal);
        if admission.accepted {
            info!(symbol = %symbol, origin = %origin_id, "신호 수락");
            summary.accepted += 1;
        } else {
            info!(
                symbol = %symbol,
                origin = %origin_id,
                reason = admission.reason.as_deref().unwrap_or_default(),
                "신호 거부"
            );
            summary.rejected += 1;
        }
    }
}

/// Ctrl+C 또는 SIGTERM 대기.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Ctrl+C 수신, 종료 시작"),
        _ = terminate => warn!("SIGTERM 수신, 종료 시작"),
    }
}
