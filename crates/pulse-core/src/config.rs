//! 설정 관리.
//!
//! 기본값 → `config/default.toml` → `PULSE__` 접두사 환경 변수 순으로 병합합니다.
//! 예: `PULSE__TRADING__CAPITAL=3000`, `PULSE__RETRY__BACKOFF=exponential`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{SignalError, SignalResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 트레이딩 설정
    #[serde(default)]
    pub trading: TradingConfig,
    /// 재시도 정책
    #[serde(default)]
    pub retry: RetrySettings,
    /// 거래소 설정
    #[serde(default)]
    pub exchange: ExchangeSettings,
    /// 통계 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 알림 설정
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// 신호 출처 ID → 표시 이름
    #[serde(default)]
    pub origins: HashMap<String, String>,
}

/// 트레이딩 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    /// 거래당 투입 자본 (USDT)
    #[serde(default = "default_capital")]
    pub capital: Decimal,
    /// 레버리지 배수
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// 포지션 보유 시간 (초)
    #[serde(default = "default_hold_duration")]
    pub hold_duration_secs: u64,
    /// 동시 실행 워커 수
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// 거래 진입에 필요한 최소 |감성 점수|
    #[serde(default = "default_sentiment_threshold")]
    pub sentiment_threshold: f64,
    /// 포지션 명목가 상한 (없으면 capital * leverage)
    #[serde(default)]
    pub max_position_notional: Option<Decimal>,
}

fn default_capital() -> Decimal {
    Decimal::new(100, 0)
}
fn default_leverage() -> u32 {
    1
}
fn default_hold_duration() -> u64 {
    300
}
fn default_worker_count() -> usize {
    100
}
fn default_sentiment_threshold() -> f64 {
    50.0
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            capital: default_capital(),
            leverage: default_leverage(),
            hold_duration_secs: default_hold_duration(),
            worker_count: default_worker_count(),
            sentiment_threshold: default_sentiment_threshold(),
            max_position_notional: None,
        }
    }
}

impl TradingConfig {
    /// 보유 시간을 `Duration`으로 반환합니다.
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.hold_duration_secs)
    }
}

/// 백오프 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// 고정 간격
    #[default]
    Fixed,
    /// 지수 증가
    Exponential,
}

/// 재시도 정책 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// 총 시도 횟수 (첫 시도 포함)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 기본 대기 시간 (밀리초)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// 백오프 방식
    #[serde(default)]
    pub backoff: BackoffKind,
    /// 최대 대기 시간 (밀리초)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 시도당 타임아웃 (밀리초)
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// ±25% 지터 추가 여부
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_attempt_timeout_ms() -> u64 {
    10_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff: BackoffKind::Fixed,
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            jitter: false,
        }
    }
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeSettings {
    /// 테스트넷 사용
    #[serde(default)]
    pub testnet: bool,
    /// 모의 체결 (실제 주문 없음)
    #[serde(default = "default_true")]
    pub paper_trading: bool,
    /// 수신 윈도우 (밀리초)
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
    /// 수량 정밀도 캐시 TTL (초)
    #[serde(default = "default_precision_ttl")]
    pub precision_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_recv_window() -> u64 {
    5000
}
fn default_precision_ttl() -> u64 {
    3600
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            testnet: false,
            paper_trading: true,
            recv_window: default_recv_window(),
            precision_ttl_secs: default_precision_ttl(),
        }
    }
}

/// 통계 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// 출처별 누적 손익 파일
    #[serde(default = "default_pnl_path")]
    pub pnl_path: String,
    /// 전체 통계 파일
    #[serde(default = "default_stats_path")]
    pub stats_path: String,
    /// 주기적 플러시 간격 (초)
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

fn default_pnl_path() -> String {
    "pnl_data.json".to_string()
}
fn default_stats_path() -> String {
    "stats_data.json".to_string()
}
fn default_flush_interval() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pnl_path: default_pnl_path(),
            stats_path: default_stats_path(),
            flush_interval_secs: default_flush_interval(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 알림 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// 텔레그램 설정
    #[serde(default)]
    pub telegram: TelegramSettings,
}

/// 텔레그램 알림 설정.
///
/// 토큰과 채팅 ID는 보통 `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID` 환경 변수로 주입합니다.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct TelegramSettings {
    /// 활성화 여부
    #[serde(default)]
    pub enabled: bool,
    /// 봇 토큰
    #[serde(default)]
    pub bot_token: String,
    /// 채팅 ID
    #[serde(default)]
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("enabled", &self.enabled)
            .field("bot_token", &"***REDACTED***")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        Self::build(config::File::from(path.as_ref()))
    }

    /// 기본 경로에서 설정을 로드합니다. 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::build(config::File::with_name("config/default.toml").required(false))
    }

    fn build<S>(file: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            // 기본값으로 시작
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // 파일에서 로드
            .add_source(file)
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("PULSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// 시작 시점에 설정 값의 범위를 검증합니다.
    pub fn validate(&self) -> SignalResult<()> {
        if self.trading.worker_count == 0 {
            return Err(SignalError::Config("worker_count must be >= 1".into()));
        }
        if self.trading.capital <= Decimal::ZERO {
            return Err(SignalError::Config("capital must be positive".into()));
        }
        if self.trading.leverage == 0 {
            return Err(SignalError::Config("leverage must be >= 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SignalError::Config("retry.max_attempts must be >= 1".into()));
        }
        if !(0.0..=100.0).contains(&self.trading.sentiment_threshold) {
            return Err(SignalError::Config(
                "sentiment_threshold must be within [0, 100]".into(),
            ));
        }
        if let Some(cap) = self.trading.max_position_notional {
            if cap <= Decimal::ZERO {
                return Err(SignalError::Config(
                    "max_position_notional must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    /// 출처 ID의 표시 이름을 반환합니다. 등록되지 않았으면 ID 그대로 반환합니다.
    pub fn origin_name<'a>(&'a self, origin_id: &'a str) -> &'a str {
        self.origins
            .get(origin_id)
            .map(String::as_str)
            .unwrap_or(origin_id)
    }
}
