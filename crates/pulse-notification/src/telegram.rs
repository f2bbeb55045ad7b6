//! 텔레그램 알림 서비스.
//!
//! Telegram Bot API를 통해 거래 알림을 전송합니다.

use crate::types::{
    Notification, NotificationError, NotificationEvent, NotificationPriority, NotificationResult,
    NotificationSender,
};
use async_trait::async_trait;
use pulse_core::TelegramSettings;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

/// Telegram Bot API 기본 URL.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// 429 응답에 `retry_after`가 없을 때 사용하는 대기 시간 (초).
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 텔레그램 알림 전송 설정.
#[derive(Clone)]
pub struct TelegramConfig {
    /// @BotFather에서 받은 봇 토큰
    pub bot_token: String,
    /// 메시지를 보낼 채팅 ID
    pub chat_id: String,
    /// 전송 활성화 여부
    pub enabled: bool,
    /// 파싱 모드 (HTML 또는 MarkdownV2)
    pub parse_mode: String,
    /// API 기본 URL
    pub base_url: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***REDACTED***")
            .field("chat_id", &self.chat_id)
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TelegramConfig {
    /// 새 텔레그램 설정을 생성합니다.
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            enabled: true,
            parse_mode: "HTML".to_string(),
            base_url: TELEGRAM_API_URL.to_string(),
        }
    }

    /// 앱 설정에서 생성합니다.
    pub fn from_settings(settings: &TelegramSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ..Self::new(settings.bot_token.clone(), settings.chat_id.clone())
        }
    }

    /// 환경 변수에서 설정을 생성합니다.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Some(Self {
            enabled,
            ..Self::new(bot_token, chat_id)
        })
    }

    /// API 기본 URL을 변경합니다.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// 텔레그램 알림 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 새 텔레그램 전송기를 생성합니다.
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// 환경 변수에서 전송기를 생성합니다.
    pub fn from_env() -> Option<Self> {
        TelegramConfig::from_env().map(Self::new)
    }

    fn format_message(&self, notification: &Notification) -> String {
        render(notification)
    }

    /// 텔레그램에 원시 메시지를 전송합니다.
    async fn send_message(&self, text: &str) -> NotificationResult<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.base_url.trim_end_matches('/'),
            self.config.bot_token
        );

        let params = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": true,
        });

        debug!(chat_id = %self.config.chat_id, "텔레그램 메시지 전송");

        let response = self.client.post(&url).json(&params).send().await?;

        let status = response.status();
        if status.is_success() {
            info!("텔레그램 알림 전송 완료");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();

        // 요청 한도 제한 확인
        if status.as_u16() == 429 {
            let retry_after = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["parameters"]["retry_after"].as_u64())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(retry_after, "텔레그램 요청 한도 초과");
            return Err(NotificationError::RateLimited(retry_after));
        }

        error!(status = %status, body = %body, "텔레그램 메시지 전송 실패");
        Err(NotificationError::SendFailed(format!(
            "HTTP {}: {}",
            status, body
        )))
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("텔레그램 알림 비활성화, 건너뜀");
            return Ok(());
        }

        let message = self.format_message(notification);
        self.send_message(&message).await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// HTML 모드 메시지 본문. 제목 한 줄, 항목 목록, 시각 순서입니다.
struct Card {
    lines: Vec<String>,
}

impl Card {
    fn titled(icon: &str, title: &str) -> Self {
        Self {
            lines: vec![format!("{icon} <b>{title}</b>"), String::new()],
        }
    }

    fn row(mut self, label: &str, value: impl std::fmt::Display) -> Self {
        self.lines
            .push(format!("{label}: {}", escape_html(&value.to_string())));
        self
    }

    fn code(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(format!("{label}: <code>{}</code>", escape_html(value)));
        self
    }

    fn finish(mut self, notification: &Notification) -> String {
        self.lines.push(String::new());
        self.lines.push(format!(
            "<i>🕐 {}</i>",
            notification.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        self.lines.join("\n")
    }
}

fn priority_icon(priority: NotificationPriority) -> &'static str {
    match priority {
        NotificationPriority::Low => "ℹ️",
        NotificationPriority::Normal => "📊",
        NotificationPriority::High => "⚠️",
        NotificationPriority::Critical => "🚨",
    }
}

/// 부호를 붙인 소수 둘째 자리 값.
fn signed(value: Decimal) -> String {
    let value = value.round_dp(2);
    if value.is_sign_negative() {
        value.to_string()
    } else {
        format!("+{}", value)
    }
}

fn render(notification: &Notification) -> String {
    let card = match &notification.event {
        NotificationEvent::PositionOpened {
            symbol,
            direction,
            quantity,
            entry_price,
            origin,
        } => {
            let icon = if direction == "LONG" { "🟢" } else { "🔴" };
            Card::titled(icon, "포지션 진입")
                .code("심볼", symbol)
                .row("방향", direction)
                .row("수량", quantity)
                .row("진입가", entry_price)
                .row("출처", origin)
        }
        NotificationEvent::PositionClosed {
            symbol,
            direction,
            quantity,
            entry_price,
            exit_price,
            pnl,
            pnl_percent,
            origin,
        } => {
            let icon = if pnl.is_sign_negative() { "📉" } else { "💰" };
            Card::titled(icon, "포지션 청산")
                .code("심볼", symbol)
                .row("방향", direction)
                .row("수량", quantity)
                .row("진입가", entry_price)
                .row("청산가", exit_price)
                .row(
                    "손익",
                    format!("{} ({}%)", signed(*pnl), signed(*pnl_percent)),
                )
                .row("출처", origin)
        }
        NotificationEvent::TradeFailed {
            symbol,
            direction,
            origin,
            reason,
        } => Card::titled(priority_icon(notification.priority), "거래 실패")
            .code("심볼", symbol)
            .row("방향", direction)
            .row("출처", origin)
            .row("사유", reason),
        NotificationEvent::UnresolvedPosition {
            symbol,
            direction,
            quantity,
            entry_price,
            leverage,
            origin,
            reason,
        } => Card::titled(
            priority_icon(notification.priority),
            "미해결 포지션 - 수동 청산 필요",
        )
        .code("심볼", symbol)
        .row("방향", direction)
        .row("수량", quantity)
        .row("진입가", entry_price)
        .row("레버리지", format!("x{}", leverage))
        .row("출처", origin)
        .row("사유", reason),
    };

    card.finish(notification)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn sender(base_url: &str) -> TelegramSender {
        let config = TelegramConfig::new("test_token".to_string(), "123456".to_string())
            .with_base_url(base_url);
        TelegramSender::new(config)
    }

    fn closed(pnl: Decimal) -> Notification {
        Notification::new(NotificationEvent::PositionClosed {
            symbol: "ETHUSDT".to_string(),
            direction: "LONG".to_string(),
            quantity: dec!(1),
            entry_price: dec!(3000),
            exit_price: dec!(3000) + pnl,
            pnl,
            pnl_percent: pnl / dec!(30),
            origin: "Alpha".to_string(),
        })
    }

    #[test]
    fn test_format_position_closed_profit() {
        let message = sender(TELEGRAM_API_URL).format_message(&closed(dec!(100)));
        assert!(message.contains("포지션 청산"));
        assert!(message.contains("💰"));
        assert!(message.contains("+100"));
    }

    #[test]
    fn test_format_position_closed_loss() {
        let message = sender(TELEGRAM_API_URL).format_message(&closed(dec!(-50)));
        assert!(message.contains("📉"));
        assert!(message.contains("-50"));
        assert!(!message.contains("+-"));
    }

    #[test]
    fn test_format_unresolved_escapes_reason() {
        let notification = Notification::new(NotificationEvent::UnresolvedPosition {
            symbol: "BTCUSDT".to_string(),
            direction: "SHORT".to_string(),
            quantity: dec!(0.05),
            entry_price: dec!(60000),
            leverage: 2,
            origin: "7".to_string(),
            reason: "<timeout>".to_string(),
        })
        .with_priority(NotificationPriority::Critical);

        let message = sender(TELEGRAM_API_URL).format_message(&notification);
        assert!(message.contains("🚨"));
        assert!(message.contains("&lt;timeout&gt;"));
    }

    #[test]
    fn test_config_debug_masks_token() {
        let config = TelegramConfig::new("123:secret".to_string(), "42".to_string());
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[tokio::test]
    async fn test_send_posts_to_bot_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest_token/sendMessage")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "chat_id": "123456",
                "parse_mode": "HTML",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        sender(&server.url()).send(&closed(dec!(10))).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_uses_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/bottest_token/sendMessage")
            .with_status(429)
            .with_body(r#"{"ok":false,"error_code":429,"parameters":{"retry_after":17}}"#)
            .create_async()
            .await;

        let err = sender(&server.url())
            .send(&closed(dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::RateLimited(17)));
    }

    #[tokio::test]
    async fn test_server_error_is_send_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/bottest_token/sendMessage")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = sender(&server.url())
            .send(&closed(dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::SendFailed(_)));
    }

    #[tokio::test]
    async fn test_disabled_sender_skips_request() {
        let mut config = TelegramConfig::new(String::new(), "1".to_string());
        config.base_url = "http://127.0.0.1:1".to_string();
        let sender = TelegramSender::new(config);

        assert!(!sender.is_enabled());
        sender.send(&closed(dec!(1))).await.unwrap();
    }
}
