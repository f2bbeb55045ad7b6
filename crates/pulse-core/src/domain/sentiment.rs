//! 감성 분석 결과 텍스트 파서.
//!
//! 수집기가 전달하는 텍스트에서 다음 두 줄을 추출해 [`TradeSignal`]로 변환합니다:
//!
//! ```text
//! Sentiment: 80%
//! Coins: BTC, ETH
//! ```

use crate::domain::{Direction, TradeSignal, SENTIMENT_RANGE};
use crate::error::{SignalError, SignalResult};
use crate::types::Symbol;
use tracing::{debug, warn};

const SENTIMENT_KEY: &str = "sentiment:";
const COINS_KEY: &str = "coins:";

/// 감성 텍스트를 검증된 신호로 변환하는 파서.
#[derive(Debug, Clone)]
pub struct SentimentParser {
    threshold: f64,
}

impl Default for SentimentParser {
    fn default() -> Self {
        Self { threshold: 50.0 }
    }
}

impl SentimentParser {
    /// 거래 임계값을 지정해 생성합니다.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// 설정된 임계값.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 텍스트를 파싱해 코인마다 하나의 신호를 만듭니다.
    ///
    /// # Errors
    /// - 감성 또는 코인 줄이 없으면 `MissingField`
    /// - 점수가 범위를 벗어나면 `SentimentOutOfRange`
    /// - |점수|가 임계값 미만이면 `BelowThreshold`
    /// - 유효한 코인이 하나도 없으면 `InvalidSymbol`
    pub fn parse(
        &self,
        text: &str,
        origin_id: &str,
        origin_ref: Option<&str>,
    ) -> SignalResult<Vec<TradeSignal>> {
        let score = extract_sentiment(text)?;

        if !SENTIMENT_RANGE.contains(&score) {
            return Err(SignalError::SentimentOutOfRange(score));
        }
        if score.abs() < self.threshold {
            return Err(SignalError::BelowThreshold {
                score,
                threshold: self.threshold,
            });
        }

        let coins = extract_field(text, COINS_KEY).ok_or(SignalError::MissingField("coins"))?;
        let direction = Direction::from_sentiment(score);

        let mut signals = Vec::new();
        for coin in coins.split(',').map(str::trim) {
            if coin.is_empty() || coin.eq_ignore_ascii_case("N/A") {
                continue;
            }
            match Symbol::parse(coin) {
                Ok(symbol) => signals.push(TradeSignal::new(
                    symbol,
                    direction,
                    origin_id,
                    origin_ref.map(str::to_string),
                    score,
                )?),
                Err(e) => warn!(coin, error = %e, "잘못된 코인 건너뜀"),
            }
        }

        if signals.is_empty() {
            return Err(SignalError::InvalidSymbol(coins.trim().to_string()));
        }

        debug!(count = signals.len(), score, %direction, "신호 파싱 완료");
        Ok(signals)
    }
}

/// 대소문자 구분 없이 `key` 뒤부터 줄 끝까지의 값을 반환합니다.
fn extract_field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    // ASCII 소문자 변환은 바이트 길이를 보존하므로 인덱스를 그대로 쓸 수 있음
    let lower = text.to_ascii_lowercase();
    let start = lower.find(key)? + key.len();
    let rest = &text[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    Some(&rest[..end])
}

fn extract_sentiment(text: &str) -> SignalResult<f64> {
    let value = extract_field(text, SENTIMENT_KEY)
        .ok_or(SignalError::MissingField("sentiment"))?
        .trim_start();

    let number_len = value
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))
        })
        .count();
    let (number, rest) = value.split_at(number_len);

    if !rest.starts_with('%') {
        return Err(SignalError::MissingField("sentiment"));
    }

    number
        .parse::<f64>()
        .map_err(|_| SignalError::MissingField("sentiment"))
}
