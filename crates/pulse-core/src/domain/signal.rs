//! 외부 수집기가 생성하는 트레이딩 신호.

use crate::domain::Direction;
use crate::error::{SignalError, SignalResult};
use crate::types::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 감성 점수의 허용 범위.
pub const SENTIMENT_RANGE: std::ops::RangeInclusive<f64> = -100.0..=100.0;

/// 검증된 불변 트레이딩 신호.
///
/// 수집기가 한 번 생성하고 워커가 정확히 한 번 소비합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// 고유 신호 ID
    pub id: Uuid,
    /// 거래 심볼
    pub symbol: Symbol,
    /// 포지션 방향
    pub direction: Direction,
    /// 신호 출처 (채널 ID 등)
    pub origin_id: String,
    /// 출처 내 참조 (메시지 ID 등)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_ref: Option<String>,
    /// 감성 점수 [-100, 100]
    pub sentiment_score: f64,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl TradeSignal {
    /// 새 신호를 생성합니다.
    ///
    /// 감성 점수가 유한하고 [-100, 100] 범위 안이어야 하며 출처 ID가 비어 있으면 안 됩니다.
    pub fn new(
        symbol: Symbol,
        direction: Direction,
        origin_id: impl Into<String>,
        origin_ref: Option<String>,
        sentiment_score: f64,
    ) -> SignalResult<Self> {
        if !sentiment_score.is_finite() || !SENTIMENT_RANGE.contains(&sentiment_score) {
            return Err(SignalError::SentimentOutOfRange(sentiment_score));
        }

        let origin_id = origin_id.into();
        if origin_id.trim().is_empty() {
            return Err(SignalError::MissingField("origin_id"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            symbol,
            direction,
            origin_id,
            origin_ref,
            sentiment_score,
            created_at: Utc::now(),
        })
    }
}
