//! 주문 방향 및 체결 타입.
//!
//! - `Side` - 주문 방향 (매수/매도)
//! - `Direction` - 포지션 방향 (롱/숏)
//! - `OrderFill` - 시장가 주문 체결 결과

use crate::types::{Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 포지션 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 롱 (가격 상승에 베팅)
    Long,
    /// 숏 (가격 하락에 베팅)
    Short,
}

impl Direction {
    /// 감성 점수의 부호로 방향을 결정합니다. 0 이상이면 롱입니다.
    pub fn from_sentiment(score: f64) -> Self {
        if score >= 0.0 {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    /// 진입 주문 방향.
    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    /// 청산 주문 방향.
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }

    /// 손익 부호 (롱 +1, 숏 -1).
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// 시장가 주문 체결 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    /// 거래소 주문 ID
    pub order_id: String,
    /// 심볼
    pub symbol: Symbol,
    /// 주문 방향
    pub side: Side,
    /// 평균 체결 가격
    pub price: Price,
    /// 체결 수량
    pub quantity: Quantity,
    /// 체결 시각
    pub filled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_sides() {
        assert_eq!(Direction::Long.entry_side(), Side::Buy);
        assert_eq!(Direction::Long.exit_side(), Side::Sell);
        assert_eq!(Direction::Short.entry_side(), Side::Sell);
        assert_eq!(Direction::Short.exit_side(), Side::Buy);
    }

    #[test]
    fn test_direction_from_sentiment() {
        assert_eq!(Direction::from_sentiment(80.0), Direction::Long);
        assert_eq!(Direction::from_sentiment(-55.0), Direction::Short);
    }

    #[test]
    fn test_display() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(Direction::Short.to_string(), "SHORT");
    }
}
