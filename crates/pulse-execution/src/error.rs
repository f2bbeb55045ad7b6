//! 트레이드 실행 에러 타입.

use pulse_core::Symbol;
use pulse_exchange::{ErrorClass, ExchangeError};
use thiserror::Error;

/// 거래 종료 사유 분류.
#[derive(Debug, Clone, Error)]
pub enum TradeError {
    /// 일시적 오류가 재시도 소진 후에도 지속됨
    #[error("거래소 재시도 소진: {0}")]
    Transient(ExchangeError),

    /// 거래소가 거부 (잘못된 심볼, 잔고 부족 등)
    #[error("주문 거부: {0}")]
    Rejected(ExchangeError),

    /// 수량이 0이거나 유효하지 않음
    #[error("수량 계산 실패: {0}")]
    Sizing(ExchangeError),

    /// 협조적 종료
    #[error("종료 요청으로 중단")]
    Shutdown,

    /// 진입 후 청산 실패 (거래소에 포지션이 남아 있음)
    #[error("미해결 포지션 {symbol}: {reason}")]
    Unresolved { symbol: Symbol, reason: String },
}

impl TradeError {
    /// 게이트웨이 에러를 분류합니다.
    pub fn from_exchange(error: ExchangeError) -> Self {
        if error.class() == ErrorClass::Shutdown {
            return TradeError::Shutdown;
        }
        match error {
            ExchangeError::RetriesExhausted { .. } => TradeError::Transient(error),
            ExchangeError::InvalidQuantity(_) => TradeError::Sizing(error),
            other => TradeError::Rejected(other),
        }
    }

    /// 운영자 개입이 필요한 에러인지 확인.
    pub fn is_critical(&self) -> bool {
        matches!(self, TradeError::Unresolved { .. })
    }
}

/// 거래 실행을 위한 Result 타입.
pub type TradeResult<T> = Result<T, TradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(matches!(
            TradeError::from_exchange(ExchangeError::Shutdown),
            TradeError::Shutdown
        ));
        assert!(matches!(
            TradeError::from_exchange(ExchangeError::RetriesExhausted {
                attempts: 5,
                last: Box::new(ExchangeError::Timeout("t".into())),
            }),
            TradeError::Transient(_)
        ));
        assert!(matches!(
            TradeError::from_exchange(ExchangeError::InvalidQuantity("0".into())),
            TradeError::Sizing(_)
        ));
        assert!(matches!(
            TradeError::from_exchange(ExchangeError::InsufficientBalance("x".into())),
            TradeError::Rejected(_)
        ));
    }
}
