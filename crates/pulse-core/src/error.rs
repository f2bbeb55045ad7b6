//! 신호 경계의 에러 타입.
//!
//! 외부 수집기가 만든 텍스트나 값이 검증된 [`TradeSignal`](crate::TradeSignal)이
//! 되기 전에 발생하는 에러를 정의합니다.

use thiserror::Error;

/// 신호 파싱/검증 에러.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// 심볼 형식 오류
    #[error("잘못된 심볼: {0}")]
    InvalidSymbol(String),

    /// 감성 점수가 [-100, 100] 범위를 벗어남
    #[error("감성 점수 범위 초과: {0}")]
    SentimentOutOfRange(f64),

    /// 필수 필드 누락
    #[error("필수 필드 누락: {0}")]
    MissingField(&'static str),

    /// 감성 점수가 거래 임계값 미만
    #[error("임계값 미만 감성 점수: {score} (임계값 {threshold})")]
    BelowThreshold { score: f64, threshold: f64 },

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),
}

/// 신호 작업을 위한 Result 타입.
pub type SignalResult<T> = Result<T, SignalError>;

impl SignalError {
    /// 입력 자체가 잘못된 것이 아니라 단순히 거래 대상이 아닌 경우인지 확인합니다.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, SignalError::BelowThreshold { .. })
    }
}

impl From<config::ConfigError> for SignalError {
    fn from(err: config::ConfigError) -> Self {
        SignalError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_ignorable() {
        let below = SignalError::BelowThreshold {
            score: 20.0,
            threshold: 50.0,
        };
        assert!(below.is_ignorable());

        let invalid = SignalError::InvalidSymbol("??".to_string());
        assert!(!invalid.is_ignorable());
    }

    #[test]
    fn test_error_display() {
        let err = SignalError::SentimentOutOfRange(120.0);
        assert!(err.to_string().contains("120"));
    }
}
