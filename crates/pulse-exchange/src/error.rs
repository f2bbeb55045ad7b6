//! 거래소 에러 타입.
//!
//! 게이트웨이는 [`ExchangeError::class`]만 보고 재시도 여부를 결정합니다.

use std::time::Duration;

use thiserror::Error;

/// 재시도 관점의 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 잠시 후 다시 시도하면 성공할 수 있음
    Transient,
    /// 같은 요청을 반복해도 결과가 같음
    Permanent,
    /// 종료 요청으로 중단됨
    Shutdown,
}

/// 거래소 관련 에러.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// 연결/전송 실패
    #[error("network failure: {0}")]
    Network(String),

    /// 거래소 측 연결 끊김 (-1001)
    #[error("exchange disconnected: {0}")]
    Disconnected(String),

    /// 요청 한도 초과
    #[error("rate limited by exchange")]
    RateLimited,

    /// 시도별 타임아웃
    #[error("timed out: {0}")]
    Timeout(String),

    /// 서버 시각과 recvWindow 불일치 (-1021)
    #[error("clock skew: {0}")]
    ClockSkew(String),

    /// API 키 또는 서명 문제
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("insufficient margin: {0}")]
    InsufficientBalance(String),

    /// 수량이 최소 단위 미만이거나 정밀도 위반
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("unknown symbol: {0}")]
    SymbolNotFound(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// 분류되지 않은 거래소 에러 코드
    #[error("exchange error {code}: {message}")]
    Api { code: i32, message: String },

    /// 응답 본문 해석 실패
    #[error("malformed response: {0}")]
    Decode(String),

    /// 재시도 대기 중 종료 요청
    #[error("shutdown requested")]
    Shutdown,

    /// 일시적 에러가 시도 한도까지 반복됨
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ExchangeError>,
    },

    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    /// 재시도 분류. `RetriesExhausted`는 더 이상 재시도하지 않으므로 영구 에러입니다.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_)
            | Self::Disconnected(_)
            | Self::RateLimited
            | Self::Timeout(_)
            | Self::ClockSkew(_) => ErrorClass::Transient,
            Self::Shutdown => ErrorClass::Shutdown,
            Self::RetriesExhausted { last, .. } if last.is_shutdown() => ErrorClass::Shutdown,
            _ => ErrorClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// 종료 요청으로 중단된 에러인지 확인.
    pub fn is_shutdown(&self) -> bool {
        match self {
            Self::Shutdown => true,
            Self::RetriesExhausted { last, .. } => last.is_shutdown(),
            _ => false,
        }
    }

    /// 거래소가 요구하는 최소 대기 시간.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited => Some(Duration::from_secs(5)),
            Self::Disconnected(_) => Some(Duration::from_secs(3)),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout(message)
        } else if err.is_decode() {
            Self::Decode(message)
        } else if err.is_connect() || err.is_request() {
            Self::Network(message)
        } else {
            Self::Other(message)
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(ExchangeError::RateLimited.class(), ErrorClass::Transient);
        assert_eq!(ExchangeError::ClockSkew("t".into()).class(), ErrorClass::Transient);
        assert_eq!(
            ExchangeError::SymbolNotFound("X".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ExchangeError::InsufficientBalance("x".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(ExchangeError::Shutdown.class(), ErrorClass::Shutdown);
    }

    #[test]
    fn test_exhausted_is_not_retried_again() {
        let err = ExchangeError::RetriesExhausted {
            attempts: 5,
            last: Box::new(ExchangeError::Timeout("slow".into())),
        };
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert!(!err.is_retryable());
        assert!(!err.is_shutdown());

        let err = ExchangeError::RetriesExhausted {
            attempts: 2,
            last: Box::new(ExchangeError::Shutdown),
        };
        assert!(err.is_shutdown());
        assert_eq!(err.class(), ErrorClass::Shutdown);
    }

    #[test]
    fn test_retry_after_hint() {
        assert_eq!(
            ExchangeError::RateLimited.retry_after(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(ExchangeError::Network("x".into()).retry_after(), None);
    }
}
