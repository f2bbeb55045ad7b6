//! 거래소 호출 재시도 유틸리티.
//!
//! 네트워크 오류, 타임아웃, Rate Limit 같은 일시적 오류에 대해 자동 재시도를 수행합니다.
//! 모든 시도는 재시도 횟수와 별개로 시도별 타임아웃을 가지며,
//! 재시도 대기는 종료 토큰과 경합하여 종료 시 즉시 `ExchangeError::Shutdown`을 반환합니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! let policy = RetryPolicy::default();
//! let price = with_retry(&policy, &shutdown, "fetch_price", || exchange.fetch_price(&symbol)).await?;
//! ```

use std::{future::Future, time::Duration};

use pulse_core::{BackoffKind, RetrySettings};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ExchangeError;

/// 대기 시간 증가 방식.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// 매번 같은 대기 시간
    Fixed,
    /// `base * multiplier^(n-1)`
    Exponential { multiplier: f64 },
}

/// 재시도 정책.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 총 시도 횟수 (첫 시도 포함).
    pub max_attempts: u32,
    /// 기본 대기 시간.
    pub base_delay: Duration,
    /// 최대 대기 시간.
    pub max_delay: Duration,
    /// 백오프 방식.
    pub backoff: Backoff,
    /// ±25% 지터 추가 여부.
    pub jitter: bool,
    /// 시도별 타임아웃.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Fixed,
            jitter: false,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff: match settings.backoff {
                BackoffKind::Fixed => Backoff::Fixed,
                BackoffKind::Exponential => Backoff::Exponential { multiplier: 2.0 },
            },
            jitter: settings.jitter,
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// `failed_attempt`번째(1부터) 시도가 실패한 뒤의 대기 시간.
    ///
    /// 결과는 지터를 포함해 항상 `max_delay` 이하입니다.
    pub fn delay_for(&self, failed_attempt: u32, error: &ExchangeError) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { multiplier } => {
                let exp = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                self.clamped(self.base_delay.as_secs_f64() * multiplier.powi(exp))
            }
        };

        // 에러가 권장하는 대기 시간이 더 길면 그것을 사용
        let delay = error
            .retry_after()
            .map_or(delay, |hint| delay.max(hint));

        let delay = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.75..=1.25);
            self.clamped(delay.as_secs_f64() * factor)
        } else {
            delay
        };

        delay.min(self.max_delay)
    }

    /// 초 단위 값을 `Duration`으로 바꿉니다. 표현 범위를 넘거나 NaN이면 `max_delay`.
    fn clamped(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// 재시도와 시도별 타임아웃이 포함된 비동기 작업 실행.
///
/// - 첫 시도는 종료 요청 여부와 관계없이 항상 실행됩니다.
/// - 치명적 에러와 재시도 불가능한 에러는 즉시 반환합니다.
/// - 시도 횟수를 모두 소진하면 `RetriesExhausted`로 감싸 반환합니다.
/// - 재시도 대기 중 종료가 요청되면 `Shutdown`을 반환합니다.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(format!(
                "{} exceeded {}ms",
                operation,
                policy.attempt_timeout.as_millis()
            ))),
        };

        let error = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempts = attempt, "재시도 후 성공");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            debug!(operation, error = %error, "재시도 불가능한 에러, 즉시 실패 반환");
            return Err(error);
        }

        if attempt >= policy.max_attempts {
            warn!(
                operation,
                error = %error,
                attempts = attempt,
                "최대 재시도 횟수 초과"
            );
            return Err(ExchangeError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = policy.delay_for(attempt, &error);
        warn!(
            operation,
            error = %error,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "재시도 대기 중"
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(operation, "종료 요청으로 재시도 중단");
                return Err(ExchangeError::Shutdown);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}
