//! 알림 타입 및 trait 정의.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{Escalation, LifecycleEvent, LifecycleState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 알림 우선순위 레벨.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// 낮은 우선순위 (정보성)
    Low,
    /// 일반 우선순위
    #[default]
    Normal,
    /// 높은 우선순위 (거래 실패)
    High,
    /// 긴급 우선순위 (즉시 대응 필요)
    Critical,
}

/// 알림 이벤트 타입.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// 포지션 진입
    PositionOpened {
        symbol: String,
        direction: String,
        quantity: Decimal,
        entry_price: Decimal,
        origin: String,
    },
    /// 포지션 청산
    PositionClosed {
        symbol: String,
        direction: String,
        quantity: Decimal,
        entry_price: Decimal,
        exit_price: Decimal,
        pnl: Decimal,
        pnl_percent: Decimal,
        origin: String,
    },
    /// 진입 전 거래 실패
    TradeFailed {
        symbol: String,
        direction: String,
        origin: String,
        reason: String,
    },
    /// 청산 실패로 거래소에 남은 포지션
    UnresolvedPosition {
        symbol: String,
        direction: String,
        quantity: Decimal,
        entry_price: Decimal,
        leverage: u32,
        origin: String,
        reason: String,
    },
}

/// 알림 메시지.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// 고유 알림 ID
    pub id: String,
    /// 알림 이벤트
    pub event: NotificationEvent,
    /// 우선순위 레벨
    pub priority: NotificationPriority,
    /// 타임스탬프
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// 새 알림을 생성합니다.
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            priority: NotificationPriority::Normal,
            timestamp: Utc::now(),
        }
    }

    /// 우선순위 레벨을 설정합니다.
    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    /// 라이프사이클 이벤트를 알림으로 변환합니다.
    ///
    /// 진입 체결, 청산, 진입 전 실패만 알림 대상입니다.
    /// 미해결 포지션은 에스컬레이션 채널로 따로 전달되므로 여기서는 제외합니다.
    pub fn from_lifecycle(event: &LifecycleEvent) -> Option<Self> {
        let symbol = event.symbol.to_string();
        let direction = event.direction.to_string();
        let origin = event.origin_id.clone();

        let notification = match event.state {
            LifecycleState::Holding => {
                let position = event.position.as_ref()?;
                Self::new(NotificationEvent::PositionOpened {
                    symbol,
                    direction,
                    quantity: position.quantity,
                    entry_price: position.entry_price,
                    origin,
                })
            }
            LifecycleState::Closed => {
                let position = event.position.as_ref()?;
                Self::new(NotificationEvent::PositionClosed {
                    symbol,
                    direction,
                    quantity: position.quantity,
                    entry_price: position.entry_price,
                    exit_price: position.exit_price?,
                    pnl: position.pnl?,
                    pnl_percent: position.pnl_percent().unwrap_or(Decimal::ZERO),
                    origin,
                })
            }
            LifecycleState::FailedPreEntry => Self::new(NotificationEvent::TradeFailed {
                symbol,
                direction,
                origin,
                reason: event.detail.clone(),
            })
            .with_priority(NotificationPriority::High),
            _ => return None,
        };

        Some(notification)
    }

    /// 에스컬레이션을 긴급 알림으로 변환합니다.
    pub fn from_escalation(escalation: &Escalation) -> Self {
        Self::new(NotificationEvent::UnresolvedPosition {
            symbol: escalation.symbol.to_string(),
            direction: escalation.direction.to_string(),
            quantity: escalation.quantity,
            entry_price: escalation.entry_price,
            leverage: escalation.leverage,
            origin: escalation.origin_id.clone(),
            reason: escalation.reason.clone(),
        })
        .with_priority(NotificationPriority::Critical)
    }
}

pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림 전달 실패.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// 수신 측이 요청을 거부함
    #[error("전송 거부: {0}")]
    SendFailed(String),

    /// 수신 측이 지정한 대기 시간(초)
    #[error("전송 한도 초과, {0}초 대기 필요")]
    RateLimited(u64),

    #[error("HTTP 전송 실패: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("응답 해석 실패: {0}")]
    Decode(#[from] serde_json::Error),
}

/// 알림 채널.
///
/// 디스패처는 `is_enabled()`가 false인 채널을 건너뛰고,
/// 한 채널의 실패가 다른 채널 전달을 막지 않습니다.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> NotificationResult<()>;

    fn is_enabled(&self) -> bool;

    /// 로그에 쓰이는 채널 이름
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Direction, OrderFill, Position, Side, Symbol, TradeSignal};
    use rust_decimal_macros::dec;

    fn signal() -> TradeSignal {
        TradeSignal::new(Symbol::parse("BTC").unwrap(), Direction::Long, "7", None, 80.0).unwrap()
    }

    fn fill(side: Side, price: Decimal) -> OrderFill {
        OrderFill {
            order_id: "1".into(),
            symbol: Symbol::parse("BTC").unwrap(),
            side,
            price,
            quantity: dec!(10),
            filled_at: Utc::now(),
        }
    }

    #[test]
    fn test_sizing_and_exiting_are_not_forwarded() {
        let signal = signal();
        for state in [
            LifecycleState::Sizing,
            LifecycleState::Entering,
            LifecycleState::Exiting,
            LifecycleState::Unresolved,
        ] {
            let event = LifecycleEvent::new(&signal, state, "x");
            assert!(Notification::from_lifecycle(&event).is_none());
        }
    }

    #[test]
    fn test_closed_event_carries_pnl() {
        let signal = signal();
        let mut position = Position::open(
            signal.id,
            "7",
            Direction::Long,
            1,
            &fill(Side::Buy, dec!(100)),
        );
        position.close(&fill(Side::Sell, dec!(105)));

        let event = LifecycleEvent::new(&signal, LifecycleState::Closed, "done")
            .with_position(position);
        let notification = Notification::from_lifecycle(&event).unwrap();

        match notification.event {
            NotificationEvent::PositionClosed {
                pnl, pnl_percent, ..
            } => {
                assert_eq!(pnl, dec!(50));
                assert_eq!(pnl_percent, dec!(5));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(notification.priority, NotificationPriority::Normal);
    }

    #[test]
    fn test_failure_priority() {
        let event = LifecycleEvent::new(&signal(), LifecycleState::FailedPreEntry, "rejected");
        let notification = Notification::from_lifecycle(&event).unwrap();
        assert_eq!(notification.priority, NotificationPriority::High);
    }

    #[test]
    fn test_escalation_is_critical() {
        let position = Position::open(
            uuid::Uuid::new_v4(),
            "7",
            Direction::Short,
            3,
            &fill(Side::Sell, dec!(100)),
        );
        let notification =
            Notification::from_escalation(&Escalation::from_position(&position, "exit failed"));
        assert_eq!(notification.priority, NotificationPriority::Critical);
        assert!(matches!(
            notification.event,
            NotificationEvent::UnresolvedPosition { leverage: 3, .. }
        ));
    }
}
