//! 포지션 및 라이프사이클 상태.
//!
//! - `LifecycleState` - 포지션 상태 머신의 상태
//! - `Position` - 워커가 단독 소유하는 단일 거래 포지션

use crate::domain::{Direction, OrderFill};
use crate::types::{Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 포지션 라이프사이클 상태.
///
/// `Sizing → Entering → Holding → Exiting → Closed` 순으로 진행하며,
/// 진입 전 실패는 `FailedPreEntry`, 진입 후 청산 실패는 `Unresolved`로 끝납니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// 수량 계산 중
    Sizing,
    /// 레버리지 설정 및 진입 주문 중
    Entering,
    /// 보유 타이머 대기 중
    Holding,
    /// 청산 주문 중
    Exiting,
    /// 정상 청산 완료
    Closed,
    /// 진입 전 실패 (거래소에 포지션 없음)
    FailedPreEntry,
    /// 진입 후 청산 실패 (거래소에 추적 불가능한 포지션 존재)
    Unresolved,
}

impl LifecycleState {
    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Closed | LifecycleState::FailedPreEntry | LifecycleState::Unresolved
        )
    }

    /// 거래소에 실제 포지션이 열려 있을 수 있는 상태인지 확인합니다.
    pub fn has_exposure(&self) -> bool {
        matches!(
            self,
            LifecycleState::Holding | LifecycleState::Exiting | LifecycleState::Unresolved
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Sizing => "SIZING",
            LifecycleState::Entering => "ENTERING",
            LifecycleState::Holding => "HOLDING",
            LifecycleState::Exiting => "EXITING",
            LifecycleState::Closed => "CLOSED",
            LifecycleState::FailedPreEntry => "FAILED_PRE_ENTRY",
            LifecycleState::Unresolved => "UNRESOLVED",
        };
        f.write_str(s)
    }
}

/// 방향을 반영한 실현 손익을 계산합니다.
///
/// `(exit - entry) * quantity * (롱 +1, 숏 -1)`
pub fn realized_pnl(
    direction: Direction,
    entry_price: Price,
    exit_price: Price,
    quantity: Quantity,
) -> Decimal {
    (exit_price - entry_price) * quantity * direction.sign()
}

/// 단일 거래 포지션.
///
/// 종료 상태에 도달할 때까지 실행 중인 워커만 소유하며,
/// 종료 후 읽기 전용으로 통계 저장소와 알림 경계에 전달된 뒤 폐기됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 원본 신호 ID
    pub signal_id: Uuid,
    /// 신호 출처
    pub origin_id: String,
    /// 심볼
    pub symbol: Symbol,
    /// 방향
    pub direction: Direction,
    /// 진입 체결 가격
    pub entry_price: Price,
    /// 수량
    pub quantity: Quantity,
    /// 레버리지
    pub leverage: u32,
    /// 진입 시각
    pub entry_time: DateTime<Utc>,
    /// 청산 체결 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<Price>,
    /// 청산 시각
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,
    /// 실현 손익
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,
    /// 현재 상태
    pub status: LifecycleState,
}

impl Position {
    /// 진입 체결로부터 보유 상태의 포지션을 생성합니다.
    pub fn open(
        signal_id: Uuid,
        origin_id: impl Into<String>,
        direction: Direction,
        leverage: u32,
        entry: &OrderFill,
    ) -> Self {
        Self {
            signal_id,
            origin_id: origin_id.into(),
            symbol: entry.symbol.clone(),
            direction,
            entry_price: entry.price,
            quantity: entry.quantity,
            leverage,
            entry_time: entry.filled_at,
            exit_price: None,
            exit_time: None,
            pnl: None,
            status: LifecycleState::Holding,
        }
    }

    /// 청산 체결을 반영해 포지션을 닫고 실현 손익을 반환합니다.
    pub fn close(&mut self, exit: &OrderFill) -> Decimal {
        let pnl = realized_pnl(self.direction, self.entry_price, exit.price, self.quantity);
        self.exit_price = Some(exit.price);
        self.exit_time = Some(exit.filled_at);
        self.pnl = Some(pnl);
        self.status = LifecycleState::Closed;
        pnl
    }

    /// 명목 금액 (진입가 × 수량).
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// 진입 명목 대비 손익률 (%).
    pub fn pnl_percent(&self) -> Option<Decimal> {
        let notional = self.notional();
        if notional.is_zero() {
            return None;
        }
        self.pnl.map(|pnl| pnl / notional * Decimal::ONE_HUNDRED)
    }
}
