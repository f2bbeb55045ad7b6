//! 라이프사이클 이벤트 및 에스컬레이션 타입.
//!
//! 워커는 모든 상태 전이마다 [`LifecycleEvent`]를 발행하고,
//! 진입 후 청산에 실패하면 별도의 [`Escalation`]을 올립니다.

use crate::domain::{Direction, LifecycleState, Position, TradeSignal};
use crate::types::{Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 이벤트 심각도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정상 진행
    Info,
    /// 거래 실패 (자본 노출 없음)
    Warning,
    /// 운영자 개입 필요
    Critical,
}

/// 상태 전이 이벤트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// 신호 ID
    pub signal_id: Uuid,
    /// 심볼
    pub symbol: Symbol,
    /// 신호 출처
    pub origin_id: String,
    /// 방향
    pub direction: Direction,
    /// 전이된 상태
    pub state: LifecycleState,
    /// 사람이 읽을 수 있는 상세 내용
    pub detail: String,
    /// 심각도
    pub severity: Severity,
    /// 종료 상태일 때 포지션 스냅샷
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// 신호를 기준으로 새 이벤트를 생성합니다. 심각도는 상태에서 유도됩니다.
    pub fn new(signal: &TradeSignal, state: LifecycleState, detail: impl Into<String>) -> Self {
        let severity = match state {
            LifecycleState::Unresolved => Severity::Critical,
            LifecycleState::FailedPreEntry => Severity::Warning,
            _ => Severity::Info,
        };

        Self {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            origin_id: signal.origin_id.clone(),
            direction: signal.direction,
            state,
            detail: detail.into(),
            severity,
            position: None,
            timestamp: Utc::now(),
        }
    }

    /// 포지션 스냅샷을 첨부합니다.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// 추적 불가능한 포지션에 대한 운영자 에스컬레이션.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    /// 신호 ID
    pub signal_id: Uuid,
    /// 심볼
    pub symbol: Symbol,
    /// 방향
    pub direction: Direction,
    /// 거래소에 남아 있는 수량
    pub quantity: Quantity,
    /// 진입 가격
    pub entry_price: Price,
    /// 레버리지
    pub leverage: u32,
    /// 신호 출처
    pub origin_id: String,
    /// 청산 실패 사유
    pub reason: String,
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
}

impl Escalation {
    /// 열린 포지션과 실패 사유로부터 생성합니다.
    pub fn from_position(position: &Position, reason: impl Into<String>) -> Self {
        Self {
            signal_id: position.signal_id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            quantity: position.quantity,
            entry_price: position.entry_price,
            leverage: position.leverage,
            origin_id: position.origin_id.clone(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
