//! 트레이드 실행 코어.
//!
//! 제공 기능:
//! - `Deduplicator` / `SignalQueue`: 심볼당 하나의 진행 중 거래만 허용하는 관문과 FIFO 큐
//! - `PositionLifecycle`: 수량 계산 → 진입 → 보유 → 청산 → 정산 상태 머신
//! - `WorkerPool`: 큐를 소비하는 고정 크기 워커 집합과 협조적 종료
//! - `EventSink` / 에스컬레이션 채널: 외부 알림 경계
//! - `TradeEngine`: 위 구성요소를 묶은 파사드

pub mod dedup;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod pool;

pub use dedup::{
    Admission, AdmissionTicket, Deduplicator, PendingRelease, QueuedSignal, SignalQueue,
    REASON_ALREADY_PENDING, REASON_SHUTTING_DOWN,
};
pub use engine::{ShutdownSummary, TradeEngine, TradeEngineBuilder};
pub use error::*;
pub use events::{
    escalation_channel, ChannelEventSink, EscalationReceiver, EscalationSender, EventSink,
    FanoutSink, TracingEventSink,
};
pub use lifecycle::{LifecycleConfig, PositionLifecycle, TradeOutcome};
pub use pool::{WorkerMetrics, WorkerPool};
