//! 라이프사이클 이벤트 싱크와 에스컬레이션 채널.

use std::sync::Arc;

use pulse_core::{Escalation, LifecycleEvent, Severity};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// 상태 전이 이벤트를 받는 경계.
///
/// 워커 안에서 동기적으로 호출되므로 구현체는 블로킹하지 않아야 합니다.
pub trait EventSink: Send + Sync {
    fn on_lifecycle_event(&self, event: &LifecycleEvent);
}

/// 이벤트를 구조화 로그로 남깁니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        match event.severity {
            Severity::Info => info!(
                signal_id = %event.signal_id,
                symbol = %event.symbol,
                state = %event.state,
                detail = %event.detail,
                "라이프사이클 전이"
            ),
            Severity::Warning => warn!(
                signal_id = %event.signal_id,
                symbol = %event.symbol,
                state = %event.state,
                detail = %event.detail,
                "거래 실패"
            ),
            Severity::Critical => error!(
                signal_id = %event.signal_id,
                symbol = %event.symbol,
                state = %event.state,
                detail = %event.detail,
                "운영자 개입 필요"
            ),
        }
    }
}

/// 이벤트를 mpsc 채널로 전달합니다.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelEventSink {
    /// 싱크와 수신 측을 생성합니다.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        // 수신 측이 사라졌으면 조용히 버림
        let _ = self.sender.send(event.clone());
    }
}

/// 여러 싱크로 이벤트를 복제합니다.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 싱크 추가.
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        for sink in &self.sinks {
            sink.on_lifecycle_event(event);
        }
    }
}

/// 에스컬레이션 수신 측.
pub type EscalationReceiver = mpsc::UnboundedReceiver<Escalation>;

/// 에스컬레이션 송신 측.
#[derive(Debug, Clone)]
pub struct EscalationSender {
    sender: mpsc::UnboundedSender<Escalation>,
}

impl EscalationSender {
    /// 에스컬레이션을 올립니다. 수신 측이 없으면 로그로만 남깁니다.
    pub fn escalate(&self, escalation: Escalation) {
        error!(
            signal_id = %escalation.signal_id,
            symbol = %escalation.symbol,
            direction = %escalation.direction,
            quantity = %escalation.quantity,
            entry_price = %escalation.entry_price,
            reason = %escalation.reason,
            "미해결 포지션 에스컬레이션"
        );
        if self.sender.send(escalation).is_err() {
            error!("에스컬레이션 수신 측이 닫혀 있음");
        }
    }
}

/// 에스컬레이션 채널 생성.
pub fn escalation_channel() -> (EscalationSender, EscalationReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EscalationSender { sender }, receiver)
}
