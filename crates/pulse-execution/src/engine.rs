//! 트레이드 엔진 파사드.
//!
//! 관문, 큐, 워커 풀, 통계 저장소를 묶어 수집기와 CLI가 사용하는 단일 진입점을 제공합니다.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use pulse_core::{Direction, SignalResult, Symbol, TradeSignal};
use pulse_exchange::ExchangeGateway;
use pulse_stats::{ChannelStats, GlobalStats, StatsStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dedup::{Admission, Deduplicator, SignalQueue};
use crate::events::{escalation_channel, EscalationReceiver, EventSink, TracingEventSink};
use crate::lifecycle::{LifecycleConfig, PositionLifecycle};
use crate::pool::{WorkerMetrics, WorkerPool};

/// 기본 워커 수.
pub const DEFAULT_WORKER_COUNT: usize = 100;

/// 종료 결과 요약.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// 실행되지 못하고 버려진 신호 수
    pub drained: usize,
    /// 청산 완료된 거래 수
    pub closed: u64,
    /// 진입 전 실패 수
    pub failed_pre_entry: u64,
    /// 미해결 포지션 수
    pub unresolved: u64,
}

/// 엔진 빌더.
pub struct TradeEngineBuilder {
    gateway: Arc<ExchangeGateway>,
    stats: Arc<StatsStore>,
    sink: Option<Arc<dyn EventSink>>,
    worker_count: usize,
    lifecycle: LifecycleConfig,
}

impl TradeEngineBuilder {
    /// 이벤트 싱크 지정. 기본값은 [`TracingEventSink`].
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn lifecycle(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle = config;
        self
    }

    /// 엔진과 에스컬레이션 수신 측을 생성합니다.
    ///
    /// 엔진의 종료 토큰은 게이트웨이의 토큰을 공유하므로 종료 시 재시도 대기도 중단됩니다.
    pub fn build(self) -> (TradeEngine, EscalationReceiver) {
        let (dedup, queue) = Deduplicator::new();
        let (escalations, escalation_rx) = escalation_channel();
        let shutdown = self.gateway.shutdown_token().clone();
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingEventSink) as Arc<dyn EventSink>);

        let lifecycle = Arc::new(PositionLifecycle::new(
            self.gateway,
            Arc::clone(&self.stats),
            sink,
            escalations,
            self.lifecycle,
        ));

        let engine = TradeEngine {
            dedup,
            queue: Arc::new(queue),
            lifecycle,
            stats: self.stats,
            metrics: Arc::new(WorkerMetrics::default()),
            shutdown,
            worker_count: self.worker_count.max(1),
            pool: Mutex::new(None),
        };
        (engine, escalation_rx)
    }
}

/// 트레이드 실행 엔진.
pub struct TradeEngine {
    dedup: Arc<Deduplicator>,
    queue: Arc<SignalQueue>,
    lifecycle: Arc<PositionLifecycle>,
    stats: Arc<StatsStore>,
    metrics: Arc<WorkerMetrics>,
    shutdown: CancellationToken,
    worker_count: usize,
    pool: Mutex<Option<WorkerPool>>,
}

impl TradeEngine {
    pub fn builder(gateway: Arc<ExchangeGateway>, stats: Arc<StatsStore>) -> TradeEngineBuilder {
        TradeEngineBuilder {
            gateway,
            stats,
            sink: None,
            worker_count: DEFAULT_WORKER_COUNT,
            lifecycle: LifecycleConfig::default(),
        }
    }

    /// 워커 풀을 시작합니다. 두 번째 호출부터는 무시됩니다.
    pub fn start(&self) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.is_some() || self.shutdown.is_cancelled() {
            return;
        }
        *pool = Some(WorkerPool::spawn(
            self.worker_count,
            Arc::clone(&self.queue),
            Arc::clone(&self.dedup),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.metrics),
            self.shutdown.clone(),
        ));
    }

    /// 수집기 진입점: 신호를 생성해 제출합니다.
    ///
    /// 신호 생성이 실패하면 (점수 범위 초과, 빈 출처) 큐에 아무것도 들어가지 않습니다.
    pub fn emit(
        &self,
        symbol: Symbol,
        direction: Direction,
        origin_id: &str,
        origin_ref: Option<String>,
        sentiment_score: f64,
    ) -> SignalResult<Admission> {
        let signal = TradeSignal::new(symbol, direction, origin_id, origin_ref, sentiment_score)?;
        Ok(self.submit(signal))
    }

    /// 이미 생성된 신호를 제출합니다.
    pub fn submit(&self, signal: TradeSignal) -> Admission {
        self.dedup.submit(signal)
    }

    pub fn is_pending(&self, symbol: &Symbol) -> bool {
        self.dedup.is_pending(symbol)
    }

    pub fn pending_len(&self) -> usize {
        self.dedup.pending_len()
    }

    pub fn channel_report(&self) -> BTreeMap<String, ChannelStats> {
        self.stats.channel_report()
    }

    pub fn global_report(&self) -> GlobalStats {
        self.stats.global_report()
    }

    pub fn stats(&self) -> &Arc<StatsStore> {
        &self.stats
    }

    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }

    /// 엔진 종료 토큰. 취소하면 새 신호 처리가 멈추고 보유 중인 포지션은 즉시 청산됩니다.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// 협조적 종료.
    ///
    /// 1. 새 제출 차단
    /// 2. 종료 토큰 취소
    /// 3. 워커 합류
    /// 4. 남은 신호 폐기
    pub async fn shutdown(&self) -> ShutdownSummary {
        info!(pending = self.dedup.pending_len(), "엔진 종료 시작");
        self.dedup.close();
        self.shutdown.cancel();

        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = pool {
            pool.join().await;
        }

        let drained = self.queue.drain().await;
        let summary = ShutdownSummary {
            drained,
            closed: self.metrics.closed(),
            failed_pre_entry: self.metrics.failed_pre_entry(),
            unresolved: self.metrics.unresolved(),
        };

        if summary.unresolved > 0 {
            warn!(unresolved = summary.unresolved, "미해결 포지션이 남은 채 종료");
        }
        info!(
            drained = summary.drained,
            closed = summary.closed,
            failed = summary.failed_pre_entry,
            "엔진 종료 완료"
        );
        summary
    }
}
