//! 고정 크기 워커 풀.
//!
//! 각 워커는 큐에서 신호를 꺼내 라이프사이클을 끝까지 실행하고 대기 등록을 해제합니다.
//! 종료 토큰이 취소되면 새 신호를 꺼내지 않으며, 진행 중인 거래는 자체 규칙에 따라 마무리됩니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dedup::{Deduplicator, PendingRelease, SignalQueue};
use crate::lifecycle::{PositionLifecycle, TradeOutcome};

/// 워커 결과 집계.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    closed: AtomicU64,
    failed_pre_entry: AtomicU64,
    unresolved: AtomicU64,
}

impl WorkerMetrics {
    fn record(&self, outcome: &TradeOutcome) {
        let counter = match outcome {
            TradeOutcome::Closed { .. } => &self.closed,
            TradeOutcome::FailedPreEntry { .. } => &self.failed_pre_entry,
            TradeOutcome::Unresolved { .. } => &self.unresolved,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn failed_pre_entry(&self) -> u64 {
        self.failed_pre_entry.load(Ordering::Relaxed)
    }

    pub fn unresolved(&self) -> u64 {
        self.unresolved.load(Ordering::Relaxed)
    }
}

/// 실행 중인 워커 집합.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 워커 `count`개를 띄웁니다. 최소 1개.
    pub fn spawn(
        count: usize,
        queue: Arc<SignalQueue>,
        dedup: Arc<Deduplicator>,
        lifecycle: Arc<PositionLifecycle>,
        metrics: Arc<WorkerMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        let count = count.max(1);
        let handles = (0..count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&dedup),
                    Arc::clone(&lifecycle),
                    Arc::clone(&metrics),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(workers = count, "워커 풀 시작");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 모든 워커가 끝날 때까지 기다립니다.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "워커 비정상 종료");
            }
        }
        info!("워커 풀 종료");
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<SignalQueue>,
    dedup: Arc<Deduplicator>,
    lifecycle: Arc<PositionLifecycle>,
    metrics: Arc<WorkerMetrics>,
    shutdown: CancellationToken,
) {
    debug!(worker = id, "워커 시작");

    while let Some(item) = queue.dequeue(&shutdown).await {
        let _release = PendingRelease::new(Arc::clone(&dedup), item.ticket);
        let outcome = lifecycle.run(&item.signal, &shutdown).await;
        debug!(worker = id, symbol = %item.signal.symbol, state = %outcome.state(), "신호 처리 완료");
        metrics.record(&outcome);
    }

    debug!(worker = id, "워커 종료");
}
