//! Write-behind 통계 플러셔.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::persist::StatsPersister;
use crate::store::StatsStore;

/// 변경이 있을 때 스냅샷을 기록하는 백그라운드 작업을 시작합니다.
///
/// 기록 알림이나 `interval` 주기마다 깨어나 마지막 저장 이후 변경이 있으면
/// 스냅샷을 떠서 락을 놓은 뒤 영속화합니다. 실패하면 다음 주기에 다시 시도합니다.
/// `shutdown`이 취소되면 마지막으로 한 번 더 기록하고 종료합니다.
pub fn spawn_flusher(
    store: Arc<StatsStore>,
    persister: Arc<dyn StatsPersister>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    // 복원된 상태는 이미 저장된 것으로 간주
    let mut persisted = store.generation();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = store.changed() => {}
                _ = ticker.tick() => {}
            }
            flush_if_changed(&store, persister.as_ref(), &mut persisted).await;
        }

        flush_if_changed(&store, persister.as_ref(), &mut persisted).await;
        info!(generation = persisted, "통계 플러셔 종료");
    })
}

async fn flush_if_changed(store: &StatsStore, persister: &dyn StatsPersister, persisted: &mut u64) {
    let (generation, snapshot) = store.snapshot_with_generation();
    if generation == *persisted {
        return;
    }

    match persister.persist(&snapshot).await {
        Ok(()) => {
            debug!(generation, "통계 플러시 완료");
            *persisted = generation;
        }
        Err(e) => error!(error = %e, generation, "통계 플러시 실패"),
    }
}
