//! 동시성 안전한 손익 집계 저장소.
//!
//! 모든 갱신은 하나의 뮤텍스 임계 구역 안에서 O(1)로 끝나며,
//! 네트워크나 파일 I/O는 절대 이 구역 안에서 수행하지 않습니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

/// 출처별 통계.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// 누적 실현 손익
    pub cumulative_pnl: Decimal,
    /// 거래 횟수
    pub trade_count: u64,
}

/// 전체 통계.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// 총 거래 횟수
    pub trade_count: u64,
    /// 총 실현 손익
    pub total_pnl: Decimal,
    /// 최대 단일 거래 수익 (0에서 시작, 0 이상 손익만 반영)
    pub max_gain: Decimal,
    /// 최대 단일 거래 손실 (0에서 시작, 가장 음수인 손익)
    pub max_drawdown: Decimal,
    /// 전체 거래의 이동 평균 손익
    pub average_gain: Decimal,
    /// 수익 거래 횟수
    pub winning_trades: u64,
    /// 손실 거래 횟수
    pub losing_trades: u64,
}

impl GlobalStats {
    fn record(&mut self, pnl: Decimal) {
        self.trade_count += 1;
        self.total_pnl += pnl;

        if pnl >= Decimal::ZERO {
            self.max_gain = self.max_gain.max(pnl);
        } else {
            self.max_drawdown = self.max_drawdown.min(pnl);
        }

        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        } else if pnl < Decimal::ZERO {
            self.losing_trades += 1;
        }

        self.average_gain += (pnl - self.average_gain) / Decimal::from(self.trade_count);
    }

    /// 승률 (%, 거래가 없으면 0).
    pub fn win_rate(&self) -> Decimal {
        if self.trade_count == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_trades) / Decimal::from(self.trade_count)
                * Decimal::ONE_HUNDRED
        }
    }
}

/// 특정 시점의 일관된 통계 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// 출처별 통계
    pub channels: BTreeMap<String, ChannelStats>,
    /// 전체 통계
    pub global: GlobalStats,
    /// 스냅샷 생성 시각
    pub taken_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct StatsInner {
    channels: HashMap<String, ChannelStats>,
    global: GlobalStats,
    generation: u64,
}

/// 손익 통계 저장소.
///
/// 워커들이 `Arc<StatsStore>`로 공유합니다.
#[derive(Default)]
pub struct StatsStore {
    inner: Mutex<StatsInner>,
    changed: Notify,
}

impl StatsStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 영속화된 스냅샷으로 초기 상태를 채웁니다.
    pub fn restore(snapshot: StatsSnapshot) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                channels: snapshot.channels.into_iter().collect(),
                global: snapshot.global,
                generation: 0,
            }),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        // 모든 임계 구역은 패닉 가능 지점 이전에 일관된 상태를 유지함
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 종료된 거래의 손익을 기록합니다.
    ///
    /// 출처별 통계와 전체 통계를 하나의 임계 구역에서 함께 갱신합니다.
    pub fn record_trade(&self, origin_id: &str, pnl: Decimal) {
        let generation = {
            let mut inner = self.lock();
            let channel = inner.channels.entry(origin_id.to_string()).or_default();
            channel.cumulative_pnl += pnl;
            channel.trade_count += 1;
            inner.global.record(pnl);
            inner.generation += 1;
            inner.generation
        };

        debug!(origin = origin_id, %pnl, generation, "거래 통계 기록");
        self.changed.notify_one();
    }

    /// 출처별 통계 스냅샷.
    pub fn channel_report(&self) -> BTreeMap<String, ChannelStats> {
        let inner = self.lock();
        inner
            .channels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// 전체 통계 스냅샷.
    pub fn global_report(&self) -> GlobalStats {
        self.lock().global.clone()
    }

    /// 출처별과 전체 통계를 같은 시점 기준으로 함께 반환합니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_with_generation().1
    }

    /// 변경 세대와 스냅샷을 함께 반환합니다.
    pub fn snapshot_with_generation(&self) -> (u64, StatsSnapshot) {
        let inner = self.lock();
        let snapshot = StatsSnapshot {
            channels: inner
                .channels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            global: inner.global.clone(),
            taken_at: Some(Utc::now()),
        };
        (inner.generation, snapshot)
    }

    /// 기록 횟수에 따라 증가하는 변경 세대.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// 다음 기록이 발생할 때까지 대기합니다.
    ///
    /// 대기자가 없을 때 발생한 기록도 한 번의 알림으로 보존됩니다.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_record_updates_channel_and_global() {
        let store = StatsStore::new();
        store.record_trade("1", dec!(100));
        store.record_trade("1", dec!(-30));
        store.record_trade("2", dec!(50));

        let channels = store.channel_report();
        assert_eq!(channels["1"].cumulative_pnl, dec!(70));
        assert_eq!(channels["1"].trade_count, 2);
        assert_eq!(channels["2"].cumulative_pnl, dec!(50));

        let global = store.global_report();
        assert_eq!(global.trade_count, 3);
        assert_eq!(global.total_pnl, dec!(120));
        assert_eq!(global.max_gain, dec!(100));
        assert_eq!(global.max_drawdown, dec!(-30));
        assert_eq!(global.average_gain, dec!(40));
        assert_eq!(global.winning_trades, 2);
        assert_eq!(global.losing_trades, 1);
    }

    #[test]
    fn test_extremes_start_at_zero() {
        let store = StatsStore::new();
        store.record_trade("1", dec!(-5));
        let global = store.global_report();
        assert_eq!(global.max_gain, dec!(0));
        assert_eq!(global.max_drawdown, dec!(-5));

        let store = StatsStore::new();
        store.record_trade("1", dec!(5));
        assert_eq!(store.global_report().max_drawdown, dec!(0));
    }

    #[test]
    fn test_win_rate() {
        let store = StatsStore::new();
        assert_eq!(store.global_report().win_rate(), dec!(0));
        store.record_trade("1", dec!(1));
        store.record_trade("1", dec!(-1));
        store.record_trade("1", dec!(0));
        store.record_trade("1", dec!(2));
        assert_eq!(store.global_report().win_rate(), dec!(50));
    }

    #[test]
    fn test_channel_sum_equals_global_total() {
        let store = StatsStore::new();
        let trades = [
            ("a", dec!(3.5)),
            ("b", dec!(-1.25)),
            ("a", dec!(10)),
            ("c", dec!(0)),
        ];
        for (origin, pnl) in trades {
            store.record_trade(origin, pnl);
        }
        let snapshot = store.snapshot();
        let sum: Decimal = snapshot.channels.values().map(|c| c.cumulative_pnl).sum();
        assert_eq!(sum, snapshot.global.total_pnl);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording_is_order_independent() {
        let store = Arc::new(StatsStore::new());
        let mut handles = Vec::new();

        for round in 0..50 {
            for pnl in [dec!(100), dec!(-30), dec!(50)] {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.record_trade(&format!("origin-{}", round % 5), pnl);
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let channels = store.channel_report();
        for stats in channels.values() {
            assert_eq!(stats.trade_count, 30);
            assert_eq!(stats.cumulative_pnl, dec!(1200));
        }
        let global = store.global_report();
        assert_eq!(global.trade_count, 150);
        assert_eq!(global.total_pnl, dec!(6000));
        assert_eq!(global.max_drawdown, dec!(-30));
        assert_eq!(store.generation(), 150);
    }

    #[test]
    fn test_restore_keeps_values() {
        let store = StatsStore::new();
        store.record_trade("1", dec!(12));
        let restored = StatsStore::restore(store.snapshot());
        assert_eq!(restored.channel_report(), store.channel_report());
        assert_eq!(restored.global_report(), store.global_report());
        assert_eq!(restored.generation(), 0);
    }
}
