//! 통계 스냅샷 영속화.
//!
//! 기본 구현은 두 개의 JSON 파일을 사용합니다:
//! - `pnl_data.json`: `{ 출처 ID: 누적 손익 }`
//! - `stats_data.json`: 전체 통계와 출처별 거래 횟수
//!
//! 각 파일은 임시 파일에 쓴 뒤 이름을 바꿔 원자적으로 교체합니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StatsResult;
use crate::store::{ChannelStats, GlobalStats, StatsSnapshot};

/// 스냅샷을 내구성 저장소에 기록하는 trait.
#[async_trait]
pub trait StatsPersister: Send + Sync {
    /// 스냅샷 기록.
    async fn persist(&self, snapshot: &StatsSnapshot) -> StatsResult<()>;

    /// 마지막으로 기록된 스냅샷 로드. 저장된 것이 없으면 빈 스냅샷.
    async fn load(&self) -> StatsResult<StatsSnapshot>;
}

/// `stats_data.json` 파일 형식.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StatsFile {
    #[serde(rename = "Maximum Gain", default)]
    max_gain: Decimal,
    #[serde(rename = "Maximum Drawdown", default)]
    max_drawdown: Decimal,
    #[serde(rename = "Average Gain", default)]
    average_gain: Decimal,
    #[serde(rename = "Total No. of Trades", default)]
    trade_count: u64,
    #[serde(rename = "Total PnL", default)]
    total_pnl: Decimal,
    #[serde(rename = "Winning Trades", default)]
    winning_trades: u64,
    #[serde(rename = "Losing Trades", default)]
    losing_trades: u64,
    #[serde(rename = "Trades By Origin", default)]
    trades_by_origin: BTreeMap<String, u64>,
}

/// JSON 파일 기반 영속화.
#[derive(Debug, Clone)]
pub struct JsonFilePersister {
    pnl_path: PathBuf,
    stats_path: PathBuf,
}

impl JsonFilePersister {
    /// 두 파일 경로로 생성합니다.
    pub fn new(pnl_path: impl Into<PathBuf>, stats_path: impl Into<PathBuf>) -> Self {
        Self {
            pnl_path: pnl_path.into(),
            stats_path: stats_path.into(),
        }
    }

    /// 손익 파일 경로.
    pub fn pnl_path(&self) -> &Path {
        &self.pnl_path
    }

    /// 통계 파일 경로.
    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }

    async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> StatsResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> StatsResult<T> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StatsPersister for JsonFilePersister {
    async fn persist(&self, snapshot: &StatsSnapshot) -> StatsResult<()> {
        let pnl: BTreeMap<&str, Decimal> = snapshot
            .channels
            .iter()
            .map(|(origin, stats)| (origin.as_str(), stats.cumulative_pnl))
            .collect();

        let global = &snapshot.global;
        let stats = StatsFile {
            max_gain: global.max_gain,
            max_drawdown: global.max_drawdown,
            average_gain: global.average_gain,
            trade_count: global.trade_count,
            total_pnl: global.total_pnl,
            winning_trades: global.winning_trades,
            losing_trades: global.losing_trades,
            trades_by_origin: snapshot
                .channels
                .iter()
                .map(|(origin, stats)| (origin.clone(), stats.trade_count))
                .collect(),
        };

        Self::write_atomic(&self.pnl_path, &pnl).await?;
        Self::write_atomic(&self.stats_path, &stats).await?;

        debug!(
            pnl_path = %self.pnl_path.display(),
            stats_path = %self.stats_path.display(),
            trades = global.trade_count,
            "통계 스냅샷 저장"
        );
        Ok(())
    }

    async fn load(&self) -> StatsResult<StatsSnapshot> {
        let pnl: BTreeMap<String, Decimal> = Self::read_or_default(&self.pnl_path).await?;
        let stats: StatsFile = Self::read_or_default(&self.stats_path).await?;

        let channels = pnl
            .into_iter()
            .map(|(origin, cumulative_pnl)| {
                let trade_count = stats.trades_by_origin.get(&origin).copied().unwrap_or(0);
                (
                    origin,
                    ChannelStats {
                        cumulative_pnl,
                        trade_count,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let global = GlobalStats {
            trade_count: stats.trade_count,
            total_pnl: stats.total_pnl,
            max_gain: stats.max_gain,
            max_drawdown: stats.max_drawdown,
            average_gain: stats.average_gain,
            winning_trades: stats.winning_trades,
            losing_trades: stats.losing_trades,
        };

        info!(
            origins = channels.len(),
            trades = global.trade_count,
            "저장된 통계 로드"
        );

        Ok(StatsSnapshot {
            channels,
            global,
            taken_at: None,
        })
    }
}
