//! TTL 기반 수량 정밀도 캐시.
//!
//! 거래소 메타데이터 호출 한 번으로 모든 심볼의 정밀도를 받아오므로
//! 캐시는 심볼별이 아닌 테이블 단위로 만료됩니다.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// 캐시 조회 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionLookup {
    /// 유효한 캐시 항목
    Hit(u32),
    /// 캐시는 유효하지만 해당 심볼이 거래소에 없음
    Unknown,
    /// 캐시가 비었거나 만료됨
    Stale,
}

struct Table {
    precisions: HashMap<String, u32>,
    loaded_at: Instant,
}

/// 심볼 → 수량 소수점 자릿수 캐시.
pub struct SymbolPrecisionCache {
    ttl: Duration,
    table: RwLock<Option<Table>>,
}

impl SymbolPrecisionCache {
    /// 기본 TTL (1시간).
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    /// 새 캐시를 생성합니다.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            table: RwLock::new(None),
        }
    }

    /// 캐시 TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 심볼의 정밀도를 조회합니다. I/O는 수행하지 않습니다.
    pub fn lookup(&self, symbol: &str) -> PrecisionLookup {
        let guard = self.table.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(table) if table.loaded_at.elapsed() < self.ttl => table
                .precisions
                .get(symbol)
                .map_or(PrecisionLookup::Unknown, |p| PrecisionLookup::Hit(*p)),
            _ => PrecisionLookup::Stale,
        }
    }

    /// 거래소에서 받아온 정밀도 테이블로 캐시를 교체합니다.
    pub fn store(&self, precisions: HashMap<String, u32>) {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Table {
            precisions,
            loaded_at: Instant::now(),
        });
    }

    /// 캐시를 비웁니다.
    pub fn invalidate(&self) {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    /// 캐시된 심볼 수.
    pub fn len(&self) -> usize {
        let guard = self.table.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map_or(0, |t| t.precisions.len())
    }

    /// 캐시가 비었는지 확인.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolPrecisionCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
