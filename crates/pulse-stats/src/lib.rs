//! 실현 손익 통계 저장소.
//!
//! - `StatsStore`: 출처별/전체 손익을 하나의 임계 구역에서 갱신하는 저장소
//! - `StatsPersister`: 스냅샷을 내구성 저장소에 기록하는 trait (JSON 파일 구현 포함)
//! - `spawn_flusher`: 임계 구역 밖에서 동작하는 write-behind 플러셔
//! - `StatsReport`: 보고용 텍스트 표 렌더링

pub mod error;
pub mod flusher;
pub mod persist;
pub mod report;
pub mod store;

pub use error::*;
pub use flusher::spawn_flusher;
pub use persist::{JsonFilePersister, StatsPersister};
pub use report::StatsReport;
pub use store::{ChannelStats, GlobalStats, StatsSnapshot, StatsStore};
