//! 통계 저장소 에러 타입.

use thiserror::Error;

/// 통계 영속화 에러.
#[derive(Debug, Error)]
pub enum StatsError {
    /// 파일 입출력 에러
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 통계 작업을 위한 Result 타입.
pub type StatsResult<T> = Result<T, StatsError>;
