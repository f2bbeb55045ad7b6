//! 트레이드 실행을 위한 도메인 모델.

mod lifecycle;
mod order;
mod position;
mod sentiment;
mod signal;

pub use lifecycle::*;
pub use order::*;
pub use position::*;
pub use sentiment::*;
pub use signal::*;
