//! # Pulse Core
//!
//! 펄스 트레이드 엔진의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 엔진 전반에서 사용되는 기본 타입을 제공합니다:
//! - 심볼 및 방향 타입
//! - 트레이딩 신호와 신호 파서
//! - 포지션 및 라이프사이클 이벤트
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
