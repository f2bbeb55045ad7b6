//! 거래소 게이트웨이.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `FuturesExchange` trait: 가격 조회, 레버리지 설정, 시장가 주문, 정밀도 조회
//! - 재시도/백오프 및 시도별 타임아웃
//! - TTL 기반 수량 정밀도 캐시와 수량 계산
//! - Binance USDⓈ-M 선물 커넥터
//! - 모의 체결 거래소 및 테스트용 시뮬레이션 거래소

pub mod connector;
pub mod error;
pub mod gateway;
pub mod paper;
pub mod precision;
pub mod retry;
pub mod simulated;
pub mod traits;

pub use connector::{BinanceConfig, BinanceFuturesClient};
pub use error::*;
pub use gateway::{compute_quantity, ExchangeGateway, SizingParams};
pub use paper::PaperExchange;
pub use precision::SymbolPrecisionCache;
pub use retry::{with_retry, Backoff, RetryPolicy};
pub use simulated::{Operation, SimulatedExchange};
pub use traits::*;
