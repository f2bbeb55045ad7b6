//! 거래소 커넥터 구현체.

pub mod binance;

pub use binance::{BinanceConfig, BinanceFuturesClient};
