//! 거래소 trait 정의.

use async_trait::async_trait;
use pulse_core::{OrderFill, Price, Quantity, Side, Symbol};
use std::collections::HashMap;

use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 선물 거래소의 트레이드 기본 연산.
///
/// 구현체는 한 번의 호출만 수행하며, 재시도와 타임아웃은
/// [`ExchangeGateway`](crate::ExchangeGateway)가 담당합니다.
#[async_trait]
pub trait FuturesExchange: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 심볼의 현재 가격 조회.
    async fn fetch_price(&self, symbol: &Symbol) -> ExchangeResult<Price>;

    /// 심볼의 레버리지 설정.
    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> ExchangeResult<()>;

    /// 시장가 주문 실행.
    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Quantity,
    ) -> ExchangeResult<OrderFill>;

    /// 거래 가능한 모든 심볼의 수량 소수점 자릿수 조회.
    async fn fetch_quantity_precisions(&self) -> ExchangeResult<HashMap<String, u32>>;
}
