//! 시뮬레이션 거래소.
//!
//! 스크립트로 제어되는 결정적 인메모리 거래소로, 게이트웨이와 워커 테스트에 사용합니다.
//! 가격/정밀도 설정, 연산별 실패 주입, 호출 지연, 호출 횟수 집계를 지원합니다.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pulse_core::{OrderFill, Price, Quantity, Side, Symbol};
use rust_decimal::Decimal;

use crate::traits::{ExchangeResult, FuturesExchange};
use crate::ExchangeError;

/// 실패 주입 및 호출 집계 대상 연산.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// 가격 조회
    FetchPrice,
    /// 레버리지 설정
    SetLeverage,
    /// 주어진 방향의 시장가 주문
    Order(Side),
    /// 정밀도 테이블 조회
    FetchPrecision,
}

#[derive(Default)]
struct SimState {
    prices: HashMap<Symbol, Price>,
    precisions: HashMap<String, u32>,
    leverage: HashMap<Symbol, u32>,
    failures: HashMap<Operation, VecDeque<ExchangeError>>,
    calls: HashMap<Operation, u32>,
    fills: Vec<OrderFill>,
    latency: Option<Duration>,
    next_order_id: u64,
}

/// 결정적 인메모리 선물 거래소.
pub struct SimulatedExchange {
    state: Mutex<SimState>,
}

impl SimulatedExchange {
    /// 빈 거래소를 생성합니다.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_order_id: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 심볼 가격을 설정합니다. 이후 조회와 체결은 이 가격을 사용합니다.
    pub fn set_price(&self, symbol: &Symbol, price: Price) {
        self.lock().prices.insert(symbol.clone(), price);
    }

    /// 심볼 수량 정밀도를 설정합니다.
    pub fn set_precision(&self, symbol: &Symbol, precision: u32) {
        self.lock()
            .precisions
            .insert(symbol.as_str().to_string(), precision);
    }

    /// 다음 `count`번의 해당 연산 호출을 `error`로 실패시킵니다.
    pub fn fail_next(&self, op: Operation, count: usize, error: ExchangeError) {
        let mut state = self.lock();
        let queue = state.failures.entry(op).or_default();
        for _ in 0..count {
            queue.push_back(error.clone());
        }
    }

    /// 모든 호출에 지연을 추가합니다.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// 연산의 누적 호출 횟수 (실패 포함).
    pub fn call_count(&self, op: Operation) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// 체결된 주문 목록.
    pub fn fills(&self) -> Vec<OrderFill> {
        self.lock().fills.clone()
    }

    /// 심볼에 설정된 레버리지.
    pub fn leverage_of(&self, symbol: &Symbol) -> Option<u32> {
        self.lock().leverage.get(symbol).copied()
    }

    /// 호출을 기록하고 주입된 실패가 있으면 꺼내 반환합니다.
    async fn enter(&self, op: Operation) -> ExchangeResult<()> {
        let (latency, failure) = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            let failure = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (state.latency, failure)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn price_of(&self, symbol: &Symbol) -> ExchangeResult<Price> {
        self.lock()
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))
    }
}

impl Default for SimulatedExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FuturesExchange for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch_price(&self, symbol: &Symbol) -> ExchangeResult<Price> {
        self.enter(Operation::FetchPrice).await?;
        self.price_of(symbol)
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> ExchangeResult<()> {
        self.enter(Operation::SetLeverage).await?;
        self.lock().leverage.insert(symbol.clone(), leverage);
        Ok(())
    }

    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Quantity,
    ) -> ExchangeResult<OrderFill> {
        self.enter(Operation::Order(side)).await?;
        if quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity(quantity.to_string()));
        }

        let price = self.price_of(symbol)?;
        let mut state = self.lock();
        let order_id = state.next_order_id;
        state.next_order_id += 1;

        let fill = OrderFill {
            order_id: format!("SIM-{}", order_id),
            symbol: symbol.clone(),
            side,
            price,
            quantity,
            filled_at: Utc::now(),
        };
        state.fills.push(fill.clone());
        Ok(fill)
    }

    async fn fetch_quantity_precisions(&self) -> ExchangeResult<HashMap<String, u32>> {
        self.enter(Operation::FetchPrecision).await?;
        Ok(self.lock().precisions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_fill_at_current_price() {
        let exchange = SimulatedExchange::new();
        let eth = Symbol::parse("ETH").unwrap();
        exchange.set_price(&eth, dec!(3000));

        let fill = exchange
            .place_market_order(&eth, Side::Buy, dec!(0.5))
            .await
            .unwrap();
        assert_eq!(fill.price, dec!(3000));
        assert_eq!(fill.order_id, "SIM-1");
        assert_eq!(exchange.fills().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let exchange = SimulatedExchange::new();
        let eth = Symbol::parse("ETH").unwrap();
        exchange.set_price(&eth, dec!(3000));
        exchange.fail_next(Operation::Order(Side::Sell), 1, ExchangeError::RateLimited);

        assert!(exchange.place_market_order(&eth, Side::Buy, dec!(1)).await.is_ok());
        assert!(exchange.place_market_order(&eth, Side::Sell, dec!(1)).await.is_err());
        assert!(exchange.place_market_order(&eth, Side::Sell, dec!(1)).await.is_ok());
        assert_eq!(exchange.call_count(Operation::Order(Side::Sell)), 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let exchange = SimulatedExchange::new();
        let xrp = Symbol::parse("XRP").unwrap();
        assert!(matches!(
            exchange.fetch_price(&xrp).await,
            Err(ExchangeError::SymbolNotFound(_))
        ));
    }
}
