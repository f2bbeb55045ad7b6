//! 모의 체결 거래소.
//!
//! 실제 거래소에서 가격과 정밀도를 받아오되, 주문은 전송하지 않고
//! 현재 가격으로 즉시 체결된 것으로 처리합니다. 자금 이동 없이 엔진을 운용할 때 사용합니다.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use pulse_core::{OrderFill, Price, Quantity, Side, Symbol};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::traits::{ExchangeResult, FuturesExchange};
use crate::ExchangeError;

/// 시장 데이터 소스를 감싼 모의 체결 거래소.
pub struct PaperExchange<E> {
    market: E,
    name: String,
    leverage: Mutex<HashMap<Symbol, u32>>,
}

impl<E: FuturesExchange> PaperExchange<E> {
    /// 시장 데이터 소스로 생성합니다.
    pub fn new(market: E) -> Self {
        let name = format!("paper({})", market.name());
        Self {
            market,
            name,
            leverage: Mutex::new(HashMap::new()),
        }
    }

    /// 로컬에 기록된 레버리지.
    pub fn leverage_of(&self, symbol: &Symbol) -> Option<u32> {
        self.leverage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .copied()
    }
}

#[async_trait]
impl<E: FuturesExchange> FuturesExchange for PaperExchange<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_price(&self, symbol: &Symbol) -> ExchangeResult<Price> {
        self.market.fetch_price(symbol).await
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> ExchangeResult<()> {
        self.leverage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.clone(), leverage);
        Ok(())
    }

    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Quantity,
    ) -> ExchangeResult<OrderFill> {
        if quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity(quantity.to_string()));
        }

        let price = self.market.fetch_price(symbol).await?;
        debug!(symbol = %symbol, side = %side, %price, %quantity, "모의 체결");

        Ok(OrderFill {
            order_id: format!("PAPER-{}", Uuid::new_v4().simple()),
            symbol: symbol.clone(),
            side,
            price,
            quantity,
            filled_at: Utc::now(),
        })
    }

    async fn fetch_quantity_precisions(&self) -> ExchangeResult<HashMap<String, u32>> {
        self.market.fetch_quantity_precisions().await
    }
}
