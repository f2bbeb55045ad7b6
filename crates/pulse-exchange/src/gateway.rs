//! 재시도 및 정밀도 캐시를 갖춘 거래소 게이트웨이.
//!
//! 워커는 거래소를 직접 호출하지 않고 항상 [`ExchangeGateway`]를 거칩니다.
//! 일시적 오류는 여기서 투명하게 재시도되고, 소진되거나 치명적인 오류만 호출자에게 전달됩니다.

use std::sync::Arc;
use std::time::Duration;

use pulse_core::{DecimalExt, OrderFill, Price, Quantity, Side, Symbol};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::precision::{PrecisionLookup, SymbolPrecisionCache};
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{ExchangeResult, FuturesExchange};
use crate::ExchangeError;

/// 포지션 크기 계산 파라미터.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingParams {
    /// 거래당 자본
    pub capital: Decimal,
    /// 레버리지
    pub leverage: u32,
    /// 명목가 상한
    pub max_notional: Option<Decimal>,
}

/// 계산된 주문 크기.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedOrder {
    /// 계산에 사용된 가격
    pub price: Price,
    /// 수량 소수점 자릿수
    pub precision: u32,
    /// 내림 처리된 수량
    pub quantity: Quantity,
}

/// 주문 수량을 계산합니다.
///
/// `quantity = floor(min(capital * leverage, max_notional) / price, precision)`
///
/// 항상 내림하므로 `quantity * price <= capital * leverage`가 보장됩니다.
/// 결과가 0이면 재시도 불가능한 `InvalidQuantity`를 반환합니다.
pub fn compute_quantity(
    capital: Decimal,
    leverage: u32,
    price: Price,
    precision: u32,
    max_notional: Option<Decimal>,
) -> ExchangeResult<Quantity> {
    if price <= Decimal::ZERO {
        return Err(ExchangeError::InvalidQuantity(format!(
            "non-positive price {}",
            price
        )));
    }
    if capital <= Decimal::ZERO {
        return Err(ExchangeError::InvalidQuantity(format!(
            "non-positive capital {}",
            capital
        )));
    }

    let mut notional = capital * Decimal::from(leverage);
    if let Some(cap) = max_notional {
        notional = notional.min(cap);
    }

    let quantity = (notional / price).floor_dp(precision);
    if quantity.is_zero() {
        return Err(ExchangeError::InvalidQuantity(format!(
            "notional {} at price {} rounds to zero with precision {}",
            notional, price, precision
        )));
    }

    Ok(quantity)
}

impl SizingParams {
    /// 가격과 정밀도로 수량을 계산합니다.
    pub fn quantity_for(&self, price: Price, precision: u32) -> ExchangeResult<Quantity> {
        compute_quantity(
            self.capital,
            self.leverage,
            price,
            precision,
            self.max_notional,
        )
    }
}

/// 거래소 게이트웨이.
pub struct ExchangeGateway {
    exchange: Arc<dyn FuturesExchange>,
    policy: RetryPolicy,
    precision_cache: SymbolPrecisionCache,
    /// 정밀도 테이블 갱신은 한 번에 하나만
    precision_refresh: Mutex<()>,
    shutdown: CancellationToken,
}

impl ExchangeGateway {
    /// 새 게이트웨이를 생성합니다.
    pub fn new(exchange: Arc<dyn FuturesExchange>, policy: RetryPolicy) -> Self {
        Self {
            exchange,
            policy,
            precision_cache: SymbolPrecisionCache::default(),
            precision_refresh: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// 정밀도 캐시 TTL을 설정합니다.
    pub fn with_precision_ttl(mut self, ttl: Duration) -> Self {
        self.precision_cache = SymbolPrecisionCache::new(ttl);
        self
    }

    /// 재시도 대기를 중단시킬 종료 토큰을 설정합니다.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// 종료 토큰.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// 재시도 정책.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 하위 거래소 이름.
    pub fn exchange_name(&self) -> &str {
        self.exchange.name()
    }

    /// 현재 가격 조회.
    pub async fn fetch_price(&self, symbol: &Symbol) -> ExchangeResult<Price> {
        with_retry(&self.policy, &self.shutdown, "fetch_price", || {
            self.exchange.fetch_price(symbol)
        })
        .await
    }

    /// 레버리지 설정.
    pub async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> ExchangeResult<()> {
        with_retry(&self.policy, &self.shutdown, "set_leverage", || {
            self.exchange.set_leverage(symbol, leverage)
        })
        .await
    }

    /// 시장가 주문.
    pub async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Quantity,
    ) -> ExchangeResult<OrderFill> {
        let fill = with_retry(&self.policy, &self.shutdown, "place_market_order", || {
            self.exchange.place_market_order(symbol, side, quantity)
        })
        .await?;

        info!(
            symbol = %symbol,
            side = %side,
            price = %fill.price,
            quantity = %fill.quantity,
            order_id = %fill.order_id,
            "주문 체결"
        );
        Ok(fill)
    }

    /// 수량 정밀도 조회.
    ///
    /// 캐시 적중 시 I/O 없이 반환합니다. 미스 또는 만료 시 메타데이터를 (재시도 정책 적용)
    /// 가져와 캐시를 갱신하는데, 동시에 미스한 워커들은 갱신 락에서 기다렸다가
    /// 먼저 들어간 워커가 채운 캐시를 다시 조회합니다. 캐시 자체의 락은 I/O 중에 잡지 않습니다.
    pub async fn fetch_precision(&self, symbol: &Symbol) -> ExchangeResult<u32> {
        if let Some(result) = self.cached_precision(symbol) {
            return result;
        }

        let _refresh = self.precision_refresh.lock().await;
        if let Some(result) = self.cached_precision(symbol) {
            return result;
        }

        let table = with_retry(&self.policy, &self.shutdown, "fetch_precision", || {
            self.exchange.fetch_quantity_precisions()
        })
        .await?;

        let precision = table.get(symbol.as_str()).copied();
        debug!(symbols = table.len(), "정밀도 캐시 갱신");
        self.precision_cache.store(table);

        precision.ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))
    }

    fn cached_precision(&self, symbol: &Symbol) -> Option<ExchangeResult<u32>> {
        match self.precision_cache.lookup(symbol.as_str()) {
            PrecisionLookup::Hit(precision) => {
                debug!(symbol = %symbol, precision, "정밀도 캐시 적중");
                Some(Ok(precision))
            }
            PrecisionLookup::Unknown => Some(Err(ExchangeError::SymbolNotFound(symbol.to_string()))),
            PrecisionLookup::Stale => None,
        }
    }

    /// 현재 가격과 정밀도로 주문 수량을 계산합니다.
    pub async fn size_order(
        &self,
        symbol: &Symbol,
        params: &SizingParams,
    ) -> ExchangeResult<SizedOrder> {
        let price = self.fetch_price(symbol).await?;
        let precision = self.fetch_precision(symbol).await?;
        let quantity = params.quantity_for(price, precision)?;

        Ok(SizedOrder {
            price,
            precision,
            quantity,
        })
    }

    /// 정밀도 캐시 (관찰용).
    pub fn precision_cache(&self) -> &SymbolPrecisionCache {
        &self.precision_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{Operation, SimulatedExchange};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::parse("BTC").unwrap()
    }

    #[test]
    fn test_scenario_sizing() {
        // capital=3000, leverage=1, price=60000, precision=3 → 0.050
        let qty = compute_quantity(dec!(3000), 1, dec!(60000), 3, None).unwrap();
        assert_eq!(qty, dec!(0.050));
    }

    #[test]
    fn test_sizing_floors_and_caps() {
        assert_eq!(
            compute_quantity(dec!(100), 3, dec!(7), 1, None).unwrap(),
            dec!(42.8)
        );
        assert_eq!(
            compute_quantity(dec!(100), 10, dec!(10), 0, Some(dec!(500))).unwrap(),
            dec!(50)
        );
    }

    #[test]
    fn test_sizing_zero_is_error() {
        let err = compute_quantity(dec!(10), 1, dec!(60000), 3, None).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidQuantity(_)));
        assert!(!err.is_retryable());

        assert!(compute_quantity(dec!(10), 1, dec!(0), 3, None).is_err());
    }

    proptest! {
        #[test]
        fn prop_quantity_never_exceeds_exposure(
            capital in 1u64..1_000_000,
            leverage in 1u32..50,
            price_cents in 1u64..10_000_000,
            precision in 0u32..8,
        ) {
            let capital = Decimal::from(capital);
            let price = Decimal::new(price_cents as i64, 2);
            if let Ok(qty) = compute_quantity(capital, leverage, price, precision, None) {
                prop_assert!(qty * price <= capital * Decimal::from(leverage));
                prop_assert!(qty.scale() <= precision);
                prop_assert!(qty > Decimal::ZERO);
            }
        }

        #[test]
        fn prop_monotonic_in_capital_and_price(
            capital in 1u64..100_000,
            extra in 0u64..100_000,
            price_cents in 100u64..1_000_000,
            bump in 0u64..1_000_000,
            precision in 0u32..6,
        ) {
            let price = Decimal::new(price_cents as i64, 2);
            let base = compute_quantity(Decimal::from(capital), 1, price, precision, None)
                .unwrap_or(Decimal::ZERO);

            let richer = compute_quantity(Decimal::from(capital + extra), 1, price, precision, None)
                .unwrap_or(Decimal::ZERO);
            prop_assert!(richer >= base);

            let pricier = Decimal::new((price_cents + bump) as i64, 2);
            let fewer = compute_quantity(Decimal::from(capital), 1, pricier, precision, None)
                .unwrap_or(Decimal::ZERO);
            prop_assert!(fewer <= base);
        }
    }

    fn gateway(exchange: Arc<SimulatedExchange>) -> ExchangeGateway {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(10),
            ..Default::default()
        };
        ExchangeGateway::new(exchange, policy)
    }

    #[tokio::test]
    async fn test_precision_cached_after_first_fetch() {
        let exchange = Arc::new(SimulatedExchange::new());
        exchange.set_price(&btc(), dec!(60000));
        exchange.set_precision(&btc(), 3);
        let gateway = gateway(exchange.clone());

        assert_eq!(gateway.fetch_precision(&btc()).await.unwrap(), 3);
        assert_eq!(gateway.fetch_precision(&btc()).await.unwrap(), 3);
        assert_eq!(exchange.call_count(Operation::FetchPrecision), 1);
    }

    #[tokio::test]
    async fn test_unknown_symbol_not_refetched() {
        let exchange = Arc::new(SimulatedExchange::new());
        exchange.set_precision(&btc(), 3);
        let gateway = gateway(exchange.clone());
        let fake = Symbol::parse("FAKE").unwrap();

        assert!(matches!(
            gateway.fetch_precision(&fake).await,
            Err(ExchangeError::SymbolNotFound(_))
        ));
        assert!(matches!(
            gateway.fetch_precision(&fake).await,
            Err(ExchangeError::SymbolNotFound(_))
        ));
        assert_eq!(exchange.call_count(Operation::FetchPrecision), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let exchange = Arc::new(SimulatedExchange::new());
        exchange.set_price(&btc(), dec!(60000));
        exchange.fail_next(
            Operation::FetchPrice,
            2,
            ExchangeError::Network("reset".into()),
        );
        let gateway = gateway(exchange.clone());

        assert_eq!(gateway.fetch_price(&btc()).await.unwrap(), dec!(60000));
        assert_eq!(exchange.call_count(Operation::FetchPrice), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_refresh() {
        let exchange = Arc::new(SimulatedExchange::new());
        exchange.set_precision(&btc(), 3);
        exchange.set_latency(Some(Duration::from_millis(200)));
        let gateway = gateway(exchange.clone());

        let symbol = btc();
        let (a, b, c, d) = tokio::join!(
            gateway.fetch_precision(&symbol),
            gateway.fetch_precision(&symbol),
            gateway.fetch_precision(&symbol),
            gateway.fetch_precision(&symbol),
        );

        for precision in [a, b, c, d] {
            assert_eq!(precision.unwrap(), 3);
        }
        assert_eq!(exchange.call_count(Operation::FetchPrecision), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_exchange_hits_attempt_timeout() {
        let exchange = Arc::new(SimulatedExchange::new());
        exchange.set_price(&btc(), dec!(60000));
        exchange.set_latency(Some(Duration::from_secs(60)));
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let gateway = ExchangeGateway::new(exchange.clone(), policy);

        let started = tokio::time::Instant::now();
        match gateway.fetch_price(&btc()).await {
            Err(ExchangeError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, ExchangeError::Timeout(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(exchange.call_count(Operation::FetchPrice), 2);
        assert!(started.elapsed() < Duration::from_secs(3));

        // 지연이 사라지면 다음 호출은 정상 처리
        exchange.set_latency(None);
        assert_eq!(gateway.fetch_price(&btc()).await.unwrap(), dec!(60000));
    }

    #[tokio::test]
    async fn test_size_order() {
        let exchange = Arc::new(SimulatedExchange::new());
        exchange.set_price(&btc(), dec!(60000));
        exchange.set_precision(&btc(), 3);
        let gateway = gateway(exchange);

        let params = SizingParams {
            capital: dec!(3000),
            leverage: 1,
            max_notional: None,
        };
        let sized = gateway.size_order(&btc(), &params).await.unwrap();
        assert_eq!(sized.quantity, dec!(0.050));
        assert_eq!(sized.price, dec!(60000));
        assert_eq!(sized.precision, 3);
    }
}
