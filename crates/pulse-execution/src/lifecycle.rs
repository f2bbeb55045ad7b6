//! 포지션 라이프사이클 상태 머신.
//!
//! ```text
//! Sizing ─▶ Entering ─▶ Holding ─▶ Exiting ─▶ Closed
//!   │          │                      │
//!   └──────────┴─▶ FailedPreEntry     └─▶ Unresolved (에스컬레이션)
//! ```
//!
//! 진입 전 실패는 자본 노출이 없으므로 경고로 끝나고, 진입 후 청산 실패는
//! 거래소에 포지션이 남아 있으므로 Critical 이벤트와 에스컬레이션을 발생시킵니다.

use std::sync::Arc;
use std::time::Duration;

use pulse_core::{
    trade_span, Escalation, LifecycleEvent, LifecycleState, Position, TradeSignal, TradingConfig,
};
use pulse_exchange::{ExchangeGateway, SizingParams};
use pulse_stats::StatsStore;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::error::TradeError;
use crate::events::{EscalationSender, EventSink};

/// 라이프사이클 설정.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// 수량 계산 파라미터 (레버리지 포함)
    pub sizing: SizingParams,
    /// 진입 후 보유 시간
    pub hold_duration: Duration,
}

impl LifecycleConfig {
    pub fn from_trading(config: &TradingConfig) -> Self {
        Self {
            sizing: SizingParams {
                capital: config.capital,
                leverage: config.leverage,
                max_notional: config.max_position_notional,
            },
            hold_duration: config.hold_duration(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::from_trading(&TradingConfig::default())
    }
}

/// 한 신호의 최종 결과.
#[derive(Debug, Clone)]
pub enum TradeOutcome {
    /// 청산 완료
    Closed { position: Position, pnl: Decimal },
    /// 진입 전 실패 (노출 없음)
    FailedPreEntry { error: TradeError },
    /// 진입 후 청산 실패 (노출 남음)
    Unresolved { position: Position, error: TradeError },
}

impl TradeOutcome {
    /// 종료 상태.
    pub fn state(&self) -> LifecycleState {
        match self {
            TradeOutcome::Closed { .. } => LifecycleState::Closed,
            TradeOutcome::FailedPreEntry { .. } => LifecycleState::FailedPreEntry,
            TradeOutcome::Unresolved { .. } => LifecycleState::Unresolved,
        }
    }
}

/// 신호 하나를 종료 상태까지 구동합니다.
pub struct PositionLifecycle {
    gateway: Arc<ExchangeGateway>,
    stats: Arc<StatsStore>,
    events: Arc<dyn EventSink>,
    escalations: EscalationSender,
    config: LifecycleConfig,
}

impl PositionLifecycle {
    pub fn new(
        gateway: Arc<ExchangeGateway>,
        stats: Arc<StatsStore>,
        events: Arc<dyn EventSink>,
        escalations: EscalationSender,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            gateway,
            stats,
            events,
            escalations,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// 신호를 실행합니다. 항상 종료 상태로 끝납니다.
    pub async fn run(&self, signal: &TradeSignal, shutdown: &CancellationToken) -> TradeOutcome {
        let span = trade_span!("lifecycle", signal.symbol, signal.origin_id, signal.id);
        self.drive(signal, shutdown).instrument(span).await
    }

    async fn drive(&self, signal: &TradeSignal, shutdown: &CancellationToken) -> TradeOutcome {
        let sizing = &self.config.sizing;

        // 1. 수량 계산
        self.emit(LifecycleEvent::new(
            signal,
            LifecycleState::Sizing,
            format!(
                "capital {} x{} ({})",
                sizing.capital, sizing.leverage, signal.direction
            ),
        ));
        if shutdown.is_cancelled() {
            return self.fail_pre_entry(signal, TradeError::Shutdown);
        }

        let sized = match self.gateway.size_order(&signal.symbol, sizing).await {
            Ok(sized) => sized,
            Err(e) => return self.fail_pre_entry(signal, TradeError::from_exchange(e)),
        };
        debug!(
            price = %sized.price,
            precision = sized.precision,
            quantity = %sized.quantity,
            "수량 계산 완료"
        );

        // 2. 진입
        self.emit(LifecycleEvent::new(
            signal,
            LifecycleState::Entering,
            format!(
                "{} {} @ ~{}",
                signal.direction.entry_side(),
                sized.quantity,
                sized.price
            ),
        ));
        if shutdown.is_cancelled() {
            return self.fail_pre_entry(signal, TradeError::Shutdown);
        }

        if let Err(e) = self
            .gateway
            .set_leverage(&signal.symbol, sizing.leverage)
            .await
        {
            return self.fail_pre_entry(signal, TradeError::from_exchange(e));
        }

        let entry = match self
            .gateway
            .place_market_order(&signal.symbol, signal.direction.entry_side(), sized.quantity)
            .await
        {
            Ok(fill) => fill,
            Err(e) => return self.fail_pre_entry(signal, TradeError::from_exchange(e)),
        };

        let mut position = Position::open(
            signal.id,
            signal.origin_id.clone(),
            signal.direction,
            sizing.leverage,
            &entry,
        );

        // 3. 보유
        self.emit(
            LifecycleEvent::new(
                signal,
                LifecycleState::Holding,
                format!("entered {} @ {}", position.quantity, position.entry_price),
            )
            .with_position(position.clone()),
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("종료 요청으로 보유 중단, 즉시 청산");
            }
            _ = tokio::time::sleep(self.config.hold_duration) => {}
        }

        // 4. 청산
        position.status = LifecycleState::Exiting;
        self.emit(
            LifecycleEvent::new(
                signal,
                LifecycleState::Exiting,
                format!("{} {}", signal.direction.exit_side(), position.quantity),
            )
            .with_position(position.clone()),
        );

        let exit = match self
            .gateway
            .place_market_order(&signal.symbol, signal.direction.exit_side(), position.quantity)
            .await
        {
            Ok(fill) => fill,
            Err(e) => return self.unresolved(signal, position, e.to_string()),
        };

        // 5. 정산
        let pnl = position.close(&exit);
        self.stats.record_trade(&signal.origin_id, pnl);

        self.emit(
            LifecycleEvent::new(
                signal,
                LifecycleState::Closed,
                format!(
                    "exit @ {} pnl {}",
                    exit.price,
                    pnl.round_dp(2)
                ),
            )
            .with_position(position.clone()),
        );

        TradeOutcome::Closed { position, pnl }
    }

    fn emit(&self, event: LifecycleEvent) {
        self.events.on_lifecycle_event(&event);
    }

    fn fail_pre_entry(&self, signal: &TradeSignal, error: TradeError) -> TradeOutcome {
        self.emit(LifecycleEvent::new(
            signal,
            LifecycleState::FailedPreEntry,
            error.to_string(),
        ));
        TradeOutcome::FailedPreEntry { error }
    }

    fn unresolved(&self, signal: &TradeSignal, mut position: Position, reason: String) -> TradeOutcome {
        position.status = LifecycleState::Unresolved;

        self.emit(
            LifecycleEvent::new(
                signal,
                LifecycleState::Unresolved,
                format!("exit failed: {}", reason),
            )
            .with_position(position.clone()),
        );
        self.escalations
            .escalate(Escalation::from_position(&position, reason.clone()));

        TradeOutcome::Unresolved {
            error: TradeError::Unresolved {
                symbol: position.symbol.clone(),
                reason,
            },
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{escalation_channel, ChannelEventSink};
    use pulse_core::{Direction, Symbol};
    use pulse_exchange::{ExchangeError, Operation, RetryPolicy, SimulatedExchange};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        exchange: Arc<SimulatedExchange>,
        stats: Arc<StatsStore>,
        lifecycle: PositionLifecycle,
        events: UnboundedReceiver<LifecycleEvent>,
        escalations: crate::events::EscalationReceiver,
    }

    fn harness() -> Harness {
        let exchange = Arc::new(SimulatedExchange::new());
        let symbol = Symbol::parse("BTC").unwrap();
        exchange.set_price(&symbol, dec!(100));
        exchange.set_precision(&symbol, 3);

        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        let gateway = Arc::new(ExchangeGateway::new(exchange.clone(), policy));
        let stats = Arc::new(StatsStore::new());
        let (sink, events) = ChannelEventSink::channel();
        let (tx, escalations) = escalation_channel();

        let config = LifecycleConfig {
            sizing: SizingParams {
                capital: dec!(100),
                leverage: 1,
                max_notional: None,
            },
            hold_duration: Duration::from_secs(300),
        };
        let lifecycle =
            PositionLifecycle::new(gateway, stats.clone(), Arc::new(sink), tx, config);

        Harness {
            exchange,
            stats,
            lifecycle,
            events,
            escalations,
        }
    }

    fn signal(direction: Direction) -> TradeSignal {
        TradeSignal::new(Symbol::parse("BTC").unwrap(), direction, "100", None, 80.0).unwrap()
    }

    fn states(rx: &mut UnboundedReceiver<LifecycleEvent>) -> Vec<LifecycleState> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.state);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_round_trip_closes_with_profit() {
        let mut h = harness();
        let token = CancellationToken::new();

        let exchange = h.exchange.clone();
        let run = tokio::spawn(async move {
            let outcome = h.lifecycle.run(&signal(Direction::Long), &token).await;
            (h, outcome)
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        exchange.set_price(&Symbol::parse("BTC").unwrap(), dec!(110));

        let (mut h2, outcome) = run.await.unwrap();
        match outcome {
            TradeOutcome::Closed { pnl, position } => {
                assert_eq!(pnl, dec!(10));
                assert_eq!(position.quantity, dec!(1));
                assert_eq!(position.status, LifecycleState::Closed);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(
            states(&mut h2.events),
            vec![
                LifecycleState::Sizing,
                LifecycleState::Entering,
                LifecycleState::Holding,
                LifecycleState::Exiting,
                LifecycleState::Closed,
            ]
        );
        assert_eq!(h2.stats.global_report().trade_count, 1);
        assert_eq!(h2.exchange.leverage_of(&Symbol::parse("BTC").unwrap()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_symbol_fails_pre_entry() {
        let mut h = harness();
        let token = CancellationToken::new();
        let signal = TradeSignal::new(
            Symbol::parse("NOPE").unwrap(),
            Direction::Long,
            "100",
            None,
            80.0,
        )
        .unwrap();
        h.exchange.set_price(&signal.symbol, dec!(5));

        let outcome = h.lifecycle.run(&signal, &token).await;
        assert!(matches!(
            outcome,
            TradeOutcome::FailedPreEntry {
                error: TradeError::Rejected(ExchangeError::SymbolNotFound(_))
            }
        ));
        assert_eq!(
            states(&mut h.events),
            vec![LifecycleState::Sizing, LifecycleState::FailedPreEntry]
        );
        assert!(h.exchange.fills().is_empty());
        assert_eq!(h.stats.global_report().trade_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_failure_escalates() {
        let mut h = harness();
        let token = CancellationToken::new();

        h.exchange.fail_next(
            Operation::Order(pulse_core::Side::Sell),
            10,
            ExchangeError::Network("down".into()),
        );

        let outcome = h.lifecycle.run(&signal(Direction::Long), &token).await;
        match &outcome {
            TradeOutcome::Unresolved { position, error } => {
                assert_eq!(position.status, LifecycleState::Unresolved);
                assert!(error.is_critical());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let escalation = h.escalations.try_recv().unwrap();
        assert_eq!(escalation.quantity, dec!(1));
        assert_eq!(h.stats.global_report().trade_count, 0);

        let states = states(&mut h.events);
        assert_eq!(states.last(), Some(&LifecycleState::Unresolved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start_fails_pre_entry() {
        let mut h = harness();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = h.lifecycle.run(&signal(Direction::Short), &token).await;
        assert!(matches!(
            outcome,
            TradeOutcome::FailedPreEntry {
                error: TradeError::Shutdown
            }
        ));
        assert_eq!(h.exchange.call_count(Operation::FetchPrice), 0);
        assert_eq!(
            states(&mut h.events),
            vec![LifecycleState::Sizing, LifecycleState::FailedPreEntry]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_hold_exits_early() {
        let h = harness();
        let token = CancellationToken::new();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let start = tokio::time::Instant::now();
        let outcome = h.lifecycle.run(&signal(Direction::Long), &token).await;

        assert!(matches!(outcome, TradeOutcome::Closed { .. }));
        assert!(start.elapsed() < Duration::from_secs(300));
        assert_eq!(h.exchange.fills().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_exit_retry_is_unresolved() {
        let mut h = harness();
        let token = CancellationToken::new();
        let sell = Operation::Order(pulse_core::Side::Sell);
        h.exchange
            .fail_next(sell, 1, ExchangeError::Network("reset".into()));

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let outcome = h.lifecycle.run(&signal(Direction::Long), &token).await;
        match &outcome {
            TradeOutcome::Unresolved { position, error } => {
                assert_eq!(position.status, LifecycleState::Unresolved);
                assert!(error.is_critical());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // 첫 청산 시도만 실행되고 재시도 대기는 종료로 중단
        assert_eq!(h.exchange.call_count(sell), 1);
        assert_eq!(h.exchange.fills().len(), 1);

        let escalation = h.escalations.try_recv().unwrap();
        assert_eq!(escalation.quantity, dec!(1));
        assert_eq!(h.stats.global_report().trade_count, 0);

        assert_eq!(
            states(&mut h.events),
            vec![
                LifecycleState::Sizing,
                LifecycleState::Entering,
                LifecycleState::Holding,
                LifecycleState::Exiting,
                LifecycleState::Unresolved,
            ]
        );
    }
}
