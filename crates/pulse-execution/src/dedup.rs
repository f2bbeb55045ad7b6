//! 심볼 중복 제거 관문과 신호 큐.
//!
//! 같은 심볼에 대해 대기 중이거나 실행 중인 거래가 있으면 새 신호를 거부합니다.
//! 확인, 등록, 큐 적재는 하나의 락 안에서 일어나므로 동시에 들어온 두 신호 중
//! 정확히 하나만 수락됩니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use pulse_core::{Symbol, TradeSignal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 같은 심볼이 이미 대기/실행 중일 때의 거부 사유.
pub const REASON_ALREADY_PENDING: &str = "already pending";
/// 종료가 시작된 뒤의 거부 사유.
pub const REASON_SHUTTING_DOWN: &str = "shutting down";

/// 수락된 신호의 대기 등록을 가리키는 티켓.
///
/// 해제는 티켓의 세대가 현재 등록과 일치할 때만 효과가 있으므로
/// 이전 거래의 뒤늦은 해제가 새 거래의 등록을 지우지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionTicket {
    symbol: Symbol,
    generation: u64,
}

impl AdmissionTicket {
    /// 티켓의 심볼.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}

/// 제출 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// 수락 여부
    pub accepted: bool,
    /// 거부 사유
    pub reason: Option<String>,
    /// 수락 시 발급된 티켓
    pub ticket: Option<AdmissionTicket>,
}

impl Admission {
    fn accepted(ticket: AdmissionTicket) -> Self {
        Self {
            accepted: true,
            reason: None,
            ticket: Some(ticket),
        }
    }

    fn rejected(reason: &str) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.to_string()),
            ticket: None,
        }
    }
}

/// 큐에 적재된 신호와 그 티켓.
#[derive(Debug)]
pub struct QueuedSignal {
    pub signal: TradeSignal,
    pub ticket: AdmissionTicket,
}

struct PendingState {
    entries: HashMap<Symbol, u64>,
    next_generation: u64,
    sender: Option<mpsc::UnboundedSender<QueuedSignal>>,
}

/// 심볼 중복 제거 관문.
pub struct Deduplicator {
    state: Mutex<PendingState>,
}

impl Deduplicator {
    /// 관문과 연결된 큐를 생성합니다.
    pub fn new() -> (Arc<Self>, SignalQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dedup = Arc::new(Self {
            state: Mutex::new(PendingState {
                entries: HashMap::new(),
                next_generation: 0,
                sender: Some(tx),
            }),
        });
        let queue = SignalQueue {
            receiver: tokio::sync::Mutex::new(rx),
            dedup: Arc::clone(&dedup),
        };
        (dedup, queue)
    }

    /// 신호를 제출합니다. 수락되면 즉시 큐에 적재됩니다.
    pub fn submit(&self, signal: TradeSignal) -> Admission {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.sender.is_none() {
            warn!(symbol = %signal.symbol, "종료 중이므로 신호 거부");
            return Admission::rejected(REASON_SHUTTING_DOWN);
        }
        if state.entries.contains_key(&signal.symbol) {
            info!(
                symbol = %signal.symbol,
                origin = %signal.origin_id,
                "이미 진행 중인 심볼, 신호 거부"
            );
            return Admission::rejected(REASON_ALREADY_PENDING);
        }

        state.next_generation += 1;
        let ticket = AdmissionTicket {
            symbol: signal.symbol.clone(),
            generation: state.next_generation,
        };
        let symbol = signal.symbol.clone();

        let sent = match &state.sender {
            Some(sender) => sender
                .send(QueuedSignal {
                    signal,
                    ticket: ticket.clone(),
                })
                .is_ok(),
            None => false,
        };
        if !sent {
            warn!(symbol = %symbol, "큐가 닫혀 신호 거부");
            state.sender = None;
            return Admission::rejected(REASON_SHUTTING_DOWN);
        }

        state.entries.insert(symbol.clone(), ticket.generation);
        debug!(symbol = %symbol, pending = state.entries.len(), "신호 수락");
        Admission::accepted(ticket)
    }

    /// 티켓에 해당하는 등록을 해제합니다.
    ///
    /// 이미 해제됐거나 더 새로운 등록으로 대체된 경우 아무 일도 하지 않고 `false`를 반환합니다.
    pub fn release(&self, ticket: &AdmissionTicket) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.entries.get(&ticket.symbol) {
            Some(&generation) if generation == ticket.generation => {
                state.entries.remove(&ticket.symbol);
                debug!(symbol = %ticket.symbol, "대기 등록 해제");
                true
            }
            _ => false,
        }
    }

    /// 세대와 무관하게 심볼의 등록을 해제합니다.
    pub fn release_symbol(&self, symbol: &Symbol) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.remove(symbol).is_some()
    }

    /// 심볼이 대기/실행 중인지 확인.
    pub fn is_pending(&self, symbol: &Symbol) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.contains_key(symbol)
    }

    /// 대기/실행 중인 심볼 수.
    pub fn pending_len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.len()
    }

    /// 새 제출을 막습니다. 이미 적재된 신호는 큐에 남습니다.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.sender.take().is_some() {
            info!(pending = state.entries.len(), "신호 관문 닫힘");
        }
    }

    /// 닫혔는지 확인.
    pub fn is_closed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sender.is_none()
    }
}

/// 수락된 신호의 FIFO 큐. 여러 워커가 공유합니다.
pub struct SignalQueue {
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedSignal>>,
    dedup: Arc<Deduplicator>,
}

impl SignalQueue {
    /// 다음 신호를 꺼냅니다.
    ///
    /// 종료가 요청됐거나 큐가 닫히고 비었으면 `None`을 반환합니다.
    pub async fn dequeue(&self, shutdown: &CancellationToken) -> Option<QueuedSignal> {
        let mut receiver = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            guard = self.receiver.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            item = receiver.recv() => item,
        }
    }

    /// 처리되지 않은 신호를 모두 버리고 등록을 해제합니다. 버린 개수를 반환합니다.
    pub async fn drain(&self) -> usize {
        let mut receiver = self.receiver.lock().await;
        let mut drained = 0;
        while let Ok(item) = receiver.try_recv() {
            self.dedup.release(&item.ticket);
            debug!(symbol = %item.signal.symbol, "처리되지 않은 신호 폐기");
            drained += 1;
        }
        if drained > 0 {
            warn!(drained, "종료 시 처리되지 않은 신호 폐기");
        }
        drained
    }
}

/// 스코프를 벗어날 때 티켓을 해제하는 가드.
///
/// 라이프사이클이 어떤 경로로 끝나든 (패닉 포함) 등록이 남지 않습니다.
pub struct PendingRelease {
    dedup: Arc<Deduplicator>,
    ticket: AdmissionTicket,
}

impl PendingRelease {
    pub fn new(dedup: Arc<Deduplicator>, ticket: AdmissionTicket) -> Self {
        Self { dedup, ticket }
    }
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        self.dedup.release(&self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::Direction;

    fn signal(symbol: &str) -> TradeSignal {
        TradeSignal::new(
            Symbol::parse(symbol).unwrap(),
            Direction::Long,
            "100",
            None,
            80.0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_second_submit_same_symbol_rejected() {
        let (dedup, queue) = Deduplicator::new();

        let first = dedup.submit(signal("BTC"));
        assert!(first.accepted);
        assert!(first.ticket.is_some());

        let second = dedup.submit(signal("BTC"));
        assert!(!second.accepted);
        assert_eq!(second.reason.as_deref(), Some(REASON_ALREADY_PENDING));

        let token = CancellationToken::new();
        let item = queue.dequeue(&token).await.unwrap();
        assert_eq!(item.signal.symbol.as_str(), "BTCUSDT");
        assert_eq!(dedup.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_different_symbols_are_independent() {
        let (dedup, _queue) = Deduplicator::new();
        assert!(dedup.submit(signal("BTC")).accepted);
        assert!(dedup.submit(signal("ETH")).accepted);
        assert_eq!(dedup.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (dedup, _queue) = Deduplicator::new();
        let ticket = dedup.submit(signal("BTC")).ticket.unwrap();

        assert!(dedup.release(&ticket));
        assert!(!dedup.release(&ticket));
        assert!(!dedup.is_pending(ticket.symbol()));
    }

    #[tokio::test]
    async fn test_stale_ticket_does_not_release_newer_admission() {
        let (dedup, _queue) = Deduplicator::new();
        let old = dedup.submit(signal("BTC")).ticket.unwrap();
        assert!(dedup.release(&old));

        let newer = dedup.submit(signal("BTC")).ticket.unwrap();
        assert!(!dedup.release(&old));
        assert!(dedup.is_pending(newer.symbol()));
        assert!(dedup.release(&newer));
    }

    #[tokio::test]
    async fn test_resubmit_after_release() {
        let (dedup, _queue) = Deduplicator::new();
        let ticket = dedup.submit(signal("SOL")).ticket.unwrap();
        dedup.release(&ticket);
        assert!(dedup.submit(signal("SOL")).accepted);
    }

    #[tokio::test]
    async fn test_close_rejects_new_submissions() {
        let (dedup, _queue) = Deduplicator::new();
        dedup.close();

        let admission = dedup.submit(signal("BTC"));
        assert!(!admission.accepted);
        assert_eq!(admission.reason.as_deref(), Some(REASON_SHUTTING_DOWN));
        assert!(dedup.is_closed());
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (dedup, queue) = Deduplicator::new();
        for sym in ["BTC", "ETH", "SOL"] {
            dedup.submit(signal(sym));
        }

        let token = CancellationToken::new();
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(queue.dequeue(&token).await.unwrap().signal.symbol.to_string());
        }
        assert_eq!(order, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    }

    #[tokio::test]
    async fn test_dequeue_returns_none_after_cancel() {
        let (dedup, queue) = Deduplicator::new();
        dedup.submit(signal("BTC"));

        let token = CancellationToken::new();
        token.cancel();
        assert!(queue.dequeue(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_returns_none_when_closed_and_empty() {
        let (dedup, queue) = Deduplicator::new();
        dedup.close();
        let token = CancellationToken::new();
        assert!(queue.dequeue(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_drain_releases_entries() {
        let (dedup, queue) = Deduplicator::new();
        dedup.submit(signal("BTC"));
        dedup.submit(signal("ETH"));
        dedup.close();

        assert_eq!(queue.drain().await, 2);
        assert_eq!(dedup.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_release_guard() {
        let (dedup, _queue) = Deduplicator::new();
        let ticket = dedup.submit(signal("BTC")).ticket.unwrap();
        {
            let _guard = PendingRelease::new(Arc::clone(&dedup), ticket);
            assert_eq!(dedup.pending_len(), 1);
        }
        assert_eq!(dedup.pending_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submit_accepts_exactly_one() {
        let (dedup, _queue) = Deduplicator::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let dedup = Arc::clone(&dedup);
            handles.push(tokio::spawn(async move { dedup.submit(signal("BTC")).accepted }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(dedup.pending_len(), 1);
    }
}
