//! 라이프사이클 이벤트와 에스컬레이션을 알림 전송기로 분배합니다.

use std::sync::Arc;

use pulse_core::{Escalation, LifecycleEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::types::{Notification, NotificationSender};

/// 알림 분배기.
#[derive(Default, Clone)]
pub struct NotificationDispatcher {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 알림 전송기를 추가합니다.
    pub fn add_sender(&mut self, sender: Arc<dyn NotificationSender>) {
        self.senders.push(sender);
    }

    /// 활성화된 전송기 수.
    pub fn enabled_count(&self) -> usize {
        self.senders.iter().filter(|s| s.is_enabled()).count()
    }

    /// 활성화된 모든 전송기로 전송합니다. 성공한 전송 수를 반환합니다.
    ///
    /// 전송 실패는 로그로만 남깁니다.
    pub async fn notify(&self, notification: &Notification) -> usize {
        let mut delivered = 0;
        for sender in self.senders.iter().filter(|s| s.is_enabled()) {
            match sender.send(notification).await {
                Ok(()) => delivered += 1,
                Err(e) => error!(sender = sender.name(), error = %e, "알림 전송 실패"),
            }
        }
        delivered
    }

    async fn on_event(&self, event: &LifecycleEvent) {
        if let Some(notification) = Notification::from_lifecycle(event) {
            self.notify(&notification).await;
        }
    }

    async fn on_escalation(&self, escalation: &Escalation) {
        self.notify(&Notification::from_escalation(escalation)).await;
    }

    /// 분배 루프를 띄웁니다.
    ///
    /// 두 채널이 모두 닫히거나 `shutdown`이 취소되면 종료합니다.
    /// 취소 시점에 이미 도착해 있던 항목은 전송한 뒤 종료합니다.
    pub fn spawn(
        self,
        mut events: UnboundedReceiver<LifecycleEvent>,
        mut escalations: UnboundedReceiver<Escalation>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(senders = self.enabled_count(), "알림 분배기 시작");
            let mut events_open = true;
            let mut escalations_open = true;

            while events_open || escalations_open {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        while let Ok(escalation) = escalations.try_recv() {
                            self.on_escalation(&escalation).await;
                        }
                        while let Ok(event) = events.try_recv() {
                            self.on_event(&event).await;
                        }
                        break;
                    }
                    escalation = escalations.recv(), if escalations_open => match escalation {
                        Some(escalation) => self.on_escalation(&escalation).await,
                        None => escalations_open = false,
                    },
                    event = events.recv(), if events_open => match event {
                        Some(event) => self.on_event(&event).await,
                        None => events_open = false,
                    },
                }
            }

            debug!("알림 분배기 종료");
        })
    }
}
