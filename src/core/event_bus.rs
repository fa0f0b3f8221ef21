use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, error};

use alloy::primitives::B256;

use crate::types::{BundleSubmission, ExecutionResult, PendingTransaction, StrategyId};

/// 버스에서 사용하는 토픽 이름들
pub mod topics {
    pub const INTERESTING_TRANSACTION: &str = "interesting_transaction";
    pub const OPPORTUNITY_FOUND: &str = "opportunity_found";
    pub const TRADE_EXECUTED: &str = "trade_executed";
    pub const BUNDLE_SUBMITTED: &str = "bundle_submitted";
    pub const STRATEGY_CHANGED: &str = "strategy_changed";
    pub const ERROR: &str = "error";
}

/// 컴포넌트 간에 흐르는 이벤트 페이로드
#[derive(Debug, Clone)]
pub enum Event {
    InterestingTransaction {
        tx_hash: B256,
        tx: PendingTransaction,
    },
    OpportunityFound {
        strategy: StrategyId,
        expected_profit_eth: f64,
    },
    TradeExecuted(ExecutionResult),
    BundleSubmitted(BundleSubmission),
    StrategyChanged {
        strategy: StrategyId,
        timestamp: DateTime<Utc>,
    },
    Error {
        component: String,
        message: String,
    },
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::InterestingTransaction { .. } => topics::INTERESTING_TRANSACTION,
            Event::OpportunityFound { .. } => topics::OPPORTUNITY_FOUND,
            Event::TradeExecuted(_) => topics::TRADE_EXECUTED,
            Event::BundleSubmitted(_) => topics::BUNDLE_SUBMITTED,
            Event::StrategyChanged { .. } => topics::STRATEGY_CHANGED,
            Event::Error { .. } => topics::ERROR,
        }
    }
}

/// 토픽 구독자가 구현하는 핸들러
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<()>;
}

/// 프로세스 내 publish/subscribe 백본
///
/// 구독자는 토픽 이름으로 등록되며 등록 순서대로 호출된다. 핸들러 실패는
/// 격리된다: 오류는 로그로 남고 다음 핸들러 실행과 호출자 반환을 막지 않는다.
/// 영속성은 없다 - publish 이후에 등록된 구독자는 해당 이벤트를 받지 못한다.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// 토픽에 핸들러 등록 (같은 핸들러 재등록은 no-op)
    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().await;
        let handlers = subscribers.entry(topic.to_string()).or_default();

        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return;
        }
        handlers.push(handler);
        debug!("Subscribed to event: {}", topic);
    }

    /// 토픽에서 핸들러 제거
    pub async fn unsubscribe(&self, topic: &str, handler: &Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(handlers) = subscribers.get_mut(topic) {
            handlers.retain(|h| !Arc::ptr_eq(h, handler));
            debug!("Unsubscribed from event: {}", topic);
        }
    }

    /// 이벤트 발행 - 등록 순서대로 핸들러를 하나씩 호출
    pub async fn publish(&self, event: Event) {
        let handlers = self.handlers_for(event.topic()).await;

        for handler in handlers {
            if let Err(e) = handler.handle(&event).await {
                error!("Error in event handler for {}: {}", event.topic(), e);
            }
        }
    }

    /// 이벤트 발행 - 핸들러들을 동시에 실행하고 전부 완료될 때까지 대기
    pub async fn publish_async(&self, event: Event) {
        let handlers = self.handlers_for(event.topic()).await;
        if handlers.is_empty() {
            return;
        }

        let results = join_all(handlers.iter().map(|h| h.handle(&event))).await;
        for result in results {
            if let Err(e) = result {
                error!("Error in event handler for {}: {}", event.topic(), e);
            }
        }
    }

    /// 특정 토픽 또는 전체 구독자 정리 (종료 시 사용)
    pub async fn clear_subscribers(&self, topic: Option<&str>) {
        let mut subscribers = self.subscribers.write().await;
        match topic {
            Some(topic) => {
                subscribers.remove(topic);
                debug!("Cleared subscribers for event: {}", topic);
            }
            None => {
                subscribers.clear();
                debug!("Cleared all subscribers");
            }
        }
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.get(topic).map(|h| h.len()).unwrap_or(0)
    }

    async fn handlers_for(&self, topic: &str) -> Vec<Arc<dyn EventHandler>> {
        let subscribers = self.subscribers.read().await;
        subscribers.get(topic).cloned().unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct CountingHandler {
        count: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &Event) -> Result<()> {
            Err(anyhow!("handler blew up"))
        }
    }

    struct OrderRecorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventHandler for OrderRecorder {
        async fn handle(&self, _event: &Event) -> Result<()> {
            self.log.lock().await.push(self.label);
            Ok(())
        }
    }

    fn error_event() -> Event {
        Event::Error {
            component: "test".to_string(),
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let bus = EventBus::new();
        let handler = CountingHandler::new();

        bus.subscribe(topics::ERROR, handler.clone()).await;
        bus.subscribe(topics::ERROR, handler.clone()).await;
        assert_eq!(bus.subscriber_count(topics::ERROR).await, 1);

        bus.publish(error_event()).await;
        assert_eq!(handler.count(), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_is_isolated() {
        let bus = EventBus::new();
        let failing: Arc<dyn EventHandler> = Arc::new(FailingHandler);
        let counting = CountingHandler::new();

        bus.subscribe(topics::ERROR, failing).await;
        bus.subscribe(topics::ERROR, counting.clone()).await;

        // 첫 핸들러가 실패해도 두 번째 핸들러는 실행된다
        bus.publish(error_event()).await;
        assert_eq!(counting.count(), 1);
    }

    #[tokio::test]
    async fn test_publish_invokes_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first: Arc<dyn EventHandler> = Arc::new(OrderRecorder {
            label: "first",
            log: Arc::clone(&log),
        });
        let second: Arc<dyn EventHandler> = Arc::new(OrderRecorder {
            label: "second",
            log: Arc::clone(&log),
        });

        bus.subscribe(topics::ERROR, first).await;
        bus.subscribe(topics::ERROR, second).await;
        bus.publish(error_event()).await;

        assert_eq!(*log.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let handler = CountingHandler::new();
        let as_dyn: Arc<dyn EventHandler> = handler.clone();

        bus.subscribe(topics::ERROR, as_dyn.clone()).await;
        bus.unsubscribe(topics::ERROR, &as_dyn).await;

        bus.publish(error_event()).await;
        assert_eq!(handler.count(), 0);
    }

    #[tokio::test]
    async fn test_publish_async_runs_all_handlers() {
        let bus = EventBus::new();
        let failing: Arc<dyn EventHandler> = Arc::new(FailingHandler);
        let a = CountingHandler::new();
        let b = CountingHandler::new();

        bus.subscribe(topics::ERROR, a.clone()).await;
        bus.subscribe(topics::ERROR, failing).await;
        bus.subscribe(topics::ERROR, b.clone()).await;

        bus.publish_async(error_event()).await;
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
    }

    #[tokio::test]
    async fn test_no_delivery_for_late_subscriber() {
        let bus = EventBus::new();
        bus.publish(error_event()).await;

        let handler = CountingHandler::new();
        bus.subscribe(topics::ERROR, handler.clone()).await;
        assert_eq!(handler.count(), 0);
    }
}
