use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use alloy::primitives::B256;

use crate::blockchain::TransactionFetcher;
use crate::config::MempoolConfig;
use crate::core::event_bus::{Event, EventBus};
use crate::mempool::dedup::DedupCache;
use crate::mempool::filters::InterestingFilter;
use crate::types::PipelineError;

/// 피드 연결 상태 머신
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    /// 피드에서 수신한 해시 수
    pub received: u64,
    /// 전체 데이터를 가져와 분류한 트랜잭션 수
    pub processed: u64,
    /// 관심 대상으로 발행된 트랜잭션 수
    pub interesting: u64,
    /// 멤풀에서 사라져 폐기된 트랜잭션 수
    pub dropped: u64,
}

/// 펜딩 트랜잭션 피드 모니터
///
/// 연결 수명주기: Disconnected → Connecting → Subscribed → Streaming,
/// 오류 시 Disconnected로 복귀 후 지수 백오프 재연결. 분류 파이프라인은
/// 수신과 독립된 주기로 배치 단위 처리한다.
pub struct MempoolMonitor {
    config: MempoolConfig,
    ws_url: String,
    fetcher: Arc<dyn TransactionFetcher>,
    filter: Arc<InterestingFilter>,
    event_bus: Arc<EventBus>,
    pending: Mutex<VecDeque<B256>>,
    dedup: Mutex<DedupCache>,
    state: RwLock<ConnectionState>,
    stats: RwLock<MonitorStats>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl MempoolMonitor {
    pub fn new(
        config: MempoolConfig,
        ws_url: String,
        fetcher: Arc<dyn TransactionFetcher>,
        filter: Arc<InterestingFilter>,
        event_bus: Arc<EventBus>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let dedup_capacity = config.dedup_capacity;
        Arc::new(Self {
            config,
            ws_url,
            fetcher,
            filter,
            event_bus,
            pending: Mutex::new(VecDeque::new()),
            dedup: Mutex::new(DedupCache::new(dedup_capacity)),
            state: RwLock::new(ConnectionState::Disconnected),
            stats: RwLock::new(MonitorStats::default()),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 피드 수신 루프와 분류 루프 시작
    pub async fn start(self: &Arc<Self>) {
        info!(
            "🚀 멤풀 모니터 시작 (감시 주소 {}개, 메서드 핸들러 {}개)",
            self.filter.watched_count(),
            self.filter.handler_count()
        );

        let feed = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.feed_loop().await })
        };
        let classify = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.classification_loop().await })
        };
        let metrics = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.metrics_loop().await })
        };

        self.tasks.lock().await.extend([feed, classify, metrics]);
    }

    /// 모니터 중지 - 연결을 닫고 진행 중인 배치를 유예 시간 내에서 마무리
    pub async fn stop(&self) {
        info!("🛑 멤풀 모니터 중지 중...");
        self.shutdown.cancel();

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("⚠️ 모니터 태스크가 유예 시간 내에 종료되지 않음");
            }
        }

        // 남은 큐 상태는 폐기한다 - 재시작 간 영속성 없음
        self.pending.lock().await.clear();
        *self.state.write().await = ConnectionState::Disconnected;
        info!("✅ 멤풀 모니터 중지됨");
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    /// 재연결 루프 - 실패할 때마다 지수 백오프, 한도 초과 시 치명적 중단
    async fn feed_loop(self: Arc<Self>) {
        let base = Duration::from_secs(self.config.reconnect_base_secs);
        let cap = Duration::from_secs(self.config.reconnect_max_secs);
        let mut retries: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            *self.state.write().await = ConnectionState::Connecting;

            match self.connect_and_stream().await {
                Ok(()) => break, // 셧다운에 의한 정상 종료
                Err(e) => {
                    *self.state.write().await = ConnectionState::Disconnected;
                    retries += 1;

                    if retries > self.config.max_reconnect_retries {
                        let fatal = PipelineError::Exhausted(format!(
                            "feed reconnect failed after {} attempts: {}",
                            retries - 1,
                            e
                        ));
                        error!("❌ {} - 멤풀 모니터 중단", fatal);
                        self.event_bus
                            .publish(Event::Error {
                                component: "mempool_monitor".to_string(),
                                message: fatal.to_string(),
                            })
                            .await;
                        break;
                    }

                    let delay = backoff_delay(retries, base, cap);
                    warn!(
                        "⚠️ 피드 연결 오류: {} - {:?} 후 재시도 ({}/{})",
                        e, delay, retries, self.config.max_reconnect_retries
                    );

                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// 연결 → 구독 → 스트리밍. 셧다운 시 Ok, 연결 문제 시 Err 반환
    async fn connect_and_stream(&self) -> Result<()> {
        info!("🔗 피드 연결 중: {}", self.ws_url);
        let (ws_stream, _) = connect_async(&self.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["newPendingTransactions"]
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        *self.state.write().await = ConnectionState::Subscribed;

        let keepalive = Duration::from_secs(self.config.keepalive_secs);
        let ping_timeout = Duration::from_secs(self.config.ping_timeout_secs);

        let ack = tokio::time::timeout(keepalive, read.next())
            .await
            .map_err(|_| anyhow!("subscription ack timeout"))?
            .ok_or_else(|| anyhow!("feed closed before subscription ack"))??;
        let subscription_id = match ack {
            Message::Text(text) => parse_subscription_ack(&text)?,
            other => return Err(anyhow!("unexpected subscription reply: {:?}", other)),
        };

        info!("✅ 펜딩 트랜잭션 구독 완료 (id: {})", subscription_id);
        *self.state.write().await = ConnectionState::Streaming;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = tokio::time::timeout(keepalive, read.next()) => {
                    match frame {
                        Ok(Some(Ok(Message::Text(text)))) => {
                            self.handle_feed_message(&text).await;
                        }
                        Ok(Some(Ok(Message::Ping(data)))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Ok(Some(Ok(Message::Pong(_)))) => {}
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => {
                            return Err(
                                PipelineError::Network(format!("feed stream error: {}", e)).into()
                            )
                        }
                        Ok(None) => {
                            return Err(
                                PipelineError::Network("feed connection closed".to_string()).into()
                            )
                        }
                        Err(_) => {
                            // keep-alive 초과 - ping으로 연결 상태 확인
                            write.send(Message::Ping(Vec::new())).await?;
                            match tokio::time::timeout(ping_timeout, read.next()).await {
                                Ok(Some(Ok(_))) => {}
                                _ => {
                                    return Err(PipelineError::Network(
                                        "keep-alive ping failed".to_string(),
                                    )
                                    .into())
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// 피드 알림 처리 - 해시를 분류 대기열에 적재
    async fn handle_feed_message(&self, text: &str) {
        let Some(hash) = parse_notification_hash(text) else {
            // 손상된 메시지는 해당 건만 폐기한다
            debug!("무시된 피드 메시지: {}", text);
            return;
        };

        self.stats.write().await.received += 1;

        if self.dedup.lock().await.contains(&hash) {
            return;
        }

        let mut pending = self.pending.lock().await;
        if !pending.contains(&hash) {
            pending.push_back(hash);
        }
    }

    /// 분류 루프 - 수신과 독립된 고정 주기로 배치 처리
    async fn classification_loop(self: Arc<Self>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.batch_interval_ms));

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let batch: Vec<B256> = {
                let mut pending = self.pending.lock().await;
                let take = self.config.batch_size.min(pending.len());
                pending.drain(..take).collect()
            };

            if batch.is_empty() {
                continue;
            }

            self.classify_batch(&batch).await;
        }
    }

    /// 배치 내 트랜잭션들을 동시에 조회하고 분류
    pub(crate) async fn classify_batch(&self, batch: &[B256]) {
        let fetches = batch.iter().map(|hash| self.fetcher.pending_transaction(*hash));
        let results = join_all(fetches).await;

        for (hash, result) in batch.iter().zip(results) {
            match result {
                Ok(Some(tx)) => {
                    self.stats.write().await.processed += 1;

                    if self.filter.is_interesting(&tx).await {
                        self.stats.write().await.interesting += 1;
                        debug!("🎯 관심 트랜잭션: {}", hash);
                        self.event_bus
                            .publish_async(Event::InterestingTransaction { tx_hash: *hash, tx })
                            .await;
                    }
                }
                Ok(None) => {
                    // 멤풀에서 사라진 트랜잭션 - 재시도하지 않는다
                    self.stats.write().await.dropped += 1;
                }
                Err(e) => {
                    debug!("트랜잭션 {} 조회 실패: {}", hash, e);
                }
            }

            self.dedup.lock().await.insert(*hash);
        }
    }

    async fn metrics_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // 첫 tick은 즉시 발화

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let stats = self.stats.read().await.clone();
            let interesting_pct = if stats.processed > 0 {
                (stats.interesting as f64 / stats.processed as f64) * 100.0
            } else {
                0.0
            };
            info!(
                "📊 멤풀 통계: 수신 {}건, 분류 {}건, 관심 {}건 ({:.2}%), 폐기 {}건",
                stats.received, stats.processed, stats.interesting, interesting_pct, stats.dropped
            );
        }
    }
}

/// 재연결 대기 시간: min(base × 2^retries, cap)
pub fn backoff_delay(retries: u32, base: Duration, cap: Duration) -> Duration {
    let multiplier = 1u64.checked_shl(retries).unwrap_or(u64::MAX);
    let secs = base.as_secs().saturating_mul(multiplier);
    Duration::from_secs(secs.min(cap.as_secs()))
}

/// 구독 응답에서 구독 id 추출
fn parse_subscription_ack(text: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    value
        .get("result")
        .and_then(|r| r.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow!("subscription rejected: {}", text))
}

/// 알림 엔벨로프에서 트랜잭션 해시 추출
fn parse_notification_hash(text: &str) -> Option<B256> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }
    let hash = value.get("params")?.get("result")?.as_str()?;
    hash.parse().ok()
}
