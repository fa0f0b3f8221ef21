use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use ethers::signers::LocalWallet;
use futures::future::join_all;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{RelayConfig, RelayEndpointConfig};
use crate::core::event_bus::{Event, EventBus};
use crate::flashbots::bundle::{call_bundle_body, extract_revert_reason, send_bundle_body};
use crate::flashbots::client::{flashbots_signature, HttpRelayTransport, RelayTransport};
use crate::types::{BundleSubmission, PipelineError, RelayOutcome, SignedBundle};

/// 단일 릴레이 시뮬레이션 결과
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub success: bool,
    pub revert_reason: Option<String>,
    pub response: Value,
}

/// 다중 릴레이 번들 제출 엔진
///
/// 모든 릴레이에 동일한 본문을 동시에 제출하고, 먼저 실패한 엔드포인트가
/// 있어도 전부 완료될 때까지 기다린 뒤 결과를 집계한다. 부분 성공은
/// 정상적인 결과이며 오류로 취급하지 않는다.
pub struct BundleExecutor {
    endpoints: Vec<RelayEndpointConfig>,
    transport: Arc<dyn RelayTransport>,
    signing_key: LocalWallet,
    timeout: Duration,
    event_bus: Arc<EventBus>,
    bundles_submitted: AtomicU64,
}

impl BundleExecutor {
    pub fn new(config: &RelayConfig, event_bus: Arc<EventBus>) -> Result<Self> {
        let timeout = Duration::from_secs(config.submission_timeout_secs);
        let transport = Arc::new(HttpRelayTransport::new(timeout)?);
        Self::with_transport(config, event_bus, transport)
    }

    /// 전송 구현을 주입하는 생성자 (테스트용)
    pub fn with_transport(
        config: &RelayConfig,
        event_bus: Arc<EventBus>,
        transport: Arc<dyn RelayTransport>,
    ) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(PipelineError::Config("no relay endpoints configured".to_string()).into());
        }

        // 릴레이 인증 키는 거래 지갑과 분리된 전용 identity
        let signing_key: LocalWallet = if config.auth_key.is_empty() {
            warn!("⚠️ 릴레이 인증 키 미설정 - 임시 키 생성 (평판 누적 안 됨)");
            LocalWallet::new(&mut rand::thread_rng())
        } else {
            config
                .auth_key
                .parse()
                .map_err(|e| anyhow!("invalid relay auth key: {}", e))?
        };

        info!(
            "🔗 번들 실행 엔진 초기화: 릴레이 {}개",
            config.endpoints.len()
        );

        Ok(Self {
            endpoints: config.endpoints.clone(),
            transport,
            signing_key,
            timeout: Duration::from_secs(config.submission_timeout_secs),
            event_bus,
            bundles_submitted: AtomicU64::new(0),
        })
    }

    /// 서명된 트랜잭션 묶음을 목표 블록으로 제출
    ///
    /// 반환되는 오류는 번들 구성 실패뿐이다. 릴레이별 타임아웃/거절은
    /// 집계 결과 안의 엔드포인트별 오류로만 기록된다.
    pub async fn submit(&self, raw_txs: Vec<String>, target_block: u64) -> Result<BundleSubmission> {
        let bundle = SignedBundle::new(raw_txs, target_block);
        let body = send_bundle_body(&bundle)?;
        let body_str = serde_json::to_string(&body)?;

        info!(
            "📤 번들 제출 중: {} (블록: {}, 릴레이 {}개)",
            bundle.id,
            target_block,
            self.endpoints.len()
        );

        let submissions = self.endpoints.iter().map(|endpoint| {
            let body = body_str.clone();
            async move {
                match self.submit_to_relay(endpoint, body).await {
                    Ok(response) => RelayOutcome {
                        relay: endpoint.name.clone(),
                        response: Some(response),
                        error: None,
                    },
                    Err(e) => {
                        warn!("⚠️ 릴레이 {} 제출 실패: {}", endpoint.name, e);
                        RelayOutcome {
                            relay: endpoint.name.clone(),
                            response: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });

        // 첫 실패에서 끊지 않고 전 릴레이가 해소될 때까지 기다린다
        let outcomes = join_all(submissions).await;

        let submission = BundleSubmission {
            bundle_id: bundle.id.clone(),
            target_block,
            outcomes,
            submitted_at: Utc::now(),
        };

        self.bundles_submitted.fetch_add(1, Ordering::SeqCst);
        info!(
            "📦 번들 {} 집계: 성공 {} / 실패 {}",
            bundle.id,
            submission.success_count(),
            submission.error_count()
        );

        self.event_bus
            .publish_async(Event::BundleSubmitted(submission.clone()))
            .await;

        Ok(submission)
    }

    /// 단일 릴레이에 대한 드라이런 시뮬레이션
    pub async fn simulate(&self, raw_txs: &[String], at_block: u64) -> Result<SimulationOutcome> {
        let body = call_bundle_body(raw_txs, at_block)?;
        let body_str = serde_json::to_string(&body)?;

        let endpoint = self
            .endpoints
            .first()
            .ok_or_else(|| PipelineError::Config("no relay endpoints configured".to_string()))?;

        let response = self.submit_to_relay(endpoint, body_str).await?;
        let revert_reason = extract_revert_reason(&response);

        if let Some(reason) = &revert_reason {
            warn!("🔬 시뮬레이션 revert: {}", reason);
        }

        Ok(SimulationOutcome {
            success: revert_reason.is_none(),
            revert_reason,
            response,
        })
    }

    async fn submit_to_relay(&self, endpoint: &RelayEndpointConfig, body: String) -> Result<Value> {
        let signature = flashbots_signature(&body, &self.signing_key)?;

        match tokio::time::timeout(
            self.timeout,
            self.transport.post(&endpoint.url, body, signature),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "relay submission timed out after {:?}",
                self.timeout
            )),
        }
    }

    pub fn submitted_count(&self) -> u64 {
        self.bundles_submitted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::{topics, EventHandler};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex;

    enum FakeBehavior {
        Succeed,
        Reject(&'static str),
        Hang,
    }

    struct FakeTransport {
        behaviors: HashMap<String, FakeBehavior>,
    }

    #[async_trait]
    impl RelayTransport for FakeTransport {
        async fn post(&self, url: &str, _body: String, _signature: String) -> Result<Value> {
            match self.behaviors.get(url) {
                Some(FakeBehavior::Succeed) => {
                    Ok(serde_json::json!({"result": {"bundleHash": "0xbeef"}}))
                }
                Some(FakeBehavior::Reject(message)) => Err(anyhow!("{}", message)),
                Some(FakeBehavior::Hang) => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
                None => Err(anyhow!("unknown endpoint {}", url)),
            }
        }
    }

    struct RecordingHandler {
        count: AtomicUsize,
        last: Mutex<Option<Event>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().await = Some(event.clone());
            Ok(())
        }
    }

    fn relay_config(urls: &[(&str, &str)]) -> RelayConfig {
        RelayConfig {
            endpoints: urls
                .iter()
                .map(|(name, url)| RelayEndpointConfig {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
            auth_key: String::new(),
            submission_timeout_secs: 10,
        }
    }

    fn executor_with(
        behaviors: HashMap<String, FakeBehavior>,
        config: &RelayConfig,
        bus: Arc<EventBus>,
    ) -> BundleExecutor {
        BundleExecutor::with_transport(config, bus, Arc::new(FakeTransport { behaviors })).unwrap()
    }

    fn raw_txs() -> Vec<String> {
        vec!["0x02f87301".to_string()]
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_is_aggregated_not_raised() {
        let config = relay_config(&[
            ("flashbots", "https://relay-a"),
            ("eden", "https://relay-b"),
            ("builder0x69", "https://relay-c"),
        ]);
        let mut behaviors = HashMap::new();
        behaviors.insert("https://relay-a".to_string(), FakeBehavior::Succeed);
        behaviors.insert("https://relay-b".to_string(), FakeBehavior::Hang);
        behaviors.insert("https://relay-c".to_string(), FakeBehavior::Succeed);

        let bus = Arc::new(EventBus::new());
        let executor = executor_with(behaviors, &config, Arc::clone(&bus));

        // 하나가 타임아웃해도 submit은 오류 없이 집계를 반환한다
        let submission = executor.submit(raw_txs(), 19_230_001).await.unwrap();

        assert_eq!(submission.outcomes.len(), 3);
        assert_eq!(submission.success_count(), 2);
        assert_eq!(submission.error_count(), 1);

        let timed_out = submission
            .outcomes
            .iter()
            .find(|o| o.relay == "eden")
            .unwrap();
        assert!(timed_out.error.as_ref().unwrap().contains("timed out"));
        assert!(timed_out.response.is_none());

        assert_eq!(executor.submitted_count(), 1);
    }

    #[tokio::test]
    async fn test_rejection_captured_per_endpoint() {
        let config = relay_config(&[("flashbots", "https://relay-a"), ("eden", "https://relay-b")]);
        let mut behaviors = HashMap::new();
        behaviors.insert("https://relay-a".to_string(), FakeBehavior::Succeed);
        behaviors.insert(
            "https://relay-b".to_string(),
            FakeBehavior::Reject("relay returned status 403"),
        );

        let bus = Arc::new(EventBus::new());
        let executor = executor_with(behaviors, &config, Arc::clone(&bus));

        let submission = executor.submit(raw_txs(), 19_230_001).await.unwrap();
        assert_eq!(submission.success_count(), 1);
        assert_eq!(submission.error_count(), 1);
    }

    #[tokio::test]
    async fn test_bundle_submitted_event_carries_outcomes() {
        let config = relay_config(&[("flashbots", "https://relay-a")]);
        let mut behaviors = HashMap::new();
        behaviors.insert("https://relay-a".to_string(), FakeBehavior::Succeed);

        let bus = Arc::new(EventBus::new());
        let handler = Arc::new(RecordingHandler {
            count: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        let as_dyn: Arc<dyn EventHandler> = handler.clone();
        bus.subscribe(topics::BUNDLE_SUBMITTED, as_dyn).await;

        let executor = executor_with(behaviors, &config, Arc::clone(&bus));
        executor.submit(raw_txs(), 19_230_001).await.unwrap();

        assert_eq!(handler.count.load(Ordering::SeqCst), 1);
        let event = handler.last.lock().await.clone().unwrap();
        match event {
            Event::BundleSubmitted(submission) => {
                assert_eq!(submission.target_block, 19_230_001);
                assert_eq!(submission.outcomes.len(), 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_bundle_is_construction_error() {
        let config = relay_config(&[("flashbots", "https://relay-a")]);
        let bus = Arc::new(EventBus::new());
        let executor = executor_with(HashMap::new(), &config, Arc::clone(&bus));

        // 빈 트랜잭션 목록은 유일하게 오류로 올라가는 경로
        assert!(executor.submit(vec![], 19_230_001).await.is_err());
        assert_eq!(executor.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_simulate_surfaces_revert_reason() {
        struct RevertTransport;

        #[async_trait]
        impl RelayTransport for RevertTransport {
            async fn post(&self, _url: &str, body: String, _signature: String) -> Result<Value> {
                assert!(body.contains("eth_callBundle"));
                Ok(serde_json::json!({
                    "result": {
                        "results": [
                            {"txHash": "0x1", "error": "execution reverted", "revert": "K"}
                        ]
                    }
                }))
            }
        }

        let config = relay_config(&[("flashbots", "https://relay-a")]);
        let bus = Arc::new(EventBus::new());
        let executor =
            BundleExecutor::with_transport(&config, bus, Arc::new(RevertTransport)).unwrap();

        let outcome = executor.simulate(&raw_txs(), 19_230_000).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.revert_reason.unwrap(), "execution reverted: K");
    }
}
