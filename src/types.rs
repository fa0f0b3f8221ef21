use serde::{Deserialize, Serialize};
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};

/// Pending transaction as observed through the mempool feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub input: Vec<u8>,
    pub nonce: u64,
    /// 피드에서 처음 관측된 시각
    pub first_seen: DateTime<Utc>,
}

impl PendingTransaction {
    /// 호출 데이터의 4바이트 함수 선택자
    pub fn selector(&self) -> Option<[u8; 4]> {
        if self.input.len() < 4 {
            return None;
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&self.input[0..4]);
        Some(selector)
    }

    /// 호출 데이터가 없는 단순 ETH 전송인지 확인
    pub fn is_plain_transfer(&self) -> bool {
        self.input.is_empty()
    }
}

/// Strategy tags known to the orchestrator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StrategyId {
    DexArbitrage,
    FlashLoan,
    CrossChain,
    MevShare,
}

impl StrategyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::DexArbitrage => "dex_arbitrage",
            StrategyId::FlashLoan => "flash_loan",
            StrategyId::CrossChain => "cross_chain",
            StrategyId::MevShare => "mev_share",
        }
    }

    pub fn all() -> [StrategyId; 4] {
        [
            StrategyId::DexArbitrage,
            StrategyId::FlashLoan,
            StrategyId::CrossChain,
            StrategyId::MevShare,
        ]
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gas urgency tiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GasTier {
    Fast,
    Balanced,
    Economic,
}

impl std::fmt::Display for GasTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GasTier::Fast => write!(f, "fast"),
            GasTier::Balanced => write!(f, "balanced"),
            GasTier::Economic => write!(f, "economic"),
        }
    }
}

/// Cached gas price estimate for one urgency tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeEstimate {
    pub tier: GasTier,
    pub price_wei: U256,
    pub computed_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl FeeEstimate {
    pub fn new(tier: GasTier, price_wei: U256, ttl_secs: u64) -> Self {
        Self {
            tier,
            price_wei,
            computed_at: Utc::now(),
            ttl_secs,
        }
    }

    /// TTL 이내의 추정치인지 확인 (벽시계 비교)
    pub fn is_fresh(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.computed_at);
        age.num_seconds() >= 0 && (age.num_seconds() as u64) < self.ttl_secs
    }

    /// 가스 단위 수에 대한 수수료 비용 (ETH)
    pub fn cost_eth(&self, gas_units: u64) -> f64 {
        let wei = self.price_wei.saturating_mul(U256::from(gas_units));
        wei_to_eth(wei)
    }
}

/// U256 wei 값을 f64 ETH로 변환 (손익 계산용 근사치)
pub fn wei_to_eth(wei: U256) -> f64 {
    let limbs = wei.as_limbs();
    let mut value = 0f64;
    for (i, limb) in limbs.iter().enumerate() {
        value += (*limb as f64) * 2f64.powi(64 * i as i32);
    }
    value / 1e18
}

/// Arbitrage opportunity emitted by a strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub id: String,
    pub strategy: StrategyId,
    pub buy_venue: String,
    pub sell_venue: String,
    pub token: String,
    /// 예상 총수익 (비용 차감 전, ETH)
    pub expected_profit_eth: f64,
    /// 거래 명목 금액 (ETH)
    pub notional_eth: f64,
    pub gas_estimate: u64,
    pub estimated_slippage_pct: f64,
    pub uses_flashloan: bool,
    /// 발견 시점 가격 기준 - 평가 시점에는 이미 움직였을 수 있음
    pub discovered_at: DateTime<Utc>,
}

impl Opportunity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: StrategyId,
        buy_venue: impl Into<String>,
        sell_venue: impl Into<String>,
        token: impl Into<String>,
        expected_profit_eth: f64,
        notional_eth: f64,
        gas_estimate: u64,
        estimated_slippage_pct: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy,
            buy_venue: buy_venue.into(),
            sell_venue: sell_venue.into(),
            token: token.into(),
            expected_profit_eth,
            notional_eth,
            gas_estimate,
            estimated_slippage_pct,
            uses_flashloan: false,
            discovered_at: Utc::now(),
        }
    }

    pub fn with_flashloan(mut self) -> Self {
        self.uses_flashloan = true;
        self
    }
}

/// Ordered set of raw signed transactions targeting a single block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedBundle {
    pub id: String,
    /// 0x-프리픽스 서명된 트랜잭션 hex 문자열
    pub raw_txs: Vec<String>,
    pub target_block: u64,
    pub created_at: DateTime<Utc>,
}

impl SignedBundle {
    pub fn new(raw_txs: Vec<String>, target_block: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            raw_txs,
            target_block,
            created_at: Utc::now(),
        }
    }
}

/// Per-relay submission outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayOutcome {
    pub relay: String,
    /// 릴레이 응답 본문 (오류 시 None)
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl RelayOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of one bundle submission across all relays
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleSubmission {
    pub bundle_id: String,
    pub target_block: u64,
    pub outcomes: Vec<RelayOutcome>,
    pub submitted_at: DateTime<Utc>,
}

impl BundleSubmission {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }
}

/// Terminal order status of an executed trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Filled,
    Canceled,
    Failed,
    Timeout,
}

/// Completed execution record consumed by the adaptive controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub opportunity_id: String,
    pub strategy: StrategyId,
    pub buy_venue: String,
    pub sell_venue: String,
    pub expected_profit_eth: f64,
    pub realized_profit_eth: f64,
    pub slippage_pct: f64,
    pub latency_ms: u64,
    pub status: OrderStatus,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// 실현/예상 수익 비율
    pub fn profit_ratio(&self) -> f64 {
        if self.expected_profit_eth <= 0.0 {
            return 0.0;
        }
        self.realized_profit_eth / self.expected_profit_eth
    }
}

/// Error taxonomy for the pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// 일시적 네트워크 오류 - 재시도 또는 해당 작업만 건너뜀
    #[error("network error: {0}")]
    Network(String),

    /// 손상된 메시지/응답 - 해당 메시지만 폐기
    #[error("data error: {0}")]
    Data(String),

    /// 시작 시점에 드러나는 설정 오류 - 재시도하지 않음
    #[error("configuration error: {0}")]
    Config(String),

    /// 재시도 한도 초과 - 해당 연결에 대해 치명적
    #[error("retries exhausted: {0}")]
    Exhausted(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_extraction() {
        let mut tx = sample_tx();
        tx.input = vec![0x38, 0xed, 0x17, 0x39, 0xaa, 0xbb];
        assert_eq!(tx.selector(), Some([0x38, 0xed, 0x17, 0x39]));
        assert!(!tx.is_plain_transfer());

        tx.input = vec![];
        assert_eq!(tx.selector(), None);
        assert!(tx.is_plain_transfer());
    }

    #[test]
    fn test_fee_estimate_freshness() {
        let mut estimate = FeeEstimate::new(GasTier::Fast, U256::from(30_000_000_000u64), 30);
        assert!(estimate.is_fresh());

        estimate.computed_at = Utc::now() - chrono::Duration::seconds(31);
        assert!(!estimate.is_fresh());
    }

    #[test]
    fn test_fee_cost_eth() {
        // 20 gwei * 250_000 gas = 0.005 ETH
        let estimate = FeeEstimate::new(GasTier::Balanced, U256::from(20_000_000_000u64), 30);
        let cost = estimate.cost_eth(250_000);
        assert!((cost - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_profit_ratio() {
        let result = ExecutionResult {
            opportunity_id: "op-1".to_string(),
            strategy: StrategyId::DexArbitrage,
            buy_venue: "uniswap_v2".to_string(),
            sell_venue: "sushiswap".to_string(),
            expected_profit_eth: 0.02,
            realized_profit_eth: 0.018,
            slippage_pct: 0.4,
            latency_ms: 180,
            status: OrderStatus::Filled,
            completed_at: Utc::now(),
        };
        assert!(result.is_filled());
        assert!((result.profit_ratio() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_bundle_submission_counts() {
        let submission = BundleSubmission {
            bundle_id: "b-1".to_string(),
            target_block: 19_000_001,
            outcomes: vec![
                RelayOutcome {
                    relay: "flashbots".to_string(),
                    response: Some(serde_json::json!({"bundleHash": "0xabc"})),
                    error: None,
                },
                RelayOutcome {
                    relay: "eden".to_string(),
                    response: None,
                    error: Some("timeout".to_string()),
                },
            ],
            submitted_at: Utc::now(),
        };
        assert_eq!(submission.success_count(), 1);
        assert_eq!(submission.error_count(), 1);
    }

    fn sample_tx() -> PendingTransaction {
        PendingTransaction {
            hash: B256::ZERO,
            from: Address::ZERO,
            to: Some(Address::ZERO),
            value: U256::ZERO,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: U256::from(200_000u64),
            input: vec![],
            nonce: 0,
            first_seen: Utc::now(),
        }
    }
}
