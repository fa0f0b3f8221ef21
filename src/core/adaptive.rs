use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ProfitabilityConfig;
use crate::types::{ExecutionResult, StrategyId};

// 재계산 가중치: 성공률이 가장 크게 반영된다
const WEIGHT_SLIPPAGE: f64 = 0.3;
const WEIGHT_SUCCESS: f64 = 0.5;
const WEIGHT_PROFIT_RATIO: f64 = 0.2;

/// 베뉴별 누적 성과
#[derive(Debug, Clone, Default)]
pub struct VenuePerformance {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_slippage_pct: f64,
}

impl VenuePerformance {
    pub fn executions(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn success_rate(&self) -> f64 {
        if self.executions() == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.executions() as f64
    }

    pub fn avg_slippage_pct(&self) -> f64 {
        if self.executions() == 0 {
            return 0.0;
        }
        self.total_slippage_pct / self.executions() as f64
    }
}

struct AdaptiveState {
    history: HashMap<StrategyId, VecDeque<ExecutionResult>>,
    venues: HashMap<String, VenuePerformance>,
    min_profit_threshold: f64,
    slippage_tolerance: f64,
    last_recompute: Instant,
}

/// 체결 결과로부터 임계값과 슬리피지 허용치를 재조정하는 컨트롤러
///
/// 전략별 유계 실행 이력과 베뉴별 카운터를 단독으로 소유한다.
/// `threshold()` / `slippage_tolerance()`는 값을 읽는 저렴한 호출이며
/// 재계산은 고정 주기당 최대 한 번만 일어난다.
pub struct AdaptiveController {
    config: ProfitabilityConfig,
    state: RwLock<AdaptiveState>,
}

impl AdaptiveController {
    pub fn new(config: ProfitabilityConfig) -> Self {
        let state = AdaptiveState {
            history: HashMap::new(),
            venues: HashMap::new(),
            min_profit_threshold: config.base_min_profit_eth,
            slippage_tolerance: config.base_slippage_tolerance_pct,
            last_recompute: Instant::now(),
        };
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    /// 체결 결과 기록 - 이력 링과 베뉴 카운터 갱신
    pub async fn record(&self, result: &ExecutionResult) {
        let mut state = self.state.write().await;

        let history = state.history.entry(result.strategy).or_default();
        history.push_back(result.clone());
        while history.len() > self.config.history_limit {
            history.pop_front();
        }

        for venue in [&result.buy_venue, &result.sell_venue] {
            let perf = state.venues.entry(venue.clone()).or_default();
            if result.is_filled() {
                perf.success_count += 1;
            } else {
                perf.failure_count += 1;
            }
            perf.total_slippage_pct += result.slippage_pct;
        }
    }

    /// 현재 최소 수익 임계값 (ETH)
    pub async fn threshold(&self) -> f64 {
        self.maybe_recompute().await;
        self.state.read().await.min_profit_threshold
    }

    /// 현재 슬리피지 허용치 (%)
    pub async fn slippage_tolerance(&self) -> f64 {
        self.maybe_recompute().await;
        self.state.read().await.slippage_tolerance
    }

    /// 베뉴 성과 계수 ∈ [0.5, 1.5] - 주문 크기 조정에 사용
    pub async fn venue_factor(&self, venue: &str) -> f64 {
        let state = self.state.read().await;
        let Some(perf) = state.venues.get(venue) else {
            return 1.0; // 이력이 없는 베뉴는 중립
        };
        if perf.executions() == 0 {
            return 1.0;
        }

        let success_component = perf.success_rate() * 1.5;
        let slippage_component = (1.0 - perf.avg_slippage_pct() / 20.0).max(0.5);

        ((success_component + slippage_component) / 2.0).clamp(0.5, 1.5)
    }

    /// 주기와 무관하게 즉시 재계산 (오케스트레이터의 주기 작업용)
    pub async fn recompute_now(&self) {
        let mut state = self.state.write().await;
        state.last_recompute = Instant::now();
        self.recompute_locked(&mut state);
    }

    async fn maybe_recompute(&self) {
        let interval = Duration::from_secs(self.config.recompute_interval_secs);
        {
            let state = self.state.read().await;
            if state.last_recompute.elapsed() < interval {
                return;
            }
        }

        let mut state = self.state.write().await;
        // 쓰기 잠금 획득 사이에 다른 호출이 먼저 재계산했을 수 있다
        if state.last_recompute.elapsed() < interval {
            return;
        }
        state.last_recompute = Instant::now();
        self.recompute_locked(&mut state);
    }

    /// 전략별 최근 이력을 집계해 임계값/허용치 재계산
    fn recompute_locked(&self, state: &mut AdaptiveState) {
        let mut slippages = Vec::new();
        let mut success_rates = Vec::new();
        let mut profit_ratios = Vec::new();

        for history in state.history.values() {
            if history.is_empty() {
                continue; // 이력 없는 전략은 집계에서 제외
            }

            let recent: Vec<&ExecutionResult> = history
                .iter()
                .rev()
                .take(self.config.recent_window)
                .collect();

            let avg_slippage =
                recent.iter().map(|r| r.slippage_pct).sum::<f64>() / recent.len() as f64;
            slippages.push(avg_slippage);

            let success_count = recent.iter().filter(|r| r.is_filled()).count();
            success_rates.push(success_count as f64 / recent.len() as f64);

            let avg_ratio =
                recent.iter().map(|r| r.profit_ratio()).sum::<f64>() / recent.len() as f64;
            profit_ratios.push(avg_ratio);
        }

        if slippages.is_empty() {
            debug!("재계산할 실행 이력 없음");
            return;
        }

        let avg_slippage = slippages.iter().sum::<f64>() / slippages.len() as f64;
        let avg_success = success_rates.iter().sum::<f64>() / success_rates.len() as f64;
        let avg_ratio = profit_ratios.iter().sum::<f64>() / profit_ratios.len() as f64;

        // 높은 슬리피지, 낮은 성공률, 낮은 실현률 → 더 높은 임계값
        let slippage_factor = 1.0 + avg_slippage / 10.0;
        let success_factor = 2.0 - avg_success;
        let profit_factor = 1.0 + (1.0 - avg_ratio);

        let combined = WEIGHT_SLIPPAGE * slippage_factor
            + WEIGHT_SUCCESS * success_factor
            + WEIGHT_PROFIT_RATIO * profit_factor;

        let base = self.config.base_min_profit_eth;
        state.min_profit_threshold = (base * combined).clamp(base * 0.5, base * 3.0);

        let base_slippage = self.config.base_slippage_tolerance_pct;
        state.slippage_tolerance =
            (avg_slippage * 1.5).clamp(base_slippage * 0.5, base_slippage * 3.0);

        info!(
            "🔧 파라미터 갱신: min_profit_threshold={:.6} ETH, slippage_tolerance={:.2}%",
            state.min_profit_threshold, state.slippage_tolerance
        );
    }

    pub async fn history_len(&self, strategy: StrategyId) -> usize {
        let state = self.state.read().await;
        state.history.get(&strategy).map(|h| h.len()).unwrap_or(0)
    }

    /// 최근 윈도우의 실현 수익 합 - 전략 선택 루프에서 사용
    pub async fn recent_realized_profit(&self, strategy: StrategyId) -> f64 {
        let state = self.state.read().await;
        state
            .history
            .get(&strategy)
            .map(|h| {
                h.iter()
                    .rev()
                    .take(self.config.recent_window)
                    .map(|r| r.realized_profit_eth)
                    .sum()
            })
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderStatus;
    use chrono::Utc;

    fn test_config() -> ProfitabilityConfig {
        ProfitabilityConfig {
            base_min_profit_eth: 0.01,
            base_slippage_tolerance_pct: 0.5,
            loan_premium_rate: 0.0009,
            safety_margin: 1.2,
            max_capital_fraction: 0.95,
            recompute_interval_secs: 3600,
            history_limit: 50,
            recent_window: 20,
        }
    }

    fn result(
        strategy: StrategyId,
        status: OrderStatus,
        expected: f64,
        realized: f64,
        slippage: f64,
    ) -> ExecutionResult {
        ExecutionResult {
            opportunity_id: uuid::Uuid::new_v4().to_string(),
            strategy,
            buy_venue: "uniswap_v2".to_string(),
            sell_venue: "sushiswap".to_string(),
            expected_profit_eth: expected,
            realized_profit_eth: realized,
            slippage_pct: slippage,
            latency_ms: 150,
            status,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_threshold_clamped_on_terrible_history() {
        let controller = AdaptiveController::new(test_config());

        // 전부 실패, 슬리피지 폭탄, 실현률 0 - 조합 계수가 상한을 뚫는다
        for _ in 0..20 {
            controller
                .record(&result(
                    StrategyId::DexArbitrage,
                    OrderStatus::Failed,
                    0.1,
                    0.0,
                    50.0,
                ))
                .await;
        }
        controller.recompute_now().await;

        let threshold = controller.threshold().await;
        assert!((threshold - 0.01 * 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_threshold_stays_within_bounds() {
        let controller = AdaptiveController::new(test_config());

        // 이상적인 이력 - 낮은 계수라도 하한 0.5×base 아래로 내려가지 않는다
        for _ in 0..20 {
            controller
                .record(&result(
                    StrategyId::FlashLoan,
                    OrderStatus::Filled,
                    0.1,
                    0.15,
                    0.0,
                ))
                .await;
        }
        controller.recompute_now().await;

        let threshold = controller.threshold().await;
        assert!(threshold >= 0.01 * 0.5);
        assert!(threshold <= 0.01 * 3.0);
    }

    #[tokio::test]
    async fn test_slippage_tolerance_follows_recent_mean() {
        let controller = AdaptiveController::new(test_config());

        // 평균 슬리피지 0.4% → 허용치 0.6% (1.5배, 클램프 범위 안)
        for _ in 0..20 {
            controller
                .record(&result(
                    StrategyId::DexArbitrage,
                    OrderStatus::Filled,
                    0.1,
                    0.09,
                    0.4,
                ))
                .await;
        }
        controller.recompute_now().await;

        let tolerance = controller.slippage_tolerance().await;
        assert!((tolerance - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_history_keeps_base_values() {
        let controller = AdaptiveController::new(test_config());
        controller.recompute_now().await;

        assert_eq!(controller.threshold().await, 0.01);
        assert_eq!(controller.slippage_tolerance().await, 0.5);
    }

    #[tokio::test]
    async fn test_empty_strategy_skipped_in_aggregate() {
        let controller = AdaptiveController::new(test_config());

        // DexArbitrage에만 이력 존재 - 나머지 전략이 집계를 깨지 않는다
        for _ in 0..10 {
            controller
                .record(&result(
                    StrategyId::DexArbitrage,
                    OrderStatus::Filled,
                    0.1,
                    0.09,
                    0.5,
                ))
                .await;
        }
        controller.recompute_now().await;

        let threshold = controller.threshold().await;
        assert!(threshold > 0.0);
        assert!(threshold >= 0.005 && threshold <= 0.03);
    }

    #[tokio::test]
    async fn test_history_ring_is_bounded() {
        let mut config = test_config();
        config.history_limit = 30;
        let controller = AdaptiveController::new(config);

        for _ in 0..100 {
            controller
                .record(&result(
                    StrategyId::MevShare,
                    OrderStatus::Filled,
                    0.1,
                    0.1,
                    0.1,
                ))
                .await;
        }
        assert_eq!(controller.history_len(StrategyId::MevShare).await, 30);
    }

    #[tokio::test]
    async fn test_reads_do_not_recompute_within_interval() {
        let controller = AdaptiveController::new(test_config());

        for _ in 0..20 {
            controller
                .record(&result(
                    StrategyId::DexArbitrage,
                    OrderStatus::Failed,
                    0.1,
                    0.0,
                    50.0,
                ))
                .await;
        }

        // 주기(1시간)가 지나지 않았으므로 읽기만으로는 재계산되지 않는다
        assert_eq!(controller.threshold().await, 0.01);
        assert_eq!(controller.threshold().await, 0.01);

        controller.recompute_now().await;
        assert!(controller.threshold().await > 0.01);
    }

    #[tokio::test]
    async fn test_venue_factor_bounds() {
        let controller = AdaptiveController::new(test_config());

        // 이력 없는 베뉴는 중립 계수
        assert_eq!(controller.venue_factor("unknown").await, 1.0);

        // 완벽한 베뉴: success=1.0 → 1.5, slippage=0 → 1.0, factor=1.25
        for _ in 0..10 {
            controller
                .record(&result(
                    StrategyId::DexArbitrage,
                    OrderStatus::Filled,
                    0.1,
                    0.1,
                    0.0,
                ))
                .await;
        }
        let good = controller.venue_factor("uniswap_v2").await;
        assert!((good - 1.25).abs() < 1e-9);

        // 최악의 베뉴도 하한 0.5 아래로 내려가지 않는다
        let controller = AdaptiveController::new(test_config());
        for _ in 0..10 {
            controller
                .record(&result(
                    StrategyId::DexArbitrage,
                    OrderStatus::Failed,
                    0.1,
                    0.0,
                    40.0,
                ))
                .await;
        }
        let bad = controller.venue_factor("uniswap_v2").await;
        assert_eq!(bad, 0.5);
    }

    #[tokio::test]
    async fn test_better_profit_realization_lowers_threshold() {
        // 실현률이 높을수록 profit factor가 낮아져 임계값이 내려간다
        let poor = AdaptiveController::new(test_config());
        let good = AdaptiveController::new(test_config());

        for _ in 0..20 {
            poor.record(&result(
                StrategyId::DexArbitrage,
                OrderStatus::Filled,
                0.02,
                0.005,
                0.5,
            ))
            .await;
            good.record(&result(
                StrategyId::DexArbitrage,
                OrderStatus::Filled,
                0.02,
                0.018,
                0.5,
            ))
            .await;
        }
        poor.recompute_now().await;
        good.recompute_now().await;

        assert!(good.threshold().await < poor.threshold().await);
    }
}
