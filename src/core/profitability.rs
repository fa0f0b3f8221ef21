use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ProfitabilityConfig;
use crate::core::adaptive::AdaptiveController;
use crate::core::event_bus::{Event, EventBus};
use crate::core::gas_oracle::GasPriceOracle;
use crate::types::{GasTier, Opportunity};

/// 수익성 판정 결과
///
/// "수익 없음"은 오류가 아니라 정상적인 부정 결과다.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitVerdict {
    pub accepted: bool,
    pub gross_profit_eth: f64,
    pub fee_cost_eth: f64,
    pub loan_premium_eth: f64,
    pub net_profit_eth: f64,
    /// 안전 마진 적용 후 순수익 - 임계값과 비교되는 값
    pub net_with_margin_eth: f64,
    pub threshold_eth: f64,
}

/// 순수 수익성 판정 함수
///
/// `net = gross − fee − loan_premium`, 비교용 수치는 수수료에 안전 마진
/// 배수를 적용한 `gross − fee × margin − loan_premium`이며 이 값이
/// 임계값을 넘어야 승인된다. 결정적이고 부수효과가 없다.
pub fn evaluate(
    gross_profit_eth: f64,
    notional_eth: f64,
    fee_cost_eth: f64,
    loan_premium_rate: f64,
    safety_margin: f64,
    threshold_eth: f64,
) -> ProfitVerdict {
    let loan_premium_eth = loan_premium_rate * notional_eth;
    let net_profit_eth = gross_profit_eth - fee_cost_eth - loan_premium_eth;
    let net_with_margin_eth = gross_profit_eth - fee_cost_eth * safety_margin - loan_premium_eth;

    ProfitVerdict {
        accepted: net_with_margin_eth > threshold_eth,
        gross_profit_eth,
        fee_cost_eth,
        loan_premium_eth,
        net_profit_eth,
        net_with_margin_eth,
        threshold_eth,
    }
}

/// 슬리피지를 고려한 주문 크기 계산
///
/// 배분은 스프레드에 따라 단조 증가하되 포화 곡선 `1 − e^(−spread)`을
/// 따른다. 베뉴 성과 계수는 [0.5, 1.5]로 클램프되고, 배분은 최소 유효
/// 크기(5%) 이상, `max_fraction` 이하로 제한된다.
pub fn optimal_position_size(
    spread_pct: f64,
    available_capital: f64,
    venue_factor: f64,
    max_fraction: f64,
) -> f64 {
    if spread_pct <= 0.0 || available_capital <= 0.0 {
        return 0.0;
    }

    let base_allocation = 1.0 - (-spread_pct).exp();
    let factor = venue_factor.clamp(0.5, 1.5);

    let mut allocation = (base_allocation * factor).min(max_fraction);
    if allocation > 0.0 {
        allocation = allocation.max(0.05);
    }

    available_capital * allocation
}

/// 가격 차이가 수수료를 제하고도 기회인지 사전 판별
pub fn is_spread_opportunity(
    buy_price: f64,
    sell_price: f64,
    min_spread_pct: f64,
    fees_pct: f64,
) -> (bool, f64) {
    if buy_price <= 0.0 || sell_price <= 0.0 {
        return (false, 0.0);
    }
    let spread_pct = ((sell_price - buy_price) / buy_price) * 100.0;
    (spread_pct > min_spread_pct + fees_pct, spread_pct)
}

/// 기회 평가기 - 순수 함수들에 현재 가스 추정치와 적응형 임계값을 연결
pub struct ProfitabilityEvaluator {
    config: ProfitabilityConfig,
    gas_oracle: Arc<GasPriceOracle>,
    adaptive: Arc<AdaptiveController>,
    event_bus: Arc<EventBus>,
}

impl ProfitabilityEvaluator {
    pub fn new(
        config: ProfitabilityConfig,
        gas_oracle: Arc<GasPriceOracle>,
        adaptive: Arc<AdaptiveController>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            gas_oracle,
            adaptive,
            event_bus,
        }
    }

    /// 기회 평가 - TTL 이내의 가스 추정치와 현재 적응형 임계값 사용
    pub async fn evaluate_opportunity(&self, opportunity: &Opportunity) -> ProfitVerdict {
        // 경쟁 번들은 빠른 포함이 전제이므로 fast 티어 기준으로 비용 산정
        let fee = self.gas_oracle.estimate(GasTier::Fast).await;
        let fee_cost_eth = fee.cost_eth(opportunity.gas_estimate);
        let threshold_eth = self.adaptive.threshold().await;

        let loan_premium_rate = if opportunity.uses_flashloan {
            self.config.loan_premium_rate
        } else {
            0.0
        };

        let verdict = evaluate(
            opportunity.expected_profit_eth,
            opportunity.notional_eth,
            fee_cost_eth,
            loan_premium_rate,
            self.config.safety_margin,
            threshold_eth,
        );

        if verdict.accepted {
            info!(
                "✅ 기회 승인: {} ({} → {}) 순수익 {:.6} ETH",
                opportunity.id,
                opportunity.buy_venue,
                opportunity.sell_venue,
                verdict.net_profit_eth
            );
            self.event_bus
                .publish_async(Event::OpportunityFound {
                    strategy: opportunity.strategy,
                    expected_profit_eth: verdict.net_profit_eth,
                })
                .await;
        } else {
            debug!(
                "📉 기회 기각: {} 마진 적용 순수익 {:.6} < 임계값 {:.6} ETH",
                opportunity.id, verdict.net_with_margin_eth, verdict.threshold_eth
            );
        }

        verdict
    }

    /// 두 베뉴의 성과 계수를 반영한 주문 크기
    pub async fn position_size(
        &self,
        spread_pct: f64,
        available_capital: f64,
        buy_venue: &str,
        sell_venue: &str,
    ) -> f64 {
        let factor = (self.adaptive.venue_factor(buy_venue).await
            + self.adaptive.venue_factor(sell_venue).await)
            / 2.0;
        optimal_position_size(
            spread_pct,
            available_capital,
            factor,
            self.config.max_capital_fraction,
        )
    }
}
