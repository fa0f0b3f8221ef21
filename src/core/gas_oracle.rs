use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use alloy::primitives::U256;
use anyhow::Result;

use crate::blockchain::GasFeeSource;
use crate::config::GasConfig;
use crate::constants;
use crate::types::{FeeEstimate, GasTier};

/// 최근 블록 데이터 기반 가스 가격 오라클
///
/// 티어별로 추정치 하나를 캐싱하며 TTL이 지나면 게으르게 갱신한다.
/// 데이터 조회가 실패해도 호출자에게 오류를 올리지 않고 보수적인 폴백
/// 가격을 반환한다.
pub struct GasPriceOracle {
    source: Arc<dyn GasFeeSource>,
    config: GasConfig,
    cache: RwLock<HashMap<GasTier, FeeEstimate>>,
}

impl GasPriceOracle {
    pub fn new(source: Arc<dyn GasFeeSource>, config: GasConfig) -> Self {
        Self {
            source,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 티어별 가스 추정치 조회
    ///
    /// TTL 이내의 캐시가 있으면 그대로 반환한다 (재계산/I/O 없음).
    pub async fn estimate(&self, tier: GasTier) -> FeeEstimate {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&tier) {
                if cached.is_fresh() {
                    return cached.clone();
                }
            }
        }

        match self.compute_estimate(tier).await {
            Ok(estimate) => {
                debug!(
                    "⛽ 가스 추정 갱신 ({}): {:.2} gwei",
                    tier,
                    crate::types::wei_to_eth(estimate.price_wei) * 1e9
                );
                self.cache.write().await.insert(tier, estimate.clone());
                estimate
            }
            Err(e) => {
                // 폴백은 캐시하지 않는다 - 다음 호출에서 정상 소스를 다시 시도
                warn!("⚠️ 가스 데이터 조회 실패, 폴백 가격 사용: {}", e);
                FeeEstimate::new(
                    tier,
                    U256::from(self.config.fallback_gas_price_wei),
                    self.config.cache_ttl_secs,
                )
            }
        }
    }

    async fn compute_estimate(&self, tier: GasTier) -> Result<FeeEstimate> {
        let current = self.source.current_gas_price().await?;
        let mut samples = self
            .source
            .recent_gas_samples(self.config.sample_blocks)
            .await?;

        let price = if samples.len() >= constants::MIN_GAS_SAMPLES {
            samples.sort();
            let index = percentile_index(samples.len(), tier_percentile(tier));
            let mut price = samples[index];

            if tier == GasTier::Fast {
                price = price * U256::from(100 + constants::FAST_TIER_BUFFER_PCT)
                    / U256::from(100u64);
            }
            price
        } else {
            // 샘플 부족 - 현재 네트워크 가격에 티어 배수 적용
            match tier {
                GasTier::Fast => current * U256::from(12u64) / U256::from(10u64),
                GasTier::Balanced => current,
                GasTier::Economic => current * U256::from(9u64) / U256::from(10u64),
            }
        };

        let floor = U256::from(self.config.min_gas_price_wei);
        let price = if price < floor { floor } else { price };

        Ok(FeeEstimate::new(tier, price, self.config.cache_ttl_secs))
    }
}

fn tier_percentile(tier: GasTier) -> usize {
    match tier {
        GasTier::Fast => 90,
        GasTier::Balanced => 50,
        GasTier::Economic => 25,
    }
}

fn percentile_index(len: usize, percentile: usize) -> usize {
    ((len * percentile) / 100).min(len.saturating_sub(1))
}
