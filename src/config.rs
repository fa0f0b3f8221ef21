use serde::{Deserialize, Serialize};
use anyhow::Result;

use crate::constants;
use crate::types::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    /// RPC HTTP 엔드포인트 (트랜잭션/블록 조회)
    pub rpc_url: String,
    /// 펜딩 트랜잭션 피드 WebSocket 엔드포인트
    pub ws_url: String,
    pub block_time_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// 분류 배치 크기
    pub batch_size: usize,
    /// 분류 주기 (밀리초)
    pub batch_interval_ms: u64,
    /// 중복 제거 집합 용량 (초과 시 오래된 절반 제거)
    pub dedup_capacity: usize,
    /// keep-alive 간격 (초) - 이 시간 동안 수신이 없으면 ping 전송
    pub keepalive_secs: u64,
    /// ping 응답 대기 시간 (초)
    pub ping_timeout_secs: u64,
    /// 재연결 백오프 기본 지연 (초)
    pub reconnect_base_secs: u64,
    /// 재연결 백오프 상한 (초)
    pub reconnect_max_secs: u64,
    /// 최대 재연결 횟수 - 초과 시 모니터 중단
    pub max_reconnect_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// 티어별 추정치 TTL (초)
    pub cache_ttl_secs: u64,
    /// 샘플링할 최근 블록 수
    pub sample_blocks: u64,
    /// 가스 가격 하한 (wei)
    pub min_gas_price_wei: u64,
    /// 데이터 조회 실패 시 폴백 가스 가격 (wei)
    pub fallback_gas_price_wei: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitabilityConfig {
    /// 기본 최소 수익 임계값 (ETH)
    pub base_min_profit_eth: f64,
    /// 기본 슬리피지 허용치 (%)
    pub base_slippage_tolerance_pct: f64,
    /// 플래시론 수수료율 (예: 0.0009 = 9bps)
    pub loan_premium_rate: f64,
    /// 가스 비용에 적용하는 안전 마진 배수
    pub safety_margin: f64,
    /// 자본 대비 최대 배분 비율
    pub max_capital_fraction: f64,
    /// 파라미터 재계산 주기 (초)
    pub recompute_interval_secs: u64,
    /// 전략별 실행 이력 상한
    pub history_limit: usize,
    /// 재계산에 사용하는 최근 레코드 수
    pub recent_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// 번들을 제출할 릴레이 엔드포인트들
    pub endpoints: Vec<RelayEndpointConfig>,
    /// 릴레이 인증용 서명 키 (거래 지갑과 분리된 전용 키)
    pub auth_key: String,
    /// 릴레이별 제출 타임아웃 (초)
    pub submission_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEndpointConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// 성능 리포트 주기 (초)
    pub report_interval_secs: u64,
    /// 전략 선택 주기 (초)
    pub strategy_selection_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub mempool: MempoolConfig,
    pub gas: GasConfig,
    pub profitability: ProfitabilityConfig,
    pub relay: RelayConfig,
    pub monitoring: MonitoringConfig,
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 시작 시점 설정 검증 - 누락된 엔드포인트는 재시도 없이 즉시 실패
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.network.ws_url.is_empty() {
            return Err(PipelineError::Config("feed ws_url is empty".to_string()));
        }
        if self.network.rpc_url.is_empty() {
            return Err(PipelineError::Config("rpc_url is empty".to_string()));
        }
        if self.relay.endpoints.is_empty() {
            return Err(PipelineError::Config(
                "no relay endpoints configured".to_string(),
            ));
        }
        if self.profitability.safety_margin < 1.0 {
            return Err(PipelineError::Config(format!(
                "safety_margin must be >= 1.0, got {}",
                self.profitability.safety_margin
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                chain_id: 1,
                name: "mainnet".to_string(),
                rpc_url: "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string(),
                ws_url: "wss://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string(),
                block_time_secs: 12,
            },
            mempool: MempoolConfig {
                batch_size: constants::CLASSIFY_BATCH_SIZE,
                batch_interval_ms: 50,
                dedup_capacity: constants::DEDUP_CAPACITY,
                keepalive_secs: 30,
                ping_timeout_secs: 10,
                reconnect_base_secs: 5,
                reconnect_max_secs: 60,
                max_reconnect_retries: 10,
            },
            gas: GasConfig {
                cache_ttl_secs: 30,
                sample_blocks: 10,
                min_gas_price_wei: constants::MIN_GAS_PRICE_WEI,
                fallback_gas_price_wei: constants::FALLBACK_GAS_PRICE_WEI,
            },
            profitability: ProfitabilityConfig {
                base_min_profit_eth: 0.01,
                base_slippage_tolerance_pct: 0.5,
                loan_premium_rate: 0.0009,
                safety_margin: 1.2,
                max_capital_fraction: 0.95,
                recompute_interval_secs: 3600,
                history_limit: 200,
                recent_window: 20,
            },
            relay: RelayConfig {
                endpoints: vec![
                    RelayEndpointConfig {
                        name: "flashbots".to_string(),
                        url: constants::DEFAULT_FLASHBOTS_RELAY.to_string(),
                    },
                    RelayEndpointConfig {
                        name: "eden".to_string(),
                        url: constants::DEFAULT_EDEN_RELAY.to_string(),
                    },
                ],
                auth_key: String::new(),
                submission_timeout_secs: 10,
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
                report_interval_secs: 300,
                strategy_selection_interval_secs: 60,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mempool.batch_size, 20);
        assert_eq!(config.gas.cache_ttl_secs, 30);
        assert_eq!(config.relay.endpoints.len(), 2);
    }

    #[test]
    fn test_missing_relay_endpoints_rejected() {
        let mut config = Config::default();
        config.relay.endpoints.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let config = Config::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.profitability.base_min_profit_eth, 0.01);
        assert_eq!(parsed.mempool.max_reconnect_retries, 10);
    }
}
