use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{BlockNumber, Transaction as EthersTransaction, H256};
use tracing::{info, warn};

use alloy::primitives::{Address, B256, U256};

use crate::types::PendingTransaction;

/// 트랜잭션 조회 seam - 멤풀 모니터가 해시로 전체 데이터를 가져올 때 사용
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    /// 해시로 트랜잭션 조회. 이미 멤풀에서 빠진 트랜잭션은 None
    async fn pending_transaction(&self, hash: B256) -> Result<Option<PendingTransaction>>;
}

/// 가스 데이터 seam - 가스 오라클의 수수료 추정에 사용
#[async_trait]
pub trait GasFeeSource: Send + Sync {
    /// 네트워크가 보고하는 현재 가스 가격
    async fn current_gas_price(&self) -> Result<U256>;

    /// 최근 `blocks`개 블록에 포함된 트랜잭션들의 가스 가격 샘플
    async fn recent_gas_samples(&self, blocks: u64) -> Result<Vec<U256>>;
}

/// 블록체인 RPC 클라이언트 (읽기 전용)
pub struct RpcClient {
    provider: Arc<Provider<Http>>,
}

impl RpcClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        info!("🔌 RPC 클라이언트 초기화: {}", rpc_url);

        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    pub async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    /// ethers 트랜잭션을 내부 PendingTransaction 타입으로 변환
    fn convert_transaction(tx: EthersTransaction) -> PendingTransaction {
        PendingTransaction {
            hash: B256::from_slice(&tx.hash.0),
            from: Address::from_slice(&tx.from.0),
            to: tx.to.map(|addr| Address::from_slice(&addr.0)),
            value: {
                let mut bytes = [0u8; 32];
                tx.value.to_big_endian(&mut bytes);
                U256::from_be_bytes(bytes)
            },
            gas_price: {
                let gas_price = tx.gas_price.unwrap_or_default();
                let mut bytes = [0u8; 32];
                gas_price.to_big_endian(&mut bytes);
                U256::from_be_bytes(bytes)
            },
            gas_limit: {
                let mut bytes = [0u8; 32];
                tx.gas.to_big_endian(&mut bytes);
                U256::from_be_bytes(bytes)
            },
            input: tx.input.to_vec(),
            nonce: tx.nonce.as_u64(),
            first_seen: Utc::now(),
        }
    }
}

#[async_trait]
impl TransactionFetcher for RpcClient {
    async fn pending_transaction(&self, hash: B256) -> Result<Option<PendingTransaction>> {
        let ethers_hash = H256::from_slice(hash.as_slice());
        match self.provider.get_transaction(ethers_hash).await? {
            Some(tx) => Ok(Some(Self::convert_transaction(tx))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl GasFeeSource for RpcClient {
    async fn current_gas_price(&self) -> Result<U256> {
        let price = self.provider.get_gas_price().await?;
        let mut bytes = [0u8; 32];
        price.to_big_endian(&mut bytes);
        Ok(U256::from_be_bytes(bytes))
    }

    async fn recent_gas_samples(&self, blocks: u64) -> Result<Vec<U256>> {
        let latest = self.provider.get_block_number().await?.as_u64();
        let mut samples = Vec::new();

        for offset in 0..blocks.min(latest) {
            let block_number = latest - offset;
            match self
                .provider
                .get_block_with_txs(BlockNumber::Number(block_number.into()))
                .await
            {
                Ok(Some(block)) => {
                    for tx in block.transactions {
                        if let Some(gas_price) = tx.gas_price {
                            let mut bytes = [0u8; 32];
                            gas_price.to_big_endian(&mut bytes);
                            samples.push(U256::from_be_bytes(bytes));
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    // 개별 블록 조회 실패는 샘플에서 빠질 뿐 치명적이지 않다
                    warn!("블록 {} 조회 실패: {}", block_number, e);
                }
            }
        }

        Ok(samples)
    }
}
