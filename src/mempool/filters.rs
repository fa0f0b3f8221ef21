use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::core::utils::keccak256;
use tracing::debug;

use alloy::primitives::Address;

use crate::types::PendingTransaction;

/// (주소, 선택자) 매칭 시 호출되는 판정 함수
///
/// true를 반환하면 해당 트랜잭션이 관심 대상으로 표시된다.
#[async_trait]
pub trait MethodPredicate: Send + Sync {
    async fn matches(&self, tx: &PendingTransaction) -> bool;
}

/// 감시 주소 집합 + (주소, 메서드 선택자) 핸들러 테이블
///
/// 모니터링 시작 전에 한 번 구성되는 정적 테이블이다. 분류 핫패스에서는
/// 조회만 일어나며 잠금이 필요 없다.
pub struct InterestingFilter {
    watched_addresses: HashSet<Address>,
    method_handlers: HashMap<(Address, [u8; 4]), Arc<dyn MethodPredicate>>,
}

impl InterestingFilter {
    pub fn builder() -> InterestingFilterBuilder {
        InterestingFilterBuilder::new()
    }

    /// 트랜잭션 분류
    ///
    /// 빈 호출 데이터(단순 전송)는 건너뛴다. 수신자가 감시 주소면 즉시
    /// 관심 대상, 등록된 메서드 선택자면 핸들러 판정 결과를 따른다.
    pub async fn is_interesting(&self, tx: &PendingTransaction) -> bool {
        if tx.is_plain_transfer() {
            return false;
        }

        let Some(to) = tx.to else {
            return false;
        };

        if self.watched_addresses.contains(&to) {
            return true;
        }

        if let Some(selector) = tx.selector() {
            if let Some(handler) = self.method_handlers.get(&(to, selector)) {
                return handler.matches(tx).await;
            }
        }

        false
    }

    pub fn watched_count(&self) -> usize {
        self.watched_addresses.len()
    }

    pub fn handler_count(&self) -> usize {
        self.method_handlers.len()
    }
}

/// 전략들이 시작 시점에 관심 대상을 등록하는 빌더
pub struct InterestingFilterBuilder {
    watched_addresses: HashSet<Address>,
    method_handlers: HashMap<(Address, [u8; 4]), Arc<dyn MethodPredicate>>,
}

impl InterestingFilterBuilder {
    pub fn new() -> Self {
        Self {
            watched_addresses: HashSet::new(),
            method_handlers: HashMap::new(),
        }
    }

    /// 감시 주소 등록
    pub fn watch_address(mut self, address: Address) -> Self {
        self.watched_addresses.insert(address);
        self
    }

    /// 메서드 시그니처로 핸들러 등록 (선택자는 keccak 해시 앞 4바이트)
    pub fn on_method(
        self,
        address: Address,
        signature: &str,
        predicate: Arc<dyn MethodPredicate>,
    ) -> Self {
        let selector = method_selector(signature);
        debug!(
            "Registered method {} ({}) for contract {}",
            signature,
            hex::encode(selector),
            address
        );
        self.on_selector(address, selector, predicate)
    }

    /// 4바이트 선택자로 핸들러 직접 등록
    pub fn on_selector(
        mut self,
        address: Address,
        selector: [u8; 4],
        predicate: Arc<dyn MethodPredicate>,
    ) -> Self {
        self.method_handlers.insert((address, selector), predicate);
        self
    }

    pub fn build(self) -> InterestingFilter {
        InterestingFilter {
            watched_addresses: self.watched_addresses,
            method_handlers: self.method_handlers,
        }
    }
}

impl Default for InterestingFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 메서드 시그니처에서 4바이트 선택자 계산
pub fn method_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[0..4]);
    selector
}
