use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ExecutionResult, Opportunity, PendingTransaction, StrategyId};

/// 모든 전략이 구현하는 공통 인터페이스
///
/// 기회 탐색 수학 자체는 이 크레이트 밖의 협력자다. 코어 파이프라인은
/// 이 seam을 통해 스캔/검증/실행만 위임하며, 오케스트레이터는 고정된
/// `StrategyId` 태그로 전략을 선택한다.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;

    fn is_enabled(&self) -> bool;

    /// 관심 트랜잭션에서 기회 후보 탐색
    async fn scan(&self, tx: &PendingTransaction) -> Result<Vec<Opportunity>>;

    /// 실행 직전 기회 재검증 - 발견 시점 가격은 이미 움직였을 수 있다
    async fn validate(&self, opportunity: &Opportunity) -> Result<bool>;

    /// 기회 실행 및 체결 결과 보고
    async fn execute(&self, opportunity: &Opportunity) -> Result<ExecutionResult>;
}
