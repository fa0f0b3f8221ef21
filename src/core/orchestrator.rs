use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::adaptive::AdaptiveController;
use crate::core::event_bus::{topics, Event, EventBus, EventHandler};
use crate::core::gas_oracle::GasPriceOracle;
use crate::core::profitability::ProfitabilityEvaluator;
use crate::strategies::Strategy;
use crate::types::{PendingTransaction, StrategyId};

/// 컴포넌트들이 공유하는 컨텍스트
///
/// 모듈 전역 가변 상태 대신 오케스트레이터가 소유하고 각 컴포넌트
/// 생성자에 핸들로 전달된다.
pub struct SearcherContext {
    pub config: Arc<Config>,
    pub event_bus: Arc<EventBus>,
    pub gas_oracle: Arc<GasPriceOracle>,
    pub adaptive: Arc<AdaptiveController>,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorMetrics {
    pub trades_executed: u64,
    pub profitable_trades: u64,
    pub total_profit_eth: f64,
    pub opportunities_accepted: u64,
    pub opportunities_rejected: u64,
}

/// 전략 집합과 주기 루프(전략 선택, 성능 리포트)를 소유하는 오케스트레이터
pub struct Orchestrator {
    ctx: Arc<SearcherContext>,
    evaluator: Arc<ProfitabilityEvaluator>,
    strategies: HashMap<StrategyId, Arc<dyn Strategy>>,
    active_strategy: RwLock<Option<StrategyId>>,
    metrics: Arc<RwLock<OrchestratorMetrics>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        ctx: Arc<SearcherContext>,
        strategies: Vec<Arc<dyn Strategy>>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let evaluator = Arc::new(ProfitabilityEvaluator::new(
            ctx.config.profitability.clone(),
            Arc::clone(&ctx.gas_oracle),
            Arc::clone(&ctx.adaptive),
            Arc::clone(&ctx.event_bus),
        ));

        let strategies: HashMap<StrategyId, Arc<dyn Strategy>> =
            strategies.into_iter().map(|s| (s.id(), s)).collect();

        info!("🎯 오케스트레이터 초기화: 전략 {}개", strategies.len());

        Arc::new(Self {
            ctx,
            evaluator,
            strategies,
            active_strategy: RwLock::new(None),
            metrics: Arc::new(RwLock::new(OrchestratorMetrics::default())),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 이벤트 핸들러 등록 후 주기 루프 시작
    pub async fn start(self: &Arc<Self>) {
        info!("🚀 오케스트레이터 시작 중...");
        self.register_event_handlers().await;

        let selection = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.strategy_selection_loop().await })
        };
        let report = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.report_loop().await })
        };

        self.tasks.lock().await.extend([selection, report]);
        info!("✅ 오케스트레이터 시작됨");
    }

    /// 루프 중지 및 구독 정리
    pub async fn stop(&self) {
        info!("🛑 오케스트레이터 중지 중...");
        self.shutdown.cancel();

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("⚠️ 오케스트레이터 태스크가 유예 시간 내에 종료되지 않음");
            }
        }

        // 구독 해제가 핸들러 ↔ 오케스트레이터 참조 순환도 끊는다
        self.ctx.event_bus.clear_subscribers(None).await;
        self.log_performance_report().await;
        info!("✅ 오케스트레이터 중지됨");
    }

    pub async fn metrics(&self) -> OrchestratorMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn active_strategy(&self) -> Option<StrategyId> {
        *self.active_strategy.read().await
    }

    async fn register_event_handlers(self: &Arc<Self>) {
        let router: Arc<dyn EventHandler> = Arc::new(PipelineHandler {
            orchestrator: Arc::clone(self),
        });
        self.ctx
            .event_bus
            .subscribe(topics::INTERESTING_TRANSACTION, router)
            .await;

        let recorder: Arc<dyn EventHandler> = Arc::new(TradeRecorder {
            adaptive: Arc::clone(&self.ctx.adaptive),
            metrics: Arc::clone(&self.metrics),
        });
        self.ctx
            .event_bus
            .subscribe(topics::TRADE_EXECUTED, recorder)
            .await;

        let errors: Arc<dyn EventHandler> = Arc::new(ErrorLogger);
        self.ctx.event_bus.subscribe(topics::ERROR, errors).await;
    }

    /// 관심 트랜잭션 한 건을 파이프라인 전체에 흘린다:
    /// scan → 수익성 평가 → validate → execute → trade_executed 발행
    async fn process_transaction(&self, tx: &PendingTransaction) {
        for strategy in self.strategies.values() {
            if !strategy.is_enabled() {
                continue;
            }

            let opportunities = match strategy.scan(tx).await {
                Ok(opportunities) => opportunities,
                Err(e) => {
                    error!("❌ {} 전략 스캔 실패: {}", strategy.id(), e);
                    continue;
                }
            };

            for opportunity in opportunities {
                let verdict = self.evaluator.evaluate_opportunity(&opportunity).await;
                if !verdict.accepted {
                    self.metrics.write().await.opportunities_rejected += 1;
                    continue;
                }
                self.metrics.write().await.opportunities_accepted += 1;

                match strategy.validate(&opportunity).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("📉 기회 {} 재검증 실패 - 폐기", opportunity.id);
                        continue;
                    }
                    Err(e) => {
                        error!("❌ 기회 {} 검증 오류: {}", opportunity.id, e);
                        continue;
                    }
                }

                match strategy.execute(&opportunity).await {
                    Ok(result) => {
                        self.ctx
                            .event_bus
                            .publish_async(Event::TradeExecuted(result))
                            .await;
                    }
                    Err(e) => {
                        error!("❌ 기회 {} 실행 실패: {}", opportunity.id, e);
                        self.ctx
                            .event_bus
                            .publish_async(Event::Error {
                                component: "orchestrator".to_string(),
                                message: format!("execution failed: {}", e),
                            })
                            .await;
                    }
                }
            }
        }
    }

    /// 최근 실현 수익 기준으로 활성 전략 선택, 변경 시 이벤트 발행
    async fn run_strategy_selection_once(&self) {
        let mut best: Option<(StrategyId, f64)> = None;

        for id in self.strategies.keys() {
            let profit = self.ctx.adaptive.recent_realized_profit(*id).await;
            if profit <= 0.0 {
                continue;
            }
            if best.map(|(_, p)| profit > p).unwrap_or(true) {
                best = Some((*id, profit));
            }
        }

        let Some((best_id, profit)) = best else {
            return; // 이력이 없으면 현재 선택 유지
        };

        let mut active = self.active_strategy.write().await;
        if *active != Some(best_id) {
            *active = Some(best_id);
            info!(
                "🧠 활성 전략 변경: {} (최근 실현 수익 {:.6} ETH)",
                best_id, profit
            );
            self.ctx
                .event_bus
                .publish_async(Event::StrategyChanged {
                    strategy: best_id,
                    timestamp: Utc::now(),
                })
                .await;
        }
    }

    async fn strategy_selection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.ctx.config.monitoring.strategy_selection_interval_secs,
        ));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.run_strategy_selection_once().await;
        }
    }

    async fn report_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.ctx.config.monitoring.report_interval_secs,
        ));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.log_performance_report().await;
        }
    }

    async fn log_performance_report(&self) {
        let metrics = self.metrics.read().await.clone();
        let success_rate = if metrics.trades_executed > 0 {
            metrics.profitable_trades as f64 / metrics.trades_executed as f64 * 100.0
        } else {
            0.0
        };

        info!("📊 성능 리포트:");
        info!("  🔄 실행된 거래: {}", metrics.trades_executed);
        info!(
            "  ✅ 수익 거래: {} ({:.2}%)",
            metrics.profitable_trades, success_rate
        );
        info!("  💰 총 수익: {:.6} ETH", metrics.total_profit_eth);
        info!(
            "  🎯 기회 승인/기각: {}/{}",
            metrics.opportunities_accepted, metrics.opportunities_rejected
        );
        info!(
            "  🔧 현재 임계값: {:.6} ETH, 슬리피지 허용치: {:.2}%",
            self.ctx.adaptive.threshold().await,
            self.ctx.adaptive.slippage_tolerance().await
        );

        if let Some(active) = *self.active_strategy.read().await {
            info!("  🧠 활성 전략: {}", active);
        }
    }
}

/// interesting_transaction → 파이프라인 진입점
struct PipelineHandler {
    orchestrator: Arc<Orchestrator>,
}

#[async_trait]
impl EventHandler for PipelineHandler {
    async fn handle(&self, event: &Event) -> Result<()> {
        if let Event::InterestingTransaction { tx, .. } = event {
            self.orchestrator.process_transaction(tx).await;
        }
        Ok(())
    }
}

/// trade_executed → 컨트롤러 기록 + 지표 갱신
struct TradeRecorder {
    adaptive: Arc<AdaptiveController>,
    metrics: Arc<RwLock<OrchestratorMetrics>>,
}

#[async_trait]
impl EventHandler for TradeRecorder {
    async fn handle(&self, event: &Event) -> Result<()> {
        if let Event::TradeExecuted(result) = event {
            self.adaptive.record(result).await;

            let mut metrics = self.metrics.write().await;
            metrics.trades_executed += 1;
            if result.realized_profit_eth > 0.0 {
                metrics.profitable_trades += 1;
                metrics.total_profit_eth += result.realized_profit_eth;
            }

            info!(
                "💸 거래 체결: {} 수익 {:.6} ETH (상태: {:?})",
                result.strategy, result.realized_profit_eth, result.status
            );
        }
        Ok(())
    }
}

/// error 토픽 - 치명적 조건을 일반 기각과 구분해 남긴다
struct ErrorLogger;

#[async_trait]
impl EventHandler for ErrorLogger {
    async fn handle(&self, event: &Event) -> Result<()> {
        if let Event::Error { component, message } = event {
            error!("🚨 [{}] {}", component, message);
        }
        Ok(())
    }
}
