use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mevpipe::blockchain::RpcClient;
use mevpipe::config::Config;
use mevpipe::constants;
use mevpipe::core::{AdaptiveController, EventBus, GasPriceOracle, Orchestrator, SearcherContext};
use mevpipe::mempool::{InterestingFilter, MempoolMonitor};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("mevpipe")
        .version(env!("CARGO_PKG_VERSION"))
        .author("MevPipe Team <team@mevpipe.dev>")
        .about("🦀 이벤트 기반 MEV 기회 파이프라인")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").unwrap();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("mevpipe={}", log_level))),
        )
        .init();

    dotenvy::dotenv().ok();

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match Config::load(config_path).await {
        Ok(config) => {
            info!("⚙️ 설정 로드됨: {}", config_path);
            config
        }
        Err(e) => {
            warn!("⚠️ 설정 파일 로드 실패 ({}) - 기본값 사용", e);
            let config = Config::default();
            config.validate().context("default config invalid")?;
            config
        }
    };
    let config = Arc::new(config);

    info!("🦀 MevPipe 시작 (체인: {})", config.network.name);

    // 공유 인프라 구성
    let rpc = Arc::new(RpcClient::new(&config.network.rpc_url)?);
    let event_bus = Arc::new(EventBus::new());
    let gas_oracle = Arc::new(GasPriceOracle::new(rpc.clone(), config.gas.clone()));
    let adaptive = Arc::new(AdaptiveController::new(config.profitability.clone()));

    let ctx = Arc::new(SearcherContext {
        config: Arc::clone(&config),
        event_bus: Arc::clone(&event_bus),
        gas_oracle,
        adaptive,
    });

    // 전략은 외부 협력자다 - 등록된 전략이 없으면 관찰 모드로만 동작한다
    let orchestrator = Orchestrator::new(Arc::clone(&ctx), Vec::new(), CancellationToken::new());

    // 기본 필터: 주요 DEX 라우터 감시 (전략 등록 시 확장된다)
    let mut filter_builder = InterestingFilter::builder();
    for address in constants::dex_router_addresses() {
        filter_builder = filter_builder.watch_address(address);
    }
    let filter = Arc::new(filter_builder.build());

    let monitor = MempoolMonitor::new(
        config.mempool.clone(),
        config.network.ws_url.clone(),
        rpc,
        filter,
        Arc::clone(&event_bus),
        CancellationToken::new(),
    );

    orchestrator.start().await;
    monitor.start().await;

    info!("✅ 파이프라인 가동 중 - Ctrl+C로 종료");
    tokio::signal::ctrl_c().await?;
    info!("🛑 종료 신호 수신됨");

    monitor.stop().await;
    orchestrator.stop().await;

    info!("👋 MevPipe 종료됨");
    Ok(())
}
