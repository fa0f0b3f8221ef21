// MevPipe - MEV opportunity pipeline library

pub mod blockchain;
pub mod config;
pub mod constants;
pub mod core;
pub mod flashbots;
pub mod mempool;
pub mod strategies;
pub mod types;

// Re-exports for convenience
pub use crate::config::Config;
pub use crate::core::{
    AdaptiveController, Event, EventBus, EventHandler, GasPriceOracle, Orchestrator,
    ProfitabilityEvaluator, SearcherContext,
};
pub use crate::flashbots::BundleExecutor;
pub use crate::mempool::{InterestingFilter, MempoolMonitor};
pub use crate::strategies::Strategy;
