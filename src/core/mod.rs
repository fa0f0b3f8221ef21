pub mod adaptive;
pub mod event_bus;
pub mod gas_oracle;
pub mod orchestrator;
pub mod profitability;

pub use adaptive::AdaptiveController;
pub use event_bus::{Event, EventBus, EventHandler};
pub use gas_oracle::GasPriceOracle;
pub use orchestrator::{Orchestrator, SearcherContext};
pub use profitability::ProfitabilityEvaluator;
