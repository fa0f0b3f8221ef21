pub mod bundle;
pub mod client;
pub mod executor;

pub use bundle::{call_bundle_body, extract_revert_reason, send_bundle_body};
pub use client::{flashbots_signature, HttpRelayTransport, RelayTransport};
pub use executor::{BundleExecutor, SimulationOutcome};
