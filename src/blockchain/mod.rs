pub mod rpc;

pub use rpc::{GasFeeSource, RpcClient, TransactionFetcher};
