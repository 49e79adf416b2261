pub mod rpc;

pub use rpc::{EvmClient, EvmConfig, GasSettings};
