//! EVM-like chain family: ABI-encoded logs matched by event name,
//! unsigned-integer sequence numbers, RLP calldata convention.

mod adapter;
mod clients;
mod events;
mod types;

pub use adapter::EvmAdapter;
pub use clients::RpcClient;
