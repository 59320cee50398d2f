//! CosmWasm-like chain family: LCD REST queries, `wasm-` prefixed tx
//! events with decimal string attributes, JSON execute messages.

mod adapter;
mod clients;
mod events;
mod types;

pub use adapter::CosmosAdapter;
pub use clients::CosmosClient;
