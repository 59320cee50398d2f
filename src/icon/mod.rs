//! ICON-like chain family: JSON-RPC v3, event logs carried as
//! `{indexed, data}` string arrays matched by full signature, hex-string
//! integers, JSON-bytes calldata convention.

mod adapter;
mod clients;
mod events;
mod types;

pub use adapter::IconAdapter;
pub use clients::IconClient;
