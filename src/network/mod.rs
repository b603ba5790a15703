pub mod adapter;
pub mod behavior;
pub mod client;
pub mod transport;

pub use adapter::{HandleIds, P2PTransport, Transport};
pub use client::P2PClient;
