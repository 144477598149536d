pub mod client;
pub mod escrow;

pub use client::BlockchainClient;
pub use escrow::Escrow;
