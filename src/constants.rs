pub const API_VERSION: &str = "v1";

/// Seconds between escrow event poll ticks.
pub const POLL_INTERVAL_SECS: u64 = 2;

/// Deadline applied to every outbound RPC call.
pub const RPC_TIMEOUT_SECS: u64 = 30;

/// Interval between receipt checks while waiting for a settlement tx.
pub const RECEIPT_POLL_MILLIS: u64 = 1_500;

pub const CHAIN_ID_SEPOLIA: u64 = 11_155_111;
pub const CHAIN_ID_BASE_SEPOLIA: u64 = 84_532;

pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_SEPOLIA => "sepolia",
        CHAIN_ID_BASE_SEPOLIA => "base-sepolia",
        _ => "unknown",
    }
}
