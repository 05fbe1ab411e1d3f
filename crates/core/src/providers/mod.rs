pub mod http;
pub mod registry;
pub mod traits;

// Source and oracle implementations
pub mod coingecko;
pub mod evm;
pub mod exchange;
pub mod simulated;
pub mod solana;
