//! Hashchain Core - hash-chained blocks sealed by proof-of-work

pub mod block;
pub mod chain;
pub mod config;
pub mod difficulty;
pub mod mining;
pub mod pow;

// Main types
pub use block::{Block, BlockHeader};
pub use chain::{Blockchain, ChainError};
pub use config::{ConfigError, MinerConfig, MinerConfigBuilder};
pub use difficulty::Target;
pub use mining::{Miner, MiningError, MiningOutcome, SearchStats};
pub use pow::{ProofOfWork, Seal};

/// Difficulty used when the caller does not pick one (2^24 attempts expected)
pub const DEFAULT_DIFFICULTY: u32 = 24;

/// Highest accepted difficulty: target 2^0, only the all-zero digest passes
pub const MAX_DIFFICULTY: u32 = 256;

/// Largest nonce the search may try (nonces are encoded as signed 64-bit)
pub const MAX_NONCE: u64 = i64::MAX as u64;

/// Size of a SHA-256 digest in bytes
pub const HASH_SIZE: usize = 32;

/// Payload of the first block of every chain
pub const GENESIS_DATA: &str = "Genesis Block";

/// SHA-256 digest
pub type Hash = [u8; HASH_SIZE];
