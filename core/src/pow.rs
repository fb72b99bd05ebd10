//! Proof-of-work: sealing search and validation

use crate::block::{Block, BlockHeader};
use crate::difficulty::Target;
use crate::mining::MiningError;
use crate::{Hash, MAX_NONCE};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Result of a successful search: the nonce and the digest it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    #[serde(deserialize_with = "crate::block::deserialize_nonce")]
    pub nonce: u64,
    #[serde(with = "hex::serde")]
    pub hash: Hash,
}

/// Proof-of-work context: a difficulty and the target derived from it
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target: Target,
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Result<Self, MiningError> {
        let target = Target::from_difficulty(difficulty)?;
        Ok(Self { target })
    }

    pub fn difficulty(&self) -> u32 {
        self.target.bits()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Canonical header bytes for a candidate nonce
    pub fn prepare_data(&self, header: &BlockHeader, nonce: u64) -> Vec<u8> {
        header.serialize(self.difficulty(), nonce)
    }

    /// Digest of the header for a candidate nonce
    pub fn hash_with_nonce(&self, header: &BlockHeader, nonce: u64) -> Hash {
        header.digest(self.difficulty(), nonce)
    }

    /// Searches nonces from zero upward until a digest falls below the target.
    ///
    /// Blocks until a nonce is found. Fails only if every nonce up to
    /// [`MAX_NONCE`] was tried without success.
    pub fn run(&self, header: &BlockHeader) -> Result<Seal, MiningError> {
        log::debug!(
            "Mining the block containing \"{}\"",
            String::from_utf8_lossy(header.data())
        );

        self.run_range(header, 0..=MAX_NONCE)
    }

    /// Same as [`ProofOfWork::run`], restricted to `nonces`.
    pub fn run_range(
        &self,
        header: &BlockHeader,
        nonces: RangeInclusive<u64>,
    ) -> Result<Seal, MiningError> {
        self.find_in(header, nonces)
            .ok_or(MiningError::SearchExhausted {
                difficulty: self.difficulty(),
            })
    }

    /// First nonce in `nonces` whose digest meets the target, if any
    pub(crate) fn find_in(
        &self,
        header: &BlockHeader,
        nonces: RangeInclusive<u64>,
    ) -> Option<Seal> {
        let start = *nonces.start();
        let end = (*nonces.end()).min(MAX_NONCE);

        (start..=end).find_map(|nonce| {
            let hash = self.hash_with_nonce(header, nonce);
            log::trace!("{}", hex::encode(hash));

            self.target
                .is_met_by(&hash)
                .then_some(Seal { nonce, hash })
        })
    }

    /// Re-checks a sealed block with its recorded nonce. No search.
    ///
    /// Valid iff the block was sealed under this difficulty with a nonce the
    /// search can produce, the fresh digest equals the stored hash, and that
    /// digest is below the target.
    pub fn validate(&self, block: &Block) -> bool {
        if block.difficulty() != self.difficulty() || block.nonce() > MAX_NONCE {
            return false;
        }

        let hash = self.hash_with_nonce(block.header(), block.nonce());
        hash == *block.hash() && self.target.is_met_by(&hash)
    }

    /// Target-only check used by the reference scheme: ignores the stored hash.
    pub fn meets_target(&self, block: &Block) -> bool {
        let hash = self.hash_with_nonce(block.header(), block.nonce());
        self.target.is_met_by(&hash)
    }
}

/// Validates a block against the difficulty it records.
///
/// Total over any block: an out-of-range recorded difficulty is just invalid.
pub fn validate(block: &Block) -> bool {
    match ProofOfWork::new(block.difficulty()) {
        Ok(pow) => pow.validate(block),
        Err(_) => false,
    }
}
