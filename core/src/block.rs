//! Block and BlockHeader structures

use crate::mining::MiningError;
use crate::pow::{self, ProofOfWork, Seal};
use crate::{Hash, DEFAULT_DIFFICULTY, MAX_NONCE};
use serde::{de, Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Committed contents of a block, everything except the seal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Unix timestamp in seconds
    timestamp: i64,
    /// Opaque payload
    #[serde(with = "hex::serde")]
    data: Vec<u8>,
    /// Hash of the previous block, empty for the genesis block
    #[serde(with = "hex::serde")]
    prev_hash: Vec<u8>,
}

/// Sealed block: header plus the nonce and hash found by proof-of-work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(flatten)]
    header: BlockHeader,
    #[serde(with = "hex::serde")]
    hash: Hash,
    #[serde(deserialize_with = "deserialize_nonce")]
    nonce: u64,
    /// Difficulty bits the block was sealed under
    difficulty: u32,
}

impl BlockHeader {
    /// Header stamped with the current time
    pub fn new(data: impl Into<Vec<u8>>, prev_hash: impl Into<Vec<u8>>) -> Self {
        Self::with_timestamp(data, prev_hash, Self::current_timestamp())
    }

    pub fn with_timestamp(
        data: impl Into<Vec<u8>>,
        prev_hash: impl Into<Vec<u8>>,
        timestamp: i64,
    ) -> Self {
        Self {
            timestamp,
            data: data.into(),
            prev_hash: prev_hash.into(),
        }
    }

    /// Current Unix timestamp in seconds
    pub fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64)
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn prev_hash(&self) -> &[u8] {
        &self.prev_hash
    }

    /// Canonical serialization hashed by proof-of-work.
    ///
    /// `prev_hash ‖ data ‖ timestamp ‖ difficulty ‖ nonce`, no delimiters,
    /// integers as 8-byte big-endian signed values. A nonce above
    /// [`MAX_NONCE`] has no signed encoding and saturates; proof-of-work
    /// never accepts such a nonce.
    pub fn serialize(&self, difficulty: u32, nonce: u64) -> Vec<u8> {
        let nonce = i64::try_from(nonce).unwrap_or(i64::MAX);

        let mut bytes = Vec::with_capacity(self.prev_hash.len() + self.data.len() + 24);
        bytes.extend_from_slice(&self.prev_hash);
        bytes.extend_from_slice(&self.data);
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&i64::from(difficulty).to_be_bytes());
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes
    }

    /// SHA-256 of the canonical serialization
    pub fn digest(&self, difficulty: u32, nonce: u64) -> Hash {
        Sha256::digest(self.serialize(difficulty, nonce)).into()
    }
}

impl Block {
    /// Seals a new block on top of `prev_hash` at the given difficulty.
    ///
    /// Blocks the caller for the whole nonce search.
    pub fn new(
        data: impl Into<Vec<u8>>,
        prev_hash: impl Into<Vec<u8>>,
        difficulty: u32,
    ) -> Result<Self, MiningError> {
        Self::seal(BlockHeader::new(data, prev_hash), difficulty)
    }

    /// Seals a new block at [`DEFAULT_DIFFICULTY`]
    pub fn create(
        data: impl Into<Vec<u8>>,
        prev_hash: impl Into<Vec<u8>>,
    ) -> Result<Self, MiningError> {
        Self::new(data, prev_hash, DEFAULT_DIFFICULTY)
    }

    /// Seals a new block with a fixed timestamp
    pub fn with_timestamp(
        data: impl Into<Vec<u8>>,
        prev_hash: impl Into<Vec<u8>>,
        timestamp: i64,
        difficulty: u32,
    ) -> Result<Self, MiningError> {
        Self::seal(
            BlockHeader::with_timestamp(data, prev_hash, timestamp),
            difficulty,
        )
    }

    /// Runs the single-threaded search over `header`
    pub fn seal(header: BlockHeader, difficulty: u32) -> Result<Self, MiningError> {
        let seal = ProofOfWork::new(difficulty)?.run(&header)?;
        Ok(Self::from_seal(header, difficulty, seal))
    }

    pub(crate) fn from_seal(header: BlockHeader, difficulty: u32, seal: Seal) -> Self {
        Self {
            header,
            hash: seal.hash,
            nonce: seal.nonce,
            difficulty,
        }
    }

    /// Assembles a block from raw fields without any search.
    ///
    /// The result may well be invalid; use it for blocks obtained elsewhere
    /// and check them with [`Block::is_valid`].
    pub fn from_parts(
        timestamp: i64,
        data: Vec<u8>,
        prev_hash: Vec<u8>,
        hash: Hash,
        nonce: u64,
        difficulty: u32,
    ) -> Self {
        Self {
            header: BlockHeader {
                timestamp,
                data,
                prev_hash,
            },
            hash,
            nonce,
            difficulty,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.header.data
    }

    pub fn prev_hash(&self) -> &[u8] {
        &self.header.prev_hash
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// True for the first block of a chain
    pub fn is_genesis(&self) -> bool {
        self.header.prev_hash.is_empty()
    }

    /// Canonical header bytes with the recorded nonce
    pub fn header_bytes(&self) -> Vec<u8> {
        self.header.serialize(self.difficulty, self.nonce)
    }

    /// Fresh digest of the header with the recorded nonce
    pub fn compute_hash(&self) -> Hash {
        self.header.digest(self.difficulty, self.nonce)
    }

    /// Proof-of-work validity, see [`ProofOfWork::validate`]
    pub fn is_valid(&self) -> bool {
        pow::validate(self)
    }
}

/// Rejects nonces outside `0..=MAX_NONCE` instead of letting them wrap
pub(crate) fn deserialize_nonce<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let nonce = u64::deserialize(deserializer)?;
    if nonce > MAX_NONCE {
        return Err(de::Error::custom(format!(
            "nonce {nonce} out of range (max: {MAX_NONCE})"
        )));
    }
    Ok(nonce)
}

/// Human-readable report, not a wire format
impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prev. hash: {}", hex::encode(self.prev_hash()))?;
        writeln!(f, "Data: {}", String::from_utf8_lossy(self.data()))?;
        writeln!(f, "Hash: {}", hex::encode(self.hash))?;
        write!(f, "PoW: {}", self.is_valid())
    }
}
