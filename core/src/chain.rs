//! In-memory, append-only chain of sealed blocks

use crate::block::Block;
use crate::mining::{Miner, MiningError};
use crate::pow::ProofOfWork;
use crate::GENESIS_DATA;
use serde::Serialize;

/// Simple in-memory blockchain with proof-of-work
#[derive(Debug, Clone, Serialize)]
pub struct Blockchain {
    blocks: Vec<Block>,
    difficulty: u32,
}

impl Blockchain {
    /// Initialize a new blockchain with a freshly sealed genesis block.
    pub fn new(difficulty: u32) -> Result<Self, ChainError> {
        let genesis = Block::new(GENESIS_DATA, "", difficulty)?;
        Ok(Self::from_genesis(genesis, difficulty))
    }

    /// Same as [`Blockchain::new`], sealing the genesis block with `miner`.
    pub fn with_miner(miner: &Miner, difficulty: u32) -> Result<Self, ChainError> {
        let genesis = miner.seal_block(GENESIS_DATA, "", difficulty)?.block;
        Ok(Self::from_genesis(genesis, difficulty))
    }

    fn from_genesis(genesis: Block, difficulty: u32) -> Self {
        log::info!("Genesis block sealed: {}", hex::encode(genesis.hash()));
        Self {
            blocks: vec![genesis],
            difficulty,
        }
    }

    /// Seal and append a new block with the provided `data`.
    pub fn add_block(&mut self, data: impl Into<Vec<u8>>) -> Result<&Block, ChainError> {
        let block = Block::new(data, self.tip().hash().to_vec(), self.difficulty)?;
        self.append(block)
    }

    /// Same as [`Blockchain::add_block`], sealing with `miner`.
    pub fn add_block_with(
        &mut self,
        miner: &Miner,
        data: impl Into<Vec<u8>>,
    ) -> Result<&Block, ChainError> {
        let outcome = miner.seal_block(data, self.tip().hash().to_vec(), self.difficulty)?;
        self.append(outcome.block)
    }

    /// Appends a block sealed elsewhere after checking link, difficulty and proof.
    pub fn push(&mut self, block: Block) -> Result<&Block, ChainError> {
        let height = self.blocks.len();

        if block.prev_hash() != self.tip().hash() {
            return Err(ChainError::BrokenLink { height });
        }
        if block.difficulty() != self.difficulty {
            return Err(ChainError::DifficultyMismatch {
                height,
                expected: self.difficulty,
                found: block.difficulty(),
            });
        }
        if !block.is_valid() {
            return Err(ChainError::InvalidProof { height });
        }

        self.append(block)
    }

    fn append(&mut self, block: Block) -> Result<&Block, ChainError> {
        log::debug!(
            "Appending block {} with hash {}",
            self.blocks.len(),
            hex::encode(block.hash())
        );
        self.blocks.push(block);
        Ok(self.tip())
    }

    /// Return the last block in the chain.
    pub fn tip(&self) -> &Block {
        self.blocks
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain starts with its genesis block
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Validate the entire chain: genesis, linkage, difficulty and proof-of-work.
    pub fn verify(&self) -> Result<(), ChainError> {
        let pow = ProofOfWork::new(self.difficulty)?;

        if !self.genesis().is_genesis() {
            return Err(ChainError::InvalidGenesis);
        }

        for (height, block) in self.blocks.iter().enumerate() {
            if block.difficulty() != self.difficulty {
                return Err(ChainError::DifficultyMismatch {
                    height,
                    expected: self.difficulty,
                    found: block.difficulty(),
                });
            }
            if !pow.validate(block) {
                return Err(ChainError::InvalidProof { height });
            }
            if height > 0 && block.prev_hash() != self.blocks[height - 1].hash() {
                return Err(ChainError::BrokenLink { height });
            }
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }
}

impl<'a> IntoIterator for &'a Blockchain {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// Chain errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error("Block {height} does not link to its predecessor")]
    BrokenLink { height: usize },

    #[error("Block {height} fails proof-of-work validation")]
    InvalidProof { height: usize },

    #[error("Block {height} sealed at difficulty {found}, chain requires {expected}")]
    DifficultyMismatch {
        height: usize,
        expected: u32,
        found: u32,
    },

    #[error("First block is not a genesis block")]
    InvalidGenesis,
}
