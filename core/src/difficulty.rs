//! Difficulty bits and the 256-bit target derived from them

use crate::mining::MiningError;
use crate::{Hash, HASH_SIZE, MAX_DIFFICULTY};
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive};
use std::fmt;
use std::time::Duration;

/// Numeric threshold a digest must stay strictly below: `2^(256 - bits)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Difficulty bits the target was derived from
    bits: u32,
    /// Target as an unsigned big integer
    value: BigUint,
    /// Big-endian 32-byte form, `None` when the target is 2^256
    bytes: Option<Hash>,
}

impl Target {
    /// Derives the target for `bits` leading zero bits.
    pub fn from_difficulty(bits: u32) -> Result<Self, MiningError> {
        validate_difficulty(bits)?;

        let value = BigUint::one() << (MAX_DIFFICULTY - bits) as usize;
        let bytes = to_hash_bytes(&value);

        Ok(Self { bits, value, bytes })
    }

    /// Difficulty bits
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Target as a big integer
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// True iff `value < target`
    pub fn accepts(&self, value: &BigUint) -> bool {
        *value < self.value
    }

    /// True iff the digest, read as a big-endian unsigned integer, is below the target.
    ///
    /// Same predicate as [`Target::accepts`] without allocating: two equal-length
    /// big-endian byte strings order the same way as the integers they encode.
    pub fn is_met_by(&self, digest: &Hash) -> bool {
        match &self.bytes {
            Some(target) => digest < target,
            None => true,
        }
    }

    /// Expected number of attempts before a digest meets the target (`2^bits`)
    pub fn expected_attempts(&self) -> f64 {
        let space = BigUint::one() << MAX_DIFFICULTY as usize;
        (space / &self.value).to_f64().unwrap_or(f64::INFINITY)
    }

    /// Expected search time at the given hash rate (H/s)
    pub fn expected_time(&self, hash_rate: f64) -> Option<Duration> {
        if hash_rate <= 0.0 {
            return None;
        }

        let seconds = self.expected_attempts() / hash_rate;
        Duration::try_from_secs_f64(seconds).ok()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064x}", self.value)
    }
}

/// Checks that `bits` is in `0..=MAX_DIFFICULTY`
pub fn validate_difficulty(bits: u32) -> Result<(), MiningError> {
    if bits > MAX_DIFFICULTY {
        return Err(MiningError::InvalidDifficulty { bits });
    }

    Ok(())
}

fn to_hash_bytes(value: &BigUint) -> Option<Hash> {
    let raw = value.to_bytes_be();
    if raw.len() > HASH_SIZE {
        return None;
    }

    let mut bytes = [0u8; HASH_SIZE];
    bytes[HASH_SIZE - raw.len()..].copy_from_slice(&raw);
    Some(bytes)
}
