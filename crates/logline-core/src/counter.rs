//! Total-lines counter codec
//!
//! The counter lives under a reserved key as a fixed-width 8-byte
//! big-endian unsigned integer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CounterError;

/// Encoded width of the counter value in bytes
pub const COUNTER_WIDTH: usize = 8;

/// Number of distinct log-line keys ever created
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("{_0}")]
pub struct LineCounter(pub u64);

impl LineCounter {
    /// The value written by initialization
    pub const ZERO: LineCounter = LineCounter(0);

    /// Decode a counter from its stored representation
    pub fn decode(raw: &[u8]) -> Result<Self, CounterError> {
        let bytes = <[u8; COUNTER_WIDTH]>::try_from(raw).map_err(|_| {
            CounterError::InvalidLength {
                expected: COUNTER_WIDTH,
                actual: raw.len(),
            }
        })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }

    /// Encode the counter for storage
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_be_bytes())
    }

    /// Counter advanced by `by`
    pub fn advanced(&self, by: u64) -> Result<Self, CounterError> {
        self.0
            .checked_add(by)
            .map(Self)
            .ok_or(CounterError::Overflow(self.0))
    }

    /// Raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<LineCounter> for u64 {
    fn from(counter: LineCounter) -> Self {
        counter.0
    }
}
