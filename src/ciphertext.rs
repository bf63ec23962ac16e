// Immutable, block-addressable CBC ciphertext.
//
// Block 0 is the IV. Offsets are absolute into the whole message; the type
// does not enforce block alignment, the attack checks it before use.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::HexError;
use crate::hex::{bytes_to_hex, hex_to_bytes};

pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    bytes: Arc<[u8]>,
}

impl Ciphertext {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_iv_and_body(iv: &[u8; BLOCK_SIZE], body: &[u8]) -> Self {
        Self::new([iv.as_slice(), body].concat())
    }

    pub fn from_hex(hex: &str) -> Result<Self, HexError> {
        hex_to_bytes(hex).map(Self::new)
    }

    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn n_blocks(&self) -> usize {
        self.bytes.len() / BLOCK_SIZE
    }

    pub fn is_block_aligned(&self) -> bool {
        self.bytes.len() % BLOCK_SIZE == 0
    }

    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    pub fn block(&self, block_idx: usize) -> Option<&[u8]> {
        let start = block_idx.checked_mul(BLOCK_SIZE)?;
        self.bytes.get(start..start.checked_add(BLOCK_SIZE)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The ciphertext made of blocks `0..n_blocks`.
    ///
    /// Cutting a message after a block moves the receiver's padding check
    /// onto that block.
    pub fn truncated(&self, n_blocks: usize) -> Self {
        let end = (n_blocks * BLOCK_SIZE).min(self.bytes.len());
        Self::new(&self.bytes[..end])
    }

    pub fn tamper(&self) -> TamperedCiphertext<'_> {
        TamperedCiphertext {
            original: self,
            overrides: BTreeMap::new(),
        }
    }
}

impl AsRef<[u8]> for Ciphertext {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Sparse set of byte overrides on top of an untouched original.
///
/// Building produces a fresh [`Ciphertext`]; the original is only read.
#[derive(Debug, Clone)]
pub struct TamperedCiphertext<'a> {
    original: &'a Ciphertext,
    overrides: BTreeMap<usize, u8>,
}

impl TamperedCiphertext<'_> {
    /// Replaces the byte at `offset`. Out-of-range offsets are ignored.
    pub fn set(mut self, offset: usize, value: u8) -> Self {
        if offset < self.original.len() {
            self.overrides.insert(offset, value);
        }
        self
    }

    /// XORs `mask` into the byte at `offset`, stacking with earlier overrides.
    pub fn xor(self, offset: usize, mask: u8) -> Self {
        match self.current(offset) {
            Some(current) => self.set(offset, current ^ mask),
            None => self,
        }
    }

    pub fn current(&self, offset: usize) -> Option<u8> {
        self.overrides
            .get(&offset)
            .copied()
            .or_else(|| self.original.byte(offset))
    }

    pub fn build(&self) -> Ciphertext {
        let mut bytes = self.original.as_bytes().to_vec();
        for (&offset, &value) in &self.overrides {
            bytes[offset] = value;
        }
        Ciphertext::new(bytes)
    }
}
