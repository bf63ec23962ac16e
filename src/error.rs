use thiserror::Error;

/// Failure to obtain a verdict from an oracle.
///
/// This is never a verdict in disguise: a query that fails here says nothing
/// about the padding of the submitted ciphertext.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle answered with unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AttackError {
    #[error("oracle query failed: {0}")]
    Oracle(#[from] OracleError),

    #[error(
        "protocol inconsistency: no candidate for offset {offset} produced valid padding \
         (padding length {pad_len})"
    )]
    ProtocolInconsistency { offset: usize, pad_len: u8 },

    #[error(
        "ambiguous match: candidates {candidates:02x?} for offset {offset} all produced valid \
         padding (padding length {pad_len})"
    )]
    AmbiguousMatch {
        offset: usize,
        pad_len: u8,
        candidates: Vec<u8>,
    },

    #[error("block {block_idx} cannot be attacked in a ciphertext of {n_blocks} blocks")]
    BlockOutOfRange { block_idx: usize, n_blocks: usize },

    #[error("ciphertext length {len} is not a multiple of the block size")]
    MisalignedCiphertext { len: usize },

    #[error("plaintext accumulator misuse: {0}")]
    Accumulator(String),

    #[error("attack cancelled")]
    Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaddingError {
    #[error("invalid pkcs7 padding")]
    Invalid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexError {
    #[error("hex string has odd length {0}")]
    OddLength(usize),

    #[error("invalid hex digit pair '{0}'")]
    InvalidDigit(String),
}
