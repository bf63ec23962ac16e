pub mod aes;
pub mod attack;
pub mod cbc;
pub mod ciphertext;
pub mod config;
pub mod error;
pub mod hash;
pub mod hex;
pub mod hmac;
pub mod oracle;
pub mod pkcs7;
pub mod sha256;

pub use attack::{decrypt_message, BlockDecryptionAttack, RecoveredBlock};
pub use ciphertext::{Ciphertext, TamperedCiphertext, BLOCK_SIZE};
pub use config::{AttackConfig, CancelToken, SearchStrategy};
pub use error::{AttackError, HexError, OracleError, PaddingError};
pub use oracle::http::HttpOracle;
pub use oracle::reference::MacPrefixOracle;
pub use oracle::{PaddingOracle, Verdict};
