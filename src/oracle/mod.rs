pub mod http;
pub mod reference;

use crate::ciphertext::Ciphertext;
use crate::error::OracleError;

/// What a padding oracle reveals about a submitted ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Valid padding and a valid MAC: indistinguishable from the genuine message.
    Ok,
    /// The decrypted padding is not well formed.
    PaddingInvalid,
    /// The padding is well formed but authentication fails.
    MacInvalid,
}

pub trait PaddingOracle: Sync {
    fn query(&self, ciphertext: &Ciphertext) -> Result<Verdict, OracleError>;
}

impl<F> PaddingOracle for F
where
    F: Fn(&Ciphertext) -> Result<Verdict, OracleError> + Sync,
{
    fn query(&self, ciphertext: &Ciphertext) -> Result<Verdict, OracleError> {
        self(ciphertext)
    }
}
