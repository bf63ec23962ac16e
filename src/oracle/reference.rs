// A real padding oracle over MAC-prefixed AES-128-CBC records.
//
// A record is `HMAC-SHA256(message) || message`, PKCS#7 padded and encrypted
// under CBC with the IV sent as the first block. The receiver checks padding
// before the MAC and reports which check failed, which is the leak the
// attack feeds on.
use rand::RngCore;
use tracing::trace;

use crate::aes::{Aes128, Block, AES_BLOCK_SIZE};
use crate::cbc::{decrypt_aes_128_cbc_unchecked_padding, encrypt_aes_128_cbc};
use crate::ciphertext::Ciphertext;
use crate::error::OracleError;
use crate::hmac::{tags_equal, HmacSha256};
use crate::pkcs7::pkcs7_unpad;
use crate::sha256::SHA256_LEN;

use super::{PaddingOracle, Verdict};

pub const TAG_LEN: usize = SHA256_LEN;

#[derive(Debug, Clone)]
pub struct MacPrefixOracle {
    cipher: Aes128,
    mac_key: [u8; 32],
}

impl MacPrefixOracle {
    pub fn new(enc_key: &Block, mac_key: [u8; 32]) -> Self {
        Self {
            cipher: Aes128::new(enc_key),
            mac_key,
        }
    }

    pub fn from_rng(rng: &mut impl RngCore) -> Self {
        let mut enc_key = [0u8; AES_BLOCK_SIZE];
        let mut mac_key = [0u8; 32];
        rng.fill_bytes(&mut enc_key);
        rng.fill_bytes(&mut mac_key);
        Self::new(&enc_key, mac_key)
    }

    /// The unpadded record carried for `message`.
    pub fn record(&self, message: &[u8]) -> Vec<u8> {
        let tag = HmacSha256::digest_message(&self.mac_key, message);
        [tag.as_slice(), message].concat()
    }

    pub fn seal(&self, message: &[u8], iv: &Block) -> Ciphertext {
        let body = encrypt_aes_128_cbc(&self.record(message), &self.cipher, iv);
        Ciphertext::from_iv_and_body(iv, &body)
    }

    pub fn seal_with_rng(&self, message: &[u8], rng: &mut impl RngCore) -> Ciphertext {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        rng.fill_bytes(&mut iv);
        self.seal(message, &iv)
    }

    /// Decrypts and authenticates, returning the failing verdict on error.
    pub fn open(&self, ciphertext: &Ciphertext) -> Result<Vec<u8>, Verdict> {
        if !ciphertext.is_block_aligned() || ciphertext.n_blocks() < 2 {
            return Err(Verdict::PaddingInvalid);
        }
        let mut iv = [0u8; AES_BLOCK_SIZE];
        iv.copy_from_slice(ciphertext.block(0).ok_or(Verdict::PaddingInvalid)?);
        let body = &ciphertext.as_bytes()[AES_BLOCK_SIZE..];

        let mut record = decrypt_aes_128_cbc_unchecked_padding(body, &self.cipher, &iv);
        pkcs7_unpad(&mut record).map_err(|_| Verdict::PaddingInvalid)?;
        if record.len() < TAG_LEN {
            return Err(Verdict::MacInvalid);
        }

        let message = record.split_off(TAG_LEN);
        let expected = HmacSha256::digest_message(&self.mac_key, &message);
        if tags_equal(&record, &expected) {
            Ok(message)
        } else {
            Err(Verdict::MacInvalid)
        }
    }
}

impl PaddingOracle for MacPrefixOracle {
    fn query(&self, ciphertext: &Ciphertext) -> Result<Verdict, OracleError> {
        let verdict = match self.open(ciphertext) {
            Ok(_) => Verdict::Ok,
            Err(verdict) => verdict,
        };
        trace!(?verdict, len = ciphertext.len(), "reference oracle verdict");
        Ok(verdict)
    }
}
