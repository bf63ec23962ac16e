use crate::hash::Hasher;
use crate::sha256::{Sha256, SHA256_LEN};

const BLOCK_SIZE: usize = 64;
const O_PAD: u8 = 0x5c;
const I_PAD: u8 = 0x36;

pub type HmacSha256 = Hmac<Sha256, SHA256_LEN>;

#[derive(Debug, Clone)]
pub struct Hmac<H: Hasher<N>, const N: usize> {
    inner_hasher: H,
    outer_hasher: H,
}

impl<H: Hasher<N>, const N: usize> Hmac<H, N> {
    pub fn new(key: &[u8]) -> Self {
        let key_block = Self::to_block_sized_key(key);

        let mut inner_hasher = H::default();
        inner_hasher.update(&key_block.map(|k| k ^ I_PAD));

        let mut outer_hasher = H::default();
        outer_hasher.update(&key_block.map(|k| k ^ O_PAD));

        Self {
            inner_hasher,
            outer_hasher,
        }
    }

    pub fn digest_message(key: &[u8], message: &[u8]) -> [u8; N] {
        let mut hmac = Self::new(key);
        hmac.update(message);
        hmac.digest()
    }

    pub fn update(&mut self, message: &[u8]) {
        self.inner_hasher.update(message);
    }

    pub fn digest(mut self) -> [u8; N] {
        self.outer_hasher.update(&self.inner_hasher.digest());
        self.outer_hasher.digest()
    }

    fn to_block_sized_key(var_len_key: &[u8]) -> [u8; BLOCK_SIZE] {
        let mut key = [0; BLOCK_SIZE];
        if var_len_key.len() > BLOCK_SIZE {
            key[..N].copy_from_slice(&H::digest_message(var_len_key));
        } else {
            key[..var_len_key.len()].copy_from_slice(var_len_key);
        }
        key
    }
}

/// Compares two tags without short-circuiting on the first mismatch.
pub fn tags_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
