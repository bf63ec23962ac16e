/// AES-128 in CBC mode
use crate::aes::{Aes128, Block, AES_BLOCK_SIZE};
use crate::pkcs7::pkcs7_pad;

/// Pads `plaintext` with PKCS#7 and encrypts it, chaining from `iv`.
///
/// The IV is not included in the output.
pub fn encrypt_aes_128_cbc(plaintext: &[u8], cipher: &Aes128, iv: &Block) -> Vec<u8> {
    let padded = pkcs7_pad(plaintext, AES_BLOCK_SIZE as u8);
    let mut ciphertext = Vec::with_capacity(padded.len());

    let mut last_block = *iv;
    for plaintext_block in padded.chunks_exact(AES_BLOCK_SIZE) {
        let mut message_buf = last_block;
        message_buf
            .iter_mut()
            .zip(plaintext_block)
            .for_each(|(m, p)| *m ^= p);
        last_block = cipher.encrypt_block(&message_buf);
        ciphertext.extend_from_slice(&last_block);
    }
    ciphertext
}

/// Decrypts whole blocks of `ciphertext`, leaving any padding in place.
///
/// Trailing bytes that do not fill a block are ignored; callers validate
/// alignment first.
pub fn decrypt_aes_128_cbc_unchecked_padding(
    ciphertext: &[u8],
    cipher: &Aes128,
    iv: &Block,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(ciphertext.len());

    let mut last_block = *iv;
    for ciphertext_block in ciphertext.chunks_exact(AES_BLOCK_SIZE) {
        let mut ciphertext_buf = [0u8; AES_BLOCK_SIZE];
        ciphertext_buf.copy_from_slice(ciphertext_block);
        let decrypted = cipher.decrypt_block(&ciphertext_buf);
        message.extend(decrypted.iter().zip(last_block).map(|(d, c)| d ^ c));
        last_block = ciphertext_buf;
    }
    message
}
