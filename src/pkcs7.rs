/// PKCS#7 padding and validation
use crate::aes::AES_BLOCK_SIZE;
use crate::error::PaddingError;

pub fn pkcs7_pad(bytes: &[u8], block_size: u8) -> Vec<u8> {
    let n_pad = block_size - (bytes.len() % block_size as usize) as u8;
    let mut out = Vec::with_capacity(bytes.len() + n_pad as usize);
    out.extend_from_slice(bytes);
    out.resize(bytes.len() + n_pad as usize, n_pad);
    out
}

pub fn pkcs7_unpad(bytes: &mut Vec<u8>) -> Result<(), PaddingError> {
    let n_pad = pkcs7_padding_len(bytes).ok_or(PaddingError::Invalid)?;
    bytes.truncate(bytes.len() - n_pad as usize);
    Ok(())
}

/// Length of the trailing PKCS#7 padding, if it is well formed.
///
/// Padding is never longer than one AES block.
pub fn pkcs7_padding_len(bytes: &[u8]) -> Option<u8> {
    let n_pad = *bytes.last()?;
    if n_pad == 0 || n_pad as usize > AES_BLOCK_SIZE || n_pad as usize > bytes.len() {
        return None;
    }
    let padded = &bytes[(bytes.len() - n_pad as usize)..];
    padded.iter().all(|&el| el == n_pad).then_some(n_pad)
}
