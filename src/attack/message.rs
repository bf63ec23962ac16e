// Whole-message decryption by running the block attack on every block.
use rayon::prelude::*;
use tracing::info;

use crate::ciphertext::{Ciphertext, BLOCK_SIZE};
use crate::config::AttackConfig;
use crate::error::AttackError;
use crate::oracle::PaddingOracle;

use super::BlockDecryptionAttack;

/// Recovers the plaintext of every block after the IV, padding included.
///
/// Each block is attacked on the message cut off right after it, so that the
/// receiver's padding check always lands on the block under attack.
pub fn decrypt_message<O: PaddingOracle + ?Sized>(
    oracle: &O,
    ciphertext: &Ciphertext,
    config: &AttackConfig,
) -> Result<Vec<u8>, AttackError> {
    if !ciphertext.is_block_aligned() {
        return Err(AttackError::MisalignedCiphertext {
            len: ciphertext.len(),
        });
    }
    let n_blocks = ciphertext.n_blocks();
    if n_blocks < 2 {
        return Err(AttackError::BlockOutOfRange {
            block_idx: 1,
            n_blocks,
        });
    }
    info!(
        n_blocks,
        parallel_blocks = config.parallel_blocks,
        "decrypting message"
    );

    let decrypt_block = |block_idx: usize| -> Result<[u8; BLOCK_SIZE], AttackError> {
        let prefix = ciphertext.truncated(block_idx + 1);
        BlockDecryptionAttack::new(oracle, &prefix, block_idx)
            .with_config(config.clone())
            .decrypt()
    };
    let blocks = if config.parallel_blocks {
        (1..n_blocks)
            .into_par_iter()
            .map(decrypt_block)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        (1..n_blocks)
            .map(decrypt_block)
            .collect::<Result<Vec<_>, _>>()?
    };

    info!(n_blocks, "message decrypted");
    Ok(blocks.concat())
}
