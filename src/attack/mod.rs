// Padding oracle attack on a single CBC block.
//
// CBC decryption computes
//
//                 P_i = D(C_i) ⊕ C_{i-1}.
//
// D(C_i) is the 'intermediate value' I_i. It does not depend on C_{i-1}, so
// changing a byte of C_{i-1} changes exactly the same byte of P_i and
// nothing else in that block.
//
// To recover the last byte of P_i we vary the last byte of C_{i-1} until the
// receiver accepts the padding. Accepted padding of length 1 means the
// tampered byte C'_{i-1}[15] satisfies
//
//                 I_i[15] ⊕ C'_{i-1}[15] = \x01,
//
// so I_i[15] = \x01 ⊕ C'_{i-1}[15] and P_i[15] = I_i[15] ⊕ C_{i-1}[15].
//
// For the second-to-last byte we want padding '\x02\x02'. We already know
// P_i[15], so XORing C_{i-1}[15] with P_i[15] ⊕ \x02 forces that position to
// decrypt to \x02, and we search C_{i-1}[14] the same way. Each step forces
// one more trailing byte, until the whole block is known.
//
// The receiver checks padding before authenticating, so an accepted padding
// shows up as a MAC failure. If the untouched byte is the only one with
// valid padding, the receiver answers with a plain success instead; the
// original byte is then the forged one.
mod message;
mod search;

pub use message::decrypt_message;

use tracing::{debug, info};

use crate::ciphertext::{Ciphertext, TamperedCiphertext, BLOCK_SIZE};
use crate::config::AttackConfig;
use crate::error::AttackError;
use crate::oracle::PaddingOracle;

use search::{find_forged_byte, Probe};

/// Plaintext of one block, recovered from the last byte towards the first.
///
/// Positions only ever go from unknown to known, and only the byte directly
/// before the known suffix can be filled next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredBlock {
    bytes: [Option<u8>; BLOCK_SIZE],
}

impl RecoveredBlock {
    pub fn new() -> Self {
        Self {
            bytes: [None; BLOCK_SIZE],
        }
    }

    /// A block whose trailing bytes are already known.
    pub fn with_suffix(suffix: &[u8]) -> Result<Self, AttackError> {
        if suffix.len() > BLOCK_SIZE {
            return Err(AttackError::Accumulator(format!(
                "suffix of {} bytes does not fit in a block",
                suffix.len()
            )));
        }
        let mut block = Self::new();
        for &byte in suffix.iter().rev() {
            block.fill(BLOCK_SIZE - 1 - block.filled(), byte)?;
        }
        Ok(block)
    }

    /// Number of known bytes at the end of the block.
    pub fn filled(&self) -> usize {
        self.bytes.iter().rev().take_while(|b| b.is_some()).count()
    }

    pub fn get(&self, idx: usize) -> Option<u8> {
        self.bytes.get(idx).copied().flatten()
    }

    pub fn fill(&mut self, idx: usize, byte: u8) -> Result<(), AttackError> {
        let next = BLOCK_SIZE
            .checked_sub(self.filled() + 1)
            .ok_or_else(|| AttackError::Accumulator("block is already complete".to_string()))?;
        if idx != next {
            return Err(AttackError::Accumulator(format!(
                "position {idx} filled out of order, expected position {next}"
            )));
        }
        self.bytes[idx] = Some(byte);
        Ok(())
    }

    pub fn into_bytes(self) -> Result<[u8; BLOCK_SIZE], AttackError> {
        let mut out = [0u8; BLOCK_SIZE];
        for (o, b) in out.iter_mut().zip(self.bytes) {
            *o = b.ok_or_else(|| {
                AttackError::Accumulator("block read before it was fully recovered".to_string())
            })?;
        }
        Ok(out)
    }
}

impl Default for RecoveredBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Recovers the plaintext of one block by tampering with the block before it.
///
/// The receiver behind `oracle` checks the padding of the last block it is
/// given, so `block_idx` should be the final block of `ciphertext`;
/// [`decrypt_message`] truncates the message to arrange this for every block.
pub struct BlockDecryptionAttack<'a, O: PaddingOracle + ?Sized> {
    oracle: &'a O,
    original: &'a Ciphertext,
    block_idx: usize,
    /// Absolute offset of the target block's last byte, if it is addressable.
    last_byte: Option<usize>,
    plaintext: RecoveredBlock,
    config: AttackConfig,
}

impl<'a, O: PaddingOracle + ?Sized> BlockDecryptionAttack<'a, O> {
    pub fn new(oracle: &'a O, original: &'a Ciphertext, block_idx: usize) -> Self {
        Self {
            oracle,
            original,
            block_idx,
            last_byte: block_idx
                .checked_mul(BLOCK_SIZE)
                .and_then(|start| start.checked_add(BLOCK_SIZE - 1)),
            plaintext: RecoveredBlock::new(),
            config: AttackConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AttackConfig) -> Self {
        self.config = config;
        self
    }

    /// Resumes from trailing plaintext bytes that are already known.
    pub fn with_recovered(mut self, recovered: RecoveredBlock) -> Self {
        self.plaintext = recovered;
        self
    }

    pub fn recovered(&self) -> &RecoveredBlock {
        &self.plaintext
    }

    pub fn decrypt(mut self) -> Result<[u8; BLOCK_SIZE], AttackError> {
        self.validate()?;
        info!(
            block_idx = self.block_idx,
            known = self.plaintext.filled(),
            strategy = ?self.config.strategy,
            "decrypting block"
        );

        // Each padding length relies on the bytes recovered before it.
        while self.plaintext.filled() < BLOCK_SIZE {
            self.decrypt_padding(self.plaintext.filled() as u8 + 1)?;
        }

        self.plaintext.into_bytes()
    }

    /// Recovers the byte just before the known suffix and returns it.
    pub fn recover_next(&mut self) -> Result<u8, AttackError> {
        self.validate()?;
        let filled = self.plaintext.filled();
        if filled == BLOCK_SIZE {
            return Err(AttackError::Accumulator(
                "block is already complete".to_string(),
            ));
        }
        self.decrypt_padding(filled as u8 + 1)
    }

    fn validate(&self) -> Result<(), AttackError> {
        if !self.original.is_block_aligned() {
            return Err(AttackError::MisalignedCiphertext {
                len: self.original.len(),
            });
        }
        self.last_byte().map(|_| ())
    }

    fn last_byte(&self) -> Result<usize, AttackError> {
        let n_blocks = self.original.n_blocks();
        match self.last_byte {
            Some(last_byte) if self.block_idx != 0 && self.block_idx < n_blocks => Ok(last_byte),
            _ => Err(AttackError::BlockOutOfRange {
                block_idx: self.block_idx,
                n_blocks,
            }),
        }
    }

    fn decrypt_padding(&mut self, pad_len: u8) -> Result<u8, AttackError> {
        let tampered = self.force_padding(pad_len)?;

        let offset = self.last_byte()? - pad_len as usize - (BLOCK_SIZE - 1);
        let original_byte = self.original.as_bytes()[offset];

        let probe = Probe::new(self.oracle, &tampered, offset, pad_len, &self.config);
        let forged_byte = find_forged_byte(&probe, original_byte, self.config.strategy)?;

        let intermediate = pad_len ^ forged_byte;
        let plaintext_byte = intermediate ^ original_byte;
        self.plaintext
            .fill(BLOCK_SIZE - pad_len as usize, plaintext_byte)?;

        debug!(
            block_idx = self.block_idx,
            pad_len,
            offset,
            forged = forged_byte,
            intermediate,
            plaintext = plaintext_byte,
            "recovered byte"
        );
        Ok(plaintext_byte)
    }

    /// Forces every known trailing byte of the target block to decrypt to
    /// `pad_len`.
    fn force_padding(&self, pad_len: u8) -> Result<TamperedCiphertext<'a>, AttackError> {
        let last_byte = self.last_byte()?;
        let mut tampered = self.original.tamper();
        for idx in 0..(pad_len as usize - 1) {
            let recovered = self.plaintext.get(BLOCK_SIZE - 1 - idx).ok_or_else(|| {
                AttackError::Accumulator(format!(
                    "position {} is needed before it was recovered",
                    BLOCK_SIZE - 1 - idx
                ))
            })?;
            tampered = tampered.xor(last_byte - idx - BLOCK_SIZE, recovered ^ pad_len);
        }
        Ok(tampered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use rand::{rngs::StdRng, RngCore, SeedableRng};
    use rstest::rstest;

    use crate::config::{CancelToken, SearchStrategy};
    use crate::error::OracleError;
    use crate::oracle::reference::MacPrefixOracle;
    use crate::oracle::Verdict;
    use crate::pkcs7::pkcs7_pad;

    const IV: [u8; BLOCK_SIZE] = [0x42; BLOCK_SIZE];

    fn oracle() -> MacPrefixOracle {
        MacPrefixOracle::from_rng(&mut StdRng::seed_from_u64(101))
    }

    fn last_block(ciphertext: &Ciphertext) -> usize {
        ciphertext.n_blocks() - 1
    }

    fn expected_last_block(oracle: &MacPrefixOracle, message: &[u8]) -> Vec<u8> {
        let padded = pkcs7_pad(&oracle.record(message), BLOCK_SIZE as u8);
        padded[padded.len() - BLOCK_SIZE..].to_vec()
    }

    #[test]
    fn recovered_block_fills_right_to_left_only() {
        let mut block = RecoveredBlock::new();

        block.fill(15, 0xaa).unwrap();
        assert!(block.fill(15, 0xbb).is_err());
        assert!(block.fill(13, 0xcc).is_err());
        block.fill(14, 0xdd).unwrap();

        assert_eq!(block.filled(), 2);
        assert_eq!(block.get(15), Some(0xaa));
        assert_eq!(block.get(14), Some(0xdd));
        assert_eq!(block.get(13), None);
    }

    #[test]
    fn recovered_block_cannot_be_read_before_completion() {
        let block = RecoveredBlock::with_suffix(b"tail").unwrap();

        assert_eq!(block.filled(), 4);
        assert!(matches!(
            block.into_bytes(),
            Err(AttackError::Accumulator(_))
        ));
    }

    #[test]
    fn recovered_block_rejects_oversized_suffix() {
        assert!(RecoveredBlock::with_suffix(&[0u8; BLOCK_SIZE + 1]).is_err());
        assert!(RecoveredBlock::with_suffix(&[0u8; BLOCK_SIZE])
            .unwrap()
            .into_bytes()
            .is_ok());
    }

    #[test]
    fn decrypt_recovers_yellow_submarine() {
        let oracle = oracle();
        let ciphertext = oracle.seal(b"YELLOW SUBMARINE", &IV);
        // IV, two tag blocks, the message block and a padding block. Dropping
        // the padding block puts the message block last.
        let target = ciphertext.truncated(4);

        let plaintext = BlockDecryptionAttack::new(&oracle, &target, 3)
            .decrypt()
            .unwrap();

        assert_eq!(&plaintext, b"YELLOW SUBMARINE");
    }

    #[rstest]
    fn decrypt_recovers_final_block_for_every_padding_length(
        #[values(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16)] pad_len: usize,
    ) {
        let oracle = oracle();
        let message = "x".repeat(BLOCK_SIZE + BLOCK_SIZE - pad_len);
        let ciphertext = oracle.seal(message.as_bytes(), &IV);

        let plaintext = BlockDecryptionAttack::new(&oracle, &ciphertext, last_block(&ciphertext))
            .decrypt()
            .unwrap();

        let expected = expected_last_block(&oracle, message.as_bytes());
        assert_eq!(plaintext.as_slice(), expected.as_slice());
        assert!(plaintext[BLOCK_SIZE - pad_len..]
            .iter()
            .all(|&b| b as usize == pad_len));
    }

    // The block is sealed as the whole message and the padding block dropped,
    // so the receiver checks the padding of exactly these bytes.
    fn decrypt_message_block(
        block: &[u8; BLOCK_SIZE],
        strategy: SearchStrategy,
    ) -> [u8; BLOCK_SIZE] {
        let oracle = oracle();
        let ciphertext = oracle.seal(block, &IV).truncated(4);

        BlockDecryptionAttack::new(&oracle, &ciphertext, 3)
            .with_config(AttackConfig::new(strategy))
            .decrypt()
            .unwrap()
    }

    #[rstest]
    #[case(*b"YELLOW SUBMARI\x02C")]
    #[case(*b"YELLOW SUBMARI\x02G")]
    #[case(*b"YELLOW SUBMAR\x03\x03E")]
    #[case(*b"YELLOW SUBMARI\x02\x02")]
    #[case(*b"YELLOW SUBMARIN\x01")]
    #[case([0x10; BLOCK_SIZE])]
    fn decrypt_recovers_blocks_that_look_like_padding(
        #[case] block: [u8; BLOCK_SIZE],
        #[values(SearchStrategy::Sequential, SearchStrategy::Exhaustive, SearchStrategy::Parallel)]
        strategy: SearchStrategy,
    ) {
        assert_eq!(decrypt_message_block(&block, strategy), block);
    }

    #[rstest]
    fn decrypt_recovers_random_blocks(
        #[values(1, 2, 3, 4, 5, 6, 7, 8)] seed: u64,
        #[values(SearchStrategy::Sequential, SearchStrategy::Exhaustive, SearchStrategy::Parallel)]
        strategy: SearchStrategy,
    ) {
        let mut block = [0u8; BLOCK_SIZE];
        StdRng::seed_from_u64(seed).fill_bytes(&mut block);

        assert_eq!(decrypt_message_block(&block, strategy), block);
    }

    #[test]
    fn decrypt_falls_back_to_original_byte_when_it_already_pads() {
        let oracle = oracle();
        // 15 message bytes leave exactly one padding byte of 0x01.
        let message = b"YELLOW SUBMARIN";
        let ciphertext = oracle.seal(message, &IV);
        let target = last_block(&ciphertext);
        let offset = target * BLOCK_SIZE - 1;
        let verdicts = Mutex::new(Vec::new());
        let recording = |ct: &Ciphertext| -> Result<Verdict, OracleError> {
            let verdict = oracle.query(ct)?;
            if ct.as_bytes()[..offset] == ciphertext.as_bytes()[..offset]
                && ct.as_bytes()[offset + 1..] == ciphertext.as_bytes()[offset + 1..]
            {
                verdicts
                    .lock()
                    .unwrap()
                    .push((ct.as_bytes()[offset], verdict));
            }
            Ok(verdict)
        };

        let plaintext = BlockDecryptionAttack::new(&recording, &ciphertext, target)
            .decrypt()
            .unwrap();

        assert_eq!(plaintext[BLOCK_SIZE - 1], 0x01);
        assert_eq!(plaintext.as_slice(), expected_last_block(&oracle, message));
        // The first round only ever saw the untouched byte succeed.
        let verdicts = verdicts.into_inner().unwrap();
        let first_round = &verdicts[..256];
        let original_byte = ciphertext.as_bytes()[offset];
        assert!(first_round
            .iter()
            .all(|&(candidate, verdict)| verdict != Verdict::MacInvalid
                && ((candidate == original_byte) == (verdict == Verdict::Ok))));
    }

    #[test]
    fn decrypt_only_tampers_with_the_preceding_block() {
        let oracle = oracle();
        // A whole padding block exercises every padding length up to 16.
        let message = b"We all live in a yellow submarine, a yellow s...";
        let ciphertext = oracle.seal(message, &IV);
        let target = last_block(&ciphertext);
        let window = (target - 1) * BLOCK_SIZE..target * BLOCK_SIZE;
        let touched = Mutex::new(HashSet::new());
        let watching = |ct: &Ciphertext| -> Result<Verdict, OracleError> {
            assert_eq!(ct.len(), ciphertext.len());
            let mut touched = touched.lock().unwrap();
            for (offset, (a, b)) in ct.as_bytes().iter().zip(ciphertext.as_bytes()).enumerate() {
                if a != b {
                    touched.insert(offset);
                }
            }
            oracle.query(ct)
        };

        let plaintext = BlockDecryptionAttack::new(&watching, &ciphertext, target)
            .decrypt()
            .unwrap();

        assert_eq!(plaintext, [BLOCK_SIZE as u8; BLOCK_SIZE]);
        let touched = touched.into_inner().unwrap();
        assert!(touched.iter().all(|offset| window.contains(offset)));
        assert_eq!(touched.len(), BLOCK_SIZE);
    }

    #[test]
    fn recovery_depends_on_previously_recovered_bytes() {
        let oracle = oracle();
        let message = "x".repeat(BLOCK_SIZE + 8);
        let ciphertext = oracle.seal(message.as_bytes(), &IV);
        let target = last_block(&ciphertext);
        let expected = expected_last_block(&oracle, message.as_bytes());
        let preceding_byte = ciphertext.as_bytes()[(target - 1) * BLOCK_SIZE + 14];

        let correct_seed = RecoveredBlock::with_suffix(&expected[BLOCK_SIZE - 1..]).unwrap();
        let mut attack =
            BlockDecryptionAttack::new(&oracle, &ciphertext, target).with_recovered(correct_seed);
        assert_eq!(attack.recover_next().unwrap(), expected[BLOCK_SIZE - 2]);

        // A wrong byte at position 15 makes it decrypt to 0x01 rather than
        // 0x02 in the second round, so every candidate for position 14 gives
        // valid one-byte padding and the first candidate tried, 0x00, wins.
        let wrong_seed =
            RecoveredBlock::with_suffix(&[expected[BLOCK_SIZE - 1] ^ 0x03]).unwrap();
        let mut attack =
            BlockDecryptionAttack::new(&oracle, &ciphertext, target).with_recovered(wrong_seed);
        let recovered = attack.recover_next().unwrap();

        assert_eq!(recovered, 0x02 ^ 0x00 ^ preceding_byte);
        assert_eq!(attack.recovered().get(BLOCK_SIZE - 2), Some(recovered));
    }

    #[test]
    fn recover_next_refuses_a_complete_block() {
        let oracle = |_: &Ciphertext| -> Result<Verdict, OracleError> { Ok(Verdict::Ok) };
        let ciphertext = Ciphertext::new(vec![0u8; 2 * BLOCK_SIZE]);
        let complete = RecoveredBlock::with_suffix(&[0u8; BLOCK_SIZE]).unwrap();

        let mut attack =
            BlockDecryptionAttack::new(&oracle, &ciphertext, 1).with_recovered(complete);

        assert!(matches!(
            attack.recover_next(),
            Err(AttackError::Accumulator(_))
        ));
    }

    #[test]
    fn decrypt_with_known_suffix_skips_its_rounds() {
        let oracle = oracle();
        let message = "x".repeat(BLOCK_SIZE + 12);
        let ciphertext = oracle.seal(message.as_bytes(), &IV);
        let expected = expected_last_block(&oracle, message.as_bytes());
        let queries = AtomicUsize::new(0);
        let counting = |ct: &Ciphertext| -> Result<Verdict, OracleError> {
            queries.fetch_add(1, Ordering::SeqCst);
            oracle.query(ct)
        };

        let plaintext = BlockDecryptionAttack::new(&counting, &ciphertext, last_block(&ciphertext))
            .with_recovered(RecoveredBlock::with_suffix(&[4, 4, 4, 4]).unwrap())
            .decrypt()
            .unwrap();

        assert_eq!(plaintext.as_slice(), expected.as_slice());
        assert!(queries.load(Ordering::SeqCst) <= 12 * 256);
    }

    #[test]
    fn decrypt_reports_protocol_inconsistency_after_exhausting_candidates() {
        let ciphertext = oracle().seal(b"message", &IV);
        let queries = AtomicUsize::new(0);
        let never_valid = |_: &Ciphertext| -> Result<Verdict, OracleError> {
            queries.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::PaddingInvalid)
        };

        let result = BlockDecryptionAttack::new(&never_valid, &ciphertext, 2).decrypt();

        assert!(matches!(
            result,
            Err(AttackError::ProtocolInconsistency {
                offset: 31,
                pad_len: 1
            })
        ));
        assert_eq!(queries.load(Ordering::SeqCst), 256);
    }

    #[test]
    fn decrypt_propagates_oracle_failures() {
        let ciphertext = oracle().seal(b"message", &IV);
        let failing = |_: &Ciphertext| -> Result<Verdict, OracleError> {
            Err(OracleError::Unavailable("rate limited".to_string()))
        };

        let result = BlockDecryptionAttack::new(&failing, &ciphertext, 2).decrypt();

        assert!(matches!(
            result,
            Err(AttackError::Oracle(OracleError::Unavailable(_)))
        ));
    }

    #[rstest]
    #[case(0, 3)]
    #[case(3, 3)]
    #[case(usize::MAX, 3)]
    fn decrypt_rejects_blocks_without_a_predecessor_or_out_of_range(
        #[case] block_idx: usize,
        #[case] n_blocks: usize,
    ) {
        let ciphertext = Ciphertext::new(vec![0u8; n_blocks * BLOCK_SIZE]);
        let oracle = |_: &Ciphertext| -> Result<Verdict, OracleError> { Ok(Verdict::Ok) };

        let result = BlockDecryptionAttack::new(&oracle, &ciphertext, block_idx).decrypt();

        assert!(matches!(
            result,
            Err(AttackError::BlockOutOfRange { .. })
        ));
    }

    #[test]
    fn decrypt_rejects_misaligned_ciphertext() {
        let ciphertext = Ciphertext::new(vec![0u8; 40]);
        let oracle = |_: &Ciphertext| -> Result<Verdict, OracleError> { Ok(Verdict::Ok) };

        let result = BlockDecryptionAttack::new(&oracle, &ciphertext, 1).decrypt();

        assert!(matches!(
            result,
            Err(AttackError::MisalignedCiphertext { len: 40 })
        ));
    }

    #[rstest]
    #[case(SearchStrategy::Sequential)]
    #[case(SearchStrategy::Exhaustive)]
    #[case(SearchStrategy::Parallel)]
    fn every_strategy_recovers_the_final_block(#[case] strategy: SearchStrategy) {
        let oracle = oracle();
        let message = b"Ice, Ice, baby, too cold";
        let ciphertext = oracle.seal(message, &IV);

        let plaintext = BlockDecryptionAttack::new(&oracle, &ciphertext, last_block(&ciphertext))
            .with_config(AttackConfig::new(strategy))
            .decrypt()
            .unwrap();

        assert_eq!(plaintext.as_slice(), expected_last_block(&oracle, message));
    }

    #[test]
    fn cancelled_attack_stops_before_querying() {
        let ciphertext = oracle().seal(b"message", &IV);
        let queries = AtomicUsize::new(0);
        let counting = |_: &Ciphertext| -> Result<Verdict, OracleError> {
            queries.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::PaddingInvalid)
        };
        let token = CancelToken::new();
        token.cancel();

        let result = BlockDecryptionAttack::new(&counting, &ciphertext, 2)
            .with_config(AttackConfig::default().with_cancel_token(token))
            .decrypt();

        assert!(matches!(result, Err(AttackError::Cancelled)));
        assert_eq!(queries.load(Ordering::SeqCst), 0);
    }
}
