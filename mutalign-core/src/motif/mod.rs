//! Fixed-length motifs over an alphabet and bit-parallel search for them.
//!
//! A motif position may hold a wildcard; it then accepts every basic letter the wildcard stands
//! for. A wildcard in the searched sequence only matches the very same wildcard in the motif.

mod bitap;

pub use bitap::{BitapMatch, BitapMatcher, BitapPattern};

use crate::alphabets::Alphabet;
use crate::error::BioResult;
use crate::seq::Sequence;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Motif {
    alphabet: &'static Alphabet,
    codes: Vec<u8>,
}

impl Motif {
    pub fn new(alphabet: &'static Alphabet, text: &str) -> BioResult<Self> {
        Ok(Self::from_sequence(&Sequence::parse(alphabet, text)?))
    }

    pub fn from_sequence(sequence: &Sequence) -> Self {
        Motif {
            alphabet: sequence.alphabet(),
            codes: sequence.codes().to_vec(),
        }
    }

    pub fn alphabet(&self) -> &'static Alphabet {
        self.alphabet
    }

    pub fn size(&self) -> usize {
        self.codes.len()
    }

    pub fn has_wildcards(&self) -> bool {
        self.codes.iter().any(|&c| self.alphabet.is_wildcard(c))
    }

    /// True when letter `code` is allowed at motif position `position`.
    #[inline]
    pub fn accepts(&self, position: usize, code: u8) -> bool {
        let expected = self.codes[position];
        expected == code
            || self
                .alphabet
                .wildcard(expected)
                .is_some_and(|w| w.contains(code))
    }

    /// True when the motif occurs in `sequence` starting exactly at `from`.
    pub fn matches(&self, sequence: &Sequence, from: usize) -> bool {
        if sequence.alphabet() != self.alphabet || from + self.size() > sequence.len() {
            return false;
        }
        sequence.codes()[from..from + self.size()]
            .iter()
            .enumerate()
            .all(|(i, &c)| self.accepts(i, c))
    }

    pub fn bitap_pattern(&self) -> BioResult<BitapPattern> {
        BitapPattern::new(self)
    }
}
