//! Nucleotide to amino acid translation and the coordinate maps between the two spaces.
//!
//! A reading frame is anchored either at the left end (codons start at 0, 3, 6, ...) or at the
//! right end (codons start at `len % 3`, `len % 3 + 3`, ...). When incomplete codons are
//! included, the dangling one or two nucleotides translate to `_`.

use crate::alphabets::amino_acid::{self, INCOMPLETE};
use crate::alphabets;
use crate::error::BioResult;
use crate::seq::sequence::check_same_alphabet;
use crate::seq::Sequence;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationParameters {
    pub from_left: bool,
    pub include_incomplete: bool,
}

impl TranslationParameters {
    pub const FROM_LEFT_WITH_INCOMPLETE: Self = Self::new(true, true);
    pub const FROM_RIGHT_WITH_INCOMPLETE: Self = Self::new(false, true);
    pub const FROM_LEFT_WITHOUT_INCOMPLETE: Self = Self::new(true, false);
    pub const FROM_RIGHT_WITHOUT_INCOMPLETE: Self = Self::new(false, false);

    pub const fn new(from_left: bool, include_incomplete: bool) -> Self {
        TranslationParameters {
            from_left,
            include_incomplete,
        }
    }

    /// Number of amino acids produced for `nt_length` nucleotides.
    pub fn aa_length(&self, nt_length: usize) -> usize {
        (nt_length + if self.include_incomplete { 2 } else { 0 }) / 3
    }

    fn has_incomplete(&self, nt_length: usize) -> bool {
        self.include_incomplete && nt_length % 3 != 0
    }
}

/// Position of a nucleotide inside the translated sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AaPosition {
    pub aa_position: usize,
    /// 0..3, relative to a complete codon.
    pub position_in_triplet: usize,
}

pub fn translate(sequence: &Sequence, params: TranslationParameters) -> BioResult<Sequence> {
    check_same_alphabet(alphabets::nucleotide(), sequence.alphabet())?;
    let codes = sequence.codes();
    let len = codes.len();
    let shift = len % 3;
    let mut aa = Vec::with_capacity(params.aa_length(len));
    let incomplete = params.has_incomplete(len);
    let start = if params.from_left { 0 } else { shift };
    if incomplete && !params.from_left {
        aa.push(INCOMPLETE);
    }
    for c in codes[start..start + len / 3 * 3].chunks_exact(3) {
        aa.push(amino_acid::codon_to_code(c[0], c[1], c[2]));
    }
    if incomplete && params.from_left {
        aa.push(INCOMPLETE);
    }
    Ok(Sequence::from_codes_unchecked(alphabets::amino_acid(), aa))
}

/// Maps a nucleotide position to the amino acid covering it.
///
/// Returns `None` for nucleotides of a dropped incomplete codon or past the end.
pub fn convert_nt_position_to_aa(
    nt_position: usize,
    nt_length: usize,
    params: TranslationParameters,
) -> Option<AaPosition> {
    if nt_position >= nt_length {
        return None;
    }
    let shift = nt_length % 3;
    let full = nt_length / 3;
    if params.from_left {
        let aa_position = nt_position / 3;
        if aa_position >= full && !params.include_incomplete {
            return None;
        }
        return Some(AaPosition {
            aa_position,
            position_in_triplet: nt_position % 3,
        });
    }
    if nt_position < shift {
        if !params.include_incomplete {
            return None;
        }
        return Some(AaPosition {
            aa_position: 0,
            position_in_triplet: nt_position + 3 - shift,
        });
    }
    let inner = nt_position - shift;
    Some(AaPosition {
        aa_position: inner / 3 + usize::from(params.has_incomplete(nt_length)),
        position_in_triplet: inner % 3,
    })
}

/// First nucleotide of the codon that produced `aa_position`.
pub fn convert_aa_position_to_nt(
    aa_position: usize,
    nt_length: usize,
    params: TranslationParameters,
) -> usize {
    if params.from_left {
        return aa_position * 3;
    }
    let shift = nt_length % 3;
    if params.has_incomplete(nt_length) {
        if aa_position == 0 {
            0
        } else {
            shift + (aa_position - 1) * 3
        }
    } else {
        shift + aa_position * 3
    }
}
