use super::nucleotide::T;
use super::Alphabet;
use std::sync::LazyLock;

pub const STOP: u8 = 0;
/// Incomplete codon.
pub const INCOMPLETE: u8 = 21;

static AMINO_ACID: LazyLock<Alphabet> = LazyLock::new(|| {
    Alphabet::new(
        "aminoacid",
        b"*ACDEFGHIKLMNPQRSTVWY_",
        &[
            (b'X', &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20][..]),
            (b'B', &[3, 12][..]),
            (b'J', &[8, 10][..]),
            (b'Z', &[4, 14][..]),
        ],
    )
});

/// Standard code in ACGT-ordered triplet index.
const CODON_TABLE: [u8; 64] = *b"KNKNTTTTRSRSIIMIQHQHPPPPRRRRLLLLEDEDAAAAGGGGVVVV*Y*YSSSS*CWCLFLF";

// nucleotide code (A, G, C, T) to ACGT rank
const ACGT_RANK: [usize; 4] = [0, 2, 1, 3];

static TRIPLET_TO_AA: LazyLock<[u8; 64]> = LazyLock::new(|| {
    let aa = amino_acid();
    let mut table = [0u8; 64];
    for (triplet, slot) in table.iter_mut().enumerate() {
        let (c0, c1, c2) = (triplet >> 4, (triplet >> 2) & 3, triplet & 3);
        let idx = (ACGT_RANK[c0] << 4) | (ACGT_RANK[c1] << 2) | ACGT_RANK[c2];
        *slot = aa.code(CODON_TABLE[idx]).unwrap_or(STOP);
    }
    table
});

pub fn amino_acid() -> &'static Alphabet {
    &AMINO_ACID
}

/// Amino acid code for a packed triplet `(c0 << 4) | (c1 << 2) | c2` of basic nucleotide codes.
#[inline]
pub fn triplet_to_code(triplet: usize) -> u8 {
    TRIPLET_TO_AA[triplet & 63]
}

/// Translates three nucleotide codes; any wildcard yields `X`.
pub fn codon_to_code(c0: u8, c1: u8, c2: u8) -> u8 {
    if c0 > T || c1 > T || c2 > T {
        return amino_acid().code(b'X').unwrap_or(INCOMPLETE);
    }
    triplet_to_code(((c0 as usize) << 4) | ((c1 as usize) << 2) | c2 as usize)
}
