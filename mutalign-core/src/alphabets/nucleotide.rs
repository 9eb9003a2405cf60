use super::Alphabet;
use std::sync::LazyLock;

pub const A: u8 = 0;
pub const G: u8 = 1;
pub const C: u8 = 2;
pub const T: u8 = 3;

static NUCLEOTIDE: LazyLock<Alphabet> = LazyLock::new(|| {
    Alphabet::new(
        "nucleotide",
        b"AGCT",
        &[
            (b'N', &[A, G, C, T][..]),
            (b'R', &[A, G][..]),
            (b'Y', &[C, T][..]),
            (b'S', &[G, C][..]),
            (b'W', &[A, T][..]),
            (b'K', &[G, T][..]),
            (b'M', &[A, C][..]),
            (b'B', &[C, G, T][..]),
            (b'D', &[A, G, T][..]),
            (b'H', &[A, C, T][..]),
            (b'V', &[A, C, G][..]),
        ],
    )
});

// Code to complementary code, wildcards map to the wildcard over complemented bases.
static COMPLEMENT: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let alphabet = nucleotide();
    (0..alphabet.size() as u8)
        .map(|code| {
            let mut basis: Vec<u8> = alphabet.basis(code).iter().map(|&c| c ^ 3).collect();
            basis.sort_unstable();
            (0..alphabet.size() as u8)
                .find(|&other| {
                    let mut b = alphabet.basis(other);
                    b.sort_unstable();
                    b == basis
                })
                .unwrap_or(code)
        })
        .collect()
});

pub fn nucleotide() -> &'static Alphabet {
    &NUCLEOTIDE
}

#[inline]
pub fn complement(code: u8) -> u8 {
    COMPLEMENT[code as usize]
}

pub fn reverse_complement(codes: &[u8]) -> Vec<u8> {
    codes.iter().rev().map(|&c| complement(c)).collect()
}
