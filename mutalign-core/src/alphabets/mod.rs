pub mod amino_acid;
pub mod nucleotide;

use crate::error::{BioError, BioResult};
use bit_set::BitSet;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use vector_map::VecMap;

pub use amino_acid::amino_acid;
pub use nucleotide::nucleotide;

/// Symbol byte (upper and lower case) to code.
pub type SymbolRanks = VecMap<usize, u8>;

/// A symbol standing for a set of basic codes.
#[derive(Clone, Debug)]
pub struct Wildcard {
    symbol: u8,
    code: u8,
    basis: BitSet,
}

impl Wildcard {
    fn new(symbol: u8, code: u8, basis: &[u8]) -> Self {
        let mut set = BitSet::with_capacity(8);
        set.extend(basis.iter().map(|&c| c as usize));
        Wildcard {
            symbol,
            code,
            basis: set,
        }
    }

    pub fn symbol(&self) -> u8 {
        self.symbol
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn basis_size(&self) -> usize {
        self.basis.len()
    }

    pub fn basis(&self) -> impl Iterator<Item = u8> + '_ {
        self.basis.iter().map(|c| c as u8)
    }

    #[inline]
    pub fn contains(&self, basic_code: u8) -> bool {
        self.basis.contains(basic_code as usize)
    }

    /// Probability that a uniformly drawn basis letter equals `basic_code`.
    pub fn match_probability(&self, basic_code: u8) -> f64 {
        if self.contains(basic_code) {
            1.0 / self.basis_size() as f64
        } else {
            0.0
        }
    }

    /// Picks a basis letter deterministically from `seed`.
    pub fn basis_letter(&self, seed: u64) -> u8 {
        let n = (seed % self.basis_size() as u64) as usize;
        self.basis().nth(n).unwrap_or(self.code)
    }
}

/// Static mapping between symbols and compact codes.
///
/// Codes `[0, basic_size)` are plain letters; wildcards follow up to `size`.
pub struct Alphabet {
    name: &'static str,
    symbols: Vec<u8>,
    basic_size: usize,
    ranks: SymbolRanks,
    wildcards: Vec<Wildcard>,
    pub(crate) mutation_pattern: OnceLock<Regex>,
}

impl Alphabet {
    fn new(name: &'static str, basic: &[u8], wildcards: &[(u8, &[u8])]) -> Self {
        let mut symbols = basic.to_vec();
        let mut ranks = VecMap::new();
        for (code, &s) in basic.iter().enumerate() {
            ranks.insert(s as usize, code as u8);
            ranks.insert(s.to_ascii_lowercase() as usize, code as u8);
        }
        let mut wild = Vec::with_capacity(wildcards.len());
        for (i, (s, basis)) in wildcards.iter().enumerate() {
            let code = (basic.len() + i) as u8;
            symbols.push(*s);
            ranks.insert(*s as usize, code);
            ranks.insert(s.to_ascii_lowercase() as usize, code);
            wild.push(Wildcard::new(*s, code, basis));
        }
        Alphabet {
            name,
            symbols,
            basic_size: basic.len(),
            ranks,
            wildcards: wild,
            mutation_pattern: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total number of codes, wildcards included.
    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    pub fn basic_size(&self) -> usize {
        self.basic_size
    }

    pub fn by_name(name: &str) -> BioResult<&'static Alphabet> {
        match name {
            n if n == nucleotide().name() => Ok(nucleotide()),
            n if n == amino_acid().name() => Ok(amino_acid()),
            _ => Err(BioError::UnknownAlphabet(name.to_string())),
        }
    }

    #[inline]
    pub fn symbol(&self, code: u8) -> u8 {
        self.symbols[code as usize]
    }

    #[inline]
    pub fn code(&self, symbol: u8) -> Option<u8> {
        self.ranks.get(&(symbol as usize)).copied()
    }

    /// Symbols in code order; the first `basic_size` are letters.
    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    #[inline]
    pub fn is_wildcard(&self, code: u8) -> bool {
        code as usize >= self.basic_size
    }

    pub fn wildcard(&self, code: u8) -> Option<&Wildcard> {
        (code as usize)
            .checked_sub(self.basic_size)
            .and_then(|i| self.wildcards.get(i))
    }

    pub fn wildcards(&self) -> &[Wildcard] {
        &self.wildcards
    }

    /// Basic codes represented by `code` (itself when it is a plain letter).
    pub fn basis(&self, code: u8) -> Vec<u8> {
        match self.wildcard(code) {
            Some(w) => w.basis().collect(),
            None => vec![code],
        }
    }

    /// True when `a` and `b` can stand for the same letter.
    pub fn codes_match(&self, a: u8, b: u8) -> bool {
        match (self.wildcard(a), self.wildcard(b)) {
            (None, None) => a == b,
            (Some(w), None) => w.contains(b),
            (None, Some(w)) => w.contains(a),
            (Some(x), Some(y)) => !x.basis.is_disjoint(&y.basis),
        }
    }

    pub fn is_word(&self, text: &[u8]) -> bool {
        text.iter().all(|&c| self.code(c).is_some())
    }

    pub fn encode(&self, text: &[u8]) -> BioResult<Vec<u8>> {
        text.iter()
            .enumerate()
            .map(|(pos, &c)| {
                self.code(c).ok_or(BioError::InvalidChar {
                    ch: c as char,
                    pos,
                    alphabet: self.name,
                })
            })
            .collect()
    }

    /// Bits needed to pack one basic code into a k-mer.
    pub fn bits_per_code(&self) -> u32 {
        (self.basic_size as f32).log2().ceil() as u32
    }

    /// Largest k-mer length that fits a `u64`.
    pub fn max_kmer_size(&self) -> usize {
        (u64::BITS / self.bits_per_code().max(1)) as usize
    }

    pub fn kmers<'a>(&'a self, codes: &'a [u8], k: usize) -> Kmers<'a> {
        debug_assert!(k > 0 && k <= self.max_kmer_size());
        let bits = self.bits_per_code();
        Kmers {
            codes,
            alphabet: self,
            bits,
            mask: 1u64
                .checked_shl(k as u32 * bits)
                .unwrap_or(0)
                .wrapping_sub(1),
            k,
            pos: 0,
            valid: 0,
            kmer: 0,
        }
    }
}

impl PartialEq for Alphabet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Alphabet {}

impl fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alphabet")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish()
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Overlapping k-mers as `(start, packed)`; windows containing a wildcard are skipped.
#[derive(Clone, Debug)]
pub struct Kmers<'a> {
    codes: &'a [u8],
    alphabet: &'a Alphabet,
    bits: u32,
    mask: u64,
    k: usize,
    pos: usize,
    valid: usize,
    kmer: u64,
}

impl Iterator for Kmers<'_> {
    type Item = (usize, u64);

    #[inline]
    fn next(&mut self) -> Option<(usize, u64)> {
        while self.pos < self.codes.len() {
            let c = self.codes[self.pos];
            self.pos += 1;
            if self.alphabet.is_wildcard(c) {
                self.valid = 0;
                self.kmer = 0;
                continue;
            }
            self.kmer = ((self.kmer << self.bits) | c as u64) & self.mask;
            self.valid += 1;
            if self.valid >= self.k {
                return Some((self.pos - self.k, self.kmer));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        assert_eq!(Alphabet::by_name("nucleotide").unwrap(), nucleotide());
        assert_eq!(Alphabet::by_name("aminoacid").unwrap(), amino_acid());
        assert!(Alphabet::by_name("rna").is_err());
    }

    #[test]
    fn code_space_is_dense() {
        for alphabet in [nucleotide(), amino_acid()] {
            for code in 0..alphabet.size() as u8 {
                assert_eq!(alphabet.code(alphabet.symbol(code)), Some(code));
            }
        }
    }

    #[test]
    fn kmers_skip_wildcards() {
        let a = nucleotide();
        let codes = a.encode(b"ACGNACGT").unwrap();
        let starts: Vec<usize> = a.kmers(&codes, 3).map(|(p, _)| p).collect();
        assert_eq!(starts, vec![0, 4, 5]);
    }

    #[test]
    fn kmers_pack_codes() {
        let a = nucleotide();
        let codes = a.encode(b"GCT").unwrap();
        let (_, kmer) = a.kmers(&codes, 3).next().unwrap();
        assert_eq!(kmer, (1 << 4) | (2 << 2) | 3);
    }

    #[test]
    fn invalid_symbol() {
        let err = nucleotide().encode(b"ACGU").unwrap_err();
        assert!(matches!(err, BioError::InvalidChar { ch: 'U', pos: 3, .. }));
    }
}
