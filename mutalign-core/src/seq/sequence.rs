use crate::alphabets::{self, nucleotide, Alphabet, Kmers};
use crate::error::{BioError, BioResult};
use crate::seq::Range;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable sequence of alphabet codes.
///
/// Cloning shares the backing buffer; equality and hashing look at the content only.
#[derive(Clone)]
pub struct Sequence {
    alphabet: &'static Alphabet,
    data: Arc<[u8]>,
}

impl Sequence {
    pub fn parse(alphabet: &'static Alphabet, text: &str) -> BioResult<Self> {
        Ok(Sequence {
            alphabet,
            data: alphabet.encode(text.as_bytes())?.into(),
        })
    }

    pub fn nucleotide(text: &str) -> BioResult<Self> {
        Self::parse(alphabets::nucleotide(), text)
    }

    pub fn amino_acid(text: &str) -> BioResult<Self> {
        Self::parse(alphabets::amino_acid(), text)
    }

    pub fn from_codes(alphabet: &'static Alphabet, codes: Vec<u8>) -> BioResult<Self> {
        if let Some(pos) = codes.iter().position(|&c| c as usize >= alphabet.size()) {
            return Err(BioError::InvalidChar {
                ch: char::from(codes[pos]),
                pos,
                alphabet: alphabet.name(),
            });
        }
        Ok(Self::from_codes_unchecked(alphabet, codes))
    }

    pub(crate) fn from_codes_unchecked(alphabet: &'static Alphabet, codes: Vec<u8>) -> Self {
        Sequence {
            alphabet,
            data: codes.into(),
        }
    }

    pub(crate) fn from_shared(alphabet: &'static Alphabet, data: Arc<[u8]>) -> Self {
        Sequence { alphabet, data }
    }

    pub fn empty(alphabet: &'static Alphabet) -> Self {
        Self::from_codes_unchecked(alphabet, Vec::new())
    }

    #[inline]
    pub fn alphabet(&self) -> &'static Alphabet {
        self.alphabet
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn code_at(&self, position: usize) -> u8 {
        self.data[position]
    }

    pub fn symbol_at(&self, position: usize) -> char {
        char::from(self.alphabet.symbol(self.data[position]))
    }

    #[inline]
    pub fn codes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn shared(&self) -> &Arc<[u8]> {
        &self.data
    }

    /// Copy of the sub-sequence.
    ///
    /// # Panics
    /// Panics if `range` exceeds the sequence.
    pub fn range(&self, range: Range) -> Sequence {
        Self::from_codes_unchecked(self.alphabet, self.data[range.from()..range.to()].to_vec())
    }

    pub fn try_range(&self, range: Range) -> BioResult<Sequence> {
        if range.to() > self.len() {
            return Err(BioError::InvalidRange {
                from: range.from(),
                to: range.to(),
                len: self.len(),
            });
        }
        Ok(self.range(range))
    }

    pub fn concatenate(&self, other: &Sequence) -> BioResult<Sequence> {
        check_same_alphabet(self.alphabet, other.alphabet)?;
        let mut codes = Vec::with_capacity(self.len() + other.len());
        codes.extend_from_slice(&self.data);
        codes.extend_from_slice(&other.data);
        Ok(Self::from_codes_unchecked(self.alphabet, codes))
    }

    pub fn reverse(&self) -> Sequence {
        Self::from_codes_unchecked(self.alphabet, self.data.iter().rev().copied().collect())
    }

    pub fn reverse_complement(&self) -> BioResult<Sequence> {
        check_same_alphabet(alphabets::nucleotide(), self.alphabet)?;
        Ok(Self::from_codes_unchecked(
            self.alphabet,
            nucleotide::reverse_complement(&self.data),
        ))
    }

    pub fn contains_wildcards(&self) -> bool {
        self.data.iter().any(|&c| self.alphabet.is_wildcard(c))
    }

    pub fn kmers(&self, k: usize) -> Kmers<'_> {
        self.alphabet.kmers(&self.data, k)
    }
}

pub(crate) fn check_same_alphabet(left: &Alphabet, right: &Alphabet) -> BioResult<()> {
    if left != right {
        return Err(BioError::AlphabetMismatch {
            left: left.name(),
            right: right.name(),
        });
    }
    Ok(())
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.alphabet == other.alphabet && self.data[..] == other.data[..]
    }
}

impl Eq for Sequence {}

impl Hash for Sequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alphabet.name().hash(state);
        self.data[..].hash(state);
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &c in self.data.iter() {
            write!(f, "{}", char::from(self.alphabet.symbol(c)))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sequence({}:{})", self.alphabet.name(), self)
    }
}

/// Growable code buffer consumed by [`SequenceBuilder::build`].
#[derive(Debug)]
pub struct SequenceBuilder {
    alphabet: &'static Alphabet,
    codes: Vec<u8>,
}

impl SequenceBuilder {
    pub fn new(alphabet: &'static Alphabet) -> Self {
        Self::with_capacity(alphabet, 0)
    }

    pub fn with_capacity(alphabet: &'static Alphabet, capacity: usize) -> Self {
        SequenceBuilder {
            alphabet,
            codes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// # Panics
    /// Panics if `code` is outside the alphabet.
    pub fn push(&mut self, code: u8) -> &mut Self {
        assert!((code as usize) < self.alphabet.size(), "code {code} out of alphabet");
        self.codes.push(code);
        self
    }

    pub fn append(&mut self, sequence: &Sequence) -> BioResult<&mut Self> {
        check_same_alphabet(self.alphabet, sequence.alphabet())?;
        self.codes.extend_from_slice(sequence.codes());
        Ok(self)
    }

    pub(crate) fn extend_codes(&mut self, codes: &[u8]) {
        self.codes.extend_from_slice(codes);
    }

    pub fn set(&mut self, position: usize, code: u8) {
        self.codes[position] = code;
    }

    pub fn build(self) -> Sequence {
        Sequence::from_codes_unchecked(self.alphabet, self.codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nt(s: &str) -> Sequence {
        Sequence::nucleotide(s).unwrap()
    }

    #[test]
    fn range_and_concatenate() {
        let s = nt("ATTAGACA");
        assert_eq!(s.range(Range::new(2, 5)), nt("TAG"));
        assert_eq!(s.range(Range::new(0, 3)).concatenate(&nt("CC")).unwrap(), nt("ATTCC"));
        assert!(s.try_range(Range::new(4, 9)).is_err());
    }

    #[test]
    fn reverse_complement() {
        assert_eq!(nt("ATTAGACA").reverse_complement().unwrap(), nt("TGTCTAAT"));
        assert_eq!(nt("ANRG").reverse_complement().unwrap(), nt("CYNT"));
        assert!(Sequence::amino_acid("CASS").unwrap().reverse_complement().is_err());
    }

    #[test]
    fn equality_by_content() {
        let a = nt("acgt");
        let b = nt("ACGT");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "ACGT");
        assert_ne!(a, Sequence::amino_acid("ACGT").unwrap());
    }

    #[test]
    fn builder_is_consumed() {
        let mut builder = SequenceBuilder::new(alphabets::nucleotide());
        builder.push(0).push(3);
        builder.append(&nt("GG")).unwrap();
        assert_eq!(builder.build(), nt("ATGG"));
    }
}
