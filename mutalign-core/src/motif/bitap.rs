use super::Motif;
use crate::error::{BioError, BioResult};
use crate::seq::sequence::check_same_alphabet;
use crate::seq::Sequence;
use log::trace;
use memchr::memmem;

/// Longest motif a pattern can hold: one state bit per motif position.
pub const MAX_PATTERN_SIZE: usize = 64;

/// Precomputed per-letter masks of a motif for shift-and search.
///
/// Bit `j` of `masks[code]` is set when `code` is allowed at motif position `j`. The reverse masks
/// describe the motif read right to left and drive the matchers that report start positions.
#[derive(Clone, Debug)]
pub struct BitapPattern {
    motif: Motif,
    masks: Vec<u64>,
    reverse_masks: Vec<u64>,
}

/// One hit of an approximate matcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitapMatch {
    /// End (inclusive) for the `*_last` matchers, start for the `*_first` ones.
    pub position: usize,
    /// Smallest number of errors a match at `position` needs.
    pub errors: usize,
}

impl BitapPattern {
    pub(super) fn new(motif: &Motif) -> BioResult<Self> {
        let size = motif.size();
        if size == 0 || size > MAX_PATTERN_SIZE {
            return Err(BioError::InvalidParameters {
                msg: format!("bitap motif size must be in 1..={MAX_PATTERN_SIZE}, got {size}"),
            });
        }
        let letters = motif.alphabet().size();
        let mut masks = vec![0u64; letters];
        let mut reverse_masks = vec![0u64; letters];
        for code in 0..letters as u8 {
            for j in 0..size {
                if motif.accepts(j, code) {
                    masks[code as usize] |= 1 << j;
                    reverse_masks[code as usize] |= 1 << (size - 1 - j);
                }
            }
        }
        Ok(BitapPattern {
            motif: motif.clone(),
            masks,
            reverse_masks,
        })
    }

    pub fn motif(&self) -> &Motif {
        &self.motif
    }

    pub fn size(&self) -> usize {
        self.motif.size()
    }

    /// Leftmost exact occurrence at or after `from`.
    pub fn exact_search(&self, sequence: &Sequence, from: usize) -> BioResult<Option<usize>> {
        check_same_alphabet(self.motif.alphabet(), sequence.alphabet())?;
        let text = sequence.codes().get(from..).unwrap_or_default();
        if !self.motif.has_wildcards() {
            return Ok(memmem::find(text, &self.motif.codes).map(|p| p + from));
        }
        let mut state = 0u64;
        let last = self.last_bit();
        for (i, &code) in text.iter().enumerate() {
            state = ((state << 1) | 1) & self.masks[code as usize];
            if state & last != 0 {
                return Ok(Some(from + i + 1 - self.size()));
            }
        }
        Ok(None)
    }

    /// Hits with at most `max_errors` mismatches, reported by start position from right to left.
    pub fn substitution_only_matcher_first<'a>(
        &'a self,
        max_errors: usize,
        sequence: &'a Sequence,
    ) -> BioResult<BitapMatcher<'a>> {
        self.matcher(max_errors, sequence, true, false)
    }

    /// Hits with at most `max_errors` mismatches, reported by end position from left to right.
    pub fn substitution_only_matcher_last<'a>(
        &'a self,
        max_errors: usize,
        sequence: &'a Sequence,
    ) -> BioResult<BitapMatcher<'a>> {
        self.matcher(max_errors, sequence, false, false)
    }

    /// Hits within edit distance `max_errors`, reported by start position from right to left.
    pub fn substitution_and_indel_matcher_first<'a>(
        &'a self,
        max_errors: usize,
        sequence: &'a Sequence,
    ) -> BioResult<BitapMatcher<'a>> {
        self.matcher(max_errors, sequence, true, true)
    }

    /// Hits within edit distance `max_errors`, reported by end position from left to right.
    pub fn substitution_and_indel_matcher_last<'a>(
        &'a self,
        max_errors: usize,
        sequence: &'a Sequence,
    ) -> BioResult<BitapMatcher<'a>> {
        self.matcher(max_errors, sequence, false, true)
    }

    fn matcher<'a>(
        &'a self,
        max_errors: usize,
        sequence: &'a Sequence,
        reverse: bool,
        indels: bool,
    ) -> BioResult<BitapMatcher<'a>> {
        check_same_alphabet(self.motif.alphabet(), sequence.alphabet())?;
        trace!(
            "bitap matcher: size {}, errors {}, reverse {}, indels {}",
            self.size(),
            max_errors,
            reverse,
            indels
        );
        let text = sequence.codes();
        // With indels, a prefix of d letters is matched by d deletions before any text is read.
        let state = (0..=max_errors)
            .map(|d| if indels { low_bits(d) } else { 0 })
            .collect();
        Ok(BitapMatcher {
            masks: if reverse { &self.reverse_masks } else { &self.masks },
            last_bit: self.last_bit(),
            text,
            cursor: if reverse { text.len() } else { 0 },
            reverse,
            indels,
            state,
        })
    }

    fn last_bit(&self) -> u64 {
        1 << (self.size() - 1)
    }
}

#[inline]
fn low_bits(n: usize) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Iterator over approximate hits. Each position is reported once, with its smallest error count.
pub struct BitapMatcher<'a> {
    masks: &'a [u64],
    last_bit: u64,
    text: &'a [u8],
    /// Next letter to read going forward, or the count of unread letters going backward.
    cursor: usize,
    reverse: bool,
    indels: bool,
    /// `state[d]` bit `j`: the first `j + 1` motif letters match up to here with `d` errors.
    state: Vec<u64>,
}

impl BitapMatcher<'_> {
    fn step(&mut self) -> Option<usize> {
        if self.reverse {
            self.cursor = self.cursor.checked_sub(1)?;
            Some(self.cursor)
        } else if self.cursor < self.text.len() {
            self.cursor += 1;
            Some(self.cursor - 1)
        } else {
            None
        }
    }

    fn advance(&mut self, mask: u64) {
        let mut previous_old = self.state[0];
        self.state[0] = ((self.state[0] << 1) | 1) & mask;
        for d in 1..self.state.len() {
            let old = self.state[d];
            let mut next = (((old << 1) | 1) & mask) | (previous_old << 1) | 1;
            if self.indels {
                // Deletion skips a motif letter, insertion skips a text letter.
                next |= (self.state[d - 1] << 1) | 1 | previous_old;
            }
            self.state[d] = next;
            previous_old = old;
        }
    }
}

impl Iterator for BitapMatcher<'_> {
    type Item = BitapMatch;

    fn next(&mut self) -> Option<BitapMatch> {
        while let Some(position) = self.step() {
            self.advance(self.masks[self.text[position] as usize]);
            if let Some(errors) = self.state.iter().position(|&s| s & self.last_bit != 0) {
                return Some(BitapMatch { position, errors });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabets::nucleotide;
    use proptest::prelude::*;

    fn nt(text: &str) -> Sequence {
        Sequence::nucleotide(text).unwrap()
    }

    fn pattern(text: &str) -> BitapPattern {
        Motif::new(nucleotide(), text).unwrap().bitap_pattern().unwrap()
    }

    fn hits(matcher: BitapMatcher<'_>) -> Vec<(usize, usize)> {
        matcher.map(|m| (m.position, m.errors)).collect()
    }

    const TEXT: &str = "ACTGCGATAAATTAGACAGTACGTA";
    const WITH_DELETION: &str = "ACTGCGATAAATAGACAGTACGTA";
    const WITH_INSERTION: &str = "ACTGCGATAAATTATGACAGTACGTA";
    const WITH_MISMATCH: &str = "ACTGCGATAAATTACACAGTACGTA";

    #[test]
    fn exact_search_finds_leftmost() {
        let p = pattern("ATTAGACA");
        assert_eq!(p.exact_search(&nt(TEXT), 0).unwrap(), Some(10));
        assert_eq!(p.exact_search(&nt(TEXT), 10).unwrap(), Some(10));
        assert_eq!(p.exact_search(&nt(TEXT), 11).unwrap(), None);
        assert_eq!(p.exact_search(&nt(TEXT), 100).unwrap(), None);
    }

    #[test]
    fn exact_search_with_wildcards() {
        let p = pattern("ATTRGACA");
        assert_eq!(p.exact_search(&nt(TEXT), 0).unwrap(), Some(10));
        assert_eq!(p.exact_search(&nt("ACTGCGATAAATTGGACAGTACGTA"), 0).unwrap(), Some(10));
        assert_eq!(p.exact_search(&nt("ACTGCGATAAATTCGACAGTACGTA"), 0).unwrap(), None);
    }

    #[test]
    fn wrong_alphabet_and_size_are_rejected() {
        let p = pattern("ATTAGACA");
        let protein = Sequence::amino_acid("CASSLAPGAT").unwrap();
        assert!(matches!(
            p.exact_search(&protein, 0),
            Err(BioError::AlphabetMismatch { .. })
        ));
        assert!(Motif::new(nucleotide(), "").unwrap().bitap_pattern().is_err());
        let long = "A".repeat(MAX_PATTERN_SIZE + 1);
        assert!(Motif::new(nucleotide(), &long).unwrap().bitap_pattern().is_err());
    }

    #[test]
    fn indel_matcher_last_reaches_exact_end() {
        let p = pattern("ATTAGACA");
        let seq = nt(TEXT);
        let found = p
            .substitution_and_indel_matcher_last(1, &seq)
            .unwrap()
            .find(|m| m.errors == 0);
        assert_eq!(found.map(|m| m.position), Some(17));
    }

    #[test]
    fn indel_matcher_last_single_edits() {
        let p = pattern("ATTAGACA");
        for (text, end) in [(WITH_DELETION, 16), (WITH_INSERTION, 18), (WITH_MISMATCH, 17)] {
            let seq = nt(text);
            let found = hits(p.substitution_and_indel_matcher_last(1, &seq).unwrap());
            assert_eq!(found, vec![(end, 1)], "{text}");
        }
    }

    #[test]
    fn indel_matcher_first_single_edits() {
        let p = pattern("ATTAGACA");
        let seq = nt(TEXT);
        let found = p
            .substitution_and_indel_matcher_first(1, &seq)
            .unwrap()
            .find(|m| m.errors == 0);
        assert_eq!(found.map(|m| m.position), Some(10));

        let seq = nt(WITH_DELETION);
        let found = hits(p.substitution_and_indel_matcher_first(1, &seq).unwrap());
        assert_eq!(found, vec![(10, 1), (9, 1)]);

        for text in [WITH_INSERTION, WITH_MISMATCH] {
            let seq = nt(text);
            let found = hits(p.substitution_and_indel_matcher_first(1, &seq).unwrap());
            assert_eq!(found, vec![(10, 1)], "{text}");
        }
    }

    #[test]
    fn substitution_matcher_first() {
        let p = pattern("ATTRGACA");
        let seq = nt(TEXT);
        let mut matcher = p.substitution_only_matcher_first(1, &seq).unwrap();
        assert_eq!(matcher.next(), Some(BitapMatch { position: 10, errors: 0 }));

        let seq = nt("ACTGCGATAAATCAGACAGTACGTA");
        let mut matcher = p.substitution_only_matcher_first(1, &seq).unwrap();
        assert_eq!(matcher.next(), Some(BitapMatch { position: 10, errors: 1 }));
    }

    #[test]
    fn zero_errors_agree_with_exact_search() {
        let p = pattern("ATTAGACA");
        let seq = nt(TEXT);
        let last = hits(p.substitution_only_matcher_last(0, &seq).unwrap());
        assert_eq!(last, vec![(17, 0)]);
        let first = hits(p.substitution_and_indel_matcher_first(0, &seq).unwrap());
        assert_eq!(first, vec![(10, 0)]);
    }

    fn hamming(motif: &Motif, codes: &[u8]) -> usize {
        codes
            .iter()
            .enumerate()
            .filter(|&(i, &c)| !motif.accepts(i, c))
            .count()
    }

    proptest! {
        #[test]
        fn substitution_matchers_agree_with_hamming_distance(
            motif in prop::collection::vec(0u8..4, 1..20),
            text in prop::collection::vec(0u8..4, 0..60),
            max_errors in 0usize..4,
        ) {
            let motif = Motif::from_sequence(&Sequence::from_codes(nucleotide(), motif).unwrap());
            let seq = Sequence::from_codes(nucleotide(), text).unwrap();
            let p = motif.bitap_pattern().unwrap();
            let size = motif.size();
            let windows: Vec<(usize, usize)> = if seq.len() < size {
                Vec::new()
            } else {
                (0..=seq.len() - size)
                    .map(|s| (s, hamming(&motif, &seq.codes()[s..s + size])))
                    .filter(|&(_, d)| d <= max_errors)
                    .collect()
            };

            let first = hits(p.substitution_only_matcher_first(max_errors, &seq).unwrap());
            let expected: Vec<_> = windows.iter().rev().copied().collect();
            prop_assert_eq!(first, expected);

            let last = hits(p.substitution_only_matcher_last(max_errors, &seq).unwrap());
            let expected: Vec<_> = windows.iter().map(|&(s, d)| (s + size - 1, d)).collect();
            prop_assert_eq!(last, expected);
        }
    }
}
