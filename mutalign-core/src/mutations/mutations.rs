use super::mutation::{Mutation, MutationType};
use crate::alphabets::Alphabet;
use crate::error::{BioError, BioResult};
use crate::seq::sequence::check_same_alphabet;
use crate::seq::{Range, Sequence, SequenceQuality, SequenceWithQuality};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable, position-sorted list of mutations over one alphabet.
#[derive(Clone)]
pub struct Mutations {
    alphabet: &'static Alphabet,
    data: Arc<[Mutation]>,
}

impl Mutations {
    pub fn empty(alphabet: &'static Alphabet) -> Self {
        Mutations {
            alphabet,
            data: Arc::from(Vec::new()),
        }
    }

    /// Validates ordering and letter codes.
    pub fn from_vec(alphabet: &'static Alphabet, data: Vec<Mutation>) -> BioResult<Self> {
        if let Some(m) = data.iter().find(|m| {
            m.from() as usize >= alphabet.size() || m.to() as usize >= alphabet.size()
        }) {
            return Err(BioError::IllegalMutations {
                msg: format!("{m:?} uses codes outside the {alphabet} alphabet"),
            });
        }
        if let Some(w) = data.windows(2).find(|w| !is_ordered(w[0], w[1])) {
            return Err(BioError::IllegalMutations {
                msg: format!("{:?} followed by {:?} is out of order", w[0], w[1]),
            });
        }
        Ok(Self::from_vec_unchecked(alphabet, data))
    }

    pub(crate) fn from_vec_unchecked(alphabet: &'static Alphabet, data: Vec<Mutation>) -> Self {
        debug_assert!(data.windows(2).all(|w| is_ordered(w[0], w[1])));
        Mutations {
            alphabet,
            data: data.into(),
        }
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
    pub fn get(&self, index: usize) -> Mutation {
        self.data[index]
    }

    pub fn as_slice(&self) -> &[Mutation] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = Mutation> + '_ {
        self.data.iter().copied()
    }

    pub fn length_delta(&self) -> isize {
        self.data.iter().map(|m| m.length_delta()).sum()
    }

    pub fn count(&self, kind: MutationType) -> usize {
        self.data.iter().filter(|m| m.kind() == kind).count()
    }

    pub fn first_position(&self) -> Option<usize> {
        self.data.first().map(|m| m.position())
    }

    pub fn last_position(&self) -> Option<usize> {
        self.data.last().map(|m| m.position())
    }

    /// Index of the first mutation at `position`, or where one would be inserted.
    pub fn first_mutation_with_position(&self, position: usize) -> Result<usize, usize> {
        let idx = self.data.partition_point(|m| m.position() < position);
        match self.data.get(idx) {
            Some(m) if m.position() == position => Ok(idx),
            _ => Err(idx),
        }
    }

    /// # Panics
    /// Panics if a position would become negative.
    pub fn move_by(&self, offset: isize) -> Mutations {
        if offset == 0 {
            return self.clone();
        }
        Self::from_vec_unchecked(self.alphabet, self.iter().map(|m| m.move_by(offset)).collect())
    }

    /// Mutations touching `range` (substitutions and deletions inside it, insertions in
    /// `(from, to]`) with positions kept absolute.
    pub fn extract_absolute_range(&self, range: Range) -> Mutations {
        Self::from_vec_unchecked(
            self.alphabet,
            self.iter()
                .filter(|m| {
                    let p = m.position();
                    if m.is_insertion() {
                        range.from() < p && p <= range.to()
                    } else {
                        range.contains(p)
                    }
                })
                .collect(),
        )
    }

    /// Same as [`Mutations::extract_absolute_range`] moved to start at zero.
    pub fn extract_relative_range(&self, range: Range) -> Mutations {
        self.extract_absolute_range(range)
            .move_by(-(range.from() as isize))
    }

    /// Positions touched in the original sequence; insertions count as their boundary.
    pub fn mutated_range(&self) -> Option<Range> {
        let first = self.data.first()?;
        let last = self.data.last()?;
        let end = if last.is_insertion() {
            last.position()
        } else {
            last.position() + 1
        };
        Some(Range::new(first.position(), end.max(first.position())))
    }

    pub fn is_compatible_with(&self, sequence: &Sequence) -> bool {
        self.alphabet == sequence.alphabet()
            && self.iter().all(|m| {
                let p = m.position();
                if m.is_insertion() {
                    p <= sequence.len()
                } else {
                    p < sequence.len() && sequence.code_at(p) == m.from()
                }
            })
    }

    pub fn mutate(&self, sequence: &Sequence) -> BioResult<Sequence> {
        check_same_alphabet(self.alphabet, sequence.alphabet())?;
        let codes = sequence.codes();
        let mut out = Vec::with_capacity(
            (codes.len() as isize + self.length_delta()).max(0) as usize,
        );
        let mut pointer = 0usize;
        for m in self.iter() {
            let p = self.checked_position(m, pointer, codes.len())?;
            out.extend_from_slice(&codes[pointer..p]);
            pointer = p;
            match m.kind() {
                MutationType::Substitution => {
                    self.expect_from(m, codes[p])?;
                    out.push(m.to());
                    pointer += 1;
                }
                MutationType::Deletion => {
                    self.expect_from(m, codes[p])?;
                    pointer += 1;
                }
                MutationType::Insertion => out.push(m.to()),
            }
        }
        out.extend_from_slice(&codes[pointer..]);
        Ok(Sequence::from_codes_unchecked(self.alphabet, out))
    }

    /// Applies the mutations to a sequence and derives its quality track.
    ///
    /// An inserted letter gets the mean of the qualities around the insertion point.
    pub fn mutate_with_quality(&self, input: &SequenceWithQuality) -> BioResult<SequenceWithQuality> {
        let sequence = self.mutate(input.sequence())?;
        let quality = input.quality().values();
        let mut out = Vec::with_capacity(sequence.len());
        let mut pointer = 0usize;
        for m in self.iter() {
            let p = m.position();
            out.extend_from_slice(&quality[pointer..p]);
            pointer = p;
            match m.kind() {
                MutationType::Substitution => {
                    out.push(quality[p]);
                    pointer += 1;
                }
                MutationType::Deletion => pointer += 1,
                MutationType::Insertion => out.push(inserted_quality(quality, p)),
            }
        }
        out.extend_from_slice(&quality[pointer..]);
        SequenceWithQuality::new(sequence, SequenceQuality::new(out))
    }

    fn checked_position(&self, m: Mutation, pointer: usize, len: usize) -> BioResult<usize> {
        let p = m.position();
        let in_bounds = if m.is_insertion() { p <= len } else { p < len };
        if p < pointer || !in_bounds {
            return Err(BioError::IllegalMutations {
                msg: format!("{m:?} does not fit a sequence of length {len}"),
            });
        }
        Ok(p)
    }

    fn expect_from(&self, m: Mutation, actual: u8) -> BioResult<()> {
        if m.from() != actual {
            return Err(BioError::MutationMismatch {
                position: m.position(),
                expected: char::from(self.alphabet.symbol(m.from())),
                actual: char::from(self.alphabet.symbol(actual)),
            });
        }
        Ok(())
    }

    /// Maps a position of the original sequence into the mutated one.
    ///
    /// `Err` carries the insertion point when the letter itself was deleted.
    pub fn convert_position(&self, position: usize) -> Result<usize, usize> {
        let mut delta = 0isize;
        for m in self.iter() {
            if m.position() > position {
                break;
            }
            if m.position() == position {
                match m.kind() {
                    MutationType::Insertion => delta += 1,
                    MutationType::Deletion => return Err(shift(position, delta)),
                    MutationType::Substitution => {}
                }
            } else {
                delta += m.length_delta();
            }
        }
        Ok(shift(position, delta))
    }

    /// Mutations equivalent to applying `self` and then `other` to the result.
    pub fn combine_with(&self, other: &Mutations) -> BioResult<Mutations> {
        check_same_alphabet(self.alphabet, other.alphabet)?;
        let first = &self.data;
        let mut builder = MutationsBuilder::with_capacity(self.alphabet, self.len() + other.len());
        let mut i = 0usize;
        // position in the intermediate sequence minus position in the original one
        let mut delta = 0isize;

        for m2 in other.iter() {
            let q = m2.position();
            while let Some(&m1) = first.get(i) {
                let at = shift(m1.position(), delta);
                let before = if m1.is_deletion() { at <= q } else { at < q };
                if !before {
                    break;
                }
                builder.append_normalized(m1);
                delta += m1.length_delta();
                i += 1;
            }

            let k = shift(q, -delta);
            if m2.is_insertion() {
                builder.append_normalized(Mutation::insertion(k, m2.to()));
                continue;
            }

            let source = first
                .get(i)
                .copied()
                .filter(|m1| !m1.is_deletion() && shift(m1.position(), delta) == q);
            match source {
                Some(m1) if m1.is_insertion() => {
                    i += 1;
                    delta += 1;
                    if m2.is_substitution() {
                        builder.append_normalized(Mutation::insertion(m1.position(), m2.to()));
                    }
                }
                Some(m1) => {
                    i += 1;
                    if m2.is_substitution() {
                        builder.append_normalized(Mutation::substitution(
                            m1.position(),
                            m1.from(),
                            m2.to(),
                        ));
                    } else {
                        builder.append_normalized(Mutation::deletion(m1.position(), m1.from()));
                    }
                }
                None => {
                    if m2.is_substitution() {
                        builder.append_normalized(Mutation::substitution(k, m2.from(), m2.to()));
                    } else {
                        builder.append_normalized(Mutation::deletion(k, m2.from()));
                    }
                }
            }
        }

        for &m1 in &first[i..] {
            builder.append_normalized(m1);
        }
        Ok(builder.build())
    }

    /// Mutations turning the mutated sequence back into the original one.
    pub fn invert(&self) -> Mutations {
        let mut builder = MutationsBuilder::with_capacity(self.alphabet, self.len());
        let mut delta = 0isize;
        for m in self.iter() {
            let p = shift(m.position(), delta);
            match m.kind() {
                MutationType::Substitution => {
                    builder.append_normalized(Mutation::substitution(p, m.to(), m.from()))
                }
                MutationType::Deletion => {
                    builder.append_normalized(Mutation::insertion(p, m.from()));
                    delta -= 1;
                }
                MutationType::Insertion => {
                    builder.append_normalized(Mutation::deletion(p, m.to()));
                    delta += 1;
                }
            };
        }
        builder.build()
    }

    /// Folds each deletion directly followed by an insertion at the same edit point into a
    /// substitution and drops substitutions of a letter by itself; the result passes
    /// [`check`](crate::mutations::check) and mutates any sequence the same way.
    pub fn normalize(&self) -> Mutations {
        let mut builder = MutationsBuilder::with_capacity(self.alphabet, self.len());
        for m in self.iter() {
            builder.append_normalized(m);
        }
        builder.build()
    }

    /// Moves every indel to the leftmost equivalent position inside its homopolymer run.
    pub fn shift_indels_at_homopolymers(&self, sequence: &Sequence) -> BioResult<Mutations> {
        check_same_alphabet(self.alphabet, sequence.alphabet())?;
        let mut shifted = Vec::with_capacity(self.len());
        let mut floor = 0usize;
        for m in self.iter() {
            if m.is_substitution() {
                floor = m.position() + 1;
                shifted.push(m);
                continue;
            }
            let letter = if m.is_deletion() { m.from() } else { m.to() };
            let mut p = m.position();
            while p > floor && p <= sequence.len() && sequence.code_at(p - 1) == letter {
                p -= 1;
            }
            let moved = m.with_position(p);
            floor = if moved.is_deletion() { p + 1 } else { p };
            shifted.push(moved);
        }
        Mutations::from_vec(self.alphabet, shifted)
    }
}

#[inline]
fn shift(position: usize, delta: isize) -> usize {
    (position as isize + delta) as usize
}

fn inserted_quality(quality: &[u8], position: usize) -> u8 {
    match (position.checked_sub(1).and_then(|p| quality.get(p)), quality.get(position)) {
        (Some(&l), Some(&r)) => ((l as u16 + r as u16) / 2) as u8,
        (Some(&q), None) | (None, Some(&q)) => q,
        (None, None) => 0,
    }
}

/// Valid successor: strictly later position, or anything after an insertion at the same one.
#[inline]
pub(crate) fn is_ordered(a: Mutation, b: Mutation) -> bool {
    a.position() < b.position() || (a.position() == b.position() && a.is_insertion())
}

impl PartialEq for Mutations {
    fn eq(&self, other: &Self) -> bool {
        self.alphabet == other.alphabet && self.data[..] == other.data[..]
    }
}

impl Eq for Mutations {}

impl Hash for Mutations {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alphabet.name().hash(state);
        self.data[..].hash(state);
    }
}

impl fmt::Display for Mutations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, m) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(&m.encode(self.alphabet))?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for Mutations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mutations({self})")
    }
}

/// Growable mutation list, consumed by [`MutationsBuilder::build`].
#[derive(Debug)]
pub struct MutationsBuilder {
    alphabet: &'static Alphabet,
    data: Vec<Mutation>,
}

impl MutationsBuilder {
    pub fn new(alphabet: &'static Alphabet) -> Self {
        Self::with_capacity(alphabet, 0)
    }

    pub fn with_capacity(alphabet: &'static Alphabet, capacity: usize) -> Self {
        MutationsBuilder {
            alphabet,
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn alphabet(&self) -> &'static Alphabet {
        self.alphabet
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn last(&self) -> Option<Mutation> {
        self.data.last().copied()
    }

    /// # Panics
    /// Panics if `mutation` would break the ordering.
    pub fn append(&mut self, mutation: Mutation) -> &mut Self {
        if let Some(last) = self.last() {
            assert!(
                is_ordered(last, mutation),
                "{mutation:?} appended after {last:?}"
            );
        }
        self.data.push(mutation);
        self
    }

    pub fn append_all(&mut self, mutations: &Mutations) -> &mut Self {
        for m in mutations.iter() {
            self.append(m);
        }
        self
    }

    /// Appends while folding adjacent deletion/insertion pairs into substitutions and
    /// dropping no-op substitutions.
    pub(crate) fn append_normalized(&mut self, mutation: Mutation) {
        if mutation.is_substitution() && mutation.from() == mutation.to() {
            return;
        }
        if let Some(last) = self.last() {
            if mutation.is_insertion()
                && last.is_deletion()
                && last.position() + 1 == mutation.position()
            {
                self.data.pop();
                self.append_normalized(Mutation::substitution(
                    last.position(),
                    last.from(),
                    mutation.to(),
                ));
                return;
            }
            if mutation.is_deletion()
                && last.is_insertion()
                && last.position() == mutation.position()
            {
                self.data.pop();
                self.append_normalized(Mutation::substitution(
                    mutation.position(),
                    mutation.from(),
                    last.to(),
                ));
                return;
            }
        }
        self.data.push(mutation);
    }

    pub fn build(self) -> Mutations {
        Mutations::from_vec_unchecked(self.alphabet, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabets::nucleotide;
    use crate::mutations::decode;

    fn nt(s: &str) -> Sequence {
        Sequence::nucleotide(s).unwrap()
    }

    fn muts(s: &str) -> Mutations {
        decode(s, nucleotide()).unwrap()
    }

    #[test]
    fn mutate_simple() {
        let seq = nt("ATTAGACA");
        assert_eq!(muts("SA0CDT2I8T").mutate(&seq).unwrap(), nt("CTAGACAT"));
        assert_eq!(muts("I0GI0C").mutate(&seq).unwrap(), nt("GCATTAGACA"));
    }

    #[test]
    fn mutate_rejects_wrong_letter() {
        let err = muts("SG0C").mutate(&nt("ATTAGACA")).unwrap_err();
        assert!(matches!(
            err,
            BioError::MutationMismatch {
                position: 0,
                expected: 'G',
                actual: 'A'
            }
        ));
    }

    #[test]
    fn mutate_quality() {
        let input = SequenceWithQuality::new(
            nt("ACGT"),
            SequenceQuality::new(vec![10, 20, 30, 40]),
        )
        .unwrap();
        let out = muts("I0TSC1GI2ADT3I4C").mutate_with_quality(&input).unwrap();
        assert_eq!(out.sequence(), &nt("TAGAGC"));
        assert_eq!(out.quality().values(), &[10, 10, 20, 25, 30, 40]);
    }

    #[test]
    fn convert_position() {
        let m = muts("I1TDG2SA4C");
        assert_eq!(m.convert_position(0), Ok(0));
        assert_eq!(m.convert_position(1), Ok(2));
        assert_eq!(m.convert_position(2), Err(3));
        assert_eq!(m.convert_position(3), Ok(3));
        assert_eq!(m.convert_position(4), Ok(4));
    }

    #[test]
    fn first_mutation_with_position() {
        let m = muts("SA3CDT4I6AI6CDA6ST11G");
        assert_eq!(m.first_mutation_with_position(3), Ok(0));
        assert_eq!(m.first_mutation_with_position(4), Ok(1));
        assert_eq!(m.first_mutation_with_position(5), Err(2));
        assert_eq!(m.first_mutation_with_position(6), Ok(2));
        assert_eq!(m.first_mutation_with_position(11), Ok(5));
        assert_eq!(m.first_mutation_with_position(12), Err(6));
    }

    #[test]
    fn combine_sequences() {
        for (s1, s2, s3, m1, m2) in [
            ("ATTAGACA", "CATTACACA", "CATAGACA", "I0CSG4C", "DT3SC5G"),
            ("ATTAGACA", "ATTAGACA", "GATAG", "", "I0GDT1DA5DC6DA7"),
            ("ACGT", "AGT", "ACGT", "DC1", "I1C"),
        ] {
            let m1 = muts(m1);
            let m2 = muts(m2);
            assert_eq!(m1.mutate(&nt(s1)).unwrap(), nt(s2));
            assert_eq!(m2.mutate(&nt(s2)).unwrap(), nt(s3));
            let combined = m1.combine_with(&m2).unwrap();
            assert_eq!(combined.mutate(&nt(s1)).unwrap(), nt(s3), "{combined}");
            crate::mutations::check(&combined).unwrap();
        }
    }

    #[test]
    fn combine_restoring_letter_is_empty() {
        let m1 = muts("DC1");
        let m2 = muts("I1C");
        assert!(m1.combine_with(&m2).unwrap().is_empty());
    }

    #[test]
    fn invert_round_trip() {
        let s1 = nt("ATTAGACA");
        let m = muts("I0CSA3GDG4I8T");
        let s2 = m.mutate(&s1).unwrap();
        assert_eq!(m.invert().mutate(&s2).unwrap(), s1);
        assert!(m.combine_with(&m.invert()).unwrap().is_empty());
    }

    #[test]
    fn extract_range() {
        let m = muts("SA0CDT2I3GI8T");
        assert_eq!(m.extract_relative_range(Range::new(2, 8)), muts("DT0I1GI6T"));
        assert_eq!(m.extract_absolute_range(Range::new(0, 2)), muts("SA0C"));
    }

    #[test]
    fn shift_homopolymer_indels() {
        let seq = nt("ACCCGTTTA");
        let m = muts("DC3I7T");
        let shifted = m.shift_indels_at_homopolymers(&seq).unwrap();
        assert_eq!(shifted, muts("DC1I5T"));
        assert_eq!(shifted.mutate(&seq).unwrap(), m.mutate(&seq).unwrap());
    }

    #[test]
    fn builder_enforces_order() {
        let mut builder = MutationsBuilder::new(nucleotide());
        builder.append(Mutation::insertion(2, 1));
        builder.append(Mutation::substitution(2, 0, 1));
        let result = std::panic::catch_unwind(move || {
            builder.append(Mutation::insertion(2, 1));
        });
        assert!(result.is_err());
    }
}
