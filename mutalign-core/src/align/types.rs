use crate::alphabets::Alphabet;
use crate::mutations::{Mutation, Mutations, MutationsBuilder};

/// Traceback operations over `(sequence1, sequence2)`.
/// Del consumes sequence1 only, Ins consumes sequence2 only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CigarOp {
    /// Consumes both sequences.
    Match,
    /// Consumes sequence2, gap in sequence1.
    Ins,
    /// Consumes sequence1, gap in sequence2.
    Del,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Cigar {
    pub ops: Vec<(CigarOp, usize)>,
}

impl Cigar {
    pub fn push(&mut self, op: CigarOp, len: usize) {
        if len == 0 {
            return;
        }
        if let Some((last_op, last_len)) = self.ops.last_mut() {
            if *last_op == op {
                *last_len += len;
                return;
            }
        }
        self.ops.push((op, len));
    }

    pub fn len(&self) -> usize {
        self.ops.iter().map(|(_, n)| *n).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Letters of sequence1 and sequence2 spanned by the operations.
    pub fn consumed(&self) -> (usize, usize) {
        self.ops.iter().fold((0, 0), |(a, b), &(op, n)| match op {
            CigarOp::Match => (a + n, b + n),
            CigarOp::Del => (a + n, b),
            CigarOp::Ins => (a, b + n),
        })
    }

    pub fn reversed(&self) -> Cigar {
        Cigar {
            ops: self.ops.iter().rev().copied().collect(),
        }
    }

    /// Replays the operations from `(start1, start2)`; mismatching columns become
    /// substitutions. Positions are absolute in `seq1`.
    pub fn to_mutations(
        &self,
        alphabet: &'static Alphabet,
        seq1: &[u8],
        start1: usize,
        seq2: &[u8],
        start2: usize,
    ) -> Mutations {
        let mut builder = MutationsBuilder::new(alphabet);
        let (mut p1, mut p2) = (start1, start2);
        for &(op, len) in &self.ops {
            for _ in 0..len {
                match op {
                    CigarOp::Match => {
                        if seq1[p1] != seq2[p2] {
                            builder.append(Mutation::substitution(p1, seq1[p1], seq2[p2]));
                        }
                        p1 += 1;
                        p2 += 1;
                    }
                    CigarOp::Del => {
                        builder.append(Mutation::deletion(p1, seq1[p1]));
                        p1 += 1;
                    }
                    CigarOp::Ins => {
                        builder.append(Mutation::insertion(p1, seq2[p2]));
                        p2 += 1;
                    }
                }
            }
        }
        builder.build()
    }
}
