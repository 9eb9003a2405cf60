//! Per-position mutation statistics over many alignments to one reference, and the consensus
//! derived from them.

use super::{Mutation, Mutations, MutationsBuilder};
use crate::align::{Alignment, Scoring};
use crate::alphabets::Alphabet;
use crate::error::{BioError, BioResult};
use crate::seq::sequence::check_same_alphabet;
use crate::seq::{Range, Sequence, SequenceQuality};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quality assigned to consensus letters no provider has lowered.
pub const DEFAULT_CONSENSUS_QUALITY: u8 = 57;

/// Quality of a consensus letter from the evidence at its reference position.
///
/// `mutations` is `None` where the consensus keeps the reference letter.
pub trait QualityProvider {
    fn quality(
        &self,
        coverage_weight: u64,
        mutation_weight: u64,
        mutations: Option<&[Mutation]>,
    ) -> u8;
}

impl<F> QualityProvider for F
where
    F: Fn(u64, u64, Option<&[Mutation]>) -> u8,
{
    fn quality(
        &self,
        coverage_weight: u64,
        mutation_weight: u64,
        mutations: Option<&[Mutation]>,
    ) -> u8 {
        self(coverage_weight, mutation_weight, mutations)
    }
}

pub trait MutationsFilter {
    fn accept(
        &self,
        position: usize,
        mutations: &[Mutation],
        coverage_weight: u64,
        mutation_weight: u64,
    ) -> bool;
}

/// Keeps mutation groups seen often enough, in absolute and relative terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleMutationsFilter {
    pub minimal_coverage: u64,
    pub minimal_ratio: f64,
}

impl MutationsFilter for SimpleMutationsFilter {
    fn accept(&self, _: usize, _: &[Mutation], coverage_weight: u64, mutation_weight: u64) -> bool {
        if coverage_weight == 0 || coverage_weight < self.minimal_coverage {
            return false;
        }
        mutation_weight as f64 / coverage_weight as f64 >= self.minimal_ratio
    }
}

/// Weighted counter over absolute positions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct CoverageCounter {
    weights: Vec<u64>,
}

impl CoverageCounter {
    fn add(&mut self, range: Range, weight: u64) {
        if self.weights.len() < range.to() {
            self.weights.resize(range.to(), 0);
        }
        for w in &mut self.weights[range.from()..range.to()] {
            *w += weight;
        }
    }

    fn add_one(&mut self, position: usize, weight: u64) {
        self.add(Range::new(position, position + 1), weight);
    }

    fn total(&self, position: usize) -> u64 {
        self.weights.get(position).copied().unwrap_or(0)
    }
}

/// Splits absolute mutations into runs sharing a position.
fn position_groups(mutations: &Mutations) -> impl Iterator<Item = (usize, &[Mutation])> {
    mutations
        .as_slice()
        .chunk_by(|a, b| a.position() == b.position())
        .map(|group| (group[0].position(), group))
}

#[derive(Debug)]
pub struct AggregatedMutationsBuilder {
    alphabet: &'static Alphabet,
    range: Option<Range>,
    coverage: CoverageCounter,
    mutation_weight: CoverageCounter,
    votes: BTreeMap<usize, BTreeMap<Vec<Mutation>, u64>>,
}

impl AggregatedMutationsBuilder {
    pub fn new(alphabet: &'static Alphabet) -> Self {
        AggregatedMutationsBuilder {
            alphabet,
            range: None,
            coverage: CoverageCounter::default(),
            mutation_weight: CoverageCounter::default(),
            votes: BTreeMap::new(),
        }
    }

    /// Accumulates one alignment against the shared reference.
    pub fn add(&mut self, alignment: &Alignment, weight: u64) -> BioResult<&mut Self> {
        check_same_alphabet(self.alphabet, alignment.sequence1().alphabet())?;
        let r = alignment.sequence1_range();
        self.range = Some(match self.range {
            None => r,
            Some(cur) => Range::new(cur.from().min(r.from()), cur.to().max(r.to())),
        });
        self.coverage.add(r, weight);
        for (position, group) in position_groups(alignment.absolute_mutations()) {
            self.mutation_weight.add_one(position, weight);
            *self
                .votes
                .entry(position)
                .or_default()
                .entry(group.to_vec())
                .or_insert(0) += weight;
        }
        Ok(self)
    }

    /// Keeps, per position, the heaviest mutation group when it outweighs the reference letter.
    pub fn build(self) -> AggregatedMutations {
        let mut mutations = BTreeMap::new();
        for (position, groups) in self.votes {
            // Ties go to the smallest group in packed order.
            let Some((group, weight)) = groups
                .into_iter()
                .fold(None, |best: Option<(Vec<Mutation>, u64)>, (g, w)| match best {
                    Some((_, bw)) if bw >= w => best,
                    _ => Some((g, w)),
                })
            else {
                continue;
            };
            let mutated = self.mutation_weight.total(position);
            let mut coverage = self.coverage.total(position);
            if group[0].is_insertion() && position > 0 {
                coverage = coverage.max(self.coverage.total(position - 1));
            }
            let reference = coverage.saturating_sub(mutated);
            if weight > reference {
                mutations.insert(position, group);
            }
        }
        debug!(
            "aggregated {} positions with consensus mutations",
            mutations.len()
        );
        AggregatedMutations {
            alphabet: self.alphabet,
            coverage: self.coverage,
            mutation_weight: self.mutation_weight,
            mutations,
            range: self.range.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedMutations {
    alphabet: &'static Alphabet,
    coverage: CoverageCounter,
    mutation_weight: CoverageCounter,
    mutations: BTreeMap<usize, Vec<Mutation>>,
    range: Range,
}

impl AggregatedMutations {
    pub fn alphabet(&self) -> &'static Alphabet {
        self.alphabet
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn coverage_weight(&self, position: usize) -> u64 {
        self.coverage.total(position)
    }

    pub fn mutation_weight(&self, position: usize) -> u64 {
        self.mutation_weight.total(position)
    }

    /// Consensus mutations at `position`; empty when the reference letter wins.
    pub fn mutation(&self, position: usize) -> Mutations {
        match self.mutations.get(&position) {
            Some(group) => Mutations::from_vec_unchecked(self.alphabet, group.clone()),
            None => Mutations::empty(self.alphabet),
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.mutations.keys().copied()
    }

    /// Same statistics with only the mutation groups accepted by `filter`.
    pub fn filtered(&self, filter: &impl MutationsFilter) -> AggregatedMutations {
        let mutations = self
            .mutations
            .iter()
            .filter(|(&position, group)| {
                filter.accept(
                    position,
                    group,
                    self.coverage_weight(position),
                    self.mutation_weight(position),
                )
            })
            .map(|(&p, g)| (p, g.clone()))
            .collect();
        AggregatedMutations {
            mutations,
            ..self.clone()
        }
    }

    /// Builds the consensus sequence over the aggregated range of `reference`.
    ///
    /// Insertions recorded at the end of the range are not part of the consensus.
    pub fn build_alignments(
        &self,
        reference: &Sequence,
        quality_provider: &impl QualityProvider,
        scoring: &Scoring,
    ) -> BioResult<Consensus> {
        check_same_alphabet(self.alphabet, reference.alphabet())?;
        let (from, to) = (self.range.from(), self.range.to());
        if to > reference.len() {
            return Err(BioError::InvalidRange {
                from,
                to,
                len: reference.len(),
            });
        }

        let inside = self.mutations.range(from..to);
        let delta: isize = inside
            .clone()
            .flat_map(|(_, g)| g.iter())
            .map(|m| m.length_delta())
            .sum();
        let length = (self.range.length() as isize + delta) as usize;
        let mut quality = vec![DEFAULT_CONSENSUS_QUALITY; length];
        let mut lower = |index: usize, q: u8| {
            if let Some(v) = quality.get_mut(index) {
                *v = (*v).min(q);
            }
        };

        let mut builder = MutationsBuilder::new(self.alphabet);
        let mut shift = 0isize;
        for position in from..to {
            let group = self.mutations.get(&position).map(Vec::as_slice);
            let mut coverage = self.coverage_weight(position);
            if group.is_some_and(|g| g.iter().any(|m| m.is_insertion())) && position > 0 {
                coverage = coverage.max(self.coverage_weight(position - 1));
            }
            let q = quality_provider.quality(coverage, self.mutation_weight(position), group);
            let index = ((position - from) as isize + shift) as usize;
            let Some(group) = group else {
                lower(index, q);
                continue;
            };
            let group_delta: isize = group.iter().map(|m| m.length_delta()).sum();
            match group_delta {
                0 => lower(index, q),
                d if d < 0 => {
                    if index >= 1 {
                        lower(index - 1, q);
                    }
                    lower(index, q);
                }
                d => {
                    for i in 0..=d as usize {
                        lower(index + i, q);
                    }
                }
            }
            for &m in group {
                builder.append(m);
            }
            shift += group_delta;
        }

        let mutations = builder.build();
        let sequence = mutations
            .move_by(-(from as isize))
            .mutate(&reference.range(self.range))?;
        let alignment = Alignment::scored(
            scoring,
            reference.clone(),
            mutations,
            self.range,
            Range::new(0, sequence.len()),
        )?;
        Ok(Consensus {
            sequence,
            quality: SequenceQuality::new(quality),
            alignment,
        })
    }
}

/// Consensus letters with their qualities; `alignment` maps the reference onto `sequence`.
#[derive(Clone, Debug, PartialEq)]
pub struct Consensus {
    pub sequence: Sequence,
    pub quality: SequenceQuality,
    pub alignment: Alignment,
}

impl Consensus {
    /// Cuts the consensus at every letter with quality `<= threshold`, dropping that letter.
    pub fn split(&self, threshold: u8, scoring: &Scoring) -> BioResult<Vec<Consensus>> {
        let range1 = self.alignment.sequence1_range();
        let mut result = Vec::new();
        let mut begin = range1.from();
        for position in range1.from()..range1.to() {
            let Some(Ok(position2)) = self.alignment.convert_position(position) else {
                continue;
            };
            if self.quality.value(position2) <= threshold {
                if position > begin {
                    self.push_fragment(&mut result, Range::new(begin, position), scoring)?;
                }
                begin = position + 1;
            }
        }
        if range1.to() > begin {
            self.push_fragment(&mut result, Range::new(begin, range1.to()), scoring)?;
        }
        Ok(result)
    }

    fn push_fragment(
        &self,
        result: &mut Vec<Consensus>,
        range: Range,
        scoring: &Scoring,
    ) -> BioResult<()> {
        let part = self.alignment.get_range(range, scoring)?;
        let range2 = part.sequence2_range();
        if range2.is_empty() {
            return Ok(());
        }
        let alignment = Alignment::new(
            part.sequence1().clone(),
            part.absolute_mutations().clone(),
            range,
            Range::new(0, range2.length()),
            part.score(),
        )?;
        result.push(Consensus {
            sequence: self.sequence.range(range2),
            quality: self.quality.range(range2),
            alignment,
        });
        Ok(())
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

    fn alignment(reference: &Sequence, mutations: &str, range: Range) -> Alignment {
        let m = decode(mutations, nucleotide()).unwrap();
        let len2 = (range.length() as isize + m.length_delta()) as usize;
        Alignment::new(reference.clone(), m, range, Range::new(0, len2), 0.0).unwrap()
    }

    fn aggregated(reference: &Sequence) -> AggregatedMutations {
        let mut builder = AggregatedMutationsBuilder::new(nucleotide());
        builder
            .add(&alignment(reference, "SA3CI6T", Range::new(0, 10)), 1)
            .unwrap()
            .add(&alignment(reference, "SA3CI6T", Range::new(0, 10)), 1)
            .unwrap()
            .add(&alignment(reference, "DG4", Range::new(2, 8)), 1)
            .unwrap();
        builder.build()
    }

    fn by_coverage(coverage: u64, _: u64, _: Option<&[Mutation]>) -> u8 {
        (coverage * 10) as u8
    }

    #[test]
    fn counters_and_votes() {
        let reference = nt("ATTAGACAGG");
        let agg = aggregated(&reference);
        assert_eq!(agg.range(), Range::new(0, 10));
        assert_eq!(agg.coverage_weight(1), 2);
        assert_eq!(agg.coverage_weight(4), 3);
        assert_eq!(agg.mutation_weight(3), 2);
        assert_eq!(agg.mutation_weight(4), 1);
        assert_eq!(agg.mutation(3), decode("SA3C", nucleotide()).unwrap());
        // outvoted by the reference letter
        assert!(agg.mutation(4).is_empty());
        assert_eq!(agg.positions().collect::<Vec<_>>(), vec![3, 6]);
    }

    #[test]
    fn consensus_sequence_and_quality() {
        let reference = nt("ATTAGACAGG");
        let scoring = Scoring::nucleotide_blast_linear();
        let consensus = aggregated(&reference)
            .build_alignments(&reference, &by_coverage, &scoring)
            .unwrap();
        assert_eq!(consensus.sequence, nt("ATTCGATCAGG"));
        assert_eq!(
            consensus.quality.values(),
            &[20, 20, 30, 30, 30, 30, 30, 30, 30, 20, 20]
        );
        assert_eq!(consensus.alignment.sequence2_range(), Range::new(0, 11));
        assert_eq!(consensus.alignment.score(), 9.0 * 5.0 - 4.0 - 5.0);
    }

    #[test]
    fn default_quality_caps_provider() {
        let reference = nt("ATTAGACAGG");
        let generous = |_: u64, _: u64, _: Option<&[Mutation]>| 90u8;
        let consensus = aggregated(&reference)
            .build_alignments(&reference, &generous, &Scoring::nucleotide_blast_linear())
            .unwrap();
        assert!(consensus
            .quality
            .values()
            .iter()
            .all(|&q| q == DEFAULT_CONSENSUS_QUALITY));
    }

    #[test]
    fn split_at_low_quality() {
        let reference = nt("ATTAGACAGG");
        let scoring = Scoring::nucleotide_blast_linear();
        let consensus = aggregated(&reference)
            .build_alignments(&reference, &by_coverage, &scoring)
            .unwrap();
        let parts = consensus.split(20, &scoring).unwrap();
        assert_eq!(parts.len(), 1);
        let part = &parts[0];
        assert_eq!(part.sequence, nt("TCGATCA"));
        assert_eq!(part.quality.values(), &[30; 7]);
        assert_eq!(part.alignment.sequence1_range(), Range::new(2, 8));
        assert_eq!(
            part.alignment
                .relative_mutations()
                .mutate(&reference.range(Range::new(2, 8)))
                .unwrap(),
            part.sequence
        );
        assert!(consensus.split(0, &scoring).unwrap()[0].sequence == consensus.sequence);
    }

    #[test]
    fn filter_by_ratio() {
        let agg = aggregated(&nt("ATTAGACAGG"));
        let loose = SimpleMutationsFilter {
            minimal_coverage: 3,
            minimal_ratio: 0.5,
        };
        assert_eq!(agg.filtered(&loose).positions().count(), 2);
        let strict = SimpleMutationsFilter {
            minimal_coverage: 3,
            minimal_ratio: 0.7,
        };
        assert_eq!(agg.filtered(&strict).positions().count(), 0);
        let json = serde_json::to_string(&loose).unwrap();
        assert_eq!(json, r#"{"minimalCoverage":3,"minimalRatio":0.5}"#);
    }
}
