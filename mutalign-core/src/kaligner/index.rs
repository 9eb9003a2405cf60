//! K-mer postings over the reference set and seed lookup for queries.

use crate::alphabets::Alphabet;
use crate::seq::Sequence;
use std::collections::{BTreeMap, HashMap};

/// One seed of the query found in a reference.
///
/// `index` is the ordinal of the seed in the query, `offset` the reference position minus the
/// query position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KmerHit {
    pub index: u32,
    pub offset: i32,
}

/// Query seeds: packed k-mer per seed ordinal, `None` where the window holds a wildcard.
#[derive(Clone, Debug)]
pub struct Seeds {
    pub positions: Vec<usize>,
    pub kmers: Vec<Option<u64>>,
}

impl Seeds {
    /// Seeds every `step` positions, plus the last full window.
    pub fn new(query: &Sequence, k: usize, step: usize) -> Seeds {
        if k == 0 || query.len() < k {
            return Seeds {
                positions: Vec::new(),
                kmers: Vec::new(),
            };
        }
        let last = query.len() - k;
        let mut windows = vec![None; last + 1];
        for (position, kmer) in query.kmers(k) {
            windows[position] = Some(kmer);
        }
        let mut positions: Vec<usize> = (0..=last).step_by(step.max(1)).collect();
        if positions.last() != Some(&last) {
            positions.push(last);
        }
        let kmers = positions.iter().map(|&p| windows[p]).collect();
        Seeds { positions, kmers }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct KmerIndex {
    alphabet: &'static Alphabet,
    kmer_size: usize,
    postings: HashMap<u64, Vec<(u32, u32)>>,
    reference_count: usize,
}

impl KmerIndex {
    pub fn new(alphabet: &'static Alphabet, kmer_size: usize) -> Self {
        KmerIndex {
            alphabet,
            kmer_size,
            postings: HashMap::new(),
            reference_count: 0,
        }
    }

    pub fn alphabet(&self) -> &'static Alphabet {
        self.alphabet
    }

    pub fn kmer_size(&self) -> usize {
        self.kmer_size
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    /// Number of distinct k-mers indexed.
    pub fn distinct_kmers(&self) -> usize {
        self.postings.len()
    }

    /// Indexes `reference` under the next id and returns that id.
    pub fn add(&mut self, reference: &Sequence) -> usize {
        let id = self.reference_count;
        for (position, kmer) in reference.kmers(self.kmer_size) {
            self.postings
                .entry(kmer)
                .or_default()
                .push((id as u32, position as u32));
        }
        self.reference_count += 1;
        id
    }

    /// Hits of `seeds` grouped per reference id, each group sorted by `(index, offset)`.
    /// References without hits are absent.
    pub fn hits(&self, seeds: &Seeds) -> BTreeMap<usize, Vec<KmerHit>> {
        let mut per_reference: BTreeMap<usize, Vec<KmerHit>> = BTreeMap::new();
        for (index, (kmer, &query_position)) in seeds.kmers.iter().zip(&seeds.positions).enumerate()
        {
            let Some(postings) = kmer.and_then(|k| self.postings.get(&k)) else {
                continue;
            };
            for &(reference, position) in postings {
                per_reference.entry(reference as usize).or_default().push(KmerHit {
                    index: index as u32,
                    offset: position as i32 - query_position as i32,
                });
            }
        }
        for hits in per_reference.values_mut() {
            hits.sort_unstable();
        }
        per_reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabets::nucleotide;

    fn nt(s: &str) -> Sequence {
        Sequence::nucleotide(s).unwrap()
    }

    #[test]
    fn seeds_cover_both_ends() {
        let seeds = Seeds::new(&nt("ACGTACGTAC"), 4, 3);
        assert_eq!(seeds.positions, vec![0, 3, 6]);
        let seeds = Seeds::new(&nt("ACGTACGTACG"), 4, 3);
        assert_eq!(seeds.positions, vec![0, 3, 6, 7]);
        assert!(Seeds::new(&nt("ACG"), 4, 1).is_empty());
    }

    #[test]
    fn wildcard_seeds_are_skipped() {
        let seeds = Seeds::new(&nt("ACGNACGT"), 4, 4);
        assert_eq!(seeds.positions, vec![0, 4]);
        assert_eq!(seeds.kmers[0], None);
        assert!(seeds.kmers[1].is_some());
    }

    #[test]
    fn hits_carry_offsets() {
        let mut index = KmerIndex::new(nucleotide(), 4);
        assert_eq!(index.add(&nt("ACGTACGTACGG")), 0);
        assert_eq!(index.add(&nt("GGGGGGGG")), 1);
        let seeds = Seeds::new(&nt("ACGTACGG"), 4, 4);
        let hits = index.hits(&seeds);
        assert_eq!(
            hits[&0],
            vec![
                KmerHit { index: 0, offset: 0 },
                KmerHit { index: 0, offset: 4 },
                KmerHit { index: 1, offset: 4 },
            ]
        );
        assert!(!hits.contains_key(&1));
        assert!(index.hits(&Seeds::new(&nt("CCCCCCCC"), 4, 4)).is_empty());
    }
}
