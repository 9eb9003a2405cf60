use super::accumulator::{Island, OffsetPacksAccumulator};
use super::index::{KmerIndex, Seeds};
use super::params::KAlignerParameters;
use crate::align::dp::{DpMode, FreeEnds};
use crate::align::{align_in, Alignment, ScoringModel};
use crate::error::BioResult;
use crate::seq::sequence::check_same_alphabet;
use crate::seq::{Range, Sequence};
use log::{debug, trace};

#[derive(Clone, Debug, PartialEq)]
pub struct KAlignmentHit {
    pub reference_id: usize,
    /// `sequence1` is the reference, `sequence2` the query.
    pub alignment: Alignment,
    /// Score of the seed chain the hit was extended from.
    pub cluster_score: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KAlignmentResult {
    pub query: Sequence,
    pub hits: Vec<KAlignmentHit>,
}

impl KAlignmentResult {
    fn empty(query: &Sequence) -> Self {
        KAlignmentResult {
            query: query.clone(),
            hits: Vec::new(),
        }
    }

    pub fn has_hits(&self) -> bool {
        !self.hits.is_empty()
    }

    pub fn best_hit(&self) -> Option<&KAlignmentHit> {
        self.hits.first()
    }
}

/// Chain of islands on one reference.
#[derive(Clone, Debug)]
struct Cluster {
    reference_id: usize,
    last_index: u32,
    last_offset: i32,
    min_offset: i32,
    max_offset: i32,
    score: i32,
    islands: usize,
}

impl Cluster {
    fn new(reference_id: usize, island: &Island) -> Self {
        Cluster {
            reference_id,
            last_index: island.last_index,
            last_offset: island.last_offset,
            min_offset: island.min_offset,
            max_offset: island.max_offset,
            score: island.score,
            islands: 1,
        }
    }

    fn join(&mut self, island: &Island, extra_score: i32) {
        self.last_index = island.last_index;
        self.last_offset = island.last_offset;
        self.min_offset = self.min_offset.min(island.min_offset);
        self.max_offset = self.max_offset.max(island.max_offset);
        self.score += island.score + extra_score;
        self.islands += 1;
    }
}

pub struct KAligner {
    params: KAlignerParameters,
    references: Vec<Sequence>,
    index: KmerIndex,
}

impl KAligner {
    pub fn new(params: KAlignerParameters) -> BioResult<Self> {
        params.validate()?;
        let index = KmerIndex::new(params.scoring.alphabet(), params.kmer_size);
        Ok(KAligner {
            params,
            references: Vec::new(),
            index,
        })
    }

    pub fn parameters(&self) -> &KAlignerParameters {
        &self.params
    }

    /// Indexes a reference and returns its id.
    pub fn add_reference(&mut self, reference: Sequence) -> BioResult<usize> {
        check_same_alphabet(self.params.scoring.alphabet(), reference.alphabet())?;
        let id = self.index.add(&reference);
        self.references.push(reference);
        Ok(id)
    }

    pub fn reference(&self, id: usize) -> &Sequence {
        &self.references[id]
    }

    pub fn references(&self) -> &[Sequence] {
        &self.references
    }

    pub fn align(&self, query: &Sequence) -> BioResult<KAlignmentResult> {
        check_same_alphabet(self.params.scoring.alphabet(), query.alphabet())?;
        let p = &self.params;
        if query.is_empty() || p.kmer_size >= query.len() {
            return Ok(KAlignmentResult::empty(query));
        }

        let seeds = Seeds::new(query, p.kmer_size, p.seed_step);
        let mut accumulator = OffsetPacksAccumulator::new(
            p.mapper_slot_count,
            p.mapper_max_cluster_indels,
            p.mapper_match_score,
            p.mapper_mismatch_score,
            p.mapper_offset_shift_score,
            p.mapper_absolute_min_cluster_score,
        );
        let mut clusters = Vec::new();
        for (reference_id, hits) in self.index.hits(&seeds) {
            accumulator.calculate_initial_partitioning(&hits);
            clusters.extend(self.chain(reference_id, accumulator.islands()));
        }

        let best = clusters.iter().map(|c| c.score).max().unwrap_or(0);
        let cluster_threshold = (p.mapper_absolute_min_score as f32)
            .max(best as f32 * p.mapper_relative_min_score);
        clusters.retain(|c| c.score as f32 >= cluster_threshold);
        clusters.sort_by(|a, b| b.score.cmp(&a.score));
        trace!("{} clusters above {cluster_threshold}", clusters.len());

        let mut hits = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            if let Some(hit) = self.extend(query, cluster)? {
                hits.push(hit);
            }
        }
        let result = self.rank(query, hits);
        debug!(
            "query of {} letters: {} seeds, {} clusters, {} hits",
            query.len(),
            seeds.len(),
            clusters.len(),
            result.hits.len()
        );
        Ok(result)
    }

    /// Aligns every query independently, in parallel when enabled.
    pub fn align_batch(&self, queries: &[Sequence]) -> BioResult<Vec<KAlignmentResult>> {
        par_try_map!(queries, |query: &Sequence| self.align(query))
    }

    /// Greedily chains islands with compatible offsets, in seed order.
    fn chain(&self, reference_id: usize, islands: &[Island]) -> Vec<Cluster> {
        let mut sorted = islands.to_vec();
        sorted.sort_by_key(|i| (i.first_index, i.first_offset));
        let max_indels = self.params.mapper_max_cluster_indels;
        let mut clusters: Vec<Cluster> = Vec::new();
        for island in &sorted {
            let target = clusters
                .iter_mut()
                .filter(|c| {
                    c.last_index < island.first_index
                        && (c.last_offset - island.first_offset).abs() <= max_indels
                })
                .max_by_key(|c| c.score);
            match target {
                Some(c) => c.join(island, self.params.mapper_extra_cluster_score),
                None => clusters.push(Cluster::new(reference_id, island)),
            }
        }
        clusters
    }

    /// Runs DP over the reference window a cluster points at.
    fn extend(&self, query: &Sequence, cluster: &Cluster) -> BioResult<Option<KAlignmentHit>> {
        let reference = &self.references[cluster.reference_id];
        let pad = self.params.mapper_max_cluster_indels as i64;
        let from = (cluster.min_offset as i64 - pad).max(0) as usize;
        let to = (cluster.max_offset as i64 + query.len() as i64 + pad)
            .clamp(0, reference.len() as i64) as usize;
        if from >= to {
            return Ok(None);
        }
        let mode = match (self.params.floating_left_bound, self.params.floating_right_bound) {
            (true, true) => DpMode::Local,
            (left, right) => DpMode::Bounded(FreeEnds {
                seq1_start: true,
                seq1_end: true,
                seq2_start: left,
                seq2_end: right,
            }),
        };
        let alignment = align_in(
            &self.params.scoring,
            reference,
            Range::new(from, to),
            query,
            Range::new(0, query.len()),
            mode,
        )?;
        if alignment.sequence1_range().is_empty() {
            return Ok(None);
        }
        Ok(Some(KAlignmentHit {
            reference_id: cluster.reference_id,
            alignment,
            cluster_score: cluster.score,
        }))
    }

    /// Applies score thresholds, drops hits overlapping a better one on the same reference,
    /// then keeps the best `max_hits`.
    fn rank(&self, query: &Sequence, mut hits: Vec<KAlignmentHit>) -> KAlignmentResult {
        let p = &self.params;
        let best = hits
            .iter()
            .map(|h| h.alignment.score())
            .fold(f32::NEG_INFINITY, f32::max);
        let threshold = p.absolute_min_score.max(best * p.relative_min_score);
        hits.retain(|h| h.alignment.score() >= threshold);
        hits.sort_by(|a, b| b.alignment.score().total_cmp(&a.alignment.score()));

        let mut kept: Vec<KAlignmentHit> = Vec::with_capacity(hits.len());
        for hit in hits {
            let shadowed = kept.iter().any(|k| {
                k.reference_id == hit.reference_id
                    && k.alignment
                        .sequence1_range()
                        .intersects(&hit.alignment.sequence1_range())
            });
            if !shadowed {
                kept.push(hit);
            }
        }
        kept.truncate(p.max_hits);
        KAlignmentResult {
            query: query.clone(),
            hits: kept,
        }
    }
}
