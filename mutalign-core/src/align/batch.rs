//! One query against a fixed set of targets with full DP.

use super::alignment::Alignment;
use super::scoring::{Scoring, ScoringModel};
use crate::error::{BioError, BioResult};
use crate::seq::Sequence;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAlignerParameters {
    pub max_hits: usize,
    /// Fraction of the best hit score a hit must reach.
    pub relative_min_score: f32,
    pub absolute_min_score: f32,
    /// Global alignment when set, local otherwise.
    pub global: bool,
    pub scoring: Scoring,
}

impl BatchAlignerParameters {
    pub fn validate(&self) -> BioResult<()> {
        if !(0.0..=1.0).contains(&self.relative_min_score) {
            return Err(BioError::InvalidParameters {
                msg: format!(
                    "relative min score {} is outside [0, 1]",
                    self.relative_min_score
                ),
            });
        }
        if self.max_hits == 0 {
            return Err(BioError::InvalidParameters {
                msg: "max hits must be positive".into(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchHit {
    pub target_id: usize,
    /// `sequence1` is the target, `sequence2` the query.
    pub alignment: Alignment,
}

pub struct BatchAligner {
    params: BatchAlignerParameters,
    targets: Vec<Sequence>,
}

impl BatchAligner {
    pub fn new(params: BatchAlignerParameters) -> BioResult<Self> {
        params.validate()?;
        Ok(BatchAligner {
            params,
            targets: Vec::new(),
        })
    }

    /// Registers a target and returns its id.
    pub fn add_target(&mut self, target: Sequence) -> BioResult<usize> {
        crate::seq::sequence::check_same_alphabet(self.params.scoring.alphabet(), target.alphabet())?;
        self.targets.push(target);
        Ok(self.targets.len() - 1)
    }

    pub fn targets(&self) -> &[Sequence] {
        &self.targets
    }

    pub fn align(&self, query: &Sequence) -> BioResult<Vec<BatchHit>> {
        let scoring = &self.params.scoring;
        let global = self.params.global;
        let alignments: BioResult<Vec<Alignment>> = par_try_map!(self.targets, |target: &Sequence| {
            if global {
                super::align_global(scoring, target, query)
            } else {
                super::align_local(scoring, target, query)
            }
        });
        let mut hits: Vec<BatchHit> = alignments?
            .into_iter()
            .enumerate()
            .map(|(target_id, alignment)| BatchHit {
                target_id,
                alignment,
            })
            .collect();

        let best = hits
            .iter()
            .map(|h| h.alignment.score())
            .fold(f32::NEG_INFINITY, f32::max);
        let threshold = self
            .params
            .absolute_min_score
            .max(best * self.params.relative_min_score);
        hits.retain(|h| h.alignment.score() >= threshold);
        hits.sort_by(|a, b| b.alignment.score().total_cmp(&a.alignment.score()));
        hits.truncate(self.params.max_hits);
        debug!(
            "batch alignment: {} targets, {} hits above {threshold}",
            self.targets.len(),
            hits.len()
        );
        Ok(hits)
    }

    /// Aligns every query independently.
    pub fn align_all(&self, queries: &[Sequence]) -> BioResult<Vec<Vec<BatchHit>>> {
        par_try_map!(queries, |query: &Sequence| self.align(query))
    }
}
