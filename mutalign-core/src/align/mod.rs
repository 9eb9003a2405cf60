pub mod alignment;
pub mod banded;
pub mod batch;
pub(crate) mod dp;
pub mod scoring;
pub mod types;

pub use alignment::{calculate_score, Alignment, AlignmentHelper};
pub use banded::{BandedAlignerParameters, BandedSemiLocalResult};
pub use batch::{BatchAligner, BatchAlignerParameters, BatchHit};
pub use scoring::{
    AffineScoring, LinearScoring, QualityAwareScoring, Scoring, ScoringModel, SubstitutionMatrix,
};
pub use types::{Cigar, CigarOp};

use crate::error::{BioError, BioResult};
use crate::seq::sequence::check_same_alphabet;
use crate::seq::{Range, Sequence, SequenceWithQuality};
use dp::{DpMode, DpResult, FreeEnds};

#[cfg(test)]
mod tests;

fn check_inputs(scoring: &Scoring, seq1: &Sequence, seq2: &Sequence) -> BioResult<()> {
    check_same_alphabet(scoring.alphabet(), seq1.alphabet())?;
    check_same_alphabet(scoring.alphabet(), seq2.alphabet())
}

fn check_range(range: Range, sequence: &Sequence) -> BioResult<()> {
    if range.to() > sequence.len() {
        return Err(BioError::InvalidRange {
            from: range.from(),
            to: range.to(),
            len: sequence.len(),
        });
    }
    Ok(())
}

/// Turns a DP result over `range1`/`range2` into an [`Alignment`] of the full sequences.
fn into_alignment(
    seq1: &Sequence,
    range1: Range,
    seq2: &Sequence,
    range2: Range,
    result: DpResult,
) -> BioResult<Alignment> {
    let start1 = range1.from() + result.start1;
    let start2 = range2.from() + result.start2;
    let mutations = result.cigar.to_mutations(
        seq1.alphabet(),
        seq1.codes(),
        start1,
        seq2.codes(),
        start2,
    );
    Alignment::new(
        seq1.clone(),
        mutations,
        Range::new(start1, range1.from() + result.end1),
        Range::new(start2, range2.from() + result.end2),
        result.score as f32,
    )
}

pub(crate) fn align_in(
    scoring: &Scoring,
    seq1: &Sequence,
    range1: Range,
    seq2: &Sequence,
    range2: Range,
    mode: DpMode,
) -> BioResult<Alignment> {
    check_inputs(scoring, seq1, seq2)?;
    check_range(range1, seq1)?;
    check_range(range2, seq2)?;
    let result = dp::align_affine(
        scoring,
        &seq1.codes()[range1.from()..range1.to()],
        &seq2.codes()[range2.from()..range2.to()],
        None,
        mode,
    );
    into_alignment(seq1, range1, seq2, range2, result)
}

/// Needleman-Wunsch over both sequences in full.
///
/// Mutations follow the scored path: when a deletion plus an insertion costs less than a
/// mismatch they stay separate, so the result may fail [`check`](crate::mutations::check)
/// until [`Mutations::normalize`](crate::mutations::Mutations::normalize) folds them.
pub fn align_global(scoring: &Scoring, seq1: &Sequence, seq2: &Sequence) -> BioResult<Alignment> {
    align_global_in(
        scoring,
        seq1,
        Range::new(0, seq1.len()),
        seq2,
        Range::new(0, seq2.len()),
    )
}

pub fn align_global_in(
    scoring: &Scoring,
    seq1: &Sequence,
    range1: Range,
    seq2: &Sequence,
    range2: Range,
) -> BioResult<Alignment> {
    align_in(
        scoring,
        seq1,
        range1,
        seq2,
        range2,
        DpMode::Bounded(FreeEnds::GLOBAL),
    )
}

/// Global alignment charging low-quality letters of `seq2` through quality-aware scoring.
pub fn align_global_with_quality(
    scoring: &Scoring,
    seq1: &Sequence,
    seq2: &SequenceWithQuality,
) -> BioResult<Alignment> {
    check_inputs(scoring, seq1, seq2.sequence())?;
    let result = dp::align_affine(
        scoring,
        seq1.codes(),
        seq2.sequence().codes(),
        Some(seq2.quality().values()),
        DpMode::Bounded(FreeEnds::GLOBAL),
    );
    into_alignment(
        seq1,
        Range::new(0, seq1.len()),
        seq2.sequence(),
        Range::new(0, seq2.len()),
        result,
    )
}

/// Smith-Waterman; the first best cell in row-major order wins.
pub fn align_local(scoring: &Scoring, seq1: &Sequence, seq2: &Sequence) -> BioResult<Alignment> {
    align_in(
        scoring,
        seq1,
        Range::new(0, seq1.len()),
        seq2,
        Range::new(0, seq2.len()),
        DpMode::Local,
    )
}
