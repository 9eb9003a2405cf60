//! Banded linear-gap alignment for near-identical pairs.
//!
//! Only cells with `lo <= j - i <= hi` are stored, so memory and time are
//! `O(len * band)` instead of `O(len1 * len2)`.

use super::alignment::Alignment;
use super::scoring::{Scoring, ScoringModel};
use super::types::{Cigar, CigarOp};
use crate::error::{BioError, BioResult};
use crate::mutations::Mutations;
use crate::seq::sequence::check_same_alphabet;
use crate::seq::{Range, Sequence};
use serde::{Deserialize, Serialize};

const DIR_DIAG: u8 = 0;
const DIR_INS: u8 = 1;
const DIR_DEL: u8 = 2;

const NEG_INF: i32 = i32::MIN / 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandedAlignerParameters {
    pub scoring: Scoring,
    /// Extra diagonals on each side of the main one.
    pub width: usize,
    /// Extension stops once a whole row scores this much below the best cell.
    pub stop_penalty: i32,
}

impl BandedAlignerParameters {
    pub fn new(scoring: Scoring, width: usize, stop_penalty: i32) -> BioResult<Self> {
        let params = BandedAlignerParameters {
            scoring,
            width,
            stop_penalty,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> BioResult<()> {
        if !self.scoring.is_linear() {
            return Err(BioError::InvalidScoring {
                msg: "banded alignment needs linear gap scoring".into(),
            });
        }
        if self.stop_penalty > 0 {
            return Err(BioError::InvalidParameters {
                msg: format!("stop penalty must not be positive, got {}", self.stop_penalty),
            });
        }
        Ok(())
    }
}

/// Outcome of a one-side anchored banded alignment.
///
/// Stops are inclusive: the last aligned letters for the left variant, the first ones for the
/// right variant.
#[derive(Clone, Debug, PartialEq)]
pub struct BandedSemiLocalResult {
    pub mutations: Mutations,
    pub sequence1_stop: isize,
    pub sequence2_stop: isize,
    pub score: i32,
}

struct Band {
    lo: isize,
    hi: isize,
    cols: usize,
    width: usize,
    scores: Vec<i32>,
    trace: Vec<u8>,
}

impl Band {
    fn new(rows: usize, cols: usize, lo: isize, hi: isize) -> Self {
        let width = (hi - lo + 1) as usize;
        Band {
            lo,
            hi,
            cols,
            width,
            scores: vec![NEG_INF; rows * width],
            trace: vec![DIR_DIAG; rows * width],
        }
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> Option<usize> {
        let d = j as isize - i as isize;
        (d >= self.lo && d <= self.hi && j < self.cols)
            .then(|| i * self.width + (d - self.lo) as usize)
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> i32 {
        self.index(i, j).map_or(NEG_INF, |k| self.scores[k])
    }

    /// Columns of row `i` inside the band.
    fn columns(&self, i: usize) -> std::ops::RangeInclusive<usize> {
        let first = (i as isize + self.lo).max(0) as usize;
        let last = ((i as isize + self.hi) as usize).min(self.cols - 1);
        first..=last
    }

    fn traceback(&self, mut i: usize, mut j: usize) -> Cigar {
        let mut rev = Cigar::default();
        while i > 0 || j > 0 {
            if i == 0 {
                rev.push(CigarOp::Ins, j);
                break;
            }
            if j == 0 {
                rev.push(CigarOp::Del, i);
                break;
            }
            let Some(k) = self.index(i, j) else {
                break;
            };
            match self.trace[k] {
                DIR_DIAG => {
                    rev.push(CigarOp::Match, 1);
                    i -= 1;
                    j -= 1;
                }
                DIR_DEL => {
                    rev.push(CigarOp::Del, 1);
                    i -= 1;
                }
                _ => {
                    rev.push(CigarOp::Ins, 1);
                    j -= 1;
                }
            }
        }
        rev.reversed()
    }
}

/// Best cell found while filling the band.
struct Fill {
    band: Band,
    end_i: usize,
    end_j: usize,
    score: i32,
}

/// Fills a band anchored at `(0, 0)`. With `stop_penalty` the best cell anywhere is tracked and
/// filling stops early; without it the result ends at `(n, m)`.
fn fill(
    scoring: &Scoring,
    seq1: &[u8],
    seq2: &[u8],
    lo: isize,
    hi: isize,
    stop_penalty: Option<i32>,
) -> Fill {
    let n = seq1.len();
    let m = seq2.len();
    let gap = scoring.gap_open();
    let mut band = Band::new(n + 1, m + 1, lo, hi);

    for j in band.columns(0) {
        if let Some(k) = band.index(0, j) {
            band.scores[k] = gap * j as i32;
            band.trace[k] = DIR_INS;
        }
    }
    let (mut end_i, mut end_j, mut best) = (0, 0, 0);

    for i in 1..=n {
        let mut row_max = NEG_INF;
        for j in band.columns(i) {
            let Some(k) = band.index(i, j) else {
                continue;
            };
            let (score, dir) = if j == 0 {
                (gap * i as i32, DIR_DEL)
            } else {
                let mut score = band.get(i - 1, j - 1) + scoring.score(seq1[i - 1], seq2[j - 1]);
                let mut dir = DIR_DIAG;
                let up = band.get(i - 1, j) + gap;
                if up > score {
                    score = up;
                    dir = DIR_DEL;
                }
                let left = band.get(i, j - 1) + gap;
                if left > score {
                    score = left;
                    dir = DIR_INS;
                }
                (score, dir)
            };
            band.scores[k] = score;
            band.trace[k] = dir;
            row_max = row_max.max(score);
            if stop_penalty.is_some() && score > best {
                best = score;
                end_i = i;
                end_j = j;
            }
        }
        if let Some(stop) = stop_penalty {
            if row_max - best < stop {
                break;
            }
        }
    }

    if stop_penalty.is_none() {
        end_i = n;
        end_j = m;
        best = band.get(n, m);
    }
    Fill {
        band,
        end_i,
        end_j,
        score: best,
    }
}

fn check(scoring: &Scoring, seq1: &Sequence, seq2: &Sequence) -> BioResult<()> {
    if !scoring.is_linear() {
        return Err(BioError::InvalidScoring {
            msg: "banded alignment needs linear gap scoring".into(),
        });
    }
    check_same_alphabet(scoring.alphabet(), seq1.alphabet())?;
    check_same_alphabet(scoring.alphabet(), seq2.alphabet())
}

fn sub_range(sequence: &Sequence, offset: usize, length: usize) -> BioResult<Range> {
    let range = Range::with_length(offset, length);
    if range.to() > sequence.len() {
        return Err(BioError::InvalidRange {
            from: range.from(),
            to: range.to(),
            len: sequence.len(),
        });
    }
    Ok(range)
}

/// Global alignment of the two ranges inside a band of `width` extra diagonals around the
/// main diagonal, widened by the length difference.
pub fn align_global(
    scoring: &Scoring,
    seq1: &Sequence,
    range1: Range,
    seq2: &Sequence,
    range2: Range,
    width: usize,
) -> BioResult<Alignment> {
    check(scoring, seq1, seq2)?;
    sub_range(seq1, range1.from(), range1.length())?;
    sub_range(seq2, range2.from(), range2.length())?;
    let diff = range2.length() as isize - range1.length() as isize;
    let lo = diff.min(0) - width as isize;
    let hi = diff.max(0) + width as isize;
    let a = &seq1.codes()[range1.from()..range1.to()];
    let b = &seq2.codes()[range2.from()..range2.to()];
    let filled = fill(scoring, a, b, lo, hi, None);
    let cigar = filled.band.traceback(filled.end_i, filled.end_j);
    let mutations = cigar.to_mutations(
        seq1.alphabet(),
        seq1.codes(),
        range1.from(),
        seq2.codes(),
        range2.from(),
    );
    Alignment::new(seq1.clone(), mutations, range1, range2, filled.score as f32)
}

/// Alignment anchored at `(offset1, offset2)` that extends to the right while it pays off.
pub fn align_semi_local_left(
    params: &BandedAlignerParameters,
    seq1: &Sequence,
    offset1: usize,
    length1: usize,
    seq2: &Sequence,
    offset2: usize,
    length2: usize,
) -> BioResult<BandedSemiLocalResult> {
    check(&params.scoring, seq1, seq2)?;
    let r1 = sub_range(seq1, offset1, length1)?;
    let r2 = sub_range(seq2, offset2, length2)?;
    let w = params.width as isize;
    let filled = fill(
        &params.scoring,
        &seq1.codes()[r1.from()..r1.to()],
        &seq2.codes()[r2.from()..r2.to()],
        -w,
        w,
        Some(params.stop_penalty),
    );
    let cigar = filled.band.traceback(filled.end_i, filled.end_j);
    let mutations = cigar.to_mutations(
        seq1.alphabet(),
        seq1.codes(),
        offset1,
        seq2.codes(),
        offset2,
    );
    Ok(BandedSemiLocalResult {
        mutations,
        sequence1_stop: (offset1 + filled.end_i) as isize - 1,
        sequence2_stop: (offset2 + filled.end_j) as isize - 1,
        score: filled.score,
    })
}

/// Mirror of [`align_semi_local_left`] anchored at the range ends and extending leftwards.
pub fn align_semi_local_right(
    params: &BandedAlignerParameters,
    seq1: &Sequence,
    offset1: usize,
    length1: usize,
    seq2: &Sequence,
    offset2: usize,
    length2: usize,
) -> BioResult<BandedSemiLocalResult> {
    check(&params.scoring, seq1, seq2)?;
    let r1 = sub_range(seq1, offset1, length1)?;
    let r2 = sub_range(seq2, offset2, length2)?;
    let a: Vec<u8> = seq1.codes()[r1.from()..r1.to()].iter().rev().copied().collect();
    let b: Vec<u8> = seq2.codes()[r2.from()..r2.to()].iter().rev().copied().collect();
    let w = params.width as isize;
    let filled = fill(&params.scoring, &a, &b, -w, w, Some(params.stop_penalty));
    let cigar = filled.band.traceback(filled.end_i, filled.end_j).reversed();
    let start1 = r1.to() - filled.end_i;
    let start2 = r2.to() - filled.end_j;
    let mutations = cigar.to_mutations(
        seq1.alphabet(),
        seq1.codes(),
        start1,
        seq2.codes(),
        start2,
    );
    Ok(BandedSemiLocalResult {
        mutations,
        sequence1_stop: start1 as isize,
        sequence2_stop: start2 as isize,
        score: filled.score,
    })
}
