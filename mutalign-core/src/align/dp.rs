//! Full-matrix affine DP. Rows `i` run over sequence1, columns `j` over sequence2.
//!
//! Linear scoring is handled by the same recurrences with `gap_open == gap_extension`.

use super::scoring::{Scoring, ScoringModel};
use super::types::{Cigar, CigarOp};

// Bits 0-1: H direction
const DIR_DIAG: u8 = 0;
const DIR_INS: u8 = 1; // F (horizontal gap, consumes sequence2)
const DIR_DEL: u8 = 2; // E (vertical gap, consumes sequence1)
const DIR_ZERO: u8 = 3;

// Traceback for E/F: 0 = opened from H, 1 = extended from E/F.
const FROM_H: u8 = 0;
const FROM_GAP: u8 = 1;

const NEG_INF: i32 = i32::MIN / 4;

/// Which ends of each sequence may be left unaligned at no cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FreeEnds {
    pub seq1_start: bool,
    pub seq1_end: bool,
    pub seq2_start: bool,
    pub seq2_end: bool,
}

impl FreeEnds {
    pub const GLOBAL: FreeEnds = FreeEnds {
        seq1_start: false,
        seq1_end: false,
        seq2_start: false,
        seq2_end: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DpMode {
    /// Smith-Waterman: scores floor at zero, best cell anywhere.
    Local,
    Bounded(FreeEnds),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DpResult {
    pub score: i32,
    pub start1: usize,
    pub end1: usize,
    pub start2: usize,
    pub end2: usize,
    pub cigar: Cigar,
}

fn push_rev(ops: &mut Vec<(CigarOp, usize)>, op: CigarOp, len: usize) {
    if len == 0 {
        return;
    }
    if let Some((last_op, last_len)) = ops.last_mut() {
        if *last_op == op {
            *last_len += len;
            return;
        }
    }
    ops.push((op, len));
}

fn finalize_cigar(rev_ops: Vec<(CigarOp, usize)>) -> Cigar {
    Cigar {
        ops: rev_ops.into_iter().rev().collect(),
    }
}

/// Aligns `seq1` against `seq2`; `quality`, when present, holds one value per letter of
/// `seq2` and is charged by quality-aware scoring.
pub(crate) fn align_affine(
    scoring: &Scoring,
    seq1: &[u8],
    seq2: &[u8],
    quality: Option<&[u8]>,
    mode: DpMode,
) -> DpResult {
    let n = seq1.len();
    let m = seq2.len();
    let gap_open = scoring.gap_open();
    let gap_extend = scoring.gap_extension();
    let (local, ends) = match mode {
        DpMode::Local => (true, FreeEnds::default()),
        DpMode::Bounded(ends) => (false, ends),
    };
    let eligible = |i: usize, j: usize| {
        local || ((i == n || ends.seq1_end) && (j == m || ends.seq2_end))
    };
    let cols = m + 1;

    let mut h_row = vec![0i32; cols];
    let mut e_row = vec![NEG_INF; cols];
    let mut trace_h = vec![DIR_ZERO; (n + 1) * cols];
    let mut trace_e = vec![FROM_H; (n + 1) * cols];
    let mut trace_f = vec![FROM_H; (n + 1) * cols];

    let mut best = NEG_INF;
    let mut end_i = 0usize;
    let mut end_j = 0usize;
    if local {
        best = 0;
    }

    for j in 0..=m {
        if j > 0 && !local && !ends.seq2_start {
            h_row[j] = scoring.gap_cost(j);
            trace_h[j] = DIR_INS;
        }
        if !local && eligible(0, j) && h_row[j] > best {
            best = h_row[j];
            end_i = 0;
            end_j = j;
        }
    }

    for i in 1..=n {
        let s1 = seq1[i - 1];
        let row = i * cols;
        let mut h_diag = h_row[0];
        if !local && !ends.seq1_start {
            h_row[0] = scoring.gap_cost(i);
            trace_h[row] = DIR_DEL;
        } else {
            h_row[0] = 0;
        }
        if !local && eligible(i, 0) && h_row[0] > best {
            best = h_row[0];
            end_i = i;
            end_j = 0;
        }
        let mut f = NEG_INF;
        for j in 1..=m {
            let h_up = h_row[j];
            let e_open = h_up + gap_open;
            let e_ext = e_row[j] + gap_extend;
            let e_from_ext = e_ext > e_open;
            e_row[j] = if e_from_ext { e_ext } else { e_open };
            let f_open = h_row[j - 1] + gap_open;
            let f_ext = f + gap_extend;
            let f_from_ext = f_ext > f_open;
            f = if f_from_ext { f_ext } else { f_open };
            let substitution = match quality {
                Some(q) => scoring.score_with_quality(s1, seq2[j - 1], q[j - 1]),
                None => scoring.score(s1, seq2[j - 1]),
            };
            let mut h = h_diag + substitution;
            let mut d = DIR_DIAG;
            // DIAG > DEL > INS on ties (strict comparisons)
            if e_row[j] > h {
                h = e_row[j];
                d = DIR_DEL;
            }
            if f > h {
                h = f;
                d = DIR_INS;
            }
            if local && h < 0 {
                h = 0;
                d = DIR_ZERO;
            }
            let idx = row + j;
            trace_e[idx] = if e_from_ext { FROM_GAP } else { FROM_H };
            trace_f[idx] = if f_from_ext { FROM_GAP } else { FROM_H };
            trace_h[idx] = d;
            h_row[j] = h;
            if eligible(i, j) && h > best {
                best = h;
                end_i = i;
                end_j = j;
            }
            h_diag = h_up;
        }
    }

    let mut i = end_i;
    let mut j = end_j;
    let mut rev_ops: Vec<(CigarOp, usize)> = Vec::new();
    // 0 = in H, 1 = in E (Del), 2 = in F (Ins)
    let mut state = 0u8;

    while i > 0 || j > 0 {
        if i == 0 {
            if !local && !ends.seq2_start {
                push_rev(&mut rev_ops, CigarOp::Ins, j);
                j = 0;
            }
            break;
        }
        if j == 0 {
            if !local && !ends.seq1_start {
                push_rev(&mut rev_ops, CigarOp::Del, i);
                i = 0;
            }
            break;
        }
        let idx = i * cols + j;
        match state {
            0 => match trace_h[idx] {
                DIR_DIAG => {
                    push_rev(&mut rev_ops, CigarOp::Match, 1);
                    i -= 1;
                    j -= 1;
                }
                DIR_DEL => state = 1,
                DIR_INS => state = 2,
                _ => break,
            },
            1 => {
                push_rev(&mut rev_ops, CigarOp::Del, 1);
                i -= 1;
                if trace_e[idx] != FROM_GAP {
                    state = 0;
                }
            }
            _ => {
                push_rev(&mut rev_ops, CigarOp::Ins, 1);
                j -= 1;
                if trace_f[idx] != FROM_GAP {
                    state = 0;
                }
            }
        }
    }

    DpResult {
        score: best,
        start1: i,
        end1: end_i,
        start2: j,
        end2: end_j,
        cigar: finalize_cigar(rev_ops),
    }
}
