//! Substitution matrices and gap models.
//!
//! All scores are integers; penalties are negative. The linear model is the affine one with
//! `gap_open == gap_extension == gap_penalty`, so a single DP handles both.

use crate::alphabets::{self, Alphabet};
use crate::error::{BioError, BioResult};
use serde::{Deserialize, Serialize};

pub trait ScoringModel {
    fn alphabet(&self) -> &'static Alphabet;

    fn score(&self, from: u8, to: u8) -> i32;

    /// Cost of the first position of a gap.
    fn gap_open(&self) -> i32;

    /// Cost of every following position of a gap.
    fn gap_extension(&self) -> i32;

    fn gap_cost(&self, length: usize) -> i32 {
        if length == 0 {
            0
        } else {
            self.gap_open() + (length as i32 - 1) * self.gap_extension()
        }
    }

    /// True when every basic letter scores the same against itself.
    fn uniform_basic_match(&self) -> bool;

    /// Best diagonal score; an upper bound for a single aligned column.
    fn max_score(&self) -> i32;
}

/// `size * size` row-major matrix indexed by `(from, to)` codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubstitutionMatrix {
    alphabet: &'static Alphabet,
    values: Vec<i32>,
    uniform_basic_match: bool,
}

impl SubstitutionMatrix {
    /// Accepts either a full `size * size` matrix or the `[match, mismatch]` shorthand.
    pub fn new(alphabet: &'static Alphabet, values: Vec<i32>) -> BioResult<Self> {
        let size = alphabet.size();
        let values = if values.len() == 2 {
            Self::expand(alphabet, values[0], values[1])
        } else if values.len() == size * size {
            values
        } else {
            return Err(BioError::InvalidScoring {
                msg: format!(
                    "matrix has {} entries, {} alphabet needs {} or 2",
                    values.len(),
                    alphabet.name(),
                    size * size
                ),
            });
        };
        let first = values[0];
        let uniform_basic_match =
            (0..alphabet.basic_size()).all(|c| values[c * size + c] == first);
        Ok(SubstitutionMatrix {
            alphabet,
            values,
            uniform_basic_match,
        })
    }

    /// Wildcard cells get the truncated mean score over all pairs of basis letters.
    fn expand(alphabet: &'static Alphabet, match_score: i32, mismatch_score: i32) -> Vec<i32> {
        let size = alphabet.size();
        let mut values = vec![0; size * size];
        for from in 0..size as u8 {
            let from_basis = alphabet.basis(from);
            for to in 0..size as u8 {
                let to_basis = alphabet.basis(to);
                let mut sum = 0i32;
                for &f in &from_basis {
                    for &t in &to_basis {
                        sum += if f == t { match_score } else { mismatch_score };
                    }
                }
                values[from as usize * size + to as usize] =
                    sum / (from_basis.len() * to_basis.len()) as i32;
            }
        }
        values
    }

    #[inline]
    pub fn get(&self, from: u8, to: u8) -> i32 {
        self.values[from as usize * self.alphabet.size() + to as usize]
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    fn max_diagonal(&self) -> i32 {
        let size = self.alphabet.size();
        (0..self.alphabet.basic_size())
            .map(|c| self.values[c * size + c])
            .max()
            .unwrap_or(0)
    }
}

fn check_penalty(name: &str, value: i32) -> BioResult<()> {
    if value >= 0 {
        return Err(BioError::InvalidScoring {
            msg: format!("{name} must be negative, got {value}"),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearScoring {
    matrix: SubstitutionMatrix,
    gap_penalty: i32,
}

impl LinearScoring {
    pub fn new(matrix: SubstitutionMatrix, gap_penalty: i32) -> BioResult<Self> {
        check_penalty("gap penalty", gap_penalty)?;
        Ok(LinearScoring {
            matrix,
            gap_penalty,
        })
    }

    pub fn gap_penalty(&self) -> i32 {
        self.gap_penalty
    }

    pub fn matrix(&self) -> &SubstitutionMatrix {
        &self.matrix
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffineScoring {
    matrix: SubstitutionMatrix,
    gap_open: i32,
    gap_extension: i32,
}

impl AffineScoring {
    pub fn new(matrix: SubstitutionMatrix, gap_open: i32, gap_extension: i32) -> BioResult<Self> {
        check_penalty("gap open penalty", gap_open)?;
        check_penalty("gap extension penalty", gap_extension)?;
        Ok(AffineScoring {
            matrix,
            gap_open,
            gap_extension,
        })
    }

    pub fn matrix(&self) -> &SubstitutionMatrix {
        &self.matrix
    }
}

/// Linear scoring that also charges low-quality positions of the aligned read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualityAwareScoring {
    linear: LinearScoring,
    good_quality: u8,
    bad_quality: u8,
    max_quality_penalty: i32,
}

impl QualityAwareScoring {
    pub fn new(
        linear: LinearScoring,
        good_quality: u8,
        bad_quality: u8,
        max_quality_penalty: i32,
    ) -> BioResult<Self> {
        if good_quality <= bad_quality {
            return Err(BioError::InvalidScoring {
                msg: format!("good quality {good_quality} must exceed bad quality {bad_quality}"),
            });
        }
        if max_quality_penalty > 0 {
            return Err(BioError::InvalidScoring {
                msg: format!("quality penalty must not be positive, got {max_quality_penalty}"),
            });
        }
        Ok(QualityAwareScoring {
            linear,
            good_quality,
            bad_quality,
            max_quality_penalty,
        })
    }

    pub fn quality_penalty(&self, quality: u8) -> i32 {
        if quality >= self.good_quality {
            0
        } else if quality <= self.bad_quality {
            self.max_quality_penalty
        } else {
            self.max_quality_penalty * i32::from(self.good_quality - quality)
                / i32::from(self.good_quality - self.bad_quality)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScoringConfig", into = "ScoringConfig")]
pub enum Scoring {
    Linear(LinearScoring),
    Affine(AffineScoring),
    QualityAware(QualityAwareScoring),
}

impl Scoring {
    pub fn linear(alphabet: &'static Alphabet, matrix: Vec<i32>, gap_penalty: i32) -> BioResult<Self> {
        let matrix = SubstitutionMatrix::new(alphabet, matrix)?;
        Ok(Scoring::Linear(LinearScoring::new(matrix, gap_penalty)?))
    }

    pub fn affine(
        alphabet: &'static Alphabet,
        matrix: Vec<i32>,
        gap_open: i32,
        gap_extension: i32,
    ) -> BioResult<Self> {
        let matrix = SubstitutionMatrix::new(alphabet, matrix)?;
        Ok(Scoring::Affine(AffineScoring::new(matrix, gap_open, gap_extension)?))
    }

    pub fn quality_aware(
        alphabet: &'static Alphabet,
        matrix: Vec<i32>,
        gap_penalty: i32,
        good_quality: u8,
        bad_quality: u8,
        max_quality_penalty: i32,
    ) -> BioResult<Self> {
        let linear = LinearScoring::new(SubstitutionMatrix::new(alphabet, matrix)?, gap_penalty)?;
        Ok(Scoring::QualityAware(QualityAwareScoring::new(
            linear,
            good_quality,
            bad_quality,
            max_quality_penalty,
        )?))
    }

    /// BLASTN defaults: match 5, mismatch -4, gap -5.
    pub fn nucleotide_blast_linear() -> Self {
        Scoring::Linear(LinearScoring {
            matrix: SubstitutionMatrix::from_pair(alphabets::nucleotide(), 5, -4),
            gap_penalty: -5,
        })
    }

    /// BLASTN defaults: match 5, mismatch -4, gap open -10, extension -1.
    pub fn nucleotide_blast_affine() -> Self {
        Scoring::Affine(AffineScoring {
            matrix: SubstitutionMatrix::from_pair(alphabets::nucleotide(), 5, -4),
            gap_open: -10,
            gap_extension: -1,
        })
    }

    pub fn matrix(&self) -> &SubstitutionMatrix {
        match self {
            Scoring::Linear(s) => &s.matrix,
            Scoring::Affine(s) => &s.matrix,
            Scoring::QualityAware(s) => &s.linear.matrix,
        }
    }

    pub fn is_linear(&self) -> bool {
        !matches!(self, Scoring::Affine(_))
    }

    /// Substitution score plus the penalty for the read quality at that column.
    ///
    /// Models without a quality component ignore `quality`.
    pub fn score_with_quality(&self, from: u8, to: u8, quality: u8) -> i32 {
        match self {
            Scoring::QualityAware(s) => self.score(from, to) + s.quality_penalty(quality),
            _ => self.score(from, to),
        }
    }
}

impl SubstitutionMatrix {
    fn from_pair(alphabet: &'static Alphabet, match_score: i32, mismatch_score: i32) -> Self {
        let values = Self::expand(alphabet, match_score, mismatch_score);
        SubstitutionMatrix {
            alphabet,
            values,
            uniform_basic_match: true,
        }
    }
}

impl ScoringModel for Scoring {
    fn alphabet(&self) -> &'static Alphabet {
        self.matrix().alphabet
    }

    #[inline]
    fn score(&self, from: u8, to: u8) -> i32 {
        self.matrix().get(from, to)
    }

    fn gap_open(&self) -> i32 {
        match self {
            Scoring::Linear(s) => s.gap_penalty,
            Scoring::Affine(s) => s.gap_open,
            Scoring::QualityAware(s) => s.linear.gap_penalty,
        }
    }

    fn gap_extension(&self) -> i32 {
        match self {
            Scoring::Linear(s) => s.gap_penalty,
            Scoring::Affine(s) => s.gap_extension,
            Scoring::QualityAware(s) => s.linear.gap_penalty,
        }
    }

    fn uniform_basic_match(&self) -> bool {
        self.matrix().uniform_basic_match
    }

    fn max_score(&self) -> i32 {
        self.matrix().max_diagonal()
    }
}

/// Persisted form, validated on the way in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ScoringConfig {
    #[serde(rename_all = "camelCase")]
    Linear {
        alphabet: String,
        subs_matrix: Vec<i32>,
        gap_penalty: i32,
    },
    #[serde(rename_all = "camelCase")]
    Affine {
        alphabet: String,
        subs_matrix: Vec<i32>,
        gap_open_penalty: i32,
        gap_extension_penalty: i32,
    },
    #[serde(rename_all = "camelCase")]
    QualityAware {
        alphabet: String,
        subs_matrix: Vec<i32>,
        gap_penalty: i32,
        good_quality: u8,
        bad_quality: u8,
        max_quality_penalty: i32,
    },
}

impl TryFrom<ScoringConfig> for Scoring {
    type Error = BioError;

    fn try_from(config: ScoringConfig) -> BioResult<Self> {
        match config {
            ScoringConfig::Linear {
                alphabet,
                subs_matrix,
                gap_penalty,
            } => Scoring::linear(Alphabet::by_name(&alphabet)?, subs_matrix, gap_penalty),
            ScoringConfig::Affine {
                alphabet,
                subs_matrix,
                gap_open_penalty,
                gap_extension_penalty,
            } => Scoring::affine(
                Alphabet::by_name(&alphabet)?,
                subs_matrix,
                gap_open_penalty,
                gap_extension_penalty,
            ),
            ScoringConfig::QualityAware {
                alphabet,
                subs_matrix,
                gap_penalty,
                good_quality,
                bad_quality,
                max_quality_penalty,
            } => Scoring::quality_aware(
                Alphabet::by_name(&alphabet)?,
                subs_matrix,
                gap_penalty,
                good_quality,
                bad_quality,
                max_quality_penalty,
            ),
        }
    }
}

impl From<Scoring> for ScoringConfig {
    fn from(scoring: Scoring) -> Self {
        let alphabet = scoring.alphabet().name().to_string();
        let subs_matrix = scoring.matrix().values.clone();
        match scoring {
            Scoring::Linear(s) => ScoringConfig::Linear {
                alphabet,
                subs_matrix,
                gap_penalty: s.gap_penalty,
            },
            Scoring::Affine(s) => ScoringConfig::Affine {
                alphabet,
                subs_matrix,
                gap_open_penalty: s.gap_open,
                gap_extension_penalty: s.gap_extension,
            },
            Scoring::QualityAware(s) => ScoringConfig::QualityAware {
                alphabet,
                subs_matrix,
                gap_penalty: s.linear.gap_penalty,
                good_quality: s.good_quality,
                bad_quality: s.bad_quality,
                max_quality_penalty: s.max_quality_penalty,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabets::nucleotide;

    fn code(c: u8) -> u8 {
        nucleotide().code(c).unwrap()
    }

    #[test]
    fn pair_expansion() {
        let s = Scoring::linear(nucleotide(), vec![5, -4], -5).unwrap();
        assert_eq!(s.matrix().values().len(), 15 * 15);
        assert_eq!(s.score(code(b'A'), code(b'A')), 5);
        assert_eq!(s.score(code(b'A'), code(b'T')), -4);
        assert!(s.uniform_basic_match());
        assert_eq!(s.max_score(), 5);
        assert_eq!(s, Scoring::nucleotide_blast_linear());
    }

    #[test]
    fn wildcard_cells_average_basis() {
        let s = Scoring::linear(nucleotide(), vec![0, -5], -10).unwrap();
        assert_eq!(s.score(code(b'C'), code(b'S')), -2);
        assert_eq!(s.score(code(b'S'), code(b'S')), -2);
        assert_eq!(s.score(code(b'A'), code(b'S')), -5);
        assert_eq!(s.score(code(b'W'), code(b'S')), -5);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            Scoring::linear(nucleotide(), vec![1; 10], -5),
            Err(BioError::InvalidScoring { .. })
        ));
        assert!(Scoring::linear(nucleotide(), vec![5, -4], 0).is_err());
        assert!(Scoring::affine(nucleotide(), vec![5, -4], -10, 1).is_err());
        assert!(Scoring::quality_aware(nucleotide(), vec![0, -5], -10, 2, 12, -10).is_err());
    }

    #[test]
    fn gap_costs() {
        let linear = Scoring::nucleotide_blast_linear();
        assert_eq!(linear.gap_cost(0), 0);
        assert_eq!(linear.gap_cost(3), -15);
        let affine = Scoring::nucleotide_blast_affine();
        assert_eq!(affine.gap_cost(1), -10);
        assert_eq!(affine.gap_cost(4), -13);
        assert!(linear.is_linear());
        assert!(!affine.is_linear());
    }

    #[test]
    fn quality_penalty() {
        let s = Scoring::quality_aware(nucleotide(), vec![0, -5], -10, 12, 2, -10).unwrap();
        let a = code(b'A');
        assert_eq!(s.score_with_quality(a, a, 20), 0);
        assert_eq!(s.score_with_quality(a, a, 7), -5);
        assert_eq!(s.score_with_quality(a, a, 1), -10);
        assert_eq!(s.score_with_quality(code(b'S'), code(b'S'), 11), -3);
    }

    #[test]
    fn json_round_trip() {
        for s in [
            Scoring::nucleotide_blast_linear(),
            Scoring::nucleotide_blast_affine(),
            Scoring::quality_aware(nucleotide(), vec![0, -5], -10, 12, 2, -10).unwrap(),
        ] {
            let json = serde_json::to_string(&s).unwrap();
            let back: Scoring = serde_json::from_str(&json).unwrap();
            assert_eq!(back, s);
        }
        let json = r#"{"type":"affine","alphabet":"nucleotide","subsMatrix":[5,-4],
            "gapOpenPenalty":-10,"gapExtensionPenalty":-1}"#;
        let s: Scoring = serde_json::from_str(json).unwrap();
        assert_eq!(s, Scoring::nucleotide_blast_affine());
        let bad = r#"{"type":"linear","alphabet":"nucleotide","subsMatrix":[5,-4],"gapPenalty":3}"#;
        assert!(serde_json::from_str::<Scoring>(bad).is_err());
    }
}
