use crate::align::{Scoring, ScoringModel};
use crate::error::{BioError, BioResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KAlignerParameters {
    /// Length of seed and index k-mers.
    pub kmer_size: usize,
    /// Distance between consecutive query seeds.
    pub seed_step: usize,
    /// Query start may be left unaligned.
    pub floating_left_bound: bool,
    /// Query end may be left unaligned.
    pub floating_right_bound: bool,
    /// Islands scoring below this are dropped by the accumulator.
    pub mapper_absolute_min_cluster_score: i32,
    /// Added once per island joined to an existing chain; usually negative.
    pub mapper_extra_cluster_score: i32,
    pub mapper_match_score: i32,
    pub mapper_mismatch_score: i32,
    pub mapper_offset_shift_score: i32,
    pub mapper_slot_count: usize,
    /// Largest offset drift tolerated inside an island and between chained islands.
    pub mapper_max_cluster_indels: i32,
    pub mapper_absolute_min_score: i32,
    pub mapper_relative_min_score: f32,
    pub absolute_min_score: f32,
    pub relative_min_score: f32,
    pub max_hits: usize,
    pub scoring: Scoring,
}

fn invalid(msg: String) -> BioError {
    BioError::InvalidParameters { msg }
}

impl KAlignerParameters {
    pub fn validate(&self) -> BioResult<()> {
        let max_k = self.scoring.alphabet().max_kmer_size();
        if self.kmer_size == 0 || self.kmer_size > max_k {
            return Err(invalid(format!(
                "kmer size {} outside [1, {max_k}]",
                self.kmer_size
            )));
        }
        if self.seed_step == 0 {
            return Err(invalid("seed step must be positive".into()));
        }
        if self.mapper_slot_count == 0 {
            return Err(invalid("mapper needs at least one slot".into()));
        }
        if self.mapper_match_score <= 0 {
            return Err(invalid(format!(
                "mapper match score must be positive, got {}",
                self.mapper_match_score
            )));
        }
        if self.mapper_max_cluster_indels < 0 {
            return Err(invalid(format!(
                "max cluster indels must not be negative, got {}",
                self.mapper_max_cluster_indels
            )));
        }
        for (name, value) in [
            ("mapper relative min score", self.mapper_relative_min_score),
            ("relative min score", self.relative_min_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} {value} is outside [0, 1]")));
            }
        }
        if self.max_hits == 0 {
            return Err(invalid("max hits must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_parameters() -> KAlignerParameters {
    use crate::alphabets::nucleotide;
    KAlignerParameters {
        kmer_size: 9,
        seed_step: 3,
        floating_left_bound: true,
        floating_right_bound: true,
        mapper_absolute_min_cluster_score: 30,
        mapper_extra_cluster_score: -10,
        mapper_match_score: 15,
        mapper_mismatch_score: -10,
        mapper_offset_shift_score: -3,
        mapper_slot_count: 3,
        mapper_max_cluster_indels: 40,
        mapper_absolute_min_score: 0,
        mapper_relative_min_score: 0.0,
        absolute_min_score: 0.0,
        relative_min_score: 0.0,
        max_hits: 5,
        scoring: Scoring::affine(nucleotide(), vec![10, -7], -11, -2).unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let params = test_parameters();
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"mapperSlotCount\":3"));
        assert!(json.contains("\"floatingLeftBound\":true"));
        let back: KAlignerParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn rejects_bad_values() {
        let mut p = test_parameters();
        p.kmer_size = 40;
        assert!(p.validate().is_err());
        let mut p = test_parameters();
        p.relative_min_score = 1.5;
        assert!(p.validate().is_err());
        let mut p = test_parameters();
        p.mapper_slot_count = 0;
        assert!(matches!(
            p.validate(),
            Err(BioError::InvalidParameters { .. })
        ));
        assert!(test_parameters().validate().is_ok());
    }
}
