use super::alignment::calculate_score;
use super::scoring::{Scoring, ScoringModel};
use super::{align_global, align_global_in, align_global_with_quality, align_local, banded};
use super::Alignment;
use crate::alphabets::nucleotide;
use crate::error::BioError;
use crate::mutations::{check, decode, encode};
use crate::seq::{Range, Sequence, SequenceQuality, SequenceWithQuality};
use proptest::prelude::*;

fn nt(s: &str) -> Sequence {
    Sequence::nucleotide(s).unwrap()
}

fn nt_codes(codes: &[u8]) -> Sequence {
    Sequence::from_codes(nucleotide(), codes.to_vec()).unwrap()
}

/// sequence2 slice must equal sequence1 slice with the relative mutations applied.
fn assert_consistent(alignment: &Alignment, seq2: &Sequence) {
    let s1 = alignment.sequence1().range(alignment.sequence1_range());
    let s2 = seq2.range(alignment.sequence2_range());
    assert_eq!(alignment.relative_mutations().mutate(&s1).unwrap(), s2);
}

fn assert_rescore(alignment: &Alignment, scoring: &Scoring) {
    let rescored = calculate_score(
        scoring,
        alignment.sequence1(),
        alignment.sequence1_range(),
        alignment.absolute_mutations(),
    )
    .unwrap();
    assert_eq!(rescored as f32, alignment.score());
}

fn affine() -> Scoring {
    Scoring::affine(nucleotide(), vec![10, -7], -11, -2).unwrap()
}

// ---- known answers ----

#[test]
fn local_known_answer() {
    let s1 = nt("TACCGCCAT");
    let s2 = nt("CCTCAT");
    let a = align_local(&Scoring::nucleotide_blast_linear(), &s1, &s2).unwrap();
    assert_eq!(a.convert_position(6), Some(Ok(3)));
    assert_eq!(a.convert_position(2), Some(Ok(0)));
    assert_consistent(&a, &s2);
    assert_rescore(&a, &Scoring::nucleotide_blast_linear());
}

#[test]
fn global_known_answer_deletion() {
    let s1 = nt("ATTAGACA");
    let s2 = nt("ATTGACA");
    let scoring = Scoring::nucleotide_blast_linear();
    let a = align_global(&scoring, &s1, &s2).unwrap();
    assert_eq!(a.score(), 7.0 * 5.0 - 5.0);
    assert_eq!(a.absolute_mutations().len(), 1);
    assert!(a.absolute_mutations().get(0).is_deletion());
    assert_eq!(a.sequence2_range(), Range::new(0, 7));
    // The deleted A keeps the position it would be re-inserted at.
    assert_eq!(a.convert_position(3), Some(Err(3)));
    assert_eq!(a.convert_position(4), Some(Ok(3)));
    assert_eq!(a.convert_position(8), Some(Ok(7)));
    assert_eq!(a.convert_position(9), None);
}

#[test]
fn global_known_answer_insertion() {
    let s1 = nt("ACGT");
    let s2 = nt("ACCCGT");
    let a = align_global(&affine(), &s1, &s2).unwrap();
    assert_eq!(a.score(), 40.0 - 13.0);
    assert_eq!(a.absolute_mutations().len(), 2);
    assert_consistent(&a, &s2);
}

#[test]
fn global_in_sub_ranges() {
    let s1 = nt("GGGGATTAGACA");
    let s2 = nt("TTATTAGACATT");
    let scoring = Scoring::nucleotide_blast_linear();
    let a = align_global_in(&scoring, &s1, Range::new(4, 12), &s2, Range::new(2, 10)).unwrap();
    assert_eq!(a.score(), 40.0);
    assert!(a.absolute_mutations().is_empty());
    assert_eq!(a.convert_position(4), Some(Ok(2)));
    assert_eq!(a.convert_position(3), None);
    assert!(align_global_in(&scoring, &s1, Range::new(4, 13), &s2, Range::new(2, 10)).is_err());
}

#[test]
fn cheap_gaps_keep_the_scored_path() {
    let scoring = Scoring::linear(nucleotide(), vec![5, -20], -1).unwrap();
    let s1 = nt("AACTT");
    let s2 = nt("AAGTT");
    let a = align_global(&scoring, &s1, &s2).unwrap();
    assert_eq!(a.score(), 4.0 * 5.0 - 2.0);
    assert_rescore(&a, &scoring);
    let raw = a.absolute_mutations();
    assert_eq!(raw.len(), 2);
    assert!(check(raw).is_err());

    let folded = raw.normalize();
    check(&folded).unwrap();
    assert_eq!(encode(&folded), "SC2G");
    assert_eq!(folded.mutate(&s1).unwrap(), raw.mutate(&s1).unwrap());
}

#[test]
fn global_both_empty() {
    let e = Sequence::empty(nucleotide());
    let a = align_global(&Scoring::nucleotide_blast_linear(), &e, &e).unwrap();
    assert_eq!(a.score(), 0.0);
    assert!(a.absolute_mutations().is_empty());
}

#[test]
fn alphabet_mismatch_is_error() {
    let aa = Sequence::amino_acid("CASS").unwrap();
    assert!(matches!(
        align_global(&Scoring::nucleotide_blast_linear(), &nt("ACGT"), &aa),
        Err(BioError::AlphabetMismatch { .. })
    ));
}

#[test]
fn quality_lowers_score() {
    let scoring = Scoring::quality_aware(nucleotide(), vec![5, -4], -5, 30, 10, -4).unwrap();
    let s1 = nt("ATTAGACA");
    let good = SequenceWithQuality::new(s1.clone(), SequenceQuality::uniform(8, 40)).unwrap();
    let bad = SequenceWithQuality::new(s1.clone(), SequenceQuality::uniform(8, 20)).unwrap();
    assert_eq!(align_global_with_quality(&scoring, &s1, &good).unwrap().score(), 40.0);
    assert_eq!(align_global_with_quality(&scoring, &s1, &bad).unwrap().score(), 40.0 - 16.0);
}

// ---- alignment object ----

#[test]
fn constructor_checks_invariant() {
    let s1 = nt("ATTAGACA");
    let m = decode("DT1", nucleotide()).unwrap();
    assert!(Alignment::new(s1.clone(), m.clone(), Range::new(0, 8), Range::new(0, 7), 0.0).is_ok());
    assert!(matches!(
        Alignment::new(s1.clone(), m.clone(), Range::new(0, 8), Range::new(0, 8), 0.0),
        Err(BioError::InvalidAlignment { .. })
    ));
    assert!(Alignment::new(s1.clone(), m, Range::new(2, 8), Range::new(0, 5), 0.0).is_err());
    let wrong = decode("DA1", nucleotide()).unwrap();
    assert!(matches!(
        Alignment::new(s1, wrong, Range::new(0, 8), Range::new(0, 7), 0.0),
        Err(BioError::MutationMismatch { .. })
    ));
}

#[test]
fn similarity_counts_columns() {
    let s1 = nt("ATTAGACA");
    let m = decode("ST1GDA3I8C", nucleotide()).unwrap();
    let a = Alignment::new(s1, m, Range::new(0, 8), Range::new(0, 8), 0.0).unwrap();
    assert!((a.similarity() - 6.0 / 7.0).abs() < 1e-6);
}

#[test]
fn helper_renders_gaps() {
    let s1 = nt("ATTAGACA");
    let m = decode("ST1GDA3I6C", nucleotide()).unwrap();
    let a = Alignment::new(s1, m, Range::new(0, 8), Range::new(0, 8), 0.0).unwrap();
    let h = a.alignment_helper().unwrap();
    assert_eq!(h.sequence1, "ATTAGA-CA");
    assert_eq!(h.sequence2, "AGT-GACCA");
    assert_eq!(h.markup, "| | || ||");
    assert_eq!(h.to_string(), "0 ATTAGA-CA\n  | | || ||\n0 AGT-GACCA");
}

#[test]
fn sub_range_and_inversion() {
    let scoring = Scoring::nucleotide_blast_linear();
    let s1 = nt("ATTAGACATTGACCA");
    let s2 = nt("ATTAGCATTGGACCA");
    let a = align_global(&scoring, &s1, &s2).unwrap();
    let part = a.get_range(Range::new(7, 15), &scoring).unwrap();
    assert_eq!(part.sequence1_range(), Range::new(7, 15));
    assert_consistent(&part, &s2);
    assert_rescore(&part, &scoring);

    let inverted = a.invert(&s2).unwrap();
    assert_eq!(inverted.sequence1(), &s2);
    assert_consistent(&inverted, &s1);
    assert!(a.get_range(Range::new(7, 16), &scoring).is_err());
}

// ---- randomized ----

fn nt_strategy(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(0u8), Just(1u8), Just(2u8), Just(3u8)], 0..max)
}

proptest! {
    #[test]
    fn global_alignment_is_consistent(a in nt_strategy(40), b in nt_strategy(40)) {
        let (s1, s2) = (nt_codes(&a), nt_codes(&b));
        for scoring in [Scoring::nucleotide_blast_linear(), affine()] {
            let al = align_global(&scoring, &s1, &s2).unwrap();
            prop_assert_eq!(al.sequence1_range(), Range::new(0, s1.len()));
            prop_assert_eq!(al.sequence2_range(), Range::new(0, s2.len()));
            assert_consistent(&al, &s2);
            assert_rescore(&al, &scoring);
        }
    }

    #[test]
    fn local_alignment_is_consistent(a in nt_strategy(40), b in nt_strategy(40)) {
        let (s1, s2) = (nt_codes(&a), nt_codes(&b));
        for scoring in [Scoring::nucleotide_blast_linear(), affine()] {
            let al = align_local(&scoring, &s1, &s2).unwrap();
            prop_assert!(al.score() >= 0.0);
            assert_consistent(&al, &s2);
            assert_rescore(&al, &scoring);
        }
    }

    #[test]
    fn wide_band_matches_full_dp(a in nt_strategy(30), b in nt_strategy(30)) {
        let (s1, s2) = (nt_codes(&a), nt_codes(&b));
        let scoring = Scoring::nucleotide_blast_linear();
        let width = s1.len().max(s2.len());
        let banded = banded::align_global(
            &scoring, &s1, Range::new(0, s1.len()), &s2, Range::new(0, s2.len()), width,
        ).unwrap();
        let full = align_global(&scoring, &s1, &s2).unwrap();
        prop_assert_eq!(banded.score(), full.score());
        assert_consistent(&banded, &s2);
        prop_assert!(scoring.max_score() * s1.len().min(s2.len()) as i32 >= banded.score() as i32);
    }
}
