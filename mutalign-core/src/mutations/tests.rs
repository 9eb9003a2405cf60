use super::*;
use crate::alphabets::{amino_acid, nucleotide, Alphabet};
use crate::seq::Sequence;
use proptest::prelude::*;

/// Random edits of `codes`: per position 0 keeps, 1 substitutes, 2 deletes, 3 inserts before.
fn random_mutations(alphabet: &'static Alphabet, codes: &[u8], edits: &[(u8, u8)]) -> Mutations {
    let mut builder = MutationsBuilder::new(alphabet);
    let letters = alphabet.basic_size() as u8;
    for (position, (&code, &(op, letter))) in codes.iter().zip(edits).enumerate() {
        let letter = letter % letters;
        match op % 4 {
            1 if letter != code => {
                builder.append(Mutation::substitution(position, code, letter));
            }
            2 => {
                builder.append(Mutation::deletion(position, code));
            }
            3 => {
                builder.append(Mutation::insertion(position, letter));
            }
            _ => {}
        }
    }
    builder.build()
}

fn codes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 0..30)
}

fn edits_strategy() -> impl Strategy<Value = Vec<(u8, u8)>> {
    prop::collection::vec((0u8..8, 0u8..4), 40)
}

proptest! {
    #[test]
    fn text_round_trip(codes in codes_strategy(), edits in edits_strategy()) {
        let m = random_mutations(nucleotide(), &codes, &edits);
        prop_assert_eq!(decode(&encode(&m), nucleotide()).unwrap(), m.clone());
        prop_assert_eq!(decode(&encode_fixed(&m), nucleotide()).unwrap(), m);
    }

    #[test]
    fn amino_acid_round_trip(codes in prop::collection::vec(0u8..22, 0..30), edits in edits_strategy()) {
        let m = random_mutations(amino_acid(), &codes, &edits);
        prop_assert_eq!(decode(&encode(&m), amino_acid()).unwrap(), m);
    }

    #[test]
    fn combine_law(codes in codes_strategy(), e1 in edits_strategy(), e2 in edits_strategy()) {
        let s1 = Sequence::from_codes(nucleotide(), codes.clone()).unwrap();
        let m1 = random_mutations(nucleotide(), &codes, &e1);
        let s2 = m1.mutate(&s1).unwrap();
        let m2 = random_mutations(nucleotide(), s2.codes(), &e2);
        let s3 = m2.mutate(&s2).unwrap();
        let combined = m1.combine_with(&m2).unwrap();
        prop_assert_eq!(combined.mutate(&s1).unwrap(), s3);
        prop_assert!(check(&combined).is_ok());
    }

    #[test]
    fn invert_restores(codes in codes_strategy(), edits in edits_strategy()) {
        let s1 = Sequence::from_codes(nucleotide(), codes.clone()).unwrap();
        let m = random_mutations(nucleotide(), &codes, &edits);
        let s2 = m.mutate(&s1).unwrap();
        prop_assert_eq!(m.invert().mutate(&s2).unwrap(), s1.clone());
        prop_assert_eq!(s2.len() as isize, s1.len() as isize + m.length_delta());
    }

    #[test]
    fn converted_positions_keep_letters(codes in codes_strategy(), edits in edits_strategy()) {
        let s1 = Sequence::from_codes(nucleotide(), codes.clone()).unwrap();
        let m = random_mutations(nucleotide(), &codes, &edits);
        let s2 = m.mutate(&s1).unwrap();
        for p in 0..s1.len() {
            let substituted = m.iter().any(|x| x.position() == p && x.is_substitution());
            match m.convert_position(p) {
                Ok(p2) if !substituted => prop_assert_eq!(s2.code_at(p2), s1.code_at(p)),
                Ok(_) => {}
                Err(p2) => prop_assert!(p2 <= s2.len()),
            }
        }
    }

    #[test]
    fn homopolymer_shift_keeps_result(codes in prop::collection::vec(0u8..2, 0..30), edits in edits_strategy()) {
        let s1 = Sequence::from_codes(nucleotide(), codes.clone()).unwrap();
        let m = random_mutations(nucleotide(), &codes, &edits);
        let shifted = m.shift_indels_at_homopolymers(&s1).unwrap();
        prop_assert_eq!(shifted.mutate(&s1).unwrap(), m.mutate(&s1).unwrap());
    }
}
