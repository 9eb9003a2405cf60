use super::mutation::Mutation;
use super::mutations::Mutations;
use crate::alphabets::amino_acid;
use crate::error::BioResult;
use crate::seq::translate::{convert_aa_position_to_nt, convert_nt_position_to_aa};
use crate::seq::{translate, Sequence, TranslationParameters};

/// Projects nucleotide mutations of `seq1` onto its translation.
///
/// Every amino acid boundary of `seq1` is mapped through the mutations; a boundary that lands
/// inside a codon of the mutated sequence counts as a shifted triplet. `Ok(None)` means the
/// frame is considered lost: a shifted triplet showed up after `max_shifted_triplets` plus one
/// were already counted.
pub fn nt2aa(
    seq1: &Sequence,
    mutations: &Mutations,
    params: TranslationParameters,
    max_shifted_triplets: usize,
) -> BioResult<Option<Mutations>> {
    let aa1 = translate(seq1, params)?;
    let seq2 = mutations.mutate(seq1)?;
    let aa2 = translate(&seq2, params)?;

    let mut result: Vec<Mutation> = Vec::new();
    let mut prev_p2: isize = -1;
    let mut shifted = 0usize;

    for p1 in 0..=aa1.len() {
        let p2: isize = if p1 < aa1.len() {
            let nt1 = convert_aa_position_to_nt(p1, seq1.len(), params);
            let nt2 = match mutations.convert_position(nt1) {
                Ok(p) => Some(p),
                // deleted: anchor on the last surviving letter before it
                Err(p) => p.checked_sub(1),
            };
            match nt2 {
                None => -1,
                Some(nt2) => {
                    let Some(pos) = convert_nt_position_to_aa(nt2, seq2.len(), params) else {
                        continue;
                    };
                    if pos.position_in_triplet != 0 {
                        if shifted > max_shifted_triplets {
                            return Ok(None);
                        }
                        shifted += 1;
                    }
                    pos.aa_position as isize
                }
            }
        } else {
            aa2.len() as isize
        };

        if p2 == prev_p2 {
            if p1 < aa1.len() {
                result.push(Mutation::deletion(p1, aa1.code_at(p1)));
            }
            continue;
        }

        for i in (prev_p2 + 1) as usize..p2 as usize {
            let inserted = aa2.code_at(i);
            match result.last().copied() {
                Some(last)
                    if last.is_substitution()
                        && p1 > 0
                        && last.position() == p1 - 1
                        && last.from() == inserted =>
                {
                    result.pop();
                    result.push(Mutation::insertion(p1 - 1, last.to()));
                }
                _ => result.push(Mutation::insertion(p1, inserted)),
            }
        }
        if p1 < aa1.len() {
            if let Some(&to) = aa2.codes().get(p2 as usize) {
                if to != aa1.code_at(p1) {
                    result.push(Mutation::substitution(p1, aa1.code_at(p1), to));
                }
            }
        }
        prev_p2 = p2;
    }

    Mutations::from_vec(amino_acid(), result).map(Some)
}
