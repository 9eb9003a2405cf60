use super::scoring::{Scoring, ScoringModel};
use crate::error::{BioError, BioResult};
use crate::mutations::{Mutation, MutationType, Mutations};
use crate::seq::sequence::check_same_alphabet;
use crate::seq::{Range, Sequence};
use std::fmt;

/// Pairwise alignment stored as edits of `sequence1`.
///
/// Mutation positions are absolute in `sequence1`; `sequence2` is described only by the range
/// the alignment covers in it.
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    sequence1: Sequence,
    mutations: Mutations,
    sequence1_range: Range,
    sequence2_range: Range,
    score: f32,
}

impl Alignment {
    pub fn new(
        sequence1: Sequence,
        mutations: Mutations,
        sequence1_range: Range,
        sequence2_range: Range,
        score: f32,
    ) -> BioResult<Self> {
        check_same_alphabet(sequence1.alphabet(), mutations.alphabet())?;
        if sequence1_range.to() > sequence1.len() {
            return Err(BioError::InvalidRange {
                from: sequence1_range.from(),
                to: sequence1_range.to(),
                len: sequence1.len(),
            });
        }
        for m in mutations.iter() {
            let inside = if m.is_insertion() {
                sequence1_range.contains_boundary(m.position())
            } else {
                sequence1_range.contains(m.position())
            };
            if !inside {
                return Err(BioError::invalid_alignment(format!(
                    "{} lies outside {sequence1_range}",
                    m.encode(mutations.alphabet())
                )));
            }
            if !m.is_insertion() && sequence1.code_at(m.position()) != m.from() {
                return Err(BioError::MutationMismatch {
                    position: m.position(),
                    expected: char::from(mutations.alphabet().symbol(m.from())),
                    actual: sequence1.symbol_at(m.position()),
                });
            }
        }
        let expected = sequence1_range.length() as isize + mutations.length_delta();
        if expected != sequence2_range.length() as isize {
            return Err(BioError::invalid_alignment(format!(
                "{sequence1_range} with length delta {} cannot produce {sequence2_range}",
                mutations.length_delta()
            )));
        }
        Ok(Alignment {
            sequence1,
            mutations,
            sequence1_range,
            sequence2_range,
            score,
        })
    }

    /// Builds an alignment and scores it with `scoring`.
    pub fn scored(
        scoring: &Scoring,
        sequence1: Sequence,
        mutations: Mutations,
        sequence1_range: Range,
        sequence2_range: Range,
    ) -> BioResult<Self> {
        let score = calculate_score(scoring, &sequence1, sequence1_range, &mutations)?;
        Self::new(
            sequence1,
            mutations,
            sequence1_range,
            sequence2_range,
            score as f32,
        )
    }

    pub fn sequence1(&self) -> &Sequence {
        &self.sequence1
    }

    pub fn absolute_mutations(&self) -> &Mutations {
        &self.mutations
    }

    /// Mutations relative to `sequence1_range.from()`.
    pub fn relative_mutations(&self) -> Mutations {
        self.mutations.move_by(-(self.sequence1_range.from() as isize))
    }

    pub fn sequence1_range(&self) -> Range {
        self.sequence1_range
    }

    pub fn sequence2_range(&self) -> Range {
        self.sequence2_range
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    /// Matching columns over matching plus mismatching ones; gaps are ignored.
    pub fn similarity(&self) -> f32 {
        let mut mismatches = 0usize;
        let mut consumed = 0usize;
        for m in self.mutations.iter() {
            match m.kind() {
                MutationType::Substitution => {
                    mismatches += 1;
                    consumed += 1;
                }
                MutationType::Deletion => consumed += 1,
                MutationType::Insertion => {}
            }
        }
        let matches = self.sequence1_range.length() - consumed;
        if matches + mismatches == 0 {
            return 0.0;
        }
        matches as f32 / (matches + mismatches) as f32
    }

    /// Position in sequence2 aligned to `position` of sequence1.
    ///
    /// `None` outside the aligned range. A deleted letter gives `Err` with the sequence2
    /// position it would be inserted at, as [`Mutations::convert_position`] does.
    pub fn convert_position(&self, position: usize) -> Option<Result<usize, usize>> {
        if !self.sequence1_range.contains_boundary(position) {
            return None;
        }
        let to_sequence2 = |p: usize| self.sequence2_range.from() + p - self.sequence1_range.from();
        Some(
            self.mutations
                .convert_position(position)
                .map(to_sequence2)
                .map_err(to_sequence2),
        )
    }

    /// Position in sequence2 where the part of the alignment starting at letter `position`
    /// of sequence1 begins; insertions at `position` belong to the preceding part.
    fn sequence2_boundary(&self, position: usize) -> usize {
        let delta: isize = self
            .mutations
            .iter()
            .take_while(|m| {
                m.position() < position || (m.position() == position && m.is_insertion())
            })
            .map(Mutation::length_delta)
            .sum();
        let offset = (position - self.sequence1_range.from()) as isize + delta;
        self.sequence2_range.from() + offset as usize
    }

    /// Sub-alignment covering `range` of sequence1, rescored with `scoring`.
    pub fn get_range(&self, range: Range, scoring: &Scoring) -> BioResult<Alignment> {
        if !self.sequence1_range.contains_range(&range) {
            return Err(BioError::invalid_alignment(format!(
                "{range} is not inside {}",
                self.sequence1_range
            )));
        }
        let mutations = self.mutations.extract_absolute_range(range);
        let sequence2_range = Range::new(
            self.sequence2_boundary(range.from()),
            self.sequence2_boundary(range.to()),
        );
        Alignment::scored(
            scoring,
            self.sequence1.clone(),
            mutations,
            range,
            sequence2_range,
        )
    }

    /// Same alignment seen from `sequence2`.
    pub fn invert(&self, sequence2: &Sequence) -> BioResult<Alignment> {
        let mutations = self
            .relative_mutations()
            .invert()
            .move_by(self.sequence2_range.from() as isize);
        Alignment::new(
            sequence2.clone(),
            mutations,
            self.sequence2_range,
            self.sequence1_range,
            self.score,
        )
    }

    pub fn alignment_helper(&self) -> BioResult<AlignmentHelper> {
        let alphabet = self.sequence1.alphabet();
        let symbol = |c: u8| char::from(alphabet.symbol(c));
        let mut helper = AlignmentHelper {
            sequence1: String::new(),
            markup: String::new(),
            sequence2: String::new(),
            sequence1_from: self.sequence1_range.from(),
            sequence2_from: self.sequence2_range.from(),
        };
        let mut push = |a: char, b: char, mark: char| {
            helper.sequence1.push(a);
            helper.sequence2.push(b);
            helper.markup.push(mark);
        };
        let mut pointer = self.sequence1_range.from();
        for m in self.mutations.iter() {
            while pointer < m.position() {
                let c = symbol(self.sequence1.code_at(pointer));
                push(c, c, '|');
                pointer += 1;
            }
            if !m.is_insertion() && self.sequence1.code_at(pointer) != m.from() {
                return Err(BioError::MutationMismatch {
                    position: pointer,
                    expected: symbol(m.from()),
                    actual: self.sequence1.symbol_at(pointer),
                });
            }
            match m.kind() {
                MutationType::Substitution => {
                    push(symbol(m.from()), symbol(m.to()), ' ');
                    pointer += 1;
                }
                MutationType::Deletion => {
                    push(symbol(m.from()), '-', ' ');
                    pointer += 1;
                }
                MutationType::Insertion => push('-', symbol(m.to()), ' '),
            }
        }
        while pointer < self.sequence1_range.to() {
            let c = symbol(self.sequence1.code_at(pointer));
            push(c, c, '|');
            pointer += 1;
        }
        Ok(helper)
    }
}

/// Score of `mutations` applied to `range` of `sequence1`.
///
/// Runs of deletions at consecutive positions and of insertions at one position are charged
/// as single gaps.
pub fn calculate_score(
    scoring: &Scoring,
    sequence1: &Sequence,
    range: Range,
    mutations: &Mutations,
) -> BioResult<i32> {
    check_same_alphabet(scoring.alphabet(), sequence1.alphabet())?;
    let mut score: i32 = sequence1.codes()[range.from()..range.to()]
        .iter()
        .map(|&c| scoring.score(c, c))
        .sum();
    let mut gap: Option<(Mutation, usize)> = None;
    let close = |gap: &mut Option<(Mutation, usize)>, score: &mut i32| {
        if let Some((_, len)) = gap.take() {
            *score += scoring.gap_cost(len);
        }
    };
    for m in mutations.iter() {
        let continues = match gap {
            Some((last, len)) if last.kind() == m.kind() => {
                if m.is_deletion() {
                    last.position() + len == m.position()
                } else {
                    last.position() == m.position()
                }
            }
            _ => false,
        };
        if continues {
            if let Some((_, len)) = gap.as_mut() {
                *len += 1;
            }
        } else {
            close(&mut gap, &mut score);
        }
        match m.kind() {
            MutationType::Substitution => {
                score += scoring.score(m.from(), m.to()) - scoring.score(m.from(), m.from());
            }
            MutationType::Deletion => {
                score -= scoring.score(m.from(), m.from());
                if !continues {
                    gap = Some((m, 1));
                }
            }
            MutationType::Insertion => {
                if !continues {
                    gap = Some((m, 1));
                }
            }
        }
    }
    close(&mut gap, &mut score);
    Ok(score)
}

/// Three-line text rendering of an alignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlignmentHelper {
    pub sequence1: String,
    pub markup: String,
    pub sequence2: String,
    pub sequence1_from: usize,
    pub sequence2_from: usize,
}

impl fmt::Display for AlignmentHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.sequence1_from.max(self.sequence2_from).to_string().len();
        writeln!(f, "{:>width$} {}", self.sequence1_from, self.sequence1)?;
        writeln!(f, "{:>width$} {}", "", self.markup)?;
        write!(f, "{:>width$} {}", self.sequence2_from, self.sequence2)
    }
}
