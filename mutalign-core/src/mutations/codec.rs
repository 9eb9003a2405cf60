//! Human-readable mutation notation.
//!
//! Compact form concatenates tokens (`SA12GDT15I20C`); the fixed form joins them with `:`.
//! BLAST traceback operations (btop) are decoded into the same packed representation.

use super::mutation::{Mutation, MAX_POSITION};
use super::mutations::Mutations;
use crate::alphabets::Alphabet;
use crate::error::{BioError, BioResult};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static BTOP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z*]{2}|-[a-zA-Z*]|[a-zA-Z*]-|[0-9]+)").expect("btop pattern")
});

fn mutation_pattern(alphabet: &Alphabet) -> &Regex {
    alphabet.mutation_pattern.get_or_init(|| {
        let class: String = alphabet
            .symbols()
            .iter()
            .map(|&s| regex::escape(&char::from(s).to_string()))
            .collect();
        let t = format!("([{class}])");
        Regex::new(&format!(r"S{t}(\d+){t}|D{t}(\d+)|I(\d+){t}")).expect("mutation pattern")
    })
}

pub fn encode(mutations: &Mutations) -> String {
    mutations
        .iter()
        .map(|m| m.encode(mutations.alphabet()))
        .collect()
}

pub fn encode_fixed(mutations: &Mutations) -> String {
    mutations
        .iter()
        .map(|m| m.encode(mutations.alphabet()))
        .collect::<Vec<_>>()
        .join(":")
}

struct TokenReader<'t> {
    text: &'t str,
    alphabet: &'static Alphabet,
}

impl TokenReader<'_> {
    fn malformed(&self, offset: usize) -> BioError {
        BioError::MutationFormat {
            text: self.text.to_string(),
            offset,
        }
    }

    fn code(&self, caps: &Captures<'_>, group: usize) -> BioResult<u8> {
        let m = caps.get(group).ok_or_else(|| self.malformed(0))?;
        m.as_str()
            .bytes()
            .next()
            .and_then(|b| self.alphabet.code(b))
            .ok_or_else(|| self.malformed(m.start()))
    }

    fn position(&self, caps: &Captures<'_>, group: usize) -> BioResult<usize> {
        let m = caps.get(group).ok_or_else(|| self.malformed(0))?;
        m.as_str()
            .parse::<usize>()
            .ok()
            .filter(|&p| p <= MAX_POSITION)
            .ok_or_else(|| self.malformed(m.start()))
    }

    fn mutation(&self, caps: &Captures<'_>) -> BioResult<Mutation> {
        if caps.get(1).is_some() {
            Ok(Mutation::substitution(
                self.position(caps, 2)?,
                self.code(caps, 1)?,
                self.code(caps, 3)?,
            ))
        } else if caps.get(4).is_some() {
            Ok(Mutation::deletion(self.position(caps, 5)?, self.code(caps, 4)?))
        } else {
            Ok(Mutation::insertion(self.position(caps, 6)?, self.code(caps, 7)?))
        }
    }
}

/// Parses either notation produced by [`encode`] or [`encode_fixed`].
///
/// Tokens must be contiguous apart from single `:` separators; anything else is rejected.
pub fn decode(text: &str, alphabet: &'static Alphabet) -> BioResult<Mutations> {
    let reader = TokenReader { text, alphabet };
    let mut data = Vec::new();
    let mut cursor = 0usize;
    for caps in mutation_pattern(alphabet).captures_iter(text) {
        let whole = caps.get(0).ok_or_else(|| reader.malformed(cursor))?;
        let gap = &text[cursor..whole.start()];
        if !(gap.is_empty() || (gap == ":" && !data.is_empty())) {
            return Err(reader.malformed(cursor));
        }
        data.push(reader.mutation(&caps)?);
        cursor = whole.end();
    }
    if cursor != text.len() {
        return Err(reader.malformed(cursor));
    }
    Mutations::from_vec(alphabet, data)
}

/// Decodes a BLAST traceback string into mutations of the subject into the query.
///
/// Numbers are runs of identical letters; a pair `XY` has the query letter first.
pub fn btop_decode(btop: &str, alphabet: &'static Alphabet) -> BioResult<Mutations> {
    let reader = TokenReader {
        text: btop,
        alphabet,
    };
    let symbol = |b: u8, offset: usize| alphabet.code(b).ok_or_else(|| reader.malformed(offset));
    let mut data = Vec::new();
    let mut position = 0usize;
    let mut cursor = 0usize;
    for token in BTOP_PATTERN.find_iter(btop) {
        if token.start() != cursor {
            return Err(reader.malformed(cursor));
        }
        cursor = token.end();
        let t = token.as_str().as_bytes();
        if t[0].is_ascii_digit() {
            position += token
                .as_str()
                .parse::<usize>()
                .map_err(|_| reader.malformed(token.start()))?;
        } else if t[0] == b'-' {
            data.push(Mutation::deletion(position, symbol(t[1], token.start() + 1)?));
            position += 1;
        } else if t[1] == b'-' {
            data.push(Mutation::insertion(position, symbol(t[0], token.start())?));
        } else {
            data.push(Mutation::substitution(
                position,
                symbol(t[1], token.start() + 1)?,
                symbol(t[0], token.start())?,
            ));
            position += 1;
        }
    }
    if cursor != btop.len() {
        return Err(reader.malformed(cursor));
    }
    Mutations::from_vec(alphabet, data)
}

/// Rejects mutation lists that are not in normal form: a deletion directly followed by an
/// insertion that restores the edit point, and substitutions of a letter by itself.
pub fn check(mutations: &Mutations) -> BioResult<()> {
    let data = mutations.as_slice();
    for (i, &m) in data.iter().enumerate() {
        if m.is_substitution() && m.from() == m.to() {
            return Err(BioError::IllegalMutations {
                msg: format!("no-op substitution {}", m.encode(mutations.alphabet())),
            });
        }
        let Some(&prev) = i.checked_sub(1).and_then(|p| data.get(p)) else {
            continue;
        };
        let split_substitution = (prev.is_deletion()
            && m.is_insertion()
            && prev.position() + 1 == m.position())
            || (prev.is_insertion() && m.is_deletion() && prev.position() == m.position());
        if split_substitution {
            return Err(BioError::IllegalMutations {
                msg: format!(
                    "{}{} should be a substitution",
                    prev.encode(mutations.alphabet()),
                    m.encode(mutations.alphabet())
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabets::{amino_acid, nucleotide};
    use crate::seq::Sequence;

    #[test]
    fn encode_and_decode() {
        let m = decode("SA12GDT15I20C", nucleotide()).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(encode(&m), "SA12GDT15I20C");
        assert_eq!(encode_fixed(&m), "SA12G:DT15:I20C");
        assert_eq!(decode(&encode_fixed(&m), nucleotide()).unwrap(), m);
        assert!(decode("", nucleotide()).unwrap().is_empty());
    }

    #[test]
    fn decode_amino_acid_symbols() {
        let m = decode("S*3WI5_", amino_acid()).unwrap();
        assert_eq!(encode(&m), "S*3WI5_");
    }

    #[test]
    fn decode_rejects_garbage() {
        for text in ["SA12GX", "hello", "SA12G::DT15", ":SA12G", "SA12G DT15", "SZ1A", "DA"] {
            let err = decode(text, nucleotide()).unwrap_err();
            assert!(matches!(err, BioError::MutationFormat { .. }), "{text}");
        }
        assert!(matches!(
            decode("SA5GSA2G", nucleotide()),
            Err(BioError::IllegalMutations { .. })
        ));
    }

    #[test]
    fn btop() {
        let subject = Sequence::nucleotide("ATTAGACA").unwrap();
        let m = btop_decode("2CT3-C1A-", nucleotide()).unwrap();
        assert_eq!(encode(&m), "ST2CDC6I8A");
        assert_eq!(
            m.mutate(&subject).unwrap(),
            Sequence::nucleotide("ATCAGAAA").unwrap()
        );
        assert!(btop_decode("2C?3", nucleotide()).is_err());
    }

    #[test]
    fn check_normal_form() {
        check(&decode("SA1GDT3I5C", nucleotide()).unwrap()).unwrap();
        for text in ["DA1I2C", "I1CDA1", "SA1A"] {
            assert!(check(&decode(text, nucleotide()).unwrap()).is_err(), "{text}");
        }
    }
}
