//! Single-position edits packed into a `u64`.
//!
//! ```text
//!  63 ........ 12 | 11 10 | 9 ... 5 | 4 ... 0
//!     position    | type  |  from   |   to
//! ```
//!
//! Type codes are chosen so that, at equal positions, an insertion sorts before the
//! substitution or deletion of the letter at that position.

use crate::alphabets::Alphabet;
use crate::error::{BioError, BioResult};
use std::fmt;

pub const TO_MASK: u64 = 0x1F;
pub const FROM_OFFSET: u32 = 5;
pub const FROM_MASK: u64 = 0x1F << FROM_OFFSET;
pub const TYPE_OFFSET: u32 = 10;
pub const TYPE_MASK: u64 = 0b11 << TYPE_OFFSET;
pub const POSITION_OFFSET: u32 = 12;

const RAW_INSERTION: u64 = 1 << TYPE_OFFSET;
const RAW_SUBSTITUTION: u64 = 2 << TYPE_OFFSET;
const RAW_DELETION: u64 = 3 << TYPE_OFFSET;

/// Largest position that fits the packed layout.
pub const MAX_POSITION: usize = (u64::MAX >> POSITION_OFFSET) as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationType {
    Substitution,
    Deletion,
    Insertion,
}

impl MutationType {
    pub fn letter(self) -> char {
        match self {
            MutationType::Substitution => 'S',
            MutationType::Deletion => 'D',
            MutationType::Insertion => 'I',
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mutation(u64);

impl Mutation {
    #[inline]
    fn pack(position: usize, kind: u64, from: u8, to: u8) -> Self {
        debug_assert!(position <= MAX_POSITION);
        debug_assert!((from as u64) <= TO_MASK && (to as u64) <= TO_MASK);
        Mutation(
            ((position as u64) << POSITION_OFFSET)
                | kind
                | ((from as u64) << FROM_OFFSET)
                | to as u64,
        )
    }

    pub fn substitution(position: usize, from: u8, to: u8) -> Self {
        Self::pack(position, RAW_SUBSTITUTION, from, to)
    }

    pub fn deletion(position: usize, from: u8) -> Self {
        Self::pack(position, RAW_DELETION, from, 0)
    }

    /// Insertion of `to` before the letter at `position`.
    pub fn insertion(position: usize, to: u8) -> Self {
        Self::pack(position, RAW_INSERTION, 0, to)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> BioResult<Self> {
        let m = Mutation(raw);
        match raw & TYPE_MASK {
            0 => Err(BioError::IllegalMutations {
                msg: format!("raw mutation {raw:#x} has no type"),
            }),
            RAW_DELETION if m.to() != 0 => Err(BioError::IllegalMutations {
                msg: format!("raw deletion {raw:#x} carries a target letter"),
            }),
            RAW_INSERTION if m.from() != 0 => Err(BioError::IllegalMutations {
                msg: format!("raw insertion {raw:#x} carries a source letter"),
            }),
            _ => Ok(m),
        }
    }

    #[inline]
    pub fn kind(self) -> MutationType {
        match self.0 & TYPE_MASK {
            RAW_SUBSTITUTION => MutationType::Substitution,
            RAW_DELETION => MutationType::Deletion,
            _ => MutationType::Insertion,
        }
    }

    #[inline]
    pub fn position(self) -> usize {
        (self.0 >> POSITION_OFFSET) as usize
    }

    #[inline]
    pub fn from(self) -> u8 {
        ((self.0 & FROM_MASK) >> FROM_OFFSET) as u8
    }

    #[inline]
    pub fn to(self) -> u8 {
        (self.0 & TO_MASK) as u8
    }

    #[inline]
    pub fn is_substitution(self) -> bool {
        self.0 & TYPE_MASK == RAW_SUBSTITUTION
    }

    #[inline]
    pub fn is_deletion(self) -> bool {
        self.0 & TYPE_MASK == RAW_DELETION
    }

    #[inline]
    pub fn is_insertion(self) -> bool {
        self.0 & TYPE_MASK == RAW_INSERTION
    }

    /// Change in sequence length caused by this mutation.
    #[inline]
    pub fn length_delta(self) -> isize {
        match self.kind() {
            MutationType::Substitution => 0,
            MutationType::Deletion => -1,
            MutationType::Insertion => 1,
        }
    }

    pub fn with_position(self, position: usize) -> Self {
        Mutation((self.0 & !(u64::MAX << POSITION_OFFSET)) | ((position as u64) << POSITION_OFFSET))
    }

    /// # Panics
    /// Panics if the shifted position would be negative.
    pub fn move_by(self, offset: isize) -> Self {
        let position = self
            .position()
            .checked_add_signed(offset)
            .expect("mutation moved before sequence start");
        self.with_position(position)
    }

    /// Text token: `S<from><pos><to>`, `D<from><pos>` or `I<pos><to>`.
    pub fn encode(self, alphabet: &Alphabet) -> String {
        let from = char::from(alphabet.symbol(self.from()));
        let to = char::from(alphabet.symbol(self.to()));
        match self.kind() {
            MutationType::Substitution => format!("S{from}{}{to}", self.position()),
            MutationType::Deletion => format!("D{from}{}", self.position()),
            MutationType::Insertion => format!("I{}{to}", self.position()),
        }
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}>{}",
            self.kind().letter(),
            self.position(),
            self.from(),
            self.to()
        )
    }
}
