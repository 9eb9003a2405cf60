use crate::error::{BioError, BioResult};
use crate::seq::{Range, Sequence};
use std::sync::Arc;

pub const PHRED_OFFSET: u8 = 33;

/// Per-base Phred scores.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceQuality {
    data: Arc<[u8]>,
}

impl SequenceQuality {
    pub fn new(values: Vec<u8>) -> Self {
        SequenceQuality {
            data: values.into(),
        }
    }

    pub fn uniform(length: usize, value: u8) -> Self {
        Self::new(vec![value; length])
    }

    pub fn from_phred33(text: &[u8]) -> BioResult<Self> {
        text.iter()
            .enumerate()
            .map(|(pos, &c)| {
                c.checked_sub(PHRED_OFFSET).ok_or(BioError::InvalidChar {
                    ch: char::from(c),
                    pos,
                    alphabet: "phred33",
                })
            })
            .collect::<BioResult<Vec<u8>>>()
            .map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn value(&self, position: usize) -> u8 {
        self.data[position]
    }

    pub fn values(&self) -> &[u8] {
        &self.data
    }

    pub fn min_value(&self) -> Option<u8> {
        self.data.iter().copied().min()
    }

    pub fn range(&self, range: Range) -> SequenceQuality {
        Self::new(self.data[range.from()..range.to()].to_vec())
    }

    pub fn reverse(&self) -> SequenceQuality {
        Self::new(self.data.iter().rev().copied().collect())
    }

    pub fn to_phred33(&self) -> String {
        self.data
            .iter()
            .map(|&q| char::from(q.saturating_add(PHRED_OFFSET)))
            .collect()
    }
}

/// A sequence paired with its quality track.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceWithQuality {
    sequence: Sequence,
    quality: SequenceQuality,
}

impl SequenceWithQuality {
    pub fn new(sequence: Sequence, quality: SequenceQuality) -> BioResult<Self> {
        if sequence.len() != quality.len() {
            return Err(BioError::QualityLength {
                quality: quality.len(),
                sequence: sequence.len(),
            });
        }
        Ok(SequenceWithQuality { sequence, quality })
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn quality(&self) -> &SequenceQuality {
        &self.quality
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn range(&self, range: Range) -> SequenceWithQuality {
        SequenceWithQuality {
            sequence: self.sequence.range(range),
            quality: self.quality.range(range),
        }
    }

    pub fn into_parts(self) -> (Sequence, SequenceQuality) {
        (self.sequence, self.quality)
    }
}
