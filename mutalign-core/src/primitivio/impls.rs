use super::{PrimitivI, PrimitivO, Serializable, SharedRef, Tag};
use crate::align::scoring::ScoringConfig;
use crate::align::{Alignment, Scoring};
use crate::alphabets::Alphabet;
use crate::error::{BioError, BioResult};
use crate::mutations::{Mutation, Mutations};
use crate::seq::{Range, Sequence, SequenceQuality, SequenceWithQuality};
use std::any::Any;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;

macro_rules! fixed_width {
    ($($ty:ty => $write:ident, $read:ident;)*) => {$(
        impl Serializable for $ty {
            fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
                out.$write(*self)
            }

            fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
                input.$read()
            }
        }
    )*};
}

fixed_width! {
    u8 => write_u8, read_u8;
    bool => write_bool, read_bool;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl Serializable for usize {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        out.write_var_u64(*self as u64)
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        input.read_len()
    }
}

impl Serializable for String {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        out.write_bytes(self.as_bytes())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        String::from_utf8(input.read_bytes()?)
            .map_err(|e| BioError::serialization(format!("string is not utf-8: {e}")))
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        out.write_var_u64(self.len() as u64)?;
        for item in self {
            item.write(out)?;
        }
        Ok(())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        let len = input.read_len()?;
        // Capacity is capped, the length comes from the stream.
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::read(input)?);
        }
        Ok(items)
    }
}

impl<T: Serializable> Serializable for Option<T> {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        T::write_option(self.as_ref(), out)
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        T::read_option(input)
    }
}

fn downcast<S: SharedRef>(object: Rc<dyn Any>) -> BioResult<S> {
    object
        .downcast_ref::<S>()
        .cloned()
        .ok_or_else(|| BioError::serialization("back-reference points to an object of another type"))
}

impl<T: Serializable + 'static> Serializable for Arc<T> {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        if out.write_reference(self)? {
            (**self).write(out)?;
        }
        Ok(())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        Self::read_option(input)?
            .ok_or_else(|| BioError::serialization("null where an object is required"))
    }

    fn write_option<W: Write>(value: Option<&Self>, out: &mut PrimitivO<W>) -> BioResult<()> {
        match value {
            Some(v) => v.write(out),
            None => out.write_null(),
        }
    }

    fn read_option<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Option<Self>> {
        match input.read_tag()? {
            Tag::Null => Ok(None),
            Tag::Existing(object) => downcast(object).map(Some),
            Tag::New => {
                let slot = input.reserve();
                let value = Arc::new(T::read(input)?);
                input.resolve(slot, Rc::new(value.clone()));
                Ok(Some(value))
            }
        }
    }
}

/// The cell is registered before its body is read, so the body may point back at it.
impl<T: Serializable + Default + 'static> Serializable for Rc<RefCell<T>> {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        if out.write_reference(self)? {
            self.borrow().write(out)?;
        }
        Ok(())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        Self::read_option(input)?
            .ok_or_else(|| BioError::serialization("null where an object is required"))
    }

    fn write_option<W: Write>(value: Option<&Self>, out: &mut PrimitivO<W>) -> BioResult<()> {
        match value {
            Some(v) => v.write(out),
            None => out.write_null(),
        }
    }

    fn read_option<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Option<Self>> {
        match input.read_tag()? {
            Tag::Null => Ok(None),
            Tag::Existing(object) => downcast(object).map(Some),
            Tag::New => {
                let cell = Rc::new(RefCell::new(T::default()));
                let slot = input.reserve();
                input.resolve(slot, Rc::new(cell.clone()));
                let value = T::read(input)?;
                *cell.borrow_mut() = value;
                Ok(Some(cell))
            }
        }
    }
}

fn write_alphabet<W: Write>(alphabet: &Alphabet, out: &mut PrimitivO<W>) -> BioResult<()> {
    out.write_bytes(alphabet.name().as_bytes())
}

fn read_alphabet<R: Read>(input: &mut PrimitivI<R>) -> BioResult<&'static Alphabet> {
    Alphabet::by_name(&String::read(input)?)
}

impl Serializable for Range {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        out.write_var_u64(self.from() as u64)?;
        out.write_var_u64(self.length() as u64)
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        let from = input.read_len()?;
        let length = input.read_len()?;
        let to = from.checked_add(length).ok_or_else(|| {
            BioError::serialization(format!("range of {length} letters from {from} overflows"))
        })?;
        Ok(Range::new(from, to))
    }
}

impl Serializable for Sequence {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        write_alphabet(self.alphabet(), out)?;
        out.write_bytes(self.codes())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        let alphabet = read_alphabet(input)?;
        Sequence::from_codes(alphabet, input.read_bytes()?)
    }
}

impl Serializable for SequenceQuality {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        out.write_bytes(self.values())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        Ok(SequenceQuality::new(input.read_bytes()?))
    }
}

impl Serializable for SequenceWithQuality {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        self.sequence().write(out)?;
        self.quality().write(out)
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        let sequence = Sequence::read(input)?;
        SequenceWithQuality::new(sequence, SequenceQuality::read(input)?)
    }
}

impl Serializable for Mutations {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        write_alphabet(self.alphabet(), out)?;
        out.write_var_u64(self.len() as u64)?;
        for m in self.iter() {
            out.write_var_u64(m.raw())?;
        }
        Ok(())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        let alphabet = read_alphabet(input)?;
        let len = input.read_len()?;
        let mut data = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            data.push(Mutation::from_raw(input.read_var_u64()?)?);
        }
        Mutations::from_vec(alphabet, data)
    }
}

impl Serializable for Alignment {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        self.sequence1().write(out)?;
        self.absolute_mutations().write(out)?;
        self.sequence1_range().write(out)?;
        self.sequence2_range().write(out)?;
        out.write_f32(self.score())
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        let sequence1 = Sequence::read(input)?;
        let mutations = Mutations::read(input)?;
        let range1 = Range::read(input)?;
        let range2 = Range::read(input)?;
        Alignment::new(sequence1, mutations, range1, range2, input.read_f32()?)
    }
}

const LINEAR: u8 = 0;
const AFFINE: u8 = 1;
const QUALITY_AWARE: u8 = 2;

impl Serializable for Scoring {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        match ScoringConfig::from(self.clone()) {
            ScoringConfig::Linear {
                alphabet,
                subs_matrix,
                gap_penalty,
            } => {
                out.write_u8(LINEAR)?;
                alphabet.write(out)?;
                subs_matrix.write(out)?;
                out.write_i32(gap_penalty)
            }
            ScoringConfig::Affine {
                alphabet,
                subs_matrix,
                gap_open_penalty,
                gap_extension_penalty,
            } => {
                out.write_u8(AFFINE)?;
                alphabet.write(out)?;
                subs_matrix.write(out)?;
                out.write_i32(gap_open_penalty)?;
                out.write_i32(gap_extension_penalty)
            }
            ScoringConfig::QualityAware {
                alphabet,
                subs_matrix,
                gap_penalty,
                good_quality,
                bad_quality,
                max_quality_penalty,
            } => {
                out.write_u8(QUALITY_AWARE)?;
                alphabet.write(out)?;
                subs_matrix.write(out)?;
                out.write_i32(gap_penalty)?;
                out.write_u8(good_quality)?;
                out.write_u8(bad_quality)?;
                out.write_i32(max_quality_penalty)
            }
        }
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        let kind = input.read_u8()?;
        let alphabet = String::read(input)?;
        let subs_matrix = Vec::<i32>::read(input)?;
        let config = match kind {
            LINEAR => ScoringConfig::Linear {
                alphabet,
                subs_matrix,
                gap_penalty: input.read_i32()?,
            },
            AFFINE => ScoringConfig::Affine {
                alphabet,
                subs_matrix,
                gap_open_penalty: input.read_i32()?,
                gap_extension_penalty: input.read_i32()?,
            },
            QUALITY_AWARE => ScoringConfig::QualityAware {
                alphabet,
                subs_matrix,
                gap_penalty: input.read_i32()?,
                good_quality: input.read_u8()?,
                bad_quality: input.read_u8()?,
                max_quality_penalty: input.read_i32()?,
            },
            other => {
                return Err(BioError::serialization(format!("unknown scoring kind {other}")))
            }
        };
        Scoring::try_from(config)
    }
}
