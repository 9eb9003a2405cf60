//! Compact binary serialization with shared-reference tracking.
//!
//! Values implement [`Serializable`] and are written with [`PrimitivO::write_object`]. Shared
//! values (`Arc<T>`, `Rc<RefCell<T>>`) are written once per top-level object; later occurrences
//! of the same allocation become back-references, so object graphs (cycles included through
//! `Rc<RefCell<T>>`) come back with their identity preserved.
//!
//! Reference tags are varints: `0` null, `1` a new object whose body follows, `n + 2` the object
//! with id `n`. Ids are handed out in first-occurrence order, known references first.

pub mod blocks;
mod impls;
pub mod varint;

pub use blocks::{BlockOptions, BlockReader, BlockWriter, HeaderAction};

use crate::error::{BioError, BioResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;
use varint::eof;

const NULL_TAG: u64 = 0;
const NEW_TAG: u64 = 1;
const ID_OFFSET: u64 = 2;

pub trait Serializable: Sized {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()>;

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self>;

    /// Encoding of `Option<Self>`; shared references override this to use the null tag.
    fn write_option<W: Write>(value: Option<&Self>, out: &mut PrimitivO<W>) -> BioResult<()> {
        match value {
            None => out.write_u8(0),
            Some(v) => {
                out.write_u8(1)?;
                v.write(out)
            }
        }
    }

    fn read_option<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Option<Self>> {
        match input.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(Self::read(input)?)),
            flag => Err(BioError::serialization(format!("bad option flag {flag}"))),
        }
    }
}

/// A handle whose allocation identifies an object.
pub trait SharedRef: Clone + 'static {
    fn address(&self) -> usize;
}

impl<T: 'static> SharedRef for Arc<T> {
    fn address(&self) -> usize {
        Arc::as_ptr(self) as *const () as usize
    }
}

impl<T: 'static> SharedRef for Rc<RefCell<T>> {
    fn address(&self) -> usize {
        Rc::as_ptr(self) as *const () as usize
    }
}

/// Objects both sides know about before the stream starts; they are never written in full.
///
/// Register the same objects in the same order on the writer and the reader.
#[derive(Clone, Default)]
pub struct PrimitivState {
    known: Vec<Rc<dyn Any>>,
    ids: HashMap<usize, u64>,
}

impl PrimitivState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_known_reference<S: SharedRef>(&mut self, reference: S) {
        let address = reference.address();
        if self.ids.contains_key(&address) {
            return;
        }
        self.ids.insert(address, self.known.len() as u64);
        self.known.push(Rc::new(reference));
    }

    pub fn known_references(&self) -> usize {
        self.known.len()
    }
}

pub struct PrimitivO<W: Write> {
    output: W,
    state: PrimitivState,
    ids: HashMap<usize, u64>,
    // Written allocations stay alive so their addresses are not reused within a session.
    retained: Vec<Rc<dyn Any>>,
    depth: usize,
}

impl<W: Write> PrimitivO<W> {
    pub fn new(output: W) -> Self {
        Self::with_state(output, PrimitivState::new())
    }

    pub fn with_state(output: W, state: PrimitivState) -> Self {
        PrimitivO {
            output,
            state,
            ids: HashMap::new(),
            retained: Vec::new(),
            depth: 0,
        }
    }

    pub fn put_known_reference<S: SharedRef>(&mut self, reference: S) {
        self.state.put_known_reference(reference);
    }

    /// Writes one object; back-references never cross top-level objects.
    pub fn write_object<T: Serializable>(&mut self, value: &T) -> BioResult<()> {
        self.depth += 1;
        let result = value.write(self);
        self.depth -= 1;
        if self.depth == 0 {
            self.ids.clear();
            self.retained.clear();
        }
        result
    }

    pub fn flush(&mut self) -> BioResult<()> {
        Ok(self.output.flush()?)
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    pub(crate) fn get_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn write_u8(&mut self, value: u8) -> BioResult<()> {
        Ok(self.output.write_u8(value)?)
    }

    pub fn write_bool(&mut self, value: bool) -> BioResult<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_u16(&mut self, value: u16) -> BioResult<()> {
        Ok(self.output.write_u16::<LittleEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> BioResult<()> {
        Ok(self.output.write_u32::<LittleEndian>(value)?)
    }

    pub fn write_u64(&mut self, value: u64) -> BioResult<()> {
        Ok(self.output.write_u64::<LittleEndian>(value)?)
    }

    pub fn write_i32(&mut self, value: i32) -> BioResult<()> {
        Ok(self.output.write_i32::<LittleEndian>(value)?)
    }

    pub fn write_i64(&mut self, value: i64) -> BioResult<()> {
        Ok(self.output.write_i64::<LittleEndian>(value)?)
    }

    pub fn write_f32(&mut self, value: f32) -> BioResult<()> {
        Ok(self.output.write_f32::<LittleEndian>(value)?)
    }

    pub fn write_f64(&mut self, value: f64) -> BioResult<()> {
        Ok(self.output.write_f64::<LittleEndian>(value)?)
    }

    pub fn write_var_u32(&mut self, value: u32) -> BioResult<()> {
        Ok(varint::write_u32(&mut self.output, value)?)
    }

    pub fn write_var_u64(&mut self, value: u64) -> BioResult<()> {
        Ok(varint::write_u64(&mut self.output, value)?)
    }

    pub fn write_var_i32(&mut self, value: i32) -> BioResult<()> {
        self.write_var_u32(varint::zigzag32(value))
    }

    pub fn write_var_i64(&mut self, value: i64) -> BioResult<()> {
        self.write_var_u64(varint::zigzag64(value))
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> BioResult<()> {
        self.write_var_u64(bytes.len() as u64)?;
        Ok(self.output.write_all(bytes)?)
    }

    pub(crate) fn write_null(&mut self) -> BioResult<()> {
        self.write_var_u64(NULL_TAG)
    }

    /// Writes the tag for `reference`; true when the body has to follow.
    pub(crate) fn write_reference<S: SharedRef>(&mut self, reference: &S) -> BioResult<bool> {
        let address = reference.address();
        let id = self
            .state
            .ids
            .get(&address)
            .or_else(|| self.ids.get(&address))
            .copied();
        if let Some(id) = id {
            self.write_var_u64(id + ID_OFFSET)?;
            return Ok(false);
        }
        let id = (self.state.known.len() + self.ids.len()) as u64;
        self.ids.insert(address, id);
        self.retained.push(Rc::new(reference.clone()));
        self.write_var_u64(NEW_TAG)?;
        Ok(true)
    }
}

pub(crate) enum Tag {
    Null,
    New,
    Existing(Rc<dyn Any>),
}

pub struct PrimitivI<R: Read> {
    input: R,
    state: PrimitivState,
    // `None` marks an object whose body is still being read.
    session: Vec<Option<Rc<dyn Any>>>,
    depth: usize,
}

impl<R: Read> PrimitivI<R> {
    pub fn new(input: R) -> Self {
        Self::with_state(input, PrimitivState::new())
    }

    pub fn with_state(input: R, state: PrimitivState) -> Self {
        PrimitivI {
            input,
            state,
            session: Vec::new(),
            depth: 0,
        }
    }

    pub fn put_known_reference<S: SharedRef>(&mut self, reference: S) {
        self.state.put_known_reference(reference);
    }

    pub fn read_object<T: Serializable>(&mut self) -> BioResult<T> {
        self.depth += 1;
        let result = T::read(self);
        self.depth -= 1;
        if self.depth == 0 {
            self.session.clear();
        }
        result
    }

    /// Objects registered in the current top-level read, known references excluded.
    pub fn session_references(&self) -> usize {
        self.session.len()
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    pub(crate) fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    pub fn read_u8(&mut self) -> BioResult<u8> {
        self.input.read_u8().map_err(eof)
    }

    pub fn read_bool(&mut self) -> BioResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(BioError::serialization(format!("bad boolean byte {b}"))),
        }
    }

    pub fn read_u16(&mut self) -> BioResult<u16> {
        self.input.read_u16::<LittleEndian>().map_err(eof)
    }

    pub fn read_u32(&mut self) -> BioResult<u32> {
        self.input.read_u32::<LittleEndian>().map_err(eof)
    }

    pub fn read_u64(&mut self) -> BioResult<u64> {
        self.input.read_u64::<LittleEndian>().map_err(eof)
    }

    pub fn read_i32(&mut self) -> BioResult<i32> {
        self.input.read_i32::<LittleEndian>().map_err(eof)
    }

    pub fn read_i64(&mut self) -> BioResult<i64> {
        self.input.read_i64::<LittleEndian>().map_err(eof)
    }

    pub fn read_f32(&mut self) -> BioResult<f32> {
        self.input.read_f32::<LittleEndian>().map_err(eof)
    }

    pub fn read_f64(&mut self) -> BioResult<f64> {
        self.input.read_f64::<LittleEndian>().map_err(eof)
    }

    pub fn read_var_u32(&mut self) -> BioResult<u32> {
        varint::read_u32(&mut self.input)
    }

    pub fn read_var_u64(&mut self) -> BioResult<u64> {
        varint::read_u64(&mut self.input)
    }

    pub fn read_var_i32(&mut self) -> BioResult<i32> {
        Ok(varint::unzigzag32(self.read_var_u32()?))
    }

    pub fn read_var_i64(&mut self) -> BioResult<i64> {
        Ok(varint::unzigzag64(self.read_var_u64()?))
    }

    pub fn read_len(&mut self) -> BioResult<usize> {
        let len = self.read_var_u64()?;
        usize::try_from(len).map_err(|_| BioError::serialization(format!("length {len} too large")))
    }

    pub fn read_bytes(&mut self) -> BioResult<Vec<u8>> {
        let len = self.read_len()?;
        let mut bytes = Vec::new();
        (&mut self.input)
            .take(len as u64)
            .read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(BioError::serialization("unexpected end of input"));
        }
        Ok(bytes)
    }

    pub(crate) fn read_tag(&mut self) -> BioResult<Tag> {
        match self.read_var_u64()? {
            NULL_TAG => Ok(Tag::Null),
            NEW_TAG => Ok(Tag::New),
            tag => {
                let id = (tag - ID_OFFSET) as usize;
                let known = self.state.known.len();
                let slot = if id < known {
                    Some(&self.state.known[id])
                } else {
                    self.session.get(id - known).and_then(Option::as_ref)
                };
                match slot {
                    Some(object) => Ok(Tag::Existing(object.clone())),
                    None if id - known < self.session.len() => Err(BioError::serialization(
                        format!("reference {id} used before it was resolved"),
                    )),
                    None => Err(BioError::serialization(format!("unknown reference {id}"))),
                }
            }
        }
    }

    /// Reserves the id of a new object before its body is read.
    pub(crate) fn reserve(&mut self) -> usize {
        self.session.push(None);
        self.session.len() - 1
    }

    pub(crate) fn resolve(&mut self, slot: usize, object: Rc<dyn Any>) {
        self.session[slot] = Some(object);
    }
}

/// Writes `value` as a single top-level object into a fresh buffer.
pub fn to_bytes<T: Serializable>(value: &T) -> BioResult<Vec<u8>> {
    let mut out = PrimitivO::new(Vec::new());
    out.write_object(value)?;
    Ok(out.into_inner())
}

pub fn from_bytes<T: Serializable>(bytes: &[u8]) -> BioResult<T> {
    PrimitivI::new(bytes).read_object()
}

#[cfg(test)]
mod tests;
