//! Block container: objects are grouped into blocks that are compressed and checksummed on a
//! worker pool and written in order.
//!
//! Every block starts with a 37 byte little-endian header:
//!
//! ```text
//! flags u8 | payload_size u32 | raw_size u32 | object_count u32 | checksum u64 | special [u64; 2]
//! ```
//!
//! A header with the end flag closes the stream. Special blocks carry only the `special` words
//! and let a reader inject records at a fixed point of the stream.

use super::{PrimitivI, PrimitivO, PrimitivState, Serializable};
use crate::error::{BioError, BioResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crossbeam::channel::{bounded, Receiver, Sender};
use log::debug;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::marker::PhantomData;
use std::thread::{self, JoinHandle};
use xxhash_rust::xxh64::xxh64;

pub const HEADER_SIZE: usize = 37;

/// Default cap on the raw and stored size of one block.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1 << 26;

const COMPRESSED: u8 = 1;
const CHECKSUMMED: u8 = 1 << 1;
const SPECIAL: u8 = 1 << 2;
const END: u8 = 1 << 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct BlockHeader {
    flags: u8,
    payload_size: u32,
    raw_size: u32,
    object_count: u32,
    checksum: u64,
    special: [u64; 2],
}

impl BlockHeader {
    fn end() -> Self {
        BlockHeader {
            flags: END,
            ..Default::default()
        }
    }

    fn special(special: [u64; 2]) -> Self {
        BlockHeader {
            flags: SPECIAL,
            special,
            ..Default::default()
        }
    }

    fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_u8(self.flags)?;
        out.write_u32::<LittleEndian>(self.payload_size)?;
        out.write_u32::<LittleEndian>(self.raw_size)?;
        out.write_u32::<LittleEndian>(self.object_count)?;
        out.write_u64::<LittleEndian>(self.checksum)?;
        out.write_u64::<LittleEndian>(self.special[0])?;
        out.write_u64::<LittleEndian>(self.special[1])
    }

    /// `None` when the input ends cleanly before a header.
    fn read_from<R: Read>(input: &mut R) -> BioResult<Option<Self>> {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            match input.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < HEADER_SIZE {
            return Err(blocks_error(format!("truncated block header ({filled} bytes)")));
        }
        let mut cursor = &bytes[..];
        Ok(Some(BlockHeader {
            flags: cursor.read_u8()?,
            payload_size: cursor.read_u32::<LittleEndian>()?,
            raw_size: cursor.read_u32::<LittleEndian>()?,
            object_count: cursor.read_u32::<LittleEndian>()?,
            checksum: cursor.read_u64::<LittleEndian>()?,
            special: [
                cursor.read_u64::<LittleEndian>()?,
                cursor.read_u64::<LittleEndian>()?,
            ],
        }))
    }
}

fn blocks_error(msg: impl Into<String>) -> BioError {
    BioError::Blocks { msg: msg.into() }
}

#[derive(Clone, Debug)]
pub struct BlockOptions {
    concurrency: usize,
    block_size: usize,
    compression_level: Option<i32>,
    checksum: bool,
    max_block_size: usize,
}

impl Default for BlockOptions {
    fn default() -> Self {
        BlockOptions {
            concurrency: 2,
            block_size: 1 << 16,
            compression_level: Some(3),
            checksum: true,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl BlockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compression (or decompression) workers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Raw bytes after which the current block is closed.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// zstd level, `None` stores blocks uncompressed.
    pub fn with_compression_level(mut self, level: Option<i32>) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Largest block, raw or stored, a writer emits and a reader accepts.
    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }
}

enum Job {
    Data { seq: u64, raw: Vec<u8>, count: u32 },
    Special { seq: u64, special: [u64; 2] },
}

struct Encoded {
    seq: u64,
    header: BlockHeader,
    payload: Vec<u8>,
}

fn encode(job: Job, options: &BlockOptions) -> BioResult<Encoded> {
    let (seq, raw, count) = match job {
        Job::Special { seq, special } => {
            return Ok(Encoded {
                seq,
                header: BlockHeader::special(special),
                payload: Vec::new(),
            })
        }
        Job::Data { seq, raw, count } => (seq, raw, count),
    };
    if raw.len() > options.max_block_size {
        return Err(blocks_error(format!(
            "block of {} bytes exceeds the limit of {}",
            raw.len(),
            options.max_block_size
        )));
    }
    let mut header = BlockHeader {
        raw_size: u32::try_from(raw.len())
            .map_err(|_| blocks_error(format!("block of {} bytes is too large", raw.len())))?,
        object_count: count,
        ..Default::default()
    };
    if options.checksum {
        header.flags |= CHECKSUMMED;
        header.checksum = xxh64(&raw, 0);
    }
    let mut payload = raw;
    if let Some(level) = options.compression_level {
        let compressed = zstd::bulk::compress(&payload, level)?;
        if compressed.len() < payload.len() {
            header.flags |= COMPRESSED;
            payload = compressed;
        }
    }
    header.payload_size = payload.len() as u32;
    Ok(Encoded {
        seq,
        header,
        payload,
    })
}

/// Writes encoded blocks in sequence order, then the end marker.
fn sink<W: Write>(mut output: W, results: Receiver<BioResult<Encoded>>) -> BioResult<W> {
    let mut pending = BTreeMap::new();
    let mut next = 0u64;
    for result in results {
        let block = result?;
        pending.insert(block.seq, block);
        while let Some(block) = pending.remove(&next) {
            block.header.write_to(&mut output)?;
            output.write_all(&block.payload)?;
            next += 1;
        }
    }
    if !pending.is_empty() {
        return Err(blocks_error(format!("block {next} never arrived")));
    }
    BlockHeader::end().write_to(&mut output)?;
    output.flush()?;
    Ok(output)
}

/// Writes objects of type `T` into a block container.
///
/// Objects are serialized on the calling thread; compression happens on the worker pool and the
/// output does not depend on the number of workers.
pub struct BlockWriter<T, W: Write + Send + 'static> {
    options: BlockOptions,
    encoder: PrimitivO<Vec<u8>>,
    count: u32,
    next_seq: u64,
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    sink: Option<JoinHandle<BioResult<W>>>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Serializable, W: Write + Send + 'static> BlockWriter<T, W> {
    pub fn new(output: W, options: BlockOptions) -> Self {
        Self::with_state(output, options, PrimitivState::new())
    }

    pub fn with_state(output: W, options: BlockOptions, state: PrimitivState) -> Self {
        let concurrency = options.concurrency;
        let (job_tx, job_rx) = bounded::<Job>(concurrency * 2);
        let (result_tx, result_rx) = bounded::<BioResult<Encoded>>(concurrency * 2);
        let workers = (0..concurrency)
            .map(|_| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let options = options.clone();
                thread::spawn(move || {
                    for job in jobs {
                        if results.send(encode(job, &options)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        let sink = thread::spawn(move || sink(output, result_rx));
        BlockWriter {
            encoder: PrimitivO::with_state(Vec::new(), state),
            options,
            count: 0,
            next_seq: 0,
            jobs: Some(job_tx),
            workers,
            sink: Some(sink),
            _marker: PhantomData,
        }
    }

    pub fn write(&mut self, value: &T) -> BioResult<()> {
        self.encoder.write_object(value)?;
        self.count += 1;
        if self.encoder.get_mut().len() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }
}

impl<T, W: Write + Send + 'static> BlockWriter<T, W> {
    /// Emits a header-only block after everything written so far.
    pub fn write_special_header(&mut self, special: [u64; 2]) -> BioResult<()> {
        self.flush()?;
        let seq = self.take_seq();
        self.send(Job::Special { seq, special })
    }

    /// Closes the current block, if it holds anything.
    pub fn flush(&mut self) -> BioResult<()> {
        if self.count == 0 {
            return Ok(());
        }
        let raw = std::mem::take(self.encoder.get_mut());
        let count = std::mem::replace(&mut self.count, 0);
        let seq = self.take_seq();
        debug!("block {seq}: {count} objects, {} raw bytes", raw.len());
        self.send(Job::Data { seq, raw, count })
    }

    /// Flushes, writes the end marker and returns the output.
    pub fn finish(mut self) -> BioResult<W> {
        self.flush()?;
        self.close()
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn send(&mut self, job: Job) -> BioResult<()> {
        let sent = match &self.jobs {
            Some(jobs) => jobs.send(job).is_ok(),
            None => false,
        };
        if sent {
            return Ok(());
        }
        // The pipeline only stops early when the sink failed; report why.
        self.close()?;
        Err(blocks_error("block writer is closed"))
    }

    fn close(&mut self) -> BioResult<W> {
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            worker
                .join()
                .map_err(|_| blocks_error("compression worker panicked"))?;
        }
        match self.sink.take() {
            Some(sink) => sink
                .join()
                .map_err(|_| blocks_error("block sink panicked"))?,
            None => Err(blocks_error("block writer is closed")),
        }
    }
}

impl<T, W: Write + Send + 'static> Drop for BlockWriter<T, W> {
    fn drop(&mut self) {
        // Errors surface only through `finish`.
        if self.jobs.is_some() {
            let _ = self.flush();
            let _ = self.close();
        }
    }
}

/// What a reader does with a special header.
pub enum HeaderAction<T> {
    Skip,
    Emit(T),
}

type HeaderHandler<T> = Box<dyn FnMut([u64; 2]) -> HeaderAction<T>>;

struct Frame {
    seq: u64,
    header: BlockHeader,
    payload: Vec<u8>,
}

struct Decoded {
    seq: u64,
    block: BioResult<(BlockHeader, Vec<u8>)>,
}

fn unpack(seq: u64, header: BlockHeader, payload: Vec<u8>) -> BioResult<(BlockHeader, Vec<u8>)> {
    let raw = if header.has(COMPRESSED) {
        zstd::bulk::decompress(&payload, header.raw_size as usize)?
    } else {
        payload
    };
    if raw.len() != header.raw_size as usize {
        return Err(blocks_error(format!(
            "block {seq} holds {} bytes, header says {}",
            raw.len(),
            header.raw_size
        )));
    }
    if header.has(CHECKSUMMED) && xxh64(&raw, 0) != header.checksum {
        return Err(blocks_error(format!("checksum mismatch in block {seq}")));
    }
    Ok((header, raw))
}

fn decode(frame: Frame) -> Decoded {
    Decoded {
        seq: frame.seq,
        block: unpack(frame.seq, frame.header, frame.payload),
    }
}

/// Splits the input into frames; stops at the end marker, on error, or when nobody listens.
fn read_frames<R: Read>(
    mut input: R,
    max_block_size: usize,
    jobs: Sender<Frame>,
    results: Sender<Decoded>,
) {
    let mut seq = 0u64;
    let fail = |seq, error| {
        let _ = results.send(Decoded {
            seq,
            block: Err(error),
        });
    };
    loop {
        let header = match BlockHeader::read_from(&mut input) {
            Ok(Some(header)) => header,
            Ok(None) => return fail(seq, blocks_error("stream ended without end marker")),
            Err(e) => return fail(seq, e),
        };
        if header.has(END) {
            return;
        }
        let oversized = [header.payload_size, header.raw_size]
            .into_iter()
            .find(|&size| size as usize > max_block_size);
        if let Some(size) = oversized {
            return fail(
                seq,
                blocks_error(format!(
                    "block {seq} claims {size} bytes, the limit is {max_block_size}"
                )),
            );
        }
        let mut payload = Vec::new();
        if let Err(e) = (&mut input)
            .take(u64::from(header.payload_size))
            .read_to_end(&mut payload)
        {
            return fail(seq, BioError::Io(e));
        }
        if payload.len() != header.payload_size as usize {
            return fail(
                seq,
                blocks_error(format!(
                    "block {seq} ends after {} of {} bytes",
                    payload.len(),
                    header.payload_size
                )),
            );
        }
        let frame = Frame {
            seq,
            header,
            payload,
        };
        if jobs.send(frame).is_err() {
            return;
        }
        seq += 1;
    }
}

/// Reads objects of type `T` back from a block container, in write order.
pub struct BlockReader<T, R> {
    decoder: PrimitivI<Cursor<Vec<u8>>>,
    remaining: u32,
    results: Option<Receiver<Decoded>>,
    pending: BTreeMap<u64, Decoded>,
    next: u64,
    handler: Option<HeaderHandler<T>>,
    threads: Vec<JoinHandle<()>>,
    done: bool,
    _marker: PhantomData<fn() -> R>,
}

impl<T: Serializable, R: Read + Send + 'static> BlockReader<T, R> {
    pub fn new(input: R, options: &BlockOptions) -> Self {
        Self::with_state(input, options, PrimitivState::new())
    }

    pub fn with_state(input: R, options: &BlockOptions, state: PrimitivState) -> Self {
        let concurrency = options.concurrency;
        let (job_tx, job_rx) = bounded::<Frame>(concurrency * 2);
        let (result_tx, result_rx) = bounded::<Decoded>(concurrency * 2);
        let mut threads: Vec<JoinHandle<()>> = (0..concurrency)
            .map(|_| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                thread::spawn(move || {
                    for frame in jobs {
                        if results.send(decode(frame)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        let max_block_size = options.max_block_size;
        threads.push(thread::spawn(move || {
            read_frames(input, max_block_size, job_tx, result_tx)
        }));
        BlockReader {
            decoder: PrimitivI::with_state(Cursor::new(Vec::new()), state),
            remaining: 0,
            results: Some(result_rx),
            pending: BTreeMap::new(),
            next: 0,
            handler: None,
            threads,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Installs a callback for special headers; without one they are skipped.
    pub fn with_header_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut([u64; 2]) -> HeaderAction<T> + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    fn next_block(&mut self) -> BioResult<Option<(BlockHeader, Vec<u8>)>> {
        loop {
            if let Some(decoded) = self.pending.remove(&self.next) {
                self.next += 1;
                return decoded.block.map(Some);
            }
            let Some(results) = &self.results else {
                return Ok(None);
            };
            match results.recv() {
                Ok(decoded) => {
                    self.pending.insert(decoded.seq, decoded);
                }
                Err(_) if self.pending.is_empty() => return Ok(None),
                Err(_) => {
                    return Err(blocks_error(format!("block {} never arrived", self.next)))
                }
            }
        }
    }

    fn advance(&mut self) -> BioResult<Option<T>> {
        loop {
            if self.remaining > 0 {
                self.remaining -= 1;
                let value = self.decoder.read_object()?;
                let cursor = self.decoder.get_mut();
                if self.remaining == 0 && cursor.position() != cursor.get_ref().len() as u64 {
                    return Err(blocks_error(format!(
                        "block {} has trailing bytes",
                        self.next - 1
                    )));
                }
                return Ok(Some(value));
            }
            let Some((header, raw)) = self.next_block()? else {
                return Ok(None);
            };
            if header.has(SPECIAL) {
                if let Some(handler) = self.handler.as_mut() {
                    if let HeaderAction::Emit(value) = handler(header.special) {
                        return Ok(Some(value));
                    }
                }
                continue;
            }
            *self.decoder.get_mut() = Cursor::new(raw);
            self.remaining = header.object_count;
        }
    }
}

impl<T: Serializable, R: Read + Send + 'static> Iterator for BlockReader<T, R> {
    type Item = BioResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<T, R> Drop for BlockReader<T, R> {
    fn drop(&mut self) {
        // Workers stop on their next send once the receiving end is gone.
        drop(self.results.take());
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}
