//! Streams queries through an external BLAST-like aligner running as a subprocess.
//!
//! Queries go to the child's stdin as FASTA records named `Q1`, `Q2`, ...; tabular output
//! (`-outfmt 7` with [`OUTPUT_FORMAT`] columns) is read back on a second thread so neither pipe
//! can fill up and block the other.

use crate::align::Alignment;
use crate::alphabets::Alphabet;
use crate::error::{BioError, BioResult};
use crate::mutations::btop_decode;
use crate::seq::{Range, Sequence};
use crossbeam::channel::{bounded, select, Receiver, Sender};
use csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Columns requested from the tool, in the order they are parsed.
pub const OUTPUT_FORMAT: &str = "7 btop sstart send qstart qend score bitscore evalue stitle qseq sseq";

const QUERY_PREFIX: &str = "Q";
const RESULTS_CAPACITY: usize = 32;

/// `blastn`/`blastp` invocation against a named database with the expected output format.
pub fn blast_command(alphabet: &Alphabet, database: &str) -> Command {
    let program = if alphabet.name() == crate::alphabets::nucleotide().name() {
        "blastn"
    } else {
        "blastp"
    };
    let mut command = Command::new(program);
    command.args(["-db", database, "-outfmt", OUTPUT_FORMAT]);
    command
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternalHit {
    /// `sequence1` is the aligned part of the subject, `sequence2` the query.
    pub alignment: Alignment,
    pub subject_title: String,
    pub subject_range: Range,
    pub score: f64,
    pub bit_score: f64,
    pub e_value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternalResult {
    pub query: Sequence,
    pub hits: Vec<ExternalHit>,
}

type Pending = Arc<Mutex<HashMap<String, Sequence>>>;

fn process_error(msg: impl Into<String>) -> BioError {
    BioError::ExternalProcess { msg: msg.into() }
}

pub struct ExternalAligner {
    results: Receiver<BioResult<ExternalResult>>,
    child: Arc<Mutex<Child>>,
    cancel: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl ExternalAligner {
    /// Starts `command` and feeds it every sequence received from `source`; stdin is closed
    /// once `source` disconnects.
    pub fn spawn(
        mut command: Command,
        alphabet: &'static Alphabet,
        source: Receiver<Sequence>,
    ) -> BioResult<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| process_error("child has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| process_error("child has no stdout"))?;
        debug!("started external aligner {:?}", command.get_program());

        let child = Arc::new(Mutex::new(child));
        let pending: Pending = Arc::default();
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let (results_tx, results_rx) = bounded(RESULTS_CAPACITY);

        let pusher = {
            let pending = pending.clone();
            let cancel = cancel_rx.clone();
            thread::spawn(move || push(stdin, source, pending, cancel))
        };
        let fetcher = {
            let child = child.clone();
            thread::spawn(move || {
                let fetched = Fetcher {
                    alphabet,
                    pending,
                    results: &results_tx,
                    cancel: &cancel_rx,
                }
                .run(stdout);
                let outcome = fetched.and_then(|()| wait(&child, &cancel_rx));
                if let Err(e) = outcome {
                    if !is_cancelled(&cancel_rx) {
                        deliver(&results_tx, &cancel_rx, Err(e));
                    }
                }
            })
        };

        Ok(ExternalAligner {
            results: results_rx,
            child,
            cancel: Some(cancel_tx),
            threads: vec![pusher, fetcher],
        })
    }

    /// Result batches in the order the tool reports them; closes after the last query.
    pub fn results(&self) -> &Receiver<BioResult<ExternalResult>> {
        &self.results
    }

    /// Stops both threads without draining and kills the child.
    pub fn close(&mut self) {
        let Some(cancel) = self.cancel.take() else {
            return;
        };
        drop(cancel);
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.kill() {
                debug!("external aligner already gone: {e}");
            }
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Iterator for ExternalAligner {
    type Item = BioResult<ExternalResult>;

    fn next(&mut self) -> Option<Self::Item> {
        self.results.recv().ok()
    }
}

impl Drop for ExternalAligner {
    fn drop(&mut self) {
        self.close();
    }
}

/// The cancel sender is only ever dropped, so disconnection means `close` was called.
fn is_cancelled(cancel: &Receiver<()>) -> bool {
    matches!(
        cancel.try_recv(),
        Err(crossbeam::channel::TryRecvError::Disconnected)
    )
}

fn push(stdin: ChildStdin, source: Receiver<Sequence>, pending: Pending, cancel: Receiver<()>) {
    let mut out = BufWriter::new(stdin);
    let mut counter = 0u64;
    loop {
        let query = select! {
            recv(source) -> query => match query {
                Ok(query) => query,
                Err(_) => break,
            },
            recv(cancel) -> _ => return,
        };
        counter += 1;
        let name = format!("{QUERY_PREFIX}{counter}");
        let text = query.to_string();
        if let Ok(mut pending) = pending.lock() {
            pending.insert(name.clone(), query);
        }
        // Flushed per query: the tool may answer before stdin closes.
        if let Err(e) = writeln!(out, ">{name}\n{text}").and_then(|()| out.flush()) {
            warn!("external aligner stopped reading queries: {e}");
            return;
        }
    }
    if let Err(e) = out.flush() {
        warn!("could not flush queries to external aligner: {e}");
    }
}

/// Sends unless `close` was called first; false when nobody is listening anymore.
fn deliver(
    results: &Sender<BioResult<ExternalResult>>,
    cancel: &Receiver<()>,
    result: BioResult<ExternalResult>,
) -> bool {
    select! {
        send(results, result) -> sent => sent.is_ok(),
        recv(cancel) -> _ => false,
    }
}

/// Polls for the exit status so `close` can still take the lock to kill the child.
fn wait(child: &Mutex<Child>, cancel: &Receiver<()>) -> BioResult<()> {
    loop {
        let status = child
            .lock()
            .map_err(|_| process_error("child handle poisoned"))?
            .try_wait()?;
        if let Some(status) = status {
            return if status.success() {
                Ok(())
            } else {
                Err(process_error(format!("aligner exited with {status}")))
            };
        }
        if is_cancelled(cancel) {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
}

struct Fetcher<'a> {
    alphabet: &'static Alphabet,
    pending: Pending,
    results: &'a Sender<BioResult<ExternalResult>>,
    cancel: &'a Receiver<()>,
}

impl Fetcher<'_> {
    fn run(&self, stdout: ChildStdout) -> BioResult<()> {
        let mut query: Option<Sequence> = None;
        let mut expected: Option<usize> = None;
        let mut hits = Vec::new();

        for line in BufReader::new(stdout).lines() {
            let line = line?;
            if is_cancelled(self.cancel) {
                return Ok(());
            }
            if line.contains("hits found") {
                let count = line.replace('#', "").replace("hits found", "");
                let count = count.trim();
                expected = Some(count.parse().map_err(|_| {
                    process_error(format!("bad hit count '{count}' in '{line}'"))
                })?);
                hits.clear();
            } else if let Some(at) = line.find("Query:") {
                let id = line[at + "Query:".len()..].trim();
                let removed = self.pending.lock().ok().and_then(|mut p| p.remove(id));
                query = Some(removed.ok_or_else(|| {
                    process_error(format!("aligner reported unknown query '{id}'"))
                })?);
            } else if !line.starts_with('#') && !line.trim().is_empty() {
                if expected.is_none() {
                    return Err(process_error(format!("hit line before hit count: '{line}'")));
                }
                hits.push(parse_hit(&line, self.alphabet)?);
            }

            if expected == Some(hits.len()) {
                let query = query
                    .take()
                    .ok_or_else(|| process_error("hits reported before their query"))?;
                expected = None;
                let result = ExternalResult {
                    query,
                    hits: std::mem::take(&mut hits),
                };
                if !deliver(self.results, self.cancel, Ok(result)) {
                    return Ok(());
                }
            }
        }
        if expected.is_some() {
            return Err(process_error("output ended inside a result batch"));
        }
        Ok(())
    }
}

fn field<'r>(record: &'r StringRecord, index: usize, name: &str) -> BioResult<&'r str> {
    record
        .get(index)
        .ok_or_else(|| process_error(format!("hit line has no {name} column")))
}

fn number<T: std::str::FromStr>(record: &StringRecord, index: usize, name: &str) -> BioResult<T> {
    let text = field(record, index, name)?;
    text.trim()
        .parse()
        .map_err(|_| process_error(format!("bad {name} '{text}'")))
}

/// Parses one tab-separated hit line into an alignment of the ungapped subject fragment.
fn parse_hit(line: &str, alphabet: &'static Alphabet) -> BioResult<ExternalHit> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .from_reader(line.as_bytes());
    let mut record = StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Err(process_error("empty hit line"));
    }

    let btop = field(&record, 0, "btop")?;
    let subject_start: usize = number(&record, 1, "sstart")?;
    let subject_end: usize = number(&record, 2, "send")?;
    let query_start: usize = number(&record, 3, "qstart")?;
    let query_end: usize = number(&record, 4, "qend")?;
    let score: f64 = number(&record, 5, "score")?;
    let bit_score: f64 = number(&record, 6, "bitscore")?;
    let e_value: f64 = number(&record, 7, "evalue")?;
    let subject_title = field(&record, 8, "stitle")?.to_string();
    let subject = field(&record, 10, "sseq")?.replace('-', "");

    if query_start == 0 || query_end < query_start {
        return Err(process_error(format!(
            "bad query coordinates {query_start}..{query_end}"
        )));
    }
    let subject = Sequence::parse(alphabet, &subject)?;
    let mutations = btop_decode(btop, alphabet)?;
    let alignment = Alignment::new(
        subject.clone(),
        mutations,
        Range::new(0, subject.len()),
        Range::new(query_start - 1, query_end),
        bit_score as f32,
    )?;
    Ok(ExternalHit {
        alignment,
        subject_title,
        subject_range: Range::new(
            subject_start.min(subject_end).saturating_sub(1),
            subject_start.max(subject_end),
        ),
        score,
        bit_score,
        e_value,
    })
}
