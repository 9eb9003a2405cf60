use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BioError {
    #[error("invalid character '{ch}' at position {pos} for {alphabet} alphabet")]
    InvalidChar {
        ch: char,
        pos: usize,
        alphabet: &'static str,
    },

    #[error("unknown alphabet '{0}'")]
    UnknownAlphabet(String),

    #[error("incompatible alphabets: {left} vs {right}")]
    AlphabetMismatch {
        left: &'static str,
        right: &'static str,
    },

    #[error("invalid scoring parameters: {msg}")]
    InvalidScoring { msg: String },

    #[error("invalid parameters: {msg}")]
    InvalidParameters { msg: String },

    #[error("invalid range [{from}, {to}) for sequence of length {len}")]
    InvalidRange { from: usize, to: usize, len: usize },

    #[error("invalid alignment: {msg}")]
    InvalidAlignment { msg: String },

    #[error("mutation expects '{expected}' at position {position}, sequence has '{actual}'")]
    MutationMismatch {
        position: usize,
        expected: char,
        actual: char,
    },

    #[error("illegal mutations: {msg}")]
    IllegalMutations { msg: String },

    #[error("malformed mutation text '{text}' at offset {offset}")]
    MutationFormat { text: String, offset: usize },

    #[error("translation error: {msg}")]
    Translation { msg: String },

    #[error("quality length {quality} does not match sequence length {sequence}")]
    QualityLength { quality: usize, sequence: usize },

    #[error("serialization error: {msg}")]
    Serialization { msg: String },

    #[error("block container error: {msg}")]
    Blocks { msg: String },

    #[error("external aligner error: {msg}")]
    ExternalProcess { msg: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tabular parse error: {0}")]
    Csv(#[from] csv::Error),
}

impl BioError {
    pub(crate) fn serialization(msg: impl Into<String>) -> Self {
        BioError::Serialization { msg: msg.into() }
    }

    pub(crate) fn invalid_alignment(msg: impl Into<String>) -> Self {
        BioError::InvalidAlignment { msg: msg.into() }
    }
}

pub type BioResult<T> = Result<T, BioError>;
