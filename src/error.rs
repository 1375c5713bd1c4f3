//! Error types for codec construction, fitting, decoding and persistence.

use std::{io, path::PathBuf};

use indicatif::style::TemplateError;
use thiserror::Error;

use crate::types::{CodecKind, TokenId};

/// Errors raised when an action array does not have the expected layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    /// Codecs accept `[time, dim]` or `[batch, time, dim]` only.
    #[error("only 3 dimensions supported: [batch, timesteps, action_dim], got {ndim}")]
    TooManyAxes { ndim: usize },
    /// A single vector has no time axis to transform.
    #[error("expected at least 2 dimensions [timesteps, action_dim], got {ndim}")]
    TooFewAxes { ndim: usize },
    /// Flat data length disagrees with the product of the declared shape.
    #[error("shape {shape:?} needs {expected} values, got {actual}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    /// Nested rows are not all the same width.
    #[error("row {row} has {actual} values, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },
    /// Per-dimension parameters do not match the data's action dimension.
    #[error("expected action_dim {expected}, got {found}")]
    ActionDim { expected: usize, found: usize },
    /// Chunks stacked into one batch must share a shape.
    #[error("cannot stack chunk of shape {found:?} into batch of shape {expected:?}")]
    Unstackable {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Errors that abort vocabulary fitting.
#[derive(Debug, Error)]
pub enum FitError {
    /// Nothing to learn from.
    #[error("cannot fit a vocabulary on an empty corpus")]
    EmptyCorpus,
    /// The quantized coefficient range needs more symbols than the vocabulary holds.
    #[error("vocab size {available} is too small for the range of tokens {required}")]
    VocabTooSmall { required: usize, available: usize },
    /// A scaled coefficient is non-finite or outside the integer range.
    #[error("chunk {chunk} has coefficient {value} after scaling, which is not a representable token")]
    UnrepresentableCoefficient { chunk: usize, value: f64 },
    /// Training corpus chunk had an invalid layout.
    #[error(transparent)]
    Shape(#[from] ShapeError),
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Per-sequence decode failures. Recovered locally by batch decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Token ID not found in vocabulary.
    #[error("unknown token id: {0}")]
    UnknownToken(TokenId),
    /// Expanded symbols cannot be reshaped to the requested chunk.
    #[error("decoded {actual} coefficients, expected {time_horizon} x {action_dim} = {expected}")]
    SymbolCount {
        actual: usize,
        expected: usize,
        time_horizon: usize,
        action_dim: usize,
    },
}

/// Errors reading or writing persisted codec state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed codec state: {0}")]
    Json(#[from] serde_json::Error),
    /// Written by a newer, incompatible release.
    #[error("unsupported codec state version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    /// A state file for one codec was loaded as another.
    #[error("expected {expected} codec state, found {found}")]
    WrongKind { expected: CodecKind, found: CodecKind },
    /// Merge table references ids that are not defined yet.
    #[error("invalid vocabulary: {0}")]
    InvalidVocabulary(String),
}

/// Errors parsing codec specifications or building codecs from them.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed codec spec {0:?}")]
    Syntax(String),
    #[error("unknown action tokenizer {name:?} (known: {known})")]
    UnknownCodec { name: String, known: String },
    #[error("{codec} does not accept argument {arg:?}")]
    UnknownArgument { codec: CodecKind, arg: String },
    #[error("{codec} requires argument {arg:?}")]
    MissingArgument { codec: CodecKind, arg: &'static str },
    #[error("argument {arg:?}: {reason}")]
    BadValue { arg: String, reason: String },
    /// A codec-string pattern failed to compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] fancy_regex::Error),
    #[error(transparent)]
    Codec(#[from] Box<CodecError>),
}

/// Umbrella error returned by codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Decoding needs a target shape and none was given, configured or cached.
    #[error(
        "tokenizer not initialized, tokenize once or pass in time_horizon and action_dim"
    )]
    MissingShape,
    /// The DCT codec has no vocabulary yet.
    #[error("DCT codec has no vocabulary; call fit() or load a pretrained one")]
    NotFitted,
    /// Hyperparameters that can never produce a working codec.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CodecError> for RegistryError {
    fn from(e: CodecError) -> Self {
        Self::Codec(Box::new(e))
    }
}
