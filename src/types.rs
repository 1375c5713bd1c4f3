//! Type aliases and shared types for action tokenization.
//!
//! These type aliases provide semantic clarity throughout the codebase.

use serde::{Deserialize, Serialize};

/// Represents a token identifier inside the BPE vocabulary.
///
/// Ids below the alphabet size are single quantized symbols; every learned
/// merge adds one id above them.
pub(crate) type Token = usize;

/// A token id as exchanged with a sequence model.
///
/// Signed because predictions handed back to `detokenize` may fall outside
/// the vocabulary (including negative values) and must be representable.
pub type TokenId = i64;

/// One token sequence per action chunk.
pub type TokenSequence = Vec<TokenId>;

/// A quantized, shifted DCT coefficient: one symbol of the initial alphabet.
pub(crate) type Symbol = usize;

/// Position of a token in the training arena.
///
/// Used to index into the doubly-linked list structure during training.
pub(crate) type TextIdx = usize;

/// Frequency count for token pairs during training.
pub(crate) type TokenFreq = usize;

/// Merge order indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (e.g., 0 = first merge, 1 = second merge).
pub(crate) type MergeOrder = usize;

/// A pair of adjacent tokens.
///
/// Used as a key for looking up merge rules during encoding and for
/// tracking pair frequencies during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TokenPair(pub(crate) Token, pub(crate) Token);

/// Identifies a concrete codec variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Uniform fixed-range quantization.
    Bin,
    /// DCT coefficients compressed with learned byte-pair merges.
    Dct,
}

impl CodecKind {
    /// Registry identifier for this variant.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bin => "bin",
            Self::Dct => "dct",
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Target shape for decoding. `None` fields fall back to configured values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeShape {
    pub time_horizon: Option<usize>,
    pub action_dim: Option<usize>,
}

impl DecodeShape {
    pub fn new(time_horizon: usize, action_dim: usize) -> Self {
        Self {
            time_horizon: Some(time_horizon),
            action_dim: Some(action_dim),
        }
    }

    /// Only the action dimension is fixed; the time horizon is left to the codec.
    pub fn with_action_dim(action_dim: usize) -> Self {
        Self {
            time_horizon: None,
            action_dim: Some(action_dim),
        }
    }
}

/// The `(time_horizon, action_dim)` observed on a tokenize call.
///
/// Owned by the caller and passed back explicitly when decoding without a
/// shape, so codecs carry no hidden per-call state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeCache {
    last: Option<(usize, usize)>,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, time_horizon: usize, action_dim: usize) {
        self.last = Some((time_horizon, action_dim));
    }

    /// Last recorded `(time_horizon, action_dim)`, if any.
    pub fn get(&self) -> Option<(usize, usize)> {
        self.last
    }
}
