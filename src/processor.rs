//! Spectral processor: DCT, coefficient quantization and BPE compression.
//!
//! Encoding pipeline, per action chunk:
//! 1. Orthonormal DCT along the time axis, independently per action dimension.
//! 2. Quantize: `round(coeff * scale)`, shifted by `-min_token` into the alphabet.
//! 3. Flatten time-major and compress the symbol stream with learned BPE merges.
//!
//! Decoding runs the pipeline backwards. A sequence that cannot be decoded is
//! logged and replaced by a zero chunk of the requested shape so a single bad
//! prediction never fails a whole batch.

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    array::{ActionArray, ActionChunk},
    bpe::{Vocabulary, VocabularyState},
    dct::{dct_time_axis, idct_time_axis},
    error::{CodecError, DecodeError, FitError},
    progress::progress_bar,
    types::{DecodeShape, ShapeCache, Symbol, TokenId, TokenSequence},
};

/// Pairs must occur at least this often to be merged.
const MIN_MERGE_FREQUENCY: usize = 2;

/// Warn when fewer than this many vocabulary slots remain for merges.
const MERGE_HEADROOM_WARNING: usize = 100;

/// Numeric parameters of the spectral pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Multiplier applied to DCT coefficients before rounding.
    pub scale: f64,
    /// Total vocabulary size, alphabet plus merges.
    pub vocab_size: usize,
    /// Smallest quantized coefficient; symbol 0 stands for this value.
    pub min_token: i64,
    /// Decode shape used when none is passed explicitly.
    pub time_horizon: Option<usize>,
    pub action_dim: Option<usize>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            scale: 10.0,
            vocab_size: 4096,
            min_token: 0,
            time_horizon: None,
            action_dim: None,
        }
    }
}

impl ProcessorConfig {
    fn validate(&self) -> Result<(), CodecError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(CodecError::InvalidConfig(format!(
                "scale must be positive and finite, got {}",
                self.scale
            )));
        }
        if self.vocab_size == 0 {
            return Err(CodecError::InvalidConfig("vocab_size must be positive".into()));
        }
        Ok(())
    }
}

/// Persisted form of a [`SpectralProcessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorState {
    #[serde(flatten)]
    pub config: ProcessorConfig,
    /// `None` until the processor has been fitted.
    pub vocabulary: Option<VocabularyState>,
}

/// DCT + BPE action processor.
#[derive(Debug, Clone)]
pub struct SpectralProcessor {
    config: ProcessorConfig,
    vocabulary: Option<Vocabulary>,
}

impl SpectralProcessor {
    /// An unfitted processor; [`SpectralProcessor::fit`] must run before encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfig`] for a non-positive scale or vocabulary.
    pub fn new(config: ProcessorConfig) -> Result<Self, CodecError> {
        config.validate()?;
        Ok(Self {
            config,
            vocabulary: None,
        })
    }

    /// Learns a vocabulary over `corpus`.
    ///
    /// `min_token` is derived from the corpus; the other fields of `config`
    /// are kept. Chunks may differ in length since each is transformed on its
    /// own.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::EmptyCorpus`] if the corpus has no values,
    /// [`FitError::UnrepresentableCoefficient`] for non-finite or huge
    /// coefficients and [`FitError::VocabTooSmall`] if the quantized
    /// coefficient range needs more symbols than `config.vocab_size`.
    pub fn fit(
        corpus: &[ActionChunk],
        config: ProcessorConfig,
        show_progress: bool,
    ) -> Result<Self, CodecError> {
        config.validate()?;
        let scale = config.scale;

        let pb = progress_bar(corpus.len() as u64, "Transforming chunks", show_progress)
            .map_err(FitError::from)?;
        let quantized: Vec<Vec<i64>> = corpus
            .par_iter()
            .enumerate()
            .progress_with(pb)
            .map(|(i, chunk)| quantize_exact(&dct_time_axis(chunk), scale, i))
            .collect::<Result<_, _>>()?;

        let (Some(min_token), Some(max_token)) = (
            quantized.iter().flatten().copied().min(),
            quantized.iter().flatten().copied().max(),
        ) else {
            return Err(FitError::EmptyCorpus.into());
        };

        let alphabet_size =
            usize::try_from(i128::from(max_token) - i128::from(min_token) + 1).unwrap_or(usize::MAX);
        if alphabet_size > config.vocab_size {
            return Err(FitError::VocabTooSmall {
                required: alphabet_size,
                available: config.vocab_size,
            }
            .into());
        }
        if alphabet_size + MERGE_HEADROOM_WARNING > config.vocab_size {
            log::warn!(
                "initial alphabet size {alphabet_size} is almost as large as the vocab size {}, \
                 consider increasing vocab size",
                config.vocab_size
            );
        }

        let sequences: Vec<Vec<Symbol>> = quantized
            .iter()
            .map(|q| q.iter().map(|&v| v.abs_diff(min_token) as Symbol).collect())
            .collect();

        log::info!(
            "training action vocabulary: {} chunks, alphabet {alphabet_size}, min_token {min_token}, vocab size {}",
            sequences.len(),
            config.vocab_size
        );
        let merge_budget = config.vocab_size - alphabet_size;
        let pb = progress_bar(merge_budget as u64, "Learning merges", show_progress)
            .map_err(FitError::from)?;
        let vocabulary = Vocabulary::train(
            &sequences,
            alphabet_size,
            config.vocab_size,
            MIN_MERGE_FREQUENCY,
            &pb,
        );
        pb.finish_and_clear();
        log::info!(
            "done training action vocabulary: {} merges, {} tokens",
            vocabulary.num_merges(),
            vocabulary.len()
        );

        Ok(Self {
            config: ProcessorConfig { min_token, ..config },
            vocabulary: Some(vocabulary),
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    fn fitted_vocabulary(&self) -> Result<&Vocabulary, CodecError> {
        self.vocabulary.as_ref().ok_or(CodecError::NotFitted)
    }

    /// Encodes `[time, dim]` or `[batch, time, dim]` actions, one token
    /// sequence per chunk.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`](crate::error::ShapeError) for arrays with more
    /// than 3 or fewer than 2 axes and [`CodecError::NotFitted`] before `fit`.
    pub fn encode(&self, actions: &ActionArray) -> Result<Vec<TokenSequence>, CodecError> {
        let chunks = actions.chunks()?;
        let vocabulary = self.fitted_vocabulary()?;
        let top_symbol = vocabulary.alphabet_size().saturating_sub(1);

        Ok(chunks
            .par_iter()
            .map(|chunk| {
                let coeffs = quantize(&dct_time_axis(chunk), self.config.scale);
                let mut saturated = 0usize;
                let symbols: Vec<Symbol> = coeffs
                    .iter()
                    .map(|&q| {
                        // i128 keeps saturated coefficients from wrapping.
                        let shifted = i128::from(q) - i128::from(self.config.min_token);
                        match usize::try_from(shifted.max(0)) {
                            Ok(symbol) if symbol <= top_symbol => symbol,
                            _ => {
                                saturated += 1;
                                top_symbol
                            }
                        }
                    })
                    .collect();
                if saturated > 0 {
                    log::warn!(
                        "{saturated} coefficients exceed the fitted range and were clipped to symbol {top_symbol}"
                    );
                }
                vocabulary.encode(symbols)
            })
            .collect())
    }

    /// Like [`encode`](Self::encode), and records the call's
    /// `(time_horizon, action_dim)` into `cache` for later shape-free decoding.
    pub fn encode_cached(
        &self,
        actions: &ActionArray,
        cache: &mut ShapeCache,
    ) -> Result<Vec<TokenSequence>, CodecError> {
        let tokens = self.encode(actions)?;
        if let [.., time_horizon, action_dim] = *actions.shape() {
            cache.record(time_horizon, action_dim);
        }
        Ok(tokens)
    }

    /// Decodes token sequences into `[time, dim]` chunks.
    ///
    /// The shape resolves per field as explicit argument, then configured
    /// value. Sequences that fail to decode become zero chunks.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingShape`] if the shape cannot be resolved and
    /// [`CodecError::NotFitted`] before `fit`.
    pub fn decode(
        &self,
        tokens: &[TokenSequence],
        shape: DecodeShape,
    ) -> Result<Vec<ActionChunk>, CodecError> {
        self.decode_resolved(tokens, self.resolve_shape(shape, None)?)
    }

    /// Like [`decode`](Self::decode) with the last shape recorded in `cache`
    /// as the final fallback.
    pub fn decode_cached(
        &self,
        tokens: &[TokenSequence],
        shape: DecodeShape,
        cache: &ShapeCache,
    ) -> Result<Vec<ActionChunk>, CodecError> {
        self.decode_resolved(tokens, self.resolve_shape(shape, Some(cache))?)
    }

    /// Decodes one sequence, surfacing the failure instead of a placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] for unknown ids or a symbol count that
    /// does not fill the resolved shape.
    pub fn decode_sequence(
        &self,
        tokens: &[TokenId],
        shape: DecodeShape,
    ) -> Result<ActionChunk, CodecError> {
        let (time_horizon, action_dim) = self.resolve_shape(shape, None)?;
        let vocabulary = self.fitted_vocabulary()?;
        self.decode_one(vocabulary, tokens, time_horizon, action_dim)
    }

    /// Resolves `(time_horizon, action_dim)`: explicit > configured > cached.
    pub fn resolve_shape(
        &self,
        shape: DecodeShape,
        cache: Option<&ShapeCache>,
    ) -> Result<(usize, usize), CodecError> {
        let cached = cache.and_then(ShapeCache::get);
        let time_horizon = shape
            .time_horizon
            .or(self.config.time_horizon)
            .or(cached.map(|(t, _)| t));
        let action_dim = shape
            .action_dim
            .or(self.config.action_dim)
            .or(cached.map(|(_, d)| d));
        match (time_horizon, action_dim) {
            (Some(t), Some(d)) => Ok((t, d)),
            _ => Err(CodecError::MissingShape),
        }
    }

    fn decode_resolved(
        &self,
        tokens: &[TokenSequence],
        (time_horizon, action_dim): (usize, usize),
    ) -> Result<Vec<ActionChunk>, CodecError> {
        let vocabulary = self.fitted_vocabulary()?;
        Ok(tokens
            .par_iter()
            .enumerate()
            .map(|(i, seq)| {
                self.decode_one(vocabulary, seq, time_horizon, action_dim)
                    .unwrap_or_else(|e| {
                        log::error!("error decoding tokens of sequence {i}: {e}; tokens: {seq:?}");
                        ActionChunk::zeros(time_horizon, action_dim)
                    })
            })
            .collect())
    }

    fn decode_one(
        &self,
        vocabulary: &Vocabulary,
        tokens: &[TokenId],
        time_horizon: usize,
        action_dim: usize,
    ) -> Result<ActionChunk, CodecError> {
        let symbols = vocabulary.decode(tokens)?;
        let expected = time_horizon * action_dim;
        if symbols.len() != expected {
            return Err(DecodeError::SymbolCount {
                actual: symbols.len(),
                expected,
                time_horizon,
                action_dim,
            }
            .into());
        }

        let coeffs: Vec<f64> = symbols
            .iter()
            .map(|&s| (s as i64 + self.config.min_token) as f64 / self.config.scale)
            .collect();
        let values = idct_time_axis(&coeffs, time_horizon, action_dim);
        Ok(ActionChunk::new(time_horizon, action_dim, values)?)
    }

    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfig`] or a persistence error for
    /// invalid scale/vocabulary fields.
    pub fn from_state(state: ProcessorState) -> Result<Self, CodecError> {
        state.config.validate()?;
        let vocabulary = state.vocabulary.map(Vocabulary::from_state).transpose()?;
        Ok(Self {
            config: state.config,
            vocabulary,
        })
    }

    pub fn to_state(&self) -> ProcessorState {
        ProcessorState {
            config: self.config.clone(),
            vocabulary: self.vocabulary.as_ref().map(Vocabulary::to_state),
        }
    }
}

/// `round(coeff * scale)` with numpy's round-half-to-even.
///
/// Saturates at the `i64` bounds; NaN becomes 0.
fn quantize(coeffs: &[f64], scale: f64) -> Vec<i64> {
    coeffs
        .iter()
        .map(|c| (c * scale).round_ties_even() as i64)
        .collect()
}

/// Like [`quantize`], but rejects coefficients that do not fit an `i64`.
fn quantize_exact(coeffs: &[f64], scale: f64, chunk: usize) -> Result<Vec<i64>, FitError> {
    coeffs
        .iter()
        .map(|c| {
            let q = (c * scale).round_ties_even();
            // i64::MAX as f64 rounds up to 2^63, which is already out of range.
            if q.is_finite() && q >= i64::MIN as f64 && q < i64::MAX as f64 {
                Ok(q as i64)
            } else {
                Err(FitError::UnrepresentableCoefficient { chunk, value: q })
            }
        })
        .collect()
}
