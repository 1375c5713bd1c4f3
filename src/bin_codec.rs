//! Uniform quantization codec.
//!
//! Every action value is mapped linearly from `[min, max]` onto
//! `0..vocab_size`, one token per value. No training is involved.

use serde::{Deserialize, Serialize};

use crate::{
    array::{ActionArray, ActionChunk},
    codec::ActionCodec,
    error::{CodecError, PersistError, ShapeError},
    persist::{self, CodecState},
    types::{CodecKind, DecodeShape, TokenSequence},
};

/// A bound shared by all action dimensions, or one per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bounds {
    Scalar(f64),
    PerDim(Vec<f64>),
}

impl Bounds {
    /// The bound for action dimension `d`.
    fn at(&self, d: usize) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::PerDim(values) => values.get(d).copied().unwrap_or(f64::NAN),
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::PerDim(values) => Some(values.len()),
        }
    }
}

impl From<f64> for Bounds {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<f64>> for Bounds {
    fn from(values: Vec<f64>) -> Self {
        Self::PerDim(values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinCodecConfig {
    pub min_action_value: Bounds,
    pub max_action_value: Bounds,
    /// Number of bins; also the vocabulary size.
    #[serde(alias = "action_vocab_size")]
    pub vocab_size: usize,
    /// Maximum number of rows returned by `detokenize`.
    pub action_horizon: usize,
    pub action_dim: usize,
}

/// `[-1, 1]` bounds with the standard vocabulary and horizon.
impl Default for BinCodecConfig {
    fn default() -> Self {
        Self {
            min_action_value: Bounds::Scalar(-1.0),
            max_action_value: Bounds::Scalar(1.0),
            vocab_size: 1000,
            action_horizon: 10,
            action_dim: 2,
        }
    }
}

impl BinCodecConfig {
    fn validate(&self) -> Result<(), CodecError> {
        if self.vocab_size < 2 {
            return Err(CodecError::InvalidConfig(format!(
                "vocab_size must be at least 2, got {}",
                self.vocab_size
            )));
        }
        for bounds in [&self.min_action_value, &self.max_action_value] {
            if let Some(len) = bounds.len()
                && len != self.action_dim
            {
                return Err(ShapeError::ActionDim {
                    expected: self.action_dim,
                    found: len,
                }
                .into());
            }
        }
        let dims = self.action_dim.max(1);
        for d in 0..dims {
            let (lo, hi) = (self.min_action_value.at(d), self.max_action_value.at(d));
            if !(lo.is_finite() && hi.is_finite() && hi > lo) {
                return Err(CodecError::InvalidConfig(format!(
                    "dimension {d}: max_action_value {hi} must exceed min_action_value {lo}"
                )));
            }
        }
        Ok(())
    }
}

/// Fixed-range linear quantizer.
#[derive(Debug, Clone, PartialEq)]
pub struct BinCodec {
    config: BinCodecConfig,
}

impl BinCodec {
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfig`] for fewer than 2 bins or an empty
    /// range, and [`ShapeError::ActionDim`] when per-dimension bounds do not
    /// have `action_dim` entries.
    pub fn new(config: BinCodecConfig) -> Result<Self, CodecError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BinCodecConfig {
        &self.config
    }

    /// Per-dimension bounds only describe `config.action_dim` columns.
    fn check_action_dim(&self, found: usize) -> Result<(), ShapeError> {
        let per_dim = self.config.min_action_value.len().is_some()
            || self.config.max_action_value.len().is_some();
        if per_dim && found != self.config.action_dim {
            return Err(ShapeError::ActionDim {
                expected: self.config.action_dim,
                found,
            });
        }
        Ok(())
    }

    fn top(&self) -> f64 {
        (self.config.vocab_size - 1) as f64
    }

    fn encode_chunk(&self, chunk: &ActionChunk) -> TokenSequence {
        let top = self.top();
        chunk
            .rows()
            .flat_map(|row| {
                row.iter().enumerate().map(move |(d, &v)| {
                    let lo = self.config.min_action_value.at(d);
                    let hi = self.config.max_action_value.at(d);
                    let normalized = (v - lo) / (hi - lo);
                    // `as` saturates, NaN becomes 0.
                    ((normalized * top).round_ties_even().clamp(0.0, top)) as i64
                })
            })
            .collect()
    }

    fn decode_sequence(&self, tokens: &[i64], action_dim: usize, max_rows: usize) -> ActionChunk {
        if action_dim == 0 {
            return ActionChunk::zeros(0, 0);
        }
        let rows = (tokens.len() / action_dim).min(max_rows);
        let vocab = self.config.vocab_size as i64;
        let top = self.top();
        let data: Vec<f64> = tokens[..rows * action_dim]
            .iter()
            .enumerate()
            .map(|(i, &tok)| {
                if !(0..vocab).contains(&tok) {
                    return f64::NAN;
                }
                let d = i % action_dim;
                let lo = self.config.min_action_value.at(d);
                let hi = self.config.max_action_value.at(d);
                tok as f64 / top * (hi - lo) + lo
            })
            .collect();
        ActionChunk::new(rows, action_dim, data).unwrap_or_else(|_| ActionChunk::zeros(rows, action_dim))
    }
}

impl ActionCodec for BinCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Bin
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn num_tokens(&self) -> Option<usize> {
        Some(self.config.action_horizon * self.config.action_dim)
    }

    fn tokenize(&self, actions: &ActionArray) -> Result<Vec<TokenSequence>, CodecError> {
        let chunks = actions.chunks()?;
        if let Some(chunk) = chunks.first() {
            self.check_action_dim(chunk.action_dim())?;
        }
        Ok(chunks.iter().map(|chunk| self.encode_chunk(chunk)).collect())
    }

    /// Ids outside `[0, vocab_size)` decode to NaN. Each sequence yields at
    /// most `action_horizon` complete rows; a trailing partial row is dropped.
    fn detokenize(
        &self,
        tokens: &[TokenSequence],
        shape: DecodeShape,
    ) -> Result<Vec<ActionChunk>, CodecError> {
        let action_dim = shape.action_dim.unwrap_or(self.config.action_dim);
        let max_rows = shape.time_horizon.unwrap_or(self.config.action_horizon);
        self.check_action_dim(action_dim)?;
        Ok(tokens
            .iter()
            .map(|seq| self.decode_sequence(seq, action_dim, max_rows))
            .collect())
    }

    fn state(&self) -> CodecState {
        CodecState::Bin(self.config.clone())
    }

    fn load(dir: &std::path::Path) -> Result<Self, CodecError> {
        match persist::read_state(dir)? {
            CodecState::Bin(config) => Self::new(config),
            other => Err(PersistError::WrongKind {
                expected: CodecKind::Bin,
                found: other.kind(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(vocab_size: usize, action_horizon: usize) -> BinCodec {
        BinCodec::new(BinCodecConfig {
            min_action_value: Bounds::Scalar(-1.0),
            max_action_value: Bounds::Scalar(1.0),
            vocab_size,
            action_horizon,
            action_dim: 2,
        })
        .expect("valid config")
    }

    fn chunk(rows: &[[f64; 2]]) -> ActionChunk {
        let rows: Vec<Vec<f64>> = rows.iter().map(|r| r.to_vec()).collect();
        ActionChunk::from_rows(&rows).expect("rectangular")
    }

    #[test]
    fn test_zeros_map_to_middle_bin() {
        let codec = codec(128, 8);
        let tokens = codec
            .tokenize(&ActionArray::from(ActionChunk::zeros(8, 2)))
            .expect("tokenizes");
        // 0.5 * 127 = 63.5 rounds half to even.
        assert_eq!(tokens, vec![vec![64; 16]]);

        let decoded = codec.detokenize(&tokens, DecodeShape::default()).expect("decodes");
        assert_eq!(decoded[0].shape(), (8, 2));
        let bound = 2.0 / 127.0;
        assert!(decoded[0].max_abs_diff(&ActionChunk::zeros(8, 2)) <= bound);
    }

    #[test]
    fn test_round_trip_within_bin_width() {
        let codec = codec(256, 4);
        let original = chunk(&[[-1.0, 1.0], [-0.3, 0.7], [0.123, -0.456], [0.99, -0.99]]);
        let tokens = codec
            .tokenize(&ActionArray::from(original.clone()))
            .expect("tokenizes");
        assert!(tokens[0].iter().all(|&t| (0..256).contains(&t)));
        let decoded = codec.detokenize(&tokens, DecodeShape::default()).expect("decodes");
        assert!(decoded[0].max_abs_diff(&original) <= 2.0 / 255.0);
    }

    #[test]
    fn test_values_outside_range_clip() {
        let codec = codec(11, 1);
        let tokens = codec
            .tokenize(&ActionArray::from(chunk(&[[-5.0, 5.0]])))
            .expect("tokenizes");
        assert_eq!(tokens, vec![vec![0, 10]]);
    }

    #[test]
    fn test_out_of_range_ids_become_nan() {
        let codec = codec(128, 8);
        let decoded = codec
            .detokenize(&[vec![128, -1, 0, 127]], DecodeShape::default())
            .expect("decodes");
        let rows = decoded[0].to_rows();
        assert!(rows[0][0].is_nan());
        assert!(rows[0][1].is_nan());
        assert_eq!(rows[1], vec![-1.0, 1.0]);
    }

    #[test]
    fn test_trailing_partial_row_dropped() {
        let codec = codec(128, 8);
        let decoded = codec
            .detokenize(&[vec![64, 64, 64, 64, 64]], DecodeShape::default())
            .expect("decodes");
        assert_eq!(decoded[0].shape(), (2, 2));
    }

    #[test]
    fn test_rows_capped_at_horizon() {
        let codec = codec(128, 2);
        let decoded = codec
            .detokenize(&[vec![64; 10]], DecodeShape::default())
            .expect("decodes");
        assert_eq!(decoded[0].shape(), (2, 2));

        let explicit = codec
            .detokenize(&[vec![64; 10]], DecodeShape::new(5, 2))
            .expect("decodes");
        assert_eq!(explicit[0].shape(), (5, 2));
    }

    #[test]
    fn test_explicit_action_dim() {
        let codec = codec(128, 8);
        let decoded = codec
            .detokenize(&[vec![64; 6]], DecodeShape::with_action_dim(3))
            .expect("decodes");
        assert_eq!(decoded[0].shape(), (2, 3));
    }

    #[test]
    fn test_per_dimension_bounds() {
        let codec = BinCodec::new(BinCodecConfig {
            min_action_value: Bounds::PerDim(vec![0.0, -10.0]),
            max_action_value: Bounds::PerDim(vec![1.0, 10.0]),
            vocab_size: 3,
            action_horizon: 1,
            action_dim: 2,
        })
        .expect("valid config");
        let tokens = codec
            .tokenize(&ActionArray::from(chunk(&[[1.0, -10.0]])))
            .expect("tokenizes");
        assert_eq!(tokens, vec![vec![2, 0]]);
        let decoded = codec.detokenize(&tokens, DecodeShape::default()).expect("decodes");
        assert_eq!(decoded[0].to_rows(), vec![vec![1.0, -10.0]]);
    }

    #[test]
    fn test_per_dimension_bounds_check_data_width() {
        let codec = BinCodec::new(BinCodecConfig {
            min_action_value: Bounds::PerDim(vec![0.0, 0.0]),
            max_action_value: Bounds::Scalar(1.0),
            ..BinCodecConfig::default()
        })
        .expect("valid config");
        let wide = ActionChunk::zeros(2, 3);
        assert!(matches!(
            codec.tokenize(&ActionArray::from(wide)),
            Err(CodecError::Shape(ShapeError::ActionDim {
                expected: 2,
                found: 3
            }))
        ));
    }

    #[test]
    fn test_per_dimension_bounds_check_decode_width() {
        let codec = BinCodec::new(BinCodecConfig {
            min_action_value: Bounds::PerDim(vec![-1.0, -1.0]),
            max_action_value: Bounds::PerDim(vec![1.0, 1.0]),
            vocab_size: 128,
            ..BinCodecConfig::default()
        })
        .expect("valid config");
        assert!(matches!(
            codec.detokenize(&[vec![64; 6]], DecodeShape::with_action_dim(3)),
            Err(CodecError::Shape(ShapeError::ActionDim {
                expected: 2,
                found: 3
            }))
        ));
        let decoded = codec
            .detokenize(&[vec![64; 6]], DecodeShape::with_action_dim(2))
            .expect("matching width decodes");
        assert_eq!(decoded[0].shape(), (3, 2));
        assert!(decoded[0].as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_two_bins_round_trip() {
        let codec = codec(2, 3);
        let original = chunk(&[[-1.0, 1.0], [-0.6, 0.4], [0.2, -0.9]]);
        let tokens = codec
            .tokenize(&ActionArray::from(original.clone()))
            .expect("tokenizes");
        assert_eq!(tokens, vec![vec![0, 1, 0, 1, 1, 0]]);
        let decoded = codec.detokenize(&tokens, DecodeShape::default()).expect("decodes");
        assert_eq!(decoded[0].to_rows(), vec![vec![-1.0, 1.0], vec![-1.0, 1.0], vec![1.0, -1.0]]);
        // Half of the single bin width (max - min) / (vocab_size - 1).
        assert!(decoded[0].max_abs_diff(&original) <= 1.0);
    }

    #[test]
    fn test_batch_matches_single_chunks() {
        let codec = codec(64, 2);
        let a = chunk(&[[0.1, 0.2], [0.3, 0.4]]);
        let b = chunk(&[[-0.1, -0.2], [-0.3, -0.4]]);
        let batch = codec
            .tokenize(&ActionArray::stack(&[a.clone(), b.clone()]).expect("same shape"))
            .expect("tokenizes");
        let single_a = codec.tokenize(&ActionArray::from(a)).expect("tokenizes");
        let single_b = codec.tokenize(&ActionArray::from(b)).expect("tokenizes");
        assert_eq!(batch, vec![single_a[0].clone(), single_b[0].clone()]);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let tiny = BinCodecConfig {
            vocab_size: 1,
            ..BinCodecConfig::default()
        };
        assert!(matches!(BinCodec::new(tiny), Err(CodecError::InvalidConfig(_))));

        let inverted = BinCodecConfig {
            min_action_value: Bounds::Scalar(1.0),
            max_action_value: Bounds::Scalar(-1.0),
            ..BinCodecConfig::default()
        };
        assert!(matches!(BinCodec::new(inverted), Err(CodecError::InvalidConfig(_))));

        let short = BinCodecConfig {
            min_action_value: Bounds::PerDim(vec![0.0]),
            ..BinCodecConfig::default()
        };
        assert!(matches!(
            BinCodec::new(short),
            Err(CodecError::Shape(ShapeError::ActionDim { .. }))
        ));
    }

    #[test]
    fn test_num_tokens_and_vocab() {
        let codec = codec(128, 8);
        assert_eq!(codec.num_tokens(), Some(16));
        assert_eq!(codec.vocab_size(), 128);
        assert_eq!(codec.kind(), CodecKind::Bin);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = codec(128, 8);
        codec.save(dir.path()).expect("saves");
        assert_eq!(BinCodec::load(dir.path()).expect("loads"), codec);
    }

    #[test]
    fn test_accepts_original_field_name() {
        let config: BinCodecConfig = serde_json::from_str(
            r#"{"min_action_value": -1, "max_action_value": [1, 2],
                "action_vocab_size": 128, "action_horizon": 8, "action_dim": 2}"#,
        )
        .expect("parses");
        assert_eq!(config.vocab_size, 128);
        assert_eq!(config.max_action_value, Bounds::PerDim(vec![1.0, 2.0]));
    }
}
