//! Frequency-domain compression codec.
//!
//! A thin facade over [`SpectralProcessor`]: it loads a pretrained vocabulary
//! or waits for [`DctCodec::fit`], persists after fitting when a save path is
//! configured, and otherwise forwards every call to the processor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    array::{ActionArray, ActionChunk},
    codec::ActionCodec,
    error::{CodecError, PersistError},
    persist::{self, CodecState},
    processor::{ProcessorConfig, ProcessorState, SpectralProcessor},
    types::{CodecKind, DecodeShape, ShapeCache, TokenSequence},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DctCodecConfig {
    pub scale: f64,
    pub vocab_size: usize,
    pub min_token: i64,
    pub action_dim: Option<usize>,
    pub time_horizon: Option<usize>,
    /// Directory the fitted state is written to after `fit`.
    pub save_path: Option<PathBuf>,
    /// Directory holding a previously saved DCT codec to start from.
    pub pretrained_path: Option<PathBuf>,
    /// Whether the caller intends to fit this codec on its training data.
    pub do_fit: bool,
    pub show_progress: bool,
}

impl Default for DctCodecConfig {
    fn default() -> Self {
        let processor = ProcessorConfig::default();
        Self {
            scale: processor.scale,
            vocab_size: processor.vocab_size,
            min_token: processor.min_token,
            action_dim: None,
            time_horizon: None,
            save_path: None,
            pretrained_path: None,
            do_fit: false,
            show_progress: true,
        }
    }
}

impl DctCodecConfig {
    fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            scale: self.scale,
            vocab_size: self.vocab_size,
            min_token: self.min_token,
            time_horizon: self.time_horizon,
            action_dim: self.action_dim,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DctCodec {
    processor: SpectralProcessor,
    save_path: Option<PathBuf>,
    do_fit: bool,
    show_progress: bool,
}

impl DctCodec {
    /// Builds the codec, loading `pretrained_path` when it is set.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the pretrained state cannot be read and
    /// [`CodecError::InvalidConfig`] for invalid numeric parameters.
    pub fn new(config: DctCodecConfig) -> Result<Self, CodecError> {
        let processor = match &config.pretrained_path {
            Some(path) => {
                log::info!("loading pretrained action tokenizer from {}", path.display());
                let ProcessorState {
                    config: mut saved,
                    vocabulary,
                } = Self::load(path)?.processor.to_state();
                // Shapes configured here take precedence over the saved ones.
                saved.time_horizon = config.time_horizon.or(saved.time_horizon);
                saved.action_dim = config.action_dim.or(saved.action_dim);
                SpectralProcessor::from_state(ProcessorState {
                    config: saved,
                    vocabulary,
                })?
            }
            None => {
                log::info!("initializing new action processor");
                SpectralProcessor::new(config.processor_config())?
            }
        };
        Ok(Self {
            processor,
            save_path: config.save_path,
            do_fit: config.do_fit,
            show_progress: config.show_progress,
        })
    }

    pub fn from_state(state: ProcessorState) -> Result<Self, CodecError> {
        Ok(Self::from_processor(SpectralProcessor::from_state(state)?))
    }

    pub fn from_processor(processor: SpectralProcessor) -> Self {
        Self {
            processor,
            save_path: None,
            do_fit: false,
            show_progress: false,
        }
    }

    /// Learns a fresh vocabulary from `corpus` and persists it to the
    /// configured save path, if any.
    ///
    /// # Errors
    ///
    /// Propagates fitting and save errors; on error the previous processor
    /// is kept.
    pub fn fit(&mut self, corpus: &[ActionChunk]) -> Result<(), CodecError> {
        let config = self.processor.config().clone();
        let processor = SpectralProcessor::fit(corpus, config, self.show_progress)?;
        if let Some(path) = &self.save_path {
            persist::write_state(path, &CodecState::Dct(processor.to_state()))?;
        }
        self.processor = processor;
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.processor.is_fitted()
    }

    /// True when fitting was requested and no vocabulary exists yet.
    pub fn needs_fit(&self) -> bool {
        self.do_fit && !self.is_fitted()
    }

    pub fn processor(&self) -> &SpectralProcessor {
        &self.processor
    }

    pub fn set_show_progress(&mut self, show: bool) {
        self.show_progress = show;
    }

    /// [`ActionCodec::tokenize`], recording the call shape into `cache`.
    pub fn tokenize_cached(
        &self,
        actions: &ActionArray,
        cache: &mut ShapeCache,
    ) -> Result<Vec<TokenSequence>, CodecError> {
        self.processor.encode_cached(actions, cache)
    }

    /// [`ActionCodec::detokenize`] falling back to the shape in `cache`.
    pub fn detokenize_cached(
        &self,
        tokens: &[TokenSequence],
        shape: DecodeShape,
        cache: &ShapeCache,
    ) -> Result<Vec<ActionChunk>, CodecError> {
        self.processor.decode_cached(tokens, shape, cache)
    }
}

impl ActionCodec for DctCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Dct
    }

    fn vocab_size(&self) -> usize {
        self.processor.config().vocab_size
    }

    fn num_tokens(&self) -> Option<usize> {
        let config = self.processor.config();
        Some(config.time_horizon? * config.action_dim?)
    }

    fn tokenize(&self, actions: &ActionArray) -> Result<Vec<TokenSequence>, CodecError> {
        self.processor.encode(actions)
    }

    fn detokenize(
        &self,
        tokens: &[TokenSequence],
        shape: DecodeShape,
    ) -> Result<Vec<ActionChunk>, CodecError> {
        self.processor.decode(tokens, shape)
    }

    fn state(&self) -> CodecState {
        CodecState::Dct(self.processor.to_state())
    }

    fn load(dir: &Path) -> Result<Self, CodecError> {
        match persist::read_state(dir)? {
            CodecState::Dct(state) => Self::from_state(state),
            other => Err(PersistError::WrongKind {
                expected: CodecKind::Dct,
                found: other.kind(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bin_codec::{BinCodec, BinCodecConfig};

    fn corpus() -> Vec<ActionChunk> {
        (0..40)
            .map(|i| {
                let v = (i % 7) as f64 * 0.05;
                let rows: Vec<Vec<f64>> = (0..6).map(|t| vec![v * t as f64, -v]).collect();
                ActionChunk::from_rows(&rows).expect("rectangular")
            })
            .collect()
    }

    fn quiet_config() -> DctCodecConfig {
        DctCodecConfig {
            vocab_size: 512,
            show_progress: false,
            ..DctCodecConfig::default()
        }
    }

    #[test]
    fn test_unfitted_codec_refuses_work() {
        let codec = DctCodec::new(quiet_config()).expect("valid config");
        assert!(!codec.is_fitted());
        let array = ActionArray::from(ActionChunk::zeros(6, 2));
        assert!(matches!(codec.tokenize(&array), Err(CodecError::NotFitted)));
        assert!(matches!(
            codec.detokenize(&[vec![0]], DecodeShape::new(6, 2)),
            Err(CodecError::NotFitted)
        ));
    }

    #[test]
    fn test_needs_fit_follows_flag() {
        let mut codec = DctCodec::new(DctCodecConfig {
            do_fit: true,
            ..quiet_config()
        })
        .expect("valid config");
        assert!(codec.needs_fit());
        codec.fit(&corpus()).expect("fits");
        assert!(!codec.needs_fit());
    }

    #[test]
    fn test_fit_writes_save_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut codec = DctCodec::new(DctCodecConfig {
            save_path: Some(dir.path().join("fast")),
            ..quiet_config()
        })
        .expect("valid config");
        codec.fit(&corpus()).expect("fits");
        assert!(persist::state_path(&dir.path().join("fast")).is_file());
    }

    #[test]
    fn test_failed_save_keeps_previous_processor() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A regular file where the save directory should go.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "").expect("writes");
        let mut codec = DctCodec::new(DctCodecConfig {
            save_path: Some(blocked),
            ..quiet_config()
        })
        .expect("valid config");

        assert!(matches!(
            codec.fit(&corpus()),
            Err(CodecError::Persist(PersistError::Io { .. }))
        ));
        assert!(!codec.is_fitted());
    }

    #[test]
    fn test_pretrained_path_loads_vocabulary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut trained = DctCodec::new(quiet_config()).expect("valid config");
        trained.fit(&corpus()).expect("fits");
        trained.save(dir.path()).expect("saves");

        let loaded = DctCodec::new(DctCodecConfig {
            pretrained_path: Some(dir.path().to_path_buf()),
            time_horizon: Some(6),
            action_dim: Some(2),
            ..quiet_config()
        })
        .expect("loads");
        assert!(loaded.is_fitted());
        assert_eq!(loaded.num_tokens(), Some(12));

        let array = ActionArray::stack(&corpus()[..5]).expect("same shape");
        assert_eq!(
            loaded.tokenize(&array).expect("tokenizes"),
            trained.tokenize(&array).expect("tokenizes")
        );
    }

    #[test]
    fn test_cached_shape_round_trip() {
        let mut codec = DctCodec::new(quiet_config()).expect("valid config");
        codec.fit(&corpus()).expect("fits");
        let mut cache = ShapeCache::new();
        let array = ActionArray::stack(&corpus()[..3]).expect("same shape");
        let tokens = codec.tokenize_cached(&array, &mut cache).expect("tokenizes");
        let decoded = codec
            .detokenize_cached(&tokens, DecodeShape::default(), &cache)
            .expect("decodes");
        assert_eq!(decoded.len(), 3);
        assert!(decoded[2].max_abs_diff(&corpus()[2]) < 0.2);
    }

    #[test]
    fn test_load_rejects_bin_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        BinCodec::new(BinCodecConfig::default())
            .expect("valid config")
            .save(dir.path())
            .expect("saves");
        assert!(matches!(
            DctCodec::load(dir.path()),
            Err(CodecError::Persist(PersistError::WrongKind {
                expected: CodecKind::Dct,
                found: CodecKind::Bin
            }))
        ));
    }

    #[test]
    fn test_num_tokens_unknown_without_shape() {
        let codec = DctCodec::new(quiet_config()).expect("valid config");
        assert_eq!(codec.num_tokens(), None);
        assert_eq!(codec.vocab_size(), 512);
    }
}
