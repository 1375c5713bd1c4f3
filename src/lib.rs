//! Action tokenizers for robot trajectories.
//!
//! Two codecs turn `[time, action_dim]` action chunks into bounded-vocabulary
//! token sequences and back:
//!
//! - [`BinCodec`]: uniform quantization of every value into `vocab_size` bins.
//! - [`DctCodec`]: an orthonormal DCT along time, coefficient quantization and
//!   a byte-pair vocabulary learned over the quantized coefficients, using
//!   Algorithm 2 from "Byte Pair Encoding is Suboptimal for Language Model
//!   Pretraining" for training.
//!
//! Both implement [`ActionCodec`]. Codecs can be built from configuration
//! strings through [`registry::lookup`] and restored from disk with
//! [`persist::load_codec`].
//!
//! With the `python` feature the crate is also a PyO3 extension module.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(unused_must_use)]

pub mod array;
mod bpe;
pub mod codec;
pub mod dct;
pub mod error;
pub mod persist;
pub mod processor;
mod progress;
pub mod registry;
pub mod types;

pub mod bin_codec;
pub mod dct_codec;

#[cfg(feature = "python")]
mod python;

pub use array::{ActionArray, ActionChunk};
pub use bin_codec::{BinCodec, BinCodecConfig, Bounds};
pub use bpe::{Vocabulary, VocabularyState};
pub use codec::ActionCodec;
pub use dct_codec::{DctCodec, DctCodecConfig};
pub use error::{CodecError, DecodeError, FitError, PersistError, RegistryError, ShapeError};
pub use persist::{CodecState, load_codec};
pub use processor::{ProcessorConfig, ProcessorState, SpectralProcessor};
pub use registry::lookup;
pub use types::{CodecKind, DecodeShape, ShapeCache, TokenId, TokenSequence};
