//! The capability set shared by every action codec.

use std::{fmt::Debug, path::Path};

use crate::{
    array::{ActionArray, ActionChunk},
    error::CodecError,
    persist::{self, CodecState},
    types::{CodecKind, DecodeShape, TokenSequence},
};

/// Converts continuous action chunks to token sequences and back.
///
/// Callers that only need the interface hold a `Box<dyn ActionCodec>`, as
/// returned by [`crate::registry::lookup`] and [`crate::persist::load_codec`].
pub trait ActionCodec: Send + Sync + Debug {
    fn kind(&self) -> CodecKind;

    /// Upper bound (exclusive) on every token id this codec produces.
    fn vocab_size(&self) -> usize;

    /// Tokens per encoded chunk, when that is fixed by the configuration.
    fn num_tokens(&self) -> Option<usize>;

    /// Encodes a `[time, dim]` or `[batch, time, dim]` array, one sequence
    /// per chunk, in input order.
    fn tokenize(&self, actions: &ActionArray) -> Result<Vec<TokenSequence>, CodecError>;

    /// Decodes predicted sequences back into `[time, dim]` chunks.
    fn detokenize(
        &self,
        tokens: &[TokenSequence],
        shape: DecodeShape,
    ) -> Result<Vec<ActionChunk>, CodecError>;

    /// Full persisted state of the codec.
    fn state(&self) -> CodecState;

    /// Writes the codec state into `dir`, creating it if needed.
    fn save(&self, dir: &Path) -> Result<(), CodecError> {
        persist::write_state(dir, &self.state())?;
        Ok(())
    }

    /// Restores a codec of this concrete type from `dir`.
    fn load(dir: &Path) -> Result<Self, CodecError>
    where
        Self: Sized;
}
