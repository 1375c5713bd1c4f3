//! Byte-pair vocabulary over quantized coefficient symbols.
//!
//! A [`Vocabulary`] is an initial alphabet of `alphabet_size` single-symbol
//! tokens (ids `0..alphabet_size`) plus an ordered list of merges; merge `i`
//! produces id `alphabet_size + i`. Only the merge list is persisted, the
//! lookup tables are rebuilt on load.

mod converter;
mod trainer;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DecodeError, PersistError},
    types::{Symbol, Token, TokenId},
};

use converter::BPEConverter;
use trainer::{BPETrainer, TrainLimits};

/// Persisted form of a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyState {
    pub alphabet_size: usize,
    /// `[left, right]` pairs in the order they were learned.
    pub merges: Vec<[Token; 2]>,
}

/// Learned symbol vocabulary with its encoder/decoder tables.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    alphabet_size: usize,
    merges: Vec<[Token; 2]>,
    converter: BPEConverter,
}

impl Vocabulary {
    /// Learns merges over `sequences` until the total vocabulary reaches
    /// `vocab_size` or no pair occurs `min_frequency` times.
    ///
    /// Every symbol in `0..alphabet_size` is part of the vocabulary whether
    /// or not it appears in the corpus.
    pub(crate) fn train(
        sequences: &[Vec<Symbol>],
        alphabet_size: usize,
        vocab_size: usize,
        min_frequency: usize,
        progress: &ProgressBar,
    ) -> Self {
        let mut trainer = BPETrainer::new(sequences, alphabet_size);
        trainer.train(
            TrainLimits {
                vocab_size,
                min_frequency,
            },
            progress,
        );
        if log::log_enabled!(log::Level::Debug) {
            let before: usize = sequences.iter().map(Vec::len).sum();
            let after: usize = trainer.get_encodings().iter().map(Vec::len).sum();
            log::debug!("training corpus compressed from {before} to {after} tokens");
        }
        let merges = trainer
            .into_merge_history()
            .into_iter()
            .map(|((left, right), _)| [left, right])
            .collect();
        Self::build(alphabet_size, merges)
    }

    /// Rebuilds a vocabulary from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::InvalidVocabulary`] if a merge references an
    /// id that is not defined before it.
    pub fn from_state(state: VocabularyState) -> Result<Self, PersistError> {
        for (order, [left, right]) in state.merges.iter().enumerate() {
            let defined = state.alphabet_size + order;
            if *left >= defined || *right >= defined {
                return Err(PersistError::InvalidVocabulary(format!(
                    "merge {order} ({left}, {right}) references an id >= {defined}"
                )));
            }
        }
        Ok(Self::build(state.alphabet_size, state.merges))
    }

    pub fn to_state(&self) -> VocabularyState {
        VocabularyState {
            alphabet_size: self.alphabet_size,
            merges: self.merges.clone(),
        }
    }

    fn build(alphabet_size: usize, merges: Vec<[Token; 2]>) -> Self {
        let history = merges
            .iter()
            .enumerate()
            .map(|(order, &[left, right])| ((left, right), alphabet_size + order));
        let converter = BPEConverter::new(alphabet_size, history);
        Self {
            alphabet_size,
            merges,
            converter,
        }
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn num_merges(&self) -> usize {
        self.merges.len()
    }

    /// Total number of token ids: alphabet plus merges.
    pub fn len(&self) -> usize {
        self.converter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compresses a symbol sequence into token ids.
    pub(crate) fn encode(&self, symbols: Vec<Symbol>) -> Vec<TokenId> {
        self.converter
            .encode(symbols)
            .into_iter()
            .map(|t| t as TokenId)
            .collect()
    }

    /// Expands token ids back into symbols.
    pub(crate) fn decode(&self, tokens: &[TokenId]) -> Result<Vec<Symbol>, DecodeError> {
        self.converter.decode(tokens)
    }
}

impl PartialEq for Vocabulary {
    fn eq(&self, other: &Self) -> bool {
        self.alphabet_size == other.alphabet_size && self.merges == other.merges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Vec<Symbol>> {
        vec![
            vec![3, 3, 1, 0, 0, 0],
            vec![3, 3, 1, 0, 0, 0],
            vec![3, 3, 2, 0, 0, 0],
        ]
    }

    #[test]
    fn test_train_respects_vocab_size() {
        let vocab = Vocabulary::train(&corpus(), 4, 6, 2, &ProgressBar::hidden());
        assert_eq!(vocab.alphabet_size(), 4);
        assert_eq!(vocab.num_merges(), 2);
        assert_eq!(vocab.len(), 6);
    }

    #[test]
    fn test_unseen_alphabet_symbols_still_encodable() {
        // Symbols 4..8 never occur in the corpus.
        let vocab = Vocabulary::train(&corpus(), 8, 64, 2, &ProgressBar::hidden());
        let encoded = vocab.encode(vec![7, 5, 3, 3]);
        assert!(encoded.iter().all(|&t| (t as usize) < vocab.len()));
        assert_eq!(vocab.decode(&encoded).expect("known ids"), vec![7, 5, 3, 3]);
    }

    #[test]
    fn test_training_compresses_corpus() {
        let vocab = Vocabulary::train(&corpus(), 4, 64, 2, &ProgressBar::hidden());
        let encoded = vocab.encode(corpus()[0].clone());
        assert!(encoded.len() < corpus()[0].len());
    }

    #[test]
    fn test_state_round_trip() {
        let vocab = Vocabulary::train(&corpus(), 4, 64, 2, &ProgressBar::hidden());
        let restored = Vocabulary::from_state(vocab.to_state()).expect("valid state");
        assert_eq!(restored, vocab);
        assert_eq!(restored.encode(corpus()[2].clone()), vocab.encode(corpus()[2].clone()));
    }

    #[test]
    fn test_from_state_rejects_forward_references() {
        let state = VocabularyState {
            alphabet_size: 2,
            merges: vec![[0, 1], [2, 3]],
        };
        assert!(matches!(
            Vocabulary::from_state(state),
            Err(PersistError::InvalidVocabulary(_))
        ));
    }
}
