//! BPE Converter - applies learned merge rules to symbol sequences.
//!
//! Merges are applied with a priority queue in the order they were learned
//! during training, which makes encoding deterministic and O(N log N).

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use crate::{
    error::DecodeError,
    types::{MergeOrder, Symbol, Token, TokenId, TokenPair},
};

/// Item in the priority queue for merge ordering.
///
/// Candidates are ordered by merge_order (earliest first) with position
/// as a tiebreaker.
#[derive(Debug, PartialEq, Eq)]
struct MergeCandidate {
    /// Lower values have higher priority and will be applied first.
    merge_order: MergeOrder,

    pair: TokenPair,

    /// Position in the token sequence where this pair starts.
    position: usize,
}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed (other vs self) to get min-heap behavior from BinaryHeap.
        // Break ties by position (earlier positions first).
        other
            .merge_order
            .cmp(&self.merge_order)
            .then_with(|| other.position.cmp(&self.position))
    }
}

/// Applies a fixed merge table to symbol sequences and expands token ids back.
#[derive(Debug, Clone)]
pub(crate) struct BPEConverter {
    /// Maps token pairs to (merged_token, merge_order).
    merges: HashMap<TokenPair, (Token, MergeOrder)>,

    /// Maps token IDs to the symbols they stand for.
    ///
    /// - expansions[..alphabet_size]: one symbol each
    /// - expansions[alphabet_size..]: concatenation of the merged pair
    expansions: Vec<Vec<Symbol>>,
}

impl BPEConverter {
    /// Builds the converter for an alphabet and an ordered merge history.
    ///
    /// The caller guarantees every merge only references ids defined before
    /// it (see `Vocabulary::validate`).
    pub(crate) fn new(
        alphabet_size: usize,
        merge_history: impl IntoIterator<Item = ((Token, Token), Token)>,
    ) -> Self {
        let mut merges = HashMap::new();
        let mut expansions: Vec<Vec<Symbol>> = (0..alphabet_size).map(|s| vec![s]).collect();

        for (merge_order, (pair, tok)) in merge_history.into_iter().enumerate() {
            merges.insert(TokenPair(pair.0, pair.1), (tok, merge_order));

            while expansions.len() <= tok {
                expansions.push(Vec::new());
            }
            // Temporary buffer: expansions cannot be borrowed mutably and
            // immutably at the same time.
            let mut merged = Vec::new();
            if let Some(left) = expansions.get(pair.0) {
                merged.extend_from_slice(left);
            }
            if let Some(right) = expansions.get(pair.1) {
                merged.extend_from_slice(right);
            }
            expansions[tok] = merged;
        }

        Self { merges, expansions }
    }

    /// Encodes a symbol sequence by applying learned merge rules.
    ///
    /// The output has the same or fewer tokens than the input.
    pub(crate) fn encode(&self, tokens: Vec<Token>) -> Vec<Token> {
        if tokens.len() <= 1 {
            return tokens;
        }

        let mut heap = BinaryHeap::new();

        // None marks a position consumed by a previous merge.
        let mut results: Vec<Option<Token>> = tokens.iter().map(|&t| Some(t)).collect();

        self.initialize_minheap(&tokens, &mut heap);

        while let Some(candidate) = heap.pop() {
            let pos = candidate.position;

            let Some(left) = results.get(pos).copied().flatten() else {
                continue;
            };
            // The left token may itself be a merge, so skip consumed slots.
            let mut right_idx = pos + 1;
            while right_idx < results.len() && matches!(results.get(right_idx), Some(None)) {
                right_idx += 1;
            }
            let Some(right) = results.get(right_idx).copied().flatten() else {
                continue;
            };

            if candidate.pair != TokenPair(left, right) {
                continue;
            }

            let Some(&(merge_tok, _order)) = self.merges.get(&candidate.pair) else {
                continue;
            };

            results[pos] = Some(merge_tok);
            results[right_idx] = None;

            self.track_new_merge_candidate(&mut heap, &results, pos, merge_tok, true);
            self.track_new_merge_candidate(&mut heap, &results, pos, merge_tok, false);
        }

        results.into_iter().flatten().collect()
    }

    /// Queues the pair the merged token forms with its left or right neighbour.
    fn track_new_merge_candidate(
        &self,
        heap: &mut BinaryHeap<MergeCandidate>,
        results: &[Option<Token>],
        pos: usize,
        merged_tok: Token,
        check_left: bool,
    ) {
        let n = results.len();
        let idx = if check_left {
            if pos == 0 {
                return;
            }
            let mut idx = pos - 1;
            while idx > 0 && matches!(results.get(idx), Some(None)) {
                idx -= 1;
            }
            idx
        } else {
            if pos + 1 >= n {
                return;
            }
            let mut idx = pos + 1;
            while idx < n && matches!(results.get(idx), Some(None)) {
                idx += 1;
            }
            idx
        };

        let Some(&Some(tok)) = results.get(idx) else {
            return;
        };

        let pair = if check_left {
            TokenPair(tok, merged_tok)
        } else {
            TokenPair(merged_tok, tok)
        };

        if let Some(&(_merge_tok, merge_order)) = self.merges.get(&pair) {
            let position = if check_left { idx } else { pos };
            heap.push(MergeCandidate {
                merge_order,
                pair,
                position,
            });
        }
    }

    fn initialize_minheap(&self, tokens: &[Token], heap: &mut BinaryHeap<MergeCandidate>) {
        for (i, window) in tokens.windows(2).enumerate() {
            let pair = TokenPair(window[0], window[1]);
            if let Some(&(_, merge_order)) = self.merges.get(&pair) {
                heap.push(MergeCandidate {
                    merge_order,
                    pair,
                    position: i,
                });
            }
        }
    }

    /// Number of ids the converter can decode (alphabet plus merges).
    pub(crate) fn len(&self) -> usize {
        self.expansions.len()
    }

    /// Expands token ids back into the symbols they stand for.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for negative ids and ids past
    /// the end of the vocabulary.
    pub(crate) fn decode(&self, tokens: &[TokenId]) -> Result<Vec<Symbol>, DecodeError> {
        let mut result = Vec::with_capacity(tokens.len());
        for &token in tokens {
            let symbols = usize::try_from(token)
                .ok()
                .and_then(|idx| self.expansions.get(idx))
                .ok_or(DecodeError::UnknownToken(token))?;
            result.extend_from_slice(symbols);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_encoding() {
        let converter = BPEConverter::new(2, vec![((0, 1), 2), ((2, 0), 3)]);
        assert_eq!(converter.encode(vec![0, 1, 0]), vec![3]);
    }

    #[test]
    fn test_single_token_no_change() {
        let converter = BPEConverter::new(8, vec![((0, 1), 8)]);
        assert_eq!(converter.encode(vec![7]), vec![7]);
    }

    #[test]
    fn test_no_merge_rules_apply() {
        let converter = BPEConverter::new(7, vec![((5, 6), 7)]);
        assert_eq!(converter.encode(vec![0, 1, 2, 3]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_merge_skips_consumed_right() {
        let converter = BPEConverter::new(10, vec![((0, 1), 10), ((10, 0), 11)]);
        assert_eq!(converter.encode(vec![0, 1, 0, 9]), vec![11, 9]);
    }

    #[test]
    fn test_merge_skips_consumed_left() {
        let converter = BPEConverter::new(4, vec![((0, 1), 4), ((2, 3), 5), ((4, 5), 6)]);
        assert_eq!(converter.encode(vec![0, 1, 2, 3]), vec![6]);
    }

    #[test]
    fn test_tie_break_by_position() {
        let converter = BPEConverter::new(2, vec![((0, 1), 2), ((2, 1), 3)]);
        assert_eq!(converter.encode(vec![0, 1, 1]), vec![3]);
    }

    #[test]
    fn test_earlier_merge_wins_over_position() {
        // (1, 2) was learned first, so it beats the leftmost (0, 1).
        let converter = BPEConverter::new(3, vec![((1, 2), 3), ((0, 1), 4)]);
        assert_eq!(converter.encode(vec![0, 1, 2]), vec![0, 3]);
    }

    #[test]
    fn test_decode_nested_merges() {
        let converter = BPEConverter::new(3, vec![((0, 1), 3), ((3, 2), 4)]);
        assert_eq!(converter.decode(&[4, 1]).expect("known ids"), vec![0, 1, 2, 1]);
    }

    #[test]
    fn test_decode_rejects_out_of_range_ids() {
        let converter = BPEConverter::new(3, vec![((0, 1), 3)]);
        assert_eq!(converter.decode(&[0, 4]), Err(DecodeError::UnknownToken(4)));
        assert_eq!(converter.decode(&[-1]), Err(DecodeError::UnknownToken(-1)));
    }

    #[test]
    fn test_len_counts_alphabet_and_merges() {
        let converter = BPEConverter::new(5, vec![((0, 1), 5), ((5, 2), 6)]);
        assert_eq!(converter.len(), 7);
    }

    #[test]
    fn test_encode_decode_inverse() {
        let converter = BPEConverter::new(3, vec![((0, 1), 3), ((3, 3), 4), ((2, 2), 5)]);
        let symbols = vec![0, 1, 0, 1, 2, 2, 2, 0];
        let encoded = converter.encode(symbols.clone());
        let ids: Vec<TokenId> = encoded.iter().map(|&t| t as TokenId).collect();
        assert_eq!(converter.decode(&ids).expect("known ids"), symbols);
    }
}
