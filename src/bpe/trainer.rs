//! Core BPE training algorithm (Algorithm 2).
//!
//! Optimized implementation from "Byte Pair Encoding is Suboptimal for Language Model Pretraining"
//! https://aclanthology.org/2023.findings-acl.38.pdf
//!
//! The corpus is a set of independent symbol sequences (one per action
//! chunk). All sequences live in one arena; sequence boundaries are simply
//! missing links, so no pair is ever counted across two chunks.
//!
//! Time complexity: O(N log V) vs O(NV) for naive implementation.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    ops::ControlFlow,
};

use indicatif::ProgressBar;

use crate::types::{Symbol, TextIdx, Token, TokenFreq, TokenPair};

/// Node in doubly-linked list representing a token in the training corpus.
///
/// Uses index-based links rather than direct references to work within
/// Rust's ownership system. Nodes are stored in a Vec<Option<Node>> arena.
#[derive(Debug)]
struct Node {
    /// The token identifier at this position.
    token: Token,

    /// Index of the previous node in the same sequence, if any.
    prev_idx: Option<TextIdx>,

    /// Index of the next node in the same sequence, if any.
    next_idx: Option<TextIdx>,
}

/// Item in the max heap for tracking most frequent token pairs.
///
/// The heap may contain stale entries after merges, so frequencies
/// must be validated against `pair_freqs` before use.
#[derive(Debug, PartialEq, Eq)]
struct HeapItem {
    freq: TokenFreq,
    pair: TokenPair,
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest freq pair at top; ties go to the lexicographically smaller pair
/// so training is deterministic.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.freq
            .cmp(&other.freq)
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

/// Stopping rules for a training run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrainLimits {
    /// Total vocabulary cap, alphabet included.
    pub(crate) vocab_size: usize,
    /// Pairs seen fewer times than this are never merged.
    pub(crate) min_frequency: TokenFreq,
}

/// BPE training structure.
///
/// This trainer uses a *Vec-as-arena* pattern to represent a
/// linked list of nodes. Nodes are stored in a `Vec<Option<Node>>`, where:
/// - The `Vec` provides stable indices for nodes
/// - Deletions are O(1) by setting entries to `None`
/// - Traversal is done via index-based left/right links inside `Node`
#[derive(Debug, Default)]
pub(crate) struct BPETrainer {
    /// Storage arena for nodes. `None` represents a deleted node.
    nodes: Vec<Option<Node>>,

    /// Arena index of the first node of every non-empty sequence.
    heads: Vec<TextIdx>,

    /// Max heap of (frequency, pair). Contains stale entries that need to be guarded against.
    heap: BinaryHeap<HeapItem>,

    /// pair -> positions of the first token of every occurrence.
    pair_positions: HashMap<TokenPair, HashSet<TextIdx>>,

    /// Source of truth for pair frequencies.
    pair_freqs: HashMap<TokenPair, TokenFreq>,

    /// Next available merge token ID.
    next_tok: Token,

    /// History of merges: (token_a, token_b) -> merged_token.
    merge_history: Vec<((Token, Token), Token)>,
}

impl BPETrainer {
    /// Create a trainer over a corpus of symbol sequences.
    ///
    /// # Arguments
    /// * `sequences` - One symbol sequence per training example.
    /// * `alphabet_size` - Size of the initial alphabet; merged tokens are
    ///   numbered from here upwards.
    pub(crate) fn new(sequences: &[Vec<Symbol>], alphabet_size: usize) -> Self {
        let total: usize = sequences.iter().map(Vec::len).sum();
        let mut nodes = Vec::with_capacity(total);
        let mut heads = Vec::with_capacity(sequences.len());

        for seq in sequences.iter().filter(|s| !s.is_empty()) {
            let start = nodes.len();
            let end = start + seq.len();
            heads.push(start);
            for (offset, &token) in seq.iter().enumerate() {
                let idx = start + offset;
                nodes.push(Some(Node {
                    token,
                    prev_idx: (idx > start).then(|| idx - 1),
                    next_idx: (idx + 1 < end).then_some(idx + 1),
                }));
            }
        }

        let mut trainer = BPETrainer {
            nodes,
            heads,
            heap: BinaryHeap::new(),
            pair_positions: HashMap::new(),
            pair_freqs: HashMap::new(),
            next_tok: alphabet_size,
            merge_history: Vec::new(),
        };

        trainer.build_initial_pairs();

        trainer
    }

    /// Perform one merge operation.
    ///
    /// Returns true if a merge was performed, false if no pair occurs at
    /// least `min_frequency` times.
    pub(crate) fn merge_step(&mut self, min_frequency: TokenFreq) -> bool {
        let Some((merge_pair, _freq)) = self.get_max_pair(min_frequency) else {
            return false;
        };

        // Left-to-right so overlapping runs (e.g. "aaa") merge deterministically.
        let mut positions: Vec<TextIdx> = self
            .pair_positions
            .get(&merge_pair)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        positions.sort_unstable();

        let new_tok_id = self.next_tok;
        self.next_tok += 1;

        for &pos in &positions {
            let (idx1, idx2) = match self.get_merge_idxs(merge_pair, pos) {
                ControlFlow::Continue(idxs) => idxs,
                ControlFlow::Break(_) => continue,
            };

            let cur_prev_idx = self.nodes[idx1].as_ref().and_then(|n| n.prev_idx);
            let new_next_idx = self.nodes[idx2].as_ref().and_then(|n| n.next_idx);

            self.remove_neighbours(merge_pair, idx1, idx2);
            self.merge_pair_in_list(new_next_idx, new_tok_id, idx1, idx2);
            self.add_neighbours(new_tok_id, idx1, cur_prev_idx, new_next_idx);
        }

        self.merge_history
            .push(((merge_pair.0, merge_pair.1), new_tok_id));

        // Un-track merged pair.
        self.pair_freqs.remove(&merge_pair);
        self.pair_positions.remove(&merge_pair);

        true
    }

    /// Merge until the vocabulary cap is reached or no pair is frequent enough.
    ///
    /// Returns the number of merges performed.
    pub(crate) fn train(&mut self, limits: TrainLimits, progress: &ProgressBar) -> usize {
        let budget = limits.vocab_size.saturating_sub(self.next_tok);
        let mut performed = 0;
        while performed < budget && self.merge_step(limits.min_frequency) {
            performed += 1;
            progress.inc(1);
        }
        log::debug!(
            "bpe training stopped after {performed} merges (budget {budget}, min frequency {})",
            limits.min_frequency
        );
        performed
    }

    /// Current token sequences, one per non-empty input sequence.
    pub(crate) fn get_encodings(&self) -> Vec<Vec<Token>> {
        self.heads
            .iter()
            .map(|&head| {
                let mut result = Vec::new();
                let mut current = Some(head);
                while let Some(idx) = current {
                    let Some(node) = &self.nodes[idx] else { break };
                    result.push(node.token);
                    current = node.next_idx;
                }
                result
            })
            .collect()
    }

    /// Merges learned so far, in the order they were learned.
    pub(crate) fn into_merge_history(self) -> Vec<((Token, Token), Token)> {
        self.merge_history
    }

    /// Records every adjacent pair of the initial corpus and seeds the heap.
    fn build_initial_pairs(&mut self) {
        for idx in 0..self.nodes.len() {
            if let Some(node) = &self.nodes[idx]
                && let Some(next_idx) = node.next_idx
                && let Some(next_node) = &self.nodes[next_idx]
            {
                let pair = TokenPair(node.token, next_node.token);
                *self.pair_freqs.entry(pair).or_insert(0) += 1;
                self.pair_positions.entry(pair).or_default().insert(idx);
            }
        }

        for (&pair, &freq) in &self.pair_freqs {
            self.heap.push(HeapItem { freq, pair })
        }
    }

    /// Pops until an entry matches the live frequency in `pair_freqs`.
    ///
    /// Every frequency change pushes a fresh entry, so the first live entry
    /// is the true maximum.
    fn get_max_pair(&mut self, min_frequency: TokenFreq) -> Option<(TokenPair, TokenFreq)> {
        while let Some(entry) = self.heap.pop() {
            if let Some(&true_freq) = self.pair_freqs.get(&entry.pair)
                && true_freq == entry.freq
            {
                if true_freq < min_frequency.max(1) {
                    return None;
                }
                return Some((entry.pair, entry.freq));
            }
        }

        None
    }

    /// Bookkeeping for a pair occurrence that disappears after a merge.
    fn remove_pair_at(&mut self, idx: TextIdx, pair: TokenPair) {
        if let Some(pos_set) = self.pair_positions.get_mut(&pair) {
            pos_set.remove(&idx);
        }

        if let Some(freq) = self.pair_freqs.get_mut(&pair)
            && *freq > 0
        {
            *freq -= 1;
            let freq = *freq;
            if freq > 0 {
                self.heap.push(HeapItem { freq, pair });
            }
        }
    }

    /// Bookkeeping for a pair occurrence created by a merge.
    fn add_pair_at(&mut self, idx: TextIdx, pair: TokenPair) {
        self.pair_positions.entry(pair).or_default().insert(idx);
        let freq = self.pair_freqs.entry(pair).or_insert(0);
        *freq += 1;

        self.heap.push(HeapItem { freq: *freq, pair });
    }

    /// Tracks the pairs the merged token forms with its new neighbours.
    fn add_neighbours(
        &mut self,
        new_tok_id: Token,
        idx1: TextIdx,
        cur_prev_idx: Option<TextIdx>,
        new_next_idx: Option<TextIdx>,
    ) {
        if let Some(prev_idx) = cur_prev_idx
            && let Some(prev_node) = &self.nodes[prev_idx]
        {
            let new_pair = TokenPair(prev_node.token, new_tok_id);
            self.add_pair_at(prev_idx, new_pair);
        }

        if let Some(next_idx) = new_next_idx
            && let Some(next_node) = &self.nodes[next_idx]
        {
            let new_pair = TokenPair(new_tok_id, next_node.token);
            self.add_pair_at(idx1, new_pair);
        }
    }

    /// Rewrites `idx1` to hold the merged token and unlinks `idx2`.
    fn merge_pair_in_list(
        &mut self,
        next_idx: Option<TextIdx>,
        tok_id: Token,
        idx1: TextIdx,
        idx2: TextIdx,
    ) {
        if let Some(node) = &mut self.nodes[idx1] {
            node.token = tok_id;
            node.next_idx = next_idx;
        }

        if let Some(new_right_idx) = next_idx
            && let Some(new_right_node) = &mut self.nodes[new_right_idx]
        {
            new_right_node.prev_idx = Some(idx1);
        }

        self.nodes[idx2] = None;
    }

    /// Drops the pairs the merged tokens formed with their old neighbours.
    fn remove_neighbours(&mut self, merge_pair: TokenPair, idx1: TextIdx, idx2: TextIdx) {
        if let Some(prev_idx) = self.nodes[idx1].as_ref().and_then(|n| n.prev_idx)
            && let Some(prev_node) = &self.nodes[prev_idx]
        {
            let old_pair = TokenPair(prev_node.token, merge_pair.0);
            self.remove_pair_at(prev_idx, old_pair);
        }

        if let Some(next_idx) = self.nodes[idx2].as_ref().and_then(|n| n.next_idx)
            && let Some(next_node) = &self.nodes[next_idx]
        {
            let old_pair = TokenPair(merge_pair.1, next_node.token);
            self.remove_pair_at(idx2, old_pair);
        }
    }

    /// Verifies the pair still sits at `pos` and returns both node indices.
    ///
    /// Earlier merges in the same step may have consumed either node.
    fn get_merge_idxs(&self, pair: TokenPair, pos: TextIdx) -> ControlFlow<(), (TextIdx, TextIdx)> {
        let Some(node1) = &self.nodes[pos] else {
            return ControlFlow::Break(());
        };
        let Some(idx2) = node1.next_idx else {
            return ControlFlow::Break(());
        };
        match &self.nodes[idx2] {
            Some(node2) if node1.token == pair.0 && node2.token == pair.1 => {
                ControlFlow::Continue((pos, idx2))
            }
            _ => ControlFlow::Break(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(vocab_size: usize) -> TrainLimits {
        TrainLimits {
            vocab_size,
            min_frequency: 2,
        }
    }

    #[test]
    fn test_basic_merge() {
        let corpus = vec![vec![0, 1, 0, 0, 1, 1, 0, 0]];
        let mut trainer = BPETrainer::new(&corpus, 2);
        let merges = trainer.train(limits(5), &ProgressBar::hidden());
        assert!(merges > 0);
        let encoded = trainer.get_encodings();
        assert!(encoded[0].len() < 8);
    }

    #[test]
    fn test_most_frequent_pair_first() {
        // (1, 2) appears three times, everything else at most once.
        let corpus = vec![vec![1, 2, 0, 1, 2, 3, 1, 2]];
        let mut trainer = BPETrainer::new(&corpus, 4);
        trainer.train(limits(5), &ProgressBar::hidden());
        assert_eq!(trainer.into_merge_history(), vec![((1, 2), 4)]);
    }

    #[test]
    fn test_pairs_do_not_cross_sequences() {
        // (1, 0) would occur twice if the sequences were concatenated.
        let corpus = vec![vec![0, 1], vec![0, 1], vec![2]];
        let mut trainer = BPETrainer::new(&corpus, 3);
        trainer.train(limits(10), &ProgressBar::hidden());
        assert_eq!(trainer.get_encodings(), vec![vec![3], vec![3], vec![2]]);
        assert_eq!(trainer.into_merge_history(), vec![((0, 1), 3)]);
    }

    #[test]
    fn test_min_frequency_stops_training() {
        let corpus = vec![vec![0, 1, 2, 3]];
        let mut trainer = BPETrainer::new(&corpus, 4);
        let merges = trainer.train(limits(100), &ProgressBar::hidden());
        assert_eq!(merges, 0);
        assert_eq!(trainer.get_encodings(), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_vocab_cap_limits_merges() {
        let corpus = vec![vec![0, 1, 2, 0, 1, 2, 0, 1, 2]];
        let mut trainer = BPETrainer::new(&corpus, 3);
        // Room for exactly one merge.
        let merges = trainer.train(limits(4), &ProgressBar::hidden());
        assert_eq!(merges, 1);
    }

    #[test]
    fn test_overlapping_run_merges_left_to_right() {
        let corpus = vec![vec![0, 0, 0], vec![0, 0, 0]];
        let mut trainer = BPETrainer::new(&corpus, 1);
        trainer.train(limits(2), &ProgressBar::hidden());
        assert_eq!(trainer.get_encodings(), vec![vec![1, 0], vec![1, 0]]);
    }

    #[test]
    fn test_decremented_pair_stays_reachable() {
        // Merging (0, 1) lowers the count of (1, 2) from 3 to 2; it must
        // still be picked up afterwards.
        let corpus = vec![vec![0, 1], vec![0, 1], vec![0, 1], vec![0, 1, 2], vec![1, 2], vec![1, 2]];
        let mut trainer = BPETrainer::new(&corpus, 3);
        trainer.train(limits(10), &ProgressBar::hidden());
        assert_eq!(trainer.into_merge_history(), vec![((0, 1), 3), ((1, 2), 4)]);
    }

    #[test]
    fn test_empty_corpus() {
        let mut trainer = BPETrainer::new(&[], 4);
        assert_eq!(trainer.train(limits(10), &ProgressBar::hidden()), 0);
        assert!(trainer.get_encodings().is_empty());
    }

    #[test]
    fn test_single_token_sequences() {
        let corpus = vec![vec![0], vec![0]];
        let trainer = BPETrainer::new(&corpus, 1);
        assert_eq!(trainer.get_encodings(), vec![vec![0], vec![0]]);
    }
}
