//! The per-queue batch chain (spec §3 Batch): a chain of fixed-capacity
//! nodes, every node but the tail full, the tail partial or empty.

use hxhim_core::Limits;
use std::collections::VecDeque;

/// A chain of batch nodes holding entries of one operation kind.
pub struct BatchChain<T> {
    nodes: VecDeque<Vec<T>>,
}

impl<T> BatchChain<T> {
    pub fn new() -> Self {
        BatchChain { nodes: VecDeque::new() }
    }

    /// Append one entry, starting a new tail node if the current tail is
    /// full or there is no tail yet. Returns `true` if this push just
    /// filled the node it landed in.
    pub fn push(&mut self, entry: T) -> bool {
        let need_new_tail = match self.nodes.back() {
            Some(tail) => tail.len() >= Limits::BATCH_CAP,
            None => true,
        };
        if need_new_tail {
            self.nodes.push_back(Vec::with_capacity(Limits::BATCH_CAP));
        }
        let tail = self.nodes.back_mut().expect("a tail node was just ensured to exist");
        tail.push(entry);
        tail.len() == Limits::BATCH_CAP
    }

    /// Number of nodes that are currently at full capacity. Since only the
    /// tail is ever partial, this is the chain length minus one unless the
    /// tail itself happens to be exactly full.
    pub fn full_batches(&self) -> usize {
        match self.nodes.back() {
            Some(tail) if tail.len() < Limits::BATCH_CAP => self.nodes.len() - 1,
            Some(_) => self.nodes.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|n| n.is_empty())
    }

    /// Detach every full node, leaving a partial tail (if any) in place.
    pub fn take_full_prefix(&mut self) -> VecDeque<Vec<T>> {
        let tail_is_partial = matches!(self.nodes.back(), Some(tail) if tail.len() < Limits::BATCH_CAP);
        if tail_is_partial {
            let tail = self.nodes.pop_back();
            let full = std::mem::take(&mut self.nodes);
            if let Some(tail) = tail {
                self.nodes.push_back(tail);
            }
            full
        } else {
            std::mem::take(&mut self.nodes)
        }
    }

    /// Detach the entire chain, including a partial tail.
    pub fn take_all(&mut self) -> VecDeque<Vec<T>> {
        std::mem::take(&mut self.nodes)
    }
}

impl<T> Default for BatchChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_boundary_matches_spec_scenario() {
        let mut chain: BatchChain<u8> = BatchChain::new();
        for _ in 0..Limits::BATCH_CAP {
            chain.push(0);
        }
        assert_eq!(chain.full_batches(), 1);
        chain.push(0);
        assert_eq!(chain.full_batches(), 1);
        assert_eq!(chain.nodes.back().unwrap().len(), 1);
    }

    #[test]
    fn take_full_prefix_leaves_partial_tail() {
        let mut chain: BatchChain<u8> = BatchChain::new();
        for _ in 0..(Limits::BATCH_CAP + 3) {
            chain.push(0);
        }
        let full = chain.take_full_prefix();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].len(), Limits::BATCH_CAP);
        assert_eq!(chain.full_batches(), 0);
        assert_eq!(chain.take_all().len(), 1);
    }

    #[test]
    fn take_all_drains_a_partial_only_chain() {
        let mut chain: BatchChain<u8> = BatchChain::new();
        chain.push(0);
        chain.push(0);
        assert!(chain.take_full_prefix().is_empty());
        let all = chain.take_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].len(), 2);
    }
}
