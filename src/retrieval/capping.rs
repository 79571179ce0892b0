//! Per-corpus result caps

use super::{Corpus, RetrievedChunk};
use std::collections::{BTreeMap, HashMap};

/// Keeps at most `cap` chunks per corpus. A pure filter: survivors keep
/// their relative order, and corpora without a cap are unbounded.
#[derive(Debug, Clone, Default)]
pub struct CorpusCapper {
    caps: BTreeMap<Corpus, usize>,
}

impl CorpusCapper {
    pub fn new(caps: BTreeMap<Corpus, usize>) -> Self {
        Self { caps }
    }

    pub fn cap(&self, chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        if self.caps.is_empty() {
            return chunks;
        }

        let mut counts: HashMap<Corpus, usize> = HashMap::new();
        chunks
            .into_iter()
            .filter(|chunk| {
                let count = counts.entry(chunk.corpus).or_insert(0);
                let allowed = self.caps.get(&chunk.corpus).map_or(true, |cap| *count < *cap);
                if allowed {
                    *count += 1;
                }
                allowed
            })
            .collect()
    }
}
