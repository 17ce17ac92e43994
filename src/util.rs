use std::sync::atomic::{AtomicU64, Ordering};

const WORD_BITS: usize = 64;

/// Fixed-size bit set that may be written from many threads at once.
#[derive(Debug)]
pub struct AtomicBitSet {
    words: Vec<AtomicU64>,
    size: usize,
}

impl AtomicBitSet {
    pub fn new(size: usize) -> Self {
        let words = (0..size.div_ceil(WORD_BITS)).map(|_| AtomicU64::new(0)).collect();
        Self { words, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Set bit `index`, returns whether it was set before.
    pub fn set(&self, index: usize) -> bool {
        let mask = 1u64 << (index % WORD_BITS);
        self.words[index / WORD_BITS].fetch_or(mask, Ordering::Relaxed) & mask != 0
    }

    pub fn get(&self, index: usize) -> bool {
        let mask = 1u64 << (index % WORD_BITS);
        self.words[index / WORD_BITS].load(Ordering::Relaxed) & mask != 0
    }

    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|word| word.load(Ordering::Relaxed).count_ones() as usize).sum()
    }

    /// Indices of all set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, word)| {
            let mut bits = word.load(Ordering::Relaxed);
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(word_index * WORD_BITS + bit)
            })
        })
    }
}
