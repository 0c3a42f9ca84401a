// bitmask.rs - Growable component signature
//
// A signature is a set of component bit positions. Words missing from the
// shorter of two masks are treated as zero, so masks of different lengths
// compare by the bits they hold rather than by their storage.

use crate::ecs::ComponentId;
use std::fmt;
use std::hash::{Hash, Hasher};

const WORD_BITS: u32 = u64::BITS;

/// Arbitrary-width bit set describing which components an entity or
/// archetype declares.
#[derive(Clone, Default)]
pub struct Bitmask {
    words: Vec<u64>,
}

impl Bitmask {
    /// Create an empty mask.
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Build a mask with every bit in `bits` set.
    pub fn from_bits<I>(bits: I) -> Self
    where
        I: IntoIterator<Item = ComponentId>,
    {
        let mut mask = Self::new();
        for bit in bits {
            mask.set(bit);
        }
        mask
    }

    #[inline]
    fn split(bit: ComponentId) -> (usize, u64) {
        ((bit / WORD_BITS) as usize, 1u64 << (bit % WORD_BITS))
    }

    /// Set `bit`, growing storage as needed. Lower bits are untouched.
    pub fn set(&mut self, bit: ComponentId) {
        let (word, flag) = Self::split(bit);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= flag;
    }

    /// Clear `bit`. Bits beyond the current capacity are already clear.
    pub fn unset(&mut self, bit: ComponentId) {
        let (word, flag) = Self::split(bit);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !flag;
        }
    }

    /// Clear every bit, keeping the allocation.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Whether `bit` is set.
    #[inline]
    pub fn has(&self, bit: ComponentId) -> bool {
        let (word, flag) = Self::split(bit);
        self.words.get(word).is_some_and(|w| w & flag != 0)
    }

    /// Superset test: every bit set in `other` is also set in `self`.
    pub fn has_all(&self, other: &Bitmask) -> bool {
        other.words.iter().enumerate().all(|(i, &theirs)| {
            let ours = self.words.get(i).copied().unwrap_or(0);
            ours & theirs == theirs
        })
    }

    /// Exact equality over the union of both lengths.
    pub fn equals(&self, other: &Bitmask) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|i| self.word(i) == other.word(i))
    }

    #[inline]
    fn word(&self, index: usize) -> u64 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Copy of this mask with `bit` added.
    pub fn with(&self, bit: ComponentId) -> Self {
        let mut mask = self.clone();
        mask.set(bit);
        mask
    }

    /// Copy of this mask with `bit` removed.
    pub fn without(&self, bit: ComponentId) -> Self {
        let mut mask = self.clone();
        mask.unset(bit);
        mask
    }

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let base = i as u32 * WORD_BITS;
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let offset = rest.trailing_zeros();
                rest &= rest - 1;
                Some(base + offset)
            })
        })
    }

    /// Number of storage words, including trailing zero words.
    pub fn word_len(&self) -> usize {
        self.words.len()
    }

    fn significant_words(&self) -> &[u64] {
        let len = self
            .words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |last| last + 1);
        &self.words[..len]
    }
}

impl PartialEq for Bitmask {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Bitmask {}

// Must agree with `equals`: trailing zero words do not contribute.
impl Hash for Bitmask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

impl FromIterator<ComponentId> for Bitmask {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        Self::from_bits(iter)
    }
}

impl fmt::Debug for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
