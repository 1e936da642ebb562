// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! A dense, growable bit vector used by large points-to sets.

use std::fmt::{self, Debug};
use std::hash::Hash;
use std::marker::PhantomData;

type Word = u64;
const WORD_BITS: usize = Word::BITS as usize;

/// An index newtype that can be stored in a bit vector.
pub trait Idx: Copy + 'static + Eq + Debug + Hash {
    fn new(idx: usize) -> Self;

    fn index(self) -> usize;
}

impl Idx for usize {
    #[inline]
    fn new(idx: usize) -> Self {
        idx
    }
    #[inline]
    fn index(self) -> usize {
        self
    }
}

impl Idx for u32 {
    #[inline]
    fn new(idx: usize) -> Self {
        assert!(idx <= u32::MAX as usize);
        idx as u32
    }
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct BitVec<T> {
    words: Vec<Word>,
    marker: PhantomData<T>,
}

impl<T: Idx> BitVec<T> {
    pub fn new_empty() -> BitVec<T> {
        BitVec {
            words: Vec::new(),
            marker: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    #[inline]
    pub fn contains(&self, elem: T) -> bool {
        let (word, mask) = locate(elem);
        self.words.get(word).map_or(false, |bits| bits & mask != 0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Returns whether `elem` was absent.
    #[inline]
    pub fn insert(&mut self, elem: T) -> bool {
        let (word, mask) = locate(elem);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let absent = self.words[word] & mask == 0;
        self.words[word] |= mask;
        absent
    }

    /// Set bits in increasing order.
    #[inline]
    pub fn iter(&self) -> BitIter<'_, T> {
        BitIter {
            current: self.words.first().copied().unwrap_or(0),
            words: &self.words,
            word: 0,
            marker: PhantomData,
        }
    }

    pub fn union(&mut self, other: &BitVec<T>) -> bool {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        combine(&mut self.words, &other.words, |a, b| a | b)
    }

    pub fn subtract(&mut self, other: &BitVec<T>) -> bool {
        combine(&mut self.words, &other.words, |a, b| a & !b)
    }
}

impl<T: Idx> Debug for BitVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub struct BitIter<'a, T: Idx> {
    words: &'a [Word],
    /// Index of the word being scanned.
    word: usize,
    /// Unvisited bits of that word.
    current: Word,
    marker: PhantomData<T>,
}

impl<'a, T: Idx> Iterator for BitIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.current == 0 {
            self.word += 1;
            self.current = *self.words.get(self.word)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(T::new(self.word * WORD_BITS + bit))
    }
}

#[inline]
fn locate<T: Idx>(elem: T) -> (usize, Word) {
    let idx = elem.index();
    (idx / WORD_BITS, 1 << (idx % WORD_BITS))
}

/// Applies `op` word by word over the common prefix. Returns whether `out` changed.
fn combine(out: &mut [Word], other: &[Word], op: impl Fn(Word, Word) -> Word) -> bool {
    let mut changed = false;
    for (word, other_word) in out.iter_mut().zip(other) {
        let new_word = op(*word, *other_word);
        changed |= new_word != *word;
        *word = new_word;
    }
    changed
}
