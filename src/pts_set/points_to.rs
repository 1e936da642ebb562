// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::slice;

use crate::util::bit_vec::{BitIter, BitVec, Idx};

const SMALL_SET_CAPACITY: usize = 32;

/// A set of abstract objects. The solver only ever grows the sets it owns;
/// `subtract` is used on scratch copies to compute deltas.
pub trait PointsToSet<T> {
    type Iter<'a>: Iterator<Item = T>
    where
        Self: 'a;

    fn new() -> Self;
    fn count(&self) -> usize;
    fn contains(&self, elem: T) -> bool;
    fn is_empty(&self) -> bool;
    /// Returns whether `elem` is new to the set.
    fn insert(&mut self, elem: T) -> bool;
    /// Returns whether the set grew.
    fn union(&mut self, other: &Self) -> bool;
    /// Returns whether the set shrank.
    fn subtract(&mut self, other: &Self) -> bool;
    fn iter<'a>(&'a self) -> Self::Iter<'a>;

    fn superset(&self, other: &Self) -> bool {
        other.iter().all(|elem| self.contains(elem))
    }
}

/// Points-to set kept as a vector while small and as a bit vector once it
/// outgrows `SMALL_SET_CAPACITY`.
#[derive(Clone)]
pub enum HybridPointsToSet<T> {
    Small(Vec<T>),
    Large(BitVec<T>),
}

impl<T: Idx> fmt::Debug for HybridPointsToSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Idx> Default for HybridPointsToSet<T> {
    fn default() -> Self {
        HybridPointsToSet::Small(Vec::new())
    }
}

impl<'a, T: Idx> IntoIterator for &'a HybridPointsToSet<T> {
    type Item = T;
    type IntoIter = HybridIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn to_large<T: Idx>(elems: &[T]) -> BitVec<T> {
    let mut large = BitVec::new_empty();
    for elem in elems {
        large.insert(*elem);
    }
    large
}

impl<T: Idx> PointsToSet<T> for HybridPointsToSet<T> {
    type Iter<'a> = HybridIter<'a, T>;

    fn new() -> Self {
        Self::default()
    }

    fn count(&self) -> usize {
        match self {
            HybridPointsToSet::Small(small) => small.len(),
            HybridPointsToSet::Large(large) => large.count(),
        }
    }

    fn contains(&self, elem: T) -> bool {
        match self {
            HybridPointsToSet::Small(small) => small.contains(&elem),
            HybridPointsToSet::Large(large) => large.contains(elem),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            HybridPointsToSet::Small(small) => small.is_empty(),
            HybridPointsToSet::Large(large) => large.is_empty(),
        }
    }

    fn insert(&mut self, elem: T) -> bool {
        match self {
            HybridPointsToSet::Small(small) => {
                if small.contains(&elem) {
                    return false;
                }
                if small.len() < SMALL_SET_CAPACITY {
                    small.push(elem);
                } else {
                    let mut large = to_large(small);
                    large.insert(elem);
                    *self = HybridPointsToSet::Large(large);
                }
                true
            }
            HybridPointsToSet::Large(large) => large.insert(elem),
        }
    }

    fn union(&mut self, other: &Self) -> bool {
        match (&mut *self, other) {
            (HybridPointsToSet::Large(large), HybridPointsToSet::Large(other_large)) => large.union(other_large),
            (HybridPointsToSet::Small(small), HybridPointsToSet::Large(other_large)) => {
                let mut large = to_large(small);
                let changed = large.union(other_large);
                *self = HybridPointsToSet::Large(large);
                changed
            }
            (_, HybridPointsToSet::Small(other_small)) => other_small
                .iter()
                .fold(false, |changed, elem| self.insert(*elem) || changed),
        }
    }

    fn subtract(&mut self, other: &Self) -> bool {
        match (&mut *self, other) {
            (HybridPointsToSet::Large(large), HybridPointsToSet::Large(other_large)) => {
                large.subtract(other_large)
            }
            (HybridPointsToSet::Large(large), HybridPointsToSet::Small(other_small)) => {
                large.subtract(&to_large(other_small))
            }
            (HybridPointsToSet::Small(small), _) => {
                let before = small.len();
                small.retain(|elem| !other.contains(*elem));
                small.len() != before
            }
        }
    }

    fn iter(&self) -> HybridIter<'_, T> {
        match self {
            HybridPointsToSet::Small(small) => HybridIter::Small(small.iter()),
            HybridPointsToSet::Large(large) => HybridIter::Large(large.iter()),
        }
    }
}

pub enum HybridIter<'a, T: Idx> {
    Small(slice::Iter<'a, T>),
    Large(BitIter<'a, T>),
}

impl<'a, T: Idx> Iterator for HybridIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            HybridIter::Small(small) => small.next().copied(),
            HybridIter::Large(large) => large.next(),
        }
    }
}
