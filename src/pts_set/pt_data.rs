// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use super::points_to::PointsToSet;
use crate::util::bit_vec::Idx;

/// Diff points-to data.
///
/// The points-to set of every key is split in two disjoint parts: the elements
/// already propagated along the key's outgoing edges (`propa`, the old set)
/// and the elements added since the key was last flushed (`diff`, the new
/// set). Only the diff is propagated when the key is processed, which makes
/// the propagation incremental. Sets only ever grow.
///
/// K  (Key):     "owning" pointer of a points-to set.
/// D  (Data):    elements in points-to sets.
/// DS (DataSet): the points-to set; a collection of Data.
pub struct DiffPTData<K, D, DS> {
    /// Diff points-to to be propagated.
    pub(crate) diff_pts_map: HashMap<K, DS>,
    /// Points-to already propagated.
    pub(crate) propa_pts_map: HashMap<K, DS>,
    marker: PhantomData<D>,
}

impl<K, D, DS> fmt::Debug for DiffPTData<K, D, DS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "DiffPTData".fmt(f)
    }
}

impl<K, D, DS> Default for DiffPTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D> + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D, DS> DiffPTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D> + Clone,
{
    pub fn new() -> DiffPTData<K, D, DS> {
        DiffPTData {
            diff_pts_map: HashMap::new(),
            propa_pts_map: HashMap::new(),
            marker: PhantomData,
        }
    }

    /// Adds element to the points-to set associated with var.
    /// Returns false if elem is already in this set, either as an old or as a new element.
    #[inline]
    pub fn add_pts(&mut self, var: K, elem: D) -> bool {
        if let Some(propa) = self.propa_pts_map.get(&var) {
            if propa.contains(elem) {
                return false;
            }
        }
        let diff = self.diff_pts_map.entry(var).or_insert_with(DS::new);
        diff.insert(elem)
    }

    /// Performs diff_pts(dst_var) = diff_pts(dst_var) U (src_ds - propa_pts(dst_var)).
    /// Returns true iff at least one element is new to dst_var.
    pub fn union_pts_to(&mut self, dst_var: K, src_ds: &DS) -> bool {
        let mut new = src_ds.clone();
        if let Some(propa) = self.propa_pts_map.get(&dst_var) {
            new.subtract(propa);
        }
        if new.is_empty() {
            return false;
        }
        let diff = self.diff_pts_map.entry(dst_var).or_insert_with(DS::new);
        diff.union(&new)
    }

    /// Get diff points to.
    #[inline]
    pub fn get_diff_pts(&self, var: K) -> Option<&DS> {
        self.diff_pts_map.get(&var)
    }

    /// Get propagated points to.
    #[inline]
    pub fn get_propa_pts(&self, var: K) -> Option<&DS> {
        self.propa_pts_map.get(&var)
    }

    /// Returns the whole points-to set of var, old and new elements together.
    pub fn get_pts(&self, var: K) -> DS {
        let mut pts = self.propa_pts_map.get(&var).cloned().unwrap_or_else(DS::new);
        if let Some(diff) = self.diff_pts_map.get(&var) {
            pts.union(diff);
        }
        pts
    }

    /// Returns true if var has elements waiting for propagation.
    #[inline]
    pub fn has_diff(&self, var: K) -> bool {
        self.diff_pts_map.get(&var).map_or(false, |diff| !diff.is_empty())
    }

    /// Sets all diff elems to propa elems.
    pub fn flush(&mut self, var: K) {
        if let Some(diff) = self.diff_pts_map.remove(&var) {
            let propa = self.propa_pts_map.entry(var).or_insert_with(DS::new);
            propa.union(&diff);
        }
    }

    /// Moves only `elems` from the diff of var to its propagated set. Elements
    /// that reached var after `elems` was taken stay pending.
    pub fn flush_elems(&mut self, var: K, elems: &DS) {
        if let Some(diff) = self.diff_pts_map.get_mut(&var) {
            diff.subtract(elems);
            let propa = self.propa_pts_map.entry(var).or_insert_with(DS::new);
            propa.union(elems);
        }
    }

    /// Iterates over every key owning a non-empty points-to set.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        let propa = self
            .propa_pts_map
            .iter()
            .filter(|(_, pts)| !pts.is_empty())
            .map(|(k, _)| *k);
        let diff_only = self
            .diff_pts_map
            .iter()
            .filter(move |(k, pts)| {
                !pts.is_empty() && self.propa_pts_map.get(*k).map_or(true, |p| p.is_empty())
            })
            .map(|(k, _)| *k);
        propa.chain(diff_only)
    }
}
