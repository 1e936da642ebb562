// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::hash::Hash;
use std::rc::Rc;

use super::call_site::BaseCallSite;
use super::path::Path;

index_type!(
    /// The unique identifier for each context.
    ContextId
);

impl ContextId {
    /// Every `ContextCache` interns the empty context first.
    pub const EMPTY: ContextId = ContextId(0);
}

pub trait ContextElement: Clone + Eq + PartialEq + Debug + Hash {}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Context<E: ContextElement> {
    pub(crate) context_elems: Vec<E>,
}

impl<E: ContextElement> Debug for Context<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.context_elems.fmt(f)
    }
}

impl<E: ContextElement> Context<E> {
    pub fn new_empty() -> Rc<Self> {
        Rc::new(Context {
            context_elems: Vec::new(),
        })
    }

    pub fn new(context_elems: Vec<E>) -> Rc<Self> {
        Rc::new(Context { context_elems })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.context_elems.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.context_elems.is_empty()
    }

    pub fn elems(&self) -> &[E] {
        &self.context_elems
    }

    /// Compose a new context from a given context and a new context element.
    /// Discard the last old context element if the length of context exceeds the depth limit
    pub fn new_k_limited_context(old_ctx: &Rc<Context<E>>, elem: E, k: usize) -> Rc<Self> {
        let mut elems = Vec::with_capacity(k);
        if k > 0 {
            elems.push(elem);
            let kept = old_ctx.len().min(k - 1);
            elems.extend_from_slice(&old_ctx.context_elems[..kept]);
        }
        Rc::new(Context { context_elems: elems })
    }

    pub fn k_limited_context(ctx: &Rc<Context<E>>, k: usize) -> Rc<Self> {
        if ctx.len() <= k {
            ctx.clone()
        } else {
            Rc::new(Context {
                context_elems: ctx.context_elems[..k].to_vec(),
            })
        }
    }
}

/// Interns contexts so that the solver only handles `ContextId`s.
#[derive(Debug)]
pub struct ContextCache<E: ContextElement> {
    context_list: Vec<Rc<Context<E>>>,
    context_to_index_map: HashMap<Rc<Context<E>>, ContextId>,
}

impl<E: ContextElement> Default for ContextCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ContextElement> ContextCache<E> {
    pub fn new() -> ContextCache<E> {
        let mut cache = ContextCache {
            context_list: Vec::new(),
            context_to_index_map: HashMap::new(),
        };
        let empty = cache.get_context_id(&Context::new_empty());
        debug_assert_eq!(empty, ContextId::EMPTY);
        cache
    }

    /// Returns the id of `context`, interning it on first use.
    pub fn get_context_id(&mut self, context: &Rc<Context<E>>) -> ContextId {
        if let Some(id) = self.context_to_index_map.get(context) {
            *id
        } else {
            let id = ContextId::new(self.context_list.len());
            self.context_list.push(context.clone());
            self.context_to_index_map.insert(context.clone(), id);
            id
        }
    }

    pub fn get_context(&self, id: ContextId) -> Option<Rc<Context<E>>> {
        self.context_list.get(id.index()).cloned()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.context_list.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.context_list.is_empty()
    }
}

// Different kinds of context elements supported now
impl ContextElement for BaseCallSite {}

impl ContextElement for Rc<Path> {}
