// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Context policies. The solver only ever sees `ContextId`s; how contexts are
//! composed is decided here.

use std::rc::Rc;

use crate::ir::call_site::BaseCallSite;
use crate::ir::context::{Context, ContextCache, ContextElement, ContextId};
use crate::ir::path::Path;

pub trait ContextStrategy {
    type E: ContextElement;

    #[inline]
    fn empty_context_id(&self) -> ContextId {
        ContextId::EMPTY
    }

    fn get_context_by_id(&self, context_id: ContextId) -> Option<Rc<Context<Self::E>>>;

    fn num_contexts(&self) -> usize;

    /// The callee context of a call with no receiver.
    fn new_static_call_context(&mut self, caller_cid: ContextId, callsite: &BaseCallSite) -> ContextId;

    /// The callee context of a call dispatched on the abstract object `heap`
    /// allocated under the heap context `heap_cid`.
    fn new_instance_call_context(
        &mut self,
        caller_cid: ContextId,
        callsite: &BaseCallSite,
        heap: &Rc<Path>,
        heap_cid: ContextId,
    ) -> ContextId;

    /// The heap context of an object allocated in a method analyzed under `method_cid`.
    fn new_heap_context(&mut self, method_cid: ContextId, heap: &Rc<Path>) -> ContextId;
}

/// Every method and object is analyzed under the empty context.
#[derive(Debug, Default)]
pub struct ContextInsensitive {
    context_cache: ContextCache<BaseCallSite>,
}

impl ContextInsensitive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextStrategy for ContextInsensitive {
    type E = BaseCallSite;

    fn get_context_by_id(&self, context_id: ContextId) -> Option<Rc<Context<Self::E>>> {
        self.context_cache.get_context(context_id)
    }

    fn num_contexts(&self) -> usize {
        self.context_cache.len()
    }

    fn new_static_call_context(&mut self, _caller_cid: ContextId, _callsite: &BaseCallSite) -> ContextId {
        ContextId::EMPTY
    }

    fn new_instance_call_context(
        &mut self,
        _caller_cid: ContextId,
        _callsite: &BaseCallSite,
        _heap: &Rc<Path>,
        _heap_cid: ContextId,
    ) -> ContextId {
        ContextId::EMPTY
    }

    fn new_heap_context(&mut self, _method_cid: ContextId, _heap: &Rc<Path>) -> ContextId {
        ContextId::EMPTY
    }
}

/// Truncates the context of the allocating method to `k - 1` elements.
fn k_limited_heap_context<E: ContextElement>(
    cache: &mut ContextCache<E>,
    method_cid: ContextId,
    k: usize,
) -> ContextId {
    match cache.get_context(method_cid) {
        Some(ctx) => {
            let heap_ctx = Context::k_limited_context(&ctx, k.saturating_sub(1));
            cache.get_context_id(&heap_ctx)
        }
        None => ContextId::EMPTY,
    }
}

/// The context of a method is its k most recent call sites.
#[derive(Debug)]
pub struct KCallSiteSensitive {
    k: usize,
    context_cache: ContextCache<BaseCallSite>,
}

impl KCallSiteSensitive {
    pub fn new(k: usize) -> Self {
        KCallSiteSensitive {
            k,
            context_cache: ContextCache::new(),
        }
    }

    fn push_call_site(&mut self, caller_cid: ContextId, callsite: &BaseCallSite) -> ContextId {
        let caller_ctx = self
            .context_cache
            .get_context(caller_cid)
            .unwrap_or_else(Context::new_empty);
        let callee_ctx = Context::new_k_limited_context(&caller_ctx, *callsite, self.k);
        self.context_cache.get_context_id(&callee_ctx)
    }
}

impl ContextStrategy for KCallSiteSensitive {
    type E = BaseCallSite;

    fn get_context_by_id(&self, context_id: ContextId) -> Option<Rc<Context<Self::E>>> {
        self.context_cache.get_context(context_id)
    }

    fn num_contexts(&self) -> usize {
        self.context_cache.len()
    }

    fn new_static_call_context(&mut self, caller_cid: ContextId, callsite: &BaseCallSite) -> ContextId {
        self.push_call_site(caller_cid, callsite)
    }

    fn new_instance_call_context(
        &mut self,
        caller_cid: ContextId,
        callsite: &BaseCallSite,
        _heap: &Rc<Path>,
        _heap_cid: ContextId,
    ) -> ContextId {
        self.push_call_site(caller_cid, callsite)
    }

    fn new_heap_context(&mut self, method_cid: ContextId, _heap: &Rc<Path>) -> ContextId {
        k_limited_heap_context(&mut self.context_cache, method_cid, self.k)
    }
}

/// The context of an instance method is its receiver object qualified by the
/// receiver's heap context. Static callees inherit the caller's context.
#[derive(Debug)]
pub struct KObjectSensitive {
    k: usize,
    context_cache: ContextCache<Rc<Path>>,
}

impl KObjectSensitive {
    pub fn new(k: usize) -> Self {
        KObjectSensitive {
            k,
            context_cache: ContextCache::new(),
        }
    }
}

impl ContextStrategy for KObjectSensitive {
    type E = Rc<Path>;

    fn get_context_by_id(&self, context_id: ContextId) -> Option<Rc<Context<Self::E>>> {
        self.context_cache.get_context(context_id)
    }

    fn num_contexts(&self) -> usize {
        self.context_cache.len()
    }

    fn new_static_call_context(&mut self, caller_cid: ContextId, _callsite: &BaseCallSite) -> ContextId {
        caller_cid
    }

    fn new_instance_call_context(
        &mut self,
        _caller_cid: ContextId,
        _callsite: &BaseCallSite,
        heap: &Rc<Path>,
        heap_cid: ContextId,
    ) -> ContextId {
        let heap_ctx = self
            .context_cache
            .get_context(heap_cid)
            .unwrap_or_else(Context::new_empty);
        let callee_ctx = Context::new_k_limited_context(&heap_ctx, heap.clone(), self.k);
        self.context_cache.get_context_id(&callee_ctx)
    }

    fn new_heap_context(&mut self, method_cid: ContextId, _heap: &Rc<Path>) -> ContextId {
        k_limited_heap_context(&mut self.context_cache, method_cid, self.k)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::program::{AllocKind, ClassId, MethodId, Type};

    fn site(stmt: usize) -> BaseCallSite {
        BaseCallSite::new(MethodId::new(0), stmt)
    }

    fn heap(site: usize) -> Rc<Path> {
        Path::new_heap_obj(MethodId::new(0), site, Type::Class(ClassId::new(0)), AllocKind::Object)
    }

    #[test]
    fn call_site_contexts_are_k_limited() {
        let mut strategy = KCallSiteSensitive::new(1);
        let c1 = strategy.new_static_call_context(ContextId::EMPTY, &site(1));
        let c2 = strategy.new_static_call_context(c1, &site(2));
        assert_ne!(c1, c2);
        assert_eq!(strategy.new_static_call_context(ContextId::EMPTY, &site(2)), c2);
        // With k = 1 heap objects are not qualified.
        assert_eq!(strategy.new_heap_context(c2, &heap(0)), ContextId::EMPTY);
        assert_eq!(strategy.num_contexts(), 3);
    }

    #[test]
    fn object_contexts_follow_the_receiver() {
        let mut strategy = KObjectSensitive::new(2);
        let o1 = strategy.new_instance_call_context(ContextId::EMPTY, &site(0), &heap(1), ContextId::EMPTY);
        let o2 = strategy.new_instance_call_context(o1, &site(5), &heap(2), ContextId::EMPTY);
        assert_ne!(o1, o2);
        assert_eq!(strategy.new_static_call_context(o1, &site(3)), o1);

        let heap_cid = strategy.new_heap_context(o1, &heap(3));
        assert_eq!(heap_cid, o1);
        let nested = strategy.new_instance_call_context(ContextId::EMPTY, &site(0), &heap(3), heap_cid);
        let elems = strategy.get_context_by_id(nested).unwrap().elems().to_vec();
        assert_eq!(elems, vec![heap(3), heap(1)]);
    }

    #[test]
    fn insensitive_strategy_never_creates_contexts() {
        let mut strategy = ContextInsensitive::new();
        assert_eq!(strategy.new_static_call_context(ContextId::EMPTY, &site(1)), ContextId::EMPTY);
        assert_eq!(strategy.new_heap_context(ContextId::EMPTY, &heap(1)), ContextId::EMPTY);
        assert_eq!(strategy.num_contexts(), 1);
    }
}
