// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Delivers thrown objects to the catch clauses protecting their throw sites.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::errors::{PtaError, PtaResult};
use crate::graph::pag::{PAGNodeId, PAG};
use crate::ir::call_site::ExceptionThrowSite;
use crate::ir::path::Path;
use crate::ir::program::Program;
use crate::util::chunked_queue::{ChunkedQueue, QueueReader};

#[derive(Default)]
pub struct ExceptionHandler {
    throw_node_to_sites: HashMap<PAGNodeId, HashSet<Rc<ExceptionThrowSite>>>,
    /// Every throw site in registration order.
    throw_site_queue: ChunkedQueue<Rc<ExceptionThrowSite>>,
}

impl ExceptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a throw site on its throw node.
    /// Returns false if the site was already registered.
    pub fn add_throw_site(&mut self, site: ExceptionThrowSite) -> bool {
        let site = Rc::new(site);
        if self
            .throw_node_to_sites
            .entry(site.throw_node)
            .or_default()
            .insert(site.clone())
        {
            self.throw_site_queue.push(site);
            true
        } else {
            false
        }
    }

    pub fn throw_sites_lookup(&self, throw_node: PAGNodeId) -> Vec<Rc<ExceptionThrowSite>> {
        self.throw_node_to_sites
            .get(&throw_node)
            .map(|sites| sites.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[inline]
    pub fn has_throw_sites(&self, throw_node: PAGNodeId) -> bool {
        self.throw_node_to_sites.contains_key(&throw_node)
    }

    #[inline]
    pub fn throw_sites(&self) -> &ChunkedQueue<Rc<ExceptionThrowSite>> {
        &self.throw_site_queue
    }

    #[inline]
    pub fn throw_sites_reader(&self) -> QueueReader {
        self.throw_site_queue.reader()
    }

    #[inline]
    pub fn num_throw_sites(&self) -> usize {
        self.throw_site_queue.len()
    }

    /// Matches every thrown object against the traps covering the site.
    /// Returns `(variable, object)` pairs: an object caught by a trap goes to
    /// the trap's handler local, an uncaught one escapes to the enclosing
    /// method's throw variable.
    pub fn exception_dispatch(
        &self,
        program: &Program,
        pag: &mut PAG,
        heaps: &[PAGNodeId],
        site: &ExceptionThrowSite,
    ) -> PtaResult<Vec<(PAGNodeId, PAGNodeId)>> {
        let method = site.method;
        let body = program.method(method.method).body.as_ref().ok_or_else(|| {
            PtaError::malformed(format!(
                "throw site in {} without a body",
                program.method_name(method.method)
            ))
        })?;
        let mut delivered = Vec::with_capacity(heaps.len());
        for heap in heaps {
            let class = pag
                .node(*heap)
                .path()
                .and_then(|path| path.heap_type(program))
                .and_then(|ty| program.dispatch_class(&ty));
            let trap = class.and_then(|class| {
                body.traps_covering(site.stmt)
                    .find(|trap| program.is_subclass(class, trap.exception))
            });
            let dst = match trap {
                Some(trap) => Path::new_local(method.method, trap.handler),
                None => Path::new_method_throw(method.method),
            };
            delivered.push((pag.parameterize(&dst, method.cid), *heap));
        }
        Ok(delivered)
    }
}
