// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use super::context::ContextId;
use super::program::{ClassId, InvokeExpr, InvokeKind, MethodId};
use crate::graph::pag::PAGNodeId;

/// A method qualified by the context it is analyzed under.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct CSMethodId {
    pub cid: ContextId,
    pub method: MethodId,
}

impl CSMethodId {
    pub fn new(cid: ContextId, method: MethodId) -> Self {
        CSMethodId { cid, method }
    }
}

impl From<CSMethodId> for MethodId {
    fn from(cs_method: CSMethodId) -> Self {
        cs_method.method
    }
}

/// The type of a call graph edge
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CallKind {
    Static,
    Virtual,
    Interface,
    Special,
    Dynamic,
    /// Implicit call of a static initializer.
    Clinit,
    /// Implicit call registering a finalizable object.
    Finalize,
}

impl From<InvokeKind> for CallKind {
    fn from(kind: InvokeKind) -> Self {
        match kind {
            InvokeKind::Static => CallKind::Static,
            InvokeKind::Virtual => CallKind::Virtual,
            InvokeKind::Interface => CallKind::Interface,
            InvokeKind::Special => CallKind::Special,
            InvokeKind::Dynamic => CallKind::Dynamic,
        }
    }
}

pub type BaseCallSite = BaseCallSiteS<MethodId>;
pub type CSBaseCallSite = BaseCallSiteS<CSMethodId>;

/// What a call site stands for at its statement. Implicit calls get their own
/// site so they never show up as callees of an invoke on the same statement.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum SiteKind {
    /// The invoke statement itself.
    Invoke,
    /// A static initializer triggered by the statement.
    Clinit,
    /// A finalizable object allocated by the statement.
    Finalize,
}

/// A statement of a method, identified by its index in the method body.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BaseCallSiteS<F> {
    pub method: F,
    pub stmt: usize,
    pub site_kind: SiteKind,
}

impl<F> BaseCallSiteS<F> {
    pub fn new(method: F, stmt: usize) -> Self {
        BaseCallSiteS {
            method,
            stmt,
            site_kind: SiteKind::Invoke,
        }
    }

    pub fn new_implicit(method: F, stmt: usize, site_kind: SiteKind) -> Self {
        BaseCallSiteS { method, stmt, site_kind }
    }

    #[inline]
    pub fn is_invoke(&self) -> bool {
        self.site_kind == SiteKind::Invoke
    }
}

impl From<CSBaseCallSite> for BaseCallSite {
    fn from(callsite: CSBaseCallSite) -> Self {
        BaseCallSiteS {
            method: callsite.method.method,
            stmt: callsite.stmt,
            site_kind: callsite.site_kind,
        }
    }
}

impl From<&CSBaseCallSite> for BaseCallSite {
    fn from(callsite: &CSBaseCallSite) -> Self {
        BaseCallSite::from(*callsite)
    }
}

/// An instance call whose targets depend on the points-to set of its receiver.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct VirtualCallSite {
    pub receiver: PAGNodeId,
    pub callsite: CSBaseCallSite,
    pub kind: InvokeKind,
    pub declared_class: ClassId,
    pub sub_signature: String,
}

impl VirtualCallSite {
    pub fn new(receiver: PAGNodeId, callsite: CSBaseCallSite, expr: &InvokeExpr) -> Self {
        VirtualCallSite {
            receiver,
            callsite,
            kind: expr.kind,
            declared_class: expr.class,
            sub_signature: expr.sub_signature.clone(),
        }
    }
}

/// A statement that may raise the objects pointed to by `throw_node`: either a
/// `throw` or an invoke whose callees may throw.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ExceptionThrowSite {
    pub throw_node: PAGNodeId,
    pub method: CSMethodId,
    pub stmt: usize,
}

impl ExceptionThrowSite {
    pub fn new(throw_node: PAGNodeId, method: CSMethodId, stmt: usize) -> Self {
        ExceptionThrowSite {
            throw_node,
            method,
            stmt,
        }
    }
}
