// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

use super::program::{AllocKind, FieldSig, FieldId, LocalId, MethodId, Program, Type};

/// A context-free pointer or memory location appearing in a method body:
/// a local variable, a heap object, a field reference, ...
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub value: PathEnum,
}

impl Debug for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.value.fmt(f)
    }
}

/// Different kinds of `Path` used in our analysis.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PathEnum {
    LocalVariable {
        method: MethodId,
        local: LocalId,
    },

    /// The value returned by a method.
    ReturnValue {
        method: MethodId,
    },

    /// Exceptions escaping a method.
    MethodThrow {
        method: MethodId,
    },

    /// Exceptions raised by the callees of one invoke statement.
    InvokeThrow {
        method: MethodId,
        stmt: usize,
    },

    StaticField {
        field: FieldId,
    },

    /// An object allocated at statement `site` of `method`.
    HeapObj {
        method: MethodId,
        site: usize,
        ty: Type,
        kind: AllocKind,
    },

    /// The one abstract object standing for every zero-length array.
    EmptyArray,

    /// `base.field`, where base is a local variable.
    FieldRef {
        base: Rc<Path>,
        field: FieldSig,
    },
}

impl Path {
    pub fn new(value: PathEnum) -> Rc<Path> {
        Rc::new(Path { value })
    }

    pub fn new_local(method: MethodId, local: LocalId) -> Rc<Path> {
        Path::new(PathEnum::LocalVariable { method, local })
    }

    pub fn new_return_value(method: MethodId) -> Rc<Path> {
        Path::new(PathEnum::ReturnValue { method })
    }

    pub fn new_method_throw(method: MethodId) -> Rc<Path> {
        Path::new(PathEnum::MethodThrow { method })
    }

    pub fn new_invoke_throw(method: MethodId, stmt: usize) -> Rc<Path> {
        Path::new(PathEnum::InvokeThrow { method, stmt })
    }

    pub fn new_static_field(field: FieldId) -> Rc<Path> {
        Path::new(PathEnum::StaticField { field })
    }

    pub fn new_heap_obj(method: MethodId, site: usize, ty: Type, kind: AllocKind) -> Rc<Path> {
        if kind == AllocKind::EmptyArray {
            return Path::new(PathEnum::EmptyArray);
        }
        Path::new(PathEnum::HeapObj { method, site, ty, kind })
    }

    pub fn new_field_ref(base: Rc<Path>, field: FieldSig) -> Rc<Path> {
        Path::new(PathEnum::FieldRef { base, field })
    }

    #[inline]
    pub fn is_heap(&self) -> bool {
        matches!(self.value, PathEnum::HeapObj { .. } | PathEnum::EmptyArray)
    }

    #[inline]
    pub fn is_empty_array(&self) -> bool {
        matches!(self.value, PathEnum::EmptyArray)
    }

    /// Static fields are global and never qualified by a context.
    #[inline]
    pub fn is_global(&self) -> bool {
        matches!(self.value, PathEnum::StaticField { .. } | PathEnum::EmptyArray)
    }

    /// Returns the runtime type of a heap object.
    pub fn heap_type(&self, program: &Program) -> Option<Type> {
        match &self.value {
            PathEnum::HeapObj { ty, .. } => Some(ty.clone()),
            PathEnum::EmptyArray => program
                .object_class()
                .map(|object| Type::Array(Box::new(Type::Class(object)))),
            _ => None,
        }
    }

    /// Returns the allocation site of a heap object.
    pub fn alloc_site(&self) -> Option<(MethodId, usize)> {
        match &self.value {
            PathEnum::HeapObj { method, site, .. } => Some((*method, *site)),
            _ => None,
        }
    }

    /// Renders the path with program names, e.g. `<A: void m()>/x.f`.
    pub fn display(&self, program: &Program) -> String {
        let local_name = |method: MethodId, local: LocalId| {
            program
                .method(method)
                .body
                .as_ref()
                .map_or_else(|| format!("{:?}", local), |b| b.local_name(local).to_string())
        };
        match &self.value {
            PathEnum::LocalVariable { method, local } => {
                format!("{}/{}", program.method_name(*method), local_name(*method, *local))
            }
            PathEnum::ReturnValue { method } => format!("{}/@return", program.method_name(*method)),
            PathEnum::MethodThrow { method } => format!("{}/@throw", program.method_name(*method)),
            PathEnum::InvokeThrow { method, stmt } => {
                format!("{}/@throw#{}", program.method_name(*method), stmt)
            }
            PathEnum::StaticField { field } => program.field_name(*field),
            PathEnum::HeapObj { method, site, .. } => {
                format!("new@{}#{}", program.method_name(*method), site)
            }
            PathEnum::EmptyArray => "new[0]".to_string(),
            PathEnum::FieldRef { base, field } => match field {
                FieldSig::Field(f) => format!("{}.{}", base.display(program), program.field(*f).name),
                FieldSig::ArrayElement => format!("{}[*]", base.display(program)),
            },
        }
    }
}
