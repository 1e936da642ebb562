// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Classes, methods and statements of the analyzed program, together with
//! the class hierarchy queries the solver needs for dispatch.
//!
//! A `Program` is owned by the caller of the analysis and handed to every
//! component by reference. Front ends either assemble one with
//! `ProgramBuilder` or deserialize it from JSON.

use std::collections::{HashMap, HashSet, VecDeque};
use std::convert::TryFrom;
use std::fs;

use serde::{Deserialize, Serialize};

use crate::errors::{PtaError, PtaResult};

pub const CLINIT_SUB_SIGNATURE: &str = "void <clinit>()";
pub const FINALIZE_SUB_SIGNATURE: &str = "void finalize()";

index_type!(
    /// Index of a class (or interface) in `Program::classes`.
    ClassId
);
index_type!(
    /// Index of a field in `Program::fields`.
    FieldId
);
index_type!(
    /// Index of a method in `Program::methods`.
    MethodId
);
index_type!(
    /// Index of a local variable in the enclosing method body.
    LocalId
);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Class(ClassId),
    Array(Box<Type>),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocKind {
    #[default]
    Object,
    Array,
    /// A zero-length array. All of them share one abstract object.
    EmptyArray,
    StringConstant,
}

/// The field part of a field access. All array elements are modelled as one
/// pseudo field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSig {
    Field(FieldId),
    ArrayElement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    #[serde(default)]
    pub super_class: Option<ClassId>,
    #[serde(default)]
    pub interfaces: Vec<ClassId>,
    #[serde(default)]
    pub is_interface: bool,
    #[serde(default)]
    pub is_abstract: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub class: ClassId,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub class: ClassId,
    pub sub_signature: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_abstract: bool,
    /// `None` for abstract, native and other phantom methods.
    #[serde(default)]
    pub body: Option<Body>,
}

impl Method {
    #[inline]
    pub fn is_phantom(&self) -> bool {
        self.body.is_none()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub locals: Vec<String>,
    #[serde(default)]
    pub this_local: Option<LocalId>,
    #[serde(default)]
    pub params: Vec<LocalId>,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
    #[serde(default)]
    pub traps: Vec<Trap>,
}

impl Body {
    pub fn local_name(&self, local: LocalId) -> &str {
        self.locals.get(local.index()).map_or("?", |s| s.as_str())
    }

    /// Traps protecting `stmt`, in declaration order.
    pub fn traps_covering(&self, stmt: usize) -> impl Iterator<Item = &Trap> {
        self.traps.iter().filter(move |trap| trap.covers(stmt))
    }
}

/// A catch clause protecting the statements in `[begin, end)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trap {
    pub begin: usize,
    pub end: usize,
    pub exception: ClassId,
    pub handler: LocalId,
}

impl Trap {
    #[inline]
    pub fn covers(&self, stmt: usize) -> bool {
        self.begin <= stmt && stmt < self.end
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
    Dynamic,
}

impl InvokeKind {
    /// Instance invocations are dispatched on the points-to set of their receiver.
    #[inline]
    pub fn is_instance(self) -> bool {
        matches!(self, InvokeKind::Virtual | InvokeKind::Interface | InvokeKind::Special)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeExpr {
    pub kind: InvokeKind,
    /// The class the invoked method is declared on at the call site.
    pub class: ClassId,
    pub sub_signature: String,
    #[serde(default)]
    pub base: Option<LocalId>,
    #[serde(default)]
    pub args: Vec<LocalId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
    Assign { lhs: LocalId, rhs: LocalId },
    Cast { lhs: LocalId, rhs: LocalId, ty: Type },
    New {
        lhs: LocalId,
        ty: Type,
        #[serde(default)]
        kind: AllocKind,
    },
    Load { lhs: LocalId, base: LocalId, field: FieldId },
    Store { base: LocalId, field: FieldId, rhs: LocalId },
    ArrayLoad { lhs: LocalId, base: LocalId },
    ArrayStore { base: LocalId, rhs: LocalId },
    StaticLoad { lhs: LocalId, field: FieldId },
    StaticStore { field: FieldId, rhs: LocalId },
    Invoke {
        #[serde(default)]
        lhs: Option<LocalId>,
        expr: InvokeExpr,
    },
    Throw { op: LocalId },
    Return {
        #[serde(default)]
        op: Option<LocalId>,
    },
    Nop,
}

/// Result of resolving an instance call against one receiver type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Target(MethodId),
    /// The receiver type cannot flow into the declared class; the object is
    /// filtered out silently.
    Incompatible,
    Unresolved,
}

/// The serialized form of a program.
#[derive(Debug, Default, Deserialize)]
pub struct ProgramData {
    #[serde(default)]
    classes: Vec<Class>,
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    methods: Vec<Method>,
    #[serde(default)]
    entry_points: Vec<MethodId>,
    #[serde(default)]
    object_class: Option<ClassId>,
    #[serde(default)]
    finalizer_register: Option<MethodId>,
}

#[derive(Debug, Deserialize)]
#[serde(try_from = "ProgramData")]
pub struct Program {
    classes: Vec<Class>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    entry_points: Vec<MethodId>,
    object_class: Option<ClassId>,
    finalizer_register: Option<MethodId>,
    /// (declaring class, sub-signature) -> method.
    declared_methods: HashMap<(ClassId, String), MethodId>,
}

impl TryFrom<ProgramData> for Program {
    type Error = PtaError;

    fn try_from(data: ProgramData) -> PtaResult<Self> {
        data.validate()?;
        let mut declared_methods = HashMap::new();
        for (i, method) in data.methods.iter().enumerate() {
            let key = (method.class, method.sub_signature.clone());
            if declared_methods.insert(key, MethodId::new(i)).is_some() {
                return Err(PtaError::malformed(format!(
                    "duplicate method `{}` in class {}",
                    method.sub_signature, data.classes[method.class.index()].name
                )));
            }
        }
        Ok(Program {
            classes: data.classes,
            fields: data.fields,
            methods: data.methods,
            entry_points: data.entry_points,
            object_class: data.object_class,
            finalizer_register: data.finalizer_register,
            declared_methods,
        })
    }
}

impl ProgramData {
    fn validate(&self) -> PtaResult<()> {
        for class in &self.classes {
            if let Some(super_class) = class.super_class {
                self.check_class(super_class, &class.name)?;
            }
            for iface in &class.interfaces {
                self.check_class(*iface, &class.name)?;
            }
        }
        for (i, class) in self.classes.iter().enumerate() {
            let mut depth = 0;
            let mut current = class.super_class;
            while let Some(super_class) = current {
                depth += 1;
                if super_class.index() == i || depth > self.classes.len() {
                    return Err(PtaError::malformed(format!("cyclic super classes of `{}`", class.name)));
                }
                current = self.classes[super_class.index()].super_class;
            }
        }
        for field in &self.fields {
            self.check_class(field.class, &field.name)?;
        }
        for method in &self.methods {
            self.check_class(method.class, &method.name)?;
            if let Some(body) = &method.body {
                self.check_body(method, body)?;
            }
        }
        for entry in self.entry_points.iter().chain(self.finalizer_register.iter()) {
            if entry.index() >= self.methods.len() {
                return Err(PtaError::malformed(format!("unknown method {:?}", entry)));
            }
        }
        if let Some(object) = self.object_class {
            self.check_class(object, "object class")?;
        }
        Ok(())
    }

    fn check_class(&self, class: ClassId, user: &str) -> PtaResult<()> {
        if class.index() < self.classes.len() {
            Ok(())
        } else {
            Err(PtaError::malformed(format!("`{}` refers to unknown {:?}", user, class)))
        }
    }

    fn check_type(&self, ty: &Type, user: &str) -> PtaResult<()> {
        match ty {
            Type::Class(class) => self.check_class(*class, user),
            Type::Array(elem) => self.check_type(elem, user),
        }
    }

    fn check_field(&self, field: FieldId, user: &str) -> PtaResult<()> {
        if field.index() < self.fields.len() {
            Ok(())
        } else {
            Err(PtaError::malformed(format!("`{}` refers to unknown {:?}", user, field)))
        }
    }

    fn check_body(&self, method: &Method, body: &Body) -> PtaResult<()> {
        let user = method.name.as_str();
        let check_local = |local: LocalId| -> PtaResult<()> {
            if local.index() < body.locals.len() {
                Ok(())
            } else {
                Err(PtaError::malformed(format!("`{}` refers to unknown {:?}", user, local)))
            }
        };
        if method.is_static == body.this_local.is_some() {
            return Err(PtaError::malformed(format!(
                "`{}` must declare a `this` local iff it is an instance method",
                user
            )));
        }
        for local in body.this_local.iter().chain(body.params.iter()) {
            check_local(*local)?;
        }
        for trap in &body.traps {
            self.check_class(trap.exception, user)?;
            check_local(trap.handler)?;
        }
        for stmt in &body.stmts {
            match stmt {
                Stmt::Assign { lhs, rhs } => {
                    check_local(*lhs)?;
                    check_local(*rhs)?;
                }
                Stmt::Cast { lhs, rhs, ty } => {
                    check_local(*lhs)?;
                    check_local(*rhs)?;
                    self.check_type(ty, user)?;
                }
                Stmt::New { lhs, ty, .. } => {
                    check_local(*lhs)?;
                    self.check_type(ty, user)?;
                }
                Stmt::Load { lhs, base, field } | Stmt::Store { base, field, rhs: lhs } => {
                    check_local(*lhs)?;
                    check_local(*base)?;
                    self.check_field(*field, user)?;
                }
                Stmt::ArrayLoad { lhs, base } | Stmt::ArrayStore { base, rhs: lhs } => {
                    check_local(*lhs)?;
                    check_local(*base)?;
                }
                Stmt::StaticLoad { lhs, field } | Stmt::StaticStore { field, rhs: lhs } => {
                    check_local(*lhs)?;
                    self.check_field(*field, user)?;
                }
                Stmt::Invoke { lhs, expr } => {
                    for local in lhs.iter().chain(expr.base.iter()).chain(expr.args.iter()) {
                        check_local(*local)?;
                    }
                    self.check_class(expr.class, user)?;
                    if expr.kind.is_instance() && expr.base.is_none() {
                        return Err(PtaError::malformed(format!(
                            "instance invoke of `{}` in `{}` has no receiver",
                            expr.sub_signature, user
                        )));
                    }
                }
                Stmt::Throw { op } => check_local(*op)?,
                Stmt::Return { op } => {
                    if let Some(op) = op {
                        check_local(*op)?;
                    }
                }
                Stmt::Nop => {}
            }
        }
        Ok(())
    }
}

impl Program {
    pub fn from_json(json: &str) -> PtaResult<Program> {
        let data: ProgramData = serde_json::from_str(json)?;
        Program::try_from(data)
    }

    pub fn from_json_file(path: &std::path::Path) -> PtaResult<Program> {
        let json = fs::read_to_string(path)?;
        Program::from_json(&json)
    }

    #[inline]
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    #[inline]
    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> {
        (0..self.classes.len()).map(ClassId::new)
    }

    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> {
        (0..self.methods.len()).map(MethodId::new)
    }

    #[inline]
    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn entry_points(&self) -> &[MethodId] {
        &self.entry_points
    }

    pub fn object_class(&self) -> Option<ClassId> {
        self.object_class
    }

    pub fn finalizer_register(&self) -> Option<MethodId> {
        self.finalizer_register
    }

    pub fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.classes.iter().position(|c| c.name == name).map(ClassId::new)
    }

    /// Returns the method with `sub_signature` declared directly in `class`.
    pub fn declared_method(&self, class: ClassId, sub_signature: &str) -> Option<MethodId> {
        self.declared_methods.get(&(class, sub_signature.to_string())).copied()
    }

    pub fn method_name(&self, id: MethodId) -> String {
        let method = self.method(id);
        format!("<{}: {}>", self.class(method.class).name, method.sub_signature)
    }

    pub fn field_name(&self, id: FieldId) -> String {
        let field = self.field(id);
        format!("{}.{}", self.class(field.class).name, field.name)
    }

    /// Iterates over `class` and its super classes, closest first.
    pub fn super_chain(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(Some(class), move |c| self.class(*c).super_class)
    }

    /// Returns true if `sub` is `sup` or inherits from it through super classes or interfaces.
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup || Some(sup) == self.object_class {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([sub]);
        while let Some(class) = queue.pop_front() {
            if class == sup {
                return true;
            }
            if !visited.insert(class) {
                continue;
            }
            let class = self.class(class);
            queue.extend(class.super_class);
            queue.extend(class.interfaces.iter().copied());
        }
        false
    }

    /// The class whose methods an object of type `ty` dispatches to. Arrays
    /// behave like the root object class.
    pub fn dispatch_class(&self, ty: &Type) -> Option<ClassId> {
        match ty {
            Type::Class(class) => Some(*class),
            Type::Array(_) => self.object_class,
        }
    }

    /// Resolves a static, special or dynamic invocation by looking up the
    /// declared class and its super classes.
    pub fn resolve_static(&self, class: ClassId, sub_signature: &str) -> Option<MethodId> {
        self.super_chain(class)
            .find_map(|c| self.declared_method(c, sub_signature))
    }

    /// Resolves a virtual or interface invocation on an object of `runtime` class
    /// to the first non-abstract implementation, falling back to default methods
    /// of implemented interfaces.
    pub fn resolve_virtual(&self, runtime: ClassId, sub_signature: &str) -> Option<MethodId> {
        let concrete = |m: &MethodId| !self.method(*m).is_abstract;
        if let Some(target) = self
            .super_chain(runtime)
            .filter_map(|c| self.declared_method(c, sub_signature))
            .find(concrete)
        {
            return Some(target);
        }
        let mut visited = HashSet::new();
        let mut queue: VecDeque<ClassId> = self
            .super_chain(runtime)
            .flat_map(|c| self.class(c).interfaces.iter().copied())
            .collect();
        while let Some(iface) = queue.pop_front() {
            if !visited.insert(iface) {
                continue;
            }
            if let Some(target) = self.declared_method(iface, sub_signature).filter(concrete) {
                return Some(target);
            }
            queue.extend(self.class(iface).interfaces.iter().copied());
        }
        None
    }

    /// Resolves an instance invocation against the runtime type of one receiver object.
    pub fn resolve_instance_call(&self, receiver: &Type, expr: &InvokeExpr) -> Dispatch {
        let runtime = match self.dispatch_class(receiver) {
            Some(class) => class,
            None => return Dispatch::Unresolved,
        };
        if !self.is_subclass(runtime, expr.class) {
            return Dispatch::Incompatible;
        }
        let target = match expr.kind {
            InvokeKind::Virtual | InvokeKind::Interface => {
                self.resolve_virtual(runtime, &expr.sub_signature)
            }
            InvokeKind::Special | InvokeKind::Static | InvokeKind::Dynamic => {
                self.resolve_static(expr.class, &expr.sub_signature)
            }
        };
        target.map_or(Dispatch::Unresolved, Dispatch::Target)
    }

    /// Static initializers that run before `class` is first used, outermost super class first.
    pub fn clinits_of(&self, class: ClassId) -> Vec<MethodId> {
        let mut clinits: Vec<MethodId> = self
            .super_chain(class)
            .filter_map(|c| self.declared_method(c, CLINIT_SUB_SIGNATURE))
            .collect();
        clinits.reverse();
        clinits
    }

    pub fn all_clinits(&self) -> Vec<MethodId> {
        self.class_ids()
            .filter_map(|c| self.declared_method(c, CLINIT_SUB_SIGNATURE))
            .collect()
    }

    /// Returns true if objects of `class` override `void finalize()` of the root class.
    pub fn overrides_finalize(&self, class: ClassId) -> bool {
        match self.resolve_virtual(class, FINALIZE_SUB_SIGNATURE) {
            Some(finalize) => Some(self.method(finalize).class) != self.object_class,
            None => false,
        }
    }
}

/// Assembles a `Program` in memory.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    data: ProgramData,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, name: &str, super_class: Option<ClassId>) -> ClassId {
        self.data.classes.push(Class {
            name: name.to_string(),
            super_class,
            interfaces: Vec::new(),
            is_interface: false,
            is_abstract: false,
        });
        ClassId::new(self.data.classes.len() - 1)
    }

    pub fn add_interface(&mut self, name: &str) -> ClassId {
        let iface = self.add_class(name, None);
        let class = &mut self.data.classes[iface.index()];
        class.is_interface = true;
        class.is_abstract = true;
        iface
    }

    /// Registers the root class every other class and every array inherits from.
    pub fn set_object_class(&mut self, class: ClassId) {
        self.data.object_class = Some(class);
    }

    pub fn add_implemented_interface(&mut self, class: ClassId, iface: ClassId) {
        self.data.classes[class.index()].interfaces.push(iface);
    }

    pub fn add_field(&mut self, class: ClassId, name: &str, is_static: bool) -> FieldId {
        self.data.fields.push(Field {
            name: name.to_string(),
            class,
            is_static,
        });
        FieldId::new(self.data.fields.len() - 1)
    }

    /// Adds a method with an empty body. Instance methods get a `this` local.
    pub fn add_method(&mut self, class: ClassId, name: &str, sub_signature: &str, is_static: bool) -> MethodId {
        let mut body = Body::default();
        if !is_static {
            body.locals.push("this".to_string());
            body.this_local = Some(LocalId::new(0));
        }
        self.push_method(class, name, sub_signature, is_static, false, Some(body))
    }

    pub fn add_abstract_method(&mut self, class: ClassId, name: &str, sub_signature: &str) -> MethodId {
        self.push_method(class, name, sub_signature, false, true, None)
    }

    /// Adds a method without a body, e.g. a native method.
    pub fn add_phantom_method(&mut self, class: ClassId, name: &str, sub_signature: &str, is_static: bool) -> MethodId {
        self.push_method(class, name, sub_signature, is_static, false, None)
    }

    fn push_method(
        &mut self,
        class: ClassId,
        name: &str,
        sub_signature: &str,
        is_static: bool,
        is_abstract: bool,
        body: Option<Body>,
    ) -> MethodId {
        self.data.methods.push(Method {
            name: name.to_string(),
            class,
            sub_signature: sub_signature.to_string(),
            is_static,
            is_abstract,
            body,
        });
        MethodId::new(self.data.methods.len() - 1)
    }

    fn body_mut(&mut self, method: MethodId) -> &mut Body {
        self.data.methods[method.index()]
            .body
            .get_or_insert_with(Body::default)
    }

    pub fn this_local(&self, method: MethodId) -> Option<LocalId> {
        self.data.methods[method.index()]
            .body
            .as_ref()
            .and_then(|body| body.this_local)
    }

    pub fn add_local(&mut self, method: MethodId, name: &str) -> LocalId {
        let body = self.body_mut(method);
        body.locals.push(name.to_string());
        LocalId::new(body.locals.len() - 1)
    }

    pub fn add_param(&mut self, method: MethodId, name: &str) -> LocalId {
        let local = self.add_local(method, name);
        self.body_mut(method).params.push(local);
        local
    }

    /// Appends a statement and returns its index in the body.
    pub fn push_stmt(&mut self, method: MethodId, stmt: Stmt) -> usize {
        let body = self.body_mut(method);
        body.stmts.push(stmt);
        body.stmts.len() - 1
    }

    pub fn add_trap(&mut self, method: MethodId, trap: Trap) {
        self.body_mut(method).traps.push(trap);
    }

    pub fn add_entry_point(&mut self, method: MethodId) {
        self.data.entry_points.push(method);
    }

    pub fn set_finalizer_register(&mut self, method: MethodId) {
        self.data.finalizer_register = Some(method);
    }

    pub fn build(self) -> PtaResult<Program> {
        Program::try_from(self.data)
    }
}
