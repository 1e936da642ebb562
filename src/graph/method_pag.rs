// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::rc::Rc;

use crate::errors::{PtaError, PtaResult};
use crate::ir::path::Path;
use crate::ir::program::{AllocKind, FieldSig, InvokeKind, LocalId, MethodId, Program, Stmt, Type};

/// A tuple type consisting of source path and destination path. The edge kind
/// is derived from the endpoints once they are parameterized.
pub type InternalEdge = (Rc<Path>, Rc<Path>);

/// The context-free constraint template of one method body. It is built once
/// and materialized under every context the method becomes reachable in.
#[derive(Debug)]
pub struct MethodPAG {
    pub(crate) method: MethodId,
    pub(crate) internal_edges: Vec<InternalEdge>,
    /// Indexes of the invoke statements, resolved when the template is materialized.
    pub(crate) invoke_stmts: Vec<usize>,
    /// Indexes of the statements that may raise an exception.
    pub(crate) throw_stmts: Vec<usize>,
    /// Static initializers triggered by the body with the statement first
    /// triggering them, in first-use order.
    pub(crate) clinits: Vec<(usize, MethodId)>,
    /// Allocations of objects overriding `finalize()`.
    pub(crate) finalizable_allocs: Vec<(usize, Rc<Path>)>,
}

impl MethodPAG {
    pub fn new(method: MethodId) -> Self {
        MethodPAG {
            method,
            internal_edges: Vec::new(),
            invoke_stmts: Vec::new(),
            throw_stmts: Vec::new(),
            clinits: Vec::new(),
            finalizable_allocs: Vec::new(),
        }
    }

    /// Parses the statements of `method` into edge templates.
    pub fn build(program: &Program, method: MethodId) -> PtaResult<Self> {
        let body = program.method(method).body.as_ref().ok_or_else(|| {
            PtaError::malformed(format!("{} has no body", program.method_name(method)))
        })?;
        let mut mpag = MethodPAG::new(method);
        let local = |l: LocalId| Path::new_local(method, l);

        for (index, stmt) in body.stmts.iter().enumerate() {
            match stmt {
                Stmt::Assign { lhs, rhs } | Stmt::Cast { lhs, rhs, .. } => {
                    mpag.add_internal_edge(local(*rhs), local(*lhs));
                }
                Stmt::New { lhs, ty, kind } => {
                    let heap = Path::new_heap_obj(method, index, ty.clone(), *kind);
                    if let Type::Class(class) = ty {
                        mpag.add_clinits(index, program.clinits_of(*class));
                        if *kind == AllocKind::Object && program.overrides_finalize(*class) {
                            mpag.finalizable_allocs.push((index, heap.clone()));
                        }
                    }
                    mpag.add_internal_edge(heap, local(*lhs));
                }
                Stmt::Load { lhs, base, field } => {
                    let field_ref = Path::new_field_ref(local(*base), FieldSig::Field(*field));
                    mpag.add_internal_edge(field_ref, local(*lhs));
                }
                Stmt::Store { base, field, rhs } => {
                    let field_ref = Path::new_field_ref(local(*base), FieldSig::Field(*field));
                    mpag.add_internal_edge(local(*rhs), field_ref);
                }
                Stmt::ArrayLoad { lhs, base } => {
                    let field_ref = Path::new_field_ref(local(*base), FieldSig::ArrayElement);
                    mpag.add_internal_edge(field_ref, local(*lhs));
                }
                Stmt::ArrayStore { base, rhs } => {
                    let field_ref = Path::new_field_ref(local(*base), FieldSig::ArrayElement);
                    mpag.add_internal_edge(local(*rhs), field_ref);
                }
                Stmt::StaticLoad { lhs, field } => {
                    mpag.add_clinits(index, program.clinits_of(program.field(*field).class));
                    mpag.add_internal_edge(Path::new_static_field(*field), local(*lhs));
                }
                Stmt::StaticStore { field, rhs } => {
                    mpag.add_clinits(index, program.clinits_of(program.field(*field).class));
                    mpag.add_internal_edge(local(*rhs), Path::new_static_field(*field));
                }
                Stmt::Invoke { expr, .. } => {
                    if expr.kind == InvokeKind::Static {
                        mpag.add_clinits(index, program.clinits_of(expr.class));
                    }
                    mpag.invoke_stmts.push(index);
                    mpag.throw_stmts.push(index);
                }
                Stmt::Throw { .. } => mpag.throw_stmts.push(index),
                Stmt::Return { op: Some(op) } => {
                    mpag.add_internal_edge(local(*op), Path::new_return_value(method));
                }
                Stmt::Return { op: None } | Stmt::Nop => {}
            }
        }
        Ok(mpag)
    }

    pub fn add_internal_edge(&mut self, src: Rc<Path>, dst: Rc<Path>) {
        self.internal_edges.push((src, dst));
    }

    fn add_clinits(&mut self, stmt: usize, clinits: Vec<MethodId>) {
        for clinit in clinits {
            // A class initializer never triggers itself.
            if clinit != self.method && !self.clinits.iter().any(|(_, c)| *c == clinit) {
                self.clinits.push((stmt, clinit));
            }
        }
    }

    #[inline]
    pub fn method(&self) -> MethodId {
        self.method
    }

    pub fn internal_edges(&self) -> &[InternalEdge] {
        &self.internal_edges
    }

    pub fn invoke_stmts(&self) -> &[usize] {
        &self.invoke_stmts
    }

    pub fn throw_stmts(&self) -> &[usize] {
        &self.throw_stmts
    }

    pub fn clinits(&self) -> &[(usize, MethodId)] {
        &self.clinits
    }

    pub fn finalizable_allocs(&self) -> &[(usize, Rc<Path>)] {
        &self.finalizable_allocs
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::path::PathEnum;
    use crate::ir::program::{InvokeExpr, ProgramBuilder, CLINIT_SUB_SIGNATURE, FINALIZE_SUB_SIGNATURE};

    #[test]
    fn statements_become_edge_templates() {
        let mut pb = ProgramBuilder::new();
        let object = pb.add_class("java.lang.Object", None);
        pb.set_object_class(object);
        let a = pb.add_class("A", Some(object));
        let f = pb.add_field(a, "f", false);
        let main = pb.add_method(a, "main", "void main()", true);
        let x = pb.add_local(main, "x");
        let y = pb.add_local(main, "y");
        pb.push_stmt(main, Stmt::New { lhs: x, ty: Type::Class(a), kind: AllocKind::Object });
        pb.push_stmt(main, Stmt::Store { base: x, field: f, rhs: x });
        pb.push_stmt(main, Stmt::Load { lhs: y, base: x, field: f });
        pb.push_stmt(main, Stmt::Throw { op: y });
        pb.push_stmt(main, Stmt::Return { op: Some(y) });
        let program = pb.build().unwrap();

        let mpag = MethodPAG::build(&program, main).unwrap();
        let edges = mpag.internal_edges();
        assert_eq!(edges.len(), 4);
        assert!(edges[0].0.is_heap());
        assert_eq!(edges[0].1, Path::new_local(main, x));
        assert!(matches!(edges[1].1.value, PathEnum::FieldRef { .. }));
        assert!(matches!(edges[2].0.value, PathEnum::FieldRef { .. }));
        assert_eq!(edges[3].1, Path::new_return_value(main));
        assert_eq!(mpag.throw_stmts(), &[3]);
        assert!(mpag.invoke_stmts().is_empty());
    }

    #[test]
    fn clinits_and_finalizable_allocations_are_collected() {
        let mut pb = ProgramBuilder::new();
        let object = pb.add_class("java.lang.Object", None);
        pb.set_object_class(object);
        pb.add_method(object, "finalize", FINALIZE_SUB_SIGNATURE, false);
        let a = pb.add_class("A", Some(object));
        let b = pb.add_class("B", Some(a));
        let a_clinit = pb.add_method(a, "<clinit>", CLINIT_SUB_SIGNATURE, true);
        let b_clinit = pb.add_method(b, "<clinit>", CLINIT_SUB_SIGNATURE, true);
        pb.add_method(b, "finalize", FINALIZE_SUB_SIGNATURE, false);
        let s = pb.add_field(a, "s", true);
        let foo = pb.add_method(b, "foo", "void foo()", true);

        let main = pb.add_method(object, "main", "void main()", true);
        let x = pb.add_local(main, "x");
        pb.push_stmt(main, Stmt::StaticLoad { lhs: x, field: s });
        pb.push_stmt(main, Stmt::New { lhs: x, ty: Type::Class(b), kind: AllocKind::Object });
        let call = InvokeExpr {
            kind: InvokeKind::Static,
            class: b,
            sub_signature: "void foo()".to_string(),
            base: None,
            args: vec![],
        };
        pb.push_stmt(main, Stmt::Invoke { lhs: None, expr: call });
        let program = pb.build().unwrap();
        assert_eq!(program.resolve_static(b, "void foo()"), Some(foo));

        let mpag = MethodPAG::build(&program, main).unwrap();
        assert_eq!(mpag.clinits(), &[(0, a_clinit), (1, b_clinit)]);
        assert_eq!(mpag.invoke_stmts(), &[2]);
        assert_eq!(mpag.throw_stmts(), &[2]);
        assert_eq!(mpag.finalizable_allocs().len(), 1);
        assert_eq!(mpag.finalizable_allocs()[0].0, 1);
    }

    #[test]
    fn phantom_methods_have_no_template() {
        let mut pb = ProgramBuilder::new();
        let object = pb.add_class("java.lang.Object", None);
        let native = pb.add_phantom_method(object, "hashCode", "int hashCode()", false);
        let program = pb.build().unwrap();
        assert!(matches!(
            MethodPAG::build(&program, native),
            Err(PtaError::MalformedProgram(_))
        ));
    }
}
