// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! End-to-end solver scenarios on small hand-built programs.

use std::collections::HashSet;
use std::rc::Rc;

use super::context_sensitive::ContextSensitivePTA;
use super::context_strategy::{ContextInsensitive, ContextStrategy, KCallSiteSensitive, KObjectSensitive};
use super::{NodeId, PointerAnalysis, PointsTo};
use crate::errors::PtaError;
use crate::ir::call_site::{CallKind, SiteKind};
use crate::ir::context::ContextId;
use crate::ir::path::Path;
use crate::ir::program::{
    AllocKind, ClassId, FieldId, InvokeExpr, InvokeKind, LocalId, MethodId, Program, ProgramBuilder, Stmt, Trap,
    Type, CLINIT_SUB_SIGNATURE, FINALIZE_SUB_SIGNATURE,
};
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::{AnalysisOptions, ClinitMode};
use crate::util::pta_statistics::call_kind_stat;

fn program_builder() -> (ProgramBuilder, ClassId) {
    let mut pb = ProgramBuilder::new();
    let object = pb.add_class("java.lang.Object", None);
    pb.set_object_class(object);
    (pb, object)
}

fn new_obj(pb: &mut ProgramBuilder, method: MethodId, lhs: LocalId, class: ClassId) -> usize {
    pb.push_stmt(method, Stmt::New { lhs, ty: Type::Class(class), kind: AllocKind::Object })
}

fn call(kind: InvokeKind, class: ClassId, sub_signature: &str, base: Option<LocalId>, args: Vec<LocalId>) -> InvokeExpr {
    InvokeExpr {
        kind,
        class,
        sub_signature: sub_signature.to_string(),
        base,
        args,
    }
}

/// The abstract object allocated at `stmt` of `method`.
fn obj(program: &Program, method: MethodId, stmt: usize) -> Rc<Path> {
    match &program.method(method).body.as_ref().unwrap().stmts[stmt] {
        Stmt::New { ty, kind, .. } => Path::new_heap_obj(method, stmt, ty.clone(), *kind),
        stmt => panic!("not an allocation: {:?}", stmt),
    }
}

fn objs(objs: &[Rc<Path>]) -> HashSet<Rc<Path>> {
    objs.iter().cloned().collect()
}

fn analyze<S: ContextStrategy>(program: &Program, options: AnalysisOptions, strategy: S) -> ContextSensitivePTA<'_, S> {
    let mut pta = ContextSensitivePTA::new(program, options, strategy);
    pta.analyze().unwrap();
    pta
}

fn analyze_ci(program: &Program) -> ContextSensitivePTA<'_, ContextInsensitive> {
    analyze(program, AnalysisOptions::default(), ContextInsensitive::new())
}

#[test]
fn assignments_alias_along_the_chain() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let main = pb.add_method(object, "main", "void main()", true);
    let x = pb.add_local(main, "x");
    let y = pb.add_local(main, "y");
    let z = pb.add_local(main, "z");
    let w = pb.add_local(main, "w");
    let s0 = new_obj(&mut pb, main, x, a);
    pb.push_stmt(main, Stmt::Assign { lhs: y, rhs: x });
    pb.push_stmt(main, Stmt::Cast { lhs: z, rhs: y, ty: Type::Class(a) });
    let s3 = new_obj(&mut pb, main, w, a);
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let pta = analyze_ci(&program);
    let o0 = obj(&program, main, s0);
    assert_eq!(pta.pts_of_local(main, x), objs(&[o0.clone()]));
    assert_eq!(pta.pts_of_local(main, y), objs(&[o0.clone()]));
    assert_eq!(pta.pts_of_local(main, z), objs(&[o0]));
    assert_eq!(pta.pts_of_local(main, w), objs(&[obj(&program, main, s3)]));
    assert_eq!(pta.reachable_methods(), [main].into_iter().collect());
}

#[test]
fn stored_values_are_loaded_through_aliases() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let b = pb.add_class("B", Some(object));
    let f = pb.add_field(a, "f", false);
    let main = pb.add_method(object, "main", "void main()", true);
    let x = pb.add_local(main, "x");
    let v = pb.add_local(main, "v");
    let y = pb.add_local(main, "y");
    let w = pb.add_local(main, "w");
    new_obj(&mut pb, main, x, a);
    let s1 = new_obj(&mut pb, main, v, b);
    pb.push_stmt(main, Stmt::Store { base: x, field: f, rhs: v });
    pb.push_stmt(main, Stmt::Assign { lhs: y, rhs: x });
    pb.push_stmt(main, Stmt::Load { lhs: w, base: y, field: f });
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let pta = analyze_ci(&program);
    assert_eq!(pta.pts_of_local(main, w), objs(&[obj(&program, main, s1)]));
}

#[test]
fn fields_of_distinct_objects_stay_apart() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let b = pb.add_class("B", Some(object));
    let f = pb.add_field(a, "f", false);
    let g = pb.add_field(a, "g", false);
    let main = pb.add_method(object, "main", "void main()", true);
    let [p, q, u, v, r, s, t] = ["p", "q", "u", "v", "r", "s", "t"].map(|name| pb.add_local(main, name));
    new_obj(&mut pb, main, p, a);
    new_obj(&mut pb, main, q, a);
    let s2 = new_obj(&mut pb, main, u, b);
    let s3 = new_obj(&mut pb, main, v, b);
    pb.push_stmt(main, Stmt::Store { base: p, field: f, rhs: u });
    pb.push_stmt(main, Stmt::Store { base: q, field: f, rhs: v });
    pb.push_stmt(main, Stmt::Store { base: p, field: g, rhs: v });
    pb.push_stmt(main, Stmt::Load { lhs: r, base: p, field: f });
    pb.push_stmt(main, Stmt::Load { lhs: s, base: q, field: f });
    pb.push_stmt(main, Stmt::Load { lhs: t, base: p, field: g });
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let pta = analyze_ci(&program);
    let ou = obj(&program, main, s2);
    let ov = obj(&program, main, s3);
    assert_eq!(pta.pts_of_local(main, r), objs(&[ou]));
    assert_eq!(pta.pts_of_local(main, s), objs(&[ov.clone()]));
    assert_eq!(pta.pts_of_local(main, t), objs(&[ov]));
}

#[test]
fn array_elements_share_one_field_and_skip_the_empty_array() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let main = pb.add_method(object, "main", "void main()", true);
    let [arr, e1, e2, v, x, y] = ["arr", "e1", "e2", "v", "x", "y"].map(|name| pb.add_local(main, name));
    let array_ty = Type::Array(Box::new(Type::Class(a)));
    pb.push_stmt(main, Stmt::New { lhs: arr, ty: array_ty.clone(), kind: AllocKind::Array });
    pb.push_stmt(main, Stmt::New { lhs: e1, ty: array_ty.clone(), kind: AllocKind::EmptyArray });
    pb.push_stmt(main, Stmt::New { lhs: e2, ty: array_ty, kind: AllocKind::EmptyArray });
    let s3 = new_obj(&mut pb, main, v, a);
    pb.push_stmt(main, Stmt::ArrayStore { base: arr, rhs: v });
    pb.push_stmt(main, Stmt::ArrayStore { base: e1, rhs: v });
    pb.push_stmt(main, Stmt::ArrayLoad { lhs: x, base: arr });
    pb.push_stmt(main, Stmt::ArrayLoad { lhs: y, base: e2 });
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let pta = analyze_ci(&program);
    assert_eq!(pta.pts_of_local(main, x), objs(&[obj(&program, main, s3)]));
    assert!(pta.pts_of_local(main, y).is_empty());
    // Every empty array is the same object.
    assert_eq!(pta.pts_of_local(main, e1), pta.pts_of_local(main, e2));
    assert_eq!(pta.pts_of_local(main, e1).len(), 1);
}

struct DispatchFixture {
    program: Program,
    main: MethodId,
    a_foo: MethodId,
    b_foo: MethodId,
    c_foo: MethodId,
    call_stmt: usize,
    a_obj: usize,
    b_obj: usize,
}

/// `r` may hold an `A` or a `B`; `C` declares an unrelated `foo`.
fn dispatch_fixture() -> DispatchFixture {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let b = pb.add_class("B", Some(a));
    let c = pb.add_class("C", Some(object));
    let a_foo = pb.add_method(a, "foo", "void foo()", false);
    let b_foo = pb.add_method(b, "foo", "void foo()", false);
    let c_foo = pb.add_method(c, "foo", "void foo()", false);
    let main = pb.add_method(object, "main", "void main()", true);
    let r = pb.add_local(main, "r");
    let unrelated = pb.add_local(main, "c");
    let a_obj = new_obj(&mut pb, main, r, a);
    let b_obj = new_obj(&mut pb, main, r, b);
    new_obj(&mut pb, main, unrelated, c);
    let call_stmt = pb.push_stmt(
        main,
        Stmt::Invoke { lhs: None, expr: call(InvokeKind::Virtual, a, "void foo()", Some(r), vec![]) },
    );
    pb.add_entry_point(main);
    let program = pb.build().unwrap();
    DispatchFixture { program, main, a_foo, b_foo, c_foo, call_stmt, a_obj, b_obj }
}

#[test]
fn virtual_calls_dispatch_on_receiver_objects() {
    let f = dispatch_fixture();
    let pta = analyze_ci(&f.program);

    assert_eq!(pta.callees_of(f.main, f.call_stmt), [f.a_foo, f.b_foo].into_iter().collect());
    assert_eq!(pta.num_call_edges(), 2);
    assert!(!pta.reachable_methods().contains(&f.c_foo));

    // Each callee's `this` only sees the objects dispatched to it.
    let this = LocalId::new(0);
    assert_eq!(pta.pts_of_local(f.a_foo, this), objs(&[obj(&f.program, f.main, f.a_obj)]));
    assert_eq!(pta.pts_of_local(f.b_foo, this), objs(&[obj(&f.program, f.main, f.b_obj)]));
    assert!(pta
        .call_graph()
        .edges()
        .all(|(_, _, _, kind)| kind == CallKind::Virtual));
}

#[test]
fn unresolved_calls_abort_only_in_strict_mode() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let main = pb.add_method(object, "main", "void main()", true);
    let r = pb.add_local(main, "r");
    new_obj(&mut pb, main, r, a);
    let stmt = pb.push_stmt(
        main,
        Stmt::Invoke { lhs: None, expr: call(InvokeKind::Virtual, a, "void bar()", Some(r), vec![]) },
    );
    // Dynamic calls are skipped in both modes, whether or not the declared
    // class has a method with that sub-signature.
    pb.push_stmt(
        main,
        Stmt::Invoke { lhs: None, expr: call(InvokeKind::Dynamic, a, "void lambda()", None, vec![]) },
    );
    let l = pb.add_class("L", Some(object));
    let run = pb.add_method(l, "run", "void run()", true);
    let dynamic_stmt = pb.push_stmt(
        main,
        Stmt::Invoke { lhs: None, expr: call(InvokeKind::Dynamic, l, "void run()", None, vec![]) },
    );
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let mut strict = ContextSensitivePTA::new(&program, AnalysisOptions::default(), ContextInsensitive::new());
    assert!(matches!(strict.analyze(), Err(PtaError::UnresolvedCall { .. })));

    let options = AnalysisOptions {
        ignore_resolution_errors: true,
        ..AnalysisOptions::default()
    };
    let lenient = analyze(&program, options, ContextInsensitive::new());
    assert!(lenient.callees_of(main, stmt).is_empty());
    assert!(lenient.callees_of(main, dynamic_stmt).is_empty());
    assert!(!lenient.reachable_methods().contains(&run));
    assert_eq!(lenient.num_call_edges(), 0);
}

#[test]
fn phantom_callees_get_an_edge_but_no_flow() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let native = pb.add_phantom_method(a, "make", "A make(A)", true);
    let main = pb.add_method(object, "main", "void main()", true);
    let x = pb.add_local(main, "x");
    let y = pb.add_local(main, "y");
    new_obj(&mut pb, main, x, a);
    let stmt = pb.push_stmt(
        main,
        Stmt::Invoke { lhs: Some(y), expr: call(InvokeKind::Static, a, "A make(A)", None, vec![x]) },
    );
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let pta = analyze_ci(&program);
    assert_eq!(pta.callees_of(main, stmt), [native].into_iter().collect());
    assert!(pta.pts_of_local(main, y).is_empty());
    assert!(pta.pag().materialized_contexts(native).is_empty());
}

#[test]
fn methods_are_materialized_once_per_context() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let id = pb.add_method(a, "id", "A id(A)", true);
    let p = pb.add_param(id, "p");
    pb.push_stmt(id, Stmt::Return { op: Some(p) });
    let main = pb.add_method(object, "main", "void main()", true);
    let x = pb.add_local(main, "x");
    let y = pb.add_local(main, "y");
    new_obj(&mut pb, main, x, a);
    for _ in 0..2 {
        pb.push_stmt(
            main,
            Stmt::Invoke { lhs: Some(y), expr: call(InvokeKind::Static, a, "A id(A)", None, vec![x]) },
        );
    }
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let mut pta = analyze_ci(&program);
    assert_eq!(pta.pag().materialized_contexts(id), vec![ContextId::EMPTY]);
    assert_eq!(pta.num_call_edges(), 2);
    let first = pta.pag.get_method_pag(&program, id).unwrap();
    let second = pta.pag.get_method_pag(&program, id).unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    // Replaying every log with a fresh solver changes nothing.
    let num_nodes = pta.pag().node_count();
    let num_edges = pta.pag().edge_count();
    let before: Vec<PointsTo<NodeId>> = (0..num_nodes).map(|i| pta.points_to(NodeId::new(i))).collect();
    pta.propagate().unwrap();
    assert_eq!(pta.pag().node_count(), num_nodes);
    assert_eq!(pta.pag().edge_count(), num_edges);
    assert_eq!(pta.num_call_edges(), 2);
    for (i, pts) in before.iter().enumerate() {
        let after = pta.points_to(NodeId::new(i));
        assert!(after.superset(pts) && pts.superset(&after));
    }

    // Adding an existing edge is a no-op.
    let src = pta.pag.parameterize(&Path::new_local(main, x), ContextId::EMPTY);
    let dst = pta.pag.parameterize(&Path::new_local(main, y), ContextId::EMPTY);
    pta.pag.add_edge(src, dst).unwrap();
    assert_eq!(pta.pag.add_edge(src, dst).unwrap(), None);
}

#[test]
fn points_to_sets_only_grow() {
    let f = dispatch_fixture();
    let mut pta = ContextSensitivePTA::new(&f.program, AnalysisOptions::default(), KCallSiteSensitive::new(1));
    pta.initialize();
    let mut solver = pta.solver();
    solver.init().unwrap();
    let snapshot = |solver: &super::solver::Solver<'_, KCallSiteSensitive>| -> Vec<PointsTo<NodeId>> {
        (0..solver.pag().node_count())
            .map(|i| solver.points_to(NodeId::new(i)))
            .collect()
    };
    let mut previous = snapshot(&solver);
    let mut steps = 0;
    while solver.step().unwrap() {
        let current = snapshot(&solver);
        assert!(current.len() >= previous.len());
        for (old, new) in previous.iter().zip(current.iter()) {
            assert!(new.superset(old));
        }
        previous = current;
        steps += 1;
    }
    assert!(steps > 0);
    drop(solver);
    assert_eq!(pta.callees_of(f.main, f.call_stmt).len(), 2);
}

struct ExceptionFixture {
    program: Program,
    main: MethodId,
    thrower: MethodId,
    handler: LocalId,
    exc_alloc: usize,
    other_alloc: usize,
}

/// `thrower` raises an `Exc` and an `Other`; `main` catches only `Exc`.
fn exception_fixture() -> ExceptionFixture {
    let (mut pb, object) = program_builder();
    let exc = pb.add_class("Exc", Some(object));
    let other = pb.add_class("Other", Some(object));
    let thrower = pb.add_method(object, "thrower", "void thrower()", true);
    let e = pb.add_local(thrower, "e");
    let exc_alloc = new_obj(&mut pb, thrower, e, exc);
    let other_alloc = new_obj(&mut pb, thrower, e, other);
    pb.push_stmt(thrower, Stmt::Throw { op: e });
    let main = pb.add_method(object, "main", "void main()", true);
    let handler = pb.add_local(main, "h");
    let stmt = pb.push_stmt(
        main,
        Stmt::Invoke { lhs: None, expr: call(InvokeKind::Static, object, "void thrower()", None, vec![]) },
    );
    pb.add_trap(main, Trap { begin: stmt, end: stmt + 1, exception: exc, handler });
    pb.add_entry_point(main);
    let program = pb.build().unwrap();
    ExceptionFixture { program, main, thrower, handler, exc_alloc, other_alloc }
}

#[test]
fn exceptions_reach_matching_handlers_or_escape() {
    let f = exception_fixture();
    let pta = analyze_ci(&f.program);
    let exc_obj = obj(&f.program, f.thrower, f.exc_alloc);
    let other_obj = obj(&f.program, f.thrower, f.other_alloc);

    assert_eq!(
        pta.pts_of_method_var(f.thrower, &Path::new_method_throw(f.thrower)),
        objs(&[exc_obj.clone(), other_obj.clone()])
    );
    assert_eq!(pta.pts_of_local(f.main, f.handler), objs(&[exc_obj]));
    assert_eq!(
        pta.pts_of_method_var(f.main, &Path::new_method_throw(f.main)),
        objs(&[other_obj])
    );
}

struct ClinitFixture {
    program: Program,
    c_clinit: MethodId,
    d_clinit: MethodId,
    field: FieldId,
    alloc: usize,
}

/// `main` allocates a `C`, whose initializer fills a static field. `D` is never used.
fn clinit_fixture() -> ClinitFixture {
    let (mut pb, object) = program_builder();
    let c = pb.add_class("C", Some(object));
    let d = pb.add_class("D", Some(object));
    let field = pb.add_field(c, "INSTANCE", true);
    let c_clinit = pb.add_method(c, "<clinit>", CLINIT_SUB_SIGNATURE, true);
    let tmp = pb.add_local(c_clinit, "tmp");
    let alloc = new_obj(&mut pb, c_clinit, tmp, c);
    pb.push_stmt(c_clinit, Stmt::StaticStore { field, rhs: tmp });
    let d_clinit = pb.add_method(d, "<clinit>", CLINIT_SUB_SIGNATURE, true);
    let main = pb.add_method(object, "main", "void main()", true);
    let x = pb.add_local(main, "x");
    new_obj(&mut pb, main, x, c);
    pb.add_entry_point(main);
    let program = pb.build().unwrap();
    ClinitFixture { program, c_clinit, d_clinit, field, alloc }
}

#[test]
fn clinits_are_triggered_on_first_use() {
    let f = clinit_fixture();
    let pta = analyze_ci(&f.program);
    let reachable = pta.reachable_methods();
    assert!(reachable.contains(&f.c_clinit));
    assert!(!reachable.contains(&f.d_clinit));
    assert_eq!(pta.pts_of_static_field(f.field), objs(&[obj(&f.program, f.c_clinit, f.alloc)]));
    assert!(pta
        .call_graph()
        .edges()
        .any(|(_, _, callee, kind)| callee.method == f.c_clinit && kind == CallKind::Clinit));
}

#[test]
fn static_calls_do_not_list_the_triggered_initializer_as_a_callee() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let clinit = pb.add_method(a, "<clinit>", CLINIT_SUB_SIGNATURE, true);
    let foo = pb.add_method(a, "foo", "void foo()", true);
    let main = pb.add_method(object, "main", "void main()", true);
    let stmt = pb.push_stmt(
        main,
        Stmt::Invoke { lhs: None, expr: call(InvokeKind::Static, a, "void foo()", None, vec![]) },
    );
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let pta = analyze_ci(&program);
    assert_eq!(pta.callees_of(main, stmt), [foo].into_iter().collect());
    assert!(pta.reachable_methods().contains(&clinit));
    assert_eq!(pta.num_call_edges(), 2);
    let clinit_site = pta
        .call_graph()
        .edges()
        .find(|(_, _, callee, _)| callee.method == clinit)
        .map(|(_, callsite, _, kind)| (callsite, kind))
        .unwrap();
    assert_eq!(clinit_site.0.stmt, stmt);
    assert_eq!(clinit_site.0.site_kind, SiteKind::Clinit);
    assert_eq!(clinit_site.1, CallKind::Clinit);

    let stats = call_kind_stat(pta.call_graph());
    assert_eq!(stats[&CallKind::Static].num_call_sites, 1);
    assert_eq!(stats[&CallKind::Static].num_call_edges, 1);
    assert_eq!(stats[&CallKind::Clinit].num_call_edges, 1);
}

#[test]
fn full_clinit_mode_makes_every_initializer_reachable() {
    let f = clinit_fixture();
    let options = AnalysisOptions {
        clinit_mode: ClinitMode::Full,
        ..AnalysisOptions::default()
    };
    let pta = analyze(&f.program, options, ContextInsensitive::new());
    let reachable = pta.reachable_methods();
    assert!(reachable.contains(&f.c_clinit));
    assert!(reachable.contains(&f.d_clinit));
    assert_eq!(pta.num_call_edges(), 0);
    assert_eq!(pta.pts_of_static_field(f.field).len(), 1);
}

struct IdFixture {
    program: Program,
    id: MethodId,
    x: LocalId,
    y: LocalId,
    a_alloc: usize,
    b_alloc: usize,
    main: MethodId,
}

/// `x = id(new A); y = id(new B)`.
fn id_fixture() -> IdFixture {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let b = pb.add_class("B", Some(object));
    let id = pb.add_method(object, "id", "java.lang.Object id(java.lang.Object)", true);
    let p = pb.add_param(id, "p");
    pb.push_stmt(id, Stmt::Return { op: Some(p) });
    let main = pb.add_method(object, "main", "void main()", true);
    let [oa, ob, x, y] = ["oa", "ob", "x", "y"].map(|name| pb.add_local(main, name));
    let a_alloc = new_obj(&mut pb, main, oa, a);
    let b_alloc = new_obj(&mut pb, main, ob, b);
    let sig = "java.lang.Object id(java.lang.Object)";
    pb.push_stmt(main, Stmt::Invoke { lhs: Some(x), expr: call(InvokeKind::Static, object, sig, None, vec![oa]) });
    pb.push_stmt(main, Stmt::Invoke { lhs: Some(y), expr: call(InvokeKind::Static, object, sig, None, vec![ob]) });
    pb.add_entry_point(main);
    let program = pb.build().unwrap();
    IdFixture { program, id, x, y, a_alloc, b_alloc, main }
}

#[test]
fn call_site_sensitivity_separates_calls_to_the_same_method() {
    let f = id_fixture();
    let oa = obj(&f.program, f.main, f.a_alloc);
    let ob = obj(&f.program, f.main, f.b_alloc);

    let ci = analyze_ci(&f.program);
    assert_eq!(ci.pts_of_local(f.main, f.x), objs(&[oa.clone(), ob.clone()]));
    assert_eq!(ci.pts_of_local(f.main, f.y), objs(&[oa.clone(), ob.clone()]));

    let cs = analyze(&f.program, AnalysisOptions::default(), KCallSiteSensitive::new(1));
    assert_eq!(cs.pts_of_local(f.main, f.x), objs(&[oa]));
    assert_eq!(cs.pts_of_local(f.main, f.y), objs(&[ob]));
    assert_eq!(cs.contexts_of(f.id).len(), 2);
    for cid in cs.contexts_of(f.id) {
        assert_eq!(cs.get_context_by_id(cid).unwrap().len(), 1);
    }
}

#[test]
fn object_sensitivity_separates_receivers() {
    let (mut pb, object) = program_builder();
    let a = pb.add_class("A", Some(object));
    let b = pb.add_class("B", Some(object));
    let boxc = pb.add_class("Box", Some(object));
    let f = pb.add_field(boxc, "f", false);
    let set = pb.add_method(boxc, "set", "void set(java.lang.Object)", false);
    let v = pb.add_param(set, "v");
    pb.push_stmt(set, Stmt::Store { base: LocalId::new(0), field: f, rhs: v });
    let get = pb.add_method(boxc, "get", "java.lang.Object get()", false);
    let r = pb.add_local(get, "r");
    pb.push_stmt(get, Stmt::Load { lhs: r, base: LocalId::new(0), field: f });
    pb.push_stmt(get, Stmt::Return { op: Some(r) });

    let main = pb.add_method(object, "main", "void main()", true);
    let [b1, b2, oa, ob, x, y] = ["b1", "b2", "oa", "ob", "x", "y"].map(|name| pb.add_local(main, name));
    new_obj(&mut pb, main, b1, boxc);
    new_obj(&mut pb, main, b2, boxc);
    let a_alloc = new_obj(&mut pb, main, oa, a);
    let b_alloc = new_obj(&mut pb, main, ob, b);
    let set_sig = "void set(java.lang.Object)";
    let get_sig = "java.lang.Object get()";
    pb.push_stmt(main, Stmt::Invoke { lhs: None, expr: call(InvokeKind::Virtual, boxc, set_sig, Some(b1), vec![oa]) });
    pb.push_stmt(main, Stmt::Invoke { lhs: None, expr: call(InvokeKind::Virtual, boxc, set_sig, Some(b2), vec![ob]) });
    pb.push_stmt(main, Stmt::Invoke { lhs: Some(x), expr: call(InvokeKind::Virtual, boxc, get_sig, Some(b1), vec![]) });
    pb.push_stmt(main, Stmt::Invoke { lhs: Some(y), expr: call(InvokeKind::Virtual, boxc, get_sig, Some(b2), vec![]) });
    pb.add_entry_point(main);
    let program = pb.build().unwrap();
    let oa = obj(&program, main, a_alloc);
    let ob = obj(&program, main, b_alloc);

    let ci = analyze_ci(&program);
    assert_eq!(ci.pts_of_local(main, x), objs(&[oa.clone(), ob.clone()]));

    let obj_sens = analyze(&program, AnalysisOptions::default(), KObjectSensitive::new(1));
    assert_eq!(obj_sens.pts_of_local(main, x), objs(&[oa]));
    assert_eq!(obj_sens.pts_of_local(main, y), objs(&[ob]));
    assert_eq!(obj_sens.contexts_of(set).len(), 2);
    assert_eq!(obj_sens.contexts_of(get).len(), 2);
}

#[test]
fn finalizable_objects_are_registered_when_enabled() {
    let (mut pb, object) = program_builder();
    pb.add_method(object, "finalize", FINALIZE_SUB_SIGNATURE, false);
    let fin = pb.add_class("Fin", Some(object));
    pb.add_method(fin, "finalize", FINALIZE_SUB_SIGNATURE, false);
    let plain = pb.add_class("Plain", Some(object));
    let register = pb.add_method(object, "register", "void register(java.lang.Object)", true);
    let param = pb.add_param(register, "o");
    let main = pb.add_method(object, "main", "void main()", true);
    let x = pb.add_local(main, "x");
    let y = pb.add_local(main, "y");
    let z = pb.add_local(main, "z");
    let alloc = new_obj(&mut pb, main, x, fin);
    new_obj(&mut pb, main, y, plain);
    let other_alloc = new_obj(&mut pb, main, z, fin);
    pb.set_finalizer_register(register);
    pb.add_entry_point(main);
    let program = pb.build().unwrap();

    let disabled = analyze_ci(&program);
    assert!(!disabled.reachable_methods().contains(&register));

    let options = AnalysisOptions {
        handle_finalizers: true,
        ..AnalysisOptions::default()
    };
    let enabled = analyze(&program, options.clone(), ContextInsensitive::new());
    assert!(enabled.reachable_methods().contains(&register));
    assert_eq!(
        enabled.pts_of_local(register, param),
        objs(&[obj(&program, main, alloc), obj(&program, main, other_alloc)])
    );
    assert!(enabled
        .call_graph()
        .edges()
        .any(|(_, _, callee, kind)| callee.method == register && kind == CallKind::Finalize));

    // Every registration shares the empty context, even under call-site sensitivity.
    let cs = analyze(&program, options, KCallSiteSensitive::new(1));
    assert_eq!(cs.contexts_of(register), vec![ContextId::EMPTY]);
    assert_eq!(cs.pts_of_local(register, param).len(), 2);
    assert!(cs
        .call_graph()
        .edges()
        .filter(|(_, _, callee, _)| callee.method == register)
        .all(|(_, callsite, _, _)| callsite.site_kind == SiteKind::Finalize));
}
