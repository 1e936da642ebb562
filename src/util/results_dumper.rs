// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::errors::PtaResult;
use crate::graph::call_graph::{CGCallSite, CGFunction, CallGraph};
use crate::graph::pag::{field_display, PAGNode, PAGNodeId, PAG};
use crate::ir::call_site::BaseCallSite;
use crate::ir::path::PathEnum;
use crate::ir::program::{MethodId, Program};
use crate::pta::DiffPTDataTy;
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::AnalysisOptions;

pub fn dump_results<F, S>(
    program: &Program,
    options: &AnalysisOptions,
    call_graph: &CallGraph<F, S>,
    pt_data: &DiffPTDataTy,
    pag: &PAG,
) -> PtaResult<()>
where
    F: CGFunction,
    S: CGCallSite + Into<BaseCallSite>,
{
    // dump points-to results
    if let Some(pts_output) = &options.pts_output {
        info!("Dumping points-to results...");
        dump_ci_pts(program, pt_data, pag, pts_output)?;
    }

    // dump call graph
    if let Some(cg_output) = &options.call_graph_output {
        let cg_path = std::path::Path::new(cg_output);
        info!("Dumping call graph...");
        dump_call_graph(program, call_graph, cg_path)?;
    }
    Ok(())
}

/// Dumps the call graph with all contexts merged.
pub fn dump_call_graph<F, S>(program: &Program, call_graph: &CallGraph<F, S>, dot_path: &std::path::Path) -> PtaResult<()>
where
    F: CGFunction,
    S: CGCallSite + Into<BaseCallSite>,
{
    let ci_call_graph = to_ci_call_graph(call_graph);
    ci_call_graph.to_dot(program, dot_path)
}

fn output_writer(output: &str) -> PtaResult<BufWriter<Box<dyn Write>>> {
    Ok(BufWriter::new(match output {
        "stdout" => Box::new(std::io::stdout()) as Box<dyn Write>,
        _ => Box::new(File::create(output)?) as Box<dyn Write>,
    }))
}

/// Dumps the context-insensitive projection of the points-to results,
/// grouped by the method each pointer belongs to. Static fields are listed
/// last under `<globals>`.
pub fn dump_ci_pts(program: &Program, pt_data: &DiffPTDataTy, pag: &PAG, pts_output: &str) -> PtaResult<()> {
    let mut pts_writer = output_writer(pts_output)?;
    let (grouped_pts, globals) = group_ci_pts(program, pt_data, pag);
    for (method, pts_map) in grouped_pts {
        writeln!(pts_writer, "{}", program.method_name(method))?;
        write_pts_map(&mut pts_writer, &pts_map)?;
    }
    if !globals.is_empty() {
        writeln!(pts_writer, "<globals>")?;
        write_pts_map(&mut pts_writer, &globals)?;
    }
    pts_writer.flush()?;
    Ok(())
}

type CIPtsMap = BTreeMap<String, BTreeSet<String>>;

fn write_pts_map<W: Write>(pts_writer: &mut W, pts_map: &CIPtsMap) -> PtaResult<()> {
    for (pointer, pts) in pts_map {
        write!(pts_writer, "\t{} ({}) ==> {{ ", pointer, pts.len())?;
        for pointee in pts {
            write!(pts_writer, "{} ", pointee)?;
        }
        writeln!(pts_writer, "}}")?;
    }
    Ok(())
}

fn group_ci_pts(program: &Program, pt_data: &DiffPTDataTy, pag: &PAG) -> (BTreeMap<MethodId, CIPtsMap>, CIPtsMap) {
    let mut grouped_pts: BTreeMap<MethodId, CIPtsMap> = BTreeMap::new();
    let mut globals = CIPtsMap::new();
    for node in pt_data.keys() {
        let pts = pt_data.get_pts(node);
        let ci_pts = match node_method(pag, node) {
            Some(method) => grouped_pts
                .entry(method)
                .or_default()
                .entry(ci_display(program, pag, node))
                .or_default(),
            None if matches!(pag.node(node), PAGNode::Var { .. }) => {
                globals.entry(ci_display(program, pag, node)).or_default()
            }
            None => continue,
        };
        for pointee in pts.iter() {
            ci_pts.insert(ci_display(program, pag, pointee));
        }
    }
    (grouped_pts, globals)
}

/// Renders a node with its contexts dropped.
fn ci_display(program: &Program, pag: &PAG, node: PAGNodeId) -> String {
    match pag.node(node) {
        PAGNode::Var { path, .. } | PAGNode::Alloc { path, .. } => path.display(program),
        PAGNode::ContextField { heap, field_val } => match pag.node(*field_val) {
            PAGNode::FieldVal { field } => {
                format!("{}.{}", ci_display(program, pag, *heap), field_display(program, *field))
            }
            _ => pag.node_display(program, node),
        },
        _ => pag.node_display(program, node),
    }
}

/// The method a pointer node belongs to, if any.
fn node_method(pag: &PAG, node: PAGNodeId) -> Option<MethodId> {
    match pag.node(node) {
        PAGNode::Var { path, .. } | PAGNode::Alloc { path, .. } => match &path.value {
            PathEnum::LocalVariable { method, .. }
            | PathEnum::ReturnValue { method }
            | PathEnum::MethodThrow { method }
            | PathEnum::InvokeThrow { method, .. }
            | PathEnum::HeapObj { method, .. } => Some(*method),
            PathEnum::StaticField { .. } | PathEnum::EmptyArray | PathEnum::FieldRef { .. } => None,
        },
        PAGNode::ContextField { heap, .. } => node_method(pag, *heap),
        PAGNode::FieldRef { .. } | PAGNode::FieldVal { .. } => None,
    }
}

fn to_ci_call_graph<F, S>(call_graph: &CallGraph<F, S>) -> CallGraph<MethodId, BaseCallSite>
where
    F: CGFunction,
    S: CGCallSite + Into<BaseCallSite>,
{
    let mut ci_call_graph = CallGraph::new();
    for (caller, callsite, callee, kind) in call_graph.edges() {
        ci_call_graph.add_edge(callsite.into(), caller.method(), callee.method(), kind);
    }
    ci_call_graph
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::call_site::{CSBaseCallSite, CSMethodId, CallKind};
    use crate::ir::context::ContextId;
    use crate::graph::call_graph::CSCallGraph;

    #[test]
    fn ci_call_graph_merges_contexts() {
        let m0 = MethodId::new(0);
        let m1 = MethodId::new(1);
        let mut cg = CSCallGraph::new();
        for cid in [ContextId::EMPTY, ContextId::new(1)] {
            let caller = CSMethodId::new(cid, m0);
            let callee = CSMethodId::new(ContextId::new(2), m1);
            cg.add_edge(CSBaseCallSite::new(caller, 0), caller, callee, CallKind::Static);
        }
        assert_eq!(cg.edge_count(), 2);
        let ci = to_ci_call_graph(&cg);
        assert_eq!(ci.edge_count(), 1);
        assert_eq!(ci.node_count(), 2);
    }
}
