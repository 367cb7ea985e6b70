// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Computes strongly connected components and heights of the per-module call graph.
//!
//! Resolved programs arrive with this information filled in. Programs assembled in code (tests,
//! tools) can use `compute_call_graph` to derive it.

use crate::ast::{Exp, Stmt, StmtKind};
use crate::model::{
    CallGraphInfo, CallableId, FunId, GlobalEnv, IteratorId, MethodId, ModuleData, QualifiedId,
};
use petgraph::{algo::tarjan_scc, graph::DiGraph, graph::NodeIndex};
use std::collections::BTreeMap;

/// Fills in `call_info` of every function, method and iterator of the environment.
pub fn compute_call_graph(env: &mut GlobalEnv) {
    let module_ids = env.get_modules().map(|(mid, _)| mid).collect::<Vec<_>>();
    for mid in module_ids {
        let module = env.module_mut(mid);
        let infos = compute_module(mid, module);
        for (callable, info) in infos {
            match callable {
                CallableId::Function(qid) => module.functions[qid.id.0].call_info = info,
                CallableId::Method(qid) => module.methods[qid.id.0].call_info = info,
                CallableId::Iterator(qid) => module.iterators[qid.id.0].call_info = info,
            }
        }
    }
}

fn compute_module(
    mid: crate::model::ModuleId,
    module: &ModuleData,
) -> BTreeMap<CallableId, CallGraphInfo> {
    let mut graph = DiGraph::<CallableId, ()>::new();
    let mut nodes: BTreeMap<CallableId, NodeIndex> = BTreeMap::new();
    for i in 0..module.functions.len() {
        let id = CallableId::Function(mid.qualified(FunId(i)));
        nodes.insert(id, graph.add_node(id));
    }
    for i in 0..module.methods.len() {
        let id = CallableId::Method(mid.qualified(MethodId(i)));
        nodes.insert(id, graph.add_node(id));
    }
    for i in 0..module.iterators.len() {
        let id = CallableId::Iterator(mid.qualified(IteratorId(i)));
        nodes.insert(id, graph.add_node(id));
    }

    let add_edges = |graph: &mut DiGraph<CallableId, ()>, from: CallableId, exps: Vec<&Exp>| {
        for exp in exps {
            for callee in exp.called_functions() {
                if let Some(to) = nodes.get(&CallableId::Function(callee)) {
                    graph.add_edge(nodes[&from], *to, ());
                }
            }
        }
    };
    for (i, fun) in module.functions.iter().enumerate() {
        let from = CallableId::Function(mid.qualified(FunId(i)));
        let exps = fun
            .requires
            .iter()
            .chain(fun.ensures.iter())
            .chain(fun.decreases.iter())
            .chain(fun.reads.iter().map(|f| &f.exp))
            .chain(fun.body.iter())
            .collect();
        add_edges(&mut graph, from, exps);
    }
    let add_call_edges =
        |graph: &mut DiGraph<CallableId, ()>, from: CallableId, callees: Vec<QualifiedId<MethodId>>| {
            for callee in callees {
                if let Some(to) = nodes.get(&CallableId::Method(callee)) {
                    graph.add_edge(nodes[&from], *to, ());
                }
            }
        };
    for (i, method) in module.methods.iter().enumerate() {
        let from = CallableId::Method(mid.qualified(MethodId(i)));
        let mut exps: Vec<&Exp> = method
            .requires
            .iter()
            .chain(method.ensures.iter())
            .map(|s| &s.exp)
            .chain(method.decreases.iter())
            .collect();
        let mut callees = vec![];
        if let Some(body) = &method.body {
            collect_stmt(body, &mut exps, &mut callees);
        }
        add_edges(&mut graph, from, exps);
        add_call_edges(&mut graph, from, callees);
    }
    for (i, iter) in module.iterators.iter().enumerate() {
        let from = CallableId::Iterator(mid.qualified(IteratorId(i)));
        let mut exps: Vec<&Exp> = iter
            .requires
            .iter()
            .chain(&iter.yield_requires)
            .chain(&iter.yield_ensures)
            .chain(&iter.ensures)
            .map(|s| &s.exp)
            .chain(iter.reads.iter().chain(&iter.modifies).map(|f| &f.exp))
            .chain(iter.decreases.iter())
            .collect();
        let mut callees = vec![];
        if let Some(body) = &iter.body {
            collect_stmt(body, &mut exps, &mut callees);
        }
        add_edges(&mut graph, from, exps);
        add_call_edges(&mut graph, from, callees);
    }

    // Components come out in reverse topological order: callees before callers.
    let mut result = BTreeMap::new();
    let mut heights: BTreeMap<NodeIndex, usize> = BTreeMap::new();
    for (scc_index, scc) in tarjan_scc(&graph).into_iter().enumerate() {
        let height = scc
            .iter()
            .flat_map(|n| graph.neighbors(*n))
            .filter(|m| !scc.contains(m))
            .map(|m| heights.get(&m).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        let is_recursive = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
        for n in &scc {
            heights.insert(*n, height);
            result.insert(graph[*n], CallGraphInfo {
                scc: scc_index,
                height,
                is_recursive,
            });
        }
    }
    result
}

fn collect_stmt<'a>(
    stmt: &'a Stmt,
    exps: &mut Vec<&'a Exp>,
    callees: &mut Vec<QualifiedId<MethodId>>,
) {
    exps.extend(stmt.exps());
    if let StmtKind::Call { method, .. } = &stmt.kind {
        callees.push(*method);
    }
    for sub in stmt.sub_stmts() {
        collect_stmt(sub, exps, callees);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExpData;
    use crate::model::{Formal, FunctionData};
    use crate::ty::Type;

    fn fun(name: &str, body: Option<Exp>) -> FunctionData {
        FunctionData {
            name: name.to_string(),
            loc: Default::default(),
            owner: None,
            is_static: true,
            type_params: vec![],
            formals: vec![Formal::new("n", Type::Int)],
            result_type: Type::Int,
            reads: vec![],
            requires: vec![],
            ensures: vec![],
            decreases: vec![],
            body,
            is_opaque: false,
            fuel: vec![],
            call_info: Default::default(),
        }
    }

    #[test]
    fn recursion_and_heights() {
        let mut env = GlobalEnv::new();
        let mid = env.add_module(ModuleData::new("M", 0));
        let leaf = mid.qualified(FunId(0));
        let rec = mid.qualified(FunId(1));
        let n = ExpData::local("n", Type::Int);
        env.module_mut(mid)
            .functions
            .push(fun("leaf", Some(n.clone())));
        let body = ExpData::binary(
            crate::ast::BinaryOp::Add,
            ExpData::call(leaf, vec![n.clone()], Type::Int),
            ExpData::call(rec, vec![n], Type::Int),
        );
        env.module_mut(mid).functions.push(fun("rec", Some(body)));
        compute_call_graph(&mut env);
        let leaf_info = env.function(leaf).call_info;
        let rec_info = env.function(rec).call_info;
        assert!(!leaf_info.is_recursive);
        assert!(rec_info.is_recursive);
        assert!(rec_info.height > leaf_info.height);
        assert_ne!(rec_info.scc, leaf_info.scc);
    }

    #[test]
    fn iterators_sit_above_their_callees() {
        use crate::model::{IteratorData, MethodData, MethodKind};

        let mut env = GlobalEnv::new();
        let mid = env.add_module(ModuleData::new("M", 0));
        env.module_mut(mid)
            .methods
            .push(MethodData::new("step", MethodKind::Method, vec![], vec![]));
        let call = Stmt::new(
            StmtKind::Call {
                lhss: vec![],
                method: mid.qualified(MethodId(0)),
                receiver: None,
                type_args: vec![],
                args: vec![],
            },
            Default::default(),
        );
        let mut iter = IteratorData::new("Gen", vec![], vec![Formal::new("x", Type::Int)]);
        iter.body = Some(Stmt::block(vec![call]));
        env.module_mut(mid).iterators.push(iter);
        compute_call_graph(&mut env);
        let step = env.method(mid.qualified(MethodId(0))).call_info;
        let gen = env.iterator(mid.qualified(IteratorId(0))).call_info;
        assert!(!gen.is_recursive);
        assert!(gen.height > step.height);
    }
}
