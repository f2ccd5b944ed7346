//! Generate call graphs out of a program term.

use std::collections::HashMap;

use crate::intermediate_representation::*;
use petgraph::graph::DiGraph;

/// The graph type of a call graph
pub type CallGraph<'a> = DiGraph<Tid, &'a Term<Jmp>>;

/// Generate a call graph for the given program.
///
/// The nodes of the returned graph correspond to the TIDs of functions defined in the program.
/// Edges are jump terms of call operations.
/// For indirect calls one edge is added for each resolved call target,
/// i.e. the call graph is only complete after the results of the function pointer analysis
/// have been written back into the program.
///
/// Note that calls to external symbols are not represented in the graph,
/// i.e. there are neither nodes nor edges representing (calls to) external symbols in the graph.
pub fn get_program_callgraph(program: &Term<Program>) -> CallGraph {
    let mut callgraph = CallGraph::new();
    let mut tid_to_node_index_map = HashMap::new();
    for sub_tid in program.term.subs.keys() {
        let node_index = callgraph.add_node(sub_tid.clone());
        tid_to_node_index_map.insert(sub_tid.clone(), node_index);
    }
    for (sub, jump) in program.term.jmps() {
        let source_index = tid_to_node_index_map.get(&sub.tid).unwrap();
        match &jump.term {
            Jmp::Call { target, .. } => {
                if let Some(target_index) = tid_to_node_index_map.get(target) {
                    callgraph.add_edge(*source_index, *target_index, jump);
                }
            }
            Jmp::CallInd {
                resolved_targets, ..
            } => {
                for target in resolved_targets {
                    if let Some(target_index) = tid_to_node_index_map.get(target) {
                        callgraph.add_edge(*source_index, *target_index, jump);
                    }
                }
            }
            _ => (),
        }
    }

    callgraph
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn block_with_jmp(block_name: &str, jmp_name: &str, jmp: Jmp) -> Term<Blk> {
        Term {
            tid: Tid::new(block_name),
            term: Blk {
                defs: Vec::new(),
                jmps: vec![Term {
                    tid: Tid::new(jmp_name),
                    term: jmp,
                }],
            },
        }
    }

    #[test]
    fn direct_calls_get_edges() {
        // Create a program with 2 functions and one call between them
        let mut program = Program::mock_empty();
        let mut caller = Sub::mock("caller");
        let callee = Sub::mock("callee");
        let call = Jmp::Call {
            target: Tid::new("callee"),
            args: Vec::new(),
            result: None,
            return_: None,
        };
        caller
            .term
            .blocks
            .push(block_with_jmp("caller_blk", "call", call));
        program.subs.insert(Tid::new("caller"), caller);
        program.subs.insert(Tid::new("callee"), callee);
        let program = Term {
            tid: Tid::new("program"),
            term: program,
        };
        // Test correctness of the call graph
        let callgraph = get_program_callgraph(&program);
        assert_eq!(callgraph.node_indices().len(), 2);
        assert_eq!(callgraph.edge_indices().len(), 1);
        let (start, end) = callgraph
            .edge_endpoints(callgraph.edge_indices().next().unwrap())
            .unwrap();
        assert_eq!(callgraph[start], Tid::new("caller"));
        assert_eq!(callgraph[end], Tid::new("callee"));
    }

    #[test]
    fn resolved_indirect_calls_get_edges() {
        let mut program = Program::mock_empty();
        let mut dispatcher = Sub::mock("dispatcher");
        let call = Jmp::CallInd {
            target: Place::var(Variable::new("fn_ptr", POINTER_SIZE)),
            resolved_targets: vec![Tid::new("handler_a"), Tid::new("handler_b")],
            args: Vec::new(),
            result: None,
            return_: None,
        };
        dispatcher
            .term
            .blocks
            .push(block_with_jmp("dispatcher_blk", "call", call));
        program.subs.insert(Tid::new("dispatcher"), dispatcher);
        program.subs.insert(Tid::new("handler_a"), Sub::mock("handler_a"));
        program.subs.insert(Tid::new("handler_b"), Sub::mock("handler_b"));
        let program = Term {
            tid: Tid::new("program"),
            term: program,
        };

        let callgraph = get_program_callgraph(&program);
        assert_eq!(callgraph.node_indices().len(), 3);
        assert_eq!(callgraph.edge_indices().len(), 2);
        let mut target_tids: Vec<_> = callgraph
            .edge_indices()
            .map(|edge| {
                let (start, end) = callgraph.edge_endpoints(edge).unwrap();
                assert_eq!(callgraph[start], Tid::new("dispatcher"));
                callgraph[end].clone()
            })
            .collect();
        target_tids.sort();
        assert_eq!(target_tids, [Tid::new("handler_a"), Tid::new("handler_b")]);
    }
}
