//! Helper functions for traversing the control flow graph.

use crate::analysis::graph::*;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::HashSet;

/// Check whether the given edge stays inside the function of its start node.
///
/// The artificial edges generated for calls to functions inside the translation unit
/// (`CallCombine`, `CrCallStub`, `ReturnCombine`) count as intraprocedural,
/// so that a forward exploration continues behind calls that return to the caller.
/// `Call` edges descend into the called function and `CrReturnStub` edges
/// enter the return combinator from the called function,
/// so both are not intraprocedural.
pub fn is_intraprocedural_edge(edge: &Edge) -> bool {
    match edge {
        Edge::Block
        | Edge::Jump(_, _)
        | Edge::ExternCallStub(_)
        | Edge::CallCombine(_)
        | Edge::CrCallStub
        | Edge::ReturnCombine(_) => true,
        Edge::Call(_) | Edge::CrReturnStub => false,
    }
}

/// Collect all nodes that are forward-reachable from the `start` node
/// through a path of intraprocedural edges.
/// The start node itself is contained in the returned set.
///
/// A simple depth-first-search on the graph is used to find the nodes.
pub fn intraprocedural_reachable_nodes(graph: &Graph, start: NodeIndex) -> HashSet<NodeIndex> {
    let mut visited_nodes = HashSet::new();
    visited_nodes.insert(start);
    let mut worklist = vec![start];

    while let Some(node) = worklist.pop() {
        for edge in graph.edges(node) {
            if is_intraprocedural_edge(edge.weight()) && !visited_nodes.contains(&edge.target()) {
                visited_nodes.insert(edge.target());
                worklist.push(edge.target());
            }
        }
    }
    visited_nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intermediate_representation::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::iter::FromIterator;

    fn mock_program_with_call() -> Term<Program> {
        let call_term = Term {
            tid: Tid::new("call"),
            term: Jmp::Call {
                target: Tid::new("callee"),
                args: Vec::new(),
                result: None,
                return_: Some(Tid::new("caller_blk2")),
            },
        };
        let caller = Term {
            tid: Tid::new("caller"),
            term: Sub {
                name: "caller".to_string(),
                formal_args: Vec::new(),
                blocks: vec![
                    Term {
                        tid: Tid::new("caller_blk1"),
                        term: Blk {
                            defs: Vec::new(),
                            jmps: vec![call_term],
                        },
                    },
                    Term {
                        tid: Tid::new("caller_blk2"),
                        term: Blk {
                            defs: Vec::new(),
                            jmps: vec![Term {
                                tid: Tid::new("caller_return"),
                                term: Jmp::Return(None),
                            }],
                        },
                    },
                ],
            },
        };
        let callee = Term {
            tid: Tid::new("callee"),
            term: Sub {
                name: "callee".to_string(),
                formal_args: Vec::new(),
                blocks: vec![Term {
                    tid: Tid::new("callee_blk1"),
                    term: Blk {
                        defs: Vec::new(),
                        jmps: vec![Term {
                            tid: Tid::new("callee_return"),
                            term: Jmp::Return(None),
                        }],
                    },
                }],
            },
        };
        Term {
            tid: Tid::new("program"),
            term: Program {
                subs: BTreeMap::from_iter([
                    (caller.tid.clone(), caller),
                    (callee.tid.clone(), callee),
                ]),
                extern_symbols: BTreeMap::new(),
                entry_points: BTreeSet::new(),
            },
        }
    }

    fn node_of_block<'a>(graph: &Graph<'a>, blk_name: &str, start: bool) -> NodeIndex {
        graph
            .node_indices()
            .find(|node| match graph[*node] {
                Node::BlkStart(blk, _sub) => start && blk.tid == Tid::new(blk_name),
                Node::BlkEnd(blk, _sub) => !start && blk.tid == Tid::new(blk_name),
                _ => false,
            })
            .unwrap()
    }

    #[test]
    fn forward_exploration_stays_inside_the_function() {
        let program = mock_program_with_call();
        let graph = get_program_cfg(&program);

        let caller_entry = node_of_block(&graph, "caller_blk1", true);
        let reachable = intraprocedural_reachable_nodes(&graph, caller_entry);
        // The walk continues behind the call but does not descend into the callee.
        assert!(reachable.contains(&node_of_block(&graph, "caller_blk2", true)));
        assert!(reachable.contains(&node_of_block(&graph, "caller_blk2", false)));
        assert!(!reachable.contains(&node_of_block(&graph, "callee_blk1", true)));

        let callee_entry = node_of_block(&graph, "callee_blk1", true);
        let reachable = intraprocedural_reachable_nodes(&graph, callee_entry);
        // The walk does not follow return edges back into the caller.
        assert!(reachable.contains(&node_of_block(&graph, "callee_blk1", false)));
        assert!(!reachable.contains(&node_of_block(&graph, "caller_blk2", true)));
    }
}
