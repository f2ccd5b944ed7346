use super::*;
use crate::analysis::graph::Graph;
use petgraph::graph::NodeIndex;
use std::collections::HashMap;

/// Identifier for BlkStart and BlkEnd nodes
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum StartEnd {
    Start,
    End,
}

/// A simple mock context, only containing the program cfg.
/// The node values of the fixpoint computation simply count
/// the `Def` terms on the path with the most `Def` terms leading to the node.
#[derive(Clone)]
pub struct Context<'a> {
    pub graph: Graph<'a>,
    pub tid_to_node_index: HashMap<(Tid, Tid, StartEnd), NodeIndex>,
}

impl<'a> Context<'a> {
    pub fn new(project: &'a Project) -> Self {
        let graph = crate::analysis::graph::get_program_cfg(&project.program);
        let mut tid_to_node_index: HashMap<(Tid, Tid, StartEnd), NodeIndex> = HashMap::new();
        for node in graph.node_indices() {
            let node_value = graph.node_weight(node).unwrap();
            match node_value {
                Node::BlkStart(block, sub) => {
                    tid_to_node_index
                        .insert((sub.tid.clone(), block.tid.clone(), StartEnd::Start), node);
                }
                Node::BlkEnd(block, sub) => {
                    tid_to_node_index
                        .insert((sub.tid.clone(), block.tid.clone(), StartEnd::End), node);
                }
                _ => (),
            }
        }
        Context {
            graph,
            tid_to_node_index,
        }
    }
}

impl<'a> crate::analysis::forward_interprocedural_fixpoint::Context<'a> for Context<'a> {
    type Value = u64;

    fn get_graph(&self) -> &Graph<'a> {
        &self.graph
    }

    /// Take the maximum of two values when merging
    fn merge(&self, val1: &u64, val2: &u64) -> u64 {
        std::cmp::max(*val1, *val2)
    }

    /// Increase the Def count when parsing one
    fn update_def(&self, val: &u64, _def: &Term<Def>) -> Option<u64> {
        Some(*val + 1)
    }

    /// Simply copy the value at the jump site
    fn update_jump(
        &self,
        value: &u64,
        _jump: &Term<Jmp>,
        _untaken_conditional: Option<&Term<Jmp>>,
        _target: &Term<Blk>,
    ) -> Option<u64> {
        Some(*value)
    }

    /// Copy the value at the callsite into the called function
    fn update_call(&self, value: &u64, _call: &Term<Jmp>, _target: &Node) -> Option<u64> {
        Some(*value)
    }

    /// Add the value at the end of the called function and the value at the callsite
    fn update_return(
        &self,
        value: Option<&u64>,
        value_before_call: Option<&u64>,
        _call_term: &Term<Jmp>,
        _return_term: &Term<Jmp>,
    ) -> Option<u64> {
        match (value, value_before_call) {
            (Some(returned), Some(stub)) => Some(returned + stub),
            (Some(returned), None) => Some(*returned),
            (None, Some(stub)) => Some(*stub),
            (None, None) => None,
        }
    }

    /// Add 100 to the value to mark the call to the extern symbol
    fn update_call_stub(&self, value: &u64, _call: &Term<Jmp>) -> Option<u64> {
        Some(*value + 100)
    }

    /// Simply copy the value
    fn specialize_conditional(
        &self,
        value: &u64,
        _condition: &Expression,
        _block_before_condition: &Term<Blk>,
        _is_true: bool,
    ) -> Option<u64> {
        Some(*value)
    }
}
