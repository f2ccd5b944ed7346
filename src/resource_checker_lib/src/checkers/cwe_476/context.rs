use super::Config;
use super::State;
use super::CWE_MODULE;
use crate::abstract_domain::AbstractDomain;
use crate::analysis::function_pointers::FunctionPointers;
use crate::analysis::graph::{Graph, Node};
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::{CweWarning, LogMessage, LogThreadMsg};
use itertools::Itertools;

/// The context struct for the fixpoint computation.
/// It holds the resolved function pointer model
/// and a channel for reporting found CWE warnings.
pub struct Context<'a> {
    /// A pointer to the project struct.
    pub project: &'a Project,
    /// A pointer to the control flow graph.
    pub graph: &'a Graph<'a>,
    /// A pointer to the results of the function pointer analysis.
    pub function_pointers: &'a FunctionPointers,
    /// The deserialized check configuration.
    pub config: Config,
    /// A sender channel that can be used to collect logs and CWE warnings.
    pub log_collector: crossbeam_channel::Sender<LogThreadMsg>,
}

impl<'a> Context<'a> {
    /// Generate a new context struct from the given analysis results
    /// and a channel for gathering log messages and CWE warnings.
    pub fn new(
        analysis_results: &'a AnalysisResults<'a>,
        config: Config,
        log_collector: crossbeam_channel::Sender<LogThreadMsg>,
    ) -> Context<'a> {
        Context {
            project: analysis_results.project,
            graph: analysis_results.control_flow_graph,
            function_pointers: analysis_results.function_pointers.unwrap(),
            config,
            log_collector,
        }
    }

    /// Check one indirect call site against the pointer model.
    ///
    /// A warning is generated if the dispatched place may be NULL or may never
    /// have been assigned and the current path carries no proof that it is non-NULL.
    /// With the strict dispatch policy enabled
    /// every unguarded dispatch through a struct field is reported.
    fn check_dispatch(&self, state: &State, jmp: &Term<Jmp>) {
        let Jmp::CallInd { target: place, .. } = &jmp.term else {
            return;
        };
        if state.is_proven_non_null(place) {
            return;
        }
        let Some(value) = self
            .function_pointers
            .value_of_place(&state.current_fn_tid, place)
        else {
            let log = LogMessage::new_debug(format!(
                "No pointer model for dispatch through {place}"
            ))
            .location(jmp.tid.clone())
            .source(CWE_MODULE.name);
            let _ = self.log_collector.send(log.into());
            return;
        };
        let reason = if value.possibly_null {
            "may be NULL"
        } else if value.possibly_unassigned {
            "may never have been assigned"
        } else if self.config.strict_dispatch_policy && place.last_field().is_some() {
            "is dispatched without a NULL check"
        } else {
            return;
        };
        let mut warning = CweWarning::new(
            CWE_MODULE.name,
            CWE_MODULE.version,
            format!(
                "(NULL Pointer Dereference) Function pointer {} {} at {}",
                place, reason, jmp.tid.address
            ),
        )
        .tids(vec![format!("{}", jmp.tid)])
        .addresses(vec![jmp.tid.address.clone()]);
        if !value.targets.is_empty() {
            warning = warning.other(vec![vec![
                "resolved_targets".to_string(),
                value.targets.iter().join(", "),
            ]]);
        }
        let _ = self.log_collector.send(warning.into());
    }
}

impl<'a> crate::analysis::forward_interprocedural_fixpoint::Context<'a> for Context<'a> {
    type Value = State;

    /// Get a reference to the control flow graph.
    fn get_graph(&self) -> &Graph<'a> {
        self.graph
    }

    /// Merge two node states by intersecting their proofs.
    fn merge(&self, state1: &State, state2: &State) -> State {
        state1.merge(state2)
    }

    /// Track proofs established or invalidated by assignments, loads and stores.
    fn update_def(&self, state: &State, def: &Term<Def>) -> Option<State> {
        let mut state = state.clone();
        match &def.term {
            Def::Assign { var, .. } | Def::Load { var, .. } => {
                state.remove_proofs_based_on(var);
            }
            Def::Store { place, value } => match value {
                // Storing a definite function address proves the place non-NULL.
                Expression::FnAddr(_) => state.add_proof(place, &def.tid),
                Expression::Const(constant) if constant.value != 0 => {
                    state.add_proof(place, &def.tid)
                }
                _ => state.remove_proof(place),
            },
        }
        Some(state)
    }

    /// Just returns the unmodified state.
    fn update_jump(
        &self,
        state: &State,
        _jump: &Term<Jmp>,
        _untaken_conditional: Option<&Term<Jmp>>,
        _target: &Term<Blk>,
    ) -> Option<State> {
        Some(state.clone())
    }

    /// Check resolved indirect calls for possibly-NULL dispatch targets.
    /// Always returns `None`, since proofs do not propagate into the callee.
    fn update_call(&self, state: &State, call: &Term<Jmp>, _target: &Node) -> Option<State> {
        self.check_dispatch(state, call);
        None
    }

    /// Proofs of the caller survive the call.
    /// Only proofs rooted in the (overwritten) result variable are dropped.
    fn update_return(
        &self,
        state: Option<&State>,
        state_before_call: Option<&State>,
        call_term: &Term<Jmp>,
        _return_term: &Term<Jmp>,
    ) -> Option<State> {
        let (Some(_), Some(state_before_call)) = (state, state_before_call) else {
            return None;
        };
        let mut state_after_return = state_before_call.clone();
        if let Some(result_var) = call_term.term.call_result() {
            state_after_return.remove_proofs_based_on(result_var);
        }
        Some(state_after_return)
    }

    /// Check unresolved indirect calls and indirect calls to extern functions.
    fn update_call_stub(&self, state: &State, call: &Term<Jmp>) -> Option<State> {
        self.check_dispatch(state, call);
        let mut state = state.clone();
        if let Some(result_var) = call.term.call_result() {
            state.remove_proofs_based_on(result_var);
        }
        Some(state)
    }

    /// Pick up NULL checks: on the edge where the checked pointer is known to be non-NULL
    /// the checked place is added to the proofs.
    fn specialize_conditional(
        &self,
        state: &State,
        condition: &Expression,
        block_before_condition: &Term<Blk>,
        is_true: bool,
    ) -> Option<State> {
        let Some(checked_var) = non_null_checked_var(condition, is_true) else {
            return Some(state.clone());
        };
        let mut state = state.clone();
        // The checked variable is usually a temporary
        // loaded from the actual place in the block before the check.
        for def in block_before_condition.term.defs.iter().rev() {
            if let Def::Load { var, place } = &def.term {
                if *var == checked_var {
                    state.add_proof(place, &def.tid);
                    break;
                }
            }
        }
        state.add_proof(&Place::var(checked_var), &block_before_condition.tid);
        Some(state)
    }
}

/// If the condition proves some variable to be non-NULL
/// on the branch given by `is_true`, return that variable.
///
/// Handles `p != NULL`, `p == NULL` (on the false branch), bare `if (p)`
/// and negations thereof. Comparisons with swapped operands are matched as well.
fn non_null_checked_var(condition: &Expression, is_true: bool) -> Option<Variable> {
    use BinOpType::*;
    match condition {
        Expression::UnOp {
            op: UnOpType::BoolNegate,
            arg,
        } => non_null_checked_var(arg, !is_true),
        Expression::Var(var) if is_true => Some(var.clone()),
        Expression::BinOp { op, lhs, rhs } => {
            let var = match (lhs.as_ref(), rhs.as_ref()) {
                (Expression::Var(var), Expression::Const(constant))
                | (Expression::Const(constant), Expression::Var(var))
                    if constant.value == 0 =>
                {
                    var
                }
                _ => return None,
            };
            match op {
                IntNotEqual if is_true => Some(var.clone()),
                IntEqual if !is_true => Some(var.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable::new(name, POINTER_SIZE)
    }

    #[test]
    fn null_check_conditions_are_recognized() {
        let var_expr = Expression::Var(var("fp"));
        let null = Expression::Const(Constant::null());
        let not_equal = Expression::BinOp {
            op: BinOpType::IntNotEqual,
            lhs: Box::new(var_expr.clone()),
            rhs: Box::new(null.clone()),
        };
        assert_eq!(non_null_checked_var(&not_equal, true), Some(var("fp")));
        assert_eq!(non_null_checked_var(&not_equal, false), None);

        let equal = Expression::BinOp {
            op: BinOpType::IntEqual,
            lhs: Box::new(null),
            rhs: Box::new(var_expr.clone()),
        };
        assert_eq!(non_null_checked_var(&equal, false), Some(var("fp")));
        assert_eq!(non_null_checked_var(&equal, true), None);

        // `if (fp)` proves the pointer on the true branch.
        assert_eq!(non_null_checked_var(&var_expr, true), Some(var("fp")));
        let negated = Expression::UnOp {
            op: UnOpType::BoolNegate,
            arg: Box::new(var_expr),
        };
        assert_eq!(non_null_checked_var(&negated, false), Some(var("fp")));
    }
}
