use super::state::ResourceState;
use super::Config;
use super::State;
use super::CWE_MODULE;
use crate::abstract_domain::AbstractDomain;
use crate::analysis::error_contracts::ErrorContracts;
use crate::analysis::graph::{Graph, Node};
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::{CweWarning, LogThreadMsg};
use std::collections::BTreeSet;

/// The context struct for the fixpoint computation.
///
/// It bundles the learned error contracts with the extra acquire and release symbols
/// taken from the check configuration
/// and holds a channel for reporting found CWE warnings.
pub struct Context<'a> {
    /// A pointer to the project struct.
    pub project: &'a Project,
    /// A pointer to the control flow graph.
    pub graph: &'a Graph<'a>,
    /// A pointer to the learned error contracts of the functions of the project.
    pub error_contracts: &'a ErrorContracts,
    /// The deserialized check configuration.
    pub config: Config,
    /// Term IDs of acquiring functions named in the check configuration.
    extra_acquire_tids: BTreeSet<Tid>,
    /// Term IDs of releasing functions named in the check configuration.
    /// By convention these release their first parameter.
    extra_release_tids: BTreeSet<Tid>,
    /// A sender channel that can be used to collect logs and CWE warnings.
    pub log_collector: crossbeam_channel::Sender<LogThreadMsg>,
}

impl<'a> Context<'a> {
    /// Generate a new context struct from the given analysis results
    /// and a channel for gathering log messages and CWE warnings.
    ///
    /// The acquire and release symbol lists of the configuration are resolved
    /// to term IDs once here, so that the transfer functions only compare IDs.
    pub fn new(
        analysis_results: &'a AnalysisResults<'a>,
        config: Config,
        log_collector: crossbeam_channel::Sender<LogThreadMsg>,
    ) -> Context<'a> {
        let program = &analysis_results.project.program.term;
        let extra_acquire_tids = config
            .acquire_symbols
            .iter()
            .filter_map(|name| program.find_callable_by_name(name))
            .collect();
        let extra_release_tids = config
            .release_symbols
            .iter()
            .filter_map(|name| program.find_callable_by_name(name))
            .collect();
        Context {
            project: analysis_results.project,
            graph: analysis_results.control_flow_graph,
            error_contracts: analysis_results.error_contracts.unwrap(),
            config,
            extra_acquire_tids,
            extra_release_tids,
            log_collector,
        }
    }

    /// Return whether a call to the given function hands a fresh resource to the caller.
    fn is_acquiring(&self, callee: &Tid) -> bool {
        self.error_contracts.is_acquiring(callee) || self.extra_acquire_tids.contains(callee)
    }

    /// Return the indices of the parameters that a call to the given function releases.
    fn released_parameters(&self, callee: &Tid) -> BTreeSet<usize> {
        let mut parameters = self.error_contracts.released_parameters(callee);
        if self.extra_release_tids.contains(callee) {
            parameters.insert(0);
        }
        parameters
    }

    /// Apply the resource effects of a call with the given possible callees to the state.
    ///
    /// Handles passed to a releasing parameter are released,
    /// which may detect a double release.
    /// Handles whose address is passed to the call escape the analysis,
    /// since the callee may release or overwrite them through the pointer.
    /// If any callee acquires, the result variable is tracked as a fresh handle.
    fn apply_call_effects(&self, state: &mut State, call: &Term<Jmp>, callees: &[Tid]) {
        let mut released_parameters = BTreeSet::new();
        let mut acquiring = false;
        for callee in callees {
            released_parameters.extend(self.released_parameters(callee));
            acquiring |= self.is_acquiring(callee);
        }
        let args = call.term.call_args().unwrap_or(&[]);
        for (index, arg) in args.iter().enumerate() {
            match arg {
                Expression::Var(var) if released_parameters.contains(&index) => {
                    if let Some(previous) = state.release(var, &call.tid) {
                        self.report_double_release(call, var, &previous);
                    }
                }
                Expression::UnOp {
                    op: UnOpType::AddressOf,
                    arg,
                } => {
                    if let Expression::Var(var) = arg.as_ref() {
                        state.escape(var);
                    }
                }
                _ => (),
            }
        }
        if let Some(result_var) = call.term.call_result() {
            state.escape(result_var);
            if acquiring {
                state.acquire(result_var, &call.tid);
            }
        }
    }

    /// Generate a CWE warning for a release of an already (or maybe already) released handle
    /// and send it to the log collector channel.
    fn report_double_release(&self, call: &Term<Jmp>, var: &Variable, previous: &ResourceState) {
        let (description, cause_tid) = match previous {
            ResourceState::Released(release_tid) => (
                format!(
                    "(Double Free) The resource in {} released at {} was already released at {}",
                    var.name, call.tid.address, release_tid.address
                ),
                release_tid,
            ),
            ResourceState::MaybeReleased(acquisition_tid) => (
                format!(
                    "(Double Free) The resource in {} acquired at {} may already have been released when it is released at {}",
                    var.name, acquisition_tid.address, call.tid.address
                ),
                acquisition_tid,
            ),
            _ => return,
        };
        let warning = CweWarning::new("CWE415", CWE_MODULE.version, description)
            .tids(vec![format!("{}", call.tid), format!("{cause_tid}")])
            .addresses(vec![call.tid.address.clone(), cause_tid.address.clone()]);
        let _ = self.log_collector.send(warning.into());
    }
}

impl<'a> crate::analysis::forward_interprocedural_fixpoint::Context<'a> for Context<'a> {
    type Value = State;

    /// Get a reference to the control flow graph.
    fn get_graph(&self) -> &Graph<'a> {
        self.graph
    }

    /// Merge two node states.
    fn merge(&self, state1: &State, state2: &State) -> State {
        state1.merge(state2)
    }

    /// Track handle moves and ends of tracking caused by assignments, loads and stores.
    fn update_def(&self, state: &State, def: &Term<Def>) -> Option<State> {
        let mut state = state.clone();
        match &def.term {
            Def::Assign { var, value } => state.handle_assign(var, value),
            // A value loaded from memory is not a tracked handle.
            Def::Load { var, .. } => state.escape(var),
            // A handle stored into memory escapes the variable level of the analysis.
            Def::Store { value, .. } => match value {
                Expression::Var(var) => state.escape(var),
                Expression::UnOp {
                    op: UnOpType::AddressOf,
                    arg,
                } => {
                    if let Expression::Var(var) = arg.as_ref() {
                        state.escape(var);
                    }
                }
                _ => (),
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

    /// Returns `None`, since the callee does not see the handles of the caller.
    /// Each function is analyzed starting from its own empty entry state.
    fn update_call(&self, _state: &State, _call: &Term<Jmp>, _target: &Node) -> Option<State> {
        None
    }

    /// Apply the resource effects of a call to a function defined in the translation unit.
    ///
    /// The callee is identified through the state that flows out of its return site,
    /// so that calls resolved from function pointers are handled like direct calls.
    fn update_return(
        &self,
        state: Option<&State>,
        state_before_call: Option<&State>,
        call_term: &Term<Jmp>,
        _return_term: &Term<Jmp>,
    ) -> Option<State> {
        let (Some(state_before_return), Some(state_before_call)) = (state, state_before_call)
        else {
            return None;
        };
        let mut state_after_return = state_before_call.clone();
        let callee = state_before_return.current_fn_tid.clone();
        self.apply_call_effects(&mut state_after_return, call_term, &[callee]);
        Some(state_after_return)
    }

    /// Apply the resource effects of calls to extern symbols
    /// and of indirect calls without resolved targets.
    ///
    /// An unresolved indirect call may do anything with the handles passed to it,
    /// so all of them escape the analysis.
    fn update_call_stub(&self, state: &State, call: &Term<Jmp>) -> Option<State> {
        let mut state = state.clone();
        match &call.term {
            Jmp::Call { target, .. } => {
                self.apply_call_effects(&mut state, call, &[target.clone()]);
            }
            Jmp::CallInd {
                resolved_targets,
                args,
                ..
            } => {
                if resolved_targets.is_empty() {
                    for arg in args.iter() {
                        for var in arg.input_vars() {
                            state.escape(var);
                        }
                    }
                    if let Some(result_var) = call.term.call_result() {
                        state.escape(result_var);
                    }
                } else {
                    let targets = resolved_targets.clone();
                    self.apply_call_effects(&mut state, call, &targets);
                }
            }
            _ => (),
        }
        Some(state)
    }

    /// End the tracking of a handle on branches where its acquisition is known to have failed.
    ///
    /// On the branch where a checked handle is proven to hold a failure value,
    /// i.e. NULL or a negative file descriptor,
    /// no resource was acquired and the handle is dropped from the state.
    fn specialize_conditional(
        &self,
        state: &State,
        condition: &Expression,
        _block_before_condition: &Term<Blk>,
        is_true: bool,
    ) -> Option<State> {
        let mut state = state.clone();
        if let Some(var) = failed_handle_of_condition(condition, is_true) {
            state.escape(&var);
        }
        Some(state)
    }
}

/// If the condition proves that the checked variable holds a failure value,
/// i.e. NULL or a negative handle, on the branch given by `is_true`,
/// return that variable.
///
/// Handles `p == NULL`, `p != NULL` (on the false branch), bare `if (p)`
/// (on the false branch), `fd < 0`, `0 <= fd` (on the false branch)
/// and negations thereof.
fn failed_handle_of_condition(condition: &Expression, is_true: bool) -> Option<Variable> {
    use BinOpType::*;
    match condition {
        Expression::UnOp {
            op: UnOpType::BoolNegate,
            arg,
        } => failed_handle_of_condition(arg, !is_true),
        Expression::Var(var) if !is_true => Some(var.clone()),
        Expression::BinOp { op, lhs, rhs } => match (op, lhs.as_ref(), rhs.as_ref()) {
            (IntEqual, Expression::Var(var), Expression::Const(constant))
            | (IntEqual, Expression::Const(constant), Expression::Var(var))
                if constant.value == 0 && is_true =>
            {
                Some(var.clone())
            }
            (IntNotEqual, Expression::Var(var), Expression::Const(constant))
            | (IntNotEqual, Expression::Const(constant), Expression::Var(var))
                if constant.value == 0 && !is_true =>
            {
                Some(var.clone())
            }
            (IntSLess, Expression::Var(var), Expression::Const(constant))
                if constant.value == 0 && is_true =>
            {
                Some(var.clone())
            }
            (IntSLessEqual, Expression::Const(constant), Expression::Var(var))
                if constant.value == 0 && !is_true =>
            {
                Some(var.clone())
            }
            _ => None,
        },
        _ => None,
    }
}
