//! This module implements a check for CWE-476: NULL Pointer Dereference
//! at indirect call sites.
//!
//! Dispatching a call through a function pointer that may be NULL
//! or that may never have been assigned crashes the program
//! or, for attacker-mapped null pages, can lead to arbitrary code execution.
//! Dispatch tables filled at runtime (e.g. format handler lists)
//! are the typical source of such pointers.
//!
//! See <https://cwe.mitre.org/data/definitions/476.html> for a detailed description.
//!
//! ## How the check works
//!
//! The check combines the flow-insensitive
//! [function pointer analysis](`crate::analysis::function_pointers`)
//! with a forward, path-aware fixpoint computation.
//! The pointer analysis flags each dispatch cell as possibly NULL
//! or possibly unassigned.
//! The fixpoint computation tracks which places have been proven non-NULL
//! on the current path,
//! either by an explicit NULL check guarding the dispatch
//! or by a store of a definite function address earlier in the same path.
//! A warning is only generated for dispatch sites where the flagged cell
//! reaches the call without such a proof.
//!
//! With the strict dispatch policy enabled in the check configuration
//! every unguarded dispatch through a struct field is reported,
//! even if no NULL value was observed flowing into the field.
//!
//! ## False Positives
//!
//! - The pointer analysis collapses all instances of a struct into one cell.
//! A NULL stored into the field of one instance taints the dispatches
//! through the same field of every other instance.
//! - NULL checks that the lowering cannot match to the dispatched place
//! (e.g. checks through a second pointer to the same location) are not recognized as proofs.
//!
//! ## False Negatives
//!
//! - NULL values flowing through expressions the pointer analysis does not model
//! (e.g. pointer arithmetic) are missed.
//! - A proof established on one path suppresses the warning for the whole call site,
//! so sites that are guarded on one path and unguarded on another may go unreported
//! if only the guarded path reaches the fixpoint value.

use crate::prelude::*;
use crate::utils::log::CweWarning;
use crate::utils::log::LogMessage;
use crate::utils::log::LogThread;
use crate::CweModule;

/// The module name and version
pub static CWE_MODULE: CweModule = CweModule {
    name: "CWE476",
    version: "0.1",
    run: check_cwe,
};

mod context;
use context::Context;
mod state;
use state::State;

/// The configuration struct.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Config {
    /// If set, report every dispatch through a struct field
    /// that is not guarded by a NULL check,
    /// regardless of whether a NULL was seen flowing into the field.
    strict_dispatch_policy: bool,
}

/// Run the check for CWE-476: NULL Pointer Dereference at indirect call sites.
///
/// This function prepares the forward fixpoint computation
/// by initializing the state at the start of each function with the empty state
/// (i.e. no places proven non-NULL)
/// and then executing the fixpoint algorithm.
/// Dispatch sites are checked and reported by the transfer functions along the way.
/// Returns collected log messages and CWE warnings.
pub fn check_cwe(
    analysis_results: &AnalysisResults,
    cwe_params: &serde_json::Value,
) -> (Vec<LogMessage>, Vec<CweWarning>) {
    let config: Config = serde_json::from_value(cwe_params.clone()).unwrap();
    let log_thread = LogThread::spawn(LogThread::collect_and_deduplicate);
    let context = Context::new(analysis_results, config, log_thread.get_msg_sender());

    let mut fixpoint_computation =
        crate::analysis::forward_interprocedural_fixpoint::create_computation(context, None);

    for (sub_tid, entry_node_of_sub) in
        crate::analysis::graph::get_entry_nodes_of_subs(analysis_results.control_flow_graph)
    {
        let fn_start_state = State::new(sub_tid);
        fixpoint_computation.set_node_value(
            entry_node_of_sub,
            crate::analysis::interprocedural_fixpoint_generic::NodeValue::Value(fn_start_state),
        );
    }

    fixpoint_computation.compute_with_max_steps(100);
    let (logs, cwe_warnings) = log_thread.collect();
    (logs, cwe_warnings)
}
