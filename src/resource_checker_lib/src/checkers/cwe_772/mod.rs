//! This module implements a check for CWE-772: Missing Release of Resource after Effective Lifetime
//! and for CWE-415: Double Free.
//!
//! Resources like file descriptors or allocated memory that are not released
//! after use exhaust the corresponding resource pool over time,
//! which degrades performance or crashes the program.
//! Releasing the same resource twice corrupts the management state of the resource pool
//! and can free an unrelated resource currently using the same handle.
//!
//! See <https://cwe.mitre.org/data/definitions/772.html>
//! and <https://cwe.mitre.org/data/definitions/415.html> for detailed descriptions.
//!
//! ## How the check works
//!
//! Using a forward fixpoint computation on the control flow graph
//! the check tracks for each variable holding a resource handle
//! whether the resource was acquired, released
//! or released on only some of the paths to the current program point.
//! Which functions acquire and which release is taken from the learned
//! [error contracts](`crate::analysis::error_contracts`),
//! extended by the acquire and release symbol lists of the check configuration.
//! Release wrappers and acquirers defined in the translation unit
//! are thereby handled like the library functions they wrap.
//! On branches where a checked handle provably holds a failure value,
//! e.g. behind `if (fd < 0)` or `if (buf == NULL)`,
//! the tracking of the handle ends, since no resource was acquired on that path.
//!
//! A release of an already released handle generates a CWE-415 warning at the release site.
//! At each return site the remaining tracked handles are inspected:
//! every handle still holding an acquired resource that is not returned to the caller
//! generates a CWE-772 warning at the acquisition site.
//!
//! ## False Positives
//!
//! - Resources released on some paths and leaked on others are reported with
//! lower confidence, since the analysis cannot always rule out the leaking paths.
//! - A resource passed to an extern function that takes ownership of it
//! (without being configured as a releasing symbol) is still tracked in the caller
//! and may be falsely reported as leaked.
//!
//! ## False Negatives
//!
//! - Handles are tracked per variable.
//! A handle stored into memory or aliased through a second variable before the double release
//! escapes the analysis and related CWEs are missed.
//! - A handle overwritten while still holding an acquired resource leaks that resource,
//! but the leak is not detected since the tracking ends with the overwrite.

use crate::analysis::fixpoint::Computation;
use crate::analysis::forward_interprocedural_fixpoint::GeneralizedContext;
use crate::analysis::graph::Node;
use crate::analysis::interprocedural_fixpoint_generic::NodeValue;
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::CweWarning;
use crate::utils::log::LogMessage;
use crate::utils::log::LogThread;
use crate::CweModule;
use std::collections::BTreeSet;

/// The module name and version
pub static CWE_MODULE: CweModule = CweModule {
    name: "CWE772",
    version: "0.1",
    run: check_cwe,
};

mod context;
use context::Context;
mod state;
use state::{ResourceState, State};

/// The configuration struct.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Config {
    /// If set, resources that are released on some but not all paths to a return site
    /// are also reported as possible leaks (with lower confidence).
    report_maybe_released: bool,
    /// Acquiring symbols in addition to the allocation symbols
    /// of the error contract configuration.
    acquire_symbols: Vec<String>,
    /// Releasing symbols in addition to the release symbols
    /// of the error contract configuration.
    /// By convention these release the resource passed as their first argument.
    release_symbols: Vec<String>,
}

/// Run the check for CWE-772: Missing Release of Resource after Effective Lifetime.
///
/// This function prepares the forward fixpoint computation
/// by initializing the state at the start of each function with the empty state
/// (i.e. no tracked handles)
/// and then executing the fixpoint algorithm.
/// Double releases are reported by the transfer functions along the way.
/// Afterwards the computed states at all return sites are scanned for leaked resources.
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
        fixpoint_computation.set_node_value(entry_node_of_sub, NodeValue::Value(fn_start_state));
    }

    fixpoint_computation.compute_with_max_steps(100);
    report_leaked_resources(&fixpoint_computation);

    let (logs, cwe_warnings) = log_thread.collect();
    (logs, cwe_warnings)
}

/// Scan the computed states at all return sites for tracked handles
/// that still hold an acquired resource
/// and generate a CWE warning for each leaked acquisition.
///
/// Warnings are deduplicated by acquisition site,
/// since several return sites may leak the same resource.
fn report_leaked_resources<'a>(
    computation: &Computation<GeneralizedContext<'a, Context<'a>>>,
) {
    let context = computation.get_context().get_context();
    let graph = context.graph;
    let mut reported_acquisitions = BTreeSet::new();
    for node in graph.node_indices() {
        let Node::BlkEnd(block, _sub) = graph[node] else {
            continue;
        };
        let Some(return_jmp) = block
            .term
            .jmps
            .iter()
            .find(|jmp| matches!(jmp.term, Jmp::Return(_)))
        else {
            continue;
        };
        let Some(NodeValue::Value(state)) = computation.get_node_value(node) else {
            continue;
        };
        let returned_var = match &return_jmp.term {
            Jmp::Return(Some(Expression::Var(var))) => Some(var),
            _ => None,
        };
        for (var, resource_state) in state.leaked_resources(returned_var) {
            let (acquisition_tid, maybe) = match &resource_state {
                ResourceState::Acquired(tid) => (tid, false),
                ResourceState::MaybeReleased(tid) => (tid, true),
                _ => continue,
            };
            if maybe && !context.config.report_maybe_released {
                continue;
            }
            if !reported_acquisitions.insert(acquisition_tid.clone()) {
                continue;
            }
            let warning = generate_leak_warning(&var, acquisition_tid, &return_jmp.tid, maybe);
            let _ = context.log_collector.send(warning.into());
        }
    }
}

/// Generate a CWE warning for a resource acquired at `acquisition_tid`
/// that is not (or maybe not) released
/// when the function returns at `return_tid`.
fn generate_leak_warning(
    var: &Variable,
    acquisition_tid: &Tid,
    return_tid: &Tid,
    maybe: bool,
) -> CweWarning {
    let description = if maybe {
        format!(
            "(Missing Release of Resource) The resource in {} acquired at {} may not be released on all paths to the return at {}",
            var.name, acquisition_tid.address, return_tid.address
        )
    } else {
        format!(
            "(Missing Release of Resource) The resource in {} acquired at {} is not released before the function returns at {}",
            var.name, acquisition_tid.address, return_tid.address
        )
    };
    let mut warning = CweWarning::new(CWE_MODULE.name, CWE_MODULE.version, description)
        .tids(vec![format!("{acquisition_tid}")])
        .addresses(vec![
            acquisition_tid.address.clone(),
            return_tid.address.clone(),
        ]);
    if maybe {
        warning = warning.other(vec![vec!["confidence".to_string(), "maybe".to_string()]]);
    }
    warning
}
