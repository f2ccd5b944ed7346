//! This module implements a check for CWE-252: Unchecked Return Value.
//!
//! The program does not check the return value of a function that can fail,
//! e.g. of `read` or `malloc`.
//! Ignored error conditions tend to surface later as crashes or silent data corruption
//! far away from the call that actually failed.
//!
//! See <https://cwe.mitre.org/data/definitions/252.html> for a detailed description.
//!
//! ## How the check works
//!
//! A call is considered fallible if its callee is either an extern symbol
//! configured as fallible (see the `error_contracts` configuration section),
//! an extern symbol listed in the `symbols` field of this check's configuration,
//! or a function of the translation unit with a learned error contract
//! (see the [`error_contracts`](crate::analysis::error_contracts) analysis).
//! For each fallible call site the bound result is followed forward through the function,
//! including through copies and derived values.
//! The call site is clean if the value reaches a branch condition before it dies
//! or if the obligation is delegated to someone else,
//! i.e. the value is returned to the caller, passed to another call or stored to memory.
//! A warning is generated if the result is ignored outright
//! or if it is dead or unchecked on every explored path.
//!
//! ## False Positives
//!
//! - Results that are checked through means the analysis does not see,
//! e.g. after being read back from memory, are reported as unchecked.
//!
//! ## False Negatives
//!
//! - Delegation is trusted blindly: a value passed to a call or stored to memory
//! counts as handled even if the receiver never looks at it.
//! - Functions exceeding the configured exploration limit are assumed to check the value.

use crate::analysis::error_contracts::ErrorContracts;
use crate::analysis::function_pointers::FunctionPointers;
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::{CweWarning, LogMessage};
use crate::utils::symbol_utils::get_symbol_map;
use crate::CweModule;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// The module name and version
pub static CWE_MODULE: CweModule = CweModule {
    name: "CWE252",
    version: "0.1",
    run: check_cwe,
};

/// The configuration struct
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Additional extern symbols whose return value must be checked,
    /// on top of the fallible symbols known to the contract learner.
    symbols: Vec<String>,
    /// The maximum number of block visits when following one return value.
    /// If the limit is hit the value is assumed to be checked somewhere beyond the explored region.
    forward_depth_limit: u64,
}

/// Follow the bound result of a call forward through its function.
///
/// Returns true if the value reaches a branch condition on some path
/// or if the obligation to check it is delegated,
/// i.e. the value is returned, passed to another call or stored to memory.
/// Copies and values derived from the result carry the obligation with them.
/// Returns false if the value dies or reaches a function return unchecked on all paths.
fn value_reaches_check(
    sub: &Term<Sub>,
    start_block: &Tid,
    result_var: &Variable,
    depth_limit: u64,
) -> bool {
    let blocks: HashMap<&Tid, &Term<Blk>> = sub
        .term
        .blocks
        .iter()
        .map(|block| (&block.tid, block))
        .collect();
    let mut worklist =
        VecDeque::from([(start_block.clone(), BTreeSet::from([result_var.clone()]))]);
    let mut visited = HashSet::new();
    let mut visits = 0u64;
    while let Some((block_tid, mut carriers)) = worklist.pop_front() {
        if !visited.insert((block_tid.clone(), carriers.clone())) {
            continue;
        }
        visits += 1;
        if visits > depth_limit {
            return true;
        }
        let Some(block) = blocks.get(&block_tid) else {
            continue;
        };
        for def in block.term.defs.iter() {
            match &def.term {
                Def::Assign { var, value } => {
                    if value.input_vars().into_iter().any(|v| carriers.contains(v)) {
                        carriers.insert(var.clone());
                    } else {
                        carriers.remove(var);
                    }
                }
                Def::Load { var, .. } => {
                    carriers.remove(var);
                }
                Def::Store { value, .. } => {
                    if value.input_vars().into_iter().any(|v| carriers.contains(v)) {
                        return true;
                    }
                }
            }
        }
        if carriers.is_empty() {
            continue;
        }
        for jmp in block.term.jmps.iter() {
            match &jmp.term {
                Jmp::CBranch { condition, .. } => {
                    if condition
                        .input_vars()
                        .into_iter()
                        .any(|v| carriers.contains(v))
                    {
                        return true;
                    }
                }
                Jmp::Return(Some(value)) => {
                    if value.input_vars().into_iter().any(|v| carriers.contains(v)) {
                        return true;
                    }
                }
                Jmp::Call { args, .. } | Jmp::CallInd { args, .. } => {
                    if args
                        .iter()
                        .flat_map(|arg| arg.input_vars())
                        .any(|v| carriers.contains(v))
                    {
                        return true;
                    }
                    // The new call result overwrites the carrier in the successor block.
                    if let Some(result) = jmp.term.call_result() {
                        carriers.remove(result);
                    }
                }
                _ => (),
            }
        }
        if carriers.is_empty() {
            continue;
        }
        for jmp in block.term.jmps.iter() {
            if let Some(target) = jmp.get_intraprocedural_target_or_return_block_tid() {
                worklist.push_back((target, carriers.clone()));
            }
        }
    }
    false
}

/// The name of the function or extern symbol with the given TID.
fn callee_name(project: &Project, tid: &Tid) -> String {
    if let Some(sub) = project.program.term.subs.get(tid) {
        return sub.term.name.clone();
    }
    if let Some(symbol) = project.program.term.extern_symbols.get(tid) {
        return symbol.name.clone();
    }
    format!("{tid}")
}

fn generate_cwe_warning(jmp: &Term<Jmp>, callee: &str, reason: &str) -> CweWarning {
    CweWarning::new(
        CWE_MODULE.name,
        CWE_MODULE.version,
        format!(
            "(Unchecked Return Value) Return value of {} at {} {}",
            callee, jmp.tid.address, reason
        ),
    )
    .tids(vec![format!("{}", jmp.tid)])
    .addresses(vec![jmp.tid.address.clone()])
    .symbols(vec![callee.to_string()])
}

/// Execute the CWE check.
///
/// For each call site with a fallible callee the bound result is followed forward.
/// One warning is generated per unchecked call site.
pub fn check_cwe(
    analysis_results: &AnalysisResults,
    cwe_params: &serde_json::Value,
) -> (Vec<LogMessage>, Vec<CweWarning>) {
    let config: Config = serde_json::from_value(cwe_params.clone()).unwrap();
    let project = analysis_results.project;
    let error_contracts = analysis_results.error_contracts.unwrap();
    let function_pointers = analysis_results.function_pointers.unwrap();
    let extra_fallible_symbols = get_symbol_map(project, &config.symbols);
    let is_fallible = |callee: &Tid| {
        error_contracts.is_fallible(callee) || extra_fallible_symbols.contains_key(callee)
    };

    let mut cwe_warnings = Vec::new();
    let mut reported_sites = BTreeSet::new();
    for sub in project.program.term.subs.values() {
        for block in sub.term.blocks.iter() {
            for jmp in block.term.jmps.iter() {
                let callees = match &jmp.term {
                    Jmp::Call { target, .. } => vec![target.clone()],
                    Jmp::CallInd { .. } => function_pointers
                        .targets_of_call(&jmp.tid)
                        .map(|targets| targets.iter().cloned().collect())
                        .unwrap_or_default(),
                    _ => continue,
                };
                let Some(fallible_callee) = callees.iter().find(|callee| is_fallible(callee))
                else {
                    continue;
                };
                if !reported_sites.insert(jmp.tid.clone()) {
                    continue;
                }
                let callee = callee_name(project, fallible_callee);
                match jmp.term.call_result() {
                    None => {
                        cwe_warnings.push(generate_cwe_warning(jmp, &callee, "is ignored"));
                    }
                    Some(result_var) => {
                        let Some(return_block) = jmp.term.call_return_target() else {
                            continue;
                        };
                        if !value_reaches_check(
                            sub,
                            return_block,
                            result_var,
                            config.forward_depth_limit,
                        ) {
                            cwe_warnings.push(generate_cwe_warning(
                                jmp,
                                &callee,
                                "is never checked",
                            ));
                        }
                    }
                }
            }
        }
    }

    (Vec::new(), cwe_warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_project;

    /// Parse the source and follow the result of the first call to `read`
    /// inside the function with the given name.
    fn read_result_reaches_check(source: &str, fn_name: &str) -> bool {
        let mut project = parse_project(source, "fixture.c").unwrap();
        project.normalize();
        let read_tid = project.program.term.find_callable_by_name("read").unwrap();
        let sub_tid = project.program.term.find_callable_by_name(fn_name).unwrap();
        let sub = &project.program.term.subs[&sub_tid];
        let (result_var, return_block) = sub
            .term
            .blocks
            .iter()
            .flat_map(|block| block.term.jmps.iter())
            .find_map(|jmp| match &jmp.term {
                Jmp::Call { target, result, return_, .. } if *target == read_tid => {
                    Some((result.clone().unwrap(), return_.clone().unwrap()))
                }
                _ => None,
            })
            .unwrap();
        value_reaches_check(sub, &return_block, &result_var, 64)
    }

    #[test]
    fn branch_conditions_count_as_checks() {
        let source = r#"
            int guarded(int fd) {
                char buf[8];
                int n = read(fd, buf, 4);
                if (n < 0) {
                    return -1;
                }
                return 0;
            }
        "#;
        assert!(read_result_reaches_check(source, "guarded"));
    }

    #[test]
    fn unchecked_results_are_found() {
        let source = r#"
            int sloppy(int fd) {
                char buf[8];
                int n = read(fd, buf, 4);
                return 0;
            }
        "#;
        assert!(!read_result_reaches_check(source, "sloppy"));
    }

    #[test]
    fn overwriting_kills_the_obligation() {
        let source = r#"
            int clobber(int fd) {
                char buf[8];
                int n = read(fd, buf, 4);
                n = 0;
                if (n < 0) {
                    return -1;
                }
                return 0;
            }
        "#;
        assert!(!read_result_reaches_check(source, "clobber"));
    }

    #[test]
    fn delegation_counts_as_handled() {
        let returned = r#"
            int passthrough(int fd) {
                char buf[8];
                int n = read(fd, buf, 4);
                return n;
            }
        "#;
        assert!(read_result_reaches_check(returned, "passthrough"));

        let passed_on = r#"
            int handoff(int fd) {
                char buf[8];
                int n = read(fd, buf, 4);
                report(n);
                return 0;
            }
        "#;
        assert!(read_result_reaches_check(passed_on, "handoff"));

        let derived = r#"
            int derived(int fd) {
                char buf[8];
                int n = read(fd, buf, 4);
                int doubled = n + n;
                if (doubled < 0) {
                    return -1;
                }
                return 0;
            }
        "#;
        assert!(read_result_reaches_check(derived, "derived"));
    }
}
