//! Learning per-function error contracts from guarded error paths.
//!
//! The analysis starts from configured base facts about extern symbols:
//! which of them can fail (and whether failure shows as a negative return value
//! or as a `NULL` return), which release one of their parameters
//! and which return freshly acquired resources.
//! Everything else is learned from the program itself:
//!
//! 1. Functions that pass one of their parameters to a release extern
//!    (directly or through another wrapper) are classified as *release wrappers*.
//!    Functions that return the result of an allocation extern or of another
//!    acquirer, including through resolved indirect calls, are classified as *acquirers*.
//! 2. A conditional jump that checks the bound result of a fallible call
//!    against its configured error condition opens an *error region*
//!    on the failing branch, extending intraprocedurally until return.
//! 3. Constant negative return values inside an error region are learned
//!    as error *sentinels* of the function and of the whole translation unit.
//! 4. Calls inside an error region are partitioned into *cleanup actions*
//!    (the callee releases a parameter) and *reporting actions*
//!    (a void function of the translation unit that releases nothing).
//! 5. After learning, the sentinel set is generalized module-wide:
//!    a function returning a known sentinel constant on some path
//!    receives a contract for it even when its guard is not a fallible-call check,
//!    and void functions called on such paths count as reporting helpers too.
//!
//! All learned facts produce debug log messages naming their evidence,
//! so that contract learning stays explainable.

use crate::analysis::callgraph::get_program_callgraph;
use crate::analysis::function_pointers::FunctionPointers;
use crate::analysis::graph::{Graph, Node};
use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::graph_utils::intraprocedural_reachable_nodes;
use crate::utils::log::LogMessage;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// How a fallible extern symbol signals failure to its caller.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum FallibleKind {
    /// Failure is signalled through a negative return value (e.g. `read`).
    NegativeReturn,
    /// Failure is signalled through a `NULL` return value (e.g. `malloc`).
    NullReturn,
}

/// The configured base facts of the contract learner,
/// deserialized from the `error_contracts` section of the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Fallible extern symbols and their error conditions.
    fallible: FallibleConfig,
    /// Release extern symbols, mapped to the index of the parameter they release.
    release: BTreeMap<String, usize>,
    /// Extern symbols whose return value is a freshly acquired resource.
    allocation: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct FallibleConfig {
    /// Symbols returning a negative value on failure.
    negative_return: Vec<String>,
    /// Symbols returning `NULL` on failure.
    null_return: Vec<String>,
}

/// The learned error behavior of one function of the translation unit.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct FunctionContract {
    /// Constant error return values (sentinels) of the function,
    /// learned from its own guarded error paths or adopted through generalization.
    pub error_return_values: BTreeSet<i64>,
    /// Indices of formal parameters that the function releases when called.
    pub releases_parameters: BTreeSet<usize>,
    /// Set if the function may return a freshly acquired resource.
    pub is_acquirer: bool,
    /// Set if the function is a void reporting helper called on error paths.
    pub is_reporting: bool,
}

/// The output of the contract learner.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct ErrorContracts {
    /// The contracts of all functions for which something was learned.
    /// Functions without learned facts have no entry.
    pub contracts: BTreeMap<Tid, FunctionContract>,
    /// All error sentinels learned anywhere in the translation unit.
    pub learned_sentinels: BTreeSet<i64>,
    /// Resolved fallible extern symbols (base facts).
    fallible_externs: BTreeMap<Tid, FallibleKind>,
    /// Resolved release extern symbols and their released parameter index (base facts).
    release_externs: BTreeMap<Tid, usize>,
    /// Resolved allocation extern symbols (base facts).
    allocation_externs: BTreeSet<Tid>,
}

impl ErrorContracts {
    /// Return the learned contract of the given function, if any.
    pub fn contract(&self, tid: &Tid) -> Option<&FunctionContract> {
        self.contracts.get(tid)
    }

    /// Check whether calls to the given function can fail,
    /// either per configured base fact or per learned error contract.
    pub fn is_fallible(&self, callee: &Tid) -> bool {
        self.fallible_externs.contains_key(callee)
            || self
                .contracts
                .get(callee)
                .map_or(false, |contract| !contract.error_return_values.is_empty())
    }

    /// Return the indices of the parameters that a call to the given function releases.
    pub fn released_parameters(&self, callee: &Tid) -> BTreeSet<usize> {
        if let Some(index) = self.release_externs.get(callee) {
            return BTreeSet::from([*index]);
        }
        self.contracts
            .get(callee)
            .map(|contract| contract.releases_parameters.clone())
            .unwrap_or_default()
    }

    /// Check whether the given function returns a freshly acquired resource,
    /// either as configured allocation extern or as learned acquirer wrapper.
    pub fn is_acquiring(&self, callee: &Tid) -> bool {
        self.allocation_externs.contains(callee)
            || self
                .contracts
                .get(callee)
                .map_or(false, |contract| contract.is_acquirer)
    }

    /// Check whether the given function is a reporting helper.
    pub fn is_reporting(&self, callee: &Tid) -> bool {
        self.contracts
            .get(callee)
            .map_or(false, |contract| contract.is_reporting)
    }
}

/// Learn the error contracts of all functions of the project.
///
/// Expects the control flow graph of the program
/// and the already computed function pointer resolution,
/// so that indirect calls take part in wrapper classification.
pub fn compute_error_contracts(
    project: &Project,
    graph: &Graph,
    function_pointers: &FunctionPointers,
    config: &Config,
) -> (ErrorContracts, Vec<LogMessage>) {
    let mut learner = ContractLearner::new(project, graph, function_pointers, config);
    learner.classify_wrappers();
    learner.learn_guarded_regions();
    learner.generalize_sentinels();
    learner.into_results()
}

struct ContractLearner<'a> {
    project: &'a Project,
    graph: &'a Graph<'a>,
    function_pointers: &'a FunctionPointers,
    /// Base facts resolved to extern symbol TIDs.
    fallible_externs: BTreeMap<Tid, FallibleKind>,
    release_externs: BTreeMap<Tid, usize>,
    allocation_externs: BTreeSet<Tid>,
    /// The `BlkStart` node of each block of the program.
    block_start_nodes: HashMap<Tid, NodeIndex>,
    /// Learned facts, keyed by the TIDs of defined functions.
    releases: BTreeMap<Tid, BTreeSet<usize>>,
    acquirers: BTreeSet<Tid>,
    reporting: BTreeSet<Tid>,
    sentinels: BTreeMap<Tid, BTreeSet<i64>>,
    module_sentinels: BTreeSet<i64>,
    /// For each module-wide sentinel the function it was first learned from.
    sentinel_provenance: BTreeMap<i64, Tid>,
    /// Error branch targets already processed during guarded learning.
    processed_regions: HashSet<(Tid, Tid)>,
    logs: Vec<LogMessage>,
}

impl<'a> ContractLearner<'a> {
    fn new(
        project: &'a Project,
        graph: &'a Graph<'a>,
        function_pointers: &'a FunctionPointers,
        config: &Config,
    ) -> ContractLearner<'a> {
        let mut fallible_externs = BTreeMap::new();
        let mut release_externs = BTreeMap::new();
        let mut allocation_externs = BTreeSet::new();
        for symbol in project.program.term.extern_symbols.values() {
            if config.fallible.negative_return.contains(&symbol.name) {
                fallible_externs.insert(symbol.tid.clone(), FallibleKind::NegativeReturn);
            } else if config.fallible.null_return.contains(&symbol.name) {
                fallible_externs.insert(symbol.tid.clone(), FallibleKind::NullReturn);
            }
            if let Some(index) = config.release.get(&symbol.name) {
                release_externs.insert(symbol.tid.clone(), *index);
            }
            if config.allocation.contains(&symbol.name) {
                allocation_externs.insert(symbol.tid.clone());
            }
        }
        let mut block_start_nodes = HashMap::new();
        for node in graph.node_indices() {
            if let Node::BlkStart(block, _sub) = graph[node] {
                block_start_nodes.insert(block.tid.clone(), node);
            }
        }
        ContractLearner {
            project,
            graph,
            function_pointers,
            fallible_externs,
            release_externs,
            allocation_externs,
            block_start_nodes,
            releases: BTreeMap::new(),
            acquirers: BTreeSet::new(),
            reporting: BTreeSet::new(),
            sentinels: BTreeMap::new(),
            module_sentinels: BTreeSet::new(),
            sentinel_provenance: BTreeMap::new(),
            processed_regions: HashSet::new(),
            logs: Vec::new(),
        }
    }

    /// The possible callees of a call jump.
    /// Direct calls have exactly one, indirect calls all their resolved targets.
    fn callees_of_jmp(&self, jmp: &Term<Jmp>) -> Vec<Tid> {
        match &jmp.term {
            Jmp::Call { target, .. } => vec![target.clone()],
            Jmp::CallInd { .. } => self
                .function_pointers
                .targets_of_call(&jmp.tid)
                .map(|targets| targets.iter().cloned().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn released_parameters(&self, callee: &Tid) -> BTreeSet<usize> {
        if let Some(index) = self.release_externs.get(callee) {
            return BTreeSet::from([*index]);
        }
        self.releases.get(callee).cloned().unwrap_or_default()
    }

    fn is_acquiring(&self, callee: &Tid) -> bool {
        self.allocation_externs.contains(callee) || self.acquirers.contains(callee)
    }

    /// Classify release wrappers and acquirers bottom-up over the call graph,
    /// iterating until the classification is stable.
    ///
    /// The strongly connected components of the call graph are visited
    /// in reverse topological order, so callees are classified before their callers
    /// and the classification of call chains without recursion stabilizes in one pass.
    fn classify_wrappers(&mut self) {
        let project = self.project;
        let callgraph = get_program_callgraph(&project.program);
        let bottom_up_order: Vec<Tid> = tarjan_scc(&callgraph)
            .into_iter()
            .flatten()
            .map(|node| callgraph[node].clone())
            .collect();
        loop {
            let mut changed = false;
            for sub_tid in bottom_up_order.iter() {
                let sub = &project.program.term.subs[sub_tid];
                let mut acquired_vars: HashSet<&Variable> = HashSet::new();
                for block in sub.term.blocks.iter() {
                    for jmp in block.term.jmps.iter() {
                        let Some(args) = jmp.term.call_args() else {
                            continue;
                        };
                        for callee in self.callees_of_jmp(jmp) {
                            for index in self.released_parameters(&callee) {
                                if let Some(Expression::Var(var)) = args.get(index) {
                                    if let Some(param_index) = sub.param_index(var) {
                                        changed |= self
                                            .releases
                                            .entry(sub.tid.clone())
                                            .or_default()
                                            .insert(param_index);
                                    }
                                }
                            }
                            if self.is_acquiring(&callee) {
                                if let Some(result_var) = jmp.term.call_result() {
                                    acquired_vars.insert(result_var);
                                }
                            }
                        }
                    }
                }
                if !self.acquirers.contains(&sub.tid) {
                    let returns_acquired_value = sub.term.blocks.iter().flat_map(|block| block.term.jmps.iter()).any(
                        |jmp| {
                            matches!(&jmp.term, Jmp::Return(Some(Expression::Var(var))) if acquired_vars.contains(var))
                        },
                    );
                    if returns_acquired_value {
                        self.acquirers.insert(sub.tid.clone());
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        for (tid, indices) in self.releases.clone() {
            for index in indices {
                self.logs.push(
                    LogMessage::new_debug(format!(
                        "Classified {tid} as a release wrapper for parameter {index}"
                    ))
                    .location(tid.clone())
                    .source("Contract Learner"),
                );
            }
        }
        for tid in self.acquirers.clone() {
            self.logs.push(
                LogMessage::new_debug(format!("Classified {tid} as an acquirer"))
                    .location(tid.clone())
                    .source("Contract Learner"),
            );
        }
    }

    /// The result variables of calls to fallible extern symbols inside the given function.
    fn fallible_result_vars(&self, sub: &Term<Sub>) -> HashMap<Variable, FallibleKind> {
        let mut result_vars = HashMap::new();
        for block in sub.term.blocks.iter() {
            for jmp in block.term.jmps.iter() {
                let Some(result_var) = jmp.term.call_result() else {
                    continue;
                };
                for callee in self.callees_of_jmp(jmp) {
                    if let Some(kind) = self.fallible_externs.get(&callee) {
                        result_vars.insert(result_var.clone(), *kind);
                    }
                }
            }
        }
        result_vars
    }

    /// Learn sentinels and error actions from fallible-result checks (steps 2 to 4).
    fn learn_guarded_regions(&mut self) {
        let project = self.project;
        for sub in project.program.term.subs.values() {
            let fallible_vars = self.fallible_result_vars(sub);
            if fallible_vars.is_empty() {
                continue;
            }
            for block in sub.term.blocks.iter() {
                let Some((guard_tid, error_target)) =
                    self.error_branch_of_block(block, &fallible_vars)
                else {
                    continue;
                };
                self.processed_regions
                    .insert((guard_tid.clone(), error_target.clone()));
                self.process_error_region(sub, &guard_tid, &error_target, true);
            }
        }
    }

    /// If the block ends in a conditional jump checking a fallible result,
    /// return the TID of the guard jump and the TID of the block the error branch leads to.
    fn error_branch_of_block(
        &self,
        block: &Term<Blk>,
        fallible_vars: &HashMap<Variable, FallibleKind>,
    ) -> Option<(Tid, Tid)> {
        let [conditional, fallthrough] = &block.term.jmps[..] else {
            return None;
        };
        let Jmp::CBranch { target, condition } = &conditional.term else {
            return None;
        };
        let error_on_true = error_check_of_condition(condition, fallible_vars)?;
        let error_target = if error_on_true {
            target.clone()
        } else {
            match &fallthrough.term {
                Jmp::Branch(fallthrough_target) => fallthrough_target.clone(),
                _ => return None,
            }
        };
        Some((conditional.tid.clone(), error_target))
    }

    /// The blocks of the given function reachable from the given block
    /// without leaving the function.
    fn region_blocks(&self, sub: &Term<Sub>, region_entry: &Tid) -> Vec<&'a Term<Blk>> {
        let Some(start_node) = self.block_start_nodes.get(region_entry) else {
            return Vec::new();
        };
        intraprocedural_reachable_nodes(self.graph, *start_node)
            .into_iter()
            .filter_map(|node| match self.graph[node] {
                Node::BlkEnd(block, node_sub) if node_sub.tid == sub.tid => Some(block),
                _ => None,
            })
            .collect()
    }

    /// Walk one error region: learn (or adopt) sentinels from constant negative returns
    /// and partition the calls of the region into cleanup and reporting actions.
    fn process_error_region(
        &mut self,
        sub: &Term<Sub>,
        guard_tid: &Tid,
        region_entry: &Tid,
        learn_new_sentinels: bool,
    ) {
        let mut cleanup_actions = 0;
        let mut reporting_actions = 0;
        let mut found_sentinels = Vec::new();
        for block in self.region_blocks(sub, region_entry) {
            for jmp in block.term.jmps.iter() {
                match &jmp.term {
                    Jmp::Return(Some(value)) => {
                        if let Some(constant) = value.as_const() {
                            if constant.value < 0 {
                                found_sentinels.push(constant.value);
                            }
                        }
                    }
                    Jmp::Call { .. } | Jmp::CallInd { .. } => {
                        let callees = self.callees_of_jmp(jmp);
                        let releases_something = callees
                            .iter()
                            .any(|callee| !self.released_parameters(callee).is_empty());
                        if releases_something {
                            cleanup_actions += 1;
                        } else if callees.iter().any(|callee| self.is_void_function(callee)) {
                            reporting_actions += 1;
                            for callee in callees {
                                self.mark_reporting(&callee);
                            }
                        }
                    }
                    _ => (),
                }
            }
        }

        let mut learned_something = false;
        for value in found_sentinels {
            if learn_new_sentinels {
                self.sentinels
                    .entry(sub.tid.clone())
                    .or_default()
                    .insert(value);
                if self.module_sentinels.insert(value) {
                    self.sentinel_provenance.insert(value, sub.tid.clone());
                }
                self.logs.push(
                    LogMessage::new_debug(format!(
                        "Learned error return value {value} of {} from a guarded error path",
                        sub.term.name
                    ))
                    .location(guard_tid.clone())
                    .source("Contract Learner"),
                );
                learned_something = true;
            } else if self.module_sentinels.contains(&value) {
                let adopted = self
                    .sentinels
                    .entry(sub.tid.clone())
                    .or_default()
                    .insert(value);
                if adopted {
                    let origin = self
                        .sentinel_provenance
                        .get(&value)
                        .map(|tid| format!("{tid}"))
                        .unwrap_or_else(|| "unknown".to_string());
                    self.logs.push(
                        LogMessage::new_debug(format!(
                            "Generalized error return value {value} to {} (learned from {origin})",
                            sub.term.name
                        ))
                        .location(guard_tid.clone())
                        .source("Contract Learner"),
                    );
                }
                learned_something = true;
            }
        }
        if learned_something || cleanup_actions + reporting_actions > 0 {
            self.logs.push(
                LogMessage::new_debug(format!(
                    "Error region in {} has {cleanup_actions} cleanup and {reporting_actions} reporting actions",
                    sub.term.name
                ))
                .location(guard_tid.clone())
                .source("Contract Learner"),
            );
        }
    }

    /// Check whether the given TID belongs to a defined function that never returns a value.
    fn is_void_function(&self, tid: &Tid) -> bool {
        let Some(sub) = self.project.program.term.subs.get(tid) else {
            return false;
        };
        sub.term
            .blocks
            .iter()
            .flat_map(|block| block.term.jmps.iter())
            .all(|jmp| !matches!(&jmp.term, Jmp::Return(Some(_))))
    }

    fn mark_reporting(&mut self, callee: &Tid) {
        if self.project.program.term.subs.contains_key(callee) && self.reporting.insert(callee.clone())
        {
            self.logs.push(
                LogMessage::new_debug(format!("Classified {callee} as a reporting helper"))
                    .location(callee.clone())
                    .source("Contract Learner"),
            );
        }
    }

    /// Step 5: adopt module-wide sentinels in functions
    /// whose guards are not fallible-call checks.
    fn generalize_sentinels(&mut self) {
        if self.module_sentinels.is_empty() {
            return;
        }
        let project = self.project;
        for sub in project.program.term.subs.values() {
            for block in sub.term.blocks.iter() {
                let [conditional, fallthrough] = &block.term.jmps[..] else {
                    continue;
                };
                let Jmp::CBranch { target, .. } = &conditional.term else {
                    continue;
                };
                let mut branch_targets = vec![target.clone()];
                if let Jmp::Branch(fallthrough_target) = &fallthrough.term {
                    branch_targets.push(fallthrough_target.clone());
                }
                for branch_target in branch_targets {
                    let region_key = (conditional.tid.clone(), branch_target.clone());
                    if self.processed_regions.contains(&region_key) {
                        continue;
                    }
                    let contains_sentinel_return = self
                        .region_blocks(sub, &branch_target)
                        .iter()
                        .flat_map(|block| block.term.jmps.iter())
                        .any(|jmp| match &jmp.term {
                            Jmp::Return(Some(value)) => value
                                .as_const()
                                .map_or(false, |constant| {
                                    self.module_sentinels.contains(&constant.value)
                                }),
                            _ => false,
                        });
                    if contains_sentinel_return {
                        self.processed_regions.insert(region_key);
                        self.process_error_region(sub, &conditional.tid, &branch_target, false);
                    }
                }
            }
        }
    }

    fn into_results(self) -> (ErrorContracts, Vec<LogMessage>) {
        let mut contracts: BTreeMap<Tid, FunctionContract> = BTreeMap::new();
        for (tid, values) in self.sentinels {
            contracts.entry(tid).or_default().error_return_values = values;
        }
        for (tid, indices) in self.releases {
            contracts.entry(tid).or_default().releases_parameters = indices;
        }
        for tid in self.acquirers {
            contracts.entry(tid).or_default().is_acquirer = true;
        }
        for tid in self.reporting {
            contracts.entry(tid).or_default().is_reporting = true;
        }
        let error_contracts = ErrorContracts {
            contracts,
            learned_sentinels: self.module_sentinels,
            fallible_externs: self.fallible_externs,
            release_externs: self.release_externs,
            allocation_externs: self.allocation_externs,
        };
        (error_contracts, self.logs)
    }
}

/// Match a branch condition against the error conditions of the checked fallible results.
///
/// Returns whether the error holds on the true branch of the jump.
/// Handles negations and the comparison forms that lowering produces
/// (`>` and `>=` comparisons are already swapped into `<` and `<=` during lowering).
fn error_check_of_condition(
    condition: &Expression,
    fallible_vars: &HashMap<Variable, FallibleKind>,
) -> Option<bool> {
    use BinOpType::*;
    match condition {
        Expression::UnOp {
            op: UnOpType::BoolNegate,
            arg,
        } => error_check_of_condition(arg, fallible_vars).map(|error_on_true| !error_on_true),
        // `if (p)` jumps to the success branch for a NULL-fallible result.
        Expression::Var(var) => match fallible_vars.get(var) {
            Some(FallibleKind::NullReturn) => Some(false),
            _ => None,
        },
        Expression::BinOp { op, lhs, rhs } => {
            let (var, constant, var_on_left) = match (lhs.as_ref(), rhs.as_ref()) {
                (Expression::Var(var), Expression::Const(constant)) => (var, constant, true),
                (Expression::Const(constant), Expression::Var(var)) => (var, constant, false),
                _ => return None,
            };
            if constant.value != 0 {
                return None;
            }
            match (fallible_vars.get(var)?, op, var_on_left) {
                // `v < 0` fails on the true branch.
                (FallibleKind::NegativeReturn, IntSLess, true) => Some(true),
                // `v >= 0` (lowered to `0 <= v`) fails on the false branch.
                (FallibleKind::NegativeReturn, IntSLessEqual, false) => Some(false),
                // `v == NULL` fails on the true branch, `v != NULL` on the false branch.
                (FallibleKind::NullReturn, IntEqual, _) => Some(true),
                (FallibleKind::NullReturn, IntNotEqual, _) => Some(false),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::function_pointers::compute_function_pointers;
    use crate::analysis::graph::get_program_cfg;
    use crate::frontend::parse_project;
    use serde_json::json;

    fn mock_config() -> Config {
        serde_json::from_value(json!({
            "fallible": {
                "negative_return": ["read", "fstat", "open", "write", "lseek"],
                "null_return": ["malloc", "calloc", "realloc", "fopen"]
            },
            "release": { "close": 0, "free": 0, "fclose": 0 },
            "allocation": ["malloc", "calloc", "realloc", "fopen"]
        }))
        .unwrap()
    }

    fn analyze(source: &str) -> (Project, ErrorContracts, Vec<LogMessage>) {
        let mut project = parse_project(source, "fixture.c").unwrap();
        project.normalize();
        let (function_pointers, _logs) = compute_function_pointers(&project);
        project.insert_indirect_call_targets(&function_pointers);
        let graph = get_program_cfg(&project.program);
        let (contracts, logs) =
            compute_error_contracts(&project, &graph, &function_pointers, &mock_config());
        (project, contracts, logs)
    }

    fn tid_of(project: &Project, name: &str) -> Tid {
        project.program.term.find_callable_by_name(name).unwrap()
    }

    #[test]
    fn sentinels_are_learned_from_guarded_error_paths() {
        let source = r#"
            void log_failure(void *p) {
            }

            void release_fd(int fd) {
                close(fd);
            }

            int read_guarded(int fd) {
                char buffer[10];
                int bs = read(fd, buffer, 5);
                if (bs < 0) {
                    log_failure(buffer);
                    release_fd(fd);
                    return -30;
                }
                return bs + 6;
            }

            int release_unconditionally(int fd) {
                release_fd(fd);
                return -5;
            }
        "#;
        let (project, contracts, _logs) = analyze(source);

        let read_guarded = contracts
            .contract(&tid_of(&project, "read_guarded"))
            .unwrap();
        assert_eq!(
            read_guarded.error_return_values,
            BTreeSet::from([-30])
        );
        assert_eq!(contracts.learned_sentinels, BTreeSet::from([-30]));

        let release_fd = contracts.contract(&tid_of(&project, "release_fd")).unwrap();
        assert_eq!(release_fd.releases_parameters, BTreeSet::from([0]));
        assert!(contracts.is_reporting(&tid_of(&project, "log_failure")));

        // An unconditional return of a negative constant is not a guarded error path.
        let unconditional = contracts
            .contract(&tid_of(&project, "release_unconditionally"))
            .unwrap();
        assert!(unconditional.error_return_values.is_empty());
        assert_eq!(unconditional.releases_parameters, BTreeSet::from([0]));

        assert!(contracts.is_fallible(&tid_of(&project, "read_guarded")));
        assert!(!contracts.is_fallible(&tid_of(&project, "release_unconditionally")));
        assert!(contracts.is_fallible(&tid_of(&project, "read")));
    }

    #[test]
    fn sentinels_generalize_module_wide() {
        let source = r#"
            void log_failure(void *p) {
            }

            void log_failure2(void *p) {
            }

            int learn_origin(int fd) {
                struct stat s;
                int b = fstat(fd, &s);
                if (b < 0) {
                    log_failure(&s);
                    return -22;
                }
                return b + 1;
            }

            int adopts_sentinel(int foo) {
                if (foo == 90) {
                    log_failure2(NULL);
                    return -22;
                }
                return foo + 12;
            }
        "#;
        let (project, contracts, logs) = analyze(source);

        let learn_origin = contracts.contract(&tid_of(&project, "learn_origin")).unwrap();
        assert_eq!(learn_origin.error_return_values, BTreeSet::from([-22]));
        let adopter = contracts
            .contract(&tid_of(&project, "adopts_sentinel"))
            .unwrap();
        assert_eq!(adopter.error_return_values, BTreeSet::from([-22]));
        assert_eq!(contracts.learned_sentinels, BTreeSet::from([-22]));

        assert!(contracts.is_reporting(&tid_of(&project, "log_failure")));
        assert!(contracts.is_reporting(&tid_of(&project, "log_failure2")));
        assert!(logs
            .iter()
            .any(|log| log.text.contains("Generalized error return value -22")));
    }

    #[test]
    fn acquirers_through_resolved_function_pointers() {
        let source = r#"
            typedef void *(*alloc_fn_t)(size_t);

            struct holder {
                alloc_fn_t alloc_fn;
                int x;
            };

            void setup(struct holder *h) {
                h->alloc_fn = malloc;
            }

            int *make_buffer(struct holder *h, int n) {
                return h->alloc_fn(n * sizeof(int));
            }
        "#;
        let (project, contracts, _logs) = analyze(source);

        assert!(contracts.is_acquiring(&tid_of(&project, "make_buffer")));
        assert!(contracts.is_acquiring(&tid_of(&project, "malloc")));
        assert!(contracts
            .contract(&tid_of(&project, "setup"))
            .is_none());
    }

    #[test]
    fn positive_returns_yield_no_contract() {
        let source = r#"
            int count_slots(int n) {
                int number_slots = 9;
                return number_slots;
            }
        "#;
        let (_project, contracts, _logs) = analyze(source);
        assert!(contracts.contracts.is_empty());
        assert!(contracts.learned_sentinels.is_empty());
    }
}
