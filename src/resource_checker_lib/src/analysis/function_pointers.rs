//! Flow-insensitive resolution of function pointer values.
//!
//! The analysis computes for every storage location that may hold a function pointer
//! (a *cell*, see [`Cell`]) the set of functions it may point to.
//! It is field-based:
//! a struct field is one cell for all instances of the struct
//! and array elements are collapsed into one cell per element field.
//! This makes the analysis cheap and keeps it independent of any points-to model
//! for the structs themselves,
//! at the price that stores through indexed places are weak updates.
//!
//! Value flow is tracked through subset constraints in the usual Andersen style:
//! stores, loads, assignments, argument-to-parameter bindings at call sites
//! and return value bindings all generate copy edges between cells,
//! which are then propagated to a fixpoint with a worklist.
//! When the cell of an indirect call gains a target that is defined in the translation unit,
//! the argument-to-parameter bindings for that target are added on the fly.
//!
//! The result is used to fill the `resolved_targets` fields of indirect call terms
//! (see [`Project::insert_indirect_call_targets`])
//! and queried by the dispatch checker for possibly-NULL
//! or possibly-unassigned function pointer cells.

use crate::intermediate_representation::*;
use crate::prelude::*;
use crate::utils::log::LogMessage;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// A storage location that may hold a function pointer value.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum Cell {
    /// A struct field, collapsed over all instances of the struct
    /// and over all elements of arrays of the struct.
    Field {
        /// The name of the struct containing the field.
        struct_name: String,
        /// The name of the field.
        field: String,
    },
    /// A local variable or formal parameter of the given function.
    Var {
        /// The term ID of the function.
        sub: Tid,
        /// The variable.
        var: Variable,
    },
    /// The value returned by the given function.
    Return {
        /// The term ID of the function.
        sub: Tid,
    },
}

impl Cell {
    /// Return the cell corresponding to the given place inside the given function.
    ///
    /// Places ending in a field access map to the collapsed field cell.
    /// Bare pointer-sized variables map to their variable cell.
    /// All other places (e.g. plain dereferences) have no cell,
    /// i.e. the analysis does not track values stored through them.
    pub fn from_place(sub: &Tid, place: &Place) -> Option<Cell> {
        if let Some((struct_name, field)) = place.last_field() {
            Some(Cell::Field {
                struct_name: struct_name.to_string(),
                field: field.to_string(),
            })
        } else {
            let var = place.as_var()?;
            if var.size == POINTER_SIZE {
                Some(Cell::Var {
                    sub: sub.clone(),
                    var: var.clone(),
                })
            } else {
                None
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Field { struct_name, field } => write!(f, "{struct_name}::{field}"),
            Cell::Var { sub, var } => write!(f, "{sub}::{}", var.name),
            Cell::Return { sub } => write!(f, "{sub}::<return>"),
        }
    }
}

/// Everything the analysis knows about the value held by a cell.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct PointerValue {
    /// The functions (defined functions and extern symbols) the cell may point to.
    pub targets: BTreeSet<Tid>,
    /// Set if an explicit `NULL` may reach the cell.
    pub possibly_null: bool,
    /// Set if no store covering the whole cell was seen,
    /// i.e. reading the cell may yield an uninitialized value.
    /// Stores through indexed places are weak and do not clear this flag,
    /// since the collapsed cell stands for all array elements.
    pub possibly_unassigned: bool,
}

/// The output of the function pointer analysis.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct FunctionPointers {
    /// Maps the term ID of each indirect call to the set of its possible targets.
    /// Unresolved calls map to the empty set.
    pub call_targets: BTreeMap<Tid, BTreeSet<Tid>>,
    /// The computed value for every function-pointer-relevant cell:
    /// all function pointer typed struct fields known to the type registry,
    /// all cells of indirect call targets
    /// and every other cell that a function address may flow into.
    pub cells: BTreeMap<Cell, PointerValue>,
}

impl FunctionPointers {
    /// Return the resolved targets of the indirect call with the given term ID.
    pub fn targets_of_call(&self, jmp_tid: &Tid) -> Option<&BTreeSet<Tid>> {
        self.call_targets.get(jmp_tid)
    }

    /// Return what is known about the value of the given place inside the given function.
    pub fn value_of_place(&self, sub: &Tid, place: &Place) -> Option<&PointerValue> {
        let cell = Cell::from_place(sub, place)?;
        self.cells.get(&cell)
    }
}

/// Compute the possible targets of all function pointer valued cells of the project
/// and resolve the indirect calls of the program with them.
///
/// Indirect calls that cannot be resolved to any target
/// generate debug log messages, never errors.
pub fn compute_function_pointers(project: &Project) -> (FunctionPointers, Vec<LogMessage>) {
    let mut solver = PointsToSolver::new(project);
    solver.solve();
    solver.into_results()
}

impl Project {
    /// Write the resolved targets of indirect calls back into the
    /// `resolved_targets` fields of the corresponding call terms.
    ///
    /// Must be called before CFG construction for indirect calls
    /// to get call edges to their targets.
    pub fn insert_indirect_call_targets(&mut self, function_pointers: &FunctionPointers) {
        for sub in self.program.term.subs.values_mut() {
            for block in sub.term.blocks.iter_mut() {
                for jmp in block.term.jmps.iter_mut() {
                    if let Jmp::CallInd {
                        resolved_targets, ..
                    } = &mut jmp.term
                    {
                        if let Some(targets) = function_pointers.call_targets.get(&jmp.tid) {
                            *resolved_targets = targets.iter().cloned().collect();
                        }
                    }
                }
            }
        }
    }
}

/// The contents of a cell during constraint propagation.
/// The coverage flag of [`PointerValue`] is tracked separately,
/// since it is a property of the stores to a cell and not of the propagated values.
#[derive(Clone, Default)]
struct CellContent {
    targets: BTreeSet<Tid>,
    null: bool,
}

/// The value sources of an expression:
/// function addresses contained in it, an explicit `NULL`
/// and the cells whose contents flow into its value.
#[derive(Clone, Default)]
struct ValueSources {
    targets: BTreeSet<Tid>,
    null: bool,
    cells: Vec<Cell>,
}

/// An indirect call site waiting for targets.
struct DispatchSite {
    jmp_tid: Tid,
    place: Place,
    cell: Option<Cell>,
    args: Vec<ValueSources>,
    result: Option<Cell>,
    /// Defined targets whose parameters have already been bound to the call arguments.
    processed_targets: BTreeSet<Tid>,
}

struct PointsToSolver<'a> {
    project: &'a Project,
    /// Current contents per cell.
    values: HashMap<Cell, CellContent>,
    /// Subset edges: the contents of the key cell flow into all value cells.
    edges: HashMap<Cell, BTreeSet<Cell>>,
    /// Cells that received at least one covering (strong) assignment.
    covered: HashSet<Cell>,
    dispatch_sites: Vec<DispatchSite>,
    worklist: Vec<Cell>,
}

impl<'a> PointsToSolver<'a> {
    /// Gather the seeds and subset constraints of the whole program.
    fn new(project: &'a Project) -> PointsToSolver<'a> {
        let mut solver = PointsToSolver {
            project,
            values: HashMap::new(),
            edges: HashMap::new(),
            covered: HashSet::new(),
            dispatch_sites: Vec::new(),
            worklist: Vec::new(),
        };
        for sub in project.program.term.subs.values() {
            for block in sub.term.blocks.iter() {
                for def in block.term.defs.iter() {
                    solver.collect_def(&sub.tid, &def.term);
                }
                for jmp in block.term.jmps.iter() {
                    solver.collect_jmp(&sub.tid, jmp);
                }
            }
        }
        solver
    }

    fn collect_def(&mut self, sub: &Tid, def: &Def) {
        match def {
            Def::Assign { var, value } => {
                if let Some(cell) = var_cell(sub, var) {
                    let sources = value_sources(value, sub);
                    self.bind_sources(cell, &sources, true);
                }
            }
            Def::Load { var, place } => {
                if let Some(var_cell) = var_cell(sub, var) {
                    self.bind_sources(var_cell.clone(), &ValueSources::default(), true);
                    if let Some(src) = Cell::from_place(sub, place) {
                        self.add_edge(src, var_cell);
                    }
                }
            }
            Def::Store { place, value } => {
                if let Some(dst) = Cell::from_place(sub, place) {
                    // A store through an indexed place may leave other elements untouched.
                    let strong = !place
                        .accessors
                        .iter()
                        .any(|accessor| matches!(accessor, Accessor::Index));
                    let sources = value_sources(value, sub);
                    self.bind_sources(dst, &sources, strong);
                }
            }
        }
    }

    fn collect_jmp(&mut self, sub: &Tid, jmp: &Term<Jmp>) {
        let project = self.project;
        match &jmp.term {
            Jmp::Call {
                target,
                args,
                result,
                ..
            } => {
                // Calls to extern symbols bind no cells.
                if let Some(callee) = project.program.term.subs.get(target) {
                    for (param, arg) in callee.term.formal_args.iter().zip(args.iter()) {
                        if let Some(param_cell) = var_cell(target, param) {
                            let sources = value_sources(arg, sub);
                            self.bind_sources(param_cell, &sources, true);
                        }
                    }
                    if let Some(result_var) = result {
                        if let Some(result_cell) = var_cell(sub, result_var) {
                            self.bind_sources(result_cell.clone(), &ValueSources::default(), true);
                            self.add_edge(Cell::Return { sub: target.clone() }, result_cell);
                        }
                    }
                }
            }
            Jmp::CallInd {
                target,
                args,
                result,
                ..
            } => {
                self.dispatch_sites.push(DispatchSite {
                    jmp_tid: jmp.tid.clone(),
                    place: target.clone(),
                    cell: Cell::from_place(sub, target),
                    args: args.iter().map(|arg| value_sources(arg, sub)).collect(),
                    result: result.as_ref().and_then(|var| var_cell(sub, var)),
                    processed_targets: BTreeSet::new(),
                });
            }
            Jmp::Return(Some(value)) => {
                let sources = value_sources(value, sub);
                self.bind_sources(Cell::Return { sub: sub.clone() }, &sources, true);
            }
            _ => (),
        }
    }

    /// Merge the direct sources into the destination cell and add copy edges for the indirect ones.
    fn bind_sources(&mut self, dst: Cell, sources: &ValueSources, strong: bool) {
        if strong {
            self.covered.insert(dst.clone());
        }
        let direct = CellContent {
            targets: sources.targets.clone(),
            null: sources.null,
        };
        if self.merge_into(&dst, &direct) {
            self.worklist.push(dst.clone());
        }
        for src in sources.cells.iter() {
            self.add_edge(src.clone(), dst.clone());
        }
    }

    /// Add a subset edge and immediately propagate the current contents of the source.
    fn add_edge(&mut self, src: Cell, dst: Cell) {
        if self.edges.entry(src.clone()).or_default().insert(dst.clone()) {
            if let Some(content) = self.values.get(&src).cloned() {
                if self.merge_into(&dst, &content) {
                    self.worklist.push(dst);
                }
            }
        }
    }

    fn merge_into(&mut self, cell: &Cell, content: &CellContent) -> bool {
        let cell_content = self.values.entry(cell.clone()).or_default();
        let mut changed = false;
        for target in content.targets.iter() {
            changed |= cell_content.targets.insert(target.clone());
        }
        if content.null && !cell_content.null {
            cell_content.null = true;
            changed = true;
        }
        changed
    }

    /// Propagate all cell contents along the subset edges to a fixpoint.
    fn solve(&mut self) {
        while let Some(cell) = self.worklist.pop() {
            let content = match self.values.get(&cell) {
                Some(content) => content.clone(),
                None => continue,
            };
            let dsts: Vec<Cell> = self
                .edges
                .get(&cell)
                .map(|dsts| dsts.iter().cloned().collect())
                .unwrap_or_default();
            for dst in dsts {
                if self.merge_into(&dst, &content) {
                    self.worklist.push(dst);
                }
            }
            // Bind call arguments to the parameters of newly found indirect call targets.
            let mut new_bindings = Vec::new();
            for (index, site) in self.dispatch_sites.iter().enumerate() {
                if site.cell.as_ref() == Some(&cell) {
                    for target in content.targets.difference(&site.processed_targets) {
                        new_bindings.push((index, target.clone()));
                    }
                }
            }
            for (index, target) in new_bindings {
                self.bind_indirect_target(index, &target);
            }
        }
    }

    fn bind_indirect_target(&mut self, site_index: usize, target: &Tid) {
        self.dispatch_sites[site_index]
            .processed_targets
            .insert(target.clone());
        let project = self.project;
        // Extern targets have no parameter cells to bind.
        let Some(callee) = project.program.term.subs.get(target) else {
            return;
        };
        let args = self.dispatch_sites[site_index].args.clone();
        let result = self.dispatch_sites[site_index].result.clone();
        for (param, sources) in callee.term.formal_args.iter().zip(args.iter()) {
            if let Some(param_cell) = var_cell(target, param) {
                self.bind_sources(param_cell, sources, true);
            }
        }
        if let Some(result_cell) = result {
            self.add_edge(Cell::Return { sub: target.clone() }, result_cell);
        }
    }

    fn into_results(self) -> (FunctionPointers, Vec<LogMessage>) {
        let mut cells = BTreeMap::new();
        // All function pointer typed struct fields are part of the output,
        // including the ones that are never assigned anywhere in the translation unit.
        for (struct_name, layout) in self.project.types.structs() {
            for field in layout.fields.iter() {
                if field.ty.is_fn_ptr() {
                    cells.insert(
                        Cell::Field {
                            struct_name: struct_name.clone(),
                            field: field.name.clone(),
                        },
                        PointerValue {
                            targets: BTreeSet::new(),
                            possibly_null: false,
                            possibly_unassigned: true,
                        },
                    );
                }
            }
        }
        let dispatch_cells: HashSet<&Cell> = self
            .dispatch_sites
            .iter()
            .filter_map(|site| site.cell.as_ref())
            .collect();
        for (cell, content) in self.values.iter() {
            if cells.contains_key(cell)
                || !content.targets.is_empty()
                || dispatch_cells.contains(cell)
            {
                cells.insert(
                    cell.clone(),
                    PointerValue {
                        targets: content.targets.clone(),
                        possibly_null: content.null,
                        possibly_unassigned: !self.covered.contains(cell),
                    },
                );
            }
        }
        for cell in dispatch_cells {
            cells.entry(cell.clone()).or_insert_with(|| PointerValue {
                targets: BTreeSet::new(),
                possibly_null: false,
                possibly_unassigned: true,
            });
        }

        let mut call_targets = BTreeMap::new();
        let mut logs = Vec::new();
        for site in self.dispatch_sites.iter() {
            let targets = site
                .cell
                .as_ref()
                .and_then(|cell| self.values.get(cell))
                .map(|content| content.targets.clone())
                .unwrap_or_default();
            if targets.is_empty() {
                logs.push(
                    LogMessage::new_debug(format!(
                        "Indirect call through {} could not be resolved to any target",
                        site.place
                    ))
                    .location(site.jmp_tid.clone())
                    .source("Function Pointer Analysis"),
                );
            }
            call_targets.insert(site.jmp_tid.clone(), targets);
        }

        (FunctionPointers { call_targets, cells }, logs)
    }
}

/// The cell of a variable. Only pointer-sized variables can hold function pointers.
fn var_cell(sub: &Tid, var: &Variable) -> Option<Cell> {
    if var.size == POINTER_SIZE {
        Some(Cell::Var {
            sub: sub.clone(),
            var: var.clone(),
        })
    } else {
        None
    }
}

fn value_sources(expression: &Expression, sub: &Tid) -> ValueSources {
    let mut sources = ValueSources::default();
    match expression {
        Expression::FnAddr(tid) => {
            sources.targets.insert(tid.clone());
        }
        Expression::Var(var) => {
            if let Some(cell) = var_cell(sub, var) {
                sources.cells.push(cell);
            }
        }
        Expression::Const(constant) if constant.is_null() => {
            sources.null = true;
        }
        // Function pointer values do not survive arithmetic in the analyzed subset.
        _ => (),
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    fn fn_ptr_type() -> CType {
        CType::FnPtr {
            params: vec![CType::Pointer(Box::new(CType::Void))],
            return_type: Box::new(CType::Int { size: INT_SIZE }),
        }
    }

    fn field_place(base: &str, struct_name: &str, field: &str) -> Place {
        Place {
            base: Variable::new(base, POINTER_SIZE),
            accessors: vec![
                Accessor::Deref,
                Accessor::Field {
                    struct_name: struct_name.to_string(),
                    field: field.to_string(),
                },
            ],
        }
    }

    fn return_block(block_name: &str, value: Option<Expression>) -> Term<Blk> {
        Term {
            tid: Tid::new(block_name),
            term: Blk {
                defs: Vec::new(),
                jmps: vec![Term {
                    tid: Tid::new(format!("{block_name}_ret")),
                    term: Jmp::Return(value),
                }],
            },
        }
    }

    #[test]
    fn function_addresses_propagate_into_struct_fields() {
        // setup stores the address of malloc into s->alloc_fn,
        // f calls through s->alloc_fn and returns the result.
        let mut setup = Sub::mock("setup");
        setup
            .term
            .formal_args
            .push(Variable::new("s", POINTER_SIZE));
        setup.term.blocks.push(Term {
            tid: Tid::new("blk_setup_0"),
            term: Blk {
                defs: vec![Term {
                    tid: Tid::new("store_alloc_fn"),
                    term: Def::Store {
                        place: field_place("s", "S", "alloc_fn"),
                        value: Expression::FnAddr(Tid::new("malloc")),
                    },
                }],
                jmps: vec![Term {
                    tid: Tid::new("setup_ret"),
                    term: Jmp::Return(None),
                }],
            },
        });

        let mut f = Sub::mock("f");
        f.term.formal_args.push(Variable::new("s", POINTER_SIZE));
        f.term.formal_args.push(Variable::new("n", INT_SIZE));
        let result_var = Variable::temp("t1", POINTER_SIZE);
        f.term.blocks.push(Term {
            tid: Tid::new("blk_f_0"),
            term: Blk {
                defs: Vec::new(),
                jmps: vec![Term {
                    tid: Tid::new("alloc_call"),
                    term: Jmp::CallInd {
                        target: field_place("s", "S", "alloc_fn"),
                        resolved_targets: Vec::new(),
                        args: vec![Expression::BinOp {
                            op: BinOpType::IntMult,
                            lhs: Box::new(Expression::Var(Variable::new("n", INT_SIZE))),
                            rhs: Box::new(Expression::Const(Constant::int(4))),
                        }],
                        result: Some(result_var.clone()),
                        return_: Some(Tid::new("blk_f_1")),
                    },
                }],
            },
        });
        f.term.blocks.push(return_block(
            "blk_f_1",
            Some(Expression::Var(result_var)),
        ));

        let mut program = Program::mock_empty();
        program.subs.insert(setup.tid.clone(), setup);
        program.subs.insert(f.tid.clone(), f);
        program
            .extern_symbols
            .insert(Tid::new("malloc"), ExternSymbol::new("malloc"));
        let mut project = Project::mock(program);
        project.types.register_struct(
            "S",
            StructLayout {
                fields: vec![
                    StructField {
                        name: "alloc_fn".to_string(),
                        ty: fn_ptr_type(),
                    },
                    StructField {
                        name: "x".to_string(),
                        ty: CType::Int { size: INT_SIZE },
                    },
                ],
            },
        );

        let (function_pointers, logs) = compute_function_pointers(&project);
        assert_eq!(
            function_pointers.call_targets[&Tid::new("alloc_call")],
            BTreeSet::from_iter([Tid::new("malloc")])
        );
        let cell_value = &function_pointers.cells[&Cell::Field {
            struct_name: "S".to_string(),
            field: "alloc_fn".to_string(),
        }];
        assert_eq!(cell_value.targets, BTreeSet::from_iter([Tid::new("malloc")]));
        assert!(!cell_value.possibly_null);
        assert!(!cell_value.possibly_unassigned);
        assert!(logs.is_empty());

        project.insert_indirect_call_targets(&function_pointers);
        let f = &project.program.term.subs[&Tid::new("f")];
        let Jmp::CallInd {
            resolved_targets, ..
        } = &f.term.blocks[0].term.jmps[0].term
        else {
            panic!("dispatch call lost during target insertion");
        };
        assert_eq!(resolved_targets, &vec![Tid::new("malloc")]);
    }

    #[test]
    fn parameters_bound_at_call_sites_flow_into_arrays() {
        // register_format stores its fn-ptr parameter into all elements of a
        // descriptor array (an indexed, therefore weak store).
        // Two init functions pass different reader functions to it
        // and dispatch calls through the read_data field of the active descriptor.
        let mut register = Sub::mock("register_format");
        register
            .term
            .formal_args
            .push(Variable::new("a", POINTER_SIZE));
        register
            .term
            .formal_args
            .push(Variable::new("fp", POINTER_SIZE));
        register.term.blocks.push(Term {
            tid: Tid::new("blk_register_0"),
            term: Blk {
                defs: vec![Term {
                    tid: Tid::new("store_read_data"),
                    term: Def::Store {
                        place: Place {
                            base: Variable::new("a", POINTER_SIZE),
                            accessors: vec![
                                Accessor::Deref,
                                Accessor::Field {
                                    struct_name: "archive_read".to_string(),
                                    field: "formats".to_string(),
                                },
                                Accessor::Index,
                                Accessor::Field {
                                    struct_name: "descriptor".to_string(),
                                    field: "read_data".to_string(),
                                },
                            ],
                        },
                        value: Expression::Var(Variable::new("fp", POINTER_SIZE)),
                    },
                }],
                jmps: vec![Term {
                    tid: Tid::new("register_ret"),
                    term: Jmp::Return(Some(Expression::Var(Variable::new(
                        "number_slots",
                        INT_SIZE,
                    )))),
                }],
            },
        });

        let mut init_calls = Vec::new();
        for (init_name, reader_name) in [
            ("init_xz", "read_data_xz"),
            ("init_bzip2", "read_data_bzip2"),
        ] {
            let mut init = Sub::mock(init_name);
            init.term.formal_args.push(Variable::new("a", POINTER_SIZE));
            init.term.blocks.push(Term {
                tid: Tid::new(format!("blk_{init_name}_0")),
                term: Blk {
                    defs: Vec::new(),
                    jmps: vec![Term {
                        tid: Tid::new(format!("{init_name}_call")),
                        term: Jmp::Call {
                            target: Tid::new("register_format"),
                            args: vec![
                                Expression::Var(Variable::new("a", POINTER_SIZE)),
                                Expression::FnAddr(Tid::new(reader_name)),
                            ],
                            result: None,
                            return_: Some(Tid::new(format!("blk_{init_name}_1"))),
                        },
                    }],
                },
            });
            init.term.blocks.push(return_block(&format!("blk_{init_name}_1"), None));
            init_calls.push(init);
        }

        let mut dispatcher = Sub::mock("read_block");
        dispatcher
            .term
            .formal_args
            .push(Variable::new("a", POINTER_SIZE));
        dispatcher.term.blocks.push(Term {
            tid: Tid::new("blk_read_block_0"),
            term: Blk {
                defs: Vec::new(),
                jmps: vec![Term {
                    tid: Tid::new("dispatch"),
                    term: Jmp::CallInd {
                        target: Place {
                            base: Variable::new("a", POINTER_SIZE),
                            accessors: vec![
                                Accessor::Deref,
                                Accessor::Field {
                                    struct_name: "archive_read".to_string(),
                                    field: "format".to_string(),
                                },
                                Accessor::Deref,
                                Accessor::Field {
                                    struct_name: "descriptor".to_string(),
                                    field: "read_data".to_string(),
                                },
                            ],
                        },
                        resolved_targets: Vec::new(),
                        args: vec![Expression::Var(Variable::new("a", POINTER_SIZE))],
                        result: Some(Variable::temp("t1", INT_SIZE)),
                        return_: Some(Tid::new("blk_read_block_1")),
                    },
                }],
            },
        });
        dispatcher.term.blocks.push(return_block(
            "blk_read_block_1",
            Some(Expression::Var(Variable::temp("t1", INT_SIZE))),
        ));

        let mut program = Program::mock_empty();
        for sub in init_calls {
            program.subs.insert(sub.tid.clone(), sub);
        }
        for name in ["read_data_xz", "read_data_bzip2"] {
            let mut reader = Sub::mock(name);
            reader.term.formal_args.push(Variable::new("a", POINTER_SIZE));
            reader.term.blocks.push(return_block(
                &format!("blk_{name}_0"),
                Some(Expression::Const(Constant::int(0))),
            ));
            program.subs.insert(reader.tid.clone(), reader);
        }
        program.subs.insert(register.tid.clone(), register);
        program.subs.insert(dispatcher.tid.clone(), dispatcher);
        let mut project = Project::mock(program);
        project.types.register_struct(
            "descriptor",
            StructLayout {
                fields: vec![
                    StructField {
                        name: "bid".to_string(),
                        ty: fn_ptr_type(),
                    },
                    StructField {
                        name: "read_data".to_string(),
                        ty: fn_ptr_type(),
                    },
                ],
            },
        );

        let (function_pointers, _logs) = compute_function_pointers(&project);
        let expected_readers =
            BTreeSet::from_iter([Tid::new("read_data_xz"), Tid::new("read_data_bzip2")]);
        assert_eq!(
            function_pointers.call_targets[&Tid::new("dispatch")],
            expected_readers
        );
        // The array store is weak, so the collapsed cell stays possibly unassigned.
        let read_data_cell = &function_pointers.cells[&Cell::Field {
            struct_name: "descriptor".to_string(),
            field: "read_data".to_string(),
        }];
        assert_eq!(read_data_cell.targets, expected_readers);
        assert!(read_data_cell.possibly_unassigned);
        // The parameter cell of the registration function collects both readers.
        let param_cell = &function_pointers.cells[&Cell::Var {
            sub: Tid::new("register_format"),
            var: Variable::new("fp", POINTER_SIZE),
        }];
        assert_eq!(param_cell.targets, expected_readers);
        assert!(!param_cell.possibly_unassigned);
        // A field that is never assigned anywhere in the unit.
        let bid_cell = &function_pointers.cells[&Cell::Field {
            struct_name: "descriptor".to_string(),
            field: "bid".to_string(),
        }];
        assert!(bid_cell.targets.is_empty());
        assert!(bid_cell.possibly_unassigned);
    }

    #[test]
    fn null_stores_mark_cells_nullable() {
        let mut enable = Sub::mock("enable");
        enable
            .term
            .formal_args
            .push(Variable::new("s", POINTER_SIZE));
        enable.term.blocks.push(Term {
            tid: Tid::new("blk_enable_0"),
            term: Blk {
                defs: vec![Term {
                    tid: Tid::new("store_handler"),
                    term: Def::Store {
                        place: field_place("s", "S", "handler"),
                        value: Expression::FnAddr(Tid::new("on_event")),
                    },
                }],
                jmps: vec![Term {
                    tid: Tid::new("enable_ret"),
                    term: Jmp::Return(None),
                }],
            },
        });
        let mut disable = Sub::mock("disable");
        disable
            .term
            .formal_args
            .push(Variable::new("s", POINTER_SIZE));
        disable.term.blocks.push(Term {
            tid: Tid::new("blk_disable_0"),
            term: Blk {
                defs: vec![Term {
                    tid: Tid::new("clear_handler"),
                    term: Def::Store {
                        place: field_place("s", "S", "handler"),
                        value: Expression::Const(Constant::null()),
                    },
                }],
                jmps: vec![Term {
                    tid: Tid::new("disable_ret"),
                    term: Jmp::Return(None),
                }],
            },
        });

        let mut program = Program::mock_empty();
        program.subs.insert(enable.tid.clone(), enable);
        program.subs.insert(disable.tid.clone(), disable);
        program
            .subs
            .insert(Tid::new("on_event"), Sub::mock("on_event"));
        let mut project = Project::mock(program);
        project.types.register_struct(
            "S",
            StructLayout {
                fields: vec![StructField {
                    name: "handler".to_string(),
                    ty: fn_ptr_type(),
                }],
            },
        );

        let (function_pointers, _logs) = compute_function_pointers(&project);
        let handler_cell = &function_pointers.cells[&Cell::Field {
            struct_name: "S".to_string(),
            field: "handler".to_string(),
        }];
        assert_eq!(
            handler_cell.targets,
            BTreeSet::from_iter([Tid::new("on_event")])
        );
        assert!(handler_cell.possibly_null);
        assert!(!handler_cell.possibly_unassigned);
    }
}
