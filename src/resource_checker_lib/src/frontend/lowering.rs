//! Lowering of the abstract syntax tree into the intermediate representation.
//!
//! Lowering flattens expressions so that memory only ever enters the
//! IR through explicit [`Def::Load`] and [`Def::Store`] terms:
//! every struct member or pointer read in value position is materialized
//! into a temporary variable first.
//! Calls end their basic block. The block the call returns to is the
//! immediately following block of the same function.
//!
//! Call results are bound directly to the declared or assigned variable
//! (`int bs = read(...)` binds `bs`, not a temporary),
//! so that later analyses can match branch conditions against the
//! variable holding a call result without any copy tracking.
//! Only calls nested inside larger expressions get temporary result variables.
//!
//! Short-circuit operators are lowered eagerly into [`BinOpType::BoolAnd`]
//! and [`BinOpType::BoolOr`], i.e. both operands are always evaluated.
//! Since expression evaluation is free of side effects apart from calls,
//! this only loses precision if a call appears on the right side of `&&` or `||`.

use super::ast;
use super::ast::{BinaryOp, Expr, StatementKind, TypeExpr, UnaryOp};
use crate::intermediate_representation::*;
use crate::prelude::*;
use std::collections::BTreeMap;

/// Lower a parsed translation unit into a [`Project`].
///
/// The returned project is not yet normalized,
/// call [`Project::normalize`] before running analyses on it.
pub fn lower(unit: &ast::TranslationUnit, file_name: &str) -> Result<Project, Error> {
    let mut lowerer = Lowerer::new(file_name);
    lowerer.register_types(&unit.types)?;
    lowerer.collect_signatures(&unit.functions)?;
    let mut subs = BTreeMap::new();
    for function in &unit.functions {
        let sub = lowerer.lower_function(function)?;
        subs.insert(sub.tid.clone(), sub);
    }
    let entry_points = subs.keys().cloned().collect();
    let Lowerer {
        registry,
        extern_symbols,
        ..
    } = lowerer;
    let program = Program {
        subs,
        extern_symbols,
        entry_points,
    };
    Ok(Project {
        program: Term {
            tid: Tid::new("program"),
            term: program,
        },
        types: registry,
        file_name: file_name.to_string(),
    })
}

/// The resolved signature of a defined function.
#[derive(Debug, Clone)]
struct FnSignature {
    tid: Tid,
    return_type: CType,
    params: Vec<(String, CType)>,
}

/// The resolved callee of a call expression.
enum Callee {
    /// A call to a defined function or extern symbol.
    Direct(Tid),
    /// A call through a function-pointer-valued place.
    Indirect(Place),
}

struct Lowerer {
    registry: TypeRegistry,
    signatures: BTreeMap<String, FnSignature>,
    extern_symbols: BTreeMap<Tid, ExternSymbol>,
    file_name: String,
    // Per-function lowering state, reset by `lower_function`.
    fn_name: String,
    scope: BTreeMap<String, CType>,
    blocks: Vec<Term<Blk>>,
    current: Option<(Tid, Blk)>,
    next_block_index: u64,
    term_counter: u64,
    temp_counter: u64,
}

impl Lowerer {
    fn new(file_name: &str) -> Lowerer {
        Lowerer {
            registry: TypeRegistry::new(),
            signatures: BTreeMap::new(),
            extern_symbols: BTreeMap::new(),
            file_name: file_name.to_string(),
            fn_name: String::new(),
            scope: BTreeMap::new(),
            blocks: Vec::new(),
            current: None,
            next_block_index: 0,
            term_counter: 0,
            temp_counter: 0,
        }
    }

    fn location(&self, line: u64) -> String {
        format!("{}:{}", self.file_name, line)
    }

    /// Resolve struct definitions and typedefs into the type registry.
    fn register_types(&mut self, types: &[ast::TypeDef]) -> Result<(), Error> {
        for type_def in types {
            match type_def {
                ast::TypeDef::Typedef { name, ty } => {
                    let resolved = self.resolve_type(ty)?;
                    self.registry.register_typedef(name, resolved);
                }
                ast::TypeDef::Struct { name, fields } => {
                    let mut layout = StructLayout::default();
                    for (field_name, field_ty) in fields {
                        layout.fields.push(StructField {
                            name: field_name.clone(),
                            ty: self.resolve_type(field_ty)?,
                        });
                    }
                    self.registry.register_struct(name, layout);
                }
            }
        }
        Ok(())
    }

    /// Record the term ID and resolved signature of every defined function
    /// before lowering any body, so that calls between functions of the
    /// translation unit resolve to the final term IDs in one pass.
    fn collect_signatures(&mut self, functions: &[ast::Function]) -> Result<(), Error> {
        for function in functions {
            let mut params = Vec::new();
            for (name, ty) in &function.params {
                params.push((name.clone(), self.resolve_type(ty)?));
            }
            let signature = FnSignature {
                tid: Tid::new_at(&function.name, &self.location(function.line)),
                return_type: self.resolve_type(&function.return_type)?,
                params,
            };
            if self
                .signatures
                .insert(function.name.clone(), signature)
                .is_some()
            {
                return Err(anyhow!(
                    "The function {} is defined more than once",
                    function.name
                ));
            }
        }
        Ok(())
    }

    fn resolve_type(&self, ty: &TypeExpr) -> Result<CType, Error> {
        match ty {
            TypeExpr::Void => Ok(CType::Void),
            TypeExpr::Char => Ok(CType::Char),
            TypeExpr::Int(bytes) => Ok(CType::Int {
                size: ByteSize::new(*bytes),
            }),
            TypeExpr::Pointer(inner) => {
                Ok(CType::Pointer(Box::new(self.resolve_type(inner)?)))
            }
            TypeExpr::Array { element, length } => Ok(CType::Array {
                element: Box::new(self.resolve_type(element)?),
                length: *length,
            }),
            TypeExpr::Struct(name) => Ok(CType::Struct(name.clone())),
            TypeExpr::Named(name) => self
                .registry
                .typedef(name)
                .cloned()
                .ok_or_else(|| anyhow!("Unknown type name {name}")),
            TypeExpr::FunctionPointer {
                params,
                return_type,
            } => {
                let params = params
                    .iter()
                    .map(|param| self.resolve_type(param))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(CType::FnPtr {
                    params,
                    return_type: Box::new(self.resolve_type(return_type)?),
                })
            }
        }
    }

    /// The byte size a variable of the given type has in value position.
    /// Arrays decay to pointers.
    fn value_size_of(&self, ty: &CType) -> ByteSize {
        match ty {
            CType::Array { .. } => POINTER_SIZE,
            _ => self.registry.size_of(ty),
        }
    }

    /// The variable a declared name denotes in value position.
    fn declared_var(&self, name: &str) -> Option<Variable> {
        let ty = self.scope.get(name)?;
        Some(Variable::new(name, self.value_size_of(ty)))
    }

    /// The term ID of the extern symbol with the given name,
    /// registering the symbol on first use.
    fn extern_tid(&mut self, name: &str) -> Tid {
        if let Some(symbol) = self
            .extern_symbols
            .values()
            .find(|symbol| symbol.name == name)
        {
            return symbol.tid.clone();
        }
        let symbol = ExternSymbol::new(name);
        let tid = symbol.tid.clone();
        self.extern_symbols.insert(tid.clone(), symbol);
        tid
    }

    fn fresh_term_tid(&mut self, kind: &str, line: u64) -> Tid {
        let tid = Tid::new_at(
            format!("{}_{}_{}", self.fn_name, kind, self.term_counter),
            &self.location(line),
        );
        self.term_counter += 1;
        tid
    }

    fn fresh_temp(&mut self, size: ByteSize) -> Variable {
        let var = Variable::temp(format!("t{}", self.temp_counter), size);
        self.temp_counter += 1;
        var
    }

    /// Reserve the term ID of the next block without creating the block.
    fn reserve_block(&mut self) -> Tid {
        let tid = Tid::blk_id_of_sub(&self.fn_name, self.next_block_index);
        self.next_block_index += 1;
        tid
    }

    fn start_block(&mut self, tid: Tid) {
        debug_assert!(self.current.is_none());
        self.current = Some((tid, Blk::new()));
    }

    fn ensure_current(&mut self) {
        if self.current.is_none() {
            let tid = self.reserve_block();
            self.start_block(tid);
        }
    }

    /// Close the current block with the given jump terms.
    fn finish_block(&mut self, jmps: Vec<Term<Jmp>>) {
        self.ensure_current();
        let (tid, mut block) = self.current.take().unwrap();
        block.jmps = jmps;
        self.blocks.push(Term { tid, term: block });
    }

    fn push_def(&mut self, def: Def, line: u64) {
        self.ensure_current();
        let tid = self.fresh_term_tid("def", line);
        let (_, block) = self.current.as_mut().unwrap();
        block.defs.push(Term { tid, term: def });
    }

    fn lower_function(&mut self, function: &ast::Function) -> Result<Term<Sub>, Error> {
        let signature = self
            .signatures
            .get(&function.name)
            .cloned()
            .ok_or_else(|| anyhow!("Missing signature for function {}", function.name))?;
        self.fn_name = function.name.clone();
        self.scope.clear();
        self.blocks = Vec::new();
        self.current = None;
        self.next_block_index = 0;
        self.term_counter = 0;
        self.temp_counter = 0;

        let mut formal_args = Vec::new();
        for (name, ty) in &signature.params {
            self.scope.insert(name.clone(), ty.clone());
            formal_args.push(Variable::new(name, self.value_size_of(ty)));
        }
        // The entry block exists even for empty bodies,
        // so that calls to the function have somewhere to land.
        self.ensure_current();
        self.lower_statements(&function.body)?;
        if let Some((tid, block)) = self.current.take() {
            // A block without jumps gets its fallthrough return
            // during normalization.
            self.blocks.push(Term { tid, term: block });
        }
        Ok(Term {
            tid: signature.tid,
            term: Sub {
                name: function.name.clone(),
                formal_args,
                blocks: std::mem::take(&mut self.blocks),
            },
        })
    }

    fn lower_statements(&mut self, statements: &[ast::Statement]) -> Result<(), Error> {
        for statement in statements {
            self.lower_statement(statement)?;
        }
        Ok(())
    }

    fn lower_statement(&mut self, statement: &ast::Statement) -> Result<(), Error> {
        let line = statement.line;
        match &statement.kind {
            StatementKind::Decl { name, ty, init } => {
                let resolved = self.resolve_type(ty)?;
                self.scope.insert(name.clone(), resolved);
                if let Some(init) = init {
                    self.lower_assignment(&Expr::Ident(name.clone()), init, line)?;
                }
            }
            StatementKind::Assign { target, value } => {
                self.lower_assignment(target, value, line)?;
            }
            StatementKind::Expr(expr) => {
                if let Expr::Call { callee, args } = strip_casts(expr) {
                    self.lower_call(callee, args, None, false, line)?;
                } else {
                    self.lower_expr(expr, line)?;
                }
            }
            StatementKind::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.lower_expr(value, line)?),
                    None => None,
                };
                let tid = self.fresh_term_tid("jmp", line);
                self.finish_block(vec![Term {
                    tid,
                    term: Jmp::Return(value),
                }]);
            }
            StatementKind::If {
                condition,
                then_body,
                else_body,
            } => self.lower_if(condition, then_body, else_body, line)?,
            StatementKind::While { condition, body } => {
                let cond_tid = self.reserve_block();
                let body_tid = self.reserve_block();
                let join_tid = self.reserve_block();
                let tid = self.fresh_term_tid("jmp", line);
                self.finish_block(vec![Term {
                    tid,
                    term: Jmp::Branch(cond_tid.clone()),
                }]);
                self.start_block(cond_tid.clone());
                let condition = self.lower_expr(condition, line)?;
                let cbranch_tid = self.fresh_term_tid("jmp", line);
                let branch_tid = self.fresh_term_tid("jmp", line);
                self.finish_block(vec![
                    Term {
                        tid: cbranch_tid,
                        term: Jmp::CBranch {
                            target: body_tid.clone(),
                            condition,
                        },
                    },
                    Term {
                        tid: branch_tid,
                        term: Jmp::Branch(join_tid.clone()),
                    },
                ]);
                self.start_block(body_tid);
                self.lower_statements(body)?;
                if self.current.is_some() {
                    let tid = self.fresh_term_tid("jmp", line);
                    self.finish_block(vec![Term {
                        tid,
                        term: Jmp::Branch(cond_tid),
                    }]);
                }
                self.start_block(join_tid);
            }
            StatementKind::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.lower_statement(init)?;
                }
                let cond_tid = self.reserve_block();
                let body_tid = self.reserve_block();
                let join_tid = self.reserve_block();
                let tid = self.fresh_term_tid("jmp", line);
                self.finish_block(vec![Term {
                    tid,
                    term: Jmp::Branch(cond_tid.clone()),
                }]);
                self.start_block(cond_tid.clone());
                match condition {
                    Some(condition) => {
                        let condition = self.lower_expr(condition, line)?;
                        let cbranch_tid = self.fresh_term_tid("jmp", line);
                        let branch_tid = self.fresh_term_tid("jmp", line);
                        self.finish_block(vec![
                            Term {
                                tid: cbranch_tid,
                                term: Jmp::CBranch {
                                    target: body_tid.clone(),
                                    condition,
                                },
                            },
                            Term {
                                tid: branch_tid,
                                term: Jmp::Branch(join_tid.clone()),
                            },
                        ]);
                    }
                    None => {
                        let tid = self.fresh_term_tid("jmp", line);
                        self.finish_block(vec![Term {
                            tid,
                            term: Jmp::Branch(body_tid.clone()),
                        }]);
                    }
                }
                self.start_block(body_tid);
                self.lower_statements(body)?;
                if self.current.is_some() {
                    if let Some(step) = step {
                        self.lower_statement(step)?;
                    }
                    let tid = self.fresh_term_tid("jmp", line);
                    self.finish_block(vec![Term {
                        tid,
                        term: Jmp::Branch(cond_tid),
                    }]);
                }
                self.start_block(join_tid);
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        condition: &Expr,
        then_body: &[ast::Statement],
        else_body: &[ast::Statement],
        line: u64,
    ) -> Result<(), Error> {
        let condition = self.lower_expr(condition, line)?;
        let then_tid = self.reserve_block();
        // Without an else branch the false edge leads directly to the join block.
        let false_tid = self.reserve_block();
        let cbranch_tid = self.fresh_term_tid("jmp", line);
        let branch_tid = self.fresh_term_tid("jmp", line);
        self.finish_block(vec![
            Term {
                tid: cbranch_tid,
                term: Jmp::CBranch {
                    target: then_tid.clone(),
                    condition,
                },
            },
            Term {
                tid: branch_tid,
                term: Jmp::Branch(false_tid.clone()),
            },
        ]);
        if else_body.is_empty() {
            self.start_block(then_tid);
            self.lower_statements(then_body)?;
            if self.current.is_some() {
                let tid = self.fresh_term_tid("jmp", line);
                self.finish_block(vec![Term {
                    tid,
                    term: Jmp::Branch(false_tid.clone()),
                }]);
            }
            self.start_block(false_tid);
        } else {
            let join_tid = self.reserve_block();
            self.start_block(then_tid);
            self.lower_statements(then_body)?;
            if self.current.is_some() {
                let tid = self.fresh_term_tid("jmp", line);
                self.finish_block(vec![Term {
                    tid,
                    term: Jmp::Branch(join_tid.clone()),
                }]);
            }
            self.start_block(false_tid);
            self.lower_statements(else_body)?;
            if self.current.is_some() {
                let tid = self.fresh_term_tid("jmp", line);
                self.finish_block(vec![Term {
                    tid,
                    term: Jmp::Branch(join_tid.clone()),
                }]);
            }
            self.start_block(join_tid);
        }
        Ok(())
    }

    /// Lower an assignment or initialization.
    ///
    /// If the assigned value is a call, the call result is bound directly
    /// to the target variable. Targets that are not plain variables
    /// receive the result through a temporary and a store.
    fn lower_assignment(&mut self, target: &Expr, value: &Expr, line: u64) -> Result<(), Error> {
        if let Expr::Call { callee, args } = strip_casts(value) {
            if let Expr::Ident(name) = target {
                if let Some(var) = self.declared_var(name) {
                    self.lower_call(callee, args, Some(var), true, line)?;
                    return Ok(());
                }
            }
            let result = self.require_call_result(callee, args, line)?;
            let (place, _) = self.resolve_place(target, line)?;
            self.push_store_or_assign(place, Expression::Var(result), line);
            return Ok(());
        }
        let value = self.lower_expr(value, line)?;
        let (place, _) = self.resolve_place(target, line)?;
        self.push_store_or_assign(place, value, line);
        Ok(())
    }

    fn push_store_or_assign(&mut self, place: Place, value: Expression, line: u64) {
        match place.as_var() {
            Some(var) => {
                let var = var.clone();
                self.push_def(Def::Assign { var, value }, line);
            }
            None => self.push_def(Def::Store { place, value }, line),
        }
    }

    /// Lower a call and return its result variable, which is guaranteed
    /// to exist since a result is requested.
    fn require_call_result(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        line: u64,
    ) -> Result<Variable, Error> {
        match self.lower_call(callee, args, None, true, line)? {
            Some(result) => Ok(result),
            None => Err(anyhow!(
                "A call without a result is used as a value at line {line}"
            )),
        }
    }

    /// Lower a call expression.
    ///
    /// The call ends the current basic block. The block it returns to
    /// is started immediately, so lowering continues seamlessly.
    /// `bound_result` binds the result to a declared variable;
    /// otherwise a temporary is generated if `want_result` is set.
    fn lower_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        bound_result: Option<Variable>,
        want_result: bool,
        line: u64,
    ) -> Result<Option<Variable>, Error> {
        let mut lowered_args = Vec::new();
        for arg in args {
            lowered_args.push(self.lower_expr(arg, line)?);
        }
        let (callee, result_size) = match strip_callee_wrappers(callee) {
            Expr::Ident(name) => match self.scope.get(name).cloned() {
                Some(CType::FnPtr { return_type, .. }) => {
                    let place = Place::var(Variable::new(name, POINTER_SIZE));
                    (Callee::Indirect(place), self.value_size_of(&return_type))
                }
                Some(_) => {
                    return Err(anyhow!(
                        "The called variable {name} is not a function pointer at line {line}"
                    ))
                }
                None => match self.signatures.get(name) {
                    Some(signature) => {
                        if want_result && signature.return_type == CType::Void {
                            return Err(anyhow!(
                                "The void result of {name} is used as a value at line {line}"
                            ));
                        }
                        let size = self.value_size_of(&signature.return_type);
                        (Callee::Direct(signature.tid.clone()), size)
                    }
                    // Calls to undeclared names are calls to functions from
                    // skipped headers. Their result defaults to int size.
                    None => (Callee::Direct(self.extern_tid(name)), INT_SIZE),
                },
            },
            expr => {
                let (place, ty) = self.resolve_place(expr, line)?;
                let CType::FnPtr { return_type, .. } = ty else {
                    return Err(anyhow!(
                        "The called place {place} does not hold a function pointer at line {line}"
                    ));
                };
                let size = self.value_size_of(&return_type);
                (Callee::Indirect(place), size)
            }
        };
        let result = match bound_result {
            Some(var) => Some(var),
            None if want_result => Some(self.fresh_temp(result_size)),
            None => None,
        };
        let return_tid = self.reserve_block();
        let call_tid = self.fresh_term_tid("call", line);
        let call = match callee {
            Callee::Direct(target) => Jmp::Call {
                target,
                args: lowered_args,
                result: result.clone(),
                return_: Some(return_tid.clone()),
            },
            Callee::Indirect(target) => Jmp::CallInd {
                target,
                resolved_targets: Vec::new(),
                args: lowered_args,
                result: result.clone(),
                return_: Some(return_tid.clone()),
            },
        };
        self.finish_block(vec![Term {
            tid: call_tid,
            term: call,
        }]);
        self.start_block(return_tid);
        Ok(result)
    }

    /// Lower an expression to a side-effect-free IR expression.
    /// Memory reads and nested calls are materialized into temporaries.
    fn lower_expr(&mut self, expr: &Expr, line: u64) -> Result<Expression, Error> {
        match expr {
            Expr::Number(value) => Ok(Expression::Const(Constant::int(*value))),
            Expr::Null => Ok(Expression::Const(Constant::null())),
            Expr::Str(content) => Ok(Expression::Unknown {
                description: format!("\"{content}\""),
                size: POINTER_SIZE,
            }),
            Expr::Ident(name) => {
                if let Some(var) = self.declared_var(name) {
                    return Ok(Expression::Var(var));
                }
                // A function name in value position denotes its address.
                // Unknown names are treated as functions from skipped headers.
                if let Some(signature) = self.signatures.get(name) {
                    return Ok(Expression::FnAddr(signature.tid.clone()));
                }
                Ok(Expression::FnAddr(self.extern_tid(name)))
            }
            Expr::Call { callee, args } => {
                let result = self.require_call_result(callee, args, line)?;
                Ok(Expression::Var(result))
            }
            Expr::Member { .. } | Expr::Index { .. } => {
                let (place, ty) = self.resolve_place(expr, line)?;
                let var = self.fresh_temp(self.value_size_of(&ty));
                self.push_def(
                    Def::Load {
                        var: var.clone(),
                        place,
                    },
                    line,
                );
                Ok(Expression::Var(var))
            }
            Expr::Unary { op, operand } => self.lower_unary(*op, operand, line),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs, line)?;
                let rhs = self.lower_expr(rhs, line)?;
                let expression = match op {
                    BinaryOp::Add => binop(BinOpType::IntAdd, lhs, rhs),
                    BinaryOp::Sub => binop(BinOpType::IntSub, lhs, rhs),
                    BinaryOp::Mul => binop(BinOpType::IntMult, lhs, rhs),
                    BinaryOp::Div => binop(BinOpType::IntSDiv, lhs, rhs),
                    BinaryOp::Rem => binop(BinOpType::IntSRem, lhs, rhs),
                    BinaryOp::Equal => binop(BinOpType::IntEqual, lhs, rhs),
                    BinaryOp::NotEqual => binop(BinOpType::IntNotEqual, lhs, rhs),
                    BinaryOp::Less => binop(BinOpType::IntSLess, lhs, rhs),
                    BinaryOp::LessEqual => binop(BinOpType::IntSLessEqual, lhs, rhs),
                    // Swapped comparisons keep the IR operator set small.
                    BinaryOp::Greater => binop(BinOpType::IntSLess, rhs, lhs),
                    BinaryOp::GreaterEqual => binop(BinOpType::IntSLessEqual, rhs, lhs),
                    BinaryOp::And => binop(BinOpType::BoolAnd, lhs, rhs),
                    BinaryOp::Or => binop(BinOpType::BoolOr, lhs, rhs),
                };
                Ok(expression)
            }
            Expr::Cast { expr, .. } => self.lower_expr(expr, line),
            Expr::SizeofType(ty) => {
                let resolved = self.resolve_type(ty)?;
                let size = self.registry.size_of(&resolved);
                Ok(Expression::Const(Constant::int(u64::from(size) as i64)))
            }
            Expr::SizeofExpr(expr) => {
                let ty = self.static_type_of(expr, line)?;
                let size = self.registry.size_of(&ty);
                Ok(Expression::Const(Constant::int(u64::from(size) as i64)))
            }
        }
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, line: u64) -> Result<Expression, Error> {
        match op {
            UnaryOp::Not => {
                let arg = self.lower_expr(operand, line)?;
                Ok(Expression::UnOp {
                    op: UnOpType::BoolNegate,
                    arg: Box::new(arg),
                })
            }
            UnaryOp::Negate => {
                let arg = self.lower_expr(operand, line)?;
                // Negated literals fold into signed constants.
                if let Expression::Const(constant) = &arg {
                    return Ok(Expression::Const(Constant {
                        value: -constant.value,
                        size: constant.size,
                    }));
                }
                Ok(Expression::UnOp {
                    op: UnOpType::Int2Comp,
                    arg: Box::new(arg),
                })
            }
            UnaryOp::AddressOf => match operand {
                Expr::Ident(name) => {
                    if let Some(var) = self.declared_var(name) {
                        return Ok(Expression::UnOp {
                            op: UnOpType::AddressOf,
                            arg: Box::new(Expression::Var(var)),
                        });
                    }
                    if let Some(signature) = self.signatures.get(name) {
                        return Ok(Expression::FnAddr(signature.tid.clone()));
                    }
                    Ok(Expression::FnAddr(self.extern_tid(name)))
                }
                _ => Err(anyhow!(
                    "Taking the address of a non-variable expression is not supported at line {line}"
                )),
            },
            UnaryOp::Deref => {
                let (place, ty) = self.resolve_place(operand, line)?;
                let mut place = place;
                place.accessors.push(Accessor::Deref);
                let inner = ty
                    .strip_pointer()
                    .cloned()
                    .unwrap_or(CType::Int { size: INT_SIZE });
                let var = self.fresh_temp(self.value_size_of(&inner));
                self.push_def(
                    Def::Load {
                        var: var.clone(),
                        place,
                    },
                    line,
                );
                Ok(Expression::Var(var))
            }
        }
    }

    /// Resolve an lvalue expression into a place and its type.
    ///
    /// Array index expressions are lowered for their side effects
    /// (they may contain calls) and then collapsed into [`Accessor::Index`].
    fn resolve_place(&mut self, expr: &Expr, line: u64) -> Result<(Place, CType), Error> {
        match expr {
            Expr::Ident(name) => {
                let ty = self
                    .scope
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("Unknown variable {name} at line {line}"))?;
                let var = Variable::new(name, self.value_size_of(&ty));
                Ok((Place::var(var), ty))
            }
            Expr::Member {
                base,
                field,
                through_pointer,
            } => {
                let (mut place, base_ty) = self.resolve_place(base, line)?;
                let struct_name = if *through_pointer {
                    match base_ty.strip_pointer() {
                        Some(CType::Struct(name)) => name.clone(),
                        _ => {
                            return Err(anyhow!(
                                "'->' is applied to a non-struct-pointer at line {line}"
                            ))
                        }
                    }
                } else {
                    match &base_ty {
                        CType::Struct(name) => name.clone(),
                        _ => return Err(anyhow!("'.' is applied to a non-struct at line {line}")),
                    }
                };
                if *through_pointer {
                    place.accessors.push(Accessor::Deref);
                }
                // Fields of structs from skipped headers get an opaque type.
                let field_ty = self
                    .registry
                    .field_type(&struct_name, field)
                    .cloned()
                    .unwrap_or(CType::Int { size: INT_SIZE });
                place.accessors.push(Accessor::Field {
                    struct_name,
                    field: field.clone(),
                });
                Ok((place, field_ty))
            }
            Expr::Index { base, index } => {
                let (mut place, base_ty) = self.resolve_place(base, line)?;
                let element_ty = match &base_ty {
                    CType::Array { element, .. } => (**element).clone(),
                    CType::Pointer(inner) => (**inner).clone(),
                    _ => {
                        return Err(anyhow!(
                            "Indexing is applied to a non-array at line {line}"
                        ))
                    }
                };
                self.lower_expr(index, line)?;
                place.accessors.push(Accessor::Index);
                Ok((place, element_ty))
            }
            Expr::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let (mut place, base_ty) = self.resolve_place(operand, line)?;
                place.accessors.push(Accessor::Deref);
                let inner = base_ty
                    .strip_pointer()
                    .cloned()
                    .unwrap_or(CType::Int { size: INT_SIZE });
                Ok((place, inner))
            }
            Expr::Cast { expr, .. } => self.resolve_place(expr, line),
            _ => Err(anyhow!(
                "The expression cannot be used as a place at line {line}"
            )),
        }
    }

    /// Compute the type of an expression without lowering it,
    /// for `sizeof` on expressions.
    fn static_type_of(&self, expr: &Expr, line: u64) -> Result<CType, Error> {
        match expr {
            Expr::Ident(name) => self
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("Unknown variable {name} at line {line}")),
            Expr::Member {
                base,
                field,
                through_pointer,
            } => {
                let base_ty = self.static_type_of(base, line)?;
                let struct_name = if *through_pointer {
                    match base_ty.strip_pointer() {
                        Some(CType::Struct(name)) => name.clone(),
                        _ => {
                            return Err(anyhow!(
                                "'->' is applied to a non-struct-pointer at line {line}"
                            ))
                        }
                    }
                } else {
                    match base_ty {
                        CType::Struct(name) => name,
                        _ => return Err(anyhow!("'.' is applied to a non-struct at line {line}")),
                    }
                };
                self.registry
                    .field_type(&struct_name, field)
                    .cloned()
                    .ok_or_else(|| {
                        anyhow!(
                            "The layout of struct {struct_name} is unknown at line {line}"
                        )
                    })
            }
            Expr::Index { base, .. } => match self.static_type_of(base, line)? {
                CType::Array { element, .. } => Ok(*element),
                CType::Pointer(inner) => Ok(*inner),
                _ => Err(anyhow!("Indexing is applied to a non-array at line {line}")),
            },
            Expr::Unary {
                op: UnaryOp::Deref,
                operand,
            } => match self.static_type_of(operand, line)? {
                CType::Pointer(inner) => Ok(*inner),
                _ => Err(anyhow!(
                    "Dereferencing is applied to a non-pointer at line {line}"
                )),
            },
            Expr::Cast { ty, .. } => self.resolve_type(ty),
            Expr::Number(_) => Ok(CType::Int { size: INT_SIZE }),
            Expr::Str(_) => Ok(CType::Pointer(Box::new(CType::Char))),
            Expr::Null => Ok(CType::Pointer(Box::new(CType::Void))),
            _ => Err(anyhow!(
                "The size of this expression cannot be computed at line {line}"
            )),
        }
    }
}

fn binop(op: BinOpType, lhs: Expression, rhs: Expression) -> Expression {
    Expression::BinOp {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn strip_casts(expr: &Expr) -> &Expr {
    match expr {
        Expr::Cast { expr, .. } => strip_casts(expr),
        other => other,
    }
}

/// Strip casts and dereferences around a callee:
/// `(*f)(x)` calls the same function pointer as `f(x)`.
fn strip_callee_wrappers(expr: &Expr) -> &Expr {
    match expr {
        Expr::Cast { expr, .. } => strip_callee_wrappers(expr),
        Expr::Unary {
            op: UnaryOp::Deref,
            operand,
        } => strip_callee_wrappers(operand),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{lexer, parser};

    fn lower_source(source: &str) -> Project {
        let tokens = lexer::lex(source).unwrap();
        let unit = parser::parse(tokens).unwrap();
        lower(&unit, "fixture.c").unwrap()
    }

    fn sub_by_name<'a>(project: &'a Project, name: &str) -> &'a Term<Sub> {
        let tid = project.program.term.find_callable_by_name(name).unwrap();
        &project.program.term.subs[&tid]
    }

    fn jmps_of<'a>(sub: &'a Term<Sub>) -> impl Iterator<Item = &'a Term<Jmp>> {
        sub.term
            .blocks
            .iter()
            .flat_map(|block| block.term.jmps.iter())
    }

    #[test]
    fn call_results_bind_directly_to_the_declared_variable() {
        let project = lower_source(
            r#"
            int target(int fd) {
                char buffer[10];
                int bs = read(fd, buffer, 5);
                return bs;
            }
            "#,
        );
        let read_tid = project.program.term.find_callable_by_name("read").unwrap();
        let target = sub_by_name(&project, "target");
        let call = jmps_of(target)
            .find_map(|jmp| match &jmp.term {
                Jmp::Call {
                    target,
                    args,
                    result,
                    return_,
                } if *target == read_tid => Some((args.clone(), result.clone(), return_.clone())),
                _ => None,
            })
            .unwrap();
        let (args, result, return_) = call;
        assert_eq!(
            result,
            Some(Variable::new("bs", ByteSize::new(4)))
        );
        assert_eq!(args[0], Expression::Var(Variable::new("fd", ByteSize::new(4))));
        // Arrays decay to pointer-sized values in argument position.
        assert_eq!(
            args[1],
            Expression::Var(Variable::new("buffer", POINTER_SIZE))
        );
        let return_block = target.find_block(&return_.unwrap()).unwrap();
        assert_eq!(
            return_block.term.jmps[0].term,
            Jmp::Return(Some(Expression::Var(Variable::new(
                "bs",
                ByteSize::new(4)
            ))))
        );
    }

    #[test]
    fn negative_literals_fold_and_branches_meet_at_the_join_block() {
        let project = lower_source(
            r#"
            int guarded(int fd) {
                char buffer[10];
                int bs = read(fd, buffer, 5);
                if (bs < 0) {
                    return -30;
                }
                return bs + 6;
            }
            "#,
        );
        let guarded = sub_by_name(&project, "guarded");
        let cbranch_target = jmps_of(guarded)
            .find_map(|jmp| match &jmp.term {
                Jmp::CBranch { target, condition } => {
                    assert_eq!(
                        *condition,
                        Expression::BinOp {
                            op: BinOpType::IntSLess,
                            lhs: Box::new(Expression::Var(Variable::new("bs", ByteSize::new(4)))),
                            rhs: Box::new(Expression::Const(Constant::int(0))),
                        }
                    );
                    Some(target.clone())
                }
                _ => None,
            })
            .unwrap();
        let error_block = guarded.find_block(&cbranch_target).unwrap();
        assert_eq!(
            error_block.term.jmps[0].term,
            Jmp::Return(Some(Expression::Const(Constant::int(-30))))
        );
    }

    #[test]
    fn stores_of_function_names_become_function_addresses() {
        let project = lower_source(
            r#"
            typedef void *(*alloc_fn_t)(size_t);

            struct holder {
                alloc_fn_t alloc_fn;
                int x;
            };

            void setup(struct holder *h) {
                h->alloc_fn = malloc;
            }
            "#,
        );
        let malloc_tid = project
            .program
            .term
            .find_callable_by_name("malloc")
            .unwrap();
        assert!(project.program.term.extern_symbols.contains_key(&malloc_tid));
        let setup = sub_by_name(&project, "setup");
        let store = setup.term.blocks[0].term.defs[0].clone();
        let Def::Store { place, value } = store.term else {
            panic!("Expected a store to the function pointer field");
        };
        assert_eq!(value, Expression::FnAddr(malloc_tid));
        assert_eq!(place.base, Variable::new("h", POINTER_SIZE));
        assert_eq!(
            place.accessors,
            vec![
                Accessor::Deref,
                Accessor::Field {
                    struct_name: "holder".to_string(),
                    field: "alloc_fn".to_string(),
                },
            ]
        );
    }

    #[test]
    fn calls_through_struct_members_lower_to_indirect_calls() {
        let project = lower_source(
            r#"
            typedef void *(*alloc_fn_t)(size_t);

            struct holder {
                alloc_fn_t alloc_fn;
                int x;
            };

            int *make_buffer(struct holder *h, int n) {
                return h->alloc_fn(n * sizeof(int));
            }
            "#,
        );
        let make_buffer = sub_by_name(&project, "make_buffer");
        let (target, args, result) = jmps_of(make_buffer)
            .find_map(|jmp| match &jmp.term {
                Jmp::CallInd {
                    target,
                    args,
                    result,
                    resolved_targets,
                    ..
                } => {
                    assert!(resolved_targets.is_empty());
                    Some((target.clone(), args.clone(), result.clone()))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(target.last_field(), Some(("holder", "alloc_fn")));
        // sizeof(int) folds to a constant, so the argument is a pure expression.
        assert_eq!(
            args[0],
            Expression::BinOp {
                op: BinOpType::IntMult,
                lhs: Box::new(Expression::Var(Variable::new("n", ByteSize::new(4)))),
                rhs: Box::new(Expression::Const(Constant::int(4))),
            }
        );
        // The pointer result of the indirect call lands in a pointer-sized temporary.
        assert_eq!(result.unwrap().size, POINTER_SIZE);
    }

    #[test]
    fn member_reads_in_conditions_are_materialized_as_loads() {
        let project = lower_source(
            r#"
            struct descriptor {
                int (*read_data)(struct reader *);
            };

            struct reader {
                struct descriptor *format;
            };

            int dispatch(struct reader *r) {
                if (r->format->read_data == NULL) return -1;
                return 0;
            }
            "#,
        );
        let dispatch = sub_by_name(&project, "dispatch");
        let entry = &dispatch.term.blocks[0];
        let Def::Load { var, place } = &entry.term.defs[0].term else {
            panic!("Expected the function pointer load");
        };
        assert_eq!(var.size, POINTER_SIZE);
        assert!(var.is_temp);
        assert_eq!(place.last_field(), Some(("descriptor", "read_data")));
        let Jmp::CBranch { condition, .. } = &entry.term.jmps[0].term else {
            panic!("Expected the NULL comparison branch");
        };
        assert_eq!(
            *condition,
            Expression::BinOp {
                op: BinOpType::IntEqual,
                lhs: Box::new(Expression::Var(var.clone())),
                rhs: Box::new(Expression::Const(Constant::null())),
            }
        );
    }

    #[test]
    fn for_loops_jump_back_to_the_condition_block() {
        let project = lower_source(
            r#"
            struct entry {
                int (*handler)(int);
            };

            struct table {
                struct entry entries[4];
            };

            int fill(struct table *t, int (*handler)(int)) {
                int slots = sizeof(t->entries) / sizeof(t->entries[0]);
                for (int i = 0; i < slots; ++i) {
                    t->entries[i].handler = handler;
                }
                return slots;
            }
            "#,
        );
        let fill = sub_by_name(&project, "fill");
        // sizeof on the array and its element fold to exact byte counts.
        let Def::Assign { value, .. } = &fill.term.blocks[0].term.defs[0].term else {
            panic!("Expected the slot count assignment");
        };
        assert_eq!(
            *value,
            Expression::BinOp {
                op: BinOpType::IntSDiv,
                lhs: Box::new(Expression::Const(Constant::int(32))),
                rhs: Box::new(Expression::Const(Constant::int(8))),
            }
        );
        let (cond_tid, body_tid) = fill
            .term
            .blocks
            .iter()
            .find_map(|block| match block.term.jmps.first().map(|jmp| &jmp.term) {
                Some(Jmp::CBranch { target, .. }) => Some((block.tid.clone(), target.clone())),
                _ => None,
            })
            .unwrap();
        let body = fill.find_block(&body_tid).unwrap();
        let Def::Store { place, value } = &body.term.defs[0].term else {
            panic!("Expected the store through the collapsed index");
        };
        assert_eq!(place.last_field(), Some(("entry", "handler")));
        assert!(place.accessors.contains(&Accessor::Index));
        assert_eq!(
            *value,
            Expression::Var(Variable::new("handler", POINTER_SIZE))
        );
        // The body block ends with the back edge, after the increment.
        assert!(matches!(
            &body.term.jmps[0].term,
            Jmp::Branch(target) if *target == cond_tid
        ));
        assert!(body
            .term
            .defs
            .iter()
            .any(|def| matches!(&def.term, Def::Assign { var, .. } if var.name == "i")));
    }

    #[test]
    fn empty_bodies_still_get_an_entry_block() {
        let project = lower_source("void log_failure(void *p) {\n}\n");
        let log_failure = sub_by_name(&project, "log_failure");
        assert_eq!(log_failure.term.blocks.len(), 1);
        assert!(log_failure.term.blocks[0].term.defs.is_empty());
        // The fallthrough return is inserted by normalization.
        assert!(log_failure.term.blocks[0].term.jmps.is_empty());
    }

    #[test]
    fn term_addresses_carry_file_and_line() {
        let source = "int f(int fd) {\n    int n = read(fd);\n    return n;\n}\n";
        let project = lower_source(source);
        let f = sub_by_name(&project, "f");
        assert_eq!(f.tid.address, "fixture.c:1");
        let call = jmps_of(f)
            .find(|jmp| matches!(jmp.term, Jmp::Call { .. }))
            .unwrap();
        assert_eq!(call.tid.address, "fixture.c:2");
        let ret = jmps_of(f)
            .find(|jmp| matches!(jmp.term, Jmp::Return(_)))
            .unwrap();
        assert_eq!(ret.tid.address, "fixture.c:3");
    }

    #[test]
    fn unknown_struct_layouts_lower_to_opaque_locals() {
        let project = lower_source(
            r#"
            int watch(int fd) {
                struct stat s;
                int b = fstat(fd, &s);
                if (b < 0) {
                    return -22;
                }
                return b + 1;
            }
            "#,
        );
        let watch = sub_by_name(&project, "watch");
        let fstat_tid = project.program.term.find_callable_by_name("fstat").unwrap();
        let args = jmps_of(watch)
            .find_map(|jmp| match &jmp.term {
                Jmp::Call { target, args, .. } if *target == fstat_tid => Some(args.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            args[1],
            Expression::UnOp {
                op: UnOpType::AddressOf,
                arg: Box::new(Expression::Var(Variable::new("s", POINTER_SIZE))),
            }
        );
    }
}
