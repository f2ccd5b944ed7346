use super::{Expression, Place, Variable};
use crate::prelude::*;
use itertools::Itertools;
use std::fmt;

/// A `Jmp` instruction affects the control flow of a program, i.e. it may change the instruction pointer.
/// It has no other side effects apart from binding call results.
///
/// `Jmp` instructions carry some semantic information with them, like whether a jump is intra- or interprocedural.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Jmp {
    /// A direct intraprocedural jump to the targeted `Blk` term identifier.
    Branch(Tid),
    /// A direct intraprocedural jump that is only taken if the condition evaluates to true (i.e. not zero).
    CBranch {
        /// The term ID of the target block of the jump.
        target: Tid,
        /// The jump is only taken if this expression evaluates to `true`, (i.e. not zero).
        condition: Expression,
    },
    /// A direct call to a function defined in the translation unit or to an extern symbol.
    Call {
        /// The term ID of the target function (`Sub`) or extern symbol of the call.
        target: Tid,
        /// The actual arguments of the call in declaration order.
        args: Vec<Expression>,
        /// The variable the call result is bound to, if the result is used.
        result: Option<Variable>,
        /// The term ID of the block that the called function returns to.
        /// May be `None` if it is assumed that the called function never returns.
        return_: Option<Tid>,
    },
    /// An indirect call through a function-pointer-valued place.
    CallInd {
        /// The place holding the called function pointer.
        target: Place,
        /// Possible call targets as resolved by the function pointer analysis.
        /// Empty directly after lowering.
        resolved_targets: Vec<Tid>,
        /// The actual arguments of the call in declaration order.
        args: Vec<Expression>,
        /// The variable the call result is bound to, if the result is used.
        result: Option<Variable>,
        /// The term ID of the block that the called function returns to.
        return_: Option<Tid>,
    },
    /// A return from the current function,
    /// with the returned value (for non-void functions).
    Return(Option<Expression>),
}

impl Jmp {
    /// If the jump is a (direct or indirect) call,
    /// return the variable its result is bound to.
    pub fn call_result(&self) -> Option<&Variable> {
        match self {
            Jmp::Call { result, .. } | Jmp::CallInd { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// If the jump is a (direct or indirect) call, return its return target block.
    pub fn call_return_target(&self) -> Option<&Tid> {
        match self {
            Jmp::Call { return_, .. } | Jmp::CallInd { return_, .. } => return_.as_ref(),
            _ => None,
        }
    }

    /// If the jump is a (direct or indirect) call, return its actual arguments.
    pub fn call_args(&self) -> Option<&[Expression]> {
        match self {
            Jmp::Call { args, .. } | Jmp::CallInd { args, .. } => Some(args),
            _ => None,
        }
    }
}

impl Term<Jmp> {
    /// If the jump is intraprocedural, return its target TID.
    /// If the jump is a call, return the TID of the return target.
    pub fn get_intraprocedural_target_or_return_block_tid(&self) -> Option<Tid> {
        match &self.term {
            Jmp::Return(_) => None,
            Jmp::Branch(tid) => Some(tid.clone()),
            Jmp::CBranch { target, .. } => Some(target.clone()),
            Jmp::Call { return_, .. } | Jmp::CallInd { return_, .. } => {
                return_.as_ref().cloned()
            }
        }
    }
}

impl fmt::Display for Jmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Jmp::Branch(tid) => write!(f, "Jump to {tid}"),
            Jmp::CBranch { target, condition } => write!(f, "If {condition} jump to {target}"),
            Jmp::Call {
                target,
                args,
                result,
                return_,
            } => {
                if let Some(result) = result {
                    write!(f, "{result} = ")?;
                }
                write!(f, "call {target}({})", args.iter().join(", "))?;
                if let Some(return_tid) = return_ {
                    write!(f, " ret {return_tid}")?;
                }
                Ok(())
            }
            Jmp::CallInd {
                target,
                resolved_targets,
                args,
                result,
                return_,
            } => {
                if let Some(result) = result {
                    write!(f, "{result} = ")?;
                }
                write!(f, "call *{target}({})", args.iter().join(", "))?;
                if !resolved_targets.is_empty() {
                    write!(f, " resolved to [{}]", resolved_targets.iter().join(", "))?;
                }
                if let Some(return_tid) = return_ {
                    write!(f, " ret {return_tid}")?;
                }
                Ok(())
            }
            Jmp::Return(Some(value)) => write!(f, "return {value}"),
            Jmp::Return(None) => write!(f, "return"),
        }
    }
}
