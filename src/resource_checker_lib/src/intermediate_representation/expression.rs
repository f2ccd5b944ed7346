use super::{ByteSize, Variable, POINTER_SIZE};
use crate::prelude::*;
use std::fmt;

/// An integer constant with a known byte size.
///
/// `NULL` is represented as the zero constant of pointer size.
/// Negative literals are folded into the value during lowering.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Constant {
    /// The (signed) value of the constant.
    pub value: i64,
    /// The size (in bytes) of the constant.
    pub size: ByteSize,
}

impl Constant {
    /// Create an `int`-sized constant.
    pub fn int(value: i64) -> Constant {
        Constant {
            value,
            size: super::INT_SIZE,
        }
    }

    /// Create the `NULL` pointer constant.
    pub fn null() -> Constant {
        Constant {
            value: 0,
            size: POINTER_SIZE,
        }
    }

    /// Returns true if the constant is the `NULL` pointer.
    pub fn is_null(&self) -> bool {
        self.value == 0 && self.size == POINTER_SIZE
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NULL")
        } else {
            write!(f, "{}:{}", self.value, self.size)
        }
    }
}

/// An `Expression` is a side-effect-free value computed from variables and constants.
///
/// Memory reads are not expressions:
/// lowering materializes every read through a [`Place`](super::Place)
/// into its own [`Def::Load`](super::Def) term,
/// so that expressions only ever depend on variables.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Expression {
    /// A variable holding the value.
    Var(Variable),
    /// An integer constant.
    Const(Constant),
    /// The address of the function or extern symbol with the given term ID.
    ///
    /// Generated when a function name is used in value position,
    /// e.g. `s->alloc_fn = malloc;` or a function passed as a call argument.
    FnAddr(Tid),
    /// A binary operation.
    /// Note that most (but not all) operations require the left hand side (`lhs`)
    /// and right hand side (`rhs`) to be of equal size.
    BinOp {
        /// The opcode of the binary operation
        op: BinOpType,
        /// The left hand side operand
        lhs: Box<Expression>,
        /// The right hand side operand
        rhs: Box<Expression>,
    },
    /// A unary operation
    UnOp {
        /// The opcode of the unary operation
        op: UnOpType,
        /// The operand
        arg: Box<Expression>,
    },
    /// An opaque value of known size that the analysis does not model,
    /// e.g. a string literal used as a call argument.
    Unknown {
        /// A description of the opaque value for logs and displays.
        description: String,
        /// The size (in bytes) of the value.
        size: ByteSize,
    },
}

impl Expression {
    /// Return the size (in bytes) of the result value of the expression.
    pub fn bytesize(&self) -> ByteSize {
        use BinOpType::*;
        use Expression::*;
        match self {
            Var(var) => var.size,
            Const(constant) => constant.size,
            FnAddr(_) => POINTER_SIZE,
            BinOp { op, lhs, rhs: _ } => match op {
                IntEqual | IntNotEqual | IntSLess | IntSLessEqual | BoolAnd | BoolOr => {
                    ByteSize::new(1)
                }
                IntAdd | IntSub | IntMult | IntSDiv | IntSRem => lhs.bytesize(),
            },
            UnOp { op, arg } => match op {
                UnOpType::AddressOf => POINTER_SIZE,
                UnOpType::BoolNegate => ByteSize::new(1),
                UnOpType::Int2Comp => arg.bytesize(),
            },
            Unknown {
                description: _,
                size,
            } => *size,
        }
    }

    /// Return an array of all input variables of the given expression.
    /// The array may contain duplicates.
    pub fn input_vars(&self) -> Vec<&Variable> {
        use Expression::*;
        match self {
            Var(var) => vec![var],
            Const(_) | FnAddr(_) | Unknown { .. } => Vec::new(),
            BinOp { op: _, lhs, rhs } => {
                let mut vars = lhs.input_vars();
                vars.append(&mut rhs.input_vars());
                vars
            }
            UnOp { arg, .. } => arg.input_vars(),
        }
    }

    /// If the expression is a constant, return it.
    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Expression::Const(constant) => Some(constant),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Var(var) => write!(f, "{var}"),
            Expression::Const(constant) => write!(f, "{constant}"),
            Expression::FnAddr(tid) => write!(f, "&{tid}"),
            Expression::BinOp { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expression::UnOp { op, arg } => write!(f, "{op}({arg})"),
            Expression::Unknown { description, .. } => write!(f, "unknown:{description}"),
        }
    }
}

/// The opcodes of binary operations.
///
/// Comparison results are boolean (one byte).
/// All integers in the analyzed source subset are treated as signed.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BinOpType {
    /// Integer addition
    IntAdd,
    /// Integer subtraction
    IntSub,
    /// Integer multiplication
    IntMult,
    /// Signed integer division
    IntSDiv,
    /// Signed integer remainder
    IntSRem,
    /// Equality comparison
    IntEqual,
    /// Inequality comparison
    IntNotEqual,
    /// Signed less-than comparison
    IntSLess,
    /// Signed less-than-or-equal comparison
    IntSLessEqual,
    /// Boolean and
    BoolAnd,
    /// Boolean or
    BoolOr,
}

impl fmt::Display for BinOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOpType::*;
        let symbol = match self {
            IntAdd => "+",
            IntSub => "-",
            IntMult => "*",
            IntSDiv => "/",
            IntSRem => "%",
            IntEqual => "==",
            IntNotEqual => "!=",
            IntSLess => "<",
            IntSLessEqual => "<=",
            BoolAnd => "&&",
            BoolOr => "||",
        };
        write!(f, "{symbol}")
    }
}

/// The opcodes of unary operations.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum UnOpType {
    /// Arithmetic negation
    Int2Comp,
    /// Boolean negation
    BoolNegate,
    /// The address of a variable (`&x`)
    AddressOf,
}

impl fmt::Display for UnOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            UnOpType::Int2Comp => "-",
            UnOpType::BoolNegate => "!",
            UnOpType::AddressOf => "&",
        };
        write!(f, "{symbol}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_sizes() {
        let comparison = Expression::BinOp {
            op: BinOpType::IntSLess,
            lhs: Box::new(Expression::Var(Variable::new("bs", ByteSize::new(4)))),
            rhs: Box::new(Expression::Const(Constant::int(0))),
        };
        assert_eq!(comparison.bytesize(), ByteSize::new(1));
        assert_eq!(Expression::Const(Constant::null()).bytesize(), POINTER_SIZE);
        assert_eq!(format!("{comparison}"), "(bs:4 < 0:4)");
    }

    #[test]
    fn input_vars_of_nested_expressions() {
        let expr = Expression::BinOp {
            op: BinOpType::IntMult,
            lhs: Box::new(Expression::Var(Variable::new("n", ByteSize::new(4)))),
            rhs: Box::new(Expression::UnOp {
                op: UnOpType::Int2Comp,
                arg: Box::new(Expression::Var(Variable::new("m", ByteSize::new(4)))),
            }),
        };
        let names: Vec<_> = expr.input_vars().iter().map(|var| var.name.clone()).collect();
        assert_eq!(names, vec!["n".to_string(), "m".to_string()]);
    }
}
