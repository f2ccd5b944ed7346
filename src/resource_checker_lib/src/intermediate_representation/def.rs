use std::fmt;

use super::{Expression, Place, Variable};
use crate::prelude::*;

/// A side-effectful operation.
/// Can be a variable assignment or a memory load/store operation.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Def {
    /// A memory read through `place` into the variable given by `var`.
    Load {
        /// The variable the loaded value is written to.
        /// The size of `var` also determines the number of bytes read.
        var: Variable,
        /// The place that is read from.
        place: Place,
    },
    /// A memory write operation.
    Store {
        /// The place that is written to.
        place: Place,
        /// The expression computing the value that is written.
        /// The size of `value` also determines the number of bytes written.
        value: Expression,
    },
    /// A variable assignment, assigning the result of the expression `value` to the variable `var`.
    Assign {
        /// The variable that is written to.
        var: Variable,
        /// The expression computing the value that is assigned to the variable.
        value: Expression,
    },
}

impl Def {
    /// If the def writes to a variable (assignment or load), return the variable.
    pub fn assigned_var(&self) -> Option<&Variable> {
        match self {
            Def::Assign { var, .. } | Def::Load { var, .. } => Some(var),
            Def::Store { .. } => None,
        }
    }

    /// Return all variables whose values are read by the def,
    /// including the base variables of accessed places.
    pub fn input_vars(&self) -> Vec<&Variable> {
        match self {
            Def::Assign { var: _, value } => value.input_vars(),
            Def::Load { var: _, place } => vec![&place.base],
            Def::Store { place, value } => {
                let mut vars = value.input_vars();
                vars.push(&place.base);
                vars
            }
        }
    }
}

impl fmt::Display for Def {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Def::Load { var, place } => write!(f, "{var} := Load from {place}"),
            Def::Store { place, value } => write!(f, "Store at {place} := {value}"),
            Def::Assign { var, value } => write!(f, "{var} = {value}"),
        }
    }
}
