use super::ByteSize;
use crate::prelude::*;
use std::fmt::Display;

/// A variable represents a local variable, formal parameter or global
/// of the analyzed translation unit with a known size and name.
///
/// Variables can be temporary (or virtual).
/// In this case they do not occur in the analyzed source
/// and are only used to store intermediate results necessary for representing more complex statements.
/// Temporary variables are only valid inside the statement that generated them.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Variable {
    /// The name of the variable. Equals the declared name if the variable occurs in the source.
    pub name: String,
    /// The size (in bytes) of the variable.
    pub size: ByteSize,
    /// Set to `false` for declared variables and to `true` for temporary (virtual) variables.
    pub is_temp: bool,
}

impl Variable {
    /// Create a declared (non-temporary) variable with the given name and size.
    pub fn new(name: impl ToString, size: ByteSize) -> Variable {
        Variable {
            name: name.to_string(),
            size,
            is_temp: false,
        }
    }

    /// Create a temporary variable with the given name and size.
    pub fn temp(name: impl ToString, size: ByteSize) -> Variable {
        Variable {
            name: name.to_string(),
            size,
            is_temp: true,
        }
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.size)?;
        if self.is_temp {
            write!(f, "(temp)")?;
        }
        Ok(())
    }
}
