use super::Variable;
use crate::prelude::*;
use std::fmt;

/// A `Place` is an lvalue path through memory:
/// a base variable followed by a chain of dereferences, field accesses and indexings.
///
/// Array indices are collapsed, i.e. `formats[0]` and `formats[i]`
/// denote the same place. This keeps the pointer model field-sensitive
/// but index-insensitive.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Place {
    /// The variable the access path starts from.
    pub base: Variable,
    /// The access path, outermost accessor first.
    pub accessors: Vec<Accessor>,
}

/// A single step of an access path.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum Accessor {
    /// A pointer dereference (`*p` or the dereference half of `->`).
    Deref,
    /// A struct field access.
    /// The struct name is recorded so that field places can be collapsed
    /// over all instances of the struct.
    Field {
        /// The name of the struct the field belongs to.
        struct_name: String,
        /// The name of the accessed field.
        field: String,
    },
    /// An array indexing with the index collapsed.
    Index,
}

impl Place {
    /// Create the place denoting the variable itself.
    pub fn var(base: Variable) -> Place {
        Place {
            base,
            accessors: Vec::new(),
        }
    }

    /// If the place is a bare variable without accessors, return the variable.
    pub fn as_var(&self) -> Option<&Variable> {
        if self.accessors.is_empty() {
            Some(&self.base)
        } else {
            None
        }
    }

    /// Return the struct name and field name of the last field accessor
    /// of the path, if the path ends in a field access.
    ///
    /// This is the collapse point for the pointer model:
    /// all places ending in the same field of the same struct type
    /// share one points-to cell.
    pub fn last_field(&self) -> Option<(&str, &str)> {
        match self.accessors.last() {
            Some(Accessor::Field { struct_name, field }) => Some((struct_name, field)),
            _ => None,
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base.name)?;
        let mut accessors = self.accessors.iter().peekable();
        while let Some(accessor) = accessors.next() {
            match accessor {
                Accessor::Deref => {
                    if let Some(Accessor::Field { field, .. }) = accessors.peek() {
                        write!(f, "->{field}")?;
                        accessors.next();
                    } else {
                        write!(f, "[*]")?;
                    }
                }
                Accessor::Field { field, .. } => write!(f, ".{field}")?,
                Accessor::Index => write!(f, "[]")?,
            }
        }
        Ok(())
    }
}
