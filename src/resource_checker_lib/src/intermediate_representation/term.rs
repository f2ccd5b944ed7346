use crate::prelude::*;

/// A term identifier consisting of an ID string (which is required to be unique)
/// and an address of the form `file.c:line` to indicate where the term
/// is located in the analyzed source file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Tid {
    /// The unique ID of the term.
    id: String,
    /// The source location of the term.
    pub address: String,
}

impl Tid {
    /// Generate a new term identifier with the given ID string
    /// and with unknown source location.
    pub fn new<T: ToString>(val: T) -> Tid {
        Tid {
            id: val.to_string(),
            address: "UNKNOWN".to_string(),
        }
    }

    /// Generate a new term identifier with the given ID string
    /// located at the given source location.
    pub fn new_at<T: ToString>(val: T, location: &str) -> Tid {
        Tid {
            id: val.to_string(),
            address: location.to_string(),
        }
    }

    /// Add a suffix to the ID string and return the new `Tid`
    pub fn with_id_suffix(self, suffix: &str) -> Self {
        Tid {
            id: self.id + suffix,
            address: self.address,
        }
    }

    /// Generate the ID of the `index`-th block of the function with the given name.
    ///
    /// Note that the block may not actually exist.
    /// Blocks have no source-line identity of their own,
    /// their location is the location of their first contained term.
    pub fn blk_id_of_sub(sub_name: &str, index: u64) -> Tid {
        Tid {
            id: format!("blk_{sub_name}_{index}"),
            address: "UNKNOWN".to_string(),
        }
    }
}

impl std::fmt::Display for Tid {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "{}", self.id)
    }
}

/// A term is an object inside the representation of the analyzed source file
/// with a source location and an unique ID (both contained in the `tid`).
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Term<T> {
    /// The term identifier, which also contains the source location of the term
    pub tid: Tid,
    /// The object
    pub term: T,
}
