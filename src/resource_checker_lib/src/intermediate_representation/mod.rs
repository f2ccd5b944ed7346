//! This module defines the intermediate representation used to represent
//! a parsed C translation unit and all its contained functions.
//!
//! The main data structure is the `Project` struct,
//! which contains all information recovered about a translation unit during parsing and lowering.
//! To learn how individual statements are encoded,
//! you should first take a look at the `Expression` and `Place` types
//! and then at the `Def` and `Jmp` data types,
//! which form the basis of the basic block `Blk` struct.

use crate::prelude::*;
use derive_more::*;

mod term;
pub use term::*;
mod variable;
pub use variable::*;
mod types;
pub use types::*;
mod expression;
pub use expression::*;
mod place;
pub use place::*;
mod def;
pub use def::*;
mod jmp;
pub use jmp::*;
mod blk;
pub use blk::*;
mod sub;
pub use sub::*;
mod program;
pub use program::*;
mod project;
pub use project::*;

/// An unsigned number of bytes.
///
/// Used to represent sizes of values in variables or of types in memory.
/// Can also be used for other byte-valued numbers, like offsets,
/// as long as the number is guaranteed to be non-negative.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Display,
    From,
    Into,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    AddAssign,
    SubAssign,
    MulAssign,
    Sum,
)]
#[mul(forward)]
#[serde(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Create a new `ByteSize` object
    pub const fn new(value: u64) -> ByteSize {
        ByteSize(value)
    }

    /// Convert to the equivalent size in bits (by multiplying with 8).
    pub fn as_bit_length(self) -> usize {
        (u64::from(self) * 8) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_arithmetics() {
        assert_eq!(ByteSize::new(2).as_bit_length(), 16);
        assert_eq!(ByteSize::new(4) + ByteSize::new(4), ByteSize::new(8));
        assert_eq!(u64::from(ByteSize::new(9) * ByteSize::new(2)), 18);
    }
}
