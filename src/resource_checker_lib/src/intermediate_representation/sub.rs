use super::{Blk, Variable};
use crate::prelude::*;

/// A `Sub` or subroutine represents a function defined in the translation unit
/// with a given name, formal parameters and a list of basic blocks belonging to it.
///
/// Subroutines are *single-entry*,
/// i.e. calling a subroutine will execute the first block in the list of basic blocks.
/// A subroutine may have multiple exits, which are identified by `Jmp::Return` instructions.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Sub {
    /// The name of the subroutine
    pub name: String,
    /// The formal parameters of the subroutine in declaration order.
    pub formal_args: Vec<Variable>,
    /// The basic blocks belonging to the subroutine.
    /// The first block is also the entry point of the subroutine.
    pub blocks: Vec<Term<Blk>>,
}

impl Term<Sub> {
    /// Returns the entry block of the subroutine, if the body is non-empty.
    pub fn entry_block(&self) -> Option<&Term<Blk>> {
        self.term.blocks.first()
    }

    /// Find a block of this subroutine by its term identifier.
    pub fn find_block(&self, tid: &Tid) -> Option<&Term<Blk>> {
        self.term.blocks.iter().find(|block| block.tid == *tid)
    }

    /// Returns the index of the given variable in the formal parameter list.
    pub fn param_index(&self, var: &Variable) -> Option<usize> {
        self.term.formal_args.iter().position(|param| param == var)
    }
}

/// An extern symbol represents a function that is not defined in the
/// analyzed translation unit, e.g. a libc function whose declaration
/// came from a skipped header.
///
/// Extern symbols are registered when a call to an undefined name is lowered.
/// Everything the analysis knows about their behavior
/// (fallibility, resource semantics) comes from configuration, never from code.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct ExternSymbol {
    /// The term ID of the extern symbol.
    pub tid: Tid,
    /// The name of the extern symbol
    pub name: String,
    /// If set to `true`, the function is assumed to never return to its caller when called.
    pub no_return: bool,
}

impl ExternSymbol {
    /// Create an extern symbol with the given name.
    /// The term ID is derived from the name, like for defined functions.
    pub fn new(name: impl ToString) -> ExternSymbol {
        let name = name.to_string();
        ExternSymbol {
            tid: Tid::new(&name),
            name,
            no_return: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intermediate_representation::ByteSize;

    impl Sub {
        /// Returns a function with the given name, no parameters and an empty body.
        pub fn mock(name: impl ToString) -> Term<Sub> {
            Term {
                tid: Tid::new(name.to_string()),
                term: Sub {
                    name: name.to_string(),
                    formal_args: Vec::new(),
                    blocks: Vec::new(),
                },
            }
        }
    }

    #[test]
    fn param_indices() {
        let mut sub = Sub::mock("target");
        sub.term.formal_args.push(Variable::new("fd", ByteSize::new(4)));
        assert_eq!(
            sub.param_index(&Variable::new("fd", ByteSize::new(4))),
            Some(0)
        );
        assert_eq!(sub.param_index(&Variable::new("x", ByteSize::new(4))), None);
    }
}
