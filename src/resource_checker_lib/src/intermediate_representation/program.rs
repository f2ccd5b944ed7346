use super::{Blk, ExternSymbol, Jmp, Sub};
use crate::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// The `Program` structure represents a parsed and lowered translation unit.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct Program {
    /// The functions defined in the translation unit.
    pub subs: BTreeMap<Tid, Term<Sub>>,
    /// Called functions that are not defined in the translation unit,
    /// i.e. functions whose declarations live in skipped headers.
    pub extern_symbols: BTreeMap<Tid, ExternSymbol>,
    /// Entry points into the translation unit,
    /// i.e. the term identifiers of functions that may be called from outside.
    ///
    /// Without linkage information every defined function is an entry point.
    pub entry_points: BTreeSet<Tid>,
}

impl Program {
    /// Find a block term by its term identifier.
    /// WARNING: The function simply iterates through all blocks,
    /// i.e. it is very inefficient for large projects!
    pub fn find_block(&self, tid: &Tid) -> Option<&Term<Blk>> {
        self.subs
            .values()
            .flat_map(|sub| sub.term.blocks.iter())
            .find(|block| block.tid == *tid)
    }

    /// Find the function containing the block with the given term identifier.
    pub fn find_sub_containing_block(&self, blk_tid: &Tid) -> Option<&Term<Sub>> {
        self.subs
            .values()
            .find(|sub| sub.term.blocks.iter().any(|block| block.tid == *blk_tid))
    }

    /// Find the function or extern symbol with the given name.
    pub fn find_callable_by_name(&self, name: &str) -> Option<Tid> {
        if let Some(sub) = self.subs.values().find(|sub| sub.term.name == name) {
            return Some(sub.tid.clone());
        }
        self.extern_symbols
            .values()
            .find(|symbol| symbol.name == name)
            .map(|symbol| symbol.tid.clone())
    }

    /// Iterate over all jump terms of the program together with the function containing them.
    pub fn jmps(&self) -> impl Iterator<Item = (&Term<Sub>, &Term<Jmp>)> {
        self.subs.values().flat_map(|sub| {
            sub.term
                .blocks
                .iter()
                .flat_map(move |block| block.term.jmps.iter().map(move |jmp| (sub, jmp)))
        })
    }
}
