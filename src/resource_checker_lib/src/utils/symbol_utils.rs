//! Helper functions for common tasks utilizing extern symbols,
//! e.g. resolving the symbol names of a check configuration.

use std::collections::HashMap;

use crate::intermediate_representation::*;

/// Get a map from TIDs to the corresponding extern symbol struct.
/// Only symbols with names contained in `symbols_to_find` are contained in the map.
pub fn get_symbol_map<'a>(
    project: &'a Project,
    symbols_to_find: &[String],
) -> HashMap<Tid, &'a ExternSymbol> {
    let mut tid_map = HashMap::new();
    for symbol_name in symbols_to_find {
        if let Some(symbol) = project
            .program
            .term
            .extern_symbols
            .values()
            .find(|symbol| symbol.name == *symbol_name)
        {
            tid_map.insert(symbol.tid.clone(), symbol);
        }
    }
    tid_map
}
