//! Modules necessary for graph-based analyses.

pub mod callgraph;
pub mod error_contracts;
pub mod fixpoint;
pub mod forward_interprocedural_fixpoint;
pub mod function_pointers;
pub mod graph;
pub mod interprocedural_fixpoint_generic;
