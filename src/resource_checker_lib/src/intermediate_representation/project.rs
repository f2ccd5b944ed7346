use super::*;
use crate::utils::log::LogMessage;
use std::collections::HashSet;

/// The `Project` struct is the main data structure representing a parsed translation unit.
///
/// It contains the lowered program itself,
/// the type information collected while parsing
/// and the name of the analyzed source file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Project {
    /// All (lowered) executable code of the translation unit.
    pub program: Term<Program>,
    /// Typedefs and struct layouts collected from the translation unit.
    pub types: TypeRegistry,
    /// The name of the analyzed source file.
    pub file_name: String,
}

impl Project {
    /// Run IR normalization passes over the program:
    ///
    /// - Insert fallthrough returns into blocks that do not end in a jump
    ///   (this happens for void functions whose source falls off the end of the body).
    /// - Remove blocks that are unreachable from their function's entry block
    ///   and log for each removed block.
    ///
    /// Should be called directly after lowering and before any analysis is run.
    pub fn normalize(&mut self) -> Vec<LogMessage> {
        let mut logs = self.insert_fallthrough_returns();
        logs.append(&mut self.remove_unreachable_blocks());
        logs
    }

    fn insert_fallthrough_returns(&mut self) -> Vec<LogMessage> {
        let mut logs = Vec::new();
        for sub in self.program.term.subs.values_mut() {
            for block in sub.term.blocks.iter_mut() {
                if block.term.jmps.is_empty() {
                    let jmp_tid = block.tid.clone().with_id_suffix("_fallthrough_ret");
                    block.term.jmps.push(Term {
                        tid: jmp_tid,
                        term: Jmp::Return(None),
                    });
                    logs.push(
                        LogMessage::new_debug(format!(
                            "Inserted fallthrough return into block {} of {}",
                            block.tid, sub.term.name
                        ))
                        .location(block.tid.clone()),
                    );
                }
            }
        }
        logs
    }

    fn remove_unreachable_blocks(&mut self) -> Vec<LogMessage> {
        let mut logs = Vec::new();
        for sub in self.program.term.subs.values_mut() {
            let entry_tid = match sub.term.blocks.first() {
                Some(block) => block.tid.clone(),
                None => continue,
            };
            let mut reachable: HashSet<Tid> = HashSet::new();
            let mut worklist = vec![entry_tid];
            while let Some(tid) = worklist.pop() {
                if !reachable.insert(tid.clone()) {
                    continue;
                }
                if let Some(block) = sub.term.blocks.iter().find(|block| block.tid == tid) {
                    for jmp in block.term.jmps.iter() {
                        if let Some(target) = jmp.get_intraprocedural_target_or_return_block_tid() {
                            worklist.push(target);
                        }
                    }
                }
            }
            sub.term.blocks.retain(|block| {
                if reachable.contains(&block.tid) {
                    true
                } else {
                    logs.push(
                        LogMessage::new_debug(format!(
                            "Removed unreachable block {} from {}",
                            block.tid, sub.term.name
                        ))
                        .location(block.tid.clone()),
                    );
                    false
                }
            });
        }
        logs
    }
}
