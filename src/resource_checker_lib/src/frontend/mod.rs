//! The frontend parses a single C source file into the
//! [intermediate representation](crate::intermediate_representation).
//!
//! Only a subset of C is accepted, chosen to cover the resource handling
//! and dispatch idioms the checkers reason about:
//! scalar and pointer locals, struct definitions with function pointer
//! fields, typedefs, fixed arrays, `if`/`else`, `while` and `for` loops,
//! calls (direct and through function pointers), casts and `sizeof`.
//! Preprocessor directives are skipped,
//! so functions declared in skipped headers surface as extern symbols
//! when they are first called.
//!
//! The pipeline has three stages:
//! [`lexer::lex`] splits the text into tokens,
//! [`parser::parse`] builds the abstract syntax tree
//! and [`lowering::lower`] flattens it into [`Project`] terms.

pub mod ast;
pub mod lexer;
pub mod lowering;
pub mod parser;

use crate::intermediate_representation::Project;
use crate::prelude::*;

/// Parse the given source text into a [`Project`].
///
/// `file_name` is recorded in the project and used as the file part
/// of all term addresses (`file.c:line`).
/// The returned project still needs [`Project::normalize`]
/// before analyses can run on it.
pub fn parse_project(source: &str, file_name: &str) -> Result<Project, Error> {
    let tokens = lexer::lex(source)?;
    let unit = parser::parse(tokens)?;
    lowering::lower(&unit, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::graph::get_program_cfg;

    #[test]
    fn a_complete_translation_unit_parses_end_to_end() {
        let source = r#"
            #include <stdlib.h>

            struct archive {
                int hdr;
            };

            struct reader;

            struct format_descriptor {
                void *data;
                const char *name;
                int (*bid)(struct reader *);
                int (*read_data)(struct reader *, const void **, int *);
            };

            struct reader {
                struct archive archive;
                struct format_descriptor formats[4];
                struct format_descriptor *format;
            };

            int register_format(struct reader *a,
                                int (*read_data)(struct reader *, const void **, int *)) {
                int number_slots = sizeof(a->formats) / sizeof(a->formats[0]);
                for (int i = 0; i < number_slots; ++i) {
                    a->formats[i].read_data = read_data;
                }
                return number_slots;
            }

            int read_data_block(void *_a, const void **buff, int *size) {
                struct reader *a = (struct reader *)_a;
                if (a->format->read_data == NULL) return -1;
                return (a->format->read_data)(a, buff, size);
            }
            "#;
        let mut project = parse_project(source, "archive.c").unwrap();
        let logs = project.normalize();
        assert!(logs.is_empty());
        assert_eq!(project.program.term.subs.len(), 2);

        // The guarded dispatch lowers to an indirect call through
        // the collapsed field place.
        let reader = project
            .program
            .term
            .find_callable_by_name("read_data_block")
            .unwrap();
        let sub = &project.program.term.subs[&reader];
        let dispatch = sub
            .term
            .blocks
            .iter()
            .flat_map(|block| block.term.jmps.iter())
            .find_map(|jmp| match &jmp.term {
                crate::intermediate_representation::Jmp::CallInd { target, .. } => {
                    Some(target.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(
            dispatch.last_field(),
            Some(("format_descriptor", "read_data"))
        );

        // The normalized program yields a control flow graph without panics.
        let graph = get_program_cfg(&project.program);
        assert!(graph.node_count() > 0);
    }

    #[test]
    fn calls_to_skipped_header_functions_become_extern_symbols() {
        let source = r#"
            int use_and_release(int fd) {
                char buffer[16];
                int bs = read(fd, buffer, 16);
                if (bs < 0) {
                    close(fd);
                    return -1;
                }
                close(fd);
                return bs;
            }
            "#;
        let project = parse_project(source, "fixture.c").unwrap();
        for name in ["read", "close"] {
            let tid = project.program.term.find_callable_by_name(name).unwrap();
            assert!(project.program.term.extern_symbols.contains_key(&tid));
        }
        // Extern symbols are registered once, not per call site.
        assert_eq!(project.program.term.extern_symbols.len(), 2);
    }

    #[test]
    fn syntax_errors_name_the_offending_line() {
        let source = "int f(int x) {\n    return x +;\n}\n";
        let error = parse_project(source, "fixture.c").unwrap_err();
        assert!(error.to_string().contains("line 2"));
    }
}
