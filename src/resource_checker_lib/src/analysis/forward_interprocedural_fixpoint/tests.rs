use super::{create_computation, mock_context, NodeValue};
use crate::intermediate_representation::*;
use mock_context::Context;
use mock_context::StartEnd;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::FromIterator;

fn mock_def(name: &str) -> Term<Def> {
    Term {
        tid: Tid::new(name),
        term: Def::Assign {
            var: Variable::new("x", INT_SIZE),
            value: Expression::Const(Constant::int(0)),
        },
    }
}

fn mock_program() -> Term<Program> {
    let call_term = Term {
        tid: Tid::new("call_callee"),
        term: Jmp::Call {
            target: Tid::new("callee"),
            args: Vec::new(),
            result: None,
            return_: Some(Tid::new("caller_blk2")),
        },
    };
    let extern_call_term = Term {
        tid: Tid::new("call_malloc"),
        term: Jmp::Call {
            target: Tid::new("malloc"),
            args: Vec::new(),
            result: None,
            return_: Some(Tid::new("caller_blk3")),
        },
    };
    let caller_blk1 = Term {
        tid: Tid::new("caller_blk1"),
        term: Blk {
            defs: vec![mock_def("def1")],
            jmps: vec![call_term],
        },
    };
    let caller_blk2 = Term {
        tid: Tid::new("caller_blk2"),
        term: Blk {
            defs: vec![mock_def("def4")],
            jmps: vec![extern_call_term],
        },
    };
    let caller_blk3 = Term {
        tid: Tid::new("caller_blk3"),
        term: Blk {
            defs: Vec::new(),
            jmps: vec![Term {
                tid: Tid::new("caller_return"),
                term: Jmp::Return(None),
            }],
        },
    };
    let caller = Term {
        tid: Tid::new("caller"),
        term: Sub {
            name: "caller".to_string(),
            formal_args: Vec::new(),
            blocks: vec![caller_blk1, caller_blk2, caller_blk3],
        },
    };

    let cond_jump_term = Term {
        tid: Tid::new("cond_jump"),
        term: Jmp::CBranch {
            target: Tid::new("callee_blk2"),
            condition: Expression::Const(Constant::int(0)),
        },
    };
    let jump_term = Term {
        tid: Tid::new("jump"),
        term: Jmp::Branch(Tid::new("callee_blk2")),
    };
    let callee_blk1 = Term {
        tid: Tid::new("callee_blk1"),
        term: Blk {
            defs: vec![mock_def("def2"), mock_def("def3")],
            jmps: vec![cond_jump_term, jump_term],
        },
    };
    let callee_blk2 = Term {
        tid: Tid::new("callee_blk2"),
        term: Blk {
            defs: Vec::new(),
            jmps: vec![Term {
                tid: Tid::new("callee_return"),
                term: Jmp::Return(None),
            }],
        },
    };
    let callee = Term {
        tid: Tid::new("callee"),
        term: Sub {
            name: "callee".to_string(),
            formal_args: Vec::new(),
            blocks: vec![callee_blk1, callee_blk2],
        },
    };
    let malloc = ExternSymbol::new("malloc");

    Term {
        tid: Tid::new("program"),
        term: Program {
            subs: BTreeMap::from_iter([(caller.tid.clone(), caller), (callee.tid.clone(), callee)]),
            extern_symbols: BTreeMap::from_iter([(malloc.tid.clone(), malloc)]),
            entry_points: BTreeSet::new(),
        },
    }
}

#[test]
fn forward_fixpoint() {
    let project = Project::mock(mock_program().term);

    let mock_con = Context::new(&project);
    let mut computation = create_computation(mock_con.clone(), None);
    computation.set_node_value(
        *mock_con
            .tid_to_node_index
            .get(&(Tid::new("caller"), Tid::new("caller_blk1"), StartEnd::Start))
            .unwrap(),
        NodeValue::Value(0),
    );
    computation.compute_with_max_steps(100);

    let value_at = |sub: &str, blk: &str, start_end: StartEnd| -> u64 {
        *computation
            .get_node_value(
                *mock_con
                    .tid_to_node_index
                    .get(&(Tid::new(sub), Tid::new(blk), start_end))
                    .unwrap(),
            )
            .unwrap()
            .unwrap_value()
    };

    // One def before the internal call.
    assert_eq!(value_at("caller", "caller_blk1", StartEnd::Start), 0);
    assert_eq!(value_at("caller", "caller_blk1", StartEnd::End), 1);
    // The callee sees the value of the callsite and counts two more defs.
    assert_eq!(value_at("callee", "callee_blk1", StartEnd::Start), 1);
    assert_eq!(value_at("callee", "callee_blk1", StartEnd::End), 3);
    assert_eq!(value_at("callee", "callee_blk2", StartEnd::Start), 3);
    assert_eq!(value_at("callee", "callee_blk2", StartEnd::End), 3);
    // On return the callee value and the callsite value are summed up by the mock context.
    assert_eq!(value_at("caller", "caller_blk2", StartEnd::Start), 4);
    assert_eq!(value_at("caller", "caller_blk2", StartEnd::End), 5);
    // The extern call stub adds 100.
    assert_eq!(value_at("caller", "caller_blk3", StartEnd::Start), 105);
    assert_eq!(value_at("caller", "caller_blk3", StartEnd::End), 105);
    assert!(computation.has_stabilized());
}
