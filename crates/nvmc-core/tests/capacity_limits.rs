//! Tests for slot/operand capacity limits (SPEC_FULL §4.3, §6).
//!
//! Locals and arguments each live in a single byte-wide slot operand, but
//! slot 255 is reserved unused: `VarScope` hard-caps both banks at 255
//! entries (slots `0..=254`), so the 256th declaration of either kind is a
//! `CompileError::capacity`, not a silently-widened instruction, because
//! this crate's slot instructions have no "wide" form the way locals in
//! bytecode VMs with an operand stack sometimes do.

mod common;

use common::*;
use nvmc_core::error::ErrorKind;
use nvmc_core::model::TypeTag;
use nvmc_core::{compile_program, CodegenOptions};

/// Builds `Main`'s body declaring `count` locals, `v0` through `v{count-1}`,
/// each initialized to a distinct integer constant, returning the last one.
fn generate_many_locals(count: usize) -> Vec<nvmc_core::ast::Stmt> {
    let mut body = Vec::with_capacity(count + 1);
    for i in 0..count {
        body.push(define(&format!("v{i}"), TypeTag::Integer, int_lit(i as i64, 1), 1));
    }
    body.push(ret(vec![ident(&format!("v{}", count - 1), TypeTag::Integer, 1)], 1));
    body
}

/// Builds a `Main() int { return sumAll(0, 1, ..., count-1) }` program,
/// where `sumAll` is declared variadic so the call site's argument count
/// (not `sumAll`'s own declared parameter count) is what's under test.
fn generate_many_call_args(count: usize) -> nvmc_core::ast::Program {
    let args: Vec<_> = (0..count).map(|i| int_lit(i as i64, 1)).collect();
    let mut sum_all = FnSpec::new("sumAll", vec![ret(vec![int_lit(0, 1)], 1)]).returning(TypeTag::Integer).build();
    sum_all.variadic = true;
    sum_all.params = vec![nvmc_core::ast::Param { name: "nums".to_owned(), type_tag: TypeTag::Integer }];

    let main = FnSpec::new("Main", vec![ret(vec![call_direct("main.sumAll", args, TypeTag::Integer, 1)], 1)])
        .returning(TypeTag::Integer)
        .build();
    program(vec![main, sum_all])
}

/// Builds a `Main` with `count` declared parameters, returning the last one.
fn generate_many_parameters(count: usize) -> nvmc_core::ast::Program {
    let names: Vec<String> = (0..count).map(|i| format!("p{i}")).collect();
    let params: Vec<(&str, TypeTag)> = names.iter().map(|n| (n.as_str(), TypeTag::Integer)).collect();
    let last = names.last().cloned().unwrap_or_else(|| "p0".to_owned());
    let f = FnSpec::new("Main", vec![ret(vec![ident(&last, TypeTag::Integer, 1)], 1)])
        .params(params)
        .returning(TypeTag::Integer)
        .build();
    program(vec![f])
}

fn assert_capacity_error(result: nvmc_core::CompileResult<nvmc_core::Artifact>, expected_msg: &str) {
    let err = result.expect_err("expected a capacity error");
    assert_eq!(err.kind, ErrorKind::Capacity, "expected Capacity, got {:?}: {}", err.kind, err.message);
    assert!(err.message.contains(expected_msg), "expected message containing '{expected_msg}', got: {}", err.message);
}

mod local_variable_limits {
    use super::*;

    #[test]
    fn locals_under_slot_limit_succeeds() {
        let prog = program(vec![FnSpec::new("Main", generate_many_locals(254)).returning(TypeTag::Integer).build()]);
        assert!(compile_program(&prog, CodegenOptions::default()).is_ok(), "254 locals should compile successfully");
    }

    #[test]
    fn locals_at_slot_boundary_succeeds() {
        // 255 locals occupy slots 0..=254, the full allowed range; slot 255
        // itself is never allocated.
        let prog = program(vec![FnSpec::new("Main", generate_many_locals(255)).returning(TypeTag::Integer).build()]);
        assert!(compile_program(&prog, CodegenOptions::default()).is_ok(), "255 locals should compile successfully");
    }

    #[test]
    fn locals_exceeding_slot_limit_is_capacity_error() {
        let prog = program(vec![FnSpec::new("Main", generate_many_locals(256)).returning(TypeTag::Integer).build()]);
        assert_capacity_error(compile_program(&prog, CodegenOptions::default()), "more than 255 locals");
    }

    #[test]
    fn locals_well_over_slot_limit_is_capacity_error() {
        let prog = program(vec![FnSpec::new("Main", generate_many_locals(300)).returning(TypeTag::Integer).build()]);
        assert_capacity_error(compile_program(&prog, CodegenOptions::default()), "more than 255 locals");
    }
}

mod function_parameter_limits {
    use super::*;

    #[test]
    fn parameters_under_slot_limit_succeeds() {
        let prog = generate_many_parameters(254);
        assert!(compile_program(&prog, CodegenOptions::default()).is_ok(), "254 parameters should compile successfully");
    }

    #[test]
    fn parameters_at_slot_boundary_succeeds() {
        // 255 parameters occupy slots 0..=254, the full allowed range.
        let prog = generate_many_parameters(255);
        assert!(compile_program(&prog, CodegenOptions::default()).is_ok(), "255 parameters should compile successfully");
    }

    #[test]
    fn parameters_exceeding_slot_limit_is_capacity_error() {
        let prog = generate_many_parameters(256);
        assert_capacity_error(compile_program(&prog, CodegenOptions::default()), "more than 255 arguments");
    }
}

mod call_argument_limits {
    use super::*;

    #[test]
    fn call_args_under_token_limit_compiles() {
        let prog = generate_many_call_args(50);
        assert!(compile_program(&prog, CodegenOptions::default()).is_ok(), "50 call-site arguments should compile successfully");
    }

    #[test]
    fn call_args_pack_into_a_single_variadic_tail() {
        // Packing a variadic tail doesn't itself run into the 255-argument
        // stack-reversal limit the way a fixed-arity call would, since the
        // whole tail collapses to one PACK'd array before REVERSEN runs on
        // the (small) fixed+packed operand count. 300 exceeds what a
        // fixed-arity call could ever accept, confirming packing, not
        // fixed-arity evaluation, is what's under test here.
        let prog = generate_many_call_args(300);
        assert!(compile_program(&prog, CodegenOptions::default()).is_ok(), "variadic packing accepts more than 255 call-site arguments");
    }

    #[test]
    fn call_with_no_variadic_args_still_packs_an_empty_tail() {
        // `sumAll()` supplies none of the variadic tail, but the callee
        // still expects a packed array on the stack (it reads it via
        // LDARG0), not zero pushed values.
        let prog = generate_many_call_args(0);
        let artifact = compile_program(&prog, CodegenOptions::default()).expect("zero variadic args should still compile");
        assert_eq!(
            common::count_opcode(&artifact.bytecode, nvmc_core::opcode::Opcode::PACK),
            1,
            "an empty variadic tail must still be packed into an array"
        );
    }
}
