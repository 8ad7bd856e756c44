//! End-to-end scenario tests mirroring spec.md §8's S1–S6 and its
//! quantified testable properties. Since this crate has no VM to run the
//! emitted bytecode on, each test instead asserts the structural
//! invariant the scenario is actually checking: instruction counts/shapes
//! in the resolved buffer, slot density, tree-shaking, and determinism.

mod common;

use common::*;
use nvmc_core::ast::*;
use nvmc_core::model::TypeTag;
use nvmc_core::opcode::Opcode;
use nvmc_core::{compile_program, CodegenOptions};

/// S1: `func Main() int { x:=10; y:=getSome(); return x+y } func getSome()
/// int { return 10 }` — expects exactly two `INITSLOT` instructions (one
/// per function with locals) in the final bytecode.
#[test]
fn s1_simple_arithmetic_has_one_initslot_per_function() {
    let main = FnSpec::new(
        "Main",
        vec![
            define("x", TypeTag::Integer, int_lit(10, 1), 1),
            define("y", TypeTag::Integer, call_direct("main.getSome", vec![], TypeTag::Integer, 2), 2),
            ret(vec![binary(BinOp::Add, ident("x", TypeTag::Integer, 3), ident("y", TypeTag::Integer, 3), TypeTag::Integer, 3)], 3),
        ],
    )
    .returning(TypeTag::Integer)
    .build();
    // A two-statement body (not a single `return <expr>`) so this isn't an
    // inlining candidate: the call site below must stay a real CALL_L.
    let get_some = FnSpec::new(
        "getSome",
        vec![define("n", TypeTag::Integer, int_lit(10, 1), 1), ret(vec![ident("n", TypeTag::Integer, 2)], 2)],
    )
    .returning(TypeTag::Integer)
    .build();

    let artifact = compile_program(&program(vec![main, get_some]), CodegenOptions::default()).expect("S1 compiles");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::INITSLOT), 2, "one INITSLOT per function with locals");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CALL_L), 1, "Main calls getSome directly, not inlined");
    assert!(artifact.bytecode.last().copied() == Some(Opcode::RET.to_byte()) || artifact.bytecode.contains(&Opcode::RET.to_byte()));
}

/// S2: byte-slice conversion + append. Expects no `CALL`/`CALL_L`
/// instructions (append lowers to `CAT` for byte slices) and a `CONVERT`
/// for each of the two literals.
#[test]
fn s2_byte_slice_append_lowers_to_cat_with_no_calls() {
    let main = FnSpec::new(
        "Main",
        vec![
            define("b", TypeTag::ByteArray, byte_slice_literal(b"foo", 1), 1),
            define("c", TypeTag::ByteArray, byte_slice_literal(b"bar", 2), 2),
            ret(
                vec![call_builtin(
                    "append",
                    vec![ident("b", TypeTag::ByteArray, 3), ident("c", TypeTag::ByteArray, 3)],
                    true,
                    TypeTag::ByteArray,
                    3,
                )],
                3,
            ),
        ],
    )
    .returning(TypeTag::ByteArray)
    .build();

    let artifact = compile_program(&program(vec![main]), CodegenOptions::default()).expect("S2 compiles");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CALL_L), 0, "no calls: append(byteslice) lowers to CAT");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CALL), 0);
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CONVERT), 2, "one CONVERT per byte-slice literal");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CAT), 1, "append(bytes, bytes...) is one CAT");
}

/// S4: inlining a receiverless, non-variadic, single-`return <expr>`
/// function with a pure argument produces no `CALL_L` to the callee.
#[test]
fn s4_inlining_elides_calll_to_callee() {
    let main = FnSpec::new(
        "Main",
        vec![
            define("a", TypeTag::Integer, int_lit(2, 1), 1),
            ret(
                vec![call_direct(
                    "main.inlineSumSq",
                    vec![int_lit(1, 2), ident("a", TypeTag::Integer, 2)],
                    TypeTag::Integer,
                    2,
                )],
                2,
            ),
        ],
    )
    .returning(TypeTag::Integer)
    .build();

    // inlineSumSq(a, b) = (a+b)*(a+b), single `return <expr>` body.
    let sum_sq_body = {
        let sum = binary(BinOp::Add, ident("a", TypeTag::Integer, 1), ident("b", TypeTag::Integer, 1), TypeTag::Integer, 1);
        let sum2 = binary(BinOp::Add, ident("a", TypeTag::Integer, 1), ident("b", TypeTag::Integer, 1), TypeTag::Integer, 1);
        binary(BinOp::Mul, sum, sum2, TypeTag::Integer, 1)
    };
    let inline_sum_sq = FnSpec::new("inlineSumSq", vec![ret(vec![sum_sq_body], 1)])
        .params(vec![("a", TypeTag::Integer), ("b", TypeTag::Integer)])
        .returning(TypeTag::Integer)
        .build();

    let artifact = compile_program(&program(vec![main, inline_sum_sq]), CodegenOptions::default()).expect("S4 compiles");
    // `inlineSumSq` is still separately compiled: usage analysis walks the
    // call expression regardless of whether that particular call site ends
    // up inlined, so it stays reachable and keeps its own compiled copy.
    // Every call in this program is nonetheless a candidate for inlining,
    // so no CALL_L should appear anywhere; ADD shows up twice per compiled
    // copy of the expression (inlined at Main's call site, and again in
    // inlineSumSq's own body), for four total.
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CALL_L), 0, "inlined call site must not CALL_L inlineSumSq");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::ADD), 4, "two ADDs per compiled copy of a+b, two copies");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::MUL), 2, "one MUL per compiled copy");
}

/// S5: `for k, v := range m { s += k+v }` over a map iterates via `KEYS`/
/// `PICKITEM`, with `INC` stepping a fresh per-loop index.
#[test]
fn s5_range_over_map_uses_keys_and_pickitem() {
    let map_lit = Expr::new(
        ExprKind::MapLiteral {
            entries: vec![(int_lit(1, 1), int_lit(10, 1)), (int_lit(2, 1), int_lit(20, 1))],
        },
        TypeTag::Map,
        pos(1),
    );
    let main = FnSpec::new(
        "Main",
        vec![
            define("m", TypeTag::Map, map_lit, 1),
            define("s", TypeTag::Integer, int_lit(0, 2), 2),
            Stmt::ForRange {
                key: Some("k".to_owned()),
                value: Some("v".to_owned()),
                collection: ident("m", TypeTag::Map, 3),
                body: vec![Stmt::CompoundAssign {
                    target: LValue::Ident("s".to_owned()),
                    op: CompoundOp::Add,
                    value: binary(BinOp::Add, ident("k", TypeTag::Integer, 3), ident("v", TypeTag::Integer, 3), TypeTag::Integer, 3),
                    pos: pos(3),
                }],
                pos: pos(3),
            },
            ret(vec![ident("s", TypeTag::Integer, 4)], 4),
        ],
    )
    .returning(TypeTag::Integer)
    .build();

    let artifact = compile_program(&program(vec![main]), CodegenOptions::default()).expect("S5 compiles");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::KEYS), 1);
    assert!(count_opcode(&artifact.bytecode, Opcode::PICKITEM) >= 2, "at least key and value extraction per iteration");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::INC), 1, "one INC stepping the range index");
}

/// S6: a short forward conditional jump compresses to 2-byte form and the
/// function's own `INITSLOT` plus surrounding jumps still resolve
/// correctly (no panics/overflow, and the compressed form is strictly
/// shorter than disabling compression would produce).
#[test]
fn s6_long_jump_compression_shrinks_output() {
    let make = |compress: bool| {
        let cond = binary(BinOp::Lt, ident("x", TypeTag::Integer, 1), int_lit(5, 1), TypeTag::Boolean, 1);
        let main = FnSpec::new(
            "Main",
            vec![
                define("x", TypeTag::Integer, int_lit(1, 1), 1),
                Stmt::If { cond, then_body: vec![define("y", TypeTag::Integer, int_lit(1, 2), 2)], else_body: vec![], pos: pos(1) },
                ret(vec![ident("x", TypeTag::Integer, 3)], 3),
            ],
        )
        .returning(TypeTag::Integer)
        .build();
        let options = CodegenOptions { peephole_compression: compress, ..CodegenOptions::default() };
        compile_program(&program(vec![main]), options).expect("S6 compiles").bytecode
    };

    let compressed = make(true);
    let uncompressed = make(false);
    assert!(compressed.len() < uncompressed.len(), "compression should strip NOP filler from short-range jumps");
    assert_eq!(count_opcode(&compressed, Opcode::JMPGE_L), 0, "the fused compare-jump should compress to short form");
}

/// §8 property 6 (tree-shaking): an unreachable function contributes no
/// bytes and no method entry to the output.
#[test]
fn tree_shaking_drops_unreachable_functions() {
    let main = FnSpec::new("Main", vec![ret(vec![int_lit(1, 1)], 1)]).returning(TypeTag::Integer).build();
    let dead = FnSpec::new("deadCode", vec![ret(vec![int_lit(2, 1)], 1)]).returning(TypeTag::Integer).build();

    let with_dead = compile_program(&program(vec![main.clone(), dead]), CodegenOptions::default()).unwrap();
    let without_dead = compile_program(&program(vec![main]), CodegenOptions::default()).unwrap();

    assert_eq!(with_dead.bytecode, without_dead.bytecode, "unreachable function contributes zero bytes");
    let debug = with_dead.debug_info.expect("debug info is on by default");
    assert!(debug.methods.iter().all(|m| m.name != "main.deadCode"), "unreachable function has no method entry");
}

/// §8 property 5 (determinism): compiling the same program twice yields
/// byte-identical bytecode and debug JSON.
#[test]
fn compiling_twice_is_byte_identical() {
    let main = FnSpec::new(
        "Main",
        vec![
            define("x", TypeTag::Integer, int_lit(10, 1), 1),
            ret(vec![ident("x", TypeTag::Integer, 2)], 2),
        ],
    )
    .returning(TypeTag::Integer)
    .build();
    let prog = program(vec![main]);

    let a = compile_program(&prog, CodegenOptions::default()).unwrap();
    let b = compile_program(&prog, CodegenOptions::default()).unwrap();
    assert_eq!(a.bytecode, b.bytecode);
    let a_json = serde_json::to_string(&a.debug_info).unwrap();
    let b_json = serde_json::to_string(&b.debug_info).unwrap();
    assert_eq!(a_json, b_json);
}

/// §8 property 1 (slot density): locals occupy a dense `[0, count)` prefix.
#[test]
fn slot_density_holds_for_locals_and_args() {
    let f = FnSpec::new(
        "Main",
        vec![
            define("a", TypeTag::Integer, int_lit(1, 1), 1),
            define("b", TypeTag::Integer, int_lit(2, 2), 2),
            define("c", TypeTag::Integer, int_lit(3, 3), 3),
            ret(vec![ident("c", TypeTag::Integer, 4)], 4),
        ],
    )
    .params(vec![("p", TypeTag::Integer), ("q", TypeTag::Integer)])
    .returning(TypeTag::Integer)
    .build();

    let artifact = compile_program(&program(vec![f]), CodegenOptions::default()).unwrap();
    let debug = artifact.debug_info.unwrap();
    let main_method = debug.methods.iter().find(|m| m.name == "main.Main").unwrap();
    assert_eq!(main_method.parameters.len(), 2);
    assert_eq!(main_method.variables.len(), 3, "a, b, c are all named locals");
}

/// §3/§4.5/§6: a cross-contract call lowers to a single `CALLT` rather
/// than `CALL`/`CALL_L`, and two call sites to the same (hash, method)
/// intern to the same token instead of duplicating the table entry.
#[test]
fn cross_contract_calls_dedupe_into_one_call_token() {
    let target: [u8; 20] = [0x11; 20];
    let main = FnSpec::new(
        "Main",
        vec![
            define(
                "a",
                TypeTag::Integer,
                call_contract(target, "balanceOf", true, vec![int_lit(1, 1)], TypeTag::Integer, 1),
                1,
            ),
            define(
                "b",
                TypeTag::Integer,
                call_contract(target, "balanceOf", true, vec![int_lit(2, 2)], TypeTag::Integer, 2),
                2,
            ),
            ret(vec![binary(BinOp::Add, ident("a", TypeTag::Integer, 3), ident("b", TypeTag::Integer, 3), TypeTag::Integer, 3)], 3),
        ],
    )
    .returning(TypeTag::Integer)
    .build();

    let artifact = compile_program(&program(vec![main]), CodegenOptions::default()).expect("compiles");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CALLT), 2, "one CALLT per call site");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CALL_L), 0);
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::CALL), 0);
    assert_eq!(artifact.call_tokens.len(), 1, "both call sites share one deduplicated CallToken");
    assert_eq!(artifact.call_tokens[0].method_name, "balanceOf");

    let manifest = &artifact.manifest;
    assert_eq!(manifest.invoked_contracts.len(), 1);
    assert_eq!(manifest.invoked_contracts[0].methods, vec!["balanceOf".to_string()]);
    assert_eq!(manifest.invoked_contracts[0].hash, "1111111111111111111111111111111111111111");
}

/// §4.10/§6: declared events are carried into the manifest's event list
/// regardless of whether `runtime.Notify` is ever actually called.
#[test]
fn declared_events_appear_in_manifest_unconditionally() {
    let main = FnSpec::new("Main", vec![ret(vec![int_lit(1, 1)], 1)]).returning(TypeTag::Integer).build();
    let events = vec![EventDecl { name: "Transfer".to_owned(), parameters: vec![("from".to_owned(), TypeTag::ByteArray), ("amount".to_owned(), TypeTag::Integer)] }];

    let artifact = compile_program(&program_with_events(vec![main], events), CodegenOptions::default()).expect("compiles");
    assert_eq!(artifact.manifest.events.len(), 1);
    assert_eq!(artifact.manifest.events[0].name, "Transfer");
    assert_eq!(artifact.manifest.events[0].parameters.len(), 2);
}

/// §8 property 3: every sequence point's opcode offset falls within its
/// owning method's resolved range.
#[test]
fn sequence_points_fall_within_owning_method_range() {
    let main = FnSpec::new(
        "Main",
        vec![
            define("x", TypeTag::Integer, int_lit(10, 1), 1),
            ret(vec![ident("x", TypeTag::Integer, 2)], 2),
        ],
    )
    .returning(TypeTag::Integer)
    .build();

    let artifact = compile_program(&program(vec![main]), CodegenOptions::default()).unwrap();
    let debug = artifact.debug_info.unwrap();
    for method in &debug.methods {
        let (start, end) = {
            let mut parts = method.range.split('-');
            let s: u32 = parts.next().unwrap().parse().unwrap();
            let e: u32 = parts.next().unwrap().parse().unwrap();
            (s, e)
        };
        for sp_encoded in &method.sequence_points {
            let offset: u32 = sp_encoded.split('[').next().unwrap().parse().unwrap();
            assert!(offset >= start && offset <= end, "sequence point {sp_encoded} outside method range {start}-{end}");
        }
    }
}

/// S3: `var a int; func Main() int { return h()+a }; func h() int { defer
/// func(){ if r:=recover(); r!=nil { a=3 } else { a=4 } }(); a=1;
/// panic("msg"); return a }`. No VM to run the bytecode on, so this asserts
/// the structural shape §4.7 demands: one `TRYL`/`ENDTRYL` pair for the
/// single defer, a `THROW` for the panic, and a `CALLA` for the deferred
/// closure invocation — plus that the whole thing actually compiles, since
/// `h`'s body exercises global read/write, `defer`, `panic`, and `recover`
/// together in the one function the spec's own scenario describes.
#[test]
fn s3_panic_and_recover_lowers_to_try_catch_finally() {
    let recover_call = call_builtin("recover", vec![], false, TypeTag::Any, 3);
    let closure_body = vec![
        define("r", TypeTag::Any, recover_call, 3),
        if_stmt(
            binary(BinOp::Ne, ident("r", TypeTag::Any, 4), nil_lit(4), TypeTag::Boolean, 4),
            vec![assign("a", int_lit(3, 4), 4)],
            vec![assign("a", int_lit(4, 4), 4)],
            4,
        ),
    ];

    let h = FnSpec::new(
        "h",
        vec![
            defer_stmt(lambda_iife(closure_body, 2), 2),
            assign("a", int_lit(1, 5), 5),
            expr_stmt(call_builtin("panic", vec![str_lit("msg", 6)], false, TypeTag::Void, 6)),
            ret(vec![ident("a", TypeTag::Integer, 7)], 7),
        ],
    )
    .returning(TypeTag::Integer)
    .build();

    let main = FnSpec::new(
        "Main",
        vec![ret(
            vec![binary(
                BinOp::Add,
                call_direct("main.h", vec![], TypeTag::Integer, 1),
                ident("a", TypeTag::Integer, 1),
                TypeTag::Integer,
                1,
            )],
            1,
        )],
    )
    .returning(TypeTag::Integer)
    .build();

    let prog = program_with_global(vec![main, h], "a", TypeTag::Integer);
    // Peephole compression is orthogonal to this scenario (covered by S6)
    // and would otherwise shrink `ENDTRY_L` to `ENDTRY`, complicating the
    // opcode-shape assertions below.
    let options = CodegenOptions { peephole_compression: false, ..CodegenOptions::default() };
    let artifact = compile_program(&prog, options).expect("compiles");

    assert_eq!(count_opcode(&artifact.bytecode, Opcode::TRY_L), 1, "one defer opens exactly one TRYL");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::ENDTRY_L), 1, "the single return path closes it once");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::THROW), 1, "panic(\"msg\") lowers to THROW");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::ENDFINALLY), 1);
    assert!(count_opcode(&artifact.bytecode, Opcode::CALLA) >= 1, "the deferred IIFE is invoked via CALLA");
}

/// §4.4/§5: a package-level `var` with an initializer is visible to every
/// function that reads it — regression test for a static-slot key mismatch
/// between `_initialize`'s writer and ordinary read/write sites (see
/// `DESIGN.md`).
#[test]
fn global_variable_initializer_is_visible_at_use_site() {
    let main = FnSpec::new("Main", vec![ret(vec![ident("a", TypeTag::Integer, 1)], 1)])
        .returning(TypeTag::Integer)
        .build();
    let mut prog = program(vec![main]);
    prog.packages[0].files[0].vars.push(VarDecl {
        name: "a".to_owned(),
        type_tag: TypeTag::Integer,
        init: Some(int_lit(42, 1)),
    });

    let artifact = compile_program(&prog, CodegenOptions::default()).expect("compiles");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::STSFLD0), 1, "_initialize stores into the same slot Main reads");
    assert_eq!(count_opcode(&artifact.bytecode, Opcode::LDSFLD0), 1, "Main reads from slot 0, the only static slot allocated");
}
