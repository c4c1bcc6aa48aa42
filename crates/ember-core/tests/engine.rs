//! Build-then-call scenarios against the public engine API

#![allow(unsafe_code)]

use ember_core::{
    Argument, DataType, Engine, EngineConfig, EngineError, Operation, OperationValue, ReturnKind,
    Scalar,
};

fn engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

fn var(name: &str) -> OperationValue {
    OperationValue::variable(name)
}

fn int(value: i32) -> OperationValue {
    OperationValue::Constant(Scalar::Int32(value))
}

#[test]
fn add_two_arguments() {
    let mut engine = engine();
    engine
        .begin_function(
            "f",
            vec![
                Argument::new(DataType::Int32, "a"),
                Argument::new(DataType::Int32, "b"),
            ],
            DataType::Int32,
        )
        .unwrap();
    engine
        .assign_operation("f", "c", &var("a"), Operation::Add, &var("b"))
        .unwrap();
    engine.return_statement("f", "c").unwrap();
    engine.finish_function("f").unwrap();

    let ptr = engine.resolve_address("f").unwrap();
    let f = unsafe { std::mem::transmute::<*const u8, extern "C" fn(i32, i32) -> i32>(ptr) };
    assert_eq!(f(10, 20), 30);

    let result = engine
        .call("f", &[Scalar::Int32(10), Scalar::Int32(20)])
        .unwrap();
    assert_eq!(result, Scalar::Int32(30));
}

#[test]
fn loop_sums_its_index() {
    let mut engine = engine();
    engine.begin_function("g", vec![], DataType::Int32).unwrap();
    engine.assign_value("g", "acc", &int(0)).unwrap();
    engine.loop_begin("g", "i", 0, 5, 1).unwrap();
    engine
        .assign_operation("g", "acc", &var("acc"), Operation::Add, &var("i"))
        .unwrap();
    engine.loop_end("g").unwrap();
    engine.return_statement("g", "acc").unwrap();
    engine.finish_function("g").unwrap();

    assert_eq!(engine.call("g", &[]).unwrap(), Scalar::Int32(10));
}

#[test]
fn loop_with_step_and_empty_range() {
    let mut engine = engine();
    engine
        .begin_function("count", vec![Argument::new(DataType::Int32, "n")], DataType::Int32)
        .unwrap();
    engine.assign_value("count", "iterations", &int(0)).unwrap();
    engine.loop_begin("count", "i", 0, 10, 3).unwrap();
    engine
        .assign_operation("count", "iterations", &var("iterations"), Operation::Add, &int(1))
        .unwrap();
    engine.loop_end("count").unwrap();
    engine.return_statement("count", "iterations").unwrap();
    engine.finish_function("count").unwrap();
    // 0, 3, 6, 9
    assert_eq!(engine.call("count", &[Scalar::Int32(0)]).unwrap(), Scalar::Int32(4));

    engine.begin_function("never", vec![], DataType::Int32).unwrap();
    engine.assign_value("never", "x", &int(7)).unwrap();
    engine.loop_begin("never", "i", 5, 5, 1).unwrap();
    engine.assign_value("never", "x", &int(-1)).unwrap();
    engine.loop_end("never").unwrap();
    engine.return_statement("never", "x").unwrap();
    engine.finish_function("never").unwrap();
    assert_eq!(engine.call("never", &[]).unwrap(), Scalar::Int32(7));
}

#[test]
fn nested_loops_multiply() {
    let mut engine = engine();
    engine.begin_function("grid", vec![], DataType::Int64).unwrap();
    engine
        .assign_value("grid", "cells", &OperationValue::Constant(Scalar::Int64(0)))
        .unwrap();
    engine.loop_begin("grid", "row", 0, 3, 1).unwrap();
    engine.loop_begin("grid", "col", 0, 4, 1).unwrap();
    engine
        .assign_operation("grid", "cells", &var("cells"), Operation::Add, &int(1))
        .unwrap();
    engine.loop_end("grid").unwrap();
    engine.loop_end("grid").unwrap();
    engine.return_statement("grid", "cells").unwrap();
    engine.finish_function("grid").unwrap();

    assert_eq!(engine.call("grid", &[]).unwrap(), Scalar::Int64(12));
}

#[test]
fn loop_index_shadows_outer_variable() {
    let mut engine = engine();
    engine.begin_function("h", vec![], DataType::Int32).unwrap();
    engine.assign_value("h", "i", &int(100)).unwrap();
    engine.loop_begin("h", "i", 0, 3, 1).unwrap();
    engine.loop_end("h").unwrap();
    engine.return_statement("h", "i").unwrap();
    engine.finish_function("h").unwrap();

    assert_eq!(engine.call("h", &[]).unwrap(), Scalar::Int32(100));
}

#[test]
fn self_assignment_emits_nothing() {
    let mut engine = engine();
    engine
        .begin_function("s", vec![Argument::new(DataType::Int32, "x")], DataType::Int32)
        .unwrap();
    let before = engine.function("s").unwrap().instruction_count();
    engine.assign_value("s", "x", &var("x")).unwrap();
    assert_eq!(engine.function("s").unwrap().instruction_count(), before);
}

#[test]
fn constant_is_converted_to_target_type() {
    let mut engine = engine();
    engine.begin_function("conv", vec![], DataType::Float32).unwrap();
    engine
        .assign_value("conv", "y", &OperationValue::Constant(Scalar::Float32(0.0)))
        .unwrap();
    engine.assign_value("conv", "y", &int(7)).unwrap();
    engine.return_statement("conv", "y").unwrap();
    engine.finish_function("conv").unwrap();

    assert_eq!(engine.call("conv", &[]).unwrap(), Scalar::Float32(7.0));
}

#[test]
fn mixed_operation_promotes_to_float() {
    let mut engine = engine();
    engine
        .begin_function("mix", vec![Argument::new(DataType::Int32, "n")], DataType::Float64)
        .unwrap();
    engine
        .assign_operation(
            "mix",
            "r",
            &var("n"),
            Operation::Div,
            &OperationValue::Constant(Scalar::Float64(4.0)),
        )
        .unwrap();
    assert_eq!(engine.function("mix").unwrap().lookup("r"), Some(DataType::Float64));
    engine.return_statement("mix", "r").unwrap();
    engine.finish_function("mix").unwrap();

    assert_eq!(engine.call("mix", &[Scalar::Int32(10)]).unwrap(), Scalar::Float64(2.5));
}

#[test]
fn integer_division_truncates_toward_zero() {
    let mut engine = engine();
    engine
        .begin_function("div", vec![Argument::new(DataType::Int32, "n")], DataType::Int32)
        .unwrap();
    engine
        .assign_operation("div", "q", &var("n"), Operation::Div, &int(2))
        .unwrap();
    engine.return_statement("div", "q").unwrap();
    engine.finish_function("div").unwrap();

    assert_eq!(engine.call("div", &[Scalar::Int32(-7)]).unwrap(), Scalar::Int32(-3));
}

#[test]
fn return_casts_to_return_type() {
    let mut engine = engine();
    engine
        .begin_function("trunc", vec![Argument::new(DataType::Float64, "x")], DataType::Int32)
        .unwrap();
    engine.return_statement("trunc", "x").unwrap();
    engine.finish_function("trunc").unwrap();

    assert_eq!(engine.call("trunc", &[Scalar::Float64(-2.75)]).unwrap(), Scalar::Int32(-2));
    assert_eq!(
        engine.call("trunc", &[Scalar::Float64(1e12)]).unwrap(),
        Scalar::Int32(i32::MAX)
    );
}

#[test]
fn unbound_return_yields_zero() {
    let mut engine = engine();
    engine.begin_function("z", vec![], DataType::Float64).unwrap();
    assert_eq!(engine.return_statement("z", "missing").unwrap(), ReturnKind::Default);
    engine.finish_function("z").unwrap();

    assert_eq!(engine.call("z", &[]).unwrap(), Scalar::Float64(0.0));
}

#[test]
fn missing_return_yields_zero() {
    let mut engine = engine();
    engine.begin_function("noret", vec![], DataType::Int64).unwrap();
    engine.assign_value("noret", "x", &int(5)).unwrap();
    engine.finish_function("noret").unwrap();

    assert_eq!(engine.call("noret", &[]).unwrap(), Scalar::Int64(0));
}

#[test]
fn statements_after_return_are_unreachable() {
    let mut engine = engine();
    engine
        .begin_function("early", vec![Argument::new(DataType::Int32, "a")], DataType::Int32)
        .unwrap();
    engine.return_statement("early", "a").unwrap();
    engine.assign_value("early", "a", &int(99)).unwrap();
    engine.return_statement("early", "a").unwrap();
    engine.finish_function("early").unwrap();

    assert_eq!(engine.call("early", &[Scalar::Int32(3)]).unwrap(), Scalar::Int32(3));
}

#[test]
fn resolve_address_misses_unknown_names() {
    let engine = engine();
    assert!(engine.resolve_address("nonexistent").is_none());
}

#[test]
fn unfinished_function_has_no_address() {
    let mut engine = engine();
    engine.begin_function("open", vec![], DataType::Int32).unwrap();
    assert!(engine.resolve_address("open").is_none());
}

#[test]
fn second_finish_is_rejected() {
    let mut engine = engine();
    engine.begin_function("twice", vec![], DataType::Int32).unwrap();
    engine.return_statement("twice", "none").unwrap();
    engine.finish_function("twice").unwrap();
    let address = engine.resolve_address("twice");

    assert!(matches!(
        engine.finish_function("twice"),
        Err(EngineError::FunctionClosed(_))
    ));
    assert_eq!(engine.resolve_address("twice"), address);
}

#[test]
fn demo_symbol_resolves_through_fallback() {
    let mut engine = engine();
    assert!(engine.function("debug_add").is_none());

    let ptr = engine.resolve_address("debug_add").unwrap();
    let add = unsafe { std::mem::transmute::<*const u8, extern "C" fn(i32, i32) -> i32>(ptr) };
    assert_eq!(add(2, 3), 5);
    assert_eq!(
        engine.call("debug_add", &[Scalar::Int32(2), Scalar::Int32(3)]).unwrap(),
        Scalar::Int32(5)
    );
}

#[test]
fn functions_build_interleaved() {
    let mut engine = engine();
    engine
        .begin_function("inc", vec![Argument::new(DataType::Int32, "x")], DataType::Int32)
        .unwrap();
    engine
        .begin_function("dec", vec![Argument::new(DataType::Int32, "x")], DataType::Int32)
        .unwrap();
    engine
        .assign_operation("inc", "x", &var("x"), Operation::Add, &int(1))
        .unwrap();
    engine
        .assign_operation("dec", "x", &var("x"), Operation::Sub, &int(1))
        .unwrap();
    engine.return_statement("dec", "x").unwrap();
    engine.return_statement("inc", "x").unwrap();
    engine.finish_function("dec").unwrap();
    engine.finish_function("inc").unwrap();

    assert_eq!(engine.call("inc", &[Scalar::Int32(1)]).unwrap(), Scalar::Int32(2));
    assert_eq!(engine.call("dec", &[Scalar::Int32(1)]).unwrap(), Scalar::Int32(0));
}

#[test]
fn call_converts_arguments_and_checks_arity() {
    let mut engine = engine();
    engine
        .begin_function("wide", vec![Argument::new(DataType::Int64, "v")], DataType::Int64)
        .unwrap();
    engine
        .assign_operation("wide", "v", &var("v"), Operation::Mul, &int(2))
        .unwrap();
    engine.return_statement("wide", "v").unwrap();
    engine.finish_function("wide").unwrap();

    assert_eq!(engine.call("wide", &[Scalar::Int32(21)]).unwrap(), Scalar::Int64(42));
    assert!(matches!(
        engine.call("wide", &[]),
        Err(EngineError::ArgumentMismatch { expected: 1, got: 0 })
    ));
}

#[test]
fn packed_invoke_with_mixed_arguments() {
    let mut engine = engine();
    engine
        .begin_function(
            "blend",
            vec![
                Argument::new(DataType::Int32, "a"),
                Argument::new(DataType::Float64, "b"),
                Argument::new(DataType::Float32, "c"),
            ],
            DataType::Float64,
        )
        .unwrap();
    engine
        .assign_operation("blend", "t", &var("a"), Operation::Add, &var("b"))
        .unwrap();
    engine
        .assign_operation("blend", "t", &var("t"), Operation::Mul, &var("c"))
        .unwrap();
    engine.return_statement("blend", "t").unwrap();
    engine.finish_function("blend").unwrap();

    let args = ember_core::wire::pack_scalars(&[
        Scalar::Int32(1),
        Scalar::Float64(0.5),
        Scalar::Float32(4.0),
    ]);
    let mut result = [0u8; 8];
    engine.invoke("blend", &args, &mut result).unwrap();
    assert_eq!(f64::from_ne_bytes(result), 6.0);
}

#[test]
fn unbound_operand_is_reported() {
    let mut engine = engine();
    engine.begin_function("bad", vec![], DataType::Int32).unwrap();
    assert!(matches!(
        engine.assign_operation("bad", "x", &var("ghost"), Operation::Add, &int(1)),
        Err(EngineError::UnboundVariable { .. })
    ));
    assert!(matches!(engine.loop_end("bad"), Err(EngineError::NoOpenLoop(_))));
}

/// `narrow(v: Int64) -> Int32 { return v }`
fn build_int_narrow(engine: &mut Engine) {
    engine
        .begin_function("narrow", vec![Argument::new(DataType::Int64, "v")], DataType::Int32)
        .unwrap();
    engine.return_statement("narrow", "v").unwrap();
    engine.finish_function("narrow").unwrap();
}

/// `demote(x: Float64) -> Float64 { y: Float32 = 0; y = x; return y }`
fn build_float_demote(engine: &mut Engine) {
    engine
        .begin_function("demote", vec![Argument::new(DataType::Float64, "x")], DataType::Float64)
        .unwrap();
    engine
        .assign_value("demote", "y", &OperationValue::Constant(Scalar::Float32(0.0)))
        .unwrap();
    engine.assign_value("demote", "y", &var("x")).unwrap();
    engine.return_statement("demote", "y").unwrap();
    engine.finish_function("demote").unwrap();
}

#[test]
fn returning_wider_integer_drops_high_bits() {
    let mut engine = engine();
    build_int_narrow(&mut engine);

    assert_eq!(
        engine.call("narrow", &[Scalar::Int64(0x1_0000_0005)]).unwrap(),
        Scalar::Int32(5)
    );
    assert_eq!(
        engine.call("narrow", &[Scalar::Int64(-7)]).unwrap(),
        Scalar::Int32(-7)
    );

    let ptr = engine.resolve_address("narrow").unwrap();
    let f = unsafe { std::mem::transmute::<*const u8, extern "C" fn(i64) -> i32>(ptr) };
    assert_eq!(f(0xFFFF_FFFF), -1);
}

#[test]
fn assigning_into_float32_loses_precision() {
    let mut engine = engine();
    build_float_demote(&mut engine);

    assert_eq!(
        engine.call("demote", &[Scalar::Float64(0.1)]).unwrap(),
        Scalar::Float64(f64::from(0.1f32))
    );
    assert_eq!(
        engine.call("demote", &[Scalar::Float64(-2.5)]).unwrap(),
        Scalar::Float64(-2.5)
    );
}

mod narrowing {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn compiled_narrowing_matches_host_cast(
            v in any::<i64>(),
            x in any::<f64>().prop_filter("finite", |x| x.is_finite()),
        ) {
            let mut engine = engine();
            build_int_narrow(&mut engine);
            build_float_demote(&mut engine);

            prop_assert_eq!(
                engine.call("narrow", &[Scalar::Int64(v)]).unwrap(),
                Scalar::Int64(v).cast(DataType::Int32)
            );
            prop_assert_eq!(
                engine.call("demote", &[Scalar::Float64(x)]).unwrap(),
                Scalar::Float64(x).cast(DataType::Float32).cast(DataType::Float64)
            );
        }
    }
}
