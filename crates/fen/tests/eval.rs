//! End-to-end evaluation tests: parse, compile, run, check the value.

use fen::{Interpreter, Object};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Object {
    Interpreter::new()
        .eval(source)
        .unwrap_or_else(|err| panic!("eval({source:?}) failed: {err}"))
}

#[test]
fn arithmetic() {
    assert_eq!(eval("1 + 2"), Object::Int32(3));
    assert_eq!(eval("1 + 2 * 3"), Object::Int32(7));
    assert_eq!(eval("10 - 2 - 3"), Object::Int32(5));
    assert_eq!(eval("7 / 2"), Object::Int32(3));
    assert_eq!(eval("7 % 3"), Object::Int32(1));
    assert_eq!(eval("-5 + 3"), Object::Int32(-2));
}

#[test]
fn exponentiation_is_right_associative() {
    assert_eq!(eval("2 ** 3 ** 2"), Object::Int32(512));
}

#[test]
fn comparisons_and_logical_ops() {
    assert_eq!(eval("1 == 1"), Object::Bool(true));
    assert_eq!(eval("1 != 1"), Object::Bool(false));
    assert_eq!(eval("2 < 3"), Object::Bool(true));
    assert_eq!(eval("2 >= 3"), Object::Bool(false));
    assert_eq!(eval("true && false"), Object::Bool(false));
    assert_eq!(eval("true || false"), Object::Bool(true));
    assert_eq!(eval("!true"), Object::Bool(false));
}

#[test]
fn bitwise_ops() {
    assert_eq!(eval("12 & 10"), Object::Int32(8));
    assert_eq!(eval("12 | 3"), Object::Int32(15));
    assert_eq!(eval("12 ^ 10"), Object::Int32(6));
    assert_eq!(eval("1 << 4"), Object::Int32(16));
    assert_eq!(eval("16 >> 2"), Object::Int32(4));
    assert_eq!(eval("~0"), Object::Int32(-1));
}

#[test]
fn conditionals() {
    assert_eq!(eval("if 1 == 1 then 10 else 20"), Object::Int32(10));
    assert_eq!(eval("if 1 == 2 then 10 else 20"), Object::Int32(20));
    assert_eq!(eval("if false then 1 else if true then 2 else 3"), Object::Int32(2));
}

#[test]
fn blocks_with_locals() {
    assert_eq!(eval("{ x = 5; y = 7; x * y + 1 }"), Object::Int32(36));
    assert_eq!(eval("x = 4; x * x"), Object::Int32(16));
}

#[test]
fn lambda_call() {
    assert_eq!(
        eval("(fun |x:Int32 y:Int32| -> Int32 { x * x + y }) 3 4"),
        Object::Int32(13)
    );
}

#[test]
fn named_function_call() {
    assert_eq!(
        eval("sq = fun |x:Int32| -> Int32 { x * x }; sq 7"),
        Object::Int32(49)
    );
}

#[test]
fn closure_captures_parameter() {
    assert_eq!(
        eval("make = fun |n:Int32| -> (|| -> Int32) { fun || -> Int32 { n + 1 } }; (make 41)"),
        Object::Int32(42)
    );
}

#[test]
fn closure_captures_local() {
    assert_eq!(
        eval("a = 10; g = fun || -> Int32 { a + 1 }; (g)"),
        Object::Int32(11)
    );
}

#[test]
fn nested_capture_through_two_scopes() {
    let source = "outer = fun |a:Int32| -> Int32 {\
                      mid = fun |b:Int32| -> Int32 {\
                          inner = fun || -> Int32 { a + b };\
                          (inner)\
                      };\
                      mid 2\
                  };\
                  outer 40";
    assert_eq!(eval(source), Object::Int32(42));
}

#[test]
fn recursion() {
    let source = "f = fun |n:Int32| -> Int32 { if n == 0 then 1 else n * (f (n - 1)) }; f 5";
    assert_eq!(eval(source), Object::Int32(120));
}

#[test]
fn string_equality_frees_runtime_slots() {
    let mut interp = Interpreter::new();
    assert_eq!(interp.eval("\"ab\" == \"ab\"").unwrap(), Object::Bool(true));
    assert_eq!(interp.eval("\"ab\" == \"ac\"").unwrap(), Object::Bool(false));
    assert_eq!(interp.eval("\"ab\" < \"b\"").unwrap(), Object::Bool(true));
    // the only live slots left are the interned statics, pinned at one
    let stats = interp.heap_stats();
    assert!(stats.bytes_by_slot.len() <= stats.total_slots);
    assert_eq!(stats.live_slots, 3); // "ab", "ac", "b"
}

#[test]
fn strings() {
    assert_eq!(eval("\"hello\""), Object::Str("hello".into()));
    assert_eq!(eval("s = \"hi\"; s"), Object::Str("hi".into()));
    assert_eq!(eval("$-$a \"raw\" b$-$"), Object::Str("a \"raw\" b".into()));
}

#[test]
fn tuples() {
    assert_eq!(
        eval("1, true"),
        Object::Tuple(vec![Object::Int32(1), Object::Bool(true)])
    );
}

#[test]
fn lists_and_subscript() {
    assert_eq!(
        eval("[1, 2, 3]"),
        Object::List(vec![Object::Int32(1), Object::Int32(2), Object::Int32(3)])
    );
    assert_eq!(eval("[1, 2, 3] ! 1"), Object::Int32(2));
    assert_eq!(eval("[10, 20, 30] ! 0"), Object::Int32(10));
    // negative indices wrap
    assert_eq!(eval("[10, 20, 30] ! (0 - 1)"), Object::Int32(30));
    assert_eq!(eval("[]"), Object::List(vec![]));
}

#[test]
fn void_results() {
    assert_eq!(eval("x = 1"), Object::Void);
    assert_eq!(eval(""), Object::Void);
    assert_eq!(eval("void"), Object::Void);
}

#[test]
fn floats_are_values() {
    assert_eq!(eval("1.5"), Object::Float32(1.5));
    assert_eq!(eval("x = 2.25; x"), Object::Float32(2.25));
}

#[test]
fn char_literals_have_char_type() {
    assert_eq!(eval("'a'"), Object::Char('a'));
    assert_eq!(eval("'\\n'"), Object::Char('\n'));
    assert_eq!(eval("c = 'x'; c"), Object::Char('x'));
}

#[test]
fn chars_flow_through_tuples() {
    assert_eq!(
        eval("'a', 'b'"),
        Object::Tuple(vec![Object::Char('a'), Object::Char('b')])
    );
}

#[test]
fn intrinsics_emit_opcodes_directly() {
    assert_eq!(eval("q:Int32 = __add_32 1 2; q"), Object::Int32(3));
}

#[test]
fn invocation_callback_sees_intermediate_values() {
    let mut interp = Interpreter::new();
    let mut invoked = Vec::new();
    let result = interp.eval_with("1 + 1; 2 + 2; 9", |value| invoked.push(value)).unwrap();
    assert_eq!(result, Object::Int32(9));
    assert_eq!(invoked, vec![Object::Int32(2), Object::Int32(4)]);
}

#[test]
fn generic_function_specialises_per_argument_type() {
    assert_eq!(eval("id = fun |x| { x }; id 7"), Object::Int32(7));
}

#[test]
fn repeated_evals_share_one_interpreter() {
    let mut interp = Interpreter::new();
    assert_eq!(interp.eval("1 + 1").unwrap(), Object::Int32(2));
    assert_eq!(interp.eval("2 + 2").unwrap(), Object::Int32(4));
    // definitions do not leak between evals
    assert!(interp.eval("x = 1").is_ok());
    assert!(interp.eval("x").is_err());
}

#[test]
fn const_folding_matches_interpretation() {
    for source in [
        "1 + 2 * 3",
        "2 ** 3 ** 2",
        "if 1 == 1 then 10 else 20",
        "\"ab\" == \"ab\"",
        "{ 36 }",
        "x = 4; x * x",
    ] {
        let plain = Interpreter::new().eval(source).unwrap();
        let mut folding = Interpreter::new();
        folding.set_const_folding(true);
        assert_eq!(folding.eval(source).unwrap(), plain, "fold mismatch for {source:?}");
    }
}

#[test]
fn modules_can_be_imported() {
    let mut interp = Interpreter::new();
    let module = interp
        .build_module("util", "twice = fun |x:Int32| -> Int32 { x * 2 }")
        .unwrap();
    interp.add_imported_module(module);
    assert_eq!(interp.eval("twice 21").unwrap(), Object::Int32(42));
}

#[test]
fn script_dump_load_roundtrip() {
    let script = fen::Script::parse("<cache>", "1 + 2 * 3").unwrap();
    let bytes = script.dump().unwrap();
    let restored = fen::Script::load(&bytes).unwrap();
    let mut interp = Interpreter::new();
    assert_eq!(interp.eval_script(&restored, |_| {}).unwrap(), Object::Int32(7));
}

#[test]
fn tracer_observes_execution() {
    let mut interp = Interpreter::new();
    let (result, tracer) = interp.eval_traced("1 + 2", fen::RecordingTracer::default()).unwrap();
    assert_eq!(result, Object::Int32(3));
    assert!(tracer.opcode_count() >= 3); // two loads, a call, an add
    assert!(tracer
        .events
        .iter()
        .any(|event| matches!(event, fen::TraceEvent::Opcode { opcode: fen::Opcode::Add32, .. })));
}
