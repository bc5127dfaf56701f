//! The error taxonomy, end to end.

use fen::{ErrorKind, Interpreter};

fn eval_err(source: &str) -> fen::ScriptError {
    Interpreter::new()
        .eval(source)
        .expect_err("expected an error")
}

#[test]
fn parse_error_for_dangling_operator() {
    let err = eval_err("1 +");
    assert!(matches!(err.kind(), ErrorKind::Parse { .. }), "{err}");
}

#[test]
fn parse_error_has_location_and_caret() {
    let err = eval_err("1 +");
    let rendered = err.to_string();
    assert!(rendered.starts_with("<input>:1:"), "{rendered}");
    assert!(rendered.contains("error: parse error"), "{rendered}");
}

#[test]
fn undefined_name() {
    let err = eval_err("foo 1");
    assert!(
        matches!(err.kind(), ErrorKind::UndefinedName { name } if name == "foo"),
        "{err}"
    );
}

#[test]
fn condition_not_bool() {
    let err = eval_err("if 1 then 2 else 3");
    assert!(matches!(err.kind(), ErrorKind::ConditionNotBool), "{err}");
}

#[test]
fn branch_type_mismatch() {
    let err = eval_err("if true then 1 else \"x\"");
    assert!(matches!(err.kind(), ErrorKind::BranchTypeMismatch { .. }), "{err}");
}

#[test]
fn multiple_declaration() {
    let err = eval_err("x = 1; x = 2");
    assert!(
        matches!(err.kind(), ErrorKind::MultipleDeclaration { name } if name == "x"),
        "{err}"
    );
}

#[test]
fn function_not_found_lists_candidates() {
    let err = eval_err("1 + true");
    let ErrorKind::FunctionNotFound { name, args, candidates } = err.kind() else {
        panic!("expected FunctionNotFound, got {err}");
    };
    assert_eq!(name, "add");
    assert_eq!(args, "| Int32 Bool |");
    assert!(candidates.contains("| Byte Byte | -> Byte"), "{candidates}");
    assert!(candidates.contains("| Int32 Int32 | -> Int32"), "{candidates}");
    assert!(candidates.contains("| Int64 Int64 | -> Int64"), "{candidates}");
}

#[test]
fn unexpected_argument_on_non_callable() {
    let err = eval_err("x = 5; x 1");
    assert!(matches!(err.kind(), ErrorKind::UnexpectedArgument { index: 1 }), "{err}");
}

#[test]
fn unexpected_argument_type_on_closure_call() {
    let err = eval_err("a = 1; g = fun |x:Int32| -> Int32 { x + a }; g true");
    assert!(
        matches!(err.kind(), ErrorKind::UnexpectedArgumentType { index: 1, .. }),
        "{err}"
    );
}

#[test]
fn definition_type_mismatch() {
    let err = eval_err("x:Int32 = \"s\"");
    assert!(matches!(err.kind(), ErrorKind::DefinitionTypeMismatch { .. }), "{err}");
}

#[test]
fn unexpected_return_type() {
    let err = eval_err("f = fun |x:Int32| -> Int32 { \"s\" }; f 1");
    assert!(matches!(err.kind(), ErrorKind::UnexpectedReturnType { .. }), "{err}");
}

#[test]
fn list_elem_type_mismatch() {
    let err = eval_err("[1, true]");
    assert!(matches!(err.kind(), ErrorKind::ListElemTypeMismatch { .. }), "{err}");
}

#[test]
fn unknown_type_name() {
    let err = eval_err("x:Foo = 1");
    assert!(
        matches!(err.kind(), ErrorKind::UnknownTypeName { name } if name == "Foo"),
        "{err}"
    );
}

#[test]
fn index_out_of_bounds() {
    let err = eval_err("[1, 2] ! 5");
    assert!(
        matches!(err.kind(), ErrorKind::IndexOutOfBounds { index: 5, len: 2 }),
        "{err}"
    );
}

#[test]
fn class_declarations_are_parse_errors() {
    let err = eval_err("class Eq T { }");
    assert!(matches!(err.kind(), ErrorKind::Parse { .. }), "{err}");
    let err = eval_err("instance Eq Int32 { }");
    assert!(matches!(err.kind(), ErrorKind::Parse { .. }), "{err}");
}

#[test]
fn char_arithmetic_has_no_overload() {
    // the arithmetic chains cover Byte/Int32/Int64; Char is not among them
    let err = eval_err("'a' + 1");
    assert!(matches!(err.kind(), ErrorKind::FunctionNotFound { .. }), "{err}");
}

#[test]
fn intrinsic_outside_call() {
    let err = eval_err("x = __noop; 1");
    assert!(matches!(err.kind(), ErrorKind::IntrinsicsFunction { .. }), "{err}");
}

#[test]
fn errors_are_fatal_but_interpreter_survives() {
    let mut interp = Interpreter::new();
    assert!(interp.eval("foo").is_err());
    assert_eq!(interp.eval("1 + 1").unwrap(), fen::Object::Int32(2));
}
