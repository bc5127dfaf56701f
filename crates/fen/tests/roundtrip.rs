//! Reprint/reparse round-trips: printing a parsed AST yields source that
//! parses back to an equivalent tree.

use fen::Script;
use pretty_assertions::assert_eq;

fn roundtrip(source: &str) {
    let first = Script::parse("<test>", source).unwrap();
    let printed = first.ast().to_string();
    let second = Script::parse("<test>", &printed)
        .unwrap_or_else(|err| panic!("reprint of {source:?} does not reparse: {printed:?}: {err}"));
    assert_eq!(printed, second.ast().to_string(), "unstable reprint for {source:?}");
}

#[test]
fn expressions() {
    for source in [
        "1 + 2 * 3",
        "2 ** 3 ** 2",
        "1 == 1 && true || false",
        "1 | 2 ^ 3 & 4",
        "1 << 2 >> 3",
        "!true",
        "~5",
        "-x",
        "-5",
        "l ! 1 + 2",
        "f 1 2",
        "(make 41)",
        "1, 2, 3",
        "[1, 2, 3]",
        "[]",
        "if 1 == 1 then 10 else 20",
        "\"a\\nb\\\"c\\\"\"",
        "1.5",
        "'a'",
        "'\\n'",
    ] {
        roundtrip(source);
    }
}

#[test]
fn statements_and_functions() {
    for source in [
        "x = 5; y = 7; x * y + 1",
        "x:Int32 = 1",
        "xs:[Int32] = [1, 2]",
        "{ x = 5; x }",
        "fun |x:Int32 y:Int32| -> Int32 { x * x + y }",
        "fun || -> Int32 { 1 }",
        "fun |x| { x }",
        "make = fun |n:Int32| -> (|| -> Int32) { fun || -> Int32 { n + 1 } }; (make 41)",
        "f = fun |n:Int32| -> Int32 { if n == 0 then 1 else n * (f (n - 1)) }; f 5",
    ] {
        roundtrip(source);
    }
}
