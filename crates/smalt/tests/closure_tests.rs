use pretty_assertions::assert_eq;
use smalt::{FaultKind, Interp, Object};

#[test]
fn sibling_blocks_share_one_cell() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "maker := [ | x b1 b2 | x := 0. b1 := [x := x + 10]. b2 := [x]. \
             b1 value. b1 value. b2 value ]. \
             maker value",
        )
        .unwrap();
    assert_eq!(result, Object::Int(20));
}

#[test]
fn separate_invocations_do_not_share_cells() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "makeCounter := [| c | c := 0. [c := c + 1. c]]. \
             a := makeCounter value. b := makeCounter value. \
             a value. a value. {a value. b value}",
        )
        .unwrap();
    assert_eq!(result, Object::Array(vec![Object::Int(3), Object::Int(1)]));
}

#[test]
fn block_parameters_shadow_captured_names() {
    let mut interp = Interp::new();
    let result = interp
        .doit("outer := [ | x | x := 'outer'. [:x | x] value: 'param' ]. outer value")
        .unwrap();
    assert_eq!(result, Object::Str("param".to_owned()));
}

#[test]
fn non_local_return_skips_the_rest_of_the_method() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "flag := 0. \
             Probe := Object derive. \
             Probe >> hunt [ #(1 2 3) do: [:n | n = 2 ifTrue: [^ 'found']]. flag := 1. ^ 'missed' ] \
             Probe new hunt",
        )
        .unwrap();
    assert_eq!(result, Object::Str("found".to_owned()));
    assert_eq!(interp.doit("flag").unwrap(), Object::Int(0));
}

#[test]
fn return_from_an_escaped_block_is_a_dead_return_fault() {
    let mut interp = Interp::new();
    interp.doit("maker := [ [:x | ^ x] ]. esc := maker value").unwrap();
    let fault = interp.doit("esc value: 5").unwrap_err();
    assert_eq!(fault.kind, FaultKind::DeadReturn);
}

#[test]
fn blocks_capture_the_creating_receiver() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "Box := Object derive: #(v). \
             Box >> reader [ ^ [v] ] \
             b := Box new. b v: 99. r := b reader. r value",
        )
        .unwrap();
    assert_eq!(result, Object::Int(99));
}

#[test]
fn deep_recursion_runs_without_host_recursion() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "f := nil. \
             f := [:n | n = 0 ifTrue: [0] ifFalse: [(f value: n - 1) + n]]. \
             f value: 50000",
        )
        .unwrap();
    assert_eq!(result, Object::Int(1_250_025_000));
}

#[test]
fn deep_factorial_fails_with_overflow_not_stack_exhaustion() {
    let mut interp = Interp::new();
    let fault = interp
        .doit(
            "g := nil. \
             g := [:n | n = 0 ifTrue: [1] ifFalse: [(g value: n - 1) * n]]. \
             g value: 100000",
        )
        .unwrap_err();
    assert_eq!(fault.kind, FaultKind::Value);
    assert!(fault.message.contains("overflow"));
}

#[test]
fn block_arity_is_checked() {
    let mut interp = Interp::new();
    let fault = interp.doit("[:a | a] value").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Dispatch);
    let fault = interp.doit("[:a | a] value: 1 value: 2").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Dispatch);
    assert_eq!(interp.doit("[:a :b | a + b] value: 1 value: 2").unwrap(), Object::Int(3));
    assert_eq!(
        interp.doit("[:a :b :c | a + b + c] value: 1 value: 2 value: 3").unwrap(),
        Object::Int(6)
    );
}

#[test]
fn value_with_arguments_spreads_an_array() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("[:a :b | a * b] valueWithArguments: #(6 7)").unwrap(),
        Object::Int(42)
    );
    assert_eq!(interp.doit("[:a :b | a] numArgs").unwrap(), Object::Int(2));
}

#[test]
fn empty_block_answers_nil() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("[] value").unwrap(), Object::Nil);
}

#[test]
fn while_loops_are_frames_not_host_recursion() {
    let mut interp = Interp::new();
    // A long loop would overflow any host-recursive implementation of
    // whileTrue:.
    assert_eq!(
        interp
            .doit("i := 0. [i < 200000] whileTrue: [i := i + 1]. i")
            .unwrap(),
        Object::Int(200_000)
    );
}

#[test]
fn non_local_return_unwinds_nested_loops() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "firstPair := [:arr | \
               arr do: [:a | arr do: [:b | (a + b) = 7 ifTrue: [^ {a. b}]]]. \
               ^ nil]. \
             firstPair value: #(1 2 3 4 5)",
        )
        .unwrap();
    assert_eq!(result, Object::Array(vec![Object::Int(2), Object::Int(5)]));
}
