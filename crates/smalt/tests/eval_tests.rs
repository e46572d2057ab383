use pretty_assertions::assert_eq;
use smalt::{CollectStringPrint, FaultKind, Interp, Object};

#[test]
fn integer_arithmetic() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("3 + 4").unwrap(), Object::Int(7));
    assert_eq!(interp.doit("10 - 3 * 2").unwrap(), Object::Int(14)); // left-to-right binary
    assert_eq!(interp.doit("7 // 2").unwrap(), Object::Int(3));
    assert_eq!(interp.doit("-7 // 2").unwrap(), Object::Int(-4));
    assert_eq!(interp.doit("7 \\ 2").unwrap(), Object::Int(1));
    assert_eq!(interp.doit("-7 \\ 2").unwrap(), Object::Int(1));
}

#[test]
fn numeric_widening_and_division() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("1 + 2.5").unwrap(), Object::Float(3.5));
    assert_eq!(interp.doit("3 / 2").unwrap(), Object::Float(1.5));
    assert_eq!(interp.doit("4 / 2").unwrap(), Object::Int(2));
    assert_eq!(interp.doit("2 asFloat").unwrap(), Object::Float(2.0));
    assert_eq!(interp.doit("2.9 truncated").unwrap(), Object::Int(2));
}

#[test]
fn division_by_zero_is_a_value_fault() {
    let mut interp = Interp::new();
    let fault = interp.doit("1 / 0").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Value);
    assert!(fault.message.contains("division by zero"));

    let fault = interp.doit("1.5 // 2").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Value);
    assert!(fault.message.contains("integer operands"));
}

#[test]
fn one_value_per_statement() {
    let mut interp = Interp::new();
    let values = interp.eval_statements("1. 'two'. 3 + 0").unwrap();
    assert_eq!(
        values,
        vec![Object::Int(1), Object::Str("two".to_owned()), Object::Int(3)]
    );
}

#[test]
fn point_class_with_slots_and_method() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "Point := Object derive: #(x y). \
             Point >> moveBy: dx and: dy [ x := x + dx. y := y + dy. ^ self ]. \
             p := Point new. p x: 100. p y: 200. \
             p moveBy: 10 and: 20. p x",
        )
        .unwrap();
    assert_eq!(result, Object::Int(110));
    assert_eq!(interp.doit("p y").unwrap(), Object::Int(220));
}

#[test]
fn non_local_return_finds_first_even() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "findFirstEven := [:arr | arr do: [:n | (n \\ 2) == 0 ifTrue: [^ n]]. ^ nil]. \
             findFirstEven value: #(1 3 5 2 4)",
        )
        .unwrap();
    assert_eq!(result, Object::Int(2));
    let result = interp.doit("findFirstEven value: #(1 3 5)").unwrap();
    assert_eq!(result, Object::Nil);
}

#[test]
fn counter_closure_keeps_state() {
    let mut interp = Interp::new();
    let result = interp
        .doit("makeCounter := [| c | c := 0. [c := c + 1. c]]. k := makeCounter value. k value. k value. k value")
        .unwrap();
    assert_eq!(result, Object::Int(3));
}

#[test]
fn monitor_counter_across_two_forked_processes() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "m := Monitor new. n := 0. \
             p1 := Processor fork: [10 timesRepeat: [m critical: [n := n + 1]. Processor yield]]. \
             p2 := Processor fork: [10 timesRepeat: [m critical: [n := n + 1]. Processor yield]]. \
             [p1 state = \"terminated\" and: [p2 state = \"terminated\"]] whileFalse: [Scheduler step]. \
             n",
        )
        .unwrap();
    assert_eq!(result, Object::Int(20));
}

#[test]
fn super_chain_concatenates() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "A := Object derive. A >> foo [ ^ \"A\" ] \
             B := A derive. B >> foo [ ^ super foo , \"B\" ] \
             C := B derive. C >> foo [ ^ super foo , \"C\" ] \
             C new foo",
        )
        .unwrap();
    assert_eq!(result, Object::Str("ABC".to_owned()));
}

#[test]
fn string_behavior() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("'hello' size").unwrap(), Object::Int(5));
    assert_eq!(interp.doit("'hello' at: 1").unwrap(), Object::Str("h".to_owned()));
    assert_eq!(
        interp.doit("'hello' copyFrom: 2 to: 4").unwrap(),
        Object::Str("ell".to_owned())
    );
    assert_eq!(interp.doit("'ab' , 'cd'").unwrap(), Object::Str("abcd".to_owned()));
    assert_eq!(interp.doit("'hi' asSymbol").unwrap(), Object::Symbol("hi".to_owned()));
    assert_eq!(interp.doit("'abc' < 'abd'").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("'' isEmpty").unwrap(), Object::Bool(true));
}

#[test]
fn literal_and_dynamic_arrays() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("#(1 two 3.5)").unwrap(),
        Object::Array(vec![
            Object::Int(1),
            Object::Symbol("two".to_owned()),
            Object::Float(3.5)
        ])
    );
    assert_eq!(
        interp.doit("{1 + 1. 2 * 2}").unwrap(),
        Object::Array(vec![Object::Int(2), Object::Int(4)])
    );
    assert_eq!(interp.doit("#(9 8 7) at: 2").unwrap(), Object::Int(8));
    assert_eq!(interp.doit("a := Array new. a add: 5. a size").unwrap(), Object::Int(1));
    // Each evaluation of an array literal is a fresh object.
    assert_eq!(
        interp.doit("f := [#(1 2)]. (f value) at: 1 put: 9. (f value) at: 1").unwrap(),
        Object::Int(1)
    );
}

#[test]
fn tables_and_cascades() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("t := #{'a' -> 1. 2 -> 'b'}. t at: 'a'").unwrap(),
        Object::Int(1)
    );
    assert_eq!(interp.doit("t at: 2").unwrap(), Object::Str("b".to_owned()));
    assert_eq!(interp.doit("t includesKey: 'a'").unwrap(), Object::Bool(true));
    assert_eq!(
        interp.doit("t at: 9 ifAbsent: ['missing']").unwrap(),
        Object::Str("missing".to_owned())
    );
    assert_eq!(
        interp
            .doit("u := Table new. u at: 1 put: 'x'; at: 2 put: 'y'; size")
            .unwrap(),
        Object::Int(2)
    );
}

#[test]
fn collection_protocol_from_the_prelude() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("#(1 2 3) collect: [:x | x * 2]").unwrap(),
        Object::Array(vec![Object::Int(2), Object::Int(4), Object::Int(6)])
    );
    assert_eq!(
        interp.doit("#(1 2 3 4) select: [:x | x even]").unwrap(),
        Object::Array(vec![Object::Int(2), Object::Int(4)])
    );
    assert_eq!(
        interp.doit("#(1 2 3 4) inject: 0 into: [:a :b | a + b]").unwrap(),
        Object::Int(10)
    );
    assert_eq!(
        interp.doit("#(1 3 4) detect: [:x | x even] ifNone: [0]").unwrap(),
        Object::Int(4)
    );
    assert_eq!(
        interp.doit("#(1 3 5) detect: [:x | x even] ifNone: [0]").unwrap(),
        Object::Int(0)
    );
    assert_eq!(interp.doit("#(1 2) includes: 2").unwrap(), Object::Bool(true));
}

#[test]
fn booleans_and_conditionals() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("true and: [false]").unwrap(), Object::Bool(false));
    assert_eq!(interp.doit("false or: [true]").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("(3 < 4) not").unwrap(), Object::Bool(false));
    assert_eq!(
        interp.doit("3 < 4 ifTrue: ['yes'] ifFalse: ['no']").unwrap(),
        Object::Str("yes".to_owned())
    );
    assert_eq!(interp.doit("false ifTrue: ['yes']").unwrap(), Object::Nil);
    assert_eq!(interp.doit("3 between: 1 and: 5").unwrap(), Object::Bool(true));
}

#[test]
fn loops_from_the_prelude() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("n := 0. 5 timesRepeat: [n := n + 1]. n").unwrap(),
        Object::Int(5)
    );
    assert_eq!(
        interp.doit("sum := 0. 1 to: 4 do: [:i | sum := sum + i]. sum").unwrap(),
        Object::Int(10)
    );
}

#[test]
fn print_nl_goes_through_the_writer() {
    let mut interp = Interp::with_print(Box::new(CollectStringPrint::default()));
    assert_eq!(interp.doit("7 printNl").unwrap(), Object::Int(7));
    interp.doit("'hi' printNl. #sym printNl. Object new printNl").unwrap();
    assert_eq!(
        interp.take_print_output().unwrap(),
        "7\n'hi'\n#sym\nan Object\n"
    );
}

#[test]
fn print_string_rendering() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("#(1 'a' sym) printString").unwrap(),
        Object::Str("#(1 'a' #sym)".to_owned())
    );
    assert_eq!(interp.doit("nil printString").unwrap(), Object::Str("nil".to_owned()));
    assert_eq!(interp.doit("1.5 printString").unwrap(), Object::Str("1.5".to_owned()));
}

#[test]
fn on_do_catches_runtime_faults() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("[1 / 0] on: Exception do: [:e | e messageText]").unwrap(),
        Object::Str("division by zero".to_owned())
    );
    assert_eq!(interp.doit("[42] on: Exception do: [:e | 0]").unwrap(), Object::Int(42));
    assert_eq!(
        interp.doit("[self error: 'boom'] on: Exception do: [:e | e messageText]").unwrap(),
        Object::Str("boom".to_owned())
    );
}

#[test]
fn signal_matches_by_exception_class() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("MyError := Exception derive. [MyError signal: 'x'] on: MyError do: [:e | e class name]")
            .unwrap(),
        Object::Str("MyError".to_owned())
    );
    // A plain Exception does not match the narrower handler class.
    let fault = interp.doit("[Exception signal: 'y'] on: MyError do: [:e | 0]").unwrap_err();
    assert_eq!(fault.kind, FaultKind::User);
    assert!(fault.message.contains('y'));
}

#[test]
fn uncaught_faults_carry_kind_and_trace() {
    let mut interp = Interp::new();
    let fault = interp.doit("3 frobnicate").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Dispatch);
    assert!(fault.message.contains("Integer does not understand #frobnicate"));

    let fault = interp
        .doit("A := Object derive. A >> go [ ^ 1 / 0 ] A new go")
        .unwrap_err();
    assert_eq!(fault.kind, FaultKind::Value);
    assert_eq!(fault.trace, vec!["#go".to_owned()]);
}

#[test]
fn does_not_understand_hook_reifies_the_message() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("A := Object derive. A >> doesNotUnderstand: aMessage [ ^ aMessage selector ] A new frob")
            .unwrap(),
        Object::Symbol("frob".to_owned())
    );
    assert_eq!(
        interp.doit("A new frob: 10 with: 20").unwrap(),
        Object::Symbol("frob:with:".to_owned())
    );
    assert_eq!(
        interp
            .doit("A >> doesNotUnderstand: aMessage [ ^ aMessage arguments ] A new frob: 10 with: 20")
            .unwrap(),
        Object::Array(vec![Object::Int(10), Object::Int(20)])
    );
}

#[test]
fn reflection_selectors() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("3 respondsTo: #+").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("3 respondsTo: #frob").unwrap(), Object::Bool(false));
    assert_eq!(interp.doit("3 isKindOf: Number").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("3 isKindOf: String").unwrap(), Object::Bool(false));
    assert_eq!(interp.doit("3 class name").unwrap(), Object::Str("Integer".to_owned()));
    assert_eq!(interp.doit("nil isNil").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("3 isNil").unwrap(), Object::Bool(false));
}

#[test]
fn equality_follows_the_value_rules() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("3 = 3.0").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("'a' = 'a'").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("'a' == 'a'").unwrap(), Object::Bool(false)); // distinct heap objects
    assert_eq!(interp.doit("#a = #a").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("#a = 'a'").unwrap(), Object::Bool(false)); // symbol vs string
    assert_eq!(interp.doit("true = 1").unwrap(), Object::Bool(false));
    assert_eq!(interp.doit("#(1 2) = #(1 2)").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("b := [1]. b = b").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("[1] = [1]").unwrap(), Object::Bool(false)); // blocks compare by identity
    assert_eq!(interp.doit("3 ~= 4").unwrap(), Object::Bool(true));
}

#[test]
fn user_defined_equality_overrides_dispatch() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit(
                "Pt := Object derive: #(x). \
                 Pt >> = other [ ^ x = other x ] \
                 a := Pt new. a x: 1. b := Pt new. b x: 1. a = b"
            )
            .unwrap(),
        Object::Bool(true)
    );
}

#[test]
fn run_script_applies_a_whole_file_block() {
    let mut interp = Interp::new();
    let result = interp
        .run_script("#!/usr/bin/env smalt\n[ | total | total := 0. #(1 2 3) do: [:n | total := total + n]. ^ total ]")
        .unwrap();
    assert_eq!(result, Object::Int(6));
    // A `^` in the script block terminates the script with that value.
    assert_eq!(
        interp.run_script("[ #(5 6) do: [:n | n even ifTrue: [^ n]]. ^ 0 ]").unwrap(),
        Object::Int(6)
    );
}
