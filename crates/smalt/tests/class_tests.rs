use pretty_assertions::assert_eq;
use smalt::{FaultKind, Interp, Object};

#[test]
fn derive_generates_slot_accessors() {
    let mut interp = Interp::new();
    interp.doit("Point := Object derive: #(x y)").unwrap();
    assert_eq!(interp.doit("p := Point new. p x").unwrap(), Object::Nil);
    assert_eq!(interp.doit("p x: 7. p x").unwrap(), Object::Int(7));
    assert_eq!(interp.doit("p y: 9. p y").unwrap(), Object::Int(9));
    // The setter answers the receiver, so sends chain.
    assert_eq!(interp.doit("(p x: 1) y").unwrap(), Object::Int(9));
}

#[test]
fn classes_are_named_at_first_global_binding() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("Point := Object derive. Point name").unwrap(),
        Object::Str("Point".to_owned())
    );
    assert_eq!(
        interp.doit("Alias := Point. Alias name").unwrap(),
        Object::Str("Point".to_owned())
    );
    assert_eq!(interp.doit("Point new printString").unwrap(), Object::Str("a Point".to_owned()));
}

#[test]
fn subclass_slots_extend_the_parent_layout() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "P2 := Object derive: #(a). \
             P3 := P2 derive: #(b). \
             q := P3 new. q a: 1. q b: 2. {q a. q b}",
        )
        .unwrap();
    assert_eq!(result, Object::Array(vec![Object::Int(1), Object::Int(2)]));
}

#[test]
fn duplicate_slot_is_a_construction_fault() {
    let mut interp = Interp::new();
    interp.doit("A := Object derive: #(x)").unwrap();
    let fault = interp.doit("B := A derive: #(x)").unwrap_err();
    assert_eq!(fault.kind, FaultKind::ClassConstruction);
}

#[test]
fn method_installation_invalidates_subclasses_eagerly() {
    let mut interp = Interp::new();
    interp.doit("A := Object derive. B := A derive. b := B new").unwrap();
    // Installed on the ancestor *after* the instance exists.
    assert_eq!(interp.doit("A >> ping [ ^ 42 ] b ping").unwrap(), Object::Int(42));
    // Overriding is visible immediately as well.
    assert_eq!(interp.doit("B >> ping [ ^ 43 ] b ping").unwrap(), Object::Int(43));
    assert_eq!(interp.doit("A >> ping [ ^ 41 ] A new ping").unwrap(), Object::Int(41));
    assert_eq!(interp.doit("b ping").unwrap(), Object::Int(43));
}

#[test]
fn parent_selector_tie_requires_an_override() {
    let mut interp = Interp::new();
    interp
        .doit(
            "A := Object derive. B := Object derive. \
             A >> speak [ ^ 'a' ] B >> speak [ ^ 'b' ] \
             C := A derive",
        )
        .unwrap();
    let fault = interp.doit("C addParent: B").unwrap_err();
    assert_eq!(fault.kind, FaultKind::ClassConstruction);
    // With a child override the same merge succeeds.
    assert_eq!(
        interp.doit("C >> speak [ ^ 'c' ] C addParent: B. C new speak").unwrap(),
        Object::Str("c".to_owned())
    );
}

#[test]
fn add_parent_brings_in_mixin_behavior() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit(
                "Greeter := Object derive. Greeter >> greet [ ^ 'hi' ] \
                 Thing := Object derive. Thing addParent: Greeter. Thing new greet"
            )
            .unwrap(),
        Object::Str("hi".to_owned())
    );
}

#[test]
fn parent_cycle_is_rejected() {
    let mut interp = Interp::new();
    interp.doit("A := Object derive. B := A derive").unwrap();
    let fault = interp.doit("A addParent: B").unwrap_err();
    assert_eq!(fault.kind, FaultKind::ClassConstruction);
}

#[test]
fn left_parent_wins_without_a_tie() {
    let mut interp = Interp::new();
    // Only the left parent defines the selector, so there is no conflict.
    assert_eq!(
        interp
            .doit(
                "L := Object derive. L >> which [ ^ 'left' ] \
                 R := Object derive. \
                 C2 := L derive. C2 addParent: R. C2 new which"
            )
            .unwrap(),
        Object::Str("left".to_owned())
    );
}

#[test]
fn qualified_super_picks_the_named_ancestor() {
    let mut interp = Interp::new();
    interp
        .doit(
            "A := Object derive. A >> tag [ ^ 'A' ] \
             B := A derive. B >> tag [ ^ 'B' ] \
             C := B derive. C >> tag [ ^ super<A> tag ]",
        )
        .unwrap();
    assert_eq!(interp.doit("C new tag").unwrap(), Object::Str("A".to_owned()));
}

#[test]
fn qualified_super_outside_the_parent_chain_fails() {
    let mut interp = Interp::new();
    interp
        .doit(
            "A := Object derive. A >> tag [ ^ 'A' ] \
             Z := Object derive. Z >> tag [ ^ 'Z' ] \
             C := A derive. C >> tag [ ^ super<Z> tag ]",
        )
        .unwrap();
    let fault = interp.doit("C new tag").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Dispatch);
    assert!(fault.message.contains("parent chain"));
}

#[test]
fn instances_allocate_one_nil_slot_per_layout_entry() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit(
                "K := Object derive: #(a b c). k := K new. \
                 {k a. k b. k c}"
            )
            .unwrap(),
        Object::Array(vec![Object::Nil, Object::Nil, Object::Nil])
    );
}

#[test]
fn selector_put_installs_methods_explicitly() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("T := Object derive. T selector: #twice: put: [:n | n * 2]. T new twice: 21")
            .unwrap(),
        Object::Int(42)
    );
    assert_eq!(
        interp
            .doit("T classSelector: #make put: [^ self new]. (T make) class name")
            .unwrap(),
        Object::Str("T".to_owned())
    );
}

#[test]
fn selector_arity_must_match_the_block() {
    let mut interp = Interp::new();
    let fault = interp
        .doit("T := Object derive. T selector: #twice: put: [1]")
        .unwrap_err();
    assert_eq!(fault.kind, FaultKind::Value);
    assert!(fault.message.contains("arguments"));
}

#[test]
fn class_tags_accumulate() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("Shape := Object derive. Shape tag: #geometry. Shape tag: #kernel. Shape tags")
            .unwrap(),
        Object::Array(vec![
            Object::Symbol("geometry".to_owned()),
            Object::Symbol("kernel".to_owned())
        ])
    );
}

#[test]
fn method_wrong_arity_is_a_dispatch_fault() {
    let mut interp = Interp::new();
    interp.doit("W := Object derive. W >> pair: a with: b [ ^ a + b ]").unwrap();
    assert_eq!(interp.doit("W new pair: 1 with: 2").unwrap(), Object::Int(3));
    let fault = interp.doit("W new pair: 1").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Dispatch);
}
