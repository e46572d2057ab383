use smalt::{FaultKind, Interp};

fn parse_fault(source: &str) -> smalt::Fault {
    let mut interp = Interp::new();
    let fault = interp.doit(source).unwrap_err();
    assert_eq!(fault.kind, FaultKind::Parse, "source: {source}");
    fault
}

#[test]
fn incomplete_binary_send() {
    let fault = parse_fault("3 +");
    assert!(fault.message.starts_with("line 1:"));
}

#[test]
fn unterminated_string() {
    let fault = parse_fault("'abc");
    assert!(fault.message.contains("unterminated string"));
}

#[test]
fn unterminated_block() {
    parse_fault("[:a | a");
}

#[test]
fn unterminated_literal_array() {
    let fault = parse_fault("#(1 2");
    assert!(fault.message.contains("literal array"));
}

#[test]
fn super_without_a_message() {
    let fault = parse_fault("x := super");
    assert!(fault.message.contains("super"));
}

#[test]
fn cascade_needs_a_send_on_its_left() {
    let fault = parse_fault("3; foo");
    assert!(fault.message.contains("cascade"));
}

#[test]
fn missing_statement_separator() {
    let fault = parse_fault("x := 1 y := 2");
    assert!(fault.message.contains("expected"));
}

#[test]
fn nesting_depth_is_bounded() {
    let source = format!("{}1{}", "(".repeat(400), ")".repeat(400));
    let fault = parse_fault(&source);
    assert!(fault.message.contains("nesting"));
}

#[test]
fn stray_characters_are_reported_with_position() {
    let fault = parse_fault("1 + $");
    assert!(fault.message.contains("line 1:5"));
}

#[test]
fn table_entry_requires_an_arrow() {
    let fault = parse_fault("#{1. 2}");
    assert!(fault.message.contains("->"));
}

#[test]
fn parse_faults_do_not_disturb_the_session() {
    let mut interp = Interp::new();
    interp.doit("x := 41").unwrap();
    assert!(interp.doit("x +").is_err());
    assert_eq!(interp.doit("x + 1").unwrap(), smalt::Object::Int(42));
}
