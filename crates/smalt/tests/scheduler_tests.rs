use pretty_assertions::assert_eq;
use smalt::{FaultKind, Interp, Object};

#[test]
fn forked_work_runs_after_the_main_program() {
    let mut interp = Interp::new();
    // Still empty while the main program runs...
    assert_eq!(
        interp.doit("log := Array new. p := Processor fork: [log add: 1]. log size").unwrap(),
        Object::Int(0)
    );
    // ...but the eval boundary drains the ready queue.
    assert_eq!(interp.doit("log size").unwrap(), Object::Int(1));
    assert_eq!(interp.doit("p state").unwrap(), Object::Str("terminated".to_owned()));
}

#[test]
fn round_robin_is_fair_between_yield_points() {
    let mut interp = Interp::new();
    interp
        .doit(
            "log := Array new. \
             p1 := Processor fork: [3 timesRepeat: [log add: 1. Processor yield]]. \
             p2 := Processor fork: [3 timesRepeat: [log add: 2. Processor yield]]. \
             p3 := Processor fork: [3 timesRepeat: [log add: 3. Processor yield]]",
        )
        .unwrap();
    let expected: Vec<Object> = [1, 2, 3, 1, 2, 3, 1, 2, 3].iter().map(|&i| Object::Int(i)).collect();
    assert_eq!(interp.doit("log").unwrap(), Object::Array(expected));
}

#[test]
fn scheduler_step_drives_processes_from_the_language() {
    let mut interp = Interp::new();
    let result = interp
        .doit(
            "n := 0. \
             p := Processor fork: [n := n + 1. Processor yield. n := n + 1]. \
             Scheduler step. \
             n",
        )
        .unwrap();
    // One step runs until the process yields.
    assert_eq!(result, Object::Int(1));
    assert_eq!(interp.doit("Scheduler step. n").unwrap(), Object::Int(2));
    assert_eq!(interp.doit("p isTerminated").unwrap(), Object::Bool(true));
}

#[test]
fn run_to_completion_from_the_language() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("n := 0. p := Processor fork: [n := 5]. Scheduler runToCompletion. n")
            .unwrap(),
        Object::Int(5)
    );
}

#[test]
fn monitor_keeps_a_critical_section_exclusive_across_yields() {
    let mut interp = Interp::new();
    interp
        .doit(
            "m := Monitor new. log := Array new. \
             p1 := Processor fork: [m critical: [log add: 'a1'. Processor yield. log add: 'a2']]. \
             p2 := Processor fork: [m critical: [log add: 'b1'. Processor yield. log add: 'b2']]",
        )
        .unwrap();
    let log = interp.doit("log").unwrap();
    let expected: Vec<Object> = ["a1", "a2", "b1", "b2"].iter().map(|&s| Object::Str(s.to_owned())).collect();
    assert_eq!(log, Object::Array(expected));
}

#[test]
fn monitor_counter_equals_processes_times_increments() {
    let mut interp = Interp::new();
    interp
        .doit(
            "m := Monitor new. n := 0. \
             p1 := Processor fork: [5 timesRepeat: [m critical: [ | t | t := n. Processor yield. n := t + 1]]]. \
             p2 := Processor fork: [5 timesRepeat: [m critical: [ | t | t := n. Processor yield. n := t + 1]]]",
        )
        .unwrap();
    // The read-yield-write inside the critical section would lose updates
    // without mutual exclusion.
    assert_eq!(interp.doit("n").unwrap(), Object::Int(10));
}

#[test]
fn monitor_is_reentrant() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("m := Monitor new. r := 0. m critical: [m critical: [r := 9]]. r")
            .unwrap(),
        Object::Int(9)
    );
}

#[test]
fn semaphore_blocks_until_signalled() {
    let mut interp = Interp::new();
    interp
        .doit(
            "s := Semaphore new. log := Array new. \
             w := Processor fork: [s wait. log add: 'woke']. \
             g := Processor fork: [log add: 'signal'. s signal]",
        )
        .unwrap();
    let expected: Vec<Object> = ["signal", "woke"].iter().map(|&s| Object::Str(s.to_owned())).collect();
    assert_eq!(interp.doit("log").unwrap(), Object::Array(expected));
}

#[test]
fn two_signals_permit_two_waits() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.doit("s := Semaphore new. s signal. s signal. s wait. s wait. 'ok'").unwrap(),
        Object::Str("ok".to_owned())
    );
    assert_eq!(
        interp.doit("t := Semaphore new: 2. t wait. t wait. 'ok'").unwrap(),
        Object::Str("ok".to_owned())
    );
}

#[test]
fn shared_queue_delivers_in_order_and_wakes_getters() {
    let mut interp = Interp::new();
    interp
        .doit(
            "q := SharedQueue new. log := Array new. \
             c := Processor fork: [log add: q get. log add: q get]. \
             p := Processor fork: [q put: 1. q put: 2]",
        )
        .unwrap();
    assert_eq!(
        interp.doit("log").unwrap(),
        Object::Array(vec![Object::Int(1), Object::Int(2)])
    );
}

#[test]
fn blocking_wait_in_the_main_process_reports_deadlock() {
    let mut interp = Interp::new();
    let fault = interp.doit("s := Semaphore new. s wait").unwrap_err();
    assert_eq!(fault.kind, FaultKind::Scheduler);
    assert!(fault.message.contains("deadlock"));
}

#[test]
fn terminate_discards_pending_work() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("n := 0. p := Processor fork: [n := 99]. p terminate. p state")
            .unwrap(),
        Object::Str("terminated".to_owned())
    );
    assert_eq!(interp.doit("n").unwrap(), Object::Int(0));
}

#[test]
fn suspend_and_resume_toggle_runnability() {
    let mut interp = Interp::new();
    assert_eq!(
        interp
            .doit("n := 0. p := Processor fork: [n := 1]. p suspend. p state")
            .unwrap(),
        Object::Str("suspended".to_owned())
    );
    assert_eq!(interp.doit("n").unwrap(), Object::Int(0));
    interp.doit("p resume. nil").unwrap();
    assert_eq!(interp.doit("n").unwrap(), Object::Int(1));
    assert_eq!(interp.doit("p state").unwrap(), Object::Str("terminated".to_owned()));
}

#[test]
fn process_introspection() {
    let mut interp = Interp::new();
    assert_eq!(interp.doit("Processor activeProcess pid").unwrap(), Object::Int(0));
    assert_eq!(interp.doit("thisProcess pid").unwrap(), Object::Int(0));
    assert_eq!(
        interp.doit("p := Processor fork: [nil]. p state").unwrap(),
        Object::Str("ready".to_owned())
    );
    assert_eq!(
        interp.doit("p name: 'worker'. p name").unwrap(),
        Object::Str("worker".to_owned())
    );
    assert_eq!(interp.doit("p pid > 0").unwrap(), Object::Bool(true));
    assert_eq!(interp.doit("Processor activeProcess name").unwrap(), Object::Str("main".to_owned()));
}

#[test]
fn higher_priority_processes_run_first() {
    let mut interp = Interp::new();
    interp
        .doit(
            "log := Array new. \
             p1 := Processor fork: [log add: 'low']. \
             p2 := Processor fork: [log add: 'high']. \
             p2 priority: 10",
        )
        .unwrap();
    let expected: Vec<Object> = ["high", "low"].iter().map(|&s| Object::Str(s.to_owned())).collect();
    assert_eq!(interp.doit("log").unwrap(), Object::Array(expected));
}

#[test]
fn block_fork_shorthand() {
    let mut interp = Interp::new();
    interp.doit("n := 0. p := [n := 7] fork").unwrap();
    assert_eq!(interp.doit("n").unwrap(), Object::Int(7));
}

#[test]
fn forked_process_failure_does_not_poison_the_main_process() {
    let mut interp = Interp::new();
    interp.doit("p := Processor fork: [1 / 0]").unwrap();
    // The fault terminated only the forked process.
    assert_eq!(interp.doit("p state").unwrap(), Object::Str("terminated".to_owned()));
    assert_eq!(interp.doit("1 + 1").unwrap(), Object::Int(2));
}
