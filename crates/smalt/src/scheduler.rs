//! Cooperative process bookkeeping.
//!
//! A [`Process`] owns its VM state and is multiplexed with every other
//! process over the one OS thread driving the interpreter. The scheduler here
//! is pure bookkeeping — ready queue, states, wake-ups; the actual stepping
//! lives on the interpreter, which owns the heap the VMs run against.
//!
//! Scheduling is round-robin within a priority level, always preferring the
//! highest-priority ready process. A blocked process sits in exactly one sync
//! primitive's wait list; waking moves it back to the ready queue and the
//! blocked send re-executes, re-examining its condition.

use std::collections::VecDeque;

use strum::Display;

use crate::{fault::Fault, frame::VmState, value::Value};

/// Process identifier; monotonically assigned, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Pid(u32);

impl Pid {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lifecycle state of a process. The rendered form is what `state` answers
/// in the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ProcessState {
    Ready,
    Running,
    Blocked,
    Suspended,
    Terminated,
}

/// A green thread: identity, state, and the VM it owns.
#[derive(Debug)]
pub(crate) struct Process {
    pub pid: Pid,
    pub name: Option<String>,
    pub state: ProcessState,
    pub priority: i64,
    /// Taken out of the slot while the process is being stepped; discarded
    /// on explicit termination.
    pub vm: Option<Box<VmState>>,
    pub result: Value,
    pub fault: Option<Fault>,
}

/// The process table plus the ready queue.
#[derive(Debug)]
pub(crate) struct Scheduler {
    procs: Vec<Process>,
    pub ready: VecDeque<Pid>,
    pub active: Option<Pid>,
    pub main: Pid,
    /// When set, every message send is also a yield point. Off by default to
    /// keep interleaving deterministic.
    pub yield_on_send: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        let main = Pid(0);
        Self {
            procs: vec![Process {
                pid: main,
                name: Some("main".to_owned()),
                state: ProcessState::Ready,
                priority: 1,
                vm: Some(Box::default()),
                result: Value::Nil,
                fault: None,
            }],
            ready: VecDeque::new(),
            active: None,
            main,
            yield_on_send: false,
        }
    }

    pub fn get(&self, pid: Pid) -> &Process {
        &self.procs[pid.index()]
    }

    pub fn get_mut(&mut self, pid: Pid) -> &mut Process {
        &mut self.procs[pid.index()]
    }

    /// Registers a new ready process around an initialized VM.
    pub fn spawn(&mut self, vm: VmState, priority: i64) -> Pid {
        let pid = Pid(u32::try_from(self.procs.len()).expect("process table overflow"));
        self.procs.push(Process {
            pid,
            name: None,
            state: ProcessState::Ready,
            priority,
            vm: Some(Box::new(vm)),
            result: Value::Nil,
            fault: None,
        });
        self.ready.push_back(pid);
        pid
    }

    /// Picks the next process to step: the first ready entry of the highest
    /// priority present in the queue. Stale entries (terminated, suspended,
    /// or mid-step) are dropped as they surface.
    pub fn next_ready(&mut self) -> Option<Pid> {
        loop {
            let best = self
                .ready
                .iter()
                .enumerate()
                .filter(|&(_, &pid)| self.runnable(pid))
                .max_by_key(|&(idx, &pid)| (self.procs[pid.index()].priority, usize::MAX - idx))
                .map(|(idx, _)| idx)?;
            let pid = self.ready.remove(best)?;
            if self.runnable(pid) {
                return Some(pid);
            }
        }
    }

    fn runnable(&self, pid: Pid) -> bool {
        let proc = &self.procs[pid.index()];
        proc.state == ProcessState::Ready && proc.vm.is_some()
    }

    /// Requeues a process that yielded.
    pub fn requeue(&mut self, pid: Pid) {
        self.ready.push_back(pid);
    }

    /// Moves a blocked process back to ready; a no-op for any other state,
    /// so stale wait-list entries are harmless.
    pub fn wake(&mut self, pid: Pid) -> bool {
        let proc = &mut self.procs[pid.index()];
        if proc.state == ProcessState::Blocked {
            proc.state = ProcessState::Ready;
            self.ready.push_back(pid);
            true
        } else {
            false
        }
    }

    /// True when any process is blocked on a sync primitive.
    pub fn any_blocked(&self) -> bool {
        self.procs.iter().any(|p| p.state == ProcessState::Blocked)
    }

    /// True when any process besides `except` could still run.
    pub fn any_ready(&self) -> bool {
        self.ready.iter().any(|&pid| self.runnable(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_assigns_monotonic_pids() {
        let mut sched = Scheduler::new();
        let a = sched.spawn(VmState::default(), 1);
        let b = sched.spawn(VmState::default(), 1);
        assert_ne!(a, b);
        assert_eq!(sched.get(a).state, ProcessState::Ready);
        assert_eq!(sched.next_ready(), Some(a));
        assert_eq!(sched.next_ready(), Some(b));
        assert_eq!(sched.next_ready(), None);
    }

    #[test]
    fn higher_priority_wins() {
        let mut sched = Scheduler::new();
        let low = sched.spawn(VmState::default(), 1);
        let high = sched.spawn(VmState::default(), 5);
        assert_eq!(sched.next_ready(), Some(high));
        assert_eq!(sched.next_ready(), Some(low));
    }

    #[test]
    fn wake_only_moves_blocked_processes() {
        let mut sched = Scheduler::new();
        let pid = sched.spawn(VmState::default(), 1);
        sched.next_ready();
        sched.get_mut(pid).state = ProcessState::Blocked;
        assert!(sched.wake(pid));
        assert!(!sched.wake(pid));
        assert_eq!(sched.get(pid).state, ProcessState::Ready);
    }
}
