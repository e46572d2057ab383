//! Process, scheduler, and synchronization natives — the vm-shape routines.
//!
//! Blocking discipline: when a primitive cannot proceed, the caller's pid is
//! appended to the primitive's wait list and the blocked send is *rewound one
//! step* — receiver and arguments go back on the eval stack beneath a fresh
//! `SendMessage` frame — so waking the process simply re-executes the send
//! and re-examines the condition before committing.

use super::{NativeFlow, arg};
use crate::{
    fault::{RunError, RunResult},
    frame::{SendMode, VmState, WorkFrame},
    heap::{HeapData, HeapId},
    intern::StaticNames,
    run::Interp,
    scheduler::{Pid, ProcessState},
    value::Value,
};

fn as_closure(interp: &Interp, value: Value, what: &str) -> RunResult<Value> {
    if let Value::Ref(id) = value {
        if matches!(interp.heap.get(id), HeapData::Closure(_)) {
            return Ok(value);
        }
    }
    Err(RunError::value(format!("{what} expects a Block")))
}

fn process_pid(interp: &Interp, value: Value, what: &str) -> RunResult<Pid> {
    if let Value::Ref(id) = value {
        if let HeapData::Process(pid) = interp.heap.get(id) {
            return Ok(*pid);
        }
    }
    Err(RunError::value(format!("{what} expects a Process")))
}

fn active_pid(interp: &Interp) -> Pid {
    interp.sched.active.unwrap_or(interp.sched.main)
}

/// Pops wait-list entries until one actually wakes; entries for processes
/// that were terminated or suspended while waiting are dropped.
fn wake_first(sched: &mut crate::scheduler::Scheduler, waiters: &mut std::collections::VecDeque<Pid>) {
    while let Some(pid) = waiters.pop_front() {
        if sched.wake(pid) {
            break;
        }
    }
}

pub(super) fn fork(interp: &mut Interp, _vm: &mut VmState, _recv: Value, args: &[Value]) -> RunResult<NativeFlow> {
    let block = as_closure(interp, arg(args, 0)?, "fork:")?;
    let mut child = VmState::default();
    child.work_queue.push(WorkFrame::ApplyBlock { block, argc: 0 });
    let priority = interp.sched.get(active_pid(interp)).priority;
    let pid = interp.sched.spawn(child, priority);
    Ok(NativeFlow::Value(Value::Ref(interp.heap.alloc(HeapData::Process(pid)))))
}

pub(super) fn yield_now(_interp: &mut Interp, vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    vm.should_yield = true;
    Ok(NativeFlow::Value(recv))
}

pub(super) fn active_process(interp: &mut Interp, _vm: &mut VmState, _recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = active_pid(interp);
    Ok(NativeFlow::Value(Value::Ref(interp.heap.alloc(HeapData::Process(pid)))))
}

pub(super) fn scheduler_step(interp: &mut Interp, _vm: &mut VmState, _recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    if interp.step_depth >= Interp::MAX_STEP_DEPTH {
        return Err(RunError::scheduler("nested scheduler steps too deep"));
    }
    interp.step_depth += 1;
    let stepped = interp.step_once();
    interp.step_depth -= 1;
    Ok(NativeFlow::Value(Value::Bool(stepped)))
}

pub(super) fn scheduler_run(interp: &mut Interp, _vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    if interp.step_depth >= Interp::MAX_STEP_DEPTH {
        return Err(RunError::scheduler("nested scheduler steps too deep"));
    }
    interp.step_depth += 1;
    let result = loop {
        if !interp.step_once() {
            if interp.sched.any_blocked() {
                break Err(RunError::scheduler(
                    "deadlock: every process is blocked with no possible wake-up",
                ));
            }
            break Ok(NativeFlow::Value(recv));
        }
    };
    interp.step_depth -= 1;
    result
}

pub(super) fn state(interp: &mut Interp, _vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "state")?;
    let state = interp.sched.get(pid).state.to_string();
    Ok(NativeFlow::Value(interp.heap.alloc_str(state)))
}

pub(super) fn pid(interp: &mut Interp, _vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "pid")?;
    Ok(NativeFlow::Value(Value::Int(pid.index() as i64)))
}

pub(super) fn name(interp: &mut Interp, _vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "name")?;
    Ok(NativeFlow::Value(match interp.sched.get(pid).name.clone() {
        Some(name) => interp.heap.alloc_str(name),
        None => Value::Nil,
    }))
}

pub(super) fn name_put(interp: &mut Interp, _vm: &mut VmState, recv: Value, args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "name:")?;
    let name = match arg(args, 0)? {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::Str(s) => s.clone(),
            _ => return Err(RunError::value("name: expects a String")),
        },
        _ => return Err(RunError::value("name: expects a String")),
    };
    interp.sched.get_mut(pid).name = Some(name);
    Ok(NativeFlow::Value(recv))
}

pub(super) fn priority(interp: &mut Interp, _vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "priority")?;
    Ok(NativeFlow::Value(Value::Int(interp.sched.get(pid).priority)))
}

pub(super) fn priority_put(interp: &mut Interp, _vm: &mut VmState, recv: Value, args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "priority:")?;
    interp.sched.get_mut(pid).priority = arg(args, 0)?.as_int()?;
    Ok(NativeFlow::Value(recv))
}

pub(super) fn suspend(interp: &mut Interp, vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "suspend")?;
    let proc = interp.sched.get_mut(pid);
    if matches!(proc.state, ProcessState::Ready | ProcessState::Running) {
        proc.state = ProcessState::Suspended;
    }
    if Some(pid) == interp.sched.active {
        vm.should_yield = true;
    }
    Ok(NativeFlow::Value(recv))
}

pub(super) fn resume(interp: &mut Interp, _vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "resume")?;
    let proc = interp.sched.get_mut(pid);
    if proc.state == ProcessState::Suspended {
        proc.state = ProcessState::Ready;
        interp.sched.requeue(pid);
    }
    Ok(NativeFlow::Value(recv))
}

pub(super) fn terminate(interp: &mut Interp, vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let pid = process_pid(interp, recv, "terminate")?;
    let proc = interp.sched.get_mut(pid);
    proc.state = ProcessState::Terminated;
    proc.vm = None;
    if Some(pid) == interp.sched.active {
        vm.should_yield = true;
    }
    Ok(NativeFlow::Value(recv))
}

fn monitor_id(interp: &Interp, value: Value, what: &str) -> RunResult<HeapId> {
    if let Value::Ref(id) = value {
        if matches!(interp.heap.get(id), HeapData::Monitor(_)) {
            return Ok(id);
        }
    }
    Err(RunError::value(format!("{what} expects a Monitor")))
}

pub(super) fn monitor_critical(interp: &mut Interp, vm: &mut VmState, recv: Value, args: &[Value]) -> RunResult<NativeFlow> {
    let id = monitor_id(interp, recv, "critical:")?;
    let block = as_closure(interp, arg(args, 0)?, "critical:")?;
    let active = active_pid(interp);
    let HeapData::Monitor(monitor) = interp.heap.get_mut(id) else {
        unreachable!("checked by monitor_id");
    };
    if monitor.owner.is_none() || monitor.owner == Some(active) {
        monitor.owner = Some(active);
        monitor.depth += 1;
        vm.work_queue.push(WorkFrame::MonitorExit(id));
        vm.work_queue.push(WorkFrame::ApplyBlock { block, argc: 0 });
        Ok(NativeFlow::Scheduled)
    } else {
        monitor.waiters.push_back(active);
        vm.push_value(recv);
        vm.push_value(block);
        vm.work_queue.push(WorkFrame::SendMessage {
            selector: StaticNames::Critical.sym(),
            argc: 1,
            mode: SendMode::Normal,
        });
        Ok(NativeFlow::Blocked)
    }
}

/// Releases one level of a monitor; on full release, hands the region to the
/// first waiter still blocked.
pub(crate) fn monitor_release(interp: &mut Interp, id: HeapId) -> RunResult<()> {
    let HeapData::Monitor(monitor) = interp.heap.get_mut(id) else {
        return Err(RunError::internal("monitor exit on a non-monitor"));
    };
    if monitor.depth == 0 {
        return Err(RunError::internal("monitor exit while unlocked"));
    }
    monitor.depth -= 1;
    if monitor.depth == 0 {
        monitor.owner = None;
        let mut waiters = std::mem::take(&mut monitor.waiters);
        wake_first(&mut interp.sched, &mut waiters);
        match interp.heap.get_mut(id) {
            HeapData::Monitor(monitor) => monitor.waiters = waiters,
            _ => return Err(RunError::internal("monitor exit on a non-monitor")),
        }
    }
    Ok(())
}

fn semaphore_ref(interp: &mut Interp, value: Value, what: &str) -> RunResult<HeapId> {
    if let Value::Ref(id) = value {
        if matches!(interp.heap.get(id), HeapData::Semaphore(_)) {
            return Ok(id);
        }
    }
    Err(RunError::value(format!("{what} expects a Semaphore")))
}

pub(super) fn semaphore_wait(interp: &mut Interp, vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let id = semaphore_ref(interp, recv, "wait")?;
    let active = active_pid(interp);
    let HeapData::Semaphore(semaphore) = interp.heap.get_mut(id) else {
        unreachable!("checked by semaphore_ref");
    };
    if semaphore.count > 0 {
        semaphore.count -= 1;
        Ok(NativeFlow::Value(recv))
    } else {
        semaphore.waiters.push_back(active);
        vm.push_value(recv);
        vm.work_queue.push(WorkFrame::SendMessage {
            selector: StaticNames::Wait.sym(),
            argc: 0,
            mode: SendMode::Normal,
        });
        Ok(NativeFlow::Blocked)
    }
}

pub(super) fn semaphore_signal(interp: &mut Interp, _vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let id = semaphore_ref(interp, recv, "signal")?;
    let HeapData::Semaphore(semaphore) = interp.heap.get_mut(id) else {
        unreachable!("checked by semaphore_ref");
    };
    semaphore.count += 1;
    let mut waiters = std::mem::take(&mut semaphore.waiters);
    wake_first(&mut interp.sched, &mut waiters);
    match interp.heap.get_mut(id) {
        HeapData::Semaphore(semaphore) => semaphore.waiters = waiters,
        _ => unreachable!("checked by semaphore_ref"),
    }
    Ok(NativeFlow::Value(recv))
}

fn queue_ref(interp: &mut Interp, value: Value, what: &str) -> RunResult<HeapId> {
    if let Value::Ref(id) = value {
        if matches!(interp.heap.get(id), HeapData::SharedQueue(_)) {
            return Ok(id);
        }
    }
    Err(RunError::value(format!("{what} expects a SharedQueue")))
}

pub(super) fn queue_put(interp: &mut Interp, _vm: &mut VmState, recv: Value, args: &[Value]) -> RunResult<NativeFlow> {
    let id = queue_ref(interp, recv, "put:")?;
    let value = arg(args, 0)?;
    let HeapData::SharedQueue(queue) = interp.heap.get_mut(id) else {
        unreachable!("checked by queue_ref");
    };
    queue.items.push_back(value);
    let mut waiters = std::mem::take(&mut queue.waiters);
    wake_first(&mut interp.sched, &mut waiters);
    match interp.heap.get_mut(id) {
        HeapData::SharedQueue(queue) => queue.waiters = waiters,
        _ => unreachable!("checked by queue_ref"),
    }
    Ok(NativeFlow::Value(value))
}

pub(super) fn queue_get(interp: &mut Interp, vm: &mut VmState, recv: Value, _args: &[Value]) -> RunResult<NativeFlow> {
    let id = queue_ref(interp, recv, "get")?;
    let active = active_pid(interp);
    let HeapData::SharedQueue(queue) = interp.heap.get_mut(id) else {
        unreachable!("checked by queue_ref");
    };
    if let Some(value) = queue.items.pop_front() {
        Ok(NativeFlow::Value(value))
    } else {
        queue.waiters.push_back(active);
        vm.push_value(recv);
        vm.work_queue.push(WorkFrame::SendMessage {
            selector: StaticNames::Get.sym(),
            argc: 0,
            mode: SendMode::Normal,
        });
        Ok(NativeFlow::Blocked)
    }
}

pub(super) fn table_at_if_absent(interp: &mut Interp, vm: &mut VmState, recv: Value, args: &[Value]) -> RunResult<NativeFlow> {
    let Value::Ref(id) = recv else {
        return Err(RunError::value("at:ifAbsent: expects a Table"));
    };
    if !matches!(interp.heap.get(id), HeapData::Table(_)) {
        return Err(RunError::value("at:ifAbsent: expects a Table"));
    }
    let key = interp.heap.table_key(arg(args, 0)?)?;
    let HeapData::Table(entries) = interp.heap.get(id) else {
        unreachable!("checked above");
    };
    if let Some(&value) = entries.get(&key) {
        return Ok(NativeFlow::Value(value));
    }
    let fallback = arg(args, 1)?;
    if matches!(fallback, Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Closure(_))) {
        vm.work_queue.push(WorkFrame::ApplyBlock { block: fallback, argc: 0 });
        Ok(NativeFlow::Scheduled)
    } else {
        Ok(NativeFlow::Value(fallback))
    }
}
