//! The work-queue interpreter.
//!
//! The driver loop pops one [`WorkFrame`] at a time and never calls itself
//! recursively on the host: nested sends, block applications, loops, and
//! non-local returns are all expressed as frames, so execution can suspend
//! between any two frames and resume later. The only host re-entry is the
//! bounded helper `Scheduler step` uses to drive *another* process's VM.

use std::str::FromStr;

use smallvec::SmallVec;

use crate::{
    activation::{Activation, ActivationId, LocalSlot, new_activation},
    ast::{BlockTemplateId, Literal, Node, NodeId},
    class::{MethodEntry, MethodImp},
    fault::{FaultKind, RunError, RunResult},
    frame::{SendMode, VmOutcome, VmState, WorkFrame},
    heap::{Closure, HeapData, Instance},
    intern::{StaticNames, SymbolId},
    natives::{self, NativeCtx, NativeFlow, NativeMethod},
    run::Interp,
    value::Value,
};

/// Result of one frame step.
pub(crate) enum StepFlow {
    Continue,
    /// The active process transitioned to blocked.
    Block,
}

impl Interp {
    /// Drains a process's work queue until it completes, yields, blocks, or
    /// fails. The caller owns the `VmState` and decides what the outcome
    /// means for the process.
    pub(crate) fn run_vm(&mut self, vm: &mut VmState) -> VmOutcome {
        loop {
            if vm.should_yield {
                vm.should_yield = false;
                return VmOutcome::Yielded;
            }
            let Some(frame) = vm.work_queue.pop() else {
                let result = vm.eval_stack.last().copied().unwrap_or(Value::Nil);
                vm.last_result = result;
                return VmOutcome::Completed(result);
            };
            match self.step_frame(vm, frame) {
                Ok(StepFlow::Continue) => {}
                Ok(StepFlow::Block) => return VmOutcome::Blocked,
                Err(err) => {
                    // Capture the trace at the raise point; delivery unwinds
                    // the activation stack.
                    let trace = self.render_trace(vm);
                    if let Err(err) = self.deliver_fault(vm, err) {
                        return VmOutcome::Failed(err.into_fault(trace));
                    }
                }
            }
        }
    }

    fn step_frame(&mut self, vm: &mut VmState, frame: WorkFrame) -> RunResult<StepFlow> {
        match frame {
            WorkFrame::EvalNode(node) => self.eval_node(vm, node)?,
            WorkFrame::AfterReceiver { selector, args, mode } => {
                if args.is_empty() {
                    vm.work_queue.push(WorkFrame::SendMessage { selector, argc: 0, mode });
                } else {
                    let first = args[0];
                    vm.work_queue.push(WorkFrame::AfterArg { selector, args, idx: 0, mode });
                    vm.work_queue.push(WorkFrame::EvalNode(first));
                }
            }
            WorkFrame::AfterArg { selector, args, idx, mode } => {
                if idx + 1 < args.len() {
                    let next = args[idx + 1];
                    vm.work_queue.push(WorkFrame::AfterArg { selector, args, idx: idx + 1, mode });
                    vm.work_queue.push(WorkFrame::EvalNode(next));
                } else {
                    let argc = args.len();
                    vm.work_queue.push(WorkFrame::SendMessage { selector, argc, mode });
                }
            }
            WorkFrame::SendMessage { selector, argc, mode } => {
                return self.send_message(vm, selector, argc, mode);
            }
            WorkFrame::ApplyBlock { block, argc } => {
                let args = vm.pop_args(argc)?;
                self.apply_block(vm, block, &args)?;
            }
            WorkFrame::PopActivation { activation, eval_base } => {
                self.pop_activation(vm, activation, eval_base)?;
            }
            WorkFrame::ReturnValue => self.perform_return(vm)?,
            WorkFrame::StoreName(name) => {
                let value = *vm
                    .eval_stack
                    .last()
                    .ok_or_else(|| RunError::internal("eval stack underflow in assignment"))?;
                self.store_name(vm, name, value)?;
            }
            WorkFrame::StoreSlot(index) => {
                let value = *vm
                    .eval_stack
                    .last()
                    .ok_or_else(|| RunError::internal("eval stack underflow in slot store"))?;
                self.instance_slot_put(vm.current_receiver, index, value)?;
            }
            WorkFrame::BuildArray(count) => {
                let items = vm.pop_args(count)?.into_vec();
                let array = self.heap.alloc_array(items);
                vm.push_value(array);
            }
            WorkFrame::BuildTable(count) => {
                let flat = vm.pop_args(count * 2)?;
                let mut entries = indexmap::IndexMap::with_capacity(count);
                for pair in flat.chunks(2) {
                    let key = self.heap.table_key(pair[0])?;
                    entries.insert(key, pair[1]);
                }
                let table = Value::Ref(self.heap.alloc(HeapData::Table(entries)));
                vm.push_value(table);
            }
            WorkFrame::Cascade { node, idx, receiver } => {
                let Node::Cascade { messages, .. } = self.ast.get(node).clone() else {
                    return Err(RunError::internal("cascade frame on a non-cascade node"));
                };
                let receiver = if idx == 0 { vm.pop_value()? } else { receiver };
                let (selector, args) = messages[idx].clone();
                if idx + 1 < messages.len() {
                    vm.work_queue.push(WorkFrame::Cascade { node, idx: idx + 1, receiver });
                    vm.work_queue.push(WorkFrame::Discard);
                }
                vm.work_queue.push(WorkFrame::AfterReceiver {
                    selector,
                    args,
                    mode: SendMode::Normal,
                });
                vm.push_value(receiver);
            }
            WorkFrame::Discard => {
                vm.pop_value()?;
            }
            WorkFrame::WhileLoop { cond, body, expect } => {
                let Value::Bool(result) = vm.pop_value()? else {
                    return Err(RunError::value("loop condition must answer a Boolean"));
                };
                if result == expect {
                    vm.work_queue.push(WorkFrame::WhileLoop { cond, body, expect });
                    vm.work_queue.push(WorkFrame::ApplyBlock { block: cond, argc: 0 });
                    vm.work_queue.push(WorkFrame::Discard);
                    vm.work_queue.push(WorkFrame::ApplyBlock { block: body, argc: 0 });
                } else {
                    vm.push_value(Value::Nil);
                }
            }
            // Reached normally only when the protected block completed; the
            // handler is simply discarded.
            WorkFrame::HandlerMarker { .. } => {}
            WorkFrame::MonitorExit(id) => natives::monitor_release(self, id)?,
        }
        Ok(StepFlow::Continue)
    }

    // --- node evaluation ---

    fn eval_node(&mut self, vm: &mut VmState, id: NodeId) -> RunResult<()> {
        match self.ast.get(id).clone() {
            Node::Literal(literal) => {
                let value = self.literal_value(&literal);
                vm.push_value(value);
            }
            Node::Ident(name) => {
                let value = self.lookup_name(vm, name)?;
                vm.push_value(value);
            }
            Node::PseudoVar(pseudo) => {
                use crate::ast::PseudoVar as P;
                let value = match pseudo {
                    P::SelfVar => vm.current_receiver,
                    P::Nil => Value::Nil,
                    P::True => Value::Bool(true),
                    P::False => Value::Bool(false),
                    P::ThisProcess => {
                        let pid = self.sched.active.unwrap_or(self.sched.main);
                        Value::Ref(self.heap.alloc(HeapData::Process(pid)))
                    }
                };
                vm.push_value(value);
            }
            Node::Assign { name, expr } => {
                vm.work_queue.push(WorkFrame::StoreName(name));
                vm.work_queue.push(WorkFrame::EvalNode(expr));
            }
            Node::Message { receiver, selector, args } => {
                vm.work_queue.push(WorkFrame::AfterReceiver {
                    selector,
                    args,
                    mode: SendMode::Normal,
                });
                match receiver {
                    Some(node) => vm.work_queue.push(WorkFrame::EvalNode(node)),
                    None => vm.push_value(vm.current_receiver),
                }
            }
            Node::SuperSend { selector, args, qualifier } => {
                vm.work_queue.push(WorkFrame::AfterReceiver {
                    selector,
                    args,
                    mode: SendMode::Super { qualifier },
                });
                vm.push_value(vm.current_receiver);
            }
            Node::Cascade { receiver, .. } => {
                vm.work_queue.push(WorkFrame::Cascade { node: id, idx: 0, receiver: Value::Nil });
                vm.work_queue.push(WorkFrame::EvalNode(receiver));
            }
            Node::Return(expr) => {
                vm.work_queue.push(WorkFrame::ReturnValue);
                match expr {
                    Some(node) => vm.work_queue.push(WorkFrame::EvalNode(node)),
                    None => vm.push_value(vm.current_receiver),
                }
            }
            Node::Block(template) => {
                let closure = self.create_closure(vm, template)?;
                vm.push_value(closure);
            }
            Node::Array(elements) => {
                vm.work_queue.push(WorkFrame::BuildArray(elements.len()));
                for &element in elements.iter().rev() {
                    vm.work_queue.push(WorkFrame::EvalNode(element));
                }
            }
            Node::Table(entries) => {
                vm.work_queue.push(WorkFrame::BuildTable(entries.len()));
                for &(key, value) in entries.iter().rev() {
                    vm.work_queue.push(WorkFrame::EvalNode(value));
                    vm.work_queue.push(WorkFrame::EvalNode(key));
                }
            }
            Node::SlotAccess { index, value, .. } => match value {
                Some(expr) => {
                    vm.work_queue.push(WorkFrame::StoreSlot(index));
                    vm.work_queue.push(WorkFrame::EvalNode(expr));
                }
                None => {
                    let value = self.instance_slot(vm.current_receiver, index)?;
                    vm.push_value(value);
                }
            },
            Node::Primitive { selector, fallback } => {
                let native = NativeMethod::from_str(self.interns.get(selector)).ok();
                match native {
                    Some(native) if !native.has_interpreter_param() => {
                        // A successful primitive answers for the whole
                        // method, like `^ <native result>`.
                        let (receiver, args) = self.primitive_args(vm)?;
                        let value = self.call_plain(native, receiver, &args)?;
                        vm.push_value(value);
                        vm.work_queue.push(WorkFrame::ReturnValue);
                    }
                    _ => push_statements(vm, &fallback),
                }
            }
        }
        Ok(())
    }

    fn literal_value(&mut self, literal: &Literal) -> Value {
        match literal {
            Literal::Nil => Value::Nil,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => self.heap.alloc_str(s.as_ref()),
            Literal::Symbol(sym) => Value::Symbol(*sym),
            Literal::Array(items) => {
                let values: Vec<Value> = items.iter().map(|item| self.literal_value(item)).collect();
                self.heap.alloc_array(values)
            }
        }
    }

    // --- names and slots ---

    fn lookup_name(&self, vm: &VmState, name: SymbolId) -> RunResult<Value> {
        if let Some(id) = vm.current_activation {
            if let Some(activation) = self.activations.get(id) {
                if let Some(slot) = activation.local(name) {
                    return Ok(match slot {
                        LocalSlot::Plain(value) => value,
                        LocalSlot::Cell(cell) => self.heap.cell_get(cell),
                    });
                }
            }
        }
        if let Some(&value) = self.globals.get(&name) {
            return Ok(value);
        }
        Err(RunError::value(format!(
            "undefined variable '{}'",
            self.interns.get(name)
        )))
    }

    /// Assignment resolution: the current activation's locals first (writing
    /// through a cell when the variable was captured), then an existing
    /// global, then creation — as a global at top level, as a new local
    /// inside an activation.
    fn store_name(&mut self, vm: &mut VmState, name: SymbolId, value: Value) -> RunResult<()> {
        if let Some(id) = vm.current_activation {
            if let Some(activation) = self.activations.get_mut(id) {
                if let Some(slot) = activation.local(name) {
                    match slot {
                        LocalSlot::Plain(_) => {
                            activation.set_local(name, LocalSlot::Plain(value));
                        }
                        LocalSlot::Cell(cell) => self.heap.cell_set(cell, value),
                    }
                    return Ok(());
                }
            }
        }
        if self.globals.contains_key(&name) || vm.current_activation.is_none() {
            self.set_global(name, value);
            return Ok(());
        }
        let id = vm.current_activation.expect("checked above");
        if let Some(activation) = self.activations.get_mut(id) {
            activation.push_local(name, LocalSlot::Plain(value));
        }
        Ok(())
    }

    /// Binding a global also names an anonymous class: classes register
    /// themselves in the namespace at their first assignment.
    pub(crate) fn set_global(&mut self, name: SymbolId, value: Value) {
        if let Value::Class(class) = value {
            self.classes.christen(class, self.interns.get(name));
        }
        self.globals.insert(name, value);
    }

    fn instance_slot(&self, receiver: Value, index: usize) -> RunResult<Value> {
        if let Value::Ref(id) = receiver {
            if let HeapData::Instance(instance) = self.heap.get(id) {
                return instance
                    .slots
                    .get(index)
                    .copied()
                    .ok_or_else(|| RunError::internal("slot index out of range"));
            }
        }
        Err(RunError::value("slot access on a non-instance"))
    }

    fn instance_slot_put(&mut self, receiver: Value, index: usize, value: Value) -> RunResult<()> {
        if let Value::Ref(id) = receiver {
            if let HeapData::Instance(instance) = self.heap.get_mut(id) {
                let slot = instance
                    .slots
                    .get_mut(index)
                    .ok_or_else(|| RunError::internal("slot index out of range"))?;
                *slot = value;
                return Ok(());
            }
        }
        Err(RunError::value("slot access on a non-instance"))
    }

    // --- closures and activations ---

    /// Evaluates a block literal: every local visible in the creating
    /// activation is promoted to a shared cell (cells already inherited from
    /// an enclosing scope are reused by reference, so sibling blocks share
    /// them), and the receiver and home activation are snapshotted.
    ///
    /// Only the current activation is walked: anything lexically visible
    /// beyond it was itself captured when the enclosing block was created,
    /// and is therefore already bound here as a cell.
    fn create_closure(&mut self, vm: &VmState, template: BlockTemplateId) -> RunResult<Value> {
        let mut captured: Vec<(SymbolId, crate::heap::HeapId)> = Vec::new();
        if let Some(id) = vm.current_activation {
            if let Some(activation) = self.activations.get_mut(id) {
                for (name, slot) in &mut activation.locals {
                    if captured.iter().any(|&(seen, _)| seen == *name) {
                        continue;
                    }
                    let cell = match slot {
                        LocalSlot::Cell(cell) => *cell,
                        LocalSlot::Plain(value) => {
                            let cell = self.heap.alloc_cell(*value);
                            *slot = LocalSlot::Cell(cell);
                            cell
                        }
                    };
                    captured.push((*name, cell));
                }
            }
        }
        let defining = vm
            .current_activation
            .and_then(|id| self.activations.get(id))
            .and_then(|activation| activation.defining);
        Ok(Value::Ref(self.heap.alloc(HeapData::Closure(Closure {
            template,
            captured,
            home: vm.current_activation,
            home_receiver: vm.current_receiver,
            defining,
        }))))
    }

    /// Pushes the frames for entering a freshly built activation.
    fn enter_activation(&mut self, vm: &mut VmState, activation: Activation, template: BlockTemplateId) {
        let receiver = activation.receiver;
        let body = self.templates.get(template).body.clone();
        let id = self.activations.insert(activation);
        let eval_base = vm.eval_stack.len();
        vm.activation_stack.push(id);
        vm.current_activation = Some(id);
        vm.current_receiver = receiver;
        vm.work_queue.push(WorkFrame::PopActivation { activation: id, eval_base });
        push_statements(vm, &body);
    }

    fn apply_block(&mut self, vm: &mut VmState, block: Value, args: &[Value]) -> RunResult<()> {
        let closure = match block {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Closure(closure) => closure.clone(),
                _ => return Err(RunError::value("cannot apply a non-block value")),
            },
            _ => return Err(RunError::value("cannot apply a non-block value")),
        };
        let template = self.templates.get(closure.template).clone();
        if args.len() != template.params.len() {
            return Err(RunError::dispatch(format!(
                "block expects {} arguments, got {}",
                template.params.len(),
                args.len()
            )));
        }
        let mut activation = new_activation(
            closure.home_receiver,
            closure.defining,
            None,
            false,
            vm.current_activation,
            closure.home,
        );
        bind_locals(&mut activation, &template.params, &template.temps, &closure.captured, args);
        self.enter_activation(vm, activation, closure.template);
        Ok(())
    }

    fn pop_activation(&mut self, vm: &mut VmState, id: ActivationId, eval_base: usize) -> RunResult<()> {
        let top = vm
            .activation_stack
            .pop()
            .ok_or_else(|| RunError::internal("activation stack underflow"))?;
        if top != id {
            return Err(RunError::internal("activation stack out of sync"));
        }
        let activation = self
            .activations
            .remove(id)
            .ok_or_else(|| RunError::internal("popping a dead activation"))?;
        let result = if activation.has_returned {
            activation.return_value
        } else if activation.is_method {
            activation.receiver
        } else if vm.eval_stack.len() > eval_base {
            *vm.eval_stack.last().expect("length checked")
        } else {
            Value::Nil
        };
        vm.eval_stack.truncate(eval_base);
        vm.push_value(result);
        self.sync_current(vm);
        Ok(())
    }

    fn sync_current(&self, vm: &mut VmState) {
        vm.current_activation = vm.activation_stack.last().copied();
        vm.current_receiver = vm
            .current_activation
            .and_then(|id| self.activations.get(id))
            .map_or(Value::Nil, |activation| activation.receiver);
    }

    // --- returns and unwinding ---

    /// `^expr`: resolve the target by walking from the home activation to
    /// the nearest enclosing method activation, then unwind frames until
    /// that activation has been popped.
    fn perform_return(&mut self, vm: &mut VmState) -> RunResult<()> {
        let value = vm.pop_value()?;
        let Some(current) = vm.current_activation else {
            return Err(RunError::value("return outside of a method or block"));
        };
        let mut target = current;
        loop {
            let Some(activation) = self.activations.get(target) else {
                return Err(RunError::dead_return("non-local return target no longer exists"));
            };
            if activation.is_method {
                break;
            }
            match activation.home {
                Some(home) => {
                    if !self.activations.is_live(home) {
                        return Err(RunError::dead_return(
                            "non-local return from a block whose home activation has returned",
                        ));
                    }
                    target = home;
                }
                None => break,
            }
        }
        if !vm.activation_stack.contains(&target) {
            return Err(RunError::dead_return(
                "non-local return target is not on this process's activation stack",
            ));
        }
        if let Some(activation) = self.activations.get_mut(target) {
            activation.has_returned = true;
            activation.return_value = value;
        }
        self.unwind_to(vm, target, value)
    }

    fn unwind_to(&mut self, vm: &mut VmState, target: ActivationId, value: Value) -> RunResult<()> {
        loop {
            let Some(frame) = vm.work_queue.pop() else {
                return Err(RunError::internal("unwind ran out of work frames"));
            };
            match frame {
                WorkFrame::PopActivation { activation, eval_base } => {
                    vm.activation_stack.pop();
                    self.activations.remove(activation);
                    vm.eval_stack.truncate(eval_base);
                    if activation == target {
                        vm.push_value(value);
                        self.sync_current(vm);
                        return Ok(());
                    }
                }
                // Locks must not leak when control jumps out of a critical
                // section.
                WorkFrame::MonitorExit(id) => natives::monitor_release(self, id)?,
                _ => {}
            }
        }
    }

    /// Routes a runtime error to the nearest matching `on:do:` handler, or
    /// reports it as unhandled. Internal faults are never catchable.
    fn deliver_fault(&mut self, vm: &mut VmState, mut err: RunError) -> Result<(), RunError> {
        if err.kind == FaultKind::Internal {
            return Err(err);
        }
        let exception = match err.payload.take() {
            Some(value) => value,
            None => self.make_exception(vm, &err),
        };
        loop {
            let Some(frame) = vm.work_queue.pop() else {
                return Err(err);
            };
            match frame {
                WorkFrame::HandlerMarker {
                    exc_class,
                    handler,
                    activation_depth,
                    eval_depth,
                } => {
                    let class = self.kernel.class_of(&self.heap, exception);
                    if !self.classes.inherits_from(class, exc_class) {
                        continue;
                    }
                    while vm.activation_stack.len() > activation_depth {
                        if let Some(id) = vm.activation_stack.pop() {
                            self.activations.remove(id);
                        }
                    }
                    vm.eval_stack.truncate(eval_depth);
                    self.sync_current(vm);
                    let params = self.closure_param_count(handler).unwrap_or(0);
                    let argc = if params >= 1 {
                        vm.push_value(exception);
                        1
                    } else {
                        0
                    };
                    vm.work_queue.push(WorkFrame::ApplyBlock { block: handler, argc });
                    return Ok(());
                }
                WorkFrame::PopActivation { activation, eval_base } => {
                    vm.activation_stack.pop();
                    self.activations.remove(activation);
                    vm.eval_stack.truncate(eval_base);
                }
                WorkFrame::MonitorExit(id) => natives::monitor_release(self, id)?,
                _ => {}
            }
        }
    }

    fn make_exception(&mut self, vm: &VmState, err: &RunError) -> Value {
        let class = self.kernel.exception;
        let mut slots: SmallVec<[Value; 4]> =
            SmallVec::from_elem(Value::Nil, self.classes.get(class).all_slot_names.len());
        if let Some(index) = self.classes.get(class).slot_index(StaticNames::Message.sym()) {
            slots[index] = self.heap.alloc_str(err.message.clone());
        }
        if let Some(index) = self.classes.get(class).slot_index(StaticNames::Trace.sym()) {
            let lines: Vec<Value> = self
                .render_trace(vm)
                .into_iter()
                .map(|line| self.heap.alloc_str(line))
                .collect();
            slots[index] = self.heap.alloc_array(lines);
        }
        Value::Ref(self.heap.alloc(HeapData::Instance(Instance { class, slots })))
    }

    fn closure_param_count(&self, value: Value) -> Option<usize> {
        if let Value::Ref(id) = value {
            if let HeapData::Closure(closure) = self.heap.get(id) {
                return Some(self.templates.get(closure.template).params.len());
            }
        }
        None
    }

    /// Renders the activation chain as selector names, innermost first.
    pub(crate) fn render_trace(&self, vm: &VmState) -> Vec<String> {
        vm.activation_stack
            .iter()
            .rev()
            .map(|&id| match self.activations.get(id) {
                Some(activation) => activation
                    .selector
                    .map_or_else(|| "a block".to_owned(), |s| format!("#{}", self.interns.get(s))),
                None => "<gone>".to_owned(),
            })
            .collect()
    }

    // --- message dispatch ---

    fn send_message(
        &mut self,
        vm: &mut VmState,
        selector: SymbolId,
        argc: usize,
        mode: SendMode,
    ) -> RunResult<StepFlow> {
        let args = vm.pop_args(argc)?;
        let receiver = vm.pop_value()?;
        if self.sched.yield_on_send {
            vm.should_yield = true;
        }
        if let SendMode::Super { qualifier } = mode {
            return self.send_super(vm, receiver, selector, &args, qualifier);
        }
        if let Some(flow) = self.try_intercept(vm, receiver, selector, &args)? {
            return Ok(flow);
        }
        self.dispatch_send(vm, receiver, selector, &args)
    }

    /// Primitive control flow, handled as frames rather than native calls so
    /// loops can yield and unwind through non-local returns.
    fn try_intercept(
        &mut self,
        vm: &mut VmState,
        receiver: Value,
        selector: SymbolId,
        args: &[Value],
    ) -> RunResult<Option<StepFlow>> {
        use StaticNames as S;
        if let Value::Bool(condition) = receiver {
            let sel = selector;
            if sel == S::IfTrue.sym() {
                self.push_branch(vm, if condition { Some(args[0]) } else { None })?;
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::IfFalse.sym() {
                self.push_branch(vm, if condition { None } else { Some(args[0]) })?;
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::IfTrueIfFalse.sym() {
                self.push_branch(vm, Some(args[usize::from(!condition)]))?;
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::IfFalseIfTrue.sym() {
                self.push_branch(vm, Some(args[usize::from(condition)]))?;
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::And.sym() {
                if condition {
                    self.push_branch(vm, Some(args[0]))?;
                } else {
                    vm.push_value(Value::Bool(false));
                }
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::Or.sym() {
                if condition {
                    vm.push_value(Value::Bool(true));
                } else {
                    self.push_branch(vm, Some(args[0]))?;
                }
                return Ok(Some(StepFlow::Continue));
            }
        }
        if self.closure_param_count(receiver).is_some() {
            let sel = selector;
            if sel == S::Value.sym()
                || sel == S::Value1.sym()
                || sel == S::Value2.sym()
                || sel == S::Value3.sym()
            {
                self.apply_block(vm, receiver, args)?;
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::ValueWithArguments.sym() {
                let spread = match args[0] {
                    Value::Ref(id) => match self.heap.get(id) {
                        HeapData::Array(items) => items.clone(),
                        _ => return Err(RunError::value("valueWithArguments: expects an Array")),
                    },
                    _ => return Err(RunError::value("valueWithArguments: expects an Array")),
                };
                self.apply_block(vm, receiver, &spread)?;
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::WhileTrue.sym() || sel == S::WhileFalse.sym() {
                if self.closure_param_count(args[0]).is_none() {
                    return Err(RunError::value("whileTrue: expects a block argument"));
                }
                vm.work_queue.push(WorkFrame::WhileLoop {
                    cond: receiver,
                    body: args[0],
                    expect: sel == S::WhileTrue.sym(),
                });
                vm.work_queue.push(WorkFrame::ApplyBlock { block: receiver, argc: 0 });
                return Ok(Some(StepFlow::Continue));
            }
            if sel == S::OnDo.sym() {
                let exc_class = args[0]
                    .as_class()
                    .map_err(|_| RunError::value("on:do: expects an exception class"))?;
                if self.closure_param_count(args[1]).is_none() {
                    return Err(RunError::value("on:do: handler must be a block"));
                }
                vm.work_queue.push(WorkFrame::HandlerMarker {
                    exc_class,
                    handler: args[1],
                    activation_depth: vm.activation_stack.len(),
                    eval_depth: vm.eval_stack.len(),
                });
                vm.work_queue.push(WorkFrame::ApplyBlock { block: receiver, argc: 0 });
                return Ok(Some(StepFlow::Continue));
            }
        }
        Ok(None)
    }

    /// Pushes a conditional branch: apply a block, push a plain value, or
    /// push Nil for the untaken side.
    fn push_branch(&mut self, vm: &mut VmState, chosen: Option<Value>) -> RunResult<()> {
        match chosen {
            None => vm.push_value(Value::Nil),
            Some(value) => {
                if self.closure_param_count(value).is_some() {
                    vm.work_queue.push(WorkFrame::ApplyBlock { block: value, argc: 0 });
                } else {
                    vm.push_value(value);
                }
            }
        }
        Ok(())
    }

    fn dispatch_send(
        &mut self,
        vm: &mut VmState,
        receiver: Value,
        selector: SymbolId,
        args: &[Value],
    ) -> RunResult<StepFlow> {
        let entry = self.lookup_entry(receiver, selector);
        match entry {
            Some(entry) => self.invoke_entry(vm, entry, selector, receiver, args),
            None => self.dispatch_dnu(vm, receiver, selector, args),
        }
    }

    fn lookup_entry(&self, receiver: Value, selector: SymbolId) -> Option<MethodEntry> {
        match receiver {
            Value::Class(class) => self.classes.get(class).all_class_methods.get(&selector).cloned(),
            _ => {
                let class = self.kernel.class_of(&self.heap, receiver);
                self.classes.get(class).all_methods.get(&selector).cloned()
            }
        }
    }

    /// `doesNotUnderstand:` fallback: retry the dispatch with a reified
    /// Message carrying the selector and original arguments. A receiver with
    /// no DNU handler is a fatal dispatch fault.
    fn dispatch_dnu(
        &mut self,
        vm: &mut VmState,
        receiver: Value,
        selector: SymbolId,
        args: &[Value],
    ) -> RunResult<StepFlow> {
        let dnu = StaticNames::DoesNotUnderstand.sym();
        if let Some(entry) = self.lookup_entry(receiver, dnu) {
            let arguments = self.heap.alloc_array(args.to_vec());
            let message = Value::Ref(self.heap.alloc(HeapData::Instance(Instance {
                class: self.kernel.message,
                slots: SmallVec::from_slice(&[Value::Symbol(selector), arguments]),
            })));
            return self.invoke_entry(vm, entry, dnu, receiver, &[message]);
        }
        let class = match receiver {
            Value::Class(class) => class,
            _ => self.kernel.class_of(&self.heap, receiver),
        };
        Err(RunError::dispatch(format!(
            "{} does not understand #{}",
            self.classes.get(class).display_name(),
            self.interns.get(selector)
        )))
    }

    /// Super sends: unqualified lookup starts in the defining class's parent
    /// chain; qualified lookup starts in the named parent, which must be an
    /// ancestor of the defining class.
    fn send_super(
        &mut self,
        vm: &mut VmState,
        receiver: Value,
        selector: SymbolId,
        args: &[Value],
        qualifier: Option<SymbolId>,
    ) -> RunResult<StepFlow> {
        let defining = vm
            .current_activation
            .and_then(|id| self.activations.get(id))
            .and_then(|activation| activation.defining)
            .ok_or_else(|| RunError::dispatch("super send outside of a method"))?;
        let class_side = matches!(receiver, Value::Class(_));
        let entry = match qualifier {
            None => {
                let parents = self.classes.get(defining).parents.clone();
                parents.iter().find_map(|&parent| {
                    let class = self.classes.get(parent);
                    let table = if class_side { &class.all_class_methods } else { &class.all_methods };
                    table.get(&selector).cloned()
                })
            }
            Some(name) => {
                let target = self
                    .globals
                    .get(&name)
                    .copied()
                    .and_then(|value| value.as_class().ok())
                    .ok_or_else(|| {
                        RunError::dispatch(format!("unknown class in qualified super: {}", self.interns.get(name)))
                    })?;
                if target == defining || !self.classes.inherits_from(defining, target) {
                    return Err(RunError::dispatch(format!(
                        "{} is not in the parent chain of {}",
                        self.classes.get(target).display_name(),
                        self.classes.get(defining).display_name()
                    )));
                }
                let class = self.classes.get(target);
                let table = if class_side { &class.all_class_methods } else { &class.all_methods };
                table.get(&selector).cloned()
            }
        };
        match entry {
            Some(entry) => self.invoke_entry(vm, entry, selector, receiver, args),
            None => Err(RunError::dispatch(format!(
                "super: #{} not understood above {}",
                self.interns.get(selector),
                self.classes.get(defining).display_name()
            ))),
        }
    }

    fn invoke_entry(
        &mut self,
        vm: &mut VmState,
        entry: MethodEntry,
        selector: SymbolId,
        receiver: Value,
        args: &[Value],
    ) -> RunResult<StepFlow> {
        match entry.imp {
            MethodImp::SlotGet(index) => {
                let value = self.instance_slot(receiver, index)?;
                vm.push_value(value);
            }
            MethodImp::SlotSet(index) => {
                let value = args
                    .first()
                    .copied()
                    .ok_or_else(|| RunError::internal("setter called without an argument"))?;
                self.instance_slot_put(receiver, index, value)?;
                vm.push_value(receiver);
            }
            MethodImp::Native(native) => {
                if native.has_interpreter_param() {
                    match native.call_vm(self, vm, receiver, args)? {
                        NativeFlow::Value(value) => vm.push_value(value),
                        NativeFlow::Scheduled => {}
                        NativeFlow::Blocked => return Ok(StepFlow::Block),
                    }
                } else {
                    let value = self.call_plain(native, receiver, args)?;
                    vm.push_value(value);
                }
            }
            MethodImp::Block { template, ref captured } => {
                let tpl = self.templates.get(template).clone();
                if args.len() != tpl.params.len() {
                    return Err(RunError::dispatch(format!(
                        "#{} expects {} arguments, got {}",
                        self.interns.get(selector),
                        tpl.params.len(),
                        args.len()
                    )));
                }
                let mut activation = new_activation(
                    receiver,
                    Some(entry.defining),
                    Some(selector),
                    true,
                    vm.current_activation,
                    None,
                );
                bind_locals(&mut activation, &tpl.params, &tpl.temps, captured, args);
                self.enter_activation(vm, activation, template);
            }
        }
        Ok(StepFlow::Continue)
    }

    pub(crate) fn call_plain(&mut self, native: NativeMethod, receiver: Value, args: &[Value]) -> RunResult<Value> {
        let mut ctx = NativeCtx {
            heap: &mut self.heap,
            interns: &mut self.interns,
            classes: &mut self.classes,
            kernel: self.kernel,
            ast: &mut self.ast,
            templates: &mut self.templates,
            print: self.print.as_mut(),
        };
        native.call_plain(&mut ctx, receiver, args)
    }

    /// Arguments for a `<primitive:>` body: the declared parameters of the
    /// current activation, in order.
    fn primitive_args(&self, vm: &VmState) -> RunResult<(Value, SmallVec<[Value; 4]>)> {
        let activation = vm
            .current_activation
            .and_then(|id| self.activations.get(id))
            .ok_or_else(|| RunError::internal("primitive outside of an activation"))?;
        let mut args = SmallVec::new();
        for (_, slot) in activation.locals.iter().take(activation.param_count) {
            args.push(match slot {
                LocalSlot::Plain(value) => *value,
                LocalSlot::Cell(cell) => self.heap.cell_get(*cell),
            });
        }
        Ok((activation.receiver, args))
    }
}

/// Binds parameters, temporaries, and captured cells into a fresh
/// activation. Parameters shadow temporaries, which shadow captured cells.
fn bind_locals(
    activation: &mut Activation,
    params: &[SymbolId],
    temps: &[SymbolId],
    captured: &[(SymbolId, crate::heap::HeapId)],
    args: &[Value],
) {
    for (&param, &value) in params.iter().zip(args) {
        activation.push_local(param, LocalSlot::Plain(value));
    }
    activation.param_count = params.len();
    for &temp in temps {
        if activation.local(temp).is_none() {
            activation.push_local(temp, LocalSlot::Plain(Value::Nil));
        }
    }
    for &(name, cell) in captured {
        if activation.local(name).is_none() {
            activation.push_local(name, LocalSlot::Cell(cell));
        }
    }
}

/// Queues a statement sequence: each statement's value is discarded except
/// the last, whose value the surrounding `PopActivation` consumes.
fn push_statements(vm: &mut VmState, statements: &[NodeId]) {
    for (index, &statement) in statements.iter().enumerate().rev() {
        vm.work_queue.push(WorkFrame::EvalNode(statement));
        if index > 0 {
            vm.work_queue.push(WorkFrame::Discard);
        }
    }
}
