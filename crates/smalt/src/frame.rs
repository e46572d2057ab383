//! Work frames and per-process VM state.
//!
//! The interpreter replaces host recursion with an explicit work queue: every
//! pending step of evaluation is a [`WorkFrame`], and the driver loop pops
//! one frame at a time. Any boundary between frames is therefore a potential
//! suspension point, which is what lets one OS thread multiplex many
//! processes.

use smallvec::SmallVec;

use crate::{
    activation::ActivationId,
    ast::NodeId,
    class::ClassId,
    fault::{Fault, RunError, RunResult},
    heap::HeapId,
    intern::SymbolId,
    value::Value,
};

/// Whether a send dispatches normally or as a super send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendMode {
    Normal,
    Super { qualifier: Option<SymbolId> },
}

/// One unit of pending work. Frames are pushed in reverse of execution order
/// so they pop in source order.
#[derive(Debug, Clone)]
pub(crate) enum WorkFrame {
    /// Evaluate an AST node.
    EvalNode(NodeId),
    /// Receiver is on the eval stack; schedule argument evaluation.
    AfterReceiver {
        selector: SymbolId,
        args: SmallVec<[NodeId; 4]>,
        mode: SendMode,
    },
    /// Argument `idx` is on the eval stack; schedule the next one or send.
    AfterArg {
        selector: SymbolId,
        args: SmallVec<[NodeId; 4]>,
        idx: usize,
        mode: SendMode,
    },
    /// Pop `argc` arguments plus the receiver and dispatch.
    SendMessage {
        selector: SymbolId,
        argc: usize,
        mode: SendMode,
    },
    /// Invoke a block with `argc` arguments taken from the eval stack.
    ApplyBlock { block: Value, argc: usize },
    /// Unwind one activation and restore VM state around it.
    PopActivation {
        activation: ActivationId,
        eval_base: usize,
    },
    /// Honor `^expr` with the value on the eval stack.
    ReturnValue,
    /// Assign the top of the eval stack (kept there as the expression value).
    StoreName(SymbolId),
    /// Store the top of the eval stack into a receiver slot.
    StoreSlot(usize),
    /// Assemble an Array from the top N stack values.
    BuildArray(usize),
    /// Assemble a Table from the top N key/value pairs.
    BuildTable(usize),
    /// Drive the remaining messages of a cascade. At `idx == 0` the receiver
    /// is still on the eval stack; afterwards it is saved in the frame.
    Cascade {
        node: NodeId,
        idx: usize,
        receiver: Value,
    },
    /// Drop the top of the eval stack (statement separator).
    Discard,
    /// Condition result is on the stack; re-run the loop or finish.
    WhileLoop {
        cond: Value,
        body: Value,
        expect: bool,
    },
    /// Exception handler installed by `on:do:`, recording where to unwind to.
    HandlerMarker {
        exc_class: ClassId,
        handler: Value,
        activation_depth: usize,
        eval_depth: usize,
    },
    /// Release a monitor on the way out of its critical section.
    MonitorExit(HeapId),
}

/// Why the driver loop handed control back to the scheduler.
#[derive(Debug)]
pub(crate) enum VmOutcome {
    /// Work queue drained; the value is the top of the eval stack (or Nil).
    Completed(Value),
    /// Yield point reached; state is saved and resumable.
    Yielded,
    /// Transitioned to blocked by a sync primitive.
    Blocked,
    /// Unrecoverable error with its rendered trace.
    Failed(Fault),
}

/// The per-process interpreter state.
#[derive(Debug)]
pub(crate) struct VmState {
    pub work_queue: Vec<WorkFrame>,
    pub eval_stack: Vec<Value>,
    pub activation_stack: Vec<ActivationId>,
    pub current_activation: Option<ActivationId>,
    pub current_receiver: Value,
    pub should_yield: bool,
    pub last_result: Value,
}

impl Default for VmState {
    fn default() -> Self {
        Self {
            work_queue: Vec::new(),
            eval_stack: Vec::new(),
            activation_stack: Vec::new(),
            current_activation: None,
            current_receiver: Value::Nil,
            should_yield: false,
            last_result: Value::Nil,
        }
    }
}

impl VmState {
    pub fn push_value(&mut self, value: Value) {
        self.eval_stack.push(value);
    }

    pub fn pop_value(&mut self) -> RunResult<Value> {
        self.eval_stack
            .pop()
            .ok_or_else(|| RunError::internal("eval stack underflow"))
    }

    /// Pops `count` values, restoring source order.
    pub fn pop_args(&mut self, count: usize) -> RunResult<SmallVec<[Value; 4]>> {
        if self.eval_stack.len() < count {
            return Err(RunError::internal("eval stack underflow popping arguments"));
        }
        let at = self.eval_stack.len() - count;
        Ok(self.eval_stack.drain(at..).collect())
    }
}
