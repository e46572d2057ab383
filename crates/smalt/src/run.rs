//! Public interface for running Smalt code.
//!
//! [`Interp`] owns the whole runtime: heap, interns, class registry, AST and
//! template arenas, activation arena, globals, and the process scheduler.
//! Construction runs a single bootstrap phase — kernel classes, native
//! methods, the `Processor` and `Scheduler` globals — and then loads the
//! in-language prelude through the ordinary eval entry point, before any
//! user code runs.

use indexmap::IndexMap;

use crate::{
    ast::{AstArena, Templates},
    class::{Classes, Kernel, MethodImp},
    fault::{Fault, RunError},
    frame::{SendMode, VmOutcome, VmState, WorkFrame},
    heap::{Heap, HeapData, Instance},
    intern::{Interns, StaticNames, SymbolId},
    io::{PrintWriter, StdPrint},
    natives::NativeMethod,
    object::Object,
    parse::parse_program,
    scheduler::{Pid, ProcessState, Scheduler},
    value::Value,
};

/// The standard library written in Smalt itself, evaluated at bootstrap.
const PRELUDE: &str = include_str!("prelude.smalt");

/// A complete Smalt interpreter instance.
///
/// # Example
/// ```
/// use smalt::Interp;
///
/// let mut interp = Interp::new();
/// let result = interp.doit("3 + 4").unwrap();
/// assert_eq!(result, smalt::Object::Int(7));
/// ```
#[derive(Debug)]
pub struct Interp {
    pub(crate) heap: Heap,
    pub(crate) interns: Interns,
    pub(crate) classes: Classes,
    pub(crate) kernel: Kernel,
    pub(crate) ast: AstArena,
    pub(crate) templates: Templates,
    pub(crate) activations: crate::activation::Activations,
    pub(crate) globals: IndexMap<SymbolId, Value>,
    pub(crate) sched: Scheduler,
    pub(crate) step_depth: u32,
    pub(crate) print: Box<dyn PrintWriter>,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    /// Bound on `Scheduler step` re-entry through native code.
    pub(crate) const MAX_STEP_DEPTH: u32 = 64;

    /// Builds an interpreter printing to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_print(Box::new(StdPrint))
    }

    /// Builds an interpreter with a custom output writer.
    #[must_use]
    pub fn with_print(print: Box<dyn PrintWriter>) -> Self {
        let mut interns = Interns::new();
        let mut classes = Classes::default();
        let kernel = bootstrap_classes(&mut classes, &mut interns);
        let mut interp = Self {
            heap: Heap::default(),
            interns,
            classes,
            kernel,
            ast: AstArena::default(),
            templates: Templates::default(),
            activations: crate::activation::Activations::default(),
            globals: IndexMap::new(),
            sched: Scheduler::new(),
            step_depth: 0,
            print,
        };
        interp.bootstrap_natives();
        interp.bootstrap_globals();
        if let Err(fault) = interp.eval_statements(PRELUDE) {
            unreachable!("prelude failed to load: {fault}");
        }
        interp
    }

    /// Makes every message send a yield point. Off by default to keep
    /// interleaving deterministic.
    pub fn set_yield_on_send(&mut self, on: bool) {
        self.sched.yield_on_send = on;
    }

    /// Drains buffered output from a collecting print writer, if one was
    /// installed with [`Interp::with_print`].
    pub fn take_print_output(&mut self) -> Option<String> {
        self.print.take_output()
    }

    /// Reads a global by name.
    pub fn global(&mut self, name: &str) -> Option<Object> {
        let sym = self.interns.lookup(name)?;
        let value = *self.globals.get(&sym)?;
        Some(self.to_object(value))
    }

    /// Binds a global by name. Only data values can cross the boundary;
    /// opaque objects (blocks, instances, processes) are rejected.
    pub fn set_global_value(&mut self, name: &str, object: &Object) -> bool {
        let Some(value) = self.from_object(object) else {
            return false;
        };
        let sym = self.interns.intern(name);
        self.set_global(sym, value);
        true
    }

    /// Evaluates source text and returns one value per top-level statement.
    ///
    /// The program runs as the main process; forked processes that are still
    /// ready when it finishes are driven until the ready queue drains.
    /// A deadlock while the main process is blocked is a scheduler fault.
    pub fn eval_statements(&mut self, source: &str) -> Result<Vec<Object>, Fault> {
        let statements = self.parse(source)?;
        let mut vm = VmState::default();
        for &statement in statements.iter().rev() {
            vm.work_queue.push(WorkFrame::EvalNode(statement));
        }
        self.run_main(vm)?;
        self.drain_ready();
        let main = self.sched.main;
        let values = match &self.sched.get(main).vm {
            Some(vm) => vm.eval_stack.clone(),
            None => Vec::new(),
        };
        Ok(values.into_iter().map(|value| self.to_object(value)).collect())
    }

    /// Evaluates source text and returns only the last value.
    pub fn doit(&mut self, source: &str) -> Result<Object, Fault> {
        Ok(self.eval_statements(source)?.pop().unwrap_or(Object::Nil))
    }

    /// Runs a script: shebang stripped, and when the whole file is a single
    /// block literal, that block is applied with `self = nil` so a `^` in it
    /// terminates the script with the returned value.
    pub fn run_script(&mut self, source: &str) -> Result<Object, Fault> {
        let statements = self.parse(source)?;
        let mut vm = VmState::default();
        let wraps = statements.len() == 1
            && matches!(self.ast.get(statements[0]), crate::ast::Node::Block(_));
        if wraps {
            vm.work_queue.push(WorkFrame::SendMessage {
                selector: StaticNames::Value.sym(),
                argc: 0,
                mode: SendMode::Normal,
            });
            vm.work_queue.push(WorkFrame::EvalNode(statements[0]));
        } else {
            for &statement in statements.iter().rev() {
                vm.work_queue.push(WorkFrame::EvalNode(statement));
            }
        }
        self.run_main(vm)?;
        self.drain_ready();
        let main = self.sched.main;
        let proc = self.sched.get(main);
        let last = proc.vm.as_ref().map_or(proc.result, |vm| vm.last_result);
        Ok(self.to_object(last))
    }

    fn parse(&mut self, source: &str) -> Result<Vec<crate::ast::NodeId>, Fault> {
        let source = strip_shebang(source);
        parse_program(source, &mut self.interns, &mut self.ast, &mut self.templates)
            .map_err(|err| err.into_fault(Vec::new()))
    }

    /// Installs `vm` as the main process's state and steps the scheduler
    /// until the main process terminates.
    fn run_main(&mut self, vm: VmState) -> Result<(), Fault> {
        let main = self.sched.main;
        {
            let proc = self.sched.get_mut(main);
            proc.state = ProcessState::Ready;
            proc.fault = None;
            proc.result = Value::Nil;
            proc.vm = Some(Box::new(vm));
        }
        self.sched.requeue(main);
        loop {
            if self.sched.get(main).state == ProcessState::Terminated {
                break;
            }
            if !self.step_once() {
                if self.sched.any_blocked() {
                    return Err(RunError::scheduler(
                        "deadlock: every process is blocked with no possible wake-up",
                    )
                    .into_fault(Vec::new()));
                }
                return Err(RunError::scheduler("main process stalled with nothing to run")
                    .into_fault(Vec::new()));
            }
        }
        if let Some(fault) = self.sched.get_mut(main).fault.take() {
            return Err(fault);
        }
        Ok(())
    }

    /// Steps forked processes that are still ready after the main program
    /// finished. Processes blocked forever are left blocked; only an eval
    /// that *needs* them reports deadlock.
    fn drain_ready(&mut self) {
        while self.step_once() {}
    }

    /// Runs one ready process until it yields, blocks, terminates, or fails.
    /// Returns false when nothing was ready.
    pub(crate) fn step_once(&mut self) -> bool {
        let Some(pid) = self.sched.next_ready() else {
            return false;
        };
        let Some(mut vm) = self.sched.get_mut(pid).vm.take() else {
            return false;
        };
        self.sched.get_mut(pid).state = ProcessState::Running;
        let previous = self.sched.active.replace(pid);
        let outcome = self.run_vm(&mut vm);
        self.sched.active = previous;
        self.settle(pid, vm, outcome);
        true
    }

    /// Applies a step outcome to the process table. A native may already
    /// have moved the process out of `Running` (self-terminate, suspend);
    /// those states win over the default transition.
    fn settle(&mut self, pid: Pid, vm: Box<VmState>, outcome: VmOutcome) {
        let interrupted = self.sched.get(pid).state != ProcessState::Running;
        match outcome {
            VmOutcome::Completed(value) => {
                let proc = self.sched.get_mut(pid);
                proc.result = value;
                proc.vm = Some(vm);
                if !interrupted {
                    proc.state = ProcessState::Terminated;
                }
            }
            VmOutcome::Yielded => {
                let proc = self.sched.get_mut(pid);
                match proc.state {
                    ProcessState::Running => {
                        proc.state = ProcessState::Ready;
                        proc.vm = Some(vm);
                        self.sched.requeue(pid);
                    }
                    // Explicitly terminated mid-step: the VM state is gone.
                    ProcessState::Terminated => {}
                    _ => proc.vm = Some(vm),
                }
            }
            VmOutcome::Blocked => {
                let proc = self.sched.get_mut(pid);
                proc.vm = Some(vm);
                if !interrupted {
                    proc.state = ProcessState::Blocked;
                }
            }
            VmOutcome::Failed(fault) => {
                let proc = self.sched.get_mut(pid);
                proc.fault = Some(fault);
                proc.vm = Some(vm);
                proc.state = ProcessState::Terminated;
            }
        }
    }

    // --- bootstrap ---

    fn bootstrap_natives(&mut self) {
        use NativeMethod as N;
        use StaticNames as S;
        let k = self.kernel;

        let object_instance = [
            (S::Eq, N::ObjEq),
            (S::Identical, N::ObjIdentical),
            (S::Class, N::ObjClass),
            (S::PrintString, N::ObjPrintString),
            (S::PrintNl, N::ObjPrintNl),
            (S::ErrorSignal, N::ObjError),
            (S::RespondsTo, N::ObjRespondsTo),
            (S::IsKindOf, N::ObjIsKindOf),
        ];
        for (selector, native) in object_instance {
            self.install(k.object, selector, native, false);
        }
        let object_class_side = [
            (S::New, N::ClassNew),
            (S::Derive, N::ClassDerive),
            (S::DeriveSlots, N::ClassDeriveSlots),
            (S::SelectorPut, N::ClassSelectorPut),
            (S::ClassSelectorPut, N::ClassClassSelectorPut),
            (S::AddParent, N::ClassAddParent),
            (S::Name, N::ClassName),
            (S::Tags, N::ClassTags),
            (S::Tag, N::ClassTag),
            (S::Eq, N::ObjEq),
            (S::Identical, N::ObjIdentical),
            (S::Class, N::ObjClass),
            (S::PrintString, N::ObjPrintString),
            (S::PrintNl, N::ObjPrintNl),
            (S::ErrorSignal, N::ObjError),
            (S::RespondsTo, N::ObjRespondsTo),
            (S::IsKindOf, N::ObjIsKindOf),
        ];
        for (selector, native) in object_class_side {
            self.install(k.object, selector, native, true);
        }

        let number = [
            (S::Plus, N::NumAdd),
            (S::Minus, N::NumSub),
            (S::Star, N::NumMul),
            (S::Slash, N::NumDiv),
            (S::Lt, N::ValLt),
            (S::Gt, N::ValGt),
            (S::Le, N::ValLe),
            (S::Ge, N::ValGe),
            (S::AsFloat, N::NumAsFloat),
            (S::Truncated, N::NumTruncated),
        ];
        for (selector, native) in number {
            self.install(k.number, selector, native, false);
        }
        self.install(k.integer, S::SlashSlash, N::IntFloorDiv, false);
        self.install(k.integer, S::Backslash, N::IntMod, false);

        for (selector, native) in [(S::Lt, N::ValLt), (S::Gt, N::ValGt), (S::Le, N::ValLe), (S::Ge, N::ValGe)] {
            self.install(k.string, selector, native, false);
            self.install(k.symbol, selector, native, false);
        }
        self.install(k.symbol, S::AsString, N::SymAsString, false);

        self.install(k.array, S::New, N::ArrayNew, true);
        self.install(k.array, S::NewSized, N::ArrayNewSized, true);
        let array = [
            (S::Size, N::ArraySize),
            (S::At, N::ArrayAt),
            (S::AtPut, N::ArrayAtPut),
            (S::Add, N::ArrayAdd),
            (S::Comma, N::ArrayComma),
            (S::CopyFromTo, N::ArrayCopyFromTo),
        ];
        for (selector, native) in array {
            self.install(k.array, selector, native, false);
        }

        self.install(k.table, S::New, N::TableNew, true);
        let table = [
            (S::Size, N::TableSize),
            (S::At, N::TableAt),
            (S::AtPut, N::TableAtPut),
            (S::AtIfAbsent, N::TableAtIfAbsent),
            (S::IncludesKey, N::TableIncludesKey),
            (S::RemoveKey, N::TableRemoveKey),
            (S::Keys, N::TableKeys),
        ];
        for (selector, native) in table {
            self.install(k.table, selector, native, false);
        }

        self.install(k.block, S::NumArgs, N::BlockNumArgs, false);
        self.install(k.exception, S::SignalMessage, N::ExcSignal, true);

        let process = [
            (S::State, N::ProcState),
            (S::PidSel, N::ProcPid),
            (S::Name, N::ProcName),
            (S::NamePut, N::ProcNamePut),
            (S::Priority, N::ProcPriority),
            (S::PriorityPut, N::ProcPriorityPut),
            (S::Suspend, N::ProcSuspend),
            (S::Resume, N::ProcResume),
            (S::Terminate, N::ProcTerminate),
        ];
        for (selector, native) in process {
            self.install(k.process, selector, native, false);
        }

        self.install(k.monitor, S::New, N::MonitorNew, true);
        self.install(k.monitor, S::Critical, N::MonitorCritical, false);
        self.install(k.semaphore, S::New, N::SemaphoreNew, true);
        self.install(k.semaphore, S::NewSized, N::SemaphoreNewCount, true);
        self.install(k.semaphore, S::Wait, N::SemWait, false);
        self.install(k.semaphore, S::Signal, N::SemSignal, false);
        self.install(k.shared_queue, S::New, N::QueueNew, true);
        self.install(k.shared_queue, S::Put, N::QueuePut, false);
        self.install(k.shared_queue, S::Get, N::QueueGet, false);

        self.install(k.processor, S::Fork, N::ProcessorFork, false);
        self.install(k.processor, S::Yield, N::ProcessorYield, false);
        self.install(k.processor, S::ActiveProcess, N::ProcessorActive, false);
        self.install(k.scheduler, S::Step, N::SchedulerStep, false);
        self.install(k.scheduler, S::RunToCompletion, N::SchedulerRun, false);
    }

    fn install(&mut self, class: crate::class::ClassId, selector: StaticNames, native: NativeMethod, class_side: bool) {
        self.classes
            .install_method(class, selector.sym(), MethodImp::Native(native), class_side, &self.interns)
            .expect("kernel method installation cannot conflict");
    }

    fn bootstrap_globals(&mut self) {
        let k = self.kernel;
        let class_globals = [
            ("Object", k.object),
            ("UndefinedObject", k.undefined_object),
            ("Boolean", k.boolean),
            ("Number", k.number),
            ("Integer", k.integer),
            ("Float", k.float),
            ("String", k.string),
            ("Symbol", k.symbol),
            ("Array", k.array),
            ("Table", k.table),
            ("Block", k.block),
            ("Exception", k.exception),
            ("Message", k.message),
            ("Process", k.process),
            ("Monitor", k.monitor),
            ("Semaphore", k.semaphore),
            ("SharedQueue", k.shared_queue),
        ];
        for (name, class) in class_globals {
            let sym = self.interns.intern(name);
            self.globals.insert(sym, Value::Class(class));
        }
        // Processor and Scheduler are singleton instances, not classes.
        let processor = Value::Ref(self.heap.alloc(HeapData::Instance(Instance {
            class: k.processor,
            slots: smallvec::SmallVec::new(),
        })));
        let sym = self.interns.intern("Processor");
        self.globals.insert(sym, processor);
        let scheduler = Value::Ref(self.heap.alloc(HeapData::Instance(Instance {
            class: k.scheduler,
            slots: smallvec::SmallVec::new(),
        })));
        let sym = self.interns.intern("Scheduler");
        self.globals.insert(sym, scheduler);
    }
}

/// Builds the kernel class graph. Order fixes the registry ids recorded in
/// [`Kernel`].
fn bootstrap_classes(classes: &mut Classes, interns: &mut Interns) -> Kernel {
    let mut class = |name: &str, parents: Vec<crate::class::ClassId>, slots: Vec<SymbolId>| {
        classes
            .new_class(Some(name), parents, slots, interns)
            .expect("kernel classes cannot conflict")
    };
    let object = class("Object", vec![], vec![]);
    let undefined_object = class("UndefinedObject", vec![object], vec![]);
    let boolean = class("Boolean", vec![object], vec![]);
    let number = class("Number", vec![object], vec![]);
    let integer = class("Integer", vec![number], vec![]);
    let float = class("Float", vec![number], vec![]);
    let string = class("String", vec![object], vec![]);
    let symbol = class("Symbol", vec![object], vec![]);
    let array = class("Array", vec![object], vec![]);
    let table = class("Table", vec![object], vec![]);
    let block = class("Block", vec![object], vec![]);
    let exception = class(
        "Exception",
        vec![object],
        vec![StaticNames::Message.sym(), StaticNames::Trace.sym()],
    );
    let message = class(
        "Message",
        vec![object],
        vec![StaticNames::Selector.sym(), StaticNames::Arguments.sym()],
    );
    let process = class("Process", vec![object], vec![]);
    let monitor = class("Monitor", vec![object], vec![]);
    let semaphore = class("Semaphore", vec![object], vec![]);
    let shared_queue = class("SharedQueue", vec![object], vec![]);
    let processor = class("Processor", vec![object], vec![]);
    let scheduler = class("Scheduler", vec![object], vec![]);

    // Reader accessors for the kernel instance shapes.
    let accessors = [
        (exception, StaticNames::Message.sym(), 0),
        (exception, StaticNames::Trace.sym(), 1),
        (message, StaticNames::Selector.sym(), 0),
        (message, StaticNames::Arguments.sym(), 1),
    ];
    for (class, selector, index) in accessors {
        classes
            .install_method(class, selector, MethodImp::SlotGet(index), false, interns)
            .expect("kernel accessors cannot conflict");
    }

    Kernel {
        object,
        undefined_object,
        boolean,
        number,
        integer,
        float,
        string,
        symbol,
        array,
        table,
        block,
        exception,
        message,
        process,
        monitor,
        semaphore,
        shared_queue,
        processor,
        scheduler,
    }
}

/// Script files may start with a shebang line, which the ingest layer strips
/// before parsing.
fn strip_shebang(source: &str) -> &str {
    if let Some(rest) = source.strip_prefix("#!") {
        match rest.find('\n') {
            Some(end) => &rest[end + 1..],
            None => "",
        }
    } else {
        source
    }
}
