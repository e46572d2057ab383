//! Native method implementations.
//!
//! Each kernel method that cannot (or should not) be written in Smalt is a
//! variant of [`NativeMethod`], dispatched through a single `match`. Natives
//! come in the two shapes the method interface defines:
//!
//! * **plain** — `(receiver, args) -> value`, with access to the heap,
//!   interns, class registry, and output writer through [`NativeCtx`];
//! * **vm** — `(interpreter, vm, receiver, args) -> flow`, the re-entry shape
//!   used by process, scheduler, and sync-primitive natives that push frames,
//!   block the calling process, or step other processes.
//!
//! The `strum` serialize string of a variant is its `<primitive: #…>` name.

mod classes;
mod collections;
mod numbers;
mod objects;
mod processes;
mod strings;

use strum::{EnumString, IntoStaticStr};

pub(crate) use processes::monitor_release;

use crate::{
    ast::{AstArena, Templates},
    class::{Classes, Kernel},
    fault::{RunError, RunResult},
    frame::VmState,
    heap::Heap,
    intern::Interns,
    io::PrintWriter,
    run::Interp,
    value::Value,
};

/// What a vm-shape native asks the driver loop to do next.
#[derive(Debug)]
pub(crate) enum NativeFlow {
    /// Push this value as the send's result.
    Value(Value),
    /// Frames were pushed; the result will arrive through them.
    Scheduled,
    /// The calling process must block; the send was rewound one step and
    /// will re-execute on wake.
    Blocked,
}

/// Shared state handed to plain natives.
pub(crate) struct NativeCtx<'a> {
    pub heap: &'a mut Heap,
    pub interns: &'a mut Interns,
    pub classes: &'a mut Classes,
    pub kernel: Kernel,
    pub ast: &'a mut AstArena,
    pub templates: &'a mut Templates,
    pub print: &'a mut dyn PrintWriter,
}

/// Every native routine the kernel registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
pub(crate) enum NativeMethod {
    // Object behavior.
    #[strum(serialize = "objectEq")]
    ObjEq,
    #[strum(serialize = "objectIdentical")]
    ObjIdentical,
    #[strum(serialize = "objectClass")]
    ObjClass,
    #[strum(serialize = "objectPrintString")]
    ObjPrintString,
    #[strum(serialize = "objectPrintNl")]
    ObjPrintNl,
    #[strum(serialize = "objectError")]
    ObjError,
    #[strum(serialize = "objectRespondsTo")]
    ObjRespondsTo,
    #[strum(serialize = "objectIsKindOf")]
    ObjIsKindOf,

    // Numbers.
    #[strum(serialize = "numberAdd")]
    NumAdd,
    #[strum(serialize = "numberSub")]
    NumSub,
    #[strum(serialize = "numberMul")]
    NumMul,
    #[strum(serialize = "numberDiv")]
    NumDiv,
    #[strum(serialize = "integerFloorDiv")]
    IntFloorDiv,
    #[strum(serialize = "integerMod")]
    IntMod,
    #[strum(serialize = "magnitudeLt")]
    ValLt,
    #[strum(serialize = "magnitudeGt")]
    ValGt,
    #[strum(serialize = "magnitudeLe")]
    ValLe,
    #[strum(serialize = "magnitudeGe")]
    ValGe,
    #[strum(serialize = "numberAsFloat")]
    NumAsFloat,
    #[strum(serialize = "numberTruncated")]
    NumTruncated,

    // Strings and symbols.
    #[strum(serialize = "stringComma")]
    StrComma,
    #[strum(serialize = "stringSize")]
    StrSize,
    #[strum(serialize = "stringAt")]
    StrAt,
    #[strum(serialize = "stringCopyFromTo")]
    StrCopyFromTo,
    #[strum(serialize = "stringAsSymbol")]
    StrAsSymbol,
    #[strum(serialize = "stringAsString")]
    StrAsString,
    #[strum(serialize = "symbolAsString")]
    SymAsString,

    // Arrays, tables, blocks.
    #[strum(serialize = "arrayNew")]
    ArrayNew,
    #[strum(serialize = "arrayNewSized")]
    ArrayNewSized,
    #[strum(serialize = "arraySize")]
    ArraySize,
    #[strum(serialize = "arrayAt")]
    ArrayAt,
    #[strum(serialize = "arrayAtPut")]
    ArrayAtPut,
    #[strum(serialize = "arrayAdd")]
    ArrayAdd,
    #[strum(serialize = "arrayComma")]
    ArrayComma,
    #[strum(serialize = "arrayCopyFromTo")]
    ArrayCopyFromTo,
    #[strum(serialize = "tableNew")]
    TableNew,
    #[strum(serialize = "tableSize")]
    TableSize,
    #[strum(serialize = "tableAt")]
    TableAt,
    #[strum(serialize = "tableAtPut")]
    TableAtPut,
    #[strum(serialize = "tableIncludesKey")]
    TableIncludesKey,
    #[strum(serialize = "tableRemoveKey")]
    TableRemoveKey,
    #[strum(serialize = "tableKeys")]
    TableKeys,
    #[strum(serialize = "blockNumArgs")]
    BlockNumArgs,

    // Class construction and reflection.
    #[strum(serialize = "classNew")]
    ClassNew,
    #[strum(serialize = "classDerive")]
    ClassDerive,
    #[strum(serialize = "classDeriveSlots")]
    ClassDeriveSlots,
    #[strum(serialize = "classSelectorPut")]
    ClassSelectorPut,
    #[strum(serialize = "classClassSelectorPut")]
    ClassClassSelectorPut,
    #[strum(serialize = "classAddParent")]
    ClassAddParent,
    #[strum(serialize = "className")]
    ClassName,
    #[strum(serialize = "classTags")]
    ClassTags,
    #[strum(serialize = "classTag")]
    ClassTag,
    #[strum(serialize = "exceptionSignal")]
    ExcSignal,
    #[strum(serialize = "monitorNew")]
    MonitorNew,
    #[strum(serialize = "semaphoreNew")]
    SemaphoreNew,
    #[strum(serialize = "semaphoreNewCount")]
    SemaphoreNewCount,
    #[strum(serialize = "sharedQueueNew")]
    QueueNew,

    // Processes, scheduler, synchronization (vm shape).
    #[strum(serialize = "processorFork")]
    ProcessorFork,
    #[strum(serialize = "processorYield")]
    ProcessorYield,
    #[strum(serialize = "processorActiveProcess")]
    ProcessorActive,
    #[strum(serialize = "schedulerStep")]
    SchedulerStep,
    #[strum(serialize = "schedulerRunToCompletion")]
    SchedulerRun,
    #[strum(serialize = "processState")]
    ProcState,
    #[strum(serialize = "processPid")]
    ProcPid,
    #[strum(serialize = "processName")]
    ProcName,
    #[strum(serialize = "processNamePut")]
    ProcNamePut,
    #[strum(serialize = "processPriority")]
    ProcPriority,
    #[strum(serialize = "processPriorityPut")]
    ProcPriorityPut,
    #[strum(serialize = "processSuspend")]
    ProcSuspend,
    #[strum(serialize = "processResume")]
    ProcResume,
    #[strum(serialize = "processTerminate")]
    ProcTerminate,
    #[strum(serialize = "monitorCritical")]
    MonitorCritical,
    #[strum(serialize = "semaphoreWait")]
    SemWait,
    #[strum(serialize = "semaphoreSignal")]
    SemSignal,
    #[strum(serialize = "sharedQueuePut")]
    QueuePut,
    #[strum(serialize = "sharedQueueGet")]
    QueueGet,
    #[strum(serialize = "tableAtIfAbsent")]
    TableAtIfAbsent,
}

impl NativeMethod {
    /// True for the shape that takes the interpreter handle — the re-entry
    /// path used by anything that touches the scheduler or pushes frames.
    pub fn has_interpreter_param(self) -> bool {
        matches!(
            self,
            Self::ProcessorFork
                | Self::ProcessorYield
                | Self::ProcessorActive
                | Self::SchedulerStep
                | Self::SchedulerRun
                | Self::ProcState
                | Self::ProcPid
                | Self::ProcName
                | Self::ProcNamePut
                | Self::ProcPriority
                | Self::ProcPriorityPut
                | Self::ProcSuspend
                | Self::ProcResume
                | Self::ProcTerminate
                | Self::MonitorCritical
                | Self::SemWait
                | Self::SemSignal
                | Self::QueuePut
                | Self::QueueGet
                | Self::TableAtIfAbsent
        )
    }

    pub fn call_plain(self, ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
        match self {
            Self::ObjEq => objects::obj_eq(ctx, recv, args),
            Self::ObjIdentical => objects::obj_identical(ctx, recv, args),
            Self::ObjClass => objects::obj_class(ctx, recv, args),
            Self::ObjPrintString => objects::obj_print_string(ctx, recv, args),
            Self::ObjPrintNl => objects::obj_print_nl(ctx, recv, args),
            Self::ObjError => objects::obj_error(ctx, recv, args),
            Self::ObjRespondsTo => objects::obj_responds_to(ctx, recv, args),
            Self::ObjIsKindOf => objects::obj_is_kind_of(ctx, recv, args),

            Self::NumAdd => numbers::add(ctx, recv, args),
            Self::NumSub => numbers::sub(ctx, recv, args),
            Self::NumMul => numbers::mul(ctx, recv, args),
            Self::NumDiv => numbers::div(ctx, recv, args),
            Self::IntFloorDiv => numbers::floor_div(ctx, recv, args),
            Self::IntMod => numbers::modulo(ctx, recv, args),
            Self::ValLt => numbers::compare(ctx, recv, args, |o| o.is_lt()),
            Self::ValGt => numbers::compare(ctx, recv, args, |o| o.is_gt()),
            Self::ValLe => numbers::compare(ctx, recv, args, |o| o.is_le()),
            Self::ValGe => numbers::compare(ctx, recv, args, |o| o.is_ge()),
            Self::NumAsFloat => numbers::as_float(ctx, recv, args),
            Self::NumTruncated => numbers::truncated(ctx, recv, args),

            Self::StrComma => strings::comma(ctx, recv, args),
            Self::StrSize => strings::size(ctx, recv, args),
            Self::StrAt => strings::at(ctx, recv, args),
            Self::StrCopyFromTo => strings::copy_from_to(ctx, recv, args),
            Self::StrAsSymbol => strings::as_symbol(ctx, recv, args),
            Self::StrAsString => strings::as_string(ctx, recv, args),
            Self::SymAsString => strings::sym_as_string(ctx, recv, args),

            Self::ArrayNew => collections::array_new(ctx, recv, args),
            Self::ArrayNewSized => collections::array_new_sized(ctx, recv, args),
            Self::ArraySize => collections::array_size(ctx, recv, args),
            Self::ArrayAt => collections::array_at(ctx, recv, args),
            Self::ArrayAtPut => collections::array_at_put(ctx, recv, args),
            Self::ArrayAdd => collections::array_add(ctx, recv, args),
            Self::ArrayComma => collections::array_comma(ctx, recv, args),
            Self::ArrayCopyFromTo => collections::array_copy_from_to(ctx, recv, args),
            Self::TableNew => collections::table_new(ctx, recv, args),
            Self::TableSize => collections::table_size(ctx, recv, args),
            Self::TableAt => collections::table_at(ctx, recv, args),
            Self::TableAtPut => collections::table_at_put(ctx, recv, args),
            Self::TableIncludesKey => collections::table_includes_key(ctx, recv, args),
            Self::TableRemoveKey => collections::table_remove_key(ctx, recv, args),
            Self::TableKeys => collections::table_keys(ctx, recv, args),
            Self::BlockNumArgs => collections::block_num_args(ctx, recv, args),

            Self::ClassNew => classes::class_new(ctx, recv, args),
            Self::ClassDerive => classes::derive(ctx, recv, args),
            Self::ClassDeriveSlots => classes::derive_slots(ctx, recv, args),
            Self::ClassSelectorPut => classes::selector_put(ctx, recv, args, false),
            Self::ClassClassSelectorPut => classes::selector_put(ctx, recv, args, true),
            Self::ClassAddParent => classes::add_parent(ctx, recv, args),
            Self::ClassName => classes::class_name(ctx, recv, args),
            Self::ClassTags => classes::class_tags(ctx, recv, args),
            Self::ClassTag => classes::class_tag(ctx, recv, args),
            Self::ExcSignal => classes::exception_signal(ctx, recv, args),
            Self::MonitorNew => classes::monitor_new(ctx, recv, args),
            Self::SemaphoreNew => classes::semaphore_new(ctx, recv, args),
            Self::SemaphoreNewCount => classes::semaphore_new_count(ctx, recv, args),
            Self::QueueNew => classes::queue_new(ctx, recv, args),

            _ => Err(RunError::internal(format!(
                "native {} requires the interpreter parameter",
                <&'static str>::from(self)
            ))),
        }
    }

    pub fn call_vm(
        self,
        interp: &mut Interp,
        vm: &mut VmState,
        recv: Value,
        args: &[Value],
    ) -> RunResult<NativeFlow> {
        match self {
            Self::ProcessorFork => processes::fork(interp, vm, recv, args),
            Self::ProcessorYield => processes::yield_now(interp, vm, recv, args),
            Self::ProcessorActive => processes::active_process(interp, vm, recv, args),
            Self::SchedulerStep => processes::scheduler_step(interp, vm, recv, args),
            Self::SchedulerRun => processes::scheduler_run(interp, vm, recv, args),
            Self::ProcState => processes::state(interp, vm, recv, args),
            Self::ProcPid => processes::pid(interp, vm, recv, args),
            Self::ProcName => processes::name(interp, vm, recv, args),
            Self::ProcNamePut => processes::name_put(interp, vm, recv, args),
            Self::ProcPriority => processes::priority(interp, vm, recv, args),
            Self::ProcPriorityPut => processes::priority_put(interp, vm, recv, args),
            Self::ProcSuspend => processes::suspend(interp, vm, recv, args),
            Self::ProcResume => processes::resume(interp, vm, recv, args),
            Self::ProcTerminate => processes::terminate(interp, vm, recv, args),
            Self::MonitorCritical => processes::monitor_critical(interp, vm, recv, args),
            Self::SemWait => processes::semaphore_wait(interp, vm, recv, args),
            Self::SemSignal => processes::semaphore_signal(interp, vm, recv, args),
            Self::QueuePut => processes::queue_put(interp, vm, recv, args),
            Self::QueueGet => processes::queue_get(interp, vm, recv, args),
            Self::TableAtIfAbsent => processes::table_at_if_absent(interp, vm, recv, args),
            _ => Err(RunError::internal(format!(
                "native {} does not take the interpreter parameter",
                <&'static str>::from(self)
            ))),
        }
    }
}

/// Fetches a required argument, guarding against registration mistakes.
pub(crate) fn arg(args: &[Value], index: usize) -> RunResult<Value> {
    args.get(index)
        .copied()
        .ok_or_else(|| RunError::internal("native called with too few arguments"))
}
