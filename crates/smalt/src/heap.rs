//! Arena heap for compound values.
//!
//! Values reference heap payloads through a copyable [`HeapId`]; the arena
//! owns every payload for the lifetime of the interpreter. Garbage-collection
//! policy is out of scope for the core — the substrate is managed, reclaimed
//! wholesale when the interpreter is dropped — which makes cell identity a
//! plain id comparison and lets values stay `Copy`.

use std::collections::VecDeque;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    activation::ActivationId,
    ast::BlockTemplateId,
    class::ClassId,
    fault::{RunError, RunResult},
    intern::SymbolId,
    scheduler::Pid,
    value::Value,
};

/// Index of a payload in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(u32);

impl HeapId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A first-class closure: a block template plus everything the literal
/// captured when it was evaluated.
#[derive(Debug, Clone)]
pub(crate) struct Closure {
    pub template: BlockTemplateId,
    /// Shared mutable cells, one per captured name. Two closures created in
    /// the same scope hold the *same* cell ids for the names they share.
    pub captured: Vec<(SymbolId, HeapId)>,
    /// The activation current when the literal was evaluated; target scope
    /// of a `^` from within this block. `None` for top-level literals.
    pub home: Option<ActivationId>,
    /// Receiver snapshot taken at creation, so `self` keeps meaning the
    /// creator's receiver even after the home activation dies.
    pub home_receiver: Value,
    /// Class whose method table lexically encloses this block, for `super`.
    pub defining: Option<ClassId>,
}

/// An ordinary instance: a class plus one value per slot in the class's
/// merged slot layout.
#[derive(Debug, Clone)]
pub(crate) struct Instance {
    pub class: ClassId,
    pub slots: SmallVec<[Value; 4]>,
}

/// A reentrant mutual-exclusion region.
#[derive(Debug, Default)]
pub(crate) struct Monitor {
    pub owner: Option<Pid>,
    /// Reentrancy depth; the monitor unlocks when this drops back to zero.
    pub depth: u32,
    pub waiters: VecDeque<Pid>,
}

/// A counting semaphore.
#[derive(Debug, Default)]
pub(crate) struct Semaphore {
    pub count: i64,
    pub waiters: VecDeque<Pid>,
}

/// A FIFO queue whose `get` blocks until an element is available.
#[derive(Debug, Default)]
pub(crate) struct SharedQueue {
    pub items: VecDeque<Value>,
    pub waiters: VecDeque<Pid>,
}

/// A table key. Only values with structural equality can key a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TableKey {
    Nil,
    Bool(bool),
    Int(i64),
    /// Bit pattern, so `Float` keys hash consistently.
    Float(u64),
    Str(Box<str>),
    Symbol(SymbolId),
}

/// Heap payload variants. `Str` through `Table` are the payload-carrying
/// instance shapes; `Proxy` wraps an opaque native handle for host bridges.
#[derive(Debug)]
pub(crate) enum HeapData {
    Str(String),
    Array(Vec<Value>),
    Table(IndexMap<TableKey, Value>),
    Closure(Closure),
    Instance(Instance),
    /// A shared mutable box. Identity (the `HeapId`) is the invariant:
    /// closures that captured the same variable hold the same cell.
    Cell(Value),
    Monitor(Monitor),
    Semaphore(Semaphore),
    SharedQueue(SharedQueue),
    /// A process handle; the payload lives in the scheduler.
    Process(Pid),
    Proxy { class: ClassId, handle: u64 },
}

/// The arena itself.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    slots: Vec<HeapData>,
}

impl Heap {
    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.slots.len()).expect("heap overflow"));
        self.slots.push(data);
        id
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.slots[id.index()]
    }

    pub fn alloc_str(&mut self, s: impl Into<String>) -> Value {
        Value::Ref(self.alloc(HeapData::Str(s.into())))
    }

    pub fn alloc_array(&mut self, values: Vec<Value>) -> Value {
        Value::Ref(self.alloc(HeapData::Array(values)))
    }

    pub fn alloc_cell(&mut self, value: Value) -> HeapId {
        self.alloc(HeapData::Cell(value))
    }

    /// Reads through a cell.
    pub fn cell_get(&self, id: HeapId) -> Value {
        match self.get(id) {
            HeapData::Cell(v) => *v,
            other => unreachable!("cell id resolved to {other:?}"),
        }
    }

    /// Writes through a cell; visible to every closure sharing it.
    pub fn cell_set(&mut self, id: HeapId, value: Value) {
        match self.get_mut(id) {
            HeapData::Cell(v) => *v = value,
            other => unreachable!("cell id resolved to {other:?}"),
        }
    }

    /// Converts a value into a table key, rejecting identity-compared values.
    pub fn table_key(&self, value: Value) -> RunResult<TableKey> {
        Ok(match value {
            Value::Nil => TableKey::Nil,
            Value::Bool(b) => TableKey::Bool(b),
            Value::Int(i) => TableKey::Int(i),
            Value::Float(f) => TableKey::Float(f.to_bits()),
            Value::Symbol(s) => TableKey::Symbol(s),
            Value::Ref(id) => match self.get(id) {
                HeapData::Str(s) => TableKey::Str(s.as_str().into()),
                _ => return Err(RunError::value("only simple values can key a Table")),
            },
            Value::Class(_) => return Err(RunError::value("only simple values can key a Table")),
        })
    }

    /// Rebuilds a table key as a value, allocating for string keys.
    pub fn key_value(&mut self, key: &TableKey) -> Value {
        match key {
            TableKey::Nil => Value::Nil,
            TableKey::Bool(b) => Value::Bool(*b),
            TableKey::Int(i) => Value::Int(*i),
            TableKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            TableKey::Str(s) => self.alloc_str(s.as_ref()),
            TableKey::Symbol(s) => Value::Symbol(*s),
        }
    }
}
