//! Public value API.
//!
//! Hosts and tests never see the interpreter's internal `Value`/heap types;
//! results cross the boundary as [`Object`], a deep conversion taken when an
//! eval entry point returns.

use crate::{heap::HeapData, run::Interp, value::Value};

/// A Smalt value as seen by the embedding host.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    Array(Vec<Object>),
    /// Entries in insertion order.
    Table(Vec<(Object, Object)>),
    /// A closure; opaque outside the interpreter.
    Block,
    /// A class, by name.
    Class(String),
    /// An instance, by class name.
    Instance(String),
    Process { pid: i64 },
    Monitor,
    Semaphore,
    SharedQueue,
}

impl Object {
    /// Unwraps an Int, for terse assertions in host code.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Conversion depth cap; self-referential collections terminate as `Nil`.
const MAX_OBJECT_DEPTH: usize = 16;

impl Interp {
    pub(crate) fn to_object(&mut self, value: Value) -> Object {
        self.to_object_depth(value, MAX_OBJECT_DEPTH)
    }

    /// Converts a host value into an interpreter value. Opaque objects
    /// (blocks, classes, instances, processes, sync primitives) cannot be
    /// built from outside and come back as `None`.
    pub(crate) fn from_object(&mut self, object: &Object) -> Option<Value> {
        Some(match object {
            Object::Nil => Value::Nil,
            Object::Bool(b) => Value::Bool(*b),
            Object::Int(i) => Value::Int(*i),
            Object::Float(f) => Value::Float(*f),
            Object::Str(s) => {
                let s = s.clone();
                self.heap.alloc_str(s)
            }
            Object::Symbol(name) => Value::Symbol(self.interns.intern(name)),
            Object::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.from_object(item)?);
                }
                self.heap.alloc_array(values)
            }
            Object::Table(entries) => {
                let mut table = indexmap::IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.from_object(key)?;
                    let key = self.heap.table_key(key).ok()?;
                    let value = self.from_object(value)?;
                    table.insert(key, value);
                }
                Value::Ref(self.heap.alloc(HeapData::Table(table)))
            }
            _ => return None,
        })
    }

    fn to_object_depth(&mut self, value: Value, depth: usize) -> Object {
        if depth == 0 {
            return Object::Nil;
        }
        match value {
            Value::Nil => Object::Nil,
            Value::Bool(b) => Object::Bool(b),
            Value::Int(i) => Object::Int(i),
            Value::Float(f) => Object::Float(f),
            Value::Symbol(sym) => Object::Symbol(self.interns.get(sym).to_owned()),
            Value::Class(class) => Object::Class(self.classes.get(class).display_name().to_owned()),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => Object::Str(s.clone()),
                HeapData::Array(items) => {
                    let items = items.clone();
                    Object::Array(items.into_iter().map(|item| self.to_object_depth(item, depth - 1)).collect())
                }
                HeapData::Table(entries) => {
                    let entries: Vec<_> = entries.iter().map(|(k, &v)| (k.clone(), v)).collect();
                    Object::Table(
                        entries
                            .into_iter()
                            .map(|(key, value)| {
                                let key = self.heap.key_value(&key);
                                let key = self.to_object_depth(key, depth - 1);
                                (key, self.to_object_depth(value, depth - 1))
                            })
                            .collect(),
                    )
                }
                HeapData::Closure(_) => Object::Block,
                HeapData::Cell(_) => Object::Nil,
                HeapData::Instance(instance) => {
                    Object::Instance(self.classes.get(instance.class).display_name().to_owned())
                }
                HeapData::Monitor(_) => Object::Monitor,
                HeapData::Semaphore(_) => Object::Semaphore,
                HeapData::SharedQueue(_) => Object::SharedQueue,
                HeapData::Process(pid) => Object::Process { pid: pid.index() as i64 },
                HeapData::Proxy { class, .. } => {
                    Object::Instance(self.classes.get(*class).display_name().to_owned())
                }
            },
        }
    }
}
