//! Array, Table, and Block payload natives. Indexing is 1-based.

use indexmap::IndexMap;

use super::{NativeCtx, arg};
use crate::{
    fault::{RunError, RunResult},
    heap::{HeapData, HeapId},
    value::Value,
};

fn array_id(ctx: &NativeCtx<'_>, value: Value, what: &str) -> RunResult<HeapId> {
    if let Value::Ref(id) = value {
        if matches!(ctx.heap.get(id), HeapData::Array(_)) {
            return Ok(id);
        }
    }
    Err(RunError::value(format!("{what} expects an Array")))
}

fn table_id(ctx: &NativeCtx<'_>, value: Value, what: &str) -> RunResult<HeapId> {
    if let Value::Ref(id) = value {
        if matches!(ctx.heap.get(id), HeapData::Table(_)) {
            return Ok(id);
        }
    }
    Err(RunError::value(format!("{what} expects a Table")))
}

fn array_items<'a>(ctx: &'a NativeCtx<'_>, id: HeapId) -> &'a Vec<Value> {
    match ctx.heap.get(id) {
        HeapData::Array(items) => items,
        _ => unreachable!("checked by array_id"),
    }
}

fn check_index(index: i64, len: usize) -> RunResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i >= 1 && i <= len)
        .map(|i| i - 1)
        .ok_or_else(|| RunError::value(format!("index {index} out of bounds for size {len}")))
}

pub(super) fn array_new(ctx: &mut NativeCtx<'_>, _recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(ctx.heap.alloc_array(Vec::new()))
}

pub(super) fn array_new_sized(ctx: &mut NativeCtx<'_>, _recv: Value, args: &[Value]) -> RunResult<Value> {
    let len = arg(args, 0)?.as_int()?;
    let len = usize::try_from(len).map_err(|_| RunError::value("new: expects a non-negative size"))?;
    Ok(ctx.heap.alloc_array(vec![Value::Nil; len]))
}

pub(super) fn array_size(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let id = array_id(ctx, recv, "size")?;
    Ok(Value::Int(array_items(ctx, id).len() as i64))
}

pub(super) fn array_at(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = array_id(ctx, recv, "at:")?;
    let items = array_items(ctx, id);
    let index = check_index(arg(args, 0)?.as_int()?, items.len())?;
    Ok(items[index])
}

pub(super) fn array_at_put(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = array_id(ctx, recv, "at:put:")?;
    let value = arg(args, 1)?;
    let len = array_items(ctx, id).len();
    let index = check_index(arg(args, 0)?.as_int()?, len)?;
    match ctx.heap.get_mut(id) {
        HeapData::Array(items) => items[index] = value,
        _ => unreachable!("checked by array_id"),
    }
    Ok(value)
}

pub(super) fn array_add(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = array_id(ctx, recv, "add:")?;
    let value = arg(args, 0)?;
    match ctx.heap.get_mut(id) {
        HeapData::Array(items) => items.push(value),
        _ => unreachable!("checked by array_id"),
    }
    Ok(value)
}

pub(super) fn array_comma(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let left = array_id(ctx, recv, "',' receiver")?;
    let right = array_id(ctx, arg(args, 0)?, "',' argument")?;
    let mut combined = array_items(ctx, left).clone();
    combined.extend_from_slice(array_items(ctx, right));
    Ok(ctx.heap.alloc_array(combined))
}

pub(super) fn array_copy_from_to(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = array_id(ctx, recv, "copyFrom:to:")?;
    let from = arg(args, 0)?.as_int()?;
    let to = arg(args, 1)?.as_int()?;
    let items = array_items(ctx, id);
    let len = items.len() as i64;
    if from < 1 || to > len || from > to + 1 {
        return Err(RunError::value(format!("copyFrom: {from} to: {to} out of bounds")));
    }
    let copied = items[(from as usize - 1)..(to as usize)].to_vec();
    Ok(ctx.heap.alloc_array(copied))
}

pub(super) fn table_new(ctx: &mut NativeCtx<'_>, _recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(Value::Ref(ctx.heap.alloc(HeapData::Table(IndexMap::new()))))
}

pub(super) fn table_size(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let id = table_id(ctx, recv, "size")?;
    match ctx.heap.get(id) {
        HeapData::Table(entries) => Ok(Value::Int(entries.len() as i64)),
        _ => unreachable!("checked by table_id"),
    }
}

pub(super) fn table_at(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = table_id(ctx, recv, "at:")?;
    let key = ctx.heap.table_key(arg(args, 0)?)?;
    match ctx.heap.get(id) {
        HeapData::Table(entries) => entries
            .get(&key)
            .copied()
            .ok_or_else(|| RunError::value("key not found")),
        _ => unreachable!("checked by table_id"),
    }
}

pub(super) fn table_at_put(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = table_id(ctx, recv, "at:put:")?;
    let key = ctx.heap.table_key(arg(args, 0)?)?;
    let value = arg(args, 1)?;
    match ctx.heap.get_mut(id) {
        HeapData::Table(entries) => {
            entries.insert(key, value);
        }
        _ => unreachable!("checked by table_id"),
    }
    Ok(value)
}

pub(super) fn table_includes_key(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = table_id(ctx, recv, "includesKey:")?;
    let key = ctx.heap.table_key(arg(args, 0)?)?;
    match ctx.heap.get(id) {
        HeapData::Table(entries) => Ok(Value::Bool(entries.contains_key(&key))),
        _ => unreachable!("checked by table_id"),
    }
}

pub(super) fn table_remove_key(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let id = table_id(ctx, recv, "removeKey:")?;
    let key = ctx.heap.table_key(arg(args, 0)?)?;
    match ctx.heap.get_mut(id) {
        // shift_remove keeps the insertion order of the survivors.
        HeapData::Table(entries) => Ok(entries.shift_remove(&key).unwrap_or(Value::Nil)),
        _ => unreachable!("checked by table_id"),
    }
}

pub(super) fn table_keys(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let id = table_id(ctx, recv, "keys")?;
    let keys: Vec<_> = match ctx.heap.get(id) {
        HeapData::Table(entries) => entries.keys().cloned().collect(),
        _ => unreachable!("checked by table_id"),
    };
    let values: Vec<Value> = keys.iter().map(|k| ctx.heap.key_value(k)).collect();
    Ok(ctx.heap.alloc_array(values))
}

pub(super) fn block_num_args(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    match recv {
        Value::Ref(id) => match ctx.heap.get(id) {
            HeapData::Closure(closure) => {
                let params = ctx.templates.get(closure.template).params.len();
                Ok(Value::Int(params as i64))
            }
            _ => Err(RunError::value("numArgs expects a Block")),
        },
        _ => Err(RunError::value("numArgs expects a Block")),
    }
}
