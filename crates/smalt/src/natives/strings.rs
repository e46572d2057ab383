//! String and symbol natives. Indexing is 1-based, the language convention.

use super::{NativeCtx, arg};
use crate::{
    fault::{RunError, RunResult},
    heap::HeapData,
    value::Value,
};

fn as_str<'a>(ctx: &'a NativeCtx<'_>, value: Value, what: &str) -> RunResult<&'a str> {
    match value {
        Value::Ref(id) => match ctx.heap.get(id) {
            HeapData::Str(s) => Ok(s),
            _ => Err(RunError::value(format!("{what} expects a String"))),
        },
        _ => Err(RunError::value(format!("{what} expects a String"))),
    }
}

pub(super) fn comma(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let left = as_str(ctx, recv, "',' receiver")?.to_owned();
    let other = arg(args, 0)?;
    let right = match other {
        Value::Symbol(sym) => ctx.interns.get(sym).to_owned(),
        _ => as_str(ctx, other, "',' argument")?.to_owned(),
    };
    Ok(ctx.heap.alloc_str(left + &right))
}

pub(super) fn size(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let s = as_str(ctx, recv, "size")?;
    Ok(Value::Int(s.chars().count() as i64))
}

pub(super) fn at(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let index = arg(args, 0)?.as_int()?;
    let s = as_str(ctx, recv, "at:")?;
    let ch = usize::try_from(index)
        .ok()
        .filter(|&i| i >= 1)
        .and_then(|i| s.chars().nth(i - 1))
        .ok_or_else(|| RunError::value(format!("string index {index} out of bounds")))?;
    Ok(ctx.heap.alloc_str(ch.to_string()))
}

pub(super) fn copy_from_to(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let from = arg(args, 0)?.as_int()?;
    let to = arg(args, 1)?.as_int()?;
    let s = as_str(ctx, recv, "copyFrom:to:")?;
    let len = s.chars().count() as i64;
    if from < 1 || to > len || from > to + 1 {
        return Err(RunError::value(format!("copyFrom: {from} to: {to} out of bounds")));
    }
    let copied: String = s
        .chars()
        .skip(from as usize - 1)
        .take((to - from + 1).max(0) as usize)
        .collect();
    Ok(ctx.heap.alloc_str(copied))
}

pub(super) fn as_symbol(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let s = as_str(ctx, recv, "asSymbol")?.to_owned();
    Ok(Value::Symbol(ctx.interns.intern(&s)))
}

pub(super) fn as_string(_ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(recv)
}

pub(super) fn sym_as_string(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let Value::Symbol(sym) = recv else {
        return Err(RunError::value("asString expects a Symbol receiver"));
    };
    let name = ctx.interns.get(sym).to_owned();
    Ok(ctx.heap.alloc_str(name))
}
