//! Arithmetic and comparison natives.
//!
//! Arithmetic between Int and Float promotes to Float; `//` and `\` require
//! integer operands; division by zero is a value fault.

use std::cmp::Ordering;

use super::{NativeCtx, arg};
use crate::{
    fault::{RunError, RunResult},
    heap::HeapData,
    value::Value,
};

fn binary_numbers(recv: Value, other: Value) -> RunResult<Option<(i64, i64)>> {
    match (recv, other) {
        (Value::Int(a), Value::Int(b)) => Ok(Some((a, b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(None),
        _ => Err(RunError::value("arithmetic expects numbers")),
    }
}

pub(super) fn add(_ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let other = arg(args, 0)?;
    match binary_numbers(recv, other)? {
        Some((a, b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| RunError::value("integer overflow in +")),
        None => Ok(Value::Float(recv.as_number()? + other.as_number()?)),
    }
}

pub(super) fn sub(_ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let other = arg(args, 0)?;
    match binary_numbers(recv, other)? {
        Some((a, b)) => a
            .checked_sub(b)
            .map(Value::Int)
            .ok_or_else(|| RunError::value("integer overflow in -")),
        None => Ok(Value::Float(recv.as_number()? - other.as_number()?)),
    }
}

pub(super) fn mul(_ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let other = arg(args, 0)?;
    match binary_numbers(recv, other)? {
        Some((a, b)) => a
            .checked_mul(b)
            .map(Value::Int)
            .ok_or_else(|| RunError::value("integer overflow in *")),
        None => Ok(Value::Float(recv.as_number()? * other.as_number()?)),
    }
}

pub(super) fn div(_ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let other = arg(args, 0)?;
    match binary_numbers(recv, other)? {
        Some((_, 0)) => Err(RunError::value("division by zero")),
        Some((a, b)) => {
            if a % b == 0 {
                Ok(Value::Int(a / b))
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        None => {
            let divisor = other.as_number()?;
            if divisor == 0.0 {
                return Err(RunError::value("division by zero"));
            }
            Ok(Value::Float(recv.as_number()? / divisor))
        }
    }
}

fn int_pair(recv: Value, other: Value, op: &str) -> RunResult<(i64, i64)> {
    match (recv, other) {
        (Value::Int(a), Value::Int(b)) => Ok((a, b)),
        _ => Err(RunError::value(format!("{op} requires integer operands"))),
    }
}

pub(super) fn floor_div(_ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let (a, b) = int_pair(recv, arg(args, 0)?, "//")?;
    if b == 0 {
        return Err(RunError::value("division by zero"));
    }
    let quotient = a / b;
    let floored = if a % b != 0 && (a < 0) != (b < 0) {
        quotient - 1
    } else {
        quotient
    };
    Ok(Value::Int(floored))
}

pub(super) fn modulo(_ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let (a, b) = int_pair(recv, arg(args, 0)?, "\\")?;
    if b == 0 {
        return Err(RunError::value("division by zero"));
    }
    // Result carries the sign of the divisor, matching floored division.
    let remainder = a % b;
    if remainder != 0 && (remainder < 0) != (b < 0) {
        Ok(Value::Int(remainder + b))
    } else {
        Ok(Value::Int(remainder))
    }
}

/// Comparison shared by `<`, `>`, `<=`, `>=`: numbers widen, strings and
/// symbols compare lexicographically.
pub(super) fn compare(
    ctx: &mut NativeCtx<'_>,
    recv: Value,
    args: &[Value],
    pick: fn(Ordering) -> bool,
) -> RunResult<Value> {
    let other = arg(args, 0)?;
    let ordering = match (recv, other) {
        (Value::Int(a), Value::Int(b)) => a.cmp(&b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (recv.as_number()?, other.as_number()?);
            a.partial_cmp(&b)
                .ok_or_else(|| RunError::value("cannot order nan"))?
        }
        (Value::Symbol(a), Value::Symbol(b)) => ctx.interns.get(a).cmp(ctx.interns.get(b)),
        (Value::Ref(a), Value::Ref(b)) => match (ctx.heap.get(a), ctx.heap.get(b)) {
            (HeapData::Str(s), HeapData::Str(t)) => s.as_str().cmp(t.as_str()),
            _ => return Err(RunError::value("comparison expects numbers or strings")),
        },
        _ => return Err(RunError::value("comparison expects numbers or strings")),
    };
    Ok(Value::Bool(pick(ordering)))
}

pub(super) fn as_float(_ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(Value::Float(recv.as_number()?))
}

pub(super) fn truncated(_ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    match recv {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        _ => Err(RunError::value("truncated expects a Number")),
    }
}
