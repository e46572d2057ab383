//! Default `Object` behavior.

use super::{NativeCtx, arg};
use crate::{
    fault::{RunError, RunResult},
    value::{self, Value},
};

pub(super) fn obj_eq(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let other = arg(args, 0)?;
    Ok(Value::Bool(value::structural_eq(ctx.heap, recv, other)))
}

pub(super) fn obj_identical(_ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    Ok(Value::Bool(recv.identical(arg(args, 0)?)))
}

pub(super) fn obj_class(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(Value::Class(ctx.kernel.class_of(ctx.heap, recv)))
}

pub(super) fn obj_print_string(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let rendered = value::print_string(ctx.heap, ctx.interns, ctx.classes, recv);
    Ok(ctx.heap.alloc_str(rendered))
}

pub(super) fn obj_print_nl(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let rendered = value::print_string(ctx.heap, ctx.interns, ctx.classes, recv);
    ctx.print.write_line(&rendered);
    Ok(recv)
}

pub(super) fn obj_error(ctx: &mut NativeCtx<'_>, _recv: Value, args: &[Value]) -> RunResult<Value> {
    let reason = arg(args, 0)?;
    let message = match reason {
        Value::Ref(id) => match ctx.heap.get(id) {
            crate::heap::HeapData::Str(s) => s.clone(),
            _ => value::print_string(ctx.heap, ctx.interns, ctx.classes, reason),
        },
        _ => value::print_string(ctx.heap, ctx.interns, ctx.classes, reason),
    };
    Err(RunError::user(message))
}

pub(super) fn obj_responds_to(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let Value::Symbol(selector) = arg(args, 0)? else {
        return Err(RunError::value("respondsTo: expects a Symbol"));
    };
    let known = match recv {
        Value::Class(id) => ctx.classes.get(id).all_class_methods.contains_key(&selector),
        _ => {
            let class = ctx.kernel.class_of(ctx.heap, recv);
            ctx.classes.get(class).all_methods.contains_key(&selector)
        }
    };
    Ok(Value::Bool(known))
}

pub(super) fn obj_is_kind_of(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let target = arg(args, 0)?.as_class()?;
    let class = ctx.kernel.class_of(ctx.heap, recv);
    Ok(Value::Bool(ctx.classes.inherits_from(class, target)))
}
