//! Class construction natives, method installation with slot rewriting, and
//! allocation of the sync-primitive payload classes.

use ahash::{AHashMap, AHashSet};
use smallvec::smallvec;

use super::{NativeCtx, arg};
use crate::{
    ast::{AstArena, BlockTemplate, BlockTemplateId, Node, NodeId, Templates},
    class::MethodImp,
    fault::{RunError, RunResult},
    heap::{HeapData, Instance, Monitor, Semaphore, SharedQueue},
    intern::{StaticNames, SymbolId},
    value::Value,
};

pub(super) fn class_new(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let class = recv.as_class()?;
    let slots = ctx.classes.get(class).all_slot_names.len();
    Ok(Value::Ref(ctx.heap.alloc(HeapData::Instance(Instance {
        class,
        slots: smallvec![Value::Nil; slots],
    }))))
}

pub(super) fn derive(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let parent = recv.as_class()?;
    let class = ctx.classes.derive(parent, Vec::new(), ctx.interns)?;
    Ok(Value::Class(class))
}

pub(super) fn derive_slots(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let parent = recv.as_class()?;
    let slots = slot_names(ctx, arg(args, 0)?)?;
    let class = ctx.classes.derive(parent, slots, ctx.interns)?;
    Ok(Value::Class(class))
}

/// Reads `#(x y)` style slot declarations: symbols, or strings interned on
/// the spot.
fn slot_names(ctx: &mut NativeCtx<'_>, value: Value) -> RunResult<Vec<SymbolId>> {
    let items = match value {
        Value::Ref(id) => match ctx.heap.get(id) {
            HeapData::Array(items) => items.clone(),
            _ => return Err(RunError::value("derive: expects an Array of slot names")),
        },
        _ => return Err(RunError::value("derive: expects an Array of slot names")),
    };
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Symbol(sym) => names.push(sym),
            Value::Ref(id) => match ctx.heap.get(id) {
                HeapData::Str(s) => {
                    let owned = s.clone();
                    names.push(ctx.interns.intern(&owned));
                }
                _ => return Err(RunError::value("slot names must be symbols")),
            },
            _ => return Err(RunError::value("slot names must be symbols")),
        }
    }
    Ok(names)
}

pub(super) fn selector_put(
    ctx: &mut NativeCtx<'_>,
    recv: Value,
    args: &[Value],
    class_side: bool,
) -> RunResult<Value> {
    let class = recv.as_class()?;
    let Value::Symbol(selector) = arg(args, 0)? else {
        return Err(RunError::value("selector:put: expects a Symbol selector"));
    };
    let body = arg(args, 1)?;
    let closure = match body {
        Value::Ref(id) => match ctx.heap.get(id) {
            HeapData::Closure(closure) => closure.clone(),
            _ => return Err(RunError::value("method body must be a Block")),
        },
        _ => return Err(RunError::value("method body must be a Block")),
    };

    let declared = ctx.interns.selector_arity(selector);
    let arity = ctx.templates.get(closure.template).params.len();
    if declared != arity {
        return Err(RunError::value(format!(
            "selector #{} implies {declared} arguments but the block takes {arity}",
            ctx.interns.get(selector)
        )));
    }

    // Slot references in the body become direct indexed accesses for this
    // class's layout. Instance methods only; class-side methods see no slots.
    let template = if class_side {
        closure.template
    } else {
        let slot_index: AHashMap<SymbolId, usize> = ctx
            .classes
            .get(class)
            .all_slot_names
            .iter()
            .enumerate()
            .map(|(index, &name)| (name, index))
            .collect();
        let captured: Vec<SymbolId> = closure.captured.iter().map(|&(name, _)| name).collect();
        rewrite_method_template(ctx.ast, ctx.templates, &slot_index, closure.template, &captured)
    };

    ctx.classes.install_method(
        class,
        selector,
        MethodImp::Block {
            template,
            captured: closure.captured,
        },
        class_side,
        ctx.interns,
    )?;
    Ok(recv)
}

pub(super) fn add_parent(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let class = recv.as_class()?;
    let parent = arg(args, 0)?.as_class()?;
    ctx.classes.add_parent(class, parent, ctx.interns)?;
    Ok(recv)
}

pub(super) fn class_name(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let class = recv.as_class()?;
    let name = ctx.classes.get(class).display_name().to_owned();
    Ok(ctx.heap.alloc_str(name))
}

pub(super) fn class_tags(ctx: &mut NativeCtx<'_>, recv: Value, _args: &[Value]) -> RunResult<Value> {
    let class = recv.as_class()?;
    let tags: Vec<Value> = ctx.classes.get(class).tags.iter().map(|&t| Value::Symbol(t)).collect();
    Ok(ctx.heap.alloc_array(tags))
}

pub(super) fn class_tag(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let class = recv.as_class()?;
    let Value::Symbol(tag) = arg(args, 0)? else {
        return Err(RunError::value("tag: expects a Symbol"));
    };
    let tags = &mut ctx.classes.get_mut(class).tags;
    if !tags.contains(&tag) {
        tags.push(tag);
    }
    Ok(recv)
}

/// `Exception signal: 'reason'` — raises carrying an instance of the
/// receiving class, so handlers can match on user-defined subclasses.
pub(super) fn exception_signal(ctx: &mut NativeCtx<'_>, recv: Value, args: &[Value]) -> RunResult<Value> {
    let class = recv.as_class()?;
    let message = match arg(args, 0)? {
        Value::Ref(id) => match ctx.heap.get(id) {
            HeapData::Str(s) => s.clone(),
            _ => crate::value::print_string(ctx.heap, ctx.interns, ctx.classes, arg(args, 0)?),
        },
        other => crate::value::print_string(ctx.heap, ctx.interns, ctx.classes, other),
    };
    let mut slots = smallvec![Value::Nil; ctx.classes.get(class).all_slot_names.len()];
    if let Some(index) = ctx.classes.get(class).slot_index(StaticNames::Message.sym()) {
        slots[index] = ctx.heap.alloc_str(message.clone());
    }
    let instance = Value::Ref(ctx.heap.alloc(HeapData::Instance(Instance { class, slots })));
    Err(RunError::user(message).with_payload(instance))
}

pub(super) fn monitor_new(ctx: &mut NativeCtx<'_>, _recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(Value::Ref(ctx.heap.alloc(HeapData::Monitor(Monitor::default()))))
}

pub(super) fn semaphore_new(ctx: &mut NativeCtx<'_>, _recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(Value::Ref(ctx.heap.alloc(HeapData::Semaphore(Semaphore::default()))))
}

pub(super) fn semaphore_new_count(ctx: &mut NativeCtx<'_>, _recv: Value, args: &[Value]) -> RunResult<Value> {
    let count = arg(args, 0)?.as_int()?;
    if count < 0 {
        return Err(RunError::value("semaphore count cannot be negative"));
    }
    Ok(Value::Ref(ctx.heap.alloc(HeapData::Semaphore(Semaphore {
        count,
        waiters: std::collections::VecDeque::new(),
    }))))
}

pub(super) fn queue_new(ctx: &mut NativeCtx<'_>, _recv: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(Value::Ref(ctx.heap.alloc(HeapData::SharedQueue(SharedQueue::default()))))
}

/// Clones a block template with identifiers that name instance slots
/// replaced by direct `SlotAccess` nodes. Locals shadow slots; nested block
/// templates are rewritten recursively with their own parameters added to
/// the shadow set. Returns the original id when nothing changed.
pub(crate) fn rewrite_method_template(
    ast: &mut AstArena,
    templates: &mut Templates,
    slot_index: &AHashMap<SymbolId, usize>,
    template: BlockTemplateId,
    extra_shadow: &[SymbolId],
) -> BlockTemplateId {
    if slot_index.is_empty() {
        return template;
    }
    let tpl = templates.get(template).clone();
    let mut shadow: AHashSet<SymbolId> = tpl.params.iter().copied().collect();
    shadow.extend(tpl.temps.iter().copied());
    shadow.extend(extra_shadow.iter().copied());

    let mut changed = false;
    let body: Vec<NodeId> = tpl
        .body
        .iter()
        .map(|&node| {
            let rewritten = rewrite_node(ast, templates, slot_index, &shadow, node);
            changed |= rewritten != node;
            rewritten
        })
        .collect();
    if !changed {
        return template;
    }
    templates.push(BlockTemplate {
        params: tpl.params,
        temps: tpl.temps,
        body,
    })
}

fn rewrite_nodes(
    ast: &mut AstArena,
    templates: &mut Templates,
    slot_index: &AHashMap<SymbolId, usize>,
    shadow: &AHashSet<SymbolId>,
    nodes: &[NodeId],
) -> (bool, Vec<NodeId>) {
    let mut changed = false;
    let rewritten = nodes
        .iter()
        .map(|&node| {
            let new = rewrite_node(ast, templates, slot_index, shadow, node);
            changed |= new != node;
            new
        })
        .collect();
    (changed, rewritten)
}

fn rewrite_node(
    ast: &mut AstArena,
    templates: &mut Templates,
    slot_index: &AHashMap<SymbolId, usize>,
    shadow: &AHashSet<SymbolId>,
    id: NodeId,
) -> NodeId {
    match ast.get(id).clone() {
        Node::Ident(name) => match slot_index.get(&name) {
            Some(&index) if !shadow.contains(&name) => ast.push(Node::SlotAccess {
                name,
                index,
                value: None,
            }),
            _ => id,
        },
        Node::Assign { name, expr } => {
            let new_expr = rewrite_node(ast, templates, slot_index, shadow, expr);
            match slot_index.get(&name) {
                Some(&index) if !shadow.contains(&name) => ast.push(Node::SlotAccess {
                    name,
                    index,
                    value: Some(new_expr),
                }),
                _ if new_expr != expr => ast.push(Node::Assign { name, expr: new_expr }),
                _ => id,
            }
        }
        Node::Message { receiver, selector, args } => {
            let new_receiver = receiver.map(|r| rewrite_node(ast, templates, slot_index, shadow, r));
            let (args_changed, new_args) = rewrite_nodes(ast, templates, slot_index, shadow, &args);
            if new_receiver != receiver || args_changed {
                ast.push(Node::Message {
                    receiver: new_receiver,
                    selector,
                    args: new_args.into(),
                })
            } else {
                id
            }
        }
        Node::Cascade { receiver, messages } => {
            let new_receiver = rewrite_node(ast, templates, slot_index, shadow, receiver);
            let mut changed = new_receiver != receiver;
            let new_messages: Vec<_> = messages
                .iter()
                .map(|(selector, args)| {
                    let (args_changed, new_args) = rewrite_nodes(ast, templates, slot_index, shadow, args);
                    changed |= args_changed;
                    (*selector, new_args.into())
                })
                .collect();
            if changed {
                ast.push(Node::Cascade {
                    receiver: new_receiver,
                    messages: new_messages,
                })
            } else {
                id
            }
        }
        Node::SuperSend { selector, args, qualifier } => {
            let (changed, new_args) = rewrite_nodes(ast, templates, slot_index, shadow, &args);
            if changed {
                ast.push(Node::SuperSend {
                    selector,
                    args: new_args.into(),
                    qualifier,
                })
            } else {
                id
            }
        }
        Node::Return(Some(expr)) => {
            let new_expr = rewrite_node(ast, templates, slot_index, shadow, expr);
            if new_expr != expr {
                ast.push(Node::Return(Some(new_expr)))
            } else {
                id
            }
        }
        Node::Array(elements) => {
            let (changed, new_elements) = rewrite_nodes(ast, templates, slot_index, shadow, &elements);
            if changed { ast.push(Node::Array(new_elements)) } else { id }
        }
        Node::Table(entries) => {
            let mut changed = false;
            let new_entries: Vec<_> = entries
                .iter()
                .map(|&(key, value)| {
                    let new_key = rewrite_node(ast, templates, slot_index, shadow, key);
                    let new_value = rewrite_node(ast, templates, slot_index, shadow, value);
                    changed |= new_key != key || new_value != value;
                    (new_key, new_value)
                })
                .collect();
            if changed { ast.push(Node::Table(new_entries)) } else { id }
        }
        Node::Primitive { selector, fallback } => {
            let (changed, new_fallback) = rewrite_nodes(ast, templates, slot_index, shadow, &fallback);
            if changed {
                ast.push(Node::Primitive {
                    selector,
                    fallback: new_fallback,
                })
            } else {
                id
            }
        }
        Node::Block(inner) => {
            let tpl = templates.get(inner).clone();
            let mut inner_shadow = shadow.clone();
            inner_shadow.extend(tpl.params.iter().copied());
            inner_shadow.extend(tpl.temps.iter().copied());
            let (changed, new_body) = rewrite_nodes(ast, templates, slot_index, &inner_shadow, &tpl.body);
            if changed {
                let new_template = templates.push(BlockTemplate {
                    params: tpl.params,
                    temps: tpl.temps,
                    body: new_body,
                });
                ast.push(Node::Block(new_template))
            } else {
                id
            }
        }
        Node::Literal(_) | Node::PseudoVar(_) | Node::SlotAccess { .. } | Node::Return(None) => id,
    }
}
