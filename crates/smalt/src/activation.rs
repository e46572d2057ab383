//! Activation records.
//!
//! A method or block invocation gets an [`Activation`]: receiver, locals,
//! sender link, and (for blocks) the home link used by non-local return.
//! Activations form a spaghetti stack independent of the host call stack, so
//! they live in a central arena addressed by [`ActivationId`]. Ids carry a
//! generation uid: a closure may outlive its home activation, and a stale id
//! must be *detectable* rather than resolve to a recycled slot.

use smallvec::SmallVec;

use crate::{
    class::ClassId,
    heap::HeapId,
    intern::SymbolId,
    value::Value,
};

/// Handle to an activation: arena index plus the generation uid captured when
/// the activation was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActivationId {
    index: u32,
    uid: u64,
}

/// One local variable slot. A `Cell` slot is a variable that has been
/// captured by some block; reads and writes go through the shared cell so
/// every closure observing the variable sees the same state.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LocalSlot {
    Plain(Value),
    Cell(HeapId),
}

/// An in-flight method or block invocation.
#[derive(Debug)]
pub(crate) struct Activation {
    uid: u64,
    pub receiver: Value,
    /// Class anchoring `super` lookup for the executing method body.
    pub defining: Option<ClassId>,
    /// Selector for trace rendering; `None` for plain block activations.
    pub selector: Option<SymbolId>,
    /// True for method activations: the target kind a `^` unwinds to.
    pub is_method: bool,
    /// Parameters, temporaries, then captured cells; linear scan is fine at
    /// these sizes.
    pub locals: SmallVec<[(SymbolId, LocalSlot); 8]>,
    /// How many leading `locals` entries are declared parameters; primitive
    /// bodies forward exactly these to their native routine.
    pub param_count: usize,
    /// Link to the calling activation.
    pub sender: Option<ActivationId>,
    /// For block activations: the home activation of the closure, walked by
    /// non-local return to find the enclosing method.
    pub home: Option<ActivationId>,
    pub has_returned: bool,
    pub return_value: Value,
}

impl Activation {
    pub fn local(&self, name: SymbolId) -> Option<LocalSlot> {
        self.locals
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, slot)| slot)
    }

    pub fn set_local(&mut self, name: SymbolId, slot: LocalSlot) -> bool {
        for (n, existing) in &mut self.locals {
            if *n == name {
                *existing = slot;
                return true;
            }
        }
        false
    }

    pub fn push_local(&mut self, name: SymbolId, slot: LocalSlot) {
        self.locals.push((name, slot));
    }
}

/// Arena of live activations. Slots are recycled through a free list; the
/// uid check catches handles that survived their activation.
#[derive(Debug, Default)]
pub(crate) struct Activations {
    slots: Vec<Option<Activation>>,
    free: Vec<u32>,
    next_uid: u64,
}

impl Activations {
    pub fn insert(&mut self, mut activation: Activation) -> ActivationId {
        self.next_uid += 1;
        activation.uid = self.next_uid;
        let uid = self.next_uid;
        let index = if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(activation);
            index
        } else {
            let index = u32::try_from(self.slots.len()).expect("activation arena overflow");
            self.slots.push(Some(activation));
            index
        };
        ActivationId { index, uid }
    }

    /// Resolves an id, returning `None` when the activation has been popped.
    pub fn get(&self, id: ActivationId) -> Option<&Activation> {
        self.slots[id.index as usize]
            .as_ref()
            .filter(|a| a.uid == id.uid)
    }

    pub fn get_mut(&mut self, id: ActivationId) -> Option<&mut Activation> {
        self.slots[id.index as usize]
            .as_mut()
            .filter(|a| a.uid == id.uid)
    }

    pub fn is_live(&self, id: ActivationId) -> bool {
        self.get(id).is_some()
    }

    /// Pops an activation out of the arena; its id goes stale immediately.
    pub fn remove(&mut self, id: ActivationId) -> Option<Activation> {
        let slot = &mut self.slots[id.index as usize];
        if slot.as_ref().is_some_and(|a| a.uid == id.uid) {
            self.free.push(id.index);
            slot.take()
        } else {
            None
        }
    }
}

/// Builder used by the VM when entering a method or block.
pub(crate) fn new_activation(
    receiver: Value,
    defining: Option<ClassId>,
    selector: Option<SymbolId>,
    is_method: bool,
    sender: Option<ActivationId>,
    home: Option<ActivationId>,
) -> Activation {
    Activation {
        uid: 0,
        receiver,
        defining,
        selector,
        is_method,
        locals: SmallVec::new(),
        param_count: 0,
        sender,
        home,
        has_returned: false,
        return_value: Value::Nil,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_ids_do_not_resolve_after_slot_reuse() {
        let mut arena = Activations::default();
        let first = arena.insert(new_activation(Value::Nil, None, None, true, None, None));
        assert!(arena.is_live(first));
        arena.remove(first).unwrap();
        assert!(!arena.is_live(first));

        // The recycled slot must not satisfy the stale handle.
        let second = arena.insert(new_activation(Value::Int(1), None, None, false, None, None));
        assert!(!arena.is_live(first));
        assert!(arena.is_live(second));
        assert_ne!(first, second);
    }
}
