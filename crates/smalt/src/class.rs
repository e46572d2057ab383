//! Class and instance model.
//!
//! Classes live in a registry owned by the interpreter and are addressed by
//! [`ClassId`]; `parents` and `subclasses` edges are plain ids, so the
//! multiple-inheritance graph cannot form ownership cycles. Each class keeps
//! its own definitions plus merged caches (`all_methods`, `all_class_methods`,
//! `all_slot_names`) combining parents' caches with its own. The caches are
//! rebuilt eagerly, top-down through the `subclasses` back-references, on
//! every change to a class or one of its ancestors, so dispatch is a single
//! hash lookup.

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    ast::BlockTemplateId,
    fault::{RunError, RunResult},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, SymbolId},
    natives::NativeMethod,
    value::Value,
};

/// Index of a class in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ClassId(u32);

impl ClassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a method runs when dispatch selects it.
#[derive(Debug, Clone)]
pub(crate) enum MethodImp {
    /// Interpreted body: a block template (already slot-rewritten for the
    /// defining class) plus any captured cells from the installing closure.
    Block {
        template: BlockTemplateId,
        captured: Vec<(SymbolId, HeapId)>,
    },
    /// A native routine.
    Native(NativeMethod),
    /// Generated accessor: push `receiver.slots[index]`.
    SlotGet(usize),
    /// Generated accessor: store into `receiver.slots[index]`, answer self.
    SlotSet(usize),
}

/// A merged-table entry: the implementation plus the class that defined it,
/// which anchors `super` lookup inside the method body.
#[derive(Debug, Clone)]
pub(crate) struct MethodEntry {
    pub defining: ClassId,
    pub imp: MethodImp,
}

/// One class. Fields before `all_slot_names` are the class's own definitions;
/// the `all_*` fields are the merged caches.
#[derive(Debug, Default)]
pub(crate) struct Class {
    name: Option<Box<str>>,
    pub tags: Vec<SymbolId>,
    /// Ordered parents; left-to-right priority on merge.
    pub parents: Vec<ClassId>,
    /// Own instance-variable names, in definition order.
    pub slot_names: Vec<SymbolId>,
    pub methods: IndexMap<SymbolId, MethodImp>,
    pub class_methods: IndexMap<SymbolId, MethodImp>,
    /// Parents' slots (inheritance order) then own; disjoint by construction.
    pub all_slot_names: Vec<SymbolId>,
    pub all_methods: IndexMap<SymbolId, MethodEntry>,
    pub all_class_methods: IndexMap<SymbolId, MethodEntry>,
    /// Back-references used only for invalidation walks.
    pub subclasses: Vec<ClassId>,
}

impl Class {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("AnonymousClass")
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Index of a slot in the merged layout.
    pub fn slot_index(&self, name: SymbolId) -> Option<usize> {
        self.all_slot_names.iter().position(|&s| s == name)
    }
}

/// The class registry. Append-only; classes are never destroyed.
#[derive(Debug, Default)]
pub(crate) struct Classes {
    items: Vec<Class>,
}

impl Classes {
    pub fn get(&self, id: ClassId) -> &Class {
        &self.items[id.index()]
    }

    pub fn get_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.items[id.index()]
    }

    /// Registers a new class with the given parents and own slot names,
    /// building its merged caches. Used by the bootstrap and by `derive`.
    pub fn new_class(
        &mut self,
        name: Option<&str>,
        parents: Vec<ClassId>,
        slot_names: Vec<SymbolId>,
        interns: &Interns,
    ) -> RunResult<ClassId> {
        let id = ClassId(u32::try_from(self.items.len()).expect("class registry overflow"));
        self.items.push(Class {
            name: name.map(Into::into),
            parents: parents.clone(),
            slot_names,
            ..Class::default()
        });
        for parent in parents {
            self.items[parent.index()].subclasses.push(id);
        }
        self.rebuild_transitive(id, interns)?;
        Ok(id)
    }

    /// Creates a subclass of `parent` with extra slots, generating a unary
    /// getter and keyword setter for each new slot as direct slot accessors.
    pub fn derive(
        &mut self,
        parent: ClassId,
        new_slots: Vec<SymbolId>,
        interns: &mut Interns,
    ) -> RunResult<ClassId> {
        let base = self.get(parent).all_slot_names.len();
        let id = self.new_class(None, vec![parent], new_slots.clone(), interns)?;
        for (i, &slot) in new_slots.iter().enumerate() {
            let setter_name = format!("{}:", interns.get(slot));
            let setter = interns.intern(&setter_name);
            let class = self.get_mut(id);
            class.methods.insert(slot, MethodImp::SlotGet(base + i));
            class.methods.insert(setter, MethodImp::SlotSet(base + i));
        }
        self.rebuild_transitive(id, interns)?;
        Ok(id)
    }

    /// Installs an instance or class method and invalidates every merged
    /// table that could see it.
    pub fn install_method(
        &mut self,
        id: ClassId,
        selector: SymbolId,
        imp: MethodImp,
        class_side: bool,
        interns: &Interns,
    ) -> RunResult<()> {
        let class = self.get_mut(id);
        if class_side {
            class.class_methods.insert(selector, imp);
        } else {
            class.methods.insert(selector, imp);
        }
        self.rebuild_transitive(id, interns)
    }

    /// Appends a parent. Fails on a parent-graph cycle, a slot-name conflict,
    /// or a selector conflict with an existing parent that the class does not
    /// itself override.
    pub fn add_parent(&mut self, id: ClassId, parent: ClassId, interns: &Interns) -> RunResult<()> {
        if parent == id || self.inherits_from(parent, id) {
            return Err(RunError::class_construction(format!(
                "adding {} as a parent of {} would create a cycle",
                self.get(parent).display_name(),
                self.get(id).display_name()
            )));
        }
        self.get_mut(id).parents.push(parent);
        let result = self.rebuild_transitive(id, interns);
        if result.is_err() {
            // Leave the graph as it was before the failed merge.
            self.get_mut(id).parents.pop();
            let _ = self.rebuild_transitive(id, interns);
            return result;
        }
        self.get_mut(parent).subclasses.push(id);
        result
    }

    /// True when `descendant` has `ancestor` anywhere in its parent graph.
    pub fn inherits_from(&self, descendant: ClassId, ancestor: ClassId) -> bool {
        if descendant == ancestor {
            return true;
        }
        let mut work = self.get(descendant).parents.clone();
        let mut seen = AHashSet::new();
        while let Some(next) = work.pop() {
            if next == ancestor {
                return true;
            }
            if seen.insert(next) {
                work.extend_from_slice(&self.get(next).parents);
            }
        }
        false
    }

    /// Names a class the first time it is bound to a global.
    pub fn christen(&mut self, id: ClassId, name: &str) {
        let class = self.get_mut(id);
        if class.name.is_none() {
            class.name = Some(name.into());
        }
    }

    /// Rebuilds the merged caches of `id` and then of every transitive
    /// subclass, parents before children.
    pub fn rebuild_transitive(&mut self, id: ClassId, interns: &Interns) -> RunResult<()> {
        let mut queue = vec![id];
        let mut seen = AHashSet::new();
        while let Some(next) = queue.pop() {
            if !seen.insert(next) {
                continue;
            }
            self.rebuild(next, interns)?;
            queue.extend_from_slice(&self.get(next).subclasses);
        }
        Ok(())
    }

    /// Recomputes one class's merged caches from its parents' caches and its
    /// own definitions, reporting slot and selector conflicts.
    fn rebuild(&mut self, id: ClassId, interns: &Interns) -> RunResult<()> {
        let mut all_methods: IndexMap<SymbolId, MethodEntry> = IndexMap::new();
        let mut all_class_methods: IndexMap<SymbolId, MethodEntry> = IndexMap::new();
        let mut all_slot_names: Vec<SymbolId> = Vec::new();
        let mut method_ties: AHashSet<SymbolId> = AHashSet::new();
        let mut class_method_ties: AHashSet<SymbolId> = AHashSet::new();

        let parents = self.get(id).parents.clone();
        for &parent in &parents {
            let parent_class = self.get(parent);
            for (&selector, entry) in &parent_class.all_methods {
                match all_methods.get(&selector) {
                    None => {
                        all_methods.insert(selector, entry.clone());
                    }
                    Some(existing) if existing.defining == entry.defining => {}
                    Some(_) => {
                        method_ties.insert(selector);
                    }
                }
            }
            for (&selector, entry) in &parent_class.all_class_methods {
                match all_class_methods.get(&selector) {
                    None => {
                        all_class_methods.insert(selector, entry.clone());
                    }
                    Some(existing) if existing.defining == entry.defining => {}
                    Some(_) => {
                        class_method_ties.insert(selector);
                    }
                }
            }
            for &slot in &parent_class.all_slot_names {
                if all_slot_names.contains(&slot) {
                    return Err(RunError::class_construction(format!(
                        "slot '{}' is inherited more than once by {}",
                        interns.get(slot),
                        self.get(id).display_name()
                    )));
                }
                all_slot_names.push(slot);
            }
        }

        let class = self.get(id);
        for (&selector, imp) in &class.methods {
            method_ties.remove(&selector);
            all_methods.insert(selector, MethodEntry { defining: id, imp: imp.clone() });
        }
        for (&selector, imp) in &class.class_methods {
            class_method_ties.remove(&selector);
            all_class_methods.insert(selector, MethodEntry { defining: id, imp: imp.clone() });
        }
        if let Some(&selector) = method_ties.iter().chain(class_method_ties.iter()).next() {
            return Err(RunError::class_construction(format!(
                "selector #{} is defined by more than one parent of {} and not overridden",
                interns.get(selector),
                class.display_name()
            )));
        }
        for &slot in &class.slot_names {
            if all_slot_names.contains(&slot) {
                return Err(RunError::class_construction(format!(
                    "slot '{}' conflicts with an inherited slot on {}",
                    interns.get(slot),
                    class.display_name()
                )));
            }
            all_slot_names.push(slot);
        }

        let class = self.get_mut(id);
        class.all_methods = all_methods;
        class.all_class_methods = all_class_methods;
        class.all_slot_names = all_slot_names;
        Ok(())
    }
}

/// Fixed ids of the kernel classes, assigned during bootstrap.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Kernel {
    pub object: ClassId,
    pub undefined_object: ClassId,
    pub boolean: ClassId,
    pub number: ClassId,
    pub integer: ClassId,
    pub float: ClassId,
    pub string: ClassId,
    pub symbol: ClassId,
    pub array: ClassId,
    pub table: ClassId,
    pub block: ClassId,
    pub exception: ClassId,
    pub message: ClassId,
    pub process: ClassId,
    pub monitor: ClassId,
    pub semaphore: ClassId,
    pub shared_queue: ClassId,
    pub processor: ClassId,
    pub scheduler: ClassId,
}

impl Kernel {
    /// The class a value dispatches through.
    pub fn class_of(&self, heap: &Heap, value: Value) -> ClassId {
        match value {
            Value::Nil => self.undefined_object,
            Value::Bool(_) => self.boolean,
            Value::Int(_) => self.integer,
            Value::Float(_) => self.float,
            Value::Symbol(_) => self.symbol,
            // Class-side dispatch consults all_class_methods instead; this is
            // only reached for instance-side fallbacks.
            Value::Class(id) => id,
            Value::Ref(id) => match heap.get(id) {
                HeapData::Str(_) => self.string,
                HeapData::Array(_) => self.array,
                HeapData::Table(_) => self.table,
                HeapData::Closure(_) => self.block,
                HeapData::Instance(inst) => inst.class,
                HeapData::Cell(_) => self.object,
                HeapData::Monitor(_) => self.monitor,
                HeapData::Semaphore(_) => self.semaphore,
                HeapData::SharedQueue(_) => self.shared_queue,
                HeapData::Process(_) => self.process,
                HeapData::Proxy { class, .. } => *class,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Classes, Interns, ClassId) {
        let mut classes = Classes::default();
        let interns = Interns::new();
        let root = classes.new_class(Some("Object"), vec![], vec![], &interns).unwrap();
        (classes, interns, root)
    }

    #[test]
    fn derive_extends_slot_layout_and_generates_accessors() {
        let (mut classes, mut interns, root) = setup();
        let x = interns.intern("x");
        let y = interns.intern("y");
        let point = classes.derive(root, vec![x, y], &mut interns).unwrap();
        assert_eq!(classes.get(point).all_slot_names, vec![x, y]);
        let x_setter = interns.intern("x:");
        assert!(matches!(
            classes.get(point).all_methods.get(&x).map(|e| &e.imp),
            Some(MethodImp::SlotGet(0))
        ));
        assert!(matches!(
            classes.get(point).all_methods.get(&x_setter).map(|e| &e.imp),
            Some(MethodImp::SlotSet(0))
        ));
    }

    #[test]
    fn duplicate_slot_across_parents_is_a_construction_error() {
        let (mut classes, mut interns, root) = setup();
        let x = interns.intern("x");
        let a = classes.derive(root, vec![x], &mut interns).unwrap();
        let b = classes.derive(root, vec![x], &mut interns).unwrap();
        let child = classes.derive(a, vec![], &mut interns).unwrap();
        let err = classes.add_parent(child, b, &interns).unwrap_err();
        assert_eq!(err.kind, crate::fault::FaultKind::ClassConstruction);
    }

    #[test]
    fn selector_tie_requires_child_override() {
        let (mut classes, mut interns, root) = setup();
        let a = classes.derive(root, vec![], &mut interns).unwrap();
        let b = classes.derive(root, vec![], &mut interns).unwrap();
        let selector = interns.intern("speak");
        classes
            .install_method(a, selector, MethodImp::SlotGet(0), false, &interns)
            .unwrap();
        classes
            .install_method(b, selector, MethodImp::SlotGet(0), false, &interns)
            .unwrap();
        let child = classes.derive(a, vec![], &mut interns).unwrap();
        let err = classes.add_parent(child, b, &interns).unwrap_err();
        assert_eq!(err.kind, crate::fault::FaultKind::ClassConstruction);

        // Overriding on the child resolves the tie.
        classes
            .install_method(child, selector, MethodImp::SlotGet(0), false, &interns)
            .unwrap();
        classes.add_parent(child, b, &interns).unwrap();
        assert_eq!(
            classes.get(child).all_methods.get(&selector).unwrap().defining,
            child
        );
    }

    #[test]
    fn method_change_on_ancestor_is_visible_through_a_chain() {
        let (mut classes, mut interns, root) = setup();
        let a = classes.derive(root, vec![], &mut interns).unwrap();
        let b = classes.derive(a, vec![], &mut interns).unwrap();
        let c = classes.derive(b, vec![], &mut interns).unwrap();
        let selector = interns.intern("ping");
        classes
            .install_method(a, selector, MethodImp::SlotGet(7), false, &interns)
            .unwrap();
        assert!(classes.get(c).all_methods.contains_key(&selector));
        assert_eq!(classes.get(c).all_methods.get(&selector).unwrap().defining, a);
    }

    #[test]
    fn cycle_detection_on_add_parent() {
        let (mut classes, mut interns, root) = setup();
        let a = classes.derive(root, vec![], &mut interns).unwrap();
        let b = classes.derive(a, vec![], &mut interns).unwrap();
        let err = classes.add_parent(a, b, &interns).unwrap_err();
        assert_eq!(err.kind, crate::fault::FaultKind::ClassConstruction);
    }
}
