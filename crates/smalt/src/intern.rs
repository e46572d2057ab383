//! Selector and symbol interning.
//!
//! Every name the interpreter touches at runtime — selectors, identifiers,
//! symbol literals, slot names — is interned once into a [`Interns`] store and
//! referenced by a [`SymbolId`]. Comparing names is then an integer compare,
//! and method dictionaries key on ids rather than strings.
//!
//! Ids are laid out as follows:
//! * `0 .. count(StaticNames)` — names known at compile time, interned in
//!   enum order during [`Interns::new`], so `StaticNames::Value.sym()` is a
//!   constant id.
//! * `count(StaticNames) ..` — names interned while parsing or running.

use ahash::AHashMap;
use strum::{EnumCount, IntoStaticStr, VariantArray};

/// Index into the interner's storage.
///
/// Uses `u32` to save space. Two ids are equal exactly when the names they
/// were interned from are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SymbolId(u32);

impl SymbolId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Names known at compile time, interned at fixed ids before anything else.
///
/// The strum `serialize` string is the exact source-level spelling; the id of
/// a variant is its discriminant. Covers every selector the VM intercepts,
/// every selector the bootstrap registers a native under, and the handful of
/// slot names the kernel classes carry.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumCount, VariantArray)]
pub(crate) enum StaticNames {
    // Block application and control flow, handled as VM frames.
    #[strum(serialize = "value")]
    Value,
    #[strum(serialize = "value:")]
    Value1,
    #[strum(serialize = "value:value:")]
    Value2,
    #[strum(serialize = "value:value:value:")]
    Value3,
    #[strum(serialize = "valueWithArguments:")]
    ValueWithArguments,
    #[strum(serialize = "ifTrue:")]
    IfTrue,
    #[strum(serialize = "ifFalse:")]
    IfFalse,
    #[strum(serialize = "ifTrue:ifFalse:")]
    IfTrueIfFalse,
    #[strum(serialize = "ifFalse:ifTrue:")]
    IfFalseIfTrue,
    #[strum(serialize = "and:")]
    And,
    #[strum(serialize = "or:")]
    Or,
    #[strum(serialize = "whileTrue:")]
    WhileTrue,
    #[strum(serialize = "whileFalse:")]
    WhileFalse,
    #[strum(serialize = "on:do:")]
    OnDo,

    // Class construction and reflection.
    #[strum(serialize = "new")]
    New,
    #[strum(serialize = "new:")]
    NewSized,
    #[strum(serialize = "derive")]
    Derive,
    #[strum(serialize = "derive:")]
    DeriveSlots,
    #[strum(serialize = "selector:put:")]
    SelectorPut,
    #[strum(serialize = "classSelector:put:")]
    ClassSelectorPut,
    #[strum(serialize = "addParent:")]
    AddParent,
    #[strum(serialize = "doesNotUnderstand:")]
    DoesNotUnderstand,
    #[strum(serialize = "name")]
    Name,
    #[strum(serialize = "name:")]
    NamePut,
    #[strum(serialize = "tags")]
    Tags,
    #[strum(serialize = "tag:")]
    Tag,
    #[strum(serialize = "class")]
    Class,
    #[strum(serialize = "respondsTo:")]
    RespondsTo,
    #[strum(serialize = "isKindOf:")]
    IsKindOf,

    // Object behavior.
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "==")]
    Identical,
    #[strum(serialize = "printString")]
    PrintString,
    #[strum(serialize = "printNl")]
    PrintNl,
    #[strum(serialize = "error:")]
    ErrorSignal,

    // Arithmetic and comparison.
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "//")]
    SlashSlash,
    #[strum(serialize = "\\")]
    Backslash,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = "asFloat")]
    AsFloat,
    #[strum(serialize = "truncated")]
    Truncated,

    // Payload types.
    #[strum(serialize = "size")]
    Size,
    #[strum(serialize = "at:")]
    At,
    #[strum(serialize = "at:put:")]
    AtPut,
    #[strum(serialize = "at:ifAbsent:")]
    AtIfAbsent,
    #[strum(serialize = "add:")]
    Add,
    #[strum(serialize = "copyFrom:to:")]
    CopyFromTo,
    #[strum(serialize = "includesKey:")]
    IncludesKey,
    #[strum(serialize = "removeKey:")]
    RemoveKey,
    #[strum(serialize = "keys")]
    Keys,
    #[strum(serialize = "asString")]
    AsString,
    #[strum(serialize = "asSymbol")]
    AsSymbol,
    #[strum(serialize = "numArgs")]
    NumArgs,

    // Processes and synchronization.
    #[strum(serialize = "fork:")]
    Fork,
    #[strum(serialize = "yield")]
    Yield,
    #[strum(serialize = "activeProcess")]
    ActiveProcess,
    #[strum(serialize = "step")]
    Step,
    #[strum(serialize = "runToCompletion")]
    RunToCompletion,
    #[strum(serialize = "state")]
    State,
    #[strum(serialize = "pid")]
    PidSel,
    #[strum(serialize = "priority")]
    Priority,
    #[strum(serialize = "priority:")]
    PriorityPut,
    #[strum(serialize = "suspend")]
    Suspend,
    #[strum(serialize = "resume")]
    Resume,
    #[strum(serialize = "terminate")]
    Terminate,
    #[strum(serialize = "critical:")]
    Critical,
    #[strum(serialize = "wait")]
    Wait,
    #[strum(serialize = "signal")]
    Signal,
    #[strum(serialize = "signal:")]
    SignalMessage,
    #[strum(serialize = "put:")]
    Put,
    #[strum(serialize = "get")]
    Get,

    // Kernel slot names.
    #[strum(serialize = "message")]
    Message,
    #[strum(serialize = "trace")]
    Trace,
    #[strum(serialize = "selector")]
    Selector,
    #[strum(serialize = "arguments")]
    Arguments,

    // Pseudo-variables, interned so the lexer can compare by id.
    #[strum(serialize = "self")]
    SelfVar,
    #[strum(serialize = "super")]
    SuperVar,
    #[strum(serialize = "nil")]
    NilVar,
    #[strum(serialize = "true")]
    TrueVar,
    #[strum(serialize = "false")]
    FalseVar,
    #[strum(serialize = "thisProcess")]
    ThisProcess,
}

impl StaticNames {
    /// The interned id of this static name.
    #[inline]
    pub const fn sym(self) -> SymbolId {
        SymbolId(self as u32)
    }
}

/// Interned-name store owned by the interpreter.
///
/// Append-only: ids handed out stay valid for the lifetime of the store.
#[derive(Debug)]
pub(crate) struct Interns {
    names: Vec<Box<str>>,
    ids: AHashMap<Box<str>, SymbolId>,
}

impl Interns {
    /// Creates a store with every [`StaticNames`] entry pre-interned at its
    /// fixed id.
    pub fn new() -> Self {
        let mut interns = Self {
            names: Vec::with_capacity(StaticNames::COUNT + 64),
            ids: AHashMap::with_capacity(StaticNames::COUNT + 64),
        };
        for &name in StaticNames::VARIANTS {
            let id = interns.intern(<&'static str>::from(name));
            debug_assert_eq!(id, name.sym());
        }
        interns
    }

    /// Interns `name`, returning its id. Idempotent.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = SymbolId(u32::try_from(self.names.len()).expect("interner overflow"));
        self.names.push(name.into());
        self.ids.insert(name.into(), id);
        id
    }

    /// Returns the name a given id was interned from.
    pub fn get(&self, id: SymbolId) -> &str {
        &self.names[id.index()]
    }

    /// Looks up a name without interning it.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    /// Number of arguments a selector name implies: the number of `:` for a
    /// keyword selector, one for a binary selector, zero for a unary one.
    pub fn selector_arity(&self, id: SymbolId) -> usize {
        let name = self.get(id);
        let colons = name.bytes().filter(|&b| b == b':').count();
        if colons > 0 {
            colons
        } else if name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_names_have_fixed_ids() {
        let interns = Interns::new();
        assert_eq!(interns.get(StaticNames::Value.sym()), "value");
        assert_eq!(interns.get(StaticNames::SelectorPut.sym()), "selector:put:");
        assert_eq!(interns.lookup("whileTrue:"), Some(StaticNames::WhileTrue.sym()));
    }

    #[test]
    fn intern_is_idempotent() {
        let mut interns = Interns::new();
        let a = interns.intern("moveBy:and:");
        let b = interns.intern("moveBy:and:");
        assert_eq!(a, b);
        assert_eq!(interns.get(a), "moveBy:and:");
    }

    #[test]
    fn selector_arity_by_shape() {
        let mut interns = Interns::new();
        assert_eq!(interns.selector_arity(interns.lookup("at:put:").unwrap()), 2);
        assert_eq!(interns.selector_arity(StaticNames::Plus.sym()), 1);
        let foo = interns.intern("foo");
        assert_eq!(interns.selector_arity(foo), 0);
    }
}
