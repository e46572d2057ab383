//! The executable node set.
//!
//! The parser lowers source text into a closed [`Node`] variant stored in an
//! append-only [`AstArena`]; the VM consumes nodes by [`NodeId`] and never
//! reparses. Block bodies live in a parallel [`Templates`] store so that a
//! closure value is an id plus a captured environment, not a cloned subtree.

use smallvec::SmallVec;

use crate::intern::SymbolId;

/// Index of a node in the [`AstArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a block template in [`Templates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockTemplateId(u32);

impl BlockTemplateId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pseudo-variables resolved by the VM without a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PseudoVar {
    SelfVar,
    Nil,
    True,
    False,
    /// The process currently executing, as a Process value.
    ThisProcess,
}

/// A literal as parsed. Evaluation allocates heap payloads fresh each time,
/// so mutating the result of one evaluation never changes the program text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Box<str>),
    Symbol(SymbolId),
    /// `#(…)` — elements are themselves literals; bare words become symbols.
    Array(Vec<Literal>),
}

/// One executable AST node. Children are arena ids, never owned subtrees.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Literal(Literal),
    Ident(SymbolId),
    PseudoVar(PseudoVar),
    Assign {
        name: SymbolId,
        expr: NodeId,
    },
    Message {
        /// `None` means an implicit `self` receiver.
        receiver: Option<NodeId>,
        selector: SymbolId,
        args: SmallVec<[NodeId; 4]>,
    },
    Cascade {
        receiver: NodeId,
        messages: Vec<(SymbolId, SmallVec<[NodeId; 4]>)>,
    },
    SuperSend {
        selector: SymbolId,
        args: SmallVec<[NodeId; 4]>,
        /// `super<Parent>` names the parent class to start lookup in.
        qualifier: Option<SymbolId>,
    },
    Return(Option<NodeId>),
    Block(BlockTemplateId),
    /// `{ e1. e2 }` — a dynamic array.
    Array(Vec<NodeId>),
    /// `#{ k -> v. … }` — a dynamic table.
    Table(Vec<(NodeId, NodeId)>),
    /// Direct slot reference with a precomputed index; produced when a method
    /// body is installed on a class, so slot reads and writes are O(1).
    SlotAccess {
        name: SymbolId,
        index: usize,
        /// `Some` makes this an assignment, evaluating to the stored value.
        value: Option<NodeId>,
    },
    /// `<primitive: #name>` — dispatch to a native routine, falling back to
    /// the remaining body statements when the primitive is absent.
    Primitive {
        selector: SymbolId,
        fallback: Vec<NodeId>,
    },
}

/// Append-only node storage. Ids stay valid for the lifetime of the
/// interpreter, so work frames and installed methods hold plain ids.
#[derive(Debug, Default)]
pub(crate) struct AstArena {
    nodes: Vec<Node>,
}

impl AstArena {
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("AST arena overflow"));
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }
}

/// The compile-time shape of a block: parameters, temporaries, body.
///
/// A runtime closure pairs one of these with a captured environment and a
/// home activation.
#[derive(Debug, Clone)]
pub(crate) struct BlockTemplate {
    pub params: SmallVec<[SymbolId; 4]>,
    pub temps: SmallVec<[SymbolId; 4]>,
    pub body: Vec<NodeId>,
}

/// Append-only block template storage.
#[derive(Debug, Default)]
pub(crate) struct Templates {
    templates: Vec<BlockTemplate>,
}

impl Templates {
    pub fn push(&mut self, template: BlockTemplate) -> BlockTemplateId {
        let id = BlockTemplateId(u32::try_from(self.templates.len()).expect("template overflow"));
        self.templates.push(template);
        id
    }

    pub fn get(&self, id: BlockTemplateId) -> &BlockTemplate {
        &self.templates[id.index()]
    }
}
