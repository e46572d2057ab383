//! Recursive-descent parser lowering a token stream into executable nodes.
//!
//! Precedence follows Smalltalk: unary binds tightest, then binary, then
//! keyword messages; cascades attach to the receiver of the last message of
//! the first part. Method-definition sugar (`C >> sel [ … ]`) desugars into
//! `selector:put:` / `classSelector:put:` sends so the VM has a single
//! method-installation path.
//!
//! Nesting depth is capped so hostile input fails with a parse fault instead
//! of exhausting the host stack.

use smallvec::SmallVec;

use crate::{
    ast::{AstArena, BlockTemplate, BlockTemplateId, Literal, Node, NodeId, PseudoVar, Templates},
    fault::{RunError, RunResult},
    intern::{Interns, StaticNames, SymbolId},
    lex::{Token, TokenKind, tokenize},
};

/// Maximum expression nesting depth, preventing host stack overflow from
/// pathological inputs like `((((…))))`.
const MAX_NESTING_DEPTH: u16 = 200;

/// Parses a whole program into top-level statement nodes.
pub(crate) fn parse_program(
    source: &str,
    interns: &mut Interns,
    ast: &mut AstArena,
    templates: &mut Templates,
) -> RunResult<Vec<NodeId>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        arrow_stop: 0,
        just_parsed_def: false,
        interns,
        ast,
        templates,
    };
    let statements = parser.parse_statements(&TokenKind::Eof)?;
    parser.expect(&TokenKind::Eof)?;
    Ok(statements)
}

/// Receiver position: either an ordinary node or a `super` marker, which only
/// becomes a node once a message is sent to it.
enum Recv {
    Node(NodeId),
    Super(Option<SymbolId>),
}

/// The outermost message send built at some precedence level, kept so a
/// following `;` can reparent it as the first cascade message.
struct SendInfo {
    receiver: NodeId,
    selector: SymbolId,
    args: SmallVec<[NodeId; 4]>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: u16,
    /// Non-zero while parsing a table key, where `->` terminates the key.
    arrow_stop: u32,
    /// Method definitions end with `]` and need no statement separator.
    just_parsed_def: bool,
    interns: &'a mut Interns,
    ast: &'a mut AstArena,
    templates: &'a mut Templates,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn bump(&mut self) -> TokenKind {
        let token = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> RunError {
        let token = &self.tokens[self.pos];
        RunError::parse(format!("line {}:{}: {}", token.line, token.col, message.into()))
    }

    fn expect(&mut self, kind: &TokenKind) -> RunResult<()> {
        if self.peek() == kind {
            self.bump();
            Ok(())
        } else {
            Err(self.error_here(format!("expected {kind:?}, found {:?}", self.peek())))
        }
    }

    fn enter(&mut self) -> RunResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error_here("expression nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn node(&mut self, node: Node) -> NodeId {
        self.ast.push(node)
    }

    fn to_node(&self, recv: Recv) -> RunResult<NodeId> {
        match recv {
            Recv::Node(id) => Ok(id),
            Recv::Super(_) => Err(self.error_here("'super' must be the receiver of a message")),
        }
    }

    fn build_send(&mut self, recv: Recv, selector: SymbolId, args: SmallVec<[NodeId; 4]>) -> (NodeId, Option<SendInfo>) {
        match recv {
            Recv::Node(receiver) => {
                let node = self.node(Node::Message {
                    receiver: Some(receiver),
                    selector,
                    args: args.clone(),
                });
                (node, Some(SendInfo { receiver, selector, args }))
            }
            Recv::Super(qualifier) => {
                let node = self.node(Node::SuperSend { selector, args, qualifier });
                (node, None)
            }
        }
    }

    // --- statements ---

    fn parse_statements(&mut self, terminator: &TokenKind) -> RunResult<Vec<NodeId>> {
        let mut statements = Vec::new();
        loop {
            while self.peek() == &TokenKind::Period {
                self.bump();
            }
            if self.peek() == terminator || self.peek() == &TokenKind::Eof {
                break;
            }
            self.just_parsed_def = false;
            statements.push(self.parse_statement()?);
            match self.peek() {
                TokenKind::Period => {
                    self.bump();
                }
                kind if kind == terminator => break,
                TokenKind::Eof => break,
                _ if self.just_parsed_def => {}
                _ => return Err(self.error_here(format!("expected '.', found {:?}", self.peek()))),
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> RunResult<NodeId> {
        if self.peek() == &TokenKind::Caret {
            self.bump();
            let value = match self.peek() {
                TokenKind::Period | TokenKind::RBracket | TokenKind::Eof => None,
                _ => Some(self.parse_expr()?),
            };
            return Ok(self.node(Node::Return(value)));
        }
        if let Some(node) = self.try_parse_method_def()? {
            return Ok(node);
        }
        self.parse_expr()
    }

    /// Recognizes `C >> pattern [ … ]` and `C class >> pattern [ … ]`,
    /// rolling back when the shape does not match.
    fn try_parse_method_def(&mut self) -> RunResult<Option<NodeId>> {
        let TokenKind::Ident(class_name) = self.peek() else {
            return Ok(None);
        };
        let class_name = class_name.clone();
        let class_side = matches!(self.peek_at(1), TokenKind::Ident(word) if word == "class");
        let arrow_at = if class_side { 2 } else { 1 };
        if !matches!(self.peek_at(arrow_at), TokenKind::BinOp(op) if op == ">>") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += arrow_at + 1;

        let mut selector = String::new();
        let mut params: SmallVec<[SymbolId; 4]> = SmallVec::new();
        match self.peek().clone() {
            TokenKind::Keyword(_) => {
                while let TokenKind::Keyword(part) = self.peek().clone() {
                    self.bump();
                    selector.push_str(&part);
                    let TokenKind::Ident(param) = self.bump() else {
                        self.pos = start;
                        return Ok(None);
                    };
                    params.push(self.interns.intern(&param));
                }
            }
            TokenKind::BinOp(op) => {
                self.bump();
                selector.push_str(&op);
                let TokenKind::Ident(param) = self.bump() else {
                    self.pos = start;
                    return Ok(None);
                };
                params.push(self.interns.intern(&param));
            }
            TokenKind::Ident(name) => {
                self.bump();
                selector.push_str(&name);
            }
            _ => {
                self.pos = start;
                return Ok(None);
            }
        }
        if self.peek() != &TokenKind::LBracket {
            self.pos = start;
            return Ok(None);
        }
        self.bump();
        let template = self.parse_block_body(params)?;

        let class_node = {
            let sym = self.interns.intern(&class_name);
            self.node(Node::Ident(sym))
        };
        let selector_sym = self.interns.intern(&selector);
        let selector_lit = self.node(Node::Literal(Literal::Symbol(selector_sym)));
        let block_node = self.node(Node::Block(template));
        let install = if class_side {
            StaticNames::ClassSelectorPut.sym()
        } else {
            StaticNames::SelectorPut.sym()
        };
        self.just_parsed_def = true;
        Ok(Some(self.node(Node::Message {
            receiver: Some(class_node),
            selector: install,
            args: SmallVec::from_vec(vec![selector_lit, block_node]),
        })))
    }

    // --- expressions ---

    fn parse_expr(&mut self) -> RunResult<NodeId> {
        self.enter()?;
        let result = self.parse_expr_inner();
        self.leave();
        result
    }

    fn parse_expr_inner(&mut self) -> RunResult<NodeId> {
        if let TokenKind::Ident(name) = self.peek() {
            if self.peek_at(1) == &TokenKind::Assign {
                let name = name.clone();
                self.bump();
                self.bump();
                let sym = self.interns.intern(&name);
                let expr = self.parse_expr()?;
                return Ok(self.node(Node::Assign { name: sym, expr }));
            }
        }
        self.parse_cascade()
    }

    fn parse_cascade(&mut self) -> RunResult<NodeId> {
        let (node, info) = self.parse_keyword()?;
        if self.peek() != &TokenKind::Semicolon {
            return Ok(node);
        }
        let Some(info) = info else {
            return Err(self.error_here("cascade requires a message send on its left"));
        };
        let mut messages = vec![(info.selector, info.args)];
        while self.peek() == &TokenKind::Semicolon {
            self.bump();
            messages.push(self.parse_cascade_message()?);
        }
        Ok(self.node(Node::Cascade { receiver: info.receiver, messages }))
    }

    /// One message of a cascade tail: a keyword, binary, or unary message
    /// sent to the saved cascade receiver.
    fn parse_cascade_message(&mut self) -> RunResult<(SymbolId, SmallVec<[NodeId; 4]>)> {
        match self.peek().clone() {
            TokenKind::Keyword(_) => {
                let mut selector = String::new();
                let mut args: SmallVec<[NodeId; 4]> = SmallVec::new();
                while let TokenKind::Keyword(part) = self.peek().clone() {
                    self.bump();
                    selector.push_str(&part);
                    let (arg, _) = self.parse_binary()?;
                    args.push(self.to_node(arg)?);
                }
                Ok((self.interns.intern(&selector), args))
            }
            TokenKind::BinOp(op) => {
                self.bump();
                let (arg, _) = self.parse_unary()?;
                let arg = self.to_node(arg)?;
                Ok((self.interns.intern(&op), SmallVec::from_vec(vec![arg])))
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok((self.interns.intern(&name), SmallVec::new()))
            }
            _ => Err(self.error_here("expected a message after ';'")),
        }
    }

    fn parse_keyword(&mut self) -> RunResult<(NodeId, Option<SendInfo>)> {
        let (left, left_info) = self.parse_binary()?;
        if !matches!(self.peek(), TokenKind::Keyword(_)) {
            let node = self.to_node(left)?;
            return Ok((node, left_info));
        }
        let mut selector = String::new();
        let mut args: SmallVec<[NodeId; 4]> = SmallVec::new();
        while let TokenKind::Keyword(part) = self.peek().clone() {
            self.bump();
            selector.push_str(&part);
            let (arg, _) = self.parse_binary()?;
            args.push(self.to_node(arg)?);
        }
        let sym = self.interns.intern(&selector);
        let (node, info) = self.build_send(left, sym, args);
        Ok((node, info))
    }

    fn parse_binary(&mut self) -> RunResult<(Recv, Option<SendInfo>)> {
        let (mut left, mut info) = self.parse_unary()?;
        loop {
            let TokenKind::BinOp(op) = self.peek() else { break };
            if op == "->" && self.arrow_stop > 0 {
                break;
            }
            let op = op.clone();
            self.bump();
            let (right, _) = self.parse_unary()?;
            let right = self.to_node(right)?;
            let sym = self.interns.intern(&op);
            let (node, send) = self.build_send(left, sym, SmallVec::from_vec(vec![right]));
            left = Recv::Node(node);
            info = send;
        }
        Ok((left, info))
    }

    fn parse_unary(&mut self) -> RunResult<(Recv, Option<SendInfo>)> {
        let mut recv = self.parse_primary()?;
        let mut info = None;
        loop {
            let TokenKind::Ident(name) = self.peek() else { break };
            // `C class >> …` at statement level never reaches here, so a
            // bare trailing `class` is an ordinary unary send.
            let name = name.clone();
            self.bump();
            let sym = self.interns.intern(&name);
            let (node, send) = self.build_send(recv, sym, SmallVec::new());
            recv = Recv::Node(node);
            info = send;
        }
        Ok((recv, info))
    }

    fn parse_primary(&mut self) -> RunResult<Recv> {
        self.enter()?;
        let result = self.parse_primary_inner();
        self.leave();
        result
    }

    fn parse_primary_inner(&mut self) -> RunResult<Recv> {
        let node = match self.bump() {
            TokenKind::Int(i) => self.node(Node::Literal(Literal::Int(i))),
            TokenKind::Float(f) => self.node(Node::Literal(Literal::Float(f))),
            TokenKind::Str(s) => self.node(Node::Literal(Literal::Str(s.into()))),
            TokenKind::Sym(s) => {
                let sym = self.interns.intern(&s);
                self.node(Node::Literal(Literal::Symbol(sym)))
            }
            TokenKind::HashParen => {
                let elements = self.parse_literal_array()?;
                self.node(Node::Literal(Literal::Array(elements)))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "self" => self.node(Node::PseudoVar(PseudoVar::SelfVar)),
                "nil" => self.node(Node::PseudoVar(PseudoVar::Nil)),
                "true" => self.node(Node::PseudoVar(PseudoVar::True)),
                "false" => self.node(Node::PseudoVar(PseudoVar::False)),
                "thisProcess" => self.node(Node::PseudoVar(PseudoVar::ThisProcess)),
                "super" => return Ok(Recv::Super(None)),
                _ => {
                    let sym = self.interns.intern(&name);
                    self.node(Node::Ident(sym))
                }
            },
            TokenKind::SuperQualified(name) => {
                let sym = self.interns.intern(&name);
                return Ok(Recv::Super(Some(sym)));
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                inner
            }
            TokenKind::LBracket => {
                let template = self.parse_block_body(SmallVec::new())?;
                self.node(Node::Block(template))
            }
            TokenKind::LBrace => {
                let elements = self.parse_brace_elements()?;
                self.node(Node::Array(elements))
            }
            TokenKind::HashBrace => {
                let entries = self.parse_table_entries()?;
                self.node(Node::Table(entries))
            }
            other => return Err(RunError::parse(format!(
                "line {}:{}: unexpected {:?}",
                self.tokens[self.pos.saturating_sub(1)].line,
                self.tokens[self.pos.saturating_sub(1)].col,
                other
            ))),
        };
        Ok(Recv::Node(node))
    }

    /// Body of a block or method, after the opening bracket. `params` is
    /// pre-filled for method definitions; otherwise `:arg` declarations are
    /// read here.
    fn parse_block_body(&mut self, preset_params: SmallVec<[SymbolId; 4]>) -> RunResult<BlockTemplateId> {
        let mut params = preset_params;
        if params.is_empty() {
            while let TokenKind::BlockArg(name) = self.peek().clone() {
                self.bump();
                params.push(self.interns.intern(&name));
            }
            if !params.is_empty() {
                if self.peek() != &TokenKind::Pipe {
                    return Err(self.error_here("expected '|' after block parameters"));
                }
                self.bump();
            }
        }
        let mut temps: SmallVec<[SymbolId; 4]> = SmallVec::new();
        if self.peek() == &TokenKind::Pipe {
            self.bump();
            while let TokenKind::Ident(name) = self.peek().clone() {
                self.bump();
                temps.push(self.interns.intern(&name));
            }
            self.expect(&TokenKind::Pipe)?;
        }

        // `<primitive: #name>` as the first body statement.
        let body = if matches!(self.peek(), TokenKind::BinOp(op) if op == "<")
            && matches!(self.peek_at(1), TokenKind::Keyword(kw) if kw == "primitive:")
        {
            self.bump();
            self.bump();
            let TokenKind::Sym(name) = self.bump() else {
                return Err(self.error_here("expected a symbol after 'primitive:'"));
            };
            let selector = self.interns.intern(&name);
            if !matches!(self.peek(), TokenKind::BinOp(op) if op == ">") {
                return Err(self.error_here("expected '>' closing the primitive declaration"));
            }
            self.bump();
            while self.peek() == &TokenKind::Period {
                self.bump();
            }
            let fallback = self.parse_statements(&TokenKind::RBracket)?;
            vec![self.node(Node::Primitive { selector, fallback })]
        } else {
            self.parse_statements(&TokenKind::RBracket)?
        };
        self.expect(&TokenKind::RBracket)?;
        Ok(self.templates.push(BlockTemplate { params, temps, body }))
    }

    fn parse_brace_elements(&mut self) -> RunResult<Vec<NodeId>> {
        let mut elements = Vec::new();
        loop {
            while self.peek() == &TokenKind::Period {
                self.bump();
            }
            if self.peek() == &TokenKind::RBrace {
                self.bump();
                return Ok(elements);
            }
            elements.push(self.parse_expr()?);
            match self.peek() {
                TokenKind::Period => {}
                TokenKind::RBrace => {}
                _ => return Err(self.error_here("expected '.' or '}' in array expression")),
            }
        }
    }

    fn parse_table_entries(&mut self) -> RunResult<Vec<(NodeId, NodeId)>> {
        let mut entries = Vec::new();
        loop {
            while self.peek() == &TokenKind::Period {
                self.bump();
            }
            if self.peek() == &TokenKind::RBrace {
                self.bump();
                return Ok(entries);
            }
            self.arrow_stop += 1;
            let key = self.parse_keyword();
            self.arrow_stop -= 1;
            let (key, _) = key?;
            if !matches!(self.peek(), TokenKind::BinOp(op) if op == "->") {
                return Err(self.error_here("expected '->' in table entry"));
            }
            self.bump();
            let value = self.parse_expr()?;
            entries.push((key, value));
            match self.peek() {
                TokenKind::Period => {}
                TokenKind::RBrace => {}
                _ => return Err(self.error_here("expected '.' or '}' in table expression")),
            }
        }
    }

    fn parse_literal_array(&mut self) -> RunResult<Vec<Literal>> {
        let mut elements = Vec::new();
        loop {
            match self.bump() {
                TokenKind::RParen => return Ok(elements),
                TokenKind::Int(i) => elements.push(Literal::Int(i)),
                TokenKind::Float(f) => elements.push(Literal::Float(f)),
                TokenKind::Str(s) => elements.push(Literal::Str(s.into())),
                TokenKind::Sym(s) => {
                    let sym = self.interns.intern(&s);
                    elements.push(Literal::Symbol(sym));
                }
                TokenKind::Ident(word) => match word.as_str() {
                    "nil" => elements.push(Literal::Nil),
                    "true" => elements.push(Literal::Bool(true)),
                    "false" => elements.push(Literal::Bool(false)),
                    _ => {
                        let sym = self.interns.intern(&word);
                        elements.push(Literal::Symbol(sym));
                    }
                },
                TokenKind::Keyword(part) => {
                    // Adjacent keyword parts fuse into one selector symbol.
                    let mut name = part;
                    while let TokenKind::Keyword(next) = self.peek() {
                        name.push_str(next);
                        self.bump();
                    }
                    let sym = self.interns.intern(&name);
                    elements.push(Literal::Symbol(sym));
                }
                TokenKind::BinOp(op) => {
                    let sym = self.interns.intern(&op);
                    elements.push(Literal::Symbol(sym));
                }
                TokenKind::HashParen | TokenKind::LParen => {
                    elements.push(Literal::Array(self.parse_literal_array()?));
                }
                TokenKind::Eof => return Err(self.error_here("unterminated literal array")),
                other => return Err(self.error_here(format!("{other:?} cannot appear in a literal array"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> (Vec<NodeId>, AstArena, Templates, Interns) {
        let mut interns = Interns::new();
        let mut ast = AstArena::default();
        let mut templates = Templates::default();
        let nodes = parse_program(source, &mut interns, &mut ast, &mut templates).unwrap();
        (nodes, ast, templates, interns)
    }

    fn parse_err(source: &str) -> RunError {
        let mut interns = Interns::new();
        let mut ast = AstArena::default();
        let mut templates = Templates::default();
        parse_program(source, &mut interns, &mut ast, &mut templates).unwrap_err()
    }

    #[test]
    fn keyword_selector_concatenates_parts() {
        let (nodes, ast, _, interns) = parse_ok("p moveBy: 1 and: 2");
        let Node::Message { selector, args, .. } = ast.get(nodes[0]) else {
            panic!("expected a message send");
        };
        assert_eq!(interns.get(*selector), "moveBy:and:");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn precedence_unary_binary_keyword() {
        // `a foo + 2 bar: 3` parses as `(a foo) + 2` receiving `bar: 3`.
        let (nodes, ast, _, interns) = parse_ok("a foo + 2 bar: 3");
        let Node::Message { selector, receiver, .. } = ast.get(nodes[0]) else {
            panic!("expected keyword send");
        };
        assert_eq!(interns.get(*selector), "bar:");
        let Node::Message { selector: plus, .. } = ast.get(receiver.unwrap()) else {
            panic!("expected binary send");
        };
        assert_eq!(interns.get(*plus), "+");
    }

    #[test]
    fn method_definition_desugars_to_selector_put() {
        let (nodes, ast, templates, interns) = parse_ok("Point >> moveBy: dx and: dy [ ^ self ]");
        let Node::Message { selector, args, .. } = ast.get(nodes[0]) else {
            panic!("expected install send");
        };
        assert_eq!(*selector, StaticNames::SelectorPut.sym());
        let Node::Literal(Literal::Symbol(sel)) = ast.get(args[0]) else {
            panic!("expected selector literal");
        };
        assert_eq!(interns.get(*sel), "moveBy:and:");
        let Node::Block(template) = ast.get(args[1]) else {
            panic!("expected block argument");
        };
        assert_eq!(templates.get(*template).params.len(), 2);
    }

    #[test]
    fn class_side_method_definition() {
        let (nodes, ast, ..) = parse_ok("Point class >> origin [ ^ self new ]");
        let Node::Message { selector, .. } = ast.get(nodes[0]) else {
            panic!("expected install send");
        };
        assert_eq!(*selector, StaticNames::ClassSelectorPut.sym());
    }

    #[test]
    fn shift_like_expression_is_not_a_method_def() {
        let (nodes, ast, _, interns) = parse_ok("a >> b");
        let Node::Message { selector, .. } = ast.get(nodes[0]) else {
            panic!("expected binary send");
        };
        assert_eq!(interns.get(*selector), ">>");
    }

    #[test]
    fn cascade_reparents_the_last_send() {
        let (nodes, ast, _, interns) = parse_ok("t at: 1 put: 2; at: 3 put: 4; size");
        let Node::Cascade { receiver, messages } = ast.get(nodes[0]) else {
            panic!("expected cascade");
        };
        assert!(matches!(ast.get(*receiver), Node::Ident(_)));
        assert_eq!(messages.len(), 3);
        assert_eq!(interns.get(messages[0].0), "at:put:");
        assert_eq!(interns.get(messages[2].0), "size");
    }

    #[test]
    fn block_with_params_and_temps() {
        let (nodes, ast, templates, _) = parse_ok("[:a :b | | t | t := a. t]");
        let Node::Block(id) = ast.get(nodes[0]) else {
            panic!("expected block");
        };
        let template = templates.get(*id);
        assert_eq!(template.params.len(), 2);
        assert_eq!(template.temps.len(), 1);
        assert_eq!(template.body.len(), 2);
    }

    #[test]
    fn primitive_declaration_with_fallback() {
        let (nodes, ast, templates, interns) = parse_ok("C >> frob [ <primitive: #frob> ^ nil ]");
        let Node::Message { args, .. } = ast.get(nodes[0]) else {
            panic!("expected install send");
        };
        let Node::Block(id) = ast.get(args[1]) else {
            panic!("expected block");
        };
        let body = &templates.get(*id).body;
        assert_eq!(body.len(), 1);
        let Node::Primitive { selector, fallback } = ast.get(body[0]) else {
            panic!("expected primitive node");
        };
        assert_eq!(interns.get(*selector), "frob");
        assert_eq!(fallback.len(), 1);
    }

    #[test]
    fn literal_array_with_bare_words_and_nesting() {
        let (nodes, ast, _, interns) = parse_ok("#(1 two (3 4) nil true at:put:)");
        let Node::Literal(Literal::Array(items)) = ast.get(nodes[0]) else {
            panic!("expected literal array");
        };
        assert_eq!(items.len(), 6);
        assert_eq!(items[0], Literal::Int(1));
        assert_eq!(items[1], Literal::Symbol(interns.lookup("two").unwrap()));
        assert_eq!(items[2], Literal::Array(vec![Literal::Int(3), Literal::Int(4)]));
        assert_eq!(items[3], Literal::Nil);
        assert_eq!(items[4], Literal::Bool(true));
        assert_eq!(items[5], Literal::Symbol(interns.lookup("at:put:").unwrap()));
    }

    #[test]
    fn table_expression_entries() {
        let (nodes, ast, ..) = parse_ok("#{1 -> 'one'. 'k' -> 2}");
        let Node::Table(entries) = ast.get(nodes[0]) else {
            panic!("expected table node");
        };
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn super_requires_a_message() {
        let err = parse_err("x := super");
        assert!(err.message.contains("super"));
    }

    #[test]
    fn qualified_super_parses() {
        let (nodes, ast, _, interns) = parse_ok("C >> area [ ^ super<Shape> area ]");
        let Node::Message { args, .. } = ast.get(nodes[0]) else {
            panic!("expected install send");
        };
        let Node::Block(..) = ast.get(args[1]) else { panic!() };
        // Dig out the return statement's super send.
        let qualifier = ast.iter().find_map(|node| match node {
            Node::SuperSend { qualifier: Some(q), .. } => Some(*q),
            _ => None,
        });
        assert_eq!(qualifier.map(|q| interns.get(q).to_owned()).as_deref(), Some("Shape"));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(400), ")".repeat(400));
        let err = parse_err(&source);
        assert!(err.message.contains("nesting"));
    }

    #[test]
    fn unterminated_block_is_a_parse_fault() {
        let err = parse_err("[:a | a");
        assert_eq!(err.kind, crate::fault::FaultKind::Parse);
    }
}
