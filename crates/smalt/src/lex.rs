//! Lexer for Smalt source text.
//!
//! Produces a flat token stream the parser consumes. A few rules are
//! context-sensitive and resolved here rather than in the parser:
//!
//! * `-` directly before a digit is a negative literal unless the previous
//!   token could end an operand; inside `#(…)` literal arrays it is always a
//!   negative literal.
//! * `ident:` is one keyword token, except when the colon starts `:=`.
//! * `super<Parent>` (no spaces) is a single qualified-super token, keeping
//!   it distinct from a `<` comparison sent to `super`.
//! * `--` starts a comment running to end of line. Both `'…'` and `"…"`
//!   delimit string literals, with doubled-quote escapes.

use crate::fault::{RunError, RunResult};

/// One token with its source position (1-based line and column).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    /// `#foo`, `#at:put:`, `#+`, `#'spaced name'`.
    Sym(String),
    Ident(String),
    /// One keyword part including its colon, e.g. `at:`.
    Keyword(String),
    /// A run of binary-selector characters, e.g. `+`, `>=`, `>>`, `->`.
    BinOp(String),
    /// `super<Parent>` — super send starting lookup in the named parent.
    SuperQualified(String),
    /// `:name` — a block parameter declaration.
    BlockArg(String),
    Assign,
    Caret,
    Period,
    Semicolon,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// `#(` — literal array open.
    HashParen,
    /// `#{` — dynamic table open.
    HashBrace,
    Eof,
}

const BINARY_CHARS: &[char] = &['+', '-', '*', '/', '\\', '~', '<', '>', '=', '&', '@', '%', ',', '?', '!'];

fn is_binary_char(c: char) -> bool {
    BINARY_CHARS.contains(&c)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
    /// Bracket stack; `true` frames are `#(…)` literal-array context.
    literal_stack: Vec<bool>,
    tokens: Vec<Token>,
}

/// Tokenizes `source`, which must already have any shebang line stripped.
pub(crate) fn tokenize(source: &str) -> RunResult<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        col: 1,
        literal_stack: Vec::new(),
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn error(&self, message: impl Into<String>) -> RunError {
        RunError::parse(format!("line {}:{}: {}", self.line, self.col, message.into()))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.col = 1;
            }
            Some(_) => self.col += 1,
            None => {}
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn push(&mut self, kind: TokenKind, line: u32, col: u32) {
        self.tokens.push(Token { kind, line, col });
    }

    /// True when the previous token can end an operand, which makes a
    /// following `-` a binary selector rather than a sign.
    fn after_operand(&self) -> bool {
        if self.literal_stack.last() == Some(&true) {
            return false;
        }
        matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(
                TokenKind::Int(_)
                    | TokenKind::Float(_)
                    | TokenKind::Str(_)
                    | TokenKind::Sym(_)
                    | TokenKind::Ident(_)
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
            )
        )
    }

    fn run(&mut self) -> RunResult<()> {
        while let Some(c) = self.peek() {
            let (line, col) = (self.line, self.col);
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '-' => {
                    self.bump();
                    match self.peek() {
                        Some('-') => {
                            // Comment to end of line.
                            while let Some(c) = self.bump() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some(d) if d.is_ascii_digit() && !self.after_operand() => {
                            self.lex_number(line, col, true)?;
                        }
                        _ => self.lex_binop('-', line, col),
                    }
                }
                d if d.is_ascii_digit() => {
                    self.lex_number(line, col, false)?;
                }
                '\'' | '"' => {
                    let quote = c;
                    self.bump();
                    let s = self.lex_string(quote)?;
                    self.push(TokenKind::Str(s), line, col);
                }
                '#' => {
                    self.bump();
                    self.lex_hash(line, col)?;
                }
                ':' => {
                    self.bump();
                    match self.peek() {
                        Some('=') => {
                            self.bump();
                            self.push(TokenKind::Assign, line, col);
                        }
                        Some(c) if is_ident_start(c) => {
                            let name = self.lex_ident_body();
                            self.push(TokenKind::BlockArg(name), line, col);
                        }
                        _ => return Err(self.error("unexpected ':'")),
                    }
                }
                c if is_ident_start(c) => {
                    let name = self.lex_ident_body();
                    if self.peek() == Some(':') {
                        // Peek past the colon: `x:= 1` must stay an
                        // assignment to `x`, not a keyword message.
                        let mut ahead = self.chars.clone();
                        ahead.next();
                        if ahead.peek() != Some(&'=') {
                            self.bump();
                            self.push(TokenKind::Keyword(format!("{name}:")), line, col);
                            continue;
                        }
                    }
                    if name == "super" && self.peek() == Some('<') {
                        self.bump();
                        let qualifier = self.lex_ident_body();
                        if qualifier.is_empty() || self.peek() != Some('>') {
                            return Err(self.error("malformed qualified super"));
                        }
                        self.bump();
                        self.push(TokenKind::SuperQualified(qualifier), line, col);
                        continue;
                    }
                    self.push(TokenKind::Ident(name), line, col);
                }
                '^' => {
                    self.bump();
                    self.push(TokenKind::Caret, line, col);
                }
                '.' => {
                    self.bump();
                    self.push(TokenKind::Period, line, col);
                }
                ';' => {
                    self.bump();
                    self.push(TokenKind::Semicolon, line, col);
                }
                '|' => {
                    self.bump();
                    self.push(TokenKind::Pipe, line, col);
                }
                '(' => {
                    self.bump();
                    let nested = self.literal_stack.last() == Some(&true);
                    self.literal_stack.push(nested);
                    self.push(TokenKind::LParen, line, col);
                }
                ')' => {
                    self.bump();
                    self.literal_stack.pop();
                    self.push(TokenKind::RParen, line, col);
                }
                '[' => {
                    self.bump();
                    self.literal_stack.push(false);
                    self.push(TokenKind::LBracket, line, col);
                }
                ']' => {
                    self.bump();
                    self.literal_stack.pop();
                    self.push(TokenKind::RBracket, line, col);
                }
                '{' => {
                    self.bump();
                    self.literal_stack.push(false);
                    self.push(TokenKind::LBrace, line, col);
                }
                '}' => {
                    self.bump();
                    self.literal_stack.pop();
                    self.push(TokenKind::RBrace, line, col);
                }
                c if is_binary_char(c) => {
                    self.bump();
                    self.lex_binop(c, line, col);
                }
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            }
        }
        let (line, col) = (self.line, self.col);
        self.push(TokenKind::Eof, line, col);
        Ok(())
    }

    fn lex_ident_body(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    fn lex_binop(&mut self, first: char, line: u32, col: u32) {
        let mut op = String::from(first);
        while let Some(c) = self.peek() {
            if is_binary_char(c) {
                op.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.push(TokenKind::BinOp(op), line, col);
    }

    fn lex_number(&mut self, line: u32, col: u32, negative: bool) -> RunResult<()> {
        let mut digits = String::new();
        if negative {
            digits.push('-');
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else if c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            // Only a fraction when a digit follows; otherwise the period is
            // a statement separator.
            let mut ahead = self.chars.clone();
            ahead.next();
            if ahead.peek().is_some_and(char::is_ascii_digit) {
                is_float = true;
                digits.push('.');
                self.bump();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        digits.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut ahead = self.chars.clone();
            ahead.next();
            let next = ahead.peek().copied();
            let signed = matches!(next, Some('+' | '-'));
            if signed {
                ahead.next();
            }
            if ahead.peek().is_some_and(char::is_ascii_digit) {
                is_float = true;
                digits.push('e');
                self.bump();
                if signed {
                    digits.push(next.unwrap());
                    self.bump();
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        digits.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        if is_float {
            let value: f64 = digits
                .parse()
                .map_err(|_| self.error(format!("invalid float literal '{digits}'")))?;
            self.push(TokenKind::Float(value), line, col);
        } else {
            let value: i64 = digits
                .parse()
                .map_err(|_| self.error(format!("integer literal '{digits}' out of range")))?;
            self.push(TokenKind::Int(value), line, col);
        }
        Ok(())
    }

    fn lex_string(&mut self, quote: char) -> RunResult<String> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        s.push(quote);
                        self.bump();
                    } else {
                        return Ok(s);
                    }
                }
                Some(c) => s.push(c),
            }
        }
    }

    fn lex_hash(&mut self, line: u32, col: u32) -> RunResult<()> {
        match self.peek() {
            Some('(') => {
                self.bump();
                self.literal_stack.push(true);
                self.push(TokenKind::HashParen, line, col);
            }
            Some('{') => {
                self.bump();
                self.literal_stack.push(false);
                self.push(TokenKind::HashBrace, line, col);
            }
            Some('\'') => {
                self.bump();
                let s = self.lex_string('\'')?;
                self.push(TokenKind::Sym(s), line, col);
            }
            Some(c) if is_ident_start(c) => {
                let mut name = self.lex_ident_body();
                // Keyword symbols: `#at:put:`.
                while self.peek() == Some(':') {
                    name.push(':');
                    self.bump();
                    if self.peek().is_some_and(is_ident_start) {
                        name.push_str(&self.lex_ident_body());
                    } else {
                        break;
                    }
                }
                self.push(TokenKind::Sym(name), line, col);
            }
            Some(c) if is_binary_char(c) => {
                let mut op = String::new();
                while let Some(c) = self.peek() {
                    if is_binary_char(c) {
                        op.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.push(TokenKind::Sym(op), line, col);
            }
            _ => return Err(self.error("unexpected '#'")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keyword_versus_assignment() {
        assert_eq!(
            kinds("x := p at: 1"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Ident("p".into()),
                TokenKind::Keyword("at:".into()),
                TokenKind::Int(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn negative_literals_and_binary_minus() {
        assert_eq!(
            kinds("1 - 2"),
            vec![
                TokenKind::Int(1),
                TokenKind::BinOp("-".into()),
                TokenKind::Int(2),
                TokenKind::Eof
            ]
        );
        assert_eq!(kinds("-3").first(), Some(&TokenKind::Int(-3)));
        // Inside a literal array a sign never becomes a selector.
        assert_eq!(
            kinds("#(1 -3)"),
            vec![TokenKind::HashParen, TokenKind::Int(1), TokenKind::Int(-3), TokenKind::RParen, TokenKind::Eof]
        );
    }

    #[test]
    fn both_quote_styles_are_strings() {
        assert_eq!(kinds("'ab''c'").first(), Some(&TokenKind::Str("ab'c".into())));
        assert_eq!(kinds("\"terminated\"").first(), Some(&TokenKind::Str("terminated".into())));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            kinds("1 -- ignored\n2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn qualified_super_is_one_token() {
        assert_eq!(
            kinds("super<Shape> area").first(),
            Some(&TokenKind::SuperQualified("Shape".into()))
        );
        // With a space this is a comparison send to super.
        assert_eq!(
            kinds("super < x")[1],
            TokenKind::BinOp("<".into())
        );
    }

    #[test]
    fn block_tokens() {
        assert_eq!(
            kinds("[:a | a]"),
            vec![
                TokenKind::LBracket,
                TokenKind::BlockArg("a".into()),
                TokenKind::Pipe,
                TokenKind::Ident("a".into()),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keyword_symbols_merge_parts() {
        assert_eq!(kinds("#at:put:").first(), Some(&TokenKind::Sym("at:put:".into())));
    }

    #[test]
    fn floats_need_a_digit_after_the_period() {
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Float(1.5), TokenKind::Eof]
        );
        assert_eq!(
            kinds("1. 5"),
            vec![TokenKind::Int(1), TokenKind::Period, TokenKind::Int(5), TokenKind::Eof]
        );
    }
}
