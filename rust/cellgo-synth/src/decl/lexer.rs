//! Minimal Go tokenizer.
//!
//! Only precise enough to find top-level declarations: it knows about
//! comments, the three literal forms that may contain brackets (interpreted
//! strings, raw strings, runes), brackets, and the tokens after which Go
//! inserts an implicit semicolon at end of line.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// Identifier or keyword.
    Ident(String),
    /// String, rune or number literal, raw text including quotes.
    Literal(String),
    /// `(`, `[` or `{`.
    Open(char),
    /// `)`, `]` or `}`.
    Close(char),
    Comma,
    Semi,
    /// Line break outside of literals. Block comments spanning lines count
    /// as one.
    Newline,
    /// Any other operator or punctuation.
    Op(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// 0-based line where the token starts.
    pub line: usize,
    /// 0-based line where the token ends (differs for raw strings).
    pub end_line: usize,
    /// Char offsets into the newline-joined source.
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Whether a newline right after this token terminates a statement.
    pub fn ends_statement(&self) -> bool {
        match &self.kind {
            TokenKind::Ident(_) | TokenKind::Literal(_) | TokenKind::Close(_) => true,
            TokenKind::Op(op) => op == "++" || op == "--",
            _ => false,
        }
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lexed {
    pub tokens: Vec<Token>,
    /// Lines holding nothing but comments.
    pub comment_lines: BTreeSet<usize>,
}

struct GoLexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    code_lines: BTreeSet<usize>,
    commented_lines: BTreeSet<usize>,
}

impl GoLexer {
    fn new(lines: &[&str]) -> Self {
        Self {
            source: lines.join("\n").chars().collect(),
            pos: 0,
            line: 0,
            tokens: Vec::new(),
            code_lines: BTreeSet::new(),
            commented_lines: BTreeSet::new(),
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind, line: usize, start: usize) {
        for l in line..=self.line {
            self.code_lines.insert(l);
        }
        self.tokens.push(Token {
            kind,
            line,
            end_line: self.line,
            start,
            end: self.pos,
        });
    }

    fn push_newline(&mut self) {
        let line = self.line;
        self.tokens.push(Token {
            kind: TokenKind::Newline,
            line,
            end_line: line,
            start: self.pos,
            end: self.pos,
        });
    }

    fn run(mut self) -> Lexed {
        while let Some(ch) = self.current() {
            let start = self.line;
            let offset = self.pos;
            match ch {
                '\n' => {
                    self.push_newline();
                    self.advance();
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                '/' if self.peek() == Some('/') => {
                    self.commented_lines.insert(start);
                    while !matches!(self.current(), None | Some('\n')) {
                        self.advance();
                    }
                }
                '/' if self.peek() == Some('*') => self.block_comment(),
                '"' | '\'' => {
                    let text = self.quoted(ch);
                    self.push(TokenKind::Literal(text), start, offset);
                }
                '`' => {
                    let text = self.raw_string();
                    self.push(TokenKind::Literal(text), start, offset);
                }
                c if c.is_ascii_digit() => {
                    let text = self.number();
                    self.push(TokenKind::Literal(text), start, offset);
                }
                '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                    let text = self.number();
                    self.push(TokenKind::Literal(text), start, offset);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let text = self.ident();
                    self.push(TokenKind::Ident(text), start, offset);
                }
                '(' | '[' | '{' => {
                    self.advance();
                    self.push(TokenKind::Open(ch), start, offset);
                }
                ')' | ']' | '}' => {
                    self.advance();
                    self.push(TokenKind::Close(ch), start, offset);
                }
                ',' => {
                    self.advance();
                    self.push(TokenKind::Comma, start, offset);
                }
                ';' => {
                    self.advance();
                    self.push(TokenKind::Semi, start, offset);
                }
                _ => {
                    self.advance();
                    let mut op = ch.to_string();
                    if (ch == '+' || ch == '-') && self.current() == Some(ch) {
                        self.advance();
                        op.push(ch);
                    }
                    self.push(TokenKind::Op(op), start, offset);
                }
            }
        }

        let comment_lines = self
            .commented_lines
            .difference(&self.code_lines)
            .copied()
            .collect();
        Lexed {
            tokens: self.tokens,
            comment_lines,
        }
    }

    fn block_comment(&mut self) {
        let start = self.line;
        self.advance();
        self.advance();
        while let Some(ch) = self.advance() {
            if ch == '*' && self.current() == Some('/') {
                self.advance();
                break;
            }
        }
        for l in start..=self.line {
            self.commented_lines.insert(l);
        }
        if self.line > start {
            self.push_newline();
        }
    }

    fn quoted(&mut self, quote: char) -> String {
        let mut text = String::new();
        if let Some(open) = self.advance() {
            text.push(open);
        }
        while let Some(ch) = self.current() {
            if ch == '\n' {
                // Unterminated; leave the newline to the main loop.
                break;
            }
            self.advance();
            text.push(ch);
            if ch == '\\' {
                if let Some(escaped) = self.current().filter(|c| *c != '\n') {
                    self.advance();
                    text.push(escaped);
                }
            } else if ch == quote {
                break;
            }
        }
        text
    }

    fn raw_string(&mut self) -> String {
        let mut text = String::new();
        if let Some(open) = self.advance() {
            text.push(open);
        }
        while let Some(ch) = self.advance() {
            text.push(ch);
            if ch == '`' {
                break;
            }
        }
        text
    }

    fn number(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            let exponent_sign = (ch == '+' || ch == '-')
                && text
                    .chars()
                    .last()
                    .is_some_and(|prev| matches!(prev, 'e' | 'E' | 'p' | 'P'))
                && !text.starts_with("0x")
                && !text.starts_with("0X");
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || exponent_sign {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn ident(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }
}

/// Tokenize cell lines. Line numbers in the result index into `lines`.
pub(crate) fn lex(lines: &[&str]) -> Lexed {
    GoLexer::new(lines).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let lines: Vec<&str> = src.split('\n').collect();
        lex(&lines).tokens.into_iter().map(|t| t.kind).collect()
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.to_string())
    }

    #[test]
    fn idents_brackets_and_newlines() {
        assert_eq!(
            kinds("func f() {\n}"),
            vec![
                ident("func"),
                ident("f"),
                TokenKind::Open('('),
                TokenKind::Close(')'),
                TokenKind::Open('{'),
                TokenKind::Newline,
                TokenKind::Close('}'),
            ]
        );
    }

    #[test]
    fn brackets_inside_literals_are_ignored() {
        let toks = kinds("var s = \"}{\\\"\" + '{' + `\n)\n`");
        assert_eq!(
            toks,
            vec![
                ident("var"),
                ident("s"),
                TokenKind::Op("=".into()),
                TokenKind::Literal("\"}{\\\"\"".into()),
                TokenKind::Op("+".into()),
                TokenKind::Literal("'{'".into()),
                TokenKind::Op("+".into()),
                TokenKind::Literal("`\n)\n`".into()),
            ]
        );
    }

    #[test]
    fn raw_string_spans_lines() {
        let lines = ["x := `a", "b`"];
        let lexed = lex(&lines);
        let lit = lexed.tokens.last().unwrap();
        assert_eq!((lit.line, lit.end_line), (0, 1));
    }

    #[test]
    fn comments_are_skipped_and_recorded() {
        let lines = ["// doc", "type A int // trailing", "/* a", "b */", "x"];
        let lexed = lex(&lines);
        assert_eq!(lexed.comment_lines, BTreeSet::from([0, 2, 3]));
        let idents: Vec<_> = lexed.tokens.iter().filter_map(Token::ident).collect();
        assert_eq!(idents, vec!["type", "A", "int", "x"]);
    }

    #[test]
    fn tokens_carry_char_offsets() {
        let lines = ["var é = 1", "x"];
        let toks = lex(&lines).tokens;
        let spans: Vec<(usize, usize)> = toks.iter().map(|t| (t.start, t.end)).collect();
        assert_eq!(spans, vec![(0, 3), (4, 5), (6, 7), (8, 9), (9, 9), (10, 11)]);
    }

    #[test]
    fn increment_ends_statement() {
        let toks = lex(&["i++"]).tokens;
        assert!(toks.last().unwrap().ends_statement());
        let toks = lex(&["x = 1 +"]).tokens;
        assert!(!toks.last().unwrap().ends_statement());
    }

    #[test]
    fn numbers_with_exponents() {
        assert_eq!(
            kinds("1e-3 0x1F .5"),
            vec![
                TokenKind::Literal("1e-3".into()),
                TokenKind::Literal("0x1F".into()),
                TokenKind::Literal(".5".into()),
            ]
        );
    }
}
