//! Char-level lexer: classifies raw text into spans.
//!
//! No semantic interpretation happens here. String literals know about the
//! doubled-quote escape and `...` line continuation (logical text recorded
//! with markers stripped, physical span kept for diagnostics); comments are
//! delimited but their tag structure is left to the association pass.

use crate::model::Diagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    /// Dotted identifier chain with no interior whitespace, e.g. `a.b.c`
    /// or `get.protected_access`.
    QualifiedName,
    Number,
    Str,
    /// One `%` line comment, or one `%{ … %}` block comment.
    Comment,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    /// Any other single significant character (`=`, `;`, `,`, `<`, `&`, …).
    Punct,
    /// `...` and the rest of its physical line.
    Continuation,
    Newline,
    /// Characters outside the input alphabet, kept for span accounting.
    Other,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub len: usize,
    pub line: usize,
    pub col: usize,
    /// Logical text when it differs from the raw span (string literals
    /// whose continuation markers were stripped).
    pub text: Option<String>,
}

impl Token {
    pub fn raw<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.start + self.len]
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Logical text of a token: stripped form for continuated strings, the raw
/// span otherwise.
pub fn logical_text<'a>(src: &'a str, tok: &'a Token) -> &'a str {
    match &tok.text {
        Some(t) => t.as_str(),
        None => tok.raw(src),
    }
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    i: usize,
    line: usize,
    col: usize,
    toks: Vec<Token>,
    diags: Vec<Diagnostic>,
}

/// Lex one source unit. Always returns the full token stream; lexical
/// problems are reported as diagnostics with best-effort span ends so the
/// later passes can proceed.
pub fn lex(src: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lx = Lexer {
        src,
        chars: src.char_indices().collect(),
        i: 0,
        line: 1,
        col: 1,
        toks: Vec::new(),
        diags: Vec::new(),
    };
    lx.run();
    (lx.toks, lx.diags)
}

impl<'a> Lexer<'a> {
    fn at(&self, i: usize) -> Option<char> {
        self.chars.get(i).map(|&(_, c)| c)
    }

    fn off(&self, i: usize) -> usize {
        self.chars
            .get(i)
            .map(|&(o, _)| o)
            .unwrap_or_else(|| self.src.len())
    }

    /// Consume one char, keeping line/col bookkeeping exact.
    fn bump(&mut self) -> Option<char> {
        let c = self.at(self.i)?;
        self.i += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize, col: usize) {
        let end = self.off(self.i);
        self.toks.push(Token {
            kind,
            start,
            len: end - start,
            line,
            col,
            text: None,
        });
    }

    fn run(&mut self) {
        while let Some(c) = self.at(self.i) {
            let start = self.off(self.i);
            let (line, col) = (self.line, self.col);
            match c {
                ' ' | '\t' => {
                    self.bump();
                }
                '\r' => {
                    self.bump();
                    if self.at(self.i) == Some('\n') {
                        self.bump();
                    }
                    self.push(TokenKind::Newline, start, line, col);
                }
                '\n' => {
                    self.bump();
                    self.push(TokenKind::Newline, start, line, col);
                }
                '%' => self.lex_comment(start, line, col),
                '.' => {
                    if self.looking_at("...") {
                        // marker plus the remainder of the physical line
                        self.bump();
                        self.bump();
                        self.bump();
                        while self.at(self.i).is_some_and(|c| c != '\n') {
                            self.bump();
                        }
                        self.push(TokenKind::Continuation, start, line, col);
                    } else if self.at(self.i + 1).is_some_and(|c| c.is_ascii_digit()) {
                        self.lex_number(start, line, col);
                    } else {
                        self.bump();
                        self.push(TokenKind::Punct, start, line, col);
                    }
                }
                '\'' => {
                    if self.is_transpose_position(start) {
                        self.bump();
                        self.push(TokenKind::Punct, start, line, col);
                    } else {
                        self.lex_string('\'', start, line, col);
                    }
                }
                '"' => self.lex_string('"', start, line, col),
                '(' => self.single(TokenKind::OpenParen, start, line, col),
                ')' => self.single(TokenKind::CloseParen, start, line, col),
                '[' => self.single(TokenKind::OpenBracket, start, line, col),
                ']' => self.single(TokenKind::CloseBracket, start, line, col),
                '{' => self.single(TokenKind::OpenBrace, start, line, col),
                '}' => self.single(TokenKind::CloseBrace, start, line, col),
                c if c.is_ascii_digit() => self.lex_number(start, line, col),
                c if c.is_ascii_alphabetic() || c == '_' => self.lex_name(start, line, col),
                c if c.is_ascii() => self.single(TokenKind::Punct, start, line, col),
                _ => self.single(TokenKind::Other, start, line, col),
            }
        }
    }

    fn single(&mut self, kind: TokenKind, start: usize, line: usize, col: usize) {
        self.bump();
        self.push(kind, start, line, col);
    }

    fn looking_at(&self, pat: &str) -> bool {
        pat.chars()
            .enumerate()
            .all(|(k, p)| self.at(self.i + k) == Some(p))
    }

    /// A quote directly after an identifier, number, closing bracket or
    /// another transpose is the transpose operator, not a string start.
    fn is_transpose_position(&self, start: usize) -> bool {
        match self.toks.last() {
            Some(prev) if prev.end() == start => matches!(
                prev.kind,
                TokenKind::Ident
                    | TokenKind::QualifiedName
                    | TokenKind::Number
                    | TokenKind::CloseParen
                    | TokenKind::CloseBracket
                    | TokenKind::CloseBrace
            ) || (prev.kind == TokenKind::Punct && prev.raw(self.src) == "'"),
            _ => false,
        }
    }

    fn lex_comment(&mut self, start: usize, line: usize, col: usize) {
        if self.looking_at("%{") && self.block_open_alone() {
            // %{ … %} block comment; unterminated closes at end of input
            loop {
                match self.bump() {
                    None => {
                        self.diags
                            .push(Diagnostic::error("unterminated block comment", line, col));
                        break;
                    }
                    Some('\n') => {
                        let rest: String = self
                            .chars[self.i..]
                            .iter()
                            .map(|&(_, c)| c)
                            .take_while(|&c| c != '\n')
                            .collect();
                        if rest.trim() == "%}" {
                            while self.at(self.i).is_some_and(|c| c != '\n') {
                                self.bump();
                            }
                            break;
                        }
                    }
                    Some(_) => {}
                }
            }
            self.push(TokenKind::Comment, start, line, col);
        } else {
            while self.at(self.i).is_some_and(|c| c != '\n') {
                self.bump();
            }
            self.push(TokenKind::Comment, start, line, col);
        }
    }

    /// `%{` only opens a block when nothing but whitespace follows on the
    /// same line.
    fn block_open_alone(&self) -> bool {
        let mut k = self.i + 2;
        while let Some(c) = self.at(k) {
            if c == '\n' {
                return true;
            }
            if c != ' ' && c != '\t' {
                return false;
            }
            k += 1;
        }
        true
    }

    fn lex_string(&mut self, quote: char, start: usize, line: usize, col: usize) {
        let mut logical = String::new();
        logical.push(quote);
        self.bump();
        let mut continued = false;
        loop {
            match self.at(self.i) {
                None => {
                    self.diags
                        .push(Diagnostic::error("unterminated string literal", line, col));
                    break;
                }
                Some('\n') => {
                    self.diags
                        .push(Diagnostic::error("unterminated string literal", line, col));
                    break;
                }
                Some(c) if c == quote => {
                    self.bump();
                    if self.at(self.i) == Some(quote) {
                        // doubled quote: one literal quote character
                        self.bump();
                        logical.push(quote);
                        logical.push(quote);
                    } else {
                        logical.push(quote);
                        break;
                    }
                }
                Some('.') if self.looking_at("...") && self.marker_ends_line() => {
                    // continuation: strip the marker, keep the line break
                    self.bump();
                    self.bump();
                    self.bump();
                    while self.at(self.i).is_some_and(|c| c == ' ' || c == '\t') {
                        self.bump();
                    }
                    if self.at(self.i) == Some('\n') {
                        self.bump();
                        logical.push('\n');
                    }
                    continued = true;
                }
                Some(c) => {
                    self.bump();
                    logical.push(c);
                }
            }
        }
        let end = self.off(self.i);
        self.toks.push(Token {
            kind: TokenKind::Str,
            start,
            len: end - start,
            line,
            col,
            text: if continued { Some(logical) } else { None },
        });
    }

    /// True when `...` at the cursor is followed by only blanks up to the
    /// end of the physical line.
    fn marker_ends_line(&self) -> bool {
        let mut k = self.i + 3;
        while let Some(c) = self.at(k) {
            match c {
                '\n' => return true,
                ' ' | '\t' => k += 1,
                _ => return false,
            }
        }
        true
    }

    fn lex_number(&mut self, start: usize, line: usize, col: usize) {
        while self.at(self.i).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.at(self.i) == Some('.')
            && self.at(self.i + 1).is_some_and(|c| c.is_ascii_digit())
        {
            self.bump();
            while self.at(self.i).is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if self.at(self.i).is_some_and(|c| c == 'e' || c == 'E') {
            let mut k = self.i + 1;
            if self.at(k).is_some_and(|c| c == '+' || c == '-') {
                k += 1;
            }
            if self.at(k).is_some_and(|c| c.is_ascii_digit()) {
                while self.i < k {
                    self.bump();
                }
                while self.at(self.i).is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        if self.at(self.i).is_some_and(|c| c == 'i' || c == 'j') {
            self.bump();
        }
        self.push(TokenKind::Number, start, line, col);
    }

    fn lex_name(&mut self, start: usize, line: usize, col: usize) {
        let mut kind = TokenKind::Ident;
        self.ident_run();
        // glue dotted chains written without whitespace
        while self.at(self.i) == Some('.')
            && !self.looking_at("...")
            && self
                .at(self.i + 1)
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            self.bump();
            self.ident_run();
            kind = TokenKind::QualifiedName;
        }
        self.push(kind, start, line, col);
    }

    fn ident_run(&mut self) {
        while self
            .at(self.i)
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
    }
}
