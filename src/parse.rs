//! Section state machine and declaration extractor.
//!
//! Walks the token stream at class-body granularity: the class header
//! (name, attribute list, superclass list), then properties/methods/events
//! sections whose attribute sets apply to every declaration inside until
//! the closing `end`. Comment runs stay in the declaration stream so the
//! association pass can attach or echo them later.

use crate::balance;
use crate::lexer::{Token, TokenKind};
use crate::model::*;

/// Block-opening keywords that pair with `end` inside function bodies.
const BLOCK_OPENERS: &[&str] = &[
    "if",
    "for",
    "while",
    "switch",
    "try",
    "parfor",
    "spmd",
    "arguments",
    "function",
];

/// Parse one source unit. `None` means the header was unparseable; a
/// terminal Error diagnostic is present in that case.
pub fn parse(src: &str, tokens: &[Token]) -> (Option<ClassUnit>, Vec<Diagnostic>) {
    let mut p = Parser {
        src,
        toks: tokens,
        i: 0,
        diags: Vec::new(),
    };
    let class = p.parse_unit();
    (class, p.diags)
}

struct Parser<'a> {
    src: &'a str,
    toks: &'a [Token],
    i: usize,
    diags: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.toks.get(self.i)
    }

    fn peek_at(&self, k: usize) -> Option<&'a Token> {
        self.toks.get(self.i + k)
    }

    fn raw(&self, tok: &Token) -> &'a str {
        tok.raw(self.src)
    }

    fn bump(&mut self) {
        self.i += 1;
    }

    fn at_punct(&self, ch: char) -> bool {
        self.peek().is_some_and(|t| {
            t.kind == TokenKind::Punct && self.raw(t).chars().next() == Some(ch)
        })
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        if self.at_punct(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Newline)
        {
            self.bump();
        }
    }

    /// Skip continuation markers and the line breaks they protect.
    fn skip_soft_breaks(&mut self) {
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Continuation)
        {
            self.bump();
            if self.peek().is_some_and(|t| t.kind == TokenKind::Newline) {
                self.bump();
            }
        }
    }

    fn skip_to_newline(&mut self) {
        while self
            .peek()
            .is_some_and(|t| t.kind != TokenKind::Newline)
        {
            self.bump();
        }
    }

    fn warn(&mut self, msg: impl Into<String>, tok: Option<&Token>) {
        let (l, c) = tok.map(|t| (t.line, t.col)).unwrap_or((1, 1));
        self.diags.push(Diagnostic::warning(msg, l, c));
    }

    fn error(&mut self, msg: impl Into<String>, tok: Option<&Token>) {
        let (l, c) = tok.map(|t| (t.line, t.col)).unwrap_or((1, 1));
        self.diags.push(Diagnostic::error(msg, l, c));
    }

    // -- Unit -----------------------------------------------------------------

    fn parse_unit(&mut self) -> Option<ClassUnit> {
        // file-header comments before the classdef line carry no class
        // documentation; skip them
        loop {
            self.skip_newlines();
            if self.peek().is_some_and(|t| t.kind == TokenKind::Comment) {
                self.collect_comment_run();
            } else {
                break;
            }
        }

        let head = self.peek();
        if !head.is_some_and(|t| t.kind == TokenKind::Ident && self.raw(t) == "classdef") {
            let tok = head.cloned();
            self.error("malformed unit: expected a classdef header", tok.as_ref());
            return None;
        }
        self.bump();

        let mut class = ClassUnit::default();
        if self.peek().is_some_and(|t| t.kind == TokenKind::OpenParen) {
            class.attrs = self.parse_attrs();
        }
        self.skip_soft_breaks();

        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                class.name = self.raw(t).to_string();
                self.bump();
            }
            other => {
                let tok = other.cloned();
                self.error("malformed class header: missing class name", tok.as_ref());
                return None;
            }
        }

        self.skip_soft_breaks();
        if self.eat_punct('<') {
            loop {
                self.skip_soft_breaks();
                self.skip_newlines_after_continuation();
                match self.peek() {
                    Some(t)
                        if t.kind == TokenKind::Ident
                            || t.kind == TokenKind::QualifiedName =>
                    {
                        class.superclasses.push(self.raw(t).to_string());
                        self.bump();
                    }
                    other => {
                        let tok = other.cloned();
                        self.warn("malformed superclass list", tok.as_ref());
                        break;
                    }
                }
                self.skip_soft_breaks();
                if !self.eat_punct('&') {
                    break;
                }
            }
        }

        // class body
        loop {
            self.skip_newlines();
            let Some(tok) = self.peek() else { break };
            match tok.kind {
                TokenKind::Comment => {
                    let run = self.collect_comment_run();
                    if class.sections.is_empty() {
                        class.leading_comments.push(run);
                    } else {
                        class.trailing_comments.push(run);
                    }
                }
                TokenKind::Ident if self.raw(tok) == "end" => {
                    self.bump();
                    break;
                }
                TokenKind::Ident if section_kind(self.raw(tok)).is_some() => {
                    let kind = section_kind(self.raw(tok)).unwrap();
                    self.parse_section(&mut class, kind);
                }
                TokenKind::Punct if self.raw(tok) == ";" || self.raw(tok) == "," => {
                    self.bump();
                }
                _ => {
                    let t = tok.clone();
                    self.warn("unexpected token in class body; line skipped", Some(&t));
                    self.skip_to_newline();
                }
            }
        }

        // anything documentary after the closing end still participates in
        // name-tag association
        loop {
            self.skip_newlines();
            if self.peek().is_some_and(|t| t.kind == TokenKind::Comment) {
                let run = self.collect_comment_run();
                class.trailing_comments.push(run);
            } else {
                break;
            }
        }

        Some(class)
    }

    /// In a few recovery paths a continuation has been skipped but its
    /// newline is still pending.
    fn skip_newlines_after_continuation(&mut self) {
        while self.peek().is_some_and(|t| t.kind == TokenKind::Newline)
            && self.i > 0
            && self.toks[self.i - 1].kind == TokenKind::Continuation
        {
            self.bump();
        }
    }

    // -- Attribute lists ------------------------------------------------------

    /// Parse `( Name, Name = value, … )`. On malformed syntax the section
    /// is treated as attribute-free and a Warning is emitted.
    fn parse_attrs(&mut self) -> AttrSet {
        let open = self.peek().cloned();
        self.bump(); // (
        let mut set = AttrSet::default();
        loop {
            self.skip_soft_breaks();
            self.skip_newlines();
            match self.peek() {
                Some(t) if t.kind == TokenKind::CloseParen => {
                    self.bump();
                    return set;
                }
                Some(t) if t.kind == TokenKind::Ident => {
                    let name = self.raw(t).to_string();
                    self.bump();
                    self.skip_soft_breaks();
                    if self.eat_punct('=') {
                        self.skip_soft_breaks();
                        let e = balance::expr_end(self.src, self.toks, self.i, true);
                        let v = balance::single_line(&balance::verbatim_text(
                            self.src, self.toks, self.i, e.end,
                        ));
                        set.entries.push((name, AttrValue::Value(v)));
                        self.i = e.end;
                    } else {
                        set.entries.push((name, AttrValue::True));
                    }
                    self.skip_soft_breaks();
                    self.eat_punct(',');
                }
                other => {
                    let tok = other.cloned().or_else(|| open.clone());
                    self.warn(
                        "malformed attribute list; section treated as having no attributes",
                        tok.as_ref(),
                    );
                    // resynchronize at the closing paren or the line end
                    while let Some(t) = self.peek() {
                        match t.kind {
                            TokenKind::CloseParen => {
                                self.bump();
                                break;
                            }
                            TokenKind::Newline => break,
                            _ => self.bump(),
                        }
                    }
                    return AttrSet::default();
                }
            }
        }
    }

    // -- Sections -------------------------------------------------------------

    fn parse_section(&mut self, class: &mut ClassUnit, kind: SectionKind) {
        self.bump(); // section keyword
        let attrs = if self.peek().is_some_and(|t| t.kind == TokenKind::OpenParen) {
            self.parse_attrs()
        } else {
            AttrSet::default()
        };
        let mut section = Section {
            kind,
            attrs,
            doc: None,
            decls: Vec::new(),
        };
        loop {
            self.skip_newlines();
            let Some(tok) = self.peek() else {
                self.warn("section not closed before end of input", None);
                break;
            };
            match tok.kind {
                TokenKind::Comment => {
                    let run = self.collect_comment_run();
                    section.decls.push(Declaration::Comment(run));
                }
                TokenKind::Ident if self.raw(tok) == "end" => {
                    self.bump();
                    break;
                }
                TokenKind::Ident
                    if section_kind(self.raw(tok)).is_some() && self.looks_like_section_open() =>
                {
                    // a new section opening implicitly closes this one
                    break;
                }
                TokenKind::Punct if self.raw(tok) == ";" || self.raw(tok) == "," => {
                    self.bump();
                }
                _ => match kind {
                    SectionKind::Properties => self.parse_property(&mut section),
                    SectionKind::Methods => self.parse_method(&mut section),
                    SectionKind::Events => self.parse_event(&mut section),
                },
            }
        }
        class.sections.push(section);
    }

    fn looks_like_section_open(&self) -> bool {
        match self.peek_at(1) {
            None => true,
            Some(t) => matches!(
                t.kind,
                TokenKind::OpenParen | TokenKind::Newline | TokenKind::Comment
            ),
        }
    }

    // -- Properties -----------------------------------------------------------

    fn parse_property(&mut self, section: &mut Section) {
        let Some(tok) = self.peek() else { return };
        if tok.kind != TokenKind::Ident {
            let t = tok.clone();
            self.warn("unexpected token in properties section; line skipped", Some(&t));
            self.skip_to_newline();
            return;
        }
        let name_line = tok.line;
        let mut prop = Property {
            name: self.raw(tok).to_string(),
            line: name_line,
            ..Default::default()
        };
        self.bump();

        // optional size/validator annotation: (dims) Type {validators}
        if self.peek().is_some_and(|t| t.kind == TokenKind::OpenParen) {
            match balance::matching_close(self.toks, self.i) {
                Some(close) => self.i = close + 1,
                None => {
                    let t = self.peek().cloned();
                    self.error(
                        "unterminated parenthesis in property declaration; truncated",
                        t.as_ref(),
                    );
                    self.i = self.toks.len();
                    section.decls.push(Declaration::Property(prop));
                    return;
                }
            }
        }
        if self.peek().is_some_and(|t| {
            (t.kind == TokenKind::Ident || t.kind == TokenKind::QualifiedName)
                && t.line == name_line
                && self.raw(t) != "end"
        }) {
            prop.type_name = Some(self.raw(self.peek().unwrap()).to_string());
            self.bump();
            if self.peek().is_some_and(|t| t.kind == TokenKind::OpenBrace) {
                match balance::matching_close(self.toks, self.i) {
                    Some(close) => self.i = close + 1,
                    None => self.i = self.toks.len(),
                }
            }
        }

        if self.at_punct('=') {
            let eq = self.peek().cloned();
            self.bump();
            self.skip_soft_breaks();
            let e = balance::expr_end(self.src, self.toks, self.i, true);
            if !e.balanced {
                self.error(
                    "unterminated default value expression; truncated at end of input",
                    eq.as_ref(),
                );
            }
            let verbatim = balance::verbatim_text(self.src, self.toks, self.i, e.end);
            let single = balance::single_line(&verbatim);
            prop.default = Some(DefaultValue {
                verbatim,
                single_line: single,
            });
            self.i = e.end;
            if e.terminated {
                self.bump(); // ;
                prop.has_terminator = true;
            } else {
                self.eat_punct(',');
            }
        } else if self.eat_punct(';') {
            prop.has_terminator = true;
        } else {
            self.eat_punct(',');
        }

        section.decls.push(Declaration::Property(prop));
    }

    // -- Methods --------------------------------------------------------------

    fn parse_method(&mut self, section: &mut Section) {
        let abstract_section = section.attrs.is_set("Abstract");
        let Some(tok) = self.peek() else { return };
        let line = tok.line;

        if tok.kind == TokenKind::Ident && self.raw(tok) == "function" {
            self.bump();
            let Some((name, outputs, params)) = self.parse_signature() else {
                self.skip_to_newline();
                return;
            };
            self.eat_punct(';');
            let (body_text, doc_run) = self.scan_body(line);
            let body = if abstract_section {
                if !body_text.trim().is_empty() {
                    self.diags.push(Diagnostic::warning(
                        format!("abstract method '{}' has a body; body discarded", name),
                        line,
                        1,
                    ));
                }
                BodyKind::Abstract
            } else {
                BodyKind::Inline(body_text)
            };
            section.decls.push(Declaration::Method(Method {
                name,
                params,
                outputs,
                body,
                doc_comment: doc_run,
                doc: None,
                line,
            }));
            return;
        }

        // signature-only declaration (defined elsewhere, or abstract)
        if !matches!(
            tok.kind,
            TokenKind::Ident | TokenKind::QualifiedName | TokenKind::OpenBracket
        ) {
            let t = tok.clone();
            self.warn("unexpected token in methods section; line skipped", Some(&t));
            self.skip_to_newline();
            return;
        }
        let Some((name, outputs, params)) = self.parse_signature() else {
            self.skip_to_newline();
            return;
        };
        self.eat_punct(';');
        let body = if abstract_section {
            BodyKind::Abstract
        } else {
            BodyKind::DeclaredOnly
        };
        section.decls.push(Declaration::Method(Method {
            name,
            params,
            outputs,
            body,
            doc_comment: None,
            doc: None,
            line,
        }));
    }

    /// Parse `[outs] = name(args)`, `out = name(args)`, `name(args)` or a
    /// bare `name`. Returns `None` when no method name can be recovered.
    fn parse_signature(&mut self) -> Option<(String, Vec<String>, Vec<String>)> {
        let mut outputs: Vec<String> = Vec::new();
        let name: String;

        match self.peek() {
            Some(t) if t.kind == TokenKind::OpenBracket => {
                self.bump();
                loop {
                    self.skip_soft_breaks();
                    self.skip_newlines_after_continuation();
                    match self.peek() {
                        Some(t)
                            if t.kind == TokenKind::Ident
                                || t.kind == TokenKind::QualifiedName =>
                        {
                            outputs.push(self.raw(t).to_string());
                            self.bump();
                        }
                        Some(t) if t.kind == TokenKind::CloseBracket => {
                            self.bump();
                            break;
                        }
                        Some(t)
                            if t.kind == TokenKind::Punct
                                && (self.raw(t) == "," || self.raw(t) == "~") =>
                        {
                            if self.raw(t) == "~" {
                                outputs.push("~".to_string());
                            }
                            self.bump();
                        }
                        other => {
                            let tok = other.cloned();
                            self.warn("malformed output list", tok.as_ref());
                            return None;
                        }
                    }
                }
                self.skip_soft_breaks();
                if !self.eat_punct('=') {
                    let t = self.peek().cloned();
                    self.warn("expected '=' after output list", t.as_ref());
                }
                name = self.expect_name()?;
            }
            Some(t) if t.kind == TokenKind::Ident || t.kind == TokenKind::QualifiedName => {
                let first = self.raw(t).to_string();
                self.bump();
                self.skip_soft_breaks();
                if self.at_punct('=') {
                    self.bump();
                    outputs.push(first);
                    self.skip_soft_breaks();
                    name = self.expect_name()?;
                } else {
                    name = first;
                }
            }
            other => {
                let tok = other.cloned();
                self.warn("expected a method name", tok.as_ref());
                return None;
            }
        }

        let mut params: Vec<String> = Vec::new();
        if self.peek().is_some_and(|t| t.kind == TokenKind::OpenParen) {
            let open = self.i;
            match balance::matching_close(self.toks, open) {
                Some(close) => {
                    for t in &self.toks[open + 1..close] {
                        match t.kind {
                            TokenKind::Ident | TokenKind::QualifiedName => {
                                params.push(self.raw(t).to_string());
                            }
                            TokenKind::Punct if self.raw(t) == "~" => {
                                params.push("~".to_string());
                            }
                            _ => {}
                        }
                    }
                    self.i = close + 1;
                }
                None => {
                    let t = self.peek().cloned();
                    self.error("unterminated parameter list; truncated", t.as_ref());
                    self.i = self.toks.len();
                }
            }
        }

        Some((name, outputs, params))
    }

    fn expect_name(&mut self) -> Option<String> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident || t.kind == TokenKind::QualifiedName => {
                let n = self.raw(t).to_string();
                self.bump();
                Some(n)
            }
            other => {
                let tok = other.cloned();
                self.warn("expected a method name", tok.as_ref());
                None
            }
        }
    }

    /// Capture a function body up to its matching `end`, tracking nesting
    /// over block-opening keywords. `end` occurrences inside brackets or
    /// strings never count. Returns the body text (doc block stripped, `%`
    /// comments converted) and the leading doc comment run.
    fn scan_body(&mut self, sig_line: usize) -> (String, Option<CommentRun>) {
        // leading doc block: first comment run of the body
        self.skip_newlines();
        let doc_run = if self.peek().is_some_and(|t| t.kind == TokenKind::Comment) {
            Some(self.collect_comment_run())
        } else {
            None
        };
        self.skip_newlines();

        let body_first = self.i;
        let mut nesting: usize = 1;
        let mut depth: usize = 0;
        let mut stmt_start = true;
        let mut after_continuation = false;
        let mut end_tok: Option<usize> = None;

        let mut j = self.i;
        while j < self.toks.len() {
            let t = &self.toks[j];
            match t.kind {
                TokenKind::Newline => {
                    if !after_continuation {
                        stmt_start = true;
                    }
                    after_continuation = false;
                }
                TokenKind::Continuation => after_continuation = true,
                TokenKind::Comment => {}
                TokenKind::Punct => {
                    let r = self.raw(t);
                    if r == ";" || r == "," {
                        stmt_start = true;
                    } else {
                        stmt_start = false;
                    }
                }
                TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::OpenBrace => {
                    depth += 1;
                    stmt_start = false;
                }
                TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::CloseBrace => {
                    depth = depth.saturating_sub(1);
                    stmt_start = false;
                }
                TokenKind::Ident => {
                    let r = self.raw(t);
                    if depth == 0 && stmt_start && BLOCK_OPENERS.contains(&r) {
                        nesting += 1;
                    } else if depth == 0 && stmt_start && r == "end" {
                        nesting -= 1;
                        if nesting == 0 {
                            end_tok = Some(j);
                            break;
                        }
                    }
                    stmt_start = false;
                }
                _ => stmt_start = false,
            }
            j += 1;
        }

        let body_end = match end_tok {
            Some(e) => {
                self.i = e + 1;
                e
            }
            None => {
                self.diags.push(Diagnostic::error(
                    "function body not closed; truncated at end of input",
                    sig_line,
                    1,
                ));
                self.i = self.toks.len();
                self.toks.len()
            }
        };

        (self.body_text(body_first, body_end), doc_run)
    }

    /// Assemble body text from whole source lines, converting `%` comments
    /// to `/* … */` and leaving everything else untouched.
    fn body_text(&self, first: usize, end: usize) -> String {
        if first >= end {
            return String::new();
        }
        let start_off = line_start(self.src, self.toks[first].start);
        let end_off = self.toks[end - 1].end();
        let mut out = String::new();
        let mut cur = start_off;
        for t in &self.toks[first..end] {
            if t.kind == TokenKind::Comment {
                out.push_str(&self.src[cur..t.start]);
                out.push_str(&convert_comment(self.raw(t)));
                cur = t.end();
            }
        }
        out.push_str(&self.src[cur..end_off]);
        let trimmed = out.trim_matches(|c| c == '\n' || c == '\r');
        trimmed.trim_end().to_string()
    }

    // -- Events ---------------------------------------------------------------

    fn parse_event(&mut self, section: &mut Section) {
        let Some(tok) = self.peek() else { return };
        if tok.kind != TokenKind::Ident {
            let t = tok.clone();
            self.warn("unexpected token in events section; line skipped", Some(&t));
            self.skip_to_newline();
            return;
        }
        let ev = Event {
            name: self.raw(tok).to_string(),
            doc: None,
            line: tok.line,
        };
        self.bump();
        self.eat_punct(';');
        section.decls.push(Declaration::Event(ev));
    }

    // -- Comment runs ---------------------------------------------------------

    /// Collect one comment run: consecutive `%` lines with no blank line in
    /// between (a `%{ %}` block counts as one run).
    fn collect_comment_run(&mut self) -> CommentRun {
        let first = self.peek().unwrap().clone();
        let mut run = CommentRun {
            lines: comment_lines(self.raw(&first)),
            line: first.line,
        };
        let mut last_line = first.line + count_newlines(self.raw(&first));
        self.bump();
        loop {
            let next_is_adjacent = self.peek().is_some_and(|t| t.kind == TokenKind::Newline)
                && self.peek_at(1).is_some_and(|t| {
                    t.kind == TokenKind::Comment && t.line == last_line + 1
                });
            if !next_is_adjacent {
                break;
            }
            self.bump(); // newline
            let tok = self.peek().unwrap().clone();
            run.lines.extend(comment_lines(self.raw(&tok)));
            last_line = tok.line + count_newlines(self.raw(&tok));
            self.bump();
        }
        run
    }
}

fn section_kind(word: &str) -> Option<SectionKind> {
    match word {
        "properties" => Some(SectionKind::Properties),
        "methods" => Some(SectionKind::Methods),
        "events" => Some(SectionKind::Events),
        _ => None,
    }
}

fn count_newlines(s: &str) -> usize {
    s.chars().filter(|&c| c == '\n').count()
}

/// Byte offset of the start of the line containing `off`.
fn line_start(src: &str, off: usize) -> usize {
    src[..off].rfind('\n').map(|p| p + 1).unwrap_or(0)
}

/// Text lines of a comment token, `%` markers stripped, leading space kept.
fn comment_lines(raw: &str) -> Vec<String> {
    if raw.starts_with("%{") && raw.contains('\n') {
        let mut lines: Vec<&str> = raw.lines().collect();
        lines.remove(0);
        if lines.last().is_some_and(|l| l.trim() == "%}") {
            lines.pop();
        }
        lines.iter().map(|l| l.to_string()).collect()
    } else {
        vec![raw.trim_start_matches('%').to_string()]
    }
}

/// `% text` → `/* text */`, preserving the comment's own spacing.
fn convert_comment(raw: &str) -> String {
    if raw.starts_with("%{") && raw.contains('\n') {
        let inner: Vec<String> = comment_lines(raw);
        let mut out = String::from("/*");
        for l in &inner {
            out.push('\n');
            out.push_str(" * ");
            out.push_str(l);
        }
        out.push_str(" */");
        out
    } else {
        format!("/*{} */", raw.trim_start_matches('%'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_ok(src: &str) -> (ClassUnit, Vec<Diagnostic>) {
        let (toks, mut diags) = lex(src);
        let (class, pdiags) = parse(src, &toks);
        diags.extend(pdiags);
        (class.expect("class should parse"), diags)
    }

    fn props(section: &Section) -> Vec<&Property> {
        section
            .decls
            .iter()
            .filter_map(|d| match d {
                Declaration::Property(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn methods(section: &Section) -> Vec<&Method> {
        section
            .decls
            .iter()
            .filter_map(|d| match d {
                Declaration::Method(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn header_with_superclasses() {
        let (c, _) = parse_ok(
            "classdef (Sealed) classA < general.reference.classB & a.b.c\nend\n",
        );
        assert_eq!(c.name, "classA");
        assert!(c.attrs.is_set("Sealed"));
        assert_eq!(
            c.superclasses,
            ["general.reference.classB", "a.b.c"]
        );
    }

    #[test]
    fn superclass_list_across_continuation() {
        let (c, _) = parse_ok("classdef A < x.y & ...\n    z.w\nend\n");
        assert_eq!(c.superclasses, ["x.y", "z.w"]);
    }

    #[test]
    fn missing_header_is_fatal() {
        let src = "function foo\nend\n";
        let (toks, _) = lex(src);
        let (class, diags) = parse(src, &toks);
        assert!(class.is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn property_forms() {
        let (c, _) = parse_ok(
            "classdef A\n properties\n  a = 1;\n  b\n  c;\n  d = \"\";\n end\nend\n",
        );
        let ps = props(&c.sections[0]);
        assert_eq!(ps.len(), 4);
        assert!(ps[0].has_terminator);
        assert_eq!(ps[0].default.as_ref().unwrap().single_line, "1");
        assert!(!ps[1].has_terminator);
        assert!(ps[1].default.is_none());
        assert!(ps[2].has_terminator);
        assert_eq!(ps[3].default.as_ref().unwrap().single_line, "\"\"");
    }

    #[test]
    fn duplicate_property_names_both_kept() {
        let (c, diags) = parse_ok(
            "classdef A\n properties (Constant)\n  dConstant = 1;\n  dConstant = 2;\n end\nend\n",
        );
        let ps = props(&c.sections[0]);
        assert_eq!(ps.len(), 2);
        assert_eq!(ps[0].name, "dConstant");
        assert_eq!(ps[1].name, "dConstant");
        assert!(diags.is_empty());
    }

    #[test]
    fn multiline_default_keeps_lines() {
        let (c, _) = parse_ok(
            "classdef A\n properties\n  p = struct(   ...\n    'xi', [], ...\n    []);\n end\nend\n",
        );
        let ps = props(&c.sections[0]);
        let d = ps[0].default.as_ref().unwrap();
        assert_eq!(d.verbatim.matches('\n').count(), 2);
        assert!(d.verbatim.contains("\\\n"));
        assert!(d.single_line.starts_with("struct("));
        assert!(!d.single_line.contains('\n'));
    }

    #[test]
    fn default_with_brackets_in_string() {
        let (c, diags) = parse_ok(
            "classdef A\n properties\n  p = \"[['af]adgdg'\";\n  q = 4;\n end\nend\n",
        );
        assert!(diags.is_empty());
        let ps = props(&c.sections[0]);
        assert_eq!(ps.len(), 2);
        assert_eq!(ps[0].default.as_ref().unwrap().single_line, "\"[['af]adgdg'\"");
        assert_eq!(ps[1].default.as_ref().unwrap().single_line, "4");
    }

    #[test]
    fn section_attrs_with_values() {
        let (c, _) = parse_ok(
            "classdef A\n properties (Transient, SetAccess = private, GetAccess = protected)\n  x;\n end\nend\n",
        );
        let s = &c.sections[0];
        assert!(s.attrs.is_set("Transient"));
        assert_eq!(s.attrs.value("SetAccess"), Some("private"));
        assert_eq!(s.attrs.value("GetAccess"), Some("protected"));
        let names: Vec<&str> = s.attrs.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Transient", "SetAccess", "GetAccess"]);
    }

    #[test]
    fn malformed_attrs_recover_empty() {
        let (c, diags) = parse_ok(
            "classdef A\n properties (Transient ???)\n  x;\n end\nend\n",
        );
        assert!(c.sections[0].attrs.is_empty());
        assert!(diags
            .iter()
            .any(|d| d.message.contains("malformed attribute list")));
        assert_eq!(props(&c.sections[0]).len(), 1);
    }

    #[test]
    fn method_with_body_and_nested_end() {
        let src = "classdef A\n methods\n  function foo(this, b)\n    % brief doc for foo\n    if a==b\n      x(end);\n    end\n    bar;\n  end\n end\nend\n";
        let (c, diags) = parse_ok(src);
        assert!(diags.is_empty());
        let ms = methods(&c.sections[0]);
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].name, "foo");
        assert_eq!(ms[0].params, ["this", "b"]);
        let BodyKind::Inline(body) = &ms[0].body else {
            panic!("expected inline body")
        };
        assert!(body.contains("if a==b"));
        assert!(body.contains("x(end);"));
        assert!(body.contains("bar;"));
        assert!(!body.contains("% brief"));
        let doc = ms[0].doc_comment.as_ref().unwrap();
        assert_eq!(doc.lines[0], " brief doc for foo");
    }

    #[test]
    fn body_comments_become_c_comments() {
        let src = "classdef A\n methods\n  function foo(this)\n    a;\n    % keep me\n    b;\n  end\n end\nend\n";
        let (c, _) = parse_ok(src);
        let ms = methods(&c.sections[0]);
        let BodyKind::Inline(body) = &ms[0].body else {
            panic!()
        };
        assert!(body.contains("/*  keep me */"));
        assert!(!body.contains('%'));
    }

    #[test]
    fn nested_function_keyword_tracked() {
        let src = "classdef A\n methods\n  function foo(this)\n    function inner\n      pause;\n    end\n    bar;\n  end\n end\nend\n";
        let (c, diags) = parse_ok(src);
        assert!(diags.is_empty());
        let ms = methods(&c.sections[0]);
        let BodyKind::Inline(body) = &ms[0].body else {
            panic!()
        };
        assert!(body.contains("function inner"));
        assert!(body.contains("bar;"));
    }

    #[test]
    fn multi_output_signature() {
        let (c, _) = parse_ok(
            "classdef A\n methods (Static)\n  function [a, b] = stat(notthis, c)\n  end\n end\nend\n",
        );
        let ms = methods(&c.sections[0]);
        assert_eq!(ms[0].outputs, ["a", "b"]);
        assert_eq!(ms[0].params, ["notthis", "c"]);
    }

    #[test]
    fn declared_only_signature() {
        let (c, _) = parse_ok(
            "classdef A\n methods\n  h = mdecl(b);\n end\nend\n",
        );
        let ms = methods(&c.sections[0]);
        assert_eq!(ms[0].name, "mdecl");
        assert_eq!(ms[0].body, BodyKind::DeclaredOnly);
        assert_eq!(ms[0].outputs, ["h"]);
    }

    #[test]
    fn abstract_section_signature_has_no_body() {
        let (c, _) = parse_ok(
            "classdef A\n methods (Abstract)\n  a = abs_method(this, d)\n  other_method(b)\n end\nend\n",
        );
        let ms = methods(&c.sections[0]);
        assert_eq!(ms.len(), 2);
        assert_eq!(ms[0].body, BodyKind::Abstract);
        assert_eq!(ms[1].body, BodyKind::Abstract);
    }

    #[test]
    fn abstract_function_with_body_warns_and_discards() {
        let src = "classdef A\n methods (Abstract, Static)\n  function [a,b] = sam(this, c)\n    x = 1;\n  end\n end\nend\n";
        let (c, diags) = parse_ok(src);
        let ms = methods(&c.sections[0]);
        assert_eq!(ms[0].body, BodyKind::Abstract);
        assert!(diags
            .iter()
            .any(|d| d.message.contains("body discarded")));
    }

    #[test]
    fn accessor_names_parse_dotted() {
        let (c, _) = parse_ok(
            "classdef A\n methods\n  function v = get.x(this)\n    v = this.x;\n  end\n end\nend\n",
        );
        let ms = methods(&c.sections[0]);
        assert_eq!(ms[0].name, "get.x");
        assert_eq!(ms[0].outputs, ["v"]);
    }

    #[test]
    fn events_parse_names_only() {
        let (c, _) = parse_ok(
            "classdef A\n events\n  documentedEvent\n  other;\n end\nend\n",
        );
        let evs: Vec<&Event> = c.sections[0]
            .decls
            .iter()
            .filter_map(|d| match d {
                Declaration::Event(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0].name, "documentedEvent");
    }

    #[test]
    fn comment_runs_split_on_blank_lines() {
        let (c, _) = parse_ok(
            "classdef A\n properties\n  x;\n  % doc for x\n\n  % garbage comment\n end\nend\n",
        );
        let runs: Vec<&CommentRun> = c.sections[0]
            .decls
            .iter()
            .filter_map(|d| match d {
                Declaration::Comment(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].lines, [" doc for x"]);
        assert_eq!(runs[1].lines, [" garbage comment"]);
    }

    #[test]
    fn trailing_comments_collected() {
        let (c, _) = parse_ok(
            "classdef A\n properties\n  x;\n end\n\n % @var x\n % a late note\nend\n",
        );
        assert_eq!(c.trailing_comments.len(), 1);
        assert_eq!(c.trailing_comments[0].lines.len(), 2);
    }

    #[test]
    fn unclosed_body_truncates_with_diagnostic() {
        let src = "classdef A\n methods\n  function foo(this)\n    a;\n";
        let (toks, _) = lex(src);
        let (class, diags) = parse(src, &toks);
        assert!(class.is_some());
        assert!(diags
            .iter()
            .any(|d| d.message.contains("not closed")));
    }
}
