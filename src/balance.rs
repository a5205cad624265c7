//! Expression-end scanning over the token stream.
//!
//! Finds the top-level terminator of a default value, attribute value or
//! parameter list by depth-counting `()[]{}` tokens. Bracket characters
//! inside string literals never reach this layer (the lexer already made
//! them part of a Str span), so they are inert by construction. Single
//! forward scan, no backtracking.

use crate::lexer::{Token, TokenKind};

#[derive(Debug)]
pub struct ExprEnd {
    /// Exclusive token index where the expression ends.
    pub end: usize,
    /// True when the scan stopped on a `;`.
    pub terminated: bool,
    /// False when end-of-input was reached with open brackets left.
    pub balanced: bool,
}

fn is_open(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::OpenBrace
    )
}

fn is_close(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::CloseBrace
    )
}

/// Scan forward from `start` to the end of a top-level expression.
///
/// The expression ends at a `;`, a comment, or a newline at depth zero
/// (newlines preceded by a continuation marker are soft, as are newlines
/// inside brackets), at a `,` at depth zero when `stop_on_comma` is set,
/// or at a closing bracket that would take the depth negative (it belongs
/// to the enclosing construct). Simple depth counting only: any opener
/// increments, any closer decrements.
pub fn expr_end(src: &str, tokens: &[Token], start: usize, stop_on_comma: bool) -> ExprEnd {
    let mut depth: usize = 0;
    let mut i = start;
    while i < tokens.len() {
        let tok = &tokens[i];
        match tok.kind {
            k if is_open(k) => depth += 1,
            k if is_close(k) => {
                if depth == 0 {
                    return ExprEnd {
                        end: i,
                        terminated: false,
                        balanced: true,
                    };
                }
                depth -= 1;
            }
            TokenKind::Punct if depth == 0 && tok.raw(src) == ";" => {
                return ExprEnd {
                    end: i,
                    terminated: true,
                    balanced: true,
                };
            }
            TokenKind::Punct if depth == 0 && stop_on_comma && tok.raw(src) == "," => {
                return ExprEnd {
                    end: i,
                    terminated: false,
                    balanced: true,
                };
            }
            TokenKind::Comment if depth == 0 => {
                return ExprEnd {
                    end: i,
                    terminated: false,
                    balanced: true,
                };
            }
            TokenKind::Newline if depth == 0 => {
                let soft = i > start && tokens[i - 1].kind == TokenKind::Continuation;
                if !soft {
                    return ExprEnd {
                        end: i,
                        terminated: false,
                        balanced: true,
                    };
                }
            }
            _ => {}
        }
        i += 1;
    }
    ExprEnd {
        end: tokens.len(),
        terminated: false,
        balanced: depth == 0,
    }
}

/// From an opening bracket token, return the index of its matching closer.
/// `None` when the input runs out first.
pub fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = open + 1;
    while i < tokens.len() {
        let k = tokens[i].kind;
        if is_open(k) {
            depth += 1;
        } else if is_close(k) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Raw source text of `tokens[a..b]` with every continuation marker
/// rendered as `\` — line breaks and all other characters preserved.
pub fn verbatim_text(src: &str, tokens: &[Token], a: usize, b: usize) -> String {
    if a >= b {
        return String::new();
    }
    let end_off = tokens[b - 1].end();
    let mut out = String::new();
    let mut cur = tokens[a].start;
    for tok in &tokens[a..b] {
        match tok.kind {
            TokenKind::Continuation => {
                out.push_str(&src[cur..tok.start]);
                out.push('\\');
                cur = tok.end();
            }
            TokenKind::Str if tok.text.is_some() => {
                out.push_str(&src[cur..tok.start]);
                out.push_str(&strip_markers(tok.raw(src)));
                cur = tok.end();
            }
            _ => {}
        }
    }
    out.push_str(&src[cur..end_off]);
    out
}

/// Collapse a verbatim expression to its trimmed single-line form.
pub fn single_line(verbatim: &str) -> String {
    verbatim
        .split('\n')
        .map(|l| l.trim().trim_end_matches('\\').trim_end())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace `...`-to-end-of-line markers inside a raw string span with `\`,
/// keeping the line break.
fn strip_markers(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '.' && chars.get(i + 1) == Some(&'.') && chars.get(i + 2) == Some(&'.') {
            let mut k = i + 3;
            while chars.get(k).is_some_and(|&c| c == ' ' || c == '\t') {
                k += 1;
            }
            if chars.get(k) == Some(&'\n') {
                out.push('\\');
                i = k;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    #[test]
    fn stops_at_semicolon() {
        let src = "struct('a', []); next";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, false);
        assert!(e.terminated);
        assert_eq!(toks[e.end].raw(src), ";");
    }

    #[test]
    fn stops_at_newline_without_continuation() {
        let src = "4\nnext";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, false);
        assert!(!e.terminated);
        assert_eq!(toks[e.end].kind, crate::lexer::TokenKind::Newline);
    }

    #[test]
    fn newline_after_continuation_is_soft() {
        let src = "1 ...\n+ 2;";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, false);
        assert!(e.terminated);
    }

    #[test]
    fn newline_inside_brackets_is_soft() {
        let src = "[1 2\n 3 4];";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, false);
        assert!(e.terminated);
    }

    #[test]
    fn nested_unbalanced_looking_brackets_in_strings() {
        let src = "{' [ 1 2, [ [3 [3 4] ] ] '};";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, false);
        assert!(e.terminated);
        assert!(e.balanced);
    }

    #[test]
    fn stops_before_foreign_closer() {
        let src = "private, Hidden)";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, true);
        // stops at the comma first
        assert_eq!(toks[e.end].raw(src), ",");
        let e2 = expr_end(src, &toks, e.end + 1, true);
        assert_eq!(toks[e2.end].kind, crate::lexer::TokenKind::CloseParen);
    }

    #[test]
    fn truncates_at_end_of_input_when_unbalanced() {
        let src = "[1, 2";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, false);
        assert_eq!(e.end, toks.len());
        assert!(!e.balanced);
    }

    #[test]
    fn matching_close_by_depth_only() {
        let src = "(a, [b, {c}])";
        let (toks, _) = lex(src);
        let close = matching_close(&toks, 0).unwrap();
        assert_eq!(toks[close].kind, crate::lexer::TokenKind::CloseParen);
        assert_eq!(close, toks.len() - 1);
    }

    #[test]
    fn verbatim_keeps_lines_and_marks_continuations() {
        let src = "struct(   ...\n  'xi', [], 'ti',    ...\n  []);";
        let (toks, _) = lex(src);
        let e = expr_end(src, &toks, 0, false);
        let v = verbatim_text(src, &toks, 0, e.end);
        assert_eq!(v, "struct(   \\\n  'xi', [], 'ti',    \\\n  [])");
        assert_eq!(single_line(&v), "struct( 'xi', [], 'ti', [])");
    }

    #[test]
    fn single_line_of_plain_value() {
        assert_eq!(single_line("\"test\""), "\"test\"");
        assert_eq!(single_line("1"), "1");
    }
}
