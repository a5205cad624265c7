//! The text-in/text-out filter pipeline.
//!
//! Fixed pass order per unit: lex → parse (sections + declarations) →
//! comment association → accessor routing → emit. Each source unit is
//! independent; callers may run units in parallel with no coordination.

use crate::model::{Diagnostic, Severity};
use crate::{accessors, comments, emit, lexer, parse};

/// One filtered unit: the emitted declaration text plus every diagnostic
/// collected along the way, in pass order. Diagnostics are never swallowed.
#[derive(Debug)]
pub struct Filtered {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Filtered {
    /// A fatal unit produced no output, only a terminal Error diagnostic.
    pub fn is_fatal(&self) -> bool {
        self.text.is_empty()
            && self
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error)
    }
}

/// Filter one class-definition source unit. Identical input yields
/// byte-identical output and diagnostics.
pub fn filter(input: &str, opts: &emit::EmitOptions) -> Filtered {
    let (tokens, mut diagnostics) = lexer::lex(input);
    let (class, parse_diags) = parse::parse(input, &tokens);
    diagnostics.extend(parse_diags);
    match class {
        None => Filtered {
            text: String::new(),
            diagnostics,
        },
        Some(mut class) => {
            diagnostics.extend(comments::associate(&mut class));
            diagnostics.extend(accessors::route(&mut class));
            Filtered {
                text: emit::render(&class, opts),
                diagnostics,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "classdef (Sealed) classA < general.reference.classB\n % help for classA\n properties (Transient, SetAccess = private, GetAccess = protected)\n  DataStoreDirectory = \"\";\n  % doc for the store\n end\n methods\n  function set.DataStoreDirectory(this, ds)\n    this.DataStoreDirectory = ds;\n  end\n end\nend\n";

    #[test]
    fn deterministic_output_and_diagnostics() {
        let opts = emit::EmitOptions::default();
        let a = filter(SAMPLE, &opts);
        let b = filter(SAMPLE, &opts);
        assert_eq!(a.text, b.text);
        assert_eq!(a.diagnostics, b.diagnostics);
    }

    #[test]
    fn pipeline_end_to_end() {
        let out = filter(SAMPLE, &emit::EmitOptions::default());
        assert!(!out.is_fatal());
        assert!(out.text.contains("class classA"));
        assert!(out.text.contains(":public ::general::reference::classB {"));
        assert!(out.text.contains("#if 0 //mdoc: 'set.DataStoreDirectory'"));
        assert!(out
            .text
            .contains("custom functionality when its value is changed"));
    }

    #[test]
    fn fatal_unit_keeps_terminal_error() {
        let out = filter("x = 5;\n", &emit::EmitOptions::default());
        assert!(out.is_fatal());
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn diagnostics_surface_in_pass_order() {
        let src = "classdef A\n properties (Transient ???)\n  x = 'oops\n end\nend\n";
        let out = filter(src, &emit::EmitOptions::default());
        assert!(!out.diagnostics.is_empty());
        // lexing problems come before parse problems
        assert!(out.diagnostics[0].message.contains("unterminated string"));
    }
}
