//! Data model for a filtered class definition — format-agnostic.
//!
//! Everything is built in a single parse pass over one source unit and is
//! read-only afterwards, except for doc-block attachment (comment
//! association pass) and accessor linking (routing pass).

use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A parse or transform diagnostic with a 1-based source position.
/// Diagnostics are collected and surfaced to the caller, never thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, line: usize, col: usize) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            line,
            col,
        }
    }

    pub fn error(message: impl Into<String>, line: usize, col: usize) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}:{}: {}: {}", self.line, self.col, kind, self.message)
    }
}

/// Complete parsed class from a single source unit. Exactly one per unit.
#[derive(Debug, Default)]
pub struct ClassUnit {
    pub name: String,
    /// Superclass qualified names (dotted), in declaration order.
    pub superclasses: Vec<String>,
    /// classdef attribute list, e.g. `(Sealed)`.
    pub attrs: AttrSet,
    pub doc: Option<DocBlock>,
    pub sections: Vec<Section>,
    /// Comment runs between the class header and the first section.
    pub leading_comments: Vec<CommentRun>,
    /// Comment runs at class-body level after a section has closed.
    pub trailing_comments: Vec<CommentRun>,
    /// Name-tag blocks whose target could not be resolved; rendered
    /// unattached at the end of the unit. (tag head, block)
    pub orphans: Vec<(String, DocBlock)>,
}

/// What kind of declarations a section groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Properties,
    Methods,
    Events,
}

/// A named, attribute-tagged group of declarations within the class body.
/// Attributes apply to every declaration inside and never merge across
/// sections.
#[derive(Debug)]
pub struct Section {
    pub kind: SectionKind,
    pub attrs: AttrSet,
    pub doc: Option<DocBlock>,
    pub decls: Vec<Declaration>,
}

/// Ordered attribute-name → value map. Unrecognized names are retained
/// verbatim rather than rejected.
#[derive(Debug, Default, Clone)]
pub struct AttrSet {
    pub entries: Vec<(String, AttrValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Bare attribute, defaults to boolean true.
    True,
    /// Explicit value, kept verbatim (single-line form).
    Value(String),
}

impl AttrSet {
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// True when the attribute is present and not explicitly "false".
    pub fn is_set(&self, name: &str) -> bool {
        match self.get(name) {
            Some(AttrValue::True) => true,
            Some(AttrValue::Value(v)) => v != "false",
            None => false,
        }
    }

    /// Explicit value text, if any.
    pub fn value(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(AttrValue::Value(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One declaration slot inside a section, in source order. Comment runs
/// stay in the stream so free comments can be echoed where they were found.
#[derive(Debug)]
pub enum Declaration {
    Property(Property),
    Method(Method),
    Event(Event),
    /// Emission slot left behind when an accessor override is routed onto
    /// its property; the override data lives on the property.
    Accessor { property: String, kind: AccessorKind },
    Comment(CommentRun),
}

/// A property declaration.
#[derive(Debug, Default)]
pub struct Property {
    pub name: String,
    /// Explicit type (dotted qualified name), from an inline annotation or
    /// an `@type` doc tag. Placeholder-substituted at emission when absent.
    pub type_name: Option<String>,
    pub default: Option<DefaultValue>,
    /// False for a trailing declaration without `;` — still valid.
    pub has_terminator: bool,
    pub doc: Option<DocBlock>,
    pub getter: Option<AccessorOverride>,
    pub setter: Option<AccessorOverride>,
    pub line: usize,
}

/// A default-value expression in both renditions the emitter needs.
#[derive(Debug, Clone)]
pub struct DefaultValue {
    /// Span-exact text with each continuation marker rendered as `\` and
    /// the original line breaks preserved.
    pub verbatim: String,
    /// Collapsed single-line form for the emitted initializer.
    pub single_line: String,
}

/// A method declaration. The name may still be dotted (`get.x`/`set.x`)
/// until the routing pass runs.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub params: Vec<String>,
    pub outputs: Vec<String>,
    pub body: BodyKind,
    /// Leading comment run of the body, not yet parsed into a DocBlock.
    pub doc_comment: Option<CommentRun>,
    pub doc: Option<DocBlock>,
    pub line: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Verbatim body text (comment-converted, doc block stripped).
    Inline(String),
    /// Signature-only declaration, defined elsewhere.
    DeclaredOnly,
    /// Abstract: never a body, even if the source provided one.
    Abstract,
}

/// An event declaration: name only.
#[derive(Debug)]
pub struct Event {
    pub name: String,
    pub doc: Option<DocBlock>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Get,
    Set,
}

/// A property accessor override, owned by the property it targets. Never
/// enumerable as a plain method once routed.
#[derive(Debug)]
pub struct AccessorOverride {
    pub kind: AccessorKind,
    pub params: Vec<String>,
    pub outputs: Vec<String>,
    pub body: String,
    pub doc: Option<DocBlock>,
}

/// A run of consecutive `%` comment lines (no blank line inside). Each
/// entry is the text after the `%` marker, leading space preserved.
#[derive(Debug, Clone, Default)]
pub struct CommentRun {
    pub lines: Vec<String>,
    pub line: usize,
}

/// A structured documentation block, attached to exactly one declaration,
/// one section header, or the class itself.
#[derive(Debug, Clone, Default)]
pub struct DocBlock {
    /// Lines up to the first blank comment line.
    pub brief: Vec<String>,
    /// Remaining lines, blanks and `@verbatim` regions included.
    pub details: Vec<String>,
    pub params: Vec<TagEntry>,
    pub retvals: Vec<TagEntry>,
    /// User-authored notes first; synthesized notes appended after.
    pub notes: Vec<String>,
    /// `@event` tag target, set for event declarations.
    pub event: Option<String>,
    /// Consumed `@type` tag, moved onto the owning property.
    pub type_name: Option<String>,
}

impl DocBlock {
    pub fn is_empty(&self) -> bool {
        self.brief.is_empty()
            && self.details.is_empty()
            && self.params.is_empty()
            && self.retvals.is_empty()
            && self.notes.is_empty()
            && self.event.is_none()
    }
}

/// One `@param`/`@retval` entry. The key→text pair preserves original
/// line breaks in `text`; `type_name` holds an `of type X` annotation.
#[derive(Debug, Clone)]
pub struct TagEntry {
    pub key: String,
    pub text: String,
    pub type_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrset_bare_is_true() {
        let mut a = AttrSet::default();
        a.entries.push(("Transient".into(), AttrValue::True));
        assert!(a.is_set("Transient"));
        assert!(!a.is_set("Hidden"));
        assert_eq!(a.value("Transient"), None);
    }

    #[test]
    fn attrset_explicit_false() {
        let mut a = AttrSet::default();
        a.entries
            .push(("Hidden".into(), AttrValue::Value("false".into())));
        assert!(!a.is_set("Hidden"));
    }

    #[test]
    fn attrset_keeps_declaration_order() {
        let mut a = AttrSet::default();
        a.entries.push(("B".into(), AttrValue::True));
        a.entries.push(("A".into(), AttrValue::True));
        let names: Vec<&str> = a.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["B", "A"]);
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic::warning("odd attribute list", 3, 14);
        assert_eq!(d.to_string(), "3:14: warning: odd attribute list");
    }
}
