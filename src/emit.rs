//! Emitter: renders a parsed class as a C++-shaped declaration unit with
//! doxygen doc blocks.
//!
//! Read-only over the model. Placeholder types stand in for untyped
//! members, multi-output signatures are encoded through nested wrapper
//! types, abstract members end in `= 0`, and accessor overrides render as
//! guarded, disabled blocks the documentation generator can still index.

use crate::model::*;

/// Placeholder type for members without an explicit type.
const TYPE_PLACEHOLDER: &str = "matlabtypesubstitute";
/// Return encoding for methods without outputs.
const NORET: &str = "noret::substitute";

#[derive(Debug, Default, Clone)]
pub struct EmitOptions {
    /// Doxygen group for the class doc block (`@ingroup`).
    pub group: Option<String>,
}

pub fn render(class: &ClassUnit, opts: &EmitOptions) -> String {
    let mut out = String::new();
    out.push_str(BANNER);

    // class header with colon-prefixed inheritance list
    out.push_str(&format!("class {}", class.name));
    if class.superclasses.is_empty() {
        out.push_str(" {\n");
    } else {
        out.push('\n');
        let last = class.superclasses.len() - 1;
        for (k, sup) in class.superclasses.iter().enumerate() {
            let lead = if k == 0 { "  :public " } else { "   public " };
            let tail = if k == last { " {" } else { "," };
            out.push_str(&format!("{}{}{}\n", lead, qualify(sup), tail));
        }
    }

    // class doc block
    let class_notes = class_attr_notes(&class.attrs);
    if class.doc.is_some() || opts.group.is_some() || !class_notes.is_empty() {
        let empty = DocBlock::default();
        let doc = class.doc.as_ref().unwrap_or(&empty);
        let mut heads = Vec::new();
        if let Some(g) = &opts.group {
            heads.push(format!("@ingroup {}", g));
        }
        out.push_str(&render_doc(
            &format!("@class \"{}\"", class.name),
            &heads,
            doc,
            &class_notes,
            None,
        ));
        out.push('\n');
    }
    for run in &class.leading_comments {
        out.push('\n');
        out.push_str(&render_comment_run(run));
        out.push('\n');
    }

    for sec in &class.sections {
        render_section(&mut out, class, sec);
    }

    for run in &class.trailing_comments {
        out.push('\n');
        out.push_str(&render_comment_run(run));
        out.push('\n');
    }

    // supplemental blocks for properties with custom accessors
    let accessor_notes = render_accessor_notes(class);
    if !accessor_notes.is_empty() {
        out.push('\n');
        out.push_str(&accessor_notes);
    }

    for (head, block) in &class.orphans {
        out.push('\n');
        out.push_str(&render_doc(head, &[], block, &[], None));
        out.push('\n');
    }

    out.push_str("\n};\n");
    out
}

const BANNER: &str = "\n\n/* (Autoinserted by mdoc)\n * This source code has been filtered by the mdoc executable,\n * which generates code that can be processed by the doxygen documentation tool.\n *\n * On the other hand, it can neither be interpreted by MATLAB, nor can it be compiled with a C++ compiler.\n * Except for the comments, the function bodies of your M-file functions are untouched.\n * Consequently, filtered source listings stay highly readable by humans, and links\n * into them from the generated documentation resolve to the right declarations.\n * However, the line numbers most likely do not correspond to the line numbers in the original file.\n */\n\n";

fn render_section(out: &mut String, class: &ClassUnit, sec: &Section) {
    out.push_str(&format!(
        "\n  {}:{}\n",
        access_label(sec),
        attr_trailer(&sec.attrs)
    ));
    if let Some(doc) = &sec.doc {
        out.push('\n');
        out.push_str(&render_section_doc(doc));
        out.push('\n');
    }
    for decl in &sec.decls {
        let rendered = match decl {
            Declaration::Property(p) => render_property(p, sec),
            Declaration::Method(m) => render_method(class, sec, m),
            Declaration::Event(e) => render_event(e),
            Declaration::Accessor { property, kind } => {
                render_accessor(class, sec, property, *kind)
            }
            Declaration::Comment(run) => render_comment_run(run),
        };
        out.push('\n');
        out.push_str(&rendered);
        out.push('\n');
    }
}

/// Access label for a section: the `GetAccess` side of a split pair labels
/// a properties block, `Access` otherwise, `public` by default.
fn access_label(sec: &Section) -> String {
    let a = match sec.kind {
        SectionKind::Properties => sec
            .attrs
            .value("GetAccess")
            .or_else(|| sec.attrs.value("Access")),
        _ => sec.attrs.value("Access"),
    };
    a.unwrap_or("public").to_string()
}

/// Non-access attributes echoed next to the label, declaration order.
fn attr_trailer(attrs: &AttrSet) -> String {
    let shown: Vec<String> = attrs
        .entries
        .iter()
        .filter(|(n, _)| !matches!(n.as_str(), "Access" | "GetAccess" | "SetAccess"))
        .map(|(n, v)| match v {
            AttrValue::True => n.clone(),
            AttrValue::Value(v) => format!("{} = {}", n, v),
        })
        .collect();
    if shown.is_empty() {
        String::new()
    } else {
        format!(" /* ( {} ) */", shown.join(", "))
    }
}

fn render_property(p: &Property, sec: &Section) -> String {
    let ty = p
        .type_name
        .as_deref()
        .map(qualify)
        .unwrap_or_else(|| TYPE_PLACEHOLDER.to_string());
    let prefix = if sec.attrs.is_set("Constant") {
        "static const "
    } else {
        ""
    };
    let mut out = format!("    {}{} {}", prefix, ty, p.name);
    if let Some(d) = &p.default {
        out.push_str(&format!(" = {}", d.single_line));
    }
    out.push(';');
    if let Some(doc) = &p.doc {
        out.push('\n');
        out.push_str(&render_doc(
            &format!("@var {}", p.name),
            &[],
            doc,
            &[],
            p.default.as_ref(),
        ));
    }
    out
}

fn render_event(e: &Event) -> String {
    let mut out = format!("    EVENT {};", e.name);
    if let Some(doc) = &e.doc {
        out.push('\n');
        out.push_str(&render_doc(&format!("@var {}", e.name), &[], doc, &[], None));
    }
    out
}

fn render_method(class: &ClassUnit, sec: &Section, m: &Method) -> String {
    let is_abstract = m.body == BodyKind::Abstract;
    let (full, core) = signature(class, sec, &m.name, &m.outputs, &m.params, m.doc.as_ref(), is_abstract);
    let mut out = match &m.body {
        BodyKind::Abstract => format!("    {} = 0;", full),
        BodyKind::DeclaredOnly => format!("    {};", full),
        BodyKind::Inline(body) if body.is_empty() => format!("    {} {{\n    }}", full),
        BodyKind::Inline(body) => format!("    {} {{\n\n{}\n    }}", full, body),
    };
    if let Some(doc) = &m.doc {
        out.push('\n');
        out.push_str(&render_doc(&format!("@fn {}", core), &[], doc, &[], None));
    }
    out
}

/// Guarded, disabled rendering of an accessor override at its source
/// position; the override itself never appears as a plain method.
fn render_accessor(
    class: &ClassUnit,
    sec: &Section,
    property: &str,
    kind: AccessorKind,
) -> String {
    let Some(prop) = find_property(class, property) else {
        return String::new();
    };
    let ov = match kind {
        AccessorKind::Get => prop.getter.as_ref(),
        AccessorKind::Set => prop.setter.as_ref(),
    };
    let Some(ov) = ov else { return String::new() };
    let word = match kind {
        AccessorKind::Get => "get",
        AccessorKind::Set => "set",
    };
    let (_, core) = signature(
        class,
        sec,
        property,
        &ov.outputs,
        &ov.params,
        ov.doc.as_ref(),
        false,
    );
    let body = if ov.body.is_empty() {
        format!("{} {{\n    }}", core)
    } else {
        format!("{} {{\n\n{}\n    }}", core, ov.body)
    };
    let mut out = format!(
        "    \n#if 0 //mdoc: '{}.{}'\n{}\n\n#endif",
        word, property, body
    );
    if let Some(doc) = &ov.doc {
        out.push('\n');
        out.push_str(&render_doc(&format!("@fn {}", core), &[], doc, &[], None));
    }
    out
}

/// Build a method signature. Returns the full form (with `static` /
/// `virtual` markers) and the core form used in `@fn` doc heads.
fn signature(
    class: &ClassUnit,
    sec: &Section,
    name: &str,
    outputs: &[String],
    params: &[String],
    doc: Option<&DocBlock>,
    is_abstract: bool,
) -> (String, String) {
    let is_static = sec.attrs.is_set("Static");
    let is_ctor = name == class.name;

    let ret = if is_ctor {
        String::new()
    } else {
        format!("{} ", return_type(class, outputs, doc))
    };

    let shown: Vec<&String> = if !is_static && !is_ctor && !params.is_empty() {
        params.iter().skip(1).collect()
    } else {
        params.iter().collect()
    };
    let rendered: Vec<String> = shown
        .iter()
        .map(|p| format!("{} {}", param_type(doc, p), p))
        .collect();

    let core = format!("{}{}({})", ret, name, rendered.join(","));
    let prefix = if is_static {
        "static "
    } else if is_abstract {
        "virtual "
    } else {
        ""
    };
    (format!("{}{}", prefix, core), core)
}

/// Output-count encoding: no outputs use the no-return substitute, one
/// output a single wrapper, N outputs one outer wrapper holding N
/// single-output wrappers in original left-to-right order.
fn return_type(class: &ClassUnit, outputs: &[String], doc: Option<&DocBlock>) -> String {
    match outputs.len() {
        0 => NORET.to_string(),
        1 => {
            let name = &outputs[0];
            if find_property(class, name).is_some() {
                format!("mlhsInnerSubst<::{}::{}>", class.name, name)
            } else if let Some(t) = doc
                .and_then(|d| d.retvals.iter().find(|r| &r.key == name))
                .and_then(|r| r.type_name.as_deref())
            {
                format!("mlhsInnerSubst<{}>", qualify(t))
            } else {
                "mlhsInnerSubst<void>".to_string()
            }
        }
        _ => {
            let inner: Vec<String> = outputs
                .iter()
                .map(|o| format!("mlhsInnerSubst<void,{}>", o))
                .collect();
            format!("mlhsSubst<{} >", inner.join(" ,"))
        }
    }
}

fn param_type(doc: Option<&DocBlock>, param: &str) -> String {
    doc.and_then(|d| d.params.iter().find(|p| p.key == param))
        .and_then(|p| p.type_name.as_deref())
        .map(qualify)
        .unwrap_or_else(|| TYPE_PLACEHOLDER.to_string())
}

/// `a.b.c` → `::a::b::c`
fn qualify(dotted: &str) -> String {
    format!("::{}", dotted.replace('.', "::"))
}

fn find_property<'a>(class: &'a ClassUnit, name: &str) -> Option<&'a Property> {
    class
        .sections
        .iter()
        .flat_map(|s| s.decls.iter())
        .find_map(|d| match d {
            Declaration::Property(p) if p.name == name => Some(p),
            _ => None,
        })
}

/// One trailing supplemental block per accessor-bearing property.
fn render_accessor_notes(class: &ClassUnit) -> String {
    let mut out = String::new();
    for sec in &class.sections {
        for decl in &sec.decls {
            let Declaration::Property(p) = decl else { continue };
            let verb = match (&p.getter, &p.setter) {
                (Some(_), Some(_)) => "retrieved or changed",
                (Some(_), None) => "retrieved",
                (None, Some(_)) => "changed",
                (None, None) => continue,
            };
            out.push_str(&format!(
                "/** @var {}\n *\n *@note This property has custom functionality when its value is {}.\n */\n",
                p.name, verb
            ));
        }
    }
    out
}

fn class_attr_notes(attrs: &AttrSet) -> Vec<String> {
    let mut notes = Vec::new();
    for (name, value) in &attrs.entries {
        if name == "Sealed" && attrs.is_set("Sealed") {
            notes.push(
                "This class has the class property <tt>Sealed</tt> and cannot be derived from."
                    .to_string(),
            );
            continue;
        }
        let v = match value {
            AttrValue::True => "true",
            AttrValue::Value(v) => v.as_str(),
        };
        notes.push(format!(
            "This class has the MATLAB class attribute @c {} set to {}.",
            name, v
        ));
    }
    notes
}

/// Echo a free comment run as plain C comments.
fn render_comment_run(run: &CommentRun) -> String {
    run.lines
        .iter()
        .map(|l| format!("   /* {} */", l.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_section_doc(doc: &DocBlock) -> String {
    let lines: Vec<&String> = doc.brief.iter().chain(doc.details.iter()).collect();
    lines
        .iter()
        .map(|l| format!("   /* {} */", l.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shared doc-block renderer: head line(s), brief, details (verbatim
/// regions reproduced without the star gutter), params, retvals, notes,
/// event tag, Default tag.
fn render_doc(
    head: &str,
    extra_heads: &[String],
    doc: &DocBlock,
    extra_notes: &[String],
    default: Option<&DefaultValue>,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("/** {}", head));
    for h in extra_heads {
        lines.push(format!("  * {}", h));
    }

    if let Some((first, rest)) = doc.brief.split_first() {
        lines.push(format!("  * @brief {}", first));
        for l in rest {
            push_text_line(&mut lines, l);
        }
    }
    lines.push("  *".to_string());
    lines.push("  *".to_string());

    if !doc.details.is_empty() {
        let mut in_verbatim = false;
        for l in &doc.details {
            let t = l.trim();
            if in_verbatim {
                lines.push(l.clone());
                if t == "@endverbatim" {
                    in_verbatim = false;
                }
            } else if t == "@verbatim" {
                lines.push(format!("  * {}", l));
                in_verbatim = true;
            } else {
                push_text_line(&mut lines, l);
            }
        }
        lines.push("  *".to_string());
    }

    if !doc.params.is_empty() {
        for p in &doc.params {
            push_tag_lines(&mut lines, "@param", &p.key, &p.text);
        }
        if !doc.retvals.is_empty() {
            lines.push("  *".to_string());
        }
    }
    for r in &doc.retvals {
        push_tag_lines(&mut lines, "@retval", &r.key, &r.text);
    }

    for n in doc.notes.iter().chain(extra_notes.iter()) {
        let mut parts = n.split('\n');
        if let Some(first) = parts.next() {
            lines.push(format!("  * @note {}", first));
        }
        for cont in parts {
            lines.push(format!("  *  {}", cont));
        }
    }

    if let Some(ev) = &doc.event {
        lines.push(format!("  * @event {}", ev));
    }

    let mut out = lines.join("\n");
    match default {
        Some(d) => {
            let mut vl = d.verbatim.split('\n');
            if let Some(first) = vl.next() {
                out.push_str(&format!("\n  * <br/>@b Default: {}", first));
            }
            for l in vl {
                out.push('\n');
                out.push_str(l);
            }
            out.push_str("\n*/");
        }
        None => out.push_str("\n  */"),
    }
    out
}

fn push_text_line(lines: &mut Vec<String>, l: &str) {
    if l.trim().is_empty() {
        lines.push("  *".to_string());
    } else {
        lines.push(format!("  * {}", l));
    }
}

fn push_tag_lines(lines: &mut Vec<String>, tag: &str, key: &str, text: &str) {
    let mut parts = text.split('\n');
    let first = parts.next().unwrap_or("");
    lines.push(format!("  * {} {:<6} {}", tag, key, first));
    for cont in parts {
        lines.push(format!("  *  {}", cont));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessors;
    use crate::comments;
    use crate::lexer::lex;
    use crate::parse::parse;

    fn run(src: &str) -> String {
        let (toks, _) = lex(src);
        let (class, _) = parse(src, &toks);
        let mut class = class.expect("parse");
        comments::associate(&mut class);
        accessors::route(&mut class);
        render(&class, &EmitOptions::default())
    }

    #[test]
    fn header_lists_superclasses_one_per_line() {
        let out = run("classdef classA < general.reference.classB & a.b.c\nend\n");
        assert!(out.contains("class classA\n  :public ::general::reference::classB,\n   public ::a::b::c {"));
    }

    #[test]
    fn header_without_superclasses() {
        let out = run("classdef A\nend\n");
        assert!(out.contains("class A {"));
    }

    #[test]
    fn property_placeholder_type_and_default() {
        let out = run(
            "classdef A\n properties (Transient, SetAccess = private, GetAccess = protected)\n  DataStoreDirectory = \"\";\n  % doc line\n end\nend\n",
        );
        assert!(out.contains("  protected: /* ( Transient ) */"));
        assert!(out.contains("    matlabtypesubstitute DataStoreDirectory = \"\";"));
        assert!(out.contains("@note This property has non-unique access specifier: <tt>SetAccess = private, GetAccess = protected</tt>"));
        assert!(out.contains("@note This property has the MATLAB attribute @c Transient set to true."));
        assert!(out.contains("<br/>@b Default: \"\""));
    }

    #[test]
    fn typed_property_uses_qualified_type() {
        let out = run(
            "classdef A\n properties\n  d = \"\";\n  % test\n  %\n  % @type SpecialType\n end\nend\n",
        );
        assert!(out.contains("    ::SpecialType d = \"\";"));
    }

    #[test]
    fn constant_section_renders_static_const() {
        let out = run(
            "classdef A\n properties (Constant)\n  aConstant = 1;\n  % help text\n end\nend\n",
        );
        assert!(out.contains("  public: /* ( Constant ) */"));
        assert!(out.contains("    static const matlabtypesubstitute aConstant = 1;"));
        assert!(out.contains("<br/>@b Default: 1"));
    }

    #[test]
    fn no_output_method_uses_noret() {
        let out = run(
            "classdef A\n methods (Hidden)\n  function foo(this, b, c)\n   % brief doc for foo\n   bar;\n  end\n end\nend\n",
        );
        assert!(out.contains("    noret::substitute foo(matlabtypesubstitute b,matlabtypesubstitute c) {"));
        assert!(out.contains("@fn noret::substitute foo(matlabtypesubstitute b,matlabtypesubstitute c)"));
        assert!(out.contains("@note This method has the MATLAB method attribute @c Hidden set to true."));
    }

    #[test]
    fn two_output_wrapper_nesting_and_order() {
        let out = run(
            "classdef A\n methods (Static)\n  function [a, b] = stat(notthis, c)\n  end\n end\nend\n",
        );
        assert!(out.contains(
            "    static mlhsSubst<mlhsInnerSubst<void,a> ,mlhsInnerSubst<void,b> > stat(matlabtypesubstitute notthis,matlabtypesubstitute c)"
        ));
    }

    #[test]
    fn three_output_wrapper_keeps_left_to_right_order() {
        let out = run(
            "classdef A\n methods (Abstract)\n  [b, c, d] = many(this, x)\n end\nend\n",
        );
        assert!(out.contains(
            "mlhsSubst<mlhsInnerSubst<void,b> ,mlhsInnerSubst<void,c> ,mlhsInnerSubst<void,d> > many(matlabtypesubstitute x) = 0;"
        ));
    }

    #[test]
    fn abstract_methods_never_render_bodies() {
        let out = run(
            "classdef A\n methods (Abstract, Static)\n  function [a,b] = sam(this, c)\n    x = 1;\n  end\n end\nend\n",
        );
        assert!(out.contains("  public: /* ( Abstract, Static ) */"));
        assert!(out.contains("> sam(matlabtypesubstitute this,matlabtypesubstitute c) = 0;"));
        assert!(!out.contains("x = 1;"));
    }

    #[test]
    fn abstract_instance_method_is_virtual() {
        let out = run(
            "classdef A\n methods (Abstract)\n  r = am(this, d)\n end\nend\n",
        );
        assert!(out.contains("    virtual mlhsInnerSubst<void> am(matlabtypesubstitute d) = 0;"));
    }

    #[test]
    fn single_output_matching_property_gets_its_type() {
        let out = run(
            "classdef classA\n properties\n  mixed_access;\n end\n methods (Abstract)\n  mixed_access = am(this, d)\n end\nend\n",
        );
        assert!(out.contains("virtual mlhsInnerSubst<::classA::mixed_access> am(matlabtypesubstitute d) = 0;"));
    }

    #[test]
    fn constructor_has_no_return_type_and_keeps_params() {
        let out = run(
            "classdef classA\n methods\n  function this = classA(param1, param2)\n  end\n end\nend\n",
        );
        assert!(out.contains("    classA(matlabtypesubstitute param1,matlabtypesubstitute param2) {"));
    }

    #[test]
    fn declared_only_method_renders_signature_and_semicolon() {
        let out = run("classdef A\n methods\n  h = mdecl(this, b);\n end\nend\n");
        assert!(out.contains("    mlhsInnerSubst<void> mdecl(matlabtypesubstitute b);"));
    }

    #[test]
    fn of_type_param_from_doc() {
        let out = run(
            "classdef A\n methods\n  function test(this, auto_param)\n   % brief\n   %\n   % @param auto_param a grid of type gridbase.gridbase\n  end\n end\nend\n",
        );
        assert!(out.contains("test(::gridbase::gridbase auto_param)"));
    }

    #[test]
    fn accessor_renders_guarded_block_only() {
        let out = run(
            "classdef A\n properties\n  x;\n  % doc for x\n end\n methods\n  function v = get.x(this)\n    % getter doc\n    v = this.x;\n  end\n  function set.x(this, value)\n    this.x = value;\n  end\n end\nend\n",
        );
        assert!(out.contains("#if 0 //mdoc: 'get.x'\nmlhsInnerSubst<void> x() {"));
        assert!(out.contains("#if 0 //mdoc: 'set.x'\nnoret::substitute x(matlabtypesubstitute value) {"));
        assert!(out.contains("#endif"));
        // exactly one supplemental custom-functionality note
        assert_eq!(
            out.matches("custom functionality").count(),
            1
        );
        assert!(out.contains(
            "/** @var x\n *\n *@note This property has custom functionality when its value is retrieved or changed.\n */"
        ));
        // no plain method named after the accessor remains
        assert!(!out.contains("get.x("));
    }

    #[test]
    fn events_render_with_event_tag() {
        let out = run(
            "classdef A\n events\n  documentedEvent\n  % a documented event\n  quietEvent\n end\nend\n",
        );
        assert!(out.contains("    EVENT documentedEvent;"));
        assert!(out.contains("  * @event documentedEvent"));
        assert!(out.contains("/** @var quietEvent\n  * @brief quietEvent"));
    }

    #[test]
    fn sealed_class_note() {
        let out = run("classdef (Sealed) classA\n % help for classA\nend\n");
        assert!(out.contains(
            "@note This class has the class property <tt>Sealed</tt> and cannot be derived from."
        ));
        assert!(out.contains("/** @class \"classA\""));
    }

    #[test]
    fn duplicate_properties_coexist() {
        let out = run(
            "classdef A\n properties (Constant)\n  dConstant = 1;\n  dConstant = 2;\n end\nend\n",
        );
        assert!(out.contains("static const matlabtypesubstitute dConstant = 1;"));
        assert!(out.contains("static const matlabtypesubstitute dConstant = 2;"));
    }

    #[test]
    fn free_comment_echoed_in_place() {
        let out = run(
            "classdef A\n properties\n  x;\n  % doc for x\n\n  % garbage comment\n end\nend\n",
        );
        assert!(out.contains("   /*  garbage comment */"));
    }

    #[test]
    fn multiline_default_verbatim_in_doc_single_line_in_decl() {
        let out = run(
            "classdef A\n properties\n  p = struct(   ...\n    'xi', [], ...\n    []);\n  % long default\n end\nend\n",
        );
        // initializer collapsed
        assert!(out.contains("matlabtypesubstitute p = struct( 'xi', [], []);"));
        // doc tag keeps the lines with continuation marks
        assert!(out.contains("<br/>@b Default: struct(   \\\n    'xi', [], \\\n    [])"));
    }

    #[test]
    fn group_option_adds_ingroup() {
        let src = "classdef A\n % brief\nend\n";
        let (toks, _) = lex(src);
        let (class, _) = parse(src, &toks);
        let mut class = class.unwrap();
        comments::associate(&mut class);
        let out = render(
            &class,
            &EmitOptions {
                group: Some("test".into()),
            },
        );
        assert!(out.contains("/** @class \"A\"\n  * @ingroup test\n  * @brief  brief"));
    }
}
