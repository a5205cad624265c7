//! Comment association pass.
//!
//! Second walk over the parsed unit: parses comment runs into structured
//! doc blocks, attaches them by adjacency or by explicit name tag, and
//! appends the attribute-derived notes each declaration's block carries
//! into the output.

use crate::model::*;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static RE_NAME_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[[:space:]]*@(var|fn)[[:space:]]+([A-Za-z_][A-Za-z0-9_.]*)[[:space:]]*$")
        .unwrap()
});

static RE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[[:space:]]*@param[[:space:]]+(\S+)[[:space:]]*(.*)$").unwrap());

static RE_RETVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[[:space:]]*@retval[[:space:]]+(\S+)[[:space:]]*(.*)$").unwrap());

static RE_NOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[[:space:]]*@note[[:space:]]*(.*)$").unwrap());

static RE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[[:space:]]*@type[[:space:]]+([A-Za-z_][A-Za-z0-9_.]*)").unwrap()
});

static RE_EVENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[[:space:]]*@event[[:space:]]+(\S+)").unwrap());

/// `of type X` phrase inside @param/@retval text assigns the type.
static RE_OF_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of type[[:space:]]+([A-Za-z_][A-Za-z0-9_.]*)").unwrap());

const PROPERTY_ATTR_DOC: &str = "<a href=\"http://www.mathworks.de/help/techdoc/matlab_oop/brjjwby.html\">Matlab documentation of property attributes.</a>";
const METHOD_ATTR_DOC: &str = "<a href=\"http://www.mathworks.com/help/matlab/matlab_oop/method-attributes.html\">matlab documentation of method attributes.</a>";

/// Attributes rendered structurally (labels, `static const`, `= 0`) rather
/// than as notes.
const STRUCTURAL_PROPERTY_ATTRS: &[&str] = &[
    "Access",
    "GetAccess",
    "SetAccess",
    "Constant",
    "Static",
    "Abstract",
];
const STRUCTURAL_METHOD_ATTRS: &[&str] = &["Access", "Static", "Abstract"];

/// Run the association pass over one parsed unit.
pub fn associate(class: &mut ClassUnit) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    attach_method_body_docs(class);

    // name-tag candidates are pulled out before adjacency runs, in file
    // order: leading runs, section runs, trailing runs
    let mut tagged: Vec<(String, String, CommentRun)> = Vec::new();

    let mut kept_leading = Vec::new();
    for run in std::mem::take(&mut class.leading_comments) {
        if let Some((kind, name)) = name_tag(&run) {
            tagged.push((kind, name, run));
        } else if class.doc.is_none() {
            class.doc = Some(parse_docblock(run.lines.iter().map(|s| s.as_str())));
        } else {
            kept_leading.push(run);
        }
    }
    class.leading_comments = kept_leading;

    for sec in &mut class.sections {
        let n = sec.decls.len();
        let mut consumed = vec![false; n];
        for d in 0..n {
            let run = match &sec.decls[d] {
                Declaration::Comment(r) => r.clone(),
                _ => continue,
            };
            if let Some((kind, name)) = name_tag(&run) {
                tagged.push((kind, name, run));
                consumed[d] = true;
                continue;
            }
            if d == 0 {
                if sec.doc.is_none() {
                    sec.doc = Some(parse_docblock(run.lines.iter().map(|s| s.as_str())));
                    consumed[d] = true;
                }
                continue;
            }
            // adjacency: only whitespace between the previous declaration
            // and this run (an intervening run is its own stream entry)
            let attached = match &mut sec.decls[d - 1] {
                Declaration::Property(p) if p.doc.is_none() => {
                    p.doc = Some(parse_docblock(run.lines.iter().map(|s| s.as_str())));
                    true
                }
                Declaration::Event(e) if e.doc.is_none() => {
                    e.doc = Some(parse_docblock(run.lines.iter().map(|s| s.as_str())));
                    true
                }
                Declaration::Method(m) if m.doc.is_none() => {
                    m.doc = Some(parse_docblock(run.lines.iter().map(|s| s.as_str())));
                    true
                }
                _ => false,
            };
            consumed[d] = attached;
        }
        let old = std::mem::take(&mut sec.decls);
        sec.decls = old
            .into_iter()
            .enumerate()
            .filter_map(|(i, decl)| (!consumed[i]).then_some(decl))
            .collect();
    }

    let mut kept_trailing = Vec::new();
    for run in std::mem::take(&mut class.trailing_comments) {
        if let Some((kind, name)) = name_tag(&run) {
            tagged.push((kind, name, run));
        } else {
            kept_trailing.push(run);
        }
    }
    class.trailing_comments = kept_trailing;

    resolve_tagged(class, tagged, &mut diags);
    synthesize(class);

    diags
}

/// The leading comment run of a method body is that method's doc block.
fn attach_method_body_docs(class: &mut ClassUnit) {
    for sec in &mut class.sections {
        for decl in &mut sec.decls {
            if let Declaration::Method(m) = decl {
                if let Some(run) = m.doc_comment.take() {
                    m.doc = Some(parse_docblock(run.lines.iter().map(|s| s.as_str())));
                }
            }
        }
    }
}

/// Attach relocated blocks by declaration name; unresolved targets become
/// warnings and the block is retained unattached.
fn resolve_tagged(
    class: &mut ClassUnit,
    tagged: Vec<(String, String, CommentRun)>,
    diags: &mut Vec<Diagnostic>,
) {
    // first declaration with each name, across all sections
    let mut index: HashMap<String, (usize, usize)> = HashMap::new();
    for (s, sec) in class.sections.iter().enumerate() {
        for (d, decl) in sec.decls.iter().enumerate() {
            let name = match decl {
                Declaration::Property(p) => Some(p.name.as_str()),
                Declaration::Method(m) => Some(m.name.as_str()),
                Declaration::Event(e) => Some(e.name.as_str()),
                _ => None,
            };
            if let Some(n) = name {
                index.entry(n.to_string()).or_insert((s, d));
            }
        }
    }

    for (kind, name, run) in tagged {
        let block = parse_docblock(run.lines.iter().skip(1).map(|s| s.as_str()));
        match index.get(&name) {
            Some(&(s, d)) => {
                let slot = match &mut class.sections[s].decls[d] {
                    Declaration::Property(p) => &mut p.doc,
                    Declaration::Method(m) => &mut m.doc,
                    Declaration::Event(e) => &mut e.doc,
                    _ => continue,
                };
                merge_block(slot, block);
            }
            None => {
                diags.push(Diagnostic::warning(
                    format!("documentation block names unknown declaration '{}'", name),
                    run.line,
                    1,
                ));
                class.orphans.push((format!("@{} {}", kind, name), block));
            }
        }
    }
}

/// Later blocks naming an already-documented declaration contribute notes,
/// never replace the brief.
fn merge_block(slot: &mut Option<DocBlock>, block: DocBlock) {
    match slot {
        None => *slot = Some(block),
        Some(doc) => {
            let text: Vec<&str> = block
                .brief
                .iter()
                .chain(block.details.iter())
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect();
            if !text.is_empty() {
                doc.notes.push(text.join(" "));
            }
            doc.notes.extend(block.notes);
            doc.params.extend(block.params);
            doc.retvals.extend(block.retvals);
            if doc.type_name.is_none() {
                doc.type_name = block.type_name;
            }
        }
    }
}

/// Attribute-derived notes, type extraction and event block synthesis.
fn synthesize(class: &mut ClassUnit) {
    for sec in &mut class.sections {
        let attrs = sec.attrs.clone();
        for decl in &mut sec.decls {
            match decl {
                Declaration::Property(p) => {
                    if let Some(doc) = &mut p.doc {
                        if let Some(t) = doc.type_name.take() {
                            p.type_name = Some(t);
                        }
                        synth_notes(
                            doc,
                            &attrs,
                            "This property has the MATLAB attribute @c {} set to {}.",
                            STRUCTURAL_PROPERTY_ATTRS,
                            PROPERTY_ATTR_DOC,
                        );
                    }
                }
                Declaration::Method(m) => {
                    if let Some(doc) = &mut m.doc {
                        synth_notes(
                            doc,
                            &attrs,
                            "This method has the MATLAB method attribute @c {} set to {}.",
                            STRUCTURAL_METHOD_ATTRS,
                            METHOD_ATTR_DOC,
                        );
                    }
                }
                Declaration::Event(e) => {
                    let doc = e.doc.get_or_insert_with(DocBlock::default);
                    if doc.brief.is_empty() {
                        doc.brief.push(e.name.clone());
                    }
                    if doc.event.is_none() {
                        doc.event = Some(e.name.clone());
                    }
                }
                _ => {}
            }
        }
    }
}

/// Append synthesized notes in fixed order: the access-split note when the
/// compound access attribute has differing sides, then one note per
/// remaining attribute in declaration order, then the documentation link.
fn synth_notes(
    doc: &mut DocBlock,
    attrs: &AttrSet,
    template: &str,
    structural: &[&str],
    link: &str,
) {
    let mut added = false;
    if let (Some(set_a), Some(get_a)) = (attrs.value("SetAccess"), attrs.value("GetAccess")) {
        if set_a != get_a {
            doc.notes.push(format!(
                "This property has non-unique access specifier: <tt>SetAccess = {}, GetAccess = {}</tt>",
                set_a, get_a
            ));
            added = true;
        }
    }
    for (name, value) in &attrs.entries {
        if structural.contains(&name.as_str()) {
            continue;
        }
        let v = match value {
            AttrValue::True => "true",
            AttrValue::Value(v) => v.as_str(),
        };
        let note = template.replacen("{}", name, 1).replacen("{}", v, 1);
        doc.notes.push(note);
        added = true;
    }
    if added {
        doc.notes.push(link.to_string());
    }
}

/// Check a run's first line for an `@var name` / `@fn name` relocation tag.
fn name_tag(run: &CommentRun) -> Option<(String, String)> {
    let first = run.lines.first()?;
    let caps = RE_NAME_TAG.captures(first)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

#[derive(Clone, Copy, PartialEq)]
enum Cont {
    None,
    Param,
    Retval,
    Note,
}

/// Parse comment lines into a structured block. Lines up to the first
/// blank form the brief; `@verbatim` regions pass through untouched.
pub fn parse_docblock<'a, I: Iterator<Item = &'a str>>(lines: I) -> DocBlock {
    let mut doc = DocBlock::default();
    let mut in_details = false;
    let mut in_verbatim = false;
    let mut cont = Cont::None;

    for line in lines {
        let trimmed = line.trim();

        if in_verbatim {
            doc.details.push(line.to_string());
            if trimmed == "@endverbatim" {
                in_verbatim = false;
            }
            continue;
        }
        if trimmed == "@verbatim" {
            in_details = true;
            doc.details.push(line.to_string());
            in_verbatim = true;
            cont = Cont::None;
            continue;
        }
        if let Some(caps) = RE_PARAM.captures(line) {
            doc.params.push(TagEntry {
                key: caps[1].to_string(),
                text: caps[2].trim_end().to_string(),
                type_name: None,
            });
            cont = Cont::Param;
            continue;
        }
        if let Some(caps) = RE_RETVAL.captures(line) {
            doc.retvals.push(TagEntry {
                key: caps[1].to_string(),
                text: caps[2].trim_end().to_string(),
                type_name: None,
            });
            cont = Cont::Retval;
            continue;
        }
        if let Some(caps) = RE_NOTE.captures(line) {
            doc.notes.push(caps[1].trim_end().to_string());
            cont = Cont::Note;
            continue;
        }
        if let Some(caps) = RE_TYPE.captures(line) {
            doc.type_name = Some(caps[1].to_string());
            cont = Cont::None;
            continue;
        }
        if let Some(caps) = RE_EVENT.captures(line) {
            doc.event = Some(caps[1].to_string());
            cont = Cont::None;
            continue;
        }
        if trimmed.is_empty() {
            if !in_details {
                in_details = true;
            } else if cont == Cont::None {
                doc.details.push(String::new());
            }
            cont = Cont::None;
            continue;
        }
        match cont {
            Cont::Param => {
                if let Some(last) = doc.params.last_mut() {
                    last.text.push('\n');
                    last.text.push_str(trimmed);
                }
            }
            Cont::Retval => {
                if let Some(last) = doc.retvals.last_mut() {
                    last.text.push('\n');
                    last.text.push_str(trimmed);
                }
            }
            Cont::Note => {
                if let Some(last) = doc.notes.last_mut() {
                    last.push('\n');
                    last.push_str(trimmed);
                }
            }
            Cont::None => {
                if in_details {
                    doc.details.push(line.to_string());
                } else {
                    doc.brief.push(line.to_string());
                }
            }
        }
    }

    while doc.details.first().is_some_and(|l| l.trim().is_empty()) {
        doc.details.remove(0);
    }
    while doc.details.last().is_some_and(|l| l.trim().is_empty()) {
        doc.details.pop();
    }
    for entry in doc.params.iter_mut().chain(doc.retvals.iter_mut()) {
        if let Some(caps) = RE_OF_TYPE.captures(&entry.text) {
            entry.type_name = Some(caps[1].to_string());
        }
    }
    doc
}
