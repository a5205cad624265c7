//! Accessor routing.
//!
//! Post-pass over the declaration table: methods named `get.<name>` /
//! `set.<name>` are taken out of the plain method list and linked onto the
//! property they target, leaving an emission slot at their source
//! position. Kept separate from extraction so the linking logic stays
//! independently testable.

use crate::model::*;
use std::collections::HashMap;

struct Move {
    section: usize,
    decl: usize,
    target: (usize, usize),
    kind: AccessorKind,
    prop: String,
}

/// Route accessor overrides onto their properties. Unknown targets and
/// duplicate overrides stay behind as ordinary methods, with a diagnostic.
pub fn route(class: &mut ClassUnit) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    // first property with each name, across all sections
    let mut props: HashMap<String, (usize, usize)> = HashMap::new();
    for (s, sec) in class.sections.iter().enumerate() {
        for (d, decl) in sec.decls.iter().enumerate() {
            if let Declaration::Property(p) = decl {
                props.entry(p.name.clone()).or_insert((s, d));
            }
        }
    }

    let mut moves: Vec<Move> = Vec::new();
    let mut claimed: Vec<((usize, usize), AccessorKind)> = Vec::new();
    for (s, sec) in class.sections.iter().enumerate() {
        for (d, decl) in sec.decls.iter().enumerate() {
            let Declaration::Method(m) = decl else { continue };
            let Some((kind, prop_name)) = accessor_name(&m.name) else {
                continue;
            };
            match props.get(prop_name) {
                None => diags.push(Diagnostic::error(
                    format!(
                        "accessor override '{}' targets unknown property '{}'; kept as an ordinary method",
                        m.name, prop_name
                    ),
                    m.line,
                    1,
                )),
                Some(&target) => {
                    if claimed.iter().any(|&(t, k)| t == target && k == kind) {
                        diags.push(Diagnostic::warning(
                            format!(
                                "duplicate accessor override '{}'; kept as an ordinary method",
                                m.name
                            ),
                            m.line,
                            1,
                        ));
                    } else {
                        claimed.push((target, kind));
                        moves.push(Move {
                            section: s,
                            decl: d,
                            target,
                            kind,
                            prop: prop_name.to_string(),
                        });
                    }
                }
            }
        }
    }

    for mv in moves {
        let slot = Declaration::Accessor {
            property: mv.prop,
            kind: mv.kind,
        };
        let old = std::mem::replace(&mut class.sections[mv.section].decls[mv.decl], slot);
        let Declaration::Method(m) = old else { continue };
        let ov = AccessorOverride {
            kind: mv.kind,
            params: m.params,
            outputs: m.outputs,
            body: match m.body {
                BodyKind::Inline(b) => b,
                _ => String::new(),
            },
            doc: m.doc,
        };
        let (ts, td) = mv.target;
        if let Declaration::Property(p) = &mut class.sections[ts].decls[td] {
            match mv.kind {
                AccessorKind::Get => p.getter = Some(ov),
                AccessorKind::Set => p.setter = Some(ov),
            }
        }
    }

    diags
}

fn accessor_name(name: &str) -> Option<(AccessorKind, &str)> {
    let (kind, prop) = if let Some(rest) = name.strip_prefix("get.") {
        (AccessorKind::Get, rest)
    } else if let Some(rest) = name.strip_prefix("set.") {
        (AccessorKind::Set, rest)
    } else {
        return None;
    };
    (!prop.is_empty() && !prop.contains('.')).then_some((kind, prop))
}
