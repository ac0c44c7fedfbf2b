//! Emission of per-file definitions from a keep-set.
//!
//! For every owner type in the keep-set the emitter fetches its partial
//! declarations and re-renders them with the member list reduced to the
//! kept subset. Reduction works on the original source text: the ranges
//! of non-kept members (leading trivia and trailing comma included) are
//! spliced out, everything else is byte-equivalent to the original.
//! Enums and type aliases are emitted unchanged; free items are emitted
//! as-is; unrecognised declaration forms fall back to as-is rather than
//! erroring.
//!
//! Explanation trivia is an emit-phase adorner: member filtering decides
//! what survives, then the adorner injects one `// path: <p>` line per
//! inclusion path in front of each annotated node, preserving the node's
//! original indentation. The whole pass is pure, so emitting the same
//! keep-set twice produces byte-identical output.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use ra_ap_hir::Semantics;
use ra_ap_ide_db::RootDatabase;
use ra_ap_syntax::{AstNode, TextRange, TextSize, ast};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SliceError;
use crate::keep_set::{KeepSet, TypeEntry};
use crate::semantics::{
    Partial, TextCache, assoc_item_symbol, declaring_partials,
    record_field_symbol, tuple_field_symbol,
};
use crate::symbols::SymbolId;

/// Whether emitted declarations carry inclusion-path comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplainMode {
    /// Emit no comments.
    #[default]
    None,
    /// Prepend one `// path: <p>` line per inclusion path in front of
    /// each emitted type and member.
    ReasonForInclusion,
}

/// One emitted declaration: the slice of a type or free item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Display key of the symbol, e.g. `mycrate::widgets::Button`.
    pub symbol: String,
    /// The `::`-joined path of the containing crate and modules.
    pub namespace: String,
    /// The retained source fragment, left-margin minified.
    pub code: String,
}

/// All definitions emitted for one source file, keyed by
/// `"<file>:<type display key>"` in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSlice {
    pub file: String,
    pub definitions: IndexMap<String, Definition>,
}

/// Path marker for a compound type that was reached but contributes no
/// members, to make the attenuation visible.
const NO_MEMBERS_MARKER: &str = "(type kept, but no members directly used)";

/// Render every type in the keep-set into per-file definition sets.
pub(crate) fn emit(
    sema: &Semantics<'_, RootDatabase>,
    keep: &KeepSet,
    explain: ExplainMode,
    cancel: &CancellationToken,
) -> Result<Vec<FileSlice>, SliceError> {
    if keep.is_empty() {
        return Ok(Vec::new());
    }
    let mut cache = TextCache::new();
    let mut slices: IndexMap<String, FileSlice> = IndexMap::new();

    for (&sym, entry) in keep.types() {
        if cancel.is_cancelled() {
            return Err(SliceError::cancelled());
        }
        let Some(rendered) =
            render_type(sema, &mut cache, keep, sym, entry, explain)
        else {
            continue;
        };
        let key = format!("{}:{}", rendered.file, rendered.symbol);
        slices
            .entry(rendered.file.clone())
            .or_insert_with(|| FileSlice {
                file: rendered.file.clone(),
                definitions: IndexMap::new(),
            })
            .definitions
            .insert(
                key,
                Definition {
                    symbol: rendered.symbol,
                    namespace: rendered.namespace,
                    code: rendered.code,
                },
            );
    }
    Ok(slices.into_values().collect())
}

struct RenderedType {
    file: String,
    symbol: String,
    namespace: String,
    code: String,
}

/// Render one owner type: its partial declarations with members reduced
/// to the kept subset, assembled, minified, and adorned.
fn render_type(
    sema: &Semantics<'_, RootDatabase>,
    cache: &mut TextCache,
    keep: &KeepSet,
    sym: SymbolId,
    entry: &TypeEntry,
    explain: ExplainMode,
) -> Option<RenderedType> {
    let db = sema.db;
    let partials = declaring_partials(sema, sym);
    let Some(primary) = partials.first() else {
        warn!(
            symbol = %sym.display_key(db),
            "no declaring syntax, skipping emission"
        );
        return None;
    };
    let file_display = cache.get(sema, primary.file()).display.clone();

    let mut pieces = Vec::new();
    let mut kept_members = 0usize;
    for partial in &partials {
        let doc = cache.get(sema, partial.file());
        let render = render_partial(sema, &doc.text, entry, partial, explain);
        kept_members += render.kept;
        if let Some(piece) = render.piece {
            pieces.push(piece);
        }
    }
    if pieces.is_empty() {
        return None;
    }

    let mut code = minify_left_margin(&pieces.join("\n\n"));

    if explain == ExplainMode::ReasonForInclusion {
        let marker_set;
        let paths = if sym.is_compound_type()
            && kept_members == 0
            && !keep.is_root(sym)
        {
            marker_set = BTreeSet::from([NO_MEMBERS_MARKER.to_owned()]);
            &marker_set
        } else {
            &entry.paths
        };
        let mut prefix = String::new();
        for path in paths {
            prefix.push_str("// path: ");
            prefix.push_str(path);
            prefix.push('\n');
        }
        prefix.push_str(&code);
        code = prefix;
    }

    Some(RenderedType {
        file: file_display,
        symbol: sym.display_key(db),
        namespace: sym.namespace(db),
        code,
    })
}

struct PartialRender {
    /// The rendered text, or `None` when the partial is omitted (an impl
    /// block with no kept member).
    piece: Option<String>,
    /// Number of declared members of this partial that were kept.
    kept: usize,
}

fn render_partial(
    sema: &Semantics<'_, RootDatabase>,
    text: &str,
    entry: &TypeEntry,
    partial: &Partial,
    explain: ExplainMode,
) -> PartialRender {
    let db = sema.db;
    match partial {
        Partial::Adt { node, .. } => match node {
            // Enums are emitted unchanged; the variant list is the type.
            ast::Adt::Enum(e) => PartialRender {
                piece: Some(verbatim(text, e.syntax().text_range())),
                kept: 0,
            },
            ast::Adt::Struct(s) => {
                let members = struct_field_members(sema, s);
                let (piece, kept) = reduce_members(
                    db,
                    text,
                    s.syntax().text_range(),
                    members,
                    entry,
                    explain,
                );
                PartialRender {
                    piece: Some(piece),
                    kept,
                }
            }
            ast::Adt::Union(u) => {
                let members = union_field_members(sema, u);
                let (piece, kept) = reduce_members(
                    db,
                    text,
                    u.syntax().text_range(),
                    members,
                    entry,
                    explain,
                );
                PartialRender {
                    piece: Some(piece),
                    kept,
                }
            }
        },
        Partial::Trait { node, .. } => {
            let members = assoc_members(sema, node.assoc_item_list());
            let (piece, kept) = reduce_members(
                db,
                text,
                node.syntax().text_range(),
                members,
                entry,
                explain,
            );
            PartialRender {
                piece: Some(piece),
                kept,
            }
        }
        Partial::Impl { node, .. } => {
            let members = assoc_members(sema, node.assoc_item_list());
            let (piece, kept) = reduce_members(
                db,
                text,
                node.syntax().text_range(),
                members,
                entry,
                explain,
            );
            PartialRender {
                // An impl block that contributes nothing is left out
                // entirely rather than emitted as an empty shell.
                piece: (kept > 0).then_some(piece),
                kept,
            }
        }
        Partial::Other { node, .. } => PartialRender {
            piece: Some(verbatim(text, node.text_range())),
            kept: 0,
        },
    }
}

/// A member node of a partial declaration: its range, its resolved
/// symbol (if resolution succeeded), and whether its removal eats a
/// trailing comma.
struct MemberNode {
    range: TextRange,
    symbol: Option<SymbolId>,
    comma: bool,
}

fn struct_field_members(
    sema: &Semantics<'_, RootDatabase>,
    node: &ast::Struct,
) -> Vec<MemberNode> {
    match node.field_list() {
        Some(ast::FieldList::RecordFieldList(list)) => list
            .fields()
            .map(|f| MemberNode {
                range: f.syntax().text_range(),
                symbol: record_field_symbol(sema, &f),
                comma: true,
            })
            .collect(),
        Some(ast::FieldList::TupleFieldList(list)) => list
            .fields()
            .map(|f| MemberNode {
                range: f.syntax().text_range(),
                symbol: tuple_field_symbol(sema, &f),
                comma: true,
            })
            .collect(),
        None => Vec::new(),
    }
}

fn union_field_members(
    sema: &Semantics<'_, RootDatabase>,
    node: &ast::Union,
) -> Vec<MemberNode> {
    node.record_field_list()
        .map(|list| {
            list.fields()
                .map(|f| MemberNode {
                    range: f.syntax().text_range(),
                    symbol: record_field_symbol(sema, &f),
                    comma: true,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn assoc_members(
    sema: &Semantics<'_, RootDatabase>,
    list: Option<ast::AssocItemList>,
) -> Vec<MemberNode> {
    list.map(|list| {
        list.assoc_items()
            .map(|item| MemberNode {
                range: item.syntax().text_range(),
                symbol: assoc_item_symbol(sema, &item),
                comma: false,
            })
            .collect()
    })
    .unwrap_or_default()
}

/// One text edit: replace `range` with `insert`. Deletions have an empty
/// insert; explain comments are zero-width insertions.
struct Edit {
    range: TextRange,
    insert: String,
}

/// Reduce a declaration's member list to the kept subset.
///
/// A member is kept iff its declared symbol's display key is in the
/// entry's member map; unresolved members are not kept. Kept members
/// stay in their original syntactic order and, in explain mode, receive
/// their `// path:` lines at their original indentation.
fn reduce_members(
    db: &RootDatabase,
    text: &str,
    node_range: TextRange,
    members: Vec<MemberNode>,
    entry: &TypeEntry,
    explain: ExplainMode,
) -> (String, usize) {
    let mut edits = Vec::new();
    let mut kept = 0usize;

    for member in members {
        let info = member
            .symbol
            .map(|sym| sym.display_key(db))
            .and_then(|key| entry.members.get(&key));
        match info {
            Some(info) => {
                kept += 1;
                if explain == ExplainMode::ReasonForInclusion
                    && !info.paths.is_empty()
                {
                    edits.push(path_comment_edit(
                        text,
                        node_range,
                        member.range.start(),
                        &info.paths,
                    ));
                }
            }
            None => edits.push(Edit {
                range: removal_range(
                    text,
                    member.range,
                    node_range,
                    member.comma,
                ),
                insert: String::new(),
            }),
        }
    }

    (apply_edits(text, node_range, edits), kept)
}

/// Extend a member's range for removal: backwards over its line's
/// leading whitespace (and the preceding newline, so the whole line
/// disappears), forwards over an immediately following comma.
fn removal_range(
    text: &str,
    range: TextRange,
    node_range: TextRange,
    eat_comma: bool,
) -> TextRange {
    let bytes = text.as_bytes();
    let floor = usize::from(node_range.start());
    let ceil = usize::from(node_range.end());

    let mut start = usize::from(range.start());
    while start > floor && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    if start > floor && bytes[start - 1] == b'\n' {
        start -= 1;
        if start > floor && bytes[start - 1] == b'\r' {
            start -= 1;
        }
    }

    let mut end = usize::from(range.end());
    if eat_comma {
        let mut probe = end;
        while probe < ceil && matches!(bytes[probe], b' ' | b'\t') {
            probe += 1;
        }
        if probe < ceil && bytes[probe] == b',' {
            end = probe + 1;
        }
    }

    TextRange::new(
        TextSize::from(start as u32),
        TextSize::from(end as u32),
    )
}

/// Build the zero-width insertion carrying a member's `// path:` lines,
/// indented like the member's own line.
fn path_comment_edit(
    text: &str,
    node_range: TextRange,
    member_start: TextSize,
    paths: &BTreeSet<String>,
) -> Edit {
    let bytes = text.as_bytes();
    let floor = usize::from(node_range.start());
    let mut line_start = usize::from(member_start);
    while line_start > floor && bytes[line_start - 1] != b'\n' {
        line_start -= 1;
    }
    let indent: String = text[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();

    let mut insert = String::new();
    for path in paths {
        insert.push_str(&indent);
        insert.push_str("// path: ");
        insert.push_str(path);
        insert.push('\n');
    }
    Edit {
        range: TextRange::empty(TextSize::from(line_start as u32)),
        insert,
    }
}

/// Apply edits to the slice of `text` covered by `node_range`.
///
/// Edits are applied left to right; ranges reaching into text a prior
/// edit already consumed are clamped (members sharing a line can produce
/// such overlaps after removal extension).
fn apply_edits(
    text: &str,
    node_range: TextRange,
    mut edits: Vec<Edit>,
) -> String {
    edits.sort_by_key(|e| (e.range.start(), e.range.end()));

    let mut out = String::new();
    let mut pos = usize::from(node_range.start());
    for edit in edits {
        let start = usize::from(edit.range.start()).max(pos);
        let end = usize::from(edit.range.end()).max(start);
        out.push_str(&text[pos..start]);
        out.push_str(&edit.insert);
        pos = end;
    }
    out.push_str(&text[pos..usize::from(node_range.end())]);
    out
}

/// Copy a node's text unchanged.
fn verbatim(text: &str, range: TextRange) -> String {
    text[usize::from(range.start())..usize::from(range.end())].to_owned()
}

/// Left-margin minification: strip the minimum leading-whitespace count
/// over all non-blank lines from every line, then trim surrounding blank
/// lines. Tokens are never rewritten.
pub(crate) fn minify_left_margin(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let stripped: Vec<&str> = text
        .lines()
        .map(|line| strip_margin(line, margin))
        .collect();

    let start = stripped
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(0);
    let end = stripped
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(stripped.len());
    stripped[start..end].join("\n")
}

/// Strip up to `margin` leading whitespace characters from one line.
fn strip_margin(line: &str, margin: usize) -> &str {
    let mut offset = line.len();
    let mut stripped = 0;
    for (i, c) in line.char_indices() {
        if stripped >= margin || !c.is_whitespace() {
            offset = i;
            break;
        }
        stripped += 1;
    }
    &line[offset..]
}
