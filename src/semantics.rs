//! The semantic surface for defslice.
//!
//! This module is the only place (together with `workspaces`) that talks
//! to rust-analyzer. Everything the crawler and emitter need - locating
//! documents, enumerating declared types and members, classifying use
//! sites, walking a declaration for the symbols it references, fetching
//! declaring syntax - is expressed here as plain functions over
//! [`Semantics`], so the rest of the crate stays compiler-agnostic.
//!
//! ## Reference collection
//!
//! rust-analyzer doesn't provide a direct "what does this declaration
//! reference?" API. We use the canonical pattern from its own ide
//! features: walk all `NameRef` nodes of a syntax tree and resolve each
//! through `NameRefClass::classify`. That covers paths, method calls,
//! field shorthands and pattern constants alike. The walk is synchronous
//! and pure; the surface call that fetched the tree is the suspension
//! point.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ra_ap_base_db::{FileId, SourceDatabase, VfsPath};
use ra_ap_hir::{
    Adt, AssocItem, Crate, FieldSource, HasSource, HirFileId, Impl, Semantics,
};
use ra_ap_ide_db::RootDatabase;
use ra_ap_ide_db::defs::{Definition, NameRefClass};
use ra_ap_ide_db::line_index::LineIndex;
use ra_ap_syntax::{AstNode, NodeOrToken, SyntaxNode, TextRange, ast};
use tracing::{debug, warn};

use crate::error::SliceError;
use crate::symbols::SymbolId;

/// Resolve a file ID to the path its source root knows it by.
///
/// Every `FileId` the crawler or emitter touches was handed out by the
/// loaded workspace (or a test fixture), so the owning source root must
/// have a path on record for it.
///
/// # Errors
///
/// A miss means this module produced a file the database never
/// registered - a broken surface invariant, reported as the `Internal`
/// error kind rather than swallowed.
pub(crate) fn file_path(
    db: &RootDatabase,
    file_id: FileId,
) -> Result<VfsPath, SliceError> {
    let root_id = db.file_source_root(file_id).source_root_id(db);
    db.source_root(root_id)
        .source_root(db)
        .path_for_file(&file_id)
        .cloned()
        .ok_or_else(|| {
            SliceError::internal(format!(
                "no source-root path recorded for file {file_id:?}"
            ))
        })
}

/// The display form of a file path, used in output keys and inclusion
/// paths. Falls back to an empty string for unresolvable files.
pub(crate) fn display_file_path(db: &RootDatabase, file_id: FileId) -> String {
    match file_path(db, file_id) {
        Ok(path) => path.to_string(),
        Err(e) => {
            warn!(error = %e, "could not resolve file path");
            String::new()
        }
    }
}

/// Locate a document by case-insensitive full-path match over the files
/// of all workspace source roots. Returns `None` if not present.
pub(crate) fn locate_document(
    db: &RootDatabase,
    path: &str,
) -> Option<FileId> {
    let needle = path.to_lowercase();
    let mut seen_roots = HashSet::new();

    for krate in Crate::all(db) {
        if !krate.origin(db).is_local() {
            continue;
        }
        let root_file = krate.root_file(db);
        let root_id = db.file_source_root(root_file).source_root_id(db);
        if !seen_roots.insert(root_id) {
            continue;
        }
        let root = db.source_root(root_id).source_root(db);
        for file_id in root.iter() {
            if let Some(candidate) = root.path_for_file(&file_id)
                && candidate.to_string().to_lowercase() == needle
            {
                return Some(file_id);
            }
        }
    }
    None
}

/// The text of one document, shared between crawler and emitter.
pub(crate) struct DocText {
    pub(crate) display: String,
    pub(crate) text: String,
    pub(crate) line_index: LineIndex,
}

/// Per-extraction cache of document texts and line indexes.
///
/// Building a `LineIndex` is linear in the file, and inclusion paths are
/// formatted for every enqueued frontier, so the crawl would otherwise
/// re-index the same files over and over.
#[derive(Default)]
pub(crate) struct TextCache {
    docs: HashMap<FileId, Rc<DocText>>,
}

impl TextCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(
        &mut self,
        sema: &Semantics<'_, RootDatabase>,
        file_id: FileId,
    ) -> Rc<DocText> {
        if let Some(doc) = self.docs.get(&file_id) {
            return Rc::clone(doc);
        }
        let text = sema
            .parse_guess_edition(file_id)
            .syntax()
            .text()
            .to_string();
        let doc = Rc::new(DocText {
            display: display_file_path(sema.db, file_id),
            line_index: LineIndex::new(&text),
            text,
        });
        self.docs.insert(file_id, Rc::clone(&doc));
        doc
    }
}

/// A syntactic occurrence that resolved to a symbol.
pub(crate) struct UseSite {
    pub(crate) file: String,
    /// 1-based line of the reference.
    pub(crate) line: u32,
    /// 1-based column of the reference.
    pub(crate) col: u32,
    /// The source line containing the reference, trimmed.
    pub(crate) text: String,
    /// The owner type of the declaration lexically enclosing the
    /// reference, if any. Seeding uses it to price the first hop.
    pub(crate) enclosing: Option<SymbolId>,
}

/// Every `NameRef` in the document that classifies to a registrable
/// symbol, with its location.
///
/// `NameRef` nodes are reference sites by construction - declarations
/// introduce `Name` nodes - so "declarations skipped" holds without a
/// separate check.
pub(crate) fn use_site_symbols(
    sema: &Semantics<'_, RootDatabase>,
    file_id: FileId,
) -> Vec<(SymbolId, UseSite)> {
    let source_file = sema.parse_guess_edition(file_id);
    let text = source_file.syntax().text().to_string();
    let line_index = LineIndex::new(&text);
    let file_display = display_file_path(sema.db, file_id);

    let mut out = Vec::new();
    for name_ref in source_file
        .syntax()
        .descendants()
        .filter_map(ast::NameRef::cast)
    {
        let Some(sym) = classify_name_ref(sema, &name_ref) else {
            continue;
        };
        let offset = name_ref.syntax().text_range().start();
        let pos = line_index.line_col(offset);
        let line_text = text
            .lines()
            .nth(pos.line as usize)
            .unwrap_or("")
            .trim()
            .to_owned();
        let enclosing = enclosing_owner(sema, name_ref.syntax());
        out.push((
            sym,
            UseSite {
                file: file_display.clone(),
                line: pos.line + 1,
                col: pos.col + 1,
                text: line_text,
                enclosing,
            },
        ));
    }
    out
}

/// Resolve a single `NameRef` to a slice symbol.
///
/// `NameRefClass::classify` is the canonical rust-analyzer resolution
/// entry point: it handles field shorthands (`Foo { field }`) and
/// pattern constants that raw path resolution misses. Extern crate
/// shorthands are crate-level references, not symbol references.
pub(crate) fn classify_name_ref(
    sema: &Semantics<'_, RootDatabase>,
    name_ref: &ast::NameRef,
) -> Option<SymbolId> {
    match NameRefClass::classify(sema, name_ref)? {
        NameRefClass::Definition(def, _) => SymbolId::classify(sema.db, def),
        NameRefClass::FieldShorthand { field_ref, .. } => {
            SymbolId::classify(sema.db, Definition::Field(field_ref))
        }
        NameRefClass::ExternCrateShorthand { .. } => None,
    }
}

/// The owner type of the declaration lexically enclosing a node.
fn enclosing_owner(
    sema: &Semantics<'_, RootDatabase>,
    node: &SyntaxNode,
) -> Option<SymbolId> {
    for ancestor in node.ancestors().skip(1) {
        if let Some(item) = ast::Item::cast(ancestor)
            && let Some(sym) = item_symbol(sema, &item)
        {
            return sym.owner(sema.db);
        }
    }
    None
}

/// Resolve a syntactic item to its slice symbol.
///
/// Impl blocks resolve to their self type (or trait), matching how the
/// symbol index assigns owners.
pub(crate) fn item_symbol(
    sema: &Semantics<'_, RootDatabase>,
    item: &ast::Item,
) -> Option<SymbolId> {
    let db = sema.db;
    let def = match item {
        ast::Item::Struct(it) => Definition::Adt(Adt::Struct(sema.to_def(it)?)),
        ast::Item::Enum(it) => Definition::Adt(Adt::Enum(sema.to_def(it)?)),
        ast::Item::Union(it) => Definition::Adt(Adt::Union(sema.to_def(it)?)),
        ast::Item::Trait(it) => Definition::Trait(sema.to_def(it)?),
        ast::Item::TypeAlias(it) => Definition::TypeAlias(sema.to_def(it)?),
        ast::Item::Fn(it) => Definition::Function(sema.to_def(it)?),
        ast::Item::Const(it) => Definition::Const(sema.to_def(it)?),
        ast::Item::Static(it) => Definition::Static(sema.to_def(it)?),
        ast::Item::Impl(it) => {
            let impl_: Impl = sema.to_def(it)?;
            match impl_.self_ty(db).as_adt() {
                Some(adt) => Definition::Adt(adt),
                None => Definition::Trait(impl_.trait_(db)?),
            }
        }
        _ => return None,
    };
    SymbolId::classify(db, def)
}

/// Every owner symbol declared in the document: ADTs, traits, type
/// aliases and free items, nested modules included. Impl blocks are the
/// partial declarations of types declared elsewhere and are skipped;
/// their associated items surface through [`declared_members`].
pub(crate) fn declared_types(
    sema: &Semantics<'_, RootDatabase>,
    file_id: FileId,
) -> Vec<SymbolId> {
    let source_file = sema.parse_guess_edition(file_id);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for item in source_file
        .syntax()
        .descendants()
        .filter_map(ast::Item::cast)
    {
        if matches!(item, ast::Item::Impl(_)) {
            continue;
        }
        let Some(sym) = item_symbol(sema, &item) else {
            continue;
        };
        // Associated items are members of their owner, not document-level
        // declarations.
        let Some(owner) = sym.owner(sema.db) else {
            continue;
        };
        if owner != sym {
            continue;
        }
        if seen.insert(sym) {
            out.push(sym);
        }
    }
    out
}

/// The symbols directly referenced by a symbol's declaring syntax:
/// invocations, member references, constructor calls, plus the types in
/// its signature or field list. Symbols without an in-source declaration
/// contribute nothing.
pub(crate) fn referenced_symbols(
    sema: &Semantics<'_, RootDatabase>,
    sym: SymbolId,
) -> Vec<SymbolId> {
    let Some((_, node)) = declaring_node(sema, sym) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name_ref in node.descendants().filter_map(ast::NameRef::cast) {
        if let Some(child) = classify_name_ref(sema, &name_ref)
            && child != sym
            && seen.insert(child)
        {
            out.push(child);
        }
    }
    out
}

/// Fetch the declaring syntax node of a symbol, anchored in a tree the
/// semantics cache knows about so later classification inside it works.
///
/// Declarations that only exist inside macro expansions have no original
/// text to slice; they are skipped with a log line.
pub(crate) fn declaring_node(
    sema: &Semantics<'_, RootDatabase>,
    sym: SymbolId,
) -> Option<(FileId, SyntaxNode)> {
    let db = sema.db;
    let (hir_file, node) = match sym.def() {
        Definition::Adt(Adt::Struct(it)) => src_node(db, it)?,
        Definition::Adt(Adt::Enum(it)) => src_node(db, it)?,
        Definition::Adt(Adt::Union(it)) => src_node(db, it)?,
        Definition::Trait(it) => src_node(db, it)?,
        Definition::TypeAlias(it) => src_node(db, it)?,
        Definition::Function(it) => src_node(db, it)?,
        Definition::Const(it) => src_node(db, it)?,
        Definition::Static(it) => src_node(db, it)?,
        Definition::Variant(it) => src_node(db, it)?,
        Definition::Field(it) => field_src_node(db, it)?,
        _ => return None,
    };
    anchor_original(sema, hir_file, node)
}

/// One partial declaration of a type, as the emitter consumes it.
pub(crate) enum Partial {
    Adt { file: FileId, node: ast::Adt },
    Trait { file: FileId, node: ast::Trait },
    Impl { file: FileId, node: ast::Impl },
    Other { file: FileId, node: SyntaxNode },
}

impl Partial {
    pub(crate) fn file(&self) -> FileId {
        match self {
            Partial::Adt { file, .. }
            | Partial::Trait { file, .. }
            | Partial::Impl { file, .. }
            | Partial::Other { file, .. } => *file,
        }
    }
}

/// The partial declarations of a symbol, primary declaration first.
///
/// For an ADT that is the ADT node followed by its impl blocks in
/// deterministic (file, offset) order; for a trait, the trait node; for
/// self-owned items, their single declaration.
pub(crate) fn declaring_partials(
    sema: &Semantics<'_, RootDatabase>,
    sym: SymbolId,
) -> Vec<Partial> {
    let db = sema.db;
    let mut out = Vec::new();

    match sym.def() {
        Definition::Adt(adt) => {
            if let Some((file, node)) = declaring_node(sema, sym)
                && let Some(adt_node) = ast::Adt::cast(node)
            {
                out.push(Partial::Adt {
                    file,
                    node: adt_node,
                });
            }
            let mut impls = Vec::new();
            for impl_ in local_impls(db, adt) {
                let Some((hir_file, node)) = src_node(db, impl_) else {
                    continue;
                };
                let Some((file, node)) = anchor_original(sema, hir_file, node)
                else {
                    continue;
                };
                let Some(impl_node) = ast::Impl::cast(node) else {
                    continue;
                };
                impls.push((
                    display_file_path(db, file),
                    impl_node.syntax().text_range().start(),
                    file,
                    impl_node,
                ));
            }
            impls.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
            out.extend(
                impls
                    .into_iter()
                    .map(|(_, _, file, node)| Partial::Impl { file, node }),
            );
        }
        Definition::Trait(_) => {
            if let Some((file, node)) = declaring_node(sema, sym)
                && let Some(trait_node) = ast::Trait::cast(node)
            {
                out.push(Partial::Trait {
                    file,
                    node: trait_node,
                });
            }
        }
        _ => {
            if let Some((file, node)) = declaring_node(sema, sym) {
                out.push(Partial::Other { file, node });
            }
        }
    }
    out
}

/// Every member a type declares: fields or variants of the ADT plus the
/// associated items of all its impl blocks; for traits, the trait items.
/// Self-owned items declare themselves.
pub(crate) fn declared_members(
    sema: &Semantics<'_, RootDatabase>,
    type_sym: SymbolId,
) -> Vec<SymbolId> {
    let db = sema.db;
    let mut defs: Vec<Definition> = Vec::new();

    match type_sym.def() {
        Definition::Adt(adt) => {
            match adt {
                Adt::Struct(s) => {
                    defs.extend(s.fields(db).into_iter().map(Definition::Field));
                }
                Adt::Union(u) => {
                    defs.extend(u.fields(db).into_iter().map(Definition::Field));
                }
                Adt::Enum(e) => {
                    defs.extend(
                        e.variants(db).into_iter().map(Definition::Variant),
                    );
                }
            }
            for impl_ in local_impls(db, adt) {
                defs.extend(impl_.items(db).into_iter().map(assoc_def));
            }
        }
        Definition::Trait(t) => {
            defs.extend(t.items(db).into_iter().map(assoc_def));
        }
        _ => return vec![type_sym],
    }

    let mut seen = HashSet::new();
    defs.into_iter()
        .filter_map(|def| SymbolId::classify(db, def))
        .filter(|sym| seen.insert(*sym))
        .collect()
}

/// The members that survive whenever their type is kept: associated
/// constants. Construction and initialization of the type implicitly
/// depend on them even when no use site names them.
pub(crate) fn mandatory_members(
    sema: &Semantics<'_, RootDatabase>,
    type_sym: SymbolId,
) -> Vec<SymbolId> {
    let db = sema.db;
    let mut consts: Vec<Definition> = Vec::new();

    match type_sym.def() {
        Definition::Adt(adt) => {
            for impl_ in local_impls(db, adt) {
                consts.extend(impl_.items(db).into_iter().filter_map(|item| {
                    match item {
                        AssocItem::Const(c) => Some(Definition::Const(c)),
                        _ => None,
                    }
                }));
            }
        }
        Definition::Trait(t) => {
            consts.extend(t.items(db).into_iter().filter_map(
                |item| match item {
                    AssocItem::Const(c) => Some(Definition::Const(c)),
                    _ => None,
                },
            ));
        }
        _ => {}
    }

    consts
        .into_iter()
        .filter_map(|def| SymbolId::classify(db, def))
        .collect()
}

/// The transitive implemented-trait set of an ADT.
///
/// Supertraits need no separate walk: if `T: Sub` and `Sub: Super`, the
/// coherence rules force an `impl Super for T` to exist, so collecting
/// the trait of every impl block already yields the transitive set.
pub(crate) fn implemented_traits(
    sema: &Semantics<'_, RootDatabase>,
    type_sym: SymbolId,
) -> Vec<SymbolId> {
    let db = sema.db;
    let Definition::Adt(adt) = type_sym.def() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    local_impls(db, adt)
        .into_iter()
        .filter_map(|impl_| impl_.trait_(db))
        .filter_map(|t| SymbolId::classify(db, Definition::Trait(t)))
        .filter(|sym| seen.insert(*sym))
        .collect()
}

/// The impl blocks of an ADT that live in workspace crates. Blanket
/// impls from dependency crates have no source to slice.
fn local_impls(db: &RootDatabase, adt: Adt) -> Vec<Impl> {
    Impl::all_for_type(db, adt.ty(db))
        .into_iter()
        .filter(|impl_| impl_.module(db).krate(db).origin(db).is_local())
        .collect()
}

/// Whether a symbol's primary declaration lives in the given document.
pub(crate) fn is_declared_in(
    sema: &Semantics<'_, RootDatabase>,
    sym: SymbolId,
    file_id: FileId,
) -> bool {
    declaring_node(sema, sym)
        .map(|(file, _)| file == file_id)
        .unwrap_or(false)
}

/// `display_key (file:line)` for inclusion paths. Falls back to the bare
/// key for symbols without a source location.
pub(crate) fn signature_with_line(
    sema: &Semantics<'_, RootDatabase>,
    cache: &mut TextCache,
    sym: SymbolId,
) -> String {
    let key = sym.display_key(sema.db);
    match declaring_node(sema, sym) {
        Some((file, node)) => {
            let doc = cache.get(sema, file);
            let pos = doc.line_index.line_col(node.text_range().start());
            format!("{key} ({}:{})", doc.display, pos.line + 1)
        }
        None => key,
    }
}

/// Resolve an associated item from an impl or trait body to its symbol.
pub(crate) fn assoc_item_symbol(
    sema: &Semantics<'_, RootDatabase>,
    item: &ast::AssocItem,
) -> Option<SymbolId> {
    let def = match item {
        ast::AssocItem::Fn(it) => Definition::Function(sema.to_def(it)?),
        ast::AssocItem::Const(it) => Definition::Const(sema.to_def(it)?),
        ast::AssocItem::TypeAlias(it) => {
            Definition::TypeAlias(sema.to_def(it)?)
        }
        ast::AssocItem::MacroCall(_) => return None,
    };
    SymbolId::classify(sema.db, def)
}

/// Resolve a record field declaration to its symbol.
pub(crate) fn record_field_symbol(
    sema: &Semantics<'_, RootDatabase>,
    field: &ast::RecordField,
) -> Option<SymbolId> {
    let f: ra_ap_hir::Field = sema.to_def(field)?;
    SymbolId::classify(sema.db, Definition::Field(f))
}

/// Resolve a tuple field declaration to its symbol.
pub(crate) fn tuple_field_symbol(
    sema: &Semantics<'_, RootDatabase>,
    field: &ast::TupleField,
) -> Option<SymbolId> {
    let f: ra_ap_hir::Field = sema.to_def(field)?;
    SymbolId::classify(sema.db, Definition::Field(f))
}

fn assoc_def(item: AssocItem) -> Definition {
    match item {
        AssocItem::Function(f) => Definition::Function(f),
        AssocItem::Const(c) => Definition::Const(c),
        AssocItem::TypeAlias(t) => Definition::TypeAlias(t),
    }
}

/// Fetch the raw declaring node of a `HasSource` definition.
fn src_node<D>(
    db: &RootDatabase,
    def: D,
) -> Option<(HirFileId, SyntaxNode)>
where
    D: HasSource,
    D::Ast: AstNode,
{
    let src = def.source(db)?;
    Some((src.file_id, src.value.syntax().clone()))
}

/// Field sources are either named record fields or positional tuple
/// fields; both carry a plain syntax node.
fn field_src_node(
    db: &RootDatabase,
    field: ra_ap_hir::Field,
) -> Option<(HirFileId, SyntaxNode)> {
    let src = field.source(db)?;
    let node = match src.value {
        FieldSource::Named(it) => it.syntax().clone(),
        FieldSource::Pos(it) => it.syntax().clone(),
    };
    Some((src.file_id, node))
}

/// Re-anchor a node from a `HasSource` lookup into the parse tree the
/// semantics cache holds for its original file, rejecting nodes that only
/// exist in macro expansions.
fn anchor_original(
    sema: &Semantics<'_, RootDatabase>,
    hir_file: HirFileId,
    node: SyntaxNode,
) -> Option<(FileId, SyntaxNode)> {
    let db = sema.db;
    if hir_file.is_macro() {
        debug!("skipping declaration generated by macro expansion");
        return None;
    }
    let file_id = hir_file.original_file(db).file_id(db);
    let range = node.text_range();
    let root = sema.parse_guess_edition(file_id);
    let node = node_at_range(root.syntax(), range)?;
    Some((file_id, node))
}

/// Find the node with exactly the given range in a tree.
fn node_at_range(root: &SyntaxNode, range: TextRange) -> Option<SyntaxNode> {
    let mut node = match root.covering_element(range) {
        NodeOrToken::Node(n) => n,
        NodeOrToken::Token(t) => t.parent()?,
    };
    while node.text_range() != range {
        node = node.parent()?;
    }
    Some(node)
}
