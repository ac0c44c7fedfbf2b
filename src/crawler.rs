//! Bounded reachability crawl over the reference graph.
//!
//! Starting from the use sites of a root document, the crawler walks the
//! reference graph breadth-first and records, for every owner type it
//! reaches, which members must survive into the slice. Depth is budgeted
//! in cross-type hops: following a reference into another type costs one,
//! moving within the current owner type is free. The first hop - from a
//! use site to the symbol it names - is priced against the declaration
//! lexically enclosing the use site, so a budget of zero keeps the slice
//! inside the root document's own types.
//!
//! Between two semantic-surface calls the crawl state is plain data: a
//! FIFO queue of frontiers, a processed set, and the registry. Dequeue
//! order follows enqueue order, which gives shortest-path-first discovery
//! of inclusion paths.

use std::collections::{HashSet, VecDeque};

use ra_ap_base_db::FileId;
use ra_ap_hir::Semantics;
use ra_ap_ide_db::RootDatabase;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SliceError;
use crate::keep_set::{Registered, Registry};
use crate::semantics::{
    TextCache, declared_members, declared_types, display_file_path,
    implemented_traits, is_declared_in, mandatory_members, referenced_symbols,
    signature_with_line, use_site_symbols,
};
use crate::symbols::SymbolId;

/// One BFS work item: a symbol to process, the depth budget left for
/// hops out of it, and the inclusion path that led here.
struct Frontier {
    symbol: SymbolId,
    depth_left: i32,
    path: String,
}

/// Parameters of one crawl over one root document.
pub(crate) struct CrawlParams {
    pub(crate) root_file: FileId,
    pub(crate) depth: i32,
    pub(crate) exclude_root_definitions: bool,
}

/// Crawl a root document's reference graph into the registry.
///
/// Root types are marked (and, unless `exclude_root_definitions`, fully
/// registered together with their implemented traits); then every use
/// site seeds a frontier and the BFS runs to exhaustion. Cancellation is
/// observed once per dequeued frontier.
pub(crate) fn crawl(
    sema: &Semantics<'_, RootDatabase>,
    registry: &mut Registry,
    params: &CrawlParams,
    cancel: &CancellationToken,
) -> Result<(), SliceError> {
    let db = sema.db;
    let mut cache = TextCache::new();
    let root_display = display_file_path(db, params.root_file);

    // Root-type identification. Root marking is unconditional; full
    // registration is suppressed when the caller excludes the root
    // document's own declarations.
    for type_sym in declared_types(sema, params.root_file) {
        registry.keep_mut().mark_root(type_sym);
        if !params.exclude_root_definitions {
            register_root_type(sema, registry, type_sym, &root_display);
        }
    }

    // Use-site seeding. The first hop is priced here: reaching a symbol
    // owned by the type enclosing the use site is free, crossing into
    // another type costs one.
    let mut queue = VecDeque::new();
    for (sym, site) in use_site_symbols(sema, params.root_file) {
        let Some(owner) = sym.owner(db) else {
            continue;
        };
        let cost = if site.enclosing == Some(owner) { 0 } else { 1 };
        let depth_left = params.depth - cost;
        if depth_left < 0 {
            continue;
        }
        queue.push_back(Frontier {
            symbol: sym,
            depth_left,
            path: format!(
                "used at {}:{}:{}: `{}`",
                site.file, site.line, site.col, site.text
            ),
        });
    }

    // BFS. Duplicate enqueues are harmless; the processed set dedups at
    // dequeue, and only the first dequeue of a symbol registers it.
    let mut processed: HashSet<SymbolId> = HashSet::new();
    while let Some(frontier) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(SliceError::cancelled());
        }
        if !processed.insert(frontier.symbol) {
            continue;
        }
        // Symbols from non-workspace crates are metadata: no source to
        // slice, nothing to follow.
        if !frontier.symbol.is_local(db) {
            continue;
        }
        let Some(owner) = frontier.symbol.owner(db) else {
            debug!(
                symbol = %frontier.symbol.display_key(db),
                "no owner type, skipping"
            );
            continue;
        };
        if params.exclude_root_definitions
            && is_declared_in(sema, owner, params.root_file)
        {
            // Root declarations are suppressed, and they contribute
            // nothing new: their own use sites already seeded the queue.
            continue;
        }
        match registry.register(db, owner, frontier.symbol, frontier.path.clone())
        {
            Registered::Filtered => continue,
            Registered::NewType => {
                register_mandatory(sema, registry, owner);
            }
            Registered::Existing => {}
        }

        for child in referenced_symbols(sema, frontier.symbol) {
            let Some(child_owner) = child.owner(db) else {
                continue;
            };
            let next_depth = if child_owner == owner {
                frontier.depth_left
            } else {
                frontier.depth_left - 1
            };
            if next_depth < 0 {
                continue;
            }
            queue.push_back(Frontier {
                symbol: child,
                depth_left: next_depth,
                path: format!(
                    "{} -> {}",
                    frontier.path,
                    signature_with_line(sema, &mut cache, child)
                ),
            });
        }
    }
    Ok(())
}

/// Register a root type with all of its declared members, then every
/// trait in its transitive implemented-trait set with all of theirs.
/// Trait members registered through the implements rule are not crawled
/// further; they are kept for the reader, not followed.
fn register_root_type(
    sema: &Semantics<'_, RootDatabase>,
    registry: &mut Registry,
    type_sym: SymbolId,
    root_display: &str,
) {
    let db = sema.db;
    let path = format!("declared in {root_display}");
    registry.register(db, type_sym, type_sym, path.clone());
    for member in declared_members(sema, type_sym) {
        registry.register(db, type_sym, member, path.clone());
    }

    for trait_sym in implemented_traits(sema, type_sym) {
        if !trait_sym.is_local(db) {
            continue;
        }
        let trait_path = format!(
            "{} implements {}",
            type_sym.display_key(db),
            trait_sym.display_key(db)
        );
        registry.register(db, trait_sym, trait_sym, trait_path.clone());
        for member in declared_members(sema, trait_sym) {
            registry.register(db, trait_sym, member, trait_path.clone());
        }
    }
}

/// Mandatory inclusion: the associated constants of a type survive
/// whenever the type is registered, referenced or not.
fn register_mandatory(
    sema: &Semantics<'_, RootDatabase>,
    registry: &mut Registry,
    owner: SymbolId,
) {
    let db = sema.db;
    let path = format!("initialization of {}", owner.display_key(db));
    for member in mandatory_members(sema, owner) {
        registry.register(db, owner, member, path.clone());
    }
}

/// Expand a crawl result to the full (non-minimised) form: every owner
/// type already reached gets all of its declared members.
pub(crate) fn expand_to_full(
    sema: &Semantics<'_, RootDatabase>,
    registry: &mut Registry,
) {
    let db = sema.db;
    for type_sym in registry.keep().type_ids() {
        let path = format!("member of {}", type_sym.display_key(db));
        for member in declared_members(sema, type_sym) {
            registry.register(db, type_sym, member, path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use ra_ap_hir::Semantics;
    use ra_ap_ide_db::RootDatabase;

    use crate::keep_set::{KeepSet, NamespaceFilter, Registry};
    use crate::semantics::locate_document;
    use crate::testutil::{token, with_fixture};

    use super::*;

    /// Run a crawl over one root file and return the keep-set.
    fn crawl_fixture(
        db: &RootDatabase,
        root: &str,
        depth: i32,
        exclude_root: bool,
        excluded_namespaces: &[String],
    ) -> KeepSet {
        let sema = Semantics::new(db);
        let root_file = locate_document(db, root).expect("root in fixture");
        let mut registry =
            Registry::new(NamespaceFilter::new(excluded_namespaces));
        crawl(
            &sema,
            &mut registry,
            &CrawlParams {
                root_file,
                depth,
                exclude_root_definitions: exclude_root,
            },
            &token(),
        )
        .expect("crawl succeeds");
        registry.into_keep_set()
    }

    /// All member display keys in the keep-set, across all types.
    fn member_keys(keep: &KeepSet) -> Vec<String> {
        keep.types()
            .flat_map(|(_, entry)| entry.members.keys().cloned())
            .collect()
    }

    fn type_keys(db: &RootDatabase, keep: &KeepSet) -> Vec<String> {
        keep.types().map(|(sym, _)| sym.display_key(db)).collect()
    }

    const CROSS_FILE: &str = r#"
//- /a.rs crate:a deps:b
pub struct A;

impl A {
    pub fn f(&self) {
        b::B::g();
    }
}
//- /b.rs crate:b
pub struct B;

impl B {
    pub fn g() {}
    pub fn h() {}
}
"#;

    /// Depth 1 keeps the referenced member and nothing else of its type.
    #[test]
    fn test_cross_type_reference_keeps_only_used_member() {
        with_fixture(CROSS_FILE, |db| {
            let keep = crawl_fixture(db, "/a.rs", 1, false, &[]);
            let members = member_keys(&keep);

            assert!(members.contains(&"b::B::g()".to_owned()));
            assert!(!members.contains(&"b::B::h()".to_owned()));
            // Root type keeps everything it declares.
            assert!(members.contains(&"a::A::f()".to_owned()));
        });
    }

    /// Depth 0 never leaves the root document's types.
    #[test]
    fn test_depth_zero_stays_in_root_document() {
        with_fixture(CROSS_FILE, |db| {
            let keep = crawl_fixture(db, "/a.rs", 0, false, &[]);
            let types = type_keys(db, &keep);

            assert!(types.contains(&"a::A".to_owned()));
            assert!(!types.contains(&"b::B".to_owned()));
        });
    }

    /// Excluding root definitions drops the root types but still crawls
    /// outward from their use sites.
    #[test]
    fn test_exclude_root_definitions() {
        with_fixture(CROSS_FILE, |db| {
            let keep = crawl_fixture(db, "/a.rs", 1, true, &[]);
            let types = type_keys(db, &keep);

            assert!(!types.contains(&"a::A".to_owned()));
            assert!(types.contains(&"b::B".to_owned()));

            let members = member_keys(&keep);
            assert!(members.contains(&"b::B::g()".to_owned()));
            assert!(!members.contains(&"a::A::f()".to_owned()));
        });
    }

    /// Root marking happens even when registration is suppressed.
    #[test]
    fn test_root_marking_is_independent_of_exclusion() {
        with_fixture(CROSS_FILE, |db| {
            let sema = Semantics::new(db);
            let root_file = locate_document(db, "/a.rs").unwrap();
            let a = crate::semantics::declared_types(&sema, root_file)
                .into_iter()
                .find(|s| s.name(db) == "A")
                .unwrap();

            let keep = crawl_fixture(db, "/a.rs", 1, true, &[]);
            assert!(keep.is_root(a));
        });
    }

    /// A chain of same-type references is free: everything reachable
    /// without leaving the type stays in the keep-set at the depth that
    /// reached the type.
    #[test]
    fn test_same_type_hops_are_free() {
        with_fixture(
            r#"
//- /a.rs crate:a deps:b
pub fn start() {
    b::B::first();
}
//- /b.rs crate:b
pub struct B;

impl B {
    pub fn first() {
        B::second();
    }
    pub fn second() {
        B::third();
    }
    pub fn third() {}
    pub fn unrelated() {}
}
"#,
            |db| {
                let keep = crawl_fixture(db, "/a.rs", 1, false, &[]);
                let members = member_keys(&keep);

                assert!(members.contains(&"b::B::first()".to_owned()));
                assert!(members.contains(&"b::B::second()".to_owned()));
                assert!(members.contains(&"b::B::third()".to_owned()));
                assert!(!members.contains(&"b::B::unrelated()".to_owned()));
            },
        );
    }

    /// Cross-type chains consume one depth unit per hop.
    #[test]
    fn test_cross_type_chain_depth_accounting() {
        let fixture = r#"
//- /a.rs crate:a deps:b
pub struct A;

impl A {
    pub fn f(&self) {
        b::B::g();
    }
}
//- /b.rs crate:b deps:c
pub struct B;

impl B {
    pub fn g() {
        c::C::h();
    }
}
//- /c.rs crate:c
pub struct C;

impl C {
    pub fn h() {}
    pub fn other() {}
}
"#;
        with_fixture(fixture, |db| {
            let deep = crawl_fixture(db, "/a.rs", 2, false, &[]);
            let deep_types = type_keys(db, &deep);
            assert!(deep_types.contains(&"a::A".to_owned()));
            assert!(deep_types.contains(&"b::B".to_owned()));
            assert!(deep_types.contains(&"c::C".to_owned()));
            let deep_members = member_keys(&deep);
            assert!(deep_members.contains(&"c::C::h()".to_owned()));
            assert!(!deep_members.contains(&"c::C::other()".to_owned()));

            let shallow = crawl_fixture(db, "/a.rs", 1, false, &[]);
            let shallow_types = type_keys(db, &shallow);
            assert!(shallow_types.contains(&"b::B".to_owned()));
            assert!(!shallow_types.contains(&"c::C".to_owned()));
        });
    }

    /// Raising the depth never removes anything from the keep-set.
    #[test]
    fn test_depth_monotonicity() {
        let fixture = r#"
//- /a.rs crate:a deps:b
pub fn entry() {
    b::B::g();
}
//- /b.rs crate:b deps:c
pub struct B;

impl B {
    pub fn g() {
        c::C::h();
    }
}
//- /c.rs crate:c
pub struct C;

impl C {
    pub fn h() {
        C::i();
    }
    pub fn i() {}
}
"#;
        with_fixture(fixture, |db| {
            let mut previous: Vec<String> = Vec::new();
            for depth in 0..4 {
                let keep = crawl_fixture(db, "/a.rs", depth, false, &[]);
                let mut members = member_keys(&keep);
                members.sort();
                for key in &previous {
                    assert!(
                        members.contains(key),
                        "depth {depth} lost member {key}"
                    );
                }
                previous = members;
            }
        });
    }

    /// Mandatory inclusion: a registered type drags in its associated
    /// constants even when nothing references them.
    #[test]
    fn test_mandatory_associated_consts() {
        with_fixture(
            r#"
//- /a.rs crate:a deps:c
pub fn build() {
    let _ = c::C::new();
}
//- /c.rs crate:c
pub struct C {
    value: u32,
}

impl C {
    pub const LIMIT: u32 = 7;

    pub fn new() -> C {
        C { value: 0 }
    }

    pub fn unused(&self) {}
}
"#,
            |db| {
                let keep = crawl_fixture(db, "/a.rs", 1, false, &[]);
                let members = member_keys(&keep);

                assert!(members.contains(&"c::C::new()".to_owned()));
                assert!(members.contains(&"c::C::LIMIT".to_owned()));
                // The constructor body initialises `value`, a free
                // same-type hop.
                assert!(members.contains(&"c::C::value".to_owned()));
                assert!(!members.contains(&"c::C::unused()".to_owned()));
            },
        );
    }

    /// Namespace exclusion stops both registration and traversal.
    #[test]
    fn test_namespace_exclusion_is_a_boundary() {
        with_fixture(
            r#"
//- /a.rs crate:app deps:sys_log
pub fn run() {
    sys_log::Logger::log();
}
//- /log.rs crate:sys_log
pub struct Logger;

impl Logger {
    pub fn log() {
        Logger::flush();
    }
    pub fn flush() {}
}
"#,
            |db| {
                let keep = crawl_fixture(
                    db,
                    "/a.rs",
                    10,
                    false,
                    &["sys_log".to_owned()],
                );
                let types = type_keys(db, &keep);
                assert!(
                    !types.iter().any(|t| t.starts_with("sys_log")),
                    "excluded namespace leaked into keep-set: {types:?}"
                );
            },
        );
    }

    /// A root type's local trait impls pull the trait and its members in
    /// under the implements rule.
    #[test]
    fn test_root_implemented_traits_registered() {
        with_fixture(
            r#"
//- /a.rs crate:a
mod traits;

pub use traits::Render;

pub struct Widget;

impl Render for Widget {
    fn render(&self) {}
}
//- /a/traits.rs
pub trait Render {
    fn render(&self);
    fn prepare(&self) {}
}
"#,
            |db| {
                let keep = crawl_fixture(db, "/a.rs", 0, false, &[]);
                let types = type_keys(db, &keep);
                assert!(types.contains(&"a::traits::Render".to_owned()));

                let members = member_keys(&keep);
                assert!(
                    members.contains(&"a::traits::Render::render()".to_owned())
                );
                assert!(
                    members
                        .contains(&"a::traits::Render::prepare()".to_owned())
                );

                // Path annotation names the implements relationship.
                let sema = Semantics::new(db);
                let render = crate::semantics::declared_types(
                    &sema,
                    locate_document(db, "/a/traits.rs").unwrap(),
                )
                .into_iter()
                .find(|s| s.name(db) == "Render")
                .unwrap();
                let entry = keep.get(render).unwrap();
                assert!(
                    entry
                        .paths
                        .iter()
                        .any(|p| p.contains("implements")),
                    "trait entry should carry an implements path"
                );
            },
        );
    }

    /// Full-mode expansion registers every declared member of every
    /// reached type.
    #[test]
    fn test_expand_to_full() {
        with_fixture(CROSS_FILE, |db| {
            let sema = Semantics::new(db);
            let root_file = locate_document(db, "/a.rs").unwrap();
            let mut registry = Registry::new(NamespaceFilter::new(&[]));
            crawl(
                &sema,
                &mut registry,
                &CrawlParams {
                    root_file,
                    depth: 1,
                    exclude_root_definitions: false,
                },
                &token(),
            )
            .unwrap();
            expand_to_full(&sema, &mut registry);

            let members = member_keys(registry.keep());
            assert!(members.contains(&"b::B::g()".to_owned()));
            assert!(members.contains(&"b::B::h()".to_owned()));
        });
    }

    /// A pre-cancelled token aborts the crawl.
    #[test]
    fn test_cancellation_aborts() {
        with_fixture(CROSS_FILE, |db| {
            let sema = Semantics::new(db);
            let root_file = locate_document(db, "/a.rs").unwrap();
            let mut registry = Registry::new(NamespaceFilter::new(&[]));
            let cancel = token();
            cancel.cancel();

            let err = crawl(
                &sema,
                &mut registry,
                &CrawlParams {
                    root_file,
                    depth: 1,
                    exclude_root_definitions: false,
                },
                &cancel,
            )
            .expect_err("cancelled crawl must fail");
            assert!(err.is_cancelled());
        });
    }
}
