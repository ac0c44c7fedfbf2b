//! The keep-set and its registry.
//!
//! A keep-set maps each reached owner type to the subset of its members
//! chosen for emission, with the inclusion paths that justify every
//! entry. The crawler never touches it directly: it goes through
//! [`Registry`], which applies the namespace exclusion policy as data
//! and reports whether a registration introduced a new owner type (the
//! trigger for mandatory inclusion).
//!
//! Member maps are insertion-ordered; the emitter's "declarations are
//! emitted in the order they are discovered" guarantee is this ordering.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use ra_ap_ide_db::RootDatabase;

use crate::symbols::SymbolId;

/// A member chosen to be kept, with provenance.
#[derive(Debug, Clone)]
pub(crate) struct MemberInfo {
    pub(crate) symbol: SymbolId,
    /// Unique inclusion paths; ordering within the set is not part of
    /// the contract, a `BTreeSet` just keeps emission deterministic.
    pub(crate) paths: BTreeSet<String>,
}

/// One owner type's slice: its own inclusion paths and its kept members,
/// keyed by member display key.
#[derive(Debug, Clone, Default)]
pub(crate) struct TypeEntry {
    pub(crate) paths: BTreeSet<String>,
    pub(crate) members: IndexMap<String, MemberInfo>,
}

/// Mapping from owner type to kept members, plus the set of root types.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeepSet {
    types: IndexMap<SymbolId, TypeEntry>,
    roots: HashSet<SymbolId>,
}

impl KeepSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark a type as declared in an entry document. Root marking is
    /// independent of whether any member survives into the keep-set.
    pub(crate) fn mark_root(&mut self, sym: SymbolId) {
        self.roots.insert(sym);
    }

    pub(crate) fn is_root(&self, sym: SymbolId) -> bool {
        self.roots.contains(&sym)
    }

    /// Record a member under its owner. Returns true when this is the
    /// first registration for the owner type.
    pub(crate) fn insert(
        &mut self,
        owner: SymbolId,
        member_key: String,
        member: SymbolId,
        path: String,
    ) -> bool {
        let new_type = !self.types.contains_key(&owner);
        let entry = self.types.entry(owner).or_default();
        entry
            .members
            .entry(member_key)
            .or_insert_with(|| MemberInfo {
                symbol: member,
                paths: BTreeSet::new(),
            })
            .paths
            .insert(path);
        new_type
    }

    /// Record an inclusion path on the type itself (the symbol was
    /// referenced directly, or declared in an entry document).
    pub(crate) fn add_type_path(&mut self, owner: SymbolId, path: String) {
        self.types.entry(owner).or_default().paths.insert(path);
    }

    pub(crate) fn types(
        &self,
    ) -> impl Iterator<Item = (&SymbolId, &TypeEntry)> {
        self.types.iter()
    }

    pub(crate) fn type_ids(&self) -> Vec<SymbolId> {
        self.types.keys().copied().collect()
    }

    pub(crate) fn get(&self, sym: SymbolId) -> Option<&TypeEntry> {
        self.types.get(&sym)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Merge another keep-set into this one: member union per type,
    /// path-set union per member, root-set union.
    pub(crate) fn merge(&mut self, other: KeepSet) {
        for (sym, entry) in other.types {
            let target = self.types.entry(sym).or_default();
            target.paths.extend(entry.paths);
            for (key, info) in entry.members {
                target
                    .members
                    .entry(key)
                    .or_insert_with(|| MemberInfo {
                        symbol: info.symbol,
                        paths: BTreeSet::new(),
                    })
                    .paths
                    .extend(info.paths);
            }
        }
        self.roots.extend(other.roots);
    }
}

/// The namespace exclusion policy, held as data.
///
/// A symbol is excluded when its namespace equals a prefix token or
/// starts with `token::`. Matching is segment-aligned: prefix `sys`
/// does not exclude namespace `sys_log`.
#[derive(Debug, Clone)]
pub(crate) struct NamespaceFilter {
    prefixes: Vec<String>,
}

impl NamespaceFilter {
    pub(crate) fn new(prefixes: &[String]) -> Self {
        Self {
            prefixes: prefixes.to_vec(),
        }
    }

    pub(crate) fn is_excluded(&self, namespace: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            namespace == prefix
                || namespace
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registered {
    /// First registration for this owner type.
    NewType,
    /// The owner type was already present.
    Existing,
    /// The symbol's namespace is excluded; nothing was recorded.
    Filtered,
}

/// The crawler's write interface to the keep-set.
pub(crate) struct Registry {
    filter: NamespaceFilter,
    keep: KeepSet,
}

impl Registry {
    pub(crate) fn new(filter: NamespaceFilter) -> Self {
        Self {
            filter,
            keep: KeepSet::new(),
        }
    }

    /// Re-wrap an existing keep-set, e.g. a merged one, for further
    /// registration.
    pub(crate) fn from_keep(filter: NamespaceFilter, keep: KeepSet) -> Self {
        Self { filter, keep }
    }

    pub(crate) fn keep(&self) -> &KeepSet {
        &self.keep
    }

    pub(crate) fn keep_mut(&mut self) -> &mut KeepSet {
        &mut self.keep
    }

    pub(crate) fn into_keep_set(self) -> KeepSet {
        self.keep
    }

    /// Register a `(owner, member, path)` triple, applying the exclusion
    /// policy. Registering a type against itself additionally records the
    /// path on the type entry.
    pub(crate) fn register(
        &mut self,
        db: &RootDatabase,
        owner: SymbolId,
        member: SymbolId,
        path: String,
    ) -> Registered {
        if self.filter.is_excluded(&owner.namespace(db))
            || self.filter.is_excluded(&member.namespace(db))
        {
            return Registered::Filtered;
        }
        let key = member.display_key(db);
        let new_type = self.keep.insert(owner, key, member, path.clone());
        if owner == member {
            self.keep.add_type_path(owner, path);
        }
        if new_type {
            Registered::NewType
        } else {
            Registered::Existing
        }
    }
}
