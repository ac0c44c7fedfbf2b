//! Symbol identity for defslice.
//!
//! The crawler and keep-set never work with raw rust-analyzer handles.
//! They use [`SymbolId`], a canonicalising wrapper around
//! [`Definition`] with value-based equality and a deterministic display
//! key. Canonicalisation guarantees that every occurrence of an item -
//! across impl blocks, through generic instantiations, via `Self` - maps
//! to the same identity, so keep-set membership checks are stable.
//!
//! rust-analyzer already resolves every use of a generic item to its
//! un-instantiated definition (`U::act::<A>()` and `U::act::<B>()` both
//! classify to the same `Function`), so the remaining canonicalisation
//! work is collapsing `Self` types to their ADT and rejecting the kinds
//! that can never be slice content (locals, generic parameters, labels,
//! builtins, modules).

use ra_ap_hir::{Adt, AsAssocItem, AssocItem, AssocItemContainer};
use ra_ap_ide_db::RootDatabase;
use ra_ap_ide_db::defs::Definition;

/// A canonicalised symbol: a type, a member of a type, or a self-owned
/// free item.
///
/// Equality and hashing go through the wrapped [`Definition`], which is
/// an id-based handle, so two `SymbolId`s are equal iff they denote the
/// same original definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SymbolId {
    def: Definition,
}

impl SymbolId {
    /// Canonicalise a resolved definition into a slice symbol.
    ///
    /// Returns `None` for kinds that never appear in a keep-set:
    /// item-local bindings (locals, generic params, labels), language
    /// builtins, attribute machinery, and organizational units (modules,
    /// crates). `Self` types collapse to their ADT. Unnamed items
    /// (`const _: () = ...`) are rejected because they can neither be
    /// keyed nor referenced again.
    pub(crate) fn classify(
        db: &RootDatabase,
        def: Definition,
    ) -> Option<SymbolId> {
        let def = match def {
            // The `Self` keyword and impl headers resolve to SelfType;
            // the symbol they stand for is the implementing ADT.
            Definition::SelfType(impl_) => {
                Definition::Adt(impl_.self_ty(db).as_adt()?)
            }
            Definition::Adt(_)
            | Definition::Trait(_)
            | Definition::Function(_)
            | Definition::Const(_)
            | Definition::Static(_)
            | Definition::TypeAlias(_)
            | Definition::Field(_)
            | Definition::Variant(_) => def,
            _ => return None,
        };
        def.name(db)?;
        Some(SymbolId { def })
    }

    pub(crate) fn def(self) -> Definition {
        self.def
    }

    /// The owner type this symbol registers under.
    ///
    /// Types own themselves; fields and variants belong to their ADT;
    /// associated items belong to the impl's self type (or the trait for
    /// trait bodies and blanket impls). Free items are self-owned.
    ///
    /// Returns `None` when an owner cannot be determined, e.g. an
    /// associated item of an impl on a non-ADT type with no trait.
    pub(crate) fn owner(self, db: &RootDatabase) -> Option<SymbolId> {
        let def = match self.def {
            Definition::Adt(_) | Definition::Trait(_) | Definition::Static(_) => {
                self.def
            }
            Definition::Field(f) => {
                Definition::Adt(parent_adt(db, f.parent_def(db)))
            }
            Definition::Variant(v) => {
                Definition::Adt(Adt::Enum(v.parent_enum(db)))
            }
            Definition::Function(f) => match f.as_assoc_item(db) {
                Some(assoc) => return container_owner(db, assoc),
                None => self.def,
            },
            Definition::Const(c) => match c.as_assoc_item(db) {
                Some(assoc) => return container_owner(db, assoc),
                None => self.def,
            },
            Definition::TypeAlias(t) => match t.as_assoc_item(db) {
                Some(assoc) => return container_owner(db, assoc),
                None => self.def,
            },
            _ => return None,
        };
        Some(SymbolId { def })
    }

    /// True for the declaration forms whose member list is reduced by the
    /// emitter: structs, unions and traits. Enums are emitted unchanged,
    /// so they do not count as compound for the attenuation marker.
    pub(crate) fn is_compound_type(self) -> bool {
        matches!(
            self.def,
            Definition::Adt(Adt::Struct(_) | Adt::Union(_)) | Definition::Trait(_)
        )
    }

    /// The symbol's simple name. Falls back to `_` for the pathological
    /// case of a name disappearing between classification and use.
    pub(crate) fn name(self, db: &RootDatabase) -> String {
        self.def
            .name(db)
            .map(|n| n.as_str().to_owned())
            .unwrap_or_else(|| "_".to_owned())
    }

    /// The `::`-joined path of the containing crate and modules.
    ///
    /// Empty for symbols without a containing module.
    pub(crate) fn namespace(self, db: &RootDatabase) -> String {
        let Some(module) = self.def.module(db) else {
            return String::new();
        };
        let krate = module.krate(db);
        let crate_name = krate
            .display_name(db)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "(unnamed)".to_owned());

        let mut parts = vec![crate_name];
        parts.extend(
            module
                .path_to_root(db)
                .into_iter()
                .rev()
                .filter_map(|m| m.name(db).map(|n| n.as_str().to_owned())),
        );
        parts.join("::")
    }

    /// The stable display key used both as the member-map key inside a
    /// keep-set and in inclusion paths.
    ///
    /// Types and self-owned items render as `namespace::Name`; members
    /// render as `type_key::name`. Functions carry a `()` suffix so a
    /// method and a field with the same name key differently.
    pub(crate) fn display_key(self, db: &RootDatabase) -> String {
        let mut name = self.name(db);
        if matches!(self.def, Definition::Function(_)) {
            name.push_str("()");
        }
        match self.owner(db) {
            Some(owner) if owner != self => {
                format!("{}::{}", owner.display_key(db), name)
            }
            _ => {
                let ns = self.namespace(db);
                if ns.is_empty() {
                    name
                } else {
                    format!("{ns}::{name}")
                }
            }
        }
    }

    /// Check if this symbol is declared in a workspace-member crate.
    ///
    /// Symbols from dependency crates are metadata for slicing purposes:
    /// they are never registered and never contribute edges.
    pub(crate) fn is_local(self, db: &RootDatabase) -> bool {
        self.def
            .module(db)
            .map(|m| m.krate(db).origin(db).is_local())
            .unwrap_or(false)
    }
}

/// Resolve the owner of an associated item from its container.
fn container_owner(db: &RootDatabase, assoc: AssocItem) -> Option<SymbolId> {
    match assoc.container(db) {
        AssocItemContainer::Trait(trait_) => Some(SymbolId {
            def: Definition::Trait(trait_),
        }),
        AssocItemContainer::Impl(impl_) => match impl_.self_ty(db).as_adt() {
            Some(adt) => Some(SymbolId {
                def: Definition::Adt(adt),
            }),
            // Blanket impls and impls on non-ADT types fall back to the
            // trait being implemented; inherent impls on such types have
            // no owner.
            None => impl_.trait_(db).map(|t| SymbolId {
                def: Definition::Trait(t),
            }),
        },
    }
}

/// Convert a VariantDef (parent of a field) to an Adt.
///
/// Fields of enum-variant bodies collapse to the parent enum, since the
/// enum is the type definition a slice keeps.
fn parent_adt(db: &RootDatabase, variant_def: ra_ap_hir::VariantDef) -> Adt {
    match variant_def {
        ra_ap_hir::VariantDef::Struct(s) => Adt::Struct(s),
        ra_ap_hir::VariantDef::Union(u) => Adt::Union(u),
        ra_ap_hir::VariantDef::Variant(v) => Adt::Enum(v.parent_enum(db)),
    }
}
