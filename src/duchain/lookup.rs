//! Declaration lookup across contexts, imports and class hierarchies.

use std::{collections::HashSet, ops::BitOr};

use tracing::warn;

use crate::{
    types::{merge::candidates, types::AbstractType},
    Position,
};

use super::{
    context::ContextRef,
    declaration::{AccessPolicy, Declaration, DeclarationId, DeclarationKind},
    duchain::{DUChain, DocumentId},
};

/// Inheritance chains are not followed deeper than this.
pub const MAX_INHERITANCE_DEPTH: usize = 10;

/// Alias chains longer than this are treated as broken.
const MAX_ALIAS_HOPS: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchFlags(u8);

impl SearchFlags {
    pub const NONE: SearchFlags = SearchFlags(0);
    pub const DONT_SEARCH_IN_PARENT: SearchFlags = SearchFlags(1);
    pub const DONT_RESOLVE_ALIASES: SearchFlags = SearchFlags(2);

    pub fn contains(&self, other: SearchFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SearchFlags {
    type Output = SearchFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        SearchFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassContextFilter {
    All,
    /// Skip privately inherited bases.
    PublicOnly,
}

/// All declarations of `name` visible from `context`.
///
/// Builtins come first, then outer scopes and imported contexts, and the
/// declarations of `context` itself last, so callers take `.last()` for the
/// most relevant one. With a position only declarations visible at that
/// point are returned.
pub fn find_declarations<'a>(
    chain: &'a DUChain,
    context: &ContextRef,
    name: &str,
    position: Option<Position>,
    flags: SearchFlags,
) -> Vec<&'a Declaration> {
    let mut found = vec![];
    let mut visited = HashSet::new();
    collect_declarations(chain, context, name, position, flags, &mut visited, &mut found);
    resolve_aliases(chain, found, flags)
}

/// Declarations of `name` made directly in `context`.
pub fn find_local_declarations<'a>(
    chain: &'a DUChain,
    context: &ContextRef,
    name: &str,
    position: Option<Position>,
    flags: SearchFlags,
) -> Vec<&'a Declaration> {
    let found = local_matches(chain, context, name, position);
    resolve_aliases(chain, found, flags)
}

fn resolve_aliases<'a>(chain: &'a DUChain, found: Vec<&'a Declaration>, flags: SearchFlags) -> Vec<&'a Declaration> {
    if flags.contains(SearchFlags::DONT_RESOLVE_ALIASES) {
        return found;
    }
    found
        .into_iter()
        .map(|declaration| resolve_alias_declaration(chain, declaration))
        .collect()
}

fn local_matches<'a>(
    chain: &'a DUChain,
    context: &ContextRef,
    name: &str,
    position: Option<Position>,
) -> Vec<&'a Declaration> {
    let Some(top) = chain.top(&context.document) else {
        warn!("lookup in unknown document {}", context.document);
        return vec![];
    };

    top.local_declarations(context.index)
        .filter(|declaration| declaration.name == name)
        .filter(|declaration| position.as_ref().map_or(true, |position| declaration.is_visible_at(position)))
        .collect()
}

fn collect_declarations<'a>(
    chain: &'a DUChain,
    context: &ContextRef,
    name: &str,
    position: Option<Position>,
    flags: SearchFlags,
    visited: &mut HashSet<ContextRef>,
    found: &mut Vec<&'a Declaration>,
) {
    if !visited.insert(context.clone()) {
        return;
    }
    let Some(ctx) = chain.context(context) else {
        warn!("lookup in missing context {} of {}", context.index, context.document);
        return;
    };

    if !flags.contains(SearchFlags::DONT_SEARCH_IN_PARENT) {
        match ctx.parent {
            Some(parent) => collect_declarations(
                chain,
                &ContextRef::new(context.document.clone(), parent),
                name,
                position,
                flags,
                visited,
                found,
            ),
            None if !context.document.is_builtins() && chain.builtins().is_some() => collect_declarations(
                chain,
                &ContextRef::top(DocumentId::builtins()),
                name,
                None,
                flags | SearchFlags::DONT_SEARCH_IN_PARENT,
                visited,
                found,
            ),
            None => {}
        }
    }

    for import in &ctx.imports {
        // Positions only mean something inside the same document.
        let position = if import.document == context.document { position } else { None };
        collect_declarations(
            chain,
            import,
            name,
            position,
            flags | SearchFlags::DONT_SEARCH_IN_PARENT,
            visited,
            found,
        );
    }

    found.extend(local_matches(chain, context, name, position));
}

/// Follows alias declarations to their target.
///
/// Resolving an already resolved declaration returns it unchanged. A
/// dangling alias resolves to itself.
pub fn resolve_alias_declaration<'a>(chain: &'a DUChain, declaration: &'a Declaration) -> &'a Declaration {
    let mut current = declaration;
    for _ in 0..MAX_ALIAS_HOPS {
        let Some(target) = current.alias_of.as_ref() else {
            return current;
        };
        match chain.declaration(target) {
            Some(next) => current = next,
            None => return current,
        }
    }
    warn!("alias chain of {} does not terminate", declaration.id);
    current
}

/// The class declaration behind values of type `ty`.
///
/// Builtin values are backed by the classes of the builtin documentation.
pub fn class_declaration_for_type<'a>(chain: &'a DUChain, ty: &AbstractType) -> Option<&'a Declaration> {
    match ty {
        AbstractType::Structure(structure) => chain
            .declaration(&structure.declaration)
            .filter(|declaration| declaration.kind == DeclarationKind::Type),
        other => {
            let name = other.builtin_class_name()?;
            builtin_class(chain, name)
        }
    }
}

/// A class of the builtin documentation, by name.
pub fn builtin_class<'a>(chain: &'a DUChain, name: &str) -> Option<&'a Declaration> {
    chain
        .builtins()?
        .local_declarations(0)
        .filter(|declaration| declaration.name == name && declaration.kind == DeclarationKind::Type)
        .last()
}

/// Internal contexts of the classes behind `ty`, each followed by those of
/// its bases.
///
/// Every class is visited once and inheritance is followed at most
/// [`MAX_INHERITANCE_DEPTH`] levels deep.
pub fn internal_contexts_for_class(chain: &DUChain, ty: &AbstractType, filter: ClassContextFilter) -> Vec<ContextRef> {
    let mut contexts = vec![];
    let mut visited = HashSet::new();

    for candidate in candidates(ty) {
        if let Some(class) = class_declaration_for_type(chain, &candidate) {
            collect_class_contexts(chain, class, filter, 0, &mut visited, &mut contexts);
        }
    }

    contexts
}

fn collect_class_contexts(
    chain: &DUChain,
    class: &Declaration,
    filter: ClassContextFilter,
    depth: usize,
    visited: &mut HashSet<DeclarationId>,
    contexts: &mut Vec<ContextRef>,
) {
    if depth >= MAX_INHERITANCE_DEPTH || !visited.insert(class.id.clone()) {
        return;
    }

    if let Some(internal) = class.internal_context {
        contexts.push(ContextRef::new(class.id.document.clone(), internal));
    }

    for base in &class.base_classes {
        if filter == ClassContextFilter::PublicOnly && base.access == AccessPolicy::Private {
            continue;
        }
        if let Some(base) = chain.declaration(&base.class) {
            collect_class_contexts(chain, base, filter, depth + 1, visited, contexts);
        }
    }
}

/// Looks up the member `name` on values of type `ty`.
///
/// Each candidate of an unsure type is tried in turn; the first class chain
/// declaring the member wins.
pub fn access_attribute_of_type<'a>(chain: &'a DUChain, ty: &AbstractType, name: &str) -> Option<&'a Declaration> {
    internal_contexts_for_class(chain, ty, ClassContextFilter::All)
        .iter()
        .find_map(|context| {
            find_local_declarations(chain, context, name, None, SearchFlags::NONE)
                .last()
                .copied()
        })
}

/// Looks up the member `name` on `declaration`.
///
/// Modules are searched through their namespace context, anything else
/// through the classes of its type.
pub fn access_attribute<'a>(chain: &'a DUChain, declaration: &Declaration, name: &str) -> Option<&'a Declaration> {
    if declaration.kind == DeclarationKind::Namespace {
        let internal = declaration.internal_context?;
        let context = ContextRef::new(declaration.id.document.clone(), internal);
        return find_declarations(chain, &context, name, None, SearchFlags::DONT_SEARCH_IN_PARENT)
            .last()
            .copied();
    }

    access_attribute_of_type(chain, &declaration.abstract_type, name)
}
