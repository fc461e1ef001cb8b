use tracing::trace;

use crate::duchain::duchain::DocumentId;

use super::types::{AbstractType, HintedType, Revision, UnsureType, MAX_UNSURE_MEMBERS};

/// What hint validation needs to know about the documents in the chain.
pub trait HintValidity {
    /// Current revision of `document`, `None` if it is not in the chain.
    fn document_revision(&self, document: &DocumentId) -> Option<Revision>;

    /// Whether `viewing` imports `origin`, directly or through other imports.
    fn imports_transitively(&self, viewing: &DocumentId, origin: &DocumentId) -> bool;
}

/// A hint is valid while its origin is unchanged and visible from `viewing`.
pub fn is_hint_valid(hint: &HintedType, viewing: &DocumentId, chain: &dyn HintValidity) -> bool {
    if chain.document_revision(&hint.origin) != Some(hint.revision) {
        return false;
    }
    hint.origin == *viewing || chain.imports_transitively(viewing, &hint.origin)
}

/// Combines two types.
///
/// Equal types collapse, useless types vanish, anything else becomes an
/// unsure type holding both sides. Members beyond the cap are dropped,
/// first seen wins.
pub fn merge(existing: AbstractType, new: AbstractType) -> AbstractType {
    if existing.is_useless() {
        return new;
    }
    if new.is_useless() || existing == new {
        return existing;
    }

    let mut unsure = match existing {
        AbstractType::Unsure(unsure) => unsure,
        other => {
            let mut unsure = UnsureType::new();
            unsure.add(other);
            unsure
        }
    };

    let incoming = match new {
        AbstractType::Unsure(other) => other.into_members(),
        other => vec![other],
    };

    for member in incoming {
        if member.is_useless() {
            continue;
        }
        if !unsure.add(member.clone()) {
            trace!("unsure type is full, dropping {}", member);
        }
    }

    collapse(unsure)
}

/// Merges every type of `types` in order.
pub fn merge_all<I: IntoIterator<Item = AbstractType>>(types: I) -> AbstractType {
    types.into_iter().fold(AbstractType::mixed(), merge)
}

fn collapse(unsure: UnsureType) -> AbstractType {
    match unsure.members().len() {
        0 => AbstractType::mixed(),
        1 => unsure.into_members().remove(0),
        _ => AbstractType::Unsure(unsure),
    }
}

/// Follows alias indirection down to a concrete type.
pub fn resolve_alias(ty: &AbstractType) -> AbstractType {
    let mut current = ty;
    while let AbstractType::Alias(alias) = current {
        current = &alias.target;
    }
    current.clone()
}

/// The concrete candidates of a possibly unsure type.
///
/// Aliases and hints are looked through.
pub fn candidates(ty: &AbstractType) -> Vec<AbstractType> {
    match ty {
        AbstractType::Unsure(unsure) => unsure.members().iter().flat_map(candidates).collect(),
        AbstractType::Hinted(hinted) => candidates(&hinted.target),
        AbstractType::Alias(alias) => candidates(&alias.target),
        other => vec![other.clone()],
    }
}

/// Removes every hinted part of `ty`.
pub fn strip_hints(ty: &AbstractType) -> AbstractType {
    match ty {
        AbstractType::Hinted(_) => AbstractType::mixed(),
        AbstractType::Unsure(unsure) => merge_all(unsure.members().iter().map(strip_hints)),
        AbstractType::List(list) => {
            let mut list = list.clone();
            list.content = list.content.map(|content| Box::new(strip_hints(&content)));
            list.key = list.key.map(|key| Box::new(strip_hints(&key)));
            AbstractType::List(list)
        }
        AbstractType::IndexedContainer(container) => {
            AbstractType::tuple_of(container.slots.iter().map(strip_hints).collect())
        }
        other => other.clone(),
    }
}

/// Replaces every hinted part of `ty` by the type it wraps.
pub fn unwrap_hints(ty: &AbstractType) -> AbstractType {
    match ty {
        AbstractType::Hinted(hinted) => unwrap_hints(&hinted.target),
        AbstractType::Unsure(unsure) => merge_all(unsure.members().iter().map(unwrap_hints)),
        AbstractType::List(list) => {
            let mut list = list.clone();
            list.content = list.content.map(|content| Box::new(unwrap_hints(&content)));
            list.key = list.key.map(|key| Box::new(unwrap_hints(&key)));
            AbstractType::List(list)
        }
        AbstractType::IndexedContainer(container) => {
            AbstractType::tuple_of(container.slots.iter().map(unwrap_hints).collect())
        }
        other => other.clone(),
    }
}

pub fn has_hints(ty: &AbstractType) -> bool {
    hint_origin(ty).is_some()
}

/// Origin of the first hint found in `ty`.
fn hint_origin(ty: &AbstractType) -> Option<(&DocumentId, Revision)> {
    match ty {
        AbstractType::Hinted(hinted) => Some((&hinted.origin, hinted.revision)),
        AbstractType::Unsure(unsure) => unsure.members().iter().find_map(hint_origin),
        AbstractType::List(list) => list
            .content
            .as_deref()
            .and_then(hint_origin)
            .or_else(|| list.key.as_deref().and_then(hint_origin)),
        AbstractType::IndexedContainer(container) => container.slots.iter().find_map(hint_origin),
        _ => None,
    }
}

fn members(ty: &AbstractType) -> Vec<&AbstractType> {
    match ty {
        AbstractType::Unsure(unsure) => unsure.members().iter().collect(),
        other => vec![other],
    }
}

/// Keeps the members of `ty` that carry no hint, plus the hint carrying
/// members whose origin passes `keep`.
pub fn filter_hints<F>(ty: &AbstractType, keep: F) -> AbstractType
where
    F: Fn(&DocumentId, Revision) -> bool,
{
    merge_all(
        members(ty)
            .into_iter()
            .filter(|member| match hint_origin(member) {
                Some((origin, revision)) => keep(origin, revision),
                None => true,
            })
            .cloned(),
    )
}

/// Only the hint carrying members of `ty` whose origin passes `keep`.
pub fn hint_members<F>(ty: &AbstractType, keep: F) -> AbstractType
where
    F: Fn(&DocumentId, Revision) -> bool,
{
    merge_all(
        members(ty)
            .into_iter()
            .filter(|member| matches!(hint_origin(member), Some((origin, revision)) if keep(origin, revision)))
            .cloned(),
    )
}

/// The part of `ty` learned from call sites that `viewing` can see.
///
/// Never fails: without any valid hint the result is `mixed`. The input is
/// left untouched, containers are edited on a copy.
pub fn extract_hints(ty: &AbstractType, viewing: &DocumentId, chain: &dyn HintValidity) -> AbstractType {
    match ty {
        AbstractType::Hinted(hinted) => {
            if is_hint_valid(hinted, viewing, chain) {
                ty.clone()
            } else {
                trace!("discarding hint {} from {}", hinted.target, hinted.origin);
                AbstractType::mixed()
            }
        }
        AbstractType::Unsure(unsure) => {
            let mut window = MAX_UNSURE_MEMBERS;
            let mut result = AbstractType::mixed();
            for (index, member) in unsure.members().iter().enumerate() {
                if index >= window {
                    break;
                }
                match member {
                    AbstractType::Hinted(hinted) if is_hint_valid(hinted, viewing, chain) => {
                        trace!("keeping hint {}", hinted.target);
                        result = merge(result, member.clone());
                    }
                    // Invalid or unhinted members hand their slot to the next one.
                    _ => window += 1,
                }
            }
            result
        }
        AbstractType::IndexedContainer(container) => {
            let slots = container
                .slots
                .iter()
                .map(|slot| match slot {
                    AbstractType::Hinted(hinted) if !is_hint_valid(hinted, viewing, chain) => AbstractType::mixed(),
                    other => other.clone(),
                })
                .collect();
            AbstractType::tuple_of(slots)
        }
        AbstractType::List(list) => {
            let Some(content) = list.content.as_deref() else {
                return AbstractType::mixed();
            };
            if !has_hints(content) {
                return AbstractType::mixed();
            }
            // Sure content stays, only hints that are not valid here go.
            let content = merge_all(
                members(content)
                    .into_iter()
                    .filter(|member| match member {
                        AbstractType::Hinted(hinted) => is_hint_valid(hinted, viewing, chain),
                        _ => true,
                    })
                    .cloned(),
            );
            let mut list = list.clone();
            list.content = Some(Box::new(content));
            AbstractType::List(list)
        }
        _ => AbstractType::mixed(),
    }
}
