use crate::{
    duchain::{
        context::{ContextKind, ContextRef},
        declaration::{Declaration, DeclarationKind},
        duchain::{DUChain, DocumentId},
        lookup::{
            access_attribute_of_type, find_declarations, find_local_declarations, internal_contexts_for_class,
            ClassContextFilter, SearchFlags,
        },
    },
    types::{
        merge::{candidates, extract_hints, has_hints, merge, merge_all, strip_hints, unwrap_hints},
        types::{AbstractType, IntegralKind, ListKind},
    },
    Position,
};

/// Name of the method called when a class is instantiated.
pub const CONSTRUCTOR_NAME: &str = "__init__";

/// Resolves a bare name used at `position` inside `context`.
///
/// Tried in order: the nearest declaration made in `context` itself, then
/// declarations reachable through outer scopes and imports (newest first,
/// never class members, which need an explicit receiver), then anything the
/// top context knows. At module level the last tier only sees declarations
/// made before `position`.
///
/// Aliases are returned as they are; callers resolve them when needed.
pub fn declaration_for_name<'a>(
    chain: &'a DUChain,
    name: &str,
    position: Option<Position>,
    context: &ContextRef,
) -> Option<&'a Declaration> {
    let top = ContextRef::top(context.document.clone());
    let fallback_position = if context.index == 0 { position } else { None };
    let declarations = find_declarations(chain, &top, name, fallback_position, SearchFlags::DONT_RESOLVE_ALIASES);

    let local = find_local_declarations(chain, context, name, position, SearchFlags::DONT_RESOLVE_ALIASES);
    if let Some(declaration) = local.last() {
        return Some(*declaration);
    }

    let imported = find_declarations(chain, context, name, position, SearchFlags::DONT_RESOLVE_ALIASES);
    if let Some(declaration) = imported
        .iter()
        .rev()
        .find(|declaration| !is_class_member(chain, declaration))
    {
        return Some(*declaration);
    }

    declarations.last().copied()
}

/// Whether `declaration` was made directly in a class body.
pub fn is_class_member(chain: &DUChain, declaration: &Declaration) -> bool {
    chain
        .context(&ContextRef::new(declaration.id.document.clone(), declaration.context))
        .is_some_and(|context| context.kind == ContextKind::Class)
}

/// The type of the elements produced by iterating over `ty`.
///
/// Every candidate of an unsure type contributes; iterating a dict yields
/// its keys.
pub fn content_of_iterable(chain: &DUChain, ty: &AbstractType) -> AbstractType {
    merge_all(candidates(ty).iter().map(|candidate| match candidate {
        AbstractType::List(list) if list.kind == ListKind::Dict => list.key_type(),
        AbstractType::List(list) => list.content_type(),
        AbstractType::IndexedContainer(container) => merge_all(container.slots.iter().cloned()),
        AbstractType::Integral(IntegralKind::Str) => AbstractType::integral(IntegralKind::Str),
        AbstractType::Integral(IntegralKind::Bytes) => AbstractType::integral(IntegralKind::Int),
        AbstractType::Structure(_) => iterator_content(chain, candidate),
        _ => AbstractType::mixed(),
    }))
}

/// Content of a user class that implements `__iter__`.
fn iterator_content(chain: &DUChain, ty: &AbstractType) -> AbstractType {
    let Some(iter) = access_attribute_of_type(chain, ty, "__iter__") else {
        return AbstractType::mixed();
    };
    match &iter.abstract_type {
        AbstractType::Function(function) => match function.return_type.as_ref() {
            AbstractType::List(list) => list.content_type(),
            other => other.clone(),
        },
        _ => AbstractType::mixed(),
    }
}

/// The function that runs when `declaration` is called.
///
/// Functions are returned as they are. For a class its constructor is
/// looked up through the class and its bases and returned with `true`.
/// Without a constructor the class itself comes back with `false`, which
/// callers treat as a call they cannot type through a function.
pub fn function_declaration_for_called_declaration<'a>(
    chain: &'a DUChain,
    declaration: &'a Declaration,
) -> (&'a Declaration, bool) {
    if declaration.is_function || declaration.kind != DeclarationKind::Type {
        return (declaration, false);
    }

    let constructor = internal_contexts_for_class(chain, &declaration.abstract_type, ClassContextFilter::All)
        .iter()
        .find_map(|context| {
            find_local_declarations(chain, context, CONSTRUCTOR_NAME, None, SearchFlags::NONE)
                .last()
                .copied()
        })
        .filter(|constructor| constructor.is_function);

    match constructor {
        Some(constructor) => (constructor, true),
        None => (declaration, false),
    }
}

/// Types of every declaration of `declaration`'s name made in the same
/// context up to and including `declaration`, merged.
pub fn merged_history_type(chain: &DUChain, declaration: &Declaration) -> AbstractType {
    let Some(top) = chain.top(&declaration.id.document) else {
        return declaration.abstract_type.clone();
    };
    let Some(own_index) = top.index_of(&declaration.id) else {
        return declaration.abstract_type.clone();
    };
    let Some(context) = top.context(declaration.context) else {
        return declaration.abstract_type.clone();
    };

    // Module level names rebound through `global` start over in that function.
    let scope_of = |declaration: &Declaration| top.innermost_context_at(&declaration.range.start);
    let own_scope = (declaration.context == 0).then(|| scope_of(declaration));

    context
        .local_declarations
        .iter()
        .filter(|index| **index <= own_index)
        .filter_map(|index| top.declaration(*index))
        .filter(|earlier| earlier.name == declaration.name && !earlier.is_alias())
        .filter(|earlier| own_scope.map_or(true, |scope| scope_of(earlier) == scope))
        .fold(AbstractType::mixed(), |ty, earlier| merge(ty, earlier.abstract_type.clone()))
}

/// `ty` as seen from `viewing`: call-site hints that are stale or come from
/// documents `viewing` does not import are dropped, the others unwrapped.
pub fn visible_type(chain: &DUChain, ty: &AbstractType, viewing: &DocumentId) -> AbstractType {
    if !has_hints(ty) {
        return ty.clone();
    }

    let extracted = extract_hints(ty, viewing, chain);
    match ty {
        AbstractType::List(_) | AbstractType::IndexedContainer(_) if extracted.is_mixed() => strip_hints(ty),
        AbstractType::List(_) | AbstractType::IndexedContainer(_) => unwrap_hints(&extracted),
        _ => merge(strip_hints(ty), unwrap_hints(&extracted)),
    }
}
