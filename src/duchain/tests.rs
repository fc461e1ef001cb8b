//! Unit tests for the chain store and lookups.
//!
//! This module contains tests for:
//! - Context arenas and declaration ids
//! - Scope, import and builtin lookup order
//! - Alias resolution
//! - Class hierarchies
//! - Transitive imports

use super::{
    context::{ContextKind, ContextRef},
    declaration::{AccessPolicy, BaseClass, Declaration, DeclarationId, DeclarationKind},
    duchain::{DUChain, DocumentId, TopDUContext},
    lookup::{
        access_attribute, access_attribute_of_type, find_declarations, internal_contexts_for_class,
        resolve_alias_declaration, ClassContextFilter, SearchFlags, MAX_INHERITANCE_DEPTH,
    },
};
use crate::{
    types::{
        merge::HintValidity,
        types::{AbstractType, IntegralKind},
    },
    Position, Span,
};

fn span(line: u32, start: u32, end: u32) -> Span {
    Span::new(Position::new(line, start, 0), Position::new(line, end, 0))
}

fn int() -> AbstractType {
    AbstractType::integral(IntegralKind::Int)
}

fn top(name: &str) -> TopDUContext {
    TopDUContext::new(DocumentId::new(name), 1, Span::new(Position::new(1, 0, 0), Position::new(100, 0, 0)))
}

fn declare(top: &mut TopDUContext, context: usize, name: &str, line: u32, ty: AbstractType) -> DeclarationId {
    let id = DeclarationId::new(top.document.clone(), name, line);
    let declaration = Declaration::new(
        id.clone(),
        name,
        context,
        span(line, 0, name.len() as u32),
        DeclarationKind::Instance,
        ty,
    );
    top.add_declaration(declaration).unwrap();
    id
}

fn declare_class(top: &mut TopDUContext, name: &str, line: u32, bases: &[&DeclarationId]) -> DeclarationId {
    let id = DeclarationId::new(top.document.clone(), name, line);
    let body = top.add_context(ContextKind::Class, 0, span(line + 1, 4, 40), name);
    let mut declaration = Declaration::new(
        id.clone(),
        name,
        0,
        span(line, 6, 6 + name.len() as u32),
        DeclarationKind::Type,
        AbstractType::structure(id.clone(), name),
    );
    declaration.internal_context = Some(body);
    declaration.base_classes = bases
        .iter()
        .map(|base| BaseClass {
            class: (*base).clone(),
            access: AccessPolicy::Public,
        })
        .collect();
    top.add_declaration(declaration).unwrap();
    id
}

#[test]
fn test_duplicate_declaration_ids_are_rejected() {
    let mut top = top("/a.py");
    declare(&mut top, 0, "x", 1, int());

    let duplicate = Declaration::new(
        DeclarationId::new(top.document.clone(), "x", 1),
        "x",
        0,
        span(2, 0, 1),
        DeclarationKind::Instance,
        int(),
    );
    assert!(top.add_declaration(duplicate).is_none());
    assert_eq!(top.declarations().len(), 1);
    assert_eq!(top.module_context().local_declarations.len(), 1);
}

#[test]
fn test_inner_declarations_come_last() {
    let mut a = top("/a.py");
    declare(&mut a, 0, "x", 1, int());
    let function = a.add_context(ContextKind::Other, 0, span(3, 0, 30), "f");
    let inner = declare(&mut a, function, "x", 3, AbstractType::integral(IntegralKind::Str));

    let mut chain = DUChain::new();
    chain.insert(a);

    let found = find_declarations(
        &chain,
        &ContextRef::new(DocumentId::new("/a.py"), function),
        "x",
        None,
        SearchFlags::NONE,
    );
    assert_eq!(found.len(), 2);
    assert_eq!(found.last().unwrap().id, inner);

    let local_only = find_declarations(
        &chain,
        &ContextRef::new(DocumentId::new("/a.py"), function),
        "x",
        None,
        SearchFlags::DONT_SEARCH_IN_PARENT,
    );
    assert_eq!(local_only.len(), 1);
}

#[test]
fn test_position_hides_later_declarations() {
    let mut a = top("/a.py");
    declare(&mut a, 0, "x", 2, int());
    let mut chain = DUChain::new();
    chain.insert(a);
    let context = ContextRef::top(DocumentId::new("/a.py"));

    assert!(find_declarations(&chain, &context, "x", Some(Position::cursor(1, 0)), SearchFlags::NONE).is_empty());
    assert!(find_declarations(&chain, &context, "x", Some(Position::cursor(2, 0)), SearchFlags::NONE).is_empty());
    assert_eq!(find_declarations(&chain, &context, "x", Some(Position::cursor(2, 1)), SearchFlags::NONE).len(), 1);
    assert_eq!(find_declarations(&chain, &context, "x", None, SearchFlags::NONE).len(), 1);
}

#[test]
fn test_builtins_are_searched_first() {
    let mut builtins = TopDUContext::new(DocumentId::builtins(), 1, span(1, 0, 10));
    let builtin = declare(&mut builtins, 0, "len", 5, int());
    let mut a = top("/a.py");
    let own = declare(&mut a, 0, "len", 1, AbstractType::integral(IntegralKind::Str));

    let mut chain = DUChain::new();
    chain.insert(builtins);
    chain.insert(a);

    let found = find_declarations(&chain, &ContextRef::top(DocumentId::new("/a.py")), "len", None, SearchFlags::NONE);
    let ids: Vec<_> = found.iter().map(|declaration| declaration.id.clone()).collect();
    assert_eq!(ids, vec![builtin, own]);
}

#[test]
fn test_imported_context_is_searched() {
    let mut b = top("/b.py");
    declare(&mut b, 0, "shared", 10, int());
    let mut a = top("/a.py");
    a.context_mut(0).unwrap().add_import(ContextRef::top(DocumentId::new("/b.py")));
    a.context_mut(0).unwrap().add_import(ContextRef::top(DocumentId::new("/b.py")));
    assert_eq!(a.module_context().imports.len(), 1);

    let mut chain = DUChain::new();
    chain.insert(a);
    chain.insert(b);

    // Positions do not filter declarations of other documents.
    let found = find_declarations(
        &chain,
        &ContextRef::top(DocumentId::new("/a.py")),
        "shared",
        Some(Position::cursor(1, 0)),
        SearchFlags::NONE,
    );
    assert_eq!(found.len(), 1);
}

#[test]
fn test_alias_resolution() {
    let mut b = top("/b.py");
    let target = declare(&mut b, 0, "value", 1, int());
    let mut a = top("/a.py");
    let alias = DeclarationId::new(a.document.clone(), "renamed", 0);
    let mut declaration = Declaration::new(alias.clone(), "renamed", 0, span(1, 0, 7), DeclarationKind::Instance, int());
    declaration.alias_of = Some(target.clone());
    a.add_declaration(declaration).unwrap();
    let dangling = DeclarationId::new(a.document.clone(), "dangling", 0);
    let mut declaration = Declaration::new(dangling.clone(), "dangling", 0, span(2, 0, 8), DeclarationKind::Instance, int());
    declaration.alias_of = Some(DeclarationId::new(DocumentId::new("/gone.py"), "x", 0));
    a.add_declaration(declaration).unwrap();

    let mut chain = DUChain::new();
    chain.insert(a);
    chain.insert(b);
    let context = ContextRef::top(DocumentId::new("/a.py"));

    let resolved = find_declarations(&chain, &context, "renamed", None, SearchFlags::NONE);
    assert_eq!(resolved[0].id, target);
    let unresolved = find_declarations(&chain, &context, "renamed", None, SearchFlags::DONT_RESOLVE_ALIASES);
    assert_eq!(unresolved[0].id, alias);

    let once = resolve_alias_declaration(&chain, unresolved[0]);
    let twice = resolve_alias_declaration(&chain, once);
    assert_eq!(once.id, twice.id);

    let dangling = chain.declaration(&dangling).unwrap();
    assert_eq!(resolve_alias_declaration(&chain, dangling).id, dangling.id);
}

#[test]
fn test_class_hierarchy_lookup() {
    let mut a = top("/a.py");
    let base = declare_class(&mut a, "Base", 1, &[]);
    let base_body = chain_context(&a, &base);
    declare(&mut a, base_body, "attr", 2, int());
    let derived = declare_class(&mut a, "Derived", 5, &[&base]);

    let mut chain = DUChain::new();
    chain.insert(a);

    let derived_type = chain.declaration(&derived).unwrap().abstract_type.clone();
    let contexts = internal_contexts_for_class(&chain, &derived_type, ClassContextFilter::All);
    assert_eq!(contexts.len(), 2);

    let attr = access_attribute_of_type(&chain, &derived_type, "attr").unwrap();
    assert_eq!(attr.abstract_type, int());
    assert!(access_attribute_of_type(&chain, &derived_type, "missing").is_none());
}

fn chain_context(top: &TopDUContext, class: &DeclarationId) -> usize {
    top.declaration_by_id(class).unwrap().internal_context.unwrap()
}

#[test]
fn test_private_bases_can_be_skipped() {
    let mut a = top("/a.py");
    let base = declare_class(&mut a, "Base", 1, &[]);
    let derived = declare_class(&mut a, "Derived", 5, &[&base]);
    a.declaration_by_id_mut(&derived).unwrap().base_classes[0].access = AccessPolicy::Private;

    let mut chain = DUChain::new();
    chain.insert(a);
    let ty = chain.declaration(&derived).unwrap().abstract_type.clone();

    assert_eq!(internal_contexts_for_class(&chain, &ty, ClassContextFilter::All).len(), 2);
    assert_eq!(internal_contexts_for_class(&chain, &ty, ClassContextFilter::PublicOnly).len(), 1);
}

#[test]
fn test_inheritance_cycles_and_depth_are_bounded() {
    let mut a = top("/a.py");
    let first = declare_class(&mut a, "A", 1, &[]);
    let second = declare_class(&mut a, "B", 3, &[&first]);
    a.declaration_by_id_mut(&first).unwrap().base_classes.push(BaseClass {
        class: second.clone(),
        access: AccessPolicy::Public,
    });

    let mut previous = declare_class(&mut a, "C0", 10, &[]);
    for index in 1..15u32 {
        previous = declare_class(&mut a, &format!("C{}", index), 10 + index * 2, &[&previous]);
    }

    let mut chain = DUChain::new();
    chain.insert(a);

    let cyclic = chain.declaration(&first).unwrap().abstract_type.clone();
    assert_eq!(internal_contexts_for_class(&chain, &cyclic, ClassContextFilter::All).len(), 2);

    let deep = chain.declaration(&previous).unwrap().abstract_type.clone();
    assert_eq!(
        internal_contexts_for_class(&chain, &deep, ClassContextFilter::All).len(),
        MAX_INHERITANCE_DEPTH
    );
}

#[test]
fn test_namespace_attribute_access() {
    let mut b = top("/b.py");
    declare(&mut b, 0, "value", 1, int());
    let mut a = top("/a.py");
    let namespace = a.add_context(ContextKind::Other, 0, span(1, 9, 9), "");
    a.context_mut(namespace)
        .unwrap()
        .add_import(ContextRef::top(DocumentId::new("/b.py")));
    let module = DeclarationId::new(a.document.clone(), "b", 0);
    let mut declaration = Declaration::new(module.clone(), "b", 0, span(1, 7, 8), DeclarationKind::Namespace, AbstractType::mixed());
    declaration.internal_context = Some(namespace);
    a.add_declaration(declaration).unwrap();

    let mut chain = DUChain::new();
    chain.insert(a);
    chain.insert(b);

    let module = chain.declaration(&module).unwrap();
    let value = access_attribute(&chain, module, "value").unwrap();
    assert_eq!(value.name, "value");
    assert!(access_attribute(&chain, module, "other").is_none());
}

#[test]
fn test_declaration_at_position() {
    let mut a = top("/a.py");
    let x = declare(&mut a, 0, "x", 1, int());
    a.add_use(0, span(2, 4, 5), x.clone());

    let mut chain = DUChain::new();
    chain.insert(a);
    let document = DocumentId::new("/a.py");

    assert_eq!(chain.declaration_at(&document, &Position::cursor(1, 0)).unwrap().id, x);
    assert_eq!(chain.declaration_at(&document, &Position::cursor(2, 5)).unwrap().id, x);
    assert!(chain.declaration_at(&document, &Position::cursor(3, 0)).is_none());
    assert_eq!(chain.top(&document).unwrap().uses_of(&x).count(), 1);
}

#[test]
fn test_innermost_context() {
    let mut a = top("/a.py");
    let class = a.add_context(ContextKind::Class, 0, span(2, 4, 40), "A");
    let method = a.add_context(ContextKind::Other, class, span(2, 10, 30), "A.m");
    a.add_context(ContextKind::Other, 0, span(2, 12, 12), "");

    assert_eq!(a.innermost_context_at(&Position::cursor(2, 15)), method);
    assert_eq!(a.innermost_context_at(&Position::cursor(2, 35)), class);
    assert_eq!(a.innermost_context_at(&Position::cursor(5, 0)), 0);
}

#[test]
fn test_transitive_imports() {
    let mut a = top("/a.py");
    a.imported_documents.insert(DocumentId::new("/b.py"));
    let mut b = top("/b.py");
    b.imported_documents.insert(DocumentId::new("/c.py"));
    b.imported_documents.insert(DocumentId::new("/a.py"));
    let c = top("/c.py");

    let mut chain = DUChain::new();
    chain.insert(a);
    chain.insert(b);
    chain.insert(c);

    let (a, b, c) = (DocumentId::new("/a.py"), DocumentId::new("/b.py"), DocumentId::new("/c.py"));
    assert!(chain.imports_transitively(&a, &b));
    assert!(chain.imports_transitively(&a, &c));
    assert!(chain.imports_transitively(&b, &a));
    assert!(!chain.imports_transitively(&c, &a));
    assert_eq!(chain.document_revision(&c), Some(1));
    assert_eq!(chain.document_revision(&DocumentId::new("/d.py")), None);
}
