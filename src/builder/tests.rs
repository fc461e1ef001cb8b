//! Unit tests for the builders.
//!
//! This module contains tests for:
//! - Declarations, contexts and uses of a single document
//! - Type inference of literals, calls, operators and containers
//! - Parameter hints from calls
//! - Narrowing, decorators and import handling

use super::declaration_builder::{build_document, BuildOutcome, DocumentBuild};
use crate::{
    background::source::InMemorySource,
    duchain::{
        context::ContextKind,
        declaration::DeclarationId,
        duchain::{DUChain, DocumentId},
    },
    errors::errors::ErrorImpl,
    helpers::{
        documentation::DocumentationFile,
        helpers::{merged_history_type, visible_type},
        imports::ModuleResolver,
    },
    parser::parser::parse_source,
};

const MAIN: &str = "/project/main.py";

fn chain_with_builtins() -> DUChain {
    let mut chain = DUChain::new();
    DocumentationFile::embedded().ensure_loaded(&mut chain).unwrap();
    chain
}

fn build_into(chain: &mut DUChain, document: &str, revision: u64, source: &str) -> BuildOutcome {
    let parsed = parse_source(source).unwrap();
    build_document(chain, DocumentId::new(document), revision, &parsed.module, parsed.errors, None)
}

fn build(source: &str) -> DUChain {
    let mut chain = chain_with_builtins();
    build_into(&mut chain, MAIN, 1, source);
    chain
}

fn type_string(chain: &DUChain, name: &str) -> String {
    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    let declaration = top
        .declarations()
        .iter()
        .filter(|declaration| declaration.name == name)
        .last()
        .unwrap_or_else(|| panic!("no declaration named {}", name));
    merged_history_type(chain, declaration).to_string()
}

/// Type of the last `name` as shown from the document itself.
fn shown_type(chain: &DUChain, name: &str) -> String {
    let main = DocumentId::new(MAIN);
    let top = chain.top(&main).unwrap();
    let declaration = top
        .declarations()
        .iter()
        .filter(|declaration| declaration.name == name)
        .last()
        .unwrap_or_else(|| panic!("no declaration named {}", name));
    visible_type(chain, &merged_history_type(chain, declaration), &main).to_string()
}

fn checkme(source: &str) -> String {
    type_string(&build(source), "checkme")
}

#[test]
fn test_declarations_and_uses() {
    let chain = build("a = 3\nb = a");
    let top = chain.top(&DocumentId::new(MAIN)).unwrap();

    assert_eq!(top.declarations().len(), 2);
    assert_eq!(top.uses().count(), 1);
    assert!(top.features.declarations);
    assert!(top.features.uses);

    let used = top.uses().next().unwrap();
    assert_eq!(used.declaration, top.declarations()[0].id);
    assert_eq!(type_string(&chain, "b"), "int");
}

#[test]
fn test_literal_types() {
    assert_eq!(checkme("checkme = [1, 2, 3]"), "list of int");
    assert_eq!(checkme("checkme = {1: 'a'}"), "dict of int : str");
    assert_eq!(checkme("checkme = {1.5}"), "set of float");
    assert_eq!(checkme("checkme = (1, 'a')"), "tuple of (int, str)");
    assert_eq!(checkme("checkme = None"), "None");
    assert_eq!(checkme("checkme = b'x'"), "bytes");
}

#[test]
fn test_reassignment_keeps_history() {
    let chain = build("x = 'a'\nx = 3.5\ncheckme = x");
    assert_eq!(type_string(&chain, "checkme"), "unsure (float, str)");

    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    let second = top.declarations().iter().filter(|d| d.name == "x").nth(1).unwrap();
    assert_eq!(second.abstract_type.to_string(), "float");
}

#[test]
fn test_function_return_types() {
    assert_eq!(checkme("def foo(): return 3\ncheckme = foo()"), "int");
    assert_eq!(checkme("def foo():\n    pass\ncheckme = foo()"), "void");
    assert_eq!(checkme("def foo() -> str:\n    pass\ncheckme = foo()"), "unsure (str, void)");
    assert_eq!(checkme("def foo() -> str:\n    return 'a'\ncheckme = foo()"), "str");
    assert_eq!(checkme("def myfun(arg) -> int: pass\ncheckme = myfun('3')"), "unsure (int, void)");
    assert_eq!(checkme("checkme = len('abc')"), "int");
    assert_eq!(checkme("def foo(a):\n    if a:\n        return 1\n    return 'x'\ncheckme = foo(0)"), "unsure (int, str)");
}

#[test]
fn test_generators_return_lists() {
    assert_eq!(checkme("def f():\n    yield 1\ncheckme = f()"), "list of int");
    assert_eq!(
        checkme("def f():\n    yield 1\n    yield 'a'\ncheckme = f()"),
        "list of unsure (int, str)"
    );
    assert_eq!(
        checkme("def f():\n    yield 'a'\n    return 3\ncheckme = f()"),
        "unsure (int, list of str)"
    );
}

#[test]
fn test_tuple_subscripts() {
    assert_eq!(checkme("t = (1, 'a')\ncheckme = t[0]"), "int");
    assert_eq!(checkme("t = (1, 'a')\ncheckme = t[-1]"), "str");
    assert_eq!(checkme("t = (1, 'a')\ncheckme = t[5]"), "mixed");
    assert_eq!(checkme("a, b = 1, 'x'\ncheckme = b"), "str");
}

#[test]
fn test_list_subscripts() {
    assert_eq!(checkme("foo = [1, 2]\ncheckme = foo[0]"), "int");
    assert_eq!(checkme("foo = []\ncheckme = foo[0]"), "mixed");
    assert_eq!(checkme("foo = [1, 2]\ncheckme = foo[0:1]"), "list of int");
}

#[test]
fn test_binary_operators() {
    assert_eq!(checkme("checkme = 1 + 2"), "int");
    assert_eq!(checkme("checkme = 1 + 2.5"), "float");
    assert_eq!(checkme("checkme = 1 / 2"), "float");
    assert_eq!(checkme("checkme = 'a' + 'b'"), "str");
    assert_eq!(checkme("checkme = [1] + ['a']"), "list of unsure (int, str)");
    assert_eq!(checkme("checkme = 1 < 2"), "bool");
    assert_eq!(checkme("checkme = not 1"), "bool");
    assert_eq!(checkme("checkme = 1 or 'a'"), "unsure (int, str)");
}

#[test]
fn test_user_operator_merges_candidates() {
    let source = "class c:\n    def __mul__(self, other):\n        return 3\nx = c()\nx = 3.5\ny = 3\ncheckme = x * y";
    assert_eq!(checkme(source), "unsure (float, int)");
}

#[test]
fn test_comprehensions_and_lambdas() {
    assert_eq!(checkme("checkme = [i * 2 for i in range(3)]"), "list of int");
    assert_eq!(checkme("checkme = {k: 1.5 for k in 'abc'}"), "dict of str : float");
    assert_eq!(checkme("f = lambda x: 3\ncheckme = f(1)"), "int");

    let chain = build("checkme = [i for i in [1]]");
    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    assert!(top.contexts().iter().any(|context| context.kind == ContextKind::Other));
}

#[test]
fn test_for_loop_over_unsure_content() {
    assert_eq!(checkme("for i in [1, 'a']:\n    checkme = i"), "unsure (int, str)");
    assert_eq!(checkme("for k in {'a': 1}:\n    checkme = k"), "str");
}

#[test]
fn test_builtin_container_constructors() {
    assert_eq!(checkme("checkme = list([1, 2, 3])"), "list of int");
    assert_eq!(checkme("checkme = set('abc')"), "set of str");
    assert_eq!(checkme("checkme = str(3)"), "str");
}

#[test]
fn test_container_decorators() {
    assert_eq!(checkme("foo = [1, 2, 3]\ncheckme = foo.reverse()"), "list of int");
    assert_eq!(checkme("foo = [1, 2, 3]\ncheckme = foo.pop()"), "int");
    assert_eq!(checkme("d = {'a': 1.5}\ncheckme = d.keys()"), "list of str");
    assert_eq!(checkme("d = {'a': 1.5}\ncheckme = d.get('a')"), "float");
    assert_eq!(checkme("checkme = sorted([1, 2])"), "list of int");
    assert_eq!(checkme("checkme = abs(2.5)"), "float");
    assert_eq!(checkme("checkme = 'a b'.split()"), "list of str");
}

#[test]
fn test_containers_grow() {
    let chain = build("a = []\na.append(1)\nb = [1]\nb.extend(['x'])\nd = {}\nd['k'] = 1.5");
    assert_eq!(type_string(&chain, "a"), "list of int");
    assert_eq!(type_string(&chain, "b"), "list of unsure (int, str)");
    assert_eq!(type_string(&chain, "d"), "dict of str : float");
}

#[test]
fn test_classes_and_members() {
    assert_eq!(checkme("class A:\n    pass\na = A()\na.x = 3\ncheckme = a.x"), "int");
    assert_eq!(
        checkme("class A:\n    def __init__(self):\n        self.value = 'x'\na = A()\ncheckme = a.value"),
        "str"
    );
    assert_eq!(checkme("class A:\n    attr = 3\nclass B(A):\n    pass\ncheckme = B().attr"), "int");
    assert_eq!(
        checkme("class A:\n    attr = 'a'\nclass B:\n    attr = 'b'\nx = A()\nx = B()\ncheckme = x.attr"),
        "str"
    );
}

#[test]
fn test_property_reads_return_type() {
    let source = "class A:\n    @property\n    def size(self):\n        return 3\ncheckme = A().size";
    assert_eq!(checkme(source), "int");
}

#[test]
fn test_isinstance_narrowing() {
    let prefix = "class c:\n    attr = 3\ndef f(x):\n";
    assert_eq!(checkme(&format!("{}    assert isinstance(x, c)\n    checkme = x", prefix)), "c");
    assert_eq!(checkme(&format!("{}    assert type(x) == c\n    checkme = x", prefix)), "c");
    assert_eq!(checkme(&format!("{}    if isinstance(x, c):\n        checkme = x", prefix)), "c");
    assert_eq!(checkme(&format!("{}    assert isinstance(x, 3)\n    checkme = x", prefix)), "mixed");
    assert_eq!(checkme(&format!("{}    y = 1\n    assert isinstance(x, y)\n    checkme = x", prefix)), "mixed");
}

#[test]
fn test_local_call_hints() {
    assert_eq!(checkme("def myfunc(arg):\n    return arg\ncheckme = myfunc(3)"), "int");
    assert_eq!(checkme("def f(*args):\n    return args[0]\ncheckme = f('x')"), "str");
    assert_eq!(checkme("def f(**kwargs):\n    return kwargs['a']\ncheckme = f(a=3)"), "int");
    assert_eq!(
        checkme("class A:\n    def __init__(self, value):\n        self.value = value\ncheckme = A(2.5).value"),
        "float"
    );
}

#[test]
fn test_vararg_tuple_returned_whole() {
    assert_eq!(checkme("def f(*a):\n    return a\ncheckme = f(1, 2)"), "tuple of (int, int)");
    assert_eq!(checkme("def f(*a):\n    return a\ncheckme = f('x')"), "tuple of (str)");
}

#[test]
fn test_keyword_only_parameters_after_varargs() {
    let source = "def myfun(a, b, *z, x): return z[3]\ncheckme = myfun(False, False, 1, 2, 3, \"str\", x = False)";
    let chain = build(source);
    assert_eq!(type_string(&chain, "checkme"), "str");
    assert_eq!(shown_type(&chain, "x"), "bool");

    let source = "def myfun(a, b, *z, x): return z[0]\ncheckme = myfun(False, False, 1, x = False)";
    assert_eq!(checkme(source), "int");
}

#[test]
fn test_mutated_list_keeps_sure_content() {
    let chain = build("def f(x):\n    l = [1]\n    l.append(x)\n    return l\nf('s')");
    assert_eq!(shown_type(&chain, "l"), "list of unsure (int, str)");
}

#[test]
fn test_enumerate_and_pairs() {
    assert_eq!(checkme("d = {1:2, 3:4}\nfor checkme, k in d.iteritems(): pass"), "int");
    assert_eq!(checkme("d = [str(), str()]\nfor checkme, value in enumerate(d): pass"), "int");
    assert_eq!(checkme("d = [str(), str()]\nfor key, checkme in enumerate(d): pass"), "str");
    assert_eq!(checkme("d = {1:2, 3:4}\nfor key, checkme in enumerate(d.values()): pass"), "int");
    assert_eq!(checkme("d = {'a': 1.5}\nfor k, checkme in d.items(): pass"), "float");
    assert_eq!(checkme("for a, checkme in zip([1], ['x']): pass"), "str");
}

#[test]
fn test_global_rebinding_in_function() {
    let source = "a = 3\ndef f1():\n  global a\n  return a\ncheckme = f1()\n";
    assert_eq!(checkme(source), "int");
    let source = "a = 3\ndef f1():\n  global a\n  a = \"str\"\n  return a\ncheckme = f1()\n";
    assert_eq!(checkme(source), "str");
    let source = "a = 3\ndef f1():\n  return a\ncheckme = f1()\n";
    assert_eq!(checkme(source), "int");
}

#[test]
fn test_hint_unsure_parameter() {
    let source = "def f(arg):\n    return arg\nf(3)\nf(2.5)\ncheckme = f(1)";
    assert_eq!(checkme(source), "unsure (float, int)");
}

#[test]
fn test_first_argument_problems() {
    let source = "class A:\n    def method(x):\n        pass\n    @staticmethod\n    def helper(a):\n        pass\n    @classmethod\n    def make(cls):\n        pass\n    def __new__(self):\n        pass\n    def empty():\n        pass";
    let chain = build(source);
    let top = chain.top(&DocumentId::new(MAIN)).unwrap();

    let expected: Vec<_> = top
        .problems
        .iter()
        .map(|problem| match problem.get_internal_error() {
            ErrorImpl::FirstArgumentName { function, expected } => (function.clone(), expected.clone()),
            other => panic!("unexpected problem {:?}", other),
        })
        .collect();
    assert_eq!(
        expected,
        vec![
            ("method".to_string(), "self".to_string()),
            ("__new__".to_string(), "cls".to_string())
        ]
    );
}

#[test]
fn test_syntax_errors_become_problems() {
    let chain = build("a = = 1\nb = 2");
    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    assert_eq!(top.problems.len(), 1);
    assert_eq!(type_string(&chain, "b"), "int");
}

#[test]
fn test_rebuild_keeps_declaration_ids() {
    let source = "class A:\n    def m(self, x):\n        y = x\na = A()\na = 2";
    let mut chain = chain_with_builtins();
    build_into(&mut chain, MAIN, 1, source);
    let ids = |chain: &DUChain| -> Vec<DeclarationId> {
        chain.top(&DocumentId::new(MAIN)).unwrap().declarations().iter().map(|d| d.id.clone()).collect()
    };
    let first = ids(&chain);

    build_into(&mut chain, MAIN, 2, source);
    assert_eq!(ids(&chain), first);
    assert_eq!(chain.top(&DocumentId::new(MAIN)).unwrap().revision, 2);

    let a = first.iter().filter(|id| id.qualified == "a").collect::<Vec<_>>();
    assert_eq!(a.len(), 2);
    assert_eq!(a[1].disambiguator, 1);
}

#[test]
fn test_abort_restores_previous_top() {
    let mut chain = chain_with_builtins();
    build_into(&mut chain, MAIN, 1, "a = 1");

    let parsed = parse_source("b = 2").unwrap();
    let mut build = DocumentBuild::new(DocumentId::new(MAIN), 2, &parsed.module, vec![]);
    build.begin();
    build.prebuild(&mut chain, None);
    build.abort();

    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    assert_eq!(top.revision, 1);
    assert_eq!(top.declarations()[0].name, "a");
}

#[test]
fn test_previous_top_stays_published_between_phases() {
    let mut chain = chain_with_builtins();
    build_into(&mut chain, MAIN, 1, "a = 1
b = 'x'");
    let main = DocumentId::new(MAIN);
    let published = |chain: &DUChain| {
        let top = chain.top(&main).unwrap();
        (top.revision, top.declarations().len())
    };

    let parsed = parse_source("c = 1.5").unwrap();
    let mut build = DocumentBuild::new(main.clone(), 2, &parsed.module, vec![]);
    build.begin();
    assert_eq!(published(&chain), (1, 2));
    build.prebuild(&mut chain, None);
    assert_eq!(published(&chain), (1, 2));
    build.build(&mut chain, None);
    assert_eq!(published(&chain), (1, 2));
    build.build_uses(&mut chain);
    assert_eq!(published(&chain), (1, 2));

    build.finish(&mut chain);
    assert_eq!(published(&chain), (2, 1));
    assert_eq!(type_string(&chain, "c"), "float");
    assert!(chain.top(&main).unwrap().features.uses);
}

#[test]
fn test_first_build_is_invisible_until_finished() {
    let mut chain = chain_with_builtins();
    let parsed = parse_source("a = 1").unwrap();
    let mut build = DocumentBuild::new(DocumentId::new(MAIN), 1, &parsed.module, vec![]);
    build.begin();
    build.prebuild(&mut chain, None);
    build.build(&mut chain, None);
    assert!(!chain.contains(&DocumentId::new(MAIN)));

    build.finish(&mut chain);
    assert_eq!(type_string(&chain, "a"), "int");
}

#[test]
fn test_imports_between_documents() {
    let source = InMemorySource::new();
    source.set(&DocumentId::new("/project/other.py"), "a = 1\nclass K:\n    pass");
    source.set(&DocumentId::new("/project/main.py"), "");
    let resolver = ModuleResolver::new(&source, vec![]);

    let mut chain = chain_with_builtins();
    let other = parse_source("a = 1\nclass K:\n    pass").unwrap();
    build_document(&mut chain, DocumentId::new("/project/other.py"), 1, &other.module, vec![], Some(&resolver));

    let main = parse_source(
        "import other\nfrom other import a, K as Klass, missing\nfrom other import *\nimport nothere\nx = other.a\ny = Klass()\nz = a",
    )
    .unwrap();
    let outcome = build_document(&mut chain, DocumentId::new(MAIN), 1, &main.module, vec![], Some(&resolver));
    assert!(outcome.missing_dependencies.is_empty());

    assert_eq!(type_string(&chain, "x"), "int");
    assert_eq!(type_string(&chain, "y"), "K");
    assert_eq!(type_string(&chain, "z"), "int");

    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    assert!(top.imported_documents.contains(&DocumentId::new("/project/other.py")));
    let names: Vec<&str> = top.problems.iter().map(|problem| problem.get_error_name()).collect();
    assert_eq!(names, vec!["UnresolvedImport", "ModuleNotFound"]);
}

#[test]
fn test_missing_dependency_is_reported() {
    let source = InMemorySource::new();
    source.set(&DocumentId::new("/project/other.py"), "a = 1");
    let resolver = ModuleResolver::new(&source, vec![]);

    let mut chain = chain_with_builtins();
    let main = parse_source("import other").unwrap();
    let outcome = build_document(&mut chain, DocumentId::new(MAIN), 1, &main.module, vec![], Some(&resolver));

    assert_eq!(outcome.missing_dependencies, vec![DocumentId::new("/project/other.py")]);
}
