//! Integration tests for end-to-end analysis.
//!
//! These tests drive the public query surface: documents are read from an
//! in-memory source, analysed through the background parser and queried
//! for declarations, uses, types and problems.

use std::sync::Arc;

use pyduchain::{
    background::{parser::DEFAULT_PRIORITY, source::InMemorySource},
    config::config::AnalysisConfig,
    duchain::{declaration::Declaration, duchain::DocumentId},
    language::language::LanguageSupport,
};

const MAIN: &str = "/project/main.py";
const LIB: &str = "/project/lib.py";
const USER: &str = "/project/user.py";
const OTHER: &str = "/project/other.py";

fn support(workers: usize, documents: &[(&str, &str)]) -> (LanguageSupport, Arc<InMemorySource>) {
    let source = Arc::new(InMemorySource::new());
    for (document, contents) in documents {
        source.set(&DocumentId::new(document), *contents);
    }
    let config = AnalysisConfig {
        worker_threads: workers,
        query_interpreter: false,
        poll_interval_ms: 1,
        wait_timeout_ms: 30_000,
        ..AnalysisConfig::default()
    };
    (LanguageSupport::new(config, source.clone()), source)
}

fn last_named(support: &LanguageSupport, document: &str, name: &str) -> Declaration {
    support
        .declarations(&DocumentId::new(document))
        .into_iter()
        .filter(|declaration| declaration.name == name)
        .last()
        .unwrap_or_else(|| panic!("no declaration named {} in {}", name, document))
}

fn type_of(support: &LanguageSupport, document: &str, name: &str) -> String {
    let declaration = last_named(support, document, name);
    support.type_string(&declaration.id).unwrap_or_default()
}

fn analyse(source: &str) -> LanguageSupport {
    let (support, _) = support(0, &[(MAIN, source)]);
    support.update_document(&DocumentId::new(MAIN)).unwrap();
    support
}

#[test]
fn test_list_literal() {
    let support = analyse("checkme = [1, 2, 3]");
    assert_eq!(type_of(&support, MAIN, "checkme"), "list of int");
}

#[test]
fn test_declarations_and_uses() {
    let support = analyse("a = 3\nb = a+2");
    let main = DocumentId::new(MAIN);

    assert_eq!(support.declarations(&main).len(), 2);
    let chain = support.chain().read();
    assert_eq!(chain.top(&main).unwrap().uses().count(), 1);
}

#[test]
fn test_position_dependent_lookup() {
    let support = analyse("a = 3\nb = a\na = 'x'\nc = a");

    assert_eq!(type_of(&support, MAIN, "b"), "int");
    assert_eq!(type_of(&support, MAIN, "c"), "unsure (int, str)");
}

#[test]
fn test_container_mutation_widens() {
    let support = analyse("d = []\nd.append(3)\nd.append('x')\ncheckme = d[0]");
    assert_eq!(type_of(&support, MAIN, "checkme"), "unsure (int, str)");
}

#[test]
fn test_inherited_attribute() {
    let support = analyse("class A:\n    attr = 3\nclass B(A):\n    pass\ncheckme = B().attr");
    assert_eq!(type_of(&support, MAIN, "checkme"), "int");
}

#[test]
fn test_user_defined_operator() {
    let support = analyse(
        "class c():\n def __mul__(self, other):\n  return int()\nx = c()\nx = 3.5\ny = 3\ncheckme = x * y",
    );
    assert_eq!(type_of(&support, MAIN, "checkme"), "unsure (float, int)");
}

#[test]
fn test_identity_survives_edit() {
    let (support, source) = support(0, &[(MAIN, "def foo():\n    return 1\nbar = foo()")]);
    let main = DocumentId::new(MAIN);
    support.update_document(&main).unwrap();
    let before = last_named(&support, MAIN, "foo");

    source.set(&main, "def foo():\n    return 'one'\nbar = foo()\nbaz = 2");
    support.update_document(&main).unwrap();
    let after = last_named(&support, MAIN, "foo");

    assert_eq!(before.id, after.id);
    assert_eq!(type_of(&support, MAIN, "bar"), "str");
    assert_eq!(support.declarations(&main).len(), 3);
}

#[test]
fn test_imports_are_analysed_first() {
    let (support, _) = support(0, &[(LIB, "value = 1.5\nclass K:\n    pass"), (USER, "import lib\nx = lib.value\ny = lib.K()")]);
    let user = DocumentId::new(USER);
    support.update_document(&user).unwrap();

    assert_eq!(type_of(&support, USER, "x"), "float");
    assert_eq!(type_of(&support, USER, "y"), "K");
    assert!(support.problems(&user).is_empty());

    let chain = support.chain().read();
    let top = chain.top(&user).unwrap();
    assert!(top.features.rescheduled);
    assert!(chain.top(&DocumentId::new(LIB)).is_some());
}

#[test]
fn test_call_site_hints_cross_documents() {
    let (support, source) = support(
        0,
        &[
            (LIB, "def f(x):\n    return x"),
            (USER, "from lib import f\ny = f(3)"),
            (OTHER, "from lib import f\nz = f('a')"),
        ],
    );
    let user = DocumentId::new(USER);
    support.update_document(&user).unwrap();
    assert_eq!(type_of(&support, USER, "y"), "int");

    support.update_document(&DocumentId::new(OTHER)).unwrap();
    assert_eq!(type_of(&support, OTHER, "z"), "str");
    assert_eq!(type_of(&support, USER, "y"), "int");

    // Neither call site is visible from the library itself.
    assert_eq!(type_of(&support, LIB, "x"), "mixed");

    source.set(&user, "from lib import f\ny = f(3.5)");
    support.update_document(&user).unwrap();
    assert_eq!(type_of(&support, USER, "y"), "float");
}

#[test]
fn test_background_workers_follow_imports() {
    let (support, _) = support(
        2,
        &[
            (LIB, "def make():\n    return {'a': 1}"),
            (MAIN, "from lib import make\nchecked = make()"),
        ],
    );
    let main = DocumentId::new(MAIN);

    support.schedule(main.clone(), DEFAULT_PRIORITY);
    assert!(support.wait_for_document(&main));
    assert!(support.parser().wait_until_idle(support.config().wait_timeout()));

    assert_eq!(type_of(&support, MAIN, "checked"), "dict of str : int");
}

#[test]
fn test_broken_document_still_answers() {
    let support = analyse("a = 1\ndef broken(:\n    pass\nb = 'x'");
    let main = DocumentId::new(MAIN);

    assert!(!support.problems(&main).is_empty());
    assert_eq!(type_of(&support, MAIN, "a"), "int");
    assert!(support.declarations(&main).len() <= 3);
}

#[test]
fn test_statements_after_broken_line_survive() {
    let support = analyse("x = 1 +\ny = 2\nz = y");
    let main = DocumentId::new(MAIN);

    let problems = support.problems(&main);
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].get_position().line, 1);
    assert_eq!(type_of(&support, MAIN, "y"), "int");
    assert_eq!(type_of(&support, MAIN, "z"), "int");
}

#[test]
fn test_containers_holding_call_hints() {
    let support = analyse("def f(*a):\n    return a\ncheckme = f(1, 2)");
    assert_eq!(type_of(&support, MAIN, "checkme"), "tuple of (int, int)");
    assert_eq!(type_of(&support, MAIN, "a"), "tuple of (int, int)");

    let support = analyse("def f(x):\n    l = [1]\n    l.append(x)\n    return l\nf('s')");
    assert_eq!(type_of(&support, MAIN, "l"), "list of unsure (int, str)");
}
