//! Unit tests for the query surface.

use std::sync::Arc;

use super::language::LanguageSupport;
use crate::{
    background::{parser::DEFAULT_PRIORITY, source::InMemorySource},
    config::config::AnalysisConfig,
    duchain::duchain::DocumentId,
    Position,
};

const MAIN: &str = "/project/main.py";

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

#[test]
fn test_type_under_cursor() {
    let (support, _) = support(0, &[(MAIN, "checkme = [1, 2, 3]\na = 3\na = 'x'\nb = a")]);
    let main = DocumentId::new(MAIN);
    support.update_document(&main).unwrap();

    assert_eq!(support.type_string_at(&main, &Position::cursor(1, 3)).as_deref(), Some("list of int"));
    assert_eq!(support.type_string_at(&main, &Position::cursor(2, 0)).as_deref(), Some("int"));
    assert_eq!(
        support.type_string_at(&main, &Position::cursor(4, 4)).as_deref(),
        Some("unsure (int, str)")
    );
    assert_eq!(support.type_string_at(&main, &Position::cursor(4, 3)), None);

    let used = support.declaration_at(&main, &Position::cursor(4, 4)).unwrap();
    assert_eq!(used.name, "a");
    assert_eq!(used.range.start.line, 3);
}

#[test]
fn test_problems() {
    let (support, _) = support(0, &[(MAIN, "def f(x y):\n    pass\nimport nothere\nclass A:\n    def m(x):\n        pass")]);
    let main = DocumentId::new(MAIN);
    support.update_document(&main).unwrap();

    let names: Vec<String> = support
        .problems(&main)
        .iter()
        .map(|problem| problem.get_error_name().to_string())
        .collect();
    assert!(names.len() >= 3);
    assert!(names.contains(&"ModuleNotFound".to_string()));
    assert!(names.contains(&"FirstArgumentName".to_string()));
}

#[test]
fn test_missing_document() {
    let (support, _) = support(0, &[]);
    let error = support.update_document(&DocumentId::new(MAIN)).unwrap_err();

    assert_eq!(error.get_error_name(), "DocumentNotFound");
    assert!(support.problems(&DocumentId::new(MAIN)).is_empty());
    assert!(support.declarations(&DocumentId::new(MAIN)).is_empty());
}

#[test]
fn test_background_workers() {
    let (support, _) = support(2, &[(MAIN, "value = 1.5")]);
    let main = DocumentId::new(MAIN);

    support.schedule(main.clone(), DEFAULT_PRIORITY);
    assert!(support.wait_for_document(&main));
    assert_eq!(support.type_string_at(&main, &Position::cursor(1, 0)).as_deref(), Some("float"));
}

#[test]
fn test_reparse_keeps_identity() {
    let (support, source) = support(0, &[(MAIN, "a = 1\nb = 2")]);
    let main = DocumentId::new(MAIN);
    support.update_document(&main).unwrap();
    let before = support.declaration_at(&main, &Position::cursor(2, 0)).unwrap();

    source.set(&main, "a = 1\nb = 'two'");
    support.update_document(&main).unwrap();
    let after = support.declaration_at(&main, &Position::cursor(2, 0)).unwrap();

    assert_eq!(before.id, after.id);
    assert_eq!(support.type_string(&after.id).as_deref(), Some("str"));
    assert_eq!(support.chain().read().top(&main).unwrap().revision, 2);
}

#[test]
fn test_reset_caches() {
    let (support, _) = support(0, &[(MAIN, "a = len")]);
    let main = DocumentId::new(MAIN);
    support.update_document(&main).unwrap();
    assert!(support.chain().read().builtins().is_some());

    support.reset_caches();
    assert!(support.chain().read().builtins().is_none());

    support.update_document(&main).unwrap();
    assert!(support.chain().read().builtins().is_some());
    assert_eq!(support.declarations(&main).len(), 1);
}
