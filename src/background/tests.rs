//! Unit tests for background analysis.
//!
//! This module contains tests for:
//! - Document sources
//! - Parse jobs and their abort checkpoints
//! - Queue ordering, priority promotion and rescheduling
//! - Worker threads and waiting

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use super::{
    job::{AnalysisEnvironment, JobResult, ParseJob},
    parser::{BackgroundParser, DEFAULT_PRIORITY, RESCHEDULE_PRIORITY},
    source::{DocumentSource, FileSystemSource, InMemorySource},
};
use crate::{
    duchain::duchain::{DUChain, DocumentId},
    helpers::{documentation::DocumentationFile, helpers::merged_history_type, search_paths::SearchPaths},
};

const MAIN: &str = "/project/main.py";
const OTHER: &str = "/project/other.py";

fn environment(source: &Arc<InMemorySource>) -> AnalysisEnvironment {
    AnalysisEnvironment {
        chain: DUChain::shared(),
        source: source.clone(),
        search_paths: Arc::new(SearchPaths::fixed(vec![])),
        documentation: DocumentationFile::embedded(),
    }
}

fn source_with(documents: &[(&str, &str)]) -> Arc<InMemorySource> {
    let source = Arc::new(InMemorySource::new());
    for (document, contents) in documents {
        source.set(&DocumentId::new(document), *contents);
    }
    source
}

fn type_string(environment: &AnalysisEnvironment, document: &str, name: &str) -> String {
    let chain = environment.chain.read();
    let top = chain.top(&DocumentId::new(document)).unwrap();
    let declaration = top
        .declarations()
        .iter()
        .filter(|declaration| declaration.name == name)
        .last()
        .unwrap();
    merged_history_type(&chain, declaration).to_string()
}

#[test]
fn test_in_memory_revisions() {
    let source = InMemorySource::new();
    let document = DocumentId::new(MAIN);
    assert!(!source.exists(&document));

    assert_eq!(source.set(&document, "a = 1"), 1);
    assert_eq!(source.set(&document, "a = 2"), 2);
    assert_eq!(source.contents(&document).unwrap(), "a = 2");

    source.remove(&document);
    assert_eq!(source.revision(&document), None);
    assert_eq!(source.contents(&document).unwrap_err().get_error_name(), "DocumentNotFound");
}

#[test]
fn test_file_system_source() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("module.py");
    std::fs::write(&path, "a = 1\n").unwrap();
    let document = DocumentId::from(path.as_path());

    let source = FileSystemSource;
    assert!(source.revision(&document).unwrap() > 0);
    assert_eq!(source.contents(&document).unwrap(), "a = 1\n");

    let directory_document = DocumentId::from(directory.path());
    assert!(!source.exists(&directory_document));
    let missing = DocumentId::from(directory.path().join("missing.py").as_path());
    assert_eq!(source.contents(&missing).unwrap_err().get_error_name(), "DocumentNotFound");
}

#[test]
fn test_job_builds_document() {
    let source = source_with(&[(MAIN, "a = 1\nb = a")]);
    let environment = environment(&source);

    let result = ParseJob::new(DocumentId::new(MAIN), DEFAULT_PRIORITY).run(&environment);
    assert_eq!(result, JobResult::Finished(Default::default()));

    let chain = environment.chain.read();
    assert!(chain.builtins().is_some());
    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    assert_eq!(top.revision, 1);
    assert!(top.features.declarations);
    assert!(top.features.uses);
    assert!(!top.features.rescheduled);
    assert_eq!(top.uses().count(), 1);
}

#[test]
fn test_aborted_job_keeps_previous_tree() {
    let source = source_with(&[(MAIN, "a = 1")]);
    let environment = environment(&source);
    ParseJob::new(DocumentId::new(MAIN), DEFAULT_PRIORITY).run(&environment);

    source.set(&DocumentId::new(MAIN), "b = 'x'");
    let job = ParseJob::new(DocumentId::new(MAIN), DEFAULT_PRIORITY);
    job.abort();
    assert!(job.is_aborted());
    assert_eq!(job.run(&environment), JobResult::Aborted);

    let chain = environment.chain.read();
    let top = chain.top(&DocumentId::new(MAIN)).unwrap();
    assert_eq!(top.revision, 1);
    assert_eq!(top.declarations()[0].name, "a");
}

#[test]
fn test_missing_document_fails() {
    let source = source_with(&[]);
    let environment = environment(&source);

    match ParseJob::new(DocumentId::new("/nowhere.py"), DEFAULT_PRIORITY).run(&environment) {
        JobResult::Failed(error) => assert_eq!(error.get_error_name(), "DocumentNotFound"),
        other => panic!("unexpected result {:?}", other),
    }
    assert!(environment.chain.read().top(&DocumentId::new("/nowhere.py")).is_none());
}

#[test]
fn test_priority_promotion() {
    let source = source_with(&[]);
    let parser = BackgroundParser::new(environment(&source), 0, Duration::from_millis(1));
    let dependency = DocumentId::new(OTHER);

    parser.schedule_dependency(dependency.clone(), 10);
    assert_eq!(parser.queued_priority(&dependency), Some(9));
    parser.schedule_dependency(dependency.clone(), 20);
    assert_eq!(parser.queued_priority(&dependency), Some(9));
    parser.schedule_dependency(dependency.clone(), 5);
    assert_eq!(parser.queued_priority(&dependency), Some(4));

    let document = DocumentId::new(MAIN);
    parser.schedule(document.clone(), 100);
    parser.schedule(document.clone(), 200);
    assert_eq!(parser.queued_priority(&document), Some(100));
    parser.schedule(document.clone(), 50);
    assert_eq!(parser.queued_priority(&document), Some(50));

    parser.abort(&document);
    assert_eq!(parser.queued_priority(&document), None);
    assert!(!parser.is_idle());
}

#[test]
fn test_jobs_run_in_priority_order() {
    let source = source_with(&[("/a.py", "x = 1"), ("/b.py", "x = 1"), ("/c.py", "x = 1")]);
    let parser = BackgroundParser::new(environment(&source), 0, Duration::from_millis(1));
    parser.schedule(DocumentId::new("/a.py"), 10);
    parser.schedule(DocumentId::new("/b.py"), 5);
    parser.schedule(DocumentId::new("/c.py"), 10);

    let parsed = |name: &str| parser.environment().chain.read().contains(&DocumentId::new(name));

    assert!(parser.process_next());
    assert!(parsed("/b.py") && !parsed("/a.py") && !parsed("/c.py"));
    assert!(parser.process_next());
    assert!(parsed("/a.py") && !parsed("/c.py"));
    assert!(parser.process_next());
    assert!(parsed("/c.py"));
    assert!(!parser.process_next());
    assert!(parser.is_idle());
}

#[test]
fn test_missing_imports_reschedule_once() {
    let source = source_with(&[(MAIN, "import other\nx = other.a"), (OTHER, "a = 1")]);
    let parser = BackgroundParser::new(environment(&source), 0, Duration::from_millis(1));
    let (main, other) = (DocumentId::new(MAIN), DocumentId::new(OTHER));

    parser.schedule(main.clone(), DEFAULT_PRIORITY);
    assert!(parser.process_next());
    assert_eq!(parser.queued_priority(&other), Some(DEFAULT_PRIORITY - 1));
    assert_eq!(parser.queued_priority(&main), Some(RESCHEDULE_PRIORITY));
    assert!(!parser.environment().chain.read().top(&main).unwrap().features.rescheduled);

    assert!(parser.process_next());
    assert!(parser.environment().chain.read().contains(&other));
    assert!(parser.process_next());
    assert!(parser.environment().chain.read().top(&main).unwrap().features.rescheduled);
    assert_eq!(type_string(parser.environment(), MAIN, "x"), "int");

    assert!(!parser.process_next());
    assert!(parser.is_idle());
}

#[test]
fn test_missing_imports_follow_dependency_rules() {
    let source = source_with(&[(MAIN, "import other\nx = other.a"), (OTHER, "a = 1")]);
    let parser = BackgroundParser::new(environment(&source), 0, Duration::from_millis(1));
    let (main, other) = (DocumentId::new(MAIN), DocumentId::new(OTHER));

    parser.schedule(other.clone(), 1000);
    parser.schedule(main.clone(), DEFAULT_PRIORITY);
    assert!(parser.process_next());

    // A worse entry is promoted just ahead of the importer.
    assert_eq!(parser.queued_priority(&other), Some(DEFAULT_PRIORITY - 1));
    parser.schedule_dependency(other.clone(), 500);
    assert_eq!(parser.queued_priority(&other), Some(DEFAULT_PRIORITY - 1));

    assert!(parser.process_next());
    assert!(parser.process_next());
    assert_eq!(type_string(parser.environment(), MAIN, "x"), "int");
    assert!(parser.is_idle());
}

#[test]
fn test_workers_analyse_everything() {
    let documents: Vec<String> = (0..5).map(|index| format!("/project/m{}.py", index)).collect();
    let source = Arc::new(InMemorySource::new());
    for (index, document) in documents.iter().enumerate() {
        source.set(&DocumentId::new(document), format!("value = {}", index));
    }
    let parser = BackgroundParser::new(environment(&source), 3, Duration::from_millis(1));

    for document in &documents {
        parser.schedule(DocumentId::new(document), DEFAULT_PRIORITY);
    }
    assert!(parser.wait_until_idle(Duration::from_secs(30)));

    for document in &documents {
        assert!(parser.wait_for_document(&DocumentId::new(document), Duration::from_secs(1)));
        assert_eq!(type_string(parser.environment(), document, "value"), "int");
    }
}

#[test]
fn test_workers_follow_imports() {
    let source = source_with(&[(MAIN, "from other import a\nx = a"), (OTHER, "a = 'text'")]);
    let parser = BackgroundParser::new(environment(&source), 2, Duration::from_millis(1));

    parser.schedule(DocumentId::new(MAIN), DEFAULT_PRIORITY);
    assert!(parser.wait_until_idle(Duration::from_secs(30)));

    assert_eq!(type_string(parser.environment(), MAIN, "x"), "str");
    let chain = parser.environment().chain.read();
    assert!(chain.top(&DocumentId::new(MAIN)).unwrap().features.rescheduled);
    assert!(chain.top(&DocumentId::new(MAIN)).unwrap().problems.is_empty());
}

#[test]
fn test_waiting_for_unknown_document_returns() {
    let source = source_with(&[]);
    let parser = BackgroundParser::new(environment(&source), 1, Duration::from_millis(1));

    let started = Instant::now();
    assert!(!parser.wait_for_document(&DocumentId::new("/unknown.py"), Duration::from_secs(10)));
    assert!(started.elapsed() < Duration::from_secs(5));
}
