use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, warn};

use crate::{
    builder::declaration_builder::{BuildOutcome, DocumentBuild},
    duchain::duchain::{DocumentId, SharedDUChain},
    errors::errors::{Error, ErrorImpl},
    helpers::{documentation::DocumentationFile, imports::ModuleResolver, search_paths::SearchPaths},
    parser::parser::{parse_source, ParseResult},
    Position,
};

use super::source::DocumentSource;

/// Everything a job needs to analyse a document.
#[derive(Clone)]
pub struct AnalysisEnvironment {
    pub chain: SharedDUChain,
    pub source: Arc<dyn DocumentSource>,
    pub search_paths: Arc<SearchPaths>,
    pub documentation: DocumentationFile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Finished(BuildOutcome),
    Aborted,
    Failed(Error),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Prebuild,
    Declarations,
    Uses,
}

/// Parses one document and builds its contexts.
///
/// The chain is write-locked once per phase, never across phases, so
/// queries can read in between; they keep seeing the previous tree of the
/// document until the new one is published. The abort flag is checked
/// before reading, after parsing and before each phase.
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub document: DocumentId,
    pub priority: i32,
    /// Set when this run was queued again because imports were missing.
    pub rescheduled: bool,
    abort: Arc<AtomicBool>,
}

impl ParseJob {
    pub fn new(document: DocumentId, priority: i32) -> Self {
        ParseJob {
            document,
            priority,
            rescheduled: false,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn run(&self, environment: &AnalysisEnvironment) -> JobResult {
        if self.is_aborted() {
            debug!("{} aborted before reading", self.document);
            return JobResult::Aborted;
        }

        let Some(revision) = environment.source.revision(&self.document) else {
            return JobResult::Failed(Error::new(
                ErrorImpl::DocumentNotFound {
                    document: self.document.to_string(),
                },
                Position::null(),
            ));
        };
        let contents = match environment.source.contents(&self.document) {
            Ok(contents) => contents,
            Err(error) => return JobResult::Failed(error),
        };

        debug!("parsing {}", self.document);
        let parsed = parse_source(&contents).unwrap_or_else(|error| ParseResult {
            module: Default::default(),
            errors: vec![error],
        });

        if self.is_aborted() {
            debug!("{} aborted after parsing", self.document);
            return JobResult::Aborted;
        }

        if let Err(error) = environment.documentation.ensure_loaded(&mut environment.chain.write()) {
            warn!("builtin documentation unavailable: {}", error);
        }

        let resolver = ModuleResolver::new(environment.source.as_ref(), environment.search_paths.get());
        let mut build = DocumentBuild::new(self.document.clone(), revision, &parsed.module, parsed.errors);
        build.begin();

        for phase in [Phase::Prebuild, Phase::Declarations, Phase::Uses] {
            let mut chain = environment.chain.write();
            if self.is_aborted() {
                debug!("{} aborted before {:?}", self.document, phase);
                build.abort();
                return JobResult::Aborted;
            }
            match phase {
                Phase::Prebuild => build.prebuild(&mut chain, Some(&resolver)),
                Phase::Declarations => build.build(&mut chain, Some(&resolver)),
                Phase::Uses => build.build_uses(&mut chain),
            }
        }

        let mut chain = environment.chain.write();
        let outcome = build.finish(&mut chain);
        if let Some(top) = chain.top_mut(&self.document) {
            top.features.rescheduled = self.rescheduled;
        }
        JobResult::Finished(outcome)
    }
}
