use std::{sync::Arc, thread, time::Instant};

use tracing::{debug, warn};

use crate::{
    background::{
        job::AnalysisEnvironment,
        parser::{BackgroundParser, DEFAULT_PRIORITY},
        source::DocumentSource,
    },
    config::config::AnalysisConfig,
    duchain::{
        declaration::{Declaration, DeclarationId},
        duchain::{DUChain, DocumentId, SharedDUChain},
    },
    errors::errors::{Error, ErrorImpl},
    helpers::helpers::{merged_history_type, visible_type},
    Position,
};

/// Entry point for consumers of the analysis.
///
/// Owns the chain, the background parser and the caches of a session.
/// Queries take the chain's read lock and return owned values.
pub struct LanguageSupport {
    config: AnalysisConfig,
    parser: BackgroundParser,
}

impl LanguageSupport {
    pub fn new(config: AnalysisConfig, source: Arc<dyn DocumentSource>) -> Self {
        let environment = AnalysisEnvironment {
            chain: DUChain::shared(),
            source,
            search_paths: Arc::new(config.search_path_cache()),
            documentation: config.documentation(),
        };
        let parser = BackgroundParser::new(environment, config.worker_threads, config.poll_interval());

        LanguageSupport { config, parser }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn chain(&self) -> &SharedDUChain {
        &self.parser.environment().chain
    }

    pub fn parser(&self) -> &BackgroundParser {
        &self.parser
    }

    /// Requests `document` to be (re)parsed at `priority` or better.
    pub fn schedule(&self, document: DocumentId, priority: i32) {
        self.parser.schedule(document, priority);
    }

    /// Waits for `document` for at most the configured timeout.
    pub fn wait_for_document(&self, document: &DocumentId) -> bool {
        self.parser.wait_for_document(document, self.config.wait_timeout())
    }

    /// Analyses `document` and the imports it needs, helping the workers
    /// on the calling thread until it is done.
    pub fn update_document(&self, document: &DocumentId) -> Result<(), Error> {
        if !self.parser.environment().source.exists(document) {
            return Err(Error::new(
                ErrorImpl::DocumentNotFound {
                    document: document.to_string(),
                },
                Position::null(),
            ));
        }

        self.parser.schedule(document.clone(), DEFAULT_PRIORITY);
        let deadline = Instant::now() + self.config.wait_timeout();
        while self.parser.is_busy(document) {
            if Instant::now() >= deadline {
                warn!("timed out analysing {}", document);
                break;
            }
            if !self.parser.process_next() {
                thread::sleep(self.config.poll_interval());
            }
        }

        debug!("{} is up to date", document);
        Ok(())
    }

    /// The declaration declared or used at `position`.
    pub fn declaration_at(&self, document: &DocumentId, position: &Position) -> Option<Declaration> {
        self.chain().read().declaration_at(document, position).cloned()
    }

    /// Declarations made in `document`, in build order.
    pub fn declarations(&self, document: &DocumentId) -> Vec<Declaration> {
        self.chain()
            .read()
            .top(document)
            .map(|top| top.declarations().to_vec())
            .unwrap_or_default()
    }

    /// The type of `declaration` as shown to the user.
    ///
    /// Variables show every type bound to their name so far; call-site
    /// hints are only shown while still valid from the declaring document.
    pub fn type_string(&self, declaration: &DeclarationId) -> Option<String> {
        let chain = self.chain().read();
        let declaration = chain.declaration(declaration)?;
        let ty = if declaration.is_function {
            declaration.abstract_type.clone()
        } else {
            merged_history_type(&chain, declaration)
        };
        Some(visible_type(&chain, &ty, &declaration.id.document).to_string())
    }

    /// The type of whatever is declared or used at `position`.
    pub fn type_string_at(&self, document: &DocumentId, position: &Position) -> Option<String> {
        let declaration = self.declaration_at(document, position)?;
        self.type_string(&declaration.id)
    }

    /// Problems found in the last analysis of `document`.
    pub fn problems(&self, document: &DocumentId) -> Vec<Error> {
        self.chain()
            .read()
            .top(document)
            .map(|top| top.problems.clone())
            .unwrap_or_default()
    }

    /// Drops the gathered search paths and the builtin documentation; both
    /// are set up again by the next analysis.
    pub fn reset_caches(&self) {
        let environment = self.parser.environment();
        environment.search_paths.reset();
        environment.documentation.reset(&mut environment.chain.write());
    }
}
