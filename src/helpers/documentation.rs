use std::{fs, path::PathBuf};

use tracing::{debug, warn};

use crate::{
    builder::declaration_builder::build_document,
    duchain::duchain::{DUChain, DocumentId},
    errors::errors::{Error, ErrorImpl},
    parser::parser::parse_source,
    Position,
};

/// Builtin documentation shipped with the crate.
pub const EMBEDDED_BUILTINS: &str = include_str!("builtins.py");

const BUILTINS_REVISION: u64 = 1;

/// The module describing builtin classes and functions.
///
/// Built into the chain the first time it is needed and shared by every
/// document from then on. [`DocumentationFile::reset`] drops it so the next
/// call to [`DocumentationFile::ensure_loaded`] builds it again.
#[derive(Debug, Clone, Default)]
pub struct DocumentationFile {
    path: Option<PathBuf>,
}

impl DocumentationFile {
    pub fn embedded() -> Self {
        DocumentationFile { path: None }
    }

    /// Documentation read from `path` instead of the embedded module.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        DocumentationFile {
            path: Some(path.into()),
        }
    }

    pub fn document(&self) -> DocumentId {
        DocumentId::builtins()
    }

    pub fn source(&self) -> Result<String, Error> {
        match &self.path {
            None => Ok(EMBEDDED_BUILTINS.to_string()),
            Some(path) => fs::read_to_string(path).map_err(|error| {
                Error::new(
                    ErrorImpl::DocumentUnreadable {
                        document: path.display().to_string(),
                        message: error.to_string(),
                    },
                    Position::null(),
                )
            }),
        }
    }

    /// Builds the documentation module unless `chain` already has it.
    pub fn ensure_loaded(&self, chain: &mut DUChain) -> Result<(), Error> {
        if chain.builtins().is_some() {
            return Ok(());
        }

        let source = self.source()?;
        let parsed = parse_source(&source)?;
        for error in &parsed.errors {
            warn!("syntax error in builtin documentation: {}", error);
        }

        debug!("building builtin documentation");
        build_document(chain, self.document(), BUILTINS_REVISION, &parsed.module, parsed.errors, None);
        Ok(())
    }

    pub fn reset(&self, chain: &mut DUChain) {
        chain.remove(&self.document());
    }
}
