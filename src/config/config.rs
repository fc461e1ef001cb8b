use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::debug;

use crate::{
    errors::errors::{Error, ErrorImpl},
    helpers::{documentation::DocumentationFile, search_paths::SearchPaths},
    Position,
};

/// Settings of an analysis session, read from a JSON file.
///
/// Every field is optional; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub worker_threads: usize,
    /// Searched for imports before the interpreter's paths.
    pub search_paths: Vec<PathBuf>,
    /// Replaces the embedded builtin documentation.
    pub documentation_file: Option<PathBuf>,
    pub interpreter: String,
    /// Ask `interpreter` for `sys.path`; otherwise only `PYTHONPATH` is used.
    pub query_interpreter: bool,
    pub poll_interval_ms: u64,
    pub wait_timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            worker_threads: 2,
            search_paths: vec![],
            documentation_file: None,
            interpreter: String::from("python3"),
            query_interpreter: true,
            poll_interval_ms: 10,
            wait_timeout_ms: 60_000,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .map_err(|error| invalid(format!("cannot read {}: {}", path.display(), error)))?;
        let config = Self::from_json(&contents)?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self, Error> {
        serde_json::from_str(contents).map_err(|error| invalid(error.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn documentation(&self) -> DocumentationFile {
        match &self.documentation_file {
            Some(path) => DocumentationFile::from_path(path),
            None => DocumentationFile::embedded(),
        }
    }

    pub fn search_path_cache(&self) -> SearchPaths {
        let paths = if self.query_interpreter {
            SearchPaths::from_interpreter(self.interpreter.clone())
        } else {
            SearchPaths::from_environment()
        };
        paths.with_project_paths(self.search_paths.clone())
    }
}

fn invalid(message: String) -> Error {
    Error::new(ErrorImpl::InvalidConfiguration { message }, Position::null())
}
