use std::path::{Path, PathBuf};

use tracing::trace;

use crate::{
    ast::statements::{Stmt, StmtKind},
    background::source::DocumentSource,
    duchain::duchain::DocumentId,
};

/// Maps dotted module names to documents.
///
/// Absolute imports are searched next to the importing document first and
/// then in every search path; relative imports only below the importing
/// package. `a.b` is found as `a/b.py` or `a/b/__init__.py`.
pub struct ModuleResolver<'a> {
    source: &'a dyn DocumentSource,
    search_paths: Vec<PathBuf>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(source: &'a dyn DocumentSource, search_paths: Vec<PathBuf>) -> Self {
        ModuleResolver { source, search_paths }
    }

    /// The document for `module` imported from `importing` with `level`
    /// leading dots.
    pub fn resolve(&self, importing: &DocumentId, module: &str, level: u32) -> Option<DocumentId> {
        let roots = self.roots(importing, level);
        let relative: PathBuf = module.split('.').filter(|part| !part.is_empty()).collect();

        for root in roots {
            let base = root.join(&relative);
            let candidates = if relative.as_os_str().is_empty() {
                vec![base.join("__init__.py")]
            } else {
                vec![base.with_extension("py"), base.join("__init__.py")]
            };

            for candidate in candidates {
                let document = DocumentId::from(candidate.as_path());
                if self.source.exists(&document) {
                    trace!("resolved module {} to {}", module, document);
                    return Some(document);
                }
            }
        }

        None
    }

    fn roots(&self, importing: &DocumentId, level: u32) -> Vec<PathBuf> {
        let directory = importing.path().parent().map(Path::to_path_buf).unwrap_or_default();

        if level > 0 {
            let mut root = directory;
            for _ in 1..level {
                root = match root.parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => return vec![],
                };
            }
            return vec![root];
        }

        let mut roots = vec![directory];
        roots.extend(self.search_paths.iter().cloned());
        roots
    }
}

/// Every module a document imports, as `(name, level)`.
///
/// For `import a.b` both `a` and `a.b` are listed; for `from m import x`
/// both `m` and the possible submodule `m.x`.
pub fn imported_modules(body: &[Stmt]) -> Vec<(String, u32)> {
    let mut modules = vec![];
    collect_imported_modules(body, &mut modules);
    modules
}

fn collect_imported_modules(body: &[Stmt], modules: &mut Vec<(String, u32)>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import(names) => {
                for alias in names {
                    let mut prefix = String::new();
                    for part in alias.name.name.split('.') {
                        if !prefix.is_empty() {
                            prefix.push('.');
                        }
                        prefix.push_str(part);
                        modules.push((prefix.clone(), 0));
                    }
                }
            }
            StmtKind::ImportFrom { module, level, names } => {
                let module = module.as_ref().map(|module| module.name.clone()).unwrap_or_default();
                modules.push((module.clone(), *level));
                for alias in names.iter().filter(|alias| alias.name.name != "*") {
                    let submodule = if module.is_empty() {
                        alias.name.name.clone()
                    } else {
                        format!("{}.{}", module, alias.name.name)
                    };
                    modules.push((submodule, *level));
                }
            }
            StmtKind::FunctionDef(def) => collect_imported_modules(&def.body, modules),
            StmtKind::ClassDef(class) => collect_imported_modules(&class.body, modules),
            StmtKind::If { body, orelse, .. }
            | StmtKind::For { body, orelse, .. }
            | StmtKind::While { body, orelse, .. } => {
                collect_imported_modules(body, modules);
                collect_imported_modules(orelse, modules);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_imported_modules(body, modules);
                for handler in handlers {
                    collect_imported_modules(&handler.body, modules);
                }
                collect_imported_modules(orelse, modules);
                collect_imported_modules(finalbody, modules);
            }
            StmtKind::With { body, .. } => collect_imported_modules(body, modules),
            _ => {}
        }
    }
}
