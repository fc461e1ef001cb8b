use crate::{Position, Span};

use super::{declaration::DeclarationId, duchain::DocumentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Module,
    Class,
    /// Holds the parameters of a function.
    Function,
    /// Function bodies, comprehensions, lambdas and module namespaces.
    Other,
}

/// Points at a context of any document in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextRef {
    pub document: DocumentId,
    pub index: usize,
}

impl ContextRef {
    pub fn new(document: DocumentId, index: usize) -> Self {
        ContextRef { document, index }
    }

    pub fn top(document: DocumentId) -> Self {
        ContextRef { document, index: 0 }
    }
}

/// A resolved reference to a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Use {
    pub span: Span,
    pub declaration: DeclarationId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DUContext {
    pub kind: ContextKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub range: Span,
    /// Qualified name prefix for declarations made in this context.
    pub scope: String,
    pub owner: Option<DeclarationId>,
    pub local_declarations: Vec<usize>,
    pub uses: Vec<Use>,
    pub imports: Vec<ContextRef>,
}

impl DUContext {
    pub fn new(kind: ContextKind, parent: Option<usize>, range: Span, scope: impl Into<String>) -> Self {
        DUContext {
            kind,
            parent,
            children: vec![],
            range,
            scope: scope.into(),
            owner: None,
            local_declarations: vec![],
            uses: vec![],
            imports: vec![],
        }
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.range.contains(position)
    }

    pub fn add_import(&mut self, context: ContextRef) {
        if !self.imports.contains(&context) {
            self.imports.push(context);
        }
    }
}
