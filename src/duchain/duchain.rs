use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    fmt::Display,
    path::Path,
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::warn;

use crate::{
    errors::errors::Error,
    types::{merge::HintValidity, types::Revision},
    Position, Span,
};

use super::{
    context::{ContextKind, ContextRef, DUContext, Use},
    declaration::{Declaration, DeclarationId},
};

/// Name of the document holding the builtin documentation module.
pub const BUILTINS_DOCUMENT: &str = "<builtins>";

/// Identifies a document, usually by its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
    pub fn new(name: impl AsRef<str>) -> Self {
        DocumentId(Arc::from(name.as_ref()))
    }

    pub fn builtins() -> Self {
        DocumentId::new(BUILTINS_DOCUMENT)
    }

    pub fn is_builtins(&self) -> bool {
        &*self.0 == BUILTINS_DOCUMENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn path(&self) -> &Path {
        Path::new(&*self.0)
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&Path> for DocumentId {
    fn from(path: &Path) -> Self {
        DocumentId::new(path.to_string_lossy())
    }
}

/// How complete the analysis of a document is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub declarations: bool,
    pub uses: bool,
    /// The document was queued again after its dependencies.
    pub rescheduled: bool,
}

/// Root of one document's contexts.
///
/// Contexts and declarations live in arenas indexed by position; context 0
/// is the module context.
#[derive(Debug, Clone)]
pub struct TopDUContext {
    pub document: DocumentId,
    pub revision: Revision,
    pub features: Features,
    pub problems: Vec<Error>,
    /// Documents this one imports from.
    pub imported_documents: BTreeSet<DocumentId>,
    contexts: Vec<DUContext>,
    declarations: Vec<Declaration>,
    by_id: HashMap<DeclarationId, usize>,
}

impl TopDUContext {
    pub fn new(document: DocumentId, revision: Revision, range: Span) -> Self {
        TopDUContext {
            document,
            revision,
            features: Features::default(),
            problems: vec![],
            imported_documents: BTreeSet::new(),
            contexts: vec![DUContext::new(ContextKind::Module, None, range, "")],
            declarations: vec![],
            by_id: HashMap::new(),
        }
    }

    pub fn module_context(&self) -> &DUContext {
        &self.contexts[0]
    }

    pub fn context(&self, index: usize) -> Option<&DUContext> {
        self.contexts.get(index)
    }

    pub fn context_mut(&mut self, index: usize) -> Option<&mut DUContext> {
        self.contexts.get_mut(index)
    }

    pub fn contexts(&self) -> &[DUContext] {
        &self.contexts
    }

    /// Opens a child context of `parent`.
    pub fn add_context(&mut self, kind: ContextKind, parent: usize, range: Span, scope: impl Into<String>) -> usize {
        let index = self.contexts.len();
        self.contexts.push(DUContext::new(kind, Some(parent), range, scope));
        match self.contexts.get_mut(parent) {
            Some(parent) => parent.children.push(index),
            None => warn!("context {} opened under missing parent {}", index, parent),
        }
        index
    }

    /// Adds a declaration to its context. A declaration whose id is already
    /// taken is rejected.
    pub fn add_declaration(&mut self, declaration: Declaration) -> Option<usize> {
        if self.by_id.contains_key(&declaration.id) {
            warn!("duplicate declaration id {}", declaration.id);
            return None;
        }
        let Some(context) = self.contexts.get_mut(declaration.context) else {
            warn!("declaration {} added to missing context", declaration.id);
            return None;
        };

        let index = self.declarations.len();
        context.local_declarations.push(index);
        self.by_id.insert(declaration.id.clone(), index);
        self.declarations.push(declaration);
        Some(index)
    }

    pub fn declaration(&self, index: usize) -> Option<&Declaration> {
        self.declarations.get(index)
    }

    pub fn declaration_mut(&mut self, index: usize) -> Option<&mut Declaration> {
        self.declarations.get_mut(index)
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn index_of(&self, id: &DeclarationId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn declaration_by_id(&self, id: &DeclarationId) -> Option<&Declaration> {
        self.index_of(id).and_then(|index| self.declarations.get(index))
    }

    pub fn declaration_by_id_mut(&mut self, id: &DeclarationId) -> Option<&mut Declaration> {
        let index = self.index_of(id)?;
        self.declarations.get_mut(index)
    }

    /// Declarations made directly in `context`, in build order.
    pub fn local_declarations(&self, context: usize) -> impl Iterator<Item = &Declaration> {
        self.contexts
            .get(context)
            .into_iter()
            .flat_map(|context| context.local_declarations.iter())
            .filter_map(|index| self.declarations.get(*index))
    }

    pub fn add_use(&mut self, context: usize, span: Span, declaration: DeclarationId) {
        if let Some(context) = self.contexts.get_mut(context) {
            context.uses.push(Use { span, declaration });
        }
    }

    pub fn uses(&self) -> impl Iterator<Item = &Use> {
        self.contexts.iter().flat_map(|context| context.uses.iter())
    }

    pub fn uses_of<'a>(&'a self, id: &'a DeclarationId) -> impl Iterator<Item = &'a Use> {
        self.uses().filter(move |used| used.declaration == *id)
    }

    /// Deepest context whose range covers `position`.
    pub fn innermost_context_at(&self, position: &Position) -> usize {
        let mut current = 0;
        loop {
            let next = self.contexts[current].children.iter().copied().find(|child| {
                self.contexts
                    .get(*child)
                    .is_some_and(|context| context.range.touches(position) && context.range.start != context.range.end)
            });
            match next {
                Some(child) => current = child,
                None => return current,
            }
        }
    }
}

/// Every analysed document, keyed by id.
#[derive(Debug, Default)]
pub struct DUChain {
    documents: HashMap<DocumentId, TopDUContext>,
}

/// The chain as shared between the background workers and queries.
pub type SharedDUChain = Arc<RwLock<DUChain>>;

impl DUChain {
    pub fn new() -> Self {
        DUChain::default()
    }

    pub fn shared() -> SharedDUChain {
        Arc::new(RwLock::new(DUChain::new()))
    }

    /// Stores `top`, returning the context it replaced.
    pub fn insert(&mut self, top: TopDUContext) -> Option<TopDUContext> {
        self.documents.insert(top.document.clone(), top)
    }

    pub fn remove(&mut self, document: &DocumentId) -> Option<TopDUContext> {
        self.documents.remove(document)
    }

    pub fn contains(&self, document: &DocumentId) -> bool {
        self.documents.contains_key(document)
    }

    pub fn top(&self, document: &DocumentId) -> Option<&TopDUContext> {
        self.documents.get(document)
    }

    pub fn top_mut(&mut self, document: &DocumentId) -> Option<&mut TopDUContext> {
        self.documents.get_mut(document)
    }

    pub fn builtins(&self) -> Option<&TopDUContext> {
        self.documents.get(&DocumentId::builtins())
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents.keys()
    }

    pub fn context(&self, context: &ContextRef) -> Option<&DUContext> {
        self.top(&context.document)?.context(context.index)
    }

    pub fn declaration(&self, id: &DeclarationId) -> Option<&Declaration> {
        self.top(&id.document)?.declaration_by_id(id)
    }

    pub fn declaration_mut(&mut self, id: &DeclarationId) -> Option<&mut Declaration> {
        self.top_mut(&id.document)?.declaration_by_id_mut(id)
    }

    /// The declaration at `position`: either declared there or used there.
    pub fn declaration_at(&self, document: &DocumentId, position: &Position) -> Option<&Declaration> {
        let top = self.top(document)?;
        if let Some(declaration) = top
            .declarations()
            .iter()
            .find(|declaration| declaration.range.touches(position))
        {
            return Some(declaration);
        }

        let used = top.uses().find(|used| used.span.touches(position))?;
        self.declaration(&used.declaration)
    }
}

impl HintValidity for DUChain {
    fn document_revision(&self, document: &DocumentId) -> Option<Revision> {
        self.top(document).map(|top| top.revision)
    }

    fn imports_transitively(&self, viewing: &DocumentId, origin: &DocumentId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([viewing.clone()]);

        while let Some(document) = queue.pop_front() {
            if !visited.insert(document.clone()) {
                continue;
            }
            let Some(top) = self.top(&document) else {
                continue;
            };
            if top.imported_documents.contains(origin) {
                return true;
            }
            queue.extend(top.imported_documents.iter().cloned());
        }

        false
    }
}
