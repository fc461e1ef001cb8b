use std::fmt::Display;

use crate::{ast::expressions::ParameterKind, types::types::AbstractType, Position, Span};

use super::duchain::DocumentId;

/// Stable identity of a declaration.
///
/// The disambiguator counts earlier declarations with the same qualified
/// identifier in the same document, so rebuilding an edited document that
/// keeps a declaration in place yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclarationId {
    pub document: DocumentId,
    pub qualified: String,
    pub disambiguator: u32,
}

impl DeclarationId {
    pub fn new(document: DocumentId, qualified: impl Into<String>, disambiguator: u32) -> Self {
        DeclarationId {
            document,
            qualified: qualified.into(),
            disambiguator,
        }
    }
}

impl Display for DeclarationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}#{}", self.document, self.qualified, self.disambiguator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Instance,
    /// A class.
    Type,
    /// An imported module.
    Namespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPolicy {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseClass {
    pub class: DeclarationId,
    pub access: AccessPolicy,
}

/// A decorator as written on a definition, e.g. `@typeOfArg(1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorator {
    pub name: String,
    pub arguments: Vec<String>,
}

impl Decorator {
    /// The first argument read as an index.
    pub fn index_argument(&self) -> Option<usize> {
        self.arguments.first().and_then(|argument| argument.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub id: DeclarationId,
    pub name: String,
    /// Index of the owning context in the declaration's top context.
    pub context: usize,
    /// Range of the identifier.
    pub range: Span,
    /// Lookups positioned before this point do not see the declaration.
    pub visible_from: Position,
    pub kind: DeclarationKind,
    pub abstract_type: AbstractType,
    pub is_function: bool,
    /// Class body, function body or module namespace owned by this declaration.
    pub internal_context: Option<usize>,
    /// Set on alias declarations (`import x as y`, `from m import a`).
    pub alias_of: Option<DeclarationId>,
    pub base_classes: Vec<BaseClass>,
    pub decorators: Vec<Decorator>,
    /// Parameters that appear as a bare `return <parameter>` in the body.
    pub returned_parameters: Vec<DeclarationId>,
    /// Set on function parameters.
    pub parameter: Option<ParameterKind>,
}

impl Declaration {
    pub fn new(
        id: DeclarationId,
        name: impl Into<String>,
        context: usize,
        range: Span,
        kind: DeclarationKind,
        abstract_type: AbstractType,
    ) -> Self {
        Declaration {
            id,
            name: name.into(),
            context,
            range,
            visible_from: range.end,
            kind,
            abstract_type,
            is_function: false,
            internal_context: None,
            alias_of: None,
            base_classes: vec![],
            decorators: vec![],
            returned_parameters: vec![],
            parameter: None,
        }
    }

    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }

    pub fn is_visible_at(&self, position: &Position) -> bool {
        !position.before(&self.visible_from)
    }

    pub fn decorator(&self, name: &str) -> Option<&Decorator> {
        self.decorators.iter().find(|decorator| decorator.name == name)
    }

    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorator(name).is_some()
    }

    pub fn is_static_method(&self) -> bool {
        self.has_decorator("staticmethod")
    }

    pub fn is_class_method(&self) -> bool {
        self.has_decorator("classmethod")
    }

    pub fn is_property(&self) -> bool {
        self.has_decorator("property")
    }
}
