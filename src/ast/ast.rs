use crate::Span;

use super::statements::Stmt;

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A name introduced by a definition or referenced by an attribute access.
///
/// Carries its own span, narrower than the span of the enclosing node, so
/// declarations point at the name rather than at the whole `def`/`class`.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Identifier {
            name: name.into(),
            span,
        }
    }
}
