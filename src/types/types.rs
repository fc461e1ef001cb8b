use std::fmt::Display;

use crate::duchain::{declaration::DeclarationId, duchain::DocumentId};

/// Maximum number of members an [`UnsureType`] holds.
pub const MAX_UNSURE_MEMBERS: usize = 7;

/// Modification revision of a document, as reported by its source.
pub type Revision = u64;

/// The inferred type of a declaration or expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbstractType {
    Integral(IntegralKind),
    /// An instance of a class, or the class object itself depending on the
    /// kind of the declaration carrying it.
    Structure(StructureType),
    Function(FunctionType),
    List(ListType),
    /// Fixed arity container (`tuple`) with one type per slot.
    IndexedContainer(IndexedContainerType),
    Unsure(UnsureType),
    Hinted(HintedType),
    Alias(AliasType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegralKind {
    Int,
    Float,
    Bool,
    Str,
    Bytes,
    None,
    Void,
    /// Catch-all for anything that could not be inferred.
    Mixed,
}

impl IntegralKind {
    pub fn name(&self) -> &'static str {
        match self {
            IntegralKind::Int => "int",
            IntegralKind::Float => "float",
            IntegralKind::Bool => "bool",
            IntegralKind::Str => "str",
            IntegralKind::Bytes => "bytes",
            IntegralKind::None => "None",
            IntegralKind::Void => "void",
            IntegralKind::Mixed => "mixed",
        }
    }

    /// Integral kinds that are backed by a builtin class of the same name.
    pub fn from_class_name(name: &str) -> Option<IntegralKind> {
        match name {
            "int" => Some(IntegralKind::Int),
            "float" => Some(IntegralKind::Float),
            "bool" => Some(IntegralKind::Bool),
            "str" => Some(IntegralKind::Str),
            "bytes" => Some(IntegralKind::Bytes),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, IntegralKind::Int | IntegralKind::Float | IntegralKind::Bool)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureType {
    pub declaration: DeclarationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub declaration: Option<DeclarationId>,
    pub return_type: Box<AbstractType>,
    pub arguments: Vec<AbstractType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    List,
    Set,
    Dict,
}

impl ListKind {
    pub fn name(&self) -> &'static str {
        match self {
            ListKind::List => "list",
            ListKind::Set => "set",
            ListKind::Dict => "dict",
        }
    }

    pub fn from_class_name(name: &str) -> Option<ListKind> {
        match name {
            "list" => Some(ListKind::List),
            "set" => Some(ListKind::Set),
            "dict" => Some(ListKind::Dict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListType {
    pub kind: ListKind,
    pub content: Option<Box<AbstractType>>,
    /// Only used by `dict`.
    pub key: Option<Box<AbstractType>>,
}

impl ListType {
    pub fn new(kind: ListKind) -> Self {
        ListType {
            kind,
            content: None,
            key: None,
        }
    }

    /// Merges `ty` into the content type, widening it if needed.
    pub fn add_content(&mut self, ty: AbstractType) {
        let merged = match self.content.take() {
            Some(existing) => super::merge::merge(*existing, ty),
            None => ty,
        };
        self.content = Some(Box::new(merged));
    }

    pub fn add_key(&mut self, ty: AbstractType) {
        let merged = match self.key.take() {
            Some(existing) => super::merge::merge(*existing, ty),
            None => ty,
        };
        self.key = Some(Box::new(merged));
    }

    pub fn content_type(&self) -> AbstractType {
        self.content.as_deref().cloned().unwrap_or_else(AbstractType::mixed)
    }

    pub fn key_type(&self) -> AbstractType {
        self.key.as_deref().cloned().unwrap_or_else(AbstractType::mixed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedContainerType {
    pub slots: Vec<AbstractType>,
}

impl IndexedContainerType {
    /// Slot lookup; negative indices count from the end.
    pub fn slot(&self, index: i64) -> Option<&AbstractType> {
        let len = self.slots.len() as i64;
        let index = if index < 0 { len + index } else { index };
        if (0..len).contains(&index) {
            self.slots.get(index as usize)
        } else {
            None
        }
    }
}

/// A bounded set of candidate types.
///
/// Equality ignores member order.
#[derive(Debug, Clone, Eq)]
pub struct UnsureType {
    members: Vec<AbstractType>,
}

impl UnsureType {
    pub fn new() -> Self {
        UnsureType { members: vec![] }
    }

    pub fn members(&self) -> &[AbstractType] {
        &self.members
    }

    pub fn contains(&self, ty: &AbstractType) -> bool {
        self.members.contains(ty)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_UNSURE_MEMBERS
    }

    /// Adds `ty` unless it is already present or the set is full.
    ///
    /// Returns false when the member was dropped because of the cap.
    pub fn add(&mut self, ty: AbstractType) -> bool {
        if self.contains(&ty) {
            return true;
        }
        if self.is_full() {
            return false;
        }
        self.members.push(ty);
        true
    }

    pub fn into_members(self) -> Vec<AbstractType> {
        self.members
    }
}

impl Default for UnsureType {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for UnsureType {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len() && self.members.iter().all(|member| other.contains(member))
    }
}

/// A type observed at a call site in `origin` while it was at `revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintedType {
    pub target: Box<AbstractType>,
    pub origin: DocumentId,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasType {
    pub name: String,
    pub target: Box<AbstractType>,
}

impl AbstractType {
    pub fn mixed() -> Self {
        AbstractType::Integral(IntegralKind::Mixed)
    }

    pub fn void() -> Self {
        AbstractType::Integral(IntegralKind::Void)
    }

    pub fn integral(kind: IntegralKind) -> Self {
        AbstractType::Integral(kind)
    }

    pub fn structure(declaration: DeclarationId, name: impl Into<String>) -> Self {
        AbstractType::Structure(StructureType {
            declaration,
            name: name.into(),
        })
    }

    pub fn list_of(kind: ListKind, content: Option<AbstractType>) -> Self {
        AbstractType::List(ListType {
            kind,
            content: content.map(Box::new),
            key: None,
        })
    }

    pub fn dict_of(key: AbstractType, value: AbstractType) -> Self {
        AbstractType::List(ListType {
            kind: ListKind::Dict,
            content: Some(Box::new(value)),
            key: Some(Box::new(key)),
        })
    }

    pub fn tuple_of(slots: Vec<AbstractType>) -> Self {
        AbstractType::IndexedContainer(IndexedContainerType { slots })
    }

    pub fn hinted(target: AbstractType, origin: DocumentId, revision: Revision) -> Self {
        AbstractType::Hinted(HintedType {
            target: Box::new(target),
            origin,
            revision,
        })
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, AbstractType::Integral(IntegralKind::Mixed))
    }

    /// Useless types carry no information and vanish when merged.
    pub fn is_useless(&self) -> bool {
        self.is_mixed()
    }

    pub fn as_list(&self) -> Option<&ListType> {
        match self {
            AbstractType::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            AbstractType::Function(function) => Some(function),
            _ => None,
        }
    }

    /// Name of the builtin class backing values of this type, if any.
    pub fn builtin_class_name(&self) -> Option<&'static str> {
        match self {
            AbstractType::Integral(kind) => match kind {
                IntegralKind::Int
                | IntegralKind::Float
                | IntegralKind::Bool
                | IntegralKind::Str
                | IntegralKind::Bytes => Some(kind.name()),
                _ => None,
            },
            AbstractType::List(list) => Some(list.kind.name()),
            AbstractType::IndexedContainer(_) => Some("tuple"),
            AbstractType::Function(_) => Some("function"),
            _ => None,
        }
    }
}

impl Display for AbstractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbstractType::Integral(kind) => write!(f, "{}", kind.name()),
            AbstractType::Structure(structure) => write!(f, "{}", structure.name),
            AbstractType::Function(function) => {
                let arguments: Vec<String> = function.arguments.iter().map(|arg| arg.to_string()).collect();
                write!(f, "{} ({})", function.return_type, arguments.join(", "))
            }
            AbstractType::List(list) => match (&list.key, &list.content) {
                (Some(key), Some(content)) => write!(f, "{} of {} : {}", list.kind.name(), key, content),
                (Some(key), None) => write!(f, "{} of {} : mixed", list.kind.name(), key),
                (None, Some(content)) => write!(f, "{} of {}", list.kind.name(), content),
                (None, None) => write!(f, "{}", list.kind.name()),
            },
            AbstractType::IndexedContainer(container) => {
                if container.slots.is_empty() {
                    return write!(f, "tuple");
                }
                let slots: Vec<String> = container.slots.iter().map(|slot| slot.to_string()).collect();
                write!(f, "tuple of ({})", slots.join(", "))
            }
            AbstractType::Unsure(unsure) => {
                let mut members: Vec<String> = unsure.members().iter().map(|member| member.to_string()).collect();
                members.sort();
                members.dedup();
                if members.len() == 1 {
                    return write!(f, "{}", members[0]);
                }
                write!(f, "unsure ({})", members.join(", "))
            }
            AbstractType::Hinted(hinted) => write!(f, "{}", hinted.target),
            AbstractType::Alias(alias) => write!(f, "{}", alias.target),
        }
    }
}
