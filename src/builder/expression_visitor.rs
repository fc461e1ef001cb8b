use crate::{
    ast::expressions::{BinaryOperator, Expr, ExprKind, UnaryOperator},
    duchain::{
        context::{ContextKind, ContextRef},
        declaration::{Declaration, DeclarationId, DeclarationKind},
        duchain::{DUChain, DocumentId},
        lookup::{access_attribute, access_attribute_of_type, resolve_alias_declaration},
    },
    helpers::helpers::{
        content_of_iterable, declaration_for_name, function_declaration_for_called_declaration, merged_history_type,
        visible_type,
    },
    types::{
        merge::{candidates, extract_hints, has_hints, merge, merge_all, unwrap_hints},
        types::{AbstractType, FunctionType, IntegralKind, ListKind, ListType},
    },
    Span,
};

/// The type of an expression and the declaration it refers to, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionResult {
    pub ty: AbstractType,
    pub declaration: Option<DeclarationId>,
}

impl ExpressionResult {
    fn of(ty: AbstractType) -> Self {
        ExpressionResult { ty, declaration: None }
    }

    fn mixed() -> Self {
        ExpressionResult::of(AbstractType::mixed())
    }
}

/// Computes expression types against the current state of the chain.
///
/// Names are resolved from `context`; comprehensions and lambdas are
/// evaluated inside the contexts the declaration builder opened for them.
#[derive(Clone)]
pub struct ExpressionVisitor<'a> {
    chain: &'a DUChain,
    context: ContextRef,
}

impl<'a> ExpressionVisitor<'a> {
    pub fn new(chain: &'a DUChain, context: ContextRef) -> Self {
        ExpressionVisitor { chain, context }
    }

    pub fn document(&self) -> &DocumentId {
        &self.context.document
    }

    pub fn type_of(&self, expr: &Expr) -> AbstractType {
        self.evaluate(expr).ty
    }

    pub fn evaluate(&self, expr: &Expr) -> ExpressionResult {
        match &expr.kind {
            ExprKind::Number(_) => ExpressionResult::of(AbstractType::integral(IntegralKind::Int)),
            ExprKind::Float(_) => ExpressionResult::of(AbstractType::integral(IntegralKind::Float)),
            ExprKind::String(_) => ExpressionResult::of(AbstractType::integral(IntegralKind::Str)),
            ExprKind::Bytes(_) => ExpressionResult::of(AbstractType::integral(IntegralKind::Bytes)),
            ExprKind::Bool(_) => ExpressionResult::of(AbstractType::integral(IntegralKind::Bool)),
            ExprKind::None => ExpressionResult::of(AbstractType::integral(IntegralKind::None)),
            ExprKind::Ellipsis | ExprKind::Yield(_) | ExprKind::Slice { .. } => ExpressionResult::mixed(),
            ExprKind::Name(name) => self.evaluate_name(name, expr.span),
            ExprKind::Attribute { value, attribute } => self.evaluate_attribute(value, &attribute.name),
            ExprKind::Call {
                callee, arguments, ..
            } => self.evaluate_call(callee, arguments),
            ExprKind::Subscript { value, index } => ExpressionResult::of(self.subscript_type(value, index)),
            ExprKind::Starred(inner) => self.evaluate(inner),
            ExprKind::List(items) => {
                ExpressionResult::of(AbstractType::list_of(ListKind::List, self.display_content(items)))
            }
            ExprKind::Set(items) => ExpressionResult::of(AbstractType::list_of(ListKind::Set, self.display_content(items))),
            ExprKind::Tuple(items) => {
                ExpressionResult::of(AbstractType::tuple_of(items.iter().map(|item| self.type_of(item)).collect()))
            }
            ExprKind::Dict(items) => {
                let mut dict = ListType::new(ListKind::Dict);
                for (key, value) in items {
                    dict.add_key(self.type_of(key));
                    dict.add_content(self.type_of(value));
                }
                ExpressionResult::of(AbstractType::List(dict))
            }
            ExprKind::ListComp { element, .. } | ExprKind::Generator { element, .. } => {
                let content = self.nested(expr.span).type_of(element);
                ExpressionResult::of(AbstractType::list_of(ListKind::List, Some(content)))
            }
            ExprKind::SetComp { element, .. } => {
                let content = self.nested(expr.span).type_of(element);
                ExpressionResult::of(AbstractType::list_of(ListKind::Set, Some(content)))
            }
            ExprKind::DictComp { key, value, .. } => {
                let inner = self.nested(expr.span);
                ExpressionResult::of(AbstractType::dict_of(inner.type_of(key), inner.type_of(value)))
            }
            ExprKind::Lambda { parameters, body } => {
                let return_type = self.nested(expr.span).type_of(body);
                ExpressionResult::of(AbstractType::Function(FunctionType {
                    declaration: None,
                    return_type: Box::new(return_type),
                    arguments: parameters.iter().map(|_| AbstractType::mixed()).collect(),
                }))
            }
            ExprKind::Binary { left, operator, right } => {
                ExpressionResult::of(self.binary_type(&self.type_of(left), *operator, &self.type_of(right)))
            }
            ExprKind::Unary { operator, operand } => match operator {
                UnaryOperator::Not => ExpressionResult::of(AbstractType::integral(IntegralKind::Bool)),
                _ => ExpressionResult::of(self.type_of(operand)),
            },
            ExprKind::Compare { .. } => ExpressionResult::of(AbstractType::integral(IntegralKind::Bool)),
            ExprKind::BoolOp { left, right, .. } => {
                ExpressionResult::of(merge(self.type_of(left), self.type_of(right)))
            }
            ExprKind::IfExpr { body, orelse, .. } => {
                ExpressionResult::of(merge(self.type_of(body), self.type_of(orelse)))
            }
        }
    }

    /// The declaration `expr` refers to, with aliases resolved.
    pub fn declaration_of(&self, expr: &Expr) -> Option<&'a Declaration> {
        let id = self.evaluate(expr).declaration?;
        self.chain.declaration(&id)
    }

    fn evaluate_name(&self, name: &str, span: Span) -> ExpressionResult {
        let Some(declaration) = declaration_for_name(self.chain, name, Some(span.start), &self.context) else {
            return ExpressionResult::mixed();
        };
        self.refer_to(resolve_alias_declaration(self.chain, declaration))
    }

    fn refer_to(&self, declaration: &Declaration) -> ExpressionResult {
        let ty = if declaration.is_property() {
            self.call_return_type(declaration)
        } else if declaration.kind == DeclarationKind::Instance && !declaration.is_function {
            merged_history_type(self.chain, declaration)
        } else {
            declaration.abstract_type.clone()
        };

        ExpressionResult {
            ty,
            declaration: Some(declaration.id.clone()),
        }
    }

    fn evaluate_attribute(&self, value: &Expr, attribute: &str) -> ExpressionResult {
        let base = self.evaluate(value);
        let receiver = base.declaration.as_ref().and_then(|id| self.chain.declaration(id));

        let member = match receiver {
            Some(receiver) if receiver.kind == DeclarationKind::Namespace => {
                access_attribute(self.chain, receiver, attribute)
            }
            _ => access_attribute_of_type(self.chain, &base.ty, attribute),
        };

        match member {
            Some(member) => self.refer_to(resolve_alias_declaration(self.chain, member)),
            None => ExpressionResult::mixed(),
        }
    }

    fn evaluate_call(&self, callee: &Expr, arguments: &[Expr]) -> ExpressionResult {
        let called = self.evaluate(callee);
        let Some(declaration) = called.declaration.as_ref().and_then(|id| self.chain.declaration(id)) else {
            return match &called.ty {
                AbstractType::Function(function) => ExpressionResult::of(unwrap_hints(&function.return_type)),
                _ => ExpressionResult::mixed(),
            };
        };

        if declaration.kind == DeclarationKind::Type {
            if let Some(ty) = self.builtin_constructor_type(declaration, arguments) {
                return ExpressionResult::of(ty);
            }
            return ExpressionResult::of(declaration.abstract_type.clone());
        }

        let (function, _) = function_declaration_for_called_declaration(self.chain, declaration);
        if !function.is_function {
            return match &called.ty {
                AbstractType::Function(function) => ExpressionResult::of(unwrap_hints(&function.return_type)),
                _ => ExpressionResult::mixed(),
            };
        }

        let receiver = match &callee.kind {
            ExprKind::Attribute { value, .. } => Some(self.type_of(value)),
            _ => None,
        };
        if let Some(ty) = self.decorated_call_type(function, receiver.as_ref(), arguments) {
            return ExpressionResult::of(ty);
        }

        ExpressionResult::of(self.call_return_type(function))
    }

    /// `list(x)`, `set(x)`, `dict(x)` and `tuple(x)` adopt the content of `x`.
    fn builtin_constructor_type(&self, class: &Declaration, arguments: &[Expr]) -> Option<AbstractType> {
        if !class.id.document.is_builtins() {
            return None;
        }
        let argument = arguments.first()?;
        let argument_type = self.type_of(argument);

        match class.name.as_str() {
            "list" | "set" => {
                let kind = ListKind::from_class_name(&class.name)?;
                let content = content_of_iterable(self.chain, &argument_type);
                Some(AbstractType::list_of(kind, (!content.is_mixed()).then_some(content)))
            }
            "dict" => candidates(&argument_type)
                .into_iter()
                .find(|candidate| matches!(candidate.as_list(), Some(list) if list.kind == ListKind::Dict)),
            "tuple" => candidates(&argument_type)
                .into_iter()
                .find(|candidate| matches!(candidate, AbstractType::IndexedContainer(_))),
            _ => None,
        }
    }

    /// Return types described by decorators of the builtin documentation.
    fn decorated_call_type(
        &self,
        function: &Declaration,
        receiver: Option<&AbstractType>,
        arguments: &[Expr],
    ) -> Option<AbstractType> {
        for decorator in &function.decorators {
            let ty = match decorator.name.as_str() {
                "getsType" => receiver.map(|receiver| self.container_content(receiver)),
                "getsList" => receiver.map(|receiver| {
                    let content = self.container_content(receiver);
                    AbstractType::list_of(ListKind::List, (!content.is_mixed()).then_some(content))
                }),
                "getsListOfKeys" => receiver.map(|receiver| {
                    let keys = merge_all(
                        candidates(receiver)
                            .iter()
                            .filter_map(|candidate| candidate.as_list().map(|list| list.key_type())),
                    );
                    AbstractType::list_of(ListKind::List, (!keys.is_mixed()).then_some(keys))
                }),
                "getsListOfBoth" => receiver.map(|receiver| {
                    let pairs = merge_all(candidates(receiver).iter().filter_map(|candidate| {
                        let list = candidate.as_list()?;
                        Some(AbstractType::tuple_of(vec![list.key_type(), list.content_type()]))
                    }));
                    AbstractType::list_of(ListKind::List, (!pairs.is_mixed()).then_some(pairs))
                }),
                "enumeratesContentOf" => {
                    let argument = arguments.get(decorator.index_argument()?)?;
                    let content = content_of_iterable(self.chain, &self.type_of(argument));
                    let pair = AbstractType::tuple_of(vec![AbstractType::integral(IntegralKind::Int), content]);
                    Some(AbstractType::list_of(ListKind::List, Some(pair)))
                }
                "zipsContents" => {
                    let slots = arguments
                        .iter()
                        .map(|argument| content_of_iterable(self.chain, &self.type_of(argument)))
                        .collect();
                    Some(AbstractType::list_of(ListKind::List, Some(AbstractType::tuple_of(slots))))
                }
                "returnContentEqualsContentOf" => {
                    let argument = arguments.get(decorator.index_argument()?)?;
                    let content = content_of_iterable(self.chain, &self.type_of(argument));
                    Some(AbstractType::list_of(ListKind::List, (!content.is_mixed()).then_some(content)))
                }
                "typeOfArg" => {
                    let argument = arguments.get(decorator.index_argument()?)?;
                    Some(self.type_of(argument))
                }
                _ => None,
            };
            if ty.is_some() {
                return ty;
            }
        }
        None
    }

    /// Content of a container receiver; dicts give their values.
    fn container_content(&self, ty: &AbstractType) -> AbstractType {
        merge_all(candidates(ty).iter().map(|candidate| match candidate {
            AbstractType::List(list) => list.content_type(),
            AbstractType::IndexedContainer(container) => merge_all(container.slots.iter().cloned()),
            _ => AbstractType::mixed(),
        }))
    }

    /// What calling `function` gives when seen from this document.
    ///
    /// The declared return type as seen from here, plus the hints of
    /// directly returned parameters that are valid here.
    pub fn call_return_type(&self, function: &Declaration) -> AbstractType {
        let Some(function_type) = function.abstract_type.as_function() else {
            return AbstractType::mixed();
        };

        let mut ty = visible_type(self.chain, &function_type.return_type, self.document());

        for parameter in &function.returned_parameters {
            if let Some(parameter) = self.chain.declaration(parameter) {
                let hinted = extract_hints(&parameter.abstract_type, self.document(), self.chain);
                if has_hints(&hinted) {
                    ty = merge(ty, unwrap_hints(&hinted));
                }
            }
        }

        ty
    }

    fn subscript_type(&self, value: &Expr, index: &Expr) -> AbstractType {
        let base = self.type_of(value);
        if matches!(index.kind, ExprKind::Slice { .. }) {
            return base;
        }
        let literal_index = integer_literal(index);

        merge_all(candidates(&base).iter().map(|candidate| match candidate {
            AbstractType::List(list) => list.content_type(),
            AbstractType::IndexedContainer(container) => match literal_index {
                Some(index) => container.slot(index).cloned().unwrap_or_else(AbstractType::mixed),
                None => merge_all(container.slots.iter().cloned()),
            },
            AbstractType::Integral(IntegralKind::Str) => AbstractType::integral(IntegralKind::Str),
            AbstractType::Integral(IntegralKind::Bytes) => AbstractType::integral(IntegralKind::Int),
            AbstractType::Structure(_) => match access_attribute_of_type(self.chain, candidate, "__getitem__") {
                Some(getitem) => self.call_return_type(getitem),
                None => AbstractType::mixed(),
            },
            _ => AbstractType::mixed(),
        }))
    }

    fn display_content(&self, items: &[Expr]) -> Option<AbstractType> {
        let content = merge_all(items.iter().map(|item| match &item.kind {
            ExprKind::Starred(inner) => content_of_iterable(self.chain, &self.type_of(inner)),
            _ => self.type_of(item),
        }));
        (!content.is_mixed()).then_some(content)
    }

    /// Result of `left <operator> right`.
    ///
    /// Every candidate of the left operand contributes: user classes through
    /// their special method, builtin values through the usual promotions.
    /// Without any answer the right operand's type is used if it is useful,
    /// the left one otherwise.
    pub fn binary_type(&self, left: &AbstractType, operator: BinaryOperator, right: &AbstractType) -> AbstractType {
        let mut result = AbstractType::mixed();

        for candidate in candidates(left) {
            let ty = match &candidate {
                AbstractType::Structure(_) => {
                    match access_attribute_of_type(self.chain, &candidate, operator.method_name()) {
                        Some(method) if method.is_function => self.call_return_type(method),
                        _ => AbstractType::mixed(),
                    }
                }
                _ => merge_all(
                    candidates(right)
                        .iter()
                        .map(|right| builtin_binary_type(&candidate, operator, right)),
                ),
            };
            result = merge(result, ty);
        }

        if !result.is_useless() {
            result
        } else if !right.is_useless() {
            right.clone()
        } else {
            left.clone()
        }
    }

    /// A visitor for the context opened for the comprehension or lambda at `span`.
    fn nested(&self, span: Span) -> ExpressionVisitor<'a> {
        let index = self
            .chain
            .top(&self.context.document)
            .and_then(|top| {
                top.contexts()
                    .iter()
                    .rposition(|context| context.kind == ContextKind::Other && context.range == span)
            })
            .unwrap_or(self.context.index);

        ExpressionVisitor::new(self.chain, ContextRef::new(self.context.document.clone(), index))
    }
}

/// Integer value of `3` or `-3`.
pub fn integer_literal(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Number(value) => value.parse().ok(),
        ExprKind::Unary {
            operator: UnaryOperator::Minus,
            operand,
        } => integer_literal(operand).map(|value| -value),
        _ => None,
    }
}

fn builtin_binary_type(left: &AbstractType, operator: BinaryOperator, right: &AbstractType) -> AbstractType {
    use AbstractType::{IndexedContainer, Integral, List};

    match (left, right) {
        (Integral(left_kind), Integral(right_kind)) if left_kind.is_numeric() && right_kind.is_numeric() => {
            if *left_kind == IntegralKind::Float || *right_kind == IntegralKind::Float || operator == BinaryOperator::Div {
                AbstractType::integral(IntegralKind::Float)
            } else {
                AbstractType::integral(IntegralKind::Int)
            }
        }
        (Integral(IntegralKind::Str), _) if operator == BinaryOperator::Mod => AbstractType::integral(IntegralKind::Str),
        (Integral(kind @ (IntegralKind::Str | IntegralKind::Bytes)), Integral(right_kind))
            if (operator == BinaryOperator::Add && right_kind == kind)
                || (operator == BinaryOperator::Mul && *right_kind == IntegralKind::Int) =>
        {
            AbstractType::integral(*kind)
        }
        (List(left_list), List(right_list)) if operator == BinaryOperator::Add && left_list.kind == right_list.kind => {
            let mut list = left_list.clone();
            if let Some(content) = right_list.content.as_deref() {
                list.add_content(content.clone());
            }
            List(list)
        }
        (IndexedContainer(left_tuple), IndexedContainer(right_tuple)) if operator == BinaryOperator::Add => {
            AbstractType::tuple_of(left_tuple.slots.iter().chain(right_tuple.slots.iter()).cloned().collect())
        }
        (List(_) | IndexedContainer(_), Integral(IntegralKind::Int)) if operator == BinaryOperator::Mul => left.clone(),
        _ => AbstractType::mixed(),
    }
}
