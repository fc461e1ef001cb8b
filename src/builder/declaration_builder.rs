use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::{
    ast::{
        ast::{Identifier, Module},
        expressions::{
            BoolOperator, CompareOperator, Comprehension, Expr, ExprKind, Keyword, Parameter, ParameterKind, UnaryOperator,
        },
        statements::{ClassDef, ExceptHandler, FunctionDef, ImportAlias, Stmt, StmtKind, WithItem},
    },
    duchain::{
        context::{ContextKind, ContextRef},
        declaration::{AccessPolicy, BaseClass, Declaration, DeclarationId, DeclarationKind, Decorator},
        duchain::{DUChain, DocumentId, TopDUContext},
        lookup::{access_attribute_of_type, find_local_declarations, SearchFlags},
    },
    errors::errors::{Error, ErrorImpl},
    helpers::{
        helpers::{
            content_of_iterable, declaration_for_name, function_declaration_for_called_declaration, is_class_member,
        },
        imports::ModuleResolver,
    },
    types::{
        merge::{candidates, filter_hints, hint_members, merge, merge_all, unwrap_hints, HintValidity},
        types::{AbstractType, FunctionType, IntegralKind, ListKind, ListType, Revision},
    },
    Position, Span,
};

use super::{expression_visitor::ExpressionVisitor, use_builder::UseBuilder};

/// Hints collected for parameters, keyed by the parameter declaration.
pub type HintMap = HashMap<DeclarationId, AbstractType>;

/// What a finished build asks of its caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOutcome {
    /// Imported documents that exist but are not in the chain yet.
    pub missing_dependencies: Vec<DocumentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Collects call-site hints; its tree and problems are thrown away.
    Prebuild,
    Final,
}

/// Builds the declarations and uses of one document.
///
/// The new tree is built into a staged top context that is only in the
/// chain while a phase runs; in between, and until
/// [`DocumentBuild::finish`] publishes it, the chain holds the previously
/// published top of the document. Callers run every phase under one write
/// lock, so readers never see a half built document.
///
/// The phases run in order: [`DocumentBuild::begin`] prepares an empty
/// staged top, [`DocumentBuild::prebuild`] walks the module once to learn
/// parameter hints from calls made in the document itself,
/// [`DocumentBuild::build`] walks it again for real and
/// [`DocumentBuild::build_uses`] records uses. [`DocumentBuild::abort`]
/// drops the staged tree at any point before [`DocumentBuild::finish`].
pub struct DocumentBuild<'m> {
    document: DocumentId,
    revision: Revision,
    module: &'m Module,
    syntax_errors: Vec<Error>,
    staged: Option<TopDUContext>,
    /// The published top, held here only while a phase runs.
    old_top: Option<TopDUContext>,
    prebuilt_hints: HintMap,
    missing_dependencies: Vec<DocumentId>,
    uses_built: bool,
}

struct PassOutput {
    local_hints: HintMap,
    foreign_hints: HintMap,
    problems: Vec<Error>,
    missing_dependencies: Vec<DocumentId>,
}

impl<'m> DocumentBuild<'m> {
    pub fn new(document: DocumentId, revision: Revision, module: &'m Module, syntax_errors: Vec<Error>) -> Self {
        DocumentBuild {
            document,
            revision,
            module,
            syntax_errors,
            staged: None,
            old_top: None,
            prebuilt_hints: HintMap::new(),
            missing_dependencies: vec![],
            uses_built: false,
        }
    }

    pub fn begin(&mut self) {
        debug!("building {} at revision {}", self.document, self.revision);
        self.staged = Some(self.fresh_top());
    }

    pub fn prebuild(&mut self, chain: &mut DUChain, resolver: Option<&ModuleResolver<'_>>) {
        self.stage(chain);
        let output = self.run_pass(chain, resolver, Pass::Prebuild);
        self.unstage(chain);

        trace!("{} local hints collected in {}", output.local_hints.len(), self.document);
        self.prebuilt_hints = output.local_hints;
        self.staged = Some(self.fresh_top());
        self.write_foreign_hints(chain, output.foreign_hints);
    }

    pub fn build(&mut self, chain: &mut DUChain, resolver: Option<&ModuleResolver<'_>>) {
        self.stage(chain);
        let output = self.run_pass(chain, resolver, Pass::Final);
        if let Some(top) = chain.top_mut(&self.document) {
            top.problems = self.syntax_errors.clone();
            top.problems.extend(output.problems);
            top.features.declarations = true;
        }
        self.unstage(chain);

        self.write_foreign_hints(chain, output.foreign_hints);
        self.missing_dependencies = output.missing_dependencies;
    }

    pub fn build_uses(&mut self, chain: &mut DUChain) {
        self.stage(chain);
        let uses = UseBuilder::new(chain, self.document.clone()).build(&self.module.body);
        if let Some(top) = chain.top_mut(&self.document) {
            for (context, span, declaration) in uses {
                top.add_use(context, span, declaration);
            }
        }
        self.unstage(chain);
        self.uses_built = true;
    }

    /// Drops everything built so far; the published top stays as it is.
    pub fn abort(self) {
        debug!("aborting build of {}", self.document);
    }

    /// Publishes the staged top in place of the previous one.
    pub fn finish(mut self, chain: &mut DUChain) -> BuildOutcome {
        let mut top = self.staged.take().unwrap_or_else(|| self.fresh_top());
        top.features.uses = self.uses_built;
        chain.insert(top);
        BuildOutcome {
            missing_dependencies: self.missing_dependencies,
        }
    }

    /// Puts the staged top into the chain and holds on to the published one.
    fn stage(&mut self, chain: &mut DUChain) {
        let staged = self.staged.take().unwrap_or_else(|| self.fresh_top());
        self.old_top = chain.insert(staged);
    }

    /// Takes the staged top back out and republishes the previous one.
    fn unstage(&mut self, chain: &mut DUChain) {
        self.staged = chain.remove(&self.document);
        if let Some(old_top) = self.old_top.take() {
            chain.insert(old_top);
        }
    }

    /// Replaces the hints this document left on other documents' parameters.
    fn write_foreign_hints(&self, chain: &mut DUChain, hints: HintMap) {
        for (id, collected) in hints {
            let Some(declaration) = chain.declaration_mut(&id) else {
                continue;
            };
            trace!("hinting {} with {}", id, collected);
            let kept = filter_hints(&declaration.abstract_type, |origin, _| *origin != self.document);
            declaration.abstract_type = merge(kept, collected);
        }
    }

    fn fresh_top(&self) -> TopDUContext {
        TopDUContext::new(self.document.clone(), self.revision, self.module.span)
    }

    fn run_pass(&self, chain: &mut DUChain, resolver: Option<&ModuleResolver<'_>>, pass: Pass) -> PassOutput {
        let mut builder = DeclarationBuilder {
            chain,
            document: self.document.clone(),
            revision: self.revision,
            resolver,
            pass,
            old_top: self.old_top.as_ref(),
            prebuilt_hints: &self.prebuilt_hints,
            local_hints: HintMap::new(),
            foreign_hints: HintMap::new(),
            context: 0,
            counters: HashMap::new(),
            functions: vec![],
            problems: vec![],
            missing_dependencies: vec![],
        };
        builder.visit_body(&self.module.body);

        PassOutput {
            local_hints: builder.local_hints,
            foreign_hints: builder.foreign_hints,
            problems: builder.problems,
            missing_dependencies: builder.missing_dependencies,
        }
    }
}

/// Runs every build phase for `module` in one go.
pub fn build_document(
    chain: &mut DUChain,
    document: DocumentId,
    revision: Revision,
    module: &Module,
    syntax_errors: Vec<Error>,
    resolver: Option<&ModuleResolver<'_>>,
) -> BuildOutcome {
    let mut build = DocumentBuild::new(document, revision, module, syntax_errors);
    build.begin();
    build.prebuild(chain, resolver);
    build.build(chain, resolver);
    build.build_uses(chain);
    build.finish(chain)
}

struct FunctionFrame {
    parameters: Vec<DeclarationId>,
    returns: AbstractType,
    has_return: bool,
    bare_return: bool,
    yields: AbstractType,
    has_yield: bool,
    returned_parameters: Vec<DeclarationId>,
    globals: HashSet<String>,
}

impl FunctionFrame {
    fn new(parameters: Vec<DeclarationId>) -> Self {
        FunctionFrame {
            parameters,
            returns: AbstractType::mixed(),
            has_return: false,
            bare_return: false,
            yields: AbstractType::mixed(),
            has_yield: false,
            returned_parameters: vec![],
            globals: HashSet::new(),
        }
    }

    /// `stub` bodies are placeholders; their annotation is the whole answer.
    fn return_type(&self, annotation: Option<AbstractType>, stub: bool) -> AbstractType {
        let mut returns = self.returns.clone();
        if self.bare_return && !self.has_yield {
            returns = merge(returns, AbstractType::integral(IntegralKind::None));
        }

        if self.has_yield {
            let yields = (!self.yields.is_mixed()).then(|| self.yields.clone());
            let generator = AbstractType::list_of(ListKind::List, yields);
            return merge(generator, returns);
        }

        match (self.has_return, annotation) {
            (false, Some(annotation)) if stub => annotation,
            (false, Some(annotation)) => merge(AbstractType::void(), annotation),
            (false, None) => AbstractType::void(),
            (true, Some(annotation)) => merge(returns, annotation),
            (true, None) => returns,
        }
    }
}

struct DeclarationBuilder<'b, 'r> {
    chain: &'b mut DUChain,
    document: DocumentId,
    revision: Revision,
    resolver: Option<&'b ModuleResolver<'r>>,
    pass: Pass,
    old_top: Option<&'b TopDUContext>,
    prebuilt_hints: &'b HintMap,
    local_hints: HintMap,
    foreign_hints: HintMap,
    context: usize,
    counters: HashMap<String, u32>,
    functions: Vec<FunctionFrame>,
    problems: Vec<Error>,
    missing_dependencies: Vec<DocumentId>,
}

impl<'b, 'r> DeclarationBuilder<'b, 'r> {
    fn chain(&self) -> &DUChain {
        &*self.chain
    }

    fn visitor(&self) -> ExpressionVisitor<'_> {
        ExpressionVisitor::new(self.chain(), ContextRef::new(self.document.clone(), self.context))
    }

    fn type_of(&self, expr: &Expr) -> AbstractType {
        self.visitor().type_of(expr)
    }

    fn report(&mut self, error: ErrorImpl, position: Position) {
        if self.pass == Pass::Final {
            debug!("problem in {}: {}", self.document, error);
            self.problems.push(Error::new(error, position));
        }
    }

    fn scope(&self, context: usize) -> String {
        self.chain()
            .top(&self.document)
            .and_then(|top| top.context(context))
            .map(|context| context.scope.clone())
            .unwrap_or_default()
    }

    fn new_declaration(
        &mut self,
        context: usize,
        name: &str,
        range: Span,
        kind: DeclarationKind,
        ty: AbstractType,
    ) -> Declaration {
        let scope = self.scope(context);
        let qualified = if scope.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", scope, name)
        };

        let counter = self.counters.entry(qualified.clone()).or_insert(0);
        let id = DeclarationId::new(self.document.clone(), qualified, *counter);
        *counter += 1;

        Declaration::new(id, name, context, range, kind, ty)
    }

    fn add_declaration(&mut self, declaration: Declaration) -> Option<DeclarationId> {
        let id = declaration.id.clone();
        self.chain.top_mut(&self.document)?.add_declaration(declaration)?;
        Some(id)
    }

    fn open_context(&mut self, parent: usize, kind: ContextKind, range: Span, scope: String) -> usize {
        match self.chain.top_mut(&self.document) {
            Some(top) => top.add_context(kind, parent, range, scope),
            None => parent,
        }
    }

    fn declare_variable(&mut self, name: &str, range: Span, visible_from: Position, ty: AbstractType) {
        let is_global = self.functions.last().is_some_and(|frame| frame.globals.contains(name));
        let context = if is_global { 0 } else { self.context };

        let mut declaration = self.new_declaration(context, name, range, DeclarationKind::Instance, ty);
        declaration.visible_from = visible_from;
        self.add_declaration(declaration);
    }

    fn visit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_statement(stmt);
        }
    }

    fn visit_statement(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expression(expr) => self.visit_expression(expr),
            StmtKind::Assign { targets, value } => {
                self.visit_expression(value);
                let ty = self.type_of(value);
                for target in targets {
                    self.assign_target(target, ty.clone(), stmt.span.end);
                }
            }
            StmtKind::AugAssign {
                target,
                operator,
                value,
            } => {
                self.visit_expression(value);
                let visitor = self.visitor();
                let ty = visitor.binary_type(&visitor.type_of(target), *operator, &visitor.type_of(value));
                self.assign_target(target, ty, stmt.span.end);
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let mut ty = self.annotation_type(annotation);
                if let Some(value) = value {
                    self.visit_expression(value);
                    ty = merge(ty, self.type_of(value));
                }
                self.assign_target(target, ty, stmt.span.end);
            }
            StmtKind::FunctionDef(def) => self.visit_function(def),
            StmtKind::ClassDef(class) => self.visit_class(class),
            StmtKind::Return(value) => self.visit_return(value.as_ref()),
            StmtKind::Import(names) => self.visit_import(names, stmt),
            StmtKind::ImportFrom { module, level, names } => self.visit_import_from(module.as_ref(), *level, names, stmt),
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.visit_expression(iter);
                let content = content_of_iterable(self.chain(), &self.type_of(iter));
                self.assign_target(target, content, target.span.end);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            StmtKind::While { test, body, orelse } => {
                self.visit_expression(test);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            StmtKind::If { test, body, orelse } => {
                self.visit_expression(test);
                self.narrow(test);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.visit_body(body);
                for handler in handlers {
                    self.visit_handler(handler);
                }
                self.visit_body(orelse);
                self.visit_body(finalbody);
            }
            StmtKind::With { items, body } => {
                for item in items {
                    self.visit_with_item(item);
                }
                self.visit_body(body);
            }
            StmtKind::Global(names) => {
                if let Some(frame) = self.functions.last_mut() {
                    frame.globals.extend(names.iter().map(|name| name.name.clone()));
                }
            }
            StmtKind::Assert { test, message } => {
                self.visit_expression(test);
                if let Some(message) = message {
                    self.visit_expression(message);
                }
                self.narrow(test);
            }
            StmtKind::Raise(Some(expr)) => self.visit_expression(expr),
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.visit_expression(target);
                }
            }
            StmtKind::Raise(None)
            | StmtKind::Nonlocal(_)
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue => {}
        }
    }

    /// Opens contexts for comprehensions and lambdas, records call hints,
    /// container growth and yields found inside `expr`.
    fn visit_expression(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::ListComp { element, generators }
            | ExprKind::SetComp { element, generators }
            | ExprKind::Generator { element, generators } => {
                self.visit_comprehension(expr.span, generators, &[element.as_ref()])
            }
            ExprKind::DictComp { key, value, generators } => {
                self.visit_comprehension(expr.span, generators, &[key.as_ref(), value.as_ref()])
            }
            ExprKind::Lambda { parameters, body } => self.visit_lambda(expr.span, parameters, body),
            ExprKind::Call {
                callee,
                arguments,
                keywords,
                star_args,
                kwargs,
            } => {
                self.visit_expression(callee);
                for argument in arguments {
                    self.visit_expression(argument);
                }
                for keyword in keywords {
                    self.visit_expression(&keyword.value);
                }
                for extra in star_args.iter().chain(kwargs.iter()) {
                    self.visit_expression(extra);
                }
                self.visit_call(callee, arguments, keywords);
            }
            ExprKind::Yield(value) => {
                if let Some(value) = value {
                    self.visit_expression(value);
                }
                let ty = match value {
                    Some(value) => self.type_of(value),
                    None => AbstractType::integral(IntegralKind::None),
                };
                if let Some(frame) = self.functions.last_mut() {
                    let yields = std::mem::replace(&mut frame.yields, AbstractType::mixed());
                    frame.yields = merge(yields, ty);
                    frame.has_yield = true;
                }
            }
            ExprKind::Attribute { value, .. } => self.visit_expression(value),
            ExprKind::Subscript { value, index } => {
                self.visit_expression(value);
                self.visit_expression(index);
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.visit_expression(part);
                }
            }
            ExprKind::Starred(inner) => self.visit_expression(inner),
            ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items) => {
                for item in items {
                    self.visit_expression(item);
                }
            }
            ExprKind::Dict(items) => {
                for (key, value) in items {
                    self.visit_expression(key);
                    self.visit_expression(value);
                }
            }
            ExprKind::Binary { left, right, .. }
            | ExprKind::Compare { left, right, .. }
            | ExprKind::BoolOp { left, right, .. } => {
                self.visit_expression(left);
                self.visit_expression(right);
            }
            ExprKind::Unary { operand, .. } => self.visit_expression(operand),
            ExprKind::IfExpr { test, body, orelse } => {
                self.visit_expression(test);
                self.visit_expression(body);
                self.visit_expression(orelse);
            }
            ExprKind::Number(_)
            | ExprKind::Float(_)
            | ExprKind::String(_)
            | ExprKind::Bytes(_)
            | ExprKind::Bool(_)
            | ExprKind::None
            | ExprKind::Ellipsis
            | ExprKind::Name(_) => {}
        }
    }

    fn visit_comprehension(&mut self, span: Span, generators: &[Comprehension], elements: &[&Expr]) {
        let outer = self.context;
        let scope = self.scope(outer);
        self.context = self.open_context(outer, ContextKind::Other, span, scope);

        for generator in generators {
            self.visit_expression(&generator.iter);
            let content = content_of_iterable(self.chain(), &self.type_of(&generator.iter));
            self.assign_target(&generator.target, content, span.start);
            for condition in &generator.conditions {
                self.visit_expression(condition);
            }
        }
        for element in elements {
            self.visit_expression(element);
        }

        self.context = outer;
    }

    fn visit_lambda(&mut self, span: Span, parameters: &[Parameter], body: &Expr) {
        for default in parameters.iter().filter_map(|parameter| parameter.default.as_ref()) {
            self.visit_expression(default);
        }

        let outer = self.context;
        let scope = self.scope(outer);
        let context = self.open_context(outer, ContextKind::Other, span, scope);

        for parameter in parameters {
            let ty = match &parameter.default {
                Some(default) => self.type_of(default),
                None => AbstractType::mixed(),
            };
            let mut declaration =
                self.new_declaration(context, &parameter.name.name, parameter.name.span, DeclarationKind::Instance, ty);
            declaration.visible_from = span.start;
            declaration.parameter = Some(parameter.kind);
            self.add_declaration(declaration);
        }

        self.context = context;
        self.visit_expression(body);
        self.context = outer;
    }

    fn assign_target(&mut self, target: &Expr, ty: AbstractType, visible_from: Position) {
        match &target.kind {
            ExprKind::Name(name) => self.declare_variable(name, target.span, visible_from, ty),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    match &item.kind {
                        ExprKind::Starred(inner) => {
                            let content = content_of_iterable(self.chain(), &ty);
                            let list = AbstractType::list_of(ListKind::List, (!content.is_mixed()).then_some(content));
                            self.assign_target(inner, list, visible_from);
                        }
                        _ => {
                            let item_type = self.unpacked_type(&ty, index, items.len());
                            self.assign_target(item, item_type, visible_from);
                        }
                    }
                }
            }
            ExprKind::Starred(inner) => self.assign_target(inner, ty, visible_from),
            ExprKind::Attribute { value, attribute } => {
                self.visit_expression(value);
                self.assign_attribute(value, attribute, ty, visible_from);
            }
            ExprKind::Subscript { value, index } => {
                self.visit_expression(value);
                self.visit_expression(index);
                self.assign_subscript(value, index, &ty);
            }
            _ => self.visit_expression(target),
        }
    }

    fn unpacked_type(&self, ty: &AbstractType, index: usize, count: usize) -> AbstractType {
        merge_all(candidates(ty).iter().map(|candidate| match candidate {
            AbstractType::IndexedContainer(container) if container.slots.len() == count => container.slots[index].clone(),
            other => content_of_iterable(self.chain(), other),
        }))
    }

    /// `value.attribute = ...` declares a member on classes of this document.
    fn assign_attribute(&mut self, value: &Expr, attribute: &Identifier, ty: AbstractType, visible_from: Position) {
        let base = self.type_of(value);
        let mut class_contexts = vec![];
        for candidate in candidates(&base) {
            let AbstractType::Structure(structure) = candidate else {
                continue;
            };
            if structure.declaration.document != self.document {
                continue;
            }
            let internal = self
                .chain()
                .declaration(&structure.declaration)
                .and_then(|class| class.internal_context);
            if let Some(internal) = internal {
                if !class_contexts.contains(&internal) {
                    class_contexts.push(internal);
                }
            }
        }

        for context in class_contexts {
            let mut declaration =
                self.new_declaration(context, &attribute.name, attribute.span, DeclarationKind::Instance, ty.clone());
            declaration.visible_from = visible_from;
            self.add_declaration(declaration);
        }
    }

    /// `d[key] = value` widens the container behind `d`.
    fn assign_subscript(&mut self, value: &Expr, index: &Expr, ty: &AbstractType) {
        if ty.is_useless() {
            return;
        }
        let key = self.type_of(index);
        let Some(target) = self.visitor().declaration_of(value).map(|declaration| declaration.id.clone()) else {
            return;
        };
        if target.document != self.document {
            return;
        }
        if let Some(declaration) = self.chain.declaration_mut(&target) {
            declaration.abstract_type = with_item(&declaration.abstract_type, &key, ty);
        }
    }

    fn visit_call(&mut self, callee: &Expr, arguments: &[Expr], keywords: &[Keyword]) {
        let Some((function, offset)) = self.called_function(callee) else {
            return;
        };
        self.grow_receiver(callee, &function, arguments);
        self.record_call_hints(&function, offset, arguments, keywords);
    }

    /// The function run by calling `callee`, and how many leading
    /// parameters the call fills implicitly.
    fn called_function(&self, callee: &Expr) -> Option<(DeclarationId, usize)> {
        let visitor = self.visitor();
        let called = visitor.declaration_of(callee)?;
        let (function, is_constructor) = function_declaration_for_called_declaration(self.chain(), called);
        if !function.is_function {
            return None;
        }

        let bound = match &callee.kind {
            _ if is_constructor => true,
            ExprKind::Attribute { value, .. } => {
                let on_class = visitor
                    .declaration_of(value)
                    .is_some_and(|receiver| receiver.kind == DeclarationKind::Type);
                is_class_member(self.chain(), function)
                    && !function.is_static_method()
                    && (!on_class || function.is_class_method())
            }
            _ => false,
        };

        Some((function.id.clone(), usize::from(bound)))
    }

    /// Applies `addsTypeOfArg` and `addsTypeOfArgContent` to the receiver.
    fn grow_receiver(&mut self, callee: &Expr, function: &DeclarationId, arguments: &[Expr]) {
        let ExprKind::Attribute { value, .. } = &callee.kind else {
            return;
        };
        let Some(declaration) = self.chain().declaration(function) else {
            return;
        };

        let addition = declaration.decorators.iter().find_map(|decorator| {
            let argument = arguments.get(decorator.index_argument()?)?;
            match decorator.name.as_str() {
                "addsTypeOfArg" => Some(self.type_of(argument)),
                "addsTypeOfArgContent" => Some(content_of_iterable(self.chain(), &self.type_of(argument))),
                _ => None,
            }
        });
        let Some(addition) = addition.filter(|addition| !addition.is_useless()) else {
            return;
        };

        let Some(receiver) = self.visitor().declaration_of(value).map(|declaration| declaration.id.clone()) else {
            return;
        };
        if receiver.document != self.document {
            return;
        }
        if let Some(declaration) = self.chain.declaration_mut(&receiver) {
            trace!("{} grows by {}", receiver, addition);
            declaration.abstract_type = with_content(&declaration.abstract_type, &addition);
        }
    }

    /// Parameters of `function` in declaration order.
    fn parameters_of(&self, function: &DeclarationId) -> Vec<(DeclarationId, String, ParameterKind)> {
        let Some(top) = self.chain().top(&function.document) else {
            return vec![];
        };
        let Some(body) = top.declaration_by_id(function).and_then(|function| function.internal_context) else {
            return vec![];
        };
        let parameter_context = top.context(body).and_then(|body| {
            body.imports.iter().find(|import| {
                import.document == function.document
                    && top.context(import.index).is_some_and(|context| context.kind == ContextKind::Function)
            })
        });
        let Some(parameter_context) = parameter_context else {
            return vec![];
        };

        top.local_declarations(parameter_context.index)
            .filter_map(|parameter| {
                parameter
                    .parameter
                    .map(|kind| (parameter.id.clone(), parameter.name.clone(), kind))
            })
            .collect()
    }

    fn hint(&self, ty: &AbstractType) -> AbstractType {
        AbstractType::hinted(unwrap_hints(ty), self.document.clone(), self.revision)
    }

    /// Remembers the argument types of a call as hints for the parameters
    /// of `function`. Calls into this document are collected while
    /// prebuilding, calls into other documents in the final pass.
    fn record_call_hints(&mut self, function: &DeclarationId, offset: usize, arguments: &[Expr], keywords: &[Keyword]) {
        if function.document.is_builtins() {
            return;
        }
        let local = function.document == self.document;
        // Local hints feed the final pass; foreign ones are written after each pass.
        if local && self.pass == Pass::Final {
            return;
        }

        let parameters = self.parameters_of(function);
        // Parameters after `*args` only take keyword arguments.
        let positional: Vec<_> = parameters
            .iter()
            .take_while(|(_, _, kind)| *kind != ParameterKind::VarArgs)
            .filter(|(_, _, kind)| *kind == ParameterKind::Positional)
            .collect();
        let named: Vec<_> = parameters
            .iter()
            .filter(|(_, _, kind)| *kind == ParameterKind::Positional)
            .collect();

        let mut hints = vec![];
        let mut extra = vec![];
        for (index, argument) in arguments.iter().enumerate() {
            if matches!(argument.kind, ExprKind::Starred(_)) {
                continue;
            }
            let ty = self.type_of(argument);
            match positional.get(index + offset) {
                Some((id, _, _)) => hints.push((id.clone(), ty)),
                None => extra.push(ty),
            }
        }

        let mut keyword_values = vec![];
        for keyword in keywords {
            let ty = self.type_of(&keyword.value);
            match named.iter().find(|(_, name, _)| *name == keyword.name.name) {
                Some((id, _, _)) => hints.push((id.clone(), ty)),
                None => keyword_values.push(ty),
            }
        }

        let mut hinted: Vec<(DeclarationId, AbstractType)> = hints
            .into_iter()
            .filter(|(_, ty)| !ty.is_useless())
            .map(|(id, ty)| (id, self.hint(&ty)))
            .collect();

        let varargs = parameters.iter().find(|(_, _, kind)| *kind == ParameterKind::VarArgs);
        if let (Some((id, _, _)), false) = (varargs, extra.is_empty()) {
            let slots = extra
                .iter()
                .map(|ty| if ty.is_useless() { AbstractType::mixed() } else { self.hint(ty) })
                .collect();
            hinted.push((id.clone(), AbstractType::tuple_of(slots)));
        }

        let kwargs = parameters.iter().find(|(_, _, kind)| *kind == ParameterKind::KwArgs);
        let values = merge_all(keyword_values);
        if let (Some((id, _, _)), false) = (kwargs, values.is_useless()) {
            hinted.push((
                id.clone(),
                AbstractType::dict_of(AbstractType::integral(IntegralKind::Str), self.hint(&values)),
            ));
        }

        let target = if local { &mut self.local_hints } else { &mut self.foreign_hints };
        for (id, ty) in hinted {
            trace!("hint for {}: {}", id, ty);
            let merged = match target.remove(&id) {
                Some(existing) => merge(existing, ty),
                None => ty,
            };
            target.insert(id, merged);
        }
    }

    fn visit_return(&mut self, value: Option<&Expr>) {
        if let Some(value) = value {
            self.visit_expression(value);
        }
        let ty = value.map(|value| self.type_of(value));
        let returned = value
            .filter(|value| value.as_name().is_some())
            .and_then(|value| self.visitor().declaration_of(value).map(|declaration| declaration.id.clone()));

        let Some(frame) = self.functions.last_mut() else {
            return;
        };
        frame.has_return = true;
        match ty {
            Some(ty) => {
                let returns = std::mem::replace(&mut frame.returns, AbstractType::mixed());
                frame.returns = merge(returns, ty);
            }
            None => frame.bare_return = true,
        }
        if let Some(returned) = returned {
            if frame.parameters.contains(&returned) && !frame.returned_parameters.contains(&returned) {
                frame.returned_parameters.push(returned);
            }
        }
    }

    /// The class type of the class whose body is being built, if any.
    fn enclosing_class(&self) -> Option<AbstractType> {
        let top = self.chain().top(&self.document)?;
        let context = top.context(self.context)?;
        if context.kind != ContextKind::Class {
            return None;
        }
        let class = top.declaration_by_id(context.owner.as_ref()?)?;
        Some(class.abstract_type.clone())
    }

    fn visit_function(&mut self, def: &FunctionDef) {
        for decorator in &def.decorators {
            self.visit_expression(decorator);
        }
        for default in def.parameters.iter().filter_map(|parameter| parameter.default.as_ref()) {
            self.visit_expression(default);
        }

        let outer = self.context;
        let class = self.enclosing_class();
        let annotation = def.returns.as_ref().map(|returns| self.annotation_type(returns));

        let mut declaration =
            self.new_declaration(outer, &def.name.name, def.name.span, DeclarationKind::Instance, AbstractType::mixed());
        declaration.is_function = true;
        declaration.decorators = def.decorators.iter().filter_map(decorator_of).collect();
        let is_static = declaration.is_static_method();
        let receives_class = declaration.is_class_method() || def.name.name == "__new__";
        let Some(id) = self.add_declaration(declaration) else {
            return;
        };

        let scope = id.qualified.clone();
        let parameter_context = self.open_context(outer, ContextKind::Function, def.parameters_span, scope.clone());
        let body_context = self.open_context(outer, ContextKind::Other, def.body_span, scope);
        if let Some(top) = self.chain.top_mut(&self.document) {
            if let Some(body) = top.context_mut(body_context) {
                body.owner = Some(id.clone());
                body.add_import(ContextRef::new(self.document.clone(), parameter_context));
            }
            if let Some(function) = top.declaration_by_id_mut(&id) {
                function.internal_context = Some(body_context);
            }
        }

        self.context = parameter_context;
        let mut parameters = vec![];
        let mut argument_types = vec![];
        for (index, parameter) in def.parameters.iter().enumerate() {
            let mut declaration = self.new_declaration(
                parameter_context,
                &parameter.name.name,
                parameter.name.span,
                DeclarationKind::Instance,
                AbstractType::mixed(),
            );
            let receiver = if index == 0 && !is_static { class.as_ref() } else { None };
            let ty = self.parameter_type(&declaration.id, parameter, receiver);
            declaration.abstract_type = ty.clone();
            declaration.parameter = Some(parameter.kind);
            argument_types.push(ty);
            if let Some(parameter) = self.add_declaration(declaration) {
                parameters.push(parameter);
            }
        }

        self.context = body_context;
        self.functions.push(FunctionFrame::new(parameters));
        self.visit_body(&def.body);
        let frame = self.functions.pop();
        self.context = outer;

        if let Some(frame) = frame {
            let return_type = frame.return_type(annotation, self.document.is_builtins());
            trace!("{} returns {}", id, return_type);
            if let Some(function) = self.chain.declaration_mut(&id) {
                function.abstract_type = AbstractType::Function(FunctionType {
                    declaration: Some(id.clone()),
                    return_type: Box::new(return_type),
                    arguments: argument_types,
                });
                function.returned_parameters = frame.returned_parameters;
            }
        }

        if class.is_some() && !is_static {
            if let Some(first) = def.parameters.first() {
                let expected = if receives_class { "cls" } else { "self" };
                if first.name.name != expected {
                    self.report(
                        ErrorImpl::FirstArgumentName {
                            function: def.name.name.clone(),
                            expected: expected.to_string(),
                        },
                        first.name.span.start,
                    );
                }
            }
        }
    }

    /// Type of a parameter before the body is built.
    ///
    /// The receiver of a method gets the class type. Other parameters get
    /// their annotation and default, plus the hints learned from calls.
    fn parameter_type(&self, id: &DeclarationId, parameter: &Parameter, receiver: Option<&AbstractType>) -> AbstractType {
        if let Some(receiver) = receiver {
            return receiver.clone();
        }

        let mut ty = AbstractType::mixed();
        if let Some(annotation) = &parameter.annotation {
            ty = self.annotation_type(annotation);
        }
        if let Some(default) = &parameter.default {
            ty = merge(ty, self.type_of(default));
        }

        let prebuilt = self.prebuilt_hints.get(id).cloned().unwrap_or_else(AbstractType::mixed);
        let hints = merge(prebuilt, self.carried_hints(id));

        match parameter.kind {
            ParameterKind::Positional => merge(ty, hints),
            ParameterKind::VarArgs if hints.is_useless() => AbstractType::tuple_of(vec![]),
            ParameterKind::KwArgs if hints.is_useless() => AbstractType::List(ListType {
                kind: ListKind::Dict,
                content: None,
                key: Some(Box::new(AbstractType::integral(IntegralKind::Str))),
            }),
            _ => hints,
        }
    }

    /// Hints other documents left on the previous version of `id`, as long
    /// as they are still current.
    fn carried_hints(&self, id: &DeclarationId) -> AbstractType {
        let Some(old) = self.old_top.and_then(|top| top.declaration_by_id(id)) else {
            return AbstractType::mixed();
        };
        hint_members(&old.abstract_type, |origin, revision| {
            *origin != self.document && self.chain().document_revision(origin) == Some(revision)
        })
    }

    /// The instance type named by an annotation.
    fn annotation_type(&self, annotation: &Expr) -> AbstractType {
        match &annotation.kind {
            ExprKind::None => AbstractType::integral(IntegralKind::None),
            ExprKind::String(name) => self.class_type_named(name),
            ExprKind::Name(name) => match self.visitor().declaration_of(annotation) {
                Some(class) if class.kind == DeclarationKind::Type => class.abstract_type.clone(),
                _ => self.class_type_named(name),
            },
            _ => self.instance_type(annotation),
        }
    }

    fn class_type_named(&self, name: &str) -> AbstractType {
        if let Some(ty) = builtin_type_named(name) {
            return ty;
        }
        declaration_for_name(
            self.chain(),
            name,
            None,
            &ContextRef::new(self.document.clone(), self.context),
        )
        .filter(|class| class.kind == DeclarationKind::Type)
        .map(|class| class.abstract_type.clone())
        .unwrap_or_else(AbstractType::mixed)
    }

    /// Instances of the class `expr` names; tuples of classes merge.
    fn instance_type(&self, expr: &Expr) -> AbstractType {
        match &expr.kind {
            ExprKind::Tuple(items) => merge_all(items.iter().map(|item| self.instance_type(item))),
            _ => match self.visitor().declaration_of(expr) {
                Some(class) if class.kind == DeclarationKind::Type => class.abstract_type.clone(),
                _ => AbstractType::mixed(),
            },
        }
    }

    fn visit_class(&mut self, class: &ClassDef) {
        for expr in class.decorators.iter().chain(class.bases.iter()) {
            self.visit_expression(expr);
        }

        let outer = self.context;
        let mut declaration =
            self.new_declaration(outer, &class.name.name, class.name.span, DeclarationKind::Type, AbstractType::mixed());
        declaration.abstract_type = if self.document.is_builtins() {
            builtin_type_named(&class.name.name)
                .unwrap_or_else(|| AbstractType::structure(declaration.id.clone(), class.name.name.clone()))
        } else {
            AbstractType::structure(declaration.id.clone(), class.name.name.clone())
        };
        declaration.decorators = class.decorators.iter().filter_map(decorator_of).collect();
        declaration.base_classes = class
            .bases
            .iter()
            .filter_map(|base| {
                let base = self.visitor().declaration_of(base)?;
                (base.kind == DeclarationKind::Type).then(|| BaseClass {
                    class: base.id.clone(),
                    access: AccessPolicy::Public,
                })
            })
            .collect();
        let Some(id) = self.add_declaration(declaration) else {
            return;
        };

        let context = self.open_context(outer, ContextKind::Class, class.body_span, id.qualified.clone());
        if let Some(top) = self.chain.top_mut(&self.document) {
            if let Some(body) = top.context_mut(context) {
                body.owner = Some(id.clone());
            }
            if let Some(class) = top.declaration_by_id_mut(&id) {
                class.internal_context = Some(context);
            }
        }

        self.context = context;
        self.visit_body(&class.body);
        self.context = outer;
    }

    fn visit_handler(&mut self, handler: &ExceptHandler) {
        if let Some(exception) = &handler.exception {
            self.visit_expression(exception);
        }
        if let Some(name) = &handler.name {
            let ty = match &handler.exception {
                Some(exception) => self.instance_type(exception),
                None => AbstractType::mixed(),
            };
            self.declare_variable(&name.name, name.span, name.span.end, ty);
        }
        self.visit_body(&handler.body);
    }

    fn visit_with_item(&mut self, item: &WithItem) {
        self.visit_expression(&item.context);
        let Some(target) = &item.target else {
            return;
        };

        let visitor = self.visitor();
        let context_type = visitor.type_of(&item.context);
        let entered = access_attribute_of_type(self.chain(), &context_type, "__enter__")
            .filter(|enter| enter.is_function)
            .map(|enter| visitor.call_return_type(enter))
            .filter(|ty| !ty.is_useless() && *ty != AbstractType::void());

        self.assign_target(target, entered.unwrap_or(context_type), target.span.end);
    }

    /// `isinstance(x, C)` and `type(x) == C` narrow `x` to `C`.
    fn narrow(&mut self, test: &Expr) {
        match &test.kind {
            ExprKind::BoolOp {
                operator: BoolOperator::And,
                left,
                right,
            } => {
                self.narrow(left);
                self.narrow(right);
            }
            ExprKind::Call { callee, arguments, .. }
                if callee.as_name() == Some("isinstance") && arguments.len() == 2 =>
            {
                self.narrow_name(&arguments[0], &arguments[1]);
            }
            ExprKind::Compare {
                left,
                operator: CompareOperator::Equals | CompareOperator::Is,
                right,
            } => {
                if let ExprKind::Call { callee, arguments, .. } = &left.kind {
                    if callee.as_name() == Some("type") && arguments.len() == 1 {
                        self.narrow_name(&arguments[0], right);
                    }
                }
            }
            _ => {}
        }
    }

    fn narrow_name(&mut self, variable: &Expr, class: &Expr) {
        if variable.as_name().is_none() {
            return;
        }
        let narrowed = {
            let visitor = self.visitor();
            let class = visitor
                .declaration_of(class)
                .filter(|class| class.kind == DeclarationKind::Type);
            let variable = visitor.declaration_of(variable);
            match (variable, class) {
                (Some(variable), Some(class)) => Some((variable.id.clone(), class.abstract_type.clone())),
                _ => None,
            }
        };
        let Some((target, ty)) = narrowed else {
            return;
        };
        if target.document != self.document {
            return;
        }
        if let Some(declaration) = self.chain.declaration_mut(&target) {
            trace!("narrowing {} to {}", target, ty);
            declaration.abstract_type = ty;
        }
    }

    fn note_import(&mut self, target: &DocumentId) {
        if *target == self.document {
            return;
        }
        if let Some(top) = self.chain.top_mut(&self.document) {
            top.imported_documents.insert(target.clone());
        }
        if self.pass == Pass::Final && !self.chain.contains(target) && !self.missing_dependencies.contains(target) {
            debug!("{} needs {}", self.document, target);
            self.missing_dependencies.push(target.clone());
        }
    }

    /// The namespace context for module `name` declared in `context`.
    ///
    /// An existing namespace declaration of the same name is extended, so
    /// `import a.b` followed by `import a.c` gives one `a` holding both.
    fn namespace(
        &mut self,
        context: usize,
        name: &Identifier,
        visible_from: Position,
        target: &DocumentId,
        reuse: bool,
    ) -> Option<usize> {
        let loaded = self.chain.contains(target);
        let existing = reuse
            .then(|| {
                let top = self.chain().top(&self.document)?;
                top.local_declarations(context)
                    .filter(|declaration| {
                        declaration.name == name.name && declaration.kind == DeclarationKind::Namespace
                    })
                    .last()
                    .and_then(|declaration| declaration.internal_context)
            })
            .flatten();

        let namespace = match existing {
            Some(namespace) => namespace,
            None => {
                let scope = self.scope(context);
                let namespace =
                    self.open_context(context, ContextKind::Other, Span::new(visible_from, visible_from), scope);
                let mut declaration = self.new_declaration(
                    context,
                    &name.name,
                    name.span,
                    DeclarationKind::Namespace,
                    AbstractType::mixed(),
                );
                declaration.visible_from = visible_from;
                declaration.internal_context = Some(namespace);
                self.add_declaration(declaration)?;
                namespace
            }
        };

        if loaded {
            if let Some(namespace) = self.chain.top_mut(&self.document).and_then(|top| top.context_mut(namespace)) {
                namespace.add_import(ContextRef::top(target.clone()));
            }
        }
        Some(namespace)
    }

    fn visit_import(&mut self, names: &[ImportAlias], stmt: &Stmt) {
        let Some(resolver) = self.resolver else {
            return;
        };

        for alias in names {
            let dotted = &alias.name.name;
            if let Some(local) = &alias.alias {
                match resolver.resolve(&self.document, dotted, 0) {
                    Some(target) => {
                        self.note_import(&target);
                        self.namespace(self.context, local, stmt.span.end, &target, false);
                    }
                    None => self.report(ErrorImpl::ModuleNotFound { module: dotted.clone() }, alias.name.span.start),
                }
                continue;
            }

            let mut context = self.context;
            let mut prefix = String::new();
            for part in dotted.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);

                let Some(target) = resolver.resolve(&self.document, &prefix, 0) else {
                    self.report(ErrorImpl::ModuleNotFound { module: prefix.clone() }, alias.name.span.start);
                    break;
                };
                self.note_import(&target);
                let name = Identifier::new(part, alias.name.span);
                match self.namespace(context, &name, stmt.span.end, &target, true) {
                    Some(namespace) => context = namespace,
                    None => break,
                }
            }
        }
    }

    fn visit_import_from(&mut self, module: Option<&Identifier>, level: u32, names: &[ImportAlias], stmt: &Stmt) {
        let Some(resolver) = self.resolver else {
            return;
        };
        let module_name = module.map(|module| module.name.clone()).unwrap_or_default();
        let written = format!("{}{}", ".".repeat(level as usize), module_name);
        let position = module.map_or(stmt.span.start, |module| module.span.start);

        let Some(target) = resolver.resolve(&self.document, &module_name, level) else {
            self.report(ErrorImpl::ModuleNotFound { module: written }, position);
            return;
        };
        self.note_import(&target);
        let loaded = self.chain.contains(&target);

        for alias in names {
            if alias.name.name == "*" {
                if loaded {
                    if let Some(context) = self.chain.top_mut(&self.document).and_then(|top| top.context_mut(self.context)) {
                        context.add_import(ContextRef::top(target.clone()));
                    }
                }
                continue;
            }

            let local = alias.alias.as_ref().unwrap_or(&alias.name);
            let found = find_local_declarations(
                self.chain(),
                &ContextRef::top(target.clone()),
                &alias.name.name,
                None,
                SearchFlags::DONT_RESOLVE_ALIASES,
            )
            .last()
            .map(|declaration| (declaration.id.clone(), declaration.kind, declaration.abstract_type.clone()));

            if let Some((original, kind, ty)) = found {
                let mut declaration = self.new_declaration(self.context, &local.name, local.span, kind, ty);
                declaration.visible_from = stmt.span.end;
                declaration.alias_of = Some(original);
                self.add_declaration(declaration);
                continue;
            }

            let submodule = if module_name.is_empty() {
                alias.name.name.clone()
            } else {
                format!("{}.{}", module_name, alias.name.name)
            };
            if let Some(document) = resolver.resolve(&self.document, &submodule, level) {
                self.note_import(&document);
                self.namespace(self.context, local, stmt.span.end, &document, false);
                continue;
            }

            if loaded {
                self.report(
                    ErrorImpl::UnresolvedImport {
                        name: alias.name.name.clone(),
                        module: written.clone(),
                    },
                    alias.name.span.start,
                );
            }
        }
    }
}

/// Types of the builtin classes that have a dedicated representation.
fn builtin_type_named(name: &str) -> Option<AbstractType> {
    if let Some(kind) = IntegralKind::from_class_name(name) {
        return Some(AbstractType::integral(kind));
    }
    if let Some(kind) = ListKind::from_class_name(name) {
        return Some(AbstractType::list_of(kind, None));
    }
    (name == "tuple").then(|| AbstractType::tuple_of(vec![]))
}

fn decorator_of(expr: &Expr) -> Option<Decorator> {
    match &expr.kind {
        ExprKind::Name(name) => Some(Decorator {
            name: name.clone(),
            arguments: vec![],
        }),
        ExprKind::Attribute { attribute, .. } => Some(Decorator {
            name: attribute.name.clone(),
            arguments: vec![],
        }),
        ExprKind::Call { callee, arguments, .. } => {
            let mut decorator = decorator_of(callee)?;
            decorator.arguments = arguments.iter().filter_map(literal_text).collect();
            Some(decorator)
        }
        _ => None,
    }
}

fn literal_text(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Number(text) | ExprKind::String(text) | ExprKind::Name(text) => Some(text.clone()),
        ExprKind::Unary {
            operator: UnaryOperator::Minus,
            operand,
        } => literal_text(operand).map(|text| format!("-{}", text)),
        _ => None,
    }
}

/// `ty` with `addition` merged into the content of every list candidate.
fn with_content(ty: &AbstractType, addition: &AbstractType) -> AbstractType {
    match ty {
        AbstractType::List(list) => {
            let mut list = list.clone();
            list.add_content(addition.clone());
            AbstractType::List(list)
        }
        AbstractType::Unsure(unsure) => merge_all(unsure.members().iter().map(|member| with_content(member, addition))),
        other => other.clone(),
    }
}

/// `ty` after storing `value` under `key`.
fn with_item(ty: &AbstractType, key: &AbstractType, value: &AbstractType) -> AbstractType {
    match ty {
        AbstractType::List(list) if list.kind == ListKind::Dict => {
            let mut list = list.clone();
            if !key.is_useless() {
                list.add_key(key.clone());
            }
            list.add_content(value.clone());
            AbstractType::List(list)
        }
        AbstractType::List(_) => with_content(ty, value),
        AbstractType::Unsure(unsure) => merge_all(unsure.members().iter().map(|member| with_item(member, key, value))),
        other => other.clone(),
    }
}
