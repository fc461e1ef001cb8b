use crate::{
    ast::{
        expressions::{Comprehension, Expr, ExprKind},
        statements::{Stmt, StmtKind},
    },
    duchain::{
        context::ContextRef,
        declaration::DeclarationId,
        duchain::{DUChain, DocumentId},
    },
    Span,
};

use super::expression_visitor::ExpressionVisitor;

/// A use found in a document: context index, span and the declaration used.
pub type FoundUse = (usize, Span, DeclarationId);

/// Resolves every name and attribute read in a document.
///
/// Runs after the declarations of the document are complete, so a name
/// is resolved from the innermost context around it.
pub struct UseBuilder<'a> {
    chain: &'a DUChain,
    document: DocumentId,
    uses: Vec<FoundUse>,
}

impl<'a> UseBuilder<'a> {
    pub fn new(chain: &'a DUChain, document: DocumentId) -> Self {
        UseBuilder {
            chain,
            document,
            uses: vec![],
        }
    }

    pub fn build(mut self, body: &[Stmt]) -> Vec<FoundUse> {
        self.visit_body(body);
        self.uses
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
                for target in targets {
                    self.visit_target(target);
                }
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.visit_expression(value);
                self.visit_expression(target);
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                self.visit_expression(annotation);
                if let Some(value) = value {
                    self.visit_expression(value);
                }
                self.visit_target(target);
            }
            StmtKind::FunctionDef(def) => {
                for decorator in &def.decorators {
                    self.visit_expression(decorator);
                }
                for parameter in &def.parameters {
                    for expr in parameter.annotation.iter().chain(parameter.default.iter()) {
                        self.visit_expression(expr);
                    }
                }
                if let Some(returns) = &def.returns {
                    self.visit_expression(returns);
                }
                self.visit_body(&def.body);
            }
            StmtKind::ClassDef(class) => {
                for expr in class.decorators.iter().chain(class.bases.iter()) {
                    self.visit_expression(expr);
                }
                self.visit_body(&class.body);
            }
            StmtKind::Return(Some(expr)) | StmtKind::Raise(Some(expr)) => self.visit_expression(expr),
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.visit_expression(iter);
                self.visit_target(target);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            StmtKind::While { test, body, orelse } | StmtKind::If { test, body, orelse } => {
                self.visit_expression(test);
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
                    if let Some(exception) = &handler.exception {
                        self.visit_expression(exception);
                    }
                    self.visit_body(&handler.body);
                }
                self.visit_body(orelse);
                self.visit_body(finalbody);
            }
            StmtKind::With { items, body } => {
                for item in items {
                    self.visit_expression(&item.context);
                    if let Some(target) = &item.target {
                        self.visit_target(target);
                    }
                }
                self.visit_body(body);
            }
            StmtKind::Assert { test, message } => {
                self.visit_expression(test);
                if let Some(message) = message {
                    self.visit_expression(message);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.visit_expression(target);
                }
            }
            StmtKind::Return(None)
            | StmtKind::Raise(None)
            | StmtKind::Import(_)
            | StmtKind::ImportFrom { .. }
            | StmtKind::Global(_)
            | StmtKind::Nonlocal(_)
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue => {}
        }
    }

    /// Stored-to names declare rather than use; only their receivers count.
    fn visit_target(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Name(_) => {}
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.visit_target(item);
                }
            }
            ExprKind::Starred(inner) => self.visit_target(inner),
            ExprKind::Attribute { value, .. } => self.visit_expression(value),
            ExprKind::Subscript { value, index } => {
                self.visit_expression(value);
                self.visit_expression(index);
            }
            _ => self.visit_expression(target),
        }
    }

    fn visit_expression(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(_) => self.record(expr, expr.span),
            ExprKind::Attribute { value, attribute } => {
                self.visit_expression(value);
                self.record(expr, attribute.span);
            }
            ExprKind::ListComp { element, generators }
            | ExprKind::SetComp { element, generators }
            | ExprKind::Generator { element, generators } => {
                self.visit_generators(generators);
                self.visit_expression(element);
            }
            ExprKind::DictComp { key, value, generators } => {
                self.visit_generators(generators);
                self.visit_expression(key);
                self.visit_expression(value);
            }
            ExprKind::Lambda { parameters, body } => {
                for default in parameters.iter().filter_map(|parameter| parameter.default.as_ref()) {
                    self.visit_expression(default);
                }
                self.visit_expression(body);
            }
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
            }
            ExprKind::Subscript { value, index } => {
                self.visit_expression(value);
                self.visit_expression(index);
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.visit_expression(part);
                }
            }
            ExprKind::Starred(inner) | ExprKind::Unary { operand: inner, .. } => self.visit_expression(inner),
            ExprKind::Yield(value) => {
                if let Some(value) = value {
                    self.visit_expression(value);
                }
            }
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
            | ExprKind::Ellipsis => {}
        }
    }

    fn visit_generators(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            self.visit_expression(&generator.iter);
            self.visit_target(&generator.target);
            for condition in &generator.conditions {
                self.visit_expression(condition);
            }
        }
    }

    fn record(&mut self, expr: &Expr, span: Span) {
        let Some(top) = self.chain.top(&self.document) else {
            return;
        };
        let context = top.innermost_context_at(&expr.span.start);
        let visitor = ExpressionVisitor::new(self.chain, ContextRef::new(self.document.clone(), context));
        if let Some(declaration) = visitor.evaluate(expr).declaration {
            self.uses.push((context, span, declaration));
        }
    }
}
