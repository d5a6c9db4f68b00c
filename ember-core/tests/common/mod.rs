#![allow(dead_code)]

use ember_ast::{
    Arguments, CallExpr, Closure, ClosureParam, ExprId, ExprKind, FunctionBody, FunctionId,
    LetStmt, LocalRef, MethodCallExpr, ReturnStmt, Span, Stmt, TypeRef, TypeRefKind, ident, span,
};
use ember_core::{AnalysisOptions, DiagnosticSink, FunctionAnalyser, Package, Reported};

/// Builds a function body by hand, giving every node its own span.
#[derive(Default)]
pub struct BodyBuilder {
    pub body: FunctionBody,
    offset: usize,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_span(&mut self) -> Span {
        self.offset += 2;
        span(self.offset, 1)
    }

    pub fn node(&mut self, kind: ExprKind) -> ExprId {
        let at = self.next_span();
        self.body.expr(at, kind)
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.node(ExprKind::IntLit(value))
    }

    pub fn string(&mut self, value: &str) -> ExprId {
        self.node(ExprKind::StringLit(value.to_string()))
    }

    pub fn no_value(&mut self) -> ExprId {
        self.node(ExprKind::NoValue)
    }

    pub fn local(&mut self, name: &str) -> ExprId {
        let at = self.next_span();
        self.body.expr(
            at,
            ExprKind::Local(LocalRef {
                name: ident(name, at),
                variable: None,
            }),
        )
    }

    pub fn call(&mut self, name: &str, args: Vec<ExprId>) -> ExprId {
        self.call_with_generics(name, Vec::new(), args)
    }

    pub fn call_with_generics(
        &mut self,
        name: &str,
        generic_args: Vec<TypeRef>,
        args: Vec<ExprId>,
    ) -> ExprId {
        let at = self.next_span();
        self.body.expr(
            at,
            ExprKind::Call(CallExpr {
                function: ident(name, at),
                arguments: Arguments::new(at, args).with_generic_args(generic_args),
                target: None,
            }),
        )
    }

    pub fn method(&mut self, receiver: ExprId, name: &str, args: Vec<ExprId>) -> ExprId {
        let at = self.next_span();
        self.body.expr(
            at,
            ExprKind::MethodCall(MethodCallExpr {
                receiver,
                method: ident(name, at),
                arguments: Arguments::new(at, args),
                target: None,
            }),
        )
    }

    pub fn invoke(&mut self, callee: ExprId, args: Vec<ExprId>) -> ExprId {
        self.node(ExprKind::Invoke { callee, args })
    }

    pub fn unwrap(&mut self, inner: ExprId) -> ExprId {
        self.node(ExprKind::Unwrap(inner))
    }

    pub fn closure(&mut self, params: &[(&str, TypeRef)], ret: TypeRef, body: ExprId) -> ExprId {
        let at = self.next_span();
        let params = params
            .iter()
            .map(|(name, ty)| ClosureParam {
                name: ident(*name, at),
                ty: ty.clone(),
                variable: None,
            })
            .collect();
        self.body.expr(
            at,
            ExprKind::Closure(Closure {
                params,
                ret,
                body,
                captures: Vec::new(),
            }),
        )
    }

    pub fn let_(&mut self, name: &str, ty: Option<TypeRef>, init: ExprId) {
        self.let_binding(name, false, ty, Some(init));
    }

    pub fn let_mut(&mut self, name: &str, ty: Option<TypeRef>, init: ExprId) {
        self.let_binding(name, true, ty, Some(init));
    }

    /// `let name: ty` with the value assigned later.
    pub fn declare(&mut self, name: &str, mutable: bool, ty: TypeRef) {
        self.let_binding(name, mutable, Some(ty), None);
    }

    pub fn let_binding_without_type(&mut self, name: &str) {
        self.let_binding(name, false, None, None);
    }

    fn let_binding(&mut self, name: &str, mutable: bool, ty: Option<TypeRef>, init: Option<ExprId>) {
        let at = self.next_span();
        self.body.push(Stmt::Let(LetStmt {
            span: at,
            name: ident(name, at),
            mutable,
            ty,
            init,
            variable: None,
            resolved: None,
        }));
    }

    pub fn assign(&mut self, name: &str, value: ExprId) {
        let at = self.next_span();
        self.body.push(Stmt::Assign(ember_ast::AssignStmt {
            span: at,
            target: ident(name, at),
            value,
            variable: None,
        }));
    }

    pub fn expr(&mut self, expr: ExprId) {
        self.body.push(Stmt::Expr(expr));
    }

    pub fn ret(&mut self, value: Option<ExprId>) {
        let at = self.next_span();
        self.body.push(Stmt::Return(ReturnStmt { span: at, value }));
    }

    pub fn finish(self) -> FunctionBody {
        self.body
    }
}

pub fn ty(name: &str) -> TypeRef {
    TypeRef::named(name, span(0, name.len()))
}

pub fn optional_ty(name: &str) -> TypeRef {
    TypeRef::optional(ty(name))
}

pub fn callable_ty(params: Vec<TypeRef>, ret: TypeRef) -> TypeRef {
    TypeRef {
        span: span(0, 1),
        kind: TypeRefKind::Callable {
            params,
            ret: Box::new(ret),
        },
    }
}

/// Analyses one body sequentially and returns what it reported.
pub fn analyse(package: &Package, function: FunctionId, body: &mut FunctionBody) -> Vec<Reported> {
    analyse_with(package, function, body, AnalysisOptions::default())
}

pub fn analyse_with(
    package: &Package,
    function: FunctionId,
    body: &mut FunctionBody,
    options: AnalysisOptions,
) -> Vec<Reported> {
    let sink = DiagnosticSink::new();
    FunctionAnalyser::new(package, function, body, &sink, &options).analyse();
    sink.into_entries()
}
