#![allow(dead_code)]

use ember_ast::{
    Arguments, AssignStmt, CallExpr, Closure, ClosureParam, ExprId, ExprKind, FunctionBody,
    FunctionId, LetStmt, LocalRef, MethodCallExpr, ReturnStmt, Span, Stmt, TypeRef, TypeRefKind, ident, span,
};
use ember_backend_llvm::{CodegenOptions, emit_llvm_ir};
use ember_core::{AnalysisOptions, Package, SemanticAnalyser};

#[derive(Default)]
pub struct BodyBuilder {
    pub body: FunctionBody,
    offset: usize,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_span(&mut self) -> Span {
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
        let at = self.next_span();
        self.body.expr(
            at,
            ExprKind::Call(CallExpr {
                function: ident(name, at),
                arguments: Arguments::new(at, args),
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
        self.binding(name, false, ty, Some(init));
    }

    pub fn let_mut(&mut self, name: &str, ty: Option<TypeRef>, init: ExprId) {
        self.binding(name, true, ty, Some(init));
    }

    /// `let name: ty` with the value assigned later.
    pub fn declare(&mut self, name: &str, mutable: bool, ty: TypeRef) {
        self.binding(name, mutable, Some(ty), None);
    }

    fn binding(&mut self, name: &str, mutable: bool, ty: Option<TypeRef>, init: Option<ExprId>) {
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
        self.body.push(Stmt::Assign(AssignStmt {
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

/// Analyses `bodies`, insists on a clean result, and emits the module.
pub fn compile(package: &Package, mut bodies: Vec<(FunctionId, FunctionBody)>) -> String {
    compile_with(package, &mut bodies, CodegenOptions::default())
}

pub fn compile_with(
    package: &Package,
    bodies: &mut [(FunctionId, FunctionBody)],
    options: CodegenOptions,
) -> String {
    let analyser = SemanticAnalyser::new(package).with_options(AnalysisOptions {
        parallel: false,
        ..AnalysisOptions::default()
    });
    analyser.analyse(bodies);
    let reports = analyser.into_diagnostics();
    assert!(reports.iter().all(|r| r.error.is_warning()), "{reports:?}");
    emit_llvm_ir(package, bodies, options)
        .expect("code generation failed")
        .llvm_ir
}
