#![forbid(unsafe_code)]

use ember_ast::{
    AssignStmt, BoxingOp, CallExpr, Closure, ExprId, ExprKind, FunctionBody, FunctionId, LetStmt,
    LocalRef, MethodCallExpr, ReturnStmt, Span, Stmt, TypeExpr, TypeRef, VariableId,
};
use ember_types::{Type, TypeContext, TypeRegistry};

use crate::diagnostics::DiagnosticSink;
use crate::error::SemanticError;
use crate::expectation::TypeExpectation;
use crate::function::{Function, Package};
use crate::inference::{CommonTypeFinder, collect_generic_candidates};
use crate::path::{PathAnalyser, PathIncident};
use crate::resolve::TypeResolver;
use crate::scoper::SemanticScoper;
use crate::semantic::AnalysisOptions;
use crate::storage::{StorageType, classify, represented};

/// Analyses one function body: types every expression exactly once and
/// rewrites argument, initializer and return slots so that each value is
/// held the way its use site needs it.
pub struct FunctionAnalyser<'a> {
    pub(crate) package: &'a Package,
    pub(crate) function: &'a Function,
    pub(crate) body: &'a mut FunctionBody,
    pub(crate) options: &'a AnalysisOptions,
    pub(crate) type_context: TypeContext,
    sink: &'a DiagnosticSink,
    scoper: SemanticScoper,
    path_analyser: PathAnalyser,
    /// Bindings declared without a value, in declaration order.
    deferred: Vec<DeferredBinding>,
}

#[derive(Clone, Debug)]
struct DeferredBinding {
    id: VariableId,
    name: String,
    mutable: bool,
    span: Span,
}

impl<'a> FunctionAnalyser<'a> {
    pub fn new(
        package: &'a Package,
        function: FunctionId,
        body: &'a mut FunctionBody,
        sink: &'a DiagnosticSink,
        options: &'a AnalysisOptions,
    ) -> Self {
        let function = package.function(function);
        Self {
            package,
            function,
            body,
            options,
            type_context: function.type_context(&package.registry),
            sink,
            scoper: SemanticScoper::scoper_for_function(function),
            path_analyser: PathAnalyser::new(),
            deferred: Vec::new(),
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        &self.package.registry
    }

    pub fn function(&self) -> &'a Function {
        self.function
    }

    pub fn type_context(&self) -> &TypeContext {
        &self.type_context
    }

    pub fn scoper(&self) -> &SemanticScoper {
        &self.scoper
    }

    pub fn path_analyser(&self) -> &PathAnalyser {
        &self.path_analyser
    }

    /// Analyses every statement. Errors are reported per statement and
    /// analysis continues with the next one.
    #[tracing::instrument(level = "debug", skip(self), fields(function = %self.function.qualified_name()))]
    pub fn analyse(&mut self) {
        let mut stmts = std::mem::take(&mut self.body.stmts);
        for stmt in &mut stmts {
            if let Err(error) = self.analyse_stmt(stmt) {
                self.report(error);
            }
        }
        self.body.stmts = stmts;
        self.analyse_return();
        self.analyse_initialization_requirements();
        self.body.variable_count = self.scoper.variable_count();
    }

    pub(crate) fn report(&self, error: SemanticError) {
        self.sink.report(&self.function.qualified_name(), error);
    }

    pub(crate) fn span_of(&self, slot: ExprId) -> Span {
        self.body.arena.get(slot).span
    }

    pub(crate) fn resolve_type(&self, type_ref: &TypeRef) -> Result<Type, SemanticError> {
        TypeResolver::new(self.registry(), self.function).resolve(type_ref)
    }

    fn analyse_stmt(&mut self, stmt: &mut Stmt) -> Result<(), SemanticError> {
        match stmt {
            Stmt::Let(let_stmt) => {
                self.analyse_let(let_stmt);
                Ok(())
            }
            Stmt::Assign(assign) => self.analyse_assign(assign),
            Stmt::Expr(slot) => self.analyse_expr(*slot, None).map(|_| ()),
            Stmt::Return(ret) => self.analyse_return_stmt(ret),
        }
    }

    fn analyse_let(&mut self, stmt: &mut LetStmt) {
        let (ty, deferred) = match self.let_type(stmt) {
            Ok(ty) => (ty, stmt.init.is_none()),
            Err(error) => {
                self.report(error);
                (Type::Error, false)
            }
        };
        let id = self.scoper.declare(&stmt.name.node, ty.clone(), stmt.mutable);
        if deferred {
            self.deferred.push(DeferredBinding {
                id,
                name: stmt.name.node.clone(),
                mutable: stmt.mutable,
                span: stmt.span,
            });
        } else {
            self.path_analyser
                .record_incident(PathIncident::InitializedVariable(id));
        }
        stmt.variable = Some(id);
        stmt.resolved = Some(ty);
    }

    fn let_type(&mut self, stmt: &LetStmt) -> Result<Type, SemanticError> {
        match (&stmt.ty, stmt.init) {
            (Some(written), None) => self.resolve_type(written),
            (Some(written), Some(init)) => {
                let declared = self.resolve_type(written)?;
                // The binding keeps its declared type even if the initializer is wrong.
                if let Err(error) = self.expect_type(&declared, init, None) {
                    self.report(error);
                }
                Ok(declared)
            }
            (None, Some(init)) => {
                let ty = self.analyse_expr(init, None)?;
                let expectation = TypeExpectation::prefer_simple(ty.erased());
                self.comply(ty, &expectation, init)
            }
            (None, None) => Err(SemanticError::MissingTypeAnnotation {
                name: stmt.name.node.clone(),
                span: stmt.span,
            }),
        }
    }

    fn is_deferred(&self, id: VariableId) -> bool {
        self.deferred.iter().any(|binding| binding.id == id)
    }

    fn is_initialized(&self, id: VariableId) -> bool {
        !self.is_deferred(id)
            || self
                .path_analyser
                .has_certainly(PathIncident::InitializedVariable(id))
    }

    fn analyse_assign(&mut self, stmt: &mut AssignStmt) -> Result<(), SemanticError> {
        let variable = self
            .scoper
            .resolve(&stmt.target.node)
            .ok_or_else(|| SemanticError::Unresolved {
                what: "variable",
                name: stmt.target.node.clone(),
                span: stmt.target.span,
            })?;
        stmt.variable = Some(variable.id);
        // An immutable binding declared without a value takes exactly one assignment.
        let first_initialization = self.is_deferred(variable.id) && !self.is_initialized(variable.id);
        if !variable.mutable && !first_initialization {
            return Err(SemanticError::ImmutableAssignment {
                name: stmt.target.node.clone(),
                span: stmt.span,
            });
        }
        self.expect_type(&variable.ty, stmt.value, None)?;
        self.path_analyser
            .record_incident(PathIncident::InitializedVariable(variable.id));
        Ok(())
    }

    fn analyse_return_stmt(&mut self, stmt: &ReturnStmt) -> Result<(), SemanticError> {
        self.path_analyser.record_incident(PathIncident::Returned);
        let ret = self.function.ret.clone();
        match stmt.value {
            Some(value) => {
                self.expect_type(&ret, value, None)?;
            }
            None if ret != Type::Nothing => {
                return Err(SemanticError::type_mismatch(&ret, &Type::Nothing, stmt.span));
            }
            None => {}
        }
        Ok(())
    }

    /// Immutable bindings declared without a value must be assigned before
    /// the body ends.
    fn analyse_initialization_requirements(&mut self) {
        let missing: Vec<SemanticError> = self
            .deferred
            .iter()
            .filter(|binding| !binding.mutable)
            .filter(|binding| {
                !self
                    .path_analyser
                    .has_certainly(PathIncident::InitializedVariable(binding.id))
            })
            .map(|binding| SemanticError::NeverInitialized {
                name: binding.name.clone(),
                span: binding.span,
            })
            .collect();
        for error in missing {
            self.report(error);
        }
    }

    fn analyse_return(&mut self) {
        if self.function.ret != Type::Nothing
            && !self.path_analyser.has_certainly(PathIncident::Returned)
        {
            self.report(SemanticError::MissingReturn {
                function: self.function.qualified_name(),
                span: self.function.span,
            });
        }
    }

    /// Analyses `slot` against `ty`.
    ///
    /// With `collect`, the observed type is folded into the accumulators of
    /// the generic variables `ty` mentions and nothing is inserted. Without
    /// it, the value must be a subtype of `ty` and is made to comply with
    /// `ty`'s storage.
    pub fn expect_type(
        &mut self,
        ty: &Type,
        slot: ExprId,
        collect: Option<&mut [CommonTypeFinder]>,
    ) -> Result<Type, SemanticError> {
        match collect {
            Some(finders) => {
                let actual = self.analyse_expr(slot, None)?;
                collect_generic_candidates(ty, &actual, finders, self.registry(), &self.type_context);
                Ok(actual)
            }
            None => self.expect(&TypeExpectation::new(ty.clone()), slot),
        }
    }

    pub fn expect(
        &mut self,
        expectation: &TypeExpectation,
        slot: ExprId,
    ) -> Result<Type, SemanticError> {
        let ty = self.analyse_expr(slot, Some(expectation))?;
        if !self
            .registry()
            .is_subtype(&ty, &expectation.ty, &self.type_context)
        {
            return Err(SemanticError::type_mismatch(
                &expectation.ty,
                &ty,
                self.span_of(slot),
            ));
        }
        self.comply(ty, expectation, slot)
    }

    /// Types the node in `slot`. A node that already has a type is not
    /// analysed again.
    pub fn analyse_expr(
        &mut self,
        slot: ExprId,
        expectation: Option<&TypeExpectation>,
    ) -> Result<Type, SemanticError> {
        if let Some(ty) = &self.body.arena.get(slot).ty {
            return Ok(ty.clone());
        }
        let span = self.span_of(slot);
        let ty = match self.body.arena.get(slot).kind.clone() {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::RealLit(_) => Type::Real,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::StringLit(_) => Type::string(),
            ExprKind::SymbolLit(_) => Type::Symbol,
            ExprKind::NoValue => self.no_value_type(expectation, span)?,
            ExprKind::Local(local) => self.analyse_local(slot, &local)?,
            ExprKind::Call(call) => self.analyse_call(slot, &call)?,
            ExprKind::MethodCall(call) => self.analyse_method_call(slot, &call)?,
            ExprKind::Invoke { callee, args } => self.analyse_invoke(callee, &args, span)?,
            ExprKind::Closure(closure) => self.analyse_closure(slot, &closure)?,
            ExprKind::TypeExpr(type_expr) => {
                let ty = self.type_expr_type(&type_expr, expectation, span)?;
                self.validate_metability(&ty, span)?;
                Type::meta(ty)
            }
            ExprKind::Unwrap(inner) => self.analyse_unwrap(inner, span)?,
            ExprKind::Conversion { inner, .. } => self.analyse_expr(inner, expectation)?,
        };
        self.body.arena.get_mut(slot).ty = Some(ty.clone());
        Ok(ty)
    }

    /// Analyses a type expression and returns the type it denotes, resolved
    /// on the enclosing generic arguments and constraints.
    pub fn analyse_type_expr(
        &mut self,
        slot: ExprId,
        expectation: &TypeExpectation,
    ) -> Result<Type, SemanticError> {
        match self.analyse_expr(slot, Some(expectation))? {
            Type::TypeAsValue(ty) => Ok(self
                .type_context
                .resolve_on_super_arguments_and_constraints(&ty)),
            Type::Error => Ok(Type::Error),
            other => Err(SemanticError::type_mismatch(
                &Type::meta(Type::Something),
                &other,
                self.span_of(slot),
            )),
        }
    }

    fn type_expr_type(
        &self,
        type_expr: &TypeExpr,
        expectation: Option<&TypeExpectation>,
        span: Span,
    ) -> Result<Type, SemanticError> {
        match type_expr {
            TypeExpr::Explicit(written) => self.resolve_type(written),
            TypeExpr::Inferred => match expectation.map(|e| e.ty.unboxed()) {
                Some(Type::TypeAsValue(ty)) => Ok((**ty).clone()),
                _ => Err(SemanticError::Unresolved {
                    what: "type",
                    name: "_".to_string(),
                    span,
                }),
            },
            TypeExpr::This => self
                .function
                .owner
                .clone()
                .ok_or_else(|| SemanticError::Unresolved {
                    what: "type",
                    name: "This".to_string(),
                    span,
                }),
        }
    }

    /// "No value" takes the expected optional type, in the storage the
    /// expectation asks for, so it never needs a conversion.
    fn no_value_type(
        &self,
        expectation: Option<&TypeExpectation>,
        span: Span,
    ) -> Result<Type, SemanticError> {
        let Some(expectation) = expectation else {
            return Err(SemanticError::NoValueWithoutOptional { span });
        };
        match expectation.ty.unboxed() {
            Type::Optional(_) => {
                let storage = expectation.target_storage(&expectation.ty);
                Ok(represented(&expectation.ty, storage))
            }
            Type::Error => Ok(Type::Error),
            _ => Err(SemanticError::NoValueWithoutOptional { span }),
        }
    }

    /// Types without a single runtime meta cannot be used as values.
    pub fn validate_metability(&self, ty: &Type, span: Span) -> Result<(), SemanticError> {
        match ty.unboxed() {
            Type::Protocol(_)
            | Type::Optional(_)
            | Type::Callable { .. }
            | Type::Something
            | Type::Nothing
            | Type::TypeAsValue(_) => Err(SemanticError::NotMetable {
                ty: ty.display(),
                span,
            }),
            _ => Ok(()),
        }
    }

    fn analyse_local(&mut self, slot: ExprId, local: &LocalRef) -> Result<Type, SemanticError> {
        let variable =
            self.scoper
                .resolve(&local.name.node)
                .ok_or_else(|| SemanticError::Unresolved {
                    what: "variable",
                    name: local.name.node.clone(),
                    span: local.name.span,
                })?;
        if let ExprKind::Local(node) = &mut self.body.arena.get_mut(slot).kind {
            node.variable = Some(variable.id);
        }
        if !self.is_initialized(variable.id) {
            return Err(SemanticError::Uninitialized {
                name: local.name.node.clone(),
                span: local.name.span,
            });
        }
        Ok(variable.ty)
    }

    fn analyse_call(&mut self, slot: ExprId, call: &CallExpr) -> Result<Type, SemanticError> {
        let id = self
            .package
            .lookup_function(&call.function.node)
            .ok_or_else(|| SemanticError::Unresolved {
                what: "function",
                name: call.function.node.clone(),
                span: call.function.span,
            })?;
        if let ExprKind::Call(node) = &mut self.body.arena.get_mut(slot).kind {
            node.target = Some(id);
        }
        self.analyse_function_call(slot, &Type::Nothing, id)
    }

    fn analyse_method_call(
        &mut self,
        slot: ExprId,
        call: &MethodCallExpr,
    ) -> Result<Type, SemanticError> {
        let receiver = self.analyse_expr(call.receiver, None)?;
        let expectation = TypeExpectation::prefer_simple(receiver.erased());
        let receiver = self.comply(receiver, &expectation, call.receiver)?;
        // Generic receivers dispatch through their constraint.
        let callee = self
            .type_context
            .resolve_on_super_arguments_and_constraints(&receiver.erased());
        let id = self
            .package
            .lookup_method(&callee, &call.method.node)
            .ok_or_else(|| SemanticError::Unresolved {
                what: "method",
                name: format!("{}.{}", callee.display(), call.method.node),
                span: call.method.span,
            })?;
        if let ExprKind::MethodCall(node) = &mut self.body.arena.get_mut(slot).kind {
            node.target = Some(id);
        }
        self.analyse_function_call(slot, &callee, id)
    }

    fn analyse_invoke(
        &mut self,
        callee: ExprId,
        args: &[ExprId],
        span: Span,
    ) -> Result<Type, SemanticError> {
        let callee_type = self.analyse_expr(callee, None)?;
        if callee_type.is_error() {
            return Ok(Type::Error);
        }
        let Type::Callable { params, ret } = callee_type.unboxed().clone() else {
            return Err(SemanticError::TypeMismatch {
                expected: "a callable".to_string(),
                actual: callee_type.display(),
                span: self.span_of(callee),
            });
        };
        if params.len() != args.len() {
            return Err(SemanticError::ArgumentCount {
                function: callee_type.display(),
                expected: params.len(),
                actual: args.len(),
                span,
            });
        }
        // Arguments are passed the way the callable value holds its parameters.
        for (param, &arg) in params.iter().zip(args) {
            self.expect(&TypeExpectation::new(param.clone()), arg)?;
        }
        Ok(*ret)
    }

    fn analyse_closure(&mut self, slot: ExprId, closure: &Closure) -> Result<Type, SemanticError> {
        let params = closure
            .params
            .iter()
            .map(|p| self.resolve_type(&p.ty))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = self.resolve_type(&closure.ret)?;

        self.scoper.enter_closure();
        let ids: Vec<_> = closure
            .params
            .iter()
            .zip(&params)
            .map(|(p, ty)| self.scoper.declare(&p.name.node, ty.clone(), false))
            .collect();
        let body = self.expect_type(&ret, closure.body, None);
        let captures = self.scoper.exit_closure();

        if let ExprKind::Closure(node) = &mut self.body.arena.get_mut(slot).kind {
            for (param, id) in node.params.iter_mut().zip(ids) {
                param.variable = Some(id);
            }
            node.captures = captures;
        }
        body?;
        Ok(Type::callable(params, ret))
    }

    fn analyse_unwrap(&mut self, inner: ExprId, span: Span) -> Result<Type, SemanticError> {
        let ty = self.analyse_expr(inner, None)?;
        if ty.is_error() {
            return Ok(Type::Error);
        }
        let Some(value) = ty.optional_inner().cloned() else {
            return Err(SemanticError::TypeMismatch {
                expected: "an optional".to_string(),
                actual: ty.display(),
                span,
            });
        };
        let (op, result) = match classify(&ty) {
            StorageType::SimpleOptional => (BoxingOp::UnwrapOptional, value),
            StorageType::Box | StorageType::Simple => (
                BoxingOp::UnwrapBoxOptional,
                represented(&value, StorageType::Box),
            ),
        };
        Ok(self.insert_conversion(inner, op, result))
    }
}
