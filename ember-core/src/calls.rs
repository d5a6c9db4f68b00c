#![forbid(unsafe_code)]

use ember_ast::{Arguments, ExprId, ExprKind, FunctionId, Span};
use ember_types::{Type, TypeContext};

use crate::analyser::FunctionAnalyser;
use crate::error::SemanticError;
use crate::expectation::TypeExpectation;
use crate::function::{Access, Function};
use crate::inference::CommonTypeFinder;
use crate::resolve::TypeResolver;

impl<'a> FunctionAnalyser<'a> {
    /// Analyses a call of `function` on `callee_type` (`Nothing` for free
    /// functions) and returns the resolved return type.
    pub fn analyse_function_call(
        &mut self,
        call: ExprId,
        callee_type: &Type,
        function: FunctionId,
    ) -> Result<Type, SemanticError> {
        let package = self.package;
        let target = package.function(function);
        let arguments = self.arguments_of(call, target)?;

        self.check_function_use(target, arguments.span)?;
        if arguments.args.len() != target.params.len() {
            return Err(SemanticError::ArgumentCount {
                function: target.qualified_name(),
                expected: target.params.len(),
                actual: arguments.args.len(),
                span: arguments.span,
            });
        }

        let generic_args = self.ensure_generic_arguments(call, callee_type, function)?;
        let context = self
            .callee_context(callee_type, target)
            .with_generic_args(generic_args);
        for (param, &arg) in target.params.iter().zip(&arguments.args) {
            let expectation = TypeExpectation::new(context.resolve_on(&param.ty));
            self.expect(&expectation, arg)?;
        }
        Ok(context.resolve_on(&target.ret))
    }

    /// Access check plus deprecation warning. Only the access check fails.
    pub fn check_function_use(&self, function: &Function, span: Span) -> Result<(), SemanticError> {
        let same_package = function.package == self.function.package;
        let accessible = match function.access {
            Access::Public => true,
            Access::Private => match (&function.owner, &self.function.owner) {
                (Some(owner), Some(context)) => owner.nominal_name() == context.nominal_name(),
                (Some(_), None) => false,
                (None, _) => same_package,
            },
            Access::Protected => match (&function.owner, &self.function.owner) {
                (Some(owner), Some(context)) => self.inherits_from(context, owner),
                (Some(_), None) => false,
                (None, _) => same_package,
            },
        };
        if !accessible {
            return Err(SemanticError::AccessViolation {
                function: function.qualified_name(),
                context: self.function.qualified_name(),
                span,
            });
        }
        if function.deprecated.is_some() {
            self.deprecated_warning(function, span);
        }
        Ok(())
    }

    pub fn deprecated_warning(&self, function: &Function, span: Span) {
        if !self.options.warn_deprecated {
            return;
        }
        self.report(SemanticError::Deprecated {
            function: function.qualified_name(),
            note: function.deprecated.clone().filter(|note| !note.is_empty()),
            span,
        });
    }

    /// Validates written generic arguments or infers missing ones, and
    /// stores the result on the call's arguments.
    pub fn ensure_generic_arguments(
        &mut self,
        call: ExprId,
        callee_type: &Type,
        function: FunctionId,
    ) -> Result<Vec<Type>, SemanticError> {
        let package = self.package;
        let target = package.function(function);
        let arguments = self.arguments_of(call, target)?;

        let resolved = if !arguments.generic_args.is_empty() {
            self.check_generic_arguments(target, callee_type, &arguments)?
        } else if target.is_generic() {
            self.infer_generic_arguments(target, callee_type, &arguments)?
        } else {
            Vec::new()
        };

        match &mut self.body.arena.get_mut(call).kind {
            ExprKind::Call(node) => node.arguments.resolved_generic_args = resolved.clone(),
            ExprKind::MethodCall(node) => node.arguments.resolved_generic_args = resolved.clone(),
            _ => {}
        }
        Ok(resolved)
    }

    fn check_generic_arguments(
        &self,
        target: &Function,
        callee_type: &Type,
        arguments: &Arguments,
    ) -> Result<Vec<Type>, SemanticError> {
        let generics = &target.generic_params;
        if arguments.generic_args.len() != generics.len() {
            let parameter = if generics.is_empty() {
                "<none>".to_string()
            } else {
                generics
                    .iter()
                    .map(|g| g.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(SemanticError::InferenceFailure {
                function: target.qualified_name(),
                parameter,
                reason: format!(
                    "{} generic argument(s) expected, {} supplied",
                    generics.len(),
                    arguments.generic_args.len()
                ),
                span: arguments.span,
            });
        }

        let context = self.callee_context(callee_type, target);
        let resolver = TypeResolver::new(self.registry(), self.function);
        let mut resolved = Vec::with_capacity(generics.len());
        for (written, generic) in arguments.generic_args.iter().zip(generics) {
            let ty = resolver.resolve(written)?;
            let constraint = context.resolve_on_super_arguments_and_constraints(&generic.constraint);
            if !self.registry().is_subtype(&ty, &constraint, &self.type_context) {
                return Err(SemanticError::type_mismatch(&constraint, &ty, written.span));
            }
            resolved.push(ty);
        }
        Ok(resolved)
    }

    /// Two passes: here every argument whose parameter mentions a generic
    /// variable is analysed and its type recorded; the caller then checks
    /// all arguments against the inferred signature. Nodes keep the type
    /// from the first pass, so none is analysed twice.
    fn infer_generic_arguments(
        &mut self,
        target: &'a Function,
        callee_type: &Type,
        arguments: &Arguments,
    ) -> Result<Vec<Type>, SemanticError> {
        let context = self.callee_context(callee_type, target);
        let mut finders = vec![CommonTypeFinder::new(); target.generic_params.len()];
        for (param, &arg) in target.params.iter().zip(&arguments.args) {
            if param.ty.mentions_local_generics() {
                let declared = context.resolve_on(&param.ty);
                self.expect_type(&declared, arg, Some(finders.as_mut_slice()))?;
            }
        }

        let mut inferred = Vec::with_capacity(finders.len());
        for (generic, finder) in target.generic_params.iter().zip(&finders) {
            let ty = finder
                .common_type()
                .map_err(|problem| SemanticError::InferenceFailure {
                    function: target.qualified_name(),
                    parameter: generic.name.clone(),
                    reason: problem.describe(),
                    span: arguments.span,
                })?;
            let constraint = context.resolve_on_super_arguments_and_constraints(&generic.constraint);
            if !self.registry().is_subtype(&ty, &constraint, &self.type_context) {
                return Err(SemanticError::InferenceFailure {
                    function: target.qualified_name(),
                    parameter: generic.name.clone(),
                    reason: format!(
                        "inferred {} does not satisfy {}",
                        ty.display(),
                        constraint.display()
                    ),
                    span: arguments.span,
                });
            }
            tracing::debug!(
                function = %target.qualified_name(),
                parameter = %generic.name,
                inferred = %ty.display(),
                "inferred generic argument"
            );
            inferred.push(ty);
        }
        Ok(inferred)
    }

    fn callee_context(&self, callee_type: &Type, target: &Function) -> TypeContext {
        let mut context = target.type_context(self.registry());
        if *callee_type != Type::Nothing {
            context.callee = Some(callee_type.clone());
        }
        context
    }

    fn arguments_of(&self, call: ExprId, target: &Function) -> Result<Arguments, SemanticError> {
        match &self.body.arena.get(call).kind {
            ExprKind::Call(node) => Ok(node.arguments.clone()),
            ExprKind::MethodCall(node) => Ok(node.arguments.clone()),
            _ => Err(SemanticError::Unresolved {
                what: "call",
                name: target.qualified_name(),
                span: self.span_of(call),
            }),
        }
    }

    fn inherits_from(&self, sub: &Type, owner: &Type) -> bool {
        let mut current = Some(sub.unboxed().clone());
        while let Some(ty) = current {
            if ty.nominal_name() == owner.nominal_name() {
                return true;
            }
            current = self.registry().superclass_of(&ty);
        }
        false
    }
}
