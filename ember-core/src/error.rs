#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use ember_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[allow(unused_assignments)]
pub enum SemanticError {
    #[error("type mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(ember::type_mismatch))]
    TypeMismatch {
        expected: String,
        actual: String,
        #[label]
        span: Span,
    },

    #[error("cannot infer generic argument {parameter} of {function}: {reason}")]
    #[diagnostic(
        code(ember::inference),
        help("provide the generic arguments explicitly")
    )]
    InferenceFailure {
        function: String,
        parameter: String,
        reason: String,
        #[label]
        span: Span,
    },

    #[error("{function} is not accessible from {context}")]
    #[diagnostic(code(ember::access))]
    AccessViolation {
        function: String,
        context: String,
        #[label]
        span: Span,
    },

    #[error("{function} is deprecated")]
    #[diagnostic(code(ember::deprecated), severity(Warning))]
    Deprecated {
        function: String,
        #[help]
        note: Option<String>,
        #[label]
        span: Span,
    },

    #[error("{function} takes {expected} argument(s), {actual} supplied")]
    #[diagnostic(code(ember::arguments))]
    ArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
        #[label]
        span: Span,
    },

    #[error("unknown {what} '{name}'")]
    #[diagnostic(code(ember::unresolved))]
    Unresolved {
        what: &'static str,
        name: String,
        #[label]
        span: Span,
    },

    #[error("{ty} cannot be used as a type value")]
    #[diagnostic(code(ember::metability))]
    NotMetable {
        ty: String,
        #[label]
        span: Span,
    },

    #[error("{function} does not return a value on every path")]
    #[diagnostic(code(ember::missing_return))]
    MissingReturn {
        function: String,
        #[label]
        span: Span,
    },

    #[error("cannot assign to immutable variable '{name}'")]
    #[diagnostic(code(ember::immutable))]
    ImmutableAssignment {
        name: String,
        #[label]
        span: Span,
    },

    #[error("'{name}' is used before it is initialized")]
    #[diagnostic(code(ember::uninitialized))]
    Uninitialized {
        name: String,
        #[label]
        span: Span,
    },

    #[error("'{name}' is never initialized")]
    #[diagnostic(
        code(ember::never_initialized),
        help("assign it on every path or give it an initial value")
    )]
    NeverInitialized {
        name: String,
        #[label]
        span: Span,
    },

    #[error("no value can only be used where an optional is expected")]
    #[diagnostic(code(ember::no_value))]
    NoValueWithoutOptional {
        #[label]
        span: Span,
    },

    #[error("'{name}' needs a type when declared without a value")]
    #[diagnostic(code(ember::missing_type))]
    MissingTypeAnnotation {
        name: String,
        #[label]
        span: Span,
    },
}

impl SemanticError {
    pub fn type_mismatch(expected: &ember_types::Type, actual: &ember_types::Type, span: Span) -> Self {
        SemanticError::TypeMismatch {
            expected: expected.display(),
            actual: actual.display(),
            span,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, SemanticError::Deprecated { .. })
    }

    pub fn span(&self) -> Span {
        match self {
            SemanticError::TypeMismatch { span, .. }
            | SemanticError::InferenceFailure { span, .. }
            | SemanticError::AccessViolation { span, .. }
            | SemanticError::Deprecated { span, .. }
            | SemanticError::ArgumentCount { span, .. }
            | SemanticError::Unresolved { span, .. }
            | SemanticError::NotMetable { span, .. }
            | SemanticError::MissingReturn { span, .. }
            | SemanticError::ImmutableAssignment { span, .. }
            | SemanticError::Uninitialized { span, .. }
            | SemanticError::NeverInitialized { span, .. }
            | SemanticError::NoValueWithoutOptional { span }
            | SemanticError::MissingTypeAnnotation { span, .. } => *span,
        }
    }
}
