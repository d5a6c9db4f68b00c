#![forbid(unsafe_code)]

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, PartialEq)]
#[allow(unused_assignments)]
pub enum CodegenError {
    #[error("expression reached code generation without a type")]
    #[diagnostic(
        code(ember::backend_llvm::unanalysed),
        help("run semantic analysis and check its diagnostics first")
    )]
    Unanalysed {
        #[label]
        span: SourceSpan,
    },

    #[error("call to `{name}` was never resolved")]
    #[diagnostic(code(ember::backend_llvm::unresolved))]
    Unresolved {
        name: String,
        #[label]
        span: SourceSpan,
    },

    #[error("variable #{index} has no value at this point")]
    #[diagnostic(code(ember::backend_llvm::variable))]
    UnboundVariable { index: u32 },

    #[error("LLVM backend error: {message}")]
    #[diagnostic(code(ember::backend_llvm))]
    Unsupported { message: String },
}

impl CodegenError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        CodegenError::Unsupported {
            message: message.into(),
        }
    }
}

/// Malformed images handed to the layout model.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{ty} cannot be held in a box or optional image")]
    #[diagnostic(code(ember::layout::unsupported))]
    UnsupportedType { ty: String },

    #[error("payload {word:#x} is not a valid {ty}")]
    #[diagnostic(code(ember::layout::payload))]
    InvalidPayload { ty: String, word: u64 },

    #[error("{ty} needs {expected} word(s), image holds {actual}")]
    #[diagnostic(code(ember::layout::width))]
    WidthMismatch {
        ty: String,
        expected: usize,
        actual: usize,
    },
}
