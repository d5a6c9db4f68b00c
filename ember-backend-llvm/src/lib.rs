#![forbid(unsafe_code)]

mod boxing;
mod bridge;
mod error;
mod function;
pub mod layout;
mod module;
mod scoper;
mod value;

pub use error::{CodegenError, LayoutError};
pub use function::{ArgumentStyle, FnCodeGenerator, LocalVariable};
pub use module::{BOX_TYPE, CodeGenerator, CodegenOptions, META_TYPE};
pub use scoper::CgScoper;
pub use value::Value;

use ember_ast::{FunctionBody, FunctionId};
use ember_core::Package;

#[derive(Clone, Debug)]
pub struct LlvmArtifacts {
    pub llvm_ir: String,
}

/// Emits textual LLVM IR for analysed `bodies` of `package`.
pub fn emit_llvm_ir(
    package: &Package,
    bodies: &[(FunctionId, FunctionBody)],
    options: CodegenOptions,
) -> Result<LlvmArtifacts, CodegenError> {
    let llvm_ir = CodeGenerator::new(package, options).generate(bodies)?;
    Ok(LlvmArtifacts { llvm_ir })
}
