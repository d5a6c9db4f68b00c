#![forbid(unsafe_code)]

pub mod analyser;
pub mod boxing;
pub mod calls;
pub mod diagnostics;
pub mod error;
pub mod expectation;
pub mod function;
pub mod inference;
pub mod path;
pub mod resolve;
pub mod scoper;
pub mod semantic;
pub mod storage;

pub use analyser::FunctionAnalyser;
pub use boxing::{callable_adapter, conversion_between, representations_differ};
pub use diagnostics::{DiagnosticSink, Reported};
pub use error::SemanticError;
pub use expectation::TypeExpectation;
pub use function::{Access, Function, GenericParam, Package, Param};
pub use inference::{CommonTypeFinder, InferenceProblem, collect_generic_candidates};
pub use path::{PathAnalyser, PathIncident};
pub use resolve::TypeResolver;
pub use scoper::{SemanticScoper, Variable};
pub use semantic::{AnalysisOptions, SemanticAnalyser};
pub use storage::{BoxingPolicy, StorageType, classify, represented};
