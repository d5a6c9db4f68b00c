#![forbid(unsafe_code)]

use ember_ast::{FunctionBody, FunctionId};
use rayon::prelude::*;

use crate::analyser::FunctionAnalyser;
use crate::diagnostics::{DiagnosticSink, Reported};
use crate::function::Package;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Analyse function bodies on the rayon pool.
    pub parallel: bool,
    /// Report calls of deprecated functions.
    pub warn_deprecated: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            warn_deprecated: true,
        }
    }
}

/// Package-level driver. Bodies share the immutable package; the sink is
/// the only state they write to in common.
pub struct SemanticAnalyser<'a> {
    package: &'a Package,
    options: AnalysisOptions,
    sink: DiagnosticSink,
}

impl<'a> SemanticAnalyser<'a> {
    pub fn new(package: &'a Package) -> Self {
        Self {
            package,
            options: AnalysisOptions::default(),
            sink: DiagnosticSink::new(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    #[tracing::instrument(level = "debug", skip_all, fields(package = %self.package.name, bodies = bodies.len()))]
    pub fn analyse(&self, bodies: &mut [(FunctionId, FunctionBody)]) {
        let analyse_one = |(id, body): &mut (FunctionId, FunctionBody)| {
            FunctionAnalyser::new(self.package, *id, body, &self.sink, &self.options).analyse();
        };
        if self.options.parallel {
            bodies.par_iter_mut().for_each(analyse_one);
        } else {
            bodies.iter_mut().for_each(analyse_one);
        }
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn into_diagnostics(self) -> Vec<Reported> {
        self.sink.into_entries()
    }
}
