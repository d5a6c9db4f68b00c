#![forbid(unsafe_code)]

use std::sync::{Mutex, PoisonError};

use crate::error::SemanticError;

/// A diagnostic attributed to the function whose analysis produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reported {
    pub function: String,
    pub error: SemanticError,
}

/// Per-compilation diagnostic sink. Each function analysis appends from its
/// own worker; appends are serialized internally.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Mutex<Vec<Reported>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, function: &str, error: SemanticError) {
        tracing::debug!(function, %error, "diagnostic");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Reported {
                function: function.to_string(),
                error,
            });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| !r.error.is_warning())
    }

    /// Snapshot ordered by function name, then source offset.
    pub fn entries(&self) -> Vec<Reported> {
        let mut out = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sort_reports(&mut out);
        out
    }

    pub fn into_entries(self) -> Vec<Reported> {
        let mut out = self.entries.into_inner().unwrap_or_else(PoisonError::into_inner);
        sort_reports(&mut out);
        out
    }
}

fn sort_reports(reports: &mut [Reported]) {
    reports.sort_by(|a, b| {
        a.function
            .cmp(&b.function)
            .then_with(|| a.error.span().offset().cmp(&b.error.span().offset()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::span;

    #[test]
    fn concurrent_reports_are_all_kept() {
        let sink = DiagnosticSink::new();
        std::thread::scope(|s| {
            for i in 0..8 {
                let sink = &sink;
                s.spawn(move || {
                    sink.report(
                        &format!("f{i}"),
                        SemanticError::MissingReturn {
                            function: format!("f{i}"),
                            span: span(i, 1),
                        },
                    );
                });
            }
        });
        assert_eq!(sink.len(), 8);
        assert!(sink.has_errors());
        let names: Vec<_> = sink.entries().into_iter().map(|r| r.function).collect();
        assert_eq!(names.first().map(String::as_str), Some("f0"));
    }
}
