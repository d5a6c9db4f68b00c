#![forbid(unsafe_code)]

use std::collections::HashSet;

use ember_ast::VariableId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathIncident {
    Returned,
    /// A binding declared without a value has been assigned one.
    InitializedVariable(VariableId),
}

/// Facts about the control-flow paths analysed so far. Bodies are straight
/// line, so there is a single path.
#[derive(Clone, Debug, Default)]
pub struct PathAnalyser {
    incidents: HashSet<PathIncident>,
}

impl PathAnalyser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_incident(&mut self, incident: PathIncident) {
        self.incidents.insert(incident);
    }

    pub fn has_certainly(&self, incident: PathIncident) -> bool {
        self.incidents.contains(&incident)
    }
}
