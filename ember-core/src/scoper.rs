#![forbid(unsafe_code)]

use std::collections::HashMap;

use ember_ast::VariableId;
use ember_types::Type;

use crate::function::Function;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub id: VariableId,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Clone, Debug)]
struct ClosureFrame {
    /// Scopes below this index belong to the enclosing function.
    base: usize,
    captures: Vec<VariableId>,
}

/// Lexical scopes of one function. Variable ids are unique per function so
/// codegen can size its own scoper from `variable_count`.
#[derive(Clone, Debug)]
pub struct SemanticScoper {
    scopes: Vec<HashMap<String, Variable>>,
    closures: Vec<ClosureFrame>,
    next_id: u32,
}

impl SemanticScoper {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            closures: Vec::new(),
            next_id: 0,
        }
    }

    /// Scoper with the function's parameters declared as ids `0..n`.
    pub fn scoper_for_function(function: &Function) -> Self {
        let mut scoper = Self::new();
        for param in &function.params {
            scoper.declare(&param.name, param.ty.clone(), false);
        }
        scoper
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Declares `name` in the innermost scope, shadowing outer bindings.
    pub fn declare(&mut self, name: &str, ty: Type, mutable: bool) -> VariableId {
        let id = VariableId(self.next_id);
        self.next_id += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Variable { id, ty, mutable });
        }
        id
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Looks `name` up for a read. Variables found outside an open closure
    /// are recorded as captures of that closure.
    pub fn resolve(&mut self, name: &str) -> Option<Variable> {
        let (depth, variable) = self
            .scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, s)| s.get(name).map(|v| (i, v.clone())))?;
        for frame in &mut self.closures {
            if depth < frame.base && !frame.captures.contains(&variable.id) {
                frame.captures.push(variable.id);
            }
        }
        Some(variable)
    }

    pub fn enter_closure(&mut self) {
        self.closures.push(ClosureFrame {
            base: self.scopes.len(),
            captures: Vec::new(),
        });
        self.push_scope();
    }

    /// Closes the innermost closure and returns what it captured.
    pub fn exit_closure(&mut self) -> Vec<VariableId> {
        self.pop_scope();
        self.closures
            .pop()
            .map(|frame| frame.captures)
            .unwrap_or_default()
    }

    pub fn variable_count(&self) -> u32 {
        self.next_id
    }
}

impl Default for SemanticScoper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_restore() {
        let mut scoper = SemanticScoper::new();
        let outer = scoper.declare("x", Type::Int, false);
        scoper.push_scope();
        let inner = scoper.declare("x", Type::string(), true);
        assert_eq!(scoper.lookup("x").map(|v| v.id), Some(inner));
        scoper.pop_scope();
        assert_eq!(scoper.lookup("x").map(|v| v.id), Some(outer));
        assert_eq!(scoper.variable_count(), 2);
    }

    #[test]
    fn closures_record_outer_reads_once() {
        let mut scoper = SemanticScoper::new();
        let outer = scoper.declare("x", Type::Int, false);
        scoper.enter_closure();
        let param = scoper.declare("y", Type::Int, false);
        assert!(scoper.resolve("x").is_some());
        assert!(scoper.resolve("x").is_some());
        assert!(scoper.resolve("y").is_some());
        let captures = scoper.exit_closure();
        assert_eq!(captures, vec![outer]);
        assert_ne!(captures[0], param);
    }
}
