#![forbid(unsafe_code)]

use ember_ast::VariableId;

/// Codegen-side variable storage, indexed by the ids semantic analysis
/// assigned. Ids are unique per function, so no nesting is tracked.
#[derive(Clone, Debug)]
pub struct CgScoper<T> {
    slots: Vec<Option<T>>,
}

impl<T> CgScoper<T> {
    pub fn new(variable_count: u32) -> Self {
        let mut slots = Vec::with_capacity(variable_count as usize);
        slots.resize_with(variable_count as usize, || None);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn set(&mut self, id: VariableId, value: T) {
        if id.index() >= self.slots.len() {
            self.slots.resize_with(id.index() + 1, || None);
        }
        self.slots[id.index()] = Some(value);
    }

    pub fn get(&self, id: VariableId) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }
}
