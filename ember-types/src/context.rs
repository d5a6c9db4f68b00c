#![forbid(unsafe_code)]

use crate::types::Type;

/// The generic environment a type is interpreted in: the callee type that
/// owns the function (type-level generics) and the function's own generic
/// arguments and constraints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeContext {
    pub callee: Option<Type>,
    pub callee_constraints: Vec<Type>,
    pub generic_args: Vec<Type>,
    pub generic_constraints: Vec<Type>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_callee(callee: Type) -> Self {
        Self {
            callee: Some(callee),
            ..Self::default()
        }
    }

    pub fn with_generic_constraints(mut self, constraints: Vec<Type>) -> Self {
        self.generic_constraints = constraints;
        self
    }

    pub fn with_generic_args(mut self, args: Vec<Type>) -> Self {
        self.generic_args = args;
        self
    }

    fn callee_arg(&self, index: usize) -> Option<&Type> {
        match self.callee.as_ref().map(Type::unboxed) {
            Some(Type::Class { args, .. }) | Some(Type::ValueType { args, .. }) => args.get(index),
            _ => None,
        }
    }

    /// Constraint of a generic variable as seen from this context.
    pub fn constraint_of(&self, ty: &Type) -> Option<Type> {
        match ty {
            Type::LocalGenericVariable { index, .. } => Some(
                self.generic_constraints
                    .get(*index)
                    .cloned()
                    .unwrap_or(Type::Something),
            ),
            Type::GenericVariable { index, .. } => Some(
                self.callee_constraints
                    .get(*index)
                    .cloned()
                    .unwrap_or(Type::Something),
            ),
            _ => None,
        }
    }

    /// Substitutes generic variables with the known arguments. Substituted
    /// positions stay in box storage: the callee is compiled once for every
    /// instantiation and only ever sees boxes there.
    pub fn resolve_on(&self, ty: &Type) -> Type {
        ty.map(&|t| match t {
            Type::LocalGenericVariable { index, .. } => {
                self.generic_args.get(*index).cloned().map(Type::boxed)
            }
            Type::GenericVariable { index, .. } => self.callee_arg(*index).cloned().map(Type::boxed),
            _ => None,
        })
    }

    /// Substitutes generic variables with callee arguments where known and
    /// with their constraints otherwise.
    pub fn resolve_on_super_arguments_and_constraints(&self, ty: &Type) -> Type {
        ty.map(&|t| match t {
            Type::LocalGenericVariable { index, .. } => Some(
                self.generic_args
                    .get(*index)
                    .cloned()
                    .or_else(|| self.constraint_of(t))
                    .unwrap_or(Type::Something),
            ),
            Type::GenericVariable { index, .. } => Some(
                self.callee_arg(*index)
                    .cloned()
                    .or_else(|| self.constraint_of(t))
                    .unwrap_or(Type::Something),
            ),
            _ => None,
        })
    }
}
