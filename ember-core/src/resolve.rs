#![forbid(unsafe_code)]

use ember_ast::{TypeRef, TypeRefKind};
use ember_types::{Type, TypeRegistry};

use crate::error::SemanticError;
use crate::function::Function;

/// Turns written types into semantic types as seen from inside `function`:
/// its own generic parameters and those of its owner type are in scope.
pub struct TypeResolver<'a> {
    registry: &'a TypeRegistry,
    function: &'a Function,
}

impl<'a> TypeResolver<'a> {
    pub fn new(registry: &'a TypeRegistry, function: &'a Function) -> Self {
        Self { registry, function }
    }

    pub fn resolve(&self, type_ref: &TypeRef) -> Result<Type, SemanticError> {
        match &type_ref.kind {
            TypeRefKind::Optional(inner) => Ok(Type::optional(self.resolve(inner)?)),
            TypeRefKind::Callable { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.resolve(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::callable(params, self.resolve(ret)?))
            }
            TypeRefKind::Named { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.resolve(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.named(&name.node, args).ok_or_else(|| SemanticError::Unresolved {
                    what: "type",
                    name: name.node.clone(),
                    span: type_ref.span,
                })
            }
        }
    }

    fn named(&self, name: &str, args: Vec<Type>) -> Option<Type> {
        let builtin = match name {
            "Int" => Some(Type::Int),
            "Real" => Some(Type::Real),
            "Bool" => Some(Type::Bool),
            "Byte" => Some(Type::Byte),
            "Symbol" => Some(Type::Symbol),
            "Something" => Some(Type::Something),
            "Nothing" => Some(Type::Nothing),
            _ => None,
        };
        if builtin.is_some() {
            return builtin;
        }

        if let Some(index) = self.function.generic_params.iter().position(|g| g.name == name) {
            return Some(Type::local_generic(index, name));
        }
        if let Some(index) = self.owner_generics().iter().position(|g| g == name) {
            return Some(Type::generic(index, name));
        }

        match self.registry.lookup(name)? {
            Type::Class { name, .. } => Some(Type::Class { name, args }),
            Type::ValueType { name, .. } => Some(Type::ValueType { name, args }),
            other => Some(other),
        }
    }

    fn owner_generics(&self) -> &[String] {
        let Some(owner) = &self.function.owner else {
            return &[];
        };
        match owner.unboxed() {
            Type::Class { name, .. } => self
                .registry
                .class(name)
                .map(|d| d.generic_params.as_slice())
                .unwrap_or(&[]),
            Type::ValueType { name, .. } => self
                .registry
                .value_type(name)
                .map(|d| d.generic_params.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }
}
