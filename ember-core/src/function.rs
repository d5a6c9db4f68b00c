#![forbid(unsafe_code)]

use std::collections::HashMap;

use ember_ast::{FunctionId, Span};
use ember_types::{Type, TypeContext, TypeRegistry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Access {
    #[default]
    Public,
    /// Same owner type; for free functions, same package.
    Private,
    /// Owner type or one of its subclasses.
    Protected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericParam {
    pub name: String,
    pub constraint: Type,
}

impl GenericParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: Type::Something,
        }
    }

    pub fn constrained(name: impl Into<String>, constraint: Type) -> Self {
        Self {
            name: name.into(),
            constraint,
        }
    }
}

/// A declared function signature. Parameter and return types may mention
/// `Type::LocalGenericVariable` (own generics) and `Type::GenericVariable`
/// (generics of the owner type).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub span: Span,
    pub package: String,
    pub owner: Option<Type>,
    pub access: Access,
    /// `Some(note)` marks the function deprecated.
    pub deprecated: Option<String>,
    pub generic_params: Vec<GenericParam>,
    pub params: Vec<Param>,
    pub ret: Type,
}

impl Function {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            package: "main".to_string(),
            owner: None,
            access: Access::Public,
            deprecated: None,
            generic_params: Vec::new(),
            params: Vec::new(),
            ret: Type::Nothing,
        }
    }

    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    pub fn with_generics(mut self, generic_params: Vec<GenericParam>) -> Self {
        self.generic_params = generic_params;
        self
    }

    pub fn returning(mut self, ret: Type) -> Self {
        self.ret = ret;
        self
    }

    pub fn owned_by(mut self, owner: Type) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn deprecated(mut self, note: impl Into<String>) -> Self {
        self.deprecated = Some(note.into());
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn generic_constraints(&self) -> Vec<Type> {
        self.generic_params.iter().map(|g| g.constraint.clone()).collect()
    }

    /// Context used inside the function's own body.
    pub fn type_context(&self, registry: &TypeRegistry) -> TypeContext {
        let callee_constraints = match &self.owner {
            Some(Type::Class { name, .. }) => registry
                .class(name)
                .map(|d| vec![Type::Something; d.generic_params.len()])
                .unwrap_or_default(),
            Some(Type::ValueType { name, .. }) => registry
                .value_type(name)
                .map(|d| vec![Type::Something; d.generic_params.len()])
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        TypeContext {
            callee: self.owner.clone(),
            callee_constraints,
            generic_args: Vec::new(),
            generic_constraints: self.generic_constraints(),
        }
    }

    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner.display(), self.name),
            None => self.name.clone(),
        }
    }
}

/// Declarations of one package: its types and function signatures.
#[derive(Clone, Debug, Default)]
pub struct Package {
    pub name: String,
    pub registry: TypeRegistry,
    functions: Vec<Function>,
    free: HashMap<String, FunctionId>,
    methods: HashMap<(String, String), FunctionId>,
}

impl Package {
    pub fn new(name: impl Into<String>, registry: TypeRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
            ..Self::default()
        }
    }

    pub fn declare(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        match function.owner.as_ref().and_then(Type::nominal_name) {
            Some(owner) => {
                self.methods
                    .insert((owner.to_string(), function.name.clone()), id);
            }
            None => {
                self.free.insert(function.name.clone(), id);
            }
        }
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        self.free.get(name).copied()
    }

    /// Looks a method up on `ty` and its superclasses.
    pub fn lookup_method(&self, ty: &Type, name: &str) -> Option<FunctionId> {
        let mut current = Some(ty.unboxed().clone());
        while let Some(t) = current {
            if let Some(owner) = t.nominal_name() {
                if let Some(id) = self.methods.get(&(owner.to_string(), name.to_string())) {
                    return Some(*id);
                }
            }
            current = self.registry.superclass_of(&t);
        }
        None
    }
}
