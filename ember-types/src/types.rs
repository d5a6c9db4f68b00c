#![forbid(unsafe_code)]

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// Marker substituted after a reported error; compatible with everything.
    Error,
    Nothing,
    Int,
    Real,
    Bool,
    Byte,
    Symbol,

    // Reference type (objects start with their meta pointer).
    Class {
        name: String,
        args: Vec<Type>,
    },

    // Value aggregate stored inline.
    ValueType {
        name: String,
        args: Vec<Type>,
    },

    Enum(String),
    Protocol(String),

    /// Top type of every non-optional value.
    Something,

    /// Generic parameter of the type that owns the called function.
    GenericVariable {
        index: usize,
        name: String,
    },

    /// Generic parameter of the function itself.
    LocalGenericVariable {
        index: usize,
        name: String,
    },

    Callable {
        params: Vec<Type>,
        ret: Box<Type>,
    },

    Optional(Box<Type>),

    /// A type used as a first-class value.
    TypeAsValue(Box<Type>),

    /// Values of the wrapped type held in box storage regardless of its shape.
    Boxed(Box<Type>),
}

impl Type {
    pub fn class(name: impl Into<String>) -> Self {
        Type::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn value_type(name: impl Into<String>) -> Self {
        Type::ValueType {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Type::class("String")
    }

    pub fn optional(inner: Type) -> Self {
        Type::Optional(Box::new(inner))
    }

    pub fn callable(params: Vec<Type>, ret: Type) -> Self {
        Type::Callable {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn meta(inner: Type) -> Self {
        Type::TypeAsValue(Box::new(inner))
    }

    pub fn local_generic(index: usize, name: impl Into<String>) -> Self {
        Type::LocalGenericVariable {
            index,
            name: name.into(),
        }
    }

    pub fn generic(index: usize, name: impl Into<String>) -> Self {
        Type::GenericVariable {
            index,
            name: name.into(),
        }
    }

    /// Forces box storage. Never nests and never boxes the error marker.
    pub fn boxed(inner: Type) -> Self {
        match inner {
            Type::Boxed(_) | Type::Error => inner,
            other => Type::Boxed(Box::new(other)),
        }
    }

    /// Name of the nominal declaration behind this type, if any.
    pub fn nominal_name(&self) -> Option<&str> {
        match self.unboxed() {
            Type::Class { name, .. } | Type::ValueType { name, .. } => Some(name),
            Type::Enum(name) | Type::Protocol(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.unboxed(), Type::Callable { .. })
    }

    pub fn optional_inner(&self) -> Option<&Type> {
        match self.unboxed() {
            Type::Optional(inner) => Some(inner),
            _ => None,
        }
    }

    /// Strips a top-level `Boxed`.
    pub fn unboxed(&self) -> &Type {
        match self {
            Type::Boxed(inner) => inner,
            other => other,
        }
    }

    /// Strips `Boxed` everywhere, leaving only the semantic shape.
    pub fn erased(&self) -> Type {
        match self {
            Type::Boxed(inner) => inner.erased(),
            Type::Class { name, args } => Type::Class {
                name: name.clone(),
                args: args.iter().map(Type::erased).collect(),
            },
            Type::ValueType { name, args } => Type::ValueType {
                name: name.clone(),
                args: args.iter().map(Type::erased).collect(),
            },
            Type::Callable { params, ret } => Type::Callable {
                params: params.iter().map(Type::erased).collect(),
                ret: Box::new(ret.erased()),
            },
            Type::Optional(inner) => Type::Optional(Box::new(inner.erased())),
            Type::TypeAsValue(inner) => Type::TypeAsValue(Box::new(inner.erased())),
            other => other.clone(),
        }
    }

    pub fn mentions_local_generics(&self) -> bool {
        match self {
            Type::LocalGenericVariable { .. } => true,
            Type::Class { args, .. } | Type::ValueType { args, .. } => {
                args.iter().any(Type::mentions_local_generics)
            }
            Type::Callable { params, ret } => {
                params.iter().any(Type::mentions_local_generics) || ret.mentions_local_generics()
            }
            Type::Optional(inner) | Type::TypeAsValue(inner) | Type::Boxed(inner) => {
                inner.mentions_local_generics()
            }
            _ => false,
        }
    }

    /// Maps every node bottom-up; used for generic substitution.
    pub fn map(&self, f: &impl Fn(&Type) -> Option<Type>) -> Type {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        match self {
            Type::Class { name, args } => Type::Class {
                name: name.clone(),
                args: args.iter().map(|a| a.map(f)).collect(),
            },
            Type::ValueType { name, args } => Type::ValueType {
                name: name.clone(),
                args: args.iter().map(|a| a.map(f)).collect(),
            },
            Type::Callable { params, ret } => Type::Callable {
                params: params.iter().map(|p| p.map(f)).collect(),
                ret: Box::new(ret.map(f)),
            },
            Type::Optional(inner) => Type::Optional(Box::new(inner.map(f))),
            Type::TypeAsValue(inner) => Type::TypeAsValue(Box::new(inner.map(f))),
            Type::Boxed(inner) => Type::boxed(inner.map(f)),
            other => other.clone(),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Type::Error => "<error>".to_string(),
            Type::Nothing => "Nothing".to_string(),
            Type::Int => "Int".to_string(),
            Type::Real => "Real".to_string(),
            Type::Bool => "Bool".to_string(),
            Type::Byte => "Byte".to_string(),
            Type::Symbol => "Symbol".to_string(),
            Type::Class { name, args } | Type::ValueType { name, args } => {
                if args.is_empty() {
                    name.clone()
                } else {
                    let args_s = args
                        .iter()
                        .map(|t| t.display())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{name}<{args_s}>")
                }
            }
            Type::Enum(name) | Type::Protocol(name) => name.clone(),
            Type::Something => "Something".to_string(),
            Type::GenericVariable { name, .. } | Type::LocalGenericVariable { name, .. } => {
                name.clone()
            }
            Type::Callable { params, ret } => {
                let params_s = params
                    .iter()
                    .map(|t| t.display())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({params_s}) -> {}", ret.display())
            }
            Type::Optional(inner) => format!("?{}", inner.display()),
            Type::TypeAsValue(inner) => format!("Type<{}>", inner.display()),
            // Storage is not part of the type users wrote.
            Type::Boxed(inner) => inner.display(),
        }
    }
}
