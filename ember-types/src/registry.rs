#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::context::TypeContext;
use crate::types::Type;

#[derive(Clone, Debug, Default)]
pub struct ClassDef {
    /// Superclass, possibly mentioning this class's generic variables.
    pub superclass: Option<Type>,
    pub protocols: Vec<String>,
    pub generic_params: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ValueTypeDef {
    /// Size of the inline representation in machine words.
    pub words: u32,
    pub protocols: Vec<String>,
    pub generic_params: Vec<String>,
}

impl Default for ValueTypeDef {
    fn default() -> Self {
        Self {
            words: 1,
            protocols: Vec::new(),
            generic_params: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EnumDef {
    pub cases: Vec<String>,
    pub protocols: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ProtocolDef {
    pub name: String,
}

/// Nominal declarations known to a package, plus the subtyping and
/// common-supertype algebra over `Type`.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    classes: HashMap<String, ClassDef>,
    value_types: HashMap<String, ValueTypeDef>,
    enums: HashMap<String, EnumDef>,
    protocols: Vec<ProtocolDef>,
    /// Protocols conformed to by primitive types, keyed by `Type::display`.
    primitive_conformances: HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `String` class.
    pub fn prelude() -> Self {
        let mut registry = Self::new();
        registry.declare_class("String", ClassDef::default());
        registry
    }

    pub fn declare_class(&mut self, name: impl Into<String>, def: ClassDef) {
        self.classes.insert(name.into(), def);
    }

    pub fn declare_value_type(&mut self, name: impl Into<String>, def: ValueTypeDef) {
        self.value_types.insert(name.into(), def);
    }

    pub fn declare_enum(&mut self, name: impl Into<String>, def: EnumDef) {
        self.enums.insert(name.into(), def);
    }

    pub fn declare_protocol(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.protocols.iter().any(|p| p.name == name) {
            self.protocols.push(ProtocolDef { name });
        }
    }

    pub fn declare_primitive_conformance(&mut self, primitive: &Type, protocol: impl Into<String>) {
        self.primitive_conformances
            .entry(primitive.display())
            .or_default()
            .push(protocol.into());
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn value_type(&self, name: &str) -> Option<&ValueTypeDef> {
        self.value_types.get(name)
    }

    pub fn has_protocol(&self, name: &str) -> bool {
        self.protocols.iter().any(|p| p.name == name)
    }

    /// Resolves a nominal name to a type without arguments.
    pub fn lookup(&self, name: &str) -> Option<Type> {
        if self.classes.contains_key(name) {
            Some(Type::class(name))
        } else if self.value_types.contains_key(name) {
            Some(Type::value_type(name))
        } else if self.enums.contains_key(name) {
            Some(Type::Enum(name.to_string()))
        } else if self.has_protocol(name) {
            Some(Type::Protocol(name.to_string()))
        } else {
            None
        }
    }

    /// Inline size of a value type in machine words (1 for unknown names).
    pub fn value_words(&self, ty: &Type) -> u32 {
        match ty.unboxed() {
            Type::ValueType { name, .. } => self.value_types.get(name).map(|d| d.words).unwrap_or(1),
            _ => 1,
        }
    }

    pub fn superclass_of(&self, ty: &Type) -> Option<Type> {
        let Type::Class { name, args } = ty else {
            return None;
        };
        let sup = self.classes.get(name)?.superclass.as_ref()?;
        Some(sup.map(&|t| match t {
            Type::GenericVariable { index, .. } => args.get(*index).cloned(),
            _ => None,
        }))
    }

    fn declared_protocols(&self, ty: &Type) -> Vec<String> {
        match ty {
            Type::Class { .. } => {
                let mut out = Vec::new();
                let mut current = Some(ty.clone());
                while let Some(Type::Class { name: cls, .. }) = current.as_ref() {
                    if let Some(def) = self.classes.get(cls) {
                        out.extend(def.protocols.iter().cloned());
                    }
                    current = current.as_ref().and_then(|c| self.superclass_of(c));
                }
                out
            }
            Type::ValueType { name, .. } => self
                .value_types
                .get(name)
                .map(|d| d.protocols.clone())
                .unwrap_or_default(),
            Type::Enum(name) => self
                .enums
                .get(name)
                .map(|d| d.protocols.clone())
                .unwrap_or_default(),
            Type::Int | Type::Real | Type::Bool | Type::Byte | Type::Symbol => self
                .primitive_conformances
                .get(&ty.display())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn conforms_to(&self, ty: &Type, protocol: &str) -> bool {
        self.declared_protocols(ty).iter().any(|p| p == protocol)
    }

    /// `sub` can be used where `sup` is expected. Storage is ignored.
    pub fn is_subtype(&self, sub: &Type, sup: &Type, ctx: &TypeContext) -> bool {
        self.is_subtype_erased(&sub.erased(), &sup.erased(), ctx)
    }

    fn is_subtype_erased(&self, sub: &Type, sup: &Type, ctx: &TypeContext) -> bool {
        if sub.is_error() || sup.is_error() || sub == sup {
            return true;
        }
        match (sub, sup) {
            (Type::Optional(_) | Type::TypeAsValue(_) | Type::Nothing, Type::Something) => false,
            (_, Type::Something) => true,

            (Type::Optional(a), Type::Optional(b)) => self.is_subtype_erased(a, b, ctx),
            (Type::Optional(_), _) => false,
            (a, Type::Optional(b)) => self.is_subtype_erased(a, b, ctx),

            (Type::LocalGenericVariable { .. } | Type::GenericVariable { .. }, _) => ctx
                .constraint_of(sub)
                .is_some_and(|c| c != *sub && self.is_subtype_erased(&c, sup, ctx)),

            (Type::Class { .. }, Type::Class { .. }) => {
                let mut current = self.superclass_of(sub);
                while let Some(cls) = current {
                    if cls == *sup {
                        return true;
                    }
                    current = self.superclass_of(&cls);
                }
                false
            }

            (_, Type::Protocol(p)) => self.conforms_to(sub, p),

            (
                Type::Callable {
                    params: sub_params,
                    ret: sub_ret,
                },
                Type::Callable {
                    params: sup_params,
                    ret: sup_ret,
                },
            ) => {
                sub_params.len() == sup_params.len()
                    && sup_params
                        .iter()
                        .zip(sub_params)
                        .all(|(expected, actual)| self.is_subtype_erased(expected, actual, ctx))
                    && self.is_subtype_erased(sub_ret, sup_ret, ctx)
            }

            (Type::TypeAsValue(a), Type::TypeAsValue(b)) => self.is_subtype_erased(a, b, ctx),

            _ => false,
        }
    }

    /// Least common supertype of two types, `None` if they share none.
    pub fn common_supertype(&self, a: &Type, b: &Type, ctx: &TypeContext) -> Option<Type> {
        let (a, b) = (a.erased(), b.erased());
        if a.is_error() {
            return Some(b);
        }
        if self.is_subtype_erased(&a, &b, ctx) {
            return Some(b);
        }
        if self.is_subtype_erased(&b, &a, ctx) {
            return Some(a);
        }

        match (&a, &b) {
            (Type::Optional(x), Type::Optional(y)) => {
                return self.common_supertype(x, y, ctx).map(Type::optional);
            }
            (Type::Optional(x), other) | (other, Type::Optional(x)) => {
                return self.common_supertype(x, other, ctx).map(Type::optional);
            }
            (Type::TypeAsValue(x), Type::TypeAsValue(y)) => {
                return self.common_supertype(x, y, ctx).map(Type::meta);
            }
            (Type::TypeAsValue(_) | Type::Nothing, _) | (_, Type::TypeAsValue(_) | Type::Nothing) => {
                return None;
            }
            _ => {}
        }

        let mut ancestor = self.superclass_of(&a);
        while let Some(cls) = ancestor {
            if self.is_subtype_erased(&b, &cls, ctx) {
                return Some(cls);
            }
            ancestor = self.superclass_of(&cls);
        }

        let theirs = self.declared_protocols(&b);
        if let Some(shared) = self
            .declared_protocols(&a)
            .into_iter()
            .find(|p| theirs.contains(p))
        {
            return Some(Type::Protocol(shared));
        }

        Some(Type::Something)
    }
}
