#![forbid(unsafe_code)]

use ember_types::Type;

/// How a value is physically held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// Native unboxed representation.
    Simple,
    /// Native representation plus an absence sentinel.
    SimpleOptional,
    /// Meta pointer plus value slot.
    Box,
}

impl StorageType {
    pub fn display(&self) -> &'static str {
        match self {
            StorageType::Simple => "simple",
            StorageType::SimpleOptional => "simple optional",
            StorageType::Box => "box",
        }
    }
}

/// Representation request carried by a `TypeExpectation`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoxingPolicy {
    /// Use the expected type's own storage.
    #[default]
    Declared,
    /// Box regardless of whether the value could stay simple.
    Forced,
    /// Unbox if the value's type permits, otherwise keep it boxed.
    PreferSimple,
}

/// Storage a value of `ty` has when no expectation says otherwise.
///
/// Every simple representation has exactly one spare pattern (an in-band
/// niche or the optional flag), so an optional of a simple type stays simple
/// while an optional of anything else, including another optional, is boxed.
pub fn classify(ty: &Type) -> StorageType {
    match ty {
        Type::Boxed(_)
        | Type::Something
        | Type::Protocol(_)
        | Type::GenericVariable { .. }
        | Type::LocalGenericVariable { .. }
        | Type::Callable { .. } => StorageType::Box,

        Type::Optional(inner) => match classify(inner) {
            StorageType::Simple => StorageType::SimpleOptional,
            StorageType::SimpleOptional | StorageType::Box => StorageType::Box,
        },

        Type::Error
        | Type::Nothing
        | Type::Int
        | Type::Real
        | Type::Bool
        | Type::Byte
        | Type::Symbol
        | Type::Class { .. }
        | Type::ValueType { .. }
        | Type::Enum(_)
        | Type::TypeAsValue(_) => StorageType::Simple,
    }
}

/// `ty` as held in `storage`. Forcing box storage marks the type `Boxed`;
/// simple storage drops a top-level mark the shape does not need.
pub fn represented(ty: &Type, storage: StorageType) -> Type {
    match storage {
        StorageType::Box if classify(ty) == StorageType::Box => ty.clone(),
        StorageType::Box => Type::boxed(ty.clone()),
        StorageType::Simple => ty.unboxed().clone(),
        StorageType::SimpleOptional => match ty.unboxed() {
            optional @ Type::Optional(_) => optional.clone(),
            other => Type::optional(other.clone()),
        },
    }
}
