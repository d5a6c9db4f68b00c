#![forbid(unsafe_code)]

use ember_types::Type;

use crate::storage::{BoxingPolicy, StorageType, classify};

/// What a use site requires of a value: its type and how it must be held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeExpectation {
    pub ty: Type,
    pub policy: BoxingPolicy,
}

impl TypeExpectation {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            policy: BoxingPolicy::Declared,
        }
    }

    pub fn forced_box(ty: Type) -> Self {
        Self {
            ty,
            policy: BoxingPolicy::Forced,
        }
    }

    pub fn prefer_simple(ty: Type) -> Self {
        Self {
            ty,
            policy: BoxingPolicy::PreferSimple,
        }
    }

    /// Storage the value must end up in, given the type it was analysed as.
    pub fn target_storage(&self, expr_type: &Type) -> StorageType {
        match self.policy {
            BoxingPolicy::Declared => classify(&self.ty),
            BoxingPolicy::Forced => StorageType::Box,
            // `Boxed` inside an optional does not stop `?T` from being simple.
            BoxingPolicy::PreferSimple => classify(&expr_type.erased()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_decides_the_target() {
        let boxed_int = Type::boxed(Type::Int);
        assert_eq!(
            TypeExpectation::new(Type::Something).target_storage(&Type::Int),
            StorageType::Box
        );
        assert_eq!(
            TypeExpectation::forced_box(Type::Int).target_storage(&Type::Int),
            StorageType::Box
        );
        assert_eq!(
            TypeExpectation::prefer_simple(Type::Something).target_storage(&boxed_int),
            StorageType::Simple
        );
        assert_eq!(
            TypeExpectation::prefer_simple(Type::Something).target_storage(&Type::Something),
            StorageType::Box
        );
        assert_eq!(
            TypeExpectation::prefer_simple(Type::optional(Type::Int))
                .target_storage(&Type::optional(boxed_int)),
            StorageType::SimpleOptional
        );
    }
}
