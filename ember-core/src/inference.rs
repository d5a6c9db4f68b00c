#![forbid(unsafe_code)]

use ember_types::{Type, TypeContext, TypeRegistry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InferenceProblem {
    NoCandidates,
    Conflict { common: Type, candidate: Type },
}

impl InferenceProblem {
    pub fn describe(&self) -> String {
        match self {
            InferenceProblem::NoCandidates => "no argument mentions it".to_string(),
            InferenceProblem::Conflict { common, candidate } => format!(
                "{} and {} have no common supertype",
                common.display(),
                candidate.display()
            ),
        }
    }
}

/// Least common supertype of the types observed for one generic parameter
/// at one call site.
#[derive(Clone, Debug, Default)]
pub struct CommonTypeFinder {
    common: Option<Type>,
    conflict: Option<(Type, Type)>,
}

impl CommonTypeFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ty: &Type, registry: &TypeRegistry, ctx: &TypeContext) {
        if self.conflict.is_some() {
            return;
        }
        let ty = ty.erased();
        self.common = match self.common.take() {
            None => Some(ty),
            Some(common) => match registry.common_supertype(&common, &ty, ctx) {
                Some(wider) => Some(wider),
                None => {
                    self.conflict = Some((common.clone(), ty));
                    Some(common)
                }
            },
        };
    }

    pub fn common_type(&self) -> Result<Type, InferenceProblem> {
        if let Some((common, candidate)) = &self.conflict {
            return Err(InferenceProblem::Conflict {
                common: common.clone(),
                candidate: candidate.clone(),
            });
        }
        self.common.clone().ok_or(InferenceProblem::NoCandidates)
    }
}

/// Walks `declared` and `actual` in parallel and feeds every type found at a
/// local generic position into that parameter's finder.
pub fn collect_generic_candidates(
    declared: &Type,
    actual: &Type,
    finders: &mut [CommonTypeFinder],
    registry: &TypeRegistry,
    ctx: &TypeContext,
) {
    let actual = actual.unboxed();
    match (declared.unboxed(), actual) {
        (Type::LocalGenericVariable { index, .. }, _) => {
            if let Some(finder) = finders.get_mut(*index) {
                finder.add(actual, registry, ctx);
            }
        }
        (Type::Optional(d), Type::Optional(a)) => {
            collect_generic_candidates(d, a, finders, registry, ctx);
        }
        (Type::Optional(d), a) => collect_generic_candidates(d, a, finders, registry, ctx),
        (
            Type::Class { name: dn, args: da } | Type::ValueType { name: dn, args: da },
            Type::Class { name: an, args: aa } | Type::ValueType { name: an, args: aa },
        ) if dn == an && da.len() == aa.len() => {
            for (d, a) in da.iter().zip(aa) {
                collect_generic_candidates(d, a, finders, registry, ctx);
            }
        }
        (
            Type::Callable {
                params: dp,
                ret: dr,
            },
            Type::Callable {
                params: ap,
                ret: ar,
            },
        ) if dp.len() == ap.len() => {
            for (d, a) in dp.iter().zip(ap) {
                collect_generic_candidates(d, a, finders, registry, ctx);
            }
            collect_generic_candidates(dr, ar, finders, registry, ctx);
        }
        (Type::TypeAsValue(d), Type::TypeAsValue(a)) => {
            collect_generic_candidates(d, a, finders, registry, ctx);
        }
        _ => {}
    }
}
