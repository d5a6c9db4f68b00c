#![forbid(unsafe_code)]

use ember_ast::{BoxingOp, CallableAdapter, ExprId};
use ember_types::Type;

use crate::analyser::FunctionAnalyser;
use crate::error::SemanticError;
use crate::expectation::TypeExpectation;
use crate::storage::{StorageType, classify, represented};

impl FunctionAnalyser<'_> {
    /// Makes the value in `slot`, analysed as `expr_type`, satisfy the
    /// storage `expectation` asks for. Inserts at most one conversion node
    /// and returns the type as finally represented.
    pub fn comply(
        &mut self,
        expr_type: Type,
        expectation: &TypeExpectation,
        slot: ExprId,
    ) -> Result<Type, SemanticError> {
        if expr_type.is_error() || expectation.ty.is_error() {
            return Ok(expr_type);
        }
        if self.callable_boxing_required(expectation, &expr_type) {
            return Ok(self.callable_box(expr_type, expectation, slot));
        }
        self.box_value(expr_type, expectation, slot)
    }

    fn box_value(
        &mut self,
        expr_type: Type,
        expectation: &TypeExpectation,
        slot: ExprId,
    ) -> Result<Type, SemanticError> {
        let from = classify(&expr_type);
        let to = expectation.target_storage(&expr_type);
        tracing::debug!(
            slot = slot.0,
            ty = %expr_type.display(),
            from = from.display(),
            to = to.display(),
            "comply"
        );
        match (from, to) {
            (StorageType::Box, StorageType::Box) => {
                Ok(self.box_to_box(expr_type, expectation, slot))
            }
            (StorageType::Box, StorageType::Simple) => {
                self.box_to_simple(expr_type, expectation, slot)
            }
            (StorageType::Box, StorageType::SimpleOptional) => {
                self.box_to_simple_optional(expr_type, expectation, slot)
            }
            (StorageType::Simple, StorageType::Box) => {
                let protocol = protocol_name(&expectation.ty);
                let ty = match &protocol {
                    Some(name) => Type::Protocol(name.clone()),
                    None => represented(&expr_type, StorageType::Box),
                };
                let op = BoxingOp::Box {
                    value_type: expr_type,
                    protocol,
                };
                Ok(self.insert_conversion(slot, op, ty))
            }
            (StorageType::SimpleOptional, StorageType::Box) => {
                let ty = represented(&expr_type, StorageType::Box);
                let value_type = expr_type.optional_inner().cloned().unwrap_or(expr_type);
                Ok(self.insert_conversion(slot, BoxingOp::BoxOptional { value_type }, ty))
            }
            (StorageType::Simple, StorageType::SimpleOptional) => {
                let ty = Type::optional(expr_type);
                Ok(self.insert_conversion(slot, BoxingOp::WrapOptional, ty))
            }
            // Dropping optionality needs an explicit unwrap.
            (StorageType::SimpleOptional, StorageType::Simple) => Err(SemanticError::type_mismatch(
                &expectation.ty,
                &expr_type,
                self.span_of(slot),
            )),
            (StorageType::Simple, StorageType::Simple)
            | (StorageType::SimpleOptional, StorageType::SimpleOptional) => Ok(expr_type),
        }
    }

    /// Box to box only changes the meta tag, and only when the value widens
    /// to a protocol it was not already boxed as.
    pub fn box_to_box(
        &mut self,
        expr_type: Type,
        expectation: &TypeExpectation,
        slot: ExprId,
    ) -> Type {
        let Some(protocol) = protocol_name(&expectation.ty) else {
            return expr_type;
        };
        if expr_type.unboxed() == expectation.ty.unboxed() {
            return expr_type;
        }
        let ty = Type::Protocol(protocol.clone());
        self.insert_conversion(slot, BoxingOp::Rebox { protocol }, ty)
    }

    pub fn box_to_simple(
        &mut self,
        expr_type: Type,
        expectation: &TypeExpectation,
        slot: ExprId,
    ) -> Result<Type, SemanticError> {
        let to = expr_type.unboxed().clone();
        if classify(&to) != StorageType::Simple {
            return Err(SemanticError::type_mismatch(
                &expectation.ty,
                &expr_type,
                self.span_of(slot),
            ));
        }
        Ok(self.insert_conversion(slot, BoxingOp::Unbox { to: to.clone() }, to))
    }

    pub fn box_to_simple_optional(
        &mut self,
        expr_type: Type,
        expectation: &TypeExpectation,
        slot: ExprId,
    ) -> Result<Type, SemanticError> {
        // `?T` with `T` boxed still unboxes once `T` is known to be simple.
        let to = match &expr_type.erased() {
            optional @ Type::Optional(inner) if classify(inner) == StorageType::Simple => {
                optional.clone()
            }
            other if classify(other) == StorageType::Simple => Type::optional(other.clone()),
            _ => {
                return Err(SemanticError::type_mismatch(
                    &expectation.ty,
                    &expr_type,
                    self.span_of(slot),
                ));
            }
        };
        Ok(self.insert_conversion(slot, BoxingOp::UnboxOptional { to: to.clone() }, to))
    }

    /// True when both are callables of equal arity whose parameter or return
    /// representations differ somewhere.
    pub fn callable_boxing_required(&self, expectation: &TypeExpectation, expr_type: &Type) -> bool {
        expr_type.is_callable()
            && expectation.ty.is_callable()
            && representations_differ(expr_type, &expectation.ty)
    }

    /// Wraps a callable value in an adapter that converts each argument and
    /// the result on every invocation.
    pub fn callable_box(
        &mut self,
        expr_type: Type,
        expectation: &TypeExpectation,
        slot: ExprId,
    ) -> Type {
        let adapter = callable_adapter(&expr_type, &expectation.ty);
        tracing::debug!(
            slot = slot.0,
            from = %adapter.from.display(),
            conversions = adapter.conversion_count(),
            "callable adapter"
        );
        self.insert_conversion(slot, BoxingOp::CallableAdapt(adapter), expectation.ty.clone())
    }

    pub(crate) fn insert_conversion(&mut self, slot: ExprId, op: BoxingOp, ty: Type) -> Type {
        tracing::debug!(slot = slot.0, op = ?op, ty = %ty.display(), "insert conversion");
        self.body.arena.convert(slot, op, ty.clone());
        ty
    }
}

fn protocol_name(ty: &Type) -> Option<String> {
    match ty.unboxed() {
        Type::Protocol(name) => Some(name.clone()),
        _ => None,
    }
}

/// Whether values of `a` and `b` are held differently, looking inside
/// callable signatures.
pub fn representations_differ(a: &Type, b: &Type) -> bool {
    match (a.unboxed(), b.unboxed()) {
        (
            Type::Callable {
                params: ap,
                ret: ar,
            },
            Type::Callable {
                params: bp,
                ret: br,
            },
        ) if ap.len() == bp.len() => {
            ap.iter().zip(bp).any(|(x, y)| representations_differ(x, y))
                || representations_differ(ar, br)
        }
        _ => classify(a) != classify(b),
    }
}

/// Adapter letting a callable held as `from` be invoked as `to`.
pub fn callable_adapter(from: &Type, to: &Type) -> CallableAdapter {
    let (args, ret) = match (from.unboxed(), to.unboxed()) {
        (
            Type::Callable {
                params: inner_params,
                ret: inner_ret,
            },
            Type::Callable {
                params: outer_params,
                ret: outer_ret,
            },
        ) => (
            outer_params
                .iter()
                .zip(inner_params)
                .map(|(outer, inner)| conversion_between(outer, inner))
                .collect(),
            conversion_between(inner_ret, outer_ret).map(Box::new),
        ),
        _ => (Vec::new(), None),
    };
    CallableAdapter {
        from: from.clone(),
        to: to.clone(),
        args,
        ret,
    }
}

/// The single step turning a value held as `from` into one held as `to`,
/// or `None` if both are held alike.
pub fn conversion_between(from: &Type, to: &Type) -> Option<BoxingOp> {
    let op = match (classify(from), classify(to)) {
        (StorageType::Simple, StorageType::Box) => BoxingOp::Box {
            value_type: from.clone(),
            protocol: protocol_name(to),
        },
        (StorageType::SimpleOptional, StorageType::Box) => BoxingOp::BoxOptional {
            value_type: from.optional_inner().cloned().unwrap_or_else(|| from.clone()),
        },
        (StorageType::Box, StorageType::Simple) => BoxingOp::Unbox {
            to: to.unboxed().clone(),
        },
        (StorageType::Box, StorageType::SimpleOptional) => BoxingOp::UnboxOptional {
            to: to.unboxed().clone(),
        },
        (StorageType::Simple, StorageType::SimpleOptional) => BoxingOp::WrapOptional,
        (StorageType::SimpleOptional, StorageType::Simple) => BoxingOp::UnwrapOptional,
        (StorageType::Box, StorageType::Box) => match to.unboxed() {
            Type::Protocol(protocol) if from.unboxed() != to.unboxed() => BoxingOp::Rebox {
                protocol: protocol.clone(),
            },
            Type::Callable { .. } if representations_differ(from, to) => {
                BoxingOp::CallableAdapt(callable_adapter(from, to))
            }
            _ => return None,
        },
        (StorageType::Simple, StorageType::Simple)
        | (StorageType::SimpleOptional, StorageType::SimpleOptional) => return None,
    };
    Some(op)
}
