#![forbid(unsafe_code)]

use ember_ast::{BoxingOp, CallableAdapter, VariableId};
use ember_types::Type;

use crate::bridge::absent_constant;
use crate::error::CodegenError;
use crate::function::{ArgumentStyle, FnCodeGenerator};
use crate::layout::OptionalLayout;
use crate::module::BOX_TYPE;
use crate::value::{Value, llvm_ident};

impl FnCodeGenerator<'_, '_, '_> {
    /// Realizes one representation change on `value`, held as `from`,
    /// producing a value held as `to`.
    pub fn realize(
        &mut self,
        op: &BoxingOp,
        value: Value,
        from: &Type,
        to: &Type,
    ) -> Result<Value, CodegenError> {
        match op {
            BoxingOp::Box {
                value_type,
                protocol,
            } => {
                let boxed = self.alloc(BOX_TYPE);
                let meta = match (protocol, value_type.unboxed()) {
                    (Some(protocol), Type::Class { .. }) => {
                        let meta = self.get_meta_from_object(&value.repr);
                        self.conformance_of(&meta, protocol)
                    }
                    (Some(protocol), _) => self.cg.conformance_symbol(value_type, protocol),
                    (None, _) => self.dynamic_meta(&value, value_type),
                };
                let field = self.get_meta_type_ptr(&boxed);
                self.emit(format!("store ptr {meta}, ptr {field}"));
                self.store_in_box(&boxed, &value, value_type);
                Ok(Value::new("ptr", boxed))
            }
            BoxingOp::BoxOptional { value_type } => {
                let layout = OptionalLayout::of(value_type);
                let boxed = self.alloc(BOX_TYPE);
                let field = self.get_meta_type_ptr(&boxed);
                let empty = self.get_has_no_value(&value, layout);
                let some = self.fresh_block("box.some");
                let none = self.fresh_block("box.none");
                let join = self.fresh_block("box.join");
                self.emit(format!("br i1 {empty}, label %{none}, label %{some}"));

                self.start_block(&some);
                let payload_ty = self.cg.llvm_type(value_type);
                let payload = self.optional_payload(&value, layout, &payload_ty);
                let meta = self.dynamic_meta(&payload, value_type);
                self.emit(format!("store ptr {meta}, ptr {field}"));
                self.store_in_box(&boxed, &payload, value_type);
                self.emit(format!("br label %{join}"));

                self.start_block(&none);
                self.emit(format!("store ptr null, ptr {field}"));
                self.emit(format!("br label %{join}"));

                self.start_block(&join);
                Ok(Value::new("ptr", boxed))
            }
            BoxingOp::Rebox { protocol } => {
                let field = self.get_meta_type_ptr(&value.repr);
                let meta = self.fresh();
                self.emit(format!("{meta} = load ptr, ptr {field}"));
                let conformance = self.conformance_of(&meta, protocol);
                let size = self.size_for(BOX_TYPE);
                let copy = self.fresh();
                self.emit(format!("{copy} = call ptr @ember_alloc(i64 {size})"));
                self.emit(format!(
                    "call void @llvm.memcpy.p0.p0.i64(ptr {copy}, ptr {}, i64 {size}, i1 false)",
                    value.repr
                ));
                let copy_field = self.get_meta_type_ptr(&copy);
                self.emit(format!("store ptr {conformance}, ptr {copy_field}"));
                Ok(Value::new("ptr", copy))
            }
            BoxingOp::Unbox { to: unboxed } => {
                self.check_box_meta(&value.repr, unboxed);
                Ok(self.load_from_box(&value.repr, unboxed))
            }
            BoxingOp::UnboxOptional { to: optional } => {
                let inner = optional.optional_inner().unwrap_or(optional).clone();
                let layout = OptionalLayout::of(&inner);
                let optional_ty = self.cg.llvm_type(optional);
                let empty = self.get_has_box_no_value(&value.repr);
                let some = self.fresh_block("unbox.some");
                let none = self.fresh_block("unbox.none");
                let join = self.fresh_block("unbox.join");
                self.emit(format!("br i1 {empty}, label %{none}, label %{some}"));

                self.start_block(&some);
                self.check_box_meta(&value.repr, &inner);
                let payload = self.load_from_box(&value.repr, &inner);
                let present = self.wrap_optional(&payload, layout, &optional_ty);
                let some_end = self.block.clone();
                self.emit(format!("br label %{join}"));

                self.start_block(&none);
                self.emit(format!("br label %{join}"));

                self.start_block(&join);
                let result = self.fresh();
                self.emit(format!(
                    "{result} = phi {optional_ty} [ {}, %{some_end} ], [ {}, %{none} ]",
                    present.repr,
                    absent_constant(layout)
                ));
                Ok(Value::new(optional_ty, result))
            }
            BoxingOp::WrapOptional => {
                let optional_ty = self.cg.llvm_type(to);
                Ok(self.wrap_optional(&value, OptionalLayout::of(from), &optional_ty))
            }
            BoxingOp::UnwrapOptional => {
                let inner = from.optional_inner().unwrap_or(from);
                let layout = OptionalLayout::of(inner);
                let empty = self.get_has_no_value(&value, layout);
                self.emit_check(&empty, "unwrapped an empty optional");
                let payload_ty = self.cg.llvm_type(inner);
                Ok(self.optional_payload(&value, layout, &payload_ty))
            }
            BoxingOp::UnwrapBoxOptional => {
                let empty = self.get_has_box_no_value(&value.repr);
                self.emit_check(&empty, "unwrapped an empty optional");
                Ok(value)
            }
            BoxingOp::CallableAdapt(adapter) => {
                let thunk = self.adapter_thunk(adapter)?;
                Ok(self.make_callable_box(&thunk, &value.repr))
            }
        }
    }

    /// Traps unless the box holds a value of `ty`. Class boxes carry the
    /// dynamic class, which may be a subclass, so they are not checked.
    fn check_box_meta(&mut self, boxed: &str, ty: &Type) {
        if matches!(ty.unboxed(), Type::Class { .. }) {
            return;
        }
        let field = self.get_meta_type_ptr(boxed);
        let meta = self.fresh();
        self.emit(format!("{meta} = load ptr, ptr {field}"));
        let expected = self.cg.meta_symbol(ty);
        let mismatch = self.fresh();
        self.emit(format!("{mismatch} = icmp ne ptr {meta}, {expected}"));
        self.emit_check(&mismatch, "box holds a value of another type");
    }

    fn conformance_of(&mut self, meta: &str, protocol: &str) -> String {
        let protocol = self.cg.protocol_symbol(protocol);
        let conformance = self.fresh();
        self.emit(format!(
            "{conformance} = call ptr @ember_conformance(ptr {meta}, ptr {protocol})"
        ));
        conformance
    }

    /// Emits the thunk behind an adapted callable and returns its symbol.
    /// The thunk's context is the wrapped callable's box.
    fn adapter_thunk(&mut self, adapter: &CallableAdapter) -> Result<String, CodegenError> {
        let name = self.cg.next_adapter_name();
        let thunk = FnCodeGenerator::new(
            &mut *self.cg,
            name.clone(),
            self.arena,
            0,
            ArgumentStyle::Closure {
                captures: Vec::new(),
            },
        );
        let definition = thunk.generate_adapter(adapter)?;
        self.cg.push_function(definition);
        tracing::debug!(
            function = %self.name,
            thunk = %name,
            conversions = adapter.conversion_count(),
            "callable adapter thunk"
        );
        Ok(llvm_ident(&name))
    }

    fn generate_adapter(mut self, adapter: &CallableAdapter) -> Result<String, CodegenError> {
        let (
            Type::Callable {
                params: inner_params,
                ret: inner_ret,
            },
            Type::Callable {
                params: outer_params,
                ret: outer_ret,
            },
        ) = (adapter.from.unboxed(), adapter.to.unboxed())
        else {
            return Err(CodegenError::unsupported(format!(
                "cannot adapt {} to {}",
                adapter.from.display(),
                adapter.to.display()
            )));
        };

        let outer_types: Vec<(Option<VariableId>, String)> = outer_params
            .iter()
            .map(|ty| (None, self.cg.llvm_type(ty)))
            .collect();
        let params = self.declare_arguments(&outer_types);

        let function = self.load_box_word("%ctx", 0);
        let context = self.load_box_word("%ctx", 1);
        let mut args = vec![Value::new("ptr", context)];
        for (i, ((outer, inner), op)) in outer_params
            .iter()
            .zip(inner_params)
            .zip(&adapter.args)
            .enumerate()
        {
            let value = Value::new(outer_types[i].1.clone(), format!("%p{i}"));
            args.push(match op {
                Some(op) => self.realize(op, value, outer, inner)?,
                None => value,
            });
        }

        let inner_ret_ty = self.cg.llvm_type(inner_ret);
        let result = self.emit_call(&inner_ret_ty, &function, &args);
        let result = match &adapter.ret {
            Some(op) => self.realize(op, result, inner_ret, outer_ret)?,
            None => result,
        };
        self.emit_return(&result);
        let ret = self.cg.llvm_type(outer_ret);
        Ok(self.definition(&ret, &params))
    }
}
