#![forbid(unsafe_code)]

//! Primitives over the box layout. Boxes are `%ember.box` values handled
//! through pointers: field 0 is the meta pointer (null when the box holds
//! no value), field 1 the inline value words.

use ember_types::Type;

use crate::function::FnCodeGenerator;
use crate::layout::{OptionalLayout, stored_inline};
use crate::module::BOX_TYPE;
use crate::value::Value;

impl FnCodeGenerator<'_, '_, '_> {
    /// Allocation size of `ty` in bytes, taken from the target's layout
    /// through a GEP off null.
    pub fn size_for(&mut self, ty: &str) -> String {
        let end = self.fresh();
        self.emit(format!("{end} = getelementptr {ty}, ptr null, i32 1"));
        let size = self.fresh();
        self.emit(format!("{size} = ptrtoint ptr {end} to i64"));
        size
    }

    /// Objects begin with their meta pointer.
    pub fn get_meta_from_object(&mut self, object: &str) -> String {
        let meta = self.fresh();
        self.emit(format!("{meta} = load ptr, ptr {object}"));
        meta
    }

    pub fn get_meta_type_ptr(&mut self, boxed: &str) -> String {
        let field = self.fresh();
        self.emit(format!(
            "{field} = getelementptr {BOX_TYPE}, ptr {boxed}, i32 0, i32 0"
        ));
        field
    }

    pub fn get_has_box_no_value(&mut self, boxed: &str) -> String {
        let field = self.get_meta_type_ptr(boxed);
        let meta = self.fresh();
        self.emit(format!("{meta} = load ptr, ptr {field}"));
        let empty = self.fresh();
        self.emit(format!("{empty} = icmp eq ptr {meta}, null"));
        empty
    }

    /// `i1` telling whether a simple optional holds no value.
    pub fn get_has_no_value(&mut self, optional: &Value, layout: OptionalLayout) -> String {
        let empty = self.fresh();
        match layout {
            OptionalLayout::NullPointer => {
                self.emit(format!("{empty} = icmp eq ptr {}, null", optional.repr));
            }
            OptionalLayout::Sentinel(sentinel) => {
                self.emit(format!("{empty} = icmp eq {}, {sentinel}", optional.typed()));
            }
            OptionalLayout::Flagged => {
                let flag = empty;
                self.emit(format!("{flag} = extractvalue {}, 0", optional.typed()));
                let empty = self.fresh();
                self.emit(format!("{empty} = xor i1 {flag}, true"));
                return empty;
            }
        }
        empty
    }

    pub(crate) fn get_value_ptr(&mut self, boxed: &str) -> String {
        let field = self.fresh();
        self.emit(format!(
            "{field} = getelementptr {BOX_TYPE}, ptr {boxed}, i32 0, i32 1"
        ));
        field
    }

    pub(crate) fn load_box_word(&mut self, boxed: &str, word: usize) -> String {
        let field = self.fresh();
        self.emit(format!(
            "{field} = getelementptr {BOX_TYPE}, ptr {boxed}, i32 0, i32 1, i32 {word}"
        ));
        let value = self.fresh();
        self.emit(format!("{value} = load ptr, ptr {field}"));
        value
    }

    fn store_box_word(&mut self, boxed: &str, word: usize, value: &str) {
        let field = self.fresh();
        self.emit(format!(
            "{field} = getelementptr {BOX_TYPE}, ptr {boxed}, i32 0, i32 1, i32 {word}"
        ));
        self.emit(format!("store ptr {value}, ptr {field}"));
    }

    /// Runtime allocation sized for `ty`.
    pub(crate) fn alloc(&mut self, ty: &str) -> String {
        let size = self.size_for(ty);
        let memory = self.fresh();
        self.emit(format!("{memory} = call ptr @ember_alloc(i64 {size})"));
        memory
    }

    /// Values wider than the inline words go to their own allocation and
    /// the box keeps the pointer.
    pub(crate) fn store_in_box(&mut self, boxed: &str, value: &Value, ty: &Type) {
        if value.is_void() {
            return;
        }
        let slot = self.get_value_ptr(boxed);
        if stored_inline(ty, &self.cg.package.registry) {
            self.emit(format!("store {}, ptr {slot}", value.typed()));
        } else {
            let heap = self.alloc(&value.ty);
            self.emit(format!("store {}, ptr {heap}", value.typed()));
            self.emit(format!("store ptr {heap}, ptr {slot}"));
        }
    }

    pub(crate) fn load_from_box(&mut self, boxed: &str, ty: &Type) -> Value {
        let llvm = self.cg.llvm_type(ty);
        if llvm == "void" {
            return Value::void();
        }
        let slot = self.get_value_ptr(boxed);
        let source = if stored_inline(ty, &self.cg.package.registry) {
            slot
        } else {
            let heap = self.fresh();
            self.emit(format!("{heap} = load ptr, ptr {slot}"));
            heap
        };
        let value = self.fresh();
        self.emit(format!("{value} = load {llvm}, ptr {source}"));
        Value::new(llvm, value)
    }

    /// Meta describing `value`: read from the object for class instances,
    /// static for everything else.
    pub(crate) fn dynamic_meta(&mut self, value: &Value, ty: &Type) -> String {
        match ty.unboxed() {
            Type::Class { .. } => self.get_meta_from_object(&value.repr),
            _ => self.cg.meta_symbol(ty),
        }
    }

    /// Callable values are boxes holding the function and its context.
    pub(crate) fn make_callable_box(&mut self, function: &str, context: &str) -> Value {
        let boxed = self.alloc(BOX_TYPE);
        let meta = self.cg.callable_meta();
        let field = self.get_meta_type_ptr(&boxed);
        self.emit(format!("store ptr {meta}, ptr {field}"));
        self.store_box_word(&boxed, 0, function);
        self.store_box_word(&boxed, 1, context);
        Value::new("ptr", boxed)
    }

    /// Traps through the runtime when `failed` holds.
    pub(crate) fn emit_check(&mut self, failed: &str, message: &str) {
        let fail = self.fresh_block("check.fail");
        let ok = self.fresh_block("check.ok");
        self.emit(format!("br i1 {failed}, label %{fail}, label %{ok}"));
        self.start_block(&fail);
        let message = self.cg.intern_c_string(message);
        self.emit(format!("call void @ember_panic(ptr {message})"));
        self.emit("unreachable");
        self.start_block(&ok);
    }

    pub(crate) fn optional_payload(
        &mut self,
        optional: &Value,
        layout: OptionalLayout,
        payload_ty: &str,
    ) -> Value {
        match layout {
            OptionalLayout::Flagged => {
                let payload = self.fresh();
                self.emit(format!("{payload} = extractvalue {}, 1", optional.typed()));
                Value::new(payload_ty, payload)
            }
            OptionalLayout::NullPointer | OptionalLayout::Sentinel(_) => {
                Value::new(payload_ty, optional.repr.clone())
            }
        }
    }

    pub(crate) fn wrap_optional(
        &mut self,
        payload: &Value,
        layout: OptionalLayout,
        optional_ty: &str,
    ) -> Value {
        match layout {
            OptionalLayout::Flagged => {
                let flagged = self.fresh();
                self.emit(format!(
                    "{flagged} = insertvalue {optional_ty} undef, i1 true, 0"
                ));
                let optional = self.fresh();
                self.emit(format!(
                    "{optional} = insertvalue {optional_ty} {flagged}, {}, 1",
                    payload.typed()
                ));
                Value::new(optional_ty, optional)
            }
            OptionalLayout::NullPointer | OptionalLayout::Sentinel(_) => {
                Value::new(optional_ty, payload.repr.clone())
            }
        }
    }
}

/// Constant of an optional holding no value.
pub(crate) fn absent_constant(layout: OptionalLayout) -> String {
    match layout {
        OptionalLayout::NullPointer => "null".to_string(),
        OptionalLayout::Sentinel(sentinel) => sentinel.to_string(),
        OptionalLayout::Flagged => "zeroinitializer".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::ArgumentStyle;
    use crate::module::{CodeGenerator, CodegenOptions};
    use ember_ast::ExprArena;
    use ember_core::Package;
    use ember_types::TypeRegistry;

    #[test]
    fn flagged_optionals_invert_their_flag() {
        let package = Package::new("main", TypeRegistry::prelude());
        let mut cg = CodeGenerator::new(&package, CodegenOptions::default());
        let arena = ExprArena::new();
        let mut fcg =
            FnCodeGenerator::new(&mut cg, "f".into(), &arena, 0, ArgumentStyle::Free);
        let optional = Value::new("{ i1, i64 }", "%p0");
        let empty = fcg.get_has_no_value(&optional, OptionalLayout::Flagged);
        assert_eq!(empty, "%v1");
        let symbol = Value::new("i32", "%p1");
        let empty = fcg.get_has_no_value(&symbol, OptionalLayout::Sentinel(0x11_0000));
        assert_eq!(empty, "%v2");
        let text = fcg.definition("void", "");
        assert!(text.contains("%v0 = extractvalue { i1, i64 } %p0, 0"));
        assert!(text.contains("%v1 = xor i1 %v0, true"));
        assert!(text.contains("%v2 = icmp eq i32 %p1, 1114112"));
    }

    #[test]
    fn sizes_come_from_a_null_gep() {
        let package = Package::new("main", TypeRegistry::prelude());
        let mut cg = CodeGenerator::new(&package, CodegenOptions::default());
        let arena = ExprArena::new();
        let mut fcg =
            FnCodeGenerator::new(&mut cg, "f".into(), &arena, 0, ArgumentStyle::Free);
        let size = fcg.size_for(BOX_TYPE);
        assert_eq!(size, "%v1");
        let text = fcg.definition("void", "");
        assert!(text.contains("%v0 = getelementptr %ember.box, ptr null, i32 1"));
        assert!(text.contains("%v1 = ptrtoint ptr %v0 to i64"));
    }
}
