#![forbid(unsafe_code)]

use std::num::NonZeroU64;

use ember_ast::{
    BoxingOp, Closure, ExprArena, ExprId, ExprKind, FunctionBody, Span, Stmt, VariableId,
};
use ember_core::{Function, StorageType, classify};
use ember_types::Type;

use crate::bridge::absent_constant;
use crate::error::CodegenError;
use crate::layout::{BoxImage, OptionalLayout, SimpleValue, encode_box};
use crate::module::CodeGenerator;
use crate::scoper::CgScoper;
use crate::value::{Value, llvm_ident, real_literal};

/// How a generated function receives its arguments ahead of the declared
/// parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgumentStyle {
    Free,
    /// Receiver first, as `%this`.
    Method { this: Type },
    /// Context pointer first, as `%ctx`. Captured values are copied into
    /// the context when the closure is created and loaded back on entry.
    Closure { captures: Vec<(VariableId, String)> },
}

/// A variable in generated code. Mutable variables live in a stack slot
/// and `value.repr` is the slot's address.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
    pub mutable: bool,
    pub value: Value,
}

/// Generates one LLVM function from an analysed body. Every representation
/// change was decided by analysis; this only realizes the recorded
/// `BoxingOp`s.
pub struct FnCodeGenerator<'g, 'm, 'a> {
    pub(crate) cg: &'g mut CodeGenerator<'m>,
    pub(crate) name: String,
    pub(crate) arena: &'a ExprArena,
    variable_count: u32,
    style: ArgumentStyle,
    scoper: CgScoper<LocalVariable>,
    out: String,
    next_value: u32,
    next_block: u32,
    pub(crate) block: String,
    terminated: bool,
}

impl<'g, 'm, 'a> FnCodeGenerator<'g, 'm, 'a> {
    pub fn new(
        cg: &'g mut CodeGenerator<'m>,
        name: String,
        arena: &'a ExprArena,
        variable_count: u32,
        style: ArgumentStyle,
    ) -> Self {
        Self {
            cg,
            name,
            arena,
            variable_count,
            style,
            scoper: CgScoper::new(variable_count),
            out: String::new(),
            next_value: 0,
            next_block: 0,
            block: "entry".to_string(),
            terminated: false,
        }
    }

    pub fn scoper(&self) -> &CgScoper<LocalVariable> {
        &self.scoper
    }

    #[tracing::instrument(level = "debug", skip_all, fields(function = %self.name))]
    pub fn generate(mut self, function: &Function, body: &FunctionBody) -> Result<String, CodegenError> {
        let params: Vec<(Option<VariableId>, String)> = function
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| (Some(VariableId(i as u32)), self.cg.llvm_type(&p.ty)))
            .collect();
        let params = self.declare_arguments(&params);

        for stmt in &body.stmts {
            if self.terminated {
                break;
            }
            self.gen_stmt(stmt)?;
        }
        let ret = self.cg.llvm_type(&function.ret);
        if !self.terminated {
            if ret == "void" {
                self.emit("ret void");
            } else {
                self.emit("unreachable");
            }
        }
        Ok(self.definition(&ret, &params))
    }

    /// Body of a closure literal, as a function taking its context first.
    pub fn generate_closure(
        mut self,
        closure: &Closure,
        params: &[Type],
        ret: &Type,
    ) -> Result<String, CodegenError> {
        let declared: Vec<(Option<VariableId>, String)> = closure
            .params
            .iter()
            .zip(params)
            .map(|(p, ty)| (p.variable, self.cg.llvm_type(ty)))
            .collect();
        let params = self.declare_arguments(&declared);
        let value = self.gen_expr(closure.body)?;
        self.emit_return(&value);
        let ret = self.cg.llvm_type(ret);
        Ok(self.definition(&ret, &params))
    }

    /// Renders the parameter list for the current style and binds each
    /// parameter. Closure captures are loaded here, so this runs first.
    pub(crate) fn declare_arguments(&mut self, params: &[(Option<VariableId>, String)]) -> String {
        let mut declared = Vec::new();
        match self.style.clone() {
            ArgumentStyle::Free => {}
            ArgumentStyle::Method { this } => {
                declared.push(format!("{} %this", self.cg.llvm_type(&this)));
            }
            ArgumentStyle::Closure { captures } => {
                declared.push("ptr %ctx".to_string());
                if !captures.is_empty() {
                    let context = context_type(captures.iter().map(|(_, ty)| ty.as_str()));
                    for (i, (id, ty)) in captures.iter().enumerate() {
                        let field = self.fresh();
                        self.emit(format!(
                            "{field} = getelementptr {context}, ptr %ctx, i32 0, i32 {i}"
                        ));
                        let value = self.fresh();
                        self.emit(format!("{value} = load {ty}, ptr {field}"));
                        self.scoper.set(
                            *id,
                            LocalVariable {
                                mutable: false,
                                value: Value::new(ty.clone(), value),
                            },
                        );
                    }
                }
            }
        }
        for (i, (variable, ty)) in params.iter().enumerate() {
            let value = if ty == "void" {
                Value::void()
            } else {
                let value = Value::new(ty.clone(), format!("%p{i}"));
                declared.push(value.typed());
                value
            };
            if let Some(id) = variable {
                self.scoper.set(
                    *id,
                    LocalVariable {
                        mutable: false,
                        value,
                    },
                );
            }
        }
        declared.join(", ")
    }

    pub(crate) fn definition(&self, ret: &str, params: &str) -> String {
        format!(
            "define {ret} {}({params}) {{\nentry:\n{}}}\n\n",
            llvm_ident(&self.name),
            self.out
        )
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Let(stmt) => {
                let id = stmt.variable.ok_or_else(|| CodegenError::Unresolved {
                    name: stmt.name.node.clone(),
                    span: stmt.name.span,
                })?;
                let Some(init) = stmt.init else {
                    return self.declare_deferred(id, stmt.mutable, stmt.resolved.as_ref(), stmt.span);
                };
                let value = self.gen_expr(init)?;
                let variable = if stmt.mutable && !value.is_void() {
                    let slot = self.fresh();
                    self.emit(format!("{slot} = alloca {}", value.ty));
                    self.emit(format!("store {}, ptr {slot}", value.typed()));
                    LocalVariable {
                        mutable: true,
                        value: Value::new(value.ty, slot),
                    }
                } else {
                    LocalVariable {
                        mutable: stmt.mutable,
                        value,
                    }
                };
                self.scoper.set(id, variable);
            }
            Stmt::Assign(stmt) => {
                let value = self.gen_expr(stmt.value)?;
                let id = stmt.variable.ok_or_else(|| CodegenError::Unresolved {
                    name: stmt.target.node.clone(),
                    span: stmt.target.span,
                })?;
                // First assignment of an immutable binding declared without a value.
                let Some(variable) = self.scoper.get(id).cloned() else {
                    self.scoper.set(
                        id,
                        LocalVariable {
                            mutable: false,
                            value,
                        },
                    );
                    return Ok(());
                };
                if !variable.mutable {
                    return Err(CodegenError::unsupported(format!(
                        "assignment to immutable `{}`",
                        stmt.target.node
                    )));
                }
                if !value.is_void() {
                    self.emit(format!("store {}, ptr {}", value.typed(), variable.value.repr));
                }
            }
            Stmt::Expr(expr) => {
                self.gen_expr(*expr)?;
            }
            Stmt::Return(stmt) => {
                let value = match stmt.value {
                    Some(expr) => self.gen_expr(expr)?,
                    None => Value::void(),
                };
                self.emit_return(&value);
            }
        }
        Ok(())
    }

    /// A mutable binding gets its stack slot now; an immutable one is bound
    /// by its single assignment.
    fn declare_deferred(
        &mut self,
        id: VariableId,
        mutable: bool,
        resolved: Option<&Type>,
        span: Span,
    ) -> Result<(), CodegenError> {
        if !mutable {
            return Ok(());
        }
        let ty = resolved.ok_or(CodegenError::Unanalysed { span })?;
        let llvm = self.cg.llvm_type(ty);
        let value = if llvm == "void" {
            Value::void()
        } else {
            let slot = self.fresh();
            self.emit(format!("{slot} = alloca {llvm}"));
            Value::new(llvm, slot)
        };
        self.scoper.set(id, LocalVariable { mutable: true, value });
        Ok(())
    }

    pub(crate) fn type_of(&self, slot: ExprId) -> Result<Type, CodegenError> {
        let node = self.arena.get(slot);
        node.ty
            .clone()
            .ok_or(CodegenError::Unanalysed { span: node.span })
    }

    pub fn gen_expr(&mut self, slot: ExprId) -> Result<Value, CodegenError> {
        let arena = self.arena;
        let node = arena.get(slot);
        let ty = self.type_of(slot)?;
        match &node.kind {
            ExprKind::IntLit(v) => Ok(Value::new("i64", v.to_string())),
            ExprKind::RealLit(v) => Ok(Value::new("double", real_literal(*v))),
            ExprKind::BoolLit(v) => Ok(Value::new("i1", v.to_string())),
            ExprKind::SymbolLit(c) => Ok(Value::new("i32", u32::from(*c).to_string())),
            ExprKind::NoValue => Ok(self.gen_no_value(&ty)),
            ExprKind::StringLit(s) => {
                let bytes = self.cg.intern_c_string(s);
                let string = self.fresh();
                self.emit(format!(
                    "{string} = call ptr @ember_string_new(ptr {bytes}, i64 {})",
                    s.len()
                ));
                Ok(Value::new("ptr", string))
            }
            ExprKind::Local(local) => {
                let id = local.variable.ok_or_else(|| CodegenError::Unresolved {
                    name: local.name.node.clone(),
                    span: local.name.span,
                })?;
                self.read_variable(id)
            }
            ExprKind::Call(call) => {
                let id = call.target.ok_or_else(|| CodegenError::Unresolved {
                    name: call.function.node.clone(),
                    span: call.function.span,
                })?;
                let package = self.cg.package;
                let target = package.function(id);
                let args = self.gen_args(&call.arguments.args)?;
                let ret = self.cg.llvm_type(&target.ret);
                let callee = self.cg.function_symbol(target);
                Ok(self.emit_call(&ret, &callee, &args))
            }
            ExprKind::MethodCall(call) => {
                let id = call.target.ok_or_else(|| CodegenError::Unresolved {
                    name: call.method.node.clone(),
                    span: call.method.span,
                })?;
                let receiver = self.gen_expr(call.receiver)?;
                let mut args = vec![receiver];
                args.extend(self.gen_args(&call.arguments.args)?);
                let package = self.cg.package;
                let target = package.function(id);
                let ret = self.cg.llvm_type(&target.ret);
                let callee = match target.owner.as_ref().map(Type::unboxed) {
                    Some(Type::Protocol(protocol)) => {
                        self.protocol_method(&args[0].repr, protocol, &target.name)
                    }
                    _ => self.cg.function_symbol(target),
                };
                Ok(self.emit_call(&ret, &callee, &args))
            }
            ExprKind::Invoke { callee, args } => {
                let callable_ty = self.type_of(*callee)?;
                let Type::Callable { ret, .. } = callable_ty.unboxed() else {
                    return Err(CodegenError::unsupported(format!(
                        "invoking a value of type {}",
                        callable_ty.display()
                    )));
                };
                let callable = self.gen_expr(*callee)?;
                let function = self.load_box_word(&callable.repr, 0);
                let context = self.load_box_word(&callable.repr, 1);
                let mut values = vec![Value::new("ptr", context)];
                values.extend(self.gen_args(args)?);
                let ret = self.cg.llvm_type(ret);
                Ok(self.emit_call(&ret, &function, &values))
            }
            ExprKind::Closure(closure) => self.gen_closure(closure, &ty),
            ExprKind::TypeExpr(_) => {
                let Type::TypeAsValue(inner) = ty.unboxed() else {
                    return Err(CodegenError::unsupported(format!(
                        "type expression typed {}",
                        ty.display()
                    )));
                };
                Ok(Value::new("ptr", self.cg.meta_symbol(inner)))
            }
            ExprKind::Unwrap(inner) => self.gen_expr(*inner),
            ExprKind::Conversion { inner, op } => {
                if let Some(folded) = self.fold_boxed_literal(op, *inner) {
                    return Ok(folded);
                }
                let value = self.gen_expr(*inner)?;
                let from = self.type_of(*inner)?;
                self.realize(op, value, &from, &ty)
            }
        }
    }

    fn gen_args(&mut self, args: &[ExprId]) -> Result<Vec<Value>, CodegenError> {
        args.iter().map(|&arg| self.gen_expr(arg)).collect()
    }

    pub(crate) fn read_variable(&mut self, id: VariableId) -> Result<Value, CodegenError> {
        let variable = self
            .scoper
            .get(id)
            .cloned()
            .ok_or(CodegenError::UnboundVariable { index: id.0 })?;
        if !variable.mutable || variable.value.is_void() {
            return Ok(variable.value);
        }
        let value = self.fresh();
        self.emit(format!(
            "{value} = load {}, ptr {}",
            variable.value.ty, variable.value.repr
        ));
        Ok(Value::new(variable.value.ty, value))
    }

    /// Protocol methods are looked up through the receiver's conformance
    /// at run time.
    fn protocol_method(&mut self, receiver: &str, protocol: &str, method: &str) -> String {
        let meta_ptr = self.get_meta_type_ptr(receiver);
        let meta = self.fresh();
        self.emit(format!("{meta} = load ptr, ptr {meta_ptr}"));
        let protocol = self.cg.protocol_symbol(protocol);
        let conformance = self.fresh();
        self.emit(format!(
            "{conformance} = call ptr @ember_conformance(ptr {meta}, ptr {protocol})"
        ));
        let selector = self.cg.intern_c_string(method);
        let function = self.fresh();
        self.emit(format!(
            "{function} = call ptr @ember_method(ptr {conformance}, ptr {selector})"
        ));
        function
    }

    fn gen_closure(&mut self, closure: &Closure, ty: &Type) -> Result<Value, CodegenError> {
        let Type::Callable { params, ret } = ty.unboxed() else {
            return Err(CodegenError::unsupported(format!(
                "closure typed {}",
                ty.display()
            )));
        };
        let mut captured = Vec::with_capacity(closure.captures.len());
        for &id in &closure.captures {
            let value = self.read_variable(id)?;
            if !value.is_void() {
                captured.push((id, value));
            }
        }

        let name = self.cg.next_closure_name(&self.name);
        let style = ArgumentStyle::Closure {
            captures: captured.iter().map(|(id, v)| (*id, v.ty.clone())).collect(),
        };
        let nested = FnCodeGenerator::new(
            &mut *self.cg,
            name.clone(),
            self.arena,
            self.variable_count,
            style,
        );
        let definition = nested.generate_closure(closure, params, ret)?;
        self.cg.push_function(definition);

        let context = if captured.is_empty() {
            "null".to_string()
        } else {
            let context_ty = context_type(captured.iter().map(|(_, v)| v.ty.as_str()));
            let context = self.alloc(&context_ty);
            for (i, (_, value)) in captured.iter().enumerate() {
                let field = self.fresh();
                self.emit(format!(
                    "{field} = getelementptr {context_ty}, ptr {context}, i32 0, i32 {i}"
                ));
                self.emit(format!("store {}, ptr {field}", value.typed()));
            }
            context
        };
        Ok(self.make_callable_box(&llvm_ident(&name), &context))
    }

    /// Box optionals share one constant empty box; simple optionals use
    /// the absence pattern of their layout.
    fn gen_no_value(&mut self, ty: &Type) -> Value {
        match classify(ty) {
            StorageType::Box => {
                let symbol = self.cg.constant_box("null", &BoxImage::empty());
                Value::new("ptr", symbol)
            }
            StorageType::SimpleOptional | StorageType::Simple => {
                let inner = ty.optional_inner().unwrap_or(ty);
                let layout = OptionalLayout::of(inner);
                Value::new(self.cg.llvm_type(ty), absent_constant(layout))
            }
        }
    }

    /// Boxing a literal without a protocol needs no allocation: the box is
    /// never written after creation, so it is emitted as a constant.
    fn fold_boxed_literal(&mut self, op: &BoxingOp, inner: ExprId) -> Option<Value> {
        let BoxingOp::Box {
            value_type,
            protocol: None,
        } = op
        else {
            return None;
        };
        let arena = self.arena;
        let literal = match &arena.get(inner).kind {
            ExprKind::IntLit(v) => SimpleValue::Int(*v),
            ExprKind::RealLit(v) => SimpleValue::Real(*v),
            ExprKind::BoolLit(v) => SimpleValue::Bool(*v),
            ExprKind::SymbolLit(c) => SimpleValue::Symbol(*c),
            _ => return None,
        };
        let image = encode_box(NonZeroU64::MIN, &literal);
        let meta = self.cg.meta_symbol(value_type);
        let symbol = self.cg.constant_box(&meta, &image);
        tracing::debug!(function = %self.name, %symbol, "folded boxed literal");
        Some(Value::new("ptr", symbol))
    }

    pub(crate) fn emit_call(&mut self, ret: &str, callee: &str, args: &[Value]) -> Value {
        let args = args
            .iter()
            .filter(|a| !a.is_void())
            .map(Value::typed)
            .collect::<Vec<_>>()
            .join(", ");
        if ret == "void" {
            self.emit(format!("call void {callee}({args})"));
            return Value::void();
        }
        let result = self.fresh();
        self.emit(format!("{result} = call {ret} {callee}({args})"));
        Value::new(ret, result)
    }

    pub(crate) fn emit_return(&mut self, value: &Value) {
        if value.is_void() {
            self.emit("ret void");
        } else {
            self.emit(format!("ret {}", value.typed()));
        }
        self.terminated = true;
    }

    pub(crate) fn emit(&mut self, line: impl AsRef<str>) {
        self.out.push_str("  ");
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub(crate) fn fresh(&mut self) -> String {
        let name = format!("%v{}", self.next_value);
        self.next_value += 1;
        name
    }

    pub(crate) fn fresh_block(&mut self, hint: &str) -> String {
        let label = format!("{hint}.{}", self.next_block);
        self.next_block += 1;
        label
    }

    pub(crate) fn start_block(&mut self, label: &str) {
        self.out.push_str(label);
        self.out.push_str(":\n");
        self.block = label.to_string();
    }
}

/// Struct holding a closure's captured values, in capture order.
fn context_type<'t>(fields: impl Iterator<Item = &'t str>) -> String {
    format!("{{ {} }}", fields.collect::<Vec<_>>().join(", "))
}
