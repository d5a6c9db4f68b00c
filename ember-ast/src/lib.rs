#![forbid(unsafe_code)]

use ember_types::Type;
use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub type Ident = Spanned<String>;

pub fn ident(name: impl Into<String>, at: Span) -> Ident {
    Spanned::new(at, name.into())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(pub u32);

impl VariableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---- Types as written ----

#[derive(Clone, Debug, PartialEq)]
pub struct TypeRef {
    pub span: Span,
    pub kind: TypeRefKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeRefKind {
    Named { name: Ident, args: Vec<TypeRef> },
    Optional(Box<TypeRef>),
    Callable { params: Vec<TypeRef>, ret: Box<TypeRef> },
}

impl TypeRef {
    pub fn named(name: impl Into<String>, at: Span) -> Self {
        Self {
            span: at,
            kind: TypeRefKind::Named {
                name: ident(name, at),
                args: Vec::new(),
            },
        }
    }

    pub fn optional(inner: TypeRef) -> Self {
        Self {
            span: inner.span,
            kind: TypeRefKind::Optional(Box::new(inner)),
        }
    }
}

// ---- Expressions ----

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
    /// Type as finally represented; set once by analysis.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind, ty: None }
    }

    /// The representation change this node performs, if it is a conversion.
    pub fn boxing(&self) -> Option<&BoxingOp> {
        match &self.kind {
            ExprKind::Conversion { op, .. } => Some(op),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    RealLit(f64),
    BoolLit(bool),
    StringLit(String),
    SymbolLit(char),
    /// An optional holding no value; its type comes from the expectation.
    NoValue,
    Local(LocalRef),
    /// Call of a free function.
    Call(CallExpr),
    /// Call of a method on a receiver value.
    MethodCall(MethodCallExpr),
    /// Invocation of a callable value.
    Invoke { callee: ExprId, args: Vec<ExprId> },
    Closure(Closure),
    TypeExpr(TypeExpr),
    /// Checked access to the value of an optional.
    Unwrap(ExprId),
    /// Inserted by analysis: changes how `inner` is represented.
    Conversion { inner: ExprId, op: BoxingOp },
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalRef {
    pub name: Ident,
    pub variable: Option<VariableId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arguments {
    pub span: Span,
    pub args: Vec<ExprId>,
    /// Generic arguments as written at the call site.
    pub generic_args: Vec<TypeRef>,
    /// Generic arguments after validation or inference.
    pub resolved_generic_args: Vec<Type>,
}

impl Arguments {
    pub fn new(span: Span, args: Vec<ExprId>) -> Self {
        Self {
            span,
            args,
            generic_args: Vec::new(),
            resolved_generic_args: Vec::new(),
        }
    }

    pub fn with_generic_args(mut self, generic_args: Vec<TypeRef>) -> Self {
        self.generic_args = generic_args;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    pub function: Ident,
    pub arguments: Arguments,
    pub target: Option<FunctionId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodCallExpr {
    pub receiver: ExprId,
    pub method: Ident,
    pub arguments: Arguments,
    pub target: Option<FunctionId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClosureParam {
    pub name: Ident,
    pub ty: TypeRef,
    pub variable: Option<VariableId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Closure {
    pub params: Vec<ClosureParam>,
    pub ret: TypeRef,
    pub body: ExprId,
    /// Outer variables the body reads; filled in by analysis.
    pub captures: Vec<VariableId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Explicit(TypeRef),
    /// Type taken from the expectation at the use site.
    Inferred,
    /// The type that owns the function being analysed.
    This,
}

/// Representation change attached to a conversion node.
#[derive(Clone, Debug, PartialEq)]
pub enum BoxingOp {
    /// Simple value into a box tagged with `value_type`'s meta, or with its
    /// conformance to `protocol` when the box is protocol-typed.
    Box {
        value_type: Type,
        protocol: Option<String>,
    },
    /// Simple optional into a box; absent values get the null meta.
    BoxOptional { value_type: Type },
    /// Box to box; only the meta tag changes.
    Rebox { protocol: String },
    /// Box to simple value; the meta is checked at run time.
    Unbox { to: Type },
    /// Box to simple optional.
    UnboxOptional { to: Type },
    WrapOptional,
    UnwrapOptional,
    UnwrapBoxOptional,
    CallableAdapt(CallableAdapter),
}

/// Conversions performed by an adapter thunk around a callable value on
/// every invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct CallableAdapter {
    pub from: Type,
    pub to: Type,
    /// One entry per parameter: converts from the caller's representation
    /// to the wrapped callable's.
    pub args: Vec<Option<BoxingOp>>,
    /// Converts the wrapped callable's result to the caller's representation.
    pub ret: Option<Box<BoxingOp>>,
}

impl CallableAdapter {
    pub fn conversion_count(&self) -> usize {
        self.args.iter().flatten().count() + usize::from(self.ret.is_some())
    }
}

/// Per-function node storage. Parents refer to children by `ExprId`, so a
/// slot can be rewritten in place without touching the parent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, span: Span, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(Expr::new(span, kind));
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Moves the node in `slot` to a fresh id and stores the node built by
    /// `wrapper` (which receives that fresh id) in `slot`.
    pub fn wrap(&mut self, slot: ExprId, wrapper: impl FnOnce(ExprId, Span) -> Expr) -> ExprId {
        let moved = ExprId(self.nodes.len() as u32);
        let span = self.nodes[slot.index()].span;
        let outer = wrapper(moved, span);
        let inner = std::mem::replace(&mut self.nodes[slot.index()], outer);
        self.nodes.push(inner);
        moved
    }

    /// Wraps `slot` in a conversion node typed `ty`.
    pub fn convert(&mut self, slot: ExprId, op: BoxingOp, ty: Type) -> ExprId {
        self.wrap(slot, |inner, span| Expr {
            span,
            kind: ExprKind::Conversion { inner, op },
            ty: Some(ty),
        })
    }

    /// Number of conversion nodes stacked on top of `slot`.
    pub fn conversion_depth(&self, slot: ExprId) -> usize {
        let mut depth = 0;
        let mut current = slot;
        while let ExprKind::Conversion { inner, .. } = &self.get(current).kind {
            depth += 1;
            current = *inner;
        }
        depth
    }
}

// ---- Statements ----

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let(LetStmt),
    Assign(AssignStmt),
    Expr(ExprId),
    Return(ReturnStmt),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LetStmt {
    pub span: Span,
    pub name: Ident,
    pub mutable: bool,
    pub ty: Option<TypeRef>,
    /// `None` defers initialization to a later assignment.
    pub init: Option<ExprId>,
    pub variable: Option<VariableId>,
    /// Type of the binding, set by analysis.
    pub resolved: Option<Type>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    pub target: Ident,
    pub value: ExprId,
    pub variable: Option<VariableId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub value: Option<ExprId>,
}

/// Body of one function: the statements and the arena owning every
/// expression they mention.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunctionBody {
    pub arena: ExprArena,
    pub stmts: Vec<Stmt>,
    /// Parameters first, then every local declared by analysis.
    pub variable_count: u32,
}

impl FunctionBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expr(&mut self, span: Span, kind: ExprKind) -> ExprId {
        self.arena.alloc(span, kind)
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }
}
