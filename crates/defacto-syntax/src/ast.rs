//! The explicit program tree produced by [`crate::parser::Parser`].
//!
//! Kept as plain, cloneable Rust types — no tree-sitter, no salsa. The
//! `defacto` crate wraps [`Program`] in a salsa-tracked struct; this crate
//! only owns the shape of the tree.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub no_runtime: bool,
    pub safe: bool,
    pub imports: Vec<String>,
    pub includes: Vec<String>,
    pub interrupts: Vec<InterruptBinding>,
    pub structs: Vec<StructDecl>,
    pub enums: Vec<EnumDecl>,
    pub externs: Vec<ExternDecl>,
    pub drivers: Vec<DriverDecl>,
    pub functions: Vec<FuncDecl>,
    pub main: Option<Section>,
    pub driver_sections: Vec<DriverSection>,
    pub driver_stop: bool,
}

impl Program {
    pub fn new() -> Self {
        Program {
            no_runtime: false,
            safe: false,
            imports: Vec::new(),
            includes: Vec::new(),
            interrupts: Vec::new(),
            structs: Vec::new(),
            enums: Vec::new(),
            externs: Vec::new(),
            drivers: Vec::new(),
            functions: Vec::new(),
            main: None,
            driver_sections: Vec::new(),
            driver_stop: false,
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterruptBinding {
    pub number: u32,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternDecl {
    pub name: String,
    pub library: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverKind {
    Keyboard,
    Mouse,
    Volume,
}

impl DriverKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "keyboard" | "#keyboard" => Some(DriverKind::Keyboard),
            "mouse" | "#mouse" => Some(DriverKind::Mouse),
            "volume" | "#volume" => Some(DriverKind::Volume),
            _ => None,
        }
    }

    pub fn stub_suffix(self) -> &'static str {
        match self {
            DriverKind::Keyboard => "keyboard",
            DriverKind::Mouse => "mouse",
            DriverKind::Volume => "speaker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverDecl {
    pub name: String,
    pub kind: DriverKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSection {
    pub name: String,
    pub kind: DriverKind,
    pub decls: Vec<VarDecl>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub return_type: Option<Type>,
    pub body: Section,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub decls: Vec<VarDecl>,
    pub stmts: Vec<Stmt>,
}

impl Section {
    pub fn new() -> Self {
        Section {
            decls: Vec::new(),
            stmts: Vec::new(),
        }
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub is_const: bool,
    pub array_len: Option<u32>,
    pub init: Option<Expr>,
}

/// The closed set of base types plus user structs and pointer/array
/// modifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Type {
    I32,
    I64,
    U8,
    Bool,
    Str,
    /// Untyped `pointer`.
    Pointer,
    /// `*T` — a typed pointer, any number of `*` deep.
    PointerTo(Box<Type>),
    /// A user-declared struct or enum, by name.
    Named(String),
    /// A fixed-size array field, e.g. `i32[4]`.
    Array(Box<Type>, u32),
}

impl Type {
    /// Size in bytes on a target of the given bit width, per the
    /// struct-layout table (`u8`=1, `i32`/`bool`=4, `i64`/`string`/pointer=8
    /// on 64-bit targets, 4 on 32-bit targets).
    pub fn size_on(&self, bits: u8) -> u32 {
        match self {
            Type::U8 => 1,
            Type::I32 | Type::Bool => 4,
            Type::I64 | Type::Str | Type::Pointer | Type::PointerTo(_) => {
                if bits == 64 {
                    8
                } else {
                    4
                }
            }
            Type::Named(_) => if bits == 64 { 8 } else { 4 },
            Type::Array(elem, len) => elem.size_on(bits) * len,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer | Type::PointerTo(_))
    }
}

/// Assignment/store target — plain identifier, register, array element,
/// struct field, or pointer dereference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AssignTarget {
    Ident(String),
    Register(String),
    ArrayElement { name: String, index: Expr },
    StructField { name: String, field: String },
    Deref(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Shr,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
}

impl BinOp {
    /// Lower precedence binds looser:
    /// `||` < `&&` < comparisons < `>>` < `+ -` < `* /`.
    pub fn precedence(self) -> u8 {
        use BinOp::*;
        match self {
            Or => 0,
            And => 1,
            Eq | Neq | Lt | Gt | Lte | Gte => 2,
            Shr => 3,
            Add | Sub => 4,
            Mul | Div => 5,
        }
    }

    /// The jump-on-negated-condition used when lowering a conditional: the
    /// branch taken when the condition is *false*.
    pub fn negated_jump(self) -> &'static str {
        match self {
            BinOp::Eq => "jne",
            BinOp::Neq => "je",
            BinOp::Lt => "jge",
            BinOp::Gt => "jle",
            BinOp::Lte => "jg",
            BinOp::Gte => "jl",
            BinOp::And | BinOp::Or | BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Shr => {
                unreachable!("not a comparison operator")
            }
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Gt | BinOp::Lte | BinOp::Gte
        )
    }

    fn text(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Lte => "<=",
            BinOp::Gte => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// An expression tree node, kept end-to-end through code generation rather
/// than serialised to a string and re-parsed by the back end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Number(i64),
    Hex(i64),
    Str(String),
    Bool(bool),
    Ident(String),
    Register(String),
    AddressOf(Box<Expr>),
    Deref(Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    ArrayIndex {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    FieldAccess {
        base: Box<Expr>,
        field: String,
    },
}

impl std::fmt::Display for Expr {
    /// The canonical fully-parenthesised form, e.g. `(a+(b*c))`. Useful for
    /// checking that parentheses stay balanced in tests; code generation
    /// itself walks the tree rather than this string.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Hex(n) => write!(f, "{n:#x}"),
            Expr::Str(s) => write!(f, "{s:?}"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Ident(s) => write!(f, "{s}"),
            Expr::Register(s) => write!(f, "{s}"),
            Expr::AddressOf(e) => write!(f, "(&{e})"),
            Expr::Deref(e) => write!(f, "(*{e})"),
            Expr::Neg(e) => write!(f, "(-{e})"),
            Expr::Not(e) => write!(f, "(!{e})"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs}{}{rhs})", op.text()),
            Expr::ArrayLiteral(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::ArrayIndex { array, index } => write!(f, "({array}[{index}])"),
            Expr::FieldAccess { base, field } => write!(f, "({base}.{field})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    Assign {
        target: AssignTarget,
        value: Expr,
    },
    Loop {
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: String,
        from: Expr,
        to: Expr,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Switch {
        value: Expr,
        cases: Vec<(Expr, Vec<Stmt>)>,
        default: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Call(String),
    DriverCall {
        target: String,
        builtin: String,
        use_builtin: bool,
    },
    RegMove {
        target: String,
        source: String,
    },
    RegStatic {
        target: String,
    },
    Display(Expr),
    PrintNum(Expr),
    PutChar(Expr),
    Color(Expr),
    Clear,
    Reboot,
    ReadKey(String),
    ReadChar(String),
    Free(String),
    /// `alloc{N}` — leaves the result in the target's fixed return
    /// register.
    Alloc(Expr),
}
