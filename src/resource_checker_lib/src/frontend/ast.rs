//! The abstract syntax tree produced by the parser.
//!
//! The tree mirrors the source program closely. Statements keep the line
//! they start on so that the lowering pass can attach source addresses
//! to the terms it generates. Types are kept as unresolved [`TypeExpr`]
//! values since struct and typedef names can only be resolved against
//! the type registry during lowering.

/// A parsed source file.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TranslationUnit {
    /// All type definitions (structs and typedefs) in source order.
    pub types: Vec<TypeDef>,
    /// All function definitions in source order.
    pub functions: Vec<Function>,
}

/// A named type introduced at file scope.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TypeDef {
    /// A struct definition listing its fields in declaration order.
    Struct {
        /// The struct tag.
        name: String,
        /// The fields in declaration order.
        fields: Vec<(String, TypeExpr)>,
    },
    /// A `typedef` introducing an alias for a type.
    Typedef {
        /// The newly introduced name.
        name: String,
        /// The aliased type.
        ty: TypeExpr,
    },
}

/// An unresolved type as written in the source.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TypeExpr {
    /// `void`
    Void,
    /// `char` (signedness is ignored)
    Char,
    /// An integer type of the given width in bytes.
    /// `int` is 4 bytes wide, `long`, `size_t`, `ssize_t` and `off_t` are 8.
    Int(u64),
    /// A pointer to the inner type.
    Pointer(Box<TypeExpr>),
    /// A fixed-length array.
    Array {
        /// The element type.
        element: Box<TypeExpr>,
        /// The number of elements.
        length: u64,
    },
    /// A reference to a struct by tag, resolved during lowering.
    Struct(String),
    /// A reference to a typedef name, resolved during lowering.
    Named(String),
    /// A pointer to a function.
    FunctionPointer {
        /// The parameter types.
        params: Vec<TypeExpr>,
        /// The return type.
        return_type: Box<TypeExpr>,
    },
}

/// A function definition.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Function {
    /// The function name.
    pub name: String,
    /// The return type.
    pub return_type: TypeExpr,
    /// The named parameters in declaration order.
    pub params: Vec<(String, TypeExpr)>,
    /// The statements of the function body.
    pub body: Vec<Statement>,
    /// The line the function definition starts on.
    pub line: u64,
}

/// A statement together with the line it starts on.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Statement {
    /// The statement itself.
    pub kind: StatementKind,
    /// The line the statement starts on.
    pub line: u64,
}

/// The statement forms of the accepted C subset.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StatementKind {
    /// A local variable declaration with an optional initializer.
    Decl {
        /// The declared name.
        name: String,
        /// The declared type.
        ty: TypeExpr,
        /// The initializer if one is present.
        init: Option<Expr>,
    },
    /// An assignment to a variable, struct member or dereferenced pointer.
    Assign {
        /// The place being written.
        target: Expr,
        /// The assigned value.
        value: Expr,
    },
    /// An expression evaluated for its side effect, e.g. a call.
    Expr(Expr),
    /// An `if` statement with an optional `else` branch.
    If {
        /// The branch condition.
        condition: Expr,
        /// The statements executed if the condition holds.
        then_body: Vec<Statement>,
        /// The statements executed otherwise.
        else_body: Vec<Statement>,
    },
    /// A `while` loop.
    While {
        /// The loop condition.
        condition: Expr,
        /// The loop body.
        body: Vec<Statement>,
    },
    /// A `for` loop. The init and step parts are statements without
    /// their own source line, restricted by the parser to declarations,
    /// assignments and expression statements.
    For {
        /// The init statement if present.
        init: Option<Box<Statement>>,
        /// The loop condition if present. A missing condition loops forever.
        condition: Option<Expr>,
        /// The step statement if present.
        step: Option<Box<Statement>>,
        /// The loop body.
        body: Vec<Statement>,
    },
    /// A `return` statement with an optional value.
    Return(Option<Expr>),
}

/// An expression.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Expr {
    /// A name, resolved during lowering against locals, parameters
    /// and function names.
    Ident(String),
    /// An integer literal.
    Number(i64),
    /// A string literal.
    Str(String),
    /// The `NULL` constant.
    Null,
    /// A call. The callee is an arbitrary expression to allow calls
    /// through function pointers stored in struct members.
    Call {
        /// The called expression.
        callee: Box<Expr>,
        /// The arguments in source order.
        args: Vec<Expr>,
    },
    /// A struct member access, `base.field` or `base->field`.
    Member {
        /// The accessed expression.
        base: Box<Expr>,
        /// The field name.
        field: String,
        /// True for `->`, false for `.`.
        through_pointer: bool,
    },
    /// An array element access `base[index]`.
    Index {
        /// The indexed expression.
        base: Box<Expr>,
        /// The index expression.
        index: Box<Expr>,
    },
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// The left operand.
        lhs: Box<Expr>,
        /// The right operand.
        rhs: Box<Expr>,
    },
    /// A cast `(type)expr`. Casts do not change the lowered value.
    Cast {
        /// The target type.
        ty: TypeExpr,
        /// The cast expression.
        expr: Box<Expr>,
    },
    /// `sizeof(type)`, folded to a constant during lowering.
    SizeofType(TypeExpr),
    /// `sizeof(expr)`, folded to a constant during lowering.
    SizeofExpr(Box<Expr>),
}

/// Unary operators.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    /// Arithmetic negation `-`.
    Negate,
    /// Logical negation `!`.
    Not,
    /// Address-of `&`.
    AddressOf,
    /// Pointer dereference `*`.
    Deref,
}

/// Binary operators in the source syntax.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `&&`
    And,
    /// `||`
    Or,
}
