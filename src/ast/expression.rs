use super::{Block, Pos};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Num(f64, Pos),
    Str(String, Pos),
    Bool(bool, Pos),
    Null(Pos),
    RegexLit(String, Pos),
    /// A variable reference. `key` is the lookup key used by the
    /// evaluator's frame chain: a plain identifier (`x`), `"$"` for the
    /// current record, or `"$index"`/`"$key"`/`"$file"`/`"$name"` for a
    /// dollar-identifier.
    Var(String, Pos),
    Array(Vec<Expression>, Pos),
    Object(Vec<(ObjectKey, Expression)>, Pos),
    Member {
        object: Box<Expression>,
        property: String,
        pos: Pos,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
        pos: Pos,
    },
    Slice {
        object: Box<Expression>,
        start: Option<Box<Expression>>,
        end: Option<Box<Expression>>,
        pos: Pos,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        pos: Pos,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        pos: Pos,
    },
    IncDec {
        op: IncDecOp,
        prefix: bool,
        target: AssignTarget,
        pos: Pos,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        pos: Pos,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        pos: Pos,
    },
    Is {
        value: Box<Expression>,
        type_name: String,
        pos: Pos,
    },
    Assign {
        target: AssignTarget,
        value: Box<Expression>,
        pos: Pos,
    },
    FunctionLit {
        name: Option<String>,
        params: Vec<String>,
        body: Block,
        pos: Pos,
    },
    Match {
        scrutinee: Box<Expression>,
        arms: Vec<MatchArm>,
        pos: Pos,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    Ident(String),
    Str(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: MatchBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchBody {
    Block(Block),
    Expr(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Literal(Box<Expression>),
    Array(Vec<Pattern>),
    Ident(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Match,
    NotMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// AssignTarget is the parser's synthesised view of an lvalue: a base
/// identifier plus an ordered list of path segments. Any expression shape
/// the parser cannot decompose this way (e.g. a call on the left of `=`)
/// is rejected as a syntax error at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub base: String,
    pub path: Vec<PathSegment>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(Box<Expression>),
}

impl AssignTarget {
    /// Rebuilds the expression that *reads* this target, used when
    /// desugaring `target op= value` into `target = target op value`.
    pub fn to_read_expr(&self) -> Expression {
        let mut expr = Expression::Var(self.base.clone(), self.pos);
        for segment in &self.path {
            expr = match segment {
                PathSegment::Field(name) => Expression::Member {
                    object: Box::new(expr),
                    property: name.clone(),
                    pos: self.pos,
                },
                PathSegment::Index(index) => Expression::Index {
                    object: Box::new(expr),
                    index: index.clone(),
                    pos: self.pos,
                },
            };
        }
        expr
    }
}

impl Expression {
    pub fn pos(&self) -> Pos {
        use Expression::*;
        match self {
            Num(_, pos)
            | Str(_, pos)
            | Bool(_, pos)
            | Null(pos)
            | RegexLit(_, pos)
            | Var(_, pos)
            | Array(_, pos)
            | Object(_, pos)
            | Member { pos, .. }
            | Index { pos, .. }
            | Slice { pos, .. }
            | Call { pos, .. }
            | Unary { pos, .. }
            | IncDec { pos, .. }
            | Binary { pos, .. }
            | Logical { pos, .. }
            | Is { pos, .. }
            | Assign { pos, .. }
            | FunctionLit { pos, .. }
            | Match { pos, .. } => *pos,
        }
    }
}
