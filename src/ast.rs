//! Typed syntax tree produced by the parser. See `spec` §4.2.

use crate::span::Span;

#[derive(Clone, Debug)]
pub struct Program {
  pub meta: Vec<MetaBlock>,
  pub body: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub struct MetaBlock {
  pub json: serde_json::Value,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
  pub name: String,
  pub params: Params,
  pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, Default)]
pub struct Params {
  /// Positional parameters, in declaration order, each with an optional
  /// literal default.
  pub pos: Vec<(String, Option<Expr>)>,
  /// `**kwargs`-style catch-all for unmatched keyword arguments.
  pub kwargs: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Stmt {
  pub kind: StmtKind,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
  Func(FuncDecl),
  Let { name: String, value: Expr },
  Assign { target: Expr, value: Expr },
  If(If),
  While { cond: Expr, body: Vec<Stmt> },
  ForIn { var: String, iter: Expr, body: Vec<Stmt> },
  Return(Option<Expr>),
  Break,
  Continue,
  Yield,
  Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct If {
  pub cond: Expr,
  pub then_body: Vec<Stmt>,
  /// Each `elif` clause, in order.
  pub elifs: Vec<(Expr, Vec<Stmt>)>,
  pub else_body: Option<Vec<Stmt>>,
}

#[derive(Clone, Debug)]
pub struct Expr {
  pub kind: ExprKind,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
  Bool(bool),
  Number(f64),
  String(String),
  Ident(String),
  List(Vec<Expr>),
  Map(Vec<(Expr, Expr)>),
  Unary { op: UnaryOp, rhs: Box<Expr> },
  Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
  Logical { op: LogicalOp, lhs: Box<Expr>, rhs: Box<Expr> },
  Call { callee: Box<Expr>, args: CallArgs },
  Index { target: Box<Expr>, index: Box<Expr> },
  Attr { target: Box<Expr>, name: String },
}

#[derive(Clone, Debug, Default)]
pub struct CallArgs {
  pub positional: Vec<Expr>,
  pub keyword: Vec<(String, Expr)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Gt,
  Ge,
  Lt,
  Le,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
}
