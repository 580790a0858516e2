//! The error union for every phase of the pipeline.
//!
//! Lex/parse/compile errors abort before any execution; runtime errors
//! unwind every frame and surface at the `run`/`resume`/`call` boundary.
//! See `spec` §7.

use thiserror::Error;

use crate::span::Span;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0}")]
  Lex(#[from] LexError),
  #[error("{0}")]
  Parse(#[from] ParseError),
  #[error("{0}")]
  Compile(#[from] CompileError),
  #[error("{0}")]
  Runtime(#[from] RuntimeError),
}

impl Error {
  /// The source line this error originated at, if known.
  pub fn line(&self) -> Option<usize> {
    match self {
      Error::Lex(e) => Some(e.line),
      Error::Parse(e) => Some(e.line),
      Error::Compile(e) => Some(e.line),
      Error::Runtime(e) => e.line,
    }
  }
}

#[derive(Debug, Error)]
#[error("lex error at {line}:{column}: {kind}")]
pub struct LexError {
  pub line: usize,
  pub column: usize,
  pub span: Span,
  pub kind: LexErrorKind,
}

#[derive(Debug, Error)]
pub enum LexErrorKind {
  #[error("unterminated string literal")]
  UnterminatedString,
  #[error("inconsistent dedent: no enclosing indentation level matches")]
  InconsistentDedent,
  #[error("stray `@` outside of a metadata block")]
  StrayAt,
  #[error("unmatched `{{` in metadata block")]
  UnbalancedMeta,
  #[error("unexpected character `{0}`")]
  UnknownCharacter(char),
}

#[derive(Debug, Error)]
#[error("parse error at {line}:{column}: {message}")]
pub struct ParseError {
  pub line: usize,
  pub column: usize,
  pub span: Span,
  pub message: String,
}

#[derive(Debug, Error)]
#[error("compile error at {line}:{column}: {message}")]
pub struct CompileError {
  pub line: usize,
  pub column: usize,
  pub span: Span,
  pub message: String,
}

#[derive(Debug, Error)]
#[error("runtime error{}: {kind}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
pub struct RuntimeError {
  pub line: Option<usize>,
  pub kind: RuntimeErrorKind,
}

impl RuntimeError {
  pub fn new(line: Option<usize>, kind: RuntimeErrorKind) -> Self {
    Self { line, kind }
  }
}

#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
  #[error("undefined name `{0}`")]
  UndefinedName(String),
  #[error("type error: {0}")]
  TypeError(String),
  #[error("index error: {0}")]
  IndexError(String),
  #[error("attribute error: {0}")]
  AttributeError(String),
  #[error("arithmetic error: {0}")]
  ArithmeticError(String),
  #[error("stack underflow in {0}")]
  StackUnderflow(&'static str),
  #[error("native error: {0}")]
  NativeError(String),
}

impl RuntimeErrorKind {
  pub fn at(self, line: usize) -> RuntimeError {
    RuntimeError::new(Some(line), self)
  }
}
