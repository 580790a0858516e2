//! Recursive-descent parser over the lexer's token stream. See `spec` §4.2.

use crate::ast::*;
use crate::error::{ParseError, Result};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub fn parse(tokens: Vec<Token>) -> Result<Program, Vec<ParseError>> {
  let mut p = Parser::new(tokens);
  let program = p.program();
  if p.errors.is_empty() {
    match program {
      Ok(program) => Ok(program),
      Err(e) => {
        p.errors.push(e);
        Err(p.errors)
      }
    }
  } else {
    Err(p.errors)
  }
}

struct Parser {
  tokens: Vec<Token>,
  pos: usize,
  errors: Vec<ParseError>,
}

type PResult<T> = std::result::Result<T, ParseError>;

impl Parser {
  fn new(tokens: Vec<Token>) -> Self {
    Self {
      tokens,
      pos: 0,
      errors: Vec::new(),
    }
  }

  fn peek(&self) -> &TokenKind {
    &self.tokens[self.pos].kind
  }

  fn peek_token(&self) -> &Token {
    &self.tokens[self.pos]
  }

  fn advance(&mut self) -> Token {
    let t = self.tokens[self.pos].clone();
    if self.pos + 1 < self.tokens.len() {
      self.pos += 1;
    }
    t
  }

  fn check(&self, kind: &TokenKind) -> bool {
    std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
  }

  fn at_end(&self) -> bool {
    matches!(self.peek(), TokenKind::Eof)
  }

  fn error(&self, message: impl Into<String>) -> ParseError {
    let t = self.peek_token();
    ParseError {
      line: t.line,
      column: 1,
      span: t.span,
      message: message.into(),
    }
  }

  fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
    if self.check(&kind) {
      Ok(self.advance())
    } else {
      Err(self.error(format!("expected {what}, found {:?}", self.peek())))
    }
  }

  fn expect_ident(&mut self) -> PResult<(String, Span)> {
    let t = self.peek_token().clone();
    match &t.kind {
      TokenKind::Ident(name) => {
        self.advance();
        Ok((name.clone(), t.span))
      }
      _ => Err(self.error("expected identifier")),
    }
  }

  fn skip_blank_lines(&mut self) {
    while matches!(self.peek(), TokenKind::Newline) {
      self.advance();
    }
  }

  fn program(&mut self) -> PResult<Program> {
    let mut meta = Vec::new();
    let mut body = Vec::new();
    self.skip_blank_lines();
    while !self.at_end() {
      if let TokenKind::Meta(content) = self.peek().clone() {
        let span = self.peek_token().span;
        let line = self.peek_token().line;
        self.advance();
        let json = parse_meta_json(&content, span, line)?;
        meta.push(MetaBlock { json, span });
        self.skip_blank_lines();
        continue;
      }
      match self.statement() {
        Ok(stmt) => body.push(stmt),
        Err(e) => {
          self.errors.push(e);
          self.synchronize();
        }
      }
      self.skip_blank_lines();
    }
    Ok(Program { meta, body })
  }

  /// Skip tokens until the start of the next logical line, to recover
  /// after a parse error and keep collecting further diagnostics.
  fn synchronize(&mut self) {
    while !self.at_end() && !matches!(self.peek(), TokenKind::Newline) {
      self.advance();
    }
    if matches!(self.peek(), TokenKind::Newline) {
      self.advance();
    }
  }

  fn block(&mut self) -> PResult<Vec<Stmt>> {
    self.expect(TokenKind::Newline, "newline before block")?;
    self.skip_blank_lines();
    self.expect(TokenKind::Indent, "indented block")?;
    let mut body = Vec::new();
    while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
      body.push(self.statement()?);
      self.skip_blank_lines();
    }
    if body.is_empty() {
      return Err(self.error("a block must contain at least one statement"));
    }
    self.expect(TokenKind::Dedent, "dedent closing block")?;
    Ok(body)
  }

  fn statement(&mut self) -> PResult<Stmt> {
    let start = self.peek_token().span;
    match self.peek().clone() {
      TokenKind::Func => self.func_decl(start),
      TokenKind::Let => self.var_decl(start),
      TokenKind::Set => self.var_assign(start),
      TokenKind::If => self.if_stmt(start),
      TokenKind::While => self.while_stmt(start),
      TokenKind::For => self.for_stmt(start),
      TokenKind::Return => {
        self.advance();
        let value = if matches!(self.peek(), TokenKind::Newline) {
          None
        } else {
          Some(self.expression()?)
        };
        let end = self.expect(TokenKind::Newline, "newline after return")?.span;
        Ok(Stmt {
          kind: StmtKind::Return(value),
          span: start.join(end),
        })
      }
      TokenKind::Break => {
        self.advance();
        let end = self.expect(TokenKind::Newline, "newline after break")?.span;
        Ok(Stmt {
          kind: StmtKind::Break,
          span: start.join(end),
        })
      }
      TokenKind::Continue => {
        self.advance();
        let end = self
          .expect(TokenKind::Newline, "newline after continue")?
          .span;
        Ok(Stmt {
          kind: StmtKind::Continue,
          span: start.join(end),
        })
      }
      TokenKind::Yield => {
        self.advance();
        let end = self.expect(TokenKind::Newline, "newline after yield")?.span;
        Ok(Stmt {
          kind: StmtKind::Yield,
          span: start.join(end),
        })
      }
      _ => {
        let expr = self.expression()?;
        let end = self.expect(TokenKind::Newline, "newline after expression")?.span;
        Ok(Stmt {
          kind: StmtKind::Expr(expr),
          span: start.join(end),
        })
      }
    }
  }

  fn func_decl(&mut self, start: Span) -> PResult<Stmt> {
    self.advance(); // func
    let (name, _) = self.expect_ident()?;
    self.expect(TokenKind::LParen, "`(`")?;
    let params = self.params()?;
    self.expect(TokenKind::RParen, "`)`")?;
    self.expect(TokenKind::Colon, "`:`")?;
    let body = self.block()?;
    let end = body.last().map(|s| s.span).unwrap_or(start);
    Ok(Stmt {
      kind: StmtKind::Func(FuncDecl { name, params, body }),
      span: start.join(end),
    })
  }

  fn params(&mut self) -> PResult<Params> {
    let mut params = Params::default();
    if matches!(self.peek(), TokenKind::RParen) {
      return Ok(params);
    }
    loop {
      if matches!(self.peek(), TokenKind::Star) {
        self.advance();
        self.expect(TokenKind::Star, "second `*` of `**kwargs`")?;
        let (name, _) = self.expect_ident()?;
        params.kwargs = Some(name);
        break;
      }
      let (name, _) = self.expect_ident()?;
      let default = if matches!(self.peek(), TokenKind::Eq) {
        self.advance();
        Some(self.expression()?)
      } else {
        None
      };
      params.pos.push((name, default));
      if matches!(self.peek(), TokenKind::Comma) {
        self.advance();
      } else {
        break;
      }
    }
    Ok(params)
  }

  fn var_decl(&mut self, start: Span) -> PResult<Stmt> {
    self.advance(); // let
    let (name, _) = self.expect_ident()?;
    self.expect(TokenKind::Eq, "`=`")?;
    let value = self.expression()?;
    let end = self.expect(TokenKind::Newline, "newline after let")?.span;
    Ok(Stmt {
      kind: StmtKind::Let { name, value },
      span: start.join(end),
    })
  }

  fn var_assign(&mut self, start: Span) -> PResult<Stmt> {
    self.advance(); // set
    let target = self.assignable_target()?;

    let target_span = target.span;
    let value = match self.peek().clone() {
      TokenKind::PlusPlus => {
        self.advance();
        desugar_binary(target.clone(), BinaryOp::Add, one(target_span))
      }
      TokenKind::MinusMinus => {
        self.advance();
        desugar_binary(target.clone(), BinaryOp::Sub, one(target_span))
      }
      TokenKind::PlusEq => {
        self.advance();
        let rhs = self.expression()?;
        desugar_binary(target.clone(), BinaryOp::Add, rhs)
      }
      TokenKind::MinusEq => {
        self.advance();
        let rhs = self.expression()?;
        desugar_binary(target.clone(), BinaryOp::Sub, rhs)
      }
      TokenKind::StarEq => {
        self.advance();
        let rhs = self.expression()?;
        desugar_binary(target.clone(), BinaryOp::Mul, rhs)
      }
      TokenKind::SlashEq => {
        self.advance();
        let rhs = self.expression()?;
        desugar_binary(target.clone(), BinaryOp::Div, rhs)
      }
      TokenKind::Eq => {
        self.advance();
        self.expression()?
      }
      _ => return Err(self.error("expected `=`, `++`, `--`, or a compound assignment")),
    };

    let end = self.expect(TokenKind::Newline, "newline after set")?.span;
    Ok(Stmt {
      kind: StmtKind::Assign { target, value },
      span: start.join(end),
    })
  }

  /// `target := primary (("." IDENT) | ("[" expression "]"))*` — like
  /// [`Self::call_or_index`] but without the call arm, since `set f() = x`
  /// is never a valid assignment target.
  fn assignable_target(&mut self) -> PResult<Expr> {
    let mut expr = self.primary()?;
    loop {
      match self.peek() {
        TokenKind::Dot => {
          self.advance();
          let (name, name_span) = self.expect_ident()?;
          let span = expr.span.join(name_span);
          expr = Expr {
            kind: ExprKind::Attr {
              target: Box::new(expr),
              name,
            },
            span,
          };
        }
        TokenKind::LBracket => {
          self.advance();
          let index = self.expression()?;
          let end = self.expect(TokenKind::RBracket, "`]`")?.span;
          let span = expr.span.join(end);
          expr = Expr {
            kind: ExprKind::Index {
              target: Box::new(expr),
              index: Box::new(index),
            },
            span,
          };
        }
        _ => break,
      }
    }
    Ok(expr)
  }

  fn if_stmt(&mut self, start: Span) -> PResult<Stmt> {
    self.advance(); // if
    let cond = self.expression()?;
    self.expect(TokenKind::Colon, "`:`")?;
    let then_body = self.block()?;
    let mut elifs = Vec::new();
    let mut else_body = None;
    loop {
      self.skip_blank_lines_preserving_position();
      match self.peek() {
        TokenKind::Elif => {
          self.advance();
          let cond = self.expression()?;
          self.expect(TokenKind::Colon, "`:`")?;
          let body = self.block()?;
          elifs.push((cond, body));
        }
        TokenKind::Else => {
          self.advance();
          self.expect(TokenKind::Colon, "`:`")?;
          else_body = Some(self.block()?);
          break;
        }
        _ => break,
      }
    }
    let end = else_body
      .as_ref()
      .and_then(|b| b.last())
      .or_else(|| elifs.last().and_then(|(_, b)| b.last()))
      .or_else(|| then_body.last())
      .map(|s| s.span)
      .unwrap_or(start);
    Ok(Stmt {
      kind: StmtKind::If(If {
        cond,
        then_body,
        elifs,
        else_body,
      }),
      span: start.join(end),
    })
  }

  /// `elif`/`else` continue the same statement, so blank lines between the
  /// closing `DEDENT` of one arm and the next keyword must not be treated
  /// as ending the `if`. Block boundaries already consumed their own
  /// newlines, so this only needs to skip stray blank lines.
  fn skip_blank_lines_preserving_position(&mut self) {
    self.skip_blank_lines();
  }

  fn while_stmt(&mut self, start: Span) -> PResult<Stmt> {
    self.advance(); // while
    let cond = self.expression()?;
    self.expect(TokenKind::Colon, "`:`")?;
    let body = self.block()?;
    let end = body.last().map(|s| s.span).unwrap_or(start);
    Ok(Stmt {
      kind: StmtKind::While { cond, body },
      span: start.join(end),
    })
  }

  fn for_stmt(&mut self, start: Span) -> PResult<Stmt> {
    self.advance(); // for
    let (var, _) = self.expect_ident()?;
    self.expect(TokenKind::In, "`in`")?;
    let iter = self.expression()?;
    self.expect(TokenKind::Colon, "`:`")?;
    let body = self.block()?;
    let end = body.last().map(|s| s.span).unwrap_or(start);
    Ok(Stmt {
      kind: StmtKind::ForIn { var, iter, body },
      span: start.join(end),
    })
  }

  // --- expressions, precedence-climbing ---

  fn expression(&mut self) -> PResult<Expr> {
    self.or_expr()
  }

  fn or_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.and_expr()?;
    while matches!(self.peek(), TokenKind::Or) {
      self.advance();
      let rhs = self.and_expr()?;
      let span = lhs.span.join(rhs.span);
      lhs = Expr {
        kind: ExprKind::Logical {
          op: LogicalOp::Or,
          lhs: Box::new(lhs),
          rhs: Box::new(rhs),
        },
        span,
      };
    }
    Ok(lhs)
  }

  fn and_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.equality()?;
    while matches!(self.peek(), TokenKind::And) {
      self.advance();
      let rhs = self.equality()?;
      let span = lhs.span.join(rhs.span);
      lhs = Expr {
        kind: ExprKind::Logical {
          op: LogicalOp::And,
          lhs: Box::new(lhs),
          rhs: Box::new(rhs),
        },
        span,
      };
    }
    Ok(lhs)
  }

  fn equality(&mut self) -> PResult<Expr> {
    let mut lhs = self.comparison()?;
    loop {
      let op = match self.peek() {
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::BangEq => BinaryOp::Ne,
        _ => break,
      };
      self.advance();
      let rhs = self.comparison()?;
      let span = lhs.span.join(rhs.span);
      lhs = binary(op, lhs, rhs, span);
    }
    Ok(lhs)
  }

  fn comparison(&mut self) -> PResult<Expr> {
    let mut lhs = self.term()?;
    loop {
      let op = match self.peek() {
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::Ge,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::Le,
        _ => break,
      };
      self.advance();
      let rhs = self.term()?;
      let span = lhs.span.join(rhs.span);
      lhs = binary(op, lhs, rhs, span);
    }
    Ok(lhs)
  }

  fn term(&mut self) -> PResult<Expr> {
    let mut lhs = self.factor()?;
    loop {
      let op = match self.peek() {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        _ => break,
      };
      self.advance();
      let rhs = self.factor()?;
      let span = lhs.span.join(rhs.span);
      lhs = binary(op, lhs, rhs, span);
    }
    Ok(lhs)
  }

  fn factor(&mut self) -> PResult<Expr> {
    let mut lhs = self.unary()?;
    loop {
      let op = match self.peek() {
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        _ => break,
      };
      self.advance();
      let rhs = self.unary()?;
      let span = lhs.span.join(rhs.span);
      lhs = binary(op, lhs, rhs, span);
    }
    Ok(lhs)
  }

  fn unary(&mut self) -> PResult<Expr> {
    match self.peek() {
      TokenKind::Bang | TokenKind::Not => {
        let start = self.advance().span;
        let rhs = self.unary()?;
        let span = start.join(rhs.span);
        Ok(Expr {
          kind: ExprKind::Unary {
            op: UnaryOp::Not,
            rhs: Box::new(rhs),
          },
          span,
        })
      }
      TokenKind::Minus => {
        let start = self.advance().span;
        let rhs = self.unary()?;
        let span = start.join(rhs.span);
        Ok(Expr {
          kind: ExprKind::Unary {
            op: UnaryOp::Neg,
            rhs: Box::new(rhs),
          },
          span,
        })
      }
      _ => self.call_or_index(),
    }
  }

  fn call_or_index(&mut self) -> PResult<Expr> {
    let mut expr = self.primary()?;
    loop {
      match self.peek() {
        TokenKind::LParen => {
          self.advance();
          let args = self.call_args()?;
          let end = self.expect(TokenKind::RParen, "`)`")?.span;
          let span = expr.span.join(end);
          expr = Expr {
            kind: ExprKind::Call {
              callee: Box::new(expr),
              args,
            },
            span,
          };
        }
        TokenKind::LBracket => {
          self.advance();
          let index = self.expression()?;
          let end = self.expect(TokenKind::RBracket, "`]`")?.span;
          let span = expr.span.join(end);
          expr = Expr {
            kind: ExprKind::Index {
              target: Box::new(expr),
              index: Box::new(index),
            },
            span,
          };
        }
        TokenKind::Dot => {
          self.advance();
          let (name, name_span) = self.expect_ident()?;
          let span = expr.span.join(name_span);
          expr = Expr {
            kind: ExprKind::Attr {
              target: Box::new(expr),
              name,
            },
            span,
          };
        }
        _ => break,
      }
    }
    Ok(expr)
  }

  fn call_args(&mut self) -> PResult<CallArgs> {
    let mut args = CallArgs::default();
    let mut seen_keyword = false;
    if matches!(self.peek(), TokenKind::RParen) {
      return Ok(args);
    }
    loop {
      let is_keyword = matches!(self.peek(), TokenKind::Ident(_))
        && matches!(self.tokens[self.pos + 1].kind, TokenKind::Eq);
      if is_keyword {
        let (name, _) = self.expect_ident()?;
        self.advance(); // =
        let value = self.expression()?;
        args.keyword.push((name, value));
        seen_keyword = true;
      } else {
        if seen_keyword {
          return Err(self.error("positional argument cannot follow a keyword argument"));
        }
        args.positional.push(self.expression()?);
      }
      if matches!(self.peek(), TokenKind::Comma) {
        self.advance();
        self.skip_blank_lines();
      } else {
        break;
      }
    }
    Ok(args)
  }

  fn primary(&mut self) -> PResult<Expr> {
    let t = self.peek_token().clone();
    match t.kind {
      TokenKind::Number(n) => {
        self.advance();
        Ok(Expr {
          kind: ExprKind::Number(n),
          span: t.span,
        })
      }
      TokenKind::String(s) => {
        self.advance();
        Ok(Expr {
          kind: ExprKind::String(s),
          span: t.span,
        })
      }
      TokenKind::True => {
        self.advance();
        Ok(Expr {
          kind: ExprKind::Bool(true),
          span: t.span,
        })
      }
      TokenKind::False => {
        self.advance();
        Ok(Expr {
          kind: ExprKind::Bool(false),
          span: t.span,
        })
      }
      TokenKind::Ident(name) => {
        self.advance();
        Ok(Expr {
          kind: ExprKind::Ident(name),
          span: t.span,
        })
      }
      TokenKind::LParen => {
        self.advance();
        let expr = self.expression()?;
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(expr)
      }
      TokenKind::LBracket => self.list_literal(t.span),
      TokenKind::LBrace => self.map_literal(t.span),
      _ => Err(self.error(format!("unexpected token {:?}", t.kind))),
    }
  }

  fn list_literal(&mut self, start: Span) -> PResult<Expr> {
    self.advance(); // [
    self.skip_blank_lines();
    let mut items = Vec::new();
    if !matches!(self.peek(), TokenKind::RBracket) {
      loop {
        items.push(self.expression()?);
        self.skip_blank_lines();
        if matches!(self.peek(), TokenKind::Comma) {
          self.advance();
          self.skip_blank_lines();
        } else {
          break;
        }
      }
    }
    let end = self.expect(TokenKind::RBracket, "`]`")?.span;
    Ok(Expr {
      kind: ExprKind::List(items),
      span: start.join(end),
    })
  }

  fn map_literal(&mut self, start: Span) -> PResult<Expr> {
    self.advance(); // {
    self.skip_blank_lines();
    let mut items = Vec::new();
    if !matches!(self.peek(), TokenKind::RBrace) {
      loop {
        let key = self.expression()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let value = self.expression()?;
        items.push((key, value));
        self.skip_blank_lines();
        if matches!(self.peek(), TokenKind::Comma) {
          self.advance();
          self.skip_blank_lines();
        } else {
          break;
        }
      }
    }
    let end = self.expect(TokenKind::RBrace, "`}`")?.span;
    Ok(Expr {
      kind: ExprKind::Map(items),
      span: start.join(end),
    })
  }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
  Expr {
    kind: ExprKind::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    },
    span,
  }
}

fn one(span: Span) -> Expr {
  Expr {
    kind: ExprKind::Number(1.0),
    span,
  }
}

fn desugar_binary(target: Expr, op: BinaryOp, rhs: Expr) -> Expr {
  let span = target.span.join(rhs.span);
  binary(op, target, rhs, span)
}

fn parse_meta_json(content: &str, span: Span, line: usize) -> PResult<serde_json::Value> {
  serde_json::from_str(content).map_err(|e| ParseError {
    line,
    column: 1,
    span,
    message: format!("`@meta` block is not valid JSON: {e}"),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexer::lex;
  use indoc::indoc;

  fn parse_ok(src: &str) -> Program {
    let tokens = lex(src).expect("lex");
    parse(tokens).expect("parse")
  }

  #[test]
  fn arithmetic_and_assignment() {
    let program = parse_ok("let a = 2\nlet b = 3\nset a = a + b\n");
    assert_eq!(program.body.len(), 3);
    assert!(matches!(program.body[2].kind, StmtKind::Assign { .. }));
  }

  #[test]
  fn increment_desugars_to_binary_add_one() {
    let program = parse_ok("let x = 0\nset x ++\n");
    match &program.body[1].kind {
      StmtKind::Assign { value, .. } => match &value.kind {
        ExprKind::Binary { op, rhs, .. } => {
          assert_eq!(*op, BinaryOp::Add);
          assert!(matches!(rhs.kind, ExprKind::Number(n) if n == 1.0));
        }
        other => panic!("expected binary add, got {other:?}"),
      },
      other => panic!("expected assign, got {other:?}"),
    }
  }

  #[test]
  fn function_with_default_and_kwargs() {
    let program = parse_ok(indoc! {r#"
            func greet(name, prefix="Hi", **rest):
                return prefix
        "#});
    match &program.body[0].kind {
      StmtKind::Func(f) => {
        assert_eq!(f.name, "greet");
        assert_eq!(f.params.pos.len(), 2);
        assert_eq!(f.params.kwargs.as_deref(), Some("rest"));
      }
      other => panic!("expected func decl, got {other:?}"),
    }
  }

  #[test]
  fn if_elif_else() {
    let program = parse_ok(indoc! {"
            if a:
                let x = 1
            elif b:
                let x = 2
            else:
                let x = 3
        "});
    match &program.body[0].kind {
      StmtKind::If(i) => {
        assert_eq!(i.elifs.len(), 1);
        assert!(i.else_body.is_some());
      }
      other => panic!("expected if, got {other:?}"),
    }
  }

  #[test]
  fn positional_after_keyword_is_an_error() {
    let tokens = lex("greet(name=\"Al\", 1)\n").unwrap();
    assert!(parse(tokens).is_err());
  }

  #[test]
  fn empty_block_is_an_error() {
    let tokens = lex("if a:\nlet x = 1\n").unwrap();
    assert!(parse(tokens).is_err());
  }

  #[test]
  fn meta_block_parses_as_json() {
    let tokens = lex("@meta {\n  \"tick\": \"on_tick\"\n}\nlet a = 1\n").unwrap();
    let program = parse(tokens).unwrap();
    assert_eq!(program.meta.len(), 1);
    assert_eq!(program.meta[0].json["tick"], "on_tick");
  }

  #[test]
  fn list_and_map_literals_with_newlines() {
    let program = parse_ok("let a = [\n  1,\n  2,\n]\nlet b = {\n  \"k\": 1,\n}\n");
    assert!(matches!(
      &program.body[0].kind,
      StmtKind::Let { value, .. } if matches!(value.kind, ExprKind::List(_))
    ));
    assert!(matches!(
      &program.body[1].kind,
      StmtKind::Let { value, .. } if matches!(value.kind, ExprKind::Map(_))
    ));
  }
}
