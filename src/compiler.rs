//! AST → bytecode compiler: local-slot allocation, branch lowering,
//! peephole optimization, and syntactic assignment-pattern recognition.
//! See `spec` §4.3.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::*;
use crate::error::CompileError;
use crate::object::FunctionObject;
use crate::opcode::{Chunk, OpCode, Operand};
use crate::span::Span;
use crate::value::Value;

pub struct CompiledProgram {
  pub top_level: Chunk,
  pub functions: HashMap<String, Rc<FunctionObject>>,
}

pub fn compile(
  program: &Program,
  src: &str,
) -> std::result::Result<CompiledProgram, Vec<CompileError>> {
  let mut c = Compiler {
    src,
    functions: HashMap::new(),
    errors: Vec::new(),
  };

  hoist_functions(&mut c, &program.body);

  let mut top = FuncCtx::new_top_level();
  for stmt in &program.body {
    top.statement(&mut c, stmt);
  }
  top.chunk.emit(OpCode::PushConst, Operand::Int(top.chunk.add_constant(Value::Null)), 0);
  top.chunk.emit(OpCode::Return, Operand::None, 0);
  peephole(&mut top.chunk);

  for meta in &program.meta {
    if let serde_json::Value::Object(map) = &meta.json {
      for (k, v) in map {
        top.chunk.metadata.insert(k.clone(), json_to_value(v));
      }
    } else {
      c.errors.push(CompileError {
        line: 0,
        column: 0,
        span: meta.span,
        message: "`@meta` block must be a JSON object".to_string(),
      });
    }
  }

  if c.errors.is_empty() {
    Ok(CompiledProgram {
      top_level: top.chunk,
      functions: c.functions,
    })
  } else {
    Err(c.errors)
  }
}

fn json_to_value(v: &serde_json::Value) -> Value {
  match v {
    serde_json::Value::Null => Value::Null,
    serde_json::Value::Bool(b) => Value::Bool(*b),
    serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
    serde_json::Value::String(s) => Value::string(s),
    serde_json::Value::Array(a) => Value::list(a.iter().map(json_to_value).collect()),
    serde_json::Value::Object(_) => Value::string(v.to_string()),
  }
}

struct Compiler<'a> {
  src: &'a str,
  functions: HashMap<String, Rc<FunctionObject>>,
  errors: Vec<CompileError>,
}

fn line_of(c: &Compiler<'_>, span: Span) -> usize {
  crate::span::line_col(c.src, span.start).0
}

/// Recursively discover every `func` declaration, wherever it's nested,
/// and compile it into the flat function table. Function declarations
/// contribute nothing to the enclosing scope's bytecode.
fn hoist_functions(c: &mut Compiler<'_>, stmts: &[Stmt]) {
  for stmt in stmts {
    match &stmt.kind {
      StmtKind::Func(decl) => {
        hoist_functions(c, &decl.body);
        compile_function(c, decl);
      }
      StmtKind::If(i) => {
        hoist_functions(c, &i.then_body);
        for (_, body) in &i.elifs {
          hoist_functions(c, body);
        }
        if let Some(body) = &i.else_body {
          hoist_functions(c, body);
        }
      }
      StmtKind::While { body, .. } => hoist_functions(c, body),
      StmtKind::ForIn { body, .. } => hoist_functions(c, body),
      _ => {}
    }
  }
}

fn compile_function(c: &mut Compiler<'_>, decl: &FuncDecl) {
  let mut local_names: Vec<String> = decl.params.pos.iter().map(|(n, _)| n.clone()).collect();
  let arity = local_names.len();
  if let Some(kwargs) = &decl.params.kwargs {
    local_names.push(kwargs.clone());
  }
  scan_locals(&decl.body, &mut local_names);

  let mut defaults = HashMap::new();
  for (name, default) in &decl.params.pos {
    if let Some(expr) = default {
      defaults.insert(name.clone(), eval_literal(expr).unwrap_or(Value::Null));
    }
  }

  let mut func = FuncCtx {
    chunk: Chunk::new(),
    local_names,
    depth: 1,
    loop_stack: Vec::new(),
  };
  for stmt in &decl.body {
    func.statement(c, stmt);
  }
  let null_idx = func.chunk.add_constant(Value::Null);
  func.chunk.emit(OpCode::PushConst, Operand::Int(null_idx), 0);
  func.chunk.emit(OpCode::Return, Operand::None, 0);
  peephole(&mut func.chunk);

  let obj = FunctionObject {
    name: decl.name.clone(),
    arity,
    locals_count: func.local_names.len(),
    local_names: func.local_names,
    defaults,
    kwargs_param: decl.params.kwargs.clone(),
    chunk: func.chunk,
  };
  c.functions.insert(decl.name.clone(), Rc::new(obj));
}

/// Gather every name a function scope introduces: `let` bindings and
/// `for`-loop items, walking into nested blocks but not into nested
/// function bodies (those get their own scan). `spec` §4.3 step 1.
fn scan_locals(stmts: &[Stmt], names: &mut Vec<String>) {
  for stmt in stmts {
    match &stmt.kind {
      StmtKind::Let { name, .. } => {
        if !names.contains(name) {
          names.push(name.clone());
        }
      }
      StmtKind::ForIn { var, body, .. } => {
        if !names.contains(var) {
          names.push(var.clone());
        }
        scan_locals(body, names);
      }
      StmtKind::If(i) => {
        scan_locals(&i.then_body, names);
        for (_, body) in &i.elifs {
          scan_locals(body, names);
        }
        if let Some(body) = &i.else_body {
          scan_locals(body, names);
        }
      }
      StmtKind::While { body, .. } => scan_locals(body, names),
      StmtKind::Func(_) => {}
      _ => {}
    }
  }
}

/// A literal constant value for a parameter default, or `None` if the
/// default expression isn't literal (`spec` §4.2: such defaults lower to
/// `null`).
fn eval_literal(expr: &Expr) -> Option<Value> {
  match &expr.kind {
    ExprKind::Bool(b) => Some(Value::Bool(*b)),
    ExprKind::Number(n) => Some(Value::Number(*n)),
    ExprKind::String(s) => Some(Value::string(s)),
    ExprKind::Unary {
      op: UnaryOp::Neg,
      rhs,
    } => match &rhs.kind {
      ExprKind::Number(n) => Some(Value::Number(-*n)),
      _ => None,
    },
    _ => None,
  }
}

struct LoopCtx {
  start: usize,
  break_jumps: Vec<usize>,
}

struct FuncCtx {
  chunk: Chunk,
  local_names: Vec<String>,
  depth: usize,
  loop_stack: Vec<LoopCtx>,
}

impl FuncCtx {
  fn new_top_level() -> Self {
    Self {
      chunk: Chunk::new(),
      local_names: Vec::new(),
      depth: 0,
      loop_stack: Vec::new(),
    }
  }

  fn local_slot(&self, name: &str) -> Option<usize> {
    if self.depth == 0 {
      return None;
    }
    self.local_names.iter().position(|n| n == name)
  }

  fn statement(&mut self, c: &mut Compiler<'_>, stmt: &Stmt) {
    let line = line_of(c, stmt.span);
    match &stmt.kind {
      StmtKind::Func(_) => {} // hoisted already; no runtime effect here
      StmtKind::Let { name, value } => {
        self.expr(c, value);
        if let Some(slot) = self.local_slot(name) {
          self.chunk.emit(OpCode::SetLocal, Operand::Int(slot), line);
          self.chunk.emit(OpCode::Pop, Operand::None, line);
        } else {
          let idx = self.chunk.add_constant(Value::string(name));
          self.chunk.emit(OpCode::DefineGlobal, Operand::Int(idx), line);
        }
      }
      StmtKind::Assign { target, value } => self.assign(c, target, value, line),
      StmtKind::If(i) => self.if_stmt(c, i, line),
      StmtKind::While { cond, body } => self.while_stmt(c, cond, body, line),
      StmtKind::ForIn { var, iter, body } => self.for_stmt(c, var, iter, body, line),
      StmtKind::Return(value) => {
        match value {
          Some(expr) => {
            self.expr(c, expr);
            self.chunk.emit(OpCode::Return, Operand::None, line);
          }
          None => {
            self.chunk.emit(OpCode::ReturnNone, Operand::None, line);
          }
        }
      }
      StmtKind::Break => {
        if let Some(l) = self.loop_stack.last() {
          let _ = l;
          let at = self.chunk.emit(OpCode::Jump, Operand::Int(0), line);
          self.loop_stack.last_mut().unwrap().break_jumps.push(at);
        } else {
          c.errors.push(CompileError {
            line: 0,
            column: 0,
            span: stmt.span,
            message: "`break` outside of a loop".to_string(),
          });
        }
      }
      StmtKind::Continue => {
        if let Some(l) = self.loop_stack.last() {
          self.chunk.emit(OpCode::Loop, Operand::Int(l.start), line);
        } else {
          c.errors.push(CompileError {
            line: 0,
            column: 0,
            span: stmt.span,
            message: "`continue` outside of a loop".to_string(),
          });
        }
      }
      StmtKind::Yield => {
        self.chunk.emit(OpCode::Yield, Operand::None, line);
      }
      StmtKind::Expr(expr) => {
        self.expr(c, expr);
        self.chunk.emit(OpCode::Pop, Operand::None, line);
      }
    }
  }

  fn assign(&mut self, c: &mut Compiler<'_>, target: &Expr, value: &Expr, line: usize) {
    match &target.kind {
      ExprKind::Ident(name) => {
        if let Some(slot) = self.local_slot(name) {
          self.expr(c, value);
          self.chunk.emit(OpCode::SetLocal, Operand::Int(slot), line);
          self.chunk.emit(OpCode::Pop, Operand::None, line);
          return;
        }
        if self.depth == 0 {
          if let Some(()) = self.try_global_fusion(c, name, value, line) {
            return;
          }
        }
        self.expr(c, value);
        let idx = self.chunk.add_constant(Value::string(name));
        self.chunk.emit(OpCode::SetGlobal, Operand::Int(idx), line);
        self.chunk.emit(OpCode::Pop, Operand::None, line);
      }
      ExprKind::Attr { target: obj, name } => {
        self.expr(c, obj);
        self.expr(c, value);
        let idx = self.chunk.add_constant(Value::string(name));
        self.chunk.emit(OpCode::SetAttrPop, Operand::Int(idx), line);
      }
      ExprKind::Index { target: obj, index } => {
        self.expr(c, index);
        self.expr(c, obj);
        self.expr(c, value);
        self.chunk.emit(OpCode::IndexSet, Operand::None, line);
        self.chunk.emit(OpCode::Pop, Operand::None, line);
      }
      _ => {
        c.errors.push(CompileError {
          line: 0,
          column: 0,
          span: target.span,
          message: "invalid assignment target".to_string(),
        });
      }
    }
  }

  /// Recognize `set x = x + 1` (or `1 + x`) as `INC_GLOBAL x`, and
  /// `set x = x + e` (or `e + x`) as `compile(e); ADD_GLOBAL x`. `spec`
  /// §4.3, "Assignment pattern recognition".
  fn try_global_fusion(
    &mut self,
    c: &mut Compiler<'_>,
    name: &str,
    value: &Expr,
    line: usize,
  ) -> Option<()> {
    let ExprKind::Binary {
      op: BinaryOp::Add,
      lhs,
      rhs,
    } = &value.kind
    else {
      return None;
    };
    let lhs_is_x = matches!(&lhs.kind, ExprKind::Ident(n) if n == name);
    let rhs_is_x = matches!(&rhs.kind, ExprKind::Ident(n) if n == name);
    if !lhs_is_x && !rhs_is_x {
      return None;
    }
    let other = if lhs_is_x { rhs.as_ref() } else { lhs.as_ref() };
    let idx = self.chunk.add_constant(Value::string(name));
    if matches!(&other.kind, ExprKind::Number(n) if *n == 1.0) {
      self.chunk.emit(OpCode::IncGlobal, Operand::Int(idx), line);
    } else {
      self.expr(c, other);
      self.chunk.emit(OpCode::AddGlobal, Operand::Int(idx), line);
    }
    Some(())
  }

  fn if_stmt(&mut self, c: &mut Compiler<'_>, i: &If, line: usize) {
    let mut end_jumps = Vec::new();

    self.expr(c, &i.cond);
    let mut next_jump = self.chunk.emit(OpCode::JumpIfFalse, Operand::Int(0), line);
    self.chunk.emit(OpCode::Pop, Operand::None, line);
    for s in &i.then_body {
      self.statement(c, s);
    }
    end_jumps.push(self.chunk.emit(OpCode::Jump, Operand::Int(0), line));
    let after_then = self.chunk.code.len();
    self.chunk.patch_jump(next_jump, after_then);

    for (cond, body) in &i.elifs {
      self.chunk.emit(OpCode::Pop, Operand::None, line);
      self.expr(c, cond);
      next_jump = self.chunk.emit(OpCode::JumpIfFalse, Operand::Int(0), line);
      self.chunk.emit(OpCode::Pop, Operand::None, line);
      for s in body {
        self.statement(c, s);
      }
      end_jumps.push(self.chunk.emit(OpCode::Jump, Operand::Int(0), line));
      let after = self.chunk.code.len();
      self.chunk.patch_jump(next_jump, after);
    }

    self.chunk.emit(OpCode::Pop, Operand::None, line);
    if let Some(else_body) = &i.else_body {
      for s in else_body {
        self.statement(c, s);
      }
    }

    let end = self.chunk.code.len();
    for j in end_jumps {
      self.chunk.patch_jump(j, end);
    }
  }

  fn while_stmt(&mut self, c: &mut Compiler<'_>, cond: &Expr, body: &[Stmt], line: usize) {
    let start = self.chunk.code.len();
    self.expr(c, cond);
    let exit = self.chunk.emit(OpCode::JumpIfFalse, Operand::Int(0), line);
    self.chunk.emit(OpCode::Pop, Operand::None, line);

    self.loop_stack.push(LoopCtx {
      start,
      break_jumps: Vec::new(),
    });
    for s in body {
      self.statement(c, s);
    }
    self.chunk.emit(OpCode::Loop, Operand::Int(start), line);
    let loop_ctx = self.loop_stack.pop().unwrap();

    let end = self.chunk.code.len();
    self.chunk.patch_jump(exit, end);
    for j in loop_ctx.break_jumps {
      self.chunk.patch_jump(j, end);
    }
    self.chunk.emit(OpCode::Pop, Operand::None, line);
  }

  fn for_stmt(&mut self, c: &mut Compiler<'_>, var: &str, iter: &Expr, body: &[Stmt], line: usize) {
    self.expr(c, iter);
    self.chunk.emit(OpCode::GetIter, Operand::None, line);
    let start = self.chunk.code.len();
    let exit = self.chunk.emit(OpCode::ForIter, Operand::Int(0), line);

    if let Some(slot) = self.local_slot(var) {
      self.chunk.emit(OpCode::SetLocal, Operand::Int(slot), line);
      self.chunk.emit(OpCode::Pop, Operand::None, line);
    } else {
      let idx = self.chunk.add_constant(Value::string(var));
      self.chunk.emit(OpCode::SetGlobal, Operand::Int(idx), line);
      self.chunk.emit(OpCode::Pop, Operand::None, line);
    }

    self.loop_stack.push(LoopCtx {
      start,
      break_jumps: Vec::new(),
    });
    for s in body {
      self.statement(c, s);
    }
    self.chunk.emit(OpCode::Loop, Operand::Int(start), line);
    let loop_ctx = self.loop_stack.pop().unwrap();

    let end = self.chunk.code.len();
    self.chunk.patch_jump(exit, end);
    for j in loop_ctx.break_jumps {
      self.chunk.patch_jump(j, end);
    }
  }

  fn expr(&mut self, c: &mut Compiler<'_>, expr: &Expr) {
    let line = line_of(c, expr.span);
    match &expr.kind {
      ExprKind::Bool(true) => {
        self.chunk.emit(OpCode::PushTrue, Operand::None, line);
      }
      ExprKind::Bool(false) => {
        self.chunk.emit(OpCode::PushFalse, Operand::None, line);
      }
      ExprKind::Number(n) => {
        let idx = self.chunk.add_constant(Value::Number(*n));
        self.chunk.emit(OpCode::PushConst, Operand::Int(idx), line);
      }
      ExprKind::String(s) => {
        let idx = self.chunk.add_constant(Value::string(s));
        self.chunk.emit(OpCode::PushConst, Operand::Int(idx), line);
      }
      ExprKind::Ident(name) => {
        if let Some(slot) = self.local_slot(name) {
          self.chunk.emit(OpCode::GetLocal, Operand::Int(slot), line);
        } else {
          let idx = self.chunk.add_constant(Value::string(name));
          self.chunk.emit(OpCode::GetGlobal, Operand::Int(idx), line);
        }
      }
      ExprKind::List(items) => {
        for item in items {
          self.expr(c, item);
        }
        self.chunk.emit(OpCode::BuildList, Operand::Int(items.len()), line);
      }
      ExprKind::Map(entries) => {
        for (k, v) in entries {
          self.expr(c, k);
          self.expr(c, v);
        }
        self.chunk.emit(OpCode::BuildMap, Operand::Int(entries.len()), line);
      }
      ExprKind::Unary { op, rhs } => {
        self.expr(c, rhs);
        match op {
          UnaryOp::Neg => {
            self.chunk.emit(OpCode::Negate, Operand::None, line);
          }
          UnaryOp::Not => {
            self.chunk.emit(OpCode::Not, Operand::None, line);
          }
        }
      }
      ExprKind::Binary { op, lhs, rhs } => {
        self.expr(c, lhs);
        self.expr(c, rhs);
        let op = match op {
          BinaryOp::Add => OpCode::Add,
          BinaryOp::Sub => OpCode::Sub,
          BinaryOp::Mul => OpCode::Mul,
          BinaryOp::Div => OpCode::Div,
          BinaryOp::Eq => OpCode::Equal,
          BinaryOp::Ne => OpCode::NotEqual,
          BinaryOp::Gt => OpCode::Greater,
          BinaryOp::Ge => OpCode::GreaterEqual,
          BinaryOp::Lt => OpCode::Less,
          BinaryOp::Le => OpCode::LessEqual,
        };
        self.chunk.emit(op, Operand::None, line);
      }
      ExprKind::Logical { op, lhs, rhs } => {
        self.expr(c, lhs);
        match op {
          LogicalOp::And => {
            let end = self.chunk.emit(OpCode::JumpIfFalse, Operand::Int(0), line);
            self.chunk.emit(OpCode::Pop, Operand::None, line);
            self.expr(c, rhs);
            let target = self.chunk.code.len();
            self.chunk.patch_jump(end, target);
          }
          LogicalOp::Or => {
            let end = self.chunk.emit(OpCode::JumpIfTrue, Operand::Int(0), line);
            self.chunk.emit(OpCode::Pop, Operand::None, line);
            self.expr(c, rhs);
            let target = self.chunk.code.len();
            self.chunk.patch_jump(end, target);
          }
        }
      }
      ExprKind::Call { callee, args } => {
        self.expr(c, callee);
        for p in &args.positional {
          self.expr(c, p);
        }
        if args.keyword.is_empty() {
          self
            .chunk
            .emit(OpCode::Call, Operand::Int(args.positional.len()), line);
        } else {
          let names: Vec<String> = args.keyword.iter().map(|(n, _)| n.clone()).collect();
          for (_, v) in &args.keyword {
            self.expr(c, v);
          }
          self.chunk.emit(
            OpCode::CallKw,
            Operand::CallKw(args.positional.len(), names),
            line,
          );
        }
      }
      ExprKind::Index { target, index } => {
        self.expr(c, target);
        self.expr(c, index);
        self.chunk.emit(OpCode::IndexGet, Operand::None, line);
      }
      ExprKind::Attr { target, name } => {
        self.expr(c, target);
        let idx = self.chunk.add_constant(Value::string(name));
        self.chunk.emit(OpCode::GetAttr, Operand::Int(idx), line);
      }
    }
  }
}

/// One forward pass that rewrites adjacent-instruction patterns and
/// records an old→new index compaction map, then a second pass that
/// rewrites every jump operand through that map. `spec` §4.3.
fn peephole(chunk: &mut Chunk) {
  let mut new_code = Vec::with_capacity(chunk.code.len());
  let mut new_lines = Vec::with_capacity(chunk.lines.len());
  let mut map = vec![0usize; chunk.code.len() + 1];

  let mut i = 0;
  while i < chunk.code.len() {
    map[i] = new_code.len();
    let (op, operand) = chunk.code[i].clone();
    let line = chunk.lines[i];
    let next = chunk.code.get(i + 1).map(|(op, _)| *op);

    let fused = match (op, next) {
      (OpCode::SetLocal, Some(OpCode::Pop)) => Some(OpCode::SetLocalPop),
      (OpCode::SetGlobal, Some(OpCode::Pop)) => Some(OpCode::SetGlobalPop),
      (OpCode::JumpIfFalse, Some(OpCode::Pop)) => Some(OpCode::JumpIfFalsePop),
      (OpCode::JumpIfTrue, Some(OpCode::Pop)) => Some(OpCode::JumpIfTruePop),
      _ => None,
    };
    if let Some(fused_op) = fused {
      new_code.push((fused_op, operand));
      new_lines.push(line);
      map[i + 1] = new_code.len() - 1;
      i += 2;
      continue;
    }

    if op == OpCode::PushConst && next == Some(OpCode::Return) {
      if let Operand::Int(const_idx) = &operand {
        if matches!(chunk.constants.get(*const_idx), Some(Value::Null)) {
          new_code.push((OpCode::ReturnNone, Operand::None));
          new_lines.push(line);
          map[i + 1] = new_code.len() - 1;
          i += 2;
          continue;
        }
      }
    }

    new_code.push((op, operand));
    new_lines.push(line);
    i += 1;
  }
  map[chunk.code.len()] = new_code.len();

  for (op, operand) in new_code.iter_mut() {
    if is_jump(*op) {
      if let Operand::Int(target) = operand {
        *target = map[(*target).min(map.len() - 1)];
      }
    }
  }

  // Jump-to-jump chaining: if a branch targets an unconditional JUMP,
  // retarget it to that jump's own target.
  loop {
    let mut changed = false;
    for idx in 0..new_code.len() {
      let (op, operand) = new_code[idx].clone();
      if !is_jump(op) {
        continue;
      }
      if let Operand::Int(target) = operand {
        if let Some((OpCode::Jump, Operand::Int(chained))) = new_code.get(target) {
          let chained = *chained;
          if chained != target {
            new_code[idx].1 = Operand::Int(chained);
            changed = true;
          }
        }
      }
    }
    if !changed {
      break;
    }
  }

  // If a conditional-pop jump targets a plain POP, skip past it: the
  // branch already consumed its own test value on the taken path's
  // fallthrough, so jumping past the joining POP is equivalent.
  for (op, operand) in new_code.iter_mut() {
    if matches!(op, OpCode::JumpIfFalsePop | OpCode::JumpIfTruePop) {
      if let Operand::Int(target) = operand {
        if matches!(new_code_get(&new_code, *target), Some(OpCode::Pop)) {
          *target += 1;
        }
      }
    }
  }

  chunk.code = new_code;
  chunk.lines = new_lines;
}

fn new_code_get(code: &[(OpCode, Operand)], idx: usize) -> Option<OpCode> {
  code.get(idx).map(|(op, _)| *op)
}

fn is_jump(op: OpCode) -> bool {
  matches!(
    op,
    OpCode::Jump
      | OpCode::Loop
      | OpCode::JumpIfFalse
      | OpCode::JumpIfTrue
      | OpCode::JumpIfFalsePop
      | OpCode::JumpIfTruePop
      | OpCode::ForIter
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexer::lex;
  use crate::parser::parse;
  use indoc::indoc;

  fn compile_src(src: &str) -> CompiledProgram {
    let tokens = lex(src).unwrap();
    let program = parse(tokens).unwrap();
    compile(&program, src).unwrap()
  }

  #[test]
  fn increment_fusion_emits_exactly_one_inc_global() {
    let compiled = compile_src("let x = 0\nset x = x + 1\n");
    let count = compiled
      .top_level
      .code
      .iter()
      .filter(|(op, _)| *op == OpCode::IncGlobal)
      .count();
    assert_eq!(count, 1);
    assert!(compiled
      .top_level
      .code
      .iter()
      .all(|(op, _)| *op != OpCode::Add));
  }

  #[test]
  fn top_level_ends_with_return_none() {
    let compiled = compile_src("let x = 0\n");
    assert_eq!(compiled.top_level.code.last().unwrap().0, OpCode::ReturnNone);
  }

  #[test]
  fn function_with_defaults() {
    let compiled = compile_src(indoc! {r#"
            func greet(name, prefix="Hi"):
                return prefix
        "#});
    let f = &compiled.functions["greet"];
    assert_eq!(f.arity, 2);
    assert_eq!(f.defaults.get("prefix"), Some(&Value::string("Hi")));
  }

  #[test]
  fn break_outside_loop_is_a_compile_error() {
    let tokens = lex("break\n").unwrap();
    let program = parse(tokens).unwrap();
    assert!(compile(&program, "break\n").is_err());
  }

  #[test]
  fn jump_targets_are_all_valid() {
    let compiled = compile_src(indoc! {"
            let s = 0
            for i in [1, 2, 3]:
                set s = s + i
        "});
    let len = compiled.top_level.code.len();
    for (op, operand) in &compiled.top_level.code {
      if is_jump(*op) {
        if let Operand::Int(target) = operand {
          assert!(*target <= len);
        }
      }
    }
  }

  #[test]
  fn constant_pool_has_no_duplicates() {
    let compiled = compile_src("let a = \"x\"\nlet b = \"x\"\nlet c = 1\nlet d = 1\n");
    let strings: Vec<_> = compiled
      .top_level
      .constants
      .iter()
      .filter(|v| matches!(v, Value::String(_)))
      .collect();
    assert_eq!(strings.len(), 1);
  }
}
