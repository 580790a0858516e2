//! The stack-based virtual machine: frames, locals addressing, the call
//! protocol, iterators, and cooperative yield/resume. See `spec` §4.4,
//! §4.5, §5.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::compiler::CompiledProgram;
use crate::error::{Result, RuntimeError, RuntimeErrorKind};
use crate::object::{FunctionObject, IteratorHandle};
use crate::opcode::{Chunk, OpCode, Operand};
use crate::value::{MapKey, Value};

/// A live invocation of `function` (or the top-level chunk, when `None`).
struct CallFrame {
  function: Option<Rc<FunctionObject>>,
  ip: usize,
  stack_start: usize,
}

pub struct Vm {
  value_stack: Vec<Value>,
  frame_stack: Vec<CallFrame>,
  globals: HashMap<String, Value>,
  functions: HashMap<String, Rc<FunctionObject>>,
  top_level: Rc<Chunk>,
  instruction_count: u64,
  instruction_limit: u64,
  is_yielded: bool,
  current_line: usize,
}

enum StepOutcome {
  Continue,
  Yielded,
  Finished(Value),
}

impl Vm {
  pub fn new(compiled: CompiledProgram, instruction_limit: u64) -> Self {
    let mut globals = HashMap::new();
    for (name, func) in &compiled.functions {
      globals.insert(name.clone(), Value::Function(func.clone()));
    }
    Self {
      value_stack: Vec::new(),
      frame_stack: Vec::new(),
      globals,
      functions: compiled.functions,
      top_level: Rc::new(compiled.top_level),
      instruction_count: 0,
      instruction_limit,
      is_yielded: false,
      current_line: 0,
    }
  }

  pub fn globals(&self) -> &HashMap<String, Value> {
    &self.globals
  }

  pub fn globals_mut(&mut self) -> &mut HashMap<String, Value> {
    &mut self.globals
  }

  pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
    self.globals.insert(name.into(), value);
  }

  pub fn is_yielded(&self) -> bool {
    self.is_yielded
  }

  pub fn function(&self, name: &str) -> Option<Rc<FunctionObject>> {
    self.functions.get(name).cloned()
  }

  /// Reconstructs the compiled program this VM was built from, for
  /// writing back to a [`crate::cache::BytecodeCache`] after a cache miss.
  pub fn compiled_snapshot(&self) -> CompiledProgram {
    CompiledProgram {
      top_level: (*self.top_level).clone(),
      functions: self.functions.clone(),
    }
  }

  /// Start (or restart) execution at the top-level chunk.
  pub fn run(&mut self) -> Result<Value> {
    self.value_stack.clear();
    self.frame_stack.clear();
    self.frame_stack.push(CallFrame {
      function: None,
      ip: 0,
      stack_start: 0,
    });
    self.instruction_count = 0;
    self.execute()
  }

  /// Resume a previously yielded or budget-exhausted execution.
  pub fn resume(&mut self) -> Result<Value> {
    self.is_yielded = false;
    self.instruction_count = 0;
    self.execute()
  }

  /// Call a named user function directly (used by the host to invoke
  /// lifecycle hooks like `on_tick`). Pushes a fresh frame on top of
  /// whatever frames already exist and runs to completion or yield.
  pub fn call_function(
    &mut self,
    name: &str,
    args: Vec<Value>,
  ) -> Result<Value> {
    let func = self.functions.get(name).cloned().ok_or_else(|| {
      crate::error::Error::Runtime(RuntimeError::new(
        None,
        RuntimeErrorKind::UndefinedName(name.to_string()),
      ))
    })?;
    let argc = args.len();
    self.value_stack.push(Value::Function(func.clone()));
    for a in args {
      self.value_stack.push(a);
    }
    self.instruction_count = 0;
    let base_frames = self.frame_stack.len();
    self.invoke(func, argc, HashMap::new())?;
    self.run_until(base_frames)
  }

  fn run_until(&mut self, target_depth: usize) -> Result<Value> {
    loop {
      match self.step()? {
        StepOutcome::Continue => {
          if self.frame_stack.len() <= target_depth {
            return Ok(self.value_stack.pop().unwrap_or(Value::Null));
          }
        }
        StepOutcome::Yielded => return Ok(Value::Null),
        StepOutcome::Finished(v) => return Ok(v),
      }
    }
  }

  fn execute(&mut self) -> Result<Value> {
    loop {
      match self.step()? {
        StepOutcome::Continue => {}
        StepOutcome::Yielded => return Ok(Value::Null),
        StepOutcome::Finished(v) => return Ok(v),
      }
    }
  }

  fn chunk_for(&self, frame: &CallFrame) -> Rc<Chunk> {
    match &frame.function {
      Some(f) => Rc::new(f.chunk.clone()),
      None => self.top_level.clone(),
    }
  }

  /// One dispatch step. `spec` §4.4's pseudocode loop body.
  fn step(&mut self) -> Result<StepOutcome> {
    self.instruction_count += 1;
    if self.instruction_count > self.instruction_limit {
      self.is_yielded = true;
      return Ok(StepOutcome::Yielded);
    }

    let frame_idx = self.frame_stack.len() - 1;
    let chunk = self.chunk_for(&self.frame_stack[frame_idx]);
    let ip = self.frame_stack[frame_idx].ip;

    if ip >= chunk.code.len() {
      return self.finish_frame(Value::Null);
    }

    let (op, operand) = chunk.code[ip].clone();
    self.frame_stack[frame_idx].ip += 1;
    self.current_line = chunk.lines[ip];

    trace!(?op, line = self.current_line, "dispatch");
    self.dispatch(op, operand, &chunk)
  }

  fn rt_err(&self, kind: RuntimeErrorKind) -> crate::error::Error {
    crate::error::Error::Runtime(RuntimeError::new(Some(self.current_line), kind))
  }

  fn pop(&mut self) -> Result<Value> {
    self
      .value_stack
      .pop()
      .ok_or_else(|| self.rt_err(RuntimeErrorKind::StackUnderflow("pop")))
  }

  fn peek(&self) -> Result<&Value> {
    self
      .value_stack
      .last()
      .ok_or_else(|| self.rt_err(RuntimeErrorKind::StackUnderflow("peek")))
  }

  fn dispatch(&mut self, op: OpCode, operand: Operand, chunk: &Chunk) -> Result<StepOutcome> {
    match op {
      OpCode::PushConst => {
        let v = chunk.constants[operand.as_int()].clone();
        self.value_stack.push(v);
      }
      OpCode::PushTrue => self.value_stack.push(Value::Bool(true)),
      OpCode::PushFalse => self.value_stack.push(Value::Bool(false)),
      OpCode::Pop => {
        self.pop()?;
      }
      OpCode::DefineGlobal => {
        let name = self.name_const(chunk, &operand);
        let v = self.pop()?;
        self.globals.insert(name, v);
      }
      OpCode::GetGlobal => {
        let name = self.name_const(chunk, &operand);
        let v = self
          .globals
          .get(&name)
          .cloned()
          .ok_or_else(|| self.rt_err(RuntimeErrorKind::UndefinedName(name.clone())))?;
        self.value_stack.push(v);
      }
      OpCode::SetGlobal | OpCode::SetGlobalPop => {
        let name = self.name_const(chunk, &operand);
        if !self.globals.contains_key(&name) {
          return Err(self.rt_err(RuntimeErrorKind::UndefinedName(name)));
        }
        let v = if op == OpCode::SetGlobalPop {
          self.pop()?
        } else {
          self.peek()?.clone()
        };
        self.globals.insert(name, v);
      }
      OpCode::IncGlobal => {
        let name = self.name_const(chunk, &operand);
        self.numeric_global_op(&name, 1.0)?;
      }
      OpCode::AddGlobal => {
        let name = self.name_const(chunk, &operand);
        let v = self.pop()?;
        let n = as_number(&v).ok_or_else(|| {
          self.rt_err(RuntimeErrorKind::TypeError("ADD_GLOBAL requires a number".into()))
        })?;
        self.numeric_global_op(&name, n)?;
      }
      OpCode::GetLocal => {
        let stack_start = self.frame_stack.last().unwrap().stack_start;
        let v = self.value_stack[stack_start + operand.as_int()].clone();
        self.value_stack.push(v);
      }
      OpCode::SetLocal | OpCode::SetLocalPop => {
        let stack_start = self.frame_stack.last().unwrap().stack_start;
        let v = if op == OpCode::SetLocalPop {
          self.pop()?
        } else {
          self.peek()?.clone()
        };
        self.value_stack[stack_start + operand.as_int()] = v;
      }
      OpCode::GetAttr => {
        let name = self.name_const(chunk, &operand);
        let target = self.pop()?;
        let v = self.get_attr(&target, &name)?;
        self.value_stack.push(v);
      }
      OpCode::SetAttr => {
        let name = self.name_const(chunk, &operand);
        let value = self.pop()?;
        let target = self.peek()?.clone();
        self.set_attr(&target, &name, value.clone())?;
        self.value_stack.push(value);
      }
      OpCode::SetAttrPop | OpCode::SetAttrFast => {
        let name = self.name_const(chunk, &operand);
        let value = self.pop()?;
        let target = self.pop()?;
        self.set_attr(&target, &name, value)?;
      }
      OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
        let b = self.pop()?;
        let a = self.pop()?;
        self.value_stack.push(self.arith(op, a, b)?);
      }
      OpCode::Equal | OpCode::NotEqual => {
        let b = self.pop()?;
        let a = self.pop()?;
        let eq = values_equal(&a, &b);
        self.value_stack.push(Value::Bool(if op == OpCode::Equal { eq } else { !eq }));
      }
      OpCode::Greater | OpCode::GreaterEqual | OpCode::Less | OpCode::LessEqual => {
        let b = self.pop()?;
        let a = self.pop()?;
        self.value_stack.push(self.compare(op, a, b)?);
      }
      OpCode::Not => {
        let v = self.pop()?;
        self.value_stack.push(Value::Bool(!v.is_truthy()));
      }
      OpCode::Negate => {
        let v = self.pop()?;
        let n = as_number(&v)
          .ok_or_else(|| self.rt_err(RuntimeErrorKind::TypeError("cannot negate".into())))?;
        self.value_stack.push(Value::Number(-n));
      }
      OpCode::Jump => {
        self.frame_stack.last_mut().unwrap().ip = operand.as_int();
      }
      OpCode::Loop => {
        self.frame_stack.last_mut().unwrap().ip = operand.as_int();
      }
      OpCode::JumpIfFalse => {
        if !self.peek()?.is_truthy() {
          self.frame_stack.last_mut().unwrap().ip = operand.as_int();
        }
      }
      OpCode::JumpIfTrue => {
        if self.peek()?.is_truthy() {
          self.frame_stack.last_mut().unwrap().ip = operand.as_int();
        }
      }
      OpCode::JumpIfFalsePop => {
        let v = self.pop()?;
        if !v.is_truthy() {
          self.frame_stack.last_mut().unwrap().ip = operand.as_int();
        }
      }
      OpCode::JumpIfTruePop => {
        let v = self.pop()?;
        if v.is_truthy() {
          self.frame_stack.last_mut().unwrap().ip = operand.as_int();
        }
      }
      OpCode::Call => {
        let argc = operand.as_int();
        self.perform_call(argc, HashMap::new())?;
      }
      OpCode::CallKw => {
        if let Operand::CallKw(argc, names) = operand {
          let mut values = Vec::with_capacity(names.len());
          for _ in 0..names.len() {
            values.push(self.pop()?);
          }
          values.reverse();
          let kwargs: HashMap<String, Value> = names.into_iter().zip(values).collect();
          self.perform_call(argc, kwargs)?;
        }
      }
      OpCode::Return => {
        let v = self.pop()?;
        return self.finish_frame(v);
      }
      OpCode::ReturnNone => {
        return self.finish_frame(Value::Null);
      }
      OpCode::Yield => {
        self.is_yielded = true;
        return Ok(StepOutcome::Yielded);
      }
      OpCode::BuildList => {
        let n = operand.as_int();
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
          items.push(self.pop()?);
        }
        items.reverse();
        self.value_stack.push(Value::list(items));
      }
      OpCode::BuildMap => {
        let n = operand.as_int();
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
          let v = self.pop()?;
          let k = self.pop()?;
          pairs.push((k, v));
        }
        pairs.reverse();
        let mut map = crate::value::Map::new();
        for (k, v) in pairs {
          let key = MapKey::from_value(&k)
            .map_err(|_| self.rt_err(RuntimeErrorKind::TypeError("unhashable map key".into())))?;
          map.insert(key, v);
        }
        self.value_stack.push(Value::map(map));
      }
      OpCode::GetIter => {
        let v = self.pop()?;
        if let Value::Iterator(_) = &v {
          self.value_stack.push(v);
        } else {
          let iter = self.make_iterator(v)?;
          self
            .value_stack
            .push(Value::Iterator(Rc::new(std::cell::RefCell::new(iter))));
        }
      }
      OpCode::ForIter => {
        let done = {
          let top = self.peek()?.clone();
          match top {
            Value::Iterator(it) => {
              let next = it.borrow_mut().next();
              match next {
                Some(v) => {
                  self.value_stack.push(v);
                  false
                }
                None => true,
              }
            }
            _ => {
              return Err(self.rt_err(RuntimeErrorKind::TypeError("FOR_ITER on a non-iterator".into())))
            }
          }
        };
        if done {
          self.pop()?;
          self.frame_stack.last_mut().unwrap().ip = operand.as_int();
        }
      }
      OpCode::IndexGet => {
        let idx = self.pop()?;
        let obj = self.pop()?;
        self.value_stack.push(self.index_get(&obj, &idx)?);
      }
      OpCode::IndexSet => {
        let value = self.pop()?;
        let obj = self.pop()?;
        let idx = self.pop()?;
        self.index_set(&obj, &idx, value.clone())?;
        self.value_stack.push(value);
      }
    }
    Ok(StepOutcome::Continue)
  }

  fn name_const(&self, chunk: &Chunk, operand: &Operand) -> String {
    match &chunk.constants[operand.as_int()] {
      Value::String(s) => s.to_string(),
      other => other.to_string(),
    }
  }

  fn numeric_global_op(&mut self, name: &str, delta: f64) -> Result<()> {
    let cur = self
      .globals
      .get(name)
      .cloned()
      .ok_or_else(|| self.rt_err(RuntimeErrorKind::UndefinedName(name.to_string())))?;
    let n = as_number(&cur).ok_or_else(|| {
      self.rt_err(RuntimeErrorKind::TypeError(format!("`{name}` is not a number")))
    })?;
    self.globals.insert(name.to_string(), Value::Number(n + delta));
    Ok(())
  }

  fn arith(&self, op: OpCode, a: Value, b: Value) -> Result<Value> {
    if op == OpCode::Add {
      if let (Value::String(a), Value::String(b)) = (&a, &b) {
        return Ok(Value::string(format!("{a}{b}")));
      }
    }
    let (a, b) = (
      as_number(&a).ok_or_else(|| {
        self.rt_err(RuntimeErrorKind::TypeError(format!("cannot apply arithmetic to {}", a.type_name())))
      })?,
      as_number(&b).ok_or_else(|| {
        self.rt_err(RuntimeErrorKind::TypeError(format!("cannot apply arithmetic to {}", b.type_name())))
      })?,
    );
    Ok(Value::Number(match op {
      OpCode::Add => a + b,
      OpCode::Sub => a - b,
      OpCode::Mul => a * b,
      OpCode::Div => {
        if b == 0.0 {
          return Err(self.rt_err(RuntimeErrorKind::ArithmeticError("division by zero".into())));
        }
        a / b
      }
      _ => unreachable!(),
    }))
  }

  fn compare(&self, op: OpCode, a: Value, b: Value) -> Result<Value> {
    let (a, b) = (
      as_number(&a).ok_or_else(|| self.rt_err(RuntimeErrorKind::TypeError("cannot compare".into())))?,
      as_number(&b).ok_or_else(|| self.rt_err(RuntimeErrorKind::TypeError("cannot compare".into())))?,
    );
    Ok(Value::Bool(match op {
      OpCode::Greater => a > b,
      OpCode::GreaterEqual => a >= b,
      OpCode::Less => a < b,
      OpCode::LessEqual => a <= b,
      _ => unreachable!(),
    }))
  }

  fn get_attr(&self, target: &Value, name: &str) -> Result<Value> {
    match target {
      Value::HostObject(h) => h.get_attr(name).map_err(|k| self.rt_err(k)),
      _ => Err(self.rt_err(RuntimeErrorKind::AttributeError(format!(
        "{} has no attribute `{name}`",
        target.type_name()
      )))),
    }
  }

  fn set_attr(&self, target: &Value, name: &str, value: Value) -> Result<()> {
    match target {
      Value::HostObject(h) => h.set_attr(name, value).map_err(|k| self.rt_err(k)),
      _ => Err(self.rt_err(RuntimeErrorKind::AttributeError(format!(
        "{} has no attribute `{name}`",
        target.type_name()
      )))),
    }
  }

  fn index_get(&self, obj: &Value, idx: &Value) -> Result<Value> {
    match obj {
      Value::List(l) => {
        let i = truncating_index(idx, l.borrow().len())
          .ok_or_else(|| self.rt_err(RuntimeErrorKind::IndexError("index out of range".into())))?;
        Ok(l.borrow()[i].clone())
      }
      Value::Map(m) => {
        let key = MapKey::from_value(idx)
          .map_err(|_| self.rt_err(RuntimeErrorKind::TypeError("unhashable map key".into())))?;
        m.borrow()
          .get(&key)
          .cloned()
          .ok_or_else(|| self.rt_err(RuntimeErrorKind::IndexError("key not found".into())))
      }
      Value::String(s) => {
        let chars: Vec<char> = s.chars().collect();
        let i = truncating_index(idx, chars.len())
          .ok_or_else(|| self.rt_err(RuntimeErrorKind::IndexError("index out of range".into())))?;
        Ok(Value::string(chars[i].to_string()))
      }
      other => Err(self.rt_err(RuntimeErrorKind::TypeError(format!(
        "{} is not indexable",
        other.type_name()
      )))),
    }
  }

  fn index_set(&self, obj: &Value, idx: &Value, value: Value) -> Result<()> {
    match obj {
      Value::List(l) => {
        let len = l.borrow().len();
        let i = truncating_index(idx, len)
          .ok_or_else(|| self.rt_err(RuntimeErrorKind::IndexError("index out of range".into())))?;
        l.borrow_mut()[i] = value;
        Ok(())
      }
      Value::Map(m) => {
        let key = MapKey::from_value(idx)
          .map_err(|_| self.rt_err(RuntimeErrorKind::TypeError("unhashable map key".into())))?;
        m.borrow_mut().insert(key, value);
        Ok(())
      }
      other => Err(self.rt_err(RuntimeErrorKind::TypeError(format!(
        "{} does not support item assignment",
        other.type_name()
      )))),
    }
  }

  fn make_iterator(&self, v: Value) -> Result<IteratorHandle> {
    match v {
      Value::List(l) => Ok(IteratorHandle::over_list(l.borrow().clone())),
      Value::Map(m) => Ok(IteratorHandle::over_map_keys(
        m.borrow().keys().map(|k| k.to_value()).collect(),
      )),
      other => Err(self.rt_err(RuntimeErrorKind::TypeError(format!(
        "{} is not iterable",
        other.type_name()
      )))),
    }
  }

  fn perform_call(&mut self, argc: usize, kwargs: HashMap<String, Value>) -> Result<()> {
    let callee_idx = self.value_stack.len() - argc - 1;
    let callee = self.value_stack[callee_idx].clone();
    match callee {
      Value::Function(f) => self.invoke(f, argc, kwargs),
      Value::Native(n) => {
        let mut positional = Vec::with_capacity(argc);
        for _ in 0..argc {
          positional.push(self.pop()?);
        }
        positional.reverse();
        self.pop()?; // the native value itself
        let result = (n.func)(&positional, &kwargs)
          .map_err(|k| crate::error::Error::Runtime(RuntimeError::new(Some(self.current_line), k)))?;
        self.value_stack.push(result);
        Ok(())
      }
      other => Err(self.rt_err(RuntimeErrorKind::TypeError(format!(
        "{} is not callable",
        other.type_name()
      )))),
    }
  }

  /// The call protocol: positional args fill first, then keyword args by
  /// name, then defaults, then `**kwargs` collects the rest. `spec` §4.4.
  fn invoke(&mut self, f: Rc<FunctionObject>, argc: usize, mut kwargs: HashMap<String, Value>) -> Result<()> {
    let mut locals = vec![Value::Null; f.locals_count];

    let positional_base = self.value_stack.len() - argc;
    let fill = argc.min(f.arity);
    for i in 0..fill {
      locals[i] = self.value_stack[positional_base + i].clone();
    }
    let mut set = vec![false; f.arity];
    for s in set.iter_mut().take(fill) {
      *s = true;
    }

    let mut extras = crate::value::Map::new();
    for (name, value) in kwargs.drain() {
      if let Some(slot) = f.local_names[..f.arity].iter().position(|n| *n == name) {
        if set[slot] {
          return Err(self.rt_err(RuntimeErrorKind::TypeError(format!(
            "got multiple values for argument `{name}`"
          ))));
        }
        locals[slot] = value;
        set[slot] = true;
      } else if f.kwargs_param.is_some() {
        let key = MapKey::from_value(&Value::string(&name)).unwrap();
        extras.insert(key, value);
      } else {
        return Err(self.rt_err(RuntimeErrorKind::TypeError(format!(
          "unexpected keyword '{name}'"
        ))));
      }
    }

    for (i, is_set) in set.iter().enumerate() {
      if !is_set {
        let name = &f.local_names[i];
        if let Some(default) = f.defaults.get(name) {
          locals[i] = default.clone();
        } else {
          return Err(self.rt_err(RuntimeErrorKind::TypeError(format!(
            "missing required argument `{name}`"
          ))));
        }
      }
    }

    if let Some(kwargs_name) = &f.kwargs_param {
      let slot = f.local_names.iter().position(|n| n == kwargs_name).unwrap();
      locals[slot] = Value::map(extras);
    }

    self.value_stack.truncate(positional_base - 1); // drop callee + positional args
    let stack_start = self.value_stack.len();
    self.value_stack.extend(locals);

    self.frame_stack.push(CallFrame {
      function: Some(f),
      ip: 0,
      stack_start,
    });
    Ok(())
  }

  /// Pop the current frame, restoring the stack to its entry height (the
  /// callee and its positional args were already consumed by [`Self::invoke`]
  /// when the frame's locals were laid down) and pushing the return value
  /// for the caller. `spec` §4.4, "Frame finalization".
  fn finish_frame(&mut self, value: Value) -> Result<StepOutcome> {
    let frame = self.frame_stack.pop().unwrap();
    self.value_stack.truncate(frame.stack_start);
    if self.frame_stack.is_empty() {
      return Ok(StepOutcome::Finished(value));
    }
    self.value_stack.push(value);
    Ok(StepOutcome::Continue)
  }
}

fn as_number(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => Some(*n),
    _ => None,
  }
}

fn values_equal(a: &Value, b: &Value) -> bool {
  a == b
}

/// Numeric index truncated toward zero, per Design Notes §9. Negative
/// indices are out of range (no Python-style wraparound in this core).
fn truncating_index(v: &Value, len: usize) -> Option<usize> {
  match v {
    Value::Number(n) => {
      let i = n.trunc();
      if i < 0.0 {
        None
      } else {
        let i = i as usize;
        if i < len {
          Some(i)
        } else {
          None
        }
      }
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compiler::compile;
  use crate::lexer::lex;
  use crate::parser::parse;
  use indoc::indoc;

  fn run_src(src: &str) -> Vm {
    let tokens = lex(src).unwrap();
    let program = parse(tokens).unwrap();
    let compiled = compile(&program, src).unwrap();
    let mut vm = Vm::new(compiled, 10_000);
    vm.run().unwrap();
    vm
  }

  #[test]
  fn arithmetic_and_globals() {
    let vm = run_src("let a = 2\nlet b = 3\nset a = a + b\n");
    assert_eq!(vm.globals()["a"], Value::Number(5.0));
    assert_eq!(vm.globals()["b"], Value::Number(3.0));
  }

  #[test]
  fn for_loop_iteration() {
    let vm = run_src(indoc! {"
            let s = 0
            for i in [1, 2, 3, 4]:
                set s = s + i
        "});
    assert_eq!(vm.globals()["s"], Value::Number(10.0));
  }

  #[test]
  fn empty_iterable_runs_zero_times() {
    let vm = run_src(indoc! {"
            let s = 0
            for i in []:
                set s = s + 1
        "});
    assert_eq!(vm.globals()["s"], Value::Number(0.0));
  }

  #[test]
  fn function_defaults_and_keyword_args() {
    let tokens = lex(indoc! {r#"
            func greet(name, prefix="Hi"):
                return prefix + " " + name
            let a = greet("Al")
            let b = greet("Al", prefix="Hello")
        "#})
    .unwrap();
    let src = indoc! {r#"
            func greet(name, prefix="Hi"):
                return prefix + " " + name
            let a = greet("Al")
            let b = greet("Al", prefix="Hello")
        "#};
    let program = parse(tokens).unwrap();
    let compiled = compile(&program, src).unwrap();
    let mut vm = Vm::new(compiled, 10_000);
    vm.run().unwrap();
    assert_eq!(vm.globals()["a"], Value::string("Hi Al"));
    assert_eq!(vm.globals()["b"], Value::string("Hello Al"));
  }

  #[test]
  fn yield_and_resume_preserve_globals() {
    let src = "let c = 0\nset c = c + 1\nyield\nset c = c + 1\n";
    let tokens = lex(src).unwrap();
    let program = parse(tokens).unwrap();
    let compiled = compile(&program, src).unwrap();
    let mut vm = Vm::new(compiled, 10_000);
    vm.run().unwrap();
    assert!(vm.is_yielded());
    assert_eq!(vm.globals()["c"], Value::Number(1.0));
    vm.resume().unwrap();
    assert!(!vm.is_yielded());
    assert_eq!(vm.globals()["c"], Value::Number(2.0));
  }

  #[test]
  fn instruction_budget_suspends_and_resumes() {
    let src = indoc! {"
            let i = 0
            while i < 1000:
                set i = i + 1
        "};
    let tokens = lex(src).unwrap();
    let program = parse(tokens).unwrap();
    let compiled = compile(&program, src).unwrap();
    let mut vm = Vm::new(compiled, 10);
    vm.run().unwrap();
    assert!(vm.is_yielded());
    let mut loops = 0;
    while vm.is_yielded() && loops < 10_000 {
      vm.resume().unwrap();
      loops += 1;
    }
    assert!(!vm.is_yielded());
    assert_eq!(vm.globals()["i"], Value::Number(1000.0));
  }
}
