//! Heap-shaped values referenced from [`crate::value::Value`]: compiled
//! functions, native callables, host objects, and iterators. See `spec`
//! §3, §4.4, §4.5, and Design Notes §9.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeErrorKind};
use crate::opcode::Chunk;
use crate::value::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionObject {
  pub name: String,
  pub arity: usize,
  pub locals_count: usize,
  pub local_names: Vec<String>,
  pub defaults: HashMap<String, Value>,
  pub kwargs_param: Option<String>,
  pub chunk: Chunk,
}

/// A host-supplied callable: `(positional, keyword) -> Result<Value>`.
/// Opaque to the VM beyond its calling convention (`spec` §4.5).
pub struct NativeFunction {
  pub name: String,
  pub func: Box<dyn Fn(&[Value], &HashMap<String, Value>) -> Result<Value, RuntimeErrorKind>>,
}

impl fmt::Debug for NativeFunction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NativeFunction").field("name", &self.name).finish()
  }
}

/// The host's v-table for a `host_object` value: attribute get/set and
/// callable attributes (Design Notes §9, "open-ended host objects").
pub trait HostObject {
  fn type_name(&self) -> &str;
  fn get_attr(&self, name: &str) -> Result<Value, RuntimeErrorKind>;
  fn set_attr(&self, name: &str, value: Value) -> Result<(), RuntimeErrorKind>;
  fn call_attr(
    &self,
    name: &str,
    positional: &[Value],
    keyword: &HashMap<String, Value>,
  ) -> Result<Value, RuntimeErrorKind>;
}

impl fmt::Debug for dyn HostObject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<host_object {}>", self.type_name())
  }
}

/// A tagged iterator handle with one entry point, `next`, per Design
/// Notes §9 ("iterator as a generic handle").
#[derive(Debug)]
pub enum IteratorHandle {
  List { items: Vec<Value>, pos: usize },
  MapKeys { keys: Vec<Value>, pos: usize },
  Range { next: i64, stop: i64, step: i64 },
}

impl IteratorHandle {
  pub fn over_list(items: Vec<Value>) -> Self {
    IteratorHandle::List { items, pos: 0 }
  }

  pub fn over_map_keys(keys: Vec<Value>) -> Self {
    IteratorHandle::MapKeys { keys, pos: 0 }
  }

  pub fn range(start: i64, stop: i64, step: i64) -> Self {
    IteratorHandle::Range { next: start, stop, step }
  }

  pub fn next(&mut self) -> Option<Value> {
    match self {
      IteratorHandle::List { items, pos } => {
        let v = items.get(*pos).cloned();
        if v.is_some() {
          *pos += 1;
        }
        v
      }
      IteratorHandle::MapKeys { keys, pos } => {
        let v = keys.get(*pos).cloned();
        if v.is_some() {
          *pos += 1;
        }
        v
      }
      IteratorHandle::Range { next, stop, step } => {
        if (*step > 0 && *next >= *stop) || (*step < 0 && *next <= *stop) {
          None
        } else {
          let v = *next;
          *next += *step;
          Some(Value::Number(v as f64))
        }
      }
    }
  }
}
