//! The `Value` domain. See `spec` §3 and Design Notes §9.
//!
//! `spec` sanctions a reference-counted representation over the teacher's
//! unsafe NaN-boxed allocator: there are no closures to capture here
//! (Non-goal), so the extra machinery buys nothing. Strings/lists/maps are
//! `Rc`-shared; equality is structural for primitives and strings,
//! identity for everything else.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::object::{FunctionObject, HostObject, IteratorHandle, NativeFunction};

#[derive(Clone)]
pub enum Value {
  Null,
  Bool(bool),
  Number(f64),
  String(Rc<str>),
  List(Rc<RefCell<Vec<Value>>>),
  Map(Rc<RefCell<Map>>),
  Function(Rc<FunctionObject>),
  Native(Rc<NativeFunction>),
  Iterator(Rc<RefCell<IteratorHandle>>),
  HostObject(Rc<dyn HostObject>),
}

/// Hashable projection of `Value`, used as a map key. Only the variants
/// `spec` §3 calls hashable may appear here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKey {
  Null,
  Bool(bool),
  Number(u64),
  String(String),
}

impl MapKey {
  pub fn from_value(v: &Value) -> Result<Self, &'static str> {
    match v {
      Value::Null => Ok(MapKey::Null),
      Value::Bool(b) => Ok(MapKey::Bool(*b)),
      Value::Number(n) => Ok(MapKey::Number(n.to_bits())),
      Value::String(s) => Ok(MapKey::String(s.to_string())),
      _ => Err("value is not hashable"),
    }
  }

  pub fn to_value(&self) -> Value {
    match self {
      MapKey::Null => Value::Null,
      MapKey::Bool(b) => Value::Bool(*b),
      MapKey::Number(bits) => Value::Number(f64::from_bits(*bits)),
      MapKey::String(s) => Value::String(Rc::from(s.as_str())),
    }
  }
}

pub type Map = IndexMap<MapKey, Value>;

impl Value {
  pub fn string(s: impl AsRef<str>) -> Self {
    Value::String(Rc::from(s.as_ref()))
  }

  pub fn list(items: Vec<Value>) -> Self {
    Value::List(Rc::new(RefCell::new(items)))
  }

  pub fn map(entries: Map) -> Self {
    Value::Map(Rc::new(RefCell::new(entries)))
  }

  pub fn is_truthy(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0,
      Value::String(s) => !s.is_empty(),
      Value::List(l) => !l.borrow().is_empty(),
      Value::Map(m) => !m.borrow().is_empty(),
      Value::Function(_) | Value::Native(_) | Value::Iterator(_) | Value::HostObject(_) => true,
    }
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::Function(_) => "function",
      Value::Native(_) => "native",
      Value::Iterator(_) => "iterator",
      Value::HostObject(_) => "host_object",
    }
  }

  /// Equality used for the compiler's constant-pool de-duplication:
  /// structural for the literal-bearing variants, `false` otherwise
  /// (list/map/function/native/iterator/host_object are never literals).
  pub fn const_eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
      (Value::String(a), Value::String(b)) => a == b,
      _ => false,
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
      (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
      (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
      (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
      (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
      (Value::HostObject(a), Value::HostObject(b)) => Rc::ptr_eq(a, b),
      _ => false,
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{self}")
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Bool(b) => write!(f, "{b}"),
      Value::Number(n) => write!(f, "{n}"),
      Value::String(s) => write!(f, "{s}"),
      Value::List(l) => {
        write!(f, "[")?;
        for (i, v) in l.borrow().iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{v}")?;
        }
        write!(f, "]")
      }
      Value::Map(m) => {
        write!(f, "{{")?;
        for (i, (k, v)) in m.borrow().iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{}: {v}", k.to_value())?;
        }
        write!(f, "}}")
      }
      Value::Function(func) => write!(f, "<function {}>", func.name),
      Value::Native(n) => write!(f, "<native {}>", n.name),
      Value::Iterator(_) => write!(f, "<iterator>"),
      Value::HostObject(_) => write!(f, "<host_object>"),
    }
  }
}

/// Serialization form of `Value`, used only for constants embedded in a
/// cached `Chunk` (`spec` §6). Non-literal variants never reach the
/// constant pool, so they have no wire form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConstValue {
  Null,
  Bool(bool),
  Number(f64),
  String(String),
}

impl From<&Value> for ConstValue {
  fn from(v: &Value) -> Self {
    match v {
      Value::Null => ConstValue::Null,
      Value::Bool(b) => ConstValue::Bool(*b),
      Value::Number(n) => ConstValue::Number(*n),
      Value::String(s) => ConstValue::String(s.to_string()),
      other => panic!("{} is not a valid constant", other.type_name()),
    }
  }
}

impl From<&ConstValue> for Value {
  fn from(c: &ConstValue) -> Self {
    match c {
      ConstValue::Null => Value::Null,
      ConstValue::Bool(b) => Value::Bool(*b),
      ConstValue::Number(n) => Value::Number(*n),
      ConstValue::String(s) => Value::string(s),
    }
  }
}

impl Serialize for Value {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    ConstValue::from(self).serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    ConstValue::deserialize(deserializer).map(|c| Value::from(&c))
  }
}
