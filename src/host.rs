//! Host-facing configuration and the cooperative event hook. See `spec`
//! §4.5, §5.
//!
//! Grounded in `src/public.rs`'s `Hebi`/`HebiBuilder` front door and
//! `src/builtins.rs`'s `hebi.globals().register_fn(name, native_fn)`
//! pattern: `Config`/`ConfigBuilder` play the role of `HebiBuilder`, and
//! [`ConfigBuilder::register_fn`] plays the role of `register_fn`.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeErrorKind;
use crate::object::NativeFunction;
use crate::value::Value;

/// `spec` §6, "VM-level configuration ... `instruction_limit` default
/// 1000".
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 1000;

/// VM construction-time configuration: the per-slice instruction budget
/// and the initial `globals` mapping (`spec` §4.5).
pub struct Config {
  pub instruction_limit: u64,
  pub globals: HashMap<String, Value>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
      globals: HashMap::new(),
    }
  }
}

#[derive(Default)]
pub struct ConfigBuilder {
  config: Config,
}

impl ConfigBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn instruction_limit(mut self, n: u64) -> Self {
    self.config.instruction_limit = n;
    self
  }

  /// Registers a constant, module (`host_object`), or any other value
  /// directly in `globals`.
  pub fn global(mut self, name: impl Into<String>, value: Value) -> Self {
    self.config.globals.insert(name.into(), value);
    self
  }

  /// Registers a native callable under `name`. The callable must tolerate
  /// being called with arbitrary positional/keyword values; a returned
  /// `RuntimeErrorKind` is surfaced to the script as a `VMError` and
  /// unwinds every frame above the call (`spec` §4.5).
  pub fn register_fn(
    self,
    name: impl Into<String>,
    func: impl Fn(&[Value], &HashMap<String, Value>) -> Result<Value, RuntimeErrorKind> + 'static,
  ) -> Self {
    let name = name.into();
    let native = NativeFunction {
      name: name.clone(),
      func: Box::new(func),
    };
    self.global(name, Value::Native(Rc::new(native)))
  }

  pub fn finish(self) -> Config {
    self.config
  }
}

/// A hotkey or other host-originated event delivered to a script's
/// declared `hotkey`/`on_hotkey` function (`spec` §6).
#[derive(Clone, Debug)]
pub struct HotkeyEvent {
  pub name: String,
}

/// The host's cooperative event source. While a script is between slices
/// (not actively executing), the host may call [`EventQueue::sleep`] to
/// pace ticks and [`EventQueue::poll_events`] to deliver queued hotkeys —
/// this is the only time `spec` §5 permits mutating a script's globals.
///
/// Grounded in the Python original's `services/hotkey_service.py` +
/// `runtime/controller.py::dispatch_key_event`, where a `RuntimeController`
/// funnels host key events into a per-runtime `event_queue` guarded by a
/// lock, drained between ticks.
pub trait EventQueue {
  fn sleep(&mut self, seconds: f64);
  fn poll_events(&mut self) -> Vec<HotkeyEvent>;
}

/// An [`EventQueue`] that never sleeps and never has events, for hosts
/// that don't need hotkey delivery.
#[derive(Default)]
pub struct NoEvents;

impl EventQueue for NoEvents {
  fn sleep(&mut self, _seconds: f64) {}
  fn poll_events(&mut self) -> Vec<HotkeyEvent> {
    Vec::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn register_fn_surfaces_as_a_native_global() {
    let config = ConfigBuilder::new()
      .register_fn("double", |args, _kwargs| match args.first() {
        Some(Value::Number(n)) => Ok(Value::Number(n * 2.0)),
        _ => Err(RuntimeErrorKind::TypeError("double expects a number".into())),
      })
      .finish();
    match config.globals.get("double") {
      Some(Value::Native(n)) => assert_eq!(n.name, "double"),
      _ => panic!("expected a native function global"),
    }
  }

  #[test]
  fn no_events_drains_empty() {
    let mut q = NoEvents;
    q.sleep(0.016);
    assert!(q.poll_events().is_empty());
  }
}
