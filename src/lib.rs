//! Front door: lex → parse → compile → run, plus the `@meta`-driven
//! lifecycle facade a host embeds (`init`/`tick`/`exit`/`hotkey`). See
//! `spec` §4, §5, §6.
//!
//! Grounded in `src/public.rs`'s `Hebi` struct, which likewise wraps an
//! internal VM behind a small set of lifecycle-shaped methods.

mod ast;
mod cache;
mod compiler;
mod diag;
mod disasm;
mod error;
mod host;
mod lexer;
mod object;
mod opcode;
mod parser;
mod span;
mod value;
mod vm;

pub use cache::BytecodeCache;
pub use compiler::CompiledProgram;
pub use diag::Report;
pub use disasm::{disassemble_chunk, disassemble_program};
pub use error::{
  CompileError, Error, LexError, LexErrorKind, ParseError, Result, RuntimeError, RuntimeErrorKind,
};
pub use host::{Config, ConfigBuilder, EventQueue, HotkeyEvent, NoEvents, DEFAULT_INSTRUCTION_LIMIT};
pub use object::{FunctionObject, HostObject, IteratorHandle, NativeFunction};
pub use value::{MapKey, Value};
pub use vm::Vm;

/// Runs source text through the lexer, parser, and compiler. Each phase's
/// errors are collected before returning; a later phase never runs once
/// an earlier one has failed (`spec` §7, "lex/parse/compile errors abort
/// before any execution").
pub fn compile_source(source: &str) -> std::result::Result<CompiledProgram, Vec<Error>> {
  let tokens = lexer::lex(source).map_err(into_errors)?;
  let program = parser::parse(tokens).map_err(into_errors)?;
  compiler::compile(&program, source).map_err(into_errors)
}

fn into_errors<E: Into<Error>>(errors: Vec<E>) -> Vec<Error> {
  errors.into_iter().map(Into::into).collect()
}

/// The `@meta` keys a script may declare, read out of the compiled
/// top-level chunk's `metadata` map. Unrecognized keys are left in place
/// and simply never consulted (`spec` §6). Both the short and `on_`-
/// prefixed spellings of the callback keys are recognized.
#[derive(Debug, Clone, Default)]
pub struct LifecycleConfig {
  pub init_fn: Option<String>,
  pub tick_fn: Option<String>,
  pub exit_fn: Option<String>,
  pub hotkey_fn: Option<String>,
  pub no_tick: bool,
  pub no_limit: bool,
  /// `-1` in `@meta` means unlimited; that collapses into `no_limit` here.
  pub instruction_limit: Option<u64>,
  pub fps: Option<f64>,
  pub min_sleep: Option<f64>,
}

impl LifecycleConfig {
  fn from_metadata(metadata: &std::collections::BTreeMap<String, Value>) -> Self {
    let string_of = |key: &str, alt: &str| -> Option<String> {
      metadata
        .get(key)
        .or_else(|| metadata.get(alt))
        .and_then(as_str)
    };
    let bool_of = |key: &str| -> bool {
      metadata.get(key).map(Value::is_truthy).unwrap_or(false)
    };
    let number_of = |key: &str| -> Option<f64> { metadata.get(key).and_then(as_number) };

    let mut no_limit = bool_of("no_limit");
    let instruction_limit = number_of("instruction_limit").map(|n| n as i64).and_then(|n| {
      if n < 0 {
        no_limit = true;
        None
      } else {
        Some(n as u64)
      }
    });

    Self {
      init_fn: string_of("init", "on_init"),
      tick_fn: string_of("tick", "on_tick"),
      exit_fn: string_of("exit", "on_exit"),
      hotkey_fn: string_of("hotkey", "on_hotkey"),
      no_tick: bool_of("no_tick"),
      no_limit,
      instruction_limit,
      fps: number_of("fps"),
      min_sleep: number_of("min_sleep"),
    }
  }
}

fn as_str(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => Some(s.to_string()),
    _ => None,
  }
}

fn as_number(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => Some(*n),
    _ => None,
  }
}

/// A compiled script wired up to its declared lifecycle. This is what a
/// host embeds: construct once from source, run the top level, then drive
/// `init`/`tick`/`hotkey`/`exit` as the host's own loop dictates.
pub struct Mira {
  vm: Vm,
  lifecycle: LifecycleConfig,
  exited: bool,
}

impl Mira {
  /// Compiles `source` and builds the VM with `config`'s globals and
  /// instruction budget, which `@meta`'s `no_limit`/`instruction_limit`
  /// keys may override.
  pub fn new(source: &str, config: Config) -> std::result::Result<Self, Vec<Error>> {
    let compiled = compile_source(source)?;
    let lifecycle = LifecycleConfig::from_metadata(&compiled.top_level.metadata);
    let instruction_limit = if lifecycle.no_limit {
      u64::MAX
    } else {
      lifecycle.instruction_limit.unwrap_or(config.instruction_limit)
    };
    let mut vm = Vm::new(compiled, instruction_limit);
    for (name, value) in config.globals {
      vm.set_global(name, value);
    }
    Ok(Self {
      vm,
      lifecycle,
      exited: false,
    })
  }

  /// Compiles from a cache when possible, falling back to a full compile
  /// and populating the cache on a miss (`spec` §4.6).
  pub fn from_cached(
    source: &str,
    cache: &BytecodeCache,
    config: Config,
  ) -> std::result::Result<Self, Vec<Error>> {
    if let Some(compiled) = cache.get(source) {
      let lifecycle = LifecycleConfig::from_metadata(&compiled.top_level.metadata);
      let instruction_limit = if lifecycle.no_limit {
        u64::MAX
      } else {
        lifecycle.instruction_limit.unwrap_or(config.instruction_limit)
      };
      let mut vm = Vm::new(compiled, instruction_limit);
      for (name, value) in config.globals {
        vm.set_global(name, value);
      }
      return Ok(Self {
        vm,
        lifecycle,
        exited: false,
      });
    }
    let mira = Self::new(source, config)?;
    let _ = cache.put(source, &mira.vm.compiled_snapshot());
    Ok(mira)
  }

  /// Runs the top-level body once. Most scripts declare all of their
  /// functions here and rely on `init`/`tick` for anything else, but the
  /// top level may itself perform work.
  pub fn run_top_level(&mut self) -> Result<Value> {
    self.vm.run()
  }

  /// Invokes the declared `init`/`on_init` function, if any.
  pub fn init(&mut self) -> Result<Value> {
    self.call_declared(self.lifecycle.init_fn.clone(), Vec::new())
  }

  /// Invokes the declared `tick`/`on_tick` function with `delta_seconds`,
  /// unless `no_tick` is set.
  pub fn tick(&mut self, delta_seconds: f64) -> Result<Value> {
    if self.lifecycle.no_tick {
      return Ok(Value::Null);
    }
    self.call_declared(self.lifecycle.tick_fn.clone(), vec![Value::Number(delta_seconds)])
  }

  /// Invokes the declared `hotkey`/`on_hotkey` function with the event's
  /// name.
  pub fn hotkey(&mut self, event: &HotkeyEvent) -> Result<Value> {
    self.call_declared(
      self.lifecycle.hotkey_fn.clone(),
      vec![Value::string(&event.name)],
    )
  }

  /// Invokes the declared `exit`/`on_exit` function. A second call is a
  /// no-op (`spec` §5, "exit function invoked at most once").
  pub fn exit(&mut self) -> Result<Value> {
    if self.exited {
      return Ok(Value::Null);
    }
    self.exited = true;
    self.call_declared(self.lifecycle.exit_fn.clone(), Vec::new())
  }

  fn call_declared(&mut self, name: Option<String>, args: Vec<Value>) -> Result<Value> {
    match name {
      Some(name) => self.vm.call_function(&name, args),
      None => Ok(Value::Null),
    }
  }

  pub fn is_yielded(&self) -> bool {
    self.vm.is_yielded()
  }

  pub fn resume(&mut self) -> Result<Value> {
    self.vm.resume()
  }

  pub fn fps(&self) -> Option<f64> {
    self.lifecycle.fps
  }

  pub fn min_sleep(&self) -> Option<f64> {
    self.lifecycle.min_sleep
  }

  pub fn vm(&self) -> &Vm {
    &self.vm
  }

  pub fn vm_mut(&mut self) -> &mut Vm {
    &mut self.vm
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lifecycle_keys_drive_init_and_tick() {
    let src = indoc::indoc! {r#"
      @meta {
          "init": "setup",
          "tick": "step",
          "no_limit": true
      }

      let calls = 0

      func setup():
          set calls = 1

      func step(dt):
          set calls = calls + dt
    "#};
    let mut mira = Mira::new(src, Config::default()).expect("compiles");
    mira.run_top_level().expect("top level runs");
    mira.init().expect("init runs");
    assert_eq!(mira.vm().globals().get("calls"), Some(&Value::Number(1.0)));
    mira.tick(0.5).expect("tick runs");
    assert_eq!(mira.vm().globals().get("calls"), Some(&Value::Number(1.5)));
  }

  #[test]
  fn exit_runs_at_most_once() {
    let src = indoc::indoc! {r#"
      @meta {
          "exit": "teardown"
      }

      let exits = 0

      func teardown():
          set exits = exits + 1
    "#};
    let mut mira = Mira::new(src, Config::default()).expect("compiles");
    mira.run_top_level().expect("top level runs");
    mira.exit().expect("first exit runs");
    mira.exit().expect("second exit is a no-op");
    assert_eq!(mira.vm().globals().get("exits"), Some(&Value::Number(1.0)));
  }

  #[test]
  fn no_tick_suppresses_the_tick_callback() {
    let src = indoc::indoc! {r#"
      @meta {
          "tick": "step",
          "no_tick": true
      }

      let calls = 0

      func step():
          set calls = calls + 1
    "#};
    let mut mira = Mira::new(src, Config::default()).expect("compiles");
    mira.run_top_level().expect("top level runs");
    mira.tick(0.016).expect("tick is a no-op");
    assert_eq!(mira.vm().globals().get("calls"), Some(&Value::Number(0.0)));
  }

  #[test]
  fn compile_source_reports_lex_errors_without_parsing() {
    let errors = compile_source("let a = \"unterminated\n").unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Error::Lex(_)));
  }
}
