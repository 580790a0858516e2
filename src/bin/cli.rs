//! Example host harness: run a script's top level plus its declared
//! lifecycle (`init`/`tick`/`exit`), or disassemble it. See `spec` §5, §6.
//!
//! Grounded in `cli/src/lib/commands.rs`'s `Command` enum and
//! `cli/src/lib/common.rs`'s file-or-stdin argument, adapted to this
//! crate's `Mira` facade. The `serve` subcommand demonstrates the
//! thread-per-script pattern from `runtime/controller.py`'s
//! `RuntimeController`: the script runs on its own thread and the host
//! delivers hotkeys over an `mpsc` channel between ticks.
use std::io::{IsTerminal, Read as _};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use mira::{disassemble_program, Config, ConfigBuilder, HotkeyEvent, Mira, Report};

#[derive(Debug, Parser)]
#[clap(name = "mira", version)]
struct App {
  #[clap(subcommand)]
  command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
  /// Run a script's top level, `init`, and (unless `no_tick` is declared)
  /// a fixed number of ticks.
  Run(RunArgs),
  /// Disassemble a script's compiled bytecode.
  #[clap(visible_alias = "dis")]
  Disassemble(InputArgs),
  /// Run a script on its own thread, delivering hotkeys from stdin lines.
  Serve(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
  #[clap(flatten)]
  input: InputArgs,
  /// Number of ticks to drive when the script declares a `tick` function.
  #[clap(long, default_value_t = 10)]
  ticks: u32,
}

#[derive(Debug, Args)]
struct InputArgs {
  /// Path to the script, or `-` to read from stdin.
  #[clap(value_name = "FILE", default_value = "-")]
  file: PathBuf,
}

impl InputArgs {
  fn source(&self) -> anyhow::Result<String> {
    if self.file.as_os_str() == "-" {
      let mut stdin = std::io::stdin();
      if stdin.is_terminal() {
        anyhow::bail!("an input file is required (or pipe a script into stdin)");
      }
      let mut buf = String::new();
      stdin.read_to_string(&mut buf).context("failed to read from stdin")?;
      Ok(buf)
    } else {
      std::fs::read_to_string(&self.file)
        .with_context(|| format!("failed to read file at {}", self.file.display()))
    }
  }

  fn name(&self) -> String {
    if self.file.as_os_str() == "-" {
      "<stdin>".to_string()
    } else {
      self.file.display().to_string()
    }
  }
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let app = App::parse();
  match app.command {
    Command::Run(args) => run(args),
    Command::Disassemble(input) => disassemble(input),
    Command::Serve(args) => serve(args),
  }
}

fn run(args: RunArgs) -> anyhow::Result<()> {
  let source = args.input.source()?;
  let mut mira = match Mira::new(&source, Config::default()) {
    Ok(mira) => mira,
    Err(errors) => {
      report(&source, &errors);
      anyhow::bail!("failed to compile {}", args.input.name());
    }
  };

  if let Err(e) = mira.run_top_level() {
    report(&source, std::slice::from_ref(&e));
    anyhow::bail!("failed to run {}", args.input.name());
  }
  if let Err(e) = mira.init() {
    report(&source, std::slice::from_ref(&e));
    anyhow::bail!("init failed in {}", args.input.name());
  }

  let delta = mira.fps().map(|fps| 1.0 / fps).unwrap_or(1.0 / 60.0);
  for _ in 0..args.ticks {
    match mira.tick(delta) {
      Ok(_) => {}
      Err(e) => {
        report(&source, std::slice::from_ref(&e));
        anyhow::bail!("tick failed in {}", args.input.name());
      }
    }
    if mira.is_yielded() {
      mira.resume()?;
    }
  }

  mira.exit()?;
  Ok(())
}

fn disassemble(input: InputArgs) -> anyhow::Result<()> {
  let source = input.source()?;
  match mira::compile_source(&source) {
    Ok(program) => {
      println!("{}", disassemble_program(&program));
      Ok(())
    }
    Err(errors) => {
      report(&source, &errors);
      anyhow::bail!("failed to disassemble {}", input.name())
    }
  }
}

/// Runs a script to completion on its own thread, polling for `name:hotkey`
/// lines on stdin and delivering them between ticks. Ctrl-D on stdin ends
/// the session and triggers `exit`.
fn serve(args: RunArgs) -> anyhow::Result<()> {
  let source = args.input.source()?;
  let (tx, rx) = mpsc::channel::<HotkeyEvent>();

  let worker = thread::spawn(move || -> anyhow::Result<()> {
    let mut mira = Mira::new(&source, ConfigBuilder::new().finish())
      .map_err(|errors| anyhow::anyhow!("{} compile error(s)", errors.len()))?;
    mira.run_top_level()?;
    mira.init()?;

    let delta = mira.fps().map(|fps| 1.0 / fps).unwrap_or(1.0 / 60.0);
    let tick_len = Duration::from_secs_f64(delta.max(mira.min_sleep().unwrap_or(0.0)));

    loop {
      let started = Instant::now();
      while let Ok(event) = rx.try_recv() {
        mira.hotkey(&event)?;
      }
      match rx.recv_timeout(tick_len) {
        Ok(event) => {
          mira.hotkey(&event)?;
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {}
        Err(mpsc::RecvTimeoutError::Disconnected) => break,
      }
      mira.tick(started.elapsed().as_secs_f64())?;
      if mira.is_yielded() {
        mira.resume()?;
      }
    }
    mira.exit()?;
    Ok(())
  });

  for line in std::io::stdin().lines() {
    let line = line.context("failed to read stdin")?;
    if tx.send(HotkeyEvent { name: line }).is_err() {
      break;
    }
  }
  drop(tx);

  worker.join().expect("worker thread panicked")?;
  Ok(())
}

fn report(source: &str, errors: &[mira::Error]) {
  let report = Report::new(std::io::stderr().is_terminal());
  for error in errors {
    eprintln!("{}", report.render(source, error));
  }
}
