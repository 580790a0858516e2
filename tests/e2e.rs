use mira::{Config, ConfigBuilder, HotkeyEvent, Mira, RuntimeErrorKind, Value};

#[test]
fn runs_a_script_with_a_native_global_and_the_full_lifecycle() {
  let config = ConfigBuilder::new()
    .global("greeting", Value::string("hi"))
    .register_fn("shout", |args, _globals| match args.first() {
      Some(Value::String(s)) => Ok(Value::string(format!("{}!", s.to_uppercase()))),
      _ => Err(RuntimeErrorKind::TypeError("shout expects a string".into())),
    })
    .finish();

  let source = r#"
@meta {
    "init": "setup",
    "tick": "step",
    "hotkey": "on_key",
    "fps": 30
}

let ticks = 0
let last_key = ""
let shouted = ""

func setup():
    set shouted = shout(greeting)

func step(dt):
    set ticks = ticks + dt

func on_key(name):
    set last_key = name
"#;

  let mut mira = Mira::new(source, config).expect("script compiles");
  mira.run_top_level().expect("top level runs");
  mira.init().expect("init runs");

  assert_eq!(mira.vm().globals().get("shouted"), Some(&Value::string("HI!")));
  assert_eq!(mira.fps(), Some(30.0));

  mira.tick(0.5).expect("tick runs");
  mira.tick(0.25).expect("tick runs");
  assert_eq!(mira.vm().globals().get("ticks"), Some(&Value::Number(0.75)));

  mira.hotkey(&HotkeyEvent { name: "F5".into() }).expect("hotkey runs");
  assert_eq!(mira.vm().globals().get("last_key"), Some(&Value::string("F5")));

  mira.exit().expect("exit runs");
  mira.exit().expect("second exit is a no-op");
}

#[test]
fn instruction_budget_suspends_and_resumes_across_the_public_api() {
  let source = "let total = 0\nwhile total < 500:\n    set total = total + 1\n";
  let config = Config {
    instruction_limit: 20,
    ..Config::default()
  };
  let mut mira = Mira::new(source, config).expect("script compiles");
  mira.run_top_level().expect("first slice runs");
  assert!(mira.is_yielded(), "the loop should not finish in one slice");

  let mut resumes = 0;
  while mira.is_yielded() {
    mira.resume().expect("resume runs");
    resumes += 1;
    if resumes > 10_000 {
      panic!("did not converge");
    }
  }
  assert_eq!(mira.vm().globals().get("total"), Some(&Value::Number(500.0)));
}

#[test]
fn compile_errors_are_reported_without_touching_the_vm() {
  let errors = mira::compile_source("func f(:\n    return 1\n").unwrap_err();
  assert!(!errors.is_empty());
}
