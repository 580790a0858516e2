//! Textual bytecode listings: mnemonic, operand, constant pretty-print,
//! jump-target annotation. See `spec` §6. Grounded in
//! `crates/op/src/disassembly.rs` and `src/bytecode/disasm.rs`, adapted to
//! an already-decoded `Vec<(OpCode, Operand)>` instead of packed bytes.

use std::fmt::Write as _;

use crate::compiler::CompiledProgram;
use crate::opcode::{Chunk, OpCode, Operand};

pub fn disassemble_program(program: &CompiledProgram) -> String {
  let mut out = disassemble_chunk("<top level>", &program.top_level);
  let mut names: Vec<&String> = program.functions.keys().collect();
  names.sort();
  for name in names {
    out.push('\n');
    out.push_str(&disassemble_chunk(name, &program.functions[name].chunk));
  }
  out
}

pub fn disassemble_chunk(name: &str, chunk: &Chunk) -> String {
  let mut out = String::new();
  writeln!(out, "== {name} ==").unwrap();
  let width = num_digits(chunk.code.len());
  for (offset, (op, operand)) in chunk.code.iter().enumerate() {
    let line = chunk.lines.get(offset).copied().unwrap_or(0);
    writeln!(
      out,
      "{offset:width$}  line {line:<4} {}",
      format_instruction(*op, operand, chunk)
    )
    .unwrap();
  }
  out
}

fn format_instruction(op: OpCode, operand: &Operand, chunk: &Chunk) -> String {
  let mnemonic = mnemonic(op);
  match operand {
    Operand::None => mnemonic.to_string(),
    Operand::Int(n) if is_jump(op) => format!("{mnemonic:<16} -> {n}"),
    Operand::Int(n) if uses_constant(op) => match chunk.constants.get(*n) {
      Some(c) => format!("{mnemonic:<16} {n:<4} ; {c}"),
      None => format!("{mnemonic:<16} {n:<4} ; <invalid constant index>"),
    },
    Operand::Int(n) => format!("{mnemonic:<16} {n}"),
    Operand::CallKw(argc, names) => format!("{mnemonic:<16} {argc} ({})", names.join(", ")),
  }
}

fn uses_constant(op: OpCode) -> bool {
  matches!(
    op,
    OpCode::PushConst
      | OpCode::DefineGlobal
      | OpCode::GetGlobal
      | OpCode::SetGlobal
      | OpCode::SetGlobalPop
      | OpCode::GetAttr
      | OpCode::SetAttr
      | OpCode::SetAttrFast
      | OpCode::SetAttrPop
      | OpCode::IncGlobal
      | OpCode::AddGlobal
  )
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

fn mnemonic(op: OpCode) -> &'static str {
  match op {
    OpCode::PushConst => "PUSH_CONST",
    OpCode::PushTrue => "PUSH_TRUE",
    OpCode::PushFalse => "PUSH_FALSE",
    OpCode::Pop => "POP",
    OpCode::DefineGlobal => "DEFINE_GLOBAL",
    OpCode::GetGlobal => "GET_GLOBAL",
    OpCode::SetGlobal => "SET_GLOBAL",
    OpCode::SetGlobalPop => "SET_GLOBAL_POP",
    OpCode::GetLocal => "GET_LOCAL",
    OpCode::SetLocal => "SET_LOCAL",
    OpCode::SetLocalPop => "SET_LOCAL_POP",
    OpCode::GetAttr => "GET_ATTR",
    OpCode::SetAttr => "SET_ATTR",
    OpCode::SetAttrFast => "SET_ATTR_FAST",
    OpCode::SetAttrPop => "SET_ATTR_POP",
    OpCode::Add => "ADD",
    OpCode::Sub => "SUB",
    OpCode::Mul => "MUL",
    OpCode::Div => "DIV",
    OpCode::Equal => "EQUAL",
    OpCode::NotEqual => "NOT_EQUAL",
    OpCode::Greater => "GREATER",
    OpCode::GreaterEqual => "GREATER_EQUAL",
    OpCode::Less => "LESS",
    OpCode::LessEqual => "LESS_EQUAL",
    OpCode::Not => "NOT",
    OpCode::Negate => "NEGATE",
    OpCode::Jump => "JUMP",
    OpCode::Loop => "LOOP",
    OpCode::JumpIfFalse => "JUMP_IF_FALSE",
    OpCode::JumpIfTrue => "JUMP_IF_TRUE",
    OpCode::JumpIfFalsePop => "JUMP_IF_FALSE_POP",
    OpCode::JumpIfTruePop => "JUMP_IF_TRUE_POP",
    OpCode::Call => "CALL",
    OpCode::CallKw => "CALL_KW",
    OpCode::Return => "RETURN",
    OpCode::ReturnNone => "RETURN_NONE",
    OpCode::Yield => "YIELD",
    OpCode::BuildList => "BUILD_LIST",
    OpCode::BuildMap => "BUILD_MAP",
    OpCode::GetIter => "GET_ITER",
    OpCode::ForIter => "FOR_ITER",
    OpCode::IndexGet => "INDEX_GET",
    OpCode::IndexSet => "INDEX_SET",
    OpCode::IncGlobal => "INC_GLOBAL",
    OpCode::AddGlobal => "ADD_GLOBAL",
  }
}

fn num_digits(n: usize) -> usize {
  if n == 0 {
    1
  } else {
    (n as f64).log10().floor() as usize + 1
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compiler::compile;
  use crate::lexer::lex;
  use crate::parser::parse;

  #[test]
  fn listing_names_every_global_and_jump() {
    let src = "let a = 1\nif a == 1:\n    set a = 2\n";
    let tokens = lex(src).unwrap();
    let program = parse(tokens).unwrap();
    let compiled = compile(&program, src).unwrap();
    let listing = disassemble_chunk("<top level>", &compiled.top_level);
    assert!(listing.contains("DEFINE_GLOBAL"));
    assert!(listing.contains("JUMP_IF_FALSE_POP") || listing.contains("JUMP_IF_FALSE"));
    assert!(listing.contains("; 1"));
  }

  #[test]
  fn program_listing_includes_function_chunks() {
    let src = "func f(x):\n    return x\nlet a = f(1)\n";
    let tokens = lex(src).unwrap();
    let program = parse(tokens).unwrap();
    let compiled = compile(&program, src).unwrap();
    let listing = disassemble_program(&compiled);
    assert!(listing.contains("<top level>"));
    assert!(listing.contains("== f =="));
  }
}
