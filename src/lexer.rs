//! Indentation-aware lexer. Produces a flat token stream terminated by
//! `Eof`, with explicit `Indent`/`Dedent`/`Newline` markers and `Meta`
//! tokens for `@meta { ... }` blocks. See `spec` §4.1.

use logos::Logos;

use crate::error::{LexError, LexErrorKind};
use crate::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
  // Keywords
  Let,
  Set,
  Func,
  If,
  Elif,
  Else,
  While,
  For,
  In,
  Return,
  Break,
  Continue,
  Not,
  And,
  Or,
  True,
  False,
  Yield,

  Ident(String),
  Number(f64),
  String(String),

  // Operators
  Plus,
  PlusPlus,
  PlusEq,
  Minus,
  MinusMinus,
  MinusEq,
  Star,
  StarEq,
  Slash,
  SlashEq,
  Eq,
  EqEq,
  BangEq,
  Bang,
  Gt,
  GtEq,
  Lt,
  LtEq,

  // Punctuation
  LParen,
  RParen,
  Colon,
  Comma,
  Dot,
  LBracket,
  RBracket,
  LBrace,
  RBrace,

  // Structural
  Indent,
  Dedent,
  Newline,
  Meta(String),
  Eof,
}

#[derive(Clone, Debug)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
  pub line: usize,
}

pub fn lex(src: &str) -> Result<Vec<Token>, Vec<LexError>> {
  Lexer::new(src).run()
}

#[derive(Logos, Clone, Copy, Debug, PartialEq)]
enum Lexeme {
  #[token("let")]
  Let,
  #[token("set")]
  Set,
  #[token("func")]
  Func,
  #[token("if")]
  If,
  #[token("elif")]
  Elif,
  #[token("else")]
  Else,
  #[token("while")]
  While,
  #[token("for")]
  For,
  #[token("in")]
  In,
  #[token("return")]
  Return,
  #[token("break")]
  Break,
  #[token("continue")]
  Continue,
  #[token("not")]
  Not,
  #[token("and")]
  And,
  #[token("or")]
  Or,
  #[token("true")]
  True,
  #[token("false")]
  False,
  #[token("yield")]
  Yield,

  #[regex("[a-zA-Z_][a-zA-Z0-9_]*")]
  Ident,
  #[regex(r"[0-9]+(\.[0-9]+)?")]
  Number,
  #[regex(r#""[^"\n]*""#)]
  String,
  #[regex(r#""[^"\n]*"#)]
  UnterminatedString,

  #[token("++")]
  PlusPlus,
  #[token("+=")]
  PlusEq,
  #[token("+")]
  Plus,
  #[token("--")]
  MinusMinus,
  #[token("-=")]
  MinusEq,
  #[token("-")]
  Minus,
  #[token("*=")]
  StarEq,
  #[token("*")]
  Star,
  #[token("/=")]
  SlashEq,
  #[token("/")]
  Slash,
  #[token("==")]
  EqEq,
  #[token("=")]
  Eq,
  #[token("!=")]
  BangEq,
  #[token("!")]
  Bang,
  #[token(">=")]
  GtEq,
  #[token(">")]
  Gt,
  #[token("<=")]
  LtEq,
  #[token("<")]
  Lt,

  #[token("(")]
  LParen,
  #[token(")")]
  RParen,
  #[token(":")]
  Colon,
  #[token(",")]
  Comma,
  #[token(".")]
  Dot,
  #[token("[")]
  LBracket,
  #[token("]")]
  RBracket,
  #[token("{")]
  LBrace,
  #[token("}")]
  RBrace,

  #[doc(hidden)]
  #[regex(r"(\r?\n)[ \t]*", priority = 10)]
  _LineBreak,
  #[doc(hidden)]
  #[regex(r"[ \t]+")]
  _Whitespace,
  #[doc(hidden)]
  #[regex(r"#[^\n]*")]
  _Comment,

  #[error]
  _Error,
}

/// Width of the indentation captured by a `_LineBreak` match, with tabs
/// counted as 4 spaces (`spec` §4.1).
fn measure_indent(lexeme: &str) -> usize {
  let ws = lexeme.trim_start_matches(|c| c == '\n' || c == '\r');
  ws.chars()
    .map(|c| if c == '\t' { 4 } else { 1 })
    .sum::<usize>()
}

/// One lexical item before indent/newline structure is imposed: either a
/// real token from the `Lexeme` scan, or a `@meta` block discovered by the
/// pre-pass. `ws` is `Some(n)` when this item is the first thing on its
/// logical line, carrying that line's indentation width.
struct Pending {
  kind: PendingKind,
  span: Span,
  ws: Option<usize>,
}

enum PendingKind {
  Lex(Lexeme, String),
  Meta(String),
}

struct Lexer<'src> {
  src: &'src str,
  errors: Vec<LexError>,
}

impl<'src> Lexer<'src> {
  fn new(src: &'src str) -> Self {
    Self {
      src,
      errors: Vec::new(),
    }
  }

  fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
    let (cleaned, metas) = match self.extract_meta() {
      Ok(v) => v,
      Err(e) => {
        self.errors.push(e);
        return Err(self.errors);
      }
    };

    let mut pending = self.scan_lexemes(&cleaned);
    pending.extend(metas);
    pending.sort_by_key(|p| p.span.start);

    let tokens = self.structure(pending);

    if self.errors.is_empty() {
      Ok(tokens)
    } else {
      Err(self.errors)
    }
  }

  /// Find every balanced `@meta { ... }` block in the raw source, blanking
  /// its bytes (except newlines) so downstream positions stay stable.
  fn extract_meta(&mut self) -> Result<(String, Vec<Pending>), LexError> {
    let mut cleaned: Vec<u8> = self.src.as_bytes().to_vec();
    let mut metas = Vec::new();

    let bytes = self.src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
      if bytes[i] == b'@' {
        let rest = &self.src[i..];
        if let Some(after_kw) = rest.strip_prefix("@meta") {
          let ws_len = after_kw.len() - after_kw.trim_start_matches([' ', '\t']).len();
          let after_ws = &after_kw[ws_len..];
          if after_ws.starts_with('{') {
            let brace_start = i + "@meta".len() + ws_len;
            let end = find_matching_brace(self.src, brace_start)?;
            let span = Span::new(i, end);
            let ws = self.line_ws(i);
            let content = self.src[brace_start..end].to_string();
            metas.push(Pending {
              kind: PendingKind::Meta(content),
              span,
              ws,
            });
            for b in &mut cleaned[i..end] {
              if *b != b'\n' && *b != b'\r' {
                *b = b' ';
              }
            }
            i = end;
            continue;
          }
        }
        return Err(LexError {
          line: crate::span::line_col(self.src, i).0,
          column: crate::span::line_col(self.src, i).1,
          span: Span::new(i, i + 1),
          kind: LexErrorKind::StrayAt,
        });
      }
      i += 1;
    }

    // SAFETY: we only ever overwrite non-newline bytes with the ASCII
    // space character, so the buffer stays valid UTF-8.
    let cleaned = String::from_utf8(cleaned).expect("blanking preserves UTF-8 validity");
    Ok((cleaned, metas))
  }

  /// Indentation width of the logical line containing byte offset `pos`,
  /// or `None` if `pos` is not the first non-whitespace thing on its line.
  fn line_ws(&self, pos: usize) -> Option<usize> {
    let line_start = self.src[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &self.src[line_start..pos];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
      Some(measure_indent(prefix))
    } else {
      None
    }
  }

  fn scan_lexemes(&mut self, cleaned: &str) -> Vec<Pending> {
    let mut out = Vec::new();
    let mut lexer = Lexeme::lexer(cleaned);
    let mut ws: Option<usize> = Some(0);

    while let Some(kind) = lexer.next() {
      let lexeme = lexer.slice();
      let span: Span = lexer.span().into();

      match kind {
        Lexeme::_LineBreak => {
          ws = Some(measure_indent(lexeme));
        }
        Lexeme::_Whitespace | Lexeme::_Comment => {}
        Lexeme::_Error => {
          self.errors.push(LexError {
            line: crate::span::line_col(self.src, span.start).0,
            column: crate::span::line_col(self.src, span.start).1,
            span,
            kind: LexErrorKind::UnknownCharacter(lexeme.chars().next().unwrap_or('\0')),
          });
        }
        Lexeme::UnterminatedString => {
          self.errors.push(LexError {
            line: crate::span::line_col(self.src, span.start).0,
            column: crate::span::line_col(self.src, span.start).1,
            span,
            kind: LexErrorKind::UnterminatedString,
          });
        }
        other => {
          out.push(Pending {
            kind: PendingKind::Lex(other, lexeme.to_string()),
            span,
            ws: ws.take(),
          });
        }
      }
    }

    out
  }

  /// Walk the merged, position-sorted item list, tracking bracket depth
  /// and the indent stack, emitting explicit `Indent`/`Dedent`/`Newline`.
  fn structure(&mut self, pending: Vec<Pending>) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut indent_stack = vec![0usize];
    let mut depth: i32 = 0;
    let mut line_open = false; // have we emitted anything since the last Newline?

    for item in pending {
      if let Some(n) = item.ws {
        if depth == 0 {
          if line_open {
            tokens.push(Token {
              kind: TokenKind::Newline,
              span: item.span,
              line: crate::span::line_col(self.src, item.span.start).0,
            });
          }
          let top = *indent_stack.last().unwrap();
          if n > top {
            indent_stack.push(n);
            tokens.push(Token {
              kind: TokenKind::Indent,
              span: item.span,
              line: crate::span::line_col(self.src, item.span.start).0,
            });
          } else if n < top {
            while *indent_stack.last().unwrap() > n {
              indent_stack.pop();
              tokens.push(Token {
                kind: TokenKind::Dedent,
                span: item.span,
                line: crate::span::line_col(self.src, item.span.start).0,
              });
            }
            if *indent_stack.last().unwrap() != n {
              self.errors.push(LexError {
                line: crate::span::line_col(self.src, item.span.start).0,
                column: crate::span::line_col(self.src, item.span.start).1,
                span: item.span,
                kind: LexErrorKind::InconsistentDedent,
              });
              indent_stack.push(n);
            }
          }
        }
      }

      let line = crate::span::line_col(self.src, item.span.start).0;
      match item.kind {
        PendingKind::Meta(content) => {
          tokens.push(Token {
            kind: TokenKind::Meta(content),
            span: item.span,
            line,
          });
        }
        PendingKind::Lex(raw, text) => {
          match raw {
            Lexeme::LParen | Lexeme::LBracket | Lexeme::LBrace => depth += 1,
            Lexeme::RParen | Lexeme::RBracket | Lexeme::RBrace => depth = (depth - 1).max(0),
            _ => {}
          }
          tokens.push(Token {
            kind: translate(raw, &text),
            span: item.span,
            line,
          });
        }
      }
      line_open = true;
    }

    let eof_span = Span::new(self.src.len(), self.src.len());
    let eof_line = crate::span::line_col(self.src, self.src.len()).0;
    if line_open {
      tokens.push(Token {
        kind: TokenKind::Newline,
        span: eof_span,
        line: eof_line,
      });
    }
    while indent_stack.len() > 1 {
      indent_stack.pop();
      tokens.push(Token {
        kind: TokenKind::Dedent,
        span: eof_span,
        line: eof_line,
      });
    }
    tokens.push(Token {
      kind: TokenKind::Eof,
      span: eof_span,
      line: eof_line,
    });

    tokens
  }
}

fn translate(raw: Lexeme, text: &str) -> TokenKind {
  match raw {
    Lexeme::Let => TokenKind::Let,
    Lexeme::Set => TokenKind::Set,
    Lexeme::Func => TokenKind::Func,
    Lexeme::If => TokenKind::If,
    Lexeme::Elif => TokenKind::Elif,
    Lexeme::Else => TokenKind::Else,
    Lexeme::While => TokenKind::While,
    Lexeme::For => TokenKind::For,
    Lexeme::In => TokenKind::In,
    Lexeme::Return => TokenKind::Return,
    Lexeme::Break => TokenKind::Break,
    Lexeme::Continue => TokenKind::Continue,
    Lexeme::Not => TokenKind::Not,
    Lexeme::And => TokenKind::And,
    Lexeme::Or => TokenKind::Or,
    Lexeme::True => TokenKind::True,
    Lexeme::False => TokenKind::False,
    Lexeme::Yield => TokenKind::Yield,
    Lexeme::Ident => TokenKind::Ident(text.to_string()),
    Lexeme::Number => TokenKind::Number(text.parse().expect("regex guarantees valid float")),
    Lexeme::String => TokenKind::String(text[1..text.len() - 1].to_string()),
    Lexeme::Plus => TokenKind::Plus,
    Lexeme::PlusPlus => TokenKind::PlusPlus,
    Lexeme::PlusEq => TokenKind::PlusEq,
    Lexeme::Minus => TokenKind::Minus,
    Lexeme::MinusMinus => TokenKind::MinusMinus,
    Lexeme::MinusEq => TokenKind::MinusEq,
    Lexeme::Star => TokenKind::Star,
    Lexeme::StarEq => TokenKind::StarEq,
    Lexeme::Slash => TokenKind::Slash,
    Lexeme::SlashEq => TokenKind::SlashEq,
    Lexeme::Eq => TokenKind::Eq,
    Lexeme::EqEq => TokenKind::EqEq,
    Lexeme::BangEq => TokenKind::BangEq,
    Lexeme::Bang => TokenKind::Bang,
    Lexeme::Gt => TokenKind::Gt,
    Lexeme::GtEq => TokenKind::GtEq,
    Lexeme::Lt => TokenKind::Lt,
    Lexeme::LtEq => TokenKind::LtEq,
    Lexeme::LParen => TokenKind::LParen,
    Lexeme::RParen => TokenKind::RParen,
    Lexeme::Colon => TokenKind::Colon,
    Lexeme::Comma => TokenKind::Comma,
    Lexeme::Dot => TokenKind::Dot,
    Lexeme::LBracket => TokenKind::LBracket,
    Lexeme::RBracket => TokenKind::RBracket,
    Lexeme::LBrace => TokenKind::LBrace,
    Lexeme::RBrace => TokenKind::RBrace,
    Lexeme::_LineBreak | Lexeme::_Whitespace | Lexeme::_Comment | Lexeme::_Error
    | Lexeme::UnterminatedString => {
      unreachable!("filtered out before translation")
    }
  }
}

/// Scan forward from `open_brace` (the byte index of `{`) for the matching
/// `}`, skipping over double-quoted string contents so braces inside JSON
/// string values don't unbalance the count.
fn find_matching_brace(src: &str, open_brace: usize) -> Result<usize, LexError> {
  let bytes = src.as_bytes();
  let mut depth = 0i32;
  let mut i = open_brace;
  let mut in_string = false;
  while i < bytes.len() {
    let c = bytes[i];
    if in_string {
      if c == b'\\' {
        i += 2;
        continue;
      }
      if c == b'"' {
        in_string = false;
      }
    } else {
      match c {
        b'"' => in_string = true,
        b'{' => depth += 1,
        b'}' => {
          depth -= 1;
          if depth == 0 {
            return Ok(i + 1);
          }
        }
        _ => {}
      }
    }
    i += 1;
  }
  Err(LexError {
    line: crate::span::line_col(src, open_brace).0,
    column: crate::span::line_col(src, open_brace).1,
    span: Span::new(open_brace, bytes.len()),
    kind: LexErrorKind::UnbalancedMeta,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    lex(src).unwrap().into_iter().map(|t| t.kind).collect()
  }

  #[test]
  fn simple_assignment() {
    let k = kinds("let a = 2\n");
    assert_eq!(
      k,
      vec![
        TokenKind::Let,
        TokenKind::Ident("a".into()),
        TokenKind::Eq,
        TokenKind::Number(2.0),
        TokenKind::Newline,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn indent_dedent() {
    let k = kinds("if true:\n    let a = 1\nlet b = 2\n");
    assert_eq!(
      k,
      vec![
        TokenKind::If,
        TokenKind::True,
        TokenKind::Colon,
        TokenKind::Newline,
        TokenKind::Indent,
        TokenKind::Let,
        TokenKind::Ident("a".into()),
        TokenKind::Eq,
        TokenKind::Number(1.0),
        TokenKind::Newline,
        TokenKind::Dedent,
        TokenKind::Let,
        TokenKind::Ident("b".into()),
        TokenKind::Eq,
        TokenKind::Number(2.0),
        TokenKind::Newline,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn comments_and_blank_lines_are_invisible() {
    let k = kinds("let a = 1\n\n# a comment\n\nlet b = 2\n");
    assert_eq!(
      k,
      vec![
        TokenKind::Let,
        TokenKind::Ident("a".into()),
        TokenKind::Eq,
        TokenKind::Number(1.0),
        TokenKind::Newline,
        TokenKind::Let,
        TokenKind::Ident("b".into()),
        TokenKind::Eq,
        TokenKind::Number(2.0),
        TokenKind::Newline,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn tab_counts_as_four_spaces() {
    let k = kinds("if true:\n\tlet a = 1\n");
    assert!(matches!(k[3], TokenKind::Newline));
    assert!(matches!(k[4], TokenKind::Indent));
  }

  #[test]
  fn list_literal_spans_newlines_without_structural_tokens() {
    let k = kinds("let a = [\n  1,\n  2,\n]\n");
    assert_eq!(
      k,
      vec![
        TokenKind::Let,
        TokenKind::Ident("a".into()),
        TokenKind::Eq,
        TokenKind::LBracket,
        TokenKind::Number(1.0),
        TokenKind::Comma,
        TokenKind::Number(2.0),
        TokenKind::Comma,
        TokenKind::RBracket,
        TokenKind::Newline,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn meta_block_extracted_and_blanked() {
    let k = kinds("@meta {\n  \"tick\": \"on_tick\"\n}\nlet a = 1\n");
    assert_eq!(
      k[0],
      TokenKind::Meta("{\n  \"tick\": \"on_tick\"\n}".to_string())
    );
  }

  #[test]
  fn unterminated_string_is_an_error() {
    let errs = lex("let a = \"oops\n").unwrap_err();
    assert!(matches!(errs[0].kind, LexErrorKind::UnterminatedString));
  }

  #[test]
  fn inconsistent_dedent_is_an_error() {
    let errs = lex("if true:\n    let a = 1\n  let b = 2\n").unwrap_err();
    assert!(matches!(errs[0].kind, LexErrorKind::InconsistentDedent));
  }
}
