//! Colorized diagnostic rendering for [`crate::Error`].
//!
//! Mirrors the `hebi_diag` crate's style: an `enabled` switch (so output
//! stays plain when not writing to a terminal) wrapping `owo_colors`
//! styles, plus a one-line source snippet under the message.

use owo_colors::{OwoColorize, Style};

use crate::error::Error;
use crate::span::line_col;

pub struct Report {
  enabled: bool,
}

impl Report {
  pub fn new(enabled: bool) -> Self {
    Self { enabled }
  }

  fn styled<T: std::fmt::Display>(&self, value: T, style: Style) -> String {
    if self.enabled {
      value.style(style).to_string()
    } else {
      value.to_string()
    }
  }

  /// Render `error` against `src`, producing a message followed by the
  /// offending source line with a `^` marker under the error column.
  pub fn render(&self, src: &str, error: &Error) -> String {
    let level = self.styled("error", Style::new().red().bold());
    let mut out = format!("{level}: {error}");

    if let Some(span) = span_of(error) {
      let (line, col) = line_col(src, span.start);
      if let Some(text) = src.lines().nth(line - 1) {
        let gutter = self.styled(format!("{line:>4} | "), Style::new().blue());
        let marker = self.styled("^", Style::new().red().bold());
        out.push('\n');
        out.push_str(&gutter);
        out.push_str(text);
        out.push('\n');
        out.push_str(&" ".repeat(gutter_width(line) + col.saturating_sub(1)));
        out.push_str(&marker);
      }
    }

    out
  }
}

fn gutter_width(line: usize) -> usize {
  format!("{line:>4} | ").len()
}

fn span_of(error: &Error) -> Option<crate::span::Span> {
  match error {
    Error::Lex(e) => Some(e.span),
    Error::Parse(e) => Some(e.span),
    Error::Compile(e) => Some(e.span),
    Error::Runtime(_) => None,
  }
}
