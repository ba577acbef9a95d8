//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about statements. It recognises numeric
//! literals, words (keywords or identifiers), single-character operators and
//! parentheses, tracking a 1-based line and column for every token. Any other
//! character is fatal for the whole run.

use crate::error::{CompileError, CompileResult};
use crate::parser::BinaryOp;

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Int,
  Float,
  Ident,
  Res,
  Mem,
  V,
  N,
  If,
  Then,
  Else,
  For,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  Pipe,
  Caret,
  LParen,
  RParen,
  Eof,
}

impl TokenKind {
  /// Binary operator spelled by this token, if any.
  pub fn binary_op(self) -> Option<BinaryOp> {
    match self {
      TokenKind::Plus => Some(BinaryOp::Add),
      TokenKind::Minus => Some(BinaryOp::Sub),
      TokenKind::Star => Some(BinaryOp::Mul),
      TokenKind::Slash => Some(BinaryOp::Div),
      TokenKind::Pipe => Some(BinaryOp::IntDiv),
      TokenKind::Percent => Some(BinaryOp::Mod),
      TokenKind::Caret => Some(BinaryOp::Pow),
      _ => None,
    }
  }

  fn keyword(word: &str) -> Option<Self> {
    let kind = match word {
      "RES" => TokenKind::Res,
      "MEM" => TokenKind::Mem,
      "V" => TokenKind::V,
      "N" => TokenKind::N,
      "if" => TokenKind::If,
      "then" => TokenKind::Then,
      "else" => TokenKind::Else,
      "for" => TokenKind::For,
      _ => return None,
    };
    Some(kind)
  }
}

/// Numeric literal value carried by `Int` and `Float` tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
  Int(i64),
  Float(f64),
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  pub value: Option<Literal>,
  pub line: usize,
  pub col: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, col: usize) -> Self {
    Self {
      kind,
      text: text.into(),
      value: None,
      line,
      col,
    }
  }

  fn with_value(mut self, value: Literal) -> Self {
    self.value = Some(value);
    self
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;
  let mut line = 1;
  let mut line_start = 0;

  while i < bytes.len() {
    let c = bytes[i];
    let col = i - line_start + 1;

    if c == b'\n' {
      i += 1;
      line += 1;
      line_start = i;
      continue;
    }

    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let is_float = i < bytes.len() && bytes[i] == b'.';
      if is_float {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
          i += 1;
        }
      }
      let text = &input[start..i];
      let token = if is_float {
        let value = text
          .parse::<f64>()
          .map_err(|err| CompileError::lex(line, col, format!("invalid number '{text}': {err}")))?;
        Token::new(TokenKind::Float, text, line, col).with_value(Literal::Float(value))
      } else {
        let value = text
          .parse::<i64>()
          .map_err(|err| CompileError::lex(line, col, format!("invalid number '{text}': {err}")))?;
        Token::new(TokenKind::Int, text, line, col).with_value(Literal::Int(value))
      };
      tokens.push(token);
      continue;
    }

    if c.is_ascii_alphabetic() {
      let start = i;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let word = &input[start..i];
      let kind = TokenKind::keyword(word).unwrap_or(TokenKind::Ident);
      tokens.push(Token::new(kind, word, line, col));
      continue;
    }

    let punct = match c {
      b'+' => Some(TokenKind::Plus),
      b'-' => Some(TokenKind::Minus),
      b'*' => Some(TokenKind::Star),
      b'/' => Some(TokenKind::Slash),
      b'%' => Some(TokenKind::Percent),
      b'|' => Some(TokenKind::Pipe),
      b'^' => Some(TokenKind::Caret),
      b'(' => Some(TokenKind::LParen),
      b')' => Some(TokenKind::RParen),
      _ => None,
    };
    if let Some(kind) = punct {
      tokens.push(Token::new(kind, &input[i..i + 1], line, col));
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::lex(
      line,
      col,
      format!("invalid character '{invalid_char}'"),
    ));
  }

  let col = input.len() - line_start + 1;
  tokens.push(Token::new(TokenKind::Eof, "", line, col));
  Ok(tokens)
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: &Token) -> String {
  match token.kind {
    TokenKind::Eof => "EOF".to_string(),
    _ => token.text.clone(),
  }
}
