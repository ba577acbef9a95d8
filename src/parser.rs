//! Recursive-descent parser producing a statement list and expression AST.
//!
//! Statements are either a parenthesized RPN expression, an `if` or a `for`.
//! RPN bodies are folded into trees with a local operand stack. Malformed
//! statements never abort the parse: each one yields a single diagnostic,
//! the cursor resynchronizes on the next statement-starting token and parsing
//! carries on, so one bad line only costs that line.

use tracing::debug;

use crate::error::Diagnostic;
use crate::tokenizer::{Literal, Token, TokenKind, describe_token};
use crate::ty::{Coercion, Type};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  /// Real division, `/`.
  Div,
  /// Truncating integer division, `|`.
  IntDiv,
  Mod,
  Pow,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::IntDiv => "|",
      BinaryOp::Mod => "%",
      BinaryOp::Pow => "^",
    }
  }
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Num {
    value: Literal,
  },
  Ident {
    name: String,
  },
  /// Read of the single memory cell.
  Mem,
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  /// Explicit widening inserted by the semantic stage.
  Coerce {
    coercion: Coercion,
    inner: Box<Expr>,
  },
}

impl Expr {
  pub fn int(value: i64) -> Self {
    Self::Num {
      value: Literal::Int(value),
    }
  }

  pub fn float(value: f64) -> Self {
    Self::Num {
      value: Literal::Float(value),
    }
  }

  pub fn ident(name: impl Into<String>) -> Self {
    Self::Ident { name: name.into() }
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn coerce(coercion: Coercion, inner: Expr) -> Self {
    Self::Coerce {
      coercion,
      inner: Box::new(inner),
    }
  }

  /// Type of the value this expression leaves behind.
  ///
  /// Loop variables are always `int` and the memory cell always `float`.
  /// Real division yields `float`; any other operator yields `float` as soon
  /// as one operand does.
  pub fn ty(&self) -> Type {
    match self {
      Expr::Num { value } => Type::of_literal(value),
      Expr::Ident { .. } => Type::Int,
      Expr::Mem => Type::Float,
      Expr::Coerce { coercion, .. } => coercion.target(),
      Expr::Binary { op, lhs, rhs } => {
        if *op == BinaryOp::Div || lhs.ty().is_float() || rhs.ty().is_float() {
          Type::Float
        } else {
          Type::Int
        }
      }
    }
  }
}

/// Statement kinds. Every top-level RPN expression prints its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  Res {
    arg: Expr,
  },
  /// `N RES`: print the value recorded `n` results ago.
  ResRelative {
    n: Expr,
  },
  /// `V MEM`: write `value` into the memory cell.
  Store {
    value: Expr,
  },
  If {
    cond: Expr,
    then_branch: Box<Statement>,
    else_branch: Option<Box<Statement>>,
  },
  For {
    var: String,
    start: Expr,
    end: Expr,
    body: Box<Statement>,
  },
}

/// A statement with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
  pub node: Stmt,
  pub line: usize,
  pub col: usize,
}

impl Statement {
  pub fn new(node: Stmt, line: usize, col: usize) -> Self {
    Self { node, line, col }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
  pub statements: Vec<Statement>,
}

/// Parse a whole token stream, collecting one diagnostic per malformed statement.
pub fn parse_program(tokens: Vec<Token>) -> (Program, Vec<Diagnostic>) {
  let mut stream = TokenStream::new(tokens);
  let mut statements = Vec::new();
  let mut diagnostics = Vec::new();

  while !stream.is_eof() {
    let start = stream.pos;
    match parse_stmt(&mut stream) {
      Ok(stmt) => statements.push(stmt),
      Err(diag) => {
        debug!(line = diag.line, col = diag.col, "synchronizing after syntax error");
        diagnostics.push(diag);
        if stream.pos == start {
          stream.advance();
        }
        stream.synchronize();
      }
    }
  }

  debug!(
    statements = statements.len(),
    errors = diagnostics.len(),
    "parsed program"
  );
  (Program { statements }, diagnostics)
}

type ParseResult<T> = Result<T, Diagnostic>;

fn parse_stmt(stream: &mut TokenStream) -> ParseResult<Statement> {
  let token = stream.peek().clone();
  let node = match token.kind {
    TokenKind::LParen => {
      let item = parse_rpn(stream)?;
      // `( ... ) RES` spells the implicit print out; only a value has one.
      let marker = stream.peek().clone();
      if stream.equal(TokenKind::Res) && !matches!(item, RpnItem::Value(_)) {
        return Err(Diagnostic::syntax(
          marker.line,
          marker.col,
          "\"RES\" after \"V MEM\" or \"N RES\" has no value to print",
        ));
      }
      match item {
        RpnItem::Value(arg) => Stmt::Res { arg },
        RpnItem::Store(value) => Stmt::Store { value },
        RpnItem::Relative(n) => Stmt::ResRelative { n },
      }
    }
    TokenKind::If => parse_if(stream)?,
    TokenKind::For => parse_for(stream)?,
    _ => {
      stream.advance();
      return Err(Diagnostic::syntax(
        token.line,
        token.col,
        format!("expected a statement, but got \"{}\"", describe_token(&token)),
      ));
    }
  };
  Ok(Statement::new(node, token.line, token.col))
}

fn parse_if(stream: &mut TokenStream) -> ParseResult<Stmt> {
  stream.skip(TokenKind::If, "if")?;
  let cond = parse_value(stream, "an 'if' condition")?;
  stream.skip(TokenKind::Then, "then")?;
  let then_branch = Box::new(parse_stmt(stream)?);
  let else_branch = if stream.equal(TokenKind::Else) {
    Some(Box::new(parse_stmt(stream)?))
  } else {
    None
  };
  Ok(Stmt::If {
    cond,
    then_branch,
    else_branch,
  })
}

fn parse_for(stream: &mut TokenStream) -> ParseResult<Stmt> {
  stream.skip(TokenKind::For, "for")?;
  let var = stream.get_ident()?;
  let start = parse_value(stream, "a 'for' bound")?;
  let end = parse_value(stream, "a 'for' bound")?;
  let body = Box::new(parse_stmt(stream)?);
  Ok(Stmt::For {
    var,
    start,
    end,
    body,
  })
}

/// Parse an RPN expression that must produce a plain value.
fn parse_value(stream: &mut TokenStream, what: &str) -> ParseResult<Expr> {
  let open = stream.peek().clone();
  match parse_rpn(stream)? {
    RpnItem::Value(expr) => Ok(expr),
    RpnItem::Store(_) | RpnItem::Relative(_) => Err(Diagnostic::syntax(
      open.line,
      open.col,
      format!("{what} must be a value, not V MEM or N RES"),
    )),
  }
}

/// Entry on the local RPN operand stack.
#[derive(Debug)]
enum RpnItem {
  Value(Expr),
  Store(Expr),
  Relative(Expr),
}

fn parse_rpn(stream: &mut TokenStream) -> ParseResult<RpnItem> {
  let open = stream.peek().clone();
  stream.skip(TokenKind::LParen, "(")?;

  let mut stack: Vec<RpnItem> = Vec::new();
  loop {
    let token = stream.peek().clone();
    match token.kind {
      TokenKind::RParen => {
        stream.advance();
        break;
      }
      TokenKind::Eof => {
        return Err(Diagnostic::syntax(
          open.line,
          open.col,
          "unterminated RPN expression: missing \")\"",
        ));
      }
      TokenKind::Int | TokenKind::Float => {
        stream.advance();
        let value = token.value.ok_or_else(|| {
          Diagnostic::syntax(
            token.line,
            token.col,
            "internal error: numeric token missing value",
          )
        })?;
        stack.push(RpnItem::Value(Expr::Num { value }));
      }
      TokenKind::Ident => {
        stream.advance();
        stack.push(RpnItem::Value(Expr::ident(token.text)));
      }
      TokenKind::Mem => {
        stream.advance();
        stack.push(RpnItem::Value(Expr::Mem));
      }
      TokenKind::Res => {
        stream.advance();
        let n = pop_value(stream, &mut stack, &token, "RES")?;
        stack.push(RpnItem::Relative(n));
      }
      TokenKind::N => {
        stream.advance();
        if !stream.equal(TokenKind::Res) {
          return Err(stream.fail_in_rpn(&token, "\"N\" must be followed by \"RES\""));
        }
        let n = pop_value(stream, &mut stack, &token, "N RES")?;
        stack.push(RpnItem::Relative(n));
      }
      TokenKind::V => {
        stream.advance();
        if !stream.equal(TokenKind::Mem) {
          return Err(stream.fail_in_rpn(&token, "\"V\" must be followed by \"MEM\""));
        }
        let value = pop_value(stream, &mut stack, &token, "V MEM")?;
        stack.push(RpnItem::Store(value));
      }
      kind => {
        let Some(op) = kind.binary_op() else {
          stream.advance();
          return Err(stream.fail_in_rpn(
            &token,
            format!(
              "unexpected token \"{}\" in RPN expression",
              describe_token(&token)
            ),
          ));
        };
        stream.advance();
        if stack.len() < 2 {
          return Err(stream.fail_in_rpn(
            &token,
            format!("operator '{}' needs two operands", op.symbol()),
          ));
        }
        let rhs = pop_value(stream, &mut stack, &token, op.symbol())?;
        let lhs = pop_value(stream, &mut stack, &token, op.symbol())?;
        stack.push(RpnItem::Value(Expr::binary(op, lhs, rhs)));
      }
    }
  }

  if stack.len() != 1 {
    return Err(Diagnostic::syntax(
      open.line,
      open.col,
      format!(
        "malformed RPN expression: {} values left on the stack, expected 1",
        stack.len()
      ),
    ));
  }
  stack.pop().ok_or_else(|| {
    Diagnostic::syntax(open.line, open.col, "malformed RPN expression")
  })
}

/// Pop a plain value for `what`, rejecting empty stacks and store/relative wrappers.
fn pop_value(
  stream: &mut TokenStream,
  stack: &mut Vec<RpnItem>,
  token: &Token,
  what: &str,
) -> ParseResult<Expr> {
  match stack.pop() {
    Some(RpnItem::Value(expr)) => Ok(expr),
    Some(_) => Err(stream.fail_in_rpn(
      token,
      format!("'{what}' cannot take the result of V MEM or N RES as an operand"),
    )),
    None => Err(stream.fail_in_rpn(token, format!("'{what}' needs an operand"))),
  }
}

/// Tokens a statement may start with; the synchronizer stops on these.
fn is_sync_token(kind: TokenKind) -> bool {
  matches!(
    kind,
    TokenKind::LParen
      | TokenKind::Int
      | TokenKind::Float
      | TokenKind::Ident
      | TokenKind::If
      | TokenKind::For
      | TokenKind::Eof
  )
}

/// Lightweight cursor over the token vector.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  /// Take ownership of the token stream, making sure it ends in `Eof`.
  fn new(mut tokens: Vec<Token>) -> Self {
    if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
      let (line, col) = tokens
        .last()
        .map(|token| (token.line, token.col + token.text.len()))
        .unwrap_or((1, 1));
      tokens.push(Token::new(TokenKind::Eof, "", line, col));
    }
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> &Token {
    let last = self.tokens.len() - 1;
    &self.tokens[self.pos.min(last)]
  }

  fn advance(&mut self) {
    if !self.is_eof() {
      self.pos += 1;
    }
  }

  /// Consume the current token if it has the given kind.
  fn equal(&mut self, kind: TokenKind) -> bool {
    if self.peek().kind == kind && kind != TokenKind::Eof {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, kind: TokenKind, spelling: &str) -> ParseResult<()> {
    if self.equal(kind) {
      Ok(())
    } else {
      let token = self.peek();
      Err(Diagnostic::syntax(
        token.line,
        token.col,
        format!(
          "expected \"{spelling}\", but got \"{}\"",
          describe_token(token)
        ),
      ))
    }
  }

  fn get_ident(&mut self) -> ParseResult<String> {
    let token = self.peek().clone();
    if token.kind == TokenKind::Ident {
      self.pos += 1;
      return Ok(token.text);
    }
    Err(Diagnostic::syntax(
      token.line,
      token.col,
      format!(
        "expected a loop variable, but got \"{}\"",
        describe_token(&token)
      ),
    ))
  }

  /// Report an error inside an RPN body and discard the rest of that body.
  fn fail_in_rpn(&mut self, token: &Token, message: impl Into<String>) -> Diagnostic {
    while !matches!(self.peek().kind, TokenKind::RParen | TokenKind::Eof) {
      self.pos += 1;
    }
    self.equal(TokenKind::RParen);
    Diagnostic::syntax(token.line, token.col, message)
  }

  /// Panic-mode recovery: drop tokens until one can start a statement.
  fn synchronize(&mut self) {
    while !is_sync_token(self.peek().kind) {
      self.pos += 1;
    }
  }

  fn is_eof(&self) -> bool {
    self.peek().kind == TokenKind::Eof
  }
}
